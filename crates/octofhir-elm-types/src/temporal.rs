//! Precision-aware Date, DateTime and Time values
//!
//! A temporal value stores only the fields it was given. The fields that are
//! present always form a prefix of year, month, day, hour, minute, second,
//! millisecond (Time starts at hour), and that prefix is the value's
//! precision. Arithmetic keeps the precision of its input; comparison works
//! at the lowest precision the operands share and reports uncertainty as
//! `None` instead of guessing.

use crate::error::{ValueError, ValueResult};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Field slots shared by all temporal kinds, coarse to fine
pub type Fields = [Option<i32>; 7];

const MS_PER_DAY: i64 = 86_400_000;
const MAX_OFFSET_MINUTES: i16 = 14 * 60;

/// How much of a temporal value is specified
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum DateTimePrecision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl DateTimePrecision {
    pub const ALL: [Self; 7] = [
        Self::Year,
        Self::Month,
        Self::Day,
        Self::Hour,
        Self::Minute,
        Self::Second,
        Self::Millisecond,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Parse a precision keyword such as `Day`, `days` or `millisecond`
    pub fn from_name(name: &str) -> Option<Self> {
        match TemporalUnit::parse(name).ok()? {
            TemporalUnit::Week => None,
            unit => Some(unit.precision()),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
        }
    }

    /// Unit string used for duration quantities, e.g. `days`
    pub fn plural(self) -> &'static str {
        match self {
            Self::Year => "years",
            Self::Month => "months",
            Self::Day => "days",
            Self::Hour => "hours",
            Self::Minute => "minutes",
            Self::Second => "seconds",
            Self::Millisecond => "milliseconds",
        }
    }

    fn coarser(self) -> Self {
        Self::from_index(self.index().saturating_sub(1)).unwrap_or(Self::Year)
    }

    /// Number of `self` units in one unit of the next coarser precision
    fn per_coarser(self) -> i64 {
        match self {
            Self::Year => 1,
            Self::Month => 12,
            Self::Day => 30,
            Self::Hour => 24,
            Self::Minute | Self::Second => 60,
            Self::Millisecond => 1000,
        }
    }

    fn millis(self) -> Option<i64> {
        match self {
            Self::Year | Self::Month => None,
            Self::Day => Some(MS_PER_DAY),
            Self::Hour => Some(3_600_000),
            Self::Minute => Some(60_000),
            Self::Second => Some(1000),
            Self::Millisecond => Some(1),
        }
    }
}

impl fmt::Display for DateTimePrecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Unit of a temporal quantity, also the precision argument of the
/// duration and timing operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TemporalUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalUnit {
    /// Parse calendar keywords (singular or plural) and UCUM time units
    pub fn parse(unit: &str) -> ValueResult<Self> {
        let parsed = match unit.trim().to_ascii_lowercase().as_str() {
            "year" | "years" | "a" => Self::Year,
            "month" | "months" | "mo" => Self::Month,
            "week" | "weeks" | "wk" => Self::Week,
            "day" | "days" | "d" => Self::Day,
            "hour" | "hours" | "h" => Self::Hour,
            "minute" | "minutes" | "min" => Self::Minute,
            "second" | "seconds" | "s" => Self::Second,
            "millisecond" | "milliseconds" | "ms" => Self::Millisecond,
            _ => {
                return Err(ValueError::InvalidUnit {
                    unit: unit.to_string(),
                });
            }
        };
        Ok(parsed)
    }

    /// Precision the unit steps at; a week steps in days
    pub fn precision(self) -> DateTimePrecision {
        match self {
            Self::Year => DateTimePrecision::Year,
            Self::Month => DateTimePrecision::Month,
            Self::Week | Self::Day => DateTimePrecision::Day,
            Self::Hour => DateTimePrecision::Hour,
            Self::Minute => DateTimePrecision::Minute,
            Self::Second => DateTimePrecision::Second,
            Self::Millisecond => DateTimePrecision::Millisecond,
        }
    }
}

impl From<DateTimePrecision> for TemporalUnit {
    fn from(precision: DateTimePrecision) -> Self {
        match precision {
            DateTimePrecision::Year => Self::Year,
            DateTimePrecision::Month => Self::Month,
            DateTimePrecision::Day => Self::Day,
            DateTimePrecision::Hour => Self::Hour,
            DateTimePrecision::Minute => Self::Minute,
            DateTimePrecision::Second => Self::Second,
            DateTimePrecision::Millisecond => Self::Millisecond,
        }
    }
}

/// Offset from UTC in minutes.
///
/// An inferred offset was filled in from the evaluation zone rather than
/// written in the source text; it takes part in comparisons like any other
/// offset but is left out of the canonical string form.
#[derive(Debug, Clone, Copy, Eq, Serialize, Deserialize)]
pub struct TimezoneOffset {
    minutes: i16,
    #[serde(default)]
    inferred: bool,
}

impl TimezoneOffset {
    pub fn explicit(minutes: i16) -> ValueResult<Self> {
        Self::checked(minutes, false)
    }

    pub fn inferred(minutes: i16) -> ValueResult<Self> {
        Self::checked(minutes, true)
    }

    fn checked(minutes: i16, inferred: bool) -> ValueResult<Self> {
        if minutes.abs() > MAX_OFFSET_MINUTES {
            return Err(ValueError::InvalidComponent {
                target: "timezone offset",
                reason: format!("{minutes} minutes is beyond +/-14:00"),
            });
        }
        Ok(Self { minutes, inferred })
    }

    pub fn minutes(self) -> i16 {
        self.minutes
    }

    pub fn is_inferred(self) -> bool {
        self.inferred
    }
}

impl PartialEq for TimezoneOffset {
    fn eq(&self, other: &Self) -> bool {
        self.minutes == other.minutes
    }
}

impl Hash for TimezoneOffset {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.minutes.hash(state);
    }
}

impl fmt::Display for TimezoneOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.minutes < 0 { '-' } else { '+' };
        let abs = self.minutes.unsigned_abs();
        write!(f, "{sign}{:02}:{:02}", abs / 60, abs % 60)
    }
}

/// Behaviour shared by Date, DateTime and Time.
///
/// Implementors only describe how to move between their named fields and the
/// shared [`Fields`] layout; arithmetic, truncation and boundaries are
/// provided on top of that.
pub trait Temporal: Sized + Clone + fmt::Display {
    /// Name used in error messages
    const KIND: &'static str;
    /// Index of the first field this kind carries
    const FIRST: usize;

    fn fields(&self) -> Fields;

    fn offset(&self) -> Option<TimezoneOffset>;

    /// Rebuild from fields already known to be valid
    fn from_fields(fields: Fields, offset: Option<TimezoneOffset>) -> Self;

    fn precision(&self) -> DateTimePrecision {
        precision_of(&self.fields())
    }

    fn component(&self, precision: DateTimePrecision) -> Option<i32> {
        self.fields()[precision.index()]
    }

    /// Drop every field finer than `precision`
    fn truncate(&self, precision: DateTimePrecision) -> Self {
        Self::from_fields(mask(self.fields(), precision), self.offset())
    }

    fn add(&self, amount: i64, unit: TemporalUnit) -> ValueResult<Self> {
        let fields = shift(&self.fields(), Self::FIRST, amount, unit)?;
        Ok(Self::from_fields(fields, self.offset()))
    }

    fn subtract(&self, amount: i64, unit: TemporalUnit) -> ValueResult<Self> {
        let negated = amount
            .checked_neg()
            .ok_or(ValueError::OutOfRange { operation: "Subtract" })?;
        self.add(negated, unit)
    }

    /// Fill unspecified fields up to `precision` with their lowest (or highest) value
    fn boundary(&self, precision: DateTimePrecision, high: bool) -> Self {
        let mut fields = self.fields();
        for index in Self::FIRST..=precision.index() {
            if fields[index].is_none() {
                fields[index] = Some(if high {
                    field_max(index, &fields)
                } else {
                    field_min(index)
                });
            }
        }
        Self::from_fields(mask(fields, precision), self.offset())
    }

    /// Digits of precision as reported by the `Precision` operator
    fn precision_digits(&self) -> i32 {
        const DIGITS: [i32; 7] = [4, 6, 8, 10, 12, 14, 17];
        let index = self.precision().index();
        DIGITS[index] - if Self::FIRST > 0 { DIGITS[Self::FIRST - 1] } else { 0 }
    }
}

/// Calendar date: year, optionally month, optionally day
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CqlDate {
    year: i32,
    month: Option<u8>,
    day: Option<u8>,
}

impl CqlDate {
    pub fn try_new(year: i32, month: Option<u8>, day: Option<u8>) -> ValueResult<Self> {
        let fields = [
            Some(year),
            month.map(i32::from),
            day.map(i32::from),
            None,
            None,
            None,
            None,
        ];
        validate("Date", &fields, 0)?;
        Ok(Self::from_fields(fields, None))
    }

    pub fn ymd(year: i32, month: u8, day: u8) -> ValueResult<Self> {
        Self::try_new(year, Some(month), Some(day))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn month(&self) -> Option<u8> {
        self.month
    }

    pub fn day(&self) -> Option<u8> {
        self.day
    }

    /// Parse `YYYY`, `YYYY-MM` or `YYYY-MM-DD`, with an optional leading `@`
    pub fn parse(text: &str) -> ValueResult<Self> {
        let input = text.strip_prefix('@').unwrap_or(text);
        let (date, rest) = parse_date_part(input).ok_or_else(|| ValueError::format("Date", text))?;
        if !rest.is_empty() {
            return Err(ValueError::format("Date", text));
        }
        let fields = [date[0], date[1], date[2], None, None, None, None];
        validate("Date", &fields, 0)?;
        Ok(Self::from_fields(fields, None))
    }

    pub fn to_naive_date(&self) -> Option<NaiveDate> {
        NaiveDate::from_ymd_opt(
            self.year,
            u32::from(self.month?),
            u32::from(self.day?),
        )
    }

    pub fn from_naive_date(date: NaiveDate) -> Self {
        Self {
            year: date.year(),
            month: u8::try_from(date.month()).ok(),
            day: u8::try_from(date.day()).ok(),
        }
    }

    pub fn to_datetime(&self) -> CqlDateTime {
        CqlDateTime::from_fields(self.fields(), None)
    }

    pub fn min_value() -> Self {
        Self {
            year: 1,
            month: Some(1),
            day: Some(1),
        }
    }

    pub fn max_value() -> Self {
        Self {
            year: 9999,
            month: Some(12),
            day: Some(31),
        }
    }
}

impl Temporal for CqlDate {
    const KIND: &'static str = "Date";
    const FIRST: usize = 0;

    fn fields(&self) -> Fields {
        [
            Some(self.year),
            self.month.map(i32::from),
            self.day.map(i32::from),
            None,
            None,
            None,
            None,
        ]
    }

    fn offset(&self) -> Option<TimezoneOffset> {
        None
    }

    fn from_fields(fields: Fields, _offset: Option<TimezoneOffset>) -> Self {
        Self {
            year: fields[0].unwrap_or(1),
            month: narrow(fields[1]),
            day: narrow(fields[2]),
        }
    }
}

impl fmt::Display for CqlDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_date(f, &self.fields())
    }
}

/// Date and time of day with an optional UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CqlDateTime {
    year: i32,
    month: Option<u8>,
    day: Option<u8>,
    hour: Option<u8>,
    minute: Option<u8>,
    second: Option<u8>,
    millisecond: Option<u16>,
    offset: Option<TimezoneOffset>,
}

impl CqlDateTime {
    /// Build from individual components; every component after the first
    /// missing one must also be missing.
    #[allow(clippy::too_many_arguments)]
    pub fn try_new(
        year: i32,
        month: Option<u8>,
        day: Option<u8>,
        hour: Option<u8>,
        minute: Option<u8>,
        second: Option<u8>,
        millisecond: Option<u16>,
    ) -> ValueResult<Self> {
        let fields = [
            Some(year),
            month.map(i32::from),
            day.map(i32::from),
            hour.map(i32::from),
            minute.map(i32::from),
            second.map(i32::from),
            millisecond.map(i32::from),
        ];
        validate("DateTime", &fields, 0)?;
        Ok(Self::from_fields(fields, None))
    }

    /// Attach an offset written in the source
    pub fn with_offset(mut self, minutes: i16) -> ValueResult<Self> {
        self.offset = Some(TimezoneOffset::explicit(minutes)?);
        Ok(self)
    }

    /// Fill a missing offset from the evaluation zone
    pub fn or_inferred_offset(mut self, minutes: i16) -> ValueResult<Self> {
        if self.offset.is_none() {
            self.offset = Some(TimezoneOffset::inferred(minutes)?);
        }
        Ok(self)
    }

    pub fn offset_minutes(&self) -> Option<i16> {
        self.offset.map(TimezoneOffset::minutes)
    }

    /// Parse `YYYY[-MM[-DD[Thh[:mm[:ss[.fff]]]]]]` with an optional `Z` or
    /// `(+|-)hh:mm` after the time part and an optional leading `@`.
    pub fn parse(text: &str) -> ValueResult<Self> {
        let input = text.strip_prefix('@').unwrap_or(text);
        let err = || ValueError::format("DateTime", text);
        let (date, rest) = parse_date_part(input).ok_or_else(err)?;
        let mut fields: Fields = [date[0], date[1], date[2], None, None, None, None];
        let mut offset = None;

        if let Some(after_t) = rest.strip_prefix('T') {
            let (time, rest) = if after_t.starts_with(|c: char| c.is_ascii_digit()) {
                if date[2].is_none() {
                    return Err(err());
                }
                parse_time_part(after_t).ok_or_else(err)?
            } else {
                ([None; 4], after_t)
            };
            fields[3..].copy_from_slice(&time);
            let (parsed_offset, rest) = parse_offset(rest).ok_or_else(err)?;
            if !rest.is_empty() {
                return Err(err());
            }
            offset = parsed_offset.map(TimezoneOffset::explicit).transpose()?;
        } else if !rest.is_empty() {
            return Err(err());
        }

        validate("DateTime", &fields, 0)?;
        Ok(Self::from_fields(fields, offset))
    }

    pub fn from_date(date: &CqlDate) -> Self {
        date.to_datetime()
    }

    /// Full-precision value from a chrono timestamp in the given zone
    pub fn from_naive(value: NaiveDateTime, offset_minutes: i16) -> ValueResult<Self> {
        let fields = naive_fields(value);
        Self::from_fields(fields, None).with_offset(offset_minutes)
    }

    pub fn date(&self) -> CqlDate {
        CqlDate::from_fields(self.fields(), None)
    }

    /// Time-of-day part, if an hour is present
    pub fn time(&self) -> Option<CqlTime> {
        self.hour?;
        Some(CqlTime::from_fields(self.fields(), None))
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn min_value() -> Self {
        Self::from_fields(
            [Some(1), Some(1), Some(1), Some(0), Some(0), Some(0), Some(0)],
            None,
        )
    }

    pub fn max_value() -> Self {
        Self::from_fields(
            [
                Some(9999),
                Some(12),
                Some(31),
                Some(23),
                Some(59),
                Some(59),
                Some(999),
            ],
            None,
        )
    }
}

impl Temporal for CqlDateTime {
    const KIND: &'static str = "DateTime";
    const FIRST: usize = 0;

    fn fields(&self) -> Fields {
        [
            Some(self.year),
            self.month.map(i32::from),
            self.day.map(i32::from),
            self.hour.map(i32::from),
            self.minute.map(i32::from),
            self.second.map(i32::from),
            self.millisecond.map(i32::from),
        ]
    }

    fn offset(&self) -> Option<TimezoneOffset> {
        self.offset
    }

    fn from_fields(fields: Fields, offset: Option<TimezoneOffset>) -> Self {
        Self {
            year: fields[0].unwrap_or(1),
            month: narrow(fields[1]),
            day: narrow(fields[2]),
            hour: narrow(fields[3]),
            minute: narrow(fields[4]),
            second: narrow(fields[5]),
            millisecond: fields[6].and_then(|ms| u16::try_from(ms).ok()),
            offset,
        }
    }
}

impl fmt::Display for CqlDateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields();
        write_date(f, &fields)?;
        let explicit = self.offset.filter(|o| !o.is_inferred());
        if fields[3].is_some() || explicit.is_some() {
            f.write_str("T")?;
            write_time(f, &fields)?;
        }
        if let Some(offset) = explicit {
            write!(f, "{offset}")?;
        }
        Ok(())
    }
}

/// Time of day: hour, optionally minute, second and millisecond
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CqlTime {
    hour: u8,
    minute: Option<u8>,
    second: Option<u8>,
    millisecond: Option<u16>,
    offset: Option<TimezoneOffset>,
}

impl CqlTime {
    pub fn try_new(
        hour: u8,
        minute: Option<u8>,
        second: Option<u8>,
        millisecond: Option<u16>,
    ) -> ValueResult<Self> {
        let fields = [
            None,
            None,
            None,
            Some(i32::from(hour)),
            minute.map(i32::from),
            second.map(i32::from),
            millisecond.map(i32::from),
        ];
        validate("Time", &fields, 3)?;
        Ok(Self::from_fields(fields, None))
    }

    pub fn hms(hour: u8, minute: u8, second: u8) -> ValueResult<Self> {
        Self::try_new(hour, Some(minute), Some(second), None)
    }

    pub fn with_offset(mut self, minutes: i16) -> ValueResult<Self> {
        self.offset = Some(TimezoneOffset::explicit(minutes)?);
        Ok(self)
    }

    pub fn or_inferred_offset(mut self, minutes: i16) -> ValueResult<Self> {
        if self.offset.is_none() {
            self.offset = Some(TimezoneOffset::inferred(minutes)?);
        }
        Ok(self)
    }

    pub fn offset_minutes(&self) -> Option<i16> {
        self.offset.map(TimezoneOffset::minutes)
    }

    /// Parse `[T]hh[:mm[:ss[.fff]]]` followed by an optional `Z` or
    /// `(+|-)hh:mm`; a leading `@` is accepted.
    pub fn parse(text: &str) -> ValueResult<Self> {
        let input = text.strip_prefix('@').unwrap_or(text);
        let input = input.strip_prefix('T').unwrap_or(input);
        let err = || ValueError::format("Time", text);
        let (time, rest) = parse_time_part(input).ok_or_else(err)?;
        let (offset, rest) = parse_offset(rest).ok_or_else(err)?;
        if !rest.is_empty() {
            return Err(err());
        }
        let fields = [None, None, None, time[0], time[1], time[2], time[3]];
        validate("Time", &fields, 3)?;
        let offset = offset.map(TimezoneOffset::explicit).transpose()?;
        Ok(Self::from_fields(fields, offset))
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn from_naive_time(time: NaiveTime) -> Self {
        let mut fields = naive_fields(NaiveDate::MIN.and_time(time));
        fields[..3].fill(None);
        Self::from_fields(fields, None)
    }

    pub fn min_value() -> Self {
        Self::from_fields([None, None, None, Some(0), Some(0), Some(0), Some(0)], None)
    }

    pub fn max_value() -> Self {
        Self::from_fields(
            [None, None, None, Some(23), Some(59), Some(59), Some(999)],
            None,
        )
    }
}

impl Temporal for CqlTime {
    const KIND: &'static str = "Time";
    const FIRST: usize = 3;

    fn fields(&self) -> Fields {
        [
            None,
            None,
            None,
            Some(i32::from(self.hour)),
            self.minute.map(i32::from),
            self.second.map(i32::from),
            self.millisecond.map(i32::from),
        ]
    }

    fn offset(&self) -> Option<TimezoneOffset> {
        self.offset
    }

    fn from_fields(fields: Fields, offset: Option<TimezoneOffset>) -> Self {
        Self {
            hour: narrow(fields[3]).unwrap_or(0),
            minute: narrow(fields[4]),
            second: narrow(fields[5]),
            millisecond: fields[6].and_then(|ms| u16::try_from(ms).ok()),
            offset,
        }
    }

    /// Clock arithmetic wraps around midnight
    fn add(&self, amount: i64, unit: TemporalUnit) -> ValueResult<Self> {
        let precision = self.precision();
        let (amount, step) = align_amount(amount, unit, precision);
        let step_ms = match step {
            DateTimePrecision::Year | DateTimePrecision::Month | DateTimePrecision::Day => {
                return Err(ValueError::mismatch("Add", Self::KIND, step.plural()));
            }
            other => other.millis().unwrap_or(1),
        };
        let delta = amount
            .checked_mul(step_ms)
            .ok_or(ValueError::OutOfRange { operation: "Add" })?;
        let start = time_of_day_ms(&self.fields());
        let moved = (start + delta.rem_euclid(MS_PER_DAY)).rem_euclid(MS_PER_DAY);
        let fields = mask(fields_from_time_ms(moved), precision);
        Ok(Self::from_fields(fields, self.offset))
    }
}

impl fmt::Display for CqlTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_time(f, &self.fields())?;
        if let Some(offset) = self.offset.filter(|o| !o.is_inferred()) {
            write!(f, "{offset}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Comparison
// ---------------------------------------------------------------------------

/// Ordering at the shared precision, optionally stopping at `limit`.
///
/// Returns `None` when the values agree on every shared field but one of
/// them is less precise, or when `limit` is finer than either value.
pub fn compare_temporal<T: Temporal>(
    a: &T,
    b: &T,
    limit: Option<DateTimePrecision>,
) -> Option<Ordering> {
    let (left, right) = aligned_fields(a, b);
    let last = limit.map_or(6, DateTimePrecision::index);

    for index in T::FIRST..=last {
        match field_pair(&left, &right, index) {
            (Some(x), Some(y)) if x != y => return Some(x.cmp(&y)),
            (Some(_), Some(_)) => {}
            (None, None) if limit.is_none() => return Some(Ordering::Equal),
            _ => return None,
        }
    }
    Some(Ordering::Equal)
}

/// Precision-tolerant sameness: fields missing on either side count as equal
pub fn equivalent_temporal<T: Temporal>(a: &T, b: &T) -> bool {
    let (left, right) = aligned_fields(a, b);
    for index in T::FIRST..7 {
        match field_pair(&left, &right, index) {
            (Some(x), Some(y)) if x != y => return false,
            (Some(_), Some(_)) => {}
            _ => return true,
        }
    }
    true
}

/// Seconds and milliseconds are compared as one precision: a missing
/// millisecond next to a present second reads as zero.
fn field_pair(left: &Fields, right: &Fields, index: usize) -> (Option<i32>, Option<i32>) {
    let (x, y) = (left[index], right[index]);
    if index == 6 && left[5].is_some() && right[5].is_some() && x.is_some() != y.is_some() {
        return (Some(x.unwrap_or(0)), Some(y.unwrap_or(0)));
    }
    (x, y)
}

/// Fields of both values, shifted to UTC when their offsets disagree
fn aligned_fields<T: Temporal>(a: &T, b: &T) -> (Fields, Fields) {
    match (a.offset(), b.offset()) {
        (Some(x), Some(y)) if x.minutes() != y.minutes() => (
            to_utc(&a.fields(), T::FIRST, x.minutes()),
            to_utc(&b.fields(), T::FIRST, y.minutes()),
        ),
        _ => (a.fields(), b.fields()),
    }
}

fn to_utc(fields: &Fields, first: usize, offset_minutes: i16) -> Fields {
    if fields[3].is_none() || offset_minutes == 0 {
        return *fields;
    }
    let precision = precision_of(fields);
    let shift_ms = i64::from(offset_minutes) * 60_000;
    if first > 0 {
        let moved = (time_of_day_ms(fields) - shift_ms).rem_euclid(MS_PER_DAY);
        return mask(fields_from_time_ms(moved), precision);
    }
    match padded_naive(fields) {
        Some(local) => mask(naive_fields(local - Duration::milliseconds(shift_ms)), precision),
        None => *fields,
    }
}

// ---------------------------------------------------------------------------
// Differences between two temporal values
// ---------------------------------------------------------------------------

/// `a - b` as a count of units at the precision the two values share.
///
/// Differing precisions are accepted only when every field the finer value
/// has beyond the shared precision sits at its minimum (e.g. `2020-01-01`
/// minus `2019` works at year precision, `2020-03-05` minus `2019` does not).
pub fn difference<T: Temporal>(a: &T, b: &T) -> ValueResult<(i64, DateTimePrecision)> {
    let (left, right) = aligned_fields(a, b);
    let (pa, pb) = (precision_of(&left), precision_of(&right));
    let shared = pa.min(pb);
    let finer = if pa > pb { &left } else { &right };

    for index in shared.index() + 1..=pa.max(pb).index() {
        if finer[index].is_some_and(|value| value != field_min(index)) {
            return Err(ValueError::PrecisionMismatch {
                left: b.to_string(),
                right: a.to_string(),
            });
        }
    }

    let amount = units_between(&mask(right, shared), &mask(left, shared), shared, T::FIRST)
        .ok_or(ValueError::OutOfRange { operation: "Subtract" })?;
    Ok((amount, shared))
}

/// Number of `unit` boundaries crossed going from `a` to `b`
pub fn difference_between<T: Temporal>(a: &T, b: &T, unit: TemporalUnit) -> Option<i64> {
    let precision = unit.precision();
    let (left, right) = aligned_fields(a, b);
    if precision_of(&left) < precision || precision_of(&right) < precision {
        return None;
    }
    let count = units_between(
        &mask(left, precision),
        &mask(right, precision),
        precision,
        T::FIRST,
    )?;
    Some(if unit == TemporalUnit::Week { count / 7 } else { count })
}

/// Number of whole `unit` periods between `a` and `b`
pub fn duration_between<T: Temporal>(a: &T, b: &T, unit: TemporalUnit) -> Option<i64> {
    let precision = unit.precision();
    let (left, right) = aligned_fields(a, b);
    let shared = precision_of(&left).min(precision_of(&right));
    if shared < precision {
        return None;
    }
    let (left, right) = (mask(left, shared), mask(right, shared));

    let count = match precision {
        DateTimePrecision::Year | DateTimePrecision::Month => {
            let mut months = months_between(&left, &right)?;
            let rest = |f: &Fields| -> Vec<i32> {
                (2..7).map(|i| f[i].unwrap_or_else(|| field_min(i))).collect()
            };
            let (rest_left, rest_right) = (rest(&left), rest(&right));
            if months > 0 && rest_right < rest_left {
                months -= 1;
            } else if months < 0 && rest_right > rest_left {
                months += 1;
            }
            if precision == DateTimePrecision::Year {
                months / 12
            } else {
                months
            }
        }
        _ => {
            let span = instant_ms(&right, T::FIRST)? - instant_ms(&left, T::FIRST)?;
            span / precision.millis()?
        }
    };
    Some(if unit == TemporalUnit::Week { count / 7 } else { count })
}

fn units_between(
    from: &Fields,
    to: &Fields,
    precision: DateTimePrecision,
    first: usize,
) -> Option<i64> {
    match precision {
        DateTimePrecision::Year => Some(i64::from(to[0]?) - i64::from(from[0]?)),
        DateTimePrecision::Month => months_between(from, to),
        _ => {
            let span = instant_ms(to, first)? - instant_ms(from, first)?;
            Some(span / precision.millis()?)
        }
    }
}

fn months_between(from: &Fields, to: &Fields) -> Option<i64> {
    let index = |f: &Fields| -> Option<i64> {
        Some(i64::from(f[0]?) * 12 + i64::from(f[1].unwrap_or(1)) - 1)
    };
    Some(index(to)? - index(from)?)
}

fn instant_ms(fields: &Fields, first: usize) -> Option<i64> {
    if first > 0 {
        return Some(time_of_day_ms(fields));
    }
    Some(padded_naive(fields)?.and_utc().timestamp_millis())
}

// ---------------------------------------------------------------------------
// Field helpers
// ---------------------------------------------------------------------------

fn precision_of(fields: &Fields) -> DateTimePrecision {
    let last = fields.iter().rposition(Option::is_some).unwrap_or(0);
    DateTimePrecision::from_index(last).unwrap_or(DateTimePrecision::Year)
}

fn mask(mut fields: Fields, precision: DateTimePrecision) -> Fields {
    for slot in fields.iter_mut().skip(precision.index() + 1) {
        *slot = None;
    }
    fields
}

fn narrow(value: Option<i32>) -> Option<u8> {
    value.and_then(|v| u8::try_from(v).ok())
}

fn field_min(index: usize) -> i32 {
    match index {
        0..=2 => 1,
        _ => 0,
    }
}

fn field_max(index: usize, fields: &Fields) -> i32 {
    match index {
        0 => 9999,
        1 => 12,
        2 => days_in_month(fields[0].unwrap_or(1), fields[1].unwrap_or(12)),
        3 => 23,
        4 | 5 => 59,
        _ => 999,
    }
}

fn is_leap_year(year: i32) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub(crate) fn days_in_month(year: i32, month: i32) -> i32 {
    match month {
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 31,
    }
}

fn validate(target: &'static str, fields: &Fields, first: usize) -> ValueResult<()> {
    let invalid = |reason: String| ValueError::InvalidComponent { target, reason };

    let mut seen_gap = false;
    for (index, value) in fields.iter().enumerate().skip(first) {
        match value {
            None => seen_gap = true,
            Some(_) if seen_gap => {
                return Err(invalid(format!(
                    "{} given without a coarser component",
                    DateTimePrecision::ALL[index]
                )));
            }
            Some(v) => {
                let max = field_max(index, fields);
                if *v < field_min(index) || *v > max {
                    return Err(invalid(format!(
                        "{} {v} outside {}..={max}",
                        DateTimePrecision::ALL[index],
                        field_min(index)
                    )));
                }
            }
        }
    }
    Ok(())
}

fn padded_naive(fields: &Fields) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(
        fields[0]?,
        u32::try_from(fields[1].unwrap_or(1)).ok()?,
        u32::try_from(fields[2].unwrap_or(1)).ok()?,
    )?;
    let clock = |i: usize| u32::try_from(fields[i].unwrap_or(0)).ok();
    let time = NaiveTime::from_hms_milli_opt(clock(3)?, clock(4)?, clock(5)?, clock(6)?)?;
    Some(date.and_time(time))
}

fn naive_fields(value: NaiveDateTime) -> Fields {
    let as_i32 = |v: u32| i32::try_from(v).ok();
    [
        Some(value.year()),
        as_i32(value.month()),
        as_i32(value.day()),
        as_i32(value.hour()),
        as_i32(value.minute()),
        as_i32(value.second()),
        as_i32(value.nanosecond() / 1_000_000),
    ]
}

fn time_of_day_ms(fields: &Fields) -> i64 {
    let part = |i: usize| i64::from(fields[i].unwrap_or(0));
    ((part(3) * 60 + part(4)) * 60 + part(5)) * 1000 + part(6)
}

fn fields_from_time_ms(ms: i64) -> Fields {
    let as_i32 = |v: i64| i32::try_from(v).ok();
    [
        None,
        None,
        None,
        as_i32(ms / 3_600_000),
        as_i32(ms / 60_000 % 60),
        as_i32(ms / 1000 % 60),
        as_i32(ms % 1000),
    ]
}

/// Re-express `amount` of `unit` at `precision` when the unit is finer than
/// the value; finer parts are truncated.
fn align_amount(amount: i64, unit: TemporalUnit, precision: DateTimePrecision) -> (i64, DateTimePrecision) {
    let (mut amount, mut step) = match unit {
        TemporalUnit::Week => (amount.saturating_mul(7), DateTimePrecision::Day),
        other => (amount, other.precision()),
    };
    while step > precision {
        amount /= step.per_coarser();
        step = step.coarser();
    }
    (amount, step)
}

fn shift(fields: &Fields, first: usize, amount: i64, unit: TemporalUnit) -> ValueResult<Fields> {
    let out_of_range = ValueError::OutOfRange { operation: "Add" };
    let precision = precision_of(fields);
    let (amount, step) = align_amount(amount, unit, precision);
    if first > 0 {
        return Err(ValueError::mismatch("Add", "Time", step.plural()));
    }

    let mut shifted = *fields;
    match step {
        DateTimePrecision::Year | DateTimePrecision::Month => {
            let months = if step == DateTimePrecision::Year {
                amount.checked_mul(12).ok_or(out_of_range.clone())?
            } else {
                amount
            };
            let start = i64::from(fields[0].unwrap_or(1)) * 12 + i64::from(fields[1].unwrap_or(1)) - 1;
            let target = start.checked_add(months).ok_or(out_of_range.clone())?;
            shifted[0] = i32::try_from(target.div_euclid(12)).ok();
            if fields[1].is_some() {
                shifted[1] = i32::try_from(target.rem_euclid(12) + 1).ok();
            }
            if let (Some(year), Some(month), Some(day)) = (shifted[0], shifted[1], shifted[2]) {
                shifted[2] = Some(day.min(days_in_month(year, month)));
            }
        }
        _ => {
            let base = padded_naive(fields).ok_or(out_of_range.clone())?;
            let step_ms = step.millis().unwrap_or(1);
            let delta = amount.checked_mul(step_ms).ok_or(out_of_range.clone())?;
            let moved = base
                .checked_add_signed(Duration::milliseconds(delta))
                .ok_or(out_of_range.clone())?;
            shifted = mask(naive_fields(moved), precision);
        }
    }

    match shifted[0] {
        Some(year) if (1..=9999).contains(&year) => Ok(shifted),
        _ => Err(out_of_range),
    }
}

// ---------------------------------------------------------------------------
// Parsing and formatting
// ---------------------------------------------------------------------------

fn digits(input: &str, count: usize) -> Option<(i32, &str)> {
    let head = input.get(..count)?;
    if !head.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Some((head.parse().ok()?, &input[count..]))
}

fn parse_date_part(input: &str) -> Option<([Option<i32>; 3], &str)> {
    let mut out = [None; 3];
    let (year, mut rest) = digits(input, 4)?;
    out[0] = Some(year);
    for slot in out.iter_mut().skip(1) {
        match rest.strip_prefix('-') {
            Some(after) => {
                let (value, after) = digits(after, 2)?;
                *slot = Some(value);
                rest = after;
            }
            None => break,
        }
    }
    Some((out, rest))
}

fn parse_time_part(input: &str) -> Option<([Option<i32>; 4], &str)> {
    let mut out = [None; 4];
    let (hour, mut rest) = digits(input, 2)?;
    out[0] = Some(hour);
    for slot in out.iter_mut().skip(1).take(2) {
        match rest.strip_prefix(':') {
            Some(after) => {
                let (value, after) = digits(after, 2)?;
                *slot = Some(value);
                rest = after;
            }
            None => return Some((out, rest)),
        }
    }
    if out[2].is_some() {
        if let Some(after) = rest.strip_prefix('.') {
            let len = after.bytes().take_while(u8::is_ascii_digit).count();
            if !(1..=3).contains(&len) {
                return None;
            }
            let (fraction, after) = digits(after, len)?;
            out[3] = Some(fraction * 10_i32.pow(3 - len as u32));
            rest = after;
        }
    }
    Some((out, rest))
}

/// Parses `Z`, `(+|-)hh:mm` or `(+|-)hh`; absence yields `None`
fn parse_offset(input: &str) -> Option<(Option<i16>, &str)> {
    if let Some(rest) = input.strip_prefix('Z') {
        return Some((Some(0), rest));
    }
    let sign = match input.chars().next() {
        Some('+') => 1,
        Some('-') => -1,
        _ => return Some((None, input)),
    };
    let (hours, rest) = digits(&input[1..], 2)?;
    let (minutes, rest) = match rest.strip_prefix(':') {
        Some(after) => digits(after, 2)?,
        None => (0, rest),
    };
    if minutes > 59 {
        return None;
    }
    let total = i16::try_from(sign * (hours * 60 + minutes)).ok()?;
    Some((Some(total), rest))
}

fn write_date(f: &mut fmt::Formatter<'_>, fields: &Fields) -> fmt::Result {
    write!(f, "{:04}", fields[0].unwrap_or(1))?;
    for value in fields[1..3].iter().map_while(|v| *v) {
        write!(f, "-{value:02}")?;
    }
    Ok(())
}

fn write_time(f: &mut fmt::Formatter<'_>, fields: &Fields) -> fmt::Result {
    let Some(hour) = fields[3] else {
        return Ok(());
    };
    write!(f, "{hour:02}")?;
    for value in fields[4..6].iter().map_while(|v| *v) {
        write!(f, ":{value:02}")?;
    }
    if let (Some(_), Some(ms)) = (fields[5], fields[6]) {
        write!(f, ".{ms:03}")?;
    }
    Ok(())
}
