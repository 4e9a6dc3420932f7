//! Evaluation options
//!
//! Options are plain data: they can be built in code, taken from
//! `Default`, or read from a JSON document such as
//!
//! ```json
//! { "maxRecursionDepth": 128, "defaultTimezoneOffset": -300 }
//! ```

use crate::error::ConfigError;
use chrono::{Local, Offset};
use octofhir_elm_types::CqlDateTime;
use serde::{Deserialize, Serialize};

const MAX_OFFSET_MINUTES: i16 = 14 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvaluationOptions {
    /// Deepest nesting of node evaluations before `RecursionLimit`
    pub max_recursion_depth: usize,
    /// Zone, in minutes east of UTC, given to temporal values written
    /// without one; the host clock's zone when absent
    pub default_timezone_offset: Option<i16>,
    /// Fixed `Now()` for the run; the wall clock when absent
    pub evaluation_timestamp: Option<String>,
    /// Keep definition results for the rest of the run
    pub cache_expression_results: bool,
    /// Name of the context definitions are evaluated in
    pub context_name: String,
}

impl Default for EvaluationOptions {
    fn default() -> Self {
        Self {
            max_recursion_depth: 256,
            default_timezone_offset: None,
            evaluation_timestamp: None,
            cache_expression_results: true,
            context_name: "Patient".to_string(),
        }
    }
}

impl EvaluationOptions {
    /// Parse and validate an options document
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let options: Self = serde_json::from_str(json).map_err(|e| ConfigError::Parse {
            message: e.to_string(),
        })?;
        options.validate()?;
        Ok(options)
    }

    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.evaluation_timestamp = Some(timestamp.into());
        self
    }

    pub fn with_timezone_offset(mut self, minutes: i16) -> Self {
        self.default_timezone_offset = Some(minutes);
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_recursion_depth == 0 {
            return Err(ConfigError::ZeroRecursionDepth);
        }
        if let Some(minutes) = self.default_timezone_offset {
            if minutes.abs() > MAX_OFFSET_MINUTES {
                return Err(ConfigError::InvalidTimezoneOffset { minutes });
            }
        }
        if let Some(value) = &self.evaluation_timestamp {
            CqlDateTime::parse(value).map_err(|_| ConfigError::InvalidTimestamp {
                value: value.clone(),
            })?;
        }
        Ok(())
    }

    /// Configured zone, or the host clock's current zone
    pub fn timezone_offset(&self) -> i16 {
        self.default_timezone_offset.unwrap_or_else(|| {
            let seconds = Local::now().offset().fix().local_minus_utc();
            i16::try_from(seconds / 60).unwrap_or(0)
        })
    }
}
