//! Retrieve Evaluation
//!
//! A `Retrieve` is turned into a [`RetrieveRequest`] and handed to the data
//! provider registered for the data type's model. The engine evaluates the
//! code and date filters; the provider applies them.

use crate::context::EvaluationContext;
use crate::engine::CqlEngine;
use crate::error::{DataAccessError, EvalError, EvalResult};
use crate::operators::clinical::{codes_of, vocabulary_ref};
use crate::provider::{CodeFilter, RetrieveContext, RetrieveRequest};
use log::debug;
use octofhir_elm_model::expression::Retrieve;
use octofhir_elm_types::{CqlList, CqlType, CqlValue};
use std::sync::Arc;

/// Split `{uri}Name` or `Model.Name` into the model part and the type name
fn split_data_type(data_type: &str) -> (Option<&str>, &str) {
    if let Some(rest) = data_type.strip_prefix('{') {
        if let Some((uri, name)) = rest.split_once('}') {
            return (Some(uri), name);
        }
    }
    match data_type.split_once('.') {
        Some((model, name)) => (Some(model), name),
        None => (None, data_type),
    }
}

impl CqlEngine {
    pub(crate) fn eval_retrieve(&self, retrieve: &Retrieve, ctx: &mut EvaluationContext) -> EvalResult<CqlValue> {
        let (model, data_type) = split_data_type(&retrieve.data_type);
        let model_uri = Self::model_uri(model, data_type, ctx)?;

        let mut request = RetrieveRequest::new(model_uri.as_str(), data_type);
        request.template_id = retrieve.template_id.clone();
        request.code_property = retrieve.code_property.clone();
        request.date_property = retrieve.date_property.clone();
        request.context = ctx.context_value().map(|value| RetrieveContext {
            name: retrieve
                .context
                .clone()
                .unwrap_or_else(|| ctx.options().context_name.clone()),
            value: value.clone(),
        });

        if let Some(codes) = &retrieve.codes {
            let codes = self.evaluate(codes, ctx)?;
            if codes.is_null() {
                return Ok(CqlValue::List(CqlList::empty(CqlType::named(Some(&model_uri), data_type))));
            }
            request.codes = Some(self.code_filter(&codes, ctx)?);
        }
        if let Some(range) = &retrieve.date_range {
            request.date_range = match self.evaluate(range, ctx)? {
                CqlValue::Null => None,
                CqlValue::Interval(interval) => Some(interval),
                other => {
                    return Err(EvalError::type_mismatch("Retrieve", "Interval", other.type_name()));
                }
            };
        }

        let provider = ctx
            .data_provider(&model_uri)
            .map(Arc::clone)
            .ok_or_else(|| {
                DataAccessError::new(data_type, format!("no data provider registered for '{model_uri}'"))
            })?;
        debug!("retrieve {data_type} from {model_uri}");
        let records = provider.retrieve(&request)?;
        debug!("retrieve {data_type} returned {} records", records.len());

        Ok(CqlValue::List(CqlList::new(
            CqlType::named(Some(&model_uri), data_type),
            records,
        )))
    }

    /// Namespace URI of the model: given inline, through a `using`
    /// declaration, or the only registered provider's
    fn model_uri(model: Option<&str>, data_type: &str, ctx: &EvaluationContext) -> EvalResult<String> {
        if let Some(model) = model {
            if ctx.data_provider(model).is_some() {
                return Ok(model.to_string());
            }
            if let Some(uri) = ctx.library().using_uri(model) {
                return Ok(uri.to_string());
            }
        }
        ctx.sole_data_provider()
            .map(|(uri, _)| uri.to_string())
            .ok_or_else(|| {
                DataAccessError::new(data_type, "cannot determine which data provider serves this type")
                    .into()
            })
    }

    /// A value set becomes a code list when a terminology provider can
    /// expand it; otherwise it is passed through to the data provider
    fn code_filter(&self, codes: &CqlValue, ctx: &EvaluationContext) -> EvalResult<CodeFilter> {
        let value_set = match codes {
            CqlValue::String(_) | CqlValue::Tuple(_) => vocabulary_ref(codes)?,
            _ => None,
        };
        let Some(value_set) = value_set else {
            return Ok(CodeFilter::Codes(codes_of(codes)?));
        };
        match ctx.terminology() {
            Some(terminology) => {
                debug!("expanding value set {}", value_set.id);
                Ok(CodeFilter::Codes(terminology.expand_value_set(&value_set)?))
            }
            None => Ok(CodeFilter::ValueSet(value_set)),
        }
    }
}
