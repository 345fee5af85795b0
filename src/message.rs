//! Wire messages exchanged between frames.
//!
//! # Wire Format
//!
//! ```text
//! Request:  { "type": "requestUrlParams", "source": "TopParamsReader" }
//! Response: { "type": "urlParams", "params": { "a": "1", "b": "2" } }
//! ```
//!
//! `type` is the only discriminator. Anything that does not decode into a
//! [`RelayMessage`] is malformed and must be ignored by the receiver; the
//! message channel is shared with arbitrary page code.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::constants::{REQUEST_SOURCE_TAG, REQUEST_TYPE, RESPONSE_TYPE};
use crate::error::{RelayError, Result};
use crate::params::ParameterSet;

/// A message of the parameter relay protocol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RelayMessage {
    /// Ask the receiving frame for its page parameters.
    #[serde(rename = "requestUrlParams")]
    RequestUrlParams {
        /// Free-form tag naming the requester.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        source: Option<String>,
    },
    /// Page parameters of the sending frame.
    #[serde(rename = "urlParams")]
    UrlParams {
        /// Full replacement parameter set.
        params: ParameterSet,
    },
}

impl RelayMessage {
    /// Request tagged with the Reader's source tag.
    pub fn request() -> Self {
        Self::request_from(REQUEST_SOURCE_TAG)
    }

    /// Request tagged with a custom source tag.
    pub fn request_from(source: impl Into<String>) -> Self {
        Self::RequestUrlParams {
            source: Some(source.into()),
        }
    }

    /// Response carrying `params`.
    pub fn response(params: ParameterSet) -> Self {
        Self::UrlParams { params }
    }

    /// Validate received data.
    ///
    /// # Errors
    ///
    /// Returns [`RelayError::MalformedMessage`] for non-objects, unknown or
    /// missing `type` values, and responses whose `params` is not a flat
    /// object of strings.
    pub fn parse(data: &Value) -> Result<Self> {
        let object = data
            .as_object()
            .ok_or_else(|| RelayError::malformed(format!("expected object, got {}", kind_of(data))))?;

        match object.get("type").and_then(Value::as_str) {
            Some(REQUEST_TYPE) | Some(RESPONSE_TYPE) => {}
            Some(other) => return Err(RelayError::malformed(format!("unknown type {other:?}"))),
            None => return Err(RelayError::malformed("missing type")),
        }

        Self::deserialize(data).map_err(RelayError::malformed)
    }

    /// Encode as a JSON value for posting.
    pub fn to_value(&self) -> Value {
        // Both variants are plain maps of strings.
        serde_json::to_value(self).unwrap_or(Value::Null)
    }

    /// Wire discriminator of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RequestUrlParams { .. } => REQUEST_TYPE,
            Self::UrlParams { .. } => RESPONSE_TYPE,
        }
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
