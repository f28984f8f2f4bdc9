//! JSON reading and writing at the bridge boundary.
//!
//! Inbound call envelopes are read with a relaxed JSON5 grammar (unquoted
//! keys, trailing commas, single quotes). Outbound values are written as
//! strict JSON so the scripted side can always `JSON.parse` them.

use serde::Serialize;
use serde_json::Value;

use crate::error::{ReadingError, WritingError};
use crate::invocation::Signature;

/// Key of the parameter in an inbound call envelope.
pub const PARAMETER_KEY: &str = "data";

/// Key of the callback stub name in an inbound call envelope.
pub const CALLBACK_KEY: &str = "_dscbstub";

pub trait JsonSerializing: Send + Sync {
    /// Read the parameter and callback stub out of an inbound call envelope.
    ///
    /// Absent text means a call with neither parameter nor callback.
    fn decode_signature(&self, text: Option<&str>) -> Result<Signature, ReadingError>;

    fn encode(&self, value: &Value) -> Result<String, WritingError>;

    /// Convert any serializable host value and encode it.
    fn encode_serializable<T: Serialize + ?Sized>(&self, value: &T) -> Result<String, WritingError>
    where
        Self: Sized,
    {
        let value = serde_json::to_value(value)?;
        self.encode(&value)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl JsonSerializer {
    /// Same as [`JsonSerializing::decode_signature`] for text that has not
    /// been validated as UTF-8 yet.
    pub fn decode_signature_bytes(&self, raw: &[u8]) -> Result<Signature, ReadingError> {
        let text = std::str::from_utf8(raw).map_err(|_| {
            ReadingError::InvalidCallingFromScript(String::from_utf8_lossy(raw).into_owned())
        })?;
        self.decode_signature(Some(text))
    }

    fn encode_container(value: &Value) -> Result<String, WritingError> {
        let bytes = serde_json::to_vec(value)?;
        String::from_utf8(bytes).map_err(|_| WritingError::FailedToEncode(value.clone()))
    }
}

impl JsonSerializing for JsonSerializer {
    fn decode_signature(&self, text: Option<&str>) -> Result<Signature, ReadingError> {
        let Some(text) = text else {
            return Ok(Signature::default());
        };

        let decoded: Value = json5::from_str(text)?;
        let Value::Object(mut envelope) = decoded else {
            return Err(ReadingError::InvalidCallingFromScript(text.to_string()));
        };

        let parameter = match envelope.remove(PARAMETER_KEY) {
            Some(Value::Null) | None => None,
            Some(value) => Some(value),
        };
        let callback_function_name = match envelope.remove(CALLBACK_KEY) {
            Some(Value::String(name)) => Some(name),
            _ => None,
        };

        Ok(Signature::new(parameter, callback_function_name))
    }

    fn encode(&self, value: &Value) -> Result<String, WritingError> {
        match value {
            Value::Object(_) | Value::Array(_) => Self::encode_container(value),
            Value::Bool(flag) => Ok(flag.to_string()),
            Value::Number(number) => Ok(number.to_string()),
            // quoted and escaped
            Value::String(_) => Ok(serde_json::to_string(value)?),
            Value::Null => Err(WritingError::InvalidObject(value.clone())),
        }
    }
}
