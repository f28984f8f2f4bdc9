use serde::{Deserialize, Deserializer};
use serde_json::{json, Value};

use crate::method::Method;

/// Parameter and callback stub decoded from an inbound call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Signature {
    pub parameter: Option<Value>,
    pub callback_function_name: Option<String>,
}

impl Signature {
    pub fn new(parameter: Option<Value>, callback_function_name: Option<String>) -> Self {
        Self {
            parameter,
            callback_function_name,
        }
    }

    /// A call without a callback stub expects its result in the same round trip.
    pub fn indicates_synchronous_call(&self) -> bool {
        self.callback_function_name.is_none()
    }
}

/// A call from the scripted side, ready to be dispatched.
#[derive(Debug, Clone, PartialEq)]
pub struct IncomingInvocation {
    pub method: Method,
    pub signature: Signature,
}

impl IncomingInvocation {
    pub fn new(method: Method, signature: Signature) -> Self {
        Self { method, signature }
    }

    pub fn is_synchronous(&self) -> bool {
        self.signature.indicates_synchronous_call()
    }
}

/// Outcome of a dispatch, as seen on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseCode {
    Unhandled = -1,
    Success = 0,
}

/// Immediate answer to a scripted-side call.
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub code: ResponseCode,
    pub data: Value,
}

impl Response {
    pub const CODE_KEY: &'static str = "code";
    pub const DATA_KEY: &'static str = "data";

    /// Wire text of [`Response::empty`].
    pub const EMPTY_JSON: &'static str = r#"{"code":-1,"data":""}"#;

    /// Absent (or null) data is carried as an empty string.
    pub fn new(code: ResponseCode, data: Option<Value>) -> Self {
        Self {
            code,
            data: present_or_empty(data),
        }
    }

    pub fn success(data: Option<Value>) -> Self {
        Self::new(ResponseCode::Success, data)
    }

    /// The unhandled sentinel, also returned for asynchronous calls whose
    /// result is delivered later.
    pub fn empty() -> Self {
        Self::new(ResponseCode::Unhandled, None)
    }

    pub fn to_value(&self) -> Value {
        let mut object = serde_json::Map::new();
        object.insert(Self::CODE_KEY.to_string(), json!(self.code as i32));
        object.insert(Self::DATA_KEY.to_string(), self.data.clone());
        Value::Object(object)
    }
}

/// A deferred result destined for a callback stub on the scripted side.
#[derive(Debug, Clone, PartialEq)]
pub struct AsyncResponse {
    pub function_name: String,
    pub data: Value,
    /// When set, the stub may be deleted after this delivery.
    pub completed: bool,
}

impl AsyncResponse {
    pub fn new(function_name: impl Into<String>, data: Option<Value>, completed: bool) -> Self {
        Self {
            function_name: function_name.into(),
            data: present_or_empty(data),
            completed,
        }
    }
}

/// A response from the scripted side to a host-initiated call.
///
/// Absent or `null` data is carried as `""`, as in [`Response`].
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Callback {
    pub id: u64,
    #[serde(default = "empty_data", deserialize_with = "deserialize_data")]
    pub data: Value,
    #[serde(rename = "complete")]
    pub completed: bool,
}

impl Callback {
    pub fn new(id: u64, data: Value, completed: bool) -> Self {
        Self {
            id,
            data: present_or_empty(Some(data)),
            completed,
        }
    }
}

fn empty_data() -> Value {
    Value::String(String::new())
}

fn deserialize_data<'de, D>(deserializer: D) -> Result<Value, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<Value>::deserialize(deserializer).map(present_or_empty)
}

fn present_or_empty(data: Option<Value>) -> Value {
    match data {
        Some(Value::Null) | None => Value::String(String::new()),
        Some(value) => value,
    }
}
