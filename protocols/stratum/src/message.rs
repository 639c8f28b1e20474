//! Wire types for the line-delimited JSON stratum dialect (§6): requests
//! flow client -> server, responses and notifications flow server -> client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Method names recognized in a client [`Request`]. Anything else is parsed
/// into [`Method::Other`] and silently ignored by the session handler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Method {
    Hello,
    Subscribe,
    Authorize,
    Submit,
    Bye,
    Other(String),
}

impl Method {
    pub const HELLO: &'static str = "mining.hello";
    pub const SUBSCRIBE: &'static str = "mining.subscribe";
    pub const AUTHORIZE: &'static str = "mining.authorize";
    pub const SUBMIT: &'static str = "mining.submit";
    pub const BYE: &'static str = "mining.bye";
    pub const SET: &'static str = "mining.set";
    pub const NOTIFY: &'static str = "mining.notify";
}

impl From<&str> for Method {
    fn from(s: &str) -> Self {
        match s {
            Self::HELLO => Method::Hello,
            Self::SUBSCRIBE => Method::Subscribe,
            Self::AUTHORIZE => Method::Authorize,
            Self::SUBMIT => Method::Submit,
            Self::BYE => Method::Bye,
            other => Method::Other(other.to_string()),
        }
    }
}

/// A request read from a stratum session: `{"id": <u32>, "method": <str>, "params": <...>}`.
#[derive(Debug, Clone, Deserialize)]
pub struct Request {
    pub id: u32,
    pub method: String,
    #[serde(default)]
    pub params: Value,
}

impl Request {
    pub fn method(&self) -> Method {
        Method::from(self.method.as_str())
    }

    /// `params` as an array, treating a missing/non-array value as empty.
    /// The dialect only ever sends positional array params.
    pub fn params_array(&self) -> &[Value] {
        match &self.params {
            Value::Array(values) => values.as_slice(),
            _ => &[],
        }
    }

    pub fn param_str(&self, index: usize) -> Option<&str> {
        self.params_array().get(index).and_then(Value::as_str)
    }
}

/// `{"code": <int>, "message": <str>}`.
#[derive(Debug, Clone, Serialize)]
pub struct StratumError {
    pub code: i32,
    pub message: String,
}

impl StratumError {
    pub const BAD_JOB_ID: i32 = 500;
    pub const INVALID_NONCE_PARAMETER: i32 = 405;
    pub const BAD_NONCE: i32 = 406;
    /// Generic policy/authorization rejection (invalid login, submit before
    /// authorize, etc), mirroring the original proxy's `ErrorReply{Code: -1}`.
    pub const GENERIC: i32 = -1;

    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn bad_job_id() -> Self {
        Self::new(Self::BAD_JOB_ID, "Bad jobID")
    }

    pub fn invalid_nonce_parameter() -> Self {
        Self::new(Self::INVALID_NONCE_PARAMETER, "Invalid nonce parameter")
    }

    pub fn bad_nonce() -> Self {
        Self::new(Self::BAD_NONCE, "Bad nonce")
    }

    pub fn not_authorized() -> Self {
        Self::new(Self::GENERIC, "Not authorized")
    }

    pub fn invalid_login() -> Self {
        Self::new(Self::GENERIC, "Invalid login")
    }
}

/// `{"id": <u32>, "result": <value>, "error": <null|object>}`.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub id: u32,
    pub result: Value,
    pub error: Option<StratumError>,
}

impl Response {
    pub fn ok(id: u32, result: impl Into<Value>) -> Self {
        Self {
            id,
            result: result.into(),
            error: None,
        }
    }

    pub fn err(id: u32, error: StratumError) -> Self {
        Self {
            id,
            result: Value::Null,
            error: Some(error),
        }
    }
}

/// `{"method": <str>, "params": <value>}`, no `id`.
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub method: String,
    pub params: Value,
}

impl Notification {
    pub fn new(method: &str, params: impl Into<Value>) -> Self {
        Self {
            method: method.to_string(),
            params: params.into(),
        }
    }
}

/// Anything the session handler may write back down the wire.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ServerMessage {
    Response(Response),
    Notification(Notification),
}

impl From<Response> for ServerMessage {
    fn from(response: Response) -> Self {
        ServerMessage::Response(response)
    }
}

impl From<Notification> for ServerMessage {
    fn from(notification: Notification) -> Self {
        ServerMessage::Notification(notification)
    }
}
