use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProtocolError;

/// Top-level method namespaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IpcRoutes {
    /// Backend agent process.
    Agent,
    /// Embedding IDE host.
    Host,
    /// The webview itself.
    Webview,
}

impl IpcRoutes {
    pub const fn as_str(self) -> &'static str {
        match self {
            IpcRoutes::Agent => "codestream",
            IpcRoutes::Host => "host",
            IpcRoutes::Webview => "webview",
        }
    }
}

/// A request the webview sends and the host answers.
pub trait RequestType: 'static {
    const METHOD: &'static str;
    type Params: Serialize;
    type Response: DeserializeOwned + Send + 'static;
}

/// A fire-and-forget message, in either direction.
pub trait NotificationType: 'static {
    const METHOD: &'static str;
    type Params: Serialize + DeserializeOwned;
}

// Host → Webview and Webview → Host, before classification
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

pub fn is_request(msg: &RawMessage) -> bool {
    msg.method.is_some() && msg.id.is_some()
}

pub fn is_response(msg: &RawMessage) -> bool {
    msg.method.is_none() && msg.id.is_some()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationMessage {
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMessage {
    pub id: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseMessage {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<Value>,
}

/// A classified message. Serializes to the bare wire shape of its variant.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Envelope {
    Request(RequestMessage),
    Response(ResponseMessage),
    Notification(NotificationMessage),
}

impl Envelope {
    /// Parses a JSON value into one of the three shapes.
    pub fn parse(value: Value) -> Result<Self, ProtocolError> {
        let raw: RawMessage = serde_json::from_value(value)?;
        Self::classify(raw)
    }

    pub fn classify(raw: RawMessage) -> Result<Self, ProtocolError> {
        match raw {
            RawMessage {
                id: Some(id),
                method: Some(method),
                params,
                ..
            } => Ok(Envelope::Request(RequestMessage { id, method, params })),
            RawMessage {
                id: Some(id),
                method: None,
                params,
                error,
            } => Ok(Envelope::Response(ResponseMessage { id, params, error })),
            RawMessage {
                id: None,
                method: Some(method),
                params,
                ..
            } => Ok(Envelope::Notification(NotificationMessage { method, params })),
            RawMessage {
                id: None,
                method: None,
                ..
            } => Err(ProtocolError::Unclassifiable),
        }
    }

    pub fn method(&self) -> Option<&str> {
        match self {
            Envelope::Request(m) => Some(&m.method),
            Envelope::Notification(m) => Some(&m.method),
            Envelope::Response(_) => None,
        }
    }
}
