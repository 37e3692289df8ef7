use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::RequestType;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryRequestParams {
    /// Name of the tracked event, e.g. `"Page Viewed"`.
    pub event_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<Map<String, Value>>,
}

pub enum TelemetryRequest {}

impl RequestType for TelemetryRequest {
    const METHOD: &'static str = "codestream/telemetry";
    type Params = TelemetryRequestParams;
    type Response = ();
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportingMessageType {
    Error,
    Warning,
    Info,
    Debug,
    Fatal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportMessageRequestParams {
    #[serde(rename = "type")]
    pub kind: ReportingMessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// `"webview"`, `"extension"` or `"agent"`.
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

pub enum ReportMessageRequest {}

impl RequestType for ReportMessageRequest {
    const METHOD: &'static str = "codestream/reporting/message";
    type Params = ReportMessageRequestParams;
    type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiGetParams {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub param_data: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiBodyParams {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiDeleteParams {
    pub url: String,
}

// The API proxies answer with whatever the server returned, hence the
// caller-chosen response type.
pub struct ApiGetRequest<R>(PhantomData<fn() -> R>);
pub struct ApiPostRequest<R>(PhantomData<fn() -> R>);
pub struct ApiPutRequest<R>(PhantomData<fn() -> R>);
pub struct ApiDeleteRequest<R>(PhantomData<fn() -> R>);

impl<R: DeserializeOwned + Send + 'static> RequestType for ApiGetRequest<R> {
    const METHOD: &'static str = "codestream/api/get";
    type Params = ApiGetParams;
    type Response = R;
}

impl<R: DeserializeOwned + Send + 'static> RequestType for ApiPostRequest<R> {
    const METHOD: &'static str = "codestream/api/post";
    type Params = ApiBodyParams;
    type Response = R;
}

impl<R: DeserializeOwned + Send + 'static> RequestType for ApiPutRequest<R> {
    const METHOD: &'static str = "codestream/api/put";
    type Params = ApiBodyParams;
    type Response = R;
}

impl<R: DeserializeOwned + Send + 'static> RequestType for ApiDeleteRequest<R> {
    const METHOD: &'static str = "codestream/api/delete";
    type Params = ApiDeleteParams;
    type Response = R;
}
