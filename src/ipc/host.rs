use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::protocol::RequestType;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Position {
    pub line: u32,
    pub character: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Range {
    pub start: Position,
    pub end: Position,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapSession {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub otc: Option<String>,
    #[serde(default, rename = "userId", skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BootstrapInHostResponse {
    #[serde(default)]
    pub capabilities: Value,
    #[serde(default)]
    pub configs: Map<String, Value>,
    pub version: String,
    #[serde(default)]
    pub context: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub env: Option<Value>,
    #[serde(default)]
    pub session: BootstrapSession,
}

pub enum BootstrapInHostRequest {}

impl RequestType for BootstrapInHostRequest {
    const METHOD: &'static str = "host/bootstrap";
    type Params = ();
    type Response = BootstrapInHostResponse;
}

pub enum LogoutRequest {}

impl RequestType for LogoutRequest {
    const METHOD: &'static str = "host/logout";
    type Params = Map<String, Value>;
    type Response = Value;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginSsoParams {
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<String>,
}

pub enum LoginSsoRequest {}

impl RequestType for LoginSsoRequest {
    const METHOD: &'static str = "host/login/sso";
    type Params = LoginSsoParams;
    type Response = Value;
}

pub enum ReloadWebviewRequest {}

impl RequestType for ReloadWebviewRequest {
    const METHOD: &'static str = "host/webview/reload";
    type Params = ();
    type Response = ();
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateConfigurationParams {
    pub name: String,
    pub value: Value,
}

pub enum UpdateConfigurationRequest {}

impl RequestType for UpdateConfigurationRequest {
    const METHOD: &'static str = "host/configuration/update";
    type Params = UpdateConfigurationParams;
    type Response = Value;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetActiveEditorContextResponse {
    pub editor_context: Value,
}

pub enum GetActiveEditorContextRequest {}

impl RequestType for GetActiveEditorContextRequest {
    const METHOD: &'static str = "host/editor/context";
    type Params = ();
    type Response = GetActiveEditorContextResponse;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorHighlightRangeParams {
    pub uri: String,
    #[serde(default, rename = "ref", skip_serializing_if = "Option::is_none")]
    pub reference: Option<String>,
    pub range: Range,
    pub highlight: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorActionResponse {
    pub success: bool,
}

pub enum EditorHighlightRangeRequest {}

impl RequestType for EditorHighlightRangeRequest {
    const METHOD: &'static str = "host/editor/range/highlight";
    type Params = EditorHighlightRangeParams;
    type Response = EditorActionResponse;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditorRevealSymbolParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_filepath: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_function: Option<String>,
    pub language: String,
}

pub enum EditorRevealSymbolRequest {}

impl RequestType for EditorRevealSymbolRequest {
    const METHOD: &'static str = "host/editor/symbol/reveal";
    type Params = EditorRevealSymbolParams;
    type Response = EditorActionResponse;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarkerParams {
    pub marker: Value,
}

pub enum CompareMarkerRequest {}

impl RequestType for CompareMarkerRequest {
    const METHOD: &'static str = "host/marker/compare";
    type Params = MarkerParams;
    type Response = Value;
}

pub enum ApplyMarkerRequest {}

impl RequestType for ApplyMarkerRequest {
    const METHOD: &'static str = "host/marker/apply";
    type Params = MarkerParams;
    type Response = Value;
}
