use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ipc::host::Range;
use crate::protocol::NotificationType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEditor {
    pub uri: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selections: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible_ranges: Option<Vec<Range>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostDidChangeActiveEditorParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<ActiveEditor>,
}

pub enum HostDidChangeActiveEditorNotification {}

impl NotificationType for HostDidChangeActiveEditorNotification {
    const METHOD: &'static str = "webview/editor/didChangeActive";
    type Params = HostDidChangeActiveEditorParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDidChangeEditorSelectionParams {
    pub uri: String,
    #[serde(default)]
    pub selections: Vec<Value>,
    #[serde(default)]
    pub visible_ranges: Vec<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u32>,
}

pub enum HostDidChangeEditorSelectionNotification {}

impl NotificationType for HostDidChangeEditorSelectionNotification {
    const METHOD: &'static str = "webview/editor/didChangeSelection";
    type Params = HostDidChangeEditorSelectionParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HostDidChangeEditorVisibleRangesParams {
    pub uri: String,
    #[serde(default)]
    pub selections: Vec<Value>,
    #[serde(default)]
    pub visible_ranges: Vec<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_count: Option<u32>,
}

pub enum HostDidChangeEditorVisibleRangesNotification {}

impl NotificationType for HostDidChangeEditorVisibleRangesNotification {
    const METHOD: &'static str = "webview/editor/didChangeVisibleRanges";
    type Params = HostDidChangeEditorVisibleRangesParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewCodemarkParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_codemark_text: Option<String>,
}

pub enum NewCodemarkNotification {}

impl NotificationType for NewCodemarkNotification {
    const METHOD: &'static str = "webview/codemark/new";
    type Params = NewCodemarkParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReviewParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<Range>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_latest_commit: Option<bool>,
}

pub enum NewReviewNotification {}

impl NotificationType for NewReviewNotification {
    const METHOD: &'static str = "webview/review/new";
    type Params = NewReviewParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowCodemarkParams {
    pub codemark_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

pub enum ShowCodemarkNotification {}

impl NotificationType for ShowCodemarkNotification {
    const METHOD: &'static str = "webview/codemark/show";
    type Params = ShowCodemarkParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowReviewParams {
    pub review_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_first_diff: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_uri: Option<String>,
}

pub enum ShowReviewNotification {}

impl NotificationType for ShowReviewNotification {
    const METHOD: &'static str = "webview/review/show";
    type Params = ShowReviewParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowStreamParams {
    pub stream_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codemark_id: Option<String>,
}

pub enum ShowStreamNotification {}

impl NotificationType for ShowStreamNotification {
    const METHOD: &'static str = "webview/stream/show";
    type Params = ShowStreamParams;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShowProgressIndicatorParams {
    pub progress_status: bool,
}

pub enum ShowProgressIndicatorNotification {}

impl NotificationType for ShowProgressIndicatorNotification {
    const METHOD: &'static str = "webview/system/progressIndicator";
    type Params = ShowProgressIndicatorParams;
}
