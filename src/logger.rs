use std::fmt;
use std::sync::Weak;

use tracing::error;

use crate::host_api::HostApi;
use crate::ipc::agent::{ReportMessageRequest, ReportMessageRequestParams, ReportingMessageType};

/// An error value or a plain message handed to an [`ErrorSink`].
#[derive(Debug)]
pub enum ReportedError {
    Error(anyhow::Error),
    Message(String),
}

impl fmt::Display for ReportedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReportedError::Error(e) => write!(f, "{e:#}"),
            ReportedError::Message(m) => f.write_str(m),
        }
    }
}

impl From<anyhow::Error> for ReportedError {
    fn from(e: anyhow::Error) -> Self {
        ReportedError::Error(e)
    }
}

impl From<String> for ReportedError {
    fn from(m: String) -> Self {
        ReportedError::Message(m)
    }
}

impl From<&str> for ReportedError {
    fn from(m: &str) -> Self {
        ReportedError::Message(m.to_string())
    }
}

/// Destination for anomalies that are reported but never thrown.
pub trait ErrorSink: Send + Sync {
    fn log_error(&self, error: ReportedError);
}

pub struct TracingErrorSink;

impl ErrorSink for TracingErrorSink {
    fn log_error(&self, error: ReportedError) {
        error!("{error}");
    }
}

/// Logs locally and forwards the report to the host's error reporter.
pub struct HostReportingSink {
    api: Weak<crate::host_api::Inner>,
}

impl HostReportingSink {
    pub(crate) fn new(api: Weak<crate::host_api::Inner>) -> Self {
        HostReportingSink { api }
    }
}

impl ErrorSink for HostReportingSink {
    fn log_error(&self, error: ReportedError) {
        let text = error.to_string();
        error!("{text}");

        let Some(inner) = self.api.upgrade() else {
            return;
        };
        let params = ReportMessageRequestParams {
            kind: ReportingMessageType::Error,
            error: Some(text),
            message: None,
            source: "webview".to_string(),
            extra: None,
        };
        // The reply carries nothing; the request stays pending until it lands.
        drop(HostApi::from_inner(inner).send::<ReportMessageRequest>(&params, Default::default()));
    }
}
