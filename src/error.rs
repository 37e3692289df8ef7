use serde_json::Value;
use thiserror::Error;

/// Failure of a single request sent to the host.
#[derive(Error, Debug)]
pub enum RequestError {
    /// The host answered with an `error` field.
    #[error("host returned an error: {}", display_host_error(.0))]
    Host(Value),

    #[error("failed to post request {method}: {source}")]
    Transport {
        method: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("failed to encode params for {method}: {source}")]
    Encode {
        method: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to decode response for {method}: {source}")]
    Decode {
        method: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum HostApiError {
    #[error("host needs to provide a host factory via `provide_host_factory`")]
    MissingHost,

    #[error("host factory failed: {0:#}")]
    HostUnavailable(anyhow::Error),
}

/// An inbound value that cannot be one of the three envelope shapes.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("invalid envelope: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("envelope has neither id nor method")]
    Unclassifiable,
}

/// Readable form of an opaque host error for logs and `Display`: strings
/// verbatim, `{ message }` objects by message, anything else as JSON.
pub fn display_host_error(error: &Value) -> String {
    match error {
        Value::String(s) => s.clone(),
        Value::Object(map) => match map.get("message").and_then(Value::as_str) {
            Some(message) => message.to_string(),
            None => error.to_string(),
        },
        other => other.to_string(),
    }
}

/// The host error as JavaScript's `String(error)` renders it: plain objects
/// become `[object Object]`, arrays join their elements with commas.
pub fn host_error_to_string(error: &Value) -> String {
    match error {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Object(_) => "[object Object]".to_string(),
        Value::Array(items) => items
            .iter()
            .map(host_error_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn host_error_display_prefers_message() {
        assert_eq!(display_host_error(&json!("boom")), "boom");
        assert_eq!(display_host_error(&json!({ "message": "nope", "code": 3 })), "nope");
        assert_eq!(display_host_error(&json!({ "code": 3 })), r#"{"code":3}"#);
        assert_eq!(
            RequestError::Host(json!("boom")).to_string(),
            "host returned an error: boom"
        );
    }

    #[test]
    fn host_error_string_follows_javascript() {
        assert_eq!(host_error_to_string(&json!("in maintenance mode")), "in maintenance mode");
        assert_eq!(
            host_error_to_string(&json!({ "message": "in maintenance mode" })),
            "[object Object]"
        );
        assert_eq!(host_error_to_string(&json!(["a", 1, null])), "a,1,");
        assert_eq!(host_error_to_string(&json!(42)), "42");
    }
}
