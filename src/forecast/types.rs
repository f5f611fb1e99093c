//! Core types for the forecast subsystem.

use super::slot::PublicationSlot;
use serde::Serialize;

/// Upstream success sentinel in `response.header.resultCode`.
pub const RESULT_OK: &str = "00";

/// Forecast items passed through as-is, plus the slot they were requested for.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WeatherEnvelope {
    pub data: Vec<serde_json::Value>,
    pub request_time: PublicationSlot,
}

/// Failures at the upstream boundary, in the order they are checked.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UpstreamError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("upstream returned HTTP {status}")]
    HttpStatus { status: u16, body: String },
    #[error("malformed upstream payload: {0}")]
    MalformedPayload(String),
    #[error("upstream error {code}: {message}")]
    Api { code: String, message: &'static str },
    #[error("upstream returned no forecast items")]
    NoData,
}

impl UpstreamError {
    /// Stable tag for logs and client responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Transport(_) => "transport",
            Self::HttpStatus { .. } => "httpStatus",
            Self::MalformedPayload(_) => "malformedPayload",
            Self::Api { .. } => "apiError",
            Self::NoData => "noData",
        }
    }

    /// Message safe to hand to untrusted clients: no bodies, no transport detail.
    pub fn public_message(&self) -> String {
        let detail = match self {
            Self::Transport(_) => "service unreachable".to_string(),
            Self::HttpStatus { status, .. } => format!("HTTP {}", status),
            Self::MalformedPayload(_) => "malformed response".to_string(),
            Self::Api { message, .. } => message.to_string(),
            Self::NoData => "no data".to_string(),
        };
        format!("upstream weather service failed: {}", detail)
    }
}

/// Human-readable message for an upstream result code.
pub fn result_message(code: &str) -> &'static str {
    match code {
        "01" => "application error",
        "02" => "database error",
        "03" => "no data",
        "04" => "HTTP error",
        "05" => "service timeout",
        "10" => "invalid request parameter",
        "11" => "missing mandatory request parameter",
        "12" => "no such open API service",
        "20" => "service access denied",
        "21" => "temporarily disabled service key",
        "22" => "request limit exceeded",
        "30" => "unregistered service key",
        "31" => "expired service key",
        "32" => "unregistered IP",
        "33" => "unsigned call",
        _ => "unknown error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_result_messages() {
        assert_eq!(result_message("30"), "unregistered service key");
        assert_eq!(result_message("31"), "expired service key");
        assert_eq!(result_message("03"), "no data");
        assert_eq!(result_message("99"), "unknown error");
        assert_eq!(result_message("77"), "unknown error");
    }

    #[test]
    fn test_public_message_hides_body() {
        let err = UpstreamError::HttpStatus {
            status: 502,
            body: "<html>stack trace</html>".into(),
        };
        let msg = err.public_message();
        assert!(msg.contains("502"));
        assert!(!msg.contains("stack trace"));
        assert_eq!(err.kind(), "httpStatus");
    }

    #[test]
    fn test_envelope_shape() {
        let env = WeatherEnvelope {
            data: vec![serde_json::json!({"category": "T1H", "obsrValue": "3.2"})],
            request_time: PublicationSlot {
                base_date: "20241122".into(),
                base_time: "1100".into(),
            },
        };
        let v = serde_json::to_value(&env).unwrap();
        assert_eq!(v["requestTime"]["baseDate"], "20241122");
        assert_eq!(v["requestTime"]["baseTime"], "1100");
        assert_eq!(v["data"][0]["category"], "T1H");
    }
}
