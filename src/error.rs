use serde_json::Value;
use thiserror::Error;

use crate::fanout::Cancelled;

/// What went wrong with an API call. Only `AuthExpired` ever triggers a
/// session renewal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No local session; the transport was never contacted.
    Unauthenticated,
    /// The server answered 401.
    AuthExpired,
    /// Any other non-success status.
    RequestFailed,
    /// The request never produced a response (connect error, timeout).
    Transport,
    /// The caller cancelled the request.
    Cancelled,
    /// A success response whose body lacked something the call needs.
    Decode,
}

/// Error surfaced by every authenticated operation.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    /// HTTP status, or 0 when no response was received.
    pub status: u16,
    pub message: String,
    pub details: Option<Value>,
}

impl ApiError {
    pub fn unauthenticated() -> Self {
        Self {
            kind: ErrorKind::Unauthenticated,
            status: 401,
            message: "Not authenticated".to_string(),
            details: None,
        }
    }

    /// Build the error for a non-success response. `details` is the JSON
    /// error body when one could be decoded.
    pub fn from_status(status: u16, reason: Option<&str>, details: Option<Value>) -> Self {
        let message = details
            .as_ref()
            .and_then(|d| d.get("message"))
            .and_then(|m| m.as_str())
            .map(String::from)
            .unwrap_or_else(|| format!("{} {}", status, reason.unwrap_or("")).trim().to_string());

        let kind = if status == 401 {
            ErrorKind::AuthExpired
        } else {
            ErrorKind::RequestFailed
        };

        Self {
            kind,
            status,
            message,
            details,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Transport,
            status: 0,
            message: message.into(),
            details: None,
        }
    }

    /// The server answered 2xx but the body could not be used.
    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Decode,
            status: 0,
            message: message.into(),
            details: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled,
            status: 0,
            message: "Request cancelled".to_string(),
            details: None,
        }
    }
}

impl From<Cancelled> for ApiError {
    fn from(_: Cancelled) -> Self {
        Self::cancelled()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn message_prefers_server_text() {
        let err = ApiError::from_status(403, Some("Forbidden"), Some(json!({"message": "Admins only"})));
        assert_eq!(err.kind, ErrorKind::RequestFailed);
        assert_eq!(err.message, "Admins only");
        assert_eq!(err.to_string(), "Admins only");
    }

    #[test]
    fn message_falls_back_to_status_line() {
        let err = ApiError::from_status(500, Some("Internal Server Error"), None);
        assert_eq!(err.message, "500 Internal Server Error");

        let err = ApiError::from_status(599, None, Some(json!({"message": 12})));
        assert_eq!(err.message, "599");
        assert!(err.details.is_some());
    }

    #[test]
    fn only_401_is_auth_expired() {
        assert_eq!(ApiError::from_status(401, Some("Unauthorized"), None).kind, ErrorKind::AuthExpired);
        assert_eq!(ApiError::from_status(419, None, None).kind, ErrorKind::RequestFailed);
        assert_eq!(ApiError::unauthenticated().status, 401);
    }
}
