use thiserror::Error;

use crate::utils::truncate_string;
use crate::worker::FetchError;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    Rejected(String),

    #[error("Unauthorized - please log in again")]
    Unauthorized,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    Network(#[from] FetchError),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Offline - this feature requires an internet connection")]
    Offline,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// The server's `{error}` message if present, else the truncated body.
    fn message(body: &str) -> String {
        serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string))
            .unwrap_or_else(|| truncate_string(body, MAX_ERROR_BODY_LENGTH))
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        let message = Self::message(body);
        match status {
            400 | 403 | 409 | 422 => ApiError::Rejected(message),
            401 => ApiError::Unauthorized,
            404 => ApiError::NotFound(message),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(message),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, message)),
        }
    }

    /// Failures caused by connectivity rather than the request itself.
    pub fn is_offline(&self) -> bool {
        matches!(self, ApiError::Offline | ApiError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_uses_server_message() {
        let err = ApiError::from_status(400, r#"{"error": "Invalid verification code"}"#);
        assert!(matches!(err, ApiError::Rejected(ref m) if m == "Invalid verification code"));
        assert_eq!(err.to_string(), "Invalid verification code");
    }

    #[test]
    fn test_from_status_mapping() {
        assert!(matches!(ApiError::from_status(401, ""), ApiError::Unauthorized));
        assert!(matches!(ApiError::from_status(429, ""), ApiError::RateLimited));
        assert!(matches!(ApiError::from_status(502, "bad gateway"), ApiError::ServerError(_)));
        assert!(matches!(ApiError::from_status(302, ""), ApiError::InvalidResponse(_)));
    }

    #[test]
    fn test_long_bodies_are_truncated() {
        let body = "x".repeat(2000);
        match ApiError::from_status(500, &body) {
            ApiError::ServerError(m) => assert_eq!(m.chars().count(), MAX_ERROR_BODY_LENGTH),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_offline_classification() {
        assert!(ApiError::Offline.is_offline());
        assert!(ApiError::Network(FetchError::Network("refused".into())).is_offline());
        assert!(!ApiError::Unauthorized.is_offline());
    }
}
