use thiserror::Error;

use super::state::ErrorInfo;
use super::storage::StorageError;
use crate::api::ApiError;

/// Why a login attempt did not produce a session
#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("Invalid login response: {0}")]
    InvalidResponse(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Failed to save session: {0}")]
    Storage(#[from] StorageError),

    #[error("Login superseded by a later session change")]
    Superseded,
}

impl SessionError {
    /// The message shown on the login form for this error
    pub fn user_message(&self) -> String {
        match self {
            SessionError::Api(ApiError::Unauthorized) => "Invalid username or password".to_string(),
            SessionError::Api(ApiError::RateLimited) => {
                "Too many login attempts. Please wait a moment and try again.".to_string()
            }
            SessionError::Api(ApiError::NetworkError(e)) if e.is_timeout() => {
                "Connection timed out. Please try again.".to_string()
            }
            SessionError::Api(ApiError::NetworkError(e)) if e.is_connect() => {
                "Unable to connect to server. Check your internet connection.".to_string()
            }
            SessionError::InvalidResponse(_) | SessionError::InvalidCredential(_) => {
                "The server returned an unexpected login response.".to_string()
            }
            other => format!("Login failed: {}", other),
        }
    }

    pub fn to_error_info(&self) -> ErrorInfo {
        let status = match self {
            SessionError::Api(e) => e.status(),
            _ => None,
        };
        ErrorInfo {
            message: self.user_message(),
            status,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unauthorized_message() {
        let info = SessionError::Api(ApiError::Unauthorized).to_error_info();
        assert_eq!(info.message, "Invalid username or password");
        assert_eq!(info.status, Some(401));
    }

    #[test]
    fn test_validation_errors_share_message() {
        let a = SessionError::InvalidResponse("token is not a string".into());
        let b = SessionError::InvalidCredential("expired".into());
        assert_eq!(a.user_message(), b.user_message());
        assert_eq!(a.to_error_info().status, None);
    }

    #[test]
    fn test_fallback_message_includes_cause() {
        let info = SessionError::Api(ApiError::ServerError("maintenance".into())).to_error_info();
        assert_eq!(info.message, "Login failed: Server error: maintenance");
    }

    #[test]
    fn test_storage_error_message() {
        let info = SessionError::Storage(StorageError::Unavailable).to_error_info();
        assert_eq!(info.message, "Login failed: Failed to save session: Storage unavailable");
    }
}
