//! Error types for the Spotify provider

use bridge_traits::error::BridgeError;
use core_auth::AuthError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SpotifyError {
    /// The access token was rejected (HTTP 401)
    #[error("Access token rejected: {0}")]
    Unauthorized(String),

    #[error("Spotify API error (status {status_code}): {message}")]
    ApiError { status_code: u16, message: String },

    #[error("Rate limit exceeded, retry after {retry_after_seconds} seconds")]
    RateLimitExceeded { retry_after_seconds: u64 },

    #[error("Failed to parse API response: {0}")]
    ParseError(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl SpotifyError {
    /// Whether a token refresh may fix this failure.
    pub fn is_auth_expired(&self) -> bool {
        matches!(self, Self::Unauthorized(_))
    }
}

pub type Result<T> = std::result::Result<T, SpotifyError>;

impl From<SpotifyError> for BridgeError {
    fn from(error: SpotifyError) -> Self {
        match error {
            SpotifyError::Bridge(e) => e,
            other => BridgeError::OperationFailed(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_unauthorized_is_auth_expired() {
        assert!(SpotifyError::Unauthorized("expired".to_string()).is_auth_expired());
        assert!(!SpotifyError::ApiError {
            status_code: 403,
            message: "forbidden".to_string()
        }
        .is_auth_expired());
        assert!(!SpotifyError::RateLimitExceeded {
            retry_after_seconds: 3
        }
        .is_auth_expired());
    }

    #[test]
    fn test_bridge_conversion_keeps_message() {
        let error = SpotifyError::RateLimitExceeded {
            retry_after_seconds: 7,
        };
        let bridge: BridgeError = error.into();

        assert!(
            matches!(bridge, BridgeError::OperationFailed(msg) if msg.contains("retry after 7"))
        );

        let bridge: BridgeError =
            SpotifyError::Bridge(BridgeError::NotAvailable("offline".to_string())).into();
        assert!(matches!(bridge, BridgeError::NotAvailable(_)));
    }
}
