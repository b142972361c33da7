use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("User {user_id} has no stored credentials")]
    NotAuthenticated { user_id: String },

    #[error("Token refresh failed: {0}")]
    TokenRefreshFailed(String),

    #[error("Credential storage error: {0}")]
    Storage(String),

    #[error("Invalid user id: {0}")]
    InvalidUserId(String),

    #[error("Authentication error: {0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, AuthError>;
