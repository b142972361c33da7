use bridge_traits::error::BridgeError;
use core_library::LibraryError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Sync already in progress for user {user_id}")]
    SyncInProgress { user_id: String },

    #[error("Remote library error: {0}")]
    Remote(String),

    #[error(transparent)]
    Library(#[from] LibraryError),

    #[error("Membership check answered {actual} entries for {expected} ids")]
    MembershipMismatch { expected: usize, actual: usize },
}

impl From<BridgeError> for SyncError {
    fn from(error: BridgeError) -> Self {
        SyncError::Remote(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
