//! Credentials for the remote library API.
//!
//! - [`UserId`] identifies whose library is being synchronized.
//! - [`CredentialStore`] hands out access tokens and refreshes them on demand.
//! - [`OAuthFlowManager`] performs the refresh-token grant.

pub mod credentials;
pub mod error;
pub mod oauth;
pub mod types;

pub use credentials::{CredentialManager, CredentialStore, TokenRepository};
pub use error::{AuthError, Result};
pub use oauth::{OAuthConfig, OAuthFlowManager};
pub use types::{AccessToken, OAuthTokens, UserId};
