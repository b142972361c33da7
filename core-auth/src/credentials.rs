//! # Credential Store
//!
//! Per-user access tokens for the remote library API.
//!
//! [`CredentialManager`] does not refresh proactively: the remote client calls
//! [`CredentialStore::refresh_token`] only after the API rejected the current
//! token. Refreshes for the same user are serialized; different users never
//! wait on each other.

use crate::error::{AuthError, Result};
use crate::oauth::OAuthFlowManager;
use crate::types::{AccessToken, OAuthTokens, UserId};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, instrument, warn};

/// Source of bearer credentials for remote calls.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Return the access token currently stored for `user`.
    ///
    /// # Errors
    ///
    /// [`AuthError::NotAuthenticated`] if the user never linked an account.
    async fn current_access_token(&self, user: UserId) -> Result<AccessToken>;

    /// Obtain a new access token for `user`, persist it, and return it.
    async fn refresh_token(&self, user: UserId) -> Result<AccessToken>;
}

/// Persistence for per-user token sets.
#[async_trait]
pub trait TokenRepository: Send + Sync {
    async fn load(&self, user: UserId) -> Result<Option<OAuthTokens>>;

    async fn save(&self, user: UserId, tokens: &OAuthTokens) -> Result<()>;
}

/// [`CredentialStore`] backed by a [`TokenRepository`] and the refresh-token
/// grant.
pub struct CredentialManager {
    repository: Arc<dyn TokenRepository>,
    oauth: OAuthFlowManager,
    refresh_locks: Mutex<HashMap<UserId, Arc<Mutex<()>>>>,
}

impl CredentialManager {
    pub fn new(repository: Arc<dyn TokenRepository>, oauth: OAuthFlowManager) -> Self {
        Self {
            repository,
            oauth,
            refresh_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Store a token set obtained by the host's sign-in flow.
    #[instrument(skip(self, tokens), fields(user_id = %user))]
    pub async fn link_account(&self, user: UserId, tokens: OAuthTokens) -> Result<()> {
        self.repository.save(user, &tokens).await?;
        info!(expires_at = %tokens.expires_at, "Stored credentials");
        Ok(())
    }

    async fn lock_for(&self, user: UserId) -> Arc<Mutex<()>> {
        let mut locks = self.refresh_locks.lock().await;
        locks
            .entry(user)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Give back a lock from [`Self::lock_for`]; the last holder removes it.
    async fn release_lock(&self, user: UserId, lock: Arc<Mutex<()>>) {
        let mut locks = self.refresh_locks.lock().await;
        drop(lock);
        if locks
            .get(&user)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            locks.remove(&user);
        }
    }

    async fn refresh_stored(&self, user: UserId) -> Result<AccessToken> {
        let tokens = self.stored_tokens(user).await?;
        debug!("Refreshing access token");

        let refreshed = self
            .oauth
            .refresh_access_token(&tokens.refresh_token)
            .await
            .map_err(|e| {
                error!(error = %e, "Token refresh failed");
                e
            })?;

        self.repository.save(user, &refreshed).await?;
        info!(expires_at = %refreshed.expires_at, "Access token refreshed");

        Ok(refreshed.access())
    }

    async fn stored_tokens(&self, user: UserId) -> Result<OAuthTokens> {
        self.repository.load(user).await?.ok_or_else(|| {
            warn!(user_id = %user, "No stored credentials");
            AuthError::NotAuthenticated {
                user_id: user.to_string(),
            }
        })
    }
}

#[async_trait]
impl CredentialStore for CredentialManager {
    async fn current_access_token(&self, user: UserId) -> Result<AccessToken> {
        let tokens = self.stored_tokens(user).await?;
        Ok(tokens.access())
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn refresh_token(&self, user: UserId) -> Result<AccessToken> {
        let lock = self.lock_for(user).await;
        let result = {
            let _guard = lock.lock().await;
            self.refresh_stored(user).await
        };
        self.release_lock(user, lock).await;
        result
    }
}
