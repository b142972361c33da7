//! [`RemoteLibraryClient`] over the Spotify connector with reactive token
//! refresh.
//!
//! Each call is tried at most twice. When the first attempt fails because the
//! access token was rejected, the credential store refreshes it once and the
//! call is repeated with the new token. Every other failure propagates as is.

use async_trait::async_trait;
use bridge_traits::error::Result as BridgeResult;
use core_auth::{AccessToken, CredentialStore, UserId};
use core_library::{RemoteLibraryClient, RemoteLibraryItem, RemotePage, RemoteRelease};
use std::future::Future;
use std::sync::Arc;
use tracing::{instrument, warn};

use crate::connector::SpotifyConnector;
use crate::error::Result;
use crate::mapping::into_remote_page;

const MAX_ATTEMPTS: u32 = 2;

pub struct SpotifyLibraryClient {
    connector: SpotifyConnector,
    credentials: Arc<dyn CredentialStore>,
}

impl SpotifyLibraryClient {
    pub fn new(connector: SpotifyConnector, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            connector,
            credentials,
        }
    }

    async fn with_fresh_token<T, F, Fut>(&self, user: UserId, call: F) -> Result<T>
    where
        F: Fn(AccessToken) -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut token = self.credentials.current_access_token(user).await?;
        let mut attempt = 1;

        loop {
            match call(token.clone()).await {
                Err(e) if e.is_auth_expired() && attempt < MAX_ATTEMPTS => {
                    warn!(user_id = %user, attempt, "Access token rejected, refreshing");
                    token = self.credentials.refresh_token(user).await?;
                    attempt += 1;
                }
                outcome => return outcome,
            }
        }
    }
}

#[async_trait]
impl RemoteLibraryClient for SpotifyLibraryClient {
    #[instrument(skip(self), fields(user_id = %user))]
    async fn fetch_library_page(
        &self,
        user: UserId,
        offset: u32,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemoteLibraryItem>> {
        let connector = &self.connector;
        let page = self
            .with_fresh_token(user, move |token| async move {
                connector.saved_albums(&token, offset, limit).await
            })
            .await?;

        Ok(into_remote_page(page))
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn fetch_raw_library_page(
        &self,
        user: UserId,
        offset: u32,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemoteRelease>> {
        let page = self.fetch_library_page(user, offset, limit).await?;
        Ok(page.map(|item| item.release))
    }

    #[instrument(skip(self, external_ids), fields(user_id = %user, ids = external_ids.len()))]
    async fn check_membership(
        &self,
        user: UserId,
        external_ids: &[String],
    ) -> BridgeResult<Vec<bool>> {
        if external_ids.is_empty() {
            return Ok(Vec::new());
        }

        let connector = &self.connector;
        let answers = self
            .with_fresh_token(user, move |token| async move {
                connector.contains_saved_albums(&token, external_ids).await
            })
            .await?;

        Ok(answers)
    }
}
