//! Spotify Web API connector
//!
//! One HTTP call per operation, authenticated with the bearer token the
//! caller passes in. Token refresh is the caller's concern (see
//! [`SpotifyLibraryClient`](crate::SpotifyLibraryClient)).

use bridge_traits::http::{HttpClient, HttpMethod, HttpRequest, HttpResponse};
use core_auth::AccessToken;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{Result, SpotifyError};
use crate::types::{Page, SavedAlbum};

/// Default Web API base URL
pub const DEFAULT_API_BASE: &str = "https://api.spotify.com/v1";

/// Maximum page size of `GET /me/albums`
pub const MAX_SAVED_ALBUMS_LIMIT: u32 = 50;

/// Maximum number of ids per `GET /me/albums/contains` request
pub const MAX_CONTAINS_IDS: usize = 20;

/// Used when a 429 carries no parsable `Retry-After`
const DEFAULT_RETRY_AFTER_SECONDS: u64 = 1;

pub struct SpotifyConnector {
    http_client: Arc<dyn HttpClient>,
    api_base: String,
    timeout: Option<Duration>,
}

impl SpotifyConnector {
    pub fn new(http_client: Arc<dyn HttpClient>) -> Self {
        Self::with_base_url(http_client, DEFAULT_API_BASE)
    }

    pub fn with_base_url(http_client: Arc<dyn HttpClient>, api_base: impl Into<String>) -> Self {
        Self {
            http_client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            timeout: None,
        }
    }

    /// Per-request timeout; the HTTP client's own timeout applies otherwise.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// `GET /me/albums`: the user's saved albums, most recently saved first.
    #[instrument(skip(self, token))]
    pub async fn saved_albums(
        &self,
        token: &AccessToken,
        offset: u32,
        limit: u32,
    ) -> Result<Page<SavedAlbum>> {
        let limit = limit.clamp(1, MAX_SAVED_ALBUMS_LIMIT);
        let url = format!("{}/me/albums?offset={}&limit={}", self.api_base, offset, limit);

        let page: Page<SavedAlbum> = self.get_json(token, url).await?;
        debug!(
            returned = page.items.len(),
            total = page.total,
            has_next = page.next.is_some(),
            "Fetched saved albums"
        );

        Ok(page)
    }

    /// `GET /me/albums/contains`: whether each album is still saved.
    ///
    /// Requests are split into chunks of [`MAX_CONTAINS_IDS`]; answers are
    /// concatenated in input order.
    #[instrument(skip(self, token, album_ids), fields(ids = album_ids.len()))]
    pub async fn contains_saved_albums(
        &self,
        token: &AccessToken,
        album_ids: &[String],
    ) -> Result<Vec<bool>> {
        let mut answers = Vec::with_capacity(album_ids.len());

        for chunk in album_ids.chunks(MAX_CONTAINS_IDS) {
            let ids = chunk
                .iter()
                .map(|id| urlencoding::encode(id).into_owned())
                .collect::<Vec<_>>()
                .join(",");
            let url = format!("{}/me/albums/contains?ids={}", self.api_base, ids);

            let chunk_answers: Vec<bool> = self.get_json(token, url).await?;
            if chunk_answers.len() != chunk.len() {
                warn!(
                    requested = chunk.len(),
                    answered = chunk_answers.len(),
                    "Membership answer length differs from request"
                );
            }
            answers.extend(chunk_answers);
        }

        Ok(answers)
    }

    async fn get_json<T: DeserializeOwned>(&self, token: &AccessToken, url: String) -> Result<T> {
        let mut request = HttpRequest::new(HttpMethod::Get, url)
            .bearer_token(token)
            .accept_json();
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }

        let response = self.http_client.execute(request).await?;
        let response = Self::classify(response)?;

        serde_json::from_slice(&response.body)
            .map_err(|e| SpotifyError::ParseError(format!("Invalid response body: {}", e)))
    }

    fn classify(response: HttpResponse) -> Result<HttpResponse> {
        if response.is_success() {
            return Ok(response);
        }

        let message = String::from_utf8_lossy(&response.body).to_string();
        match response.status {
            401 => Err(SpotifyError::Unauthorized(message)),
            429 => {
                let retry_after_seconds = response
                    .header("Retry-After")
                    .and_then(|v| v.trim().parse().ok())
                    .unwrap_or(DEFAULT_RETRY_AFTER_SECONDS);
                warn!(retry_after_seconds, "Rate limited by Spotify");
                Err(SpotifyError::RateLimitExceeded {
                    retry_after_seconds,
                })
            }
            status_code => {
                warn!(status_code, "Spotify API request failed");
                Err(SpotifyError::ApiError {
                    status_code,
                    message,
                })
            }
        }
    }
}
