//! Contract for reading a user's remote library.
//!
//! Implemented by the streaming-provider crate; consumed by the sync engine.
//! All calls take the user explicitly and report failures as
//! `bridge_traits::BridgeError`.

use async_trait::async_trait;
use bridge_traits::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use core_auth::UserId;
use serde::{Deserialize, Serialize};

/// One page of a remote collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemotePage<T> {
    pub items: Vec<T>,
    pub offset: u32,
    pub limit: u32,
    pub total: u32,
    pub has_next: bool,
}

impl<T> RemotePage<T> {
    pub fn map<U, F>(self, f: F) -> RemotePage<U>
    where
        F: FnMut(T) -> U,
    {
        RemotePage {
            items: self.items.into_iter().map(f).collect(),
            offset: self.offset,
            limit: self.limit,
            total: self.total,
            has_next: self.has_next,
        }
    }
}

/// A saved release together with when the user saved it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteLibraryItem {
    pub release: RemoteRelease,
    pub added_at: DateTime<Utc>,
}

/// Catalog view of a remote release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRelease {
    pub external_id: String,
    pub name: String,
    pub href: Option<String>,
    pub uri: Option<String>,
    pub album_type: Option<String>,
    pub upc: Option<String>,
    pub popularity: Option<i32>,
    pub release_date: Option<NaiveDate>,
    pub genres: Vec<String>,
    pub images: Vec<RemoteImage>,
    pub artists: Vec<RemoteArtist>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteArtist {
    pub external_id: String,
    pub name: String,
    pub uri: Option<String>,
    pub popularity: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteImage {
    pub url: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Read access to a user's remote library.
#[async_trait]
pub trait RemoteLibraryClient: Send + Sync {
    /// Fetch saved releases starting at `offset`.
    ///
    /// Pages are ordered most-recently-saved first.
    async fn fetch_library_page(
        &self,
        user: UserId,
        offset: u32,
        limit: u32,
    ) -> Result<RemotePage<RemoteLibraryItem>>;

    /// Same endpoint as [`fetch_library_page`](Self::fetch_library_page),
    /// without the saved-at timestamps.
    async fn fetch_raw_library_page(
        &self,
        user: UserId,
        offset: u32,
        limit: u32,
    ) -> Result<RemotePage<RemoteRelease>>;

    /// For each external id, whether the remote library still contains it.
    ///
    /// The answer has one entry per id, in the same order.
    async fn check_membership(&self, user: UserId, external_ids: &[String]) -> Result<Vec<bool>>;
}
