//! Spotify Web API response types
//!
//! Only the fields the library sync reads.
//! See: https://developer.spotify.com/documentation/web-api/reference/get-users-saved-albums

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Paging object wrapping every list endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct Page<T> {
    pub href: String,
    pub items: Vec<T>,
    pub limit: u32,
    pub offset: u32,
    /// URL of the next page, absent on the last one
    pub next: Option<String>,
    pub previous: Option<String>,
    pub total: u32,
}

/// Entry of `GET /me/albums`
#[derive(Debug, Clone, Deserialize)]
pub struct SavedAlbum {
    pub added_at: DateTime<Utc>,
    pub album: Album,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Album {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub href: Option<String>,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub album_type: Option<String>,
    #[serde(default)]
    pub artists: Vec<SimplifiedArtist>,
    #[serde(default)]
    pub external_ids: ExternalIds,
    #[serde(default)]
    pub genres: Vec<String>,
    #[serde(default)]
    pub images: Vec<Image>,
    #[serde(default)]
    pub popularity: Option<i32>,
    #[serde(default)]
    pub release_date: Option<String>,
    /// `year`, `month` or `day`
    #[serde(default)]
    pub release_date_precision: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExternalIds {
    #[serde(default)]
    pub upc: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimplifiedArtist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub popularity: Option<i32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub url: String,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
}
