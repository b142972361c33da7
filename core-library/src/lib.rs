//! # Library Store
//!
//! Owns the local mirror of each user's remote library and the shared release
//! catalog it points into.
//!
//! - SQLite schema and migrations ([`db`])
//! - `Library` / `LibraryItem` / `Release` models ([`models`])
//! - repositories and the catalog service ([`repositories`])
//! - the contract for reading the remote library ([`remote`])

pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod repositories;
pub mod service;

pub use error::{LibraryError, Result};
pub use models::{
    Artist, ArtistId, ItemCursor, ItemState, Library, LibraryId, LibraryItem, LibraryItemId,
    LibraryState, Release, ReleaseId,
};
pub use remote::{
    RemoteArtist, RemoteImage, RemoteLibraryClient, RemoteLibraryItem, RemotePage, RemoteRelease,
};
pub use service::LibraryService;
