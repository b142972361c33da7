//! # Crates Library Sync
//!
//! Mirrors a user's saved albums from Spotify into a local SQLite library.
//! The engine itself lives in `core-service`; this crate re-exports its
//! public surface.
//!
//! ## Features
//!
//! - `desktop-shims` (default): `Engine::bootstrap` with the `reqwest` HTTP
//!   client.

pub use core_service::{
    init_logging, AccessToken, Engine, EngineConfig, Library, LibraryItem, LibraryState,
    LoggingConfig, SyncConfig, SyncError, SyncMode,
};
