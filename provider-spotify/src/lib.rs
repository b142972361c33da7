//! # Spotify Provider
//!
//! Reads a user's saved albums from the Spotify Web API and exposes them as a
//! [`core_library::RemoteLibraryClient`].

pub mod client;
pub mod connector;
pub mod error;
pub mod mapping;
pub mod types;

pub use client::SpotifyLibraryClient;
pub use connector::SpotifyConnector;
pub use error::{Result, SpotifyError};
