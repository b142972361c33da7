//! # Repositories
//!
//! Trait per aggregate with a SQLite implementation behind it. The sync
//! engine depends on the traits only.
//!
//! - `LibraryRepository`: one live library per user
//! - `LibraryItemRepository`: items of a library, keyset and offset paging
//! - `CatalogService`: shared releases and artists
//! - `PageStore`: one transaction per sync page
//! - `SqliteTokenRepository`: stored OAuth tokens

pub mod catalog;
pub mod library;
pub mod library_item;
pub mod page;
pub mod pagination;
pub mod user_token;

pub use catalog::{CatalogService, SqliteCatalogService};
pub use library::{LibraryRepository, SqliteLibraryRepository};
pub use library_item::{ItemFilter, LibraryItemRepository, SqliteLibraryItemRepository};
pub use page::{PageStore, PageTransaction, SqlitePageStore};
pub use pagination::{Page, PageRequest};
pub use user_token::SqliteTokenRepository;
