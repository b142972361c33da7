//! Domain models for the library mirror and the shared catalog

use crate::error::{LibraryError, Result};
use chrono::NaiveDate;
use core_auth::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// =============================================================================
// ID Types
// =============================================================================

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn from_string(s: &str) -> std::result::Result<Self, uuid::Error> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id!(
    /// Identifier of a user's library
    LibraryId
);
uuid_id!(
    /// Identifier of a single library item
    LibraryItemId
);
uuid_id!(
    /// Identifier of a catalog release
    ReleaseId
);
uuid_id!(
    /// Identifier of a catalog artist
    ArtistId
);

pub(crate) fn parse_id<T>(
    field: &str,
    raw: &str,
    parse: fn(&str) -> std::result::Result<T, uuid::Error>,
) -> Result<T> {
    parse(raw).map_err(|e| LibraryError::InvalidState(format!("{} '{}': {}", field, raw, e)))
}

// =============================================================================
// Library
// =============================================================================

/// Lifecycle state of a [`Library`].
///
/// `ARCHIVED` is terminal and set outside the sync engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LibraryState {
    Importing,
    ImportingAfterFirstPage,
    Imported,
    ImportFailed,
    Updating,
    Updated,
    UpdateFailed,
    Archived,
}

impl LibraryState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Importing => "IMPORTING",
            Self::ImportingAfterFirstPage => "IMPORTING_AFTER_FIRST_PAGE",
            Self::Imported => "IMPORTED",
            Self::ImportFailed => "IMPORT_FAILED",
            Self::Updating => "UPDATING",
            Self::Updated => "UPDATED",
            Self::UpdateFailed => "UPDATE_FAILED",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Whether a sync is (or was, before a crash) running.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Importing | Self::ImportingAfterFirstPage | Self::Updating
        )
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, Self::ImportFailed | Self::UpdateFailed)
    }
}

impl fmt::Display for LibraryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LibraryState {
    type Err = LibraryError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "IMPORTING" => Ok(Self::Importing),
            "IMPORTING_AFTER_FIRST_PAGE" => Ok(Self::ImportingAfterFirstPage),
            "IMPORTED" => Ok(Self::Imported),
            "IMPORT_FAILED" => Ok(Self::ImportFailed),
            "UPDATING" => Ok(Self::Updating),
            "UPDATED" => Ok(Self::Updated),
            "UPDATE_FAILED" => Ok(Self::UpdateFailed),
            "ARCHIVED" => Ok(Self::Archived),
            other => Err(LibraryError::InvalidState(format!(
                "unknown library state: {}",
                other
            ))),
        }
    }
}

/// A user's mirror of their remote library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Library {
    pub id: LibraryId,
    pub owner_id: UserId,
    pub state: LibraryState,
    pub created_at: i64,
    pub updated_at: i64,
}

impl Library {
    /// New library in `state`, stamped at `now` (epoch millis).
    pub fn new(owner_id: UserId, state: LibraryState, now: i64) -> Self {
        Self {
            id: LibraryId::new(),
            owner_id,
            state,
            created_at: now,
            updated_at: now,
        }
    }
}

// =============================================================================
// Library items
// =============================================================================

/// Soft-delete state of a [`LibraryItem`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ItemState {
    Active,
    Archived { archived_at: i64 },
}

impl ItemState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Archived { .. } => "ARCHIVED",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active)
    }

    pub fn archived_at(&self) -> Option<i64> {
        match self {
            Self::Active => None,
            Self::Archived { archived_at } => Some(*archived_at),
        }
    }

    /// Rebuild from the `state` and `archived_at` columns.
    pub fn from_columns(state: &str, archived_at: Option<i64>) -> Result<Self> {
        match (state, archived_at) {
            ("ACTIVE", None) => Ok(Self::Active),
            ("ARCHIVED", Some(archived_at)) => Ok(Self::Archived { archived_at }),
            (state, archived_at) => Err(LibraryError::InvalidState(format!(
                "item state {} with archived_at {:?}",
                state, archived_at
            ))),
        }
    }
}

/// One release in a user's library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryItem {
    pub id: LibraryItemId,
    pub owner_id: UserId,
    pub library_id: LibraryId,
    pub release_id: ReleaseId,
    /// Remote id of the release, joined from the catalog on read.
    pub release_external_id: String,
    pub state: ItemState,
    /// When the remote reports the release was saved.
    pub added_at: i64,
    pub created_at: i64,
    /// Set once the item was placed into a user-curated crate. Sync never clears it.
    pub tagged_into_collection: bool,
}

impl LibraryItem {
    pub fn new_active(
        library: &Library,
        release_id: ReleaseId,
        release_external_id: impl Into<String>,
        added_at: i64,
        now: i64,
    ) -> Self {
        Self {
            id: LibraryItemId::new(),
            owner_id: library.owner_id,
            library_id: library.id,
            release_id,
            release_external_id: release_external_id.into(),
            state: ItemState::Active,
            added_at,
            created_at: now,
            tagged_into_collection: false,
        }
    }

    /// Keyset position of this item in creation order.
    pub fn cursor(&self) -> ItemCursor {
        ItemCursor {
            created_at: self.created_at,
            id: self.id,
        }
    }
}

/// Position after which the next page of items starts, newest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ItemCursor {
    pub created_at: i64,
    pub id: LibraryItemId,
}

// =============================================================================
// Catalog
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Release {
    pub id: ReleaseId,
    pub external_id: String,
    pub upc: Option<String>,
    pub href: Option<String>,
    pub name: String,
    pub album_type: Option<String>,
    pub popularity: Option<i32>,
    pub release_date: Option<NaiveDate>,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Artist {
    pub id: ArtistId,
    pub external_id: String,
    pub external_uri: Option<String>,
    pub name: String,
    pub popularity: Option<i32>,
    pub created_at: i64,
}
