//! Library repository: one live library per user

use crate::error::{LibraryError, Result};
use crate::models::{parse_id, Library, LibraryId, LibraryState};
use async_trait::async_trait;
use core_auth::UserId;
use sqlx::{query, query_as, FromRow, SqlitePool};
use tracing::debug;

#[async_trait]
pub trait LibraryRepository: Send + Sync {
    /// The user's non-archived library, if any.
    async fn find_by_owner(&self, owner: UserId) -> Result<Option<Library>>;

    /// Insert a new library.
    ///
    /// # Errors
    /// Fails if the user already has a non-archived library.
    async fn insert(&self, library: &Library) -> Result<()>;

    /// Persist `state` and `updated_at`.
    async fn update(&self, library: &Library) -> Result<()>;

    /// Return the user's live library, creating it in `IMPORTING` at `now`
    /// (epoch millis) if there is none.
    ///
    /// Concurrent callers converge on the same row.
    async fn find_or_create(&self, owner: UserId, now: i64) -> Result<Library>;
}

pub struct SqliteLibraryRepository {
    pool: SqlitePool,
}

impl SqliteLibraryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct LibraryRow {
    id: String,
    owner_id: String,
    state: String,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<LibraryRow> for Library {
    type Error = LibraryError;

    fn try_from(row: LibraryRow) -> Result<Self> {
        Ok(Library {
            id: parse_id("library id", &row.id, LibraryId::from_string)?,
            owner_id: row
                .owner_id
                .parse()
                .map_err(|e| LibraryError::InvalidState(format!("owner_id: {}", e)))?,
            state: row.state.parse()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[async_trait]
impl LibraryRepository for SqliteLibraryRepository {
    async fn find_by_owner(&self, owner: UserId) -> Result<Option<Library>> {
        let row = query_as::<_, LibraryRow>(
            r#"
            SELECT id, owner_id, state, created_at, updated_at
            FROM libraries
            WHERE owner_id = ? AND state != 'ARCHIVED'
            "#,
        )
        .bind(owner.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(Library::try_from).transpose()
    }

    async fn insert(&self, library: &Library) -> Result<()> {
        query(
            r#"
            INSERT INTO libraries (id, owner_id, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(library.id.to_string())
        .bind(library.owner_id.to_string())
        .bind(library.state.as_str())
        .bind(library.created_at)
        .bind(library.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn update(&self, library: &Library) -> Result<()> {
        let result = query("UPDATE libraries SET state = ?, updated_at = ? WHERE id = ?")
            .bind(library.state.as_str())
            .bind(library.updated_at)
            .bind(library.id.to_string())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(LibraryError::NotFound {
                entity_type: "Library".to_string(),
                id: library.id.to_string(),
            });
        }

        Ok(())
    }

    async fn find_or_create(&self, owner: UserId, now: i64) -> Result<Library> {
        if let Some(existing) = self.find_by_owner(owner).await? {
            return Ok(existing);
        }

        let candidate = Library::new(owner, LibraryState::Importing, now);

        // Loses quietly to a concurrent insert on the live-library index.
        let inserted = query(
            r#"
            INSERT OR IGNORE INTO libraries (id, owner_id, state, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(candidate.id.to_string())
        .bind(candidate.owner_id.to_string())
        .bind(candidate.state.as_str())
        .bind(candidate.created_at)
        .bind(candidate.updated_at)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if inserted == 1 {
            debug!(user_id = %owner, library_id = %candidate.id, "Created library");
            return Ok(candidate);
        }

        self.find_by_owner(owner)
            .await?
            .ok_or_else(|| LibraryError::NotFound {
                entity_type: "Library".to_string(),
                id: owner.to_string(),
            })
    }
}
