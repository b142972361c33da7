//! Library item repository
//!
//! Items are never hard-deleted. Sync writes go through a
//! [`PageTransaction`](crate::repositories::PageTransaction) and touch only
//! `state`, `added_at` and `archived_at`; `tagged_into_collection` is written
//! by [`LibraryItemRepository::mark_tagged`] alone.

use crate::error::{LibraryError, Result};
use crate::models::{
    parse_id, ItemCursor, ItemState, LibraryId, LibraryItem, LibraryItemId, ReleaseId,
};
use crate::repositories::{Page, PageRequest};
use async_trait::async_trait;
use core_auth::UserId;
use sqlx::{query, query_as, query_scalar, FromRow, SqliteConnection, SqlitePool};

/// Filters for [`LibraryItemRepository::list_active`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFilter {
    /// Only items not yet placed into any collection
    pub untagged_only: bool,
}

impl ItemFilter {
    pub fn untagged() -> Self {
        Self {
            untagged_only: true,
        }
    }
}

#[async_trait]
pub trait LibraryItemRepository: Send + Sync {
    async fn find_by_owner_and_release(
        &self,
        owner: UserId,
        release_id: ReleaseId,
    ) -> Result<Option<LibraryItem>>;

    /// Active items, most recently created first, strictly after `after`.
    ///
    /// Keyset-paged on (`created_at`, `id`) so archiving rows from an earlier
    /// page never shifts the next one.
    async fn find_active_page(
        &self,
        owner: UserId,
        after: Option<ItemCursor>,
        limit: u32,
    ) -> Result<Vec<LibraryItem>>;

    /// Active items ordered by `added_at`, newest first.
    async fn list_active(
        &self,
        owner: UserId,
        request: PageRequest,
        filter: ItemFilter,
    ) -> Result<Page<LibraryItem>>;

    /// Flag the owner's item for `release_id` as placed into a collection.
    ///
    /// Returns `false` when the owner has no such item.
    async fn mark_tagged(&self, owner: UserId, release_id: ReleaseId) -> Result<bool>;

    /// Items in any state.
    async fn count_for_owner(&self, owner: UserId) -> Result<i64>;

    async fn count_active(&self, owner: UserId) -> Result<i64>;
}

pub struct SqliteLibraryItemRepository {
    pool: SqlitePool,
}

impl SqliteLibraryItemRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SELECT_ITEM: &str = r#"
    SELECT li.id, li.owner_id, li.library_id, li.release_id,
           r.external_id AS release_external_id,
           li.state, li.added_at, li.created_at, li.archived_at,
           li.tagged_into_collection
    FROM library_items li
    JOIN releases r ON r.id = li.release_id
"#;

#[derive(Debug, FromRow)]
struct LibraryItemRow {
    id: String,
    owner_id: String,
    library_id: String,
    release_id: String,
    release_external_id: String,
    state: String,
    added_at: i64,
    created_at: i64,
    archived_at: Option<i64>,
    tagged_into_collection: bool,
}

impl TryFrom<LibraryItemRow> for LibraryItem {
    type Error = LibraryError;

    fn try_from(row: LibraryItemRow) -> Result<Self> {
        Ok(LibraryItem {
            id: parse_id("item id", &row.id, LibraryItemId::from_string)?,
            owner_id: row
                .owner_id
                .parse()
                .map_err(|e| LibraryError::InvalidState(format!("owner_id: {}", e)))?,
            library_id: parse_id("library id", &row.library_id, LibraryId::from_string)?,
            release_id: parse_id("release id", &row.release_id, ReleaseId::from_string)?,
            release_external_id: row.release_external_id,
            state: ItemState::from_columns(&row.state, row.archived_at)?,
            added_at: row.added_at,
            created_at: row.created_at,
            tagged_into_collection: row.tagged_into_collection,
        })
    }
}

fn into_items(rows: Vec<LibraryItemRow>) -> Result<Vec<LibraryItem>> {
    rows.into_iter().map(LibraryItem::try_from).collect()
}

pub(crate) async fn select_by_owner_and_release(
    conn: &mut SqliteConnection,
    owner: UserId,
    release_id: ReleaseId,
) -> Result<Option<LibraryItem>> {
    let sql = format!("{} WHERE li.owner_id = ? AND li.release_id = ?", SELECT_ITEM);
    let row = query_as::<_, LibraryItemRow>(&sql)
        .bind(owner.to_string())
        .bind(release_id.to_string())
        .fetch_optional(&mut *conn)
        .await?;

    row.map(LibraryItem::try_from).transpose()
}

/// # Errors
/// Fails if the owner already has an item for the same release.
pub(crate) async fn insert_item(conn: &mut SqliteConnection, item: &LibraryItem) -> Result<()> {
    query(
        r#"
        INSERT INTO library_items (
            id, owner_id, library_id, release_id, state,
            added_at, created_at, archived_at, tagged_into_collection
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(item.id.to_string())
    .bind(item.owner_id.to_string())
    .bind(item.library_id.to_string())
    .bind(item.release_id.to_string())
    .bind(item.state.as_str())
    .bind(item.added_at)
    .bind(item.created_at)
    .bind(item.state.archived_at())
    .bind(item.tagged_into_collection)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Persist `state`, `archived_at` and `added_at`.
pub(crate) async fn update_item_sync_fields(
    conn: &mut SqliteConnection,
    item: &LibraryItem,
) -> Result<()> {
    let result = query(
        r#"
        UPDATE library_items
        SET state = ?, archived_at = ?, added_at = ?
        WHERE id = ?
        "#,
    )
    .bind(item.state.as_str())
    .bind(item.state.archived_at())
    .bind(item.added_at)
    .bind(item.id.to_string())
    .execute(&mut *conn)
    .await?;

    if result.rows_affected() == 0 {
        return Err(LibraryError::NotFound {
            entity_type: "LibraryItem".to_string(),
            id: item.id.to_string(),
        });
    }

    Ok(())
}

#[async_trait]
impl LibraryItemRepository for SqliteLibraryItemRepository {
    async fn find_by_owner_and_release(
        &self,
        owner: UserId,
        release_id: ReleaseId,
    ) -> Result<Option<LibraryItem>> {
        let mut conn = self.pool.acquire().await?;
        select_by_owner_and_release(&mut conn, owner, release_id).await
    }

    async fn find_active_page(
        &self,
        owner: UserId,
        after: Option<ItemCursor>,
        limit: u32,
    ) -> Result<Vec<LibraryItem>> {
        let rows = match after {
            None => {
                let sql = format!(
                    "{} WHERE li.owner_id = ? AND li.state = 'ACTIVE' \
                     ORDER BY li.created_at DESC, li.id DESC LIMIT ?",
                    SELECT_ITEM
                );
                query_as::<_, LibraryItemRow>(&sql)
                    .bind(owner.to_string())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
            Some(cursor) => {
                let sql = format!(
                    "{} WHERE li.owner_id = ? AND li.state = 'ACTIVE' \
                     AND (li.created_at < ? OR (li.created_at = ? AND li.id < ?)) \
                     ORDER BY li.created_at DESC, li.id DESC LIMIT ?",
                    SELECT_ITEM
                );
                query_as::<_, LibraryItemRow>(&sql)
                    .bind(owner.to_string())
                    .bind(cursor.created_at)
                    .bind(cursor.created_at)
                    .bind(cursor.id.to_string())
                    .bind(limit)
                    .fetch_all(&self.pool)
                    .await?
            }
        };

        into_items(rows)
    }

    async fn list_active(
        &self,
        owner: UserId,
        request: PageRequest,
        filter: ItemFilter,
    ) -> Result<Page<LibraryItem>> {
        let tag_clause = if filter.untagged_only {
            " AND li.tagged_into_collection = 0"
        } else {
            ""
        };

        let count_sql = format!(
            "SELECT COUNT(*) FROM library_items li WHERE li.owner_id = ? AND li.state = 'ACTIVE'{}",
            tag_clause
        );
        let total: i64 = query_scalar(&count_sql)
            .bind(owner.to_string())
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "{} WHERE li.owner_id = ? AND li.state = 'ACTIVE'{} \
             ORDER BY li.added_at DESC, li.id DESC LIMIT ? OFFSET ?",
            SELECT_ITEM, tag_clause
        );
        let rows = query_as::<_, LibraryItemRow>(&sql)
            .bind(owner.to_string())
            .bind(request.limit())
            .bind(request.offset())
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(into_items(rows)?, total as u64, request))
    }

    async fn mark_tagged(&self, owner: UserId, release_id: ReleaseId) -> Result<bool> {
        let result = query(
            "UPDATE library_items SET tagged_into_collection = 1 WHERE owner_id = ? AND release_id = ?",
        )
        .bind(owner.to_string())
        .bind(release_id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn count_for_owner(&self, owner: UserId) -> Result<i64> {
        let count = query_scalar("SELECT COUNT(*) FROM library_items WHERE owner_id = ?")
            .bind(owner.to_string())
            .fetch_one(&self.pool)
            .await?;

        Ok(count)
    }

    async fn count_active(&self, owner: UserId) -> Result<i64> {
        let count = query_scalar(
            "SELECT COUNT(*) FROM library_items WHERE owner_id = ? AND state = 'ACTIVE'",
        )
        .bind(owner.to_string())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}
