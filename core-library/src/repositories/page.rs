//! Page-scoped writes
//!
//! The sync applies each remote or local page through one
//! [`PageTransaction`]. Nothing it wrote is visible until
//! [`PageTransaction::commit`]; dropping the transaction rolls the whole page
//! back, so a failing page never leaves part of itself in the mirror.

use crate::error::Result;
use crate::models::{LibraryItem, ReleaseId};
use crate::remote::RemoteRelease;
use crate::repositories::catalog::upsert_release;
use crate::repositories::library_item::{
    insert_item, select_by_owner_and_release, update_item_sync_fields,
};
use async_trait::async_trait;
use bridge_traits::time::Clock;
use core_auth::UserId;
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::sync::Arc;
use tracing::debug;

#[async_trait]
pub trait PageStore: Send + Sync {
    async fn begin_page(&self) -> Result<Box<dyn PageTransaction>>;
}

/// Writes of one page, committed together.
#[async_trait]
pub trait PageTransaction: Send {
    /// Same contract as
    /// [`CatalogService::find_or_create_release`](crate::repositories::CatalogService::find_or_create_release).
    async fn find_or_create_release(&mut self, release: &RemoteRelease) -> Result<ReleaseId>;

    async fn find_item(
        &mut self,
        owner: UserId,
        release_id: ReleaseId,
    ) -> Result<Option<LibraryItem>>;

    /// # Errors
    /// Fails if the owner already has an item for the same release.
    async fn insert_item(&mut self, item: &LibraryItem) -> Result<()>;

    /// Persist `state`, `archived_at` and `added_at`.
    async fn update_sync_fields(&mut self, item: &LibraryItem) -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;
}

pub struct SqlitePageStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqlitePageStore {
    pub fn new(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }
}

#[async_trait]
impl PageStore for SqlitePageStore {
    async fn begin_page(&self) -> Result<Box<dyn PageTransaction>> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(SqlitePageTransaction {
            tx,
            clock: Arc::clone(&self.clock),
            writes: 0,
        }))
    }
}

struct SqlitePageTransaction {
    tx: Transaction<'static, Sqlite>,
    clock: Arc<dyn Clock>,
    writes: usize,
}

#[async_trait]
impl PageTransaction for SqlitePageTransaction {
    async fn find_or_create_release(&mut self, release: &RemoteRelease) -> Result<ReleaseId> {
        let now = self.clock.unix_timestamp_millis();
        upsert_release(&mut *self.tx, release, now).await
    }

    async fn find_item(
        &mut self,
        owner: UserId,
        release_id: ReleaseId,
    ) -> Result<Option<LibraryItem>> {
        select_by_owner_and_release(&mut *self.tx, owner, release_id).await
    }

    async fn insert_item(&mut self, item: &LibraryItem) -> Result<()> {
        insert_item(&mut *self.tx, item).await?;
        self.writes += 1;
        Ok(())
    }

    async fn update_sync_fields(&mut self, item: &LibraryItem) -> Result<()> {
        update_item_sync_fields(&mut *self.tx, item).await?;
        self.writes += 1;
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let writes = self.writes;
        self.tx.commit().await?;
        debug!(writes, "Committed page");
        Ok(())
    }
}
