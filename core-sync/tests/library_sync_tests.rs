//! Integration tests for library synchronization
//!
//! These run the orchestrator against a real in-memory SQLite mirror and a
//! scripted remote library:
//! - first import and incremental update state walks
//! - removal paging and reactivation
//! - early stop on a page that adds nothing
//! - failure isolation, page atomicity and recovery
//! - per-user single-flight

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result as BridgeResult};
use bridge_traits::time::ManualClock;
use chrono::{DateTime, Duration, TimeZone, Utc};
use core_auth::UserId;
use core_library::db::create_test_pool;
use core_library::repositories::{
    CatalogService, LibraryItemRepository, LibraryRepository, SqliteCatalogService,
    SqliteLibraryItemRepository, SqliteLibraryRepository, SqlitePageStore,
};
use core_library::{
    ItemState, Library, LibraryService, LibraryState, RemoteLibraryClient, RemoteLibraryItem, RemotePage,
    RemoteRelease,
};
use core_sync::{LibrarySyncOrchestrator, SyncConfig, SyncError, SyncMode};
use std::sync::Arc;
use tokio::sync::{Mutex as AsyncMutex, Notify};

// ============================================================================
// Fakes
// ============================================================================

/// Remote library held in memory, newest save first.
#[derive(Default)]
struct FakeRemote {
    saved: AsyncMutex<Vec<RemoteLibraryItem>>,
    fetched_offsets: AsyncMutex<Vec<u32>>,
    membership_calls: AsyncMutex<usize>,
    fail_at_offset: AsyncMutex<Option<u32>>,
    short_membership_answer: AsyncMutex<bool>,
    /// (entered, release): the next page fetch signals `entered` and waits
    /// for `release`
    gate: AsyncMutex<Option<(Arc<Notify>, Arc<Notify>)>>,
}

impl FakeRemote {
    async fn set_saved(&self, items: Vec<RemoteLibraryItem>) {
        *self.saved.lock().await = items;
    }

    async fn save_newest(&self, item: RemoteLibraryItem) {
        self.saved.lock().await.insert(0, item);
    }

    async fn unsave(&self, external_id: &str) {
        self.saved
            .lock()
            .await
            .retain(|item| item.release.external_id != external_id);
    }

    async fn take_fetches(&self) -> Vec<u32> {
        std::mem::take(&mut *self.fetched_offsets.lock().await)
    }
}

#[async_trait]
impl RemoteLibraryClient for FakeRemote {
    async fn fetch_library_page(
        &self,
        _user: UserId,
        offset: u32,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemoteLibraryItem>> {
        let gate = self.gate.lock().await.take();
        if let Some((entered, release)) = gate {
            entered.notify_one();
            release.notified().await;
        }

        self.fetched_offsets.lock().await.push(offset);

        if *self.fail_at_offset.lock().await == Some(offset) {
            return Err(BridgeError::OperationFailed("remote unavailable".to_string()));
        }

        let saved = self.saved.lock().await;
        let total = saved.len() as u32;
        let start = offset.min(total) as usize;
        let end = (offset + limit).min(total) as usize;

        Ok(RemotePage {
            items: saved[start..end].to_vec(),
            offset,
            limit,
            total,
            has_next: (end as u32) < total,
        })
    }

    async fn fetch_raw_library_page(
        &self,
        user: UserId,
        offset: u32,
        limit: u32,
    ) -> BridgeResult<RemotePage<RemoteRelease>> {
        let page = self.fetch_library_page(user, offset, limit).await?;
        Ok(page.map(|item| item.release))
    }

    async fn check_membership(
        &self,
        _user: UserId,
        external_ids: &[String],
    ) -> BridgeResult<Vec<bool>> {
        *self.membership_calls.lock().await += 1;

        let saved = self.saved.lock().await;
        let mut answers: Vec<bool> = external_ids
            .iter()
            .map(|id| saved.iter().any(|item| &item.release.external_id == id))
            .collect();

        if *self.short_membership_answer.lock().await {
            answers.pop();
        }
        Ok(answers)
    }
}

/// Library repository that records every persisted state.
struct RecordingLibraries {
    inner: SqliteLibraryRepository,
    updates: AsyncMutex<Vec<(LibraryState, i64)>>,
}

impl RecordingLibraries {
    async fn states(&self) -> Vec<LibraryState> {
        self.updates.lock().await.iter().map(|(state, _)| *state).collect()
    }

    async fn clear(&self) {
        self.updates.lock().await.clear();
    }
}

#[async_trait]
impl LibraryRepository for RecordingLibraries {
    async fn find_by_owner(&self, owner: UserId) -> core_library::Result<Option<Library>> {
        self.inner.find_by_owner(owner).await
    }

    async fn insert(&self, library: &Library) -> core_library::Result<()> {
        self.inner.insert(library).await
    }

    async fn update(&self, library: &Library) -> core_library::Result<()> {
        self.updates
            .lock()
            .await
            .push((library.state, library.updated_at));
        self.inner.update(library).await
    }

    async fn find_or_create(&self, owner: UserId, now: i64) -> core_library::Result<Library> {
        self.inner.find_or_create(owner, now).await
    }
}

// ============================================================================
// Harness
// ============================================================================

struct Harness {
    orchestrator: Arc<LibrarySyncOrchestrator>,
    remote: Arc<FakeRemote>,
    libraries: Arc<RecordingLibraries>,
    items: Arc<SqliteLibraryItemRepository>,
    catalog: Arc<SqliteCatalogService>,
    service: LibraryService,
    user: UserId,
}

impl Harness {
    async fn library(&self) -> Library {
        self.service.get_library(self.user).await.unwrap()
    }

    async fn active(&self) -> i64 {
        self.items.count_active(self.user).await.unwrap()
    }

    async fn sync(&self, mode: SyncMode) -> Library {
        self.orchestrator.synchronize(self.user, mode).await.unwrap()
    }

    /// (id, state, added_at) of every active item, in cursor order.
    async fn active_snapshot(&self) -> Vec<(String, ItemState, i64)> {
        self.items
            .find_active_page(self.user, None, 1000)
            .await
            .unwrap()
            .into_iter()
            .map(|item| (item.id.to_string(), item.state, item.added_at))
            .collect()
    }
}

async fn harness() -> Harness {
    let pool = create_test_pool().await.unwrap();
    let clock = Arc::new(ManualClock::with_step(
        Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap(),
        Duration::milliseconds(1),
    ));

    let remote = Arc::new(FakeRemote::default());
    let libraries = Arc::new(RecordingLibraries {
        inner: SqliteLibraryRepository::new(pool.clone()),
        updates: AsyncMutex::new(Vec::new()),
    });
    let items = Arc::new(SqliteLibraryItemRepository::new(pool.clone()));
    let catalog = Arc::new(SqliteCatalogService::new(pool.clone(), clock.clone()));
    let pages = Arc::new(SqlitePageStore::new(pool, clock.clone()));

    let orchestrator = Arc::new(LibrarySyncOrchestrator::new(
        libraries.clone(),
        items.clone(),
        pages,
        remote.clone(),
        clock,
        SyncConfig::default(),
    ));
    let service = LibraryService::new(libraries.clone(), items.clone());

    Harness {
        orchestrator,
        remote,
        libraries,
        items,
        catalog,
        service,
        user: UserId::new(),
    }
}

fn saved_at(minutes_ago: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap() - Duration::minutes(minutes_ago)
}

fn saved_release(external_id: &str, added_at: DateTime<Utc>) -> RemoteLibraryItem {
    RemoteLibraryItem {
        release: RemoteRelease {
            external_id: external_id.to_string(),
            name: format!("Release {}", external_id),
            href: None,
            uri: Some(format!("spotify:album:{}", external_id)),
            album_type: Some("album".to_string()),
            upc: None,
            popularity: None,
            release_date: None,
            genres: vec![],
            images: vec![],
            artists: vec![],
        },
        added_at,
    }
}

/// `count` saves named r0.. with r0 the newest.
fn saved_library(count: usize) -> Vec<RemoteLibraryItem> {
    (0..count)
        .map(|i| saved_release(&format!("r{}", i), saved_at(i as i64)))
        .collect()
}

// ============================================================================
// Tests
// ============================================================================

#[tokio::test]
async fn test_first_sync_imports_every_page() {
    let h = harness().await;
    h.remote.set_saved(saved_library(30)).await;

    let library = h.sync(SyncMode::FirstSync).await;

    assert_eq!(library.state, LibraryState::Imported);
    assert_eq!(h.library().await.state, LibraryState::Imported);
    assert_eq!(h.active().await, 30);
    assert_eq!(h.remote.take_fetches().await, vec![0, 25]);
    assert_eq!(*h.remote.membership_calls.lock().await, 0);
    assert_eq!(
        h.libraries.states().await,
        vec![LibraryState::ImportingAfterFirstPage, LibraryState::Imported]
    );
}

#[tokio::test]
async fn test_incremental_sync_on_fresh_user_creates_library() {
    let h = harness().await;
    h.remote.set_saved(saved_library(3)).await;

    let library = h.sync(SyncMode::Incremental).await;

    assert_eq!(library.state, LibraryState::Updated);
    assert_eq!(h.active().await, 3);
    assert_eq!(
        h.libraries.states().await,
        vec![
            LibraryState::Updating,
            LibraryState::ImportingAfterFirstPage,
            LibraryState::Updated
        ]
    );
}

#[tokio::test]
async fn test_resync_without_changes_is_idempotent() {
    let h = harness().await;
    h.remote.set_saved(saved_library(30)).await;
    let imported = h.sync(SyncMode::FirstSync).await;
    h.remote.take_fetches().await;
    let before = h.active_snapshot().await;
    assert_eq!(before.len(), 30);

    let library = h.sync(SyncMode::Incremental).await;

    assert_eq!(library.state, LibraryState::Updated);
    assert!(library.updated_at > imported.updated_at);
    assert_eq!(h.library().await.updated_at, library.updated_at);
    assert_eq!(h.active_snapshot().await, before);
    assert_eq!(h.items.count_for_owner(h.user).await.unwrap(), 30);
    // nothing new on the first page, so no second fetch
    assert_eq!(h.remote.take_fetches().await, vec![0]);
    // 30 local items in removal pages of 20
    assert_eq!(*h.remote.membership_calls.lock().await, 2);
}

#[tokio::test]
async fn test_removals_are_found_on_every_local_page() {
    let h = harness().await;
    h.remote.set_saved(saved_library(45)).await;
    h.sync(SyncMode::FirstSync).await;

    for gone in ["r0", "r22", "r44"] {
        h.remote.unsave(gone).await;
    }
    let library = h.sync(SyncMode::Incremental).await;

    assert_eq!(library.state, LibraryState::Updated);
    assert_eq!(h.active().await, 42);
    assert_eq!(h.items.count_for_owner(h.user).await.unwrap(), 45);
    assert_eq!(*h.remote.membership_calls.lock().await, 3);

    let release = h.catalog.find_release("r22").await.unwrap().unwrap();
    let item = h
        .items
        .find_by_owner_and_release(h.user, release.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!item.state.is_active());
    assert!(item.state.archived_at().is_some());
}

#[tokio::test]
async fn test_addition_phase_stops_after_page_with_nothing_new() {
    let h = harness().await;
    h.remote.set_saved(saved_library(60)).await;
    h.sync(SyncMode::FirstSync).await;
    assert_eq!(h.remote.take_fetches().await, vec![0, 25, 50]);

    h.remote.save_newest(saved_release("new-1", saved_at(-10))).await;
    h.remote.save_newest(saved_release("new-2", saved_at(-20))).await;
    h.sync(SyncMode::Incremental).await;

    assert_eq!(h.remote.take_fetches().await, vec![0, 25]);
    assert_eq!(h.active().await, 62);
}

#[tokio::test]
async fn test_saves_reported_out_of_order_wait_for_a_later_sync() {
    let h = harness().await;
    h.remote.set_saved(saved_library(60)).await;
    h.sync(SyncMode::FirstSync).await;

    // A new save listed at the very end instead of the front
    h.remote
        .saved
        .lock()
        .await
        .push(saved_release("late", saved_at(-5)));
    h.sync(SyncMode::Incremental).await;
    assert_eq!(h.active().await, 60);
    assert!(h.catalog.find_release("late").await.unwrap().is_none());

    // Surfaces once a sync reaches its page
    h.remote.save_newest(saved_release("fresh", saved_at(-30))).await;
    for i in 0..50 {
        h.remote.unsave(&format!("r{}", i)).await;
    }
    h.sync(SyncMode::Incremental).await;
    assert!(h.catalog.find_release("late").await.unwrap().is_some());
    assert_eq!(h.active().await, 12);
}

#[tokio::test]
async fn test_failed_page_keeps_earlier_pages() {
    let h = harness().await;
    h.remote.set_saved(saved_library(60)).await;
    *h.remote.fail_at_offset.lock().await = Some(25);

    let library = h.sync(SyncMode::FirstSync).await;

    assert_eq!(library.state, LibraryState::ImportFailed);
    assert_eq!(h.active().await, 25);

    let updates = h.libraries.updates.lock().await.clone();
    assert_eq!(
        updates.iter().map(|(state, _)| *state).collect::<Vec<_>>(),
        vec![LibraryState::ImportingAfterFirstPage, LibraryState::ImportFailed]
    );
    // failure does not count as progress
    assert_eq!(updates[0].1, updates[1].1);
    assert_eq!(h.library().await.updated_at, updates[0].1);
}

#[tokio::test]
async fn test_sync_recovers_after_failure() {
    let h = harness().await;
    h.remote.set_saved(saved_library(60)).await;
    *h.remote.fail_at_offset.lock().await = Some(25);
    h.sync(SyncMode::FirstSync).await;

    *h.remote.fail_at_offset.lock().await = None;
    h.remote.take_fetches().await;
    h.libraries.clear().await;
    let library = h.sync(SyncMode::Incremental).await;

    assert_eq!(library.state, LibraryState::Updated);
    assert_eq!(h.active().await, 60);
    // the first page adds nothing, yet the pages the failed run missed are read
    assert_eq!(h.remote.take_fetches().await, vec![0, 25, 50]);
    assert_eq!(
        h.libraries.states().await,
        vec![
            LibraryState::Updating,
            LibraryState::ImportingAfterFirstPage,
            LibraryState::Updated
        ]
    );
}

#[tokio::test]
async fn test_sync_after_clean_finish_stops_early_again() {
    let h = harness().await;
    h.remote.set_saved(saved_library(60)).await;
    *h.remote.fail_at_offset.lock().await = Some(50);
    h.sync(SyncMode::FirstSync).await;
    *h.remote.fail_at_offset.lock().await = None;
    h.sync(SyncMode::Incremental).await;
    assert_eq!(h.active().await, 60);
    h.remote.take_fetches().await;

    h.sync(SyncMode::Incremental).await;

    assert_eq!(h.remote.take_fetches().await, vec![0]);
}

#[tokio::test]
async fn test_failing_entry_leaves_nothing_of_its_page() {
    let h = harness().await;
    let mut saved = saved_library(3);
    saved[2].release.external_id = String::new();
    h.remote.set_saved(saved).await;

    let library = h.sync(SyncMode::FirstSync).await;

    assert_eq!(library.state, LibraryState::ImportFailed);
    assert_eq!(h.items.count_for_owner(h.user).await.unwrap(), 0);
    assert!(h.catalog.find_release("r0").await.unwrap().is_none());
}

#[tokio::test]
async fn test_membership_mismatch_fails_update() {
    let h = harness().await;
    h.remote.set_saved(saved_library(5)).await;
    h.sync(SyncMode::FirstSync).await;

    *h.remote.short_membership_answer.lock().await = true;
    let library = h.sync(SyncMode::Incremental).await;

    assert_eq!(library.state, LibraryState::UpdateFailed);
    assert_eq!(h.active().await, 5);
}

#[tokio::test]
async fn test_collection_tag_survives_archive_and_reactivation() {
    let h = harness().await;
    h.remote.set_saved(saved_library(5)).await;
    h.sync(SyncMode::FirstSync).await;

    let release = h.catalog.find_release("r2").await.unwrap().unwrap();
    assert!(h.service.tag_into_collection(h.user, release.id).await.unwrap());

    h.remote.unsave("r2").await;
    h.sync(SyncMode::Incremental).await;
    let archived = h
        .items
        .find_by_owner_and_release(h.user, release.id)
        .await
        .unwrap()
        .unwrap();
    assert!(!archived.state.is_active());
    assert!(archived.tagged_into_collection);

    h.remote.save_newest(saved_release("r2", saved_at(-60))).await;
    h.sync(SyncMode::Incremental).await;
    let reactivated = h
        .items
        .find_by_owner_and_release(h.user, release.id)
        .await
        .unwrap()
        .unwrap();
    assert!(reactivated.state.is_active());
    assert!(reactivated.tagged_into_collection);
    assert_eq!(reactivated.id, archived.id);
    assert_eq!(reactivated.added_at, saved_at(-60).timestamp_millis());
}

#[tokio::test]
async fn test_concurrent_sync_for_same_user_is_rejected() {
    let h = harness().await;
    h.remote.set_saved(saved_library(3)).await;

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    *h.remote.gate.lock().await = Some((entered.clone(), release.clone()));

    let orchestrator = h.orchestrator.clone();
    let user = h.user;
    let first = tokio::spawn(async move { orchestrator.synchronize(user, SyncMode::FirstSync).await });

    entered.notified().await;
    assert!(h.orchestrator.is_syncing(h.user));

    let second = h.orchestrator.synchronize(h.user, SyncMode::Incremental).await;
    assert!(matches!(second, Err(SyncError::SyncInProgress { .. })));
    let marked = h.orchestrator.mark_in_progress(h.user, SyncMode::Incremental).await;
    assert!(matches!(marked, Err(SyncError::SyncInProgress { .. })));

    // other users are unaffected
    let other = h
        .orchestrator
        .mark_in_progress(UserId::new(), SyncMode::FirstSync)
        .await
        .unwrap();
    assert_eq!(other.state, LibraryState::Importing);

    release.notify_one();
    let library = first.await.unwrap().unwrap();
    assert_eq!(library.state, LibraryState::Imported);
    assert!(!h.orchestrator.is_syncing(h.user));

    // slot is free again
    h.sync(SyncMode::Incremental).await;
}

#[tokio::test]
async fn test_mark_in_progress_sets_mode_state() {
    let h = harness().await;

    let created = h
        .orchestrator
        .mark_in_progress(h.user, SyncMode::FirstSync)
        .await
        .unwrap();
    assert_eq!(created.state, LibraryState::Importing);
    assert_eq!(created.owner_id, h.user);

    let updating = h
        .orchestrator
        .mark_in_progress(h.user, SyncMode::Incremental)
        .await
        .unwrap();
    assert_eq!(updating.id, created.id);
    assert_eq!(updating.state, LibraryState::Updating);
    assert!(updating.updated_at > created.updated_at);
    assert_eq!(h.library().await.state, LibraryState::Updating);
}

#[tokio::test]
async fn test_trigger_sync_runs_in_background() {
    let h = harness().await;
    h.remote.set_saved(saved_library(4)).await;

    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    *h.remote.gate.lock().await = Some((entered.clone(), release.clone()));

    let (library, handle) = h
        .orchestrator
        .trigger_sync(h.user, SyncMode::FirstSync)
        .await
        .unwrap();
    assert_eq!(library.state, LibraryState::Importing);

    entered.notified().await;
    let again = h.orchestrator.trigger_sync(h.user, SyncMode::FirstSync).await;
    assert!(matches!(again, Err(SyncError::SyncInProgress { .. })));

    release.notify_one();
    handle.await.unwrap();

    assert_eq!(h.library().await.state, LibraryState::Imported);
    assert_eq!(h.active().await, 4);
}
