//! # Library Sync Orchestrator
//!
//! Runs the two-phase reconciliation of a user's remote library against the
//! local mirror and drives the library state machine:
//!
//! ```text
//! FirstSync:   IMPORTING -> IMPORTING_AFTER_FIRST_PAGE -> IMPORTED | IMPORT_FAILED
//! Incremental: UPDATING  -> IMPORTING_AFTER_FIRST_PAGE -> UPDATED  | UPDATE_FAILED
//! ```
//!
//! 1. **Removals** (incremental only): page through the mirror's active items
//!    and archive those the remote no longer contains.
//! 2. **Additions**: page through the remote library, newest first, and upsert
//!    each page until one adds nothing or the remote runs out.
//!
//! Every page is committed on its own. A failure in either phase is recorded
//! as the mode's failed state and logged; the caller still gets the library
//! back, and pages committed before the failure are kept.
//!
//! The addition phase stops early only when the previous run finished
//! cleanly. After a failed or interrupted run (the library is left in a
//! failed or in-progress state) the next sync walks every remote page, so the
//! pages the broken run never reached are imported. Calling
//! [`LibrarySyncOrchestrator::mark_in_progress`] before
//! [`LibrarySyncOrchestrator::synchronize`] therefore also walks every page.
//!
//! At most one sync runs per user. A second attempt is refused with
//! [`SyncError::SyncInProgress`], never queued.

use crate::error::{Result, SyncError};
use crate::mode::SyncMode;
use crate::reconciler::{PageOutcome, PageReconciler};
use bridge_traits::time::Clock;
use core_auth::UserId;
use core_library::repositories::{LibraryItemRepository, LibraryRepository, PageStore};
use core_library::{Library, LibraryItem, LibraryState, RemoteLibraryClient};
use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument};

pub const DEFAULT_REMOVAL_PAGE_SIZE: u32 = 20;
pub const DEFAULT_ADDITION_PAGE_SIZE: u32 = 25;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Local items checked against the remote per membership call
    pub removal_page_size: u32,
    /// Remote entries fetched per page
    pub addition_page_size: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            removal_page_size: DEFAULT_REMOVAL_PAGE_SIZE,
            addition_page_size: DEFAULT_ADDITION_PAGE_SIZE,
        }
    }
}

/// Totals of one sync run, for logging.
#[derive(Debug, Default)]
struct SyncSummary {
    archived: usize,
    created: usize,
    reactivated: usize,
    refreshed: usize,
    pages: usize,
}

impl SyncSummary {
    fn absorb(&mut self, outcome: PageOutcome) {
        self.created += outcome.created;
        self.reactivated += outcome.reactivated;
        self.refreshed += outcome.refreshed;
        self.pages += 1;
    }
}

/// How far the addition phase pages through the remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AdditionSweep {
    /// Stop at the first page that adds nothing
    UntilUnchanged,
    /// Walk every page the remote reports
    Exhaustive,
}

impl AdditionSweep {
    fn after(previous: LibraryState) -> Self {
        if previous.is_in_progress() || previous.is_failed() {
            Self::Exhaustive
        } else {
            Self::UntilUnchanged
        }
    }
}

type Slots = HashMap<UserId, Arc<Mutex<()>>>;

/// Per-user single-flight slots. An entry lives only while its sync runs.
#[derive(Default)]
struct SyncSlots {
    slots: Arc<StdMutex<Slots>>,
}

impl SyncSlots {
    fn claim(&self, user: UserId) -> Option<SyncClaim> {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        let guard = slots.entry(user).or_default().clone().try_lock_owned().ok()?;

        Some(SyncClaim {
            user,
            slots: Arc::clone(&self.slots),
            guard: Some(guard),
        })
    }

    fn is_held(&self, user: UserId) -> bool {
        let slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        slots
            .get(&user)
            .is_some_and(|slot| slot.try_lock().is_err())
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A held slot; dropping it frees the user's slot.
struct SyncClaim {
    user: UserId,
    slots: Arc<StdMutex<Slots>>,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SyncClaim {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(PoisonError::into_inner);
        self.guard.take();
        if slots
            .get(&self.user)
            .is_some_and(|slot| Arc::strong_count(slot) == 1)
        {
            slots.remove(&self.user);
        }
    }
}

pub struct LibrarySyncOrchestrator {
    libraries: Arc<dyn LibraryRepository>,
    items: Arc<dyn LibraryItemRepository>,
    remote: Arc<dyn RemoteLibraryClient>,
    reconciler: PageReconciler,
    clock: Arc<dyn Clock>,
    config: SyncConfig,
    active: SyncSlots,
}

impl LibrarySyncOrchestrator {
    pub fn new(
        libraries: Arc<dyn LibraryRepository>,
        items: Arc<dyn LibraryItemRepository>,
        pages: Arc<dyn PageStore>,
        remote: Arc<dyn RemoteLibraryClient>,
        clock: Arc<dyn Clock>,
        config: SyncConfig,
    ) -> Self {
        let reconciler = PageReconciler::new(pages, Arc::clone(&remote), Arc::clone(&clock));

        Self {
            libraries,
            items,
            remote,
            reconciler,
            clock,
            config,
            active: SyncSlots::default(),
        }
    }

    /// Persist the mode's in-progress state, creating the library if needed.
    ///
    /// # Errors
    ///
    /// [`SyncError::SyncInProgress`] while a sync for `user` is running.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn mark_in_progress(&self, user: UserId, mode: SyncMode) -> Result<Library> {
        let _claim = self.claim(user)?;
        let (library, _) = self.persist_in_progress(user, mode).await?;
        Ok(library)
    }

    /// Run a full synchronization for `user` and return the resulting library.
    ///
    /// Remote failures end in the mode's failed state and still return
    /// `Ok`. `Err` means the sync never started, or its outcome could not be
    /// recorded.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn synchronize(&self, user: UserId, mode: SyncMode) -> Result<Library> {
        let _claim = self.claim(user)?;
        let (library, previous) = self.persist_in_progress(user, mode).await?;
        self.run(user, mode, library, AdditionSweep::after(previous)).await
    }

    /// Mark the sync as started and run it on a background task.
    ///
    /// The returned library is already in the in-progress state. The task
    /// holds the user's slot until it finishes.
    #[instrument(skip(self), fields(user_id = %user))]
    pub async fn trigger_sync(
        self: &Arc<Self>,
        user: UserId,
        mode: SyncMode,
    ) -> Result<(Library, JoinHandle<()>)> {
        let claim = self.claim(user)?;
        let (library, previous) = self.persist_in_progress(user, mode).await?;

        let orchestrator = Arc::clone(self);
        let started = library.clone();
        let handle = tokio::spawn(async move {
            let _claim = claim;
            let sweep = AdditionSweep::after(previous);
            if let Err(e) = orchestrator.run(user, mode, started, sweep).await {
                error!(user_id = %user, %mode, error = %e, "Background library sync failed");
            }
        });

        Ok((library, handle))
    }

    /// Whether a sync currently holds the user's slot.
    pub fn is_syncing(&self, user: UserId) -> bool {
        self.active.is_held(user)
    }

    fn claim(&self, user: UserId) -> Result<SyncClaim> {
        self.active.claim(user).ok_or_else(|| {
            debug!(user_id = %user, "Sync already running");
            SyncError::SyncInProgress {
                user_id: user.to_string(),
            }
        })
    }

    /// Returns the library and the state it had before.
    async fn persist_in_progress(
        &self,
        user: UserId,
        mode: SyncMode,
    ) -> Result<(Library, LibraryState)> {
        let now = self.clock.unix_timestamp_millis();
        let mut library = self.libraries.find_or_create(user, now).await?;
        let previous = library.state;

        let target = mode.in_progress_state();
        if library.state != target {
            library.state = target;
            library.updated_at = now;
            self.libraries.update(&library).await?;
        }

        Ok((library, previous))
    }

    async fn run(
        &self,
        user: UserId,
        mode: SyncMode,
        mut library: Library,
        sweep: AdditionSweep,
    ) -> Result<Library> {
        info!(user_id = %user, %mode, library_id = %library.id, ?sweep, "Library sync started");

        let outcome = match self.reconcile(user, mode, &mut library, sweep).await {
            Ok(summary) => {
                library.state = mode.done_state();
                library.updated_at = self.clock.unix_timestamp_millis();
                self.libraries
                    .update(&library)
                    .await
                    .map(|_| summary)
                    .map_err(SyncError::from)
            }
            Err(e) => Err(e),
        };

        match outcome {
            Ok(summary) => {
                info!(
                    user_id = %user,
                    %mode,
                    archived = summary.archived,
                    created = summary.created,
                    reactivated = summary.reactivated,
                    refreshed = summary.refreshed,
                    pages = summary.pages,
                    "Library sync finished"
                );
            }
            Err(e) => {
                error!(user_id = %user, %mode, error = %e, "Library sync failed");
                library.state = mode.failed_state();
                self.libraries.update(&library).await?;
            }
        }

        Ok(library)
    }

    async fn reconcile(
        &self,
        user: UserId,
        mode: SyncMode,
        library: &mut Library,
        sweep: AdditionSweep,
    ) -> Result<SyncSummary> {
        let mut summary = SyncSummary::default();

        if mode.runs_removal_phase() {
            summary.archived = self.removal_phase(user).await?;
        }

        self.addition_phase(user, library, sweep, &mut summary).await?;
        Ok(summary)
    }

    async fn removal_phase(&self, user: UserId) -> Result<usize> {
        info!(user_id = %user, "Phase 1: removals");

        let page_size = self.config.removal_page_size;
        let mut cursor = None;
        let mut archived = 0;

        loop {
            let page = self
                .items
                .find_active_page(user, cursor, page_size)
                .await?;

            archived += self.reconciler.mark_removal_candidates(user, &page).await?;

            if page.len() < page_size as usize {
                break;
            }
            cursor = page.last().map(LibraryItem::cursor);
        }

        debug!(user_id = %user, archived, "Removal phase done");
        Ok(archived)
    }

    async fn addition_phase(
        &self,
        user: UserId,
        library: &mut Library,
        sweep: AdditionSweep,
        summary: &mut SyncSummary,
    ) -> Result<()> {
        info!(user_id = %user, "Phase 2: additions");

        let page_size = self.config.addition_page_size;
        let mut offset = 0;

        loop {
            let page = self
                .remote
                .fetch_library_page(user, offset, page_size)
                .await?;
            let outcome = self
                .reconciler
                .reconcile_page(user, library, &page.items)
                .await?;
            summary.absorb(outcome);

            if summary.pages == 1 {
                library.state = LibraryState::ImportingAfterFirstPage;
                library.updated_at = self.clock.unix_timestamp_millis();
                self.libraries.update(library).await?;
            }

            debug!(
                user_id = %user,
                offset,
                fetched = page.items.len(),
                created = outcome.created,
                reactivated = outcome.reactivated,
                has_next = page.has_next,
                "Addition page applied"
            );

            // The remote lists saves newest first: after a clean run, once a
            // page adds nothing every later page is already mirrored. Saves
            // reported out of that order wait for a page that adds something.
            let unchanged = sweep == AdditionSweep::UntilUnchanged && !outcome.added_any();
            if unchanged || !page.has_next {
                break;
            }
            offset += page.items.len() as u32;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_is_exhaustive_after_broken_run() {
        assert_eq!(AdditionSweep::after(LibraryState::ImportFailed), AdditionSweep::Exhaustive);
        assert_eq!(AdditionSweep::after(LibraryState::UpdateFailed), AdditionSweep::Exhaustive);
        assert_eq!(AdditionSweep::after(LibraryState::Updating), AdditionSweep::Exhaustive);
        assert_eq!(AdditionSweep::after(LibraryState::Imported), AdditionSweep::UntilUnchanged);
        assert_eq!(AdditionSweep::after(LibraryState::Updated), AdditionSweep::UntilUnchanged);
    }

    #[test]
    fn test_claim_is_exclusive_per_user() {
        let slots = SyncSlots::default();
        let user = UserId::new();

        let claim = slots.claim(user).unwrap();
        assert!(slots.is_held(user));
        assert!(slots.claim(user).is_none());
        assert!(slots.claim(UserId::new()).is_some());

        drop(claim);
        assert!(!slots.is_held(user));
        assert!(slots.claim(user).is_some());
    }

    #[test]
    fn test_released_slots_are_removed() {
        let slots = SyncSlots::default();
        let users: Vec<UserId> = (0..5).map(|_| UserId::new()).collect();

        let claims: Vec<SyncClaim> = users.iter().filter_map(|user| slots.claim(*user)).collect();
        assert_eq!(slots.len(), 5);

        let refused = slots.claim(users[0]);
        assert!(refused.is_none());
        assert_eq!(slots.len(), 5);

        drop(claims);
        assert_eq!(slots.len(), 0);
    }
}
