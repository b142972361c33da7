//! # Page Reconciler
//!
//! Applies one page at a time to the local mirror:
//! - [`PageReconciler::reconcile_page`] upserts a page of remote entries;
//! - [`PageReconciler::mark_removal_candidates`] archives local items the
//!   remote no longer has.
//!
//! Each call runs in one [`PageTransaction`](core_library::repositories::PageTransaction):
//! a page either lands whole or not at all. Neither touches the library
//! state machine.

use crate::error::{Result, SyncError};
use bridge_traits::time::Clock;
use core_auth::UserId;
use core_library::repositories::PageStore;
use core_library::{
    ItemState, Library, LibraryError, LibraryItem, RemoteLibraryClient, RemoteLibraryItem,
};
use std::sync::Arc;
use tracing::{debug, instrument};

/// What a reconciled page did to the mirror.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageOutcome {
    /// Items seen for the first time
    pub created: usize,
    /// Archived items the remote reports again
    pub reactivated: usize,
    /// Active items seen again
    pub refreshed: usize,
}

impl PageOutcome {
    /// Whether the page contributed anything new to the mirror.
    pub fn added_any(&self) -> bool {
        self.created + self.reactivated > 0
    }
}

pub struct PageReconciler {
    pages: Arc<dyn PageStore>,
    remote: Arc<dyn RemoteLibraryClient>,
    clock: Arc<dyn Clock>,
}

impl PageReconciler {
    pub fn new(
        pages: Arc<dyn PageStore>,
        remote: Arc<dyn RemoteLibraryClient>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pages,
            remote,
            clock,
        }
    }

    /// Upsert a page of remote entries into `library`.
    ///
    /// Known active items get their `added_at` refreshed, archived ones are
    /// reactivated, unknown ones are created. Collection tags are left alone.
    #[instrument(skip(self, library, remote_items), fields(user_id = %user, entries = remote_items.len()))]
    pub async fn reconcile_page(
        &self,
        user: UserId,
        library: &Library,
        remote_items: &[RemoteLibraryItem],
    ) -> Result<PageOutcome> {
        if library.owner_id != user {
            return Err(LibraryError::InvalidInput {
                field: "library".to_string(),
                message: format!("library {} is not owned by {}", library.id, user),
            }
            .into());
        }

        let now = self.clock.unix_timestamp_millis();
        let mut outcome = PageOutcome::default();
        let mut page = self.pages.begin_page().await?;

        for entry in remote_items {
            let release_id = page.find_or_create_release(&entry.release).await?;
            let added_at = entry.added_at.timestamp_millis();

            match page.find_item(user, release_id).await? {
                Some(mut existing) => match existing.state {
                    ItemState::Active => {
                        if existing.added_at != added_at {
                            existing.added_at = added_at;
                            page.update_sync_fields(&existing).await?;
                        }
                        outcome.refreshed += 1;
                    }
                    ItemState::Archived { .. } => {
                        existing.state = ItemState::Active;
                        existing.added_at = added_at;
                        page.update_sync_fields(&existing).await?;
                        outcome.reactivated += 1;
                    }
                },
                None => {
                    let item = LibraryItem::new_active(
                        library,
                        release_id,
                        entry.release.external_id.clone(),
                        added_at,
                        now,
                    );
                    page.insert_item(&item).await?;
                    outcome.created += 1;
                }
            }
        }

        page.commit().await?;
        debug!(
            created = outcome.created,
            reactivated = outcome.reactivated,
            refreshed = outcome.refreshed,
            "Reconciled remote page"
        );

        Ok(outcome)
    }

    /// Archive the items of `items` the remote library no longer contains.
    ///
    /// Returns how many were archived.
    ///
    /// # Errors
    ///
    /// [`SyncError::MembershipMismatch`] if the remote answers with a
    /// different number of entries than ids asked for.
    #[instrument(skip(self, items), fields(user_id = %user, items = items.len()))]
    pub async fn mark_removal_candidates(&self, user: UserId, items: &[LibraryItem]) -> Result<usize> {
        if items.is_empty() {
            return Ok(0);
        }

        let external_ids: Vec<String> = items
            .iter()
            .map(|item| item.release_external_id.clone())
            .collect();

        let still_saved = self.remote.check_membership(user, &external_ids).await?;
        if still_saved.len() != external_ids.len() {
            return Err(SyncError::MembershipMismatch {
                expected: external_ids.len(),
                actual: still_saved.len(),
            });
        }

        let now = self.clock.unix_timestamp_millis();
        let mut archived = 0;
        let mut page = self.pages.begin_page().await?;

        for (item, saved) in items.iter().zip(still_saved) {
            if saved || !item.state.is_active() {
                continue;
            }

            let mut item = item.clone();
            item.state = ItemState::Archived { archived_at: now };
            page.update_sync_fields(&item).await?;
            archived += 1;
        }

        page.commit().await?;
        debug!(archived, "Checked page for removals");
        Ok(archived)
    }
}
