use core_library::LibraryState;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which kind of synchronization is running.
///
/// Each mode has its own in-progress, done and failed library states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SyncMode {
    /// Initial import; the removal phase is skipped.
    FirstSync,
    /// Re-sync of an existing mirror.
    Incremental,
}

impl SyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncMode::FirstSync => "first_sync",
            SyncMode::Incremental => "incremental",
        }
    }

    pub fn in_progress_state(&self) -> LibraryState {
        match self {
            SyncMode::FirstSync => LibraryState::Importing,
            SyncMode::Incremental => LibraryState::Updating,
        }
    }

    pub fn done_state(&self) -> LibraryState {
        match self {
            SyncMode::FirstSync => LibraryState::Imported,
            SyncMode::Incremental => LibraryState::Updated,
        }
    }

    pub fn failed_state(&self) -> LibraryState {
        match self {
            SyncMode::FirstSync => LibraryState::ImportFailed,
            SyncMode::Incremental => LibraryState::UpdateFailed,
        }
    }

    pub fn runs_removal_phase(&self) -> bool {
        *self != SyncMode::FirstSync
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
