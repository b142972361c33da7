//! # Library Sync
//!
//! Reconciles a user's remote library with the local mirror.
//!
//! - **Orchestrator** (`orchestrator`): two-phase sync, library state machine,
//!   per-user single-flight
//! - **Reconciler** (`reconciler`): applies one remote or local page to the mirror
//! - **Mode** (`mode`): first import vs. incremental update

pub mod error;
pub mod mode;
pub mod orchestrator;
pub mod reconciler;

pub use error::{Result, SyncError};
pub use mode::SyncMode;
pub use orchestrator::{LibrarySyncOrchestrator, SyncConfig};
pub use reconciler::{PageOutcome, PageReconciler};
