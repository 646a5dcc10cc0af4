//! lineage-sync - Snapshot plumbing between a row source and the lineage engine
//!
//! Row collections arrive table by table; this crate assembles them into
//! versioned snapshots, overlays locally pending writes until the server
//! catches up, and coalesces rapid in-place edits before they reach the
//! mutation sink.

mod debounce;
mod feed;
mod overlay;

pub use debounce::UpdateDebouncer;
pub use feed::{load_snapshot, SnapshotFeed, TableUpdate};
pub use overlay::{reconcile, reconcile_snapshot, PendingOverlay, Reconciled};
