//! lineage-core - Core types and traits for script lineage resolution
//!
//! This crate provides the row types mirrored from the project store, typed
//! document content, the derivation path language, versioned snapshots, and the
//! error handling used throughout the workspace.

pub mod config;
pub mod content;
pub mod error;
pub mod path;
pub mod snapshot;
pub mod traits;
pub mod types;

pub use config::*;
pub use content::{normalize_for_schema, DocumentContent, StoryIdea};
pub use error::{LineageError, Result};
pub use path::{DerivationPath, PathParseError, PathSegment};
pub use snapshot::{CompleteRows, Fingerprint, Loadable, RowCollections, Snapshot, SnapshotStatus};
pub use traits::*;
pub use types::*;
