//! lineage-query - Lineage graph and latest-version resolution
//!
//! This crate derives read-only views from a project snapshot: the lineage
//! graph of documents and transforms, the latest version of any document
//! path, and the canonical document of each story category.
//!
//! # Features
//!
//! - Graph construction that tolerates dangling and duplicate rows
//! - Path resolution across human edits and collection splits
//! - Canonical selection with explicit ambiguity
//! - Exact-path override queries for click-to-edit
//! - A memoized engine keyed on snapshot versions
//!
//! # Example
//!
//! ```rust,ignore
//! use lineage_query::{LineageEngine, ResolveOptions};
//!
//! let mut engine = LineageEngine::new(ResolveOptions::default());
//! engine.refresh(&snapshot);
//! let latest = engine.resolve(Some(&doc_id), &"[0]".parse()?);
//! ```

mod canonical;
mod category;
mod engine;
#[cfg(test)]
mod fixtures;
mod graph;
mod overrides;
mod resolve;

pub use canonical::{compute_canonical_context, CanonicalContext, CanonicalDocument, CanonicalSlot};
pub use category::CanonicalCategory;
pub use engine::{Derived, LineageEngine, LineageState, LineageView, Refresh};
pub use graph::{build_lineage_graph, EdgeKind, GraphAnomaly, LineageEdge, LineageGraph, LineageNode};
pub use overrides::{can_become_editable, editability, has_human_transform_for_path, Editability, OverrideQuery};
pub use resolve::{find_latest_document, find_latest_document_with, LineageStep, ResolveOptions, ResolvedDocument};
