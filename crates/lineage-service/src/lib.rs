//! lineage-service - Tool facade over the lineage store and engine
//!
//! This crate exposes lineage queries and edit operations as tools returning
//! plain-text results, for use from the command line or an assistant.
//!
//! # Tools
//!
//! - `lineage_resolve` - Find the latest version of a document path
//! - `lineage_canonical` - Show the canonical document of each category
//! - `lineage_override` - Check for a human edit of an exact path
//! - `lineage_editable` - Decide what editing a path should do
//! - `lineage_edit` - Create a human transform for a path
//! - `lineage_update` - Update a user-input document in place
//! - `lineage_history` - List the lineage chain of a document path

mod service;

pub use service::{
    CanonicalParams, EditParams, LineageService, PathParams, ServiceInfo, ToolInfo, ToolResult,
    UpdateParams,
};
