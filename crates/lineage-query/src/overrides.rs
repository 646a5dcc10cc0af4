//! Override point-queries gating click-to-edit.

use serde::Serialize;

use lineage_core::{DerivationPath, OriginType};

use crate::graph::{EdgeKind, LineageGraph};
use crate::resolve::{find_latest_document_with, ResolveOptions};

/// Whether a human edit exists for exactly one path of a document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct OverrideQuery {
    pub has_override: bool,
    /// Document produced by the latest such edit.
    pub override_document_id: Option<String>,
    pub transform_id: Option<String>,
}

/// Look up a human edit of `document_id` whose path equals `path` exactly.
///
/// Edits of a parent or child path do not count: an override of `"[0]"` says
/// nothing about `"[0].title"`. When several exist the most recent wins.
pub fn has_human_transform_for_path(
    graph: &LineageGraph,
    document_id: &str,
    path: &DerivationPath,
) -> OverrideQuery {
    let path = graph.normalize_path(document_id, path);
    graph
        .outgoing(document_id)
        .filter(|e| e.kind == EdgeKind::HumanEdit && e.path.as_ref() == Some(&path))
        .max_by_key(|e| e.recency())
        .map(|e| OverrideQuery {
            has_override: true,
            override_document_id: Some(e.target.clone()),
            transform_id: Some(e.transform_id.clone()),
        })
        .unwrap_or_default()
}

/// Whether an AI-generated document is an unedited leaf that may be promoted
/// to an editable copy. Documents already consumed by any transform may not.
pub fn can_become_editable(graph: &LineageGraph, document_id: &str) -> bool {
    graph.node(document_id).is_some_and(|node| {
        node.document.origin_type == OriginType::AiGenerated
            && node.outgoing.is_empty()
            && node.consumed_by.is_empty()
    })
}

/// What a click on `path` of a document should do.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Editability {
    /// The document is user content; edit it directly.
    EditableInPlace,
    /// An override of this exact path exists; edit that document instead.
    NavigateTo { document_id: String },
    /// An unedited AI leaf; create a human transform to edit a copy.
    Promotable,
    /// Already derived from; `latest` is the newest version of the path, if any.
    ReadOnly { latest: Option<String> },
    Missing,
}

/// Combine the point-queries into a single edit decision.
pub fn editability(
    graph: &LineageGraph,
    document_id: &str,
    path: &DerivationPath,
    options: ResolveOptions,
) -> Editability {
    let Some(node) = graph.node(document_id) else {
        return Editability::Missing;
    };
    if node.document.is_user_input() {
        return Editability::EditableInPlace;
    }

    let query = has_human_transform_for_path(graph, document_id, path);
    if let Some(target) = query.override_document_id {
        return Editability::NavigateTo { document_id: target };
    }

    if can_become_editable(graph, document_id) {
        return Editability::Promotable;
    }

    let resolved = find_latest_document_with(graph, Some(document_id), path, options);
    let latest = resolved.document_id.filter(|_| resolved.depth > 0);
    Editability::ReadOnly { latest }
}
