//! Latest-version resolution along a lineage chain.

use std::collections::HashSet;

use serde::Serialize;
use tracing::{trace, warn};

use lineage_core::{DerivationPath, ResolverConfig};

use crate::graph::{EdgeKind, LineageEdge, LineageGraph};

/// Resolver limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolveOptions {
    /// Maximum number of hops followed.
    pub max_depth: usize,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self::from(&ResolverConfig::default())
    }
}

impl From<&ResolverConfig> for ResolveOptions {
    fn from(config: &ResolverConfig) -> Self {
        Self {
            max_depth: config.max_depth,
        }
    }
}

/// One document visited while resolving.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineageStep {
    pub document_id: String,
    pub depth: usize,
    /// The requested path as interpreted at this document.
    pub path: DerivationPath,
    /// Transform that led here. `None` for the starting document.
    pub via_transform: Option<String>,
}

/// Result of [`find_latest_document`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedDocument {
    /// Deepest reachable document. `None` when the start is absent or unknown.
    pub document_id: Option<String>,
    /// Path as interpreted at `document_id`.
    pub path: DerivationPath,
    pub depth: usize,
    /// Visited documents, starting document first.
    pub lineage_path: Vec<LineageStep>,
}

impl ResolvedDocument {
    fn not_found(path: &DerivationPath) -> Self {
        Self {
            document_id: None,
            path: path.clone(),
            depth: 0,
            lineage_path: Vec::new(),
        }
    }

    pub fn is_found(&self) -> bool {
        self.document_id.is_some()
    }
}

/// Find the latest version of `path` within `source_document_id`.
///
/// Never fails. An absent or unknown source yields a result with no document.
pub fn find_latest_document(
    graph: &LineageGraph,
    source_document_id: Option<&str>,
    path: &DerivationPath,
) -> ResolvedDocument {
    find_latest_document_with(graph, source_document_id, path, ResolveOptions::default())
}

/// [`find_latest_document`] with explicit limits.
pub fn find_latest_document_with(
    graph: &LineageGraph,
    source_document_id: Option<&str>,
    path: &DerivationPath,
    options: ResolveOptions,
) -> ResolvedDocument {
    let Some(start) = source_document_id.filter(|id| graph.contains(id)) else {
        trace!("Resolve from missing document {:?}", source_document_id);
        return ResolvedDocument::not_found(path);
    };

    let mut current = start.to_string();
    let mut current_path = graph.normalize_path(start, path);
    let mut depth = 0;
    let mut visited = HashSet::from([current.clone()]);
    let mut lineage_path = vec![LineageStep {
        document_id: current.clone(),
        depth,
        path: current_path.clone(),
        via_transform: None,
    }];

    loop {
        if depth >= options.max_depth {
            warn!(
                "Resolution from {} stopped at depth limit {}",
                start, options.max_depth
            );
            break;
        }

        let Some((edge, remainder)) = best_edge(graph, &current, &current_path) else {
            break;
        };
        if visited.contains(&edge.target) {
            warn!(
                "Cycle detected while resolving from {}: {} revisits {}",
                start, edge.transform_id, edge.target
            );
            break;
        }

        depth += 1;
        current = edge.target.clone();
        current_path = graph.normalize_path(&current, &remainder);
        visited.insert(current.clone());
        lineage_path.push(LineageStep {
            document_id: current.clone(),
            depth,
            path: current_path.clone(),
            via_transform: Some(edge.transform_id.clone()),
        });
    }

    ResolvedDocument {
        document_id: Some(current),
        path: current_path,
        depth,
        lineage_path,
    }
}

/// The sub-path of the source an edge carries forward, if it can carry `requested`.
fn edge_scope(graph: &LineageGraph, edge: &LineageEdge) -> Option<DerivationPath> {
    let source = graph.document(&edge.source)?;
    match (&edge.kind, &edge.path) {
        (EdgeKind::HumanEdit | EdgeKind::Split, Some(path)) => {
            if path.leading_index().is_some() && !graph.is_collection(&edge.source) {
                None
            } else {
                Some(path.clone())
            }
        }
        // Untyped derivations only continue a chain of the same schema.
        _ => {
            let target = graph.document(&edge.target)?;
            (source.schema_type == target.schema_type).then(DerivationPath::root)
        }
    }
}

type Rank = (bool, usize, bool, u64, usize);

/// Pick the outgoing edge to follow for `requested` at `id`.
///
/// Compatible edges cover the requested path (their scope is a prefix of it).
/// Preference: exact scope, then the most specific scope, then human over AI,
/// then the most recent transform.
fn best_edge<'g>(
    graph: &'g LineageGraph,
    id: &str,
    requested: &DerivationPath,
) -> Option<(&'g LineageEdge, DerivationPath)> {
    let mut best: Option<(Rank, &'g LineageEdge, DerivationPath)> = None;

    for edge in graph.outgoing(id) {
        let Some(scope) = edge_scope(graph, edge) else {
            continue;
        };
        let Some(remainder) = requested.strip_prefix(&scope) else {
            continue;
        };
        let rank = (
            scope == *requested,
            scope.len(),
            edge.is_human(),
            edge.created_at,
            edge.order,
        );
        // Outgoing edges are sorted by recency and target, so `>=` keeps the
        // last of equal candidates and stays deterministic.
        if best.as_ref().map_or(true, |(r, _, _)| rank >= *r) {
            best = Some((rank, edge, remainder));
        }
    }

    best.map(|(_, edge, remainder)| (edge, remainder))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use lineage_core::{SchemaType, TransformType};
    use serde_json::json;

    fn p(s: &str) -> DerivationPath {
        s.parse().unwrap()
    }

    fn resolve(graph: &LineageGraph, id: &str, path: &str) -> ResolvedDocument {
        find_latest_document(graph, Some(id), &p(path))
    }

    #[test]
    fn test_linear_edit_chain() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({"title": "X"}))
            .user_doc("B", SchemaType::OutlineSettings, json!({"title": "Y"}))
            .human("t1", "A", "$", "B");
        let graph = fx.graph();

        let resolved = resolve(&graph, "A", "$");
        assert_eq!(resolved.document_id.as_deref(), Some("B"));
        assert_eq!(resolved.depth, 1);
        assert!(resolved.path.is_root());
        let ids: Vec<_> = resolved.lineage_path.iter().map(|s| s.document_id.as_str()).collect();
        assert_eq!(ids, vec!["A", "B"]);
        assert_eq!(resolved.lineage_path[1].via_transform.as_deref(), Some("t1"));
    }

    #[test]
    fn test_no_edit_identity() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::Chronicles, json!({}));
        let resolved = resolve(&fx.graph(), "A", "$");
        assert_eq!(resolved.document_id.as_deref(), Some("A"));
        assert_eq!(resolved.depth, 0);
        assert_eq!(resolved.lineage_path.len(), 1);
    }

    #[test]
    fn test_missing_source_is_degenerate() {
        let graph = Fixture::new().graph();
        for resolved in [
            find_latest_document(&graph, None, &DerivationPath::root()),
            find_latest_document(&graph, Some("nope"), &DerivationPath::root()),
        ] {
            assert_eq!(resolved.document_id, None);
            assert_eq!(resolved.depth, 0);
            assert!(resolved.lineage_path.is_empty());
            assert!(!resolved.is_found());
        }
    }

    #[test]
    fn test_collection_split() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}, {"title": "b"}]}))
            .ai_doc("D0", SchemaType::Idea, json!({"title": "a"}))
            .ai_doc("D1", SchemaType::Idea, json!({"title": "b"}))
            .ai("t1", &["C"], &["D0", "D1"]);
        let graph = fx.graph();

        assert_eq!(resolve(&graph, "C", "[0]").document_id.as_deref(), Some("D0"));
        assert_eq!(resolve(&graph, "C", "[1]").document_id.as_deref(), Some("D1"));
        // Nothing was split out for index 2.
        assert_eq!(resolve(&graph, "C", "[2]").document_id.as_deref(), Some("C"));
        // The whole collection was never replaced.
        assert_eq!(resolve(&graph, "C", "$").document_id.as_deref(), Some("C"));
    }

    #[test]
    fn test_path_becomes_relative_after_split() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}]}))
            .user_doc("E", SchemaType::Idea, json!({"title": "a2"}))
            .human("t1", "C", "[0]", "E")
            .user_doc("F", SchemaType::Idea, json!({"title": "a3"}))
            .human("t2", "E", "$", "F");
        let graph = fx.graph();

        let resolved = resolve(&graph, "C", "[0].title");
        assert_eq!(resolved.document_id.as_deref(), Some("F"));
        assert_eq!(resolved.path, p("title"));
        assert_eq!(resolved.lineage_path[1].path, p("title"));
    }

    #[test]
    fn test_whole_document_edit_covers_sub_paths() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}]}))
            .user_doc("C2", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a!"}]}))
            .human("t1", "C", "$", "C2");
        let resolved = resolve(&fx.graph(), "C", "[0]");
        assert_eq!(resolved.document_id.as_deref(), Some("C2"));
        assert_eq!(resolved.path, p("[0]"));
    }

    #[test]
    fn test_sibling_field_edit_is_not_followed() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}]}))
            .user_doc("T", SchemaType::UserInput, json!({"title": "a2"}))
            .human("t1", "C", "[0].title", "T");
        let graph = fx.graph();
        assert_eq!(resolve(&graph, "C", "[0]").document_id.as_deref(), Some("C"));
        assert_eq!(resolve(&graph, "C", "[0].title").document_id.as_deref(), Some("T"));
    }

    #[test]
    fn test_human_over_ai_for_same_path() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .user_doc("H", SchemaType::OutlineSettings, json!({}))
            .ai_doc("G", SchemaType::OutlineSettings, json!({}))
            .human("t1", "A", "$", "H")
            // Regeneration recorded after the edit.
            .ai("t2", &["A"], &["G"]);
        let graph = fx.graph();
        assert_eq!(resolve(&graph, "A", "$").document_id.as_deref(), Some("H"));
    }

    #[test]
    fn test_most_recent_human_override_wins() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .user_doc("B1", SchemaType::OutlineSettings, json!({}))
            .user_doc("B2", SchemaType::OutlineSettings, json!({}))
            .human("t1", "A", "$", "B1")
            .human("t2", "A", "$", "B2");
        assert_eq!(resolve(&fx.graph(), "A", "$").document_id.as_deref(), Some("B2"));
    }

    #[test]
    fn test_same_timestamp_falls_back_to_row_order() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .user_doc("B1", SchemaType::OutlineSettings, json!({}))
            .user_doc("B2", SchemaType::OutlineSettings, json!({}))
            .human("t1", "A", "$", "B1")
            .transform_at_same_time("t2", TransformType::Human)
            .human_row("t2", "A", "$", "B2")
            .input("t2", "A")
            .output("t2", "B2");
        let graph = fx.graph();
        assert_eq!(resolve(&graph, "A", "$").document_id.as_deref(), Some("B2"));
    }

    #[test]
    fn test_determinism_and_monotonic_depth() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::Chronicles, json!({}));
        let mut prev = "A".to_string();
        for i in 0..5 {
            let id = format!("N{}", i);
            fx.user_doc(&id, SchemaType::Chronicles, json!({}))
                .human(&format!("t{}", i), &prev, "$", &id);
            prev = id;
        }
        let graph = fx.graph();

        let first = resolve(&graph, "A", "$");
        assert_eq!(first, resolve(&graph, "A", "$"));
        assert_eq!(first.document_id.as_deref(), Some("N4"));
        assert!(first
            .lineage_path
            .windows(2)
            .all(|w| w[1].depth == w[0].depth + 1));
    }

    #[test]
    fn test_depth_limit() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::Chronicles, json!({}))
            .user_doc("B", SchemaType::Chronicles, json!({}))
            .user_doc("C", SchemaType::Chronicles, json!({}))
            .human("t1", "A", "$", "B")
            .human("t2", "B", "$", "C");
        let resolved = find_latest_document_with(
            &fx.graph(),
            Some("A"),
            &DerivationPath::root(),
            ResolveOptions { max_depth: 1 },
        );
        assert_eq!(resolved.document_id.as_deref(), Some("B"));
    }

    #[test]
    fn test_cycle_stops_resolution() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .user_doc("B", SchemaType::OutlineSettings, json!({}))
            .human("t1", "A", "$", "B")
            .human("t2", "B", "$", "A");
        let resolved = resolve(&fx.graph(), "A", "$");
        assert_eq!(resolved.document_id.as_deref(), Some("B"));
        assert_eq!(resolved.depth, 1);
    }

    #[test]
    fn test_cross_schema_derivation_is_not_a_new_version() {
        let mut fx = Fixture::new();
        fx.ai_doc("I", SchemaType::Idea, json!({}))
            .ai_doc("O", SchemaType::OutlineSettings, json!({}))
            .ai("t1", &["I"], &["O"]);
        assert_eq!(resolve(&fx.graph(), "I", "$").document_id.as_deref(), Some("I"));
    }

    #[test]
    fn test_free_form_copy_of_collection_splits_like_a_collection() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}]}))
            .user_doc("C2", SchemaType::UserInput, json!({"ideas": [{"title": "a!"}]}))
            .human("t1", "C", "$", "C2")
            .user_doc("E", SchemaType::UserInput, json!({"title": "a2"}))
            .human("t2", "C2", "[0]", "E");
        let graph = fx.graph();

        let resolved = resolve(&graph, "C", "[0]");
        assert_eq!(resolved.document_id.as_deref(), Some("E"));
        assert_eq!(resolved.depth, 2);
        assert!(resolved.path.is_root());
        assert_eq!(resolve(&graph, "C", "[1]").document_id.as_deref(), Some("C2"));
    }

    #[test]
    fn test_field_form_of_item_path_is_the_same_path() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}]}))
            .user_doc("E", SchemaType::Idea, json!({"title": "a2"}))
            .human("t1", "C", "$.ideas[0]", "E");
        let graph = fx.graph();

        assert_eq!(resolve(&graph, "C", "[0]").document_id.as_deref(), Some("E"));
        assert_eq!(resolve(&graph, "C", "$.ideas[0].title").document_id.as_deref(), Some("E"));
        assert_eq!(resolve(&graph, "C", "[0].title").path, p("title"));
    }
}
