//! Lineage graph construction.
//!
//! Documents are nodes. Every (input document, output document) pair of a
//! transform becomes an edge, annotated with the part of the input it derives
//! from when that is known: the derivation path of a human edit, or the item
//! index of a collection split.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;
use tracing::{debug, warn};

use lineage_core::{
    normalize_for_schema, CompleteRows, DerivationPath, Document, HumanTransform, PathSegment,
    SchemaType, Transform, TransformInput, TransformOutput, TransformType,
};

use crate::category::CanonicalCategory;

/// How an edge's target was derived from its source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// A human edit of the sub-path `path` of the source.
    HumanEdit,
    /// One item split out of a collection.
    Split,
    /// Any other derivation (e.g. an outline generated from an idea).
    Derivation,
}

/// A derivation from one document to another.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LineageEdge {
    pub source: String,
    pub target: String,
    pub transform_id: String,
    pub transform_type: TransformType,
    pub kind: EdgeKind,
    /// Sub-path of the source this edge derives from. Set for human edits and splits.
    pub path: Option<DerivationPath>,
    pub transform_name: Option<String>,
    /// Creation time of the transform (Unix millis).
    pub created_at: u64,
    /// Row position of the transform, breaking `created_at` ties.
    pub order: usize,
}

impl LineageEdge {
    pub fn is_human(&self) -> bool {
        self.transform_type == TransformType::Human || self.kind == EdgeKind::HumanEdit
    }

    /// Recency key: later transforms compare greater.
    pub fn recency(&self) -> (u64, usize) {
        (self.created_at, self.order)
    }
}

/// A document and its adjacency.
#[derive(Debug, Clone, PartialEq)]
pub struct LineageNode {
    pub document: Document,
    /// Row position of the document in the snapshot.
    pub order: usize,
    /// Canonical category, inherited from the edit source for free-form documents.
    pub category: Option<CanonicalCategory>,
    /// Indices into [`LineageGraph::edges`], oldest transform first.
    pub outgoing: Vec<usize>,
    pub incoming: Vec<usize>,
    /// Transforms that consume this document, whether or not they produced output yet.
    pub consumed_by: Vec<String>,
}

impl LineageNode {
    fn new(document: Document, order: usize) -> Self {
        Self {
            document,
            order,
            category: None,
            outgoing: Vec::new(),
            incoming: Vec::new(),
            consumed_by: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.document.id
    }

    pub fn is_leaf(&self) -> bool {
        self.outgoing.is_empty()
    }
}

/// Irregularities found while building the graph. None of them is fatal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GraphAnomaly {
    DuplicateDocument { document_id: String },
    DuplicateTransform { transform_id: String },
    UnknownTransform { transform_id: String },
    DanglingInput { transform_id: String, document_id: String },
    DanglingOutput { transform_id: String, document_id: String },
    InvalidDerivationPath { transform_id: String, path: String, reason: String },
    SelfLoop { transform_id: String, document_id: String },
    Cycle { document_id: String },
}

/// Immutable lineage graph of one project snapshot.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LineageGraph {
    nodes: BTreeMap<String, LineageNode>,
    edges: Vec<LineageEdge>,
    anomalies: Vec<GraphAnomaly>,
}

impl LineageGraph {
    /// Build the graph from fully loaded row collections.
    pub fn build(rows: CompleteRows<'_>) -> Self {
        build_lineage_graph(
            rows.documents,
            rows.transforms,
            rows.human_transforms,
            rows.transform_inputs,
            rows.transform_outputs,
        )
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn node(&self, id: &str) -> Option<&LineageNode> {
        self.nodes.get(id)
    }

    pub fn document(&self, id: &str) -> Option<&Document> {
        self.nodes.get(id).map(|n| &n.document)
    }

    /// Whether a document holds indexable items, by its inferred category.
    ///
    /// A free-form copy of a collection counts as a collection.
    pub fn is_collection(&self, id: &str) -> bool {
        self.category(id) == Some(CanonicalCategory::IdeaCollection)
    }

    pub fn category(&self, id: &str) -> Option<CanonicalCategory> {
        self.nodes.get(id).and_then(|n| n.category)
    }

    /// `path` of document `id` in the form edge paths are stored in.
    pub fn normalize_path(&self, id: &str, path: &DerivationPath) -> DerivationPath {
        match self.category(id) {
            Some(category) => normalize_for_schema(&category.schema_type(), path),
            None => path.clone(),
        }
    }

    /// Nodes in document id order.
    pub fn nodes(&self) -> impl Iterator<Item = &LineageNode> {
        self.nodes.values()
    }

    pub fn edges(&self) -> &[LineageEdge] {
        &self.edges
    }

    pub fn anomalies(&self) -> &[GraphAnomaly] {
        &self.anomalies
    }

    /// Edges leaving `id`, oldest transform first.
    pub fn outgoing(&self, id: &str) -> impl Iterator<Item = &LineageEdge> + '_ {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(move |n| n.outgoing.iter().map(move |&i| &self.edges[i]))
    }

    /// Edges entering `id`, oldest transform first.
    pub fn incoming(&self, id: &str) -> impl Iterator<Item = &LineageEdge> + '_ {
        self.nodes
            .get(id)
            .into_iter()
            .flat_map(move |n| n.incoming.iter().map(move |&i| &self.edges[i]))
    }

    /// All documents reachable from `id`, excluding `id` itself.
    pub fn descendants(&self, id: &str) -> BTreeSet<String> {
        self.walk(id, |node| &node.outgoing, |edge| &edge.target)
    }

    /// All documents `id` was derived from, excluding `id` itself.
    pub fn ancestors(&self, id: &str) -> BTreeSet<String> {
        self.walk(id, |node| &node.incoming, |edge| &edge.source)
    }

    fn walk(
        &self,
        id: &str,
        adjacent: impl Fn(&LineageNode) -> &Vec<usize>,
        endpoint: impl Fn(&LineageEdge) -> &String,
    ) -> BTreeSet<String> {
        let mut seen = BTreeSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(current) else {
                continue;
            };
            for &i in adjacent(node) {
                let next = endpoint(&self.edges[i]);
                if next != id && seen.insert(next.clone()) {
                    stack.push(next);
                }
            }
        }
        seen
    }
}

fn record(anomalies: &mut Vec<GraphAnomaly>, anomaly: GraphAnomaly) {
    warn!("Lineage graph anomaly: {:?}", anomaly);
    anomalies.push(anomaly);
}

fn push_unique<'a>(list: &mut Vec<&'a str>, id: &'a str) {
    if !list.contains(&id) {
        list.push(id);
    }
}

/// Output roles name a split position only when written as a path (`"[1]"`, `"$..."`).
fn parse_role_path(role: &str) -> Option<DerivationPath> {
    let role = role.trim();
    if role.starts_with('[') || role.starts_with('$') {
        role.parse().ok().filter(|p: &DerivationPath| !p.is_root())
    } else {
        None
    }
}

/// Build the lineage graph of a snapshot.
///
/// Pure: rows referencing unknown documents or transforms are dropped and
/// recorded as [`GraphAnomaly`] values; the rest of the graph stays usable.
pub fn build_lineage_graph(
    documents: &[Document],
    transforms: &[Transform],
    human_transforms: &[HumanTransform],
    transform_inputs: &[TransformInput],
    transform_outputs: &[TransformOutput],
) -> LineageGraph {
    let mut anomalies = Vec::new();

    let mut nodes: BTreeMap<String, LineageNode> = BTreeMap::new();
    for (order, doc) in documents.iter().enumerate() {
        if nodes
            .insert(doc.id.clone(), LineageNode::new(doc.clone(), order))
            .is_some()
        {
            record(
                &mut anomalies,
                GraphAnomaly::DuplicateDocument {
                    document_id: doc.id.clone(),
                },
            );
        }
    }

    let mut transform_rows: BTreeMap<&str, (usize, &Transform)> = BTreeMap::new();
    for (order, transform) in transforms.iter().enumerate() {
        if transform_rows
            .insert(transform.id.as_str(), (order, transform))
            .is_some()
        {
            record(
                &mut anomalies,
                GraphAnomaly::DuplicateTransform {
                    transform_id: transform.id.clone(),
                },
            );
        }
    }

    let mut human_rows: BTreeMap<&str, (&HumanTransform, DerivationPath)> = BTreeMap::new();
    for human in human_transforms {
        if !transform_rows.contains_key(human.transform_id.as_str()) {
            record(
                &mut anomalies,
                GraphAnomaly::UnknownTransform {
                    transform_id: human.transform_id.clone(),
                },
            );
            continue;
        }
        match human.derivation_path.parse::<DerivationPath>() {
            Ok(path) => {
                human_rows.insert(human.transform_id.as_str(), (human, path));
            }
            Err(e) => record(
                &mut anomalies,
                GraphAnomaly::InvalidDerivationPath {
                    transform_id: human.transform_id.clone(),
                    path: human.derivation_path.clone(),
                    reason: e.to_string(),
                },
            ),
        }
    }

    let mut inputs: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for edge in transform_inputs {
        if !transform_rows.contains_key(edge.transform_id.as_str()) {
            record(
                &mut anomalies,
                GraphAnomaly::UnknownTransform {
                    transform_id: edge.transform_id.clone(),
                },
            );
        } else if !nodes.contains_key(&edge.document_id) {
            record(
                &mut anomalies,
                GraphAnomaly::DanglingInput {
                    transform_id: edge.transform_id.clone(),
                    document_id: edge.document_id.clone(),
                },
            );
        } else {
            push_unique(
                inputs.entry(edge.transform_id.as_str()).or_default(),
                edge.document_id.as_str(),
            );
        }
    }

    let mut outputs: BTreeMap<&str, Vec<(&str, Option<&str>)>> = BTreeMap::new();
    for edge in transform_outputs {
        if !transform_rows.contains_key(edge.transform_id.as_str()) {
            record(
                &mut anomalies,
                GraphAnomaly::UnknownTransform {
                    transform_id: edge.transform_id.clone(),
                },
            );
        } else if !nodes.contains_key(&edge.document_id) {
            record(
                &mut anomalies,
                GraphAnomaly::DanglingOutput {
                    transform_id: edge.transform_id.clone(),
                    document_id: edge.document_id.clone(),
                },
            );
        } else {
            let list = outputs.entry(edge.transform_id.as_str()).or_default();
            if !list.iter().any(|(id, _)| *id == edge.document_id) {
                list.push((edge.document_id.as_str(), edge.output_role.as_deref()));
            }
        }
    }

    // Human transform records name their source and derived documents directly;
    // fill in edges the input/output tables have not delivered yet.
    for (&transform_id, (human, _)) in &human_rows {
        if nodes.contains_key(&human.source_document_id) {
            push_unique(
                inputs.entry(transform_id).or_default(),
                human.source_document_id.as_str(),
            );
        } else {
            record(
                &mut anomalies,
                GraphAnomaly::DanglingInput {
                    transform_id: transform_id.to_string(),
                    document_id: human.source_document_id.clone(),
                },
            );
        }
        if let Some(derived) = human.derived_document_id.as_deref() {
            if nodes.contains_key(derived) {
                let list = outputs.entry(transform_id).or_default();
                if !list.iter().any(|(id, _)| *id == derived) {
                    list.push((derived, None));
                }
            } else {
                record(
                    &mut anomalies,
                    GraphAnomaly::DanglingOutput {
                        transform_id: transform_id.to_string(),
                        document_id: derived.to_string(),
                    },
                );
            }
        }
    }

    let mut ordered: Vec<(&str, usize, &Transform)> = transform_rows
        .iter()
        .map(|(&id, &(order, transform))| (id, order, transform))
        .collect();
    ordered.sort_by_key(|&(_, order, _)| order);

    let mut edges = Vec::new();
    for (transform_id, order, transform) in ordered {
        let (Some(ins), Some(outs)) = (inputs.get(transform_id), outputs.get(transform_id)) else {
            continue;
        };
        let human = human_rows.get(transform_id);

        for &source in ins {
            for &(target, role) in outs {
                if source == target {
                    record(
                        &mut anomalies,
                        GraphAnomaly::SelfLoop {
                            transform_id: transform_id.to_string(),
                            document_id: source.to_string(),
                        },
                    );
                    continue;
                }
                // Positional splits need categories and are assigned below.
                let (kind, path) = match human {
                    Some((h, path)) if h.source_document_id == source => {
                        (EdgeKind::HumanEdit, Some(path.clone()))
                    }
                    _ => match role.and_then(parse_role_path) {
                        Some(path) => (EdgeKind::Split, Some(path)),
                        None => (EdgeKind::Derivation, None),
                    },
                };

                edges.push(LineageEdge {
                    source: source.to_string(),
                    target: target.to_string(),
                    transform_id: transform_id.to_string(),
                    transform_type: transform.transform_type,
                    kind,
                    path,
                    transform_name: human.map(|(h, _)| h.transform_name.clone()),
                    created_at: transform.created_at,
                    order,
                });
            }
        }
    }

    for (i, edge) in edges.iter().enumerate() {
        if let Some(node) = nodes.get_mut(&edge.source) {
            node.outgoing.push(i);
        }
        if let Some(node) = nodes.get_mut(&edge.target) {
            node.incoming.push(i);
        }
    }

    for (&transform_id, docs) in &inputs {
        for &doc in docs {
            if let Some(node) = nodes.get_mut(doc) {
                node.consumed_by.push(transform_id.to_string());
            }
        }
    }

    let edge_key = |i: &usize| {
        let e: &LineageEdge = &edges[*i];
        (e.created_at, e.order, e.target.clone(), e.source.clone())
    };
    for node in nodes.values_mut() {
        node.outgoing.sort_by_key(edge_key);
        node.incoming.sort_by_key(edge_key);
        node.consumed_by.sort();
        node.consumed_by.dedup();
    }

    let mut memo = HashMap::new();
    let mut visiting = HashSet::new();
    let ids: Vec<String> = nodes.keys().cloned().collect();
    for id in &ids {
        infer_category(id, &nodes, &edges, &mut memo, &mut visiting);
    }
    for (id, category) in memo {
        if let Some(node) = nodes.get_mut(&id) {
            node.category = category;
        }
    }

    assign_item_paths(&nodes, &mut edges);

    for document_id in find_cycles(&nodes, &edges) {
        record(&mut anomalies, GraphAnomaly::Cycle { document_id });
    }

    debug!(
        "Built lineage graph: {} documents, {} edges, {} anomalies",
        nodes.len(),
        edges.len(),
        anomalies.len()
    );

    LineageGraph {
        nodes,
        edges,
        anomalies,
    }
}

/// Category of a node. Free-form documents inherit from the source of their
/// latest human edit: whole-document edits keep the source's category, and an
/// edited collection item becomes an idea.
fn infer_category(
    id: &str,
    nodes: &BTreeMap<String, LineageNode>,
    edges: &[LineageEdge],
    memo: &mut HashMap<String, Option<CanonicalCategory>>,
    visiting: &mut HashSet<String>,
) -> Option<CanonicalCategory> {
    if let Some(category) = memo.get(id) {
        return *category;
    }
    let node = nodes.get(id)?;
    if let Some(category) = CanonicalCategory::from_schema(&node.document.schema_type) {
        memo.insert(id.to_string(), Some(category));
        return Some(category);
    }
    if node.document.schema_type != SchemaType::UserInput || !visiting.insert(id.to_string()) {
        return None;
    }

    let inherited = node
        .incoming
        .iter()
        .rev()
        .map(|&i| &edges[i])
        .find(|e| e.kind == EdgeKind::HumanEdit)
        .and_then(|edge| {
            let parent = infer_category(&edge.source, nodes, edges, memo, visiting)?;
            let path = normalize_for_schema(&parent.schema_type(), edge.path.as_ref()?);
            match (parent, path.segments()) {
                (_, []) => Some(parent),
                (CanonicalCategory::IdeaCollection, [PathSegment::Index(_)]) => {
                    Some(CanonicalCategory::Idea)
                }
                _ => None,
            }
        });

    visiting.remove(id);
    memo.insert(id.to_string(), inherited);
    inherited
}

/// Rewrite edge paths out of collections into item-relative form, and turn
/// unlabelled collection-to-item derivations into positional splits.
///
/// Collection-ness comes from the inferred category, so a free-form copy of a
/// collection splits the same way the collection does.
fn assign_item_paths(nodes: &BTreeMap<String, LineageNode>, edges: &mut [LineageEdge]) {
    let category = |id: &str| nodes.get(id).and_then(|n| n.category);
    let mut next_index: HashMap<(String, String), usize> = HashMap::new();

    for edge in edges.iter_mut() {
        if category(edge.source.as_str()) != Some(CanonicalCategory::IdeaCollection) {
            continue;
        }
        match edge.kind {
            EdgeKind::HumanEdit | EdgeKind::Split => {
                let collection = CanonicalCategory::IdeaCollection.schema_type();
                edge.path = edge.path.take().map(|p| normalize_for_schema(&collection, &p));
            }
            EdgeKind::Derivation if category(edge.target.as_str()) == Some(CanonicalCategory::Idea) => {
                let counter = next_index
                    .entry((edge.transform_id.clone(), edge.source.clone()))
                    .or_default();
                edge.kind = EdgeKind::Split;
                edge.path = Some(DerivationPath::index(*counter));
                *counter += 1;
            }
            EdgeKind::Derivation => {}
        }
    }
}

/// Targets of back edges found by an iterative depth-first search.
fn find_cycles(nodes: &BTreeMap<String, LineageNode>, edges: &[LineageEdge]) -> BTreeSet<String> {
    const VISITING: u8 = 1;
    const DONE: u8 = 2;

    let mut color: HashMap<&str, u8> = HashMap::new();
    let mut found = BTreeSet::new();

    for start in nodes.keys() {
        if color.contains_key(start.as_str()) {
            continue;
        }
        color.insert(start.as_str(), VISITING);
        let mut stack: Vec<(&str, usize)> = vec![(start.as_str(), 0)];

        while let Some(top) = stack.last_mut() {
            let (id, pos) = *top;
            let outgoing = &nodes[id].outgoing;
            if pos < outgoing.len() {
                top.1 += 1;
                let target = edges[outgoing[pos]].target.as_str();
                match color.get(target).copied() {
                    None => {
                        color.insert(target, VISITING);
                        stack.push((target, 0));
                    }
                    Some(VISITING) => {
                        found.insert(target.to_string());
                    }
                    Some(_) => {}
                }
            } else {
                color.insert(id, DONE);
                stack.pop();
            }
        }
    }

    found
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use lineage_core::{OriginType, SchemaType};
    use serde_json::json;

    fn linear_fixture() -> Fixture {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({"title": "X"}))
            .user_doc("B", SchemaType::OutlineSettings, json!({"title": "Y"}))
            .human("t1", "A", "$", "B");
        fx
    }

    #[test]
    fn test_build_linear_chain() {
        let graph = linear_fixture().graph();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges().len(), 1);
        let edge = graph.outgoing("A").next().unwrap();
        assert_eq!(edge.target, "B");
        assert_eq!(edge.kind, EdgeKind::HumanEdit);
        assert_eq!(edge.path, Some(DerivationPath::root()));
        assert!(edge.is_human());
        assert_eq!(graph.node("A").unwrap().consumed_by, vec!["t1".to_string()]);
        assert!(graph.node("B").unwrap().is_leaf());
        assert!(graph.anomalies().is_empty());
    }

    #[test]
    fn test_build_is_idempotent() {
        let fx = linear_fixture();
        assert_eq!(fx.graph(), fx.graph());
    }

    #[test]
    fn test_collection_split_assigns_indices() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}, {"title": "b"}]}))
            .ai_doc("D0", SchemaType::Idea, json!({"title": "a"}))
            .ai_doc("D1", SchemaType::Idea, json!({"title": "b"}))
            .ai("t1", &["C"], &["D0", "D1"]);
        let graph = fx.graph();

        let paths: Vec<_> = graph
            .outgoing("C")
            .map(|e| (e.target.clone(), e.kind, e.path.clone()))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("D0".to_string(), EdgeKind::Split, Some(DerivationPath::index(0))),
                ("D1".to_string(), EdgeKind::Split, Some(DerivationPath::index(1))),
            ]
        );
    }

    #[test]
    fn test_output_role_overrides_position() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({}))
            .ai_doc("D", SchemaType::Idea, json!({}))
            .ai("t1", &["C"], &["D"])
            .output_role("t1", "D", "[2]");
        let graph = fx.graph();
        assert_eq!(
            graph.outgoing("C").next().unwrap().path,
            Some(DerivationPath::index(2))
        );
    }

    #[test]
    fn test_cross_schema_derivation_has_no_path() {
        let mut fx = Fixture::new();
        fx.ai_doc("I", SchemaType::Idea, json!({}))
            .ai_doc("O", SchemaType::OutlineSettings, json!({}))
            .ai("t1", &["I"], &["O"]);
        let edge = fx.graph().outgoing("I").next().cloned().unwrap();
        assert_eq!(edge.kind, EdgeKind::Derivation);
        assert_eq!(edge.path, None);
    }

    #[test]
    fn test_dangling_rows_are_dropped() {
        let mut fx = linear_fixture();
        fx.input("t1", "ghost").output("missing-transform", "B");
        let graph = fx.graph();

        assert_eq!(graph.edges().len(), 1);
        assert!(graph.anomalies().contains(&GraphAnomaly::DanglingInput {
            transform_id: "t1".to_string(),
            document_id: "ghost".to_string(),
        }));
        assert!(graph.anomalies().contains(&GraphAnomaly::UnknownTransform {
            transform_id: "missing-transform".to_string(),
        }));
    }

    #[test]
    fn test_invalid_derivation_path_drops_human_annotation() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .user_doc("B", SchemaType::OutlineSettings, json!({}))
            .human("t1", "A", "[oops", "B");
        let graph = fx.graph();

        assert!(matches!(
            graph.anomalies()[0],
            GraphAnomaly::InvalidDerivationPath { .. }
        ));
        // Edges from the input/output tables survive as plain derivations.
        let edge = graph.outgoing("A").next().unwrap();
        assert_eq!(edge.kind, EdgeKind::Derivation);
    }

    #[test]
    fn test_human_record_supplies_missing_edges() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .user_doc("B", SchemaType::OutlineSettings, json!({}))
            .human_record_only("t1", "A", "$", "B");
        let graph = fx.graph();
        assert_eq!(graph.outgoing("A").next().unwrap().target, "B");
    }

    #[test]
    fn test_user_input_inherits_category() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}]}))
            .user_doc("E", SchemaType::UserInput, json!({"title": "a2"}))
            .human("t1", "C", "[0]", "E")
            .ai_doc("O", SchemaType::OutlineSettings, json!({}))
            .user_doc("O2", SchemaType::UserInput, json!({}))
            .human("t2", "O", "$", "O2")
            .user_doc("F", SchemaType::UserInput, json!({}))
            .human("t3", "O", "title", "F");
        let graph = fx.graph();

        assert_eq!(graph.node("E").unwrap().category, Some(CanonicalCategory::Idea));
        assert_eq!(
            graph.node("O2").unwrap().category,
            Some(CanonicalCategory::OutlineSettings)
        );
        assert_eq!(graph.node("F").unwrap().category, None);
    }

    #[test]
    fn test_cycle_is_recorded() {
        let mut fx = Fixture::new();
        fx.doc("A", SchemaType::OutlineSettings, OriginType::AiGenerated, json!({}))
            .doc("B", SchemaType::OutlineSettings, OriginType::UserInput, json!({}))
            .human("t1", "A", "$", "B")
            .human("t2", "B", "$", "A");
        let graph = fx.graph();
        assert!(graph
            .anomalies()
            .iter()
            .any(|a| matches!(a, GraphAnomaly::Cycle { .. })));
        assert_eq!(graph.descendants("A"), BTreeSet::from(["B".to_string()]));
    }

    #[test]
    fn test_ancestors_and_descendants() {
        let mut fx = linear_fixture();
        fx.user_doc("C", SchemaType::OutlineSettings, json!({}))
            .human("t2", "B", "$", "C");
        let graph = fx.graph();
        assert_eq!(
            graph.descendants("A"),
            BTreeSet::from(["B".to_string(), "C".to_string()])
        );
        assert_eq!(
            graph.ancestors("C"),
            BTreeSet::from(["A".to_string(), "B".to_string()])
        );
        assert!(graph.ancestors("A").is_empty());
    }

    #[test]
    fn test_pending_transform_counts_as_consumer() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .ai("t1", &["A"], &[]);
        let graph = fx.graph();
        assert!(graph.node("A").unwrap().is_leaf());
        assert_eq!(graph.node("A").unwrap().consumed_by, vec!["t1".to_string()]);
    }

    #[test]
    fn test_free_form_collection_copy_is_split_by_position() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}, {"title": "b"}]}))
            .user_doc("C2", SchemaType::UserInput, json!({"ideas": [{"title": "a"}, {"title": "b"}]}))
            .human("t1", "C", "$", "C2")
            .ai_doc("D0", SchemaType::Idea, json!({"title": "a"}))
            .ai_doc("D1", SchemaType::Idea, json!({"title": "b"}))
            .ai("t2", &["C2"], &["D0", "D1"]);
        let graph = fx.graph();

        assert!(graph.is_collection("C2"));
        let paths: Vec<_> = graph
            .outgoing("C2")
            .map(|e| (e.target.clone(), e.kind, e.path.clone()))
            .collect();
        assert_eq!(
            paths,
            vec![
                ("D0".to_string(), EdgeKind::Split, Some(DerivationPath::index(0))),
                ("D1".to_string(), EdgeKind::Split, Some(DerivationPath::index(1))),
            ]
        );
    }

    #[test]
    fn test_item_paths_are_stored_item_relative() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}]}))
            .user_doc("E", SchemaType::UserInput, json!({"title": "a2"}))
            .human("t1", "C", "$.ideas[0]", "E");
        let graph = fx.graph();

        let edge = graph.outgoing("C").next().cloned().unwrap();
        assert_eq!(edge.path, Some(DerivationPath::index(0)));
        assert_eq!(graph.category("E"), Some(CanonicalCategory::Idea));
        assert_eq!(
            graph.normalize_path("C", &"$.ideas[0].title".parse().unwrap()),
            "[0].title".parse().unwrap()
        );
    }
}
