//! Canonical context selection: the one authoritative document per category.

use std::cmp::Reverse;
use std::collections::{BTreeSet, HashMap, VecDeque};

use tracing::{debug, warn};

use lineage_core::{Document, DocumentContent};

use crate::category::CanonicalCategory;
use crate::graph::{LineageGraph, LineageNode};

/// The selected document of a category.
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalDocument {
    pub document: Document,
    /// Data decoded with the category's schema.
    pub content: DocumentContent,
    /// Hops from the root of its chain within the category.
    pub depth: usize,
    pub root_id: String,
}

/// Outcome of selection for one category.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum CanonicalSlot {
    /// No document of this category exists yet.
    #[default]
    Absent,
    Resolved(Box<CanonicalDocument>),
    /// Several unrelated chains exist. `candidates` holds the best terminal of each.
    Ambiguous { candidates: Vec<String> },
}

impl CanonicalSlot {
    pub fn document(&self) -> Option<&CanonicalDocument> {
        match self {
            Self::Resolved(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn document_id(&self) -> Option<&str> {
        self.document().map(|d| d.document.id.as_str())
    }

    pub fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Self::Ambiguous { .. })
    }
}

/// One slot per category.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CanonicalContext {
    pub brainstorm_input: CanonicalSlot,
    pub idea_collection: CanonicalSlot,
    pub idea: CanonicalSlot,
    pub outline_settings: CanonicalSlot,
    pub chronicles: CanonicalSlot,
    pub episode_planning: CanonicalSlot,
}

impl CanonicalContext {
    pub fn slot(&self, category: CanonicalCategory) -> &CanonicalSlot {
        match category {
            CanonicalCategory::BrainstormInput => &self.brainstorm_input,
            CanonicalCategory::IdeaCollection => &self.idea_collection,
            CanonicalCategory::Idea => &self.idea,
            CanonicalCategory::OutlineSettings => &self.outline_settings,
            CanonicalCategory::Chronicles => &self.chronicles,
            CanonicalCategory::EpisodePlanning => &self.episode_planning,
        }
    }

    fn slot_mut(&mut self, category: CanonicalCategory) -> &mut CanonicalSlot {
        match category {
            CanonicalCategory::BrainstormInput => &mut self.brainstorm_input,
            CanonicalCategory::IdeaCollection => &mut self.idea_collection,
            CanonicalCategory::Idea => &mut self.idea,
            CanonicalCategory::OutlineSettings => &mut self.outline_settings,
            CanonicalCategory::Chronicles => &mut self.chronicles,
            CanonicalCategory::EpisodePlanning => &mut self.episode_planning,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (CanonicalCategory, &CanonicalSlot)> {
        CanonicalCategory::ALL.into_iter().map(move |c| (c, self.slot(c)))
    }

    /// User-facing messages for ambiguous slots, e.g. "multiple chronicles found".
    pub fn errors(&self) -> Vec<String> {
        self.iter()
            .filter(|(_, slot)| slot.is_ambiguous())
            .map(|(category, _)| format!("multiple {} found", category.plural_label()))
            .collect()
    }
}

/// Select the canonical document of every category.
pub fn compute_canonical_context(graph: &LineageGraph) -> CanonicalContext {
    let mut context = CanonicalContext::default();
    for category in CanonicalCategory::ALL {
        *context.slot_mut(category) = select_canonical(graph, category);
    }
    context
}

fn find(parent: &mut [usize], mut i: usize) -> usize {
    while parent[i] != i {
        parent[i] = parent[parent[i]];
        i = parent[i];
    }
    i
}

fn union(parent: &mut [usize], a: usize, b: usize) {
    let (ra, rb) = (find(parent, a), find(parent, b));
    if ra != rb {
        parent[ra.max(rb)] = ra.min(rb);
    }
}

fn select_canonical(graph: &LineageGraph, category: CanonicalCategory) -> CanonicalSlot {
    let members: Vec<&LineageNode> = graph
        .nodes()
        .filter(|n| n.category == Some(category))
        .collect();
    if members.is_empty() {
        return CanonicalSlot::Absent;
    }
    let index: HashMap<&str, usize> = members
        .iter()
        .enumerate()
        .map(|(i, n)| (n.id(), i))
        .collect();

    let mut children: Vec<Vec<usize>> = vec![Vec::new(); members.len()];
    let mut has_parent = vec![false; members.len()];
    let mut parent: Vec<usize> = (0..members.len()).collect();
    for edge in graph.edges() {
        if let (Some(&s), Some(&t)) = (
            index.get(edge.source.as_str()),
            index.get(edge.target.as_str()),
        ) {
            children[s].push(t);
            has_parent[t] = true;
            union(&mut parent, s, t);
        }
    }

    let terminals: Vec<usize> = (0..members.len())
        .filter(|&i| {
            !graph
                .descendants(members[i].id())
                .iter()
                .any(|d| index.contains_key(d.as_str()))
        })
        .collect();

    // Depth by breadth-first search from chain roots over same-category edges.
    let roots: Vec<usize> = (0..members.len()).filter(|&i| !has_parent[i]).collect();
    let mut depth: Vec<Option<(usize, usize)>> = vec![None; members.len()];
    let mut queue = VecDeque::new();
    for &r in &roots {
        depth[r] = Some((0, r));
        queue.push_back(r);
    }
    while let Some(i) = queue.pop_front() {
        let Some((d, root)) = depth[i] else {
            continue;
        };
        for &c in &children[i] {
            if depth[c].is_none() {
                depth[c] = Some((d + 1, root));
                queue.push_back(c);
            }
        }
    }

    // Roots are related when they share an ancestor anywhere in the graph,
    // counting each root as its own ancestor.
    let lineages: Vec<BTreeSet<String>> = roots
        .iter()
        .map(|&r| {
            let mut set = graph.ancestors(members[r].id());
            set.insert(members[r].id().to_string());
            set
        })
        .collect();
    for a in 0..roots.len() {
        for b in (a + 1)..roots.len() {
            if !lineages[a].is_disjoint(&lineages[b]) {
                union(&mut parent, roots[a], roots[b]);
            }
        }
    }

    let rank = |i: &usize| {
        let node = members[*i];
        let (d, _) = depth[*i].unwrap_or((0, *i));
        (
            node.document.is_user_input(),
            Reverse(d),
            node.document.created_at,
            node.order,
        )
    };

    let mut families: HashMap<usize, Vec<usize>> = HashMap::new();
    for &t in &terminals {
        families.entry(find(&mut parent, t)).or_default().push(t);
    }

    if families.len() > 1 {
        let mut candidates: Vec<String> = families
            .values()
            .filter_map(|family| family.iter().max_by_key(|i| rank(i)))
            .map(|&i| members[i].id().to_string())
            .collect();
        candidates.sort();
        warn!(
            "Ambiguous canonical {}: {} unrelated chains ({})",
            category,
            candidates.len(),
            candidates.join(", ")
        );
        return CanonicalSlot::Ambiguous { candidates };
    }

    // A cycle can leave a category without terminals; fall back to all members.
    let pool: Vec<usize> = if terminals.is_empty() {
        (0..members.len()).collect()
    } else {
        terminals
    };
    let Some(best) = pool.iter().copied().max_by_key(|i| rank(i)) else {
        return CanonicalSlot::Absent;
    };

    let node = members[best];
    let (d, root) = depth[best].unwrap_or((0, best));
    debug!("Canonical {} is {} (depth {})", category, node.id(), d);
    CanonicalSlot::Resolved(Box::new(CanonicalDocument {
        content: DocumentContent::decode(&category.schema_type(), &node.document.data),
        document: node.document.clone(),
        depth: d,
        root_id: members[root].id().to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Fixture;
    use lineage_core::content::OutlineSettingsContent;
    use lineage_core::SchemaType;
    use serde_json::json;

    #[test]
    fn test_empty_project_has_no_canonical_documents() {
        let context = compute_canonical_context(&Fixture::new().graph());
        assert!(context.iter().all(|(_, slot)| slot.is_absent()));
        assert!(context.errors().is_empty());
    }

    #[test]
    fn test_linear_chain_selects_edit() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({"title": "X"}))
            .user_doc("B", SchemaType::OutlineSettings, json!({"title": "Y"}))
            .human("t1", "A", "$", "B");
        let context = compute_canonical_context(&fx.graph());

        let outline = context.outline_settings.document().unwrap();
        assert_eq!(outline.document.id, "B");
        assert_eq!(outline.depth, 1);
        assert_eq!(outline.root_id, "A");
        match &outline.content {
            DocumentContent::OutlineSettings(OutlineSettingsContent { title, .. }) => {
                assert_eq!(title, "Y")
            }
            other => panic!("unexpected content {:?}", other),
        }
        assert!(context.chronicles.is_absent());
    }

    #[test]
    fn test_free_form_edit_decodes_with_category_schema() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({"title": "X"}))
            .user_doc("B", SchemaType::UserInput, json!({"title": "Y"}))
            .human("t1", "A", "$", "B");
        let context = compute_canonical_context(&fx.graph());
        let outline = context.outline_settings.document().unwrap();
        assert_eq!(outline.document.id, "B");
        assert!(matches!(outline.content, DocumentContent::OutlineSettings(_)));
    }

    #[test]
    fn test_malformed_data_is_treated_as_empty() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::Chronicles, json!("invalid json {"))
            .ai_doc("C", SchemaType::IdeaCollection, json!("invalid json {"));
        let context = compute_canonical_context(&fx.graph());

        let chronicles = context.chronicles.document().unwrap();
        match &chronicles.content {
            DocumentContent::Chronicles(c) => assert!(c.stages.is_empty()),
            other => panic!("unexpected content {:?}", other),
        }
        assert_eq!(context.idea_collection.document_id(), Some("C"));
    }

    #[test]
    fn test_unrelated_roots_are_ambiguous() {
        let mut fx = Fixture::new();
        fx.ai_doc("X", SchemaType::Chronicles, json!({}))
            .ai_doc("Y", SchemaType::Chronicles, json!({}));
        let context = compute_canonical_context(&fx.graph());

        assert_eq!(
            context.chronicles,
            CanonicalSlot::Ambiguous {
                candidates: vec!["X".to_string(), "Y".to_string()]
            }
        );
        assert_eq!(context.errors(), vec!["multiple chronicles found".to_string()]);
    }

    #[test]
    fn test_forks_of_common_source_are_not_ambiguous() {
        let mut fx = Fixture::new();
        fx.ai_doc("O", SchemaType::OutlineSettings, json!({}))
            .ai_doc("X", SchemaType::Chronicles, json!({}))
            .ai_doc("Y", SchemaType::Chronicles, json!({}))
            .ai("t1", &["O"], &["X"])
            .ai("t2", &["O"], &["Y"]);
        let context = compute_canonical_context(&fx.graph());
        // Latest regeneration wins.
        assert_eq!(context.chronicles.document_id(), Some("Y"));
    }

    #[test]
    fn test_user_edit_shadows_newer_ai_fork() {
        let mut fx = Fixture::new();
        fx.ai_doc("O", SchemaType::OutlineSettings, json!({}))
            .ai_doc("X", SchemaType::Chronicles, json!({}))
            .ai("t1", &["O"], &["X"])
            .user_doc("X2", SchemaType::Chronicles, json!({}))
            .human("t2", "X", "$", "X2")
            .ai_doc("Y", SchemaType::Chronicles, json!({}))
            .ai("t3", &["O"], &["Y"]);
        let context = compute_canonical_context(&fx.graph());
        assert_eq!(context.chronicles.document_id(), Some("X2"));
    }

    #[test]
    fn test_shallower_fork_wins() {
        let mut fx = Fixture::new();
        fx.ai_doc("A", SchemaType::OutlineSettings, json!({}))
            .user_doc("B", SchemaType::OutlineSettings, json!({}))
            .human("t1", "A", "$", "B")
            .user_doc("C", SchemaType::OutlineSettings, json!({}))
            .human("t2", "B", "$", "C")
            .user_doc("D", SchemaType::OutlineSettings, json!({}))
            .human("t3", "A", "$", "D");
        let context = compute_canonical_context(&fx.graph());
        // C and D are both terminal user edits; D sits one hop from the root.
        assert_eq!(context.outline_settings.document_id(), Some("D"));
    }

    #[test]
    fn test_split_ideas_share_collection() {
        let mut fx = Fixture::new();
        fx.ai_doc("C", SchemaType::IdeaCollection, json!({"ideas": [{"title": "a"}, {"title": "b"}]}))
            .ai_doc("D0", SchemaType::Idea, json!({"title": "a"}))
            .ai_doc("D1", SchemaType::Idea, json!({"title": "b"}))
            .ai("t1", &["C"], &["D0", "D1"])
            .user_doc("E", SchemaType::Idea, json!({"title": "a!"}))
            .human("t2", "D0", "$", "E");
        let context = compute_canonical_context(&fx.graph());
        assert_eq!(context.idea_collection.document_id(), Some("C"));
        assert_eq!(context.idea.document_id(), Some("E"));
    }
}
