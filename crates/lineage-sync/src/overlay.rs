//! Optimistic overlay of locally pending document updates.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::{debug, warn};

use lineage_core::{parse_lenient, Document, Loadable, Snapshot};

/// Document data written locally but not yet confirmed by the server.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PendingOverlay {
    entries: BTreeMap<String, Value>,
}

/// Effective documents after applying an overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled {
    pub documents: Vec<Document>,
    /// Ids whose server data now equals the pending data.
    pub settled: Vec<String>,
    /// Ids of documents that may not change in place; their entries are ignored.
    pub rejected: Vec<String>,
}

impl PendingOverlay {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a pending write, replacing any earlier one for the same document.
    pub fn insert(&mut self, document_id: impl Into<String>, data: Value) {
        self.entries.insert(document_id.into(), data);
    }

    pub fn remove(&mut self, document_id: &str) -> Option<Value> {
        self.entries.remove(document_id)
    }

    pub fn get(&self, document_id: &str) -> Option<&Value> {
        self.entries.get(document_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop entries the server has caught up with.
    pub fn settle(&mut self, settled: &[String]) {
        for id in settled {
            if self.entries.remove(id).is_some() {
                debug!("Pending update for {} settled", id);
            }
        }
    }
}

/// Merge pending data over server documents.
///
/// Pure. User-input documents with a pending entry carry the pending data;
/// when the server data is already structurally equal to it the id is
/// reported as settled. Entries for any other document are reported as
/// rejected and leave the server data alone. Entries for documents the server
/// does not know are ignored.
pub fn reconcile(server: &[Document], overlay: &PendingOverlay) -> Reconciled {
    let mut settled = Vec::new();
    let mut rejected = Vec::new();
    let documents = server
        .iter()
        .map(|doc| match overlay.get(&doc.id) {
            Some(_) if !doc.is_user_input() => {
                warn!("Ignoring pending update of non-editable document {}", doc.id);
                rejected.push(doc.id.clone());
                doc.clone()
            }
            Some(pending) => {
                if parse_lenient(&doc.data) == parse_lenient(pending) {
                    settled.push(doc.id.clone());
                    doc.clone()
                } else {
                    Document {
                        data: pending.clone(),
                        ..doc.clone()
                    }
                }
            }
            None => doc.clone(),
        })
        .collect();

    Reconciled {
        documents,
        settled,
        rejected,
    }
}

/// Apply the overlay to a snapshot's document collection, if loaded.
///
/// Also returns the ids whose entries should be dropped, settled or rejected.
pub fn reconcile_snapshot(snapshot: &Snapshot, overlay: &PendingOverlay) -> (Snapshot, Vec<String>) {
    let mut effective = snapshot.clone();
    let mut finished = Vec::new();
    if let Loadable::Ready(docs) = &snapshot.rows.documents {
        let reconciled = reconcile(docs, overlay);
        effective.rows.documents = Loadable::Ready(reconciled.documents);
        finished = reconciled.settled;
        finished.extend(reconciled.rejected);
    }
    (effective, finished)
}

#[cfg(test)]
mod tests {
    use super::*;
    use lineage_core::{OriginType, ProjectRows, RowCollections, SchemaType};
    use serde_json::json;

    fn doc(id: &str, data: Value) -> Document {
        let mut doc = Document::new("p1", SchemaType::UserInput, OriginType::UserInput, data);
        doc.id = id.to_string();
        doc
    }

    #[test]
    fn test_pending_value_shadows_server() {
        let mut overlay = PendingOverlay::new();
        overlay.insert("a", json!({"title": "local"}));

        let result = reconcile(&[doc("a", json!({"title": "server"})), doc("b", json!({}))], &overlay);
        assert_eq!(result.documents[0].data, json!({"title": "local"}));
        assert_eq!(result.documents[1].data, json!({}));
        assert!(result.settled.is_empty());
    }

    #[test]
    fn test_settles_on_structural_equality() {
        let mut overlay = PendingOverlay::new();
        overlay.insert("a", json!({"title": "x", "body": "y"}));

        // Key order and string encoding differ; the values are the same.
        let server = doc("a", json!("{\"body\":\"y\",\"title\":\"x\"}"));
        let result = reconcile(&[server], &overlay);
        assert_eq!(result.settled, vec!["a".to_string()]);

        overlay.settle(&result.settled);
        assert!(overlay.is_empty());
    }

    #[test]
    fn test_unknown_documents_are_ignored() {
        let mut overlay = PendingOverlay::new();
        overlay.insert("ghost", json!({}));
        let result = reconcile(&[doc("a", json!({}))], &overlay);
        assert_eq!(result.documents.len(), 1);
        assert!(result.settled.is_empty());
        assert_eq!(overlay.len(), 1);
    }

    #[test]
    fn test_reconcile_snapshot() {
        let rows = ProjectRows {
            documents: vec![doc("a", json!({"n": 1}))],
            ..ProjectRows::default()
        };
        let snapshot = Snapshot::new("p1", 2, RowCollections::ready(rows));
        let mut overlay = PendingOverlay::new();
        overlay.insert("a", json!({"n": 2}));

        let (effective, settled) = reconcile_snapshot(&snapshot, &overlay);
        assert_eq!(effective.version, 2);
        assert_eq!(
            effective.rows.documents.as_ready().unwrap()[0].data,
            json!({"n": 2})
        );
        assert!(settled.is_empty());

        let (_, settled) = reconcile_snapshot(&Snapshot::new("p1", 3, RowCollections::pending()), &overlay);
        assert!(settled.is_empty());
    }

    #[test]
    fn test_generated_documents_are_never_overlaid() {
        let mut generated = doc("o", json!({"title": "server"}));
        generated.origin_type = OriginType::AiGenerated;
        generated.schema_type = SchemaType::OutlineSettings;

        let mut overlay = PendingOverlay::new();
        overlay.insert("o", json!({"title": "local"}));
        let result = reconcile(&[generated], &overlay);
        assert_eq!(result.documents[0].data, json!({"title": "server"}));
        assert_eq!(result.rejected, vec!["o".to_string()]);
        assert!(result.settled.is_empty());

        let rows = ProjectRows {
            documents: result.documents,
            ..ProjectRows::default()
        };
        let snapshot = Snapshot::new("p1", 1, RowCollections::ready(rows));
        let (_, finished) = reconcile_snapshot(&snapshot, &overlay);
        overlay.settle(&finished);
        assert!(overlay.is_empty());
    }
}
