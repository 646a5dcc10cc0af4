//! Coalescing of rapid in-place document updates.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use lineage_core::{Document, MutationSink, Result, SyncConfig, UpdateDocument};

#[derive(Debug)]
struct Queued {
    generation: u64,
    intent: UpdateDocument,
}

/// Forwards `update_document` intents to a sink after a quiet period.
///
/// Each document has its own window: an intent replaces any intent for the same
/// document still waiting, and only the last one in the window is sent.
pub struct UpdateDebouncer<S: MutationSink + 'static> {
    sink: Arc<S>,
    window: Duration,
    queued: Arc<Mutex<HashMap<String, Queued>>>,
    generation: AtomicU64,
}

impl<S: MutationSink + 'static> UpdateDebouncer<S> {
    pub fn new(sink: Arc<S>, window: Duration) -> Self {
        Self {
            sink,
            window,
            queued: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    pub fn from_config(sink: Arc<S>, config: &SyncConfig) -> Self {
        Self::new(sink, Duration::from_millis(config.debounce_ms))
    }

    pub fn window(&self) -> Duration {
        self.window
    }

    /// Number of intents still waiting for their window to close.
    pub async fn pending(&self) -> usize {
        self.queued.lock().await.len()
    }

    /// Queue an intent.
    ///
    /// The returned task resolves to `None` when the intent was superseded or
    /// flushed, and to the sink's result otherwise.
    pub async fn submit(&self, intent: UpdateDocument) -> JoinHandle<Option<Result<Document>>> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let document_id = intent.document_id.clone();
        {
            let mut queued = self.queued.lock().await;
            if queued
                .insert(document_id.clone(), Queued { generation, intent })
                .is_some()
            {
                debug!("Superseded pending update for {}", document_id);
            }
        }

        let sink = Arc::clone(&self.sink);
        let queued = Arc::clone(&self.queued);
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            let intent = {
                let mut queued = queued.lock().await;
                match queued.get(&document_id) {
                    Some(q) if q.generation == generation => queued.remove(&document_id)?.intent,
                    _ => return None,
                }
            };
            let result = sink.update_document(intent).await;
            if let Err(e) = &result {
                warn!("Debounced update of {} failed: {}", document_id, e);
            }
            Some(result)
        })
    }

    /// Send every waiting intent now.
    pub async fn flush(&self) -> Vec<Result<Document>> {
        let drained: Vec<UpdateDocument> = {
            let mut queued = self.queued.lock().await;
            let mut items: Vec<Queued> = queued.drain().map(|(_, q)| q).collect();
            items.sort_by_key(|q| q.generation);
            items.into_iter().map(|q| q.intent).collect()
        };
        let mut results = Vec::with_capacity(drained.len());
        for intent in drained {
            results.push(self.sink.update_document(intent).await);
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lineage_core::{
        CreateHumanTransform, HumanTransformCreated, LineageError, OriginType, SchemaType,
    };
    use serde_json::json;

    #[derive(Default)]
    struct RecordingSink {
        updates: std::sync::Mutex<Vec<UpdateDocument>>,
    }

    #[async_trait]
    impl MutationSink for RecordingSink {
        async fn create_human_transform(&self, _intent: CreateHumanTransform) -> Result<HumanTransformCreated> {
            Err(LineageError::internal("not used"))
        }

        async fn update_document(&self, intent: UpdateDocument) -> Result<Document> {
            self.updates.lock().unwrap().push(intent.clone());
            let mut doc = Document::new("p1", SchemaType::UserInput, OriginType::UserInput, intent.data);
            doc.id = intent.document_id;
            Ok(doc)
        }
    }

    fn update(id: &str, n: i64) -> UpdateDocument {
        UpdateDocument {
            document_id: id.to_string(),
            data: json!({ "n": n }),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_last_intent_in_window_is_sent() {
        let sink = Arc::new(RecordingSink::default());
        let debouncer = UpdateDebouncer::new(Arc::clone(&sink), Duration::from_millis(500));

        let first = debouncer.submit(update("a", 1)).await;
        tokio::time::sleep(Duration::from_millis(100)).await;
        let second = debouncer.submit(update("a", 2)).await;

        assert!(first.await.unwrap().is_none());
        let sent = second.await.unwrap().unwrap().unwrap();
        assert_eq!(sent.data, json!({"n": 2}));
        assert_eq!(sink.updates.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_documents_are_debounced_independently() {
        let sink = Arc::new(RecordingSink::default());
        let debouncer = UpdateDebouncer::new(Arc::clone(&sink), Duration::from_millis(500));

        let a = debouncer.submit(update("a", 1)).await;
        let b = debouncer.submit(update("b", 1)).await;
        assert!(a.await.unwrap().is_some());
        assert!(b.await.unwrap().is_some());
        assert_eq!(sink.updates.lock().unwrap().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_sends_immediately() {
        let sink = Arc::new(RecordingSink::default());
        let config = SyncConfig::default();
        let debouncer = UpdateDebouncer::from_config(Arc::clone(&sink), &config);
        assert_eq!(debouncer.window(), Duration::from_millis(500));

        let handle = debouncer.submit(update("a", 7)).await;
        assert_eq!(debouncer.pending().await, 1);
        let results = debouncer.flush().await;
        assert_eq!(results.len(), 1);
        assert_eq!(debouncer.pending().await, 0);

        // The timer task finds nothing left to send.
        assert!(handle.await.unwrap().is_none());
        assert_eq!(sink.updates.lock().unwrap().len(), 1);
    }
}
