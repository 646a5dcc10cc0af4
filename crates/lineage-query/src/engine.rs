//! Memoized derivation from snapshots to lineage views.
//!
//! The engine owns no data of its own: each applied [`Snapshot`] is turned
//! into an immutable [`LineageView`] (graph plus canonical context), rebuilt
//! only when the snapshot's rows actually changed.

use std::sync::Arc;

use tracing::{debug, info, warn};

use lineage_core::{DerivationPath, Fingerprint, Snapshot, SnapshotStatus};

use crate::canonical::{compute_canonical_context, CanonicalContext};
use crate::graph::LineageGraph;
use crate::overrides::{editability, has_human_transform_for_path, Editability, OverrideQuery};
use crate::resolve::{find_latest_document_with, ResolveOptions, ResolvedDocument};

/// A value computed from a snapshot that may not be available yet.
#[derive(Debug, Clone, PartialEq)]
pub enum Derived<T> {
    Pending,
    Error(String),
    Ready(T),
}

impl<T> Derived<T> {
    pub fn ready(self) -> Option<T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }
}

/// Everything derived from one set of rows.
#[derive(Debug)]
pub struct LineageView {
    pub project_id: String,
    pub fingerprint: Fingerprint,
    pub graph: LineageGraph,
    pub canonical: CanonicalContext,
}

/// Current derivation state of the engine.
#[derive(Debug, Clone, Default)]
pub enum LineageState {
    #[default]
    Pending,
    Error {
        message: String,
    },
    Ready(Arc<LineageView>),
}

/// Outcome of [`LineageEngine::refresh`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    /// The snapshot is older than one already applied and was ignored.
    Stale,
    Pending,
    Error,
    /// Rows are unchanged; the previous view is kept.
    Unchanged,
    Rebuilt,
}

/// Applies snapshots in version order and memoizes the derived view.
#[derive(Debug, Default)]
pub struct LineageEngine {
    options: ResolveOptions,
    state: LineageState,
    applied_version: Option<u64>,
    rebuilds: u64,
}

impl LineageEngine {
    pub fn new(options: ResolveOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    pub fn state(&self) -> &LineageState {
        &self.state
    }

    /// Version of the last applied snapshot.
    pub fn applied_version(&self) -> Option<u64> {
        self.applied_version
    }

    /// Number of times the view was rebuilt.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn view(&self) -> Derived<Arc<LineageView>> {
        match &self.state {
            LineageState::Pending => Derived::Pending,
            LineageState::Error { message } => Derived::Error(message.clone()),
            LineageState::Ready(view) => Derived::Ready(Arc::clone(view)),
        }
    }

    /// Apply a snapshot. Snapshots older than the last applied one are discarded.
    pub fn refresh(&mut self, snapshot: &Snapshot) -> Refresh {
        if self.applied_version.is_some_and(|v| snapshot.version < v) {
            debug!(
                "Discarding stale snapshot {} of {} (applied {:?})",
                snapshot.version, snapshot.project_id, self.applied_version
            );
            return Refresh::Stale;
        }
        self.applied_version = Some(snapshot.version);

        let rows = match snapshot.status() {
            SnapshotStatus::Error { table, message } => {
                warn!("Row collection {} failed: {}", table, message);
                self.state = LineageState::Error {
                    message: format!("{}: {}", table, message),
                };
                return Refresh::Error;
            }
            SnapshotStatus::Pending => {
                self.state = LineageState::Pending;
                return Refresh::Pending;
            }
            SnapshotStatus::Ready => match snapshot.rows.complete() {
                Some(rows) => rows,
                None => {
                    self.state = LineageState::Pending;
                    return Refresh::Pending;
                }
            },
        };

        let fingerprint = match rows.fingerprint() {
            Ok(fingerprint) => fingerprint,
            Err(e) => {
                self.state = LineageState::Error {
                    message: e.to_string(),
                };
                return Refresh::Error;
            }
        };

        if let LineageState::Ready(view) = &self.state {
            if view.fingerprint == fingerprint && view.project_id == snapshot.project_id {
                return Refresh::Unchanged;
            }
        }

        let graph = LineageGraph::build(rows);
        let canonical = compute_canonical_context(&graph);
        self.rebuilds += 1;
        info!(
            "Rebuilt lineage view for {} at version {} ({}, {} documents)",
            snapshot.project_id,
            snapshot.version,
            fingerprint,
            graph.len()
        );
        self.state = LineageState::Ready(Arc::new(LineageView {
            project_id: snapshot.project_id.clone(),
            fingerprint,
            graph,
            canonical,
        }));
        Refresh::Rebuilt
    }

    fn with_view<T>(&self, f: impl FnOnce(&LineageView) -> T) -> Derived<T> {
        match &self.state {
            LineageState::Pending => Derived::Pending,
            LineageState::Error { message } => Derived::Error(message.clone()),
            LineageState::Ready(view) => Derived::Ready(f(view)),
        }
    }

    pub fn resolve(&self, document_id: Option<&str>, path: &DerivationPath) -> Derived<ResolvedDocument> {
        let options = self.options;
        self.with_view(|view| find_latest_document_with(&view.graph, document_id, path, options))
    }

    pub fn canonical(&self) -> Derived<CanonicalContext> {
        self.with_view(|view| view.canonical.clone())
    }

    pub fn check_override(&self, document_id: &str, path: &DerivationPath) -> Derived<OverrideQuery> {
        self.with_view(|view| has_human_transform_for_path(&view.graph, document_id, path))
    }

    pub fn editability(&self, document_id: &str, path: &DerivationPath) -> Derived<Editability> {
        let options = self.options;
        self.with_view(|view| editability(&view.graph, document_id, path, options))
    }
}
