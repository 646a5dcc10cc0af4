//! Versioned, immutable snapshots of a project's row collections.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{
    Document, HumanTransform, ProjectRows, RowTable, TableRows, Transform, TransformInput,
    TransformOutput,
};

/// A row collection as delivered by the sync layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", content = "value", rename_all = "lowercase")]
pub enum Loadable<T> {
    /// Not loaded yet. A normal transient state.
    Pending,
    /// The source failed to deliver this collection.
    Error(String),
    Ready(T),
}

impl<T> Loadable<T> {
    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn as_ready(&self) -> Option<&T> {
        match self {
            Self::Ready(value) => Some(value),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loadable<U> {
        match self {
            Self::Pending => Loadable::Pending,
            Self::Error(message) => Loadable::Error(message),
            Self::Ready(value) => Loadable::Ready(f(value)),
        }
    }
}

impl<T> Default for Loadable<T> {
    fn default() -> Self {
        Self::Pending
    }
}

/// Overall readiness of a set of collections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Pending,
    /// At least one collection failed. Takes precedence over `Pending`.
    Error { table: RowTable, message: String },
    Ready,
}

/// All five row collections of a project, each independently loadable.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RowCollections {
    pub documents: Loadable<Vec<Document>>,
    pub transforms: Loadable<Vec<Transform>>,
    pub human_transforms: Loadable<Vec<HumanTransform>>,
    pub transform_inputs: Loadable<Vec<TransformInput>>,
    pub transform_outputs: Loadable<Vec<TransformOutput>>,
}

/// Borrowed view of fully loaded collections.
#[derive(Debug, Clone, Copy)]
pub struct CompleteRows<'a> {
    pub documents: &'a [Document],
    pub transforms: &'a [Transform],
    pub human_transforms: &'a [HumanTransform],
    pub transform_inputs: &'a [TransformInput],
    pub transform_outputs: &'a [TransformOutput],
}

impl RowCollections {
    /// Every collection still pending.
    pub fn pending() -> Self {
        Self::default()
    }

    /// Every collection loaded from `rows`.
    pub fn ready(rows: ProjectRows) -> Self {
        Self {
            documents: Loadable::Ready(rows.documents),
            transforms: Loadable::Ready(rows.transforms),
            human_transforms: Loadable::Ready(rows.human_transforms),
            transform_inputs: Loadable::Ready(rows.transform_inputs),
            transform_outputs: Loadable::Ready(rows.transform_outputs),
        }
    }

    /// Replace one collection with freshly delivered rows.
    pub fn set_rows(&mut self, rows: TableRows) {
        match rows {
            TableRows::Documents(r) => self.documents = Loadable::Ready(r),
            TableRows::Transforms(r) => self.transforms = Loadable::Ready(r),
            TableRows::HumanTransforms(r) => self.human_transforms = Loadable::Ready(r),
            TableRows::TransformInputs(r) => self.transform_inputs = Loadable::Ready(r),
            TableRows::TransformOutputs(r) => self.transform_outputs = Loadable::Ready(r),
        }
    }

    /// Mark one collection pending or failed.
    pub fn set_state(&mut self, table: RowTable, error: Option<String>) {
        macro_rules! reset {
            ($field:expr) => {
                $field = match error {
                    Some(message) => Loadable::Error(message),
                    None => Loadable::Pending,
                }
            };
        }
        match table {
            RowTable::Documents => reset!(self.documents),
            RowTable::Transforms => reset!(self.transforms),
            RowTable::HumanTransforms => reset!(self.human_transforms),
            RowTable::TransformInputs => reset!(self.transform_inputs),
            RowTable::TransformOutputs => reset!(self.transform_outputs),
        }
    }

    fn states(&self) -> [(RowTable, Option<&str>, bool); 5] {
        fn state<T>(l: &Loadable<T>) -> (Option<&str>, bool) {
            match l {
                Loadable::Error(message) => (Some(message.as_str()), false),
                Loadable::Pending => (None, true),
                Loadable::Ready(_) => (None, false),
            }
        }
        let d = state(&self.documents);
        let t = state(&self.transforms);
        let h = state(&self.human_transforms);
        let i = state(&self.transform_inputs);
        let o = state(&self.transform_outputs);
        [
            (RowTable::Documents, d.0, d.1),
            (RowTable::Transforms, t.0, t.1),
            (RowTable::HumanTransforms, h.0, h.1),
            (RowTable::TransformInputs, i.0, i.1),
            (RowTable::TransformOutputs, o.0, o.1),
        ]
    }

    /// Combined readiness: any error wins, then any pending.
    pub fn status(&self) -> SnapshotStatus {
        let states = self.states();
        if let Some((table, Some(message), _)) = states.iter().find(|(_, e, _)| e.is_some()) {
            return SnapshotStatus::Error {
                table: *table,
                message: message.to_string(),
            };
        }
        if states.iter().any(|(_, _, pending)| *pending) {
            return SnapshotStatus::Pending;
        }
        SnapshotStatus::Ready
    }

    /// Borrow the collections when all five are loaded.
    pub fn complete(&self) -> Option<CompleteRows<'_>> {
        Some(CompleteRows {
            documents: self.documents.as_ready()?,
            transforms: self.transforms.as_ready()?,
            human_transforms: self.human_transforms.as_ready()?,
            transform_inputs: self.transform_inputs.as_ready()?,
            transform_outputs: self.transform_outputs.as_ready()?,
        })
    }
}

impl CompleteRows<'_> {
    /// Content fingerprint of the rows, independent of snapshot version.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let mut hasher = blake3::Hasher::new();
        serde_json::to_writer(&mut hasher, self.documents)?;
        serde_json::to_writer(&mut hasher, self.transforms)?;
        serde_json::to_writer(&mut hasher, self.human_transforms)?;
        serde_json::to_writer(&mut hasher, self.transform_inputs)?;
        serde_json::to_writer(&mut hasher, self.transform_outputs)?;
        Ok(Fingerprint(*hasher.finalize().as_bytes()))
    }

    /// Owned copy of the rows.
    pub fn to_rows(&self) -> ProjectRows {
        ProjectRows {
            documents: self.documents.to_vec(),
            transforms: self.transforms.to_vec(),
            human_transforms: self.human_transforms.to_vec(),
            transform_inputs: self.transform_inputs.to_vec(),
            transform_outputs: self.transform_outputs.to_vec(),
        }
    }
}

/// Blake3 digest of a snapshot's rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form is enough to tell snapshots apart in logs.
        write!(f, "{}", &self.to_hex()[..12])
    }
}

/// An immutable, versioned view of one project's rows.
///
/// Versions increase monotonically per project; consumers discard results
/// computed from a snapshot once a newer version has been applied.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub project_id: String,
    pub version: u64,
    pub rows: RowCollections,
}

impl Snapshot {
    pub fn new(project_id: impl Into<String>, version: u64, rows: RowCollections) -> Self {
        Self {
            project_id: project_id.into(),
            version,
            rows,
        }
    }

    pub fn status(&self) -> SnapshotStatus {
        self.rows.status()
    }
}
