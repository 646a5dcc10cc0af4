//! Core traits defining the interfaces between components.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{LineageError, Result};
use crate::types::{Document, HumanTransform, ProjectRows, RowTable, TableRows, Transform};

/// Source of a project's row collections (the sync layer's view of the server).
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Fetch every row of one table for a project.
    async fn fetch_table(&self, project_id: &str, table: RowTable) -> Result<TableRows>;

    /// Fetch all five tables, failing on the first error.
    async fn fetch_project(&self, project_id: &str) -> Result<ProjectRows> {
        let mut rows = ProjectRows::default();
        for table in RowTable::ALL {
            match self.fetch_table(project_id, table).await? {
                TableRows::Documents(r) => rows.documents = r,
                TableRows::Transforms(r) => rows.transforms = r,
                TableRows::HumanTransforms(r) => rows.human_transforms = r,
                TableRows::TransformInputs(r) => rows.transform_inputs = r,
                TableRows::TransformOutputs(r) => rows.transform_outputs = r,
            }
        }
        Ok(rows)
    }
}

/// Request to record a human edit of part of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateHumanTransform {
    pub project_id: String,

    pub transform_name: String,

    pub source_document_id: String,

    /// Path into the source document, `"$"` for the whole document.
    pub derivation_path: String,

    /// Fields to set on the derived document.
    #[serde(default)]
    pub field_updates: Map<String, Value>,
}

/// Rows created by a human edit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanTransformCreated {
    pub transform: Transform,
    pub human_transform: HumanTransform,
    pub derived_document: Document,
}

/// Request to replace the data of a `user_input` document in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateDocument {
    pub document_id: String,
    pub data: Value,
}

/// Sink for mutation intents. New rows come back through the [`RowSource`].
#[async_trait]
pub trait MutationSink: Send + Sync {
    /// Create a human transform and its derived document.
    async fn create_human_transform(&self, intent: CreateHumanTransform) -> Result<HumanTransformCreated>;

    /// Replace the data of an in-place editable document.
    async fn update_document(&self, intent: UpdateDocument) -> Result<Document>;
}

impl CreateHumanTransform {
    /// Reject intents that could never succeed, before any I/O.
    pub fn validate(&self) -> Result<()> {
        if self.transform_name.trim().is_empty() {
            return Err(LineageError::invalid_argument("transform_name must not be empty"));
        }
        if self.source_document_id.trim().is_empty() {
            return Err(LineageError::invalid_argument("source_document_id must not be empty"));
        }
        self.derivation_path.parse::<crate::DerivationPath>()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(path: &str) -> CreateHumanTransform {
        CreateHumanTransform {
            project_id: "p1".to_string(),
            transform_name: "edit_outline_settings".to_string(),
            source_document_id: "d1".to_string(),
            derivation_path: path.to_string(),
            field_updates: Map::new(),
        }
    }

    #[test]
    fn test_validate_intent() {
        assert!(intent("$").validate().is_ok());
        assert!(intent("[0].title").validate().is_ok());
        assert_eq!(intent("[x").validate().unwrap_err().error_code(), "INVALID_PATH");

        let mut unnamed = intent("$");
        unnamed.transform_name = " ".to_string();
        assert_eq!(unnamed.validate().unwrap_err().error_code(), "INVALID_ARGUMENT");
    }

    struct FailingSource;

    #[async_trait]
    impl RowSource for FailingSource {
        async fn fetch_table(&self, _project_id: &str, table: RowTable) -> Result<TableRows> {
            match table {
                RowTable::HumanTransforms => Err(LineageError::sync("offline")),
                RowTable::Documents => Ok(TableRows::Documents(Vec::new())),
                RowTable::Transforms => Ok(TableRows::Transforms(Vec::new())),
                RowTable::TransformInputs => Ok(TableRows::TransformInputs(Vec::new())),
                RowTable::TransformOutputs => Ok(TableRows::TransformOutputs(Vec::new())),
            }
        }
    }

    #[tokio::test]
    async fn test_fetch_project_propagates_table_error() {
        let err = FailingSource.fetch_project("p1").await.unwrap_err();
        assert_eq!(err.error_code(), "SYNC_ERROR");
    }
}
