//! Row builders for tests.

use serde_json::Value;

use lineage_core::{
    Document, HumanTransform, OriginType, ProjectRows, RowCollections, SchemaType, Snapshot,
    Transform, TransformInput, TransformOutput, TransformStatus, TransformType,
};

use crate::graph::LineageGraph;

pub const PROJECT: &str = "p1";

/// Builds project rows with a deterministic clock: every row created gets a
/// strictly later timestamp than the one before.
#[derive(Debug, Clone, Default)]
pub struct Fixture {
    rows: ProjectRows,
    clock: u64,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1000;
        self.clock
    }

    pub fn doc(&mut self, id: &str, schema: SchemaType, origin: OriginType, data: Value) -> &mut Self {
        let created_at = self.tick();
        self.rows.documents.push(Document {
            id: id.to_string(),
            project_id: PROJECT.to_string(),
            schema_type: schema,
            origin_type: origin,
            data,
            created_at,
            updated_at: created_at,
        });
        self
    }

    pub fn ai_doc(&mut self, id: &str, schema: SchemaType, data: Value) -> &mut Self {
        self.doc(id, schema, OriginType::AiGenerated, data)
    }

    pub fn user_doc(&mut self, id: &str, schema: SchemaType, data: Value) -> &mut Self {
        self.doc(id, schema, OriginType::UserInput, data)
    }

    pub fn transform(&mut self, id: &str, transform_type: TransformType) -> &mut Self {
        let created_at = self.tick();
        self.rows.transforms.push(Transform {
            id: id.to_string(),
            project_id: PROJECT.to_string(),
            transform_type,
            status: TransformStatus::Completed,
            created_at,
            updated_at: created_at,
        });
        self
    }

    /// Transform with the same timestamp as the previous one.
    pub fn transform_at_same_time(&mut self, id: &str, transform_type: TransformType) -> &mut Self {
        let created_at = self.clock;
        self.rows.transforms.push(Transform {
            id: id.to_string(),
            project_id: PROJECT.to_string(),
            transform_type,
            status: TransformStatus::Completed,
            created_at,
            updated_at: created_at,
        });
        self
    }

    pub fn input(&mut self, transform_id: &str, document_id: &str) -> &mut Self {
        self.rows.transform_inputs.push(TransformInput {
            project_id: PROJECT.to_string(),
            transform_id: transform_id.to_string(),
            document_id: document_id.to_string(),
            input_role: None,
        });
        self
    }

    pub fn output(&mut self, transform_id: &str, document_id: &str) -> &mut Self {
        self.rows.transform_outputs.push(TransformOutput {
            project_id: PROJECT.to_string(),
            transform_id: transform_id.to_string(),
            document_id: document_id.to_string(),
            output_role: None,
        });
        self
    }

    pub fn output_role(&mut self, transform_id: &str, document_id: &str, role: &str) -> &mut Self {
        for output in &mut self.rows.transform_outputs {
            if output.transform_id == transform_id && output.document_id == document_id {
                output.output_role = Some(role.to_string());
            }
        }
        self
    }

    /// AI transform consuming `inputs` and producing `outputs`.
    pub fn ai(&mut self, id: &str, inputs: &[&str], outputs: &[&str]) -> &mut Self {
        self.transform(id, TransformType::Ai);
        for input in inputs {
            self.input(id, input);
        }
        for output in outputs {
            self.output(id, output);
        }
        self
    }

    /// Human edit of `path` of `source`, producing `derived`.
    pub fn human(&mut self, id: &str, source: &str, path: &str, derived: &str) -> &mut Self {
        self.human_record_only(id, source, path, derived)
            .input(id, source)
            .output(id, derived)
    }

    /// Human transform row and edit record, without input/output rows.
    pub fn human_record_only(&mut self, id: &str, source: &str, path: &str, derived: &str) -> &mut Self {
        self.transform(id, TransformType::Human);
        self.human_row(id, source, path, derived)
    }

    pub fn human_row(&mut self, id: &str, source: &str, path: &str, derived: &str) -> &mut Self {
        self.rows.human_transforms.push(HumanTransform {
            transform_id: id.to_string(),
            project_id: PROJECT.to_string(),
            source_document_id: source.to_string(),
            derivation_path: path.to_string(),
            derived_document_id: Some(derived.to_string()),
            transform_name: "edit".to_string(),
        });
        self
    }

    pub fn rows(&self) -> ProjectRows {
        self.rows.clone()
    }

    pub fn snapshot(&self, version: u64) -> Snapshot {
        Snapshot::new(PROJECT, version, RowCollections::ready(self.rows()))
    }

    pub fn graph(&self) -> LineageGraph {
        let rows = &self.rows;
        crate::graph::build_lineage_graph(
            &rows.documents,
            &rows.transforms,
            &rows.human_transforms,
            &rows.transform_inputs,
            &rows.transform_outputs,
        )
    }
}
