//! Row types mirrored from the project store.
//!
//! Every row is scoped to a project and is immutable once created, with one
//! exception: `user_input` documents may have their data replaced in place.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use ulid::Ulid;

/// Category tag of a document's data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum SchemaType {
    /// A batch of brainstormed story ideas.
    IdeaCollection,
    /// One story idea, either split out of a collection or written directly.
    Idea,
    OutlineSettings,
    Chronicles,
    EpisodePlanning,
    /// The parameters a brainstorm run was started with.
    BrainstormInput,
    /// Free-form user content with no fixed shape.
    UserInput,
    /// A schema this client does not know about.
    Other(String),
}

impl SchemaType {
    /// Canonical wire name.
    pub fn as_str(&self) -> &str {
        match self {
            Self::IdeaCollection => "brainstorm_collection",
            Self::Idea => "brainstorm_idea",
            Self::OutlineSettings => "outline_settings",
            Self::Chronicles => "chronicles",
            Self::EpisodePlanning => "episode_planning",
            Self::BrainstormInput => "brainstorm_input_params",
            Self::UserInput => "user_input",
            Self::Other(name) => name,
        }
    }

    /// Whether documents of this schema hold an indexable list of items.
    pub fn is_collection(&self) -> bool {
        matches!(self, Self::IdeaCollection)
    }

    /// Schema of a single item split out of a collection.
    pub fn item_schema(&self) -> Option<SchemaType> {
        match self {
            Self::IdeaCollection => Some(Self::Idea),
            _ => None,
        }
    }

    /// Key of the item array inside a collection's data.
    pub fn item_array_field(&self) -> Option<&'static str> {
        match self {
            Self::IdeaCollection => Some("ideas"),
            _ => None,
        }
    }
}

impl FromStr for SchemaType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_lowercase().as_str() {
            "brainstorm_collection" | "brainstorm_idea_collection" | "idea_collection" => {
                Self::IdeaCollection
            }
            "brainstorm_idea" | "single_idea" | "idea" => Self::Idea,
            "outline_settings" => Self::OutlineSettings,
            "chronicles" => Self::Chronicles,
            "episode_planning" => Self::EpisodePlanning,
            "brainstorm_input_params" | "brainstorm_input" | "raw_brainstorm_input" => {
                Self::BrainstormInput
            }
            "user_input" => Self::UserInput,
            _ => Self::Other(s.to_string()),
        })
    }
}

impl fmt::Display for SchemaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for SchemaType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for SchemaType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        match s.parse() {
            Ok(schema) => Ok(schema),
            Err(never) => match never {},
        }
    }
}

/// Who produced a document. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OriginType {
    AiGenerated,
    UserInput,
}

impl OriginType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AiGenerated => "ai_generated",
            Self::UserInput => "user_input",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ai_generated" => Some(Self::AiGenerated),
            "user_input" => Some(Self::UserInput),
            _ => None,
        }
    }
}

/// Kind of derivation event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformType {
    Ai,
    Human,
}

impl TransformType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Ai => "ai",
            Self::Human => "human",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ai" | "llm" => Some(Self::Ai),
            "human" => Some(Self::Human),
            _ => None,
        }
    }
}

/// Lifecycle of a transform. Only AI transforms linger in `Running`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransformStatus {
    Running,
    Completed,
    Failed,
}

impl TransformStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "running" | "pending" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "failed" | "cancelled" => Some(Self::Failed),
            _ => None,
        }
    }
}

/// A versioned unit of project content ("jsondoc").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,

    pub project_id: String,

    pub schema_type: SchemaType,

    pub origin_type: OriginType,

    /// JSON payload. Some producers store it as a serialized string; use
    /// [`Document::parsed_data`] rather than reading this directly.
    #[serde(default)]
    pub data: Value,

    /// Creation timestamp (Unix millis).
    pub created_at: u64,

    /// Last update timestamp (Unix millis).
    #[serde(default)]
    pub updated_at: u64,
}

impl Document {
    /// Create a new document with a fresh id.
    pub fn new(project_id: &str, schema_type: SchemaType, origin_type: OriginType, data: Value) -> Self {
        let now = now_millis();
        Self {
            id: Ulid::new().to_string(),
            project_id: project_id.to_string(),
            schema_type,
            origin_type,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    /// The document's data as a JSON value.
    ///
    /// String payloads are parsed; anything that fails to parse, or parses to a
    /// non-object, non-array value, degrades to an empty object.
    pub fn parsed_data(&self) -> Value {
        parse_lenient(&self.data)
    }

    pub fn is_user_input(&self) -> bool {
        self.origin_type == OriginType::UserInput
    }
}

/// Parse a stored JSON payload, degrading to `{}` on anything unusable.
pub fn parse_lenient(raw: &Value) -> Value {
    let value = match raw {
        Value::String(s) => serde_json::from_str(s).unwrap_or(Value::Null),
        other => other.clone(),
    };
    match value {
        Value::Object(_) | Value::Array(_) => value,
        _ => Value::Object(Map::new()),
    }
}

/// A recorded derivation event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub id: String,

    pub project_id: String,

    #[serde(rename = "type")]
    pub transform_type: TransformType,

    pub status: TransformStatus,

    /// Creation timestamp (Unix millis).
    pub created_at: u64,

    /// Last update timestamp (Unix millis).
    #[serde(default)]
    pub updated_at: u64,
}

impl Transform {
    /// Create a new transform with a fresh id.
    pub fn new(project_id: &str, transform_type: TransformType, status: TransformStatus) -> Self {
        let now = now_millis();
        Self {
            id: Ulid::new().to_string(),
            project_id: project_id.to_string(),
            transform_type,
            status,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Edit metadata attached to a `human` transform.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HumanTransform {
    pub transform_id: String,

    pub project_id: String,

    pub source_document_id: String,

    /// Raw path string; parsed when the lineage graph is built.
    pub derivation_path: String,

    #[serde(default)]
    pub derived_document_id: Option<String>,

    #[serde(default)]
    pub transform_name: String,
}

/// Edge from a document into the transform that consumed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformInput {
    pub project_id: String,

    pub transform_id: String,

    pub document_id: String,

    #[serde(default)]
    pub input_role: Option<String>,
}

/// Edge from a transform to a document it produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformOutput {
    pub project_id: String,

    pub transform_id: String,

    pub document_id: String,

    /// Free-form role. When it parses as a derivation path (e.g. `"[1]"`) it
    /// names the part of the input this output was split from.
    #[serde(default)]
    pub output_role: Option<String>,
}

/// The five row collections of a project, fully loaded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectRows {
    #[serde(default)]
    pub documents: Vec<Document>,

    #[serde(default)]
    pub transforms: Vec<Transform>,

    #[serde(default)]
    pub human_transforms: Vec<HumanTransform>,

    #[serde(default)]
    pub transform_inputs: Vec<TransformInput>,

    #[serde(default)]
    pub transform_outputs: Vec<TransformOutput>,
}

/// Identifies one row collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RowTable {
    Documents,
    Transforms,
    HumanTransforms,
    TransformInputs,
    TransformOutputs,
}

impl RowTable {
    pub const ALL: [RowTable; 5] = [
        Self::Documents,
        Self::Transforms,
        Self::HumanTransforms,
        Self::TransformInputs,
        Self::TransformOutputs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Documents => "jsondocs",
            Self::Transforms => "transforms",
            Self::HumanTransforms => "human_transforms",
            Self::TransformInputs => "transform_inputs",
            Self::TransformOutputs => "transform_outputs",
        }
    }
}

impl fmt::Display for RowTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rows of a single table.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRows {
    Documents(Vec<Document>),
    Transforms(Vec<Transform>),
    HumanTransforms(Vec<HumanTransform>),
    TransformInputs(Vec<TransformInput>),
    TransformOutputs(Vec<TransformOutput>),
}

impl TableRows {
    pub fn table(&self) -> RowTable {
        match self {
            Self::Documents(_) => RowTable::Documents,
            Self::Transforms(_) => RowTable::Transforms,
            Self::HumanTransforms(_) => RowTable::HumanTransforms,
            Self::TransformInputs(_) => RowTable::TransformInputs,
            Self::TransformOutputs(_) => RowTable::TransformOutputs,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            Self::Documents(rows) => rows.len(),
            Self::Transforms(rows) => rows.len(),
            Self::HumanTransforms(rows) => rows.len(),
            Self::TransformInputs(rows) => rows.len(),
            Self::TransformOutputs(rows) => rows.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Current time in Unix millis.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
