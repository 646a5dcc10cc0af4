//! Typed document content, one variant per schema.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::path::{DerivationPath, PathSegment};
use crate::types::{parse_lenient, Document, SchemaType};

/// A single story idea.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoryIdea {
    pub title: String,
    pub body: String,
}

/// One stage of the chronological story outline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChronicleStage {
    pub title: String,
    #[serde(alias = "stageSynopsis")]
    pub synopsis: String,
    #[serde(alias = "event")]
    pub events: Vec<String>,
}

/// A contiguous run of episodes planned together.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodeGroup {
    #[serde(alias = "groupTitle")]
    pub group_title: String,
    /// Episode range, e.g. `"1-4"`.
    pub episodes: String,
    #[serde(alias = "plotDescription")]
    pub plot_description: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdeaCollectionContent {
    pub ideas: Vec<StoryIdea>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlineSettingsContent {
    pub title: String,
    pub genre: String,
    pub target_audience: Value,
    pub selling_points: Vec<String>,
    pub characters: Vec<Value>,
    /// Any further keys the generator emitted.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChroniclesContent {
    pub stages: Vec<ChronicleStage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EpisodePlanningContent {
    #[serde(alias = "totalEpisodes")]
    pub total_episodes: u32,
    #[serde(alias = "episodeGroups")]
    pub episode_groups: Vec<EpisodeGroup>,
}

/// Parameters a brainstorm run was requested with.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrainstormInputContent {
    pub platform: String,
    pub genre: String,
    pub requirements: String,
    #[serde(alias = "numberOfIdeas")]
    pub number_of_ideas: u32,
}

/// Document data decoded according to its schema.
#[derive(Debug, Clone, PartialEq)]
pub enum DocumentContent {
    IdeaCollection(IdeaCollectionContent),
    Idea(StoryIdea),
    OutlineSettings(OutlineSettingsContent),
    Chronicles(ChroniclesContent),
    EpisodePlanning(EpisodePlanningContent),
    BrainstormInput(BrainstormInputContent),
    Generic(Value),
}

impl DocumentContent {
    /// Decode a raw payload for `schema`.
    ///
    /// Never fails: unparseable payloads decode as an empty object, and a shape
    /// that does not fit the schema yields the schema's empty content.
    pub fn decode(schema: &SchemaType, raw: &Value) -> Self {
        let value = parse_lenient(raw);
        match schema {
            SchemaType::IdeaCollection => {
                // Some producers store the collection as a bare array.
                let value = match value {
                    Value::Array(items) => serde_json::json!({ "ideas": items }),
                    other => other,
                };
                Self::IdeaCollection(decode_or_default(value))
            }
            SchemaType::Idea => Self::Idea(decode_or_default(value)),
            SchemaType::OutlineSettings => Self::OutlineSettings(decode_or_default(value)),
            SchemaType::Chronicles => Self::Chronicles(decode_or_default(value)),
            SchemaType::EpisodePlanning => Self::EpisodePlanning(decode_or_default(value)),
            SchemaType::BrainstormInput => Self::BrainstormInput(decode_or_default(value)),
            SchemaType::UserInput | SchemaType::Other(_) => Self::Generic(value),
        }
    }

    /// Decode a document's data.
    pub fn of(document: &Document) -> Self {
        Self::decode(&document.schema_type, &document.data)
    }

    /// Short human-readable label, used in listings.
    pub fn label(&self) -> String {
        match self {
            Self::IdeaCollection(c) => format!("{} ideas", c.ideas.len()),
            Self::Idea(idea) => idea.title.clone(),
            Self::OutlineSettings(o) => o.title.clone(),
            Self::Chronicles(c) => format!("{} stages", c.stages.len()),
            Self::EpisodePlanning(e) => format!("{} episodes", e.total_episodes),
            Self::BrainstormInput(b) => format!("{} / {}", b.platform, b.genre),
            Self::Generic(value) => value
                .get("title")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
        }
    }
}

fn decode_or_default<T: DeserializeOwned + Default>(value: Value) -> T {
    serde_json::from_value(value).unwrap_or_default()
}

/// Select the sub-value of a document's data that `path` addresses.
///
/// Paths are schema-relative: for collection schemas a leading index addresses
/// the item array (`"[0]"` is `ideas[0]` of an idea collection).
pub fn select_for_schema(schema: &SchemaType, data: &Value, path: &DerivationPath) -> Option<Value> {
    if let (Some(field), Some(_)) = (schema.item_array_field(), path.leading_index()) {
        if let Some(items) = data.get(field) {
            return path.select(items).cloned();
        }
    }
    path.select(data).cloned()
}

/// Rewrite `path` into the item-relative form used for collections.
///
/// `"$.ideas[0].title"` of an idea collection becomes `"[0].title"`; other
/// paths and schemas are returned unchanged.
pub fn normalize_for_schema(schema: &SchemaType, path: &DerivationPath) -> DerivationPath {
    match (schema.item_array_field(), path.segments()) {
        (Some(field), [PathSegment::Field(name), PathSegment::Index(_), rest @ ..]) if name == field => {
            let mut segments = path.segments()[1..2].to_vec();
            segments.extend_from_slice(rest);
            DerivationPath::new(segments)
        }
        _ => path.clone(),
    }
}

/// Apply field updates on top of a base value.
///
/// Object bases are merged key by key; any other base is replaced by the
/// updates when there are some.
pub fn merge_fields(base: Value, updates: &Map<String, Value>) -> Value {
    if updates.is_empty() {
        return base;
    }
    match base {
        Value::Object(mut map) => {
            for (key, value) in updates {
                map.insert(key.clone(), value.clone());
            }
            Value::Object(map)
        }
        _ => Value::Object(updates.clone()),
    }
}

/// Schema of the document produced by editing `path` of a `source` document.
pub fn derived_schema(source: &SchemaType, path: &DerivationPath) -> SchemaType {
    if path.is_root() {
        return source.clone();
    }
    match (source.item_schema(), normalize_for_schema(source, path).segments()) {
        (Some(item), [PathSegment::Index(_)]) => item,
        _ => SchemaType::UserInput,
    }
}
