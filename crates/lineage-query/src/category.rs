//! Semantic categories that each have one canonical document per project.

use std::fmt;

use serde::Serialize;

use lineage_core::SchemaType;

/// A slot of the canonical project context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalCategory {
    BrainstormInput,
    IdeaCollection,
    Idea,
    OutlineSettings,
    Chronicles,
    EpisodePlanning,
}

impl CanonicalCategory {
    pub const ALL: [CanonicalCategory; 6] = [
        Self::BrainstormInput,
        Self::IdeaCollection,
        Self::Idea,
        Self::OutlineSettings,
        Self::Chronicles,
        Self::EpisodePlanning,
    ];

    /// Category of documents with a fixed schema. Free-form schemas have none.
    pub fn from_schema(schema: &SchemaType) -> Option<Self> {
        match schema {
            SchemaType::BrainstormInput => Some(Self::BrainstormInput),
            SchemaType::IdeaCollection => Some(Self::IdeaCollection),
            SchemaType::Idea => Some(Self::Idea),
            SchemaType::OutlineSettings => Some(Self::OutlineSettings),
            SchemaType::Chronicles => Some(Self::Chronicles),
            SchemaType::EpisodePlanning => Some(Self::EpisodePlanning),
            SchemaType::UserInput | SchemaType::Other(_) => None,
        }
    }

    /// Schema documents of this category are decoded with.
    pub fn schema_type(&self) -> SchemaType {
        match self {
            Self::BrainstormInput => SchemaType::BrainstormInput,
            Self::IdeaCollection => SchemaType::IdeaCollection,
            Self::Idea => SchemaType::Idea,
            Self::OutlineSettings => SchemaType::OutlineSettings,
            Self::Chronicles => SchemaType::Chronicles,
            Self::EpisodePlanning => SchemaType::EpisodePlanning,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BrainstormInput => "brainstorm_input",
            Self::IdeaCollection => "idea_collection",
            Self::Idea => "idea",
            Self::OutlineSettings => "outline_settings",
            Self::Chronicles => "chronicles",
            Self::EpisodePlanning => "episode_planning",
        }
    }

    /// Plural noun for user-facing messages ("multiple chronicles found").
    pub fn plural_label(&self) -> &'static str {
        match self {
            Self::BrainstormInput => "brainstorm inputs",
            Self::IdeaCollection => "idea collections",
            Self::Idea => "ideas",
            Self::OutlineSettings => "outline settings",
            Self::Chronicles => "chronicles",
            Self::EpisodePlanning => "episode plans",
        }
    }
}

impl fmt::Display for CanonicalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_schema() {
        assert_eq!(
            CanonicalCategory::from_schema(&SchemaType::Chronicles),
            Some(CanonicalCategory::Chronicles)
        );
        assert_eq!(CanonicalCategory::from_schema(&SchemaType::UserInput), None);
        assert_eq!(
            CanonicalCategory::from_schema(&SchemaType::Other("script".into())),
            None
        );
        for category in CanonicalCategory::ALL {
            assert_eq!(CanonicalCategory::from_schema(&category.schema_type()), Some(category));
        }
    }
}
