// Core document types shared by the autosave controller, stores and CLI.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Stable identifier of a remotely persisted document.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct DocumentId(Uuid);

impl DocumentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DocumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for DocumentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Document category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Knowledge,
    Career,
    Social,
    Life,
    Health,
    Hobby,
    Other,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Knowledge,
        Category::Career,
        Category::Social,
        Category::Life,
        Category::Health,
        Category::Hobby,
        Category::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Knowledge => "knowledge",
            Self::Career => "career",
            Self::Social => "social",
            Self::Life => "life",
            Self::Health => "health",
            Self::Hobby => "hobby",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown category `{0}`")]
pub struct UnknownCategory(pub String);

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == wanted)
            .ok_or_else(|| UnknownCategory(s.to_string()))
    }
}

/// Reference to an uploaded file attached to a document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Attachment {
    pub url: String,
    pub name: String,
    #[serde(rename = "type")]
    pub media_type: String,
}

impl Attachment {
    pub fn new(
        url: impl Into<String>,
        name: impl Into<String>,
        media_type: impl Into<String>,
    ) -> Self {
        Self { url: url.into(), name: name.into(), media_type: media_type.into() }
    }

    /// Whether the attachment should render inline as an image.
    pub fn is_image(&self) -> bool {
        self.media_type.starts_with("image/")
    }
}

/// The editable fields of a document, always read and written as one snapshot.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct DraftFields {
    pub title: String,
    pub body: String,
    pub tags: Vec<String>,
    pub category: Option<Category>,
    pub attachments: Vec<Attachment>,
}

impl DraftFields {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// A document as returned by the persistence service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Document {
    pub id: DocumentId,
    #[serde(flatten)]
    pub fields: DraftFields,
    pub updated_at: DateTime<Utc>,
}
