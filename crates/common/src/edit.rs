// Field edits: each one replaces a single whole field of a draft snapshot.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::{Attachment, Category, DraftFields, UnknownCategory};

/// Named fields of a document draft.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FieldName {
    Title,
    Body,
    Tags,
    Category,
    Attachments,
}

impl FieldName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Title => "title",
            Self::Body => "body",
            Self::Tags => "tags",
            Self::Category => "category",
            Self::Attachments => "attachments",
        }
    }
}

impl FromStr for FieldName {
    type Err = FieldParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "title" => Ok(Self::Title),
            "body" | "content" => Ok(Self::Body),
            "tags" => Ok(Self::Tags),
            "category" => Ok(Self::Category),
            "attachments" => Ok(Self::Attachments),
            other => Err(FieldParseError::UnknownField(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FieldParseError {
    #[error("unknown field `{0}`")]
    UnknownField(String),

    #[error(transparent)]
    Category(#[from] UnknownCategory),

    #[error("attachments are edited with `attach <url> <name> <media-type>`")]
    AttachmentsNotScalar,

    #[error("attachment needs a url, a name and a media type")]
    MalformedAttachment,
}

/// One user edit against the draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldEdit {
    Title(String),
    Body(String),
    Tags(Vec<String>),
    Category(Option<Category>),
    Attachments(Vec<Attachment>),
    /// Append a tag unless it is blank or already present.
    AddTag(String),
    RemoveTag(String),
    AddAttachment(Attachment),
}

impl FieldEdit {
    /// Build a whole-field replacement from a field name and its textual value.
    ///
    /// Tags are comma separated. An empty category value (or `none`) clears
    /// the category.
    pub fn from_name_value(name: FieldName, value: &str) -> Result<Self, FieldParseError> {
        match name {
            FieldName::Title => Ok(Self::Title(value.to_string())),
            FieldName::Body => Ok(Self::Body(value.to_string())),
            FieldName::Tags => Ok(Self::Tags(split_tags(value))),
            FieldName::Category => {
                let value = value.trim();
                if value.is_empty() || value.eq_ignore_ascii_case("none") {
                    Ok(Self::Category(None))
                } else {
                    Ok(Self::Category(Some(value.parse()?)))
                }
            }
            FieldName::Attachments => Err(FieldParseError::AttachmentsNotScalar),
        }
    }

    /// Parse `<url> <name> <media-type>` into an attachment append. The name
    /// is everything between the first and last token, so it may hold spaces.
    pub fn attachment_from_args(args: &str) -> Result<Self, FieldParseError> {
        let malformed = || FieldParseError::MalformedAttachment;
        let (url, rest) = args.trim().split_once(char::is_whitespace).ok_or_else(malformed)?;
        let (name, media_type) =
            rest.trim().rsplit_once(char::is_whitespace).ok_or_else(malformed)?;
        let name = name.trim();
        if name.is_empty() {
            return Err(FieldParseError::MalformedAttachment);
        }
        Ok(Self::AddAttachment(Attachment::new(url, name, media_type)))
    }

    /// The field this edit rewrites.
    pub fn field(&self) -> FieldName {
        match self {
            Self::Title(_) => FieldName::Title,
            Self::Body(_) => FieldName::Body,
            Self::Tags(_) | Self::AddTag(_) | Self::RemoveTag(_) => FieldName::Tags,
            Self::Category(_) => FieldName::Category,
            Self::Attachments(_) | Self::AddAttachment(_) => FieldName::Attachments,
        }
    }

    /// Apply the edit to `fields`. Returns `false` when nothing changed.
    pub fn apply(self, fields: &mut DraftFields) -> bool {
        match self {
            Self::Title(title) => replace(&mut fields.title, title),
            Self::Body(body) => replace(&mut fields.body, body),
            Self::Tags(tags) => replace(&mut fields.tags, tags),
            Self::Category(category) => replace(&mut fields.category, category),
            Self::Attachments(attachments) => replace(&mut fields.attachments, attachments),
            Self::AddTag(tag) => {
                let tag = tag.trim();
                if tag.is_empty() || fields.tags.iter().any(|existing| existing == tag) {
                    return false;
                }
                fields.tags.push(tag.to_string());
                true
            }
            Self::RemoveTag(tag) => {
                let before = fields.tags.len();
                fields.tags.retain(|existing| existing != &tag);
                fields.tags.len() != before
            }
            Self::AddAttachment(attachment) => {
                fields.attachments.push(attachment);
                true
            }
        }
    }
}

fn replace<T: PartialEq>(slot: &mut T, value: T) -> bool {
    if *slot == value {
        return false;
    }
    *slot = value;
    true
}

fn split_tags(value: &str) -> Vec<String> {
    let mut tags: Vec<String> = Vec::new();
    for tag in value.split(',').map(str::trim).filter(|t| !t.is_empty()) {
        if !tags.iter().any(|existing| existing == tag) {
            tags.push(tag.to_string());
        }
    }
    tags
}
