//! The two encoders over the same document: SPDX 2.3 tag-value and JSON.

pub mod json;
pub mod schema;
pub mod tag_value;

use crate::document::Document;
use crate::error::Error;

pub use json::Json;
pub use tag_value::TagValue;

/// Output encodings supported for SPDX documents.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    TagValue,
    Json,
}

impl Format {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "tag-value" | "tv" => Some(Format::TagValue),
            "json" => Some(Format::Json),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Format::TagValue => "tag-value",
            Format::Json => "json",
        }
    }
}

/// Something that renders a document to bytes.
pub trait Serializer {
    fn serialize(&self, doc: &Document) -> Result<String, Error>;
}

/// Serialize with the serializer matching `format`.
pub fn serialize(doc: &Document, format: Format) -> Result<String, Error> {
    match format {
        Format::TagValue => TagValue.serialize(doc),
        Format::Json => Json.serialize(doc),
    }
}
