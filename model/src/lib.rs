//! The SPDX 2.3 document model: an in-memory, cyclic-capable graph of
//! packages and files with identifier invariants, relationship semantics
//! and stable serialization to the tag-value and JSON encodings.

pub mod document;
pub mod dot;
pub mod element;
pub mod error;
pub mod external;
pub mod outline;
pub mod parse;
pub mod provenance;
pub mod relationship;
pub mod serialize;

pub use document::Document;
pub use element::{Actor, Element, ElementKind, FileData, FileType, PackageData};
pub use error::Error;
pub use external::{ExternalDocumentRef, ExternalRef, RefCategory};
pub use relationship::{Relationship, RelationshipType};

/// The SPDX specification version emitted by this crate.
pub const SPDX_VERSION: &str = "SPDX-2.3";

/// The data license every SPDX document carries.
pub const DATA_LICENSE: &str = "CC0-1.0";

/// The well-known identifier of the document root.
pub const DOCUMENT_ID: &str = "SPDXRef-DOCUMENT";

/// The `NOASSERTION` token used for unknown mandatory fields.
pub const NOASSERTION: &str = "NOASSERTION";

/// The `NONE` license token.
pub const NONE_LICENSE: &str = "NONE";
