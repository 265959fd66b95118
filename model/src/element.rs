use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;
use std::str::FromStr;

use bomify_common::hashing::Digests;
use bomify_common::id::build_id;
use bomify_common::purl::Purl;
use serde::{Deserialize, Serialize};
use strum::Display as StrumDisplay;

use crate::external::ExternalRef;
use crate::relationship::Relationship;

/// A person or organization acting as supplier or originator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Actor {
    Person { name: String, email: Option<String> },
    Organization { name: String },
}

impl Display for Actor {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Actor::Person { name, email } => match email {
                Some(email) if !email.is_empty() => write!(f, "Person: {name} ({email})"),
                _ => write!(f, "Person: {name}"),
            },
            Actor::Organization { name } => write!(f, "Organization: {name}"),
        }
    }
}

/// SPDX file type tags.
#[derive(Clone, Copy, Debug, PartialEq, Eq, StrumDisplay, Serialize, Deserialize)]
#[strum(serialize_all = "UPPERCASE")]
#[serde(rename_all = "UPPERCASE")]
pub enum FileType {
    Source,
    Binary,
    Text,
    Application,
    Audio,
    Video,
    Image,
    Archive,
    Documentation,
    Other,
}

/// Package-only attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PackageData {
    pub version: String,
    pub supplier: Option<Actor>,
    pub originator: Option<Actor>,
    pub download_location: String,
    pub files_analyzed: bool,
    pub verification_code: String,
    pub license_declared: String,
    pub license_info_from_files: Vec<String>,
    pub homepage: String,
    pub primary_purpose: Option<String>,
    pub external_refs: Vec<ExternalRef>,
    /// Extra segment included in generated identifiers, e.g. "pypi".
    pub id_prefix: Option<String>,
}

/// File-only attributes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FileData {
    /// Path of the file relative to its package root.
    pub file_name: String,
    pub file_types: Vec<FileType>,
    pub license_info_in_file: Option<String>,
    pub notice: Option<String>,
}

/// The per-variant payload of an element.
#[derive(Clone, Debug, PartialEq)]
pub enum ElementKind {
    Package(PackageData),
    File(FileData),
}

/// A node of the document graph: the record shared by packages and files
/// plus the variant payload. Relationships are kept in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct Element {
    id: String,
    pub name: String,
    pub checksums: BTreeMap<String, String>,
    pub license_concluded: Option<String>,
    pub copyright_text: String,
    pub comment: Option<String>,
    pub relationships: Vec<Relationship>,
    pub kind: ElementKind,
}

impl Element {
    pub fn package(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            checksums: BTreeMap::new(),
            license_concluded: None,
            copyright_text: String::new(),
            comment: None,
            relationships: Vec::new(),
            kind: ElementKind::Package(PackageData::default()),
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            id: String::new(),
            name: name.clone(),
            checksums: BTreeMap::new(),
            license_concluded: None,
            copyright_text: String::new(),
            comment: None,
            relationships: Vec::new(),
            kind: ElementKind::File(FileData {
                file_name: name,
                ..Default::default()
            }),
        }
    }

    /// Build a file element from a path on disk, computing its digest set.
    pub fn file_from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let digests = Digests::from_file(path)?;
        let mut file = Self::file(path.to_string_lossy());
        file.set_digests(&digests);
        file.build_id([path.to_string_lossy().as_ref()]);
        Ok(file)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = id.into();
    }

    /// Compose the SPDX identifier from seeds: the variant's default prefix,
    /// the optional package prefix, and the sanitized seed fragment. Without
    /// seeds the fragment is a fresh UUID.
    pub fn build_id<I, S>(&mut self, seeds: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fragment = build_id(seeds);
        self.id = match &self.kind {
            ElementKind::Package(data) => match &data.id_prefix {
                Some(prefix) if !prefix.is_empty() => {
                    format!("SPDXRef-Package-{prefix}-{fragment}")
                }
                _ => format!("SPDXRef-Package-{fragment}"),
            },
            ElementKind::File(_) => format!("SPDXRef-File-{fragment}"),
        };
    }

    pub fn is_package(&self) -> bool {
        matches!(self.kind, ElementKind::Package(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, ElementKind::File(_))
    }

    pub fn as_package(&self) -> Option<&PackageData> {
        match &self.kind {
            ElementKind::Package(data) => Some(data),
            ElementKind::File(_) => None,
        }
    }

    pub fn as_package_mut(&mut self) -> Option<&mut PackageData> {
        match &mut self.kind {
            ElementKind::Package(data) => Some(data),
            ElementKind::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&FileData> {
        match &self.kind {
            ElementKind::File(data) => Some(data),
            ElementKind::Package(_) => None,
        }
    }

    pub fn as_file_mut(&mut self) -> Option<&mut FileData> {
        match &mut self.kind {
            ElementKind::File(data) => Some(data),
            ElementKind::Package(_) => None,
        }
    }

    /// The name a human sees in listings: the file name for files, the
    /// package name otherwise.
    pub fn display_name(&self) -> &str {
        match &self.kind {
            ElementKind::File(data) if !data.file_name.is_empty() => &data.file_name,
            _ => &self.name,
        }
    }

    pub fn version(&self) -> Option<&str> {
        self.as_package()
            .map(|p| p.version.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn set_digests(&mut self, digests: &Digests) {
        self.checksums
            .insert("SHA1".to_string(), digests.sha1.clone());
        self.checksums
            .insert("SHA256".to_string(), digests.sha256.clone());
        self.checksums
            .insert("SHA512".to_string(), digests.sha512.clone());
    }

    pub fn add_relationship(&mut self, relationship: Relationship) {
        self.relationships.push(relationship);
    }

    /// The first well-formed purl attached to the element, if any.
    pub fn purl(&self) -> Option<Purl> {
        let data = self.as_package()?;
        data.external_refs
            .iter()
            .filter(|r| r.ref_type == "purl")
            .find_map(|r| Purl::from_str(&r.locator).ok())
    }

    /// Match the element's purls against a wildcard-completed spec.
    pub fn purl_matches(&self, spec: &Purl) -> bool {
        let Some(data) = self.as_package() else {
            return false;
        };
        data.external_refs
            .iter()
            .filter(|r| r.ref_type == "purl")
            .filter_map(|r| Purl::from_str(&r.locator).ok())
            .any(|purl| purl.matches(spec))
    }
}
