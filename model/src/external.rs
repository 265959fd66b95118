use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::path::Path;

use bomify_common::hashing::Digests;
use serde::{Deserialize, Serialize};

/// A reference to an element living in another SPDX document.
///
/// Rendered as `DocumentRef-<id> <uri> SHA256: <hex>`. A ref renders only
/// when id, URI and at least one checksum are all present.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalDocumentRef {
    pub id: String,
    pub uri: String,
    pub checksums: BTreeMap<String, String>,
}

impl ExternalDocumentRef {
    /// Seed the checksum map from a file on disk (SHA-1 of its contents).
    pub fn read_source_file(&mut self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let digests = Digests::from_file(path)?;
        self.checksums.insert("SHA1".to_string(), digests.sha1);
        Ok(())
    }
}

impl Display for ExternalDocumentRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        if self.id.is_empty() || self.uri.is_empty() || self.checksums.is_empty() {
            return Ok(());
        }
        let (algo, value) = self
            .checksums
            .iter()
            .next()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .unwrap_or_default();
        write!(f, "DocumentRef-{} {} {}: {}", self.id, self.uri, algo, value)
    }
}

/// The category of an external reference attached to a package.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RefCategory {
    #[serde(rename = "SECURITY")]
    Security,
    #[default]
    #[serde(rename = "PACKAGE-MANAGER")]
    PackageManager,
    #[serde(rename = "PERSISTENT-ID")]
    PersistentId,
    #[serde(rename = "OTHER")]
    Other,
}

impl Display for RefCategory {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            RefCategory::Security => "SECURITY",
            RefCategory::PackageManager => "PACKAGE-MANAGER",
            RefCategory::PersistentId => "PERSISTENT-ID",
            RefCategory::Other => "OTHER",
        };
        f.write_str(label)
    }
}

/// An external reference on a package (e.g. a purl locator).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExternalRef {
    pub category: RefCategory,
    pub ref_type: String,
    pub locator: String,
}

impl ExternalRef {
    pub fn purl(locator: impl Into<String>) -> Self {
        Self {
            category: RefCategory::PackageManager,
            ref_type: "purl".to_string(),
            locator: locator.into(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    /// A ref renders only when id, uri and a checksum are all present.
    #[test]
    fn doc_ref_render_matrix() {
        let sha = "d3b53860aa08e5c7ea868629800eaf78856f6ef3bcd4a2f8c5c865b75f6837c8";
        let checksums =
            BTreeMap::from([("SHA256".to_string(), sha.to_string())]);

        let cases = [
            (ExternalDocumentRef::default(), ""),
            (
                ExternalDocumentRef {
                    id: String::new(),
                    uri: "http://example.com/".into(),
                    checksums: checksums.clone(),
                },
                "",
            ),
            (
                ExternalDocumentRef {
                    id: "test-id".into(),
                    uri: String::new(),
                    checksums: checksums.clone(),
                },
                "",
            ),
            (
                ExternalDocumentRef {
                    id: "test-id".into(),
                    uri: "http://example.com/".into(),
                    checksums: BTreeMap::new(),
                },
                "",
            ),
            (
                ExternalDocumentRef {
                    id: "test-id".into(),
                    uri: "http://example.com/".into(),
                    checksums,
                },
                "DocumentRef-test-id http://example.com/ SHA256: d3b53860aa08e5c7ea868629800eaf78856f6ef3bcd4a2f8c5c865b75f6837c8",
            ),
        ];

        for (doc_ref, expected) in cases {
            assert_eq!(expected, doc_ref.to_string());
        }
    }

    #[test]
    fn doc_ref_from_source_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data");
        std::fs::write(&path, b"Hellow World").unwrap();

        let mut doc_ref = ExternalDocumentRef::default();
        assert!(doc_ref.read_source_file("/no/such/file").is_err());
        doc_ref.read_source_file(&path).unwrap();
        assert_eq!(
            Some(&"5f341d31f6b6a8b15bc4e6704830bf37f99511d1".to_string()),
            doc_ref.checksums.get("SHA1")
        );
    }
}
