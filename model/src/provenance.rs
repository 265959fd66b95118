use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::document::Document;
use crate::error::Error;

pub const STATEMENT_TYPE: &str = "https://in-toto.io/Statement/v1";
pub const PREDICATE_TYPE: &str = "https://slsa.dev/provenance/v0.2";

/// An in-toto attestation statement wrapping a SLSA provenance predicate.
///
/// The subjects carry every file of the document with its digest set; the
/// predicate ships empty builder, invocation and materials sections for a
/// downstream pipeline stage to fill in.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Statement {
    #[serde(rename = "_type")]
    pub statement_type: String,
    pub subject: Vec<Subject>,
    #[serde(rename = "predicateType")]
    pub predicate_type: String,
    pub predicate: Predicate,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Subject {
    pub name: String,
    pub digest: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Predicate {
    pub builder: Builder,
    pub build_type: String,
    pub invocation: Invocation,
    pub metadata: Metadata,
    pub materials: Vec<Material>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Builder {
    pub id: String,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invocation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_source: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<serde_json::Value>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub build_invocation_id: String,
    #[serde(default)]
    pub reproducible: bool,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Material {
    pub uri: String,
    pub digest: BTreeMap<String, String>,
}

impl Statement {
    pub fn new_slsa() -> Self {
        Self {
            statement_type: STATEMENT_TYPE.to_string(),
            subject: Vec::new(),
            predicate_type: PREDICATE_TYPE.to_string(),
            predicate: Predicate::default(),
        }
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, Error> {
        let data = std::fs::read_to_string(path)?;
        serde_json::from_str(&data).map_err(|err| Error::Parse(err.to_string()))
    }
}

impl Document {
    /// Build a provenance statement from the document: one subject per file
    /// with its sha1/sha256/sha512 digests.
    pub fn to_provenance(&self) -> Statement {
        let mut statement = Statement::new_slsa();
        for element in self.elements() {
            let Some(file) = element.as_file() else { continue };
            let mut digest = BTreeMap::new();
            for (algo, value) in &element.checksums {
                digest.insert(algo.to_lowercase(), value.clone());
            }
            statement.subject.push(Subject {
                name: file.file_name.clone(),
                digest,
            });
        }
        statement
    }

    /// Serialize the provenance statement as canonical JSON to a file.
    pub fn write_provenance(&self, path: impl AsRef<Path>) -> Result<(), Error> {
        let statement = self.to_provenance();
        let json = serde_json::to_string(&statement)?;
        std::fs::write(path, json)?;
        Ok(())
    }
}
