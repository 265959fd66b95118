use std::fmt::Write;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::Error;

/// SPDX 2.3 relationship types.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RelationshipType {
    #[serde(rename = "DESCRIBES")]
    Describes,
    #[serde(rename = "DESCRIBED_BY")]
    DescribedBy,
    #[serde(rename = "CONTAINS")]
    Contains,
    #[serde(rename = "CONTAINED_BY")]
    ContainedBy,
    #[serde(rename = "DEPENDS_ON")]
    DependsOn,
    #[serde(rename = "DEPENDENCY_OF")]
    DependencyOf,
    #[serde(rename = "DEV_DEPENDENCY_OF")]
    DevDependencyOf,
    #[serde(rename = "OPTIONAL_DEPENDENCY_OF")]
    OptionalDependencyOf,
    #[serde(rename = "RUNTIME_DEPENDENCY_OF")]
    RuntimeDependencyOf,
    #[serde(rename = "TEST_DEPENDENCY_OF")]
    TestDependencyOf,
    #[serde(rename = "BUILD_TOOL_OF")]
    BuildToolOf,
    #[serde(rename = "DEV_TOOL_OF")]
    DevToolOf,
    #[serde(rename = "STATIC_LINK")]
    StaticLink,
    #[serde(rename = "DYNAMIC_LINK")]
    DynamicLink,
    #[serde(rename = "VARIANT_OF")]
    VariantOf,
    #[serde(rename = "DOCUMENTATION_OF")]
    DocumentationOf,
    #[serde(rename = "ANCESTOR_OF")]
    AncestorOf,
    #[serde(rename = "DESCENDANT_OF")]
    DescendantOf,
    #[serde(rename = "GENERATES")]
    Generates,
    #[serde(rename = "GENERATED_FROM")]
    GeneratedFrom,
    #[serde(rename = "PACKAGE_OF")]
    PackageOf,
    #[serde(rename = "OTHER")]
    Other,
}

/// A typed edge from a host element to a peer.
///
/// A renderable relationship carries either the SPDX ID of a peer element in
/// the same document graph, or an opaque peer-reference string (used for
/// elements of external documents). `full_render` controls whether the peer
/// is serialized inline or only referenced by ID; back-edges of cycles are
/// marked non-full before serialization.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Relationship {
    pub kind: Option<RelationshipType>,
    /// SPDX ID of a peer element owned by the document.
    pub peer: Option<String>,
    /// Opaque peer reference when the peer is not part of this document.
    pub peer_reference: String,
    /// Name of the external document the peer lives in (`DocumentRef-<name>`).
    pub external_doc: Option<String>,
    pub comment: Option<String>,
    pub full_render: bool,
}

impl Relationship {
    pub fn to_peer(kind: RelationshipType, peer: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            peer: Some(peer.into()),
            full_render: true,
            ..Default::default()
        }
    }

    pub fn to_reference(kind: RelationshipType, reference: impl Into<String>) -> Self {
        Self {
            kind: Some(kind),
            peer_reference: reference.into(),
            ..Default::default()
        }
    }

    /// The identifier the peer is referenced by, regardless of flavor.
    pub fn target_id(&self) -> &str {
        match &self.peer {
            Some(peer) if !peer.is_empty() => peer,
            _ => &self.peer_reference,
        }
    }

    /// Render the tag-value `Relationship:` line for this edge.
    pub fn render(&self, host_id: &str) -> Result<String, Error> {
        if host_id.is_empty() {
            return Err(Error::Relationship(
                "relationship host has no SPDX identifier".into(),
            ));
        }
        let Some(kind) = self.kind else {
            return Err(Error::Relationship("relationship carries no type".into()));
        };
        if self.full_render && self.external_doc.is_some() {
            return Err(Error::Relationship(
                "peers in external documents cannot be rendered in full".into(),
            ));
        }

        let target = match &self.peer {
            Some(peer) if !peer.is_empty() => match &self.external_doc {
                Some(doc) => format!("DocumentRef-{doc}:{peer}"),
                None => peer.clone(),
            },
            Some(_) => {
                return Err(Error::Relationship(
                    "peer element has no SPDX identifier".into(),
                ))
            }
            None if !self.peer_reference.is_empty() => {
                if self.full_render {
                    return Err(Error::Relationship(
                        "a bare peer reference cannot be rendered in full".into(),
                    ));
                }
                self.peer_reference.clone()
            }
            None => {
                return Err(Error::Relationship(
                    "relationship has neither peer nor peer reference".into(),
                ))
            }
        };

        let mut line = String::new();
        writeln!(line, "Relationship: {host_id} {kind} {target}")
            .map_err(|err| Error::Relationship(err.to_string()))?;
        if let Some(comment) = &self.comment {
            writeln!(line, "RelationshipComment: {comment}")
                .map_err(|err| Error::Relationship(err.to_string()))?;
        }
        Ok(line)
    }
}
