use time::format_description::well_known::Rfc3339;

use super::schema::*;
use super::Serializer;
use crate::document::Document;
use crate::element::{Element, ElementKind};
use crate::error::Error;
use crate::{DOCUMENT_ID, NOASSERTION};

/// The SPDX 2.3 JSON encoder.
pub struct Json;

impl Serializer for Json {
    fn serialize(&self, doc: &Document) -> Result<String, Error> {
        let schema = to_schema(doc)?;
        Ok(serde_json::to_string_pretty(&schema)?)
    }
}

fn or_noassertion(value: &str) -> String {
    if value.is_empty() {
        NOASSERTION.to_string()
    } else {
        value.to_string()
    }
}

fn checksums(element: &Element) -> Vec<SchemaChecksum> {
    element
        .checksums
        .iter()
        .map(|(algorithm, value)| SchemaChecksum {
            algorithm: algorithm.clone(),
            checksum_value: value.clone(),
        })
        .collect()
}

pub(crate) fn to_schema(doc: &Document) -> Result<SchemaDocument, Error> {
    let created = doc
        .created
        .replace_nanosecond(0)
        .map_err(|err| Error::Parse(err.to_string()))?
        .format(&Rfc3339)
        .map_err(|err| Error::Parse(err.to_string()))?;

    let mut creators = Vec::new();
    for person in &doc.creation_info.persons {
        creators.push(format!("Person: {person}"));
    }
    for tool in &doc.creation_info.tools {
        creators.push(format!("Tool: {tool}"));
    }

    let mut schema = SchemaDocument {
        spdx_version: doc.version.clone(),
        data_license: doc.data_license.clone(),
        spdx_id: doc.id.clone(),
        name: doc.name.clone(),
        document_namespace: doc.namespace.clone(),
        comment: doc.comment.clone(),
        creation_info: SchemaCreationInfo {
            created,
            creators,
            license_list_version: (!doc.creation_info.license_list_version.is_empty())
                .then(|| doc.creation_info.license_list_version.clone()),
        },
        external_document_refs: doc
            .external_doc_refs
            .iter()
            .filter(|r| !r.id.is_empty() && !r.uri.is_empty() && !r.checksums.is_empty())
            .map(|r| {
                let (algorithm, value) = r
                    .checksums
                    .iter()
                    .next()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .unwrap_or_default();
                SchemaExternalDocumentRef {
                    external_document_id: format!("DocumentRef-{}", r.id),
                    spdx_document: r.uri.clone(),
                    checksum: SchemaChecksum {
                        algorithm,
                        checksum_value: value,
                    },
                }
            })
            .collect(),
        document_describes: doc.roots().to_vec(),
        ..Default::default()
    };

    for element in doc.elements() {
        match &element.kind {
            ElementKind::Package(data) => {
                schema.packages.push(SchemaPackage {
                    spdx_id: element.id().to_string(),
                    name: element.name.clone(),
                    version_info: (!data.version.is_empty()).then(|| data.version.clone()),
                    supplier: data.supplier.as_ref().map(ToString::to_string),
                    originator: data.originator.as_ref().map(ToString::to_string),
                    download_location: or_noassertion(&data.download_location),
                    files_analyzed: data.files_analyzed,
                    package_verification_code: (!data.verification_code.is_empty()).then(|| {
                        SchemaVerificationCode {
                            package_verification_code_value: data.verification_code.clone(),
                        }
                    }),
                    checksums: checksums(element),
                    homepage: (!data.homepage.is_empty()).then(|| data.homepage.clone()),
                    license_concluded: or_noassertion(
                        element.license_concluded.as_deref().unwrap_or_default(),
                    ),
                    license_declared: or_noassertion(&data.license_declared),
                    license_info_from_files: data.license_info_from_files.clone(),
                    copyright_text: or_noassertion(&element.copyright_text),
                    comment: element.comment.clone(),
                    primary_package_purpose: data.primary_purpose.clone(),
                    external_refs: data
                        .external_refs
                        .iter()
                        .map(|r| SchemaExternalRef {
                            reference_category: r.category.to_string(),
                            reference_type: r.ref_type.clone(),
                            reference_locator: r.locator.clone(),
                        })
                        .collect(),
                });
            }
            ElementKind::File(data) => {
                schema.files.push(SchemaFile {
                    spdx_id: element.id().to_string(),
                    file_name: data.file_name.clone(),
                    file_types: data.file_types.iter().map(ToString::to_string).collect(),
                    checksums: checksums(element),
                    license_concluded: or_noassertion(
                        element.license_concluded.as_deref().unwrap_or_default(),
                    ),
                    license_info_in_files: data
                        .license_info_in_file
                        .iter()
                        .cloned()
                        .collect(),
                    copyright_text: or_noassertion(&element.copyright_text),
                    comment: element.comment.clone(),
                    notice_text: data.notice.clone(),
                });
            }
        }

        for rel in &element.relationships {
            let Some(kind) = rel.kind else {
                return Err(Error::Relationship(format!(
                    "untyped relationship on {}",
                    element.id()
                )));
            };
            let related = match (&rel.peer, &rel.external_doc) {
                (Some(peer), Some(doc_ref)) => format!("DocumentRef-{doc_ref}:{peer}"),
                (Some(peer), None) => peer.clone(),
                (None, _) if !rel.peer_reference.is_empty() => rel.peer_reference.clone(),
                _ => {
                    return Err(Error::Relationship(format!(
                        "relationship on {} has neither peer nor reference",
                        element.id()
                    )))
                }
            };
            schema.relationships.push(SchemaRelationship {
                spdx_element_id: element.id().to_string(),
                relationship_type: kind.to_string(),
                related_spdx_element: related,
                comment: rel.comment.clone(),
            });
        }
    }

    // the DESCRIBES edges of the document itself
    for root in doc.roots() {
        schema.relationships.push(SchemaRelationship {
            spdx_element_id: DOCUMENT_ID.to_string(),
            relationship_type: "DESCRIBES".to_string(),
            related_spdx_element: root.clone(),
            comment: None,
        });
    }

    Ok(schema)
}
