use std::str::FromStr;

use log::debug;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::document::Document;
use crate::element::{Actor, Element, FileType};
use crate::error::Error;
use crate::external::{ExternalDocumentRef, ExternalRef, RefCategory};
use crate::relationship::{Relationship, RelationshipType};
use crate::serialize::schema::{SchemaChecksum, SchemaDocument};
use crate::{DOCUMENT_ID, NOASSERTION};

/// Parse an SPDX 2.3 JSON document into the model.
pub fn parse(data: &str) -> Result<Document, Error> {
    let schema: SchemaDocument =
        serde_json::from_str(data).map_err(|err| Error::Parse(err.to_string()))?;

    let mut doc = Document::new();
    doc.version = schema.spdx_version;
    doc.data_license = schema.data_license;
    doc.name = schema.name;
    doc.namespace = schema.document_namespace;
    doc.comment = schema.comment;
    if let Ok(created) = OffsetDateTime::parse(&schema.creation_info.created, &Rfc3339) {
        doc.created = created;
    }
    doc.creation_info.license_list_version = schema
        .creation_info
        .license_list_version
        .unwrap_or_default();
    for creator in &schema.creation_info.creators {
        if let Some(person) = creator.strip_prefix("Person: ") {
            doc.creation_info.persons.push(person.to_string());
        } else if let Some(tool) = creator.strip_prefix("Tool: ") {
            doc.creation_info.tools.push(tool.to_string());
        }
    }

    for doc_ref in schema.external_document_refs {
        doc.external_doc_refs.push(ExternalDocumentRef {
            id: doc_ref
                .external_document_id
                .strip_prefix("DocumentRef-")
                .unwrap_or(&doc_ref.external_document_id)
                .to_string(),
            uri: doc_ref.spdx_document,
            checksums: [(doc_ref.checksum.algorithm, doc_ref.checksum.checksum_value)]
                .into_iter()
                .collect(),
        });
    }

    for pkg in schema.packages {
        let mut element = Element::package(pkg.name);
        element.set_id(pkg.spdx_id);
        element.license_concluded = strip_noassertion(&pkg.license_concluded);
        element.copyright_text = strip_noassertion(&pkg.copyright_text).unwrap_or_default();
        element.comment = pkg.comment;
        apply_checksums(&mut element, &pkg.checksums);
        {
            let data = element.as_package_mut().expect("constructed as package");
            data.version = pkg.version_info.unwrap_or_default();
            data.supplier = pkg.supplier.as_deref().and_then(parse_actor);
            data.originator = pkg.originator.as_deref().and_then(parse_actor);
            data.download_location =
                strip_noassertion(&pkg.download_location).unwrap_or_default();
            data.files_analyzed = pkg.files_analyzed;
            data.verification_code = pkg
                .package_verification_code
                .map(|c| c.package_verification_code_value)
                .unwrap_or_default();
            data.homepage = pkg.homepage.unwrap_or_default();
            data.license_declared = strip_noassertion(&pkg.license_declared).unwrap_or_default();
            data.license_info_from_files = pkg.license_info_from_files;
            data.primary_purpose = pkg.primary_package_purpose;
            data.external_refs = pkg
                .external_refs
                .into_iter()
                .map(|r| ExternalRef {
                    category: parse_category(&r.reference_category),
                    ref_type: r.reference_type,
                    locator: r.reference_locator,
                })
                .collect();
        }
        doc.insert(element);
    }

    for file in schema.files {
        let mut element = Element::file(file.file_name.clone());
        element.set_id(file.spdx_id);
        element.name = file.file_name;
        element.license_concluded = strip_noassertion(&file.license_concluded);
        element.copyright_text = strip_noassertion(&file.copyright_text).unwrap_or_default();
        element.comment = file.comment;
        apply_checksums(&mut element, &file.checksums);
        {
            let data = element.as_file_mut().expect("constructed as file");
            data.file_types = file
                .file_types
                .iter()
                .filter_map(|t| serde_json::from_value::<FileType>(t.clone().into()).ok())
                .collect();
            data.license_info_in_file = file.license_info_in_files.into_iter().next();
            data.notice = file.notice_text;
        }
        doc.insert(element);
    }

    let mut roots: Vec<String> = schema.document_describes;
    for rel in schema.relationships {
        let kind = RelationshipType::from_str(&rel.relationship_type).unwrap_or_else(|_| {
            debug!("unknown relationship type {}", rel.relationship_type);
            RelationshipType::Other
        });

        if rel.spdx_element_id == DOCUMENT_ID && kind == RelationshipType::Describes {
            if !roots.contains(&rel.related_spdx_element) {
                roots.push(rel.related_spdx_element);
            }
            continue;
        }

        let edge = to_relationship(&doc, kind, &rel.related_spdx_element, rel.comment);
        if doc.contains(&rel.spdx_element_id) {
            doc.relate(&rel.spdx_element_id, edge)?;
        } else {
            debug!("dropping relationship from unknown element {}", rel.spdx_element_id);
        }
    }
    for root in roots {
        if doc.contains(&root) {
            doc.promote_root(&root);
        }
    }

    Ok(doc)
}

pub(crate) fn to_relationship(
    doc: &Document,
    kind: RelationshipType,
    target: &str,
    comment: Option<String>,
) -> Relationship {
    let mut edge = if let Some(rest) = target.strip_prefix("DocumentRef-") {
        // render-only external reference, never dereferenced
        match rest.split_once(':') {
            Some((doc_name, peer)) => Relationship {
                kind: Some(kind),
                peer: Some(peer.to_string()),
                external_doc: Some(doc_name.to_string()),
                ..Default::default()
            },
            None => Relationship::to_reference(kind, target),
        }
    } else if doc.contains(target) {
        let mut rel = Relationship::to_peer(kind, target);
        rel.full_render = false;
        rel
    } else {
        Relationship::to_reference(kind, target)
    };
    edge.comment = comment;
    edge
}

pub(crate) fn parse_actor(value: &str) -> Option<Actor> {
    if let Some(rest) = value.strip_prefix("Person: ") {
        let (name, email) = match rest.rsplit_once(" (") {
            Some((name, email)) => (
                name.to_string(),
                Some(email.trim_end_matches(')').to_string()),
            ),
            None => (rest.to_string(), None),
        };
        return Some(Actor::Person { name, email });
    }
    if let Some(name) = value.strip_prefix("Organization: ") {
        return Some(Actor::Organization {
            name: name.to_string(),
        });
    }
    None
}

pub(crate) fn parse_category(value: &str) -> RefCategory {
    match value {
        "SECURITY" => RefCategory::Security,
        "PERSISTENT-ID" => RefCategory::PersistentId,
        "OTHER" => RefCategory::Other,
        _ => RefCategory::PackageManager,
    }
}

fn strip_noassertion(value: &str) -> Option<String> {
    if value.is_empty() || value == NOASSERTION {
        None
    } else {
        Some(value.to_string())
    }
}

fn apply_checksums(element: &mut Element, checksums: &[SchemaChecksum]) {
    for checksum in checksums {
        element
            .checksums
            .insert(checksum.algorithm.clone(), checksum.checksum_value.clone());
    }
}
