use std::str::FromStr;

use log::debug;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use super::json::{parse_actor, parse_category, to_relationship};
use crate::document::Document;
use crate::element::{Element, FileType};
use crate::error::Error;
use crate::external::{ExternalDocumentRef, ExternalRef};
use crate::relationship::RelationshipType;
use crate::{DOCUMENT_ID, NOASSERTION};

/// Parse an SPDX 2.3 tag-value document into the model.
pub fn parse(input: &str) -> Result<Document, Error> {
    let pairs = lex(input)?;

    let mut doc = Document::new();
    let mut current: Option<Element> = None;
    let mut relationships: Vec<(String, RelationshipType, String)> = Vec::new();
    let mut elements: Vec<Element> = Vec::new();

    for (key, value) in pairs {
        match key.as_str() {
            "SPDXVersion" => doc.version = value,
            "DataLicense" => doc.data_license = value,
            "DocumentName" => doc.name = value,
            "DocumentNamespace" => doc.namespace = value,
            "DocumentComment" => doc.comment = Some(value),
            "LicenseListVersion" => doc.creation_info.license_list_version = value,
            "Created" => {
                if let Ok(created) = OffsetDateTime::parse(&value, &Rfc3339) {
                    doc.created = created;
                }
            }
            "Creator" => {
                if let Some(person) = value.strip_prefix("Person: ") {
                    doc.creation_info.persons.push(person.to_string());
                } else if let Some(tool) = value.strip_prefix("Tool: ") {
                    doc.creation_info.tools.push(tool.to_string());
                }
            }
            "ExternalDocumentRef" => {
                if let Some(doc_ref) = parse_doc_ref(&value) {
                    doc.external_doc_refs.push(doc_ref);
                }
            }
            "Relationship" => {
                let mut parts = value.splitn(3, ' ');
                let (Some(host), Some(kind), Some(target)) =
                    (parts.next(), parts.next(), parts.next())
                else {
                    return Err(Error::Parse(format!("malformed relationship: {value}")));
                };
                let kind = RelationshipType::from_str(kind).unwrap_or(RelationshipType::Other);
                relationships.push((host.to_string(), kind, target.to_string()));
            }

            "PackageName" => {
                if let Some(done) = current.take() {
                    elements.push(done);
                }
                current = Some(Element::package(value));
            }
            "FileName" => {
                if let Some(done) = current.take() {
                    elements.push(done);
                }
                current = Some(Element::file(value));
            }
            "SPDXID" => match &mut current {
                Some(element) => element.set_id(value),
                None => doc.id = value,
            },

            _ => {
                if let Some(element) = &mut current {
                    apply_element_field(element, &key, value)?;
                } else {
                    debug!("ignoring unknown document field {key}");
                }
            }
        }
    }
    if let Some(done) = current.take() {
        elements.push(done);
    }

    for element in elements {
        doc.insert(element);
    }

    for (host, kind, target) in relationships {
        if host == DOCUMENT_ID && kind == RelationshipType::Describes {
            doc.promote_root(&target);
            continue;
        }
        let edge = to_relationship(&doc, kind, &target, None);
        if doc.contains(&host) {
            doc.relate(&host, edge)?;
        } else {
            debug!("dropping relationship from unknown element {host}");
        }
    }

    Ok(doc)
}

fn apply_element_field(element: &mut Element, key: &str, value: String) -> Result<(), Error> {
    let value_or_empty = if value == NOASSERTION {
        String::new()
    } else {
        value.clone()
    };

    match key {
        "PackageVersion" => {
            if let Some(data) = element.as_package_mut() {
                data.version = value;
            }
        }
        "PackageSupplier" => {
            if let Some(data) = element.as_package_mut() {
                data.supplier = parse_actor(&value);
            }
        }
        "PackageOriginator" => {
            if let Some(data) = element.as_package_mut() {
                data.originator = parse_actor(&value);
            }
        }
        "PackageDownloadLocation" => {
            if let Some(data) = element.as_package_mut() {
                data.download_location = value_or_empty;
            }
        }
        "FilesAnalyzed" => {
            if let Some(data) = element.as_package_mut() {
                data.files_analyzed = value == "true";
            }
        }
        "PackageVerificationCode" => {
            if let Some(data) = element.as_package_mut() {
                data.verification_code = value;
            }
        }
        "PackageHomePage" => {
            if let Some(data) = element.as_package_mut() {
                data.homepage = value;
            }
        }
        "PackageLicenseDeclared" => {
            if let Some(data) = element.as_package_mut() {
                data.license_declared = value_or_empty;
            }
        }
        "PackageLicenseInfoFromFiles" => {
            if let Some(data) = element.as_package_mut() {
                data.license_info_from_files.push(value);
            }
        }
        "PrimaryPackagePurpose" => {
            if let Some(data) = element.as_package_mut() {
                data.primary_purpose = Some(value);
            }
        }
        "ExternalRef" => {
            let mut parts = value.splitn(3, ' ');
            let (Some(category), Some(ref_type), Some(locator)) =
                (parts.next(), parts.next(), parts.next())
            else {
                return Err(Error::Parse(format!("malformed external ref: {value}")));
            };
            if let Some(data) = element.as_package_mut() {
                data.external_refs.push(ExternalRef {
                    category: parse_category(category),
                    ref_type: ref_type.to_string(),
                    locator: locator.to_string(),
                });
            }
        }
        "PackageChecksum" | "FileChecksum" => {
            if let Some((algo, digest)) = value.split_once(": ") {
                element
                    .checksums
                    .insert(algo.to_string(), digest.to_string());
            }
        }
        "PackageLicenseConcluded" | "LicenseConcluded" => {
            element.license_concluded =
                (!value_or_empty.is_empty()).then_some(value_or_empty);
        }
        "PackageCopyrightText" | "FileCopyrightText" => {
            element.copyright_text = value_or_empty;
        }
        "PackageComment" | "FileComment" => element.comment = Some(value),
        "FileType" => {
            if let Some(data) = element.as_file_mut() {
                if let Ok(file_type) =
                    serde_json::from_value::<FileType>(serde_json::Value::String(value))
                {
                    data.file_types.push(file_type);
                }
            }
        }
        "LicenseInfoInFile" => {
            if let Some(data) = element.as_file_mut() {
                data.license_info_in_file = Some(value);
            }
        }
        "FileNotice" => {
            if let Some(data) = element.as_file_mut() {
                data.notice = Some(value);
            }
        }
        _ => debug!("ignoring unknown element field {key}"),
    }
    Ok(())
}

fn parse_doc_ref(value: &str) -> Option<ExternalDocumentRef> {
    // DocumentRef-<id> <uri> <ALGO>: <hex>
    let mut parts = value.split_whitespace();
    let id = parts.next()?.strip_prefix("DocumentRef-")?.to_string();
    let uri = parts.next()?.to_string();
    let algo = parts.next()?.trim_end_matches(':').to_string();
    let digest = parts.next()?.to_string();
    Some(ExternalDocumentRef {
        id,
        uri,
        checksums: [(algo, digest)].into_iter().collect(),
    })
}

/// Split the document into `(key, value)` pairs, folding `<text>` blocks
/// (which may span lines and contain blank lines) into single values.
fn lex(input: &str) -> Result<Vec<(String, String)>, Error> {
    let mut pairs = Vec::new();
    let mut lines = input.lines();

    while let Some(line) = lines.next() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let Some((key, value)) = trimmed.split_once(':') else {
            return Err(Error::Parse(format!("malformed tag-value line: {trimmed}")));
        };
        let key = key.trim().to_string();
        let mut value = value.trim().to_string();

        if value.starts_with("<text>") {
            if let Some(inner) = value
                .strip_prefix("<text>")
                .and_then(|v| v.strip_suffix("</text>"))
            {
                value = inner.to_string();
            } else {
                let mut text = value.trim_start_matches("<text>").to_string();
                loop {
                    let Some(next) = lines.next() else {
                        return Err(Error::Parse("unterminated <text> block".into()));
                    };
                    if let Some(end) = next.strip_suffix("</text>") {
                        text.push('\n');
                        text.push_str(end);
                        break;
                    }
                    text.push('\n');
                    text.push_str(next);
                }
                value = text;
            }
        }
        pairs.push((key, value));
    }
    Ok(pairs)
}
