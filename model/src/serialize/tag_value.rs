use std::collections::HashSet;
use std::fmt::Write;

use time::format_description::well_known::Rfc3339;

use super::Serializer;
use crate::document::Document;
use crate::element::{Element, ElementKind};
use crate::error::Error;
use crate::{DOCUMENT_ID, NOASSERTION};

/// The SPDX 2.3 tag-value encoder.
///
/// Elements are emitted in topological order starting at the `DESCRIBES`
/// set; each element's relationships follow its block; full-render peers
/// are inlined after their host, reference-only peers appear as bare
/// `Relationship:` lines. Cycles must have been broken by the builder
/// (`Document::break_cycles`).
pub struct TagValue;

impl Serializer for TagValue {
    fn serialize(&self, doc: &Document) -> Result<String, Error> {
        let mut out = String::new();
        let mut write = |line: String| out.push_str(&line);

        write(format!("SPDXVersion: {}\n", doc.version));
        write(format!("DataLicense: {}\n", doc.data_license));
        write(format!("SPDXID: {}\n", doc.id));
        write(format!("DocumentName: {}\n", doc.name));
        write(format!("DocumentNamespace: {}\n", doc.namespace));

        for doc_ref in &doc.external_doc_refs {
            let rendered = doc_ref.to_string();
            if !rendered.is_empty() {
                write(format!("ExternalDocumentRef: {rendered}\n"));
            }
        }
        if !doc.creation_info.license_list_version.is_empty() {
            write(format!(
                "LicenseListVersion: {}\n",
                doc.creation_info.license_list_version
            ));
        }
        for person in &doc.creation_info.persons {
            write(format!("Creator: Person: {person}\n"));
        }
        for tool in &doc.creation_info.tools {
            write(format!("Creator: Tool: {tool}\n"));
        }
        let created = doc
            .created
            .replace_nanosecond(0)
            .map_err(|err| Error::Parse(err.to_string()))?
            .format(&Rfc3339)
            .map_err(|err| Error::Parse(err.to_string()))?;
        write(format!("Created: {created}\n"));
        if let Some(comment) = &doc.comment {
            write(format!("DocumentComment: {}\n", text_wrap(comment)));
        }

        for root in doc.roots() {
            out.push_str(&format!(
                "Relationship: {DOCUMENT_ID} DESCRIBES {root}\n"
            ));
        }

        let mut visited = HashSet::new();
        for root in doc.roots() {
            render_element(doc, root, &mut out, &mut visited)?;
        }

        Ok(out)
    }
}

fn render_element(
    doc: &Document,
    id: &str,
    out: &mut String,
    visited: &mut HashSet<String>,
) -> Result<(), Error> {
    if !visited.insert(id.to_string()) {
        return Ok(());
    }
    let element = doc
        .get(id)
        .ok_or_else(|| Error::NotFound(format!("element {id}")))?;

    out.push('\n');
    match &element.kind {
        ElementKind::Package(_) => writeln!(out, "##### Package: {}\n", element.name),
        ElementKind::File(_) => writeln!(out, "##### File: {}\n", element.display_name()),
    }
    .map_err(|err| Error::Parse(err.to_string()))?;

    match &element.kind {
        ElementKind::Package(data) => render_package(element, data, out),
        ElementKind::File(data) => render_file(element, data, out),
    }

    // relationship lines follow the host block
    for rel in &element.relationships {
        out.push_str(&rel.render(element.id())?);
    }

    // inline the full-render peers
    for rel in &element.relationships {
        if !rel.full_render {
            continue;
        }
        if let Some(peer) = &rel.peer {
            render_element(doc, peer, out, visited)?;
        }
    }
    Ok(())
}

fn render_package(element: &Element, data: &crate::element::PackageData, out: &mut String) {
    let mut field = |key: &str, value: String| {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    };

    field("PackageName", element.name.clone());
    field("SPDXID", element.id().to_string());
    if !data.version.is_empty() {
        field("PackageVersion", data.version.clone());
    }
    if let Some(supplier) = &data.supplier {
        field("PackageSupplier", supplier.to_string());
    }
    if let Some(originator) = &data.originator {
        field("PackageOriginator", originator.to_string());
    }
    field(
        "PackageDownloadLocation",
        or_noassertion(&data.download_location),
    );
    field("FilesAnalyzed", data.files_analyzed.to_string());
    if !data.verification_code.is_empty() {
        field(
            "PackageVerificationCode",
            data.verification_code.clone(),
        );
    }
    for (algo, value) in &element.checksums {
        field("PackageChecksum", format!("{algo}: {value}"));
    }
    if !data.homepage.is_empty() {
        field("PackageHomePage", data.homepage.clone());
    }
    field(
        "PackageLicenseConcluded",
        or_noassertion(element.license_concluded.as_deref().unwrap_or_default()),
    );
    for license in &data.license_info_from_files {
        field("PackageLicenseInfoFromFiles", license.clone());
    }
    field("PackageLicenseDeclared", or_noassertion(&data.license_declared));
    field(
        "PackageCopyrightText",
        text_wrap(&or_noassertion(&element.copyright_text)),
    );
    if let Some(comment) = &element.comment {
        field("PackageComment", text_wrap(comment));
    }
    for ext_ref in &data.external_refs {
        field(
            "ExternalRef",
            format!("{} {} {}", ext_ref.category, ext_ref.ref_type, ext_ref.locator),
        );
    }
    if let Some(purpose) = &data.primary_purpose {
        field("PrimaryPackagePurpose", purpose.clone());
    }
    out.push('\n');
}

fn render_file(element: &Element, data: &crate::element::FileData, out: &mut String) {
    let mut field = |key: &str, value: String| {
        out.push_str(key);
        out.push_str(": ");
        out.push_str(&value);
        out.push('\n');
    };

    field("FileName", data.file_name.clone());
    field("SPDXID", element.id().to_string());
    for file_type in &data.file_types {
        field("FileType", file_type.to_string());
    }
    for (algo, value) in &element.checksums {
        field("FileChecksum", format!("{algo}: {value}"));
    }
    field(
        "LicenseConcluded",
        or_noassertion(element.license_concluded.as_deref().unwrap_or_default()),
    );
    if let Some(license) = &data.license_info_in_file {
        field("LicenseInfoInFile", license.clone());
    }
    field(
        "FileCopyrightText",
        text_wrap(&or_noassertion(&element.copyright_text)),
    );
    if let Some(comment) = &element.comment {
        field("FileComment", text_wrap(comment));
    }
    if let Some(notice) = &data.notice {
        field("FileNotice", text_wrap(notice));
    }
    out.push('\n');
}

fn or_noassertion(value: &str) -> String {
    if value.is_empty() {
        NOASSERTION.to_string()
    } else {
        value.to_string()
    }
}

/// Multi-line values (and free text fields) use SPDX `<text>` delimiters.
fn text_wrap(value: &str) -> String {
    if value == NOASSERTION || value == "NONE" {
        value.to_string()
    } else {
        format!("<text>{value}</text>")
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::Element;
    use crate::relationship::{Relationship, RelationshipType};

    fn sample_doc() -> Document {
        let mut doc = Document::new();
        doc.name = "sample".into();
        doc.namespace = "https://spdx.org/spdxdocs/sample".into();
        doc.creation_info.tools.push("bomify-0.1.0".into());

        let mut pkg = Element::package("libfoo");
        pkg.as_package_mut().unwrap().version = "1.2.3".into();
        pkg.build_id(["libfoo", "1.2.3"]);
        let pkg_id = doc.add_package(pkg).unwrap();

        let mut file = Element::file("foo.c");
        file.checksums
            .insert("SHA1".into(), "a9993e364706816aba3e25717850c26c9cd0d89d".into());
        file.build_id(["foo.c"]);
        doc.attach(&pkg_id, RelationshipType::Contains, file).unwrap();
        doc
    }

    #[test]
    fn document_header_and_blocks() {
        let out = TagValue.serialize(&sample_doc()).unwrap();

        assert!(out.starts_with("SPDXVersion: SPDX-2.3\n"));
        assert!(out.contains("DataLicense: CC0-1.0\n"));
        assert!(out.contains("SPDXID: SPDXRef-DOCUMENT\n"));
        assert!(out.contains("DocumentName: sample\n"));
        assert!(out.contains("Creator: Tool: bomify-0.1.0\n"));
        assert!(out.contains(
            "Relationship: SPDXRef-DOCUMENT DESCRIBES SPDXRef-Package-libfoo-1.2.3\n"
        ));
        assert!(out.contains("PackageName: libfoo\n"));
        assert!(out.contains("PackageVersion: 1.2.3\n"));
        assert!(out.contains("FilesAnalyzed: false\n"));
        assert!(out.contains(
            "Relationship: SPDXRef-Package-libfoo-1.2.3 CONTAINS SPDXRef-File-foo.c\n"
        ));
        assert!(out.contains("FileName: foo.c\n"));
        assert!(out.contains("FileChecksum: SHA1: a9993e364706816aba3e25717850c26c9cd0d89d\n"));

        // header fields precede element blocks
        let header_at = out.find("DocumentNamespace:").unwrap();
        let pkg_at = out.find("PackageName:").unwrap();
        assert!(header_at < pkg_at);
    }

    #[test]
    fn reference_only_edges_render_as_lines() {
        let mut doc = sample_doc();
        let root = doc.roots()[0].clone();
        doc.relate(
            &root,
            Relationship::to_reference(
                RelationshipType::DependsOn,
                "SPDXRef-Package-somewhere-else",
            ),
        )
        .unwrap();

        let out = TagValue.serialize(&doc).unwrap();
        assert!(out.contains("DEPENDS_ON SPDXRef-Package-somewhere-else\n"));
        // a reference does not create a block
        assert!(!out.contains("PackageName: somewhere-else"));
    }

    #[test]
    fn cyclic_document_terminates() {
        let mut doc = Document::new();
        doc.name = "cyclic".into();
        let mut a = Element::package("a");
        a.set_id("a");
        let a = doc.add_package(a).unwrap();
        let mut b = Element::package("b");
        b.set_id("b");
        let b = doc.attach(&a, RelationshipType::Contains, b).unwrap();
        doc.relate(&b, Relationship::to_peer(RelationshipType::DependsOn, a.clone()))
            .unwrap();

        doc.break_cycles();
        let out = TagValue.serialize(&doc).unwrap();
        assert_eq!(1, out.matches("PackageName: a\n").count());
        assert_eq!(1, out.matches("PackageName: b\n").count());
        assert!(out.contains("Relationship: b DEPENDS_ON a\n"));
    }

    #[test]
    fn multiline_text_is_wrapped() {
        let mut doc = Document::new();
        doc.name = "wrapped".into();
        let mut pkg = Element::package("noted");
        pkg.copyright_text = "Copyright 2023\nThe Authors".into();
        pkg.build_id(["noted"]);
        doc.add_package(pkg).unwrap();

        let out = TagValue.serialize(&doc).unwrap();
        assert!(out.contains(
            "PackageCopyrightText: <text>Copyright 2023\nThe Authors</text>\n"
        ));
    }
}
