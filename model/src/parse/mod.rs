//! Readers turning serialized SPDX documents back into the model.

pub mod json;
pub mod tag_value;

use std::io::Read;
use std::path::Path;

use crate::document::Document;
use crate::error::Error;

/// Open an SPDX document from a file path, `-` for stdin. The encoding is
/// sniffed: documents starting with `{` parse as JSON, anything else as
/// tag-value.
pub fn open(path: impl AsRef<Path>) -> Result<Document, Error> {
    let path = path.as_ref();
    let data = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)?
    };
    from_str(&data)
}

/// Parse a document from a string, sniffing the encoding.
pub fn from_str(data: &str) -> Result<Document, Error> {
    match data.trim_start().chars().next() {
        Some('{') => json::parse(data),
        Some(_) => tag_value::parse(data),
        None => Err(Error::Parse("document is empty".into())),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::Element;
    use crate::relationship::RelationshipType;
    use crate::serialize::{serialize, Format};

    fn sample_doc() -> Document {
        let mut doc = Document::new();
        doc.name = "round-trip".into();
        doc.namespace = "https://spdx.org/spdxdocs/round-trip".into();
        doc.creation_info.tools.push("bomify-0.1.0".into());

        let mut pkg = Element::package("requests");
        {
            let data = pkg.as_package_mut().unwrap();
            data.version = "2.28.1".into();
            data.id_prefix = Some("pypi".into());
            data.external_refs.push(crate::external::ExternalRef::purl(
                "pkg:pypi/requests@2.28.1",
            ));
        }
        pkg.build_id(["requests", "2.28.1"]);
        let pkg_id = doc.add_package(pkg).unwrap();

        let mut file = Element::file("setup.py");
        file.checksums
            .insert("SHA1".into(), "a9993e364706816aba3e25717850c26c9cd0d89d".into());
        file.build_id(["setup.py"]);
        doc.attach(&pkg_id, RelationshipType::Contains, file).unwrap();
        doc
    }

    /// parse(serialize_json(D)) equals D up to relationship-edge ordering.
    #[test]
    fn json_round_trip() {
        let doc = sample_doc();
        let out = serialize(&doc, Format::Json).unwrap();
        let parsed = from_str(&out).unwrap();

        assert_eq!(doc.name, parsed.name);
        assert_eq!(doc.namespace, parsed.namespace);
        assert_eq!(doc.roots(), parsed.roots());
        assert_eq!(doc.len(), parsed.len());

        for element in doc.elements() {
            let other = parsed.get(element.id()).expect(element.id());
            assert_eq!(element.name, other.name);
            assert_eq!(element.checksums, other.checksums);
            assert_eq!(element.version(), other.version());

            let mut edges: Vec<_> = element
                .relationships
                .iter()
                .map(|r| (r.kind, r.target_id().to_string()))
                .collect();
            let mut other_edges: Vec<_> = other
                .relationships
                .iter()
                .map(|r| (r.kind, r.target_id().to_string()))
                .collect();
            edges.sort_by(|a, b| a.1.cmp(&b.1));
            other_edges.sort_by(|a, b| a.1.cmp(&b.1));
            assert_eq!(edges, other_edges);
        }

        let purl = parsed
            .get(doc.roots()[0].as_str())
            .unwrap()
            .purl()
            .unwrap();
        assert_eq!("pypi", purl.ty);
    }

    #[test]
    fn tag_value_round_trip() {
        let doc = sample_doc();
        let out = serialize(&doc, Format::TagValue).unwrap();
        let parsed = from_str(&out).unwrap();

        assert_eq!(doc.name, parsed.name);
        assert_eq!(doc.roots(), parsed.roots());
        assert_eq!(doc.len(), parsed.len());
        let pkg = parsed.get(doc.roots()[0].as_str()).unwrap();
        assert_eq!("requests", pkg.name);
        assert_eq!(Some("2.28.1"), pkg.version());
    }

    #[test]
    fn empty_input_is_a_parse_error() {
        assert!(matches!(from_str("  \n"), Err(Error::Parse(_))));
    }
}
