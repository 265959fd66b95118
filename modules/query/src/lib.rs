//! A small filter language over SPDX documents.
//!
//! Expressions are whitespace-separated `<keyword>:<arg>` tokens composing
//! a filter pipeline applied left to right over the document's top-level
//! object set.

pub mod expression;
pub mod filter;

use std::path::Path;

use bomify_model::{parse, Document};

pub use expression::Expression;
pub use filter::{DepthFilter, Filter, FilterResults, NameFilter, PurlFilter};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("query engine has no document open")]
    NoDocument,
    #[error("parsing expression: {0}")]
    Parse(String),
    #[error(transparent)]
    Model(#[from] bomify_model::Error),
}

/// The query engine: holds an open document and runs filter expressions
/// against it.
#[derive(Default)]
pub struct Engine {
    document: Option<Document>,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_document(document: Document) -> Self {
        Self {
            document: Some(document),
        }
    }

    /// Read a document from the specified path.
    pub fn open(&mut self, path: impl AsRef<Path>) -> Result<(), Error> {
        self.document = Some(parse::open(path)?);
        Ok(())
    }

    pub fn document(&self) -> Option<&Document> {
        self.document.as_ref()
    }

    /// Parse an expression and run its filters over the document.
    ///
    /// The first failing filter aborts the pipeline; the error rides on
    /// the returned results.
    pub fn query(&self, expression_text: &str) -> Result<FilterResults, Error> {
        let Some(doc) = &self.document else {
            return Err(Error::NoDocument);
        };
        let expression = Expression::parse(expression_text)?;

        let mut results = FilterResults::top_level(doc);
        for filter in expression.filters() {
            results.apply(doc, filter.as_ref());
        }
        Ok(results)
    }
}

#[cfg(test)]
mod test {
    use bomify_model::{Element, ExternalRef, Relationship, RelationshipType};

    use super::*;

    /// Two oci-image packages plus two loose files, one package carrying
    /// a nested file.
    pub(crate) fn test_document() -> Document {
        let mut doc = Document::new();
        doc.name = "query-test".into();

        for (i, name) in ["packageOne", "packageTwo"].iter().enumerate() {
            let (digest, repo) = if i == 1 {
                (
                    "sha256:c0d8e30ad4f13b5f26794264fe057c488c72a5112978b1c24f3940dfaf69368a",
                    "gcr.io/project",
                )
            } else {
                (
                    "sha256:4ed64c2e0857ad21c38b98345ebb5edb01791a0a10b0e9e3d9ddde185cdbd31a",
                    "index.docker.io/library",
                )
            };
            let mut pkg = Element::package(format!(
                "gcr.io/puerco-chainguard/images/{name}:v9.0.2-buster"
            ));
            pkg.set_id(*name);
            pkg.as_package_mut().unwrap().external_refs.push(ExternalRef::purl(format!(
                "pkg:oci/{name}@{digest}?repository_url={}&tag=nginx",
                repo.replace('/', "%2F")
            )));
            doc.add_package(pkg).unwrap();
        }

        for name in ["file1.txt", "file2.txt"] {
            let mut file = Element::file(name);
            file.set_id(name);
            doc.add_file(file).unwrap();
        }

        let mut subfile = Element::file("subfile1.txt");
        subfile.set_id("subfile1");
        let sub_id = doc.insert(subfile);
        doc.relate(
            "packageTwo",
            Relationship::to_peer(RelationshipType::Contains, sub_id),
        )
        .unwrap();

        doc
    }

    #[test]
    fn depth_queries() {
        let doc = test_document();
        let engine = Engine::with_document(doc);

        // level 0 is the top-level set
        let results = engine.query("depth:0").unwrap();
        assert!(results.error.is_none());
        assert_eq!(4, results.objects.len());

        // one level down only the nested file remains
        let results = engine.query("depth:1").unwrap();
        assert_eq!(1, results.objects.len());
        assert!(results.objects.contains_key("subfile1"));

        // beyond, nothing
        let results = engine.query("depth:2").unwrap();
        assert!(results.objects.is_empty());
    }

    #[test]
    fn name_queries() {
        let engine = Engine::with_document(test_document());

        // the name filter searches the graph below the working set
        let results = engine.query("name:subfile").unwrap();
        assert_eq!(1, results.objects.len());
        assert!(results.objects.contains_key("subfile1"));

        let results = engine.query("name:puerco-chainguard").unwrap();
        assert_eq!(2, results.objects.len());
    }

    #[test]
    fn purl_queries() {
        let engine = Engine::with_document(test_document());

        for (pattern, expected) in [
            ("purl:pkg:oci/*/*", 2usize),
            ("purl:pkg:oci/*/packageOne", 1),
            ("purl:pkg:oci/*/*?repository_url=gcr.io%2Fproject", 1),
            (
                "purl:pkg:oci/*/*?repository_url=index.docker.io%2Flibrary",
                1,
            ),
            (
                "purl:pkg:oci/*/*@sha256:c0d8e30ad4f13b5f26794264fe057c488c72a5112978b1c24f3940dfaf69368a",
                1,
            ),
        ] {
            let results = engine.query(pattern).unwrap();
            assert!(results.error.is_none(), "{pattern}");
            assert_eq!(expected, results.objects.len(), "{pattern}");
        }

        // an invalid purl pattern carries an error, the set is untouched
        let results = engine.query("purl:sdlkfjlskdjf").unwrap();
        assert!(results.error.is_some());
        assert_eq!(4, results.objects.len());
    }

    #[test]
    fn query_without_document_errors() {
        let engine = Engine::new();
        assert!(matches!(engine.query("depth:0"), Err(Error::NoDocument)));
    }
}
