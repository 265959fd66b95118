use std::collections::{HashMap, HashSet};
use std::path::Path;

use bomify_common::hashing::Digests;
use bomify_common::id::build_id;
use log::debug;
use sha1::{Digest, Sha1};
use time::OffsetDateTime;

use crate::element::{Element, ElementKind};
use crate::error::Error;
use crate::external::ExternalDocumentRef;
use crate::relationship::{Relationship, RelationshipType};
use crate::{DATA_LICENSE, DOCUMENT_ID, NONE_LICENSE, SPDX_VERSION};

/// Who and what created the document.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CreationInfo {
    pub persons: Vec<String>,
    pub tools: Vec<String>,
    pub license_list_version: String,
}

/// Result of checking one on-disk artifact against the document.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileValidation {
    pub file_name: String,
    pub success: bool,
    pub message: String,
}

/// An SPDX document: metadata plus an arena of elements.
///
/// Elements are stored in insertion order and indexed by SPDX ID;
/// relationships reference peers by ID, which keeps the graph cyclic-capable
/// without reference cycles in memory. The `DESCRIBES` set is the list of
/// root element IDs.
#[derive(Clone, Debug)]
pub struct Document {
    pub version: String,
    pub data_license: String,
    pub id: String,
    pub name: String,
    pub namespace: String,
    pub creation_info: CreationInfo,
    pub created: OffsetDateTime,
    pub comment: Option<String>,
    pub external_doc_refs: Vec<ExternalDocumentRef>,

    elements: Vec<Element>,
    index: HashMap<String, usize>,
    roots: Vec<String>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self {
            version: SPDX_VERSION.to_string(),
            data_license: DATA_LICENSE.to_string(),
            id: DOCUMENT_ID.to_string(),
            name: String::new(),
            namespace: String::new(),
            creation_info: CreationInfo::default(),
            created: OffsetDateTime::now_utc(),
            comment: None,
            external_doc_refs: Vec::new(),
            elements: Vec::new(),
            index: HashMap::new(),
            roots: Vec::new(),
        }
    }

    pub fn elements(&self) -> impl Iterator<Item = &Element> {
        self.elements.iter()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// IDs of the `DESCRIBES` set, in insertion order.
    pub fn roots(&self) -> &[String] {
        &self.roots
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.index.get(id).map(|&at| &self.elements[at])
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Element> {
        self.index.get(id).copied().map(|at| &mut self.elements[at])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Insert an element into the arena, disambiguating its identifier if
    /// it collides with an existing one. Returns the final ID.
    pub fn insert(&mut self, mut element: Element) -> String {
        if element.id().is_empty() {
            element.build_id::<_, &str>([]);
        }

        let original = element.id().to_string();
        if self.index.contains_key(&original) {
            let mut n = 1;
            let fresh = loop {
                let candidate = format!("{original}-{n}");
                if !self.index.contains_key(&candidate) {
                    break candidate;
                }
                n += 1;
            };
            debug!("renaming duplicate element {original} to {fresh}");
            element.set_id(fresh.clone());
            // rewrite self references carried in from the build phase
            for rel in &mut element.relationships {
                if rel.peer.as_deref() == Some(original.as_str()) {
                    rel.peer = Some(fresh.clone());
                }
            }
        }

        let id = element.id().to_string();
        self.index.insert(id.clone(), self.elements.len());
        self.elements.push(element);
        id
    }

    /// Add a top-level package: inserted into the arena and recorded in the
    /// `DESCRIBES` set.
    pub fn add_package(&mut self, package: Element) -> Result<String, Error> {
        if !package.is_package() {
            return Err(Error::InvalidInput("element is not a package".into()));
        }
        let id = self.insert(package);
        self.roots.push(id.clone());
        Ok(id)
    }

    /// Add a top-level file: inserted into the arena and recorded in the
    /// `DESCRIBES` set.
    pub fn add_file(&mut self, file: Element) -> Result<String, Error> {
        if !file.is_file() {
            return Err(Error::InvalidInput("element is not a file".into()));
        }
        let id = self.insert(file);
        self.roots.push(id.clone());
        Ok(id)
    }

    /// Attach a child element under a parent with the given relationship
    /// type. The child lands in the arena; the parent gains an edge.
    pub fn attach(
        &mut self,
        parent_id: &str,
        kind: RelationshipType,
        child: Element,
    ) -> Result<String, Error> {
        if !self.contains(parent_id) {
            return Err(Error::NotFound(format!("element {parent_id}")));
        }
        let id = self.insert(child);
        let parent = self
            .get_mut(parent_id)
            .ok_or_else(|| Error::NotFound(format!("element {parent_id}")))?;
        parent.add_relationship(Relationship::to_peer(kind, id.clone()));
        Ok(id)
    }

    /// Record an already-inserted element in the `DESCRIBES` set.
    pub fn promote_root(&mut self, id: &str) {
        if self.contains(id) && !self.roots.iter().any(|r| r == id) {
            self.roots.push(id.to_string());
        }
    }

    /// Add a relationship edge between two elements already in the arena,
    /// or to an opaque peer reference.
    pub fn relate(&mut self, host_id: &str, relationship: Relationship) -> Result<(), Error> {
        let host = self
            .get_mut(host_id)
            .ok_or_else(|| Error::NotFound(format!("element {host_id}")))?;
        host.add_relationship(relationship);
        Ok(())
    }

    /// Synthesize a document namespace when none was configured.
    pub fn ensure_namespace(&mut self) {
        if self.namespace.is_empty() {
            let seed = format!("SBOM-SPDX-{}", build_id::<_, &str>([]));
            if self.name.is_empty() {
                self.name = seed.clone();
            }
            self.namespace = format!("https://spdx.org/spdxdocs/{seed}");
        }
    }

    /// SHA-1 digests of the direct child files of a package, keyed by the
    /// file ID. Fails with [`Error::MissingDigest`] when a file has none.
    fn direct_file_sha1s(&self, package_id: &str) -> Result<Vec<String>, Error> {
        let package = self
            .get(package_id)
            .ok_or_else(|| Error::NotFound(format!("element {package_id}")))?;

        let mut digests = Vec::new();
        for rel in &package.relationships {
            let Some(peer) = &rel.peer else { continue };
            let Some(element) = self.get(peer) else {
                continue;
            };
            if !element.is_file() {
                continue;
            }
            match element.checksums.get("SHA1") {
                Some(sha1) if !sha1.is_empty() => digests.push(sha1.clone()),
                _ => return Err(Error::MissingDigest(element.display_name().to_string())),
            }
        }
        Ok(digests)
    }

    /// Compute and store the package verification code.
    ///
    /// With `FilesAnalyzed=false` the code is cleared. With files analyzed,
    /// the code is the SHA-1 over the ascending concatenation of the direct
    /// child files' SHA-1 digests; zero files yield an empty code; a file
    /// without SHA-1 fails with [`Error::MissingDigest`].
    pub fn compute_verification_code(&mut self, package_id: &str) -> Result<(), Error> {
        let analyzed = self
            .get(package_id)
            .and_then(Element::as_package)
            .map(|data| data.files_analyzed)
            .ok_or_else(|| Error::NotFound(format!("package {package_id}")))?;

        let code = if analyzed {
            let mut sha1s = self.direct_file_sha1s(package_id)?;
            if sha1s.is_empty() {
                String::new()
            } else {
                sha1s.sort();
                let mut hasher = Sha1::new();
                hasher.update(sha1s.concat().as_bytes());
                hex::encode(hasher.finalize())
            }
        } else {
            String::new()
        };

        if let Some(data) = self.get_mut(package_id).and_then(Element::as_package_mut) {
            data.verification_code = code;
        }
        Ok(())
    }

    /// Collect `LicenseInfoInFile` values from a package's direct files,
    /// deduplicated preserving encounter order. With no licensed file the
    /// list is the single `NONE` token. Only meaningful with
    /// `FilesAnalyzed=true`; otherwise the list is cleared.
    pub fn compute_license_list(&mut self, package_id: &str) -> Result<(), Error> {
        let package = self
            .get(package_id)
            .ok_or_else(|| Error::NotFound(format!("package {package_id}")))?;
        let Some(data) = package.as_package() else {
            return Err(Error::InvalidInput(format!(
                "element {package_id} is not a package"
            )));
        };

        let licenses = if data.files_analyzed {
            let mut seen = HashSet::new();
            let mut licenses = Vec::new();
            let mut any_file = false;
            for rel in &package.relationships {
                let Some(element) = rel.peer.as_deref().and_then(|id| self.get(id)) else {
                    continue;
                };
                let Some(file) = element.as_file() else { continue };
                any_file = true;
                if let Some(license) = &file.license_info_in_file {
                    if !license.is_empty() && seen.insert(license.clone()) {
                        licenses.push(license.clone());
                    }
                }
            }
            if any_file && licenses.is_empty() {
                licenses.push(NONE_LICENSE.to_string());
            }
            licenses
        } else {
            Vec::new()
        };

        if let Some(data) = self.get_mut(package_id).and_then(Element::as_package_mut) {
            data.license_info_from_files = licenses;
        }
        Ok(())
    }

    /// Check on-disk artifacts against the digests recorded in the document.
    ///
    /// A file passes when it is present in the document, carries at least
    /// one supported digest (SHA-256 or SHA-512) and every supported digest
    /// matches the data on disk.
    pub fn validate_files(&self, paths: &[impl AsRef<Path>]) -> Result<Vec<FileValidation>, Error> {
        let mut results = Vec::new();
        for path in paths {
            let path = path.as_ref();
            let file_name = path.to_string_lossy().to_string();
            let digests = Digests::from_file(path)?;

            let element = self.elements.iter().find(|e| {
                e.as_file()
                    .map(|f| f.file_name == file_name)
                    .unwrap_or_default()
                    || e.name == file_name
            });

            let validation = match element {
                None => FileValidation {
                    file_name,
                    success: false,
                    message: "file is not listed in the document".into(),
                },
                Some(element) => validate_one(element, &file_name, &digests),
            };
            results.push(validation);
        }
        Ok(results)
    }

    /// Mark back-edges non-full so serialization terminates on cycles.
    pub fn break_cycles(&mut self) {
        let mut visited = HashSet::new();
        let roots = self.roots.clone();
        for root in roots {
            self.break_cycles_from(&root, &mut visited);
        }
    }

    fn break_cycles_from(&mut self, id: &str, visited: &mut HashSet<String>) {
        if !visited.insert(id.to_string()) {
            return;
        }
        let Some(at) = self.index.get(id).copied() else {
            return;
        };
        let peers: Vec<String> = self.elements[at]
            .relationships
            .iter()
            .filter_map(|rel| rel.peer.clone())
            .collect();

        for rel in &mut self.elements[at].relationships {
            if let Some(peer) = &rel.peer {
                if visited.contains(peer) {
                    rel.full_render = false;
                }
            }
        }

        for peer in peers {
            self.break_cycles_from(&peer, visited);
        }
    }

    /// Verify the global uniqueness invariant: every element ID appears once.
    pub fn verify_unique_ids(&self) -> Result<(), Error> {
        let mut seen = HashSet::new();
        for element in &self.elements {
            if !seen.insert(element.id()) {
                return Err(Error::DuplicateId(element.id().to_string()));
            }
        }
        Ok(())
    }

    /// Prune the graph down to branches leading to elements whose name
    /// starts with `pattern`, looking at most `depth` levels deep. Children
    /// of matching nodes are pruned as well. Returns whether anything
    /// matched.
    pub fn filter_reverse_dependencies(&mut self, pattern: &str, depth: i32) -> bool {
        let roots = self.roots.clone();
        let mut keep = HashMap::new();
        let mut any = false;
        for root in roots {
            if self.filter_branch(&root, pattern, depth, &mut keep) {
                any = true;
            }
        }
        any
    }

    fn filter_branch(
        &mut self,
        id: &str,
        pattern: &str,
        remaining: i32,
        keep: &mut HashMap<String, bool>,
    ) -> bool {
        if let Some(&cached) = keep.get(id) {
            return cached;
        }
        // guards cycles while this branch is being decided
        keep.insert(id.to_string(), false);

        let peers: Vec<String> = match self.get(id) {
            Some(element) => element
                .relationships
                .iter()
                .filter_map(|rel| rel.peer.clone())
                .collect(),
            None => Vec::new(),
        };

        let mut kept_peers = HashSet::new();
        if remaining != 0 {
            for peer in peers {
                if self.filter_branch(&peer, pattern, remaining - 1, keep) {
                    kept_peers.insert(peer);
                }
            }
        }

        if let Some(element) = self.get_mut(id) {
            element.relationships.retain(|rel| {
                rel.peer
                    .as_deref()
                    .map(|p| kept_peers.contains(p))
                    .unwrap_or_default()
            });
        }

        let matched = self
            .get(id)
            .map(|e| e.name.starts_with(pattern))
            .unwrap_or_default();
        let result = matched || !kept_peers.is_empty();
        keep.insert(id.to_string(), result);
        result
    }
}

fn validate_one(element: &Element, file_name: &str, digests: &Digests) -> FileValidation {
    let supported = [("SHA256", &digests.sha256), ("SHA512", &digests.sha512)];

    let mut checked = 0;
    for (algo, expected) in supported {
        if let Some(recorded) = element.checksums.get(algo) {
            checked += 1;
            if recorded != expected.as_str() {
                return FileValidation {
                    file_name: file_name.to_string(),
                    success: false,
                    message: format!("{algo} digest mismatch"),
                };
            }
        }
    }

    if checked == 0 {
        return FileValidation {
            file_name: file_name.to_string(),
            success: false,
            message: "no supported digest recorded for file".into(),
        };
    }

    FileValidation {
        file_name: file_name.to_string(),
        success: true,
        message: String::new(),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::element::Element;

    fn test_package(id: &str) -> Element {
        let mut p = Element::package(id);
        p.set_id(id);
        p
    }

    #[test]
    fn unique_element_ids_on_insert() {
        let mut doc = Document::new();
        let name = "same-name";
        for i in 0..3 {
            let id = doc.add_package(test_package(name)).unwrap();
            if i == 0 {
                assert_eq!(name, id);
            } else {
                assert_ne!(name, id);
            }
        }
        doc.verify_unique_ids().unwrap();
    }

    #[test]
    fn verification_code_vector() {
        let mut doc = Document::new();
        let mut pkg = Element::package("testPackage");
        pkg.as_package_mut().unwrap().files_analyzed = true;
        let pkg_id = doc.add_package(pkg).unwrap();

        // no files: empty code
        doc.compute_verification_code(&pkg_id).unwrap();
        assert_eq!(
            "",
            doc.get(&pkg_id).unwrap().as_package().unwrap().verification_code
        );

        for sha1 in [
            "2dce2a1b847cf337770abcf2f5a23fdb4150826a",
            "637ca3c1d37083c3de7f5928b1cec99f4495adc7",
            "05dd7d2e432a28126fe7b41c7cc1458b2936af8d",
            "805914c62e61ef0e5c8a23b4a388adf9c7154845",
        ] {
            let mut f = Element::file(format!("{sha1}.txt"));
            f.checksums.insert("SHA1".into(), sha1.into());
            doc.attach(&pkg_id, RelationshipType::Contains, f).unwrap();
        }

        doc.compute_verification_code(&pkg_id).unwrap();
        assert_eq!(
            "7772199fd355003bfd91c7d946404685da0c5bb0",
            doc.get(&pkg_id).unwrap().as_package().unwrap().verification_code
        );

        // a file without SHA-1 fails the computation
        doc.attach(&pkg_id, RelationshipType::Contains, Element::file("test.txt"))
            .unwrap();
        assert!(matches!(
            doc.compute_verification_code(&pkg_id),
            Err(Error::MissingDigest(_))
        ));

        // with FilesAnalyzed=false the code is empty again
        doc.get_mut(&pkg_id)
            .unwrap()
            .as_package_mut()
            .unwrap()
            .files_analyzed = false;
        doc.compute_verification_code(&pkg_id).unwrap();
        assert_eq!(
            "",
            doc.get(&pkg_id).unwrap().as_package().unwrap().verification_code
        );
    }

    #[test]
    fn license_list_dedupes_in_order() {
        let mut doc = Document::new();
        let mut pkg = Element::package("testPackage");
        pkg.as_package_mut().unwrap().files_analyzed = true;
        pkg.license_concluded = Some("GPL-2.0-only".into());
        let pkg_id = doc.add_package(pkg).unwrap();

        for (i, license) in [
            "Apache-2.0",
            "BSD-2-Clause",
            "Spencer-94",
            "Spencer-94",
            "Apache-2.0",
            "Apache-2.0",
            "Apache-2.0",
        ]
        .iter()
        .enumerate()
        {
            let mut f = Element::file(format!("file{i}.txt"));
            f.as_file_mut().unwrap().license_info_in_file = Some(license.to_string());
            doc.attach(&pkg_id, RelationshipType::Contains, f).unwrap();
        }

        doc.compute_license_list(&pkg_id).unwrap();
        assert_eq!(
            vec!["Apache-2.0", "BSD-2-Clause", "Spencer-94"],
            doc.get(&pkg_id)
                .unwrap()
                .as_package()
                .unwrap()
                .license_info_from_files
        );

        // concluded license is untouched
        assert_eq!(
            Some("GPL-2.0-only"),
            doc.get(&pkg_id).unwrap().license_concluded.as_deref()
        );
    }

    #[test]
    fn license_list_none_token() {
        let mut doc = Document::new();
        let mut pkg = Element::package("p");
        pkg.as_package_mut().unwrap().files_analyzed = true;
        let pkg_id = doc.add_package(pkg).unwrap();
        doc.attach(&pkg_id, RelationshipType::Contains, Element::file("plain.txt"))
            .unwrap();

        doc.compute_license_list(&pkg_id).unwrap();
        assert_eq!(
            vec![NONE_LICENSE.to_string()],
            doc.get(&pkg_id)
                .unwrap()
                .as_package()
                .unwrap()
                .license_info_from_files
        );
    }

    #[test]
    fn element_lookup_is_graph_wide() {
        let mut doc = Document::new();
        let top = doc.add_package(test_package("p-top")).unwrap();

        let mut parent = top.clone();
        for i in 0..3 {
            parent = doc
                .attach(
                    &parent,
                    RelationshipType::Contains,
                    test_package(&format!("subpackage-{i}")),
                )
                .unwrap();
        }
        for i in 0..3 {
            doc.attach(
                "subpackage-1",
                RelationshipType::DependsOn,
                test_package(&format!("dep-{i}")),
            )
            .unwrap();
        }

        for radix in ["subpackage", "dep"] {
            for i in 0..3 {
                assert!(doc.get(&format!("{radix}-{i}")).is_some(), "{radix}-{i}");
            }
        }
        assert!(doc.get("subpackage-10000000").is_none());
    }

    #[test]
    fn cycles_are_broken_for_serialization() {
        let mut doc = Document::new();
        let a = doc.add_package(test_package("a")).unwrap();
        let b = doc
            .attach(&a, RelationshipType::Contains, test_package("b"))
            .unwrap();
        doc.relate(&b, Relationship::to_peer(RelationshipType::DependsOn, a.clone()))
            .unwrap();

        doc.break_cycles();
        let back = &doc.get(&b).unwrap().relationships[0];
        assert!(!back.full_render);
    }

    #[test]
    fn reverse_dependency_filter_prunes_branches() {
        let mut doc = Document::new();
        let mk = |name: &str, id: &str| {
            let mut p = Element::package(name);
            p.set_id(id);
            p
        };
        doc.add_package(mk("root-p", "root-p")).unwrap();
        doc.attach("root-p", RelationshipType::Contains, mk("target-p", "target-p-0"))
            .unwrap();
        doc.attach("root-p", RelationshipType::Contains, mk("sub-p", "sub-p-1"))
            .unwrap();
        doc.attach("root-p", RelationshipType::Contains, mk("sub-p", "sub-p-3"))
            .unwrap();
        doc.attach("target-p-0", RelationshipType::Contains, mk("sub-p", "sub-p-0"))
            .unwrap();
        doc.attach("sub-p-1", RelationshipType::Contains, mk("target-p", "target-p-1"))
            .unwrap();
        doc.attach("sub-p-1", RelationshipType::Contains, mk("sub-p", "sub-p-2"))
            .unwrap();

        assert!(doc.filter_reverse_dependencies("target-p", 2));

        let root_peers: Vec<_> = doc
            .get("root-p")
            .unwrap()
            .relationships
            .iter()
            .filter_map(|r| r.peer.clone())
            .collect();
        assert_eq!(vec!["target-p-0".to_string()], root_peers);
        assert!(doc.get("target-p-0").unwrap().relationships.is_empty());
    }

    #[test]
    fn validate_files_matrix() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.txt");
        std::fs::write(&path, b"abc").unwrap();
        let name = path.to_string_lossy().to_string();

        let cases: &[(&[(&str, &str)], bool)] = &[
            (
                &[("SHA256", "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad")],
                true,
            ),
            // unsupported algorithm alone
            (&[("MD5", "900150983cd24fb0d6963f7d28e17f72")], false),
            // both supported, both correct
            (
                &[
                    ("SHA256", "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"),
                    ("SHA512", "ddaf35a193617abacc417349ae20413112e6fa4e89a97ea20a9eeee64b55d39a2192992a274fc1a836ba3c23a3feebbd454d4423643ce80e2a9ac94fa54ca49f"),
                ],
                true,
            ),
            // one wrong
            (
                &[
                    ("SHA256", "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"),
                    ("SHA512", "badbad"),
                ],
                false,
            ),
            // nothing recorded
            (&[], false),
        ];

        for (checksums, expected) in cases {
            let mut doc = Document::new();
            doc.name = "test".into();
            let mut f = Element::file(name.clone());
            for (algo, value) in *checksums {
                f.checksums.insert(algo.to_string(), value.to_string());
            }
            doc.add_file(f).unwrap();

            let results = doc.validate_files(&[&path]).unwrap();
            assert_eq!(1, results.len());
            assert_eq!(*expected, results[0].success, "checksums: {checksums:?}");
        }

        // a missing on-disk file is an error
        let doc = Document::new();
        assert!(doc.validate_files(&[Path::new("/no/such/file")]).is_err());
    }
}
