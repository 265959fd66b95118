use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use walkdir::WalkDir;

use crate::{Catalog, Error, License};

/// Filenames considered license files: LICENSE, LICENCE, COPYING, with
/// optional prefixes/suffixes and .txt/.md extensions.
fn license_file_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)^(([^.]+-)?(licen[sc]e|copying)(-[^.]+)?)(\.(txt|md))?$")
            .expect("static regex must compile")
    })
}

#[derive(Clone, Debug, Default)]
pub struct ReaderOptions {
    /// Confidence floor for text classification, 0..=1. Kept for parity
    /// with external classifiers; the built-in matcher is binary.
    pub confidence_threshold: f32,
}

/// Result of scanning a directory for its top license.
#[derive(Clone, Debug)]
pub struct LicenseResult {
    pub license: License,
    /// Raw text of the license file, used as copyright text.
    pub text: String,
}

/// Walks package directories and classifies their license files against
/// the catalog.
#[derive(Clone, Debug, Default)]
pub struct Reader {
    catalog: Catalog,
    #[allow(dead_code)]
    options: ReaderOptions,
}

impl Reader {
    pub fn new(catalog: Catalog, options: ReaderOptions) -> Self {
        Self { catalog, options }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Find all license files under a directory.
    pub fn find_license_files(&self, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>, Error> {
        let mut found = Vec::new();
        for entry in WalkDir::new(dir) {
            let entry = entry.map_err(|err| Error::Parse(err.to_string()))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if license_file_re().is_match(&name) {
                found.push(entry.into_path());
            }
        }
        Ok(found)
    }

    /// Read the license of a package directory: the topmost license file
    /// that classifies against the catalog wins; a file that does not
    /// classify still provides the copyright text.
    pub fn read_top_license(&self, dir: impl AsRef<Path>) -> Result<Option<LicenseResult>, Error> {
        let mut candidates = self.find_license_files(&dir)?;
        // topmost first: fewer path components win
        candidates.sort_by_key(|p| p.components().count());

        for path in candidates {
            let text = match std::fs::read_to_string(&path) {
                Ok(text) => text,
                Err(err) => {
                    debug!("skipping unreadable license file {}: {err}", path.display());
                    continue;
                }
            };
            if let Some(license) = self.catalog.identify_text(&text) {
                return Ok(Some(LicenseResult {
                    license: license.clone(),
                    text,
                }));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod test {
    use std::fs;

    use super::*;

    #[test]
    fn finds_license_files_not_source() {
        let files = [
            "LICENSE",
            "LICENSE.txt",
            "LICENSE-APACHE2",
            "APACHE2-LICENSE",
            "license.go",
            "README.md",
        ];

        let dir = tempfile::tempdir().unwrap();
        let sub = dir.path().join("some/sub/dir");
        fs::create_dir_all(&sub).unwrap();
        for base in [dir.path(), sub.as_path()] {
            for name in files {
                fs::write(base.join(name), b"some license").unwrap();
            }
        }

        let reader = Reader::default();
        let found = reader.find_license_files(dir.path()).unwrap();
        assert_eq!(8, found.len(), "{found:?}");
        assert!(!found.iter().any(|p| p.ends_with("license.go")));
        assert!(!found.iter().any(|p| p.ends_with("README.md")));
    }

    #[test]
    fn reads_top_license() {
        // hand-assemble a tiny catalog
        let json = r#"{
            "licenseListVersion": "3.23",
            "licenses": [{"licenseId": "MIT", "name": "MIT License"}]
        }"#;
        let dir = tempfile::tempdir().unwrap();
        let zip_path = dir.path().join("list.zip");
        {
            use std::io::Write;
            let mut zip = zip::ZipWriter::new(fs::File::create(&zip_path).unwrap());
            zip.start_file(
                "license-list-data-v3.23/json/licenses.json",
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(json.as_bytes()).unwrap();
            zip.finish().unwrap();
        }
        let catalog = Catalog::from_archive(&zip_path).unwrap();

        let pkg = dir.path().join("pkg");
        fs::create_dir_all(&pkg).unwrap();
        fs::write(
            pkg.join("LICENSE"),
            "SPDX-License-Identifier: MIT\nCopyright (c) 2023 The Authors",
        )
        .unwrap();

        let reader = Reader::new(catalog, ReaderOptions::default());
        let result = reader.read_top_license(&pkg).unwrap().unwrap();
        assert_eq!("MIT", result.license.license_id);
        assert!(result.text.contains("The Authors"));

        // a directory without a license yields nothing
        let empty = dir.path().join("empty");
        fs::create_dir_all(&empty).unwrap();
        assert!(reader.read_top_license(&empty).unwrap().is_none());
    }
}
