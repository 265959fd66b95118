use std::collections::HashMap;
use std::io::Read;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::Error;

/// One license of the SPDX list.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct License {
    pub license_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub license_text: String,
    pub is_deprecated_license_id: bool,
    pub is_osi_approved: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub see_also: Vec<String>,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LicenseIndex {
    license_list_version: String,
    licenses: Vec<License>,
}

/// The in-memory license list, keyed by SPDX identifier.
#[derive(Clone, Debug, Default)]
pub struct Catalog {
    pub version: String,
    licenses: HashMap<String, License>,
}

impl Catalog {
    /// Load the catalog from a license-list-data zip archive. The index is
    /// read from `license-list-data-<tag>/json/licenses.json`; full license
    /// texts come from `json/details/*.json`.
    pub fn from_archive(path: impl AsRef<Path>) -> Result<Self, Error> {
        let file = std::fs::File::open(path)?;
        let mut archive = zip::ZipArchive::new(file)?;

        let index_at = (0..archive.len())
            .find(|&i| {
                archive
                    .by_index(i)
                    .map(|entry| entry.name().ends_with("/json/licenses.json"))
                    .unwrap_or_default()
            })
            .ok_or_else(|| Error::NotFound("json/licenses.json".into()))?;

        let index: LicenseIndex = {
            let mut entry = archive.by_index(index_at)?;
            let mut data = String::new();
            entry.read_to_string(&mut data)?;
            serde_json::from_str(&data).map_err(|err| Error::Parse(err.to_string()))?
        };

        let mut catalog = Self {
            version: index.license_list_version,
            licenses: index
                .licenses
                .into_iter()
                .map(|l| (l.license_id.clone(), l))
                .collect(),
        };

        for i in 0..archive.len() {
            let mut entry = archive.by_index(i)?;
            if !entry.name().contains("/json/details/") || !entry.name().ends_with(".json") {
                continue;
            }
            let mut data = String::new();
            entry.read_to_string(&mut data)?;
            match serde_json::from_str::<License>(&data) {
                Ok(detail) => {
                    if let Some(license) = catalog.licenses.get_mut(&detail.license_id) {
                        license.license_text = detail.license_text;
                    }
                }
                Err(err) => debug!("skipping malformed license detail {}: {err}", entry.name()),
            }
        }

        Ok(catalog)
    }

    pub fn len(&self) -> usize {
        self.licenses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.licenses.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&License> {
        self.licenses.get(id)
    }

    pub fn licenses(&self) -> impl Iterator<Item = &License> {
        self.licenses.values()
    }

    /// Classify a license text against the catalog.
    ///
    /// An `SPDX-License-Identifier:` tag wins. Otherwise the normalized
    /// text is compared against the catalog texts and names.
    pub fn identify_text(&self, text: &str) -> Option<&License> {
        for line in text.lines() {
            if let Some(tag) = line.trim().strip_prefix("SPDX-License-Identifier:") {
                let id = tag.trim().trim_matches(|c| c == '(' || c == ')');
                if let Some(license) = self.get(id) {
                    return Some(license);
                }
            }
        }

        let normalized = normalize(text);
        if normalized.is_empty() {
            return None;
        }
        // full-text containment first, then the license name in the header
        let header: String = normalized.chars().take(512).collect();
        self.licenses
            .values()
            .find(|l| {
                !l.license_text.is_empty() && {
                    let known = normalize(&l.license_text);
                    !known.is_empty() && normalized.contains(&known)
                }
            })
            .or_else(|| {
                self.licenses
                    .values()
                    .filter(|l| !l.is_deprecated_license_id)
                    .find(|l| header.contains(&normalize(&l.name)))
            })
    }
}

fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    const APACHE_DETAIL: &str = r#"{
        "isDeprecatedLicenseId": false,
        "licenseText": "Apache License\nVersion 2.0, January 2004\nhttp://www.apache.org/licenses/\n\nTERMS AND CONDITIONS FOR USE, REPRODUCTION, AND DISTRIBUTION",
        "name": "Apache License 2.0",
        "licenseId": "Apache-2.0",
        "seeAlso": ["http://www.apache.org/licenses/LICENSE-2.0"],
        "isOsiApproved": true
    }"#;

    fn test_archive(dir: &Path) -> std::path::PathBuf {
        let path = dir.join("license-list.zip");
        let file = std::fs::File::create(&path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        let opts = zip::write::SimpleFileOptions::default();

        zip.start_file("license-list-data-v3.23/json/licenses.json", opts)
            .unwrap();
        zip.write_all(
            br#"{
                "licenseListVersion": "3.23",
                "licenses": [
                    {"licenseId": "Apache-2.0", "name": "Apache License 2.0"},
                    {"licenseId": "MIT", "name": "MIT License"}
                ]
            }"#,
        )
        .unwrap();

        zip.start_file("license-list-data-v3.23/json/details/Apache-2.0.json", opts)
            .unwrap();
        zip.write_all(APACHE_DETAIL.as_bytes()).unwrap();
        zip.finish().unwrap();
        path
    }

    #[test]
    fn loads_archive() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::from_archive(test_archive(dir.path())).unwrap();

        assert_eq!("3.23", catalog.version);
        assert_eq!(2, catalog.len());
        let apache = catalog.get("Apache-2.0").unwrap();
        assert!(apache.license_text.starts_with("Apache License"));
        // index-only entries have no text
        assert!(catalog.get("MIT").unwrap().license_text.is_empty());
    }

    #[test]
    fn identifies_by_tag_and_text() {
        let dir = tempfile::tempdir().unwrap();
        let catalog = Catalog::from_archive(test_archive(dir.path())).unwrap();

        let by_tag = catalog
            .identify_text("// SPDX-License-Identifier: MIT\nfn main() {}")
            .unwrap();
        assert_eq!("MIT", by_tag.license_id);

        let by_text = catalog
            .identify_text(
                "Apache License\nVersion 2.0, January 2004\nhttp://www.apache.org/licenses/\n\nTERMS AND CONDITIONS FOR USE, REPRODUCTION, AND DISTRIBUTION\n\nextra trailer",
            )
            .unwrap();
        assert_eq!("Apache-2.0", by_text.license_id);

        assert!(catalog.identify_text("not a license at all").is_none());
    }
}
