use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bomify_common::purl::Purl;
use bomify_license::Reader;
use bomify_model::Element;
use log::{info, warn};
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::download::download_tarball;
use crate::pool::{scan_package_licenses, PackageFetcher};
use crate::{to_spdx_package, Ecosystem, EcosystemModule, Error, LangPackage};

pub const PACKAGE_FILE: &str = "package.json";

#[derive(Deserialize, Default)]
struct NpmDep {
    #[serde(default)]
    version: String,
    #[serde(default)]
    dependencies: BTreeMap<String, NpmDep>,
}

/// The Node dependency scanner: prefers `npm ls --all --json`, falls back
/// to reading package.json.
pub struct NodeModule {
    path: PathBuf,
    packages: Vec<LangPackage>,
}

impl NodeModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            packages: Vec::new(),
        }
    }

    async fn list_from_npm(&self) -> Result<Vec<LangPackage>, Error> {
        #[derive(Deserialize)]
        struct NpmOutput {
            #[serde(default)]
            dependencies: BTreeMap<String, NpmDep>,
        }

        let output = Command::new("npm")
            .args(["ls", "--all", "--json"])
            .current_dir(&self.path)
            .output()
            .await
            .map_err(|err| Error::Transport(format!("running npm: {err}")))?;
        if !output.status.success() {
            return Err(Error::Transport(format!(
                "npm ls exited with {}",
                output.status
            )));
        }

        let result: NpmOutput = serde_json::from_slice(&output.stdout)
            .map_err(|err| Error::Parse(format!("parsing npm ls output: {err}")))?;

        // flatten the tree depth-first, deduplicating by name@version
        let mut seen = HashSet::new();
        let mut pkgs = Vec::new();
        flatten(&result.dependencies, &mut seen, &mut pkgs);
        Ok(pkgs)
    }

    /// Read dependencies straight out of package.json, stripping range
    /// operators off the versions.
    pub fn parse_package_json(path: impl AsRef<Path>) -> Result<Vec<LangPackage>, Error> {
        #[derive(Deserialize)]
        struct PackageJson {
            #[serde(default)]
            dependencies: BTreeMap<String, String>,
        }

        let data = std::fs::read_to_string(path)?;
        let manifest: PackageJson = serde_json::from_str(&data)
            .map_err(|err| Error::Parse(format!("parsing {PACKAGE_FILE}: {err}")))?;

        Ok(manifest
            .dependencies
            .into_iter()
            .map(|(name, version)| LangPackage {
                name,
                version: version
                    .trim_start_matches(['^', '~', '>', '=', '<', '!', ' '])
                    .to_string(),
                ..Default::default()
            })
            .collect())
    }

    pub fn package_url(pkg: &LangPackage) -> Option<String> {
        if pkg.name.is_empty() || pkg.version.is_empty() {
            return None;
        }
        let purl = match pkg.name.split_once('/') {
            // scoped package: @scope/name
            Some((scope, name)) if scope.starts_with('@') => Purl::new("npm", name.to_string())
                .with_namespace(scope.to_string()),
            Some(_) => return None,
            None => Purl::new("npm", pkg.name.clone()),
        };
        Some(purl.with_version(pkg.version.clone()).to_string())
    }

    /// Registry tarball URL; scoped names keep the scope in the path but
    /// use the scope-less tail as tarball basename.
    pub fn download_url(pkg: &LangPackage) -> String {
        let basename = match pkg.name.split_once('/') {
            Some((scope, name)) if scope.starts_with('@') => name,
            _ => pkg.name.as_str(),
        };
        format!(
            "https://registry.npmjs.org/{}/-/{basename}-{}.tgz",
            pkg.name, pkg.version
        )
    }
}

fn flatten(deps: &BTreeMap<String, NpmDep>, seen: &mut HashSet<String>, out: &mut Vec<LangPackage>) {
    for (name, dep) in deps {
        let key = format!("{name}@{}", dep.version);
        if seen.insert(key) && !dep.version.is_empty() {
            out.push(LangPackage {
                name: name.clone(),
                version: dep.version.clone(),
                ..Default::default()
            });
        }
        flatten(&dep.dependencies, seen, out);
    }
}

struct NodeFetcher;

#[async_trait]
impl PackageFetcher for NodeFetcher {
    async fn download(
        &self,
        pkg: &mut LangPackage,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let url = NodeModule::download_url(pkg);
        let dest = std::env::temp_dir()
            .join("bomify")
            .join("node-scanner")
            .join(format!(
                "{}-{}",
                pkg.name.replace('/', "-").trim_start_matches('@'),
                pkg.version
            ));
        std::fs::create_dir_all(&dest)?;
        download_tarball(&url, &dest, cancel).await?;

        info!(
            "node package {} (version {}) downloaded to {}",
            pkg.name,
            pkg.version,
            dest.display()
        );
        pkg.local_dir = Some(dest);
        pkg.tmp_dir = true;
        Ok(())
    }
}

#[async_trait]
impl EcosystemModule for NodeModule {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Node
    }

    async fn open(&mut self) -> Result<(), Error> {
        match self.list_from_npm().await {
            Ok(pkgs) => {
                info!("found {} packages from npm", pkgs.len());
                self.packages = pkgs;
                return Ok(());
            }
            Err(err) => warn!("npm ls failed, falling back to {PACKAGE_FILE}: {err}"),
        }

        let manifest = self.path.join(PACKAGE_FILE);
        if !manifest.exists() {
            return Err(Error::NotFound(format!(
                "{PACKAGE_FILE} in {} (and npm is not available)",
                self.path.display()
            )));
        }
        self.packages = Self::parse_package_json(&manifest)?;
        info!("found {} packages from {PACKAGE_FILE}", self.packages.len());
        Ok(())
    }

    fn packages(&self) -> &[LangPackage] {
        &self.packages
    }

    async fn scan_licenses(
        &mut self,
        reader: Arc<Reader>,
        cancel: CancellationToken,
    ) -> Result<(), Error> {
        let packages = std::mem::take(&mut self.packages);
        self.packages =
            scan_package_licenses(packages, "node", reader, Arc::new(NodeFetcher), cancel)
                .await?;
        Ok(())
    }

    async fn remove_downloads(&mut self) -> Result<(), Error> {
        crate::download::remove_downloads(&mut self.packages)
    }

    fn to_spdx_packages(&self) -> Vec<Element> {
        self.packages
            .iter()
            .filter(|pkg| !pkg.name.is_empty())
            .map(|pkg| {
                to_spdx_package(
                    Ecosystem::Node,
                    pkg,
                    Self::package_url(pkg),
                    Self::download_url(pkg),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_package_json_with_ranges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(PACKAGE_FILE);
        std::fs::write(
            &path,
            r#"{"name": "app", "dependencies": {"lodash": "^4.17.21", "express": ">=4.18.2"}}"#,
        )
        .unwrap();

        let pkgs = NodeModule::parse_package_json(&path).unwrap();
        assert_eq!(2, pkgs.len());
        let lodash = pkgs.iter().find(|p| p.name == "lodash").unwrap();
        assert_eq!("4.17.21", lodash.version);
        let express = pkgs.iter().find(|p| p.name == "express").unwrap();
        assert_eq!("4.18.2", express.version);
    }

    #[test]
    fn scoped_purls_and_tarballs() {
        let scoped = LangPackage {
            name: "@types/node".into(),
            version: "18.11.9".into(),
            ..Default::default()
        };
        assert_eq!(
            Some("pkg:npm/%40types/node@18.11.9".to_string()),
            NodeModule::package_url(&scoped)
        );
        assert_eq!(
            "https://registry.npmjs.org/@types/node/-/node-18.11.9.tgz",
            NodeModule::download_url(&scoped)
        );

        let plain = LangPackage {
            name: "lodash".into(),
            version: "4.17.21".into(),
            ..Default::default()
        };
        assert_eq!(
            Some("pkg:npm/lodash@4.17.21".to_string()),
            NodeModule::package_url(&plain)
        );
        assert_eq!(
            "https://registry.npmjs.org/lodash/-/lodash-4.17.21.tgz",
            NodeModule::download_url(&plain)
        );
    }

    #[test]
    fn flatten_dedupes_tree() {
        let tree: BTreeMap<String, NpmDep> = serde_json::from_str(
            r#"{
                "a": {"version": "1.0.0", "dependencies": {
                    "b": {"version": "2.0.0", "dependencies": {
                        "a": {"version": "1.0.0"}
                    }}
                }},
                "b": {"version": "2.0.0"}
            }"#,
        )
        .unwrap();

        let mut seen = HashSet::new();
        let mut out = Vec::new();
        flatten(&tree, &mut seen, &mut out);
        assert_eq!(2, out.len());
    }
}
