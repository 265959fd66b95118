use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bomify_common::purl::Purl;
use bomify_license::Reader;
use bomify_model::Element;
use log::info;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::download::download_zip;
use crate::pool::{scan_package_licenses, PackageFetcher};
use crate::{to_spdx_package, Ecosystem, EcosystemModule, Error, LangPackage};

pub const GO_MOD_FILE: &str = "go.mod";

/// The Go dependency scanner, driven by `go list -json -deps ./...`.
///
/// There is no manifest fallback: without a Go toolchain the scan fails.
pub struct GoModule {
    path: PathBuf,
    /// Keep only the direct dependencies named in go.mod.
    pub only_direct: bool,
    packages: Vec<LangPackage>,
}

impl GoModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            only_direct: false,
            packages: Vec::new(),
        }
    }

    async fn list_from_go(&self) -> Result<Vec<LangPackage>, Error> {
        #[derive(Deserialize)]
        struct GoPackage {
            #[serde(rename = "Module")]
            module: Option<GoModuleRef>,
        }
        #[derive(Deserialize)]
        struct GoModuleRef {
            #[serde(rename = "Path")]
            path: String,
            #[serde(rename = "Version")]
            version: Option<String>,
            #[serde(rename = "Main", default)]
            main: bool,
            #[serde(rename = "Dir")]
            dir: Option<String>,
        }

        let output = Command::new("go")
            .args(["list", "-json", "-deps", "./..."])
            .current_dir(&self.path)
            .output()
            .await
            .map_err(|err| Error::Transport(format!("running go list: {err}")))?;
        if !output.status.success() {
            return Err(Error::Transport(format!(
                "go list exited with {}",
                output.status
            )));
        }

        // the output is a stream of concatenated JSON objects
        let mut seen = HashSet::new();
        let mut pkgs = Vec::new();
        for parsed in serde_json::Deserializer::from_slice(&output.stdout).into_iter::<GoPackage>()
        {
            let parsed = parsed.map_err(|err| Error::Parse(format!("parsing go list: {err}")))?;
            let Some(module) = parsed.module else { continue };
            if module.main {
                continue;
            }
            let Some(version) = module.version else { continue };
            if !seen.insert(format!("{}@{version}", module.path)) {
                continue;
            }
            pkgs.push(LangPackage {
                name: module.path,
                version,
                // the module cache already holds the sources
                local_dir: module.dir.map(PathBuf::from),
                tmp_dir: false,
                ..Default::default()
            });
        }
        Ok(pkgs)
    }

    /// The direct requirements of a go.mod file, indirect ones excluded.
    pub fn direct_requirements(path: impl AsRef<Path>) -> Result<HashSet<String>, Error> {
        let data = std::fs::read_to_string(path)?;
        let mut direct = HashSet::new();
        let mut in_block = false;

        for line in data.lines() {
            let line = line.trim();
            if line.starts_with("require (") {
                in_block = true;
                continue;
            }
            if in_block && line.starts_with(')') {
                in_block = false;
                continue;
            }
            let spec = if in_block {
                line
            } else if let Some(rest) = line.strip_prefix("require ") {
                rest
            } else {
                continue;
            };
            if spec.contains("// indirect") {
                continue;
            }
            if let Some((module, _version)) = spec.split_once(' ') {
                direct.insert(module.to_string());
            }
        }
        Ok(direct)
    }

    /// A Go purl requires an import path with at least one slash.
    pub fn package_url(pkg: &LangPackage) -> Option<String> {
        if pkg.name.is_empty() || pkg.version.is_empty() || !pkg.name.contains('/') {
            return None;
        }
        let (namespace, name) = pkg
            .name
            .rsplit_once('/')
            .expect("name verified to contain a slash");
        Some(
            Purl::new("golang", name.to_string())
                .with_namespace(namespace.to_string())
                .with_version(pkg.version.clone())
                .to_string(),
        )
    }

    /// Go proxy download URL, case-encoded per proxy rules; the
    /// `+incompatible` suffix is stripped from the version here only.
    pub fn download_url(pkg: &LangPackage) -> String {
        let version = pkg.version.trim_end_matches("+incompatible");
        format!(
            "https://proxy.golang.org/{}/@v/{}.zip",
            proxy_escape(&pkg.name),
            proxy_escape(version)
        )
    }
}

/// Capital letters are escaped as `!<lowercase>` in Go proxy paths.
fn proxy_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if c.is_ascii_uppercase() {
            out.push('!');
            out.push(c.to_ascii_lowercase());
        } else {
            out.push(c);
        }
    }
    out
}

struct GoFetcher;

#[async_trait]
impl PackageFetcher for GoFetcher {
    async fn download(
        &self,
        pkg: &mut LangPackage,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let url = GoModule::download_url(pkg);
        let dest = std::env::temp_dir()
            .join("bomify")
            .join("go-scanner")
            .join(format!("{}-{}", pkg.name.replace('/', "-"), pkg.version));
        std::fs::create_dir_all(&dest)?;
        download_zip(&url, &dest, cancel).await?;

        info!(
            "go module {} (version {}) downloaded to {}",
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
impl EcosystemModule for GoModule {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Go
    }

    async fn open(&mut self) -> Result<(), Error> {
        let mut pkgs = self.list_from_go().await?;

        if self.only_direct {
            let direct = Self::direct_requirements(self.path.join(GO_MOD_FILE))?;
            pkgs.retain(|p| direct.contains(&p.name));
        }

        info!("found {} go modules", pkgs.len());
        self.packages = pkgs;
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
            scan_package_licenses(packages, "go", reader, Arc::new(GoFetcher), cancel).await?;
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
                    Ecosystem::Go,
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
    fn purl_requires_slashed_import_path() {
        let pkg = LangPackage {
            name: "sigs.k8s.io/release-utils".into(),
            version: "v0.7.4".into(),
            ..Default::default()
        };
        assert_eq!(
            Some("pkg:golang/sigs.k8s.io/release-utils@v0.7.4".to_string()),
            GoModule::package_url(&pkg)
        );

        let bare = LangPackage {
            name: "mymodule".into(),
            version: "v1.0.0".into(),
            ..Default::default()
        };
        assert_eq!(None, GoModule::package_url(&bare));
    }

    #[test]
    fn proxy_url_case_encoding_and_incompatible() {
        let pkg = LangPackage {
            name: "github.com/Azure/go-autorest".into(),
            version: "v14.2.0+incompatible".into(),
            ..Default::default()
        };
        assert_eq!(
            "https://proxy.golang.org/github.com/!azure/go-autorest/@v/v14.2.0.zip",
            GoModule::download_url(&pkg)
        );

        // the purl keeps the +incompatible suffix
        let purl = GoModule::package_url(&pkg).unwrap();
        assert!(purl.contains("v14.2.0%2Bincompatible") || purl.contains("v14.2.0+incompatible"));
    }

    #[test]
    fn direct_requirements_skip_indirect() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(GO_MOD_FILE);
        std::fs::write(
            &path,
            "module example.com/app\n\ngo 1.21\n\nrequire (\n\
\tgithub.com/spf13/cobra v1.8.0\n\
\tgithub.com/inconshreveable/mousetrap v1.1.0 // indirect\n\
)\n\nrequire sigs.k8s.io/release-utils v0.7.4\n",
        )
        .unwrap();

        let direct = GoModule::direct_requirements(&path).unwrap();
        assert!(direct.contains("github.com/spf13/cobra"));
        assert!(direct.contains("sigs.k8s.io/release-utils"));
        assert!(!direct.contains("github.com/inconshreveable/mousetrap"));
    }
}
