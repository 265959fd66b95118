use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bomify_common::purl::Purl;
use bomify_license::Reader;
use bomify_model::Element;
use log::info;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::download::download_tarball;
use crate::pool::{scan_package_licenses, PackageFetcher};
use crate::{to_spdx_package, Ecosystem, EcosystemModule, Error, LangPackage};

pub const CARGO_FILE: &str = "Cargo.toml";

/// The crates.io source string in `cargo metadata` output.
const CRATES_IO_REGISTRY: &str = "registry+https://github.com/rust-lang/crates.io-index";

/// The Rust dependency scanner, driven by `cargo metadata`.
///
/// Workspace members (source = null) are excluded; only crates coming from
/// the crates.io registry are reported.
pub struct CargoModule {
    path: PathBuf,
    packages: Vec<LangPackage>,
}

impl CargoModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            packages: Vec::new(),
        }
    }

    async fn list_from_cargo(&self) -> Result<Vec<LangPackage>, Error> {
        #[derive(Deserialize)]
        struct Metadata {
            packages: Vec<MetadataPackage>,
        }
        #[derive(Deserialize)]
        struct MetadataPackage {
            name: String,
            version: String,
            source: Option<String>,
        }

        let output = Command::new("cargo")
            .args(["metadata", "--format-version", "1"])
            .current_dir(&self.path)
            .output()
            .await
            .map_err(|err| Error::Transport(format!("running cargo: {err}")))?;
        if !output.status.success() {
            return Err(Error::Transport(format!(
                "cargo metadata exited with {}",
                output.status
            )));
        }

        let metadata: Metadata = serde_json::from_slice(&output.stdout)
            .map_err(|err| Error::Parse(format!("parsing cargo metadata: {err}")))?;

        Ok(metadata
            .packages
            .into_iter()
            .filter(|p| {
                p.source
                    .as_deref()
                    .map(|s| s.contains(CRATES_IO_REGISTRY))
                    .unwrap_or_default()
            })
            .map(|p| LangPackage {
                name: p.name,
                version: p.version,
                ..Default::default()
            })
            .collect())
    }

    pub fn package_url(pkg: &LangPackage) -> Option<String> {
        if pkg.name.is_empty() || pkg.version.is_empty() {
            return None;
        }
        Some(
            Purl::new("cargo", pkg.name.clone())
                .with_version(pkg.version.clone())
                .to_string(),
        )
    }

    pub fn download_url(pkg: &LangPackage) -> String {
        format!(
            "https://crates.io/api/v1/crates/{}/{}/download",
            pkg.name, pkg.version
        )
    }
}

struct CargoFetcher;

#[async_trait]
impl PackageFetcher for CargoFetcher {
    async fn download(
        &self,
        pkg: &mut LangPackage,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let url = CargoModule::download_url(pkg);
        let dest = std::env::temp_dir()
            .join("bomify")
            .join("rust-scanner")
            .join(format!("{}-{}", pkg.name, pkg.version));
        std::fs::create_dir_all(&dest)?;
        download_tarball(&url, &dest, cancel).await?;

        info!(
            "rust crate {} (version {}) downloaded to {}",
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
impl EcosystemModule for CargoModule {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Rust
    }

    async fn open(&mut self) -> Result<(), Error> {
        self.packages = self.list_from_cargo().await?;
        info!("found {} crates from cargo metadata", self.packages.len());
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
            scan_package_licenses(packages, "rust", reader, Arc::new(CargoFetcher), cancel)
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
                    Ecosystem::Rust,
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
    fn purl_and_download_url() {
        let pkg = LangPackage {
            name: "serde".into(),
            version: "1.0.204".into(),
            ..Default::default()
        };
        assert_eq!(
            Some("pkg:cargo/serde@1.0.204".to_string()),
            CargoModule::package_url(&pkg)
        );
        assert_eq!(
            "https://crates.io/api/v1/crates/serde/1.0.204/download",
            CargoModule::download_url(&pkg)
        );
    }

    #[test]
    fn spdx_packages_carry_cargo_prefix() {
        let mut module = CargoModule::new("/tmp");
        module.packages = vec![LangPackage {
            name: "serde".into(),
            version: "1.0.204".into(),
            ..Default::default()
        }];
        let elements = module.to_spdx_packages();
        assert_eq!("SPDXRef-Package-cargo-serde-1.0.204", elements[0].id());
    }
}
