use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bomify_common::purl::Purl;
use bomify_license::Reader;
use bomify_model::Element;
use log::{info, warn};
use regex::Regex;
use serde::Deserialize;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::download::{download_tarball, fetch_bytes};
use crate::pool::{scan_package_licenses, PackageFetcher};
use crate::{to_spdx_package, Ecosystem, EcosystemModule, Error, LangPackage};

pub const REQUIREMENTS_FILE: &str = "requirements.txt";

/// Matches pinned lines like `package==1.2.3` in requirements.txt.
fn requirement_re() -> Regex {
    Regex::new(r"^([A-Za-z0-9_-]+)==(\S+)").expect("static regex must compile")
}

/// The Python dependency scanner: prefers `pip list`, falls back to
/// parsing requirements.txt.
pub struct PythonModule {
    path: PathBuf,
    packages: Vec<LangPackage>,
}

impl PythonModule {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            packages: Vec::new(),
        }
    }

    async fn list_from_pip(&self) -> Result<Vec<LangPackage>, Error> {
        #[derive(Deserialize)]
        struct PipPackage {
            name: String,
            version: String,
        }

        let mut last_err = None;
        for bin in ["pip", "pip3"] {
            let output = Command::new(bin)
                .args(["list", "--format=json"])
                .current_dir(&self.path)
                .output()
                .await;
            match output {
                Ok(output) if output.status.success() => {
                    let pkgs: Vec<PipPackage> = serde_json::from_slice(&output.stdout)
                        .map_err(|err| Error::Parse(format!("parsing pip list output: {err}")))?;
                    return Ok(pkgs
                        .into_iter()
                        .map(|p| LangPackage {
                            name: p.name,
                            version: p.version,
                            ..Default::default()
                        })
                        .collect());
                }
                Ok(output) => {
                    last_err = Some(Error::Transport(format!(
                        "pip list exited with {}",
                        output.status
                    )))
                }
                Err(err) => last_err = Some(Error::Transport(format!("running {bin}: {err}"))),
            }
        }
        Err(last_err.unwrap_or_else(|| Error::NotFound("pip".into())))
    }

    /// Parse a requirements.txt, keeping pinned `name==version` lines and
    /// skipping comments and `-`-prefixed directives.
    pub fn parse_requirements(path: impl AsRef<Path>) -> Result<Vec<LangPackage>, Error> {
        let data = std::fs::read_to_string(path)?;
        let re = requirement_re();

        let mut pkgs = Vec::new();
        for line in data.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with('-') {
                continue;
            }
            if let Some(captures) = re.captures(line) {
                pkgs.push(LangPackage {
                    name: captures[1].to_string(),
                    version: captures[2].to_string(),
                    ..Default::default()
                });
            }
        }
        Ok(pkgs)
    }

    pub fn package_url(pkg: &LangPackage) -> Option<String> {
        if pkg.name.is_empty() || pkg.version.is_empty() {
            return None;
        }
        Some(
            Purl::new("pypi", pkg.name.clone())
                .with_version(pkg.version.clone())
                .to_string(),
        )
    }
}

struct PythonFetcher;

#[async_trait]
impl PackageFetcher for PythonFetcher {
    async fn download(
        &self,
        pkg: &mut LangPackage,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        #[derive(Deserialize)]
        struct PypiResponse {
            urls: Vec<PypiUrl>,
        }
        #[derive(Deserialize)]
        struct PypiUrl {
            packagetype: String,
            url: String,
        }

        let api_url = format!("https://pypi.org/pypi/{}/{}/json", pkg.name, pkg.version);
        let data = fetch_bytes(&api_url, cancel).await?;
        let response: PypiResponse = serde_json::from_slice(&data)
            .map_err(|err| Error::Parse(format!("parsing PyPI response: {err}")))?;

        // the sdist entry wins, anything else is a fallback
        let url = response
            .urls
            .iter()
            .find(|u| u.packagetype == "sdist")
            .or_else(|| response.urls.first())
            .map(|u| u.url.clone())
            .ok_or_else(|| Error::NotFound(format!("download url for {}", pkg.name)))?;

        let dest = std::env::temp_dir()
            .join("bomify")
            .join("python-scanner")
            .join(format!("{}-{}", pkg.name, pkg.version));
        std::fs::create_dir_all(&dest)?;
        download_tarball(&url, &dest, cancel).await?;

        info!(
            "python package {} (version {}) downloaded to {}",
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
impl EcosystemModule for PythonModule {
    fn ecosystem(&self) -> Ecosystem {
        Ecosystem::Python
    }

    async fn open(&mut self) -> Result<(), Error> {
        match self.list_from_pip().await {
            Ok(pkgs) => {
                info!("found {} packages from pip", pkgs.len());
                self.packages = pkgs;
                return Ok(());
            }
            Err(err) => {
                warn!("pip list failed, falling back to requirements.txt parsing: {err}");
            }
        }

        let requirements = self.path.join(REQUIREMENTS_FILE);
        if !requirements.exists() {
            return Err(Error::NotFound(format!(
                "{REQUIREMENTS_FILE} in {} (and pip is not available)",
                self.path.display()
            )));
        }
        self.packages = Self::parse_requirements(&requirements)?;
        info!(
            "found {} packages from {REQUIREMENTS_FILE}",
            self.packages.len()
        );
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
            scan_package_licenses(packages, "python", reader, Arc::new(PythonFetcher), cancel)
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
                    Ecosystem::Python,
                    pkg,
                    Self::package_url(pkg),
                    format!("https://pypi.org/project/{}/{}/", pkg.name, pkg.version),
                )
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_pinned_requirements() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(REQUIREMENTS_FILE);
        std::fs::write(
            &path,
            "# comment\nrequests==2.28.1\nflask==2.2.2\n-r extra.txt\nloose-dep\n",
        )
        .unwrap();

        let pkgs = PythonModule::parse_requirements(&path).unwrap();
        assert_eq!(2, pkgs.len());
        assert_eq!("requests", pkgs[0].name);
        assert_eq!("2.28.1", pkgs[0].version);
        assert_eq!("flask", pkgs[1].name);
        assert_eq!("2.2.2", pkgs[1].version);
    }

    #[test]
    fn purl_needs_name_and_version() {
        let pkg = LangPackage {
            name: "requests".into(),
            version: "2.28.1".into(),
            ..Default::default()
        };
        assert_eq!(
            Some("pkg:pypi/requests@2.28.1".to_string()),
            PythonModule::package_url(&pkg)
        );

        let bare = LangPackage {
            name: "requests".into(),
            ..Default::default()
        };
        assert_eq!(None, PythonModule::package_url(&bare));
    }

    #[test]
    fn spdx_packages_carry_pypi_prefix() {
        let mut module = PythonModule::new("/tmp");
        module.packages = vec![LangPackage {
            name: "flask".into(),
            version: "2.2.2".into(),
            ..Default::default()
        }];
        let elements = module.to_spdx_packages();
        assert_eq!(1, elements.len());
        assert_eq!("SPDXRef-Package-pypi-flask-2.2.2", elements[0].id());
        assert_eq!(
            "https://pypi.org/project/flask/2.2.2/",
            elements[0].as_package().unwrap().download_location
        );
    }
}
