//! Per-ecosystem dependency scanners.
//!
//! Every module takes a project directory, prefers the ecosystem's own
//! tool, falls back to manifest parsing where the contract allows it, and
//! yields a flat deduplicated list of `{name, version}` records convertible
//! to SPDX packages. License scanning downloads package sources through a
//! bounded pool and classifies them with the license reader.

pub mod cargo;
pub mod download;
pub mod golang;
pub mod node;
pub mod pool;
pub mod python;

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bomify_model::Element;

pub use cargo::CargoModule;
pub use golang::GoModule;
pub use node::NodeModule;
pub use python::PythonModule;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("download of {0} exceeds the size budget")]
    TooLarge(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Archive(#[from] bomify_common::archive::ArchiveError),
    #[error(transparent)]
    License(#[from] bomify_license::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The ecosystems bomify understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Ecosystem {
    Go,
    Python,
    Node,
    Rust,
}

impl Ecosystem {
    pub fn label(&self) -> &'static str {
        match self {
            Ecosystem::Go => "go",
            Ecosystem::Python => "python",
            Ecosystem::Node => "node",
            Ecosystem::Rust => "rust",
        }
    }

    pub fn purl_type(&self) -> &'static str {
        match self {
            Ecosystem::Go => "golang",
            Ecosystem::Python => "pypi",
            Ecosystem::Node => "npm",
            Ecosystem::Rust => "cargo",
        }
    }
}

/// One dependency of a project, as reported by an ecosystem scanner.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LangPackage {
    pub name: String,
    pub version: String,
    /// Where the package sources live locally, once downloaded.
    pub local_dir: Option<PathBuf>,
    /// Whether `local_dir` is a scanner-owned temp dir.
    pub tmp_dir: bool,
    pub license_id: String,
    pub copyright_text: String,
}

/// A language-ecosystem scanner over one project directory.
#[async_trait]
pub trait EcosystemModule: Send {
    fn ecosystem(&self) -> Ecosystem;

    /// Build the package list from the project directory.
    async fn open(&mut self) -> Result<(), Error>;

    fn packages(&self) -> &[LangPackage];

    /// Scan licenses for all packages through the bounded pool, filling
    /// the per-package license fields. Per-package failures are logged and
    /// skipped.
    async fn scan_licenses(
        &mut self,
        reader: std::sync::Arc<bomify_license::Reader>,
        cancel: tokio_util::sync::CancellationToken,
    ) -> Result<(), Error>;

    /// Remove all scanner-owned downloads.
    async fn remove_downloads(&mut self) -> Result<(), Error>;

    /// Convert the package list into SPDX package elements.
    fn to_spdx_packages(&self) -> Vec<Element>;
}

/// Whether a project directory carries manifests of the given ecosystem.
pub fn detect(ecosystem: Ecosystem, path: &Path) -> bool {
    let manifests: &[&str] = match ecosystem {
        Ecosystem::Go => &["go.mod"],
        Ecosystem::Python => &[
            python::REQUIREMENTS_FILE,
            "setup.py",
            "pyproject.toml",
            "Pipfile",
        ],
        Ecosystem::Node => &[node::PACKAGE_FILE],
        Ecosystem::Rust => &[cargo::CARGO_FILE],
    };
    manifests.iter().any(|m| path.join(m).exists())
}

/// Build an SPDX package element from a scanned dependency record.
pub(crate) fn to_spdx_package(
    ecosystem: Ecosystem,
    pkg: &LangPackage,
    purl: Option<String>,
    download_location: String,
) -> Element {
    let mut element = Element::package(&pkg.name);
    {
        let data = element.as_package_mut().expect("constructed as package");
        data.version = pkg.version.clone();
        data.id_prefix = Some(ecosystem.purl_type().to_string());
        data.download_location = download_location;
        if let Some(purl) = purl {
            data.external_refs.push(bomify_model::ExternalRef::purl(purl));
        }
    }
    element.license_concluded =
        (!pkg.license_id.is_empty()).then(|| pkg.license_id.clone());
    element.copyright_text = pkg.copyright_text.clone();
    element.build_id([pkg.name.as_str(), pkg.version.as_str()]);
    element
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn detect_by_manifest() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!detect(Ecosystem::Python, dir.path()));
        std::fs::write(dir.path().join("requirements.txt"), "requests==2.28.1\n").unwrap();
        assert!(detect(Ecosystem::Python, dir.path()));

        assert!(!detect(Ecosystem::Rust, dir.path()));
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\n").unwrap();
        assert!(detect(Ecosystem::Rust, dir.path()));
    }

    #[test]
    fn spdx_conversion_sets_prefix_and_purl() {
        let pkg = LangPackage {
            name: "requests".into(),
            version: "2.28.1".into(),
            license_id: "Apache-2.0".into(),
            ..Default::default()
        };
        let element = to_spdx_package(
            Ecosystem::Python,
            &pkg,
            Some("pkg:pypi/requests@2.28.1".into()),
            "https://pypi.org/project/requests/2.28.1/".into(),
        );
        assert_eq!("SPDXRef-Package-pypi-requests-2.28.1", element.id());
        assert_eq!(Some("Apache-2.0"), element.license_concluded.as_deref());
        assert_eq!(
            "pkg:pypi/requests@2.28.1",
            element.as_package().unwrap().external_refs[0].locator
        );
    }
}
