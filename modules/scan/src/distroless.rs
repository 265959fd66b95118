use std::path::{Path, PathBuf};

use bomify_common::archive::{self, ArchiveError};
use log::debug;
use tempfile::TempDir;

use crate::dpkg::DpkgScanner;
use crate::entry::PackageDBEntry;
use crate::os_release::OsKind;
use crate::{Error, OsPackageScanner};

/// Distroless images split the dpkg database into one file per package.
pub const DISTROLESS_PKG_DIR: &str = "var/lib/dpkg/status.d/";

pub struct DistrolessScanner;

impl DistrolessScanner {
    pub fn new() -> Self {
        Self
    }

    /// Parse the split dpkg database extracted to a directory: every file
    /// is a single-package status block; `.md5sums` siblings are skipped.
    pub fn parse_db(&self, path: impl AsRef<Path>) -> Result<Vec<PackageDBEntry>, Error> {
        let dpkg = DpkgScanner::new(OsKind::Debian);
        let mut db = Vec::new();

        let mut entries: Vec<_> = std::fs::read_dir(path)?
            .collect::<Result<Vec<_>, _>>()?
            .into_iter()
            .map(|e| e.path())
            .collect();
        entries.sort();

        for file in entries {
            if file
                .file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with(".md5sums"))
                .unwrap_or_default()
            {
                continue;
            }
            let mut single = dpkg.parse_db(&file)?;
            db.append(&mut single);
        }
        Ok(db)
    }
}

impl Default for DistrolessScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl OsPackageScanner for DistrolessScanner {
    fn purl_type(&self) -> &'static str {
        "deb"
    }

    fn os_kind(&self) -> OsKind {
        OsKind::Distroless
    }

    /// Extract the `status.d` entries of every layer into one workspace
    /// (later layers overwrite earlier ones) and parse the merged set.
    fn read_os_packages(&self, layers: &[PathBuf]) -> Result<(usize, Vec<PackageDBEntry>), Error> {
        let workspace = TempDir::new()?;
        let mut last_layer = 0;

        for (i, layer) in layers.iter().enumerate() {
            match archive::extract_dir(layer, DISTROLESS_PKG_DIR, workspace.path()) {
                Ok(()) => last_layer = i,
                Err(ArchiveError::NotFound) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        let db_dir = workspace.path().join(DISTROLESS_PKG_DIR);
        if !db_dir.exists() {
            debug!("no distroless package database found in any layer");
            return Ok((0, Vec::new()));
        }

        let db = self.parse_db(&db_dir)?;
        Ok((last_layer, db))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::os_release::test::layer_with;

    #[test]
    fn merges_per_package_files() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer_with(
            dir.path(),
            "layer.tar",
            &[
                (
                    "var/lib/dpkg/status.d/base-files",
                    b"Package: base-files\nVersion: 11.1\nArchitecture: amd64\n".as_slice(),
                ),
                (
                    "var/lib/dpkg/status.d/netbase",
                    b"Package: netbase\nVersion: 6.3\nArchitecture: all\n".as_slice(),
                ),
                (
                    "var/lib/dpkg/status.d/netbase.md5sums",
                    b"d41d8cd98f00b204e9800998ecf8427e netbase\n".as_slice(),
                ),
            ],
        );

        let scanner = DistrolessScanner::new();
        let (layer_at, packages) = scanner.read_os_packages(&[layer]).unwrap();
        assert_eq!(0, layer_at);
        assert_eq!(2, packages.len());
        assert_eq!("base-files", packages[0].package);
        assert_eq!("netbase", packages[1].package);
    }

    #[test]
    fn no_database_yields_empty() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer_with(dir.path(), "layer.tar", &[("bin/sh", b"#!".as_slice())]);
        let (at, packages) = DistrolessScanner::new().read_os_packages(&[layer]).unwrap();
        assert_eq!(0, at);
        assert!(packages.is_empty());
    }
}
