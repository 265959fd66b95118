use std::path::{Path, PathBuf};

use bomify_common::archive::{self, ArchiveError};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::entry::PackageDBEntry;
use crate::os_release::OsKind;
use crate::{Error, OsPackageScanner};

pub const DPKG_STATUS_PATH: &str = "var/lib/dpkg/status";

/// Scanner for the Debian/Ubuntu dpkg status database.
pub struct DpkgScanner {
    os: OsKind,
}

impl DpkgScanner {
    pub fn new(os: OsKind) -> Self {
        Self { os }
    }

    /// Parse a dpkg status file: colon-separated `Key: Value` blocks
    /// separated by blank lines.
    pub fn parse_db(&self, path: impl AsRef<Path>) -> Result<Vec<PackageDBEntry>, Error> {
        let data = std::fs::read_to_string(path)?;
        parse_status(&data)
    }
}

pub(crate) fn parse_status(data: &str) -> Result<Vec<PackageDBEntry>, Error> {
    let mut db = Vec::new();
    let mut current: Option<PackageDBEntry> = None;

    for line in data.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = value.trim();

        match key {
            "Package" => {
                if let Some(done) = current.take() {
                    db.push(done);
                }
                current = Some(PackageDBEntry {
                    package: value.to_string(),
                    purl_type: "deb".to_string(),
                    ..Default::default()
                });
            }
            "Architecture" => {
                if let Some(pkg) = &mut current {
                    pkg.architecture = value.to_string();
                }
            }
            "Version" => {
                if let Some(pkg) = &mut current {
                    pkg.version = value.to_string();
                }
            }
            "Homepage" => {
                if let Some(pkg) = &mut current {
                    pkg.homepage = value.to_string();
                }
            }
            "Maintainer" => {
                if let Some(pkg) = &mut current {
                    if let Some((name, email)) = value.split_once('<') {
                        pkg.maintainer_name = name.trim().to_string();
                        pkg.maintainer_email =
                            email.trim().trim_end_matches('>').to_string();
                    }
                }
            }
            _ => {}
        }
    }
    if let Some(done) = current.take() {
        db.push(done);
    }

    Ok(db)
}

impl OsPackageScanner for DpkgScanner {
    fn purl_type(&self) -> &'static str {
        "deb"
    }

    fn os_kind(&self) -> OsKind {
        self.os
    }

    /// Cycle the layers in order, extracting the dpkg database. The last
    /// layer that carries one wins.
    fn read_os_packages(&self, layers: &[PathBuf]) -> Result<(usize, Vec<PackageDBEntry>), Error> {
        let mut database: Option<NamedTempFile> = None;
        let mut database_layer = 0;

        for (i, layer) in layers.iter().enumerate() {
            let candidate = NamedTempFile::new()?;
            match archive::extract_file(layer, DPKG_STATUS_PATH, candidate.path()) {
                Ok(()) => {
                    info!("layer {i} has a newer version of the dpkg database");
                    database = Some(candidate);
                    database_layer = i;
                }
                Err(ArchiveError::NotFound) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        let Some(database) = database else {
            debug!("no dpkg database found in any layer");
            return Ok((0, Vec::new()));
        };

        let packages = self.parse_db(database.path())?;
        Ok((database_layer, packages))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::os_release::test::layer_with;

    const STATUS: &str = "\
Package: libtiff5\n\
Status: install ok installed\n\
Priority: optional\n\
Architecture: amd64\n\
Version: 4.2.0-1\n\
Maintainer: Laszlo Boszormenyi (GCS) <gcs@debian.org>\n\
Homepage: https://libtiff.gitlab.io/libtiff/\n\
\n\
Package: perl-base\n\
Essential: yes\n\
Architecture: amd64\n\
Version: 5.32.1-4+deb11u2\n\
Maintainer: Niko Tyni <ntyni@debian.org>\n";

    #[test]
    fn parses_status_blocks() {
        let db = parse_status(STATUS).unwrap();
        assert_eq!(2, db.len());

        assert_eq!("libtiff5", db[0].package);
        assert_eq!("4.2.0-1", db[0].version);
        assert_eq!("amd64", db[0].architecture);
        assert_eq!("https://libtiff.gitlab.io/libtiff/", db[0].homepage);
        assert_eq!("Laszlo Boszormenyi (GCS)", db[0].maintainer_name);
        assert_eq!("gcs@debian.org", db[0].maintainer_email);
        assert_eq!("deb", db[0].purl_type);

        assert_eq!("perl-base", db[1].package);
        assert_eq!("5.32.1-4+deb11u2", db[1].version);
    }

    /// Two layers carry the status file; the second adds a package and
    /// changes a version. Only the later set must be reported.
    #[test]
    fn last_layer_wins() {
        let dir = tempfile::tempdir().unwrap();
        let l1 = layer_with(
            dir.path(),
            "l1.tar",
            &[(
                DPKG_STATUS_PATH,
                b"Package: bash\nVersion: 5.1-1\nArchitecture: amd64\n".as_slice(),
            )],
        );
        let l2 = layer_with(
            dir.path(),
            "l2.tar",
            &[(
                DPKG_STATUS_PATH,
                b"Package: bash\nVersion: 5.1-2\nArchitecture: amd64\n\n\
Package: curl\nVersion: 7.74.0-1\nArchitecture: amd64\n"
                    .as_slice(),
            )],
        );

        let scanner = DpkgScanner::new(OsKind::Debian);
        let (layer, packages) = scanner.read_os_packages(&[l1, l2]).unwrap();
        assert_eq!(1, layer);
        assert_eq!(2, packages.len());
        assert_eq!("5.1-2", packages[0].version);
        assert_eq!("curl", packages[1].package);
    }

    #[test]
    fn missing_database_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layer = layer_with(dir.path(), "l.tar", &[("bin/sh", b"#!".as_slice())]);

        let scanner = DpkgScanner::new(OsKind::Debian);
        let (layer_at, packages) = scanner.read_os_packages(&[layer]).unwrap();
        assert_eq!(0, layer_at);
        assert!(packages.is_empty());
    }
}
