use std::path::{Path, PathBuf};

use base64::Engine;
use bomify_common::archive::{self, ArchiveError};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::entry::PackageDBEntry;
use crate::os_release::OsKind;
use crate::{Error, OsPackageScanner};

pub const APK_DB_PATH: &str = "lib/apk/db/installed";

/// Scanner for the Alpine/Wolfi apk installed database.
pub struct ApkScanner {
    os: OsKind,
}

impl ApkScanner {
    pub fn new(os: OsKind) -> Self {
        Self { os }
    }

    /// Parse the apk installed index: single-letter keyed lines, one block
    /// per package.
    pub fn parse_db(&self, path: impl AsRef<Path>) -> Result<Vec<PackageDBEntry>, Error> {
        let data = std::fs::read_to_string(path)?;
        parse_installed(&data)
    }
}

pub(crate) fn parse_installed(data: &str) -> Result<Vec<PackageDBEntry>, Error> {
    let mut db = Vec::new();
    let mut current = PackageDBEntry {
        purl_type: "apk".to_string(),
        ..Default::default()
    };
    let mut seen_any = false;

    let mut flush =
        |current: &mut PackageDBEntry, seen_any: &mut bool, db: &mut Vec<PackageDBEntry>| {
            if *seen_any {
                db.push(std::mem::replace(
                    current,
                    PackageDBEntry {
                        purl_type: "apk".to_string(),
                        ..Default::default()
                    },
                ));
                *seen_any = false;
            }
        };

    for line in data.lines() {
        if line.trim().is_empty() {
            flush(&mut current, &mut seen_any, &mut db);
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };

        match key {
            "P" => {
                seen_any = true;
                current.package = value.to_string();
            }
            "V" => current.version = value.to_string(),
            "A" => current.architecture = value.to_string(),
            "m" => {
                if let Some((name, email)) = value.split_once('<') {
                    current.maintainer_name = name.trim().to_string();
                    current.maintainer_email = email.trim().trim_end_matches('>').to_string();
                } else {
                    current.maintainer_name = value.trim().to_string();
                }
            }
            "L" => current.license = value.to_string(),
            "U" => current.homepage = value.to_string(),
            "C" => {
                // "Q1" marks a base64-encoded SHA-1; anything else is an
                // MD5 digest
                if let Some(encoded) = value.strip_prefix("Q1") {
                    match base64::engine::general_purpose::STANDARD.decode(encoded) {
                        Ok(bytes) => {
                            current
                                .checksums
                                .insert("SHA1".to_string(), hex::encode(bytes));
                        }
                        Err(err) => debug!("undecodable apk checksum {value}: {err}"),
                    }
                } else if !value.is_empty() {
                    current
                        .checksums
                        .insert("MD5".to_string(), value.to_string());
                }
            }
            _ => {}
        }
    }
    flush(&mut current, &mut seen_any, &mut db);

    Ok(db)
}

impl OsPackageScanner for ApkScanner {
    fn purl_type(&self) -> &'static str {
        "apk"
    }

    fn os_kind(&self) -> OsKind {
        self.os
    }

    /// Read the last known changed copy of the apk database.
    fn read_os_packages(&self, layers: &[PathBuf]) -> Result<(usize, Vec<PackageDBEntry>), Error> {
        let mut database: Option<NamedTempFile> = None;
        let mut database_layer = 0;

        for (i, layer) in layers.iter().enumerate() {
            let candidate = NamedTempFile::new()?;
            match archive::extract_file(layer, APK_DB_PATH, candidate.path()) {
                Ok(()) => {
                    info!("layer {i} has a newer version of the apk database");
                    database = Some(candidate);
                    database_layer = i;
                }
                Err(ArchiveError::NotFound) => continue,
                Err(err) => return Err(err.into()),
            }
        }

        let Some(database) = database else {
            debug!("no apk database found in any layer");
            return Ok((0, Vec::new()));
        };

        let packages = self.parse_db(database.path())?;
        Ok((database_layer, packages))
    }
}
