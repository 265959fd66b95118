//! Scanners that read OS package databases out of OCI image layers.
//!
//! Layers arrive ordered base-first; every scanner takes the *last* layer
//! that carries its database, so the most recent package set wins.

pub mod apk;
pub mod distroless;
pub mod dpkg;
pub mod entry;
pub mod header;
pub mod os_release;
pub mod rpm;

use std::path::PathBuf;

pub use entry::PackageDBEntry;
pub use os_release::OsKind;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Archive(#[from] bomify_common::archive::ArchiveError),
    #[error("parsing package database: {0}")]
    Parse(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// A scanner for one family of OS package databases.
pub trait OsPackageScanner {
    /// purl type stamped on entries ("deb", "apk", "rpm").
    fn purl_type(&self) -> &'static str;

    /// The OS family this scanner handles.
    fn os_kind(&self) -> OsKind;

    /// Scan the ordered layer list and return the index of the layer the
    /// database was taken from plus the parsed entries. A missing database
    /// across all layers yields `(0, vec![])` without error.
    fn read_os_packages(&self, layers: &[PathBuf]) -> Result<(usize, Vec<PackageDBEntry>), Error>;
}

/// Select the scanner matching a detected OS family.
pub fn scanner_for(os: OsKind) -> Box<dyn OsPackageScanner> {
    match os {
        OsKind::Debian | OsKind::Ubuntu => Box::new(dpkg::DpkgScanner::new(os)),
        OsKind::Alpine | OsKind::Wolfi => Box::new(apk::ApkScanner::new(os)),
        OsKind::Fedora | OsKind::Centos | OsKind::Rhel | OsKind::AmazonLinux => {
            Box::new(rpm::RpmScanner::new(os))
        }
        OsKind::Distroless => Box::new(distroless::DistrolessScanner::new()),
    }
}

/// Identify the OS of an image and extract its package database.
///
/// The OS kind is the last non-empty detection across the layer sequence.
/// Unknown or undetected OSes yield `(None, 0, vec![])`.
pub fn read_os_packages(
    layers: &[PathBuf],
) -> Result<(Option<OsKind>, usize, Vec<PackageDBEntry>), Error> {
    let mut detected = None;
    for layer in layers {
        if let Some(os) = os_release::os_type(layer)? {
            detected = Some(os);
        }
    }

    let Some(os) = detected else {
        return Ok((None, 0, Vec::new()));
    };

    let (layer, mut entries) = scanner_for(os).read_os_packages(layers)?;
    for entry in &mut entries {
        entry.namespace = os.namespace().to_string();
    }
    Ok((Some(os), layer, entries))
}
