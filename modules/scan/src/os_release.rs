use std::path::Path;

use bomify_common::archive::{self, ArchiveError};
use log::{debug, info};
use tempfile::NamedTempFile;

use crate::Error;

pub const OS_RELEASE_PATH: &str = "etc/os-release";
/// In distroless images `/etc/os-release` is a symlink into usr/lib that
/// later layers rewrite, so the real file is probed as a fallback.
pub const ALT_OS_RELEASE_PATH: &str = "usr/lib/os-release";

/// The OS families recognized in container layers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum OsKind {
    Alpine,
    AmazonLinux,
    Centos,
    Debian,
    Distroless,
    Fedora,
    Rhel,
    Ubuntu,
    Wolfi,
}

impl OsKind {
    /// The purl namespace entries of this OS carry.
    pub fn namespace(&self) -> &'static str {
        match self {
            OsKind::Alpine => "alpine",
            OsKind::AmazonLinux => "amazonlinux",
            OsKind::Centos => "centos",
            OsKind::Debian => "debian",
            OsKind::Distroless => "debian",
            OsKind::Fedora => "fedora",
            OsKind::Rhel => "rhel",
            OsKind::Ubuntu => "ubuntu",
            OsKind::Wolfi => "wolfi",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            OsKind::Distroless => "distroless",
            other => other.namespace(),
        }
    }
}

/// Read the os-release contents of a layer, probing the alternate path
/// when the primary one is missing. `None` when the layer has neither.
pub fn os_release_data(layer: impl AsRef<Path>) -> Result<Option<String>, Error> {
    let temp = NamedTempFile::new()?;

    match archive::extract_file(&layer, OS_RELEASE_PATH, temp.path()) {
        Ok(()) => {}
        Err(ArchiveError::NotFound) => {
            match archive::extract_file(&layer, ALT_OS_RELEASE_PATH, temp.path()) {
                Ok(()) => {}
                Err(ArchiveError::NotFound) => return Ok(None),
                Err(err) => return Err(err.into()),
            }
        }
        Err(err) => return Err(err.into()),
    }

    Ok(Some(std::fs::read_to_string(temp.path())?))
}

/// Identify the OS family a layer is based on, `None` when undetected.
///
/// The distroless identifier lives in `PRETTY_NAME` while `NAME` still
/// carries the distro it was built from, so that probe runs first.
pub fn os_type(layer: impl AsRef<Path>) -> Result<Option<OsKind>, Error> {
    let Some(osrelease) = os_release_data(layer)? else {
        return Ok(None);
    };
    if osrelease.is_empty() {
        return Ok(None);
    }
    debug!("os-release contents:\n{osrelease}");

    if osrelease.contains("PRETTY_NAME=\"Distroless") {
        info!("scan of container layers found distroless base image");
        return Ok(Some(OsKind::Distroless));
    }

    let matchers: &[(&str, OsKind)] = &[
        ("NAME=\"Debian GNU", OsKind::Debian),
        ("NAME=\"Ubuntu\"", OsKind::Ubuntu),
        ("NAME=\"Fedora Linux\"", OsKind::Fedora),
        ("NAME=\"CentOS Linux\"", OsKind::Centos),
        ("NAME=\"Red Hat Enterprise Linux\"", OsKind::Rhel),
        ("NAME=\"Alpine Linux\"", OsKind::Alpine),
        ("NAME=\"Wolfi\"", OsKind::Wolfi),
        ("NAME=\"Amazon Linux\"", OsKind::AmazonLinux),
    ];
    for (needle, os) in matchers {
        if osrelease.contains(needle) {
            return Ok(Some(*os));
        }
    }

    Ok(None)
}
