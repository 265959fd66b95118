//! The SPDX license-list catalog and a small directory classifier.
//!
//! The catalog is fed from the license-list-data archive (a zip whose
//! entries match `license-list-data-<tag>/json/licenses.json` plus
//! `json/details/*.json`). The reader walks a package directory, finds
//! license files and reports the best catalog match together with the
//! copyright text. That "directory in, license id + copyright out"
//! contract is what the ecosystem scanners rely on.

pub mod catalog;
pub mod downloader;
pub mod reader;

pub use catalog::{Catalog, License};
pub use downloader::{Downloader, DownloaderOptions};
pub use reader::{LicenseResult, Reader, ReaderOptions};

/// License-list release tag baked in per bomify release.
pub const DEFAULT_VERSION: &str = "v3.23";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("license archive entry not found: {0}")]
    NotFound(String),
    #[error("parsing license data: {0}")]
    Parse(String),
    #[error("fetching license data: {0}")]
    Transport(String),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
