//! The document builder: composes an SPDX document from input
//! specifications by driving the layer/OS scanners and the ecosystem
//! scanners, attaching subpackages and files with the right relationships.

pub mod archive;
pub mod builder;
pub mod options;

pub use archive::{ArchiveImageSource, ImageReferenceInfo, ImageSource, PulledImage};
pub use builder::DocBuilder;
pub use options::{GenerateOptions, MultiLangMode};

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
    #[error("operation cancelled")]
    Cancelled,
    #[error(transparent)]
    Archive(#[from] bomify_common::archive::ArchiveError),
    #[error(transparent)]
    Config(#[from] bomify_common::config::ConfigError),
    #[error(transparent)]
    Model(#[from] bomify_model::Error),
    #[error(transparent)]
    Scan(#[from] bomify_module_scan::Error),
    #[error(transparent)]
    License(#[from] bomify_license::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<bomify_module_lang::Error> for Error {
    fn from(err: bomify_module_lang::Error) -> Self {
        match err {
            bomify_module_lang::Error::Cancelled => Error::Cancelled,
            other => Error::Transport(other.to_string()),
        }
    }
}
