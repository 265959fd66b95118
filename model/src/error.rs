#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("file {0} carries no SHA-1 digest")]
    MissingDigest(String),
    #[error("duplicate SPDX identifier {0}")]
    DuplicateId(String),
    #[error("relationship error: {0}")]
    Relationship(String),
    #[error("serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
