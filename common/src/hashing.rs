use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha1::Sha1;
use sha2::{Digest, Sha256, Sha512};
use tracing::instrument;

/// A reader wrapper computing the SPDX digest set in one pass.
pub struct HashingRead<R: Read> {
    inner: R,
    contexts: Contexts,
}

pub struct Contexts {
    sha1: Sha1,
    sha256: Sha256,
    sha512: Sha512,
    size: u64,
}

impl Contexts {
    pub fn new() -> Self {
        Self {
            sha1: Sha1::new(),
            sha256: Sha256::new(),
            sha512: Sha512::new(),
            size: 0,
        }
    }

    pub fn update(&mut self, data: &[u8]) {
        self.sha1.update(data);
        self.sha256.update(data);
        self.sha512.update(data);
        self.size += data.len() as u64;
    }

    pub fn digests(&self) -> Digests {
        Digests {
            sha1: hex::encode(self.sha1.clone().finalize()),
            sha256: hex::encode(self.sha256.clone().finalize()),
            sha512: hex::encode(self.sha512.clone().finalize()),
            size: self.size,
        }
    }

    pub fn finish(self) -> Digests {
        Digests {
            sha1: hex::encode(self.sha1.finalize()),
            sha256: hex::encode(self.sha256.finalize()),
            sha512: hex::encode(self.sha512.finalize()),
            size: self.size,
        }
    }
}

impl Default for Contexts {
    fn default() -> Self {
        Self::new()
    }
}

/// Lower-hex digests of a byte stream.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Digests {
    pub sha1: String,
    pub sha256: String,
    pub sha512: String,
    pub size: u64,
}

impl Digests {
    #[instrument(skip_all, fields(len = data.as_ref().len()))]
    pub fn digest(data: impl AsRef<[u8]>) -> Self {
        let mut contexts = Contexts::new();
        contexts.update(data.as_ref());
        contexts.finish()
    }

    /// Digest a file from disk.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let reader = HashingRead::new(BufReader::new(File::open(path)?));
        reader.finish()
    }
}

impl<R: Read> HashingRead<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            contexts: Contexts::new(),
        }
    }

    /// Returns the current digests of the **data read so far**.
    pub fn digests(&self) -> Digests {
        self.contexts.digests()
    }

    /// Finishes reading all data from the inner reader and returns the digests.
    /// Takes ownership of self to prevent misuse.
    pub fn finish(mut self) -> std::io::Result<Digests> {
        let mut buf = [0u8; 8192];
        loop {
            if self.read(&mut buf)? == 0 {
                break;
            }
        }
        Ok(self.contexts.finish())
    }
}

impl<R: Read> Read for HashingRead<R> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let len = self.inner.read(buf)?;
        self.contexts.update(&buf[0..len]);
        Ok(len)
    }
}
