use std::path::{Path, PathBuf};

use log::info;
use sha2::{Digest, Sha256};

use crate::{Catalog, Error, DEFAULT_VERSION};

/// Where the license-list archive for a tag lives upstream.
fn archive_url(version: &str) -> String {
    format!("https://github.com/spdx/license-list-data/archive/refs/tags/{version}.zip")
}

#[derive(Clone, Debug)]
pub struct DownloaderOptions {
    /// Directory downloaded archives are cached in.
    pub cache_dir: PathBuf,
    /// License-list release tag to fetch.
    pub version: String,
}

impl Default for DownloaderOptions {
    fn default() -> Self {
        Self {
            cache_dir: std::env::temp_dir().join("bomify").join("license-cache"),
            version: DEFAULT_VERSION.to_string(),
        }
    }
}

/// Fetches and caches the license-list archive, handing out catalogs.
#[derive(Clone, Debug, Default)]
pub struct Downloader {
    pub options: DownloaderOptions,
}

impl Downloader {
    pub fn new(options: DownloaderOptions) -> Self {
        Self { options }
    }

    fn cache_path(&self, url: &str) -> PathBuf {
        let key = hex::encode(Sha256::digest(url.as_bytes()));
        self.options.cache_dir.join(key)
    }

    /// Store payload bytes for a URL in the cache directory.
    pub fn cache_data(&self, url: &str, data: &[u8]) -> Result<(), Error> {
        std::fs::create_dir_all(&self.options.cache_dir)?;
        std::fs::write(self.cache_path(url), data)?;
        Ok(())
    }

    /// Retrieve payload bytes for a URL from the cache, if present.
    pub fn cached_data(&self, url: &str) -> Result<Option<Vec<u8>>, Error> {
        let path = self.cache_path(url);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(std::fs::read(path)?))
    }

    /// Make sure the license-list archive for the configured version is on
    /// disk, downloading it on a cache miss, and return its path.
    pub async fn ensure_archive(&self) -> Result<PathBuf, Error> {
        let url = archive_url(&self.options.version);
        let path = self.cache_path(&url);
        if path.exists() {
            return Ok(path);
        }

        info!("downloading SPDX license list {}", self.options.version);
        let response = reqwest::get(&url)
            .await
            .map_err(|err| Error::Transport(err.to_string()))?
            .error_for_status()
            .map_err(|err| Error::Transport(err.to_string()))?;
        let data = response
            .bytes()
            .await
            .map_err(|err| Error::Transport(err.to_string()))?;

        self.cache_data(&url, &data)?;
        Ok(path)
    }

    /// Load the catalog, downloading the archive when needed.
    pub async fn catalog(&self) -> Result<Catalog, Error> {
        let path = self.ensure_archive().await?;
        load_catalog(&path)
    }
}

fn load_catalog(path: &Path) -> Result<Catalog, Error> {
    Catalog::from_archive(path)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn cache_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let downloader = Downloader::new(DownloaderOptions {
            cache_dir: dir.path().to_path_buf(),
            version: DEFAULT_VERSION.into(),
        });

        let url = "http://example.com/";
        let data = b"Testing 1,2,3";

        assert!(downloader.cached_data(url).unwrap().is_none());
        downloader.cache_data(url, data).unwrap();
        assert_eq!(Some(data.to_vec()), downloader.cached_data(url).unwrap());
    }
}
