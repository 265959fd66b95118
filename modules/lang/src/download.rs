use std::io::Write;
use std::path::Path;

use bomify_common::archive::{self, ExtractOptions};
use futures::StreamExt;
use log::debug;
use tempfile::NamedTempFile;
use tokio_util::sync::CancellationToken;

use crate::Error;

/// Hard cap for one downloaded file, decompressed.
pub const MAX_DOWNLOAD_SIZE: u64 = 100 * 1024 * 1024;

/// Fetch a URL into memory, honoring cancellation and the size budget.
pub async fn fetch_bytes(url: &str, cancel: &CancellationToken) -> Result<Vec<u8>, Error> {
    let response = tokio::select! {
        _ = cancel.cancelled() => return Err(Error::Cancelled),
        response = reqwest::get(url) => response.map_err(|err| Error::Transport(err.to_string()))?,
    };
    if response.status() == reqwest::StatusCode::NOT_FOUND {
        return Err(Error::NotFound(url.to_string()));
    }
    let response = response
        .error_for_status()
        .map_err(|err| Error::Transport(err.to_string()))?;

    let mut data = Vec::new();
    let mut stream = response.bytes_stream();
    loop {
        let chunk = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            chunk = stream.next() => chunk,
        };
        match chunk {
            Some(chunk) => {
                let chunk = chunk.map_err(|err| Error::Transport(err.to_string()))?;
                if data.len() as u64 + chunk.len() as u64 > MAX_DOWNLOAD_SIZE {
                    return Err(Error::TooLarge(url.to_string()));
                }
                data.extend_from_slice(&chunk);
            }
            None => return Ok(data),
        }
    }
}

/// Download a gzipped source tarball and extract it, stripping the single
/// top-level `pkg-version/` prefix and enforcing path containment.
pub async fn download_tarball(
    url: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let data = fetch_bytes(url, cancel).await?;
    let dest = dest.to_path_buf();

    let extracted = tokio::task::spawn_blocking(move || -> Result<(), Error> {
        let mut temp = NamedTempFile::new()?;
        temp.write_all(&data)?;
        temp.flush()?;
        archive::extract_all(
            temp.path(),
            &dest,
            ExtractOptions {
                strip_top_level: true,
                max_file_size: Some(MAX_DOWNLOAD_SIZE),
            },
        )?;
        Ok(())
    })
    .await
    .map_err(|err| Error::Transport(err.to_string()))?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    extracted
}

/// Download a zip archive (Go module zips) and extract it with the same
/// top-prefix strip and containment rules.
pub async fn download_zip(
    url: &str,
    dest: &Path,
    cancel: &CancellationToken,
) -> Result<(), Error> {
    let data = fetch_bytes(url, cancel).await?;
    let dest = dest.to_path_buf();

    let extracted = tokio::task::spawn_blocking(move || -> Result<(), Error> {
        let reader = std::io::Cursor::new(data);
        let mut zip = zip::ZipArchive::new(reader)
            .map_err(|err| Error::Parse(format!("opening module zip: {err}")))?;

        for i in 0..zip.len() {
            let mut entry = zip
                .by_index(i)
                .map_err(|err| Error::Parse(format!("reading module zip: {err}")))?;
            if entry.is_dir() {
                continue;
            }
            if entry.size() > MAX_DOWNLOAD_SIZE {
                return Err(Error::TooLarge(entry.name().to_string()));
            }
            // strip the single "module@version/" top-level prefix
            let name = entry.name().to_string();
            let Some((_, rest)) = name.split_once('/') else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            let Some(target) = sanitized_join(&dest, rest) else {
                return Err(Error::Parse(format!("zip entry escapes root: {name}")));
            };
            if let Some(parent) = target.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut out = std::fs::File::create(&target)?;
            std::io::copy(&mut entry, &mut out)?;
        }
        Ok(())
    })
    .await
    .map_err(|err| Error::Transport(err.to_string()))?;

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    extracted
}

fn sanitized_join(root: &Path, rel: &str) -> Option<std::path::PathBuf> {
    let mut out = root.to_path_buf();
    for part in Path::new(rel).components() {
        match part {
            std::path::Component::Normal(seg) => out.push(seg),
            std::path::Component::CurDir => {}
            _ => return None,
        }
    }
    Some(out)
}

/// Remove the scanner-owned downloads of a package list.
pub fn remove_downloads(packages: &mut [crate::LangPackage]) -> Result<(), Error> {
    for pkg in packages {
        if let Some(dir) = &pkg.local_dir {
            if pkg.tmp_dir && dir.exists() {
                debug!("removing downloaded data of {}", pkg.name);
                std::fs::remove_dir_all(dir)?;
            }
            pkg.local_dir = None;
            pkg.tmp_dir = false;
        }
    }
    Ok(())
}
