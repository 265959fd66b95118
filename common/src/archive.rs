use std::fs::{self, File};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Component, Path, PathBuf};

use flate2::read::GzDecoder;
use log::debug;

/// Gzip stream magic, from RFC 1952.
const GZIP_MAGIC: [u8; 3] = [0x1f, 0x8b, 0x08];

/// Copy chunk used when writing entry bodies.
const COPY_CHUNK: usize = 1024;

/// Symlink hop budget when resolving in-tar links.
const MAX_LINK_HOPS: usize = 16;

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("file not found in tarball")]
    NotFound,
    #[error("entry {0} escapes the extraction root")]
    PathEscape(String),
    #[error("entry {0} exceeds the size limit")]
    TooLarge(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Check whether a stream starts with the gzip magic bytes.
pub fn is_gzip_stream(r: &mut (impl Read + Seek)) -> std::io::Result<bool> {
    let mut sample = [0u8; 3];
    let mut read = 0;
    while read < sample.len() {
        let n = r.read(&mut sample[read..])?;
        if n == 0 {
            break;
        }
        read += n;
    }
    r.seek(SeekFrom::Start(0))?;
    Ok(read == sample.len() && sample == GZIP_MAGIC)
}

/// Open a tar archive, transparently decoding gzip when the magic matches.
fn open_tar(path: &Path) -> Result<tar::Archive<Box<dyn Read>>, ArchiveError> {
    let mut file = File::open(path)?;
    let gzipped = is_gzip_stream(&mut file)?;
    let reader: Box<dyn Read> = if gzipped {
        Box::new(GzDecoder::new(file))
    } else {
        Box::new(file)
    };
    Ok(tar::Archive::new(reader))
}

fn entry_name(path: &Path) -> String {
    let name = path.to_string_lossy();
    name.strip_prefix("./").unwrap_or(&name).to_string()
}

/// Resolve a symlink target against the directory of the entry holding it.
fn resolve_link(entry_path: &str, link: &Path) -> String {
    if link.is_absolute() {
        return entry_name(link);
    }
    let parent = Path::new(entry_path).parent().unwrap_or(Path::new(""));
    normalize(&parent.join(link))
        .map(|p| p.to_string_lossy().to_string())
        .unwrap_or_else(|| entry_name(link))
}

/// Lexically normalize a relative path, returning `None` when it escapes
/// upward past its root.
fn normalize(path: &Path) -> Option<PathBuf> {
    let mut stack: Vec<&std::ffi::OsStr> = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(seg) => stack.push(seg),
            Component::ParentDir => {
                stack.pop()?;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }
    Some(stack.iter().collect())
}

/// Join an entry path under an extraction root, refusing escapes.
fn sanitized_join(root: &Path, rel: &str) -> Result<PathBuf, ArchiveError> {
    match normalize(Path::new(rel)) {
        Some(clean) => Ok(root.join(clean)),
        None => Err(ArchiveError::PathEscape(rel.to_string())),
    }
}

fn copy_chunked(mut from: impl Read, mut to: impl Write) -> std::io::Result<u64> {
    let mut buf = [0u8; COPY_CHUNK];
    let mut total = 0;
    loop {
        let n = from.read(&mut buf)?;
        if n == 0 {
            return Ok(total);
        }
        to.write_all(&buf[..n])?;
        total += n as u64;
    }
}

/// Check whether any of the candidate paths exists in the tarball,
/// following in-tar symlinks.
pub fn file_exists(
    tar_path: impl AsRef<Path>,
    candidates: &[&str],
) -> Result<bool, ArchiveError> {
    file_exists_hops(tar_path.as_ref(), candidates, 0)
}

fn file_exists_hops(
    tar_path: &Path,
    candidates: &[&str],
    hops: usize,
) -> Result<bool, ArchiveError> {
    if hops > MAX_LINK_HOPS {
        return Ok(false);
    }
    let wanted: Vec<String> = candidates
        .iter()
        .map(|c| c.trim_start_matches("./").to_string())
        .collect();

    let mut archive = open_tar(tar_path)?;
    for entry in archive.entries()? {
        let entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let name = entry_name(&entry.path()?);
        if !wanted.iter().any(|w| *w == name) {
            continue;
        }
        if entry.header().entry_type().is_symlink() {
            if let Some(link) = entry.link_name()? {
                let target = resolve_link(&name, &link);
                debug!("{name} is a symlink, following to {target}");
                return file_exists_hops(tar_path, &[target.as_str()], hops + 1);
            }
        }
        return Ok(true);
    }
    Ok(false)
}

/// Extract a single file from the tarball to `dest`, following in-tar
/// symlinks. Fails with [`ArchiveError::NotFound`] when no entry matches.
pub fn extract_file(
    tar_path: impl AsRef<Path>,
    file_path: &str,
    dest: impl AsRef<Path>,
) -> Result<(), ArchiveError> {
    extract_file_hops(tar_path.as_ref(), file_path, dest.as_ref(), 0)
}

fn extract_file_hops(
    tar_path: &Path,
    file_path: &str,
    dest: &Path,
    hops: usize,
) -> Result<(), ArchiveError> {
    if hops > MAX_LINK_HOPS {
        return Err(ArchiveError::NotFound);
    }
    let wanted = file_path.trim_start_matches("./");

    let mut archive = open_tar(tar_path)?;
    for entry in archive.entries()? {
        let mut entry = entry?;
        if entry.header().entry_type().is_dir() {
            continue;
        }
        let name = entry_name(&entry.path()?);
        if name != wanted {
            continue;
        }
        if entry.header().entry_type().is_symlink() {
            if let Some(link) = entry.link_name()? {
                let target = resolve_link(&name, &link);
                debug!("{name} is a symlink, following to {target}");
                return extract_file_hops(tar_path, &target, dest, hops + 1);
            }
        }
        let mut out = File::create(dest)?;
        copy_chunked(&mut entry, &mut out)?;
        return Ok(());
    }
    Err(ArchiveError::NotFound)
}

/// Extract every regular file under `dir_prefix` into `dest_root`, creating
/// parent directories as needed. Symlinks are skipped. Entries resolving
/// outside `dest_root` are refused.
pub fn extract_dir(
    tar_path: impl AsRef<Path>,
    dir_prefix: &str,
    dest_root: impl AsRef<Path>,
) -> Result<(), ArchiveError> {
    let dest_root = dest_root.as_ref();
    let prefix = dir_prefix.trim_start_matches("./");

    let mut found_some = false;
    let mut archive = open_tar(tar_path.as_ref())?;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if kind.is_dir() || kind.is_symlink() {
            continue;
        }
        let name = entry_name(&entry.path()?);
        if !name.starts_with(prefix) {
            continue;
        }
        found_some = true;

        let target = sanitized_join(dest_root, &name)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        copy_chunked(&mut entry, &mut out)?;
    }

    if found_some {
        Ok(())
    } else {
        Err(ArchiveError::NotFound)
    }
}

/// Options for whole-archive extraction.
#[derive(Clone, Copy, Debug, Default)]
pub struct ExtractOptions {
    /// Drop the single top-level directory of the archive
    /// (`pkg-version/...` → `...`).
    pub strip_top_level: bool,
    /// Reject single files larger than this many bytes.
    pub max_file_size: Option<u64>,
}

/// Extract all regular files of the tarball into `dest_root`.
pub fn extract_all(
    tar_path: impl AsRef<Path>,
    dest_root: impl AsRef<Path>,
    opts: ExtractOptions,
) -> Result<(), ArchiveError> {
    let dest_root = dest_root.as_ref();

    let mut archive = open_tar(tar_path.as_ref())?;
    for entry in archive.entries()? {
        let mut entry = entry?;
        let kind = entry.header().entry_type();
        if kind.is_dir() || kind.is_symlink() {
            continue;
        }
        let mut name = entry_name(&entry.path()?);
        if opts.strip_top_level {
            name = match name.split_once('/') {
                Some((_, rest)) if !rest.is_empty() => rest.to_string(),
                _ => continue,
            };
        }
        if let Some(limit) = opts.max_file_size {
            if entry.header().size()? > limit {
                return Err(ArchiveError::TooLarge(name));
            }
        }

        let target = sanitized_join(dest_root, &name)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        copy_chunked(&mut entry, &mut out)?;
    }
    Ok(())
}
