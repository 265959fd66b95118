use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use bomify_common::archive::{self, ArchiveError};
use log::{debug, info, warn};
use tempfile::TempDir;

use crate::entry::PackageDBEntry;
use crate::header::{self, RpmHeader};
use crate::os_release::OsKind;
use crate::{Error, OsPackageScanner};

/// Database files tried in order inside `var/lib/rpm`. A single layer
/// carries at most one format; the first present wins for that layer.
const RPM_DB_FILES: &[&str] = &[
    "rpmdb.sqlite", // sqlite
    "Packages.db",  // ndb
    "Packages",     // BerkeleyDB
];

/// Packages with no payload that only exist as database bookkeeping.
fn virtual_packages() -> &'static HashSet<&'static str> {
    static SET: OnceLock<HashSet<&'static str>> = OnceLock::new();
    SET.get_or_init(|| HashSet::from(["gpg-pubkey"]))
}

/// Scanner for the rpm database family (Fedora, CentOS, RHEL, Amazon).
pub struct RpmScanner {
    os: OsKind,
}

impl RpmScanner {
    pub fn new(os: OsKind) -> Self {
        Self { os }
    }

    /// Parse an rpm database file, dispatching on its filename.
    pub fn parse_db(&self, path: impl AsRef<Path>) -> Result<Vec<PackageDBEntry>, Error> {
        let path = path.as_ref();
        let headers = match path.file_name().and_then(|n| n.to_str()) {
            Some("rpmdb.sqlite") => read_sqlite(path)?,
            Some("Packages.db") => read_ndb(path)?,
            Some("Packages") => read_bdb(path)?,
            other => {
                return Err(Error::Parse(format!(
                    "unrecognized rpm database file: {other:?}"
                )))
            }
        };

        let mut packages = Vec::new();
        for header in headers {
            if virtual_packages().contains(header.name.as_str()) {
                continue;
            }
            packages.push(PackageDBEntry {
                package: header.name,
                version: format!("{}-{}", header.version, header.release),
                architecture: header.arch,
                purl_type: "rpm".to_string(),
                // most rpm packages carry license names that are not valid
                // SPDX expressions, so the license field stays empty
                maintainer_name: header.vendor,
                ..Default::default()
            });
        }
        Ok(packages)
    }
}

impl OsPackageScanner for RpmScanner {
    fn purl_type(&self) -> &'static str {
        "rpm"
    }

    fn os_kind(&self) -> OsKind {
        self.os
    }

    fn read_os_packages(&self, layers: &[PathBuf]) -> Result<(usize, Vec<PackageDBEntry>), Error> {
        let workspace = TempDir::new()?;
        let mut database: Option<PathBuf> = None;
        let mut database_layer = 0;

        for (i, layer) in layers.iter().enumerate() {
            for dbname in RPM_DB_FILES {
                let in_tar = format!("var/lib/rpm/{dbname}");
                if !archive::file_exists(layer, &[in_tar.as_str()])? {
                    continue;
                }
                let dest = workspace.path().join(format!("layer-{i}")).join(dbname);
                if let Some(parent) = dest.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                match archive::extract_file(layer, &in_tar, &dest) {
                    Ok(()) => {
                        info!("layer {i} has a newer version of the rpm database");
                        database = Some(dest);
                        database_layer = i;
                    }
                    Err(ArchiveError::NotFound) => continue,
                    Err(err) => return Err(err.into()),
                }
                // one database format per layer
                break;
            }
        }

        let Some(database) = database else {
            debug!("no rpm database found in any layer");
            return Ok((0, Vec::new()));
        };

        let packages = self.parse_db(&database)?;
        Ok((database_layer, packages))
    }
}

/// Modern rpm: a sqlite file with header blobs in the `Packages` table.
fn read_sqlite(path: &Path) -> Result<Vec<RpmHeader>, Error> {
    let conn = rusqlite::Connection::open_with_flags(
        path,
        rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY,
    )
    .map_err(|err| Error::Parse(format!("opening rpmdb.sqlite: {err}")))?;

    let mut stmt = conn
        .prepare("SELECT blob FROM Packages")
        .map_err(|err| Error::Parse(format!("querying rpm packages: {err}")))?;
    let blobs = stmt
        .query_map([], |row| row.get::<_, Vec<u8>>(0))
        .map_err(|err| Error::Parse(format!("reading rpm rows: {err}")))?;

    let mut headers = Vec::new();
    for blob in blobs {
        let blob = blob.map_err(|err| Error::Parse(format!("reading rpm blob: {err}")))?;
        match header::parse_header(&blob) {
            Ok(h) => headers.push(h),
            Err(err) => warn!("skipping undecodable rpm header: {err}"),
        }
    }
    Ok(headers)
}

/// rpm "ndb" backend: a 16-byte file header, slot pages of 16-byte slots
/// pointing at 16-byte-aligned blobs, each blob prefixed by a 16-byte
/// blob header.
fn read_ndb(path: &Path) -> Result<Vec<RpmHeader>, Error> {
    const SLOT_SIZE: usize = 16;
    const SLOT_MAGIC: u32 = u32::from_le_bytes(*b"Slot");
    const BLOB_MAGIC: u32 = u32::from_le_bytes(*b"BlbS");
    const NDB_MAGIC: u32 = u32::from_le_bytes(*b"RpmP");

    let data = std::fs::read(path)?;
    let le_u32 = |at: usize| -> Option<u32> {
        data.get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };

    if le_u32(0) != Some(NDB_MAGIC) {
        return Err(Error::Parse("not an rpm ndb database".into()));
    }
    let slot_npages = le_u32(12).unwrap_or_default() as usize;
    if slot_npages == 0 {
        return Ok(Vec::new());
    }

    let mut headers = Vec::new();
    let slots_end = (slot_npages * 4096).min(data.len());
    let mut at = SLOT_SIZE; // first slot follows the file header
    while at + SLOT_SIZE <= slots_end {
        let magic = le_u32(at);
        let pkg_index = le_u32(at + 4).unwrap_or_default();
        let blk_offset = le_u32(at + 8).unwrap_or_default() as usize;
        at += SLOT_SIZE;

        if magic != Some(SLOT_MAGIC) || pkg_index == 0 || blk_offset == 0 {
            continue;
        }

        let blob_at = blk_offset * SLOT_SIZE;
        if le_u32(blob_at) != Some(BLOB_MAGIC) {
            warn!("ndb slot for package {pkg_index} points at a bad blob");
            continue;
        }
        let blob_len = le_u32(blob_at + 12).unwrap_or_default() as usize;
        let Some(blob) = data.get(blob_at + SLOT_SIZE..blob_at + SLOT_SIZE + blob_len) else {
            warn!("ndb blob for package {pkg_index} is truncated");
            continue;
        };
        match header::parse_header(blob) {
            Ok(h) => headers.push(h),
            Err(err) => warn!("skipping undecodable ndb header: {err}"),
        }
    }
    Ok(headers)
}

/// Legacy rpm: a BerkeleyDB hash database. Values on hash pages are header
/// blobs, possibly spilled onto overflow page chains.
fn read_bdb(path: &Path) -> Result<Vec<RpmHeader>, Error> {
    const HASH_MAGIC: u32 = 0x0006_1561;
    const PAGE_HEADER_SIZE: usize = 26;
    const P_HASH: u8 = 13;
    const P_OVERFLOW: u8 = 7;
    const H_KEYDATA: u8 = 1;
    const H_OFFPAGE: u8 = 3;

    let data = std::fs::read(path)?;
    let le_u32 = |at: usize| -> Option<u32> {
        data.get(at..at + 4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    };
    let le_u16 = |at: usize| -> Option<u16> {
        data.get(at..at + 2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    };

    if le_u32(12) != Some(HASH_MAGIC) {
        return Err(Error::Parse("not a BerkeleyDB hash database".into()));
    }
    let page_size = le_u32(20).unwrap_or_default() as usize;
    if page_size == 0 || !page_size.is_power_of_two() {
        return Err(Error::Parse("bad BerkeleyDB page size".into()));
    }
    let last_pgno = le_u32(32).unwrap_or_default() as usize;

    // follow an overflow chain starting at pgno, collecting tlen bytes
    let read_offpage = |mut pgno: usize, tlen: usize| -> Option<Vec<u8>> {
        let mut out = Vec::with_capacity(tlen);
        while pgno != 0 && out.len() < tlen {
            let base = pgno * page_size;
            if *data.get(base + 25)? != P_OVERFLOW {
                return None;
            }
            let next = le_u32(base + 16)? as usize;
            let len = le_u16(base + 20)? as usize;
            out.extend_from_slice(data.get(base + PAGE_HEADER_SIZE..base + PAGE_HEADER_SIZE + len)?);
            pgno = next;
        }
        (out.len() >= tlen).then(|| {
            out.truncate(tlen);
            out
        })
    };

    let mut headers = Vec::new();
    for pgno in 1..=last_pgno {
        let base = pgno * page_size;
        if data.get(base + 25).copied() != Some(P_HASH) {
            continue;
        }
        let entries = le_u16(base + 20).unwrap_or_default() as usize;

        // entries alternate key/data; values are at odd indices
        for i in (1..entries).step_by(2) {
            let Some(item_at) = le_u16(base + PAGE_HEADER_SIZE + i * 2) else {
                continue;
            };
            let item_at = base + item_at as usize;
            let blob = match data.get(item_at).copied() {
                Some(H_KEYDATA) => {
                    // runs to the start of the previous item on the page
                    let prev = le_u16(base + PAGE_HEADER_SIZE + (i - 1) * 2)
                        .unwrap_or_default() as usize;
                    data.get(item_at + 1..base + prev).map(|b| b.to_vec())
                }
                Some(H_OFFPAGE) => {
                    let pg = le_u32(item_at + 4).unwrap_or_default() as usize;
                    let tlen = le_u32(item_at + 8).unwrap_or_default() as usize;
                    read_offpage(pg, tlen)
                }
                _ => None,
            };
            let Some(blob) = blob else { continue };
            match header::parse_header(&blob) {
                Ok(h) if !h.name.is_empty() => headers.push(h),
                Ok(_) => {}
                Err(err) => debug!("skipping undecodable bdb value: {err}"),
            }
        }
    }
    Ok(headers)
}
