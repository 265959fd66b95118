//! Reader for rpm header import blobs, the value format shared by all
//! three rpm database backends (sqlite, ndb, BerkeleyDB).
//!
//! A blob is `[il: i32be][dl: i32be]` followed by `il` 16-byte index
//! entries `(tag, type, offset, count)` and a `dl`-byte data store.

use std::collections::HashMap;

use crate::Error;

pub const TAG_NAME: i32 = 1000;
pub const TAG_VERSION: i32 = 1001;
pub const TAG_RELEASE: i32 = 1002;
pub const TAG_VENDOR: i32 = 1011;
pub const TAG_ARCH: i32 = 1022;

const TYPE_STRING: u32 = 6;
const TYPE_I18NSTRING: u32 = 9;

/// The package fields bomify extracts from an rpm header.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RpmHeader {
    pub name: String,
    pub version: String,
    pub release: String,
    pub arch: String,
    pub vendor: String,
}

fn be_i32(data: &[u8], at: usize) -> Option<i32> {
    data.get(at..at + 4)
        .map(|b| i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn be_u32(data: &[u8], at: usize) -> Option<u32> {
    data.get(at..at + 4)
        .map(|b| u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
}

fn store_string(store: &[u8], offset: usize) -> Option<String> {
    let tail = store.get(offset..)?;
    let end = tail.iter().position(|&b| b == 0)?;
    Some(String::from_utf8_lossy(&tail[..end]).to_string())
}

/// Parse a header import blob into the fields of interest.
pub fn parse_header(blob: &[u8]) -> Result<RpmHeader, Error> {
    let il = be_i32(blob, 0).ok_or_else(|| Error::Parse("truncated rpm header".into()))?;
    let dl = be_i32(blob, 4).ok_or_else(|| Error::Parse("truncated rpm header".into()))?;
    if il < 0 || dl < 0 {
        return Err(Error::Parse("negative rpm header lengths".into()));
    }
    let il = il as usize;
    let dl = dl as usize;

    let index_end = 8 + il * 16;
    let store = blob
        .get(index_end..index_end + dl)
        .ok_or_else(|| Error::Parse("rpm header store out of bounds".into()))?;

    let mut strings: HashMap<i32, String> = HashMap::new();
    for i in 0..il {
        let at = 8 + i * 16;
        let (Some(tag), Some(ty), Some(offset)) =
            (be_i32(blob, at), be_u32(blob, at + 4), be_i32(blob, at + 8))
        else {
            return Err(Error::Parse("truncated rpm index entry".into()));
        };
        if offset < 0 {
            continue;
        }
        let wanted = matches!(
            tag,
            TAG_NAME | TAG_VERSION | TAG_RELEASE | TAG_VENDOR | TAG_ARCH
        );
        if !wanted || !matches!(ty, TYPE_STRING | TYPE_I18NSTRING) {
            continue;
        }
        if let Some(value) = store_string(store, offset as usize) {
            strings.insert(tag, value);
        }
    }

    Ok(RpmHeader {
        name: strings.remove(&TAG_NAME).unwrap_or_default(),
        version: strings.remove(&TAG_VERSION).unwrap_or_default(),
        release: strings.remove(&TAG_RELEASE).unwrap_or_default(),
        arch: strings.remove(&TAG_ARCH).unwrap_or_default(),
        vendor: strings.remove(&TAG_VENDOR).unwrap_or_default(),
    })
}

#[cfg(test)]
pub(crate) mod test {
    use super::*;

    /// Build a header import blob from string tags.
    pub(crate) fn blob_from(tags: &[(i32, &str)]) -> Vec<u8> {
        let mut store = Vec::new();
        let mut index = Vec::new();
        for (tag, value) in tags {
            let offset = store.len() as i32;
            store.extend_from_slice(value.as_bytes());
            store.push(0);
            index.extend_from_slice(&tag.to_be_bytes());
            index.extend_from_slice(&TYPE_STRING.to_be_bytes());
            index.extend_from_slice(&offset.to_be_bytes());
            index.extend_from_slice(&1u32.to_be_bytes());
        }

        let mut blob = Vec::new();
        blob.extend_from_slice(&(tags.len() as i32).to_be_bytes());
        blob.extend_from_slice(&(store.len() as i32).to_be_bytes());
        blob.extend_from_slice(&index);
        blob.extend_from_slice(&store);
        blob
    }

    #[test]
    fn parses_string_tags() {
        let blob = blob_from(&[
            (TAG_NAME, "bash"),
            (TAG_VERSION, "5.1.8"),
            (TAG_RELEASE, "6.el9"),
            (TAG_ARCH, "x86_64"),
            (TAG_VENDOR, "Red Hat, Inc."),
        ]);
        let header = parse_header(&blob).unwrap();
        assert_eq!("bash", header.name);
        assert_eq!("5.1.8", header.version);
        assert_eq!("6.el9", header.release);
        assert_eq!("x86_64", header.arch);
        assert_eq!("Red Hat, Inc.", header.vendor);
    }

    #[test]
    fn truncated_blob_errors() {
        assert!(parse_header(&[0, 0]).is_err());

        // index promises more data than present
        let mut blob = Vec::new();
        blob.extend_from_slice(&10i32.to_be_bytes());
        blob.extend_from_slice(&100i32.to_be_bytes());
        assert!(parse_header(&blob).is_err());
    }
}
