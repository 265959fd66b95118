use std::collections::BTreeMap;

use bomify_common::purl::Purl;
use bomify_model::{Document, Element};
use regex::Regex;

use crate::Error;

/// The working set of a query: elements keyed by SPDX ID, plus the error
/// of the first failing filter.
pub struct FilterResults {
    pub objects: BTreeMap<String, Element>,
    pub error: Option<Error>,
}

impl FilterResults {
    /// Seed the set with the document's top-level elements.
    pub fn top_level(doc: &Document) -> Self {
        let objects = doc
            .roots()
            .iter()
            .filter_map(|id| doc.get(id).map(|e| (id.clone(), e.clone())))
            .collect();
        Self {
            objects,
            error: None,
        }
    }

    /// Run one filter over the set. Once a filter failed, the pipeline is
    /// stopped and the set stays as it was.
    pub fn apply(&mut self, doc: &Document, filter: &dyn Filter) -> &mut Self {
        if self.error.is_some() {
            return self;
        }
        match filter.apply(doc, &self.objects) {
            Ok(objects) => self.objects = objects,
            Err(err) => self.error = Some(err),
        }
        self
    }
}

/// One step of a query pipeline.
pub trait Filter {
    fn keyword(&self) -> &'static str;

    fn apply(
        &self,
        doc: &Document,
        objects: &BTreeMap<String, Element>,
    ) -> Result<BTreeMap<String, Element>, Error>;
}

/// Restrict the set to the elements reachable at exactly N hops from it
/// (0 = the set itself).
pub struct DepthFilter {
    pub target_depth: u32,
}

impl Filter for DepthFilter {
    fn keyword(&self) -> &'static str {
        "depth"
    }

    fn apply(
        &self,
        doc: &Document,
        objects: &BTreeMap<String, Element>,
    ) -> Result<BTreeMap<String, Element>, Error> {
        let mut layer = objects.clone();
        for _ in 0..self.target_depth {
            let mut next = BTreeMap::new();
            for element in layer.values() {
                for rel in &element.relationships {
                    let Some(peer) = &rel.peer else { continue };
                    if let Some(peer_element) = doc.get(peer) {
                        next.insert(peer.clone(), peer_element.clone());
                    }
                }
            }
            layer = next;
        }
        Ok(layer)
    }
}

/// Walk the graph below the working set, visited-set guarded, yielding
/// every reachable element exactly once.
fn reachable(doc: &Document, objects: &BTreeMap<String, Element>) -> Vec<(String, Element)> {
    let mut visited: std::collections::HashSet<String> = objects.keys().cloned().collect();
    let mut stack: Vec<String> = Vec::new();
    let mut out: Vec<(String, Element)> =
        objects.iter().map(|(id, e)| (id.clone(), e.clone())).collect();

    for element in objects.values() {
        for rel in &element.relationships {
            if let Some(peer) = &rel.peer {
                stack.push(peer.clone());
            }
        }
    }
    while let Some(id) = stack.pop() {
        if !visited.insert(id.clone()) {
            continue;
        }
        let Some(element) = doc.get(&id) else { continue };
        for rel in &element.relationships {
            if let Some(peer) = &rel.peer {
                stack.push(peer.clone());
            }
        }
        out.push((id, element.clone()));
    }
    out
}

/// Keep elements anywhere below the working set whose name matches a
/// regular expression; packages match on their name, files on their file
/// name.
pub struct NameFilter {
    pub pattern: String,
}

impl Filter for NameFilter {
    fn keyword(&self) -> &'static str {
        "name"
    }

    fn apply(
        &self,
        doc: &Document,
        objects: &BTreeMap<String, Element>,
    ) -> Result<BTreeMap<String, Element>, Error> {
        let re = Regex::new(&self.pattern)
            .map_err(|err| Error::Parse(format!("invalid name pattern: {err}")))?;
        Ok(reachable(doc, objects)
            .into_iter()
            .filter(|(_, element)| re.is_match(element.display_name()) || re.is_match(&element.name))
            .collect())
    }
}

/// Keep packages whose purl matches a wildcard pattern. Components missing
/// from the pattern default to `*`; all pattern qualifiers must match,
/// extra qualifiers on the candidate are allowed.
pub struct PurlFilter {
    pub pattern: String,
}

impl PurlFilter {
    /// Parse a purl query pattern. The stock purl parser rejects wildcard
    /// segments, so patterns are split by hand.
    fn parse_pattern(&self) -> Result<Purl, Error> {
        let rest = self
            .pattern
            .strip_prefix("pkg:")
            .ok_or_else(|| Error::Parse(format!("invalid purl pattern: {}", self.pattern)))?;

        let (rest, qualifiers) = match rest.split_once('?') {
            Some((rest, qualifiers)) => (rest, Some(qualifiers)),
            None => (rest, None),
        };
        let (rest, version) = match rest.rsplit_once('@') {
            Some((rest, version)) => (rest, Some(version)),
            None => (rest, None),
        };

        let segments: Vec<&str> = rest.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return Err(Error::Parse(format!(
                "invalid purl pattern: {}",
                self.pattern
            )));
        }
        let ty = segments[0];
        let name = segments[segments.len() - 1];
        let namespace = segments[1..segments.len() - 1].join("/");

        let mut purl = Purl::new(ty, decode(name)).with_namespace(decode(&namespace));
        if let Some(version) = version {
            purl = purl.with_version(decode(version));
        }
        if let Some(qualifiers) = qualifiers {
            for pair in qualifiers.split('&') {
                if let Some((k, v)) = pair.split_once('=') {
                    purl = purl.with_qualifier(k, decode(v));
                }
            }
        }
        Ok(purl.wildcardize())
    }
}

/// Minimal percent-decoding for pattern segments.
fn decode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut bytes = s.bytes();
    while let Some(b) = bytes.next() {
        if b == b'%' {
            let hi = bytes.next();
            let lo = bytes.next();
            if let (Some(hi), Some(lo)) = (hi, lo) {
                if let Ok(byte) = u8::from_str_radix(&format!("{}{}", hi as char, lo as char), 16)
                {
                    out.push(byte as char);
                    continue;
                }
            }
            out.push('%');
        } else {
            out.push(b as char);
        }
    }
    out
}

impl Filter for PurlFilter {
    fn keyword(&self) -> &'static str {
        "purl"
    }

    fn apply(
        &self,
        doc: &Document,
        objects: &BTreeMap<String, Element>,
    ) -> Result<BTreeMap<String, Element>, Error> {
        let spec = self.parse_pattern()?;
        Ok(reachable(doc, objects)
            .into_iter()
            .filter(|(_, element)| element.purl_matches(&spec))
            .collect())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pattern_parsing_completes_wildcards() {
        let filter = PurlFilter {
            pattern: "pkg:oci/*/*?repository_url=gcr.io%2Fproject".into(),
        };
        let spec = filter.parse_pattern().unwrap();
        assert_eq!("oci", spec.ty);
        assert_eq!("*", spec.name);
        assert_eq!(Some("*"), spec.namespace.as_deref());
        assert_eq!(Some("*"), spec.version.as_deref());
        assert_eq!(
            Some(&"gcr.io/project".to_string()),
            spec.qualifiers.get("repository_url")
        );
    }

    #[test]
    fn bad_pattern_is_an_error() {
        let filter = PurlFilter {
            pattern: "sdlkfjlskdjf".into(),
        };
        assert!(filter.parse_pattern().is_err());
    }

    #[test]
    fn version_pattern_keeps_digest() {
        let filter = PurlFilter {
            pattern: "pkg:oci/*/*@sha256:abc123".into(),
        };
        let spec = filter.parse_pattern().unwrap();
        assert_eq!(Some("sha256:abc123"), spec.version.as_deref());
    }
}
