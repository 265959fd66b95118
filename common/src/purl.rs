use std::collections::BTreeMap;
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use packageurl::PackageUrl;
use serde::de::{Error, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum PurlErr {
    #[error("missing version {0}")]
    MissingVersion(String),
    #[error("packageurl problem {0}")]
    Package(#[from] packageurl::Error),
}

/// The wildcard segment accepted by [`Purl::matches`] in query patterns.
pub const WILDCARD: &str = "*";

#[derive(Clone, PartialEq, Eq)]
pub struct Purl {
    pub ty: String,
    pub namespace: Option<String>,
    pub name: String,
    pub version: Option<String>,
    pub qualifiers: BTreeMap<String, String>,
}

impl Purl {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            namespace: None,
            name: name.into(),
            version: None,
            qualifiers: BTreeMap::new(),
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        let namespace = namespace.into();
        if !namespace.is_empty() {
            self.namespace = Some(namespace);
        }
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        let version = version.into();
        if !version.is_empty() {
            self.version = Some(version);
        }
        self
    }

    pub fn with_qualifier(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.qualifiers.insert(key.into(), value.into());
        self
    }

    /// Turn a query pattern into a full spec by replacing unset components
    /// with wildcards. Qualifiers are left as given.
    pub fn wildcardize(mut self) -> Self {
        if self.ty.is_empty() {
            self.ty = WILDCARD.into();
        }
        if self.name.is_empty() {
            self.name = WILDCARD.into();
        }
        if self.namespace.as_deref().unwrap_or_default().is_empty() {
            self.namespace = Some(WILDCARD.into());
        }
        if self.version.as_deref().unwrap_or_default().is_empty() {
            self.version = Some(WILDCARD.into());
        }
        self
    }

    /// Match this purl against a wildcard-completed spec.
    ///
    /// Every non-wildcard component of the spec must be equal. All spec
    /// qualifiers must be present with the same value; extra qualifiers on
    /// self are allowed.
    pub fn matches(&self, spec: &Purl) -> bool {
        let seg = |have: &str, want: &str| want == WILDCARD || have == want;

        if !seg(&self.ty, &spec.ty) {
            return false;
        }
        if !seg(
            self.namespace.as_deref().unwrap_or_default(),
            spec.namespace.as_deref().unwrap_or(WILDCARD),
        ) {
            return false;
        }
        if !seg(&self.name, &spec.name) {
            return false;
        }
        if !seg(
            self.version.as_deref().unwrap_or_default(),
            spec.version.as_deref().unwrap_or(WILDCARD),
        ) {
            return false;
        }

        for (k, v) in &spec.qualifiers {
            if self.qualifiers.get(k) != Some(v) {
                return false;
            }
        }

        true
    }
}

impl Serialize for Purl {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.to_string().as_str())
    }
}

impl FromStr for Purl {
    type Err = PurlErr;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PackageUrl::from_str(s)
            .map(Purl::from)
            .map_err(PurlErr::Package)
    }
}

impl<'de> Deserialize<'de> for Purl {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(PurlVisitor)
    }
}

struct PurlVisitor;

impl<'de> Visitor<'de> for PurlVisitor {
    type Value = Purl;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a pURL")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: Error,
    {
        v.try_into().map_err(Error::custom)
    }
}

impl Display for Purl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        // Delegate canonical encoding to the packageurl crate. Components
        // that cannot form a valid purl fall back to a plain join.
        if let Ok(mut purl) = PackageUrl::new(self.ty.clone(), self.name.clone()) {
            if let Some(ns) = &self.namespace {
                purl.with_namespace(ns.clone());
            }
            if let Some(version) = &self.version {
                purl.with_version(version.clone());
            }
            let mut ok = true;
            for (k, v) in &self.qualifiers {
                if purl.add_qualifier(k.clone(), v.clone()).is_err() {
                    ok = false;
                    break;
                }
            }
            if ok {
                return write!(f, "{}", purl);
            }
        }

        let ns = self
            .namespace
            .as_ref()
            .map(|ns| format!("/{ns}"))
            .unwrap_or_default();
        let version = self
            .version
            .as_ref()
            .map(|v| format!("@{v}"))
            .unwrap_or_default();
        let qualifiers = if self.qualifiers.is_empty() {
            String::new()
        } else {
            format!(
                "?{}",
                self.qualifiers
                    .iter()
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join("&")
            )
        };

        write!(
            f,
            "pkg:{}{}/{}{}{}",
            self.ty, ns, self.name, version, qualifiers
        )
    }
}

impl Debug for Purl {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self)
    }
}

impl TryFrom<&str> for Purl {
    type Error = PurlErr;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match PackageUrl::from_str(value) {
            Ok(s) => Ok(s.into()),
            Err(e) => Err(PurlErr::Package(e)),
        }
    }
}

impl TryFrom<String> for Purl {
    type Error = PurlErr;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

impl From<PackageUrl<'_>> for Purl {
    fn from(value: PackageUrl) -> Self {
        Self {
            ty: value.ty().to_string(),
            namespace: value.namespace().map(|inner| inner.to_string()),
            name: value.name().to_string(),
            version: value.version().map(|inner| inner.to_string()),
            qualifiers: value
                .qualifiers()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::str::FromStr;

    use crate::purl::Purl;

    #[test]
    fn purl_serde() {
        let purl: Purl = serde_json::from_str(
            r#"
            "pkg:deb/debian/libicu67@67.1-7?arch=s390x"
            "#,
        )
        .unwrap();

        assert_eq!("deb", purl.ty);
        assert_eq!(Some("debian".to_string()), purl.namespace);
        assert_eq!("libicu67", purl.name);
        assert_eq!(Some("67.1-7".to_string()), purl.version);
        assert_eq!(purl.qualifiers.get("arch"), Some(&"s390x".to_string()));
    }

    #[test]
    fn purl_build_round_trip() {
        let purl = Purl::new("cargo", "serde").with_version("1.0.204");
        assert_eq!("pkg:cargo/serde@1.0.204", purl.to_string());

        let parsed = Purl::from_str(&purl.to_string()).unwrap();
        assert_eq!(purl, parsed);
    }

    #[test]
    fn matches_wildcards() {
        let purl = Purl::from_str(
            "pkg:oci/nginx@sha256:4ed64c2e0857ad21c38b98345ebb5edb01791a0a10b0e9e3d9ddde185cdbd31a?repository_url=index.docker.io%2Flibrary&tag=nginx",
        )
        .unwrap();

        // everything unset matches
        assert!(purl.matches(&Purl::new("", "").wildcardize()));

        // exact same spec matches
        assert!(purl.matches(&purl.clone()));

        // different type does not
        let spec = Purl::new("docker", "nginx").wildcardize();
        assert!(!purl.matches(&spec));

        // qualifier subset rule
        let spec = Purl::new("oci", "*")
            .with_qualifier("repository_url", "index.docker.io/library")
            .wildcardize();
        assert!(purl.matches(&spec));

        let spec = Purl::new("oci", "*")
            .with_qualifier("repository_url", "gcr.io/project")
            .wildcardize();
        assert!(!purl.matches(&spec));
    }

    #[test]
    fn matches_progressive_relaxation() {
        let purl = Purl::from_str("pkg:deb/debian/perl-base@5.32.1-4+deb11u2?arch=amd64").unwrap();

        for spec in [
            Purl::new("deb", "perl-base")
                .with_namespace("debian")
                .with_version("5.32.1-4+deb11u2")
                .with_qualifier("arch", "amd64"),
            Purl::new("deb", "perl-base")
                .with_namespace("debian")
                .with_version("5.32.1-4+deb11u2"),
            Purl::new("deb", "perl-base").with_namespace("debian"),
            Purl::new("deb", "").with_namespace("debian"),
            Purl::new("deb", ""),
        ] {
            assert!(purl.matches(&spec.wildcardize()));
        }
    }
}
