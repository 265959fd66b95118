use std::collections::BTreeMap;

use bomify_common::purl::Purl;
use bomify_model::{Actor, Element, ExternalRef};

/// One record of an installed-package database, normalized across the
/// dpkg/apk/rpm formats.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PackageDBEntry {
    pub package: String,
    pub version: String,
    pub architecture: String,
    /// purl type ("deb", "apk", "rpm"), stamped by the scanner.
    pub purl_type: String,
    /// purl namespace (OS kind), stamped by the dispatcher.
    pub namespace: String,
    pub maintainer_name: String,
    pub maintainer_email: String,
    pub homepage: String,
    pub license: String,
    pub checksums: BTreeMap<String, String>,
}

impl PackageDBEntry {
    /// The canonical purl, or `None` when name or version is missing.
    pub fn package_url(&self) -> Option<String> {
        if self.package.is_empty() || self.version.is_empty() {
            return None;
        }
        let mut purl = Purl::new(self.purl_type.clone(), self.package.clone())
            .with_namespace(self.namespace.clone())
            .with_version(self.version.clone());
        if !self.architecture.is_empty() {
            purl = purl.with_qualifier("arch", self.architecture.clone());
        }
        Some(purl.to_string())
    }

    /// Where the package can be fetched from, when the OS has a stable
    /// download layout.
    pub fn download_location(&self) -> String {
        match self.namespace.as_str() {
            // Debian pool layout: first letter, or the libX prefix
            "debian" | "ubuntu" => {
                if self.package.is_empty() {
                    return String::new();
                }
                let prefix = if self.package.starts_with("lib") && self.package.len() >= 4 {
                    self.package[..4].to_string()
                } else {
                    self.package[..1].to_string()
                };
                format!(
                    "https://ftp.debian.org/debian/pool/main/{prefix}/{}/",
                    self.package
                )
            }
            "wolfi" => {
                if self.package.is_empty() || self.version.is_empty() {
                    return String::new();
                }
                let arch = if self.architecture.is_empty() {
                    "x86_64"
                } else {
                    &self.architecture
                };
                format!(
                    "https://packages.wolfi.dev/os/{arch}/{}-{}.apk",
                    self.package, self.version
                )
            }
            _ => String::new(),
        }
    }

    /// Convert the entry into an SPDX package element.
    pub fn to_spdx_package(&self) -> Element {
        let mut pkg = Element::package(&self.package);
        pkg.checksums = self.checksums.clone();
        {
            let data = pkg.as_package_mut().expect("constructed as package");
            data.version = self.version.clone();
            data.id_prefix = Some(self.purl_type.clone());
            data.download_location = self.download_location();
            data.homepage = self.homepage.clone();
            data.license_declared = self.license.clone();
            if !self.maintainer_name.is_empty() {
                data.supplier = Some(Actor::Person {
                    name: self.maintainer_name.clone(),
                    email: (!self.maintainer_email.is_empty())
                        .then(|| self.maintainer_email.clone()),
                });
            }
            if let Some(purl) = self.package_url() {
                data.external_refs.push(ExternalRef::purl(purl));
            }
        }
        pkg.build_id([self.package.as_str(), self.version.as_str()]);
        pkg
    }
}
