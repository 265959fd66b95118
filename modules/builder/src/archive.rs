use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bomify_common::archive;
use bomify_common::purl::Purl;
use serde::Deserialize;
use tempfile::NamedTempFile;

use crate::Error;

/// Fallback repository qualifier for bare image names.
const DEFAULT_REPOSITORY: &str = "index.docker.io/library";

/// One entry of a docker-save `manifest.json`.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ArchiveManifest {
    #[serde(rename = "Config")]
    pub config_filename: String,
    #[serde(rename = "RepoTags", default)]
    pub repo_tags: Vec<String>,
    #[serde(rename = "Layers", default)]
    pub layer_files: Vec<String>,
}

/// Identity of one pulled (or archived) image.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ImageReferenceInfo {
    /// `name@sha256:…` digest reference, when known.
    pub digest: String,
    pub reference: String,
    /// Local archive path the image came from.
    pub archive: String,
    pub arch: String,
    pub os: String,
    pub tag: String,
}

impl ImageReferenceInfo {
    /// Synthesize the image purl:
    /// `pkg:oci/<name>@<digest>?arch=&os=&repository_url=&tag=`.
    /// Empty qualifiers are dropped; the repository defaults to the
    /// Docker library.
    pub fn purl(&self) -> Option<String> {
        let (path, digest) = self.digest.split_once('@')?;
        let (repository, name) = match path.rsplit_once('/') {
            Some((repository, name)) => (repository.to_string(), name),
            None => (DEFAULT_REPOSITORY.to_string(), path),
        };
        if name.is_empty() || digest.is_empty() {
            return None;
        }

        let mut purl = Purl::new("oci", name)
            .with_version(digest)
            .with_qualifier("repository_url", repository);
        if !self.arch.is_empty() {
            purl = purl.with_qualifier("arch", self.arch.clone());
        }
        if !self.os.is_empty() {
            purl = purl.with_qualifier("os", self.os.clone());
        }
        if !self.tag.is_empty() {
            purl = purl.with_qualifier("tag", self.tag.clone());
        }
        Some(purl.to_string())
    }
}

/// One image resolved to local layer tarballs, base layer first.
#[derive(Clone, Debug, Default)]
pub struct PulledImage {
    pub info: ImageReferenceInfo,
    pub layers: Vec<PathBuf>,
}

/// The registry-transport seam: given a reference, produce the ordered
/// layer tarballs plus per-image metadata. Remote pulling is an external
/// collaborator; the shipped implementation reads docker-save archives.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn pull(&self, reference: &str, workspace: &Path) -> Result<Vec<PulledImage>, Error>;
}

/// Reads images out of local docker-save tarballs.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArchiveImageSource;

impl ArchiveImageSource {
    /// Read the `manifest.json` of a docker-save archive.
    pub fn read_manifest(archive_path: impl AsRef<Path>) -> Result<Vec<ArchiveManifest>, Error> {
        let temp = NamedTempFile::new()?;
        archive::extract_file(&archive_path, "manifest.json", temp.path()).map_err(|err| {
            match err {
                bomify_common::archive::ArchiveError::NotFound => Error::Parse(format!(
                    "{} is not a docker archive: no manifest.json",
                    archive_path.as_ref().display()
                )),
                other => other.into(),
            }
        })?;
        let data = std::fs::read_to_string(temp.path())?;
        serde_json::from_str(&data)
            .map_err(|err| Error::Parse(format!("parsing archive manifest: {err}")))
    }

    /// Extract the layer tarballs of an archive into the workspace,
    /// ordered base-first as the manifest lists them.
    pub fn extract_layers(
        archive_path: impl AsRef<Path>,
        workspace: &Path,
    ) -> Result<Vec<PulledImage>, Error> {
        let archive_path = archive_path.as_ref();
        let manifests = Self::read_manifest(archive_path)?;

        let mut images = Vec::new();
        for (i, manifest) in manifests.iter().enumerate() {
            let mut layers = Vec::new();
            for (l, layer_file) in manifest.layer_files.iter().enumerate() {
                let dest = workspace.join(format!("image-{i}-layer-{l}.tar"));
                archive::extract_file(archive_path, layer_file, &dest)?;
                layers.push(dest);
            }
            images.push(PulledImage {
                info: ImageReferenceInfo {
                    reference: manifest.repo_tags.first().cloned().unwrap_or_default(),
                    archive: archive_path.to_string_lossy().to_string(),
                    ..Default::default()
                },
                layers,
            });
        }
        Ok(images)
    }
}

#[async_trait]
impl ImageSource for ArchiveImageSource {
    async fn pull(&self, reference: &str, workspace: &Path) -> Result<Vec<PulledImage>, Error> {
        if !Path::new(reference).exists() {
            return Err(Error::Transport(format!(
                "no registry transport configured, {reference} is not a local archive"
            )));
        }
        Self::extract_layers(reference, workspace)
    }
}

#[cfg(test)]
mod test {
    use std::io::Write;

    use super::*;

    const SAMPLE_MANIFEST: &str = r#"[{"Config":"386bcf5c63de46c7066c42d4ae1c38af0689836e88fed37d1dca2d484b343cf5.json","RepoTags":["registry.k8s.io/kube-apiserver-amd64:v1.22.0-alpha.1"],"Layers":["23e140cb8e03a12cba4ac571d9a7143cf5e2e9b72de3b33ce3243b4f7ad6a188/layer.tar","48dd73ececdf0f52a174ad33a469145824713bd2b73c6257ce1ba8502003ad4e/layer.tar","d397673d78556210baa112013c960cb95a3fd452e5c4a2ead2b26e5a458cd87f/layer.tar"]}]"#;

    fn write_archive(dir: &Path) -> PathBuf {
        let mut builder = tar::Builder::new(Vec::new());
        let mut add = |name: &str, data: &[u8]| {
            let mut header = tar::Header::new_gnu();
            header.set_size(data.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append_data(&mut header, name, data).unwrap();
        };
        add("manifest.json", SAMPLE_MANIFEST.as_bytes());
        for layer in [
            "23e140cb8e03a12cba4ac571d9a7143cf5e2e9b72de3b33ce3243b4f7ad6a188/layer.tar",
            "48dd73ececdf0f52a174ad33a469145824713bd2b73c6257ce1ba8502003ad4e/layer.tar",
            "d397673d78556210baa112013c960cb95a3fd452e5c4a2ead2b26e5a458cd87f/layer.tar",
        ] {
            add(layer, b"not really a tar");
        }

        let path = dir.join("image.tar");
        let mut out = std::fs::File::create(&path).unwrap();
        out.write_all(&builder.into_inner().unwrap()).unwrap();
        path
    }

    #[test]
    fn reads_archive_manifest() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path());

        assert!(ArchiveImageSource::read_manifest("/no/such/archive.tar").is_err());

        let manifests = ArchiveImageSource::read_manifest(&archive).unwrap();
        assert_eq!(1, manifests.len());
        assert_eq!(
            "386bcf5c63de46c7066c42d4ae1c38af0689836e88fed37d1dca2d484b343cf5.json",
            manifests[0].config_filename
        );
        assert_eq!(
            vec!["registry.k8s.io/kube-apiserver-amd64:v1.22.0-alpha.1".to_string()],
            manifests[0].repo_tags
        );
        assert_eq!(3, manifests[0].layer_files.len());
    }

    #[test]
    fn extracts_ordered_layers() {
        let dir = tempfile::tempdir().unwrap();
        let archive = write_archive(dir.path());
        let workspace = dir.path().join("ws");
        std::fs::create_dir_all(&workspace).unwrap();

        let images = ArchiveImageSource::extract_layers(&archive, &workspace).unwrap();
        assert_eq!(1, images.len());
        assert_eq!(3, images[0].layers.len());
        assert!(images[0].layers.iter().all(|l| l.exists()));
        assert_eq!(
            "registry.k8s.io/kube-apiserver-amd64:v1.22.0-alpha.1",
            images[0].info.reference
        );
    }

    #[test]
    fn image_purls() {
        let info = ImageReferenceInfo {
            digest: "image@sha256:c183d71d4173c3148b73d17aba0f37c83ca8291d1f303d74a3fac4f5e1d01f57"
                .into(),
            ..Default::default()
        };
        assert_eq!(
            "pkg:oci/image@sha256%3Ac183d71d4173c3148b73d17aba0f37c83ca8291d1f303d74a3fac4f5e1d01f57?repository_url=index.docker.io%2Flibrary",
            info.purl().unwrap()
        );

        let info = ImageReferenceInfo {
            digest:
                "index.docker.io/library/nginx@sha256:c183d71d4173c3148b73d17aba0f37c83ca8291d1f303d74a3fac4f5e1d01f57"
                    .into(),
            reference:
                "index.docker.io/library/nginx@sha256:c183d71d4173c3148b73d17aba0f37c83ca8291d1f303d74a3fac4f5e1d01f57"
                    .into(),
            arch: "amd64".into(),
            os: "darwin".into(),
            ..Default::default()
        };
        assert_eq!(
            "pkg:oci/nginx@sha256%3Ac183d71d4173c3148b73d17aba0f37c83ca8291d1f303d74a3fac4f5e1d01f57?arch=amd64&os=darwin&repository_url=index.docker.io%2Flibrary",
            info.purl().unwrap()
        );

        // an image without a digest has no purl
        assert_eq!(None, ImageReferenceInfo::default().purl());
    }
}
