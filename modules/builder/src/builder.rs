use std::path::Path;
use std::sync::Arc;

use bomify_common::config::GenerateConfig;
use bomify_common::hashing::Digests;
use bomify_license::{Downloader, DownloaderOptions, Reader, ReaderOptions};
use bomify_model::{Document, Element, RelationshipType};
use bomify_module_lang::{
    detect, CargoModule, Ecosystem, EcosystemModule, GoModule, NodeModule, PythonModule,
};
use log::{info, warn};
use regex::Regex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tracing::instrument;

use crate::archive::{ArchiveImageSource, ImageSource, PulledImage};
use crate::options::GenerateOptions;
use crate::Error;

/// Composes SPDX documents from generation options.
pub struct DocBuilder {
    image_source: Box<dyn ImageSource>,
}

impl Default for DocBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl DocBuilder {
    pub fn new() -> Self {
        Self {
            image_source: Box::new(ArchiveImageSource),
        }
    }

    /// Use a different registry transport (the default one only reads
    /// local docker-save archives).
    pub fn with_image_source(image_source: Box<dyn ImageSource>) -> Self {
        Self { image_source }
    }

    /// Generate a document from the options. The cancellation token aborts
    /// in-flight downloads and extractions.
    #[instrument(skip_all, fields(dirs = opts.directories.len(), images = opts.images.len()))]
    pub async fn generate(
        &self,
        opts: &GenerateOptions,
        cancel: CancellationToken,
    ) -> Result<Document, Error> {
        let mut opts = opts.clone();
        let config = if opts.config_file.is_empty() {
            None
        } else {
            let config = GenerateConfig::load(&opts.config_file)?;
            opts.apply_config(&config);
            Some(config)
        };
        opts.validate()?;

        let mut doc = Document::new();
        doc.name = opts.name.clone();
        doc.namespace = opts.namespace.clone();
        doc.creation_info.license_list_version = opts.license_list_version.clone();
        doc.creation_info
            .tools
            .push(format!("bomify-{}", env!("CARGO_PKG_VERSION")));
        if let Some(config) = &config {
            if !config.creator.person.is_empty() {
                doc.creation_info.persons.push(config.creator.person.clone());
            }
            if !config.creator.tool.is_empty() {
                doc.creation_info.tools.push(config.creator.tool.clone());
            }
        }
        doc.ensure_namespace();

        let workspace = TempDir::new()?;

        // container images, remote or archived
        for reference in opts.images.clone() {
            self.check_cancel(&cancel)?;
            let images = self.image_source.pull(&reference, workspace.path()).await?;
            for image in images {
                self.add_image(&mut doc, &image, &opts)?;
            }
        }
        for archive in opts.image_archives.clone() {
            self.check_cancel(&cancel)?;
            let images = ArchiveImageSource::extract_layers(&archive, workspace.path())?;
            for image in images {
                self.add_image(&mut doc, &image, &opts)?;
            }
        }

        // directory trees, with their ecosystem dependency graphs
        for dir in opts.directories.clone() {
            self.check_cancel(&cancel)?;
            self.add_directory(&mut doc, Path::new(&dir), &opts, &cancel)
                .await?;
        }

        // loose files and archives
        for file in opts.files.clone() {
            self.check_cancel(&cancel)?;
            add_plain_file(&mut doc, Path::new(&file))?;
        }
        for archive in opts.archives.clone() {
            self.check_cancel(&cancel)?;
            add_archive_package(&mut doc, Path::new(&archive))?;
        }

        // final pass: identifiers unique, cycles broken for serialization
        doc.verify_unique_ids()?;
        doc.break_cycles();
        Ok(doc)
    }

    fn check_cancel(&self, cancel: &CancellationToken) -> Result<(), Error> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Attach an image: the image package, one package per layer
    /// (CONTAINS), and the OS packages hanging off the layer that defines
    /// them.
    fn add_image(
        &self,
        doc: &mut Document,
        image: &PulledImage,
        opts: &GenerateOptions,
    ) -> Result<(), Error> {
        let display = if !image.info.reference.is_empty() {
            image.info.reference.clone()
        } else if !image.info.digest.is_empty() {
            image.info.digest.clone()
        } else {
            image.info.archive.clone()
        };

        let mut pkg = Element::package(&display);
        {
            let data = pkg.as_package_mut().expect("constructed as package");
            data.download_location = image.info.reference.clone();
            if let Some(purl) = image.info.purl() {
                data.external_refs.push(bomify_model::ExternalRef::purl(purl));
            }
        }
        pkg.build_id([display.as_str()]);
        let image_id = doc.add_package(pkg)?;

        let mut layer_ids = Vec::new();
        for (i, layer) in image.layers.iter().enumerate() {
            let mut layer_pkg = Element::package(format!("{display}-layer-{i}"));
            if let Ok(digests) = Digests::from_file(layer) {
                layer_pkg.set_digests(&digests);
            }
            layer_pkg.build_id([display.as_str(), &format!("layer-{i}")]);
            let layer_id = doc.attach(&image_id, RelationshipType::Contains, layer_pkg)?;
            layer_ids.push(layer_id);
        }

        if opts.scan_images && !image.layers.is_empty() {
            let (os, layer_index, entries) =
                bomify_module_scan::read_os_packages(&image.layers)?;
            match os {
                Some(os) => {
                    info!(
                        "image {display} is based on {}, {} OS packages from layer {layer_index}",
                        os.label(),
                        entries.len()
                    );
                    if opts.analyze_layers {
                        if let Some(element) = doc.get_mut(&image_id) {
                            element.comment =
                                Some(format!("Image based on {}", os.label()));
                        }
                    }
                    if let Some(layer_id) = layer_ids.get(layer_index) {
                        for entry in entries {
                            doc.attach(
                                layer_id,
                                RelationshipType::Contains,
                                entry.to_spdx_package(),
                            )?;
                        }
                    }
                }
                None => info!("no known OS detected in image {display}"),
            }
        }
        Ok(())
    }

    /// Attach a directory: a package holding its file tree (gitignore
    /// aware) plus one DEPENDS_ON edge per ecosystem dependency.
    async fn add_directory(
        &self,
        doc: &mut Document,
        dir: &Path,
        opts: &GenerateOptions,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let name = dir
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| dir.to_string_lossy().to_string());

        let mut pkg = Element::package(&name);
        pkg.as_package_mut().expect("constructed as package").files_analyzed = true;
        if !opts.license.is_empty() {
            pkg.as_package_mut().expect("constructed as package").license_declared =
                opts.license.clone();
        }
        pkg.build_id([name.as_str()]);
        let pkg_id = doc.add_package(pkg)?;

        let ignore_res: Result<Vec<Regex>, regex::Error> = opts
            .ignore_patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect();
        let ignore_patterns =
            ignore_res.map_err(|err| Error::InvalidInput(format!("bad ignore pattern: {err}")))?;

        let mut walker = ignore::WalkBuilder::new(dir);
        walker
            .git_ignore(!opts.no_gitignore)
            .require_git(false)
            .hidden(false)
            .sort_by_file_path(|a, b| a.cmp(b));
        for entry in walker.build() {
            let entry = entry.map_err(|err| Error::InvalidInput(err.to_string()))?;
            if !entry.file_type().map(|t| t.is_file()).unwrap_or_default() {
                continue;
            }
            let rel_path = entry
                .path()
                .strip_prefix(dir)
                .unwrap_or(entry.path())
                .to_string_lossy()
                .to_string();
            if rel_path.starts_with(".git/") {
                continue;
            }
            if ignore_patterns.iter().any(|re| re.is_match(&rel_path)) {
                continue;
            }

            let mut file = Element::file_from_path(entry.path())?;
            file.name = rel_path.clone();
            if let Some(data) = file.as_file_mut() {
                data.file_name = rel_path.clone();
            }
            file.build_id([name.as_str(), rel_path.as_str()]);
            doc.attach(&pkg_id, RelationshipType::Contains, file)?;
        }

        doc.compute_verification_code(&pkg_id)?;
        doc.compute_license_list(&pkg_id)?;

        self.add_ecosystems(doc, &pkg_id, dir, opts, cancel).await
    }

    /// Run the enabled ecosystem scanners over a directory and attach the
    /// resulting packages below its package.
    async fn add_ecosystems(
        &self,
        doc: &mut Document,
        pkg_id: &str,
        dir: &Path,
        opts: &GenerateOptions,
        cancel: &CancellationToken,
    ) -> Result<(), Error> {
        let mut modules: Vec<Box<dyn EcosystemModule>> = Vec::new();
        if opts.process_go_modules && detect(Ecosystem::Go, dir) {
            let mut module = GoModule::new(dir);
            module.only_direct = opts.only_direct_deps;
            modules.push(Box::new(module));
        }
        if opts.process_python_modules && detect(Ecosystem::Python, dir) {
            modules.push(Box::new(PythonModule::new(dir)));
        }
        if opts.process_node_modules && detect(Ecosystem::Node, dir) {
            modules.push(Box::new(NodeModule::new(dir)));
        }
        if opts.process_rust_modules && detect(Ecosystem::Rust, dir) {
            modules.push(Box::new(CargoModule::new(dir)));
        }

        let reader = if opts.scan_licenses && !modules.is_empty() {
            Some(Arc::new(self.license_reader(opts).await?))
        } else {
            None
        };

        for mut module in modules {
            let label = module.ecosystem().label();
            if let Err(err) = module.open().await {
                // a single failing ecosystem does not abort the document
                warn!("scanning {label} dependencies of {}: {err}", dir.display());
                continue;
            }
            if let Some(reader) = &reader {
                module.scan_licenses(reader.clone(), cancel.clone()).await?;
            }
            for element in module.to_spdx_packages() {
                doc.attach(pkg_id, RelationshipType::DependsOn, element)?;
            }
            module.remove_downloads().await?;
            info!(
                "attached {} {label} packages to {}",
                module.packages().len(),
                pkg_id
            );
        }
        Ok(())
    }

    async fn license_reader(&self, opts: &GenerateOptions) -> Result<Reader, Error> {
        let mut downloader_opts = DownloaderOptions::default();
        if !opts.license_list_version.is_empty() && opts.license_list_version != "latest" {
            downloader_opts.version = opts.license_list_version.clone();
        }
        let catalog = Downloader::new(downloader_opts).catalog().await?;
        Ok(Reader::new(catalog, ReaderOptions::default()))
    }
}

/// Attach a loose file as a top-level element.
fn add_plain_file(doc: &mut Document, path: &Path) -> Result<(), Error> {
    let mut file = Element::file_from_path(path)?;
    file.build_id([path.to_string_lossy().as_ref()]);
    doc.add_file(file)?;
    Ok(())
}

/// Attach an archive as a package carrying the tarball's digests.
fn add_archive_package(doc: &mut Document, path: &Path) -> Result<(), Error> {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| path.to_string_lossy().to_string());

    let mut pkg = Element::package(&name);
    let digests = Digests::from_file(path)?;
    pkg.set_digests(&digests);
    pkg.as_package_mut().expect("constructed as package").files_analyzed = false;
    pkg.build_id([name.as_str()]);
    doc.add_package(pkg)?;
    Ok(())
}

/// Per-ecosystem option sets used by split mode: each enabled language
/// gets its own single-ecosystem options value.
pub fn split_language_options(opts: &GenerateOptions) -> Vec<(Ecosystem, GenerateOptions)> {
    let languages = [
        (Ecosystem::Go, opts.process_go_modules),
        (Ecosystem::Python, opts.process_python_modules),
        (Ecosystem::Node, opts.process_node_modules),
        (Ecosystem::Rust, opts.process_rust_modules),
    ];

    languages
        .into_iter()
        .filter(|(_, enabled)| *enabled)
        .map(|(lang, _)| {
            let mut single = opts.clone();
            single.process_go_modules = lang == Ecosystem::Go;
            single.process_python_modules = lang == Ecosystem::Python;
            single.process_node_modules = lang == Ecosystem::Node;
            single.process_rust_modules = lang == Ecosystem::Rust;
            if !single.name.is_empty() {
                single.name = format!("{}-{}", single.name, lang.label());
            }
            (lang, single)
        })
        .collect()
}
