use std::path::Path;
use std::process::ExitCode;

use anyhow::Context;
use bomify_model::serialize::{serialize, Format};
use bomify_model::Document;
use bomify_module_builder::builder::split_language_options;
use bomify_module_builder::options::split_output_file;
use bomify_module_builder::{DocBuilder, GenerateOptions, MultiLangMode};
use log::{info, warn};
use tokio_util::sync::CancellationToken;

#[derive(clap::Args, Debug)]
pub struct GenerateArgs {
    /// Images to include in the manifest (repeatable)
    #[arg(long = "image", short = 'i')]
    images: Vec<String>,

    /// Files to include (repeatable)
    #[arg(long = "file", short = 'f')]
    files: Vec<String>,

    /// Docker archive tarballs to include (repeatable)
    #[arg(long = "image-archive")]
    image_archives: Vec<String>,

    /// Archives to add as packages (tar, tar.gz)
    #[arg(long = "archive")]
    archives: Vec<String>,

    /// Directories to include as packages (repeatable)
    #[arg(long = "dirs", short = 'd')]
    directories: Vec<String>,

    /// Regexp patterns to ignore when scanning directories
    #[arg(long = "ignore")]
    ignore_patterns: Vec<String>,

    /// SPDX license identifier to declare in the SBOM
    #[arg(long, short = 'l')]
    license: Option<String>,

    /// Don't use exclusions from .gitignore files
    #[arg(long = "no-gitignore")]
    no_gitignore: bool,

    /// Don't perform go.mod analysis
    #[arg(long = "no-gomod")]
    no_gomod: bool,

    /// Only direct go dependencies, skip the transient ones
    #[arg(long = "no-transient")]
    no_transient: bool,

    /// Don't perform Python dependency analysis
    #[arg(long = "no-python")]
    no_python: bool,

    /// Don't perform Node.js dependency analysis
    #[arg(long = "no-node")]
    no_node: bool,

    /// Don't perform Rust dependency analysis
    #[arg(long = "no-rust")]
    no_rust: bool,

    /// How to handle multi-language projects: "merged" produces a single
    /// SBOM, "split" produces per-language SBOM files
    #[arg(long = "multi-lang-mode", default_value = "merged")]
    multi_lang_mode: String,

    /// URI serving as namespace for the SPDX document
    #[arg(long, short = 'n')]
    namespace: Option<String>,

    /// Format of the document (tag-value or json)
    #[arg(long, default_value = "tag-value")]
    format: String,

    /// Path to write the document to (defaults to STDOUT)
    #[arg(long, short = 'o')]
    output: Option<String>,

    /// Go deeper into images using the available analyzers
    #[arg(long = "analyze-images", short = 'a')]
    analyze_images: bool,

    /// Path to a YAML SBOM configuration file
    #[arg(long, short = 'c')]
    config: Option<String>,

    /// Path to export the SBOM as an in-toto provenance statement
    #[arg(long)]
    provenance: Option<String>,

    /// Scan container images to look for OS information
    #[arg(
        long = "scan-images",
        default_value_t = true,
        action = clap::ArgAction::Set,
        num_args = 0..=1,
        default_missing_value = "true"
    )]
    scan_images: bool,

    /// Name for the document, intended for humans
    #[arg(long)]
    name: Option<String>,

    /// Version of the SPDX license list to use
    #[arg(long = "license-list-version")]
    license_list_version: Option<String>,

    /// Paths naming existing directories are added to the directory list
    #[arg(trailing_var_arg = true)]
    paths: Vec<String>,
}

impl GenerateArgs {
    fn to_options(&self) -> GenerateOptions {
        let mut directories = self.directories.clone();
        for arg in &self.paths {
            if Path::new(arg).is_dir() {
                directories.push(arg.clone());
            }
        }

        GenerateOptions {
            images: self.images.clone(),
            image_archives: self.image_archives.clone(),
            files: self.files.clone(),
            archives: self.archives.clone(),
            directories,
            ignore_patterns: self.ignore_patterns.clone(),
            no_gitignore: self.no_gitignore,
            analyze_layers: self.analyze_images,
            scan_images: self.scan_images,
            process_go_modules: !self.no_gomod,
            process_python_modules: !self.no_python,
            process_node_modules: !self.no_node,
            process_rust_modules: !self.no_rust,
            only_direct_deps: self.no_transient,
            scan_licenses: false,
            license: self.license.clone().unwrap_or_default(),
            license_list_version: self.license_list_version.clone().unwrap_or_default(),
            name: self.name.clone().unwrap_or_default(),
            namespace: self.namespace.clone().unwrap_or_default(),
            config_file: self.config.clone().unwrap_or_default(),
        }
    }
}

pub async fn run(args: GenerateArgs) -> anyhow::Result<ExitCode> {
    let format = Format::parse(&args.format)
        .with_context(|| {
            format!(
                "validating command line options: unknown format, must be one of [tag-value, json]: {}",
                args.format
            )
        })?;
    let mode = MultiLangMode::parse(&args.multi_lang_mode).with_context(|| {
        format!(
            "validating command line options: unknown multi-lang-mode, must be one of [merged, split]: {}",
            args.multi_lang_mode
        )
    })?;

    let opts = args.to_options();
    opts.validate()
        .context("validating command line options")?;

    // ctrl-c aborts in-flight downloads and extractions
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    match mode {
        MultiLangMode::Merged => {
            let doc = DocBuilder::new()
                .generate(&opts, cancel.clone())
                .await
                .context("generating doc")?;
            write_document(&doc, format, args.output.as_deref())?;

            if let Some(provenance) = &args.provenance {
                doc.write_provenance(provenance)
                    .context("writing SBOM as provenance statement")?;
            }
        }
        MultiLangMode::Split => {
            let Some(output) = &args.output else {
                anyhow::bail!("--output (-o) is required when using --multi-lang-mode=split");
            };

            let mut written = 0;
            for (lang, lang_opts) in split_language_options(&opts) {
                info!("generating {} SBOM in split mode", lang.label());
                let doc = match DocBuilder::new()
                    .generate(&lang_opts, cancel.clone())
                    .await
                {
                    Ok(doc) => doc,
                    Err(err) => {
                        warn!("could not generate {} SBOM: {err}", lang.label());
                        continue;
                    }
                };
                let out_file = split_output_file(output, lang.label());
                write_document(&doc, format, Some(&out_file))?;
                info!("wrote {} SBOM to {out_file}", lang.label());
                written += 1;
            }
            if written == 0 {
                anyhow::bail!(
                    "no SBOMs were generated in split mode, no language ecosystems detected"
                );
            }
            info!("generated {written} language-specific SBOM files");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn write_document(doc: &Document, format: Format, output: Option<&str>) -> anyhow::Result<()> {
    let markup = serialize(doc, format).context("serializing document")?;
    match output {
        None => println!("{markup}"),
        Some(path) => std::fs::write(path, markup).context("writing SBOM")?,
    }
    Ok(())
}
