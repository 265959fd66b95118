use std::path::Path;

use bomify_common::config::{ArtifactKind, GenerateConfig};

use crate::Error;

/// How multi-language projects are emitted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MultiLangMode {
    /// One document carrying every ecosystem.
    #[default]
    Merged,
    /// One document per detected ecosystem, suffixed output files.
    Split,
}

impl MultiLangMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "merged" => Some(Self::Merged),
            "split" => Some(Self::Split),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Merged => "merged",
            Self::Split => "split",
        }
    }
}

/// Everything the builder needs to generate a document.
#[derive(Clone, Debug, Default)]
pub struct GenerateOptions {
    pub images: Vec<String>,
    pub image_archives: Vec<String>,
    pub files: Vec<String>,
    pub archives: Vec<String>,
    pub directories: Vec<String>,
    pub ignore_patterns: Vec<String>,
    pub no_gitignore: bool,
    pub analyze_layers: bool,
    pub scan_images: bool,
    pub process_go_modules: bool,
    pub process_python_modules: bool,
    pub process_node_modules: bool,
    pub process_rust_modules: bool,
    pub only_direct_deps: bool,
    pub scan_licenses: bool,
    pub license: String,
    pub license_list_version: String,
    pub name: String,
    pub namespace: String,
    pub config_file: String,
}

impl GenerateOptions {
    /// Verify option consistency: at least one input source must be set
    /// and named local inputs must exist.
    pub fn validate(&self) -> Result<(), Error> {
        if self.config_file.is_empty()
            && self.images.is_empty()
            && self.files.is_empty()
            && self.image_archives.is_empty()
            && self.archives.is_empty()
            && self.directories.is_empty()
        {
            return Err(Error::InvalidInput(
                "to generate an SPDX SBOM you have to provide at least one image or file".into(),
            ));
        }

        for (items, what) in [
            (&self.image_archives, "image archive"),
            (&self.files, "file"),
            (&self.directories, "directory"),
            (&self.archives, "archive"),
        ] {
            for (i, path) in items.iter().enumerate() {
                if !Path::new(path).exists() {
                    return Err(Error::InvalidInput(format!(
                        "{what} #{} not found ({path})",
                        i + 1
                    )));
                }
            }
        }
        Ok(())
    }

    /// Fold a configuration file into the options. Command-line values win
    /// over configured ones.
    pub fn apply_config(&mut self, config: &GenerateConfig) {
        if self.namespace.is_empty() {
            self.namespace = config.namespace.clone();
        }
        if self.license.is_empty() {
            self.license = config.license.clone();
        }
        if self.name.is_empty() {
            self.name = config.name.clone();
        }
        for artifact in &config.artifacts {
            match artifact.kind {
                ArtifactKind::Directory => self.directories.push(artifact.source.clone()),
                ArtifactKind::File => self.files.push(artifact.source.clone()),
                ArtifactKind::Image => self.images.push(artifact.source.clone()),
            }
        }
    }
}

/// Build the output filename of one language in split mode:
/// `out.spdx.json` + `python` → `out-python.spdx.json`.
pub fn split_output_file(output: &str, lang: &str) -> String {
    let path = Path::new(output);
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default();
    let mut base = output
        .strip_suffix(&ext)
        .unwrap_or(output)
        .to_string();

    // double extensions like .spdx.json stay together
    let mut full_ext = ext;
    if let Some(second) = Path::new(&base).extension().and_then(|e| e.to_str()) {
        let second = format!(".{second}");
        base = base
            .strip_suffix(&second)
            .unwrap_or(&base)
            .to_string();
        full_ext = format!("{second}{full_ext}");
    }

    format!("{base}-{lang}{full_ext}")
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn validate_needs_an_input() {
        let opts = GenerateOptions::default();
        assert!(opts.validate().is_err());

        let dir = tempfile::tempdir().unwrap();
        let opts = GenerateOptions {
            directories: vec![dir.path().to_string_lossy().to_string()],
            ..Default::default()
        };
        opts.validate().unwrap();
    }

    #[test]
    fn validate_checks_paths() {
        let opts = GenerateOptions {
            files: vec!["/no/such/file.bin".into()],
            ..Default::default()
        };
        assert!(opts.validate().is_err());
    }

    #[test]
    fn split_filenames() {
        assert_eq!("out-go.spdx", split_output_file("out.spdx", "go"));
        assert_eq!(
            "out-python.spdx.json",
            split_output_file("out.spdx.json", "python")
        );
        assert_eq!("bom-node", split_output_file("bom", "node"));
    }

    #[test]
    fn config_merges_under_flags() {
        let config: GenerateConfig = serde_yaml::from_str(
            r#"
namespace: https://example.com/cfg
license: MIT
artifacts:
  - type: directory
    source: /src/app
"#,
        )
        .unwrap();

        let mut opts = GenerateOptions {
            namespace: "https://example.com/flag".into(),
            ..Default::default()
        };
        opts.apply_config(&config);
        // the flag value wins
        assert_eq!("https://example.com/flag", opts.namespace);
        // unset values are filled in
        assert_eq!("MIT", opts.license);
        assert_eq!(vec!["/src/app".to_string()], opts.directories);
    }
}
