use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading configuration file: {0}")]
    Io(#[from] std::io::Error),
    #[error("parsing configuration file: {0}")]
    Parse(#[from] serde_yaml::Error),
}

/// The optional YAML configuration document accepted by `generate -c`.
#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case", default)]
pub struct GenerateConfig {
    pub namespace: String,
    pub license: String,
    pub name: String,
    pub creator: Creator,
    pub artifacts: Vec<Artifact>,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Creator {
    pub person: String,
    pub tool: String,
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Artifact {
    #[serde(rename = "type")]
    pub kind: ArtifactKind,
    pub source: String,
    pub license: String,
    pub gomodules: bool,
}

#[derive(Clone, Copy, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    #[default]
    Directory,
    File,
    Image,
}

impl GenerateConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&data)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parse_full_config() {
        let config: GenerateConfig = serde_yaml::from_str(
            r#"
namespace: https://example.com/sbom-1
license: Apache-2.0
name: example-release
creator:
  person: Jane Doe
  tool: bomify
artifacts:
  - type: directory
    source: .
    gomodules: true
  - type: image
    source: registry.example.com/app:v1
"#,
        )
        .unwrap();

        assert_eq!("https://example.com/sbom-1", config.namespace);
        assert_eq!("Jane Doe", config.creator.person);
        assert_eq!(2, config.artifacts.len());
        assert_eq!(ArtifactKind::Directory, config.artifacts[0].kind);
        assert!(config.artifacts[0].gomodules);
        assert_eq!(ArtifactKind::Image, config.artifacts[1].kind);
    }

    #[test]
    fn defaults_are_empty() {
        let config: GenerateConfig = serde_yaml::from_str("{}").unwrap();
        assert_eq!(GenerateConfig::default(), config);
    }
}
