use crate::addressing::BLOCK_COPY_SIZE;
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    #[default]
    Hex,
    Raw,
    Json,
}

impl OutputFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputFormat::Hex => "hex",
            OutputFormat::Raw => "raw",
            OutputFormat::Json => "json",
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct CopySettings {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

pub fn default_buffer_size() -> usize {
    BLOCK_COPY_SIZE
}

impl Default for CopySettings {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct OutputSettings {
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "kebab-case")]
#[serde(deny_unknown_fields)]
pub struct BitwiseConfig {
    #[serde(default)]
    pub copy: CopySettings,
    #[serde(default)]
    pub output: OutputSettings,
}

impl BitwiseConfig {
    pub fn load_from_file(path: &PathBuf) -> Result<Self, anyhow::Error> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file at {:?}: {}", path, e))?;
        Self::from_toml(&content)
            .map_err(|e| anyhow::anyhow!("Failed to load config file {:?}: {}", path, e))
    }

    pub fn from_toml(content: &str) -> Result<Self, anyhow::Error> {
        let config: BitwiseConfig = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("Failed to parse TOML: {}", e))?;
        if config.copy.buffer_size == 0 {
            anyhow::bail!("copy.buffer-size must be positive");
        }
        Ok(config)
    }
}
