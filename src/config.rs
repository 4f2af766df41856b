//! Configuration Module
//!
//! Provides TOML-based configuration for sflow-report.
//! Configuration is optional - the defaults reproduce the fixed-path report
//! and CLI arguments override file settings.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::export::OutputFormat;

/// Lowest accepted render resolution.
pub const MIN_DPI: u32 = 72;

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub input: InputConfig,
    pub analysis: AnalysisConfig,
    pub output: OutputConfig,
    pub render: RenderConfig,
}

impl Config {
    /// Loads configuration from a TOML file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Loads configuration from file if given, falling back to defaults
    pub fn load_or_default(path: Option<&Path>) -> Self {
        match path {
            Some(p) => Self::load(p).unwrap_or_else(|e| {
                tracing::warn!("Failed to load config: {:#}, using defaults", e);
                Self::default()
            }),
            None => Self::default(),
        }
    }

    /// Generates a default configuration file content
    pub fn generate_default() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config)
            .unwrap_or_else(|_| "# Failed to generate config".to_string())
    }

    /// Validates the configuration
    pub fn validate(&self) -> Result<()> {
        if self.analysis.top_n == 0 {
            anyhow::bail!("top_n must be greater than 0");
        }
        if self.render.dpi < MIN_DPI {
            anyhow::bail!("dpi must be at least {}", MIN_DPI);
        }
        if self.render.width_in <= 0.0 || self.render.height_in <= 0.0 {
            anyhow::bail!("width_in and height_in must be positive");
        }
        if self.render.spring_k <= 0.0 {
            anyhow::bail!("spring_k must be positive");
        }
        if self.render.layout_iterations == 0 {
            anyhow::bail!("layout_iterations must be greater than 0");
        }
        Ok(())
    }
}

/// Input-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct InputConfig {
    /// Flow log to analyze
    pub path: PathBuf,
    /// Skip undecodable rows instead of aborting
    pub skip_malformed: bool,
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("Data_2.csv"),
            skip_malformed: false,
        }
    }
}

/// Analysis-related configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Number of entries kept in each ranking
    pub top_n: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self { top_n: 5 }
    }
}

/// Output-related configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format (text, json)
    #[serde(with = "output_format_serde")]
    pub format: OutputFormat,
    /// Enable verbose logging
    pub verbose: bool,
}

/// Graph rendering configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Render the pair graph at all
    pub enabled: bool,
    /// PNG output path, overwritten on every run
    pub path: PathBuf,
    /// Canvas width in inches
    pub width_in: f64,
    /// Canvas height in inches
    pub height_in: f64,
    pub dpi: u32,
    /// Optimal node distance for the spring layout
    pub spring_k: f64,
    pub layout_iterations: usize,
    /// Fixed layout seed (None = different layout each run)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub layout_seed: Option<u64>,
    /// TrueType font for labels (None = search system font locations)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub font_path: Option<PathBuf>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            path: PathBuf::from("Network_Graph_Top5.png"),
            width_in: 12.0,
            height_in: 10.0,
            dpi: 300,
            spring_k: 0.8,
            layout_iterations: 50,
            layout_seed: None,
            font_path: None,
        }
    }
}

impl RenderConfig {
    /// Canvas size in pixels.
    pub fn canvas_size(&self) -> (u32, u32) {
        let dpi = self.dpi as f64;
        (
            (self.width_in * dpi).round() as u32,
            (self.height_in * dpi).round() as u32,
        )
    }
}

/// Custom serde implementation for OutputFormat
mod output_format_serde {
    use super::*;
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(format: &OutputFormat, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&format.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<OutputFormat, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.input.path, PathBuf::from("Data_2.csv"));
        assert!(!config.input.skip_malformed);
        assert_eq!(config.analysis.top_n, 5);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert!(config.render.enabled);
        assert_eq!(config.render.path, PathBuf::from("Network_Graph_Top5.png"));
        assert_eq!(config.render.dpi, 300);
    }

    #[test]
    fn test_canvas_size() {
        assert_eq!(RenderConfig::default().canvas_size(), (3600, 3000));
    }

    #[test]
    fn test_config_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.analysis.top_n = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.render.dpi = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.render.dpi = 10;
        assert!(config.validate().is_err());

        config.render.dpi = MIN_DPI;
        assert!(config.validate().is_ok());

        let mut config = Config::default();
        config.render.spring_k = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_generate_default_config() {
        let config_str = Config::generate_default();
        assert!(config_str.contains("[input]"));
        assert!(config_str.contains("[analysis]"));
        assert!(config_str.contains("[output]"));
        assert!(config_str.contains("[render]"));

        let parsed: Config = toml::from_str(&config_str).unwrap();
        assert_eq!(parsed.render.layout_iterations, 50);
    }

    #[test]
    fn test_parse_config() {
        let toml_str = r#"
[input]
path = "logs/sflow.csv"
skip_malformed = true

[analysis]
top_n = 10

[output]
format = "json"

[render]
dpi = 150
layout_seed = 42
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.input.path, PathBuf::from("logs/sflow.csv"));
        assert!(config.input.skip_malformed);
        assert_eq!(config.analysis.top_n, 10);
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.render.dpi, 150);
        assert_eq!(config.render.layout_seed, Some(42));
        assert_eq!(config.render.width_in, 12.0);
    }

    #[test]
    fn test_load_missing_file() {
        let err = Config::load(Path::new("no/such/config.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let config = Config::load_or_default(Some(Path::new("no/such/config.toml")));
        assert_eq!(config.analysis.top_n, 5);
        assert_eq!(config.render.path, PathBuf::from("Network_Graph_Top5.png"));

        let config = Config::load_or_default(None);
        assert_eq!(config.input.path, PathBuf::from("Data_2.csv"));
    }

    #[test]
    fn test_load_or_default_ignores_unparsable_file() {
        let path = std::env::temp_dir().join(format!(
            "sflow-report-bad-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[analysis]\ntop_n = \"many\"\n").unwrap();

        let config = Config::load_or_default(Some(&path));
        std::fs::remove_file(&path).ok();

        assert_eq!(config.analysis.top_n, 5);
    }

    #[test]
    fn test_load_from_file() {
        let path = std::env::temp_dir().join(format!(
            "sflow-report-config-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, "[analysis]\ntop_n = 7\n").unwrap();

        let config = Config::load(&path);
        std::fs::remove_file(&path).ok();

        let config = config.unwrap();
        assert_eq!(config.analysis.top_n, 7);
        assert_eq!(config.input.path, PathBuf::from("Data_2.csv"));
    }
}
