//! YAML load/save for [`PipelineConfig`]

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use super::PipelineConfig;

/// Default location of the pipeline config
///
/// Returns: `{config_dir}/samplemind/pipeline.yaml`, falling back to the
/// working directory when the platform has no config directory.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("samplemind")
        .join("pipeline.yaml")
}

impl PipelineConfig {
    /// Load from a YAML file
    ///
    /// A missing file yields the defaults. An unreadable or invalid file is
    /// logged and also yields the defaults, so a bad config never prevents
    /// the pipeline from starting.
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            log::info!("Pipeline config {:?} not found, using defaults", path);
            return Self::default();
        }

        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) => {
                log::warn!("Failed to read pipeline config {:?}: {}, using defaults", path, e);
                return Self::default();
            }
        };

        match serde_yaml::from_str::<Self>(&contents) {
            Ok(config) => {
                log::info!("Loaded pipeline config from {:?}", path);
                config
            }
            Err(e) => {
                log::warn!("Failed to parse pipeline config {:?}: {}, using defaults", path, e);
                Self::default()
            }
        }
    }

    /// Save as YAML, creating parent directories as needed
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }

        let yaml = serde_yaml::to_string(self).context("Failed to serialize pipeline config")?;
        std::fs::write(path, yaml)
            .with_context(|| format!("Failed to write pipeline config: {:?}", path))?;

        log::info!("Saved pipeline config to {:?}", path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_returns_default() {
        let config = PipelineConfig::load(Path::new("/nonexistent/samplemind/pipeline.yaml"));
        assert_eq!(config, PipelineConfig::default());
    }

    #[test]
    fn test_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("pipeline.yaml");

        let config = PipelineConfig {
            queue_capacity: 4,
            engine_timeout_ms: 750,
            analysis_enabled: false,
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(PipelineConfig::load(&path), config);
    }

    #[test]
    fn test_invalid_yaml_returns_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.yaml");
        std::fs::write(&path, "queue_capacity: [not, a, number]").unwrap();

        assert_eq!(PipelineConfig::load(&path), PipelineConfig::default());
    }

    #[test]
    fn test_default_path_file_name() {
        assert!(default_config_path().ends_with("samplemind/pipeline.yaml"));
    }
}
