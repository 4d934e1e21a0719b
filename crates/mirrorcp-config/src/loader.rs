//! Configuration loader utilities

use crate::{Config, ConfigBuilder, ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

/// Environment variable prefix used by the default loaders
pub const ENV_PREFIX: &str = "MIRRORCP";

/// Configuration loader with common loading patterns
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from default locations
    pub fn load_default() -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        if let Some(path) = Self::config_exists() {
            builder = builder.add_source_file(&path);
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> ConfigResult<Config> {
        let path = path.as_ref();

        if !path.exists() {
            return Err(ConfigError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "Configuration file not found",
                ),
            });
        }

        ConfigBuilder::new()
            .add_defaults()
            .add_source_file(path)
            .add_env_prefix(ENV_PREFIX)
            .build()
    }

    /// Load configuration from multiple files (later files override earlier ones)
    pub fn load_from_files<P: AsRef<Path>>(paths: &[P]) -> ConfigResult<Config> {
        let mut builder = ConfigBuilder::new().add_defaults();

        for path in paths {
            let path = path.as_ref();
            if path.exists() {
                builder = builder.add_source_file(path);
            }
        }

        builder.add_env_prefix(ENV_PREFIX).build()
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(config: &Config, path: P) -> ConfigResult<()> {
        let path = path.as_ref();

        let content = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => {
                toml::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                    message: format!("Failed to serialize to TOML: {}", e),
                })?
            }
            Some("json") => {
                serde_json::to_string_pretty(config).map_err(|e| ConfigError::Serialization {
                    message: format!("Failed to serialize to JSON: {}", e),
                })?
            }
            _ => serde_yaml::to_string(config)?,
        };

        std::fs::write(path, content).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;

        Ok(())
    }

    /// Generate a default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> ConfigResult<()> {
        Self::save_to_file(&Config::default(), path)
    }

    /// First configuration file found in the default locations
    pub fn config_exists() -> Option<PathBuf> {
        Self::get_default_config_paths()
            .into_iter()
            .find(|path| path.exists())
    }

    /// Get default configuration file paths in order of preference
    fn get_default_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from("mirrorcp.yaml"),
            PathBuf::from("mirrorcp.yml"),
            PathBuf::from("mirrorcp.toml"),
            PathBuf::from(".mirrorcp.yaml"),
            PathBuf::from(".mirrorcp.toml"),
        ];

        #[cfg(unix)]
        {
            paths.push(PathBuf::from("/etc/mirrorcp/config.yaml"));
            paths.push(PathBuf::from("/etc/mirrorcp/config.toml"));
        }

        paths
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MirrorOptions, SelectionRules};
    use tempfile::TempDir;

    fn sample_config() -> Config {
        Config {
            selection: SelectionRules {
                exclude_dir_patterns: vec!["node_modules".to_string()],
                max_file_size: Some(4096),
                exclude_extra: true,
                ..SelectionRules::default()
            },
            mirror: MirrorOptions::mirror(),
            ..Config::default()
        }
    }

    #[test]
    fn test_save_and_load_yaml() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.yaml");

        ConfigLoader::save_to_file(&sample_config(), &config_path).unwrap();
        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.selection, sample_config().selection);
        assert!(loaded.mirror.mirror);
    }

    #[test]
    fn test_save_and_load_json() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("test.json");

        ConfigLoader::save_to_file(&sample_config(), &config_path).unwrap();
        let loaded = ConfigLoader::load_from_file(&config_path).unwrap();

        assert_eq!(loaded.selection.max_file_size, Some(4096));
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let temp_dir = TempDir::new().unwrap();
        let result = ConfigLoader::load_from_file(temp_dir.path().join("absent.yaml"));
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_generate_default_config() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("default.yaml");

        ConfigLoader::generate_default_config(&config_path).unwrap();
        assert!(config_path.exists());

        let config = ConfigLoader::load_from_file(&config_path).unwrap();
        assert_eq!(config.selection, SelectionRules::default());
    }

    #[test]
    fn test_load_from_files_later_overrides_earlier() {
        let temp_dir = TempDir::new().unwrap();
        let first = temp_dir.path().join("first.yaml");
        let second = temp_dir.path().join("second.yaml");
        std::fs::write(&first, "selection:\n  max_depth: 2\n").unwrap();
        std::fs::write(&second, "selection:\n  max_depth: 5\n").unwrap();

        let config = ConfigLoader::load_from_files(&[first, second]).unwrap();
        assert_eq!(config.selection.max_depth, 5);
    }
}
