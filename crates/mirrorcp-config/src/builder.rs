//! Configuration builder for flexible configuration loading

use crate::{AgeLimit, Config, ConfigError, ConfigResult};
use config::{ConfigBuilder as ConfigBuilderInner, Environment, File, FileFormat};
use mirrorcp_types::FileAttributes;
use std::path::{Path, PathBuf};

/// Configuration builder for loading configuration from multiple sources
#[derive(Debug)]
pub struct ConfigBuilder {
    inner: ConfigBuilderInner<config::builder::DefaultState>,
    sources: Vec<ConfigSource>,
    env_separator: String,
}

#[derive(Debug, Clone)]
enum ConfigSource {
    File { path: PathBuf, format: FileFormat },
    Defaults,
    Environment { prefix: String },
}

impl ConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            inner: config::Config::builder(),
            sources: Vec::new(),
            env_separator: "__".to_string(),
        }
    }

    /// Add default configuration values
    pub fn add_defaults(mut self) -> Self {
        self.sources.push(ConfigSource::Defaults);
        self
    }

    /// Add a configuration file source
    pub fn add_source_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let path = path.as_ref().to_path_buf();
        let format = Self::detect_format(&path);
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add a configuration file source with explicit format
    pub fn add_source_file_with_format<P: AsRef<Path>>(
        mut self,
        path: P,
        format: FileFormat,
    ) -> Self {
        let path = path.as_ref().to_path_buf();
        self.sources.push(ConfigSource::File { path, format });
        self
    }

    /// Add environment variable source with prefix
    pub fn add_env_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.sources.push(ConfigSource::Environment {
            prefix: prefix.into(),
        });
        self
    }

    /// Set environment variable separator (default: "__")
    pub fn env_separator<S: Into<String>>(mut self, separator: S) -> Self {
        self.env_separator = separator.into();
        self
    }

    /// Build the configuration
    pub fn build(mut self) -> ConfigResult<Config> {
        // Defaults are always the base layer
        let defaults_value = serde_yaml::to_value(Config::default())
            .map_err(|e| ConfigError::other(format!("Failed to serialize defaults: {}", e)))?;
        self.inner = self
            .inner
            .add_source(config::Config::try_from(&defaults_value)?);

        for source in &self.sources {
            match source {
                ConfigSource::File { path, format } => {
                    if path.exists() {
                        self.inner = self
                            .inner
                            .add_source(File::from(path.clone()).format(*format));
                    }
                }
                ConfigSource::Environment { prefix } => {
                    self.inner = self.inner.add_source(
                        Environment::with_prefix(prefix)
                            .separator(&self.env_separator)
                            .try_parsing(true),
                    );
                }
                ConfigSource::Defaults => {}
            }
        }

        let config = self.inner.build()?;
        let result: Config = config.try_deserialize()?;

        Self::validate(&result)?;

        Ok(result)
    }

    /// Try to build the configuration, returning defaults on error
    pub fn build_or_default(self) -> Config {
        self.build().unwrap_or_default()
    }

    /// Detect file format from extension
    fn detect_format(path: &Path) -> FileFormat {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => FileFormat::Toml,
            Some("json") => FileFormat::Json,
            _ => FileFormat::Yaml,
        }
    }

    /// Validate the configuration
    pub fn validate(config: &Config) -> ConfigResult<()> {
        let selection = &config.selection;

        if let (Some(min), Some(max)) = (selection.min_file_size, selection.max_file_size) {
            if min > max {
                return Err(ConfigError::validation(format!(
                    "Minimum file size {} exceeds maximum file size {}",
                    min, max
                )));
            }
        }

        for (key, letters) in [
            ("selection.include_attributes", &selection.include_attributes),
            ("selection.exclude_attributes", &selection.exclude_attributes),
        ] {
            if FileAttributes::from_letters(letters).is_none() {
                return Err(ConfigError::invalid_value(
                    key,
                    format!(
                        "'{}' contains letters outside {}",
                        letters,
                        FileAttributes::LETTERS
                    ),
                ));
            }
        }

        for (key, value) in [
            ("selection.max_file_age", selection.max_file_age),
            ("selection.min_file_age", selection.min_file_age),
            ("selection.max_last_access_date", selection.max_last_access_date),
            ("selection.min_last_access_date", selection.min_last_access_date),
        ] {
            if let Some(value) = value {
                if AgeLimit::parse(value).is_none() {
                    return Err(ConfigError::invalid_value(
                        key,
                        format!("{} is neither a day count nor a YYYYMMDD date", value),
                    ));
                }
            }
        }

        if selection
            .include_patterns
            .iter()
            .chain(&selection.exclude_file_patterns)
            .chain(&selection.exclude_dir_patterns)
            .any(|pattern| pattern.trim().is_empty())
        {
            return Err(ConfigError::validation("Name patterns must not be empty"));
        }

        if config.transfer.buffer_size < 4096 {
            return Err(ConfigError::validation(
                "Buffer size must be at least 4096 bytes",
            ));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
            return Err(ConfigError::validation(
                "Log level must be one of: trace, debug, info, warn, error",
            ));
        }

        Ok(())
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
