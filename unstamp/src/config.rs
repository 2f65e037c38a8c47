use config::{Config as ConfigBuilder, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::errors::{UnstampError, UnstampResult};

/// How to handle invalid UTF-8 sequences in the input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EncodingMode {
    /// Abort the run on the first undecodable line
    #[default]
    FailFast,
    /// Replace invalid sequences with U+FFFD and keep going
    Lossy,
}

impl std::str::FromStr for EncodingMode {
    type Err = UnstampError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "failfast" => Ok(EncodingMode::FailFast),
            "lossy" => Ok(EncodingMode::Lossy),
            other => Err(UnstampError::config_error(format!(
                "Unknown encoding mode '{}' (expected failfast or lossy)",
                other
            ))),
        }
    }
}

/// Configuration for a stripping run.
///
/// # Configuration Locations
///
/// Values are layered, later sources overriding earlier ones:
/// 1. Global `$CONFIG_DIR/unstamp/config.yaml`
/// 2. Local `.unstamp.yaml` in the current directory
/// 3. Custom config file passed via `--config`
///
/// # Configuration Format
///
/// ```yaml
/// # Only strip timestamps that start the line
/// anchored_to_start: true
///
/// # How to treat invalid UTF-8 (failfast, lossy)
/// encoding_mode: failfast
///
/// # Copy the source file's permissions onto the rewritten file
/// preserve_permissions: true
///
/// # Log level (trace, debug, info, warn, error)
/// log_level: "warn"
/// ```
///
/// Command-line arguments take precedence over file values; see
/// [`UnstampConfig::merge_with_cli`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnstampConfig {
    /// Restrict matching to the first character of each line
    #[serde(default = "default_anchored")]
    pub anchored_to_start: bool,

    /// Handling of undecodable input
    #[serde(default)]
    pub encoding_mode: EncodingMode,

    /// Keep the original permissions on the rewritten file
    #[serde(default = "default_preserve_permissions")]
    pub preserve_permissions: bool,

    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_anchored() -> bool {
    true
}

fn default_preserve_permissions() -> bool {
    true
}

fn default_log_level() -> String {
    "warn".to_string()
}

impl Default for UnstampConfig {
    fn default() -> Self {
        Self {
            anchored_to_start: default_anchored(),
            encoding_mode: EncodingMode::default(),
            preserve_permissions: default_preserve_permissions(),
            log_level: default_log_level(),
        }
    }
}

/// Overrides collected from the command line. `None` leaves the file value alone.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub anchored_to_start: Option<bool>,
    pub encoding_mode: Option<EncodingMode>,
    pub log_level: Option<String>,
}

impl UnstampConfig {
    /// Loads configuration from the default locations plus an explicit file.
    ///
    /// The explicit file must exist; the default locations are optional.
    pub fn load_from(config_path: Option<&Path>) -> UnstampResult<Self> {
        let mut builder = ConfigBuilder::builder();

        let defaults = [
            dirs::config_dir().map(|p| p.join("unstamp/config.yaml")),
            Some(PathBuf::from(".unstamp.yaml")),
        ];
        for path in defaults.iter().flatten() {
            if path.exists() {
                builder = builder.add_source(File::from(path.as_path()));
            }
        }

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path).required(true));
        }

        Ok(builder.build()?.try_deserialize()?)
    }

    /// Merges CLI arguments with configuration file values
    pub fn merge_with_cli(mut self, cli: CliOverrides) -> Self {
        if let Some(anchored) = cli.anchored_to_start {
            self.anchored_to_start = anchored;
        }
        if let Some(mode) = cli.encoding_mode {
            self.encoding_mode = mode;
        }
        if let Some(level) = cli.log_level {
            self.log_level = level;
        }
        self
    }
}
