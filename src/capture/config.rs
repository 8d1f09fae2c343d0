//! Session, host and preview configuration.
//!
//! The lens selection is the only setting that affects the camera binding;
//! changing it means a full unbind + rebind (see `CameraSession::reconfigure`).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Which physical camera the session binds to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LensFacing {
    /// Rear-facing camera.
    #[default]
    Back,
    /// User-facing camera.
    Front,
}

impl LensFacing {
    /// Returns the opposite lens.
    pub fn toggled(self) -> Self {
        match self {
            LensFacing::Back => LensFacing::Front,
            LensFacing::Front => LensFacing::Back,
        }
    }
}

impl std::fmt::Display for LensFacing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LensFacing::Back => f.write_str("back"),
            LensFacing::Front => f.write_str("front"),
        }
    }
}

/// What happens when a recording finalizes with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FinalizeErrorPolicy {
    /// Log it and fire no callback.
    #[default]
    Drop,
    /// Route it to the error callback.
    Report,
}

/// Configuration of a single camera session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Camera to bind.
    #[serde(default)]
    pub lens: LensFacing,
    /// Handling of finalize-with-error events.
    #[serde(default)]
    pub finalize_errors: FinalizeErrorPolicy,
}

impl SessionConfig {
    /// Returns a copy with the lens switched to the other camera.
    pub fn with_toggled_lens(self) -> Self {
        Self {
            lens: self.lens.toggled(),
            ..self
        }
    }
}

/// Preview stream parameters requested from the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewConfig {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Target frames per second.
    pub fps: u32,
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            fps: 30,
        }
    }
}

impl PreviewConfig {
    /// Creates a new configuration with the specified dimensions.
    pub fn with_dimensions(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            ..Default::default()
        }
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::InvalidDimensions);
        }
        if self.fps == 0 || self.fps > 120 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }
}

/// Timing and output location of the host's record sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Directory that receives recordings and stills.
    pub output_dir: PathBuf,
    /// Delay from host creation to `start_recording`.
    pub start_delay_ms: u64,
    /// Delay from host creation to `stop_recording`.
    pub stop_delay_ms: u64,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("recordings"),
            start_delay_ms: 1_000,
            stop_delay_ms: 10_000,
        }
    }
}

impl HostConfig {
    /// Delay before recording starts.
    pub fn start_delay(&self) -> Duration {
        Duration::from_millis(self.start_delay_ms)
    }

    /// Delay before recording stops, measured from the same origin as
    /// [`HostConfig::start_delay`].
    pub fn stop_delay(&self) -> Duration {
        Duration::from_millis(self.stop_delay_ms)
    }

    /// Validates the configuration parameters.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.output_dir.as_os_str().is_empty() {
            return Err(ConfigError::MissingOutputDir);
        }
        if self.stop_delay_ms <= self.start_delay_ms {
            return Err(ConfigError::InvalidSchedule {
                start_ms: self.start_delay_ms,
                stop_ms: self.stop_delay_ms,
            });
        }
        Ok(())
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// Width or height is zero.
    #[error("invalid frame dimensions")]
    InvalidDimensions,
    /// Frame rate outside 1-120.
    #[error("invalid frame rate (must be 1-120 fps)")]
    InvalidFrameRate,
    /// Output directory is empty.
    #[error("output directory must not be empty")]
    MissingOutputDir,
    /// Recording would stop before it starts.
    #[error("stop delay ({stop_ms} ms) must be later than start delay ({start_ms} ms)")]
    InvalidSchedule {
        /// Configured start delay.
        start_ms: u64,
        /// Configured stop delay.
        stop_ms: u64,
    },
    /// The config file could not be read.
    #[error("failed to read config file: {0}")]
    FileReadError(String),
    /// The config file is not valid TOML for this format.
    #[error("failed to parse config file: {0}")]
    ParseError(String),
}

/// Full configuration file format.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct FileConfig {
    /// Session settings.
    #[serde(default)]
    pub session: SessionConfig,
    /// Record sequence settings.
    #[serde(default)]
    pub host: HostConfig,
    /// Preview stream settings.
    #[serde(default)]
    pub preview: PreviewConfig,
}

impl FileConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| ConfigError::FileReadError(e.to_string()))?;
        Self::from_toml(&content)
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig =
            toml::from_str(content).map_err(|e| ConfigError::ParseError(e.to_string()))?;
        config.preview.validate()?;
        config.host.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_valid() {
        assert!(PreviewConfig::default().validate().is_ok());
        assert!(HostConfig::default().validate().is_ok());
    }

    #[test]
    fn test_zero_dimensions_invalid() {
        let mut config = PreviewConfig::default();
        config.width = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidDimensions)
        ));
    }

    #[test]
    fn test_stop_before_start_invalid() {
        let config = HostConfig {
            start_delay_ms: 5_000,
            stop_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidSchedule { .. })
        ));
    }

    #[test]
    fn test_lens_toggle() {
        assert_eq!(LensFacing::Back.toggled(), LensFacing::Front);
        assert_eq!(LensFacing::Front.toggled(), LensFacing::Back);

        let config = SessionConfig::default().with_toggled_lens();
        assert_eq!(config.lens, LensFacing::Front);
        assert_eq!(config.finalize_errors, FinalizeErrorPolicy::Drop);
    }

    #[test]
    fn test_parse_partial_file() {
        let config = FileConfig::from_toml(
            r#"
            [session]
            lens = "front"
            finalize_errors = "report"

            [host]
            output_dir = "/tmp/clips"
            start_delay_ms = 500
            stop_delay_ms = 2500
            "#,
        )
        .unwrap();

        assert_eq!(config.session.lens, LensFacing::Front);
        assert_eq!(config.session.finalize_errors, FinalizeErrorPolicy::Report);
        assert_eq!(config.host.output_dir, PathBuf::from("/tmp/clips"));
        assert_eq!(config.host.stop_delay(), Duration::from_millis(2500));
        assert_eq!(config.preview, PreviewConfig::default());
    }

    #[test]
    fn test_parse_rejects_bad_preview() {
        let result = FileConfig::from_toml(
            r#"
            [preview]
            width = 640
            height = 480
            fps = 500
            "#,
        );
        assert!(matches!(result, Err(ConfigError::InvalidFrameRate)));
    }
}
