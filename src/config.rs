use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

/// Immutable pipeline configuration, assembled once and passed into
/// session construction.
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct ScancamConfig {
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub focus: FocusConfig,
    #[serde(default)]
    pub framing: FramingConfig,
    #[serde(default)]
    pub decode: DecodeConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct CameraConfig {
    /// Explicit camera index; unset means "first back-facing camera".
    pub requested_index: Option<u32>,

    /// Light the torch as soon as the session is configured.
    #[serde(default = "default_torch_on_start")]
    pub torch_on_start: bool,

    /// Ask the driver for a negative color effect (light-on-dark symbols).
    #[serde(default = "default_invert_scan")]
    pub invert_scan: bool,

    /// Request the dedicated barcode scene mode where supported.
    #[serde(default = "default_barcode_scene_mode")]
    pub barcode_scene_mode: bool,

    /// Center-weighted metering, focus area and video stabilization.
    #[serde(default = "default_metering")]
    pub metering: bool,

    /// Scan-tuned exposure compensation.
    #[serde(default = "default_exposure")]
    pub exposure: bool,

    /// Optional zoom ratio to request (1.0 = no zoom).
    pub target_zoom_ratio: Option<f64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct FocusConfig {
    /// Drive repeating auto-focus cycles while previewing.
    #[serde(default = "default_auto_focus")]
    pub auto_focus: bool,

    /// Prefer plain auto focus over continuous modes.
    #[serde(default = "default_disable_continuous")]
    pub disable_continuous: bool,

    /// Pause between completed focus cycles, in milliseconds.
    #[serde(default = "default_focus_interval_ms")]
    pub interval_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct FramingConfig {
    /// Manual framing rect width override, in screen pixels.
    pub manual_width: Option<u32>,

    /// Manual framing rect height override, in screen pixels.
    pub manual_height: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DecodeConfig {
    /// Bound on waiting for the decode worker to exit at shutdown, in
    /// milliseconds. Elapsing it is not an error.
    #[serde(default = "default_quit_timeout_ms")]
    pub quit_timeout_ms: u64,

    /// Bound on waiting for the decode worker to signal readiness at
    /// startup, in milliseconds.
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,
}

impl ScancamConfig {
    /// Load configuration from the default file location plus environment.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("scancam.toml")
    }

    /// Load configuration from a specific file path. The file is optional;
    /// `SCANCAM_`-prefixed environment variables override it.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("camera.torch_on_start", default_torch_on_start())?
            .set_default("camera.invert_scan", default_invert_scan())?
            .set_default("camera.barcode_scene_mode", default_barcode_scene_mode())?
            .set_default("camera.metering", default_metering())?
            .set_default("camera.exposure", default_exposure())?
            .set_default("focus.auto_focus", default_auto_focus())?
            .set_default("focus.disable_continuous", default_disable_continuous())?
            .set_default("focus.interval_ms", default_focus_interval_ms())?
            .set_default("decode.quit_timeout_ms", default_quit_timeout_ms())?
            .set_default("decode.ready_timeout_ms", default_ready_timeout_ms())?
            .add_source(File::with_name(&path_str).required(false))
            .add_source(Environment::with_prefix("SCANCAM").separator("_"))
            .build()?;

        let config: ScancamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.focus.interval_ms == 0 {
            return Err(ConfigError::Message(
                "Focus interval_ms must be greater than 0".to_string(),
            ));
        }

        if self.decode.quit_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Decode quit_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.decode.ready_timeout_ms == 0 {
            return Err(ConfigError::Message(
                "Decode ready_timeout_ms must be greater than 0".to_string(),
            ));
        }

        if self.framing.manual_width == Some(0) || self.framing.manual_height == Some(0) {
            return Err(ConfigError::Message(
                "Manual framing dimensions must be greater than 0".to_string(),
            ));
        }

        if self.framing.manual_width.is_some() != self.framing.manual_height.is_some() {
            return Err(ConfigError::Message(
                "Manual framing requires both width and height".to_string(),
            ));
        }

        if let Some(ratio) = self.camera.target_zoom_ratio {
            if ratio < 1.0 {
                return Err(ConfigError::Message(
                    "Zoom ratio must be at least 1.0".to_string(),
                ));
            }
        }

        Ok(())
    }

    /// Manual framing rect dimensions, when both are configured.
    pub fn manual_framing(&self) -> Option<(u32, u32)> {
        match (self.framing.manual_width, self.framing.manual_height) {
            (Some(w), Some(h)) => Some((w, h)),
            _ => None,
        }
    }

    pub fn focus_interval(&self) -> Duration {
        Duration::from_millis(self.focus.interval_ms)
    }

    pub fn quit_timeout(&self) -> Duration {
        Duration::from_millis(self.decode.quit_timeout_ms)
    }

    pub fn ready_timeout(&self) -> Duration {
        Duration::from_millis(self.decode.ready_timeout_ms)
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            requested_index: None,
            torch_on_start: default_torch_on_start(),
            invert_scan: default_invert_scan(),
            barcode_scene_mode: default_barcode_scene_mode(),
            metering: default_metering(),
            exposure: default_exposure(),
            target_zoom_ratio: None,
        }
    }
}

impl Default for FocusConfig {
    fn default() -> Self {
        Self {
            auto_focus: default_auto_focus(),
            disable_continuous: default_disable_continuous(),
            interval_ms: default_focus_interval_ms(),
        }
    }
}

impl Default for DecodeConfig {
    fn default() -> Self {
        Self {
            quit_timeout_ms: default_quit_timeout_ms(),
            ready_timeout_ms: default_ready_timeout_ms(),
        }
    }
}

// Default value functions
fn default_torch_on_start() -> bool {
    false
}
fn default_invert_scan() -> bool {
    false
}
fn default_barcode_scene_mode() -> bool {
    false
}
fn default_metering() -> bool {
    false
}
fn default_exposure() -> bool {
    false
}

fn default_auto_focus() -> bool {
    true
}
fn default_disable_continuous() -> bool {
    true
}
fn default_focus_interval_ms() -> u64 {
    2000
}

fn default_quit_timeout_ms() -> u64 {
    500
}
fn default_ready_timeout_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = ScancamConfig::default();
        assert!(config.validate().is_ok());
        assert!(!config.camera.torch_on_start);
        assert!(config.focus.auto_focus);
        assert!(config.focus.disable_continuous);
        assert_eq!(config.focus_interval(), Duration::from_millis(2000));
        assert_eq!(config.quit_timeout(), Duration::from_millis(500));
        assert_eq!(config.manual_framing(), None);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScancamConfig::default();
        config.focus.interval_ms = 0;
        assert!(config.validate().is_err());

        config.focus.interval_ms = 2000;
        config.framing.manual_width = Some(600);
        assert!(config.validate().is_err()); // height missing

        config.framing.manual_height = Some(400);
        assert!(config.validate().is_ok());
        assert_eq!(config.manual_framing(), Some((600, 400)));

        config.camera.target_zoom_ratio = Some(0.5);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_missing_file_uses_defaults() {
        let config = ScancamConfig::load_from_file("/nonexistent/scancam.toml").unwrap();
        assert!(config.focus.auto_focus);
        assert_eq!(config.decode.quit_timeout_ms, 500);
    }

    #[test]
    fn test_load_from_file_overrides() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(
            file,
            "[camera]\ntorch_on_start = true\n\n[focus]\ninterval_ms = 1500\n\n[framing]\nmanual_width = 600\nmanual_height = 400\n"
        )
        .unwrap();

        let config = ScancamConfig::load_from_file(file.path()).unwrap();
        assert!(config.camera.torch_on_start);
        assert_eq!(config.focus.interval_ms, 1500);
        assert_eq!(config.manual_framing(), Some((600, 400)));
        // Untouched sections keep their defaults.
        assert_eq!(config.decode.quit_timeout_ms, 500);
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::Builder::new()
            .suffix(".toml")
            .tempfile()
            .unwrap();
        writeln!(file, "[focus]\ninterval_ms = 0\n").unwrap();
        assert!(ScancamConfig::load_from_file(file.path()).is_err());
    }
}
