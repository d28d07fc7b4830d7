//! Engine configuration
//!
//! Tunables for the viewport, hit-testing, calibration, inertial panning and
//! the measurement heuristics. Configuration can be loaded from a JSON file,
//! environment variables, or created programmatically.
//!
//! Several defaults are empirical placeholders rather than measured values
//! (`lens_width_ratio`, `assumed_face_width_mm`, `frame_drop_fraction`). They
//! are exposed here so deployments can override them.

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Configuration for one measurement engine instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Smallest allowed zoom (multiplier of the fit scale)
    pub min_zoom: f64,
    /// Largest allowed zoom (multiplier of the fit scale)
    pub max_zoom: f64,
    /// Zoom multiplier per wheel notch
    pub wheel_zoom_step: f64,
    /// Zoom multiplier per discrete zoom in/out step
    pub button_zoom_step: f64,

    /// Anchor grab radius in viewport pixels, matching the drawn handle size
    pub hit_radius_px: f64,

    /// Minimum image-pixel separation between calibration anchors
    pub min_calibration_separation_px: f64,
    /// Real-world length assumed for a user-dragged ruler until the operator edits it
    pub default_ruler_length_mm: f64,
    /// Face width assumed when no calibration has ever been valid
    pub assumed_face_width_mm: f64,

    /// Exponential smoothing factor for the pan velocity estimate (weight of the newest sample)
    pub velocity_smoothing: f64,
    /// Release speed (viewport px/ms) above which panning continues inertially
    pub inertia_start_speed: f64,
    /// Speed (viewport px/ms) below which inertial panning stops
    pub inertia_stop_speed: f64,
    /// Velocity multiplier applied on every animation tick
    pub inertia_decay: f64,
    /// Pointer rest time before release after which the velocity is discarded
    pub release_stale_ms: f64,

    /// Lens width as a fraction of binocular PD
    pub lens_width_ratio: f64,
    /// Frame-bottom anchor drop below the pupils as a fraction of image height
    pub frame_drop_fraction: f64,

    /// Calibration confidence used when a valid calibration reference is in use
    pub calibrated_confidence: f64,
    /// Calibration confidence used when falling back to the assumed face width
    pub uncalibrated_confidence: f64,
    /// Weight of the calibration confidence in the reliability blend
    pub calibration_weight: f64,
    /// Weight of the mean anchor confidence in the reliability blend
    pub anchor_weight: f64,

    /// How long to wait for landmark detection at load before using heuristics
    pub detection_timeout_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            min_zoom: 0.1,
            max_zoom: 10.0,
            wheel_zoom_step: 1.1,
            button_zoom_step: 1.25,
            hit_radius_px: 12.0,
            min_calibration_separation_px: 10.0,
            default_ruler_length_mm: 50.0,
            assumed_face_width_mm: 140.0,
            velocity_smoothing: 0.8,
            inertia_start_speed: 0.3,
            inertia_stop_speed: 0.02,
            inertia_decay: 0.95,
            release_stale_ms: 100.0,
            lens_width_ratio: 0.75,
            frame_drop_fraction: 0.10,
            calibrated_confidence: 0.9,
            uncalibrated_confidence: 0.2,
            calibration_weight: 0.6,
            anchor_weight: 0.4,
            detection_timeout_ms: 1500,
        }
    }
}

impl EngineConfig {
    /// Sets the zoom range.
    pub fn with_zoom_range(mut self, min_zoom: f64, max_zoom: f64) -> Self {
        self.min_zoom = min_zoom;
        self.max_zoom = max_zoom;
        self
    }

    /// Sets the anchor grab radius in viewport pixels.
    pub fn with_hit_radius(mut self, radius_px: f64) -> Self {
        self.hit_radius_px = radius_px;
        self
    }

    /// Sets the minimum calibration anchor separation in image pixels.
    pub fn with_min_calibration_separation(mut self, separation_px: f64) -> Self {
        self.min_calibration_separation_px = separation_px;
        self
    }

    /// Sets the lens width / PD ratio.
    pub fn with_lens_width_ratio(mut self, ratio: f64) -> Self {
        self.lens_width_ratio = ratio;
        self
    }

    /// Sets the detection timeout.
    pub fn with_detection_timeout(mut self, timeout: Duration) -> Self {
        self.detection_timeout_ms = timeout.as_millis() as u64;
        self
    }

    /// Detection timeout as a [`Duration`].
    pub fn detection_timeout(&self) -> Duration {
        Duration::from_millis(self.detection_timeout_ms)
    }

    /// Checks the invariants the engine relies on.
    ///
    /// # Errors
    /// Returns the name of the first offending key.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("min_zoom", self.min_zoom),
            ("max_zoom", self.max_zoom),
            ("wheel_zoom_step", self.wheel_zoom_step),
            ("button_zoom_step", self.button_zoom_step),
            ("hit_radius_px", self.hit_radius_px),
            ("min_calibration_separation_px", self.min_calibration_separation_px),
            ("default_ruler_length_mm", self.default_ruler_length_mm),
            ("assumed_face_width_mm", self.assumed_face_width_mm),
            ("lens_width_ratio", self.lens_width_ratio),
        ];
        for (key, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
        }

        if self.min_zoom > self.max_zoom {
            return Err(ConfigError::InvalidValue("min_zoom".to_string()));
        }

        let unit = [
            ("velocity_smoothing", self.velocity_smoothing),
            ("inertia_decay", self.inertia_decay),
            ("calibrated_confidence", self.calibrated_confidence),
            ("uncalibrated_confidence", self.uncalibrated_confidence),
            ("calibration_weight", self.calibration_weight),
            ("anchor_weight", self.anchor_weight),
        ];
        for (key, value) in unit {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::InvalidValue(key.to_string()));
            }
        }

        Ok(())
    }

    /// Loads configuration from environment variables on top of the defaults.
    ///
    /// Environment variables:
    /// - `PUPILMETER_MIN_ZOOM` / `PUPILMETER_MAX_ZOOM`: zoom range
    /// - `PUPILMETER_HIT_RADIUS_PX`: anchor grab radius at zoom 1
    /// - `PUPILMETER_MIN_CALIBRATION_PX`: minimum calibration separation
    /// - `PUPILMETER_LENS_WIDTH_RATIO`: lens width / PD ratio
    /// - `PUPILMETER_DETECTION_TIMEOUT_MS`: detection timeout
    ///
    /// # Errors
    /// Returns an error if any environment variable contains an invalid value.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();

        if let Some(value) = env_f64("PUPILMETER_MIN_ZOOM")? {
            config.min_zoom = value;
        }
        if let Some(value) = env_f64("PUPILMETER_MAX_ZOOM")? {
            config.max_zoom = value;
        }
        if let Some(value) = env_f64("PUPILMETER_HIT_RADIUS_PX")? {
            config.hit_radius_px = value;
        }
        if let Some(value) = env_f64("PUPILMETER_MIN_CALIBRATION_PX")? {
            config.min_calibration_separation_px = value;
        }
        if let Some(value) = env_f64("PUPILMETER_LENS_WIDTH_RATIO")? {
            config.lens_width_ratio = value;
        }
        if let Ok(val) = std::env::var("PUPILMETER_DETECTION_TIMEOUT_MS") {
            config.detection_timeout_ms = val.parse::<u64>().map_err(|_| {
                ConfigError::InvalidValue("PUPILMETER_DETECTION_TIMEOUT_MS".to_string())
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Loads configuration from a JSON file. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read, parsed, or validated.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Saves configuration to a JSON file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be written.
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path.as_ref(), json)?;
        Ok(())
    }
}

fn env_f64(key: &str) -> Result<Option<f64>, ConfigError> {
    match std::env::var(key) {
        Ok(val) => val
            .parse::<f64>()
            .map(Some)
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        Err(_) => Ok(None),
    }
}

/// Errors that can occur during configuration operations.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Invalid value for a configuration parameter
    #[error("invalid value for configuration key: {0}")]
    InvalidValue(String),
    /// I/O error reading or writing a configuration file
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Malformed configuration file
    #[error("malformed configuration: {0}")]
    Parse(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    const ENV_KEYS: [&str; 6] = [
        "PUPILMETER_MIN_ZOOM",
        "PUPILMETER_MAX_ZOOM",
        "PUPILMETER_HIT_RADIUS_PX",
        "PUPILMETER_MIN_CALIBRATION_PX",
        "PUPILMETER_LENS_WIDTH_RATIO",
        "PUPILMETER_DETECTION_TIMEOUT_MS",
    ];

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.min_zoom, 0.1);
        assert_eq!(config.max_zoom, 10.0);
        assert_eq!(config.lens_width_ratio, 0.75);
        assert_eq!(config.inertia_decay, 0.95);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_methods() {
        let config = EngineConfig::default()
            .with_zoom_range(0.5, 4.0)
            .with_hit_radius(20.0)
            .with_min_calibration_separation(5.0)
            .with_lens_width_ratio(0.8)
            .with_detection_timeout(Duration::from_millis(250));

        assert_eq!(config.min_zoom, 0.5);
        assert_eq!(config.max_zoom, 4.0);
        assert_eq!(config.hit_radius_px, 20.0);
        assert_eq!(config.min_calibration_separation_px, 5.0);
        assert_eq!(config.lens_width_ratio, 0.8);
        assert_eq!(config.detection_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn test_validate_rejects_inverted_zoom_range() {
        let config = EngineConfig::default().with_zoom_range(5.0, 1.0);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(key)) if key == "min_zoom"
        ));
    }

    #[test]
    fn test_validate_rejects_out_of_range_weights() {
        let config = EngineConfig { anchor_weight: 1.5, ..EngineConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    #[serial]
    fn test_from_env() {
        let _guard = EnvGuard::new(&ENV_KEYS);

        env::set_var("PUPILMETER_MAX_ZOOM", "6");
        env::set_var("PUPILMETER_HIT_RADIUS_PX", "18.5");
        env::set_var("PUPILMETER_DETECTION_TIMEOUT_MS", "400");
        env::remove_var("PUPILMETER_MIN_ZOOM");
        env::remove_var("PUPILMETER_MIN_CALIBRATION_PX");
        env::remove_var("PUPILMETER_LENS_WIDTH_RATIO");

        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.max_zoom, 6.0);
        assert_eq!(config.hit_radius_px, 18.5);
        assert_eq!(config.detection_timeout_ms, 400);
        assert_eq!(config.min_zoom, 0.1); // default
    }

    #[test]
    #[serial]
    fn test_from_env_invalid() {
        let _guard = EnvGuard::new(&ENV_KEYS);

        env::set_var("PUPILMETER_HIT_RADIUS_PX", "wide");
        let result = EngineConfig::from_env();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue(key)) if key == "PUPILMETER_HIT_RADIUS_PX"
        ));
    }

    // Helper to save and restore environment variables
    struct EnvGuard {
        vars: Vec<(String, Option<String>)>,
    }

    impl EnvGuard {
        fn new(var_names: &[&str]) -> Self {
            let vars = var_names
                .iter()
                .map(|name| (name.to_string(), env::var(name).ok()))
                .collect();
            Self { vars }
        }
    }

    impl Drop for EnvGuard {
        fn drop(&mut self) {
            for (name, value) in &self.vars {
                match value {
                    Some(v) => env::set_var(name, v),
                    None => env::remove_var(name),
                }
            }
        }
    }

    #[test]
    fn test_file_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pupilmeter.json");

        let config = EngineConfig::default().with_hit_radius(16.0).with_lens_width_ratio(0.7);
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_from_file_partial() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(&path, r#"{ "max_zoom": 4.0 }"#).unwrap();

        let loaded = EngineConfig::from_file(&path).unwrap();
        assert_eq!(loaded.max_zoom, 4.0);
        assert_eq!(loaded.hit_radius_px, 12.0); // default
    }

    #[test]
    fn test_from_file_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        fs::write(&path, "max_zoom = 4").unwrap();

        assert!(matches!(EngineConfig::from_file(&path), Err(ConfigError::Parse(_))));
    }
}
