//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::fs;
use std::path::Path;

use crate::error::{Result, TelemetryError};
use crate::protocol::keys::{
    DEFAULT_LOCKOUT_FLAG, DEFAULT_LOCKOUT_STATE, DEFAULT_STATE_FIELD, RESERVED_KEYS,
};

/// Baud rates accepted for the flight computer's USB/UART link
const VALID_BAUD_RATES: &[u32] = &[9600, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub channels: ChannelConfig,
    #[serde(default)]
    pub flags: FlagConfig,
    #[serde(default)]
    pub events: EventConfig,
    #[serde(default)]
    pub display: DisplayConfig,
}

/// Serial port configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    #[serde(default = "default_serial_port")]
    pub port: String,

    /// Paths tried in order when `port` cannot be opened
    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<String>,

    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    #[serde(default = "default_reconnect_interval_ms")]
    pub reconnect_interval_ms: u64,
}

/// Session buffer configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    /// Time-series window in samples
    #[serde(default = "default_window")]
    pub window: usize,

    /// Raw lines kept for the monitor
    #[serde(default = "default_raw_buffer")]
    pub raw_buffer: usize,

    /// Synthetic time step for lines without a timestamp
    #[serde(default = "default_dt_guess_s")]
    pub dt_guess_s: f64,

    /// Backwards timestamp jump treated as a device reboot
    #[serde(default = "default_reboot_tolerance_ms")]
    pub reboot_tolerance_ms: f64,
}

/// Tracked time-series channels
#[derive(Debug, Deserialize, Clone)]
pub struct ChannelConfig {
    #[serde(default = "default_tracked_channels")]
    pub tracked: Vec<String>,
}

/// Status flag configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FlagConfig {
    #[serde(default = "default_tracked_flags")]
    pub tracked: Vec<String>,

    #[serde(default = "default_state_field")]
    pub state_field: String,

    #[serde(default = "default_lockout_flag")]
    pub lockout_flag: String,

    #[serde(default = "default_lockout_state")]
    pub lockout_state: String,
}

/// Event marker configuration
#[derive(Debug, Deserialize, Clone)]
pub struct EventConfig {
    #[serde(default = "default_tracked_events")]
    pub tracked: Vec<String>,

    #[serde(default = "default_event_limit")]
    pub default_limit: usize,

    /// Per-kind retention caps, overriding `default_limit`
    #[serde(default = "default_event_limits")]
    pub limits: BTreeMap<String, usize>,
}

/// Consumer-side display configuration
#[derive(Debug, Deserialize, Clone)]
pub struct DisplayConfig {
    #[serde(default = "default_fps")]
    pub fps: u32,

    #[serde(default)]
    pub print_raw: bool,
}

// Default value functions
fn default_serial_port() -> String { "/dev/ttyACM0".to_string() }
fn default_fallback_ports() -> Vec<String> { vec!["/dev/ttyUSB0".to_string()] }
fn default_baud_rate() -> u32 { 115200 }
fn default_reconnect_interval_ms() -> u64 { 1000 }

fn default_window() -> usize { 300 }
fn default_raw_buffer() -> usize { 400 }
fn default_dt_guess_s() -> f64 { 0.05 }
fn default_reboot_tolerance_ms() -> f64 { 1000.0 }

fn default_tracked_channels() -> Vec<String> {
    [
        "agl_fused_m",
        "vz_fused_mps",
        "az_imu1_mps2",
        "agl_bmp1_m",
        "agl_imu1_m",
        "vz_mps",
        "vz_baro_mps",
        "vz_acc_mps",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_tracked_flags() -> Vec<String> {
    [
        "sens_imu1_ok",
        "sens_bmp1_ok",
        "sens_imu2_ok",
        "baro_agree",
        "mach_ok",
        "tilt_ok",
        "tilt_latch",
        "liftoff_det",
        "burnout_det",
        "agl_ready",
        DEFAULT_LOCKOUT_FLAG,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_state_field() -> String { DEFAULT_STATE_FIELD.to_string() }
fn default_lockout_flag() -> String { DEFAULT_LOCKOUT_FLAG.to_string() }
fn default_lockout_state() -> String { DEFAULT_LOCKOUT_STATE.to_string() }

fn default_tracked_events() -> Vec<String> {
    ["liftoff_det", "burnout_det", "tilt_latch", "baro_agree"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_event_limit() -> usize { 10 }

fn default_event_limits() -> BTreeMap<String, usize> {
    [("liftoff_det", 2), ("burnout_det", 2), ("tilt_latch", 2), ("baro_agree", 1000)]
        .iter()
        .map(|(k, v)| (k.to_string(), *v))
        .collect()
}

fn default_fps() -> u32 { 20 }

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: default_serial_port(),
            fallback_ports: default_fallback_ports(),
            baud_rate: default_baud_rate(),
            reconnect_interval_ms: default_reconnect_interval_ms(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            window: default_window(),
            raw_buffer: default_raw_buffer(),
            dt_guess_s: default_dt_guess_s(),
            reboot_tolerance_ms: default_reboot_tolerance_ms(),
        }
    }
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { tracked: default_tracked_channels() }
    }
}

impl Default for FlagConfig {
    fn default() -> Self {
        Self {
            tracked: default_tracked_flags(),
            state_field: default_state_field(),
            lockout_flag: default_lockout_flag(),
            lockout_state: default_lockout_state(),
        }
    }
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            tracked: default_tracked_events(),
            default_limit: default_event_limit(),
            limits: default_event_limits(),
        }
    }
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            fps: default_fps(),
            print_raw: false,
        }
    }
}

impl EventConfig {
    /// Retention cap for one event kind
    pub fn limit_for(&self, kind: &str) -> usize {
        self.limits.get(kind).copied().unwrap_or(self.default_limit)
    }
}

impl SerialConfig {
    /// Every device path to try, primary port first
    pub fn candidate_paths(&self) -> Vec<String> {
        let mut paths = Vec::with_capacity(1 + self.fallback_ports.len());
        if !self.port.is_empty() {
            paths.push(self.port.clone());
        }
        for path in &self.fallback_ports {
            if !path.is_empty() && !paths.contains(path) {
                paths.push(path.clone());
            }
        }
        paths
    }
}

/// Build a validation error in the same shape as a TOML parse error
fn invalid(msg: impl std::fmt::Display) -> TelemetryError {
    TelemetryError::Config(toml::de::Error::custom(msg))
}

/// Reject empty or repeated names in a configured list
fn check_names(section: &str, names: &[String]) -> Result<()> {
    let mut seen = HashSet::new();
    for name in names {
        if name.trim().is_empty() {
            return Err(invalid(format!("{} contains an empty name", section)));
        }
        if !seen.insert(name.as_str()) {
            return Err(invalid(format!("{} contains duplicate name '{}'", section, name)));
        }
        if RESERVED_KEYS.contains(&name.as_str()) {
            return Err(invalid(format!("{} cannot use reserved key '{}'", section, name)));
        }
    }
    Ok(())
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use flight_telemetry::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = toml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        // Serial link
        if self.serial.candidate_paths().is_empty() {
            return Err(invalid("serial port cannot be empty"));
        }

        if !VALID_BAUD_RATES.contains(&self.serial.baud_rate) {
            return Err(invalid(format!(
                "baud_rate must be one of: {:?}",
                VALID_BAUD_RATES
            )));
        }

        if self.serial.reconnect_interval_ms == 0 || self.serial.reconnect_interval_ms > 60000 {
            return Err(invalid("reconnect_interval_ms must be between 1 and 60000"));
        }

        // Session buffers
        if self.session.window == 0 || self.session.window > 100_000 {
            return Err(invalid("window must be between 1 and 100000"));
        }

        if self.session.raw_buffer == 0 {
            return Err(invalid("raw_buffer must be greater than 0"));
        }

        if !self.session.dt_guess_s.is_finite() || self.session.dt_guess_s <= 0.0 {
            return Err(invalid("dt_guess_s must be a positive number"));
        }

        if !self.session.reboot_tolerance_ms.is_finite() || self.session.reboot_tolerance_ms < 0.0 {
            return Err(invalid("reboot_tolerance_ms must be a non-negative number"));
        }

        // Names
        check_names("channels.tracked", &self.channels.tracked)?;
        check_names("flags.tracked", &self.flags.tracked)?;
        check_names("events.tracked", &self.events.tracked)?;

        if self.flags.state_field.trim().is_empty() {
            return Err(invalid("state_field cannot be empty"));
        }

        if RESERVED_KEYS.contains(&self.flags.state_field.as_str()) {
            return Err(invalid(format!(
                "state_field cannot use reserved key '{}'",
                self.flags.state_field
            )));
        }

        if self.flags.lockout_flag.trim().is_empty() {
            return Err(invalid("lockout_flag cannot be empty"));
        }

        // Events are edges of tracked flags
        for kind in &self.events.tracked {
            if !self.flags.tracked.contains(kind) {
                return Err(invalid(format!(
                    "event '{}' is not a tracked flag",
                    kind
                )));
            }
        }

        if self.events.default_limit == 0 {
            return Err(invalid("events default_limit must be greater than 0"));
        }

        for (kind, &limit) in &self.events.limits {
            if limit == 0 {
                return Err(invalid(format!("event limit for '{}' must be greater than 0", kind)));
            }
        }

        // Display
        if self.display.fps == 0 || self.display.fps > 120 {
            return Err(invalid("fps must be between 1 and 120"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_valid_config() -> Config {
        Config::default()
    }

    #[test]
    fn test_default_config() {
        assert!(create_valid_config().validate().is_ok());
    }

    #[test]
    fn test_load_config_from_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let toml_content = r#"
[serial]
port = "/dev/ttyUSB1"
baud_rate = 230400

[session]
window = 600

[channels]
tracked = ["agl_fused_m", "vbat_v"]

[events]
default_limit = 5

[events.limits]
liftoff_det = 1
"#;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(toml_content.as_bytes()).unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.serial.port, "/dev/ttyUSB1");
        assert_eq!(config.serial.baud_rate, 230400);
        assert_eq!(config.session.window, 600);
        assert_eq!(config.session.raw_buffer, 400);
        assert_eq!(config.channels.tracked, vec!["agl_fused_m", "vbat_v"]);
        assert_eq!(config.events.limit_for("liftoff_det"), 1);
        assert_eq!(config.events.limit_for("baro_agree"), 5);
        assert_eq!(config.flags.state_field, "fc_state_str");
    }

    #[test]
    fn test_load_empty_file_uses_defaults() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"").unwrap();
        temp_file.flush().unwrap();

        let config = Config::load(temp_file.path()).unwrap();
        assert_eq!(config.session.window, 300);
        assert_eq!(config.flags.tracked.len(), 11);
    }

    #[test]
    fn test_load_malformed_file() {
        use std::io::Write;
        use tempfile::NamedTempFile;

        let mut temp_file = NamedTempFile::new().unwrap();
        temp_file.write_all(b"[session]\nwindow = \"lots\"\n").unwrap();
        temp_file.flush().unwrap();

        match Config::load(temp_file.path()) {
            Err(TelemetryError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    #[test]
    fn test_load_missing_file() {
        match Config::load("/nonexistent/flight-telemetry.toml") {
            Err(TelemetryError::Io(_)) => {}
            other => panic!("Expected Io error, got: {:?}", other),
        }
    }

    #[test]
    fn test_empty_serial_port() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        config.serial.fallback_ports.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_primary_port_with_fallback() {
        let mut config = create_valid_config();
        config.serial.port = String::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.serial.candidate_paths(), vec!["/dev/ttyUSB0"]);
    }

    #[test]
    fn test_candidate_paths_deduplicated() {
        let mut config = create_valid_config();
        config.serial.fallback_ports = vec!["/dev/ttyACM0".to_string(), "/dev/ttyUSB0".to_string()];
        assert_eq!(config.serial.candidate_paths(), vec!["/dev/ttyACM0", "/dev/ttyUSB0"]);
    }

    #[test]
    fn test_invalid_baud_rate() {
        let mut config = create_valid_config();
        config.serial.baud_rate = 420000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_valid_baud_rates() {
        for &baud in VALID_BAUD_RATES {
            let mut config = create_valid_config();
            config.serial.baud_rate = baud;
            assert!(config.validate().is_ok(), "Baud rate {} should be valid", baud);
        }
    }

    #[test]
    fn test_reconnect_interval_zero() {
        let mut config = create_valid_config();
        config.serial.reconnect_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_interval_too_high() {
        let mut config = create_valid_config();
        config.serial.reconnect_interval_ms = 60001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_zero() {
        let mut config = create_valid_config();
        config.session.window = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_too_large() {
        let mut config = create_valid_config();
        config.session.window = 100_001;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_raw_buffer_zero() {
        let mut config = create_valid_config();
        config.session.raw_buffer = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_dt_guess_invalid() {
        for dt in [0.0, -0.05, f64::NAN, f64::INFINITY] {
            let mut config = create_valid_config();
            config.session.dt_guess_s = dt;
            assert!(config.validate().is_err(), "dt_guess_s {} should be invalid", dt);
        }
    }

    #[test]
    fn test_reboot_tolerance_negative() {
        let mut config = create_valid_config();
        config.session.reboot_tolerance_ms = -1.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_duplicate_channel_name() {
        let mut config = create_valid_config();
        config.channels.tracked = vec!["agl_fused_m".to_string(), "agl_fused_m".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_flag_name() {
        let mut config = create_valid_config();
        config.flags.tracked.push("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_empty_state_field() {
        let mut config = create_valid_config();
        config.flags.state_field = String::new();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reserved_state_field() {
        for key in ["ts_ms", "ts", "evt"] {
            let mut config = create_valid_config();
            config.flags.state_field = key.to_string();
            assert!(config.validate().is_err(), "state_field '{}' should be rejected", key);
        }
    }

    #[test]
    fn test_reserved_tracked_names() {
        let mut config = create_valid_config();
        config.channels.tracked.push("ts_ms".to_string());
        assert!(config.validate().is_err());

        let mut config = create_valid_config();
        config.flags.tracked.push("evt".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_event_must_be_tracked_flag() {
        let mut config = create_valid_config();
        config.events.tracked.push("apogee_det".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_event_limit_zero() {
        let mut config = create_valid_config();
        config.events.limits.insert("liftoff_det".to_string(), 0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_event_default_limit_zero() {
        let mut config = create_valid_config();
        config.events.default_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fps_out_of_range() {
        for fps in [0, 121] {
            let mut config = create_valid_config();
            config.display.fps = fps;
            assert!(config.validate().is_err(), "fps {} should be invalid", fps);
        }
    }

    #[test]
    fn test_limit_for_falls_back_to_default() {
        let config = create_valid_config();
        assert_eq!(config.events.limit_for("liftoff_det"), 2);
        assert_eq!(config.events.limit_for("baro_agree"), 1000);
        assert_eq!(config.events.limit_for("agl_ready"), 10);
    }

    #[test]
    fn test_default_functions() {
        assert_eq!(default_serial_port(), "/dev/ttyACM0");
        assert_eq!(default_baud_rate(), 115200);
        assert_eq!(default_reconnect_interval_ms(), 1000);
        assert_eq!(default_window(), 300);
        assert_eq!(default_raw_buffer(), 400);
        assert_eq!(default_dt_guess_s(), 0.05);
        assert_eq!(default_reboot_tolerance_ms(), 1000.0);
        assert_eq!(default_tracked_channels().len(), 8);
        assert_eq!(default_tracked_flags().len(), 11);
        assert_eq!(default_state_field(), "fc_state_str");
        assert_eq!(default_lockout_flag(), "lockout");
        assert_eq!(default_lockout_state(), "ABORT_LOCKOUT");
        assert_eq!(default_tracked_events().len(), 4);
        assert_eq!(default_event_limit(), 10);
        assert_eq!(default_fps(), 20);
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        let defaults = Config::default();

        assert_eq!(config.serial.candidate_paths(), defaults.serial.candidate_paths());
        assert_eq!(config.serial.baud_rate, defaults.serial.baud_rate);
        assert_eq!(config.session.window, defaults.session.window);
        assert_eq!(config.session.raw_buffer, defaults.session.raw_buffer);
        assert_eq!(config.channels.tracked, defaults.channels.tracked);
        assert_eq!(config.flags.tracked, defaults.flags.tracked);
        assert_eq!(config.events.tracked, defaults.events.tracked);
        assert_eq!(config.events.limits, defaults.events.limits);
        assert_eq!(config.display.fps, defaults.display.fps);
    }
}
