// src/config.rs - Host configuration (TOML)
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Main configuration: serial link, motion timing, tracking calibration
/// knobs, data file locations and the 14 motor definitions in channel
/// order.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default)]
    pub motion: MotionConfig,
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub files: FilesConfig,
    #[serde(default = "default_motors")]
    pub motors: Vec<MotorConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            motion: MotionConfig::default(),
            tracking: TrackingConfig::default(),
            files: FilesConfig::default(),
            motors: default_motors(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LinkConfig {
    #[serde(default = "default_serial_port")]
    pub serial: String,
    #[serde(default = "default_baud")]
    pub baud: u32,
    /// Upper bound on any single hardware write, in milliseconds.
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            serial: default_serial_port(),
            baud: default_baud(),
            write_timeout_ms: default_write_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotionConfig {
    /// The hardware's minimum addressable time slice, in seconds.
    #[serde(default = "default_interval")]
    pub interval: f64,
    /// Worker loop tick period, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Named position used by `go_back_to_zero`.
    #[serde(default = "default_rest_position")]
    pub rest_position: String,
    /// Fallback per-channel speed when a caller supplies none.
    #[serde(default = "default_speed")]
    pub default_speed: f64,
}

impl Default for MotionConfig {
    fn default() -> Self {
        Self {
            interval: default_interval(),
            tick_ms: default_tick_ms(),
            rest_position: default_rest_position(),
            default_speed: default_speed(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TrackingConfig {
    /// Camera image extents, pixels.
    #[serde(default = "default_image_width")]
    pub image_width: f64,
    #[serde(default = "default_image_height")]
    pub image_height: f64,
    /// Head moves smaller than this (degrees) are suppressed.
    #[serde(default = "default_head_threshold")]
    pub head_move_threshold: f64,
    /// Rotation magnitude (degrees) above which the coarse speed tier is
    /// used instead of the medium one.
    #[serde(default = "default_coarse_threshold")]
    pub coarse_threshold: f64,
    #[serde(default = "default_coarse_speed")]
    pub coarse_speed: f64,
    #[serde(default = "default_medium_speed")]
    pub medium_speed: f64,
    #[serde(default = "default_eye_speed")]
    pub eye_speed: f64,
    /// Pause between the steps of the eye/IMU/head choreography, ms.
    #[serde(default = "default_choreography_pause_ms")]
    pub choreography_pause_ms: u64,
    /// Bound on waiting for head telemetry before proceeding stale, ms.
    #[serde(default = "default_head_data_timeout_ms")]
    pub head_data_timeout_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            image_width: default_image_width(),
            image_height: default_image_height(),
            head_move_threshold: default_head_threshold(),
            coarse_threshold: default_coarse_threshold(),
            coarse_speed: default_coarse_speed(),
            medium_speed: default_medium_speed(),
            eye_speed: default_eye_speed(),
            choreography_pause_ms: default_choreography_pause_ms(),
            head_data_timeout_ms: default_head_data_timeout_ms(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FilesConfig {
    #[serde(default = "default_positions_file")]
    pub positions: String,
    /// Extra position files merged on top of the base file; later files
    /// extend or override by name.
    #[serde(default)]
    pub extra_positions: Vec<String>,
    #[serde(default = "default_gestures_file")]
    pub gestures: String,
    #[serde(default = "default_calibration_file")]
    pub calibration: String,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            positions: default_positions_file(),
            extra_positions: Vec::new(),
            gestures: default_gestures_file(),
            calibration: default_calibration_file(),
        }
    }
}

/// One motor definition. The list order in the config is the channel
/// order; names should match the canonical channel names.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MotorConfig {
    pub name: String,
    #[serde(default = "default_radius")]
    pub radius: f64,
    #[serde(default)]
    pub is_static: bool,
    #[serde(default = "default_initial_length")]
    pub initial_length: f64,
    #[serde(default = "default_min_angle")]
    pub min_angle: f64,
    #[serde(default = "default_max_angle")]
    pub max_angle: f64,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Parent frame: another motor name, or "world".
    #[serde(default = "default_parent")]
    pub parent: String,
    /// Static translation of this frame relative to the parent, cm.
    #[serde(default)]
    pub offset: [f64; 3],
    #[serde(default = "default_spin_axis")]
    pub spin_axis: String,
}

fn default_serial_port() -> String {
    "/dev/ttyUSB0".to_string()
}
fn default_baud() -> u32 {
    115200
}
fn default_write_timeout_ms() -> u64 {
    500
}
fn default_interval() -> f64 {
    0.25
}
fn default_tick_ms() -> u64 {
    10
}
fn default_rest_position() -> String {
    "zero".to_string()
}
fn default_speed() -> f64 {
    20.0
}
fn default_image_width() -> f64 {
    640.0
}
fn default_image_height() -> f64 {
    480.0
}
fn default_head_threshold() -> f64 {
    4.0
}
fn default_coarse_threshold() -> f64 {
    25.0
}
fn default_coarse_speed() -> f64 {
    40.0
}
fn default_medium_speed() -> f64 {
    15.0
}
fn default_eye_speed() -> f64 {
    60.0
}
fn default_choreography_pause_ms() -> u64 {
    300
}
fn default_head_data_timeout_ms() -> u64 {
    1000
}
fn default_positions_file() -> String {
    "data/positions.json".to_string()
}
fn default_gestures_file() -> String {
    "data/gestures.json".to_string()
}
fn default_calibration_file() -> String {
    "data/calibration.json".to_string()
}
fn default_radius() -> f64 {
    1.25
}
fn default_initial_length() -> f64 {
    30.0
}
fn default_min_angle() -> f64 {
    -720.0
}
fn default_max_angle() -> f64 {
    720.0
}
fn default_enabled() -> bool {
    true
}
fn default_parent() -> String {
    "world".to_string()
}
fn default_spin_axis() -> String {
    "z".to_string()
}

fn string_motor(name: &str, parent: &str, offset: [f64; 3]) -> MotorConfig {
    MotorConfig {
        name: name.to_string(),
        radius: default_radius(),
        is_static: true,
        initial_length: default_initial_length(),
        min_angle: default_min_angle(),
        max_angle: default_max_angle(),
        enabled: true,
        parent: parent.to_string(),
        offset,
        spin_axis: "z".to_string(),
    }
}

fn direct_motor(name: &str, parent: &str, offset: [f64; 3], range: (f64, f64)) -> MotorConfig {
    MotorConfig {
        name: name.to_string(),
        radius: default_radius(),
        is_static: false,
        initial_length: 0.0,
        min_angle: range.0,
        max_angle: range.1,
        enabled: true,
        parent: parent.to_string(),
        offset,
        spin_axis: "z".to_string(),
    }
}

/// The standard 14-channel marionette, in channel order.
fn default_motors() -> Vec<MotorConfig> {
    let mut motors = vec![
        direct_motor("head", "world", [0.0, 0.0, 40.0], (-60.0, 60.0)),
        direct_motor("shoulder", "world", [0.0, 0.0, 30.0], (-45.0, 45.0)),
        string_motor("torso", "shoulder", [0.0, 0.0, -8.0]),
        string_motor("right_arm", "shoulder", [-10.0, 0.0, 0.0]),
        string_motor("left_arm", "shoulder", [10.0, 0.0, 0.0]),
        string_motor("right_hand", "right_arm", [-4.0, 0.0, -12.0]),
        string_motor("left_hand", "left_arm", [4.0, 0.0, -12.0]),
        string_motor("right_leg", "torso", [-5.0, 0.0, -18.0]),
        string_motor("left_leg", "torso", [5.0, 0.0, -18.0]),
        string_motor("right_foot", "right_leg", [0.0, 0.0, -14.0]),
        string_motor("left_foot", "left_leg", [0.0, 0.0, -14.0]),
        string_motor("back", "torso", [0.0, -4.0, 0.0]),
        direct_motor("eye_x", "head", [3.0, 4.0, 2.0], (-60.0, 60.0)),
        direct_motor("eye_y", "head", [-3.0, 4.0, 2.0], (-60.0, 60.0)),
    ];
    // The back motor was removed from current hardware; keep the channel
    // so pose vectors stay aligned, but never command it.
    motors[11].enabled = false;
    motors
}

pub fn load_config(path: &str) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = toml::from_str(&content)?;
    Ok(config)
}
