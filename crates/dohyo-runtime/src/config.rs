//! Control configuration – read from a TOML file such as `dohyo.toml`.
//!
//! Every field has a default, so an empty file is a valid configuration.
//! Loading goes file → `DOHYO_*` environment overrides → [`ControlConfig::validate`];
//! an invalid configuration is fatal at startup.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dohyo_kernel::{EdgePolarity, MapperConfig, SafetyConfig};
use dohyo_perception::TrackerConfig;
use dohyo_types::{POWER_LIMIT, RotationDirection};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::state_machine::{LossPriority, MachineConfig};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

// ────────────────────────────────────────────────────────────────────────────
// Sections
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    pub cycle_period_ms: u64,
    pub sensor_staleness_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            cycle_period_ms: 20,
            sensor_staleness_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeConfig {
    pub reflectance_threshold: f32,
    pub polarity: EdgePolarity,
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            reflectance_threshold: 40.0,
            polarity: EdgePolarity::Below,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrientationConfig {
    pub rate_threshold_dps: f32,
    pub debounce_ms: u64,
}

impl Default for OrientationConfig {
    fn default() -> Self {
        Self {
            rate_threshold_dps: 360.0,
            debounce_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategyConfig {
    pub lock_tolerance_deg: f32,
    pub alignment_tolerance_deg: f32,
    pub drift_tolerance_deg: f32,
    pub contact_debounce_ms: u64,
    pub loss_priority: LossPriority,
    pub lockon_bypass: bool,
    /// Back off after pushing this long without a result.  Disabled when
    /// absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub push_timeout_ms: Option<u64>,
    pub steer_kp: f32,
    pub steer_ki: f32,
    pub steer_kd: f32,
    pub steer_limit: f32,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            lock_tolerance_deg: 180.0,
            alignment_tolerance_deg: 10.0,
            drift_tolerance_deg: 20.0,
            contact_debounce_ms: 60,
            loss_priority: LossPriority::TargetLoss,
            lockon_bypass: true,
            push_timeout_ms: None,
            steer_kp: 0.8,
            steer_ki: 0.0,
            steer_kd: 0.05,
            steer_limit: 20.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub search_power: f32,
    pub search_direction: RotationDirection,
    pub turn_gain: f32,
    pub turn_min_power: f32,
    pub turn_max_power: f32,
    pub approach_power: f32,
    pub push_power: f32,
    pub retreat_power: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            search_power: 20.0,
            search_direction: RotationDirection::Clockwise,
            turn_gain: 0.6,
            turn_min_power: 12.0,
            turn_max_power: 35.0,
            approach_power: 30.0,
            push_power: 100.0,
            retreat_power: 40.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub reverse_ms: u64,
    pub rotate_deg: f32,
    pub rotate_power: f32,
    /// Measured spin rate at `rotate_power`, used to time the rotation.
    pub rotate_rate_dps: f32,
    pub default_direction: RotationDirection,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            reverse_ms: 500,
            rotate_deg: 120.0,
            rotate_power: 30.0,
            rotate_rate_dps: 200.0,
            default_direction: RotationDirection::Clockwise,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ControlConfig
// ────────────────────────────────────────────────────────────────────────────

/// Complete configuration of the control core.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ControlConfig {
    pub timing: TimingConfig,
    pub edge: EdgeConfig,
    pub orientation: OrientationConfig,
    pub tracking: TrackerConfig,
    pub strategy: StrategyConfig,
    pub drive: DriveConfig,
    pub recovery: RecoveryConfig,
}

impl ControlConfig {
    /// Read, override from the environment, and validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut cfg = Self::from_toml_str(&raw)?;
        cfg.apply_env_overrides();
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse without overrides or validation.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(raw)?)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Apply `DOHYO_*` environment variable overrides.  Values that do not
    /// parse are ignored.
    ///
    /// | Variable | Config field |
    /// |---|---|
    /// | `DOHYO_CYCLE_PERIOD_MS` | `timing.cycle_period_ms` |
    /// | `DOHYO_PUSH_POWER` | `drive.push_power` |
    /// | `DOHYO_EDGE_THRESHOLD` | `edge.reflectance_threshold` |
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DOHYO_CYCLE_PERIOD_MS")
            && let Ok(ms) = v.parse::<u64>()
        {
            self.timing.cycle_period_ms = ms;
        }
        if let Ok(v) = std::env::var("DOHYO_PUSH_POWER")
            && let Ok(p) = v.parse::<f32>()
        {
            self.drive.push_power = p;
        }
        if let Ok(v) = std::env::var("DOHYO_EDGE_THRESHOLD")
            && let Ok(t) = v.parse::<f32>()
        {
            self.edge.reflectance_threshold = t;
        }
    }

    /// Reject configurations the control core cannot run safely with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.timing.cycle_period_ms == 0 {
            return Err(invalid("timing.cycle_period_ms", "must be greater than zero"));
        }
        if self.timing.sensor_staleness_ms == 0 {
            return Err(invalid("timing.sensor_staleness_ms", "must be greater than zero"));
        }

        non_negative("edge.reflectance_threshold", self.edge.reflectance_threshold)?;
        non_negative("orientation.rate_threshold_dps", self.orientation.rate_threshold_dps)?;

        let t = &self.tracking;
        non_negative("tracking.detect_min_cm", t.detect_min_cm)?;
        non_negative("tracking.detect_max_cm", t.detect_max_cm)?;
        if t.detect_min_cm >= t.detect_max_cm {
            return Err(invalid(
                "tracking.detect_min_cm",
                format!("{} must be below detect_max_cm ({})", t.detect_min_cm, t.detect_max_cm),
            ));
        }

        let s = &self.strategy;
        tolerance("strategy.lock_tolerance_deg", s.lock_tolerance_deg)?;
        tolerance("strategy.alignment_tolerance_deg", s.alignment_tolerance_deg)?;
        tolerance("strategy.drift_tolerance_deg", s.drift_tolerance_deg)?;
        if s.alignment_tolerance_deg > s.drift_tolerance_deg {
            return Err(invalid(
                "strategy.alignment_tolerance_deg",
                "must not exceed drift_tolerance_deg",
            ));
        }
        if s.lock_tolerance_deg < s.alignment_tolerance_deg {
            return Err(invalid(
                "strategy.lock_tolerance_deg",
                "must not be below alignment_tolerance_deg",
            ));
        }
        if s.push_timeout_ms == Some(0) {
            return Err(invalid("strategy.push_timeout_ms", "must be greater than zero when set"));
        }
        non_negative("strategy.steer_kp", s.steer_kp)?;
        non_negative("strategy.steer_ki", s.steer_ki)?;
        non_negative("strategy.steer_kd", s.steer_kd)?;
        non_negative("strategy.steer_limit", s.steer_limit)?;

        let d = &self.drive;
        power("drive.search_power", d.search_power)?;
        power("drive.turn_min_power", d.turn_min_power)?;
        power("drive.turn_max_power", d.turn_max_power)?;
        power("drive.approach_power", d.approach_power)?;
        power("drive.push_power", d.push_power)?;
        power("drive.retreat_power", d.retreat_power)?;
        non_negative("drive.turn_gain", d.turn_gain)?;
        if d.turn_min_power > d.turn_max_power {
            return Err(invalid("drive.turn_min_power", "must not exceed turn_max_power"));
        }

        let r = &self.recovery;
        non_negative("recovery.rotate_deg", r.rotate_deg)?;
        power("recovery.rotate_power", r.rotate_power)?;
        non_negative("recovery.rotate_rate_dps", r.rotate_rate_dps)?;
        if r.rotate_rate_dps == 0.0 {
            return Err(invalid("recovery.rotate_rate_dps", "must be greater than zero"));
        }
        Ok(())
    }

    pub fn cycle_period(&self) -> Duration {
        Duration::from_millis(self.timing.cycle_period_ms)
    }

    pub fn staleness(&self) -> Duration {
        Duration::from_millis(self.timing.sensor_staleness_ms)
    }

    pub fn recovery_reverse(&self) -> Duration {
        Duration::from_millis(self.recovery.reverse_ms)
    }

    /// How long the recovery spin lasts at the measured rotate rate.
    pub fn recovery_rotate(&self) -> Duration {
        let ms = (self.recovery.rotate_deg / self.recovery.rotate_rate_dps * 1000.0).round();
        if ms.is_finite() && ms > 0.0 {
            Duration::from_millis(ms as u64)
        } else {
            Duration::ZERO
        }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        self.tracking
    }

    pub fn safety_config(&self) -> SafetyConfig {
        SafetyConfig {
            reflectance_threshold: self.edge.reflectance_threshold,
            polarity: self.edge.polarity,
            rate_threshold_dps: self.orientation.rate_threshold_dps,
            orientation_debounce: Duration::from_millis(self.orientation.debounce_ms),
        }
    }

    pub fn mapper_config(&self) -> MapperConfig {
        let d = &self.drive;
        MapperConfig {
            search_power: d.search_power,
            search_direction: d.search_direction,
            turn_gain: d.turn_gain,
            turn_min_power: d.turn_min_power,
            turn_max_power: d.turn_max_power,
            push_power: d.push_power,
            retreat_power: d.retreat_power,
            retreat_duration: self.recovery_reverse(),
            rotate_power: self.recovery.rotate_power,
        }
    }

    pub fn machine_config(&self) -> MachineConfig {
        let s = &self.strategy;
        MachineConfig {
            lock_tolerance_deg: s.lock_tolerance_deg,
            alignment_tolerance_deg: s.alignment_tolerance_deg,
            drift_tolerance_deg: s.drift_tolerance_deg,
            contact_debounce: Duration::from_millis(s.contact_debounce_ms),
            loss_priority: s.loss_priority,
            lockon_bypass: s.lockon_bypass,
            push_timeout: s.push_timeout_ms.map(Duration::from_millis),
            approach_power: self.drive.approach_power,
            steer_kp: s.steer_kp,
            steer_ki: s.steer_ki,
            steer_kd: s.steer_kd,
            steer_limit: s.steer_limit,
            recovery_reverse: self.recovery_reverse(),
            recovery_rotate: self.recovery_rotate(),
            recovery_direction: self.recovery.default_direction,
        }
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

fn non_negative(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() {
        return Err(invalid(field, format!("{value} is not a finite number")));
    }
    if value < 0.0 {
        return Err(invalid(field, format!("{value} is negative")));
    }
    Ok(())
}

fn power(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || value <= 0.0 || value > POWER_LIMIT {
        return Err(invalid(field, format!("{value} is outside (0, {POWER_LIMIT}]")));
    }
    Ok(())
}

fn tolerance(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if !value.is_finite() || !(0.0..=180.0).contains(&value) {
        return Err(invalid(field, format!("{value} is outside [0, 180]")));
    }
    Ok(())
}
