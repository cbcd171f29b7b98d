//! [`ActuatorMapper`] – intent to wheel powers.
//!
//! A pure function of `(intent, safety_override)` and the static drive
//! configuration.  Clockwise rotation is left wheel forward, right wheel
//! backward; a positive steer on [`Intent::DriveForward`] speeds up the left
//! wheel so the robot curves right.
//!
//! | Intent | left | right |
//! |---|---|---|
//! | `RotateSearch` | `±search_power` | `∓search_power` |
//! | `RotateToBearing(e)` | `sign(e)·p` | `−sign(e)·p`, `p = clamp(|e|·gain, min, max)` |
//! | `DriveForward(p, s)` | `p + s` | `p − s` |
//! | `DriveMax` | `push_power` | `push_power` |
//! | `Reverse` | `−retreat_power` | `−retreat_power` |
//! | `RotateAway(dir)` | `±rotate_power` | `∓rotate_power` |
//! | `Stop` | `0` | `0` |
//!
//! With the override active every intent maps to
//! [`retreat_command`][ActuatorMapper::retreat_command].

use std::time::Duration;

use dohyo_types::{Intent, MotorCommand, RotationDirection};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapperConfig {
    pub search_power: f32,
    pub search_direction: RotationDirection,
    /// Turn power per degree of bearing error.
    pub turn_gain: f32,
    pub turn_min_power: f32,
    pub turn_max_power: f32,
    pub push_power: f32,
    pub retreat_power: f32,
    /// Duration attached to the safety retreat command.
    pub retreat_duration: Duration,
    pub rotate_power: f32,
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            search_power: 20.0,
            search_direction: RotationDirection::Clockwise,
            turn_gain: 0.6,
            turn_min_power: 12.0,
            turn_max_power: 35.0,
            push_power: 100.0,
            retreat_power: 40.0,
            retreat_duration: Duration::from_millis(500),
            rotate_power: 30.0,
        }
    }
}

/// Stateless translation from [`Intent`] to [`MotorCommand`].
#[derive(Debug, Clone)]
pub struct ActuatorMapper {
    config: MapperConfig,
}

impl ActuatorMapper {
    pub fn new(config: MapperConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MapperConfig {
        &self.config
    }

    /// The fixed command emitted whenever an edge is active: straight back
    /// at retreat power for the recovery reverse duration.
    pub fn retreat_command(&self) -> MotorCommand {
        let p = -self.config.retreat_power;
        MotorCommand::new(p, p)
            .with_duration(self.config.retreat_duration)
            .clamped()
    }

    /// Translate `intent` into a clamped [`MotorCommand`].  With
    /// `safety_override` set, `intent` is ignored.
    pub fn map(&self, intent: Intent, safety_override: bool) -> MotorCommand {
        if safety_override {
            return self.retreat_command();
        }
        let c = &self.config;
        let cmd = match intent {
            Intent::RotateSearch => spin(c.search_direction, c.search_power),
            Intent::RotateToBearing { error_deg } => {
                if error_deg == 0.0 || error_deg.is_nan() {
                    MotorCommand::stop()
                } else {
                    let p = (error_deg.abs() * c.turn_gain).clamp(c.turn_min_power, c.turn_max_power);
                    let dir = if error_deg > 0.0 {
                        RotationDirection::Clockwise
                    } else {
                        RotationDirection::CounterClockwise
                    };
                    spin(dir, p)
                }
            }
            Intent::DriveForward { power, steer } => MotorCommand::new(power + steer, power - steer),
            Intent::DriveMax => MotorCommand::new(c.push_power, c.push_power),
            Intent::Reverse => MotorCommand::new(-c.retreat_power, -c.retreat_power),
            Intent::RotateAway { direction } => spin(direction, c.rotate_power),
            Intent::Stop => MotorCommand::stop(),
        };
        cmd.clamped()
    }
}

fn spin(direction: RotationDirection, power: f32) -> MotorCommand {
    let p = direction.sign() * power;
    MotorCommand::new(p, -p)
}
