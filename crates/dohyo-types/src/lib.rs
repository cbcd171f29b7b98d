use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Absolute limit of a wheel power command, in percent of full drive.
pub const POWER_LIMIT: f32 = 100.0;

/// Every physical sensor the control core knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensorId {
    /// Reflectance sensor under the front-left corner.
    EdgeLeft,
    /// Reflectance sensor under the front-right corner.
    EdgeRight,
    /// Forward-facing range finder.
    RangeFront,
    /// Rear-facing range finder.
    RangeRear,
    /// Left bumper switch.
    ContactLeft,
    /// Right bumper switch.
    ContactRight,
    /// Yaw-rate gyro.
    Orientation,
}

impl SensorId {
    /// All sensors, in the order a cycle samples them.
    pub const ALL: [SensorId; 7] = [
        SensorId::EdgeLeft,
        SensorId::EdgeRight,
        SensorId::RangeFront,
        SensorId::RangeRear,
        SensorId::ContactLeft,
        SensorId::ContactRight,
        SensorId::Orientation,
    ];

    /// The kind of reading this sensor produces.
    pub fn kind(self) -> SensorKind {
        match self {
            SensorId::EdgeLeft | SensorId::EdgeRight => SensorKind::Edge,
            SensorId::RangeFront | SensorId::RangeRear => SensorKind::Range,
            SensorId::ContactLeft | SensorId::ContactRight => SensorKind::Contact,
            SensorId::Orientation => SensorKind::Orientation,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SensorId::EdgeLeft => "edge_left",
            SensorId::EdgeRight => "edge_right",
            SensorId::RangeFront => "range_front",
            SensorId::RangeRear => "range_rear",
            SensorId::ContactLeft => "contact_left",
            SensorId::ContactRight => "contact_right",
            SensorId::Orientation => "orientation",
        }
    }
}

impl fmt::Display for SensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Broad class of a sensor; decides which [`SampleValue`] variant is legal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SensorKind {
    Edge,
    Range,
    Contact,
    Orientation,
}

/// A normalized reading from one sensor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum SampleValue {
    /// Reflected light intensity, 0 (black) to 100 (white).
    Reflectance(f32),
    /// Distance to the nearest obstacle.  `lateral_cm` is the sideways
    /// offset of that obstacle toward the robot's right, when the sensor
    /// can resolve it.
    Range {
        distance_cm: f32,
        lateral_cm: Option<f32>,
    },
    /// `true` while the bumper is pressed.
    Contact(bool),
    /// Yaw rate in degrees per second, positive clockwise.
    AngularRate(f32),
}

impl SampleValue {
    pub fn kind(&self) -> SensorKind {
        match self {
            SampleValue::Reflectance(_) => SensorKind::Edge,
            SampleValue::Range { .. } => SensorKind::Range,
            SampleValue::Contact(_) => SensorKind::Contact,
            SampleValue::AngularRate(_) => SensorKind::Orientation,
        }
    }

    pub fn reflectance(&self) -> Option<f32> {
        match *self {
            SampleValue::Reflectance(v) => Some(v),
            _ => None,
        }
    }

    /// `(distance_cm, lateral_cm)` for range readings.
    pub fn range(&self) -> Option<(f32, Option<f32>)> {
        match *self {
            SampleValue::Range {
                distance_cm,
                lateral_cm,
            } => Some((distance_cm, lateral_cm)),
            _ => None,
        }
    }

    pub fn contact(&self) -> Option<bool> {
        match *self {
            SampleValue::Contact(v) => Some(v),
            _ => None,
        }
    }

    pub fn angular_rate(&self) -> Option<f32> {
        match *self {
            SampleValue::AngularRate(v) => Some(v),
            _ => None,
        }
    }
}

/// The latest known reading of one sensor at the time it was sampled.
///
/// `timestamp` is the monotonic time at which the underlying reading was
/// taken, not the time it was sampled.  A sample whose reading is older than
/// the configured staleness threshold has `valid == false` and must not drive
/// a decision.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub sensor: SensorId,
    pub value: Option<SampleValue>,
    pub timestamp: Duration,
    pub valid: bool,
}

impl SensorSample {
    /// A sample for a sensor that has never produced a reading.
    pub fn missing(sensor: SensorId, at: Duration) -> Self {
        Self {
            sensor,
            value: None,
            timestamp: at,
            valid: false,
        }
    }

    /// A valid sample carrying `value`, read at `at`.
    pub fn fresh(sensor: SensorId, value: SampleValue, at: Duration) -> Self {
        Self {
            sensor,
            value: Some(value),
            timestamp: at,
            valid: true,
        }
    }

    pub fn kind(&self) -> SensorKind {
        self.sensor.kind()
    }

    /// The value, but only if the sample is valid.
    pub fn usable(&self) -> Option<SampleValue> {
        if self.valid { self.value } else { None }
    }
}

/// One [`SensorSample`] per [`SensorId`], all sampled in the same cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleSet {
    /// Monotonic time of the cycle that produced this set.
    pub taken_at: Duration,
    pub edge_left: SensorSample,
    pub edge_right: SensorSample,
    pub range_front: SensorSample,
    pub range_rear: SensorSample,
    pub contact_left: SensorSample,
    pub contact_right: SensorSample,
    pub orientation: SensorSample,
}

impl SampleSet {
    /// A set in which no sensor has reported.
    pub fn empty(taken_at: Duration) -> Self {
        Self {
            taken_at,
            edge_left: SensorSample::missing(SensorId::EdgeLeft, taken_at),
            edge_right: SensorSample::missing(SensorId::EdgeRight, taken_at),
            range_front: SensorSample::missing(SensorId::RangeFront, taken_at),
            range_rear: SensorSample::missing(SensorId::RangeRear, taken_at),
            contact_left: SensorSample::missing(SensorId::ContactLeft, taken_at),
            contact_right: SensorSample::missing(SensorId::ContactRight, taken_at),
            orientation: SensorSample::missing(SensorId::Orientation, taken_at),
        }
    }

    pub fn get(&self, id: SensorId) -> &SensorSample {
        match id {
            SensorId::EdgeLeft => &self.edge_left,
            SensorId::EdgeRight => &self.edge_right,
            SensorId::RangeFront => &self.range_front,
            SensorId::RangeRear => &self.range_rear,
            SensorId::ContactLeft => &self.contact_left,
            SensorId::ContactRight => &self.contact_right,
            SensorId::Orientation => &self.orientation,
        }
    }

    /// Store `sample` in the slot of its sensor.
    pub fn set(&mut self, sample: SensorSample) {
        let slot = match sample.sensor {
            SensorId::EdgeLeft => &mut self.edge_left,
            SensorId::EdgeRight => &mut self.edge_right,
            SensorId::RangeFront => &mut self.range_front,
            SensorId::RangeRear => &mut self.range_rear,
            SensorId::ContactLeft => &mut self.contact_left,
            SensorId::ContactRight => &mut self.contact_right,
            SensorId::Orientation => &mut self.orientation,
        };
        *slot = sample;
    }

    /// Builder-style variant of [`set`][Self::set] for tests and replays.
    pub fn with(mut self, sample: SensorSample) -> Self {
        self.set(sample);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &SensorSample> {
        SensorId::ALL.into_iter().map(move |id| self.get(id))
    }

    /// `true` when any valid contact sample reports a press.
    pub fn contact_confirmed(&self) -> bool {
        [&self.contact_left, &self.contact_right]
            .into_iter()
            .filter_map(|s| s.usable())
            .any(|v| v.contact() == Some(true))
    }
}

/// Which range finder produced a [`TargetEstimate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TargetSource {
    Front,
    Rear,
    None,
}

/// Opponent estimate for a single cycle.  Never carried across cycles.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetEstimate {
    pub present: bool,
    /// Signed angle to the target in degrees, in `[-180, 180]`.  Positive
    /// means clockwise, i.e. to the robot's right.
    pub bearing_deg: f32,
    /// `None` when no target is present.
    pub distance_cm: Option<f32>,
    pub source: TargetSource,
}

impl TargetEstimate {
    pub fn absent() -> Self {
        Self {
            present: false,
            bearing_deg: 0.0,
            distance_cm: None,
            source: TargetSource::None,
        }
    }
}

/// Spin direction seen from above.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationDirection {
    #[default]
    Clockwise,
    CounterClockwise,
}

impl RotationDirection {
    /// `+1.0` for clockwise, `-1.0` for counter-clockwise.
    pub fn sign(self) -> f32 {
        match self {
            RotationDirection::Clockwise => 1.0,
            RotationDirection::CounterClockwise => -1.0,
        }
    }
}

/// Side of the robot on which the ring boundary was seen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeSide {
    Left,
    Right,
    Both,
}

impl EdgeSide {
    /// Direction that turns the robot away from this edge, if one exists.
    pub fn away(self) -> Option<RotationDirection> {
        match self {
            EdgeSide::Left => Some(RotationDirection::Clockwise),
            EdgeSide::Right => Some(RotationDirection::CounterClockwise),
            EdgeSide::Both => None,
        }
    }
}

/// Output of the safety monitor for one cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SafetyStatus {
    pub edge_detected: bool,
    pub orientation_unstable: bool,
    pub edge_side: Option<EdgeSide>,
}

impl SafetyStatus {
    pub fn clear() -> Self {
        Self::default()
    }

    /// `true` when the state machine must be forced into recovery.
    pub fn preempts(&self) -> bool {
        self.edge_detected || self.orientation_unstable
    }

    /// `true` when the mapped command must be replaced by the retreat
    /// command.
    pub fn override_active(&self) -> bool {
        self.edge_detected
    }
}

/// Top-level states of the control state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum RobotState {
    #[default]
    Search,
    LockOn,
    Approach,
    Push,
    Recovery,
}

impl fmt::Display for RobotState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RobotState::Search => "SEARCH",
            RobotState::LockOn => "LOCKON",
            RobotState::Approach => "APPROACH",
            RobotState::Push => "PUSH",
            RobotState::Recovery => "RECOVERY",
        };
        f.write_str(s)
    }
}

/// High-level motion request emitted by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "intent", rename_all = "snake_case")]
pub enum Intent {
    /// Spin in place to look for the opponent.
    RotateSearch,
    /// Turn in place to drive the bearing error toward zero.
    RotateToBearing { error_deg: f32 },
    /// Drive forward at `power` with a differential `steer` correction
    /// (positive steers right).
    DriveForward { power: f32, steer: f32 },
    /// Both wheels forward at push power.
    DriveMax,
    /// Both wheels backward at retreat power.
    Reverse,
    /// Spin in place at recovery power.
    RotateAway { direction: RotationDirection },
    Stop,
}

impl Intent {
    /// `true` for intents that move the robot toward an opponent.
    pub fn is_offensive(&self) -> bool {
        matches!(
            self,
            Intent::DriveForward { .. } | Intent::DriveMax | Intent::RotateToBearing { .. }
        )
    }
}

/// Per-wheel power command, each side in `[-POWER_LIMIT, POWER_LIMIT]`.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MotorCommand {
    pub left: f32,
    pub right: f32,
    /// Requested length of a timed maneuver, if any.
    pub duration: Option<Duration>,
}

impl MotorCommand {
    pub fn new(left: f32, right: f32) -> Self {
        Self {
            left,
            right,
            duration: None,
        }
    }

    pub fn stop() -> Self {
        Self::default()
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    /// Copy of `self` with both sides clamped to the legal power range.
    /// NaN powers become zero.
    pub fn clamped(self) -> Self {
        let clamp = |p: f32| {
            if p.is_nan() {
                0.0
            } else {
                p.clamp(-POWER_LIMIT, POWER_LIMIT)
            }
        };
        Self {
            left: clamp(self.left),
            right: clamp(self.right),
            duration: self.duration,
        }
    }

    pub fn is_within_limits(&self) -> bool {
        self.left.abs() <= POWER_LIMIT && self.right.abs() <= POWER_LIMIT
    }
}

/// Error type shared by the whole control core.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DohyoError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Sensor Fault on {sensor}: {details}")]
    SensorFault { sensor: SensorId, details: String },

    #[error("Recording Error: {0}")]
    Recording(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn sensor_kinds_match_ids() {
        assert_eq!(SensorId::EdgeLeft.kind(), SensorKind::Edge);
        assert_eq!(SensorId::RangeRear.kind(), SensorKind::Range);
        assert_eq!(SensorId::ContactRight.kind(), SensorKind::Contact);
        assert_eq!(SensorId::Orientation.kind(), SensorKind::Orientation);
        for id in SensorId::ALL {
            assert!(!id.name().is_empty());
        }
    }

    #[test]
    fn usable_hides_invalid_values() {
        let mut s = SensorSample::fresh(SensorId::EdgeLeft, SampleValue::Reflectance(12.0), ms(5));
        assert_eq!(s.usable(), Some(SampleValue::Reflectance(12.0)));
        s.valid = false;
        assert_eq!(s.usable(), None);
        assert_eq!(s.value, Some(SampleValue::Reflectance(12.0)));
    }

    #[test]
    fn sample_set_routes_samples_to_their_slot() {
        let set = SampleSet::empty(ms(40)).with(SensorSample::fresh(
            SensorId::RangeRear,
            SampleValue::Range {
                distance_cm: 15.0,
                lateral_cm: None,
            },
            ms(40),
        ));
        assert!(set.range_rear.valid);
        assert!(!set.range_front.valid);
        assert_eq!(set.get(SensorId::RangeRear).value.and_then(|v| v.range()), Some((15.0, None)));
        assert_eq!(set.iter().count(), SensorId::ALL.len());
    }

    #[test]
    fn contact_requires_a_valid_press() {
        let pressed = SensorSample::fresh(SensorId::ContactLeft, SampleValue::Contact(true), ms(0));
        let set = SampleSet::empty(ms(0)).with(pressed);
        assert!(set.contact_confirmed());

        let mut stale = pressed;
        stale.valid = false;
        assert!(!SampleSet::empty(ms(0)).with(stale).contact_confirmed());

        let released = SensorSample::fresh(SensorId::ContactRight, SampleValue::Contact(false), ms(0));
        assert!(!SampleSet::empty(ms(0)).with(released).contact_confirmed());
    }

    #[test]
    fn motor_command_clamps_and_zeroes_nan() {
        let cmd = MotorCommand::new(140.0, f32::NAN).clamped();
        assert_eq!(cmd.left, POWER_LIMIT);
        assert_eq!(cmd.right, 0.0);
        assert!(cmd.is_within_limits());
        assert!(!MotorCommand::new(-100.5, 0.0).is_within_limits());
    }

    #[test]
    fn edge_side_turns_away() {
        assert_eq!(EdgeSide::Left.away(), Some(RotationDirection::Clockwise));
        assert_eq!(EdgeSide::Right.away(), Some(RotationDirection::CounterClockwise));
        assert_eq!(EdgeSide::Both.away(), None);
    }

    #[test]
    fn safety_status_override_is_edge_only() {
        let wobble = SafetyStatus {
            orientation_unstable: true,
            ..SafetyStatus::clear()
        };
        assert!(wobble.preempts());
        assert!(!wobble.override_active());

        let edge = SafetyStatus {
            edge_detected: true,
            edge_side: Some(EdgeSide::Left),
            ..SafetyStatus::clear()
        };
        assert!(edge.preempts());
        assert!(edge.override_active());
    }

    #[test]
    fn intent_serializes_with_tag() {
        let json = serde_json::to_string(&Intent::DriveForward {
            power: 30.0,
            steer: -2.5,
        })
        .unwrap();
        assert!(json.contains("\"intent\":\"drive_forward\""));
        let back: Intent = serde_json::from_str(&json).unwrap();
        assert!(back.is_offensive());
    }

    #[test]
    fn dohyo_error_display() {
        let err = DohyoError::SensorFault {
            sensor: SensorId::RangeFront,
            details: "i2c timeout".to_string(),
        };
        assert!(err.to_string().contains("range_front"));

        let err2 = DohyoError::HardwareFault {
            component: "left_wheel".to_string(),
            details: "stalled".to_string(),
        };
        assert!(err2.to_string().contains("left_wheel"));
    }
}
