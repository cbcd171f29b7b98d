//! Scripted sensor scenarios for `dohyo replay`.
//!
//! A scenario is a TOML list of frames.  Every field of a frame is optional;
//! a missing field means "no new reading from that sensor this cycle", so the
//! hub keeps the previous one until it goes stale.
//!
//! ```toml
//! name = "head-on push"
//!
//! [[frame]]
//! repeat = 5
//! edge_left = 70.0
//! edge_right = 70.0
//! range_front = 18.0
//!
//! [[frame]]
//! range_front = 3.0
//! contact_left = true
//! ```

use std::fs;
use std::path::Path;

use dohyo_hal::sim::SimHandles;
use dohyo_types::{SampleValue, SensorId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Scenario {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default, rename = "frame")]
    pub frames: Vec<Frame>,
}

/// Readings delivered before one (or `repeat`) control cycles.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Frame {
    /// Run this frame for this many consecutive cycles.
    pub repeat: Option<u32>,
    /// Time step before the cycle; the configured period when absent.
    pub dt_ms: Option<u64>,
    pub edge_left: Option<f32>,
    pub edge_right: Option<f32>,
    pub range_front: Option<f32>,
    pub range_front_lateral: Option<f32>,
    pub range_rear: Option<f32>,
    pub range_rear_lateral: Option<f32>,
    pub contact_left: Option<bool>,
    pub contact_right: Option<bool>,
    pub gyro_dps: Option<f32>,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self, String> {
        let raw = fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scenario at {}: {}", path.display(), e))?;
        Self::from_toml_str(&raw)
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, String> {
        let scenario: Scenario =
            toml::from_str(raw).map_err(|e| format!("Failed to parse scenario: {}", e))?;
        if scenario.frames.is_empty() {
            return Err("Scenario has no [[frame]] entries".to_string());
        }
        Ok(scenario)
    }

    /// Frames with `repeat` expanded, one entry per control cycle.
    pub fn cycles(&self) -> impl Iterator<Item = &Frame> {
        self.frames
            .iter()
            .flat_map(|f| std::iter::repeat_n(f, f.repeat.unwrap_or(1) as usize))
    }
}

impl Frame {
    /// Push every reading this frame carries into the simulated sensors.
    pub fn apply(&self, sim: &SimHandles) {
        let readings = [
            (SensorId::EdgeLeft, self.edge_left.map(SampleValue::Reflectance)),
            (SensorId::EdgeRight, self.edge_right.map(SampleValue::Reflectance)),
            (
                SensorId::RangeFront,
                self.range_front.map(|distance_cm| SampleValue::Range {
                    distance_cm,
                    lateral_cm: self.range_front_lateral,
                }),
            ),
            (
                SensorId::RangeRear,
                self.range_rear.map(|distance_cm| SampleValue::Range {
                    distance_cm,
                    lateral_cm: self.range_rear_lateral,
                }),
            ),
            (SensorId::ContactLeft, self.contact_left.map(SampleValue::Contact)),
            (SensorId::ContactRight, self.contact_right.map(SampleValue::Contact)),
            (SensorId::Orientation, self.gyro_dps.map(SampleValue::AngularRate)),
        ];
        for (id, value) in readings {
            if let Some(value) = value {
                sim.push(id, value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dohyo_hal::ManualClock;
    use dohyo_hal::sim::SimRig;
    use std::sync::Arc;
    use std::time::Duration;

    const SAMPLE: &str = r#"
        name = "head-on"

        [[frame]]
        repeat = 3
        edge_left = 70.0
        range_front = 18.0
        range_front_lateral = -2.0

        [[frame]]
        dt_ms = 5
        contact_right = true
        gyro_dps = 12.5
    "#;

    #[test]
    fn parses_frames_and_expands_repeats() {
        let s = Scenario::from_toml_str(SAMPLE).expect("parse");
        assert_eq!(s.name.as_deref(), Some("head-on"));
        assert_eq!(s.frames.len(), 2);
        assert_eq!(s.cycles().count(), 4);
        assert_eq!(s.frames[1].dt_ms, Some(5));
        assert_eq!(s.frames[1].edge_left, None);
    }

    #[test]
    fn empty_scenario_is_rejected() {
        assert!(Scenario::from_toml_str("name = \"nothing\"").is_err());
        assert!(Scenario::from_toml_str("[[frame]]\nedge_left = \"dark\"").is_err());
    }

    #[test]
    fn apply_pushes_only_present_fields() {
        let clock = ManualClock::new();
        let (mut hub, _drive, sim) = SimRig::new(Arc::new(clock.clone()), Duration::from_millis(100))
            .with_all_sensors()
            .build();
        let s = Scenario::from_toml_str(SAMPLE).expect("parse");

        s.frames[0].apply(&sim);
        let set = hub.snapshot();
        assert_eq!(set.edge_left.usable(), Some(SampleValue::Reflectance(70.0)));
        assert_eq!(
            set.range_front.usable(),
            Some(SampleValue::Range {
                distance_cm: 18.0,
                lateral_cm: Some(-2.0)
            })
        );
        assert_eq!(set.edge_right.usable(), None);
        assert_eq!(set.contact_right.usable(), None);

        s.frames[1].apply(&sim);
        let set = hub.snapshot();
        assert_eq!(set.contact_right.usable(), Some(SampleValue::Contact(true)));
        assert_eq!(set.orientation.usable(), Some(SampleValue::AngularRate(12.5)));
        // Not in this frame: previous reading is kept.
        assert_eq!(set.edge_left.usable(), Some(SampleValue::Reflectance(70.0)));
    }

    #[test]
    fn load_reads_from_disk() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("scenario.toml");
        std::fs::write(&path, SAMPLE).expect("write");
        assert_eq!(Scenario::load(&path).expect("load").frames.len(), 2);
        assert!(Scenario::load(&dir.path().join("missing.toml")).is_err());
    }
}
