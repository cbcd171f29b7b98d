//! Per-cycle recording.
//!
//! Each [`CycleReport`][crate::control_loop::CycleReport] is flattened into a
//! [`CycleRecord`] and handed to a [`CycleSink`].  [`JsonlRecorder`] appends
//! one JSON object per line to a file; [`MemoryRecorder`] keeps the records
//! in memory for tests and replays.
//!
//! A failing sink never stops the control loop: the loop logs the error and
//! keeps going.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use dohyo_types::{DohyoError, Intent, RobotState, SensorId};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::control_loop::CycleReport;
use crate::state_machine::TransitionReason;

/// One flattened cycle, ready to serialize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CycleRecord {
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub cycle: u64,
    /// Monotonic time of the cycle since start.
    pub elapsed_ms: f64,
    pub state: RobotState,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transition: Option<TransitionReason>,
    pub edge_left: Option<f32>,
    pub edge_right: Option<f32>,
    pub range_front_cm: Option<f32>,
    pub range_rear_cm: Option<f32>,
    pub angular_rate_dps: Option<f32>,
    #[serde(default)]
    pub front_range_unusable: bool,
    #[serde(default)]
    pub rear_range_unusable: bool,
    pub contact: bool,
    pub edge_detected: bool,
    pub orientation_unstable: bool,
    pub target_present: bool,
    pub bearing_deg: f32,
    pub steer: f32,
    pub left_power: f32,
    pub right_power: f32,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degraded: Vec<SensorId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actuator_error: Option<String>,
}

impl CycleRecord {
    pub fn from_report(run_id: Uuid, report: &CycleReport) -> Self {
        let s = &report.samples;
        let range = |sample: &dohyo_types::SensorSample| {
            sample.usable().and_then(|v| v.range()).map(|(d, _)| d)
        };
        Self {
            run_id,
            timestamp: Utc::now(),
            cycle: report.cycle,
            elapsed_ms: report.at.as_micros() as f64 / 1000.0,
            state: report.state,
            intent: report.intent,
            transition: report.transition.map(|t| t.reason),
            edge_left: s.edge_left.usable().and_then(|v| v.reflectance()),
            edge_right: s.edge_right.usable().and_then(|v| v.reflectance()),
            range_front_cm: range(&s.range_front),
            range_rear_cm: range(&s.range_rear),
            angular_rate_dps: s.orientation.usable().and_then(|v| v.angular_rate()),
            front_range_unusable: report.front_range_unusable,
            rear_range_unusable: report.rear_range_unusable,
            contact: report.contact,
            edge_detected: report.safety.edge_detected,
            orientation_unstable: report.safety.orientation_unstable,
            target_present: report.target.present,
            bearing_deg: report.target.bearing_deg,
            steer: report.steer,
            left_power: report.command.left,
            right_power: report.command.right,
            degraded: report.degraded.clone(),
            actuator_error: report.actuator_error.as_ref().map(|e| e.to_string()),
        }
    }
}

/// Destination for cycle records.
pub trait CycleSink: Send {
    fn record(&mut self, record: &CycleRecord) -> Result<(), DohyoError>;

    /// Push buffered records to their destination.
    fn flush(&mut self) -> Result<(), DohyoError> {
        Ok(())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// JsonlRecorder
// ────────────────────────────────────────────────────────────────────────────

/// Writes newline-delimited JSON.
pub struct JsonlRecorder {
    out: BufWriter<File>,
    written: u64,
}

impl JsonlRecorder {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: &Path) -> Result<Self, DohyoError> {
        let file = File::create(path).map_err(|e| {
            DohyoError::Recording(format!("cannot create {}: {e}", path.display()))
        })?;
        Ok(Self {
            out: BufWriter::new(file),
            written: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }
}

impl CycleSink for JsonlRecorder {
    fn record(&mut self, record: &CycleRecord) -> Result<(), DohyoError> {
        serde_json::to_writer(&mut self.out, record)
            .map_err(|e| DohyoError::Recording(e.to_string()))?;
        self.out
            .write_all(b"\n")
            .map_err(|e| DohyoError::Recording(e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    fn flush(&mut self) -> Result<(), DohyoError> {
        self.out
            .flush()
            .map_err(|e| DohyoError::Recording(e.to_string()))
    }
}

impl Drop for JsonlRecorder {
    fn drop(&mut self) {
        let _ = self.out.flush();
    }
}

// ────────────────────────────────────────────────────────────────────────────
// MemoryRecorder
// ────────────────────────────────────────────────────────────────────────────

/// Keeps every record in a shared buffer.  Clones share the buffer, so a
/// test can keep one clone while the loop owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryRecorder {
    records: Arc<Mutex<Vec<CycleRecord>>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CycleRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn len(&self) -> usize {
        self.records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CycleSink for MemoryRecorder {
    fn record(&mut self, record: &CycleRecord) -> Result<(), DohyoError> {
        self.records
            .lock()
            .map_err(|_| DohyoError::Recording("memory recorder poisoned".to_string()))?
            .push(record.clone());
        Ok(())
    }
}
