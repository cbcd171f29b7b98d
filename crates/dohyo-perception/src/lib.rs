//! `dohyo-perception` – opponent detection.
//!
//! Turns range-finder samples into a single per-cycle estimate of where the
//! opponent is.
//!
//! # Modules
//!
//! - [`tracker`] – [`TargetTracker`][tracker::TargetTracker]: fuses the front
//!   and rear range finders into a
//!   [`TargetEstimate`][dohyo_types::TargetEstimate], preferring the closer
//!   detection.  Stateless: every cycle is computed from that cycle's samples
//!   alone.

pub mod tracker;

pub use tracker::{TargetTracker, TrackOutcome, TrackerConfig, wrap_180};
