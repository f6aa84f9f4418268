//! Tempo values and tempo change points
//!
//! Tempo is stored in fixed point (1/100000 of a quarter note per minute) so a
//! document saved and reloaded reproduces every change point exactly.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Tick, TimelineError, TimelineResult};

// ═══════════════════════════════════════════════════════════════════════════════
// FIXED-POINT TEMPO
// ═══════════════════════════════════════════════════════════════════════════════

/// Quarter notes per minute, fixed point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Bpm(i64);

impl Bpm {
    /// Raw units per quarter note per minute
    pub const SCALE: i64 = 100_000;

    /// 120 qpm
    pub const DEFAULT: Self = Self(120 * Self::SCALE);

    pub const fn from_raw(raw: i64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> i64 {
        self.0
    }

    /// Convert from floating qpm, rounding to the nearest raw unit.
    ///
    /// Non-finite, non-positive, or values that round to zero are rejected.
    pub fn from_qpm(qpm: f64) -> TimelineResult<Self> {
        if !qpm.is_finite() || qpm <= 0.0 {
            return Err(TimelineError::InvalidTempo(qpm));
        }
        let raw = (qpm * Self::SCALE as f64).round();
        if raw < 1.0 || raw > i64::MAX as f64 {
            return Err(TimelineError::InvalidTempo(qpm));
        }
        Ok(Self(raw as i64))
    }

    #[inline]
    pub fn as_qpm(self) -> f64 {
        self.0 as f64 / Self::SCALE as f64
    }

    #[inline]
    pub fn is_valid(self) -> bool {
        self.0 > 0
    }

    /// Reject non-positive raw values
    pub fn validate(self) -> TimelineResult<Self> {
        if self.is_valid() {
            Ok(self)
        } else {
            Err(TimelineError::InvalidTempo(self.as_qpm()))
        }
    }

    /// Duration of one quarter note in seconds
    #[inline]
    pub fn seconds_per_quarter(self) -> f64 {
        60.0 / self.as_qpm()
    }
}

impl Default for Bpm {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Display for Bpm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2} BPM", self.as_qpm())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO CHANGE
// ═══════════════════════════════════════════════════════════════════════════════

/// How tempo evolves between a change point and the next one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum TempoRamp {
    /// Hold the tempo until the next change
    #[default]
    Constant,
    /// Linear ramp reaching this tempo at the next change
    To(Bpm),
    /// Linear ramp reaching the next change's own tempo
    ToNext,
}

/// Tempo change point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoChange {
    /// Position in ticks
    pub time: Tick,
    /// Tempo at `time`
    pub tempo: Bpm,
    /// Ramp type to the next change
    #[serde(default)]
    pub ramp: TempoRamp,
}

impl TempoChange {
    pub fn new(time: Tick, tempo: Bpm) -> Self {
        Self {
            time,
            tempo,
            ramp: TempoRamp::Constant,
        }
    }

    pub fn ramped(time: Tick, tempo: Bpm, target: Bpm) -> Self {
        Self {
            time,
            tempo,
            ramp: TempoRamp::To(target),
        }
    }

    pub fn ramp_to_next(time: Tick, tempo: Bpm) -> Self {
        Self {
            time,
            tempo,
            ramp: TempoRamp::ToNext,
        }
    }

    /// Build from floating qpm values, validating both
    pub fn from_qpm(time: Tick, tempo: f64, target: Option<f64>) -> TimelineResult<Self> {
        let tempo = Bpm::from_qpm(tempo)?;
        let ramp = match target {
            Some(target) => TempoRamp::To(Bpm::from_qpm(target)?),
            None => TempoRamp::Constant,
        };
        Ok(Self { time, tempo, ramp })
    }

    #[inline]
    pub fn is_ramping(&self) -> bool {
        self.ramp != TempoRamp::Constant
    }

    /// Explicit ramp target, if any
    pub fn ramp_target(&self) -> Option<Bpm> {
        match self.ramp {
            TempoRamp::To(target) => Some(target),
            TempoRamp::Constant | TempoRamp::ToNext => None,
        }
    }

    pub fn validate(&self) -> TimelineResult<()> {
        self.tempo.validate()?;
        if let TempoRamp::To(target) = self.ramp {
            target.validate()?;
        }
        Ok(())
    }
}
