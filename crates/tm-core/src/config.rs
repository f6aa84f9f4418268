//! Per-document timeline configuration
//!
//! Fixed for a document's lifetime:
//! - Tick resolution (pulses per quarter note)
//! - Tempo and time signature in force before the first change point
//! - Shortest note used as the "fraction" unit of musical positions

use serde::{Deserialize, Serialize};

use crate::{Bpm, DEFAULT_PPQ, Tick, TimeSignature, TimelineError, TimelineResult};

/// Timeline configuration
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimelineConfig {
    /// Ticks per quarter note
    pub ticks_per_quarter: u32,
    /// Tempo before the first tempo change
    pub default_tempo: Bpm,
    /// Time signature before the first signature change
    pub default_time_signature: TimeSignature,
    /// Shortest note as a division of the quarter note (16 = 64th note)
    pub shortest_note_divisor: u32,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            ticks_per_quarter: DEFAULT_PPQ,
            default_tempo: Bpm::DEFAULT,
            default_time_signature: TimeSignature::COMMON,
            shortest_note_divisor: 16,
        }
    }
}

impl TimelineConfig {
    pub fn with_ticks_per_quarter(mut self, ticks_per_quarter: u32) -> Self {
        self.ticks_per_quarter = ticks_per_quarter;
        self
    }

    pub fn with_default_tempo(mut self, tempo: Bpm) -> Self {
        self.default_tempo = tempo;
        self
    }

    pub fn with_default_time_signature(mut self, signature: TimeSignature) -> Self {
        self.default_time_signature = signature;
        self
    }

    /// Ticks in one shortest-note fraction
    #[inline]
    pub fn fraction_duration(&self) -> Tick {
        (self.ticks_per_quarter / self.shortest_note_divisor.max(1)) as Tick
    }

    pub fn validate(&self) -> TimelineResult<()> {
        if self.ticks_per_quarter == 0 {
            return Err(TimelineError::InvalidConfig(
                "ticks_per_quarter must be > 0".to_string(),
            ));
        }
        if self.shortest_note_divisor == 0
            || self.ticks_per_quarter % self.shortest_note_divisor != 0
        {
            return Err(TimelineError::InvalidConfig(format!(
                "shortest_note_divisor {} does not divide {} ticks per quarter",
                self.shortest_note_divisor, self.ticks_per_quarter
            )));
        }
        self.default_tempo.validate()?;
        self.default_time_signature.validate(self.ticks_per_quarter)?;
        Ok(())
    }
}
