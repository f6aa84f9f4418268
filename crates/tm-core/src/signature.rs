//! Time signatures and musical (bar/beat) positions

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{Tick, TimelineError, TimelineResult};

// ═══════════════════════════════════════════════════════════════════════════════
// TIME SIGNATURE
// ═══════════════════════════════════════════════════════════════════════════════

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeSignature {
    /// Numerator (units per bar)
    pub numerator: i32,
    /// Denominator (note value of one unit)
    pub denominator: i32,
    /// Display hint: not drawn in the score
    #[serde(default)]
    pub hidden: bool,
    /// Display hint: drawn as common/cut time glyph
    #[serde(default)]
    pub common: bool,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::COMMON
    }
}

impl TimeSignature {
    pub const fn new(numerator: i32, denominator: i32) -> Self {
        Self {
            numerator,
            denominator,
            hidden: false,
            common: false,
        }
    }

    /// Common time (4/4)
    pub const COMMON: Self = Self::new(4, 4);

    /// Cut time (2/2)
    pub const CUT: Self = Self::new(2, 2);

    /// Waltz time (3/4)
    pub const WALTZ: Self = Self::new(3, 4);

    pub fn with_hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn with_common(mut self, common: bool) -> Self {
        self.common = common;
        self
    }

    /// Check numerator/denominator against a tick resolution.
    ///
    /// A denominator so fine that one unit rounds to zero ticks is rejected
    /// along with non-positive values.
    pub fn validate(&self, ppq: u32) -> TimelineResult<()> {
        if self.numerator <= 0 || self.denominator <= 0 || self.unit_duration(ppq) <= 0 {
            return Err(TimelineError::InvalidTimeSignature {
                numerator: self.numerator,
                denominator: self.denominator,
            });
        }
        Ok(())
    }

    /// Compound meter (6/8, 9/8, 12/16): beats group three units
    pub fn is_compound(&self) -> bool {
        self.numerator % 3 == 0 && self.numerator > 3 && self.denominator >= 8
    }

    /// Ticks per denominator unit
    #[inline]
    pub fn unit_duration(&self, ppq: u32) -> Tick {
        if self.denominator <= 0 {
            return 0;
        }
        ppq as Tick * 4 / self.denominator as Tick
    }

    /// Ticks per counted beat (a dotted unit in compound meters)
    pub fn beat_duration(&self, ppq: u32) -> Tick {
        if self.is_compound() {
            self.unit_duration(ppq) * 3
        } else {
            self.unit_duration(ppq)
        }
    }

    /// Beats per bar
    pub fn beats_per_bar(&self) -> i64 {
        if self.is_compound() {
            self.numerator as i64 / 3
        } else {
            self.numerator as i64
        }
    }

    /// Ticks per bar
    #[inline]
    pub fn bar_duration(&self, ppq: u32) -> Tick {
        self.unit_duration(ppq) * self.numerator as Tick
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TIME SIGNATURE CHANGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Time signature change point. A change always opens a new bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSignatureChange {
    /// Position in ticks
    pub time: Tick,
    /// New time signature
    pub signature: TimeSignature,
}

impl TimeSignatureChange {
    pub fn new(time: Tick, signature: TimeSignature) -> Self {
        Self { time, signature }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MUSICAL POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Musical position: bar (0-based), beat (1-based), fraction of a beat in
/// shortest-note units (0-based) and leftover ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MusicalTime {
    pub bar: i64,
    pub beat: i64,
    pub fraction: i64,
    pub remainder: Tick,
}

impl MusicalTime {
    pub fn new(bar: i64, beat: i64, fraction: i64, remainder: Tick) -> Self {
        Self {
            bar,
            beat,
            fraction,
            remainder,
        }
    }

    /// Start of a bar
    pub fn bar_start(bar: i64) -> Self {
        Self::new(bar, 1, 0, 0)
    }

    /// Display format: "Bar.Beat.Fraction.Remainder" with a 1-based bar
    pub fn to_display_string(&self) -> String {
        format!(
            "{}.{}.{:02}.{:02}",
            self.bar + 1,
            self.beat,
            self.fraction,
            self.remainder
        )
    }

    /// Parse from display string
    pub fn from_display_string(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        if parts.len() != 4 {
            return None;
        }

        let bar = parts[0].parse::<i64>().ok()?.checked_sub(1)?;
        let beat = parts[1].parse::<i64>().ok()?;
        let fraction = parts[2].parse::<i64>().ok()?;
        let remainder = parts[3].parse::<i64>().ok()?;

        Some(Self::new(bar, beat, fraction, remainder))
    }
}

impl fmt::Display for MusicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_display_string())
    }
}

/// A span expressed in bars, beats, fractions and ticks (all 0-based counts)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct MusicalDuration {
    pub bars: i64,
    pub beats: i64,
    pub fractions: i64,
    pub remainder: Tick,
}

impl MusicalDuration {
    pub fn new(bars: i64, beats: i64, fractions: i64, remainder: Tick) -> Self {
        Self {
            bars,
            beats,
            fractions,
            remainder,
        }
    }
}

impl fmt::Display for MusicalDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{:02}.{:02}",
            self.bars, self.beats, self.fractions, self.remainder
        )
    }
}
