//! Time-related types: musical ticks and real (wall-clock) time

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Neg, Sub, SubAssign};

/// Musical time in ticks from composition start.
///
/// Signed so that pre-roll positions before zero are representable.
pub type Tick = i64;

/// Default pulses per quarter note
pub const DEFAULT_PPQ: u32 = 960;

/// Elapsed wall-clock time in seconds. Negative values are valid durations
/// (a span measured backwards).
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RealTime(f64);

impl RealTime {
    pub const ZERO: Self = Self(0.0);

    #[inline]
    pub fn from_seconds(seconds: f64) -> Self {
        Self(seconds)
    }

    #[inline]
    pub fn from_millis(ms: f64) -> Self {
        Self(ms / 1000.0)
    }

    #[inline]
    pub fn as_seconds(self) -> f64 {
        self.0
    }

    #[inline]
    pub fn as_millis(self) -> f64 {
        self.0 * 1000.0
    }

    #[inline]
    pub fn is_negative(self) -> bool {
        self.0 < 0.0
    }

    #[inline]
    pub fn abs(self) -> Self {
        Self(self.0.abs())
    }
}

impl Add for RealTime {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl AddAssign for RealTime {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for RealTime {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl SubAssign for RealTime {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for RealTime {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl fmt::Display for RealTime {
    /// `h:mm:ss.mmm`, with a leading `-` for negative durations
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0.0 { "-" } else { "" };
        let total_ms = (self.0.abs() * 1000.0).round() as u64;
        let ms = total_ms % 1000;
        let secs = (total_ms / 1000) % 60;
        let mins = (total_ms / 60_000) % 60;
        let hours = total_ms / 3_600_000;
        write!(f, "{}{}:{:02}:{:02}.{:03}", sign, hours, mins, secs, ms)
    }
}
