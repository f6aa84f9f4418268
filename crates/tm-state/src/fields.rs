//! Time field editing
//!
//! A position or duration shown as musical fields, real time and ticks.
//! Editing any one representation recomputes the others through the
//! converter, so they never drift apart.

use tm_core::{MusicalDuration, MusicalTime, RealTime, Tick, TimelineResult};

use crate::TimeConverter;

/// Common view over an edited time value
pub trait TimeFields {
    /// Value in ticks (a position, or a length for durations)
    fn ticks(&self) -> Tick;

    /// Real time since tick 0, or elapsed real time for durations
    fn real_time(&self) -> RealTime;

    /// Musical fields as shown to the user
    fn display(&self) -> String;
}

// ═══════════════════════════════════════════════════════════════════════════════
// POSITION
// ═══════════════════════════════════════════════════════════════════════════════

/// Absolute position fields
#[derive(Debug, Clone, Copy)]
pub struct PositionFields<'a> {
    converter: &'a TimeConverter,
    tick: Tick,
}

impl<'a> PositionFields<'a> {
    pub fn new(converter: &'a TimeConverter, tick: Tick) -> Self {
        Self { converter, tick }
    }

    pub fn musical(&self) -> MusicalTime {
        self.converter.musical_time(self.tick)
    }

    pub fn set_tick(&mut self, tick: Tick) {
        self.tick = tick;
    }

    /// Rejects fields outside the bar; the position is kept on error
    pub fn set_musical(&mut self, time: &MusicalTime) -> TimelineResult<()> {
        self.tick = self.converter.tick_for(time)?;
        Ok(())
    }

    pub fn set_musical_clamped(&mut self, time: &MusicalTime) {
        self.tick = self.converter.tick_for_clamped(time);
    }

    pub fn set_real_time(&mut self, real_time: RealTime) {
        self.tick = self.converter.tick_for_elapsed_real_time(real_time);
    }
}

impl TimeFields for PositionFields<'_> {
    fn ticks(&self) -> Tick {
        self.tick
    }

    fn real_time(&self) -> RealTime {
        self.converter.real_time_at(self.tick)
    }

    fn display(&self) -> String {
        self.musical().to_display_string()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DURATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Duration fields, measured from a fixed start tick. Never negative.
#[derive(Debug, Clone, Copy)]
pub struct DurationFields<'a> {
    converter: &'a TimeConverter,
    start: Tick,
    duration: Tick,
}

impl<'a> DurationFields<'a> {
    pub fn new(converter: &'a TimeConverter, start: Tick, duration: Tick) -> Self {
        Self {
            converter,
            start,
            duration: duration.max(0),
        }
    }

    pub fn start(&self) -> Tick {
        self.start
    }

    pub fn end(&self) -> Tick {
        self.start.saturating_add(self.duration)
    }

    pub fn musical(&self) -> MusicalDuration {
        self.converter.musical_duration(self.start, self.duration)
    }

    pub fn set_duration(&mut self, duration: Tick) {
        self.duration = duration.max(0);
    }

    pub fn set_musical(&mut self, duration: &MusicalDuration) {
        self.set_duration(self.converter.duration_for(self.start, duration));
    }

    pub fn set_real_time(&mut self, real_time: RealTime) {
        let end = self.converter.tick_for_real_time_from(self.start, real_time);
        self.set_duration(end.saturating_sub(self.start));
    }
}

impl TimeFields for DurationFields<'_> {
    fn ticks(&self) -> Tick {
        self.duration
    }

    fn real_time(&self) -> RealTime {
        self.converter.elapsed_real_time(self.start, self.end())
    }

    fn display(&self) -> String {
        self.musical().to_string()
    }
}
