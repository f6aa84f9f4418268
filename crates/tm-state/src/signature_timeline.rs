//! Time Signature Timeline
//!
//! Ordered time signature changes and bar/beat arithmetic. Each change opens a
//! new bar at its own time, so the last bar of the previous run may be short.
//! Bars before the first change use the default signature counted from tick 0
//! (bar 0 starts at tick 0, earlier bars are negative).

use tm_core::{
    MusicalDuration, MusicalTime, Tick, TimeSignature, TimeSignatureChange, TimelineConfig,
    TimelineError, TimelineResult,
};

/// Time signature change points, sorted by time and unique per time
#[derive(Debug, Clone)]
pub struct TimeSignatureTimeline {
    /// Change points (sorted by time)
    changes: Vec<TimeSignatureChange>,
    /// Ticks per quarter note
    ppq: u32,
    /// Signature in force before the first change
    default_signature: TimeSignature,
    /// Ticks per shortest-note fraction
    fraction_duration: Tick,
    /// First bar number of each change's run
    bar_offsets: Vec<i64>,
}

impl TimeSignatureTimeline {
    pub fn new(ppq: u32, default_signature: TimeSignature, fraction_duration: Tick) -> Self {
        Self::from_sorted(ppq, default_signature, fraction_duration, Vec::new())
    }

    pub fn from_config(config: &TimelineConfig) -> Self {
        Self::new(
            config.ticks_per_quarter,
            config.default_time_signature,
            config.fraction_duration(),
        )
    }

    /// Build from changes already validated, sorted and unique by time
    pub(crate) fn from_sorted(
        ppq: u32,
        default_signature: TimeSignature,
        fraction_duration: Tick,
        changes: Vec<TimeSignatureChange>,
    ) -> Self {
        let mut timeline = Self {
            changes,
            ppq,
            default_signature,
            fraction_duration: fraction_duration.max(1),
            bar_offsets: Vec::new(),
        };
        timeline.rebuild_bar_offsets();
        timeline
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn default_signature(&self) -> TimeSignature {
        self.default_signature
    }

    pub fn fraction_duration(&self) -> Tick {
        self.fraction_duration
    }

    pub fn count(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn change(&self, index: usize) -> Option<&TimeSignatureChange> {
        self.changes.get(index)
    }

    pub fn changes(&self) -> &[TimeSignatureChange] {
        &self.changes
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Point queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Index of the last change at or before `t`, `None` before the first
    pub fn change_number_at(&self, t: Tick) -> Option<usize> {
        self.changes.partition_point(|c| c.time <= t).checked_sub(1)
    }

    pub fn signature_at(&self, t: Tick) -> TimeSignature {
        self.change_number_at(t)
            .map(|index| self.changes[index].signature)
            .unwrap_or(self.default_signature)
    }

    /// Signature governing `bar`, and whether a change starts exactly there
    pub fn signature_in_bar(&self, bar: i64) -> (TimeSignature, bool) {
        let start = self.bar_start(bar);
        match self.change_number_at(start) {
            Some(index) => {
                let change = &self.changes[index];
                (change.signature, change.time == start)
            }
            None => (self.default_signature, false),
        }
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Bars
    // ─────────────────────────────────────────────────────────────────────────────

    /// Bar containing `t`
    pub fn bar_number(&self, t: Tick) -> i64 {
        match self.change_number_at(t) {
            Some(index) => {
                let change = &self.changes[index];
                let bar_duration = change.signature.bar_duration(self.ppq) as i128;
                let offset = t as i128 - change.time as i128;
                saturate(self.bar_offsets[index] as i128 + offset / bar_duration)
            }
            None => t.div_euclid(self.default_signature.bar_duration(self.ppq)),
        }
    }

    /// First tick of `bar`
    pub fn bar_start(&self, bar: i64) -> Tick {
        let run = self.bar_offsets.partition_point(|&first| first <= bar);
        match run.checked_sub(1) {
            Some(index) => {
                let change = &self.changes[index];
                let bars = bar as i128 - self.bar_offsets[index] as i128;
                saturate(change.time as i128 + bars * change.signature.bar_duration(self.ppq) as i128)
            }
            None => bar.saturating_mul(self.default_signature.bar_duration(self.ppq)),
        }
    }

    /// `[start, end)` of `bar`; shorter than a full bar when a change cuts it
    pub fn bar_range(&self, bar: i64) -> (Tick, Tick) {
        (self.bar_start(bar), self.bar_start(bar.saturating_add(1)))
    }

    /// `[start, end)` of the bar containing `t`
    pub fn bar_range_for_time(&self, t: Tick) -> (Tick, Tick) {
        self.bar_range(self.bar_number(t))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Musical time
    // ─────────────────────────────────────────────────────────────────────────────

    /// Bar, beat, fraction and remainder for `t`
    pub fn musical_time(&self, t: Tick) -> MusicalTime {
        let bar = self.bar_number(t);
        let bar_start = self.bar_start(bar);
        let beat_duration = self.signature_at(t).beat_duration(self.ppq);

        // Bar starts clamp at the ends of the tick range
        let offset = t.saturating_sub(bar_start);
        let in_beat = offset % beat_duration;
        MusicalTime {
            bar,
            beat: 1 + offset / beat_duration,
            fraction: in_beat / self.fraction_duration,
            remainder: in_beat % self.fraction_duration,
        }
    }

    /// Tick for a musical position, rejecting fields outside the bar's
    /// signature or past the end of a shortened bar
    pub fn tick_for(&self, time: &MusicalTime) -> TimelineResult<Tick> {
        let limits = self.bar_limits(time.bar);

        check_range("beat", time.beat, 1, limits.beats)?;
        check_range("fraction", time.fraction, 0, limits.max_fraction)?;
        check_range("remainder", time.remainder, 0, self.fraction_duration - 1)?;

        let in_beat = time.fraction * self.fraction_duration + time.remainder;
        check_range("remainder", in_beat, 0, limits.beat_duration - 1)?;

        let into_bar = (time.beat - 1) as i128 * limits.beat_duration as i128 + in_beat as i128;
        let tick = saturate(limits.start as i128 + into_bar);
        check_range("position", tick, limits.start, limits.last)?;
        Ok(tick)
    }

    /// Tick for a musical position, clamping each field (and the result)
    /// into the bar
    pub fn tick_for_clamped(&self, time: &MusicalTime) -> Tick {
        let limits = self.bar_limits(time.bar);

        let beat = time.beat.clamp(1, limits.beats);
        let fraction = time.fraction.clamp(0, limits.max_fraction);
        let remainder = time.remainder.clamp(0, self.fraction_duration - 1);
        let in_beat = (fraction * self.fraction_duration + remainder).min(limits.beat_duration - 1);

        let into_bar = (beat - 1)
            .saturating_mul(limits.beat_duration)
            .saturating_add(in_beat);
        let tick = limits.start.saturating_add(into_bar);
        tick.clamp(limits.start, limits.last)
    }

    /// Split `duration` into bars/beats/fractions under the signature at `start`
    pub fn musical_duration(&self, start: Tick, duration: Tick) -> MusicalDuration {
        let signature = self.signature_at(start);
        let bar_duration = signature.bar_duration(self.ppq);
        let beat_duration = signature.beat_duration(self.ppq);

        let in_bar = duration % bar_duration;
        let in_beat = in_bar % beat_duration;
        MusicalDuration {
            bars: duration / bar_duration,
            beats: in_bar / beat_duration,
            fractions: in_beat / self.fraction_duration,
            remainder: in_beat % self.fraction_duration,
        }
    }

    /// Inverse of [`musical_duration`](Self::musical_duration)
    pub fn duration_for(&self, start: Tick, duration: &MusicalDuration) -> Tick {
        let signature = self.signature_at(start);
        let ticks = duration.bars as i128 * signature.bar_duration(self.ppq) as i128
            + duration.beats as i128 * signature.beat_duration(self.ppq) as i128
            + duration.fractions as i128 * self.fraction_duration as i128
            + duration.remainder as i128;
        saturate(ticks)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert or replace the change at `t`, returning its index
    pub fn insert(&mut self, t: Tick, signature: TimeSignature) -> TimelineResult<usize> {
        signature.validate(self.ppq)?;

        let change = TimeSignatureChange::new(t, signature);
        let index = match self.changes.binary_search_by_key(&t, |c| c.time) {
            Ok(index) => {
                self.changes[index] = change;
                index
            }
            Err(index) => {
                self.changes.insert(index, change);
                index
            }
        };

        self.rebuild_bar_offsets();
        log::debug!("Time signature {} at tick {}, index {}", signature, t, index);
        Ok(index)
    }

    /// Remove the change at `index`; later indices shift down by one
    pub fn remove(&mut self, index: usize) -> TimelineResult<TimeSignatureChange> {
        if index >= self.changes.len() {
            return Err(TimelineError::IndexError {
                index,
                len: self.changes.len(),
            });
        }

        let removed = self.changes.remove(index);
        self.rebuild_bar_offsets();
        log::debug!("Removed time signature {} at tick {}", index, removed.time);
        Ok(removed)
    }

    pub fn clear(&mut self) {
        self.changes.clear();
        self.rebuild_bar_offsets();
    }

    fn bar_limits(&self, bar: i64) -> BarLimits {
        let (start, end) = self.bar_range(bar);
        let signature = self.signature_at(start);
        let beat_duration = signature.beat_duration(self.ppq);

        // The bar holding Tick::MAX has its end clamped to it
        let last = if end == Tick::MAX && self.bar_number(Tick::MAX) == bar {
            Tick::MAX
        } else {
            end.saturating_sub(1).max(start)
        };
        BarLimits {
            start,
            last,
            beat_duration,
            beats: signature.beats_per_bar(),
            max_fraction: ((beat_duration - 1) / self.fraction_duration).max(0),
        }
    }

    fn rebuild_bar_offsets(&mut self) {
        self.bar_offsets.clear();
        self.bar_offsets.reserve(self.changes.len());

        let Some(first) = self.changes.first() else {
            return;
        };

        // Bars of the default signature before the first change, counted
        // from tick 0; a cut bar still counts
        let mut bar = div_ceil(
            first.time as i128,
            self.default_signature.bar_duration(self.ppq) as i128,
        );
        for (index, change) in self.changes.iter().enumerate() {
            self.bar_offsets.push(saturate(bar));
            if let Some(next) = self.changes.get(index + 1) {
                bar += div_ceil(
                    next.time as i128 - change.time as i128,
                    change.signature.bar_duration(self.ppq) as i128,
                );
            }
        }
    }
}

struct BarLimits {
    start: Tick,
    /// Last tick inside the bar
    last: Tick,
    beat_duration: Tick,
    beats: i64,
    max_fraction: i64,
}

fn check_range(field: &'static str, value: i64, min: i64, max: i64) -> TimelineResult<()> {
    if value < min || value > max {
        return Err(TimelineError::OutOfRange {
            field,
            value,
            min,
            max,
        });
    }
    Ok(())
}

/// Ceiling division for a positive divisor
/// Narrow back to a tick, clamping at the ends of the range
fn saturate(value: i128) -> i64 {
    value.clamp(i64::MIN as i128, i64::MAX as i128) as i64
}

fn div_ceil(value: i128, divisor: i128) -> i128 {
    let quotient = value.div_euclid(divisor);
    if value.rem_euclid(divisor) == 0 {
        quotient
    } else {
        quotient + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const Q: u32 = 960;

    fn timeline() -> TimeSignatureTimeline {
        TimeSignatureTimeline::new(Q, TimeSignature::COMMON, 60)
    }

    #[test]
    fn test_constant_four_four_bars() {
        let tl = timeline();
        for bar in -3..50 {
            assert_eq!(tl.bar_start(bar + 1) - tl.bar_start(bar), 4 * Q as Tick);
        }
        assert_eq!(tl.bar_number(0), 0);
        assert_eq!(tl.bar_number(3839), 0);
        assert_eq!(tl.bar_number(3840), 1);
        assert_eq!(tl.bar_number(-1), -1);
    }

    #[test]
    fn test_runs_use_multiplication() {
        let mut tl = timeline();
        tl.insert(3840 * 2, TimeSignature::WALTZ).unwrap();

        assert_eq!(tl.bar_number(3840 * 2), 2);
        assert_eq!(tl.bar_start(3), 3840 * 2 + 2880);
        // A million bars in, still exact
        let far = 1_000_000;
        assert_eq!(tl.bar_start(far), 3840 * 2 + (far - 2) * 2880);
        assert_eq!(tl.bar_number(tl.bar_start(far)), far);
    }

    #[test]
    fn test_change_mid_bar_cuts_bar() {
        let mut tl = timeline();
        // Halfway through bar 1
        tl.insert(3840 + 1920, TimeSignature::new(6, 8)).unwrap();

        assert_eq!(tl.bar_range(1), (3840, 5760));
        assert_eq!(tl.bar_start(2), 5760);
        assert_eq!(tl.bar_range(2), (5760, 5760 + 2880));
        assert_eq!(tl.signature_in_bar(2), (TimeSignature::new(6, 8), true));
        assert_eq!(tl.signature_in_bar(3), (TimeSignature::new(6, 8), false));
        assert_eq!(tl.signature_in_bar(1), (TimeSignature::COMMON, false));
    }

    #[test]
    fn test_late_first_change_counts_partial_bar() {
        let mut tl = timeline();
        tl.insert(1000, TimeSignature::WALTZ).unwrap();

        assert_eq!(tl.bar_range(0), (0, 1000));
        assert_eq!(tl.bar_number(999), 0);
        assert_eq!(tl.bar_number(1000), 1);
        assert_eq!(tl.bar_start(2), 1000 + 2880);
    }

    #[test]
    fn test_musical_time_round_trip() {
        let mut tl = timeline();
        tl.insert(3840, TimeSignature::new(6, 8)).unwrap();

        for t in [0, 59, 60, 961, 3839, 3840, 3840 + 1440 + 61, 100_000, -1, -3841] {
            let mt = tl.musical_time(t);
            assert_eq!(tl.tick_for(&mt).unwrap(), t, "tick {} -> {}", t, mt);
        }

        // 6/8: dotted-quarter beats, two per bar
        let mt = tl.musical_time(3840 + 1440 + 61);
        assert_eq!(mt, MusicalTime::new(1, 2, 1, 1));
    }

    #[test]
    fn test_strict_rejects_out_of_range() {
        let mut tl = timeline();
        tl.insert(5760, TimeSignature::WALTZ).unwrap();

        assert!(matches!(
            tl.tick_for(&MusicalTime::new(0, 5, 0, 0)),
            Err(TimelineError::OutOfRange { field: "beat", value: 5, min: 1, max: 4 })
        ));
        assert!(matches!(
            tl.tick_for(&MusicalTime::new(0, 0, 0, 0)),
            Err(TimelineError::OutOfRange { field: "beat", .. })
        ));
        assert!(matches!(
            tl.tick_for(&MusicalTime::new(0, 1, 16, 0)),
            Err(TimelineError::OutOfRange { field: "fraction", value: 16, min: 0, max: 15 })
        ));
        assert!(matches!(
            tl.tick_for(&MusicalTime::new(0, 1, 0, 60)),
            Err(TimelineError::OutOfRange { field: "remainder", .. })
        ));
        // Bar 1 is cut to two beats by the 3/4 change
        assert!(matches!(
            tl.tick_for(&MusicalTime::new(1, 3, 0, 0)),
            Err(TimelineError::OutOfRange { field: "position", .. })
        ));
        assert_eq!(tl.tick_for(&MusicalTime::new(1, 2, 15, 59)).unwrap(), 5759);
    }

    #[test]
    fn test_clamped_variant() {
        let mut tl = timeline();
        tl.insert(5760, TimeSignature::WALTZ).unwrap();

        assert_eq!(tl.tick_for_clamped(&MusicalTime::new(0, 9, 0, 0)), 3 * 960);
        assert_eq!(tl.tick_for_clamped(&MusicalTime::new(0, -2, -1, -1)), 0);
        assert_eq!(tl.tick_for_clamped(&MusicalTime::new(0, 1, 99, 99)), 959);
        assert_eq!(tl.tick_for_clamped(&MusicalTime::new(1, 4, 0, 0)), 5759);
    }

    #[test]
    fn test_musical_duration() {
        let mut tl = timeline();
        tl.insert(3840, TimeSignature::WALTZ).unwrap();

        let d = tl.musical_duration(0, 3840 + 960 + 70);
        assert_eq!(d, MusicalDuration::new(1, 1, 1, 10));
        assert_eq!(tl.duration_for(0, &d), 3840 + 960 + 70);

        // Same span measured from inside the 3/4 run
        let d = tl.musical_duration(3840, 3840 + 960 + 70);
        assert_eq!(d, MusicalDuration::new(1, 2, 1, 10));
        assert_eq!(tl.duration_for(3840, &d), 3840 + 960 + 70);
    }

    #[test]
    fn test_invalid_signature_rejected() {
        let mut tl = timeline();
        assert!(matches!(
            tl.insert(0, TimeSignature::new(0, 4)),
            Err(TimelineError::InvalidTimeSignature { numerator: 0, denominator: 4 })
        ));
        assert!(tl.insert(0, TimeSignature::new(3, -4)).is_err());
        assert!(tl.is_empty());
    }

    #[test]
    fn test_remove_renumbers() {
        let mut tl = timeline();
        tl.insert(0, TimeSignature::COMMON).unwrap();
        tl.insert(3840, TimeSignature::WALTZ).unwrap();
        tl.insert(3840 + 2880, TimeSignature::CUT).unwrap();

        tl.remove(1).unwrap();
        assert_eq!(tl.change_number_at(3840 + 2880), Some(1));
        // 4/4 now runs until the 2/2 change, cutting bar 1
        assert_eq!(tl.bar_range(1), (3840, 3840 + 2880));
        assert_eq!(tl.signature_at(3840), TimeSignature::COMMON);
        assert!(matches!(tl.remove(2), Err(TimelineError::IndexError { .. })));
    }
}
