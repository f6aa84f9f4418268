//! Tempo Timeline
//!
//! Ordered tempo change points with:
//! - Point queries with linear ramp interpolation
//! - Index lookup by time (indices shift on insert/remove)
//! - Tick <-> real time through the closed-form ramp integral
//!
//! ## Ramp integral
//! Inside a ramp tempo is linear in *ticks*: `T(x) = T0 + k*x` with
//! `k = (T1 - T0) / span`. Seconds elapsed over `dx` ticks are
//! `∫ 60 / (Q * T(x)) dx = 60 / (Q * k) * ln(T(dx) / T0)`, which inverts to
//! `dx = (T0 / k) * (exp(s * Q * k / 60) - 1)`.

use tm_core::{
    Bpm, RealTime, TempoChange, TempoRamp, Tick, TimelineConfig, TimelineError, TimelineResult,
};

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPO TIMELINE
// ═══════════════════════════════════════════════════════════════════════════════

/// Tempo change points, sorted by time and unique per time
#[derive(Debug, Clone)]
pub struct TempoTimeline {
    /// Change points (sorted by time)
    changes: Vec<TempoChange>,
    /// Ticks per quarter note
    ppq: u32,
    /// Tempo in force before the first change
    default_tempo: Bpm,
    /// Seconds from the first change (or tick 0) to each change
    prefix_seconds: Vec<f64>,
    /// Seconds from the same origin to tick 0
    zero_offset: f64,
}

impl TempoTimeline {
    pub fn new(ppq: u32, default_tempo: Bpm) -> Self {
        Self::from_sorted(ppq, default_tempo, Vec::new())
    }

    pub fn from_config(config: &TimelineConfig) -> Self {
        Self::new(config.ticks_per_quarter, config.default_tempo)
    }

    /// Build from changes already validated, sorted and unique by time
    pub(crate) fn from_sorted(ppq: u32, default_tempo: Bpm, changes: Vec<TempoChange>) -> Self {
        let mut timeline = Self {
            changes,
            ppq,
            default_tempo,
            prefix_seconds: Vec::new(),
            zero_offset: 0.0,
        };
        timeline.rebuild_cache();
        timeline
    }

    pub fn ppq(&self) -> u32 {
        self.ppq
    }

    pub fn default_tempo(&self) -> Bpm {
        self.default_tempo
    }

    pub fn count(&self) -> usize {
        self.changes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn change(&self, index: usize) -> Option<&TempoChange> {
        self.changes.get(index)
    }

    /// All change points, in time order
    pub fn changes(&self) -> &[TempoChange] {
        &self.changes
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Point queries
    // ─────────────────────────────────────────────────────────────────────────────

    /// Index of the last change at or before `t`, `None` before the first
    pub fn change_number_at(&self, t: Tick) -> Option<usize> {
        self.changes.partition_point(|c| c.time <= t).checked_sub(1)
    }

    /// Tempo in force at `t`
    pub fn tempo_at(&self, t: Tick) -> Bpm {
        let Some(index) = self.change_number_at(t) else {
            return self.default_tempo;
        };
        let change = &self.changes[index];

        // t < next.time here, so the offset stays inside the span
        match self.segment_ramp(index) {
            Some((from, to, span)) => {
                let offset = ticks_between(change.time, t);
                let delta = to.raw() as i128 - from.raw() as i128;
                let step = match delta.checked_mul(offset) {
                    Some(product) => product / span,
                    None => (delta as f64 * (offset as f64 / span as f64)) as i128,
                };
                let raw = from.raw() as i128 + step;
                Bpm::from_raw(raw as i64)
            }
            None => change.tempo,
        }
    }

    /// `(is_ramping, target)`. Constant points report their own tempo as the
    /// target; `ToNext` resolves to the following point's tempo.
    pub fn ramp_info(&self, index: usize) -> TimelineResult<(bool, Bpm)> {
        let change = self.changes.get(index).ok_or(TimelineError::IndexError {
            index,
            len: self.changes.len(),
        })?;

        Ok(match change.ramp {
            TempoRamp::Constant => (false, change.tempo),
            TempoRamp::To(target) => (true, target),
            TempoRamp::ToNext => (
                true,
                self.changes
                    .get(index + 1)
                    .map(|next| next.tempo)
                    .unwrap_or(change.tempo),
            ),
        })
    }

    /// Lowest tempo reached anywhere on the timeline
    pub fn min_tempo(&self) -> Bpm {
        self.tempo_extents().0
    }

    /// Highest tempo reached anywhere on the timeline
    pub fn max_tempo(&self) -> Bpm {
        self.tempo_extents().1
    }

    fn tempo_extents(&self) -> (Bpm, Bpm) {
        if self.changes.is_empty() {
            return (self.default_tempo, self.default_tempo);
        }
        // The default governs every tick before the first change
        let mut min = self.default_tempo;
        let mut max = self.default_tempo;
        if self.changes[0].time == Tick::MIN {
            min = Bpm::from_raw(i64::MAX);
            max = Bpm::from_raw(i64::MIN);
        }
        for (index, change) in self.changes.iter().enumerate() {
            min = min.min(change.tempo);
            max = max.max(change.tempo);
            // A ramp on the last point never runs
            if let Some((_, target, _)) = self.segment_ramp(index) {
                min = min.min(target);
                max = max.max(target);
            }
        }
        (min, max)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────────

    /// Insert or replace the change at `t`, returning its index.
    ///
    /// Tempo and target are quarter notes per minute; both must be finite and
    /// positive. On error the timeline is left untouched.
    pub fn insert(&mut self, t: Tick, tempo: f64, target: Option<f64>) -> TimelineResult<usize> {
        let change = TempoChange::from_qpm(t, tempo, target)?;
        self.insert_change(change)
    }

    /// Insert or replace a fixed-point change, returning its index
    pub fn insert_change(&mut self, change: TempoChange) -> TimelineResult<usize> {
        change.validate()?;

        let index = match self.changes.binary_search_by_key(&change.time, |c| c.time) {
            Ok(index) => {
                self.changes[index] = change;
                index
            }
            Err(index) => {
                self.changes.insert(index, change);
                index
            }
        };

        self.rebuild_cache();
        log::debug!(
            "Tempo change at tick {} -> {} ({:?}), index {}",
            change.time,
            change.tempo,
            change.ramp,
            index
        );
        Ok(index)
    }

    /// Remove the change at `index`; later indices shift down by one
    pub fn remove(&mut self, index: usize) -> TimelineResult<TempoChange> {
        if index >= self.changes.len() {
            return Err(TimelineError::IndexError {
                index,
                len: self.changes.len(),
            });
        }

        let removed = self.changes.remove(index);
        self.rebuild_cache();
        log::debug!("Removed tempo change {} at tick {}", index, removed.time);
        Ok(removed)
    }

    /// Remove every change; the default tempo applies everywhere
    pub fn clear(&mut self) {
        self.changes.clear();
        self.rebuild_cache();
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Real time
    // ─────────────────────────────────────────────────────────────────────────────

    /// Real time elapsed from tick 0 to `t` (negative before zero)
    pub fn real_time_at(&self, t: Tick) -> RealTime {
        RealTime::from_seconds(self.seconds_from_origin(t) - self.zero_offset)
    }

    /// Real time elapsed between two ticks; negative when `from > to`
    pub fn elapsed_real_time(&self, from: Tick, to: Tick) -> RealTime {
        RealTime::from_seconds(self.seconds_from_origin(to) - self.seconds_from_origin(from))
    }

    /// Tick reached after `real_time` from tick 0, rounded to the nearest tick
    pub fn tick_at_real_time(&self, real_time: RealTime) -> Tick {
        let seconds = real_time.as_seconds() + self.zero_offset;
        let origin = self.origin();

        if self.changes.is_empty() || seconds < 0.0 {
            let dx = seconds * self.ppq as f64 * self.default_tempo.as_qpm() / 60.0;
            return round_tick(origin as f64 + dx);
        }

        let index = self
            .prefix_seconds
            .partition_point(|&s| s <= seconds)
            .saturating_sub(1);
        let change = &self.changes[index];
        let mut dx = self.invert_segment(index, seconds - self.prefix_seconds[index]);
        if let Some(next) = self.changes.get(index + 1) {
            dx = dx.clamp(0.0, ticks_between(change.time, next.time) as f64);
        }
        round_tick(change.time as f64 + dx)
    }

    /// Origin of the prefix table: the first change, or tick 0 when empty
    fn origin(&self) -> Tick {
        self.changes.first().map(|c| c.time).unwrap_or(0)
    }

    /// Seconds from the origin to `t`, under the default tempo before it
    fn seconds_from_origin(&self, t: Tick) -> f64 {
        let Some(index) = self.change_number_at(t) else {
            let dx = ticks_between(self.origin(), t) as f64;
            return dx * 60.0 / (self.ppq as f64 * self.default_tempo.as_qpm());
        };
        let dx = ticks_between(self.changes[index].time, t) as f64;
        self.prefix_seconds[index] + self.segment_seconds(index, dx)
    }

    /// Effective ramp of segment `index`: `(start, end, span)`, or `None`
    /// when the tempo holds (constant point, or no following point)
    fn segment_ramp(&self, index: usize) -> Option<(Bpm, Bpm, i128)> {
        let change = &self.changes[index];
        let next = self.changes.get(index + 1)?;
        let target = match change.ramp {
            TempoRamp::Constant => return None,
            TempoRamp::To(target) => target,
            TempoRamp::ToNext => next.tempo,
        };
        Some((change.tempo, target, ticks_between(change.time, next.time)))
    }

    /// Seconds for the first `dx` ticks of segment `index`
    fn segment_seconds(&self, index: usize, dx: f64) -> f64 {
        let q = self.ppq as f64;
        match self.segment_ramp(index) {
            Some((from, to, span)) if from != to => {
                let t0 = from.as_qpm();
                let k = (to.as_qpm() - t0) / span as f64;
                60.0 / (q * k) * (k * dx / t0).ln_1p()
            }
            _ => dx * 60.0 / (q * self.changes[index].tempo.as_qpm()),
        }
    }

    /// Ticks into segment `index` after `seconds` of real time
    fn invert_segment(&self, index: usize, seconds: f64) -> f64 {
        let q = self.ppq as f64;
        match self.segment_ramp(index) {
            Some((from, to, span)) if from != to => {
                let t0 = from.as_qpm();
                let k = (to.as_qpm() - t0) / span as f64;
                (t0 / k) * (seconds * q * k / 60.0).exp_m1()
            }
            _ => seconds * q * self.changes[index].tempo.as_qpm() / 60.0,
        }
    }

    fn rebuild_cache(&mut self) {
        self.prefix_seconds.clear();
        self.prefix_seconds.reserve(self.changes.len());

        let mut total = 0.0;
        for index in 0..self.changes.len() {
            self.prefix_seconds.push(total);
            if let Some(next) = self.changes.get(index + 1) {
                let span = ticks_between(self.changes[index].time, next.time) as f64;
                total += self.segment_seconds(index, span);
            }
        }

        self.zero_offset = self.seconds_from_origin(0);
        log::trace!(
            "Rebuilt tempo cache: {} segments, zero offset {:.6}s",
            self.changes.len(),
            self.zero_offset
        );
    }
}

/// Signed distance `to - from`, exact over the whole tick range
fn ticks_between(from: Tick, to: Tick) -> i128 {
    to as i128 - from as i128
}

/// Nearest tick; `as` saturates past the ends of the range
fn round_tick(ticks: f64) -> Tick {
    ticks.round() as Tick
}
