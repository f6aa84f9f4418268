//! Time Converter
//!
//! Composes the tempo and time signature timelines:
//! - Ticks <-> bar/beat/fraction/remainder
//! - Ticks <-> real time (across constant and ramped tempo segments)
//! - Quarter-note tempo <-> beat tempo for display
//!
//! Every successful mutation notifies listeners synchronously; a listener
//! only ever sees a shared reference, so it cannot mutate from inside the
//! callback.

use tm_core::{
    Bpm, MusicalDuration, MusicalTime, RealTime, TempoChange, Tick, TimeSignature,
    TimeSignatureChange, TimelineConfig, TimelineError, TimelineResult,
};

use crate::{ChangeKind, ChangeNotifier, TempoTimeline, TimeSignatureTimeline, TimelineSnapshot};

/// Tempo + time signature timeline pair for one document
#[derive(Debug)]
pub struct TimeConverter {
    config: TimelineConfig,
    pub(crate) tempo: TempoTimeline,
    pub(crate) signatures: TimeSignatureTimeline,
    notifier: ChangeNotifier,
}

impl Default for TimeConverter {
    fn default() -> Self {
        Self::with_valid_config(TimelineConfig::default())
    }
}

impl TimeConverter {
    pub fn new(config: TimelineConfig) -> TimelineResult<Self> {
        config.validate()?;
        Ok(Self::with_valid_config(config))
    }

    /// Build a converter whose resolution comes from the snapshot
    pub fn from_snapshot(config: TimelineConfig, snapshot: &TimelineSnapshot) -> TimelineResult<Self> {
        let mut converter = Self::new(config.with_ticks_per_quarter(snapshot.ticks_per_quarter))?;
        converter.replace_from(snapshot)?;
        Ok(converter)
    }

    fn with_valid_config(config: TimelineConfig) -> Self {
        Self {
            tempo: TempoTimeline::from_config(&config),
            signatures: TimeSignatureTimeline::from_config(&config),
            notifier: ChangeNotifier::new(),
            config,
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn ticks_per_quarter(&self) -> u32 {
        self.config.ticks_per_quarter
    }

    pub fn tempo_timeline(&self) -> &TempoTimeline {
        &self.tempo
    }

    pub fn signature_timeline(&self) -> &TimeSignatureTimeline {
        &self.signatures
    }

    pub fn notifier(&self) -> &ChangeNotifier {
        &self.notifier
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Tempo queries
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn tempo_at(&self, t: Tick) -> Bpm {
        self.tempo.tempo_at(t)
    }

    pub fn tempo_change_number_at(&self, t: Tick) -> Option<usize> {
        self.tempo.change_number_at(t)
    }

    pub fn ramp_info(&self, index: usize) -> TimelineResult<(bool, Bpm)> {
        self.tempo.ramp_info(index)
    }

    pub fn min_tempo(&self) -> Bpm {
        self.tempo.min_tempo()
    }

    pub fn max_tempo(&self) -> Bpm {
        self.tempo.max_tempo()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Real time
    // ─────────────────────────────────────────────────────────────────────────────

    /// Real time between two ticks, split at every tempo change crossed.
    /// Negative when `from > to`.
    pub fn elapsed_real_time(&self, from: Tick, to: Tick) -> RealTime {
        self.tempo.elapsed_real_time(from, to)
    }

    /// Real time from tick 0 to `t`
    pub fn real_time_at(&self, t: Tick) -> RealTime {
        self.tempo.real_time_at(t)
    }

    /// Tick reached `real_time` after tick 0 (nearest tick)
    pub fn tick_for_elapsed_real_time(&self, real_time: RealTime) -> Tick {
        self.tempo.tick_at_real_time(real_time)
    }

    /// Tick reached `real_time` after `start`
    pub fn tick_for_real_time_from(&self, start: Tick, real_time: RealTime) -> Tick {
        self.tempo
            .tick_at_real_time(self.tempo.real_time_at(start) + real_time)
    }

    /// Quarter notes per minute expressed in the signature's beat unit.
    /// Display only.
    pub fn qpm_to_bpm(tempo: Bpm, signature: &TimeSignature) -> f64 {
        tempo.as_qpm() / quarters_per_beat(signature)
    }

    /// Inverse of [`qpm_to_bpm`](Self::qpm_to_bpm)
    pub fn bpm_to_qpm(bpm: f64, signature: &TimeSignature) -> TimelineResult<Bpm> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(TimelineError::InvalidTempo(bpm));
        }
        Bpm::from_qpm(bpm * quarters_per_beat(signature))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Bars and musical time
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn signature_at(&self, t: Tick) -> TimeSignature {
        self.signatures.signature_at(t)
    }

    pub fn signature_change_number_at(&self, t: Tick) -> Option<usize> {
        self.signatures.change_number_at(t)
    }

    pub fn bar_number(&self, t: Tick) -> i64 {
        self.signatures.bar_number(t)
    }

    pub fn bar_start(&self, bar: i64) -> Tick {
        self.signatures.bar_start(bar)
    }

    pub fn bar_range(&self, bar: i64) -> (Tick, Tick) {
        self.signatures.bar_range(bar)
    }

    pub fn bar_range_for_time(&self, t: Tick) -> (Tick, Tick) {
        self.signatures.bar_range_for_time(t)
    }

    pub fn signature_in_bar(&self, bar: i64) -> (TimeSignature, bool) {
        self.signatures.signature_in_bar(bar)
    }

    pub fn musical_time(&self, t: Tick) -> MusicalTime {
        self.signatures.musical_time(t)
    }

    /// Strict: out-of-range fields are an error
    pub fn tick_for(&self, time: &MusicalTime) -> TimelineResult<Tick> {
        self.signatures.tick_for(time)
    }

    /// Lenient: out-of-range fields are clamped
    pub fn tick_for_clamped(&self, time: &MusicalTime) -> Tick {
        self.signatures.tick_for_clamped(time)
    }

    pub fn musical_duration(&self, start: Tick, duration: Tick) -> MusicalDuration {
        self.signatures.musical_duration(start, duration)
    }

    pub fn duration_for(&self, start: Tick, duration: &MusicalDuration) -> Tick {
        self.signatures.duration_for(start, duration)
    }

    /// Real time from tick 0 to a musical position
    pub fn real_time_for(&self, time: &MusicalTime) -> TimelineResult<RealTime> {
        Ok(self.real_time_at(self.tick_for(time)?))
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn insert_tempo(&mut self, t: Tick, tempo: f64, target: Option<f64>) -> TimelineResult<usize> {
        let index = self.tempo.insert(t, tempo, target)?;
        self.notify(ChangeKind::Tempo);
        Ok(index)
    }

    pub fn insert_tempo_change(&mut self, change: TempoChange) -> TimelineResult<usize> {
        let index = self.tempo.insert_change(change)?;
        self.notify(ChangeKind::Tempo);
        Ok(index)
    }

    pub fn remove_tempo(&mut self, index: usize) -> TimelineResult<TempoChange> {
        let removed = self.tempo.remove(index)?;
        self.notify(ChangeKind::Tempo);
        Ok(removed)
    }

    pub fn insert_signature(&mut self, t: Tick, signature: TimeSignature) -> TimelineResult<usize> {
        let index = self.signatures.insert(t, signature)?;
        self.notify(ChangeKind::TimeSignature);
        Ok(index)
    }

    pub fn remove_signature(&mut self, index: usize) -> TimelineResult<TimeSignatureChange> {
        let removed = self.signatures.remove(index)?;
        self.notify(ChangeKind::TimeSignature);
        Ok(removed)
    }

    /// Drop every change point from both timelines
    pub fn clear(&mut self) {
        self.clear_silently();
        self.notify(ChangeKind::Tempo);
        self.notify(ChangeKind::TimeSignature);
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Persistence
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn snapshot(&self) -> TimelineSnapshot {
        TimelineSnapshot {
            ticks_per_quarter: self.ticks_per_quarter(),
            tempo_changes: self.tempo.changes().to_vec(),
            time_signature_changes: self.signatures.changes().to_vec(),
        }
    }

    /// Replace both timelines from a snapshot. Invalid input leaves the
    /// converter untouched.
    pub fn load(&mut self, snapshot: &TimelineSnapshot) -> TimelineResult<()> {
        self.replace_from(snapshot)?;
        self.notify(ChangeKind::Tempo);
        self.notify(ChangeKind::TimeSignature);
        Ok(())
    }

    pub(crate) fn replace_from(&mut self, snapshot: &TimelineSnapshot) -> TimelineResult<()> {
        if snapshot.ticks_per_quarter != self.ticks_per_quarter() {
            return Err(TimelineError::InvalidConfig(format!(
                "snapshot resolution {} does not match document resolution {}",
                snapshot.ticks_per_quarter,
                self.ticks_per_quarter()
            )));
        }

        let tempo_changes = snapshot.normalized_tempo_changes()?;
        let signature_changes = snapshot.normalized_signature_changes()?;

        self.tempo = TempoTimeline::from_sorted(
            self.config.ticks_per_quarter,
            self.config.default_tempo,
            tempo_changes,
        );
        self.signatures = TimeSignatureTimeline::from_sorted(
            self.config.ticks_per_quarter,
            self.config.default_time_signature,
            self.config.fraction_duration(),
            signature_changes,
        );
        log::debug!(
            "Loaded timeline: {} tempo, {} time signature changes",
            self.tempo.count(),
            self.signatures.count()
        );
        Ok(())
    }

    pub(crate) fn clear_silently(&mut self) {
        self.tempo.clear();
        self.signatures.clear();
    }

    fn notify(&self, kind: ChangeKind) {
        self.notifier.notify(kind, self);
    }
}

/// Quarter notes in one counted beat (1.5 for 6/8, 2 for 2/2)
fn quarters_per_beat(signature: &TimeSignature) -> f64 {
    let unit = 4.0 / signature.denominator.max(1) as f64;
    if signature.is_compound() {
        unit * 3.0
    } else {
        unit
    }
}
