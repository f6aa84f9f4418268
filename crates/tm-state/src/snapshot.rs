//! Serialized form of both timelines
//!
//! Loading never trusts the input: entries are validated, sorted and
//! de-duplicated (the last entry for a given time wins).

use serde::{Deserialize, Serialize};
use tm_core::{DEFAULT_PPQ, TempoChange, Tick, TimeSignatureChange, TimelineResult};

/// Change lists as written to / read from a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimelineSnapshot {
    /// Tick resolution the change times are expressed in
    pub ticks_per_quarter: u32,
    #[serde(default)]
    pub tempo_changes: Vec<TempoChange>,
    #[serde(default)]
    pub time_signature_changes: Vec<TimeSignatureChange>,
}

impl Default for TimelineSnapshot {
    fn default() -> Self {
        Self {
            ticks_per_quarter: DEFAULT_PPQ,
            tempo_changes: Vec::new(),
            time_signature_changes: Vec::new(),
        }
    }
}

impl TimelineSnapshot {
    pub fn to_json(&self) -> TimelineResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> TimelineResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Validated tempo changes, sorted and unique by time
    pub(crate) fn normalized_tempo_changes(&self) -> TimelineResult<Vec<TempoChange>> {
        for change in &self.tempo_changes {
            change.validate()?;
        }
        Ok(normalize(&self.tempo_changes, |c| c.time, "tempo"))
    }

    /// Validated time signature changes, sorted and unique by time
    pub(crate) fn normalized_signature_changes(&self) -> TimelineResult<Vec<TimeSignatureChange>> {
        for change in &self.time_signature_changes {
            change.signature.validate(self.ticks_per_quarter)?;
        }
        Ok(normalize(
            &self.time_signature_changes,
            |c| c.time,
            "time signature",
        ))
    }
}

fn normalize<T: Copy>(items: &[T], time: impl Fn(&T) -> Tick, what: &str) -> Vec<T> {
    if !items.windows(2).all(|w| time(&w[0]) <= time(&w[1])) {
        log::warn!("Loaded {} changes out of order, sorting", what);
    }

    let mut sorted = items.to_vec();
    // Stable, so equal times keep file order
    sorted.sort_by_key(|item| time(item));

    let mut unique: Vec<T> = Vec::with_capacity(sorted.len());
    for item in sorted {
        if let Some(last) = unique.last_mut() {
            if time(&*last) == time(&item) {
                *last = item;
                continue;
            }
        }
        unique.push(item);
    }

    let dropped = items.len() - unique.len();
    if dropped > 0 {
        log::warn!(
            "Dropped {} duplicate {} change(s) sharing a time",
            dropped,
            what
        );
    }
    unique
}

#[cfg(test)]
mod tests {
    use super::*;
    use tm_core::{Bpm, TimeSignature, TimelineError};

    #[test]
    fn test_normalize_sorts_and_dedupes() {
        let snapshot = TimelineSnapshot {
            tempo_changes: vec![
                TempoChange::new(960, Bpm::from_raw(9_000_000)),
                TempoChange::new(0, Bpm::from_raw(10_000_000)),
                TempoChange::new(960, Bpm::from_raw(11_000_000)),
            ],
            ..Default::default()
        };

        let changes = snapshot.normalized_tempo_changes().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].time, 0);
        // Last in file order wins
        assert_eq!(changes[1].tempo, Bpm::from_raw(11_000_000));
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let snapshot = TimelineSnapshot {
            time_signature_changes: vec![TimeSignatureChange::new(0, TimeSignature::new(7, 0))],
            ..Default::default()
        };
        assert!(matches!(
            snapshot.normalized_signature_changes(),
            Err(TimelineError::InvalidTimeSignature { numerator: 7, denominator: 0 })
        ));

        let json = r#"{ "ticks_per_quarter": 960, "tempo_changes": [ { "time": 0, "tempo": -5 } ] }"#;
        let snapshot = TimelineSnapshot::from_json(json).unwrap();
        assert!(matches!(
            snapshot.normalized_tempo_changes(),
            Err(TimelineError::InvalidTempo(_))
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            TimelineSnapshot::from_json("{ not json"),
            Err(TimelineError::Serialization(_))
        ));
    }
}
