//! SharedTimeline Integration Tests
//!
//! Tests for:
//! - Readers on other threads seeing only complete edits
//! - Listener dispatch order and reentrancy
//! - Loading unsorted / duplicated / invalid snapshots through a document

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;

use parking_lot::Mutex;
use tm_core::{Bpm, TempoChange, TimeSignature, TimeSignatureChange, TimelineConfig, TimelineError};
use tm_state::{ChangeKind, Document, SharedTimeline, TimelineSnapshot};

// ═══════════════════════════════════════════════════════════════════════════════
// HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

const READERS: usize = 4;
const EDITS: i64 = 200;

fn qpm(value: f64) -> Bpm {
    Bpm::from_qpm(value).unwrap()
}

// ═══════════════════════════════════════════════════════════════════════════════
// READERS VS WRITER
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_readers_see_complete_edits() {
    let shared = SharedTimeline::default();
    let done = Arc::new(AtomicBool::new(false));

    // Every edit inserts a pair of points with the same tempo, so a reader
    // must never see an odd count or a mismatched pair
    let readers: Vec<_> = (0..READERS)
        .map(|_| {
            let handle = shared.clone();
            let done = Arc::clone(&done);
            thread::spawn(move || {
                let mut observations = 0usize;
                while !done.load(Ordering::Acquire) {
                    let timeline = handle.read();
                    let changes = timeline.tempo_timeline().changes();
                    assert_eq!(changes.len() % 2, 0);
                    for pair in changes.chunks(2) {
                        assert_eq!(pair[0].tempo, pair[1].tempo);
                    }
                    // Cache is rebuilt before the lock is released
                    if let Some(last) = changes.last() {
                        let elapsed = timeline.elapsed_real_time(0, last.time + 960);
                        assert_eq!(timeline.tick_for_elapsed_real_time(elapsed), last.time + 960);
                    }
                    observations += 1;
                }
                observations
            })
        })
        .collect();

    for edit in 0..EDITS {
        let tempo = 60.0 + edit as f64;
        shared
            .load(&TimelineSnapshot {
                tempo_changes: (0..=edit)
                    .flat_map(|i| {
                        let t = i * 2000;
                        [
                            TempoChange::new(t, qpm(tempo)),
                            TempoChange::new(t + 1000, qpm(tempo)),
                        ]
                    })
                    .collect(),
                ..Default::default()
            })
            .unwrap();
    }
    done.store(true, Ordering::Release);

    for reader in readers {
        reader.join().unwrap();
    }
    assert_eq!(shared.read().tempo_timeline().count(), 2 * EDITS as usize);
}

#[test]
fn test_concurrent_writers_serialize() {
    let shared = SharedTimeline::default();
    let notifications = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&notifications);
    shared.register(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let writers: Vec<_> = (0..4)
        .map(|w| {
            let handle = shared.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    handle
                        .insert_tempo((w * 50 + i) * 960, 100.0 + i as f64, None)
                        .unwrap();
                }
            })
        })
        .collect();
    for writer in writers {
        writer.join().unwrap();
    }

    assert_eq!(shared.read().tempo_timeline().count(), 200);
    assert_eq!(notifications.load(Ordering::SeqCst), 200);
}

// ═══════════════════════════════════════════════════════════════════════════════
// NOTIFICATION
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_listeners_run_in_registration_order() {
    let shared = SharedTimeline::default();
    let order = Arc::new(Mutex::new(Vec::new()));

    for name in ["ruler", "transport", "editor"] {
        let sink = Arc::clone(&order);
        shared.register(move |kind, _| sink.lock().push((name, kind)));
    }

    shared.insert_signature(0, TimeSignature::WALTZ).unwrap();
    assert_eq!(
        *order.lock(),
        vec![
            ("ruler", ChangeKind::TimeSignature),
            ("transport", ChangeKind::TimeSignature),
            ("editor", ChangeKind::TimeSignature),
        ]
    );
}

#[test]
fn test_reentrant_mutation_rejected_but_reads_allowed() {
    let shared = SharedTimeline::default();
    let handle = shared.clone();
    let results = Arc::new(Mutex::new(Vec::new()));

    let sink = Arc::clone(&results);
    shared.register(move |_, converter| {
        let bar = handle.read().bar_number(3840);
        let attempt = handle.insert_signature(0, TimeSignature::CUT);
        sink.lock().push((bar, converter.signature_at(0), attempt));
    });

    shared.insert_signature(0, TimeSignature::WALTZ).unwrap();
    let results = results.lock();
    assert_eq!(results.len(), 1);
    let (bar, signature, attempt) = &results[0];
    assert_eq!(*bar, 1);
    assert_eq!(*signature, TimeSignature::WALTZ);
    assert_eq!(*attempt, Err(TimelineError::Reentrancy));
}

#[test]
fn test_other_thread_can_write_after_dispatch() {
    let shared = SharedTimeline::default();
    let handle = shared.clone();

    // A listener on this thread must not block writers on another thread
    // once dispatch has finished
    shared.register(|_, _| {});
    shared.insert_tempo(0, 80.0, None).unwrap();

    let writer = thread::spawn(move || handle.insert_tempo(960, 90.0, None));
    assert_eq!(writer.join().unwrap(), Ok(1));
    assert_eq!(shared.tempo_at(960), qpm(90.0));
}

// ═══════════════════════════════════════════════════════════════════════════════
// LOADING
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_load_normalizes_unsorted_duplicates() {
    let doc = Document::new("Import", TimelineConfig::default()).unwrap();
    let json = r#"{
        "ticks_per_quarter": 960,
        "tempo_changes": [
            { "time": 3840, "tempo": 9000000 },
            { "time": 0, "tempo": 12000000, "ramp": { "To": 6000000 } },
            { "time": 3840, "tempo": 15000000 }
        ],
        "time_signature_changes": [
            { "time": 7680, "signature": { "numerator": 6, "denominator": 8 } },
            { "time": 0, "signature": { "numerator": 3, "denominator": 4 } }
        ]
    }"#;
    doc.load_json(json).unwrap();

    let snapshot = doc.timeline().snapshot();
    assert_eq!(
        snapshot.tempo_changes,
        vec![
            TempoChange::ramped(0, qpm(120.0), qpm(60.0)),
            TempoChange::new(3840, qpm(150.0)),
        ]
    );
    assert_eq!(
        snapshot.time_signature_changes,
        vec![
            TimeSignatureChange::new(0, TimeSignature::WALTZ),
            TimeSignatureChange::new(7680, TimeSignature::new(6, 8)),
        ]
    );
}

#[test]
fn test_invalid_load_notifies_nobody() {
    let doc = Document::new("Import", TimelineConfig::default()).unwrap();
    doc.timeline()
        .insert_signature(0, TimeSignature::new(5, 4))
        .unwrap();
    let before = doc.timeline().snapshot();

    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    doc.timeline().register(move |_, _| {
        counter.fetch_add(1, Ordering::SeqCst);
    });

    let json = r#"{
        "ticks_per_quarter": 960,
        "time_signature_changes": [
            { "time": 0, "signature": { "numerator": 4, "denominator": 4 } },
            { "time": 960, "signature": { "numerator": 0, "denominator": 4 } }
        ]
    }"#;
    assert!(matches!(
        doc.load_json(json),
        Err(TimelineError::InvalidTimeSignature { numerator: 0, denominator: 4 })
    ));
    assert_eq!(doc.timeline().snapshot(), before);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
}
