//! Thread-safe timeline handle
//!
//! Single writer, many readers. A mutation holds the exclusive write lock
//! through the edit and cache rebuild only. Before listeners run, the guard
//! is atomically downgraded to a read lock, so dispatch is not exclusive:
//! - other writers stay blocked until the last listener returns, and every
//!   listener sees the post-edit state
//! - readers on other threads may query the timeline while listeners run
//!
//! Listeners may read through the shared handle on the dispatching thread.
//! A mutation from that thread fails with `Reentrancy`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tm_core::{
    Bpm, MusicalTime, RealTime, TempoChange, Tick, TimeSignature, TimeSignatureChange,
    TimelineConfig, TimelineError, TimelineResult,
};

use crate::{ChangeKind, ListenerId, TimeConverter, TimelineSnapshot};

/// Shared, lockable [`TimeConverter`]. Clones share the same timeline.
pub struct SharedTimeline {
    inner: Arc<RwLock<TimeConverter>>,
    /// Token of the thread currently running listeners, `NO_THREAD` if none
    dispatching: Arc<AtomicU64>,
}

const NO_THREAD: u64 = 0;

static NEXT_THREAD_TOKEN: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static THREAD_TOKEN: u64 = NEXT_THREAD_TOKEN.fetch_add(1, Ordering::Relaxed);
}

/// Process-unique, never `NO_THREAD`
fn current_thread_token() -> u64 {
    THREAD_TOKEN.with(|token| *token)
}

impl SharedTimeline {
    pub fn new(config: TimelineConfig) -> TimelineResult<Self> {
        Ok(Self::from_converter(TimeConverter::new(config)?))
    }

    pub fn from_converter(converter: TimeConverter) -> Self {
        Self {
            inner: Arc::new(RwLock::new(converter)),
            dispatching: Arc::new(AtomicU64::new(NO_THREAD)),
        }
    }

    /// Read guard for a consistent sequence of queries.
    ///
    /// Safe to call from a listener during dispatch.
    pub fn read(&self) -> RwLockReadGuard<'_, TimeConverter> {
        if self.is_dispatching_thread() {
            self.inner.read_recursive()
        } else {
            self.inner.read()
        }
    }

    fn is_dispatching_thread(&self) -> bool {
        // Only this thread stores its own token, so a stale load never matches
        self.dispatching.load(Ordering::Acquire) == current_thread_token()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // One-shot queries
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn tempo_at(&self, t: Tick) -> Bpm {
        self.read().tempo_at(t)
    }

    pub fn signature_at(&self, t: Tick) -> TimeSignature {
        self.read().signature_at(t)
    }

    pub fn elapsed_real_time(&self, from: Tick, to: Tick) -> RealTime {
        self.read().elapsed_real_time(from, to)
    }

    pub fn tick_for_elapsed_real_time(&self, real_time: RealTime) -> Tick {
        self.read().tick_for_elapsed_real_time(real_time)
    }

    pub fn musical_time(&self, t: Tick) -> MusicalTime {
        self.read().musical_time(t)
    }

    pub fn snapshot(&self) -> TimelineSnapshot {
        self.read().snapshot()
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Mutation
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn insert_tempo(&self, t: Tick, tempo: f64, target: Option<f64>) -> TimelineResult<usize> {
        self.mutate(&[ChangeKind::Tempo], |c| c.tempo.insert(t, tempo, target))
    }

    pub fn insert_tempo_change(&self, change: TempoChange) -> TimelineResult<usize> {
        self.mutate(&[ChangeKind::Tempo], |c| c.tempo.insert_change(change))
    }

    pub fn remove_tempo(&self, index: usize) -> TimelineResult<TempoChange> {
        self.mutate(&[ChangeKind::Tempo], |c| c.tempo.remove(index))
    }

    pub fn insert_signature(&self, t: Tick, signature: TimeSignature) -> TimelineResult<usize> {
        self.mutate(&[ChangeKind::TimeSignature], |c| {
            c.signatures.insert(t, signature)
        })
    }

    pub fn remove_signature(&self, index: usize) -> TimelineResult<TimeSignatureChange> {
        self.mutate(&[ChangeKind::TimeSignature], |c| c.signatures.remove(index))
    }

    pub fn clear(&self) -> TimelineResult<()> {
        self.mutate(&[ChangeKind::Tempo, ChangeKind::TimeSignature], |c| {
            c.clear_silently();
            Ok(())
        })
    }

    pub fn load(&self, snapshot: &TimelineSnapshot) -> TimelineResult<()> {
        self.mutate(&[ChangeKind::Tempo, ChangeKind::TimeSignature], |c| {
            c.replace_from(snapshot)
        })
    }

    /// Apply `edit` under the write lock, then notify `kinds` under the
    /// downgraded read lock. Nothing is notified when `edit` fails.
    fn mutate<R>(
        &self,
        kinds: &[ChangeKind],
        edit: impl FnOnce(&mut TimeConverter) -> TimelineResult<R>,
    ) -> TimelineResult<R> {
        if self.is_dispatching_thread() {
            log::warn!("Timeline mutation attempted from a change listener");
            return Err(TimelineError::Reentrancy);
        }

        let mut guard = self.inner.write();
        let result = edit(&mut *guard)?;

        let guard = RwLockWriteGuard::downgrade(guard);
        let _dispatch = DispatchGuard::enter(&self.dispatching);
        for &kind in kinds {
            guard.notifier().notify(kind, &*guard);
        }
        Ok(result)
    }

    // ─────────────────────────────────────────────────────────────────────────────
    // Listeners
    // ─────────────────────────────────────────────────────────────────────────────

    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ChangeKind, &TimeConverter) + Send + Sync + 'static,
    {
        self.read().notifier().register(listener)
    }

    pub fn unregister(&self, id: ListenerId) -> bool {
        self.read().notifier().unregister(id)
    }
}

impl Clone for SharedTimeline {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            dispatching: Arc::clone(&self.dispatching),
        }
    }
}

impl Default for SharedTimeline {
    fn default() -> Self {
        Self::from_converter(TimeConverter::default())
    }
}

impl std::fmt::Debug for SharedTimeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTimeline")
            .field("dispatching", &(self.dispatching.load(Ordering::Relaxed) != NO_THREAD))
            .finish_non_exhaustive()
    }
}

/// Marks the current thread as dispatching until dropped (panics included)
struct DispatchGuard<'a> {
    slot: &'a AtomicU64,
}

impl<'a> DispatchGuard<'a> {
    fn enter(slot: &'a AtomicU64) -> Self {
        slot.store(current_thread_token(), Ordering::Release);
        Self { slot }
    }
}

impl Drop for DispatchGuard<'_> {
    fn drop(&mut self) {
        self.slot.store(NO_THREAD, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_clones_share_state() {
        let shared = SharedTimeline::default();
        let other = shared.clone();

        shared.insert_tempo(0, 90.0, None).unwrap();
        assert_eq!(other.tempo_at(100), Bpm::from_qpm(90.0).unwrap());
        assert_eq!(other.read().tempo_timeline().count(), 1);
    }

    #[test]
    fn test_listener_reads_post_edit_state() {
        let shared = SharedTimeline::default();
        let handle = shared.clone();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&seen);
        shared.register(move |_, converter| {
            // Both the handed converter and the shared handle are readable
            let direct = converter.tempo_at(0);
            let via_handle = handle.tempo_at(0);
            sink.lock().push((direct, via_handle));
        });

        shared.insert_tempo(0, 60.0, None).unwrap();
        let expected = Bpm::from_qpm(60.0).unwrap();
        assert_eq!(*seen.lock(), vec![(expected, expected)]);
    }

    #[test]
    fn test_mutation_from_listener_is_rejected() {
        let shared = SharedTimeline::default();
        let handle = shared.clone();
        let outcome = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&outcome);
        shared.register(move |kind, _| {
            if kind == ChangeKind::Tempo {
                *sink.lock() = Some(handle.insert_tempo(1920, 80.0, None));
            }
        });

        shared.insert_tempo(0, 100.0, None).unwrap();
        assert!(matches!(
            *outcome.lock(),
            Some(Err(TimelineError::Reentrancy))
        ));
        assert_eq!(shared.read().tempo_timeline().count(), 1);

        // Dispatch flag is cleared afterwards
        assert!(shared.insert_tempo(1920, 80.0, None).is_ok());
    }

    #[test]
    fn test_failed_mutation_does_not_notify() {
        let shared = SharedTimeline::default();
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let id = shared.register(move |_, _| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(shared.insert_tempo(0, f64::NAN, None).is_err());
        assert!(shared.remove_signature(3).is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        shared.clear().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        assert!(shared.unregister(id));
        shared.clear().unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_dispatch_flag_is_per_thread() {
        let shared = SharedTimeline::default();
        let handle = shared.clone();
        let flags = Arc::new(Mutex::new(Vec::new()));

        let sink = Arc::clone(&flags);
        shared.register(move |_, _| {
            let here = handle.is_dispatching_thread();
            let peer = handle.clone();
            let elsewhere = thread::spawn(move || peer.is_dispatching_thread())
                .join()
                .unwrap();
            sink.lock().push((here, elsewhere));
        });

        assert!(!shared.is_dispatching_thread());
        shared.insert_tempo(0, 100.0, None).unwrap();
        assert_eq!(*flags.lock(), vec![(true, false)]);
        assert!(!shared.is_dispatching_thread());
    }

    #[test]
    fn test_other_readers_run_during_dispatch() {
        let shared = SharedTimeline::default();
        let handle = shared.clone();
        let seen = Arc::new(Mutex::new(None));

        let sink = Arc::clone(&seen);
        shared.register(move |_, _| {
            // Joined inside the listener: would deadlock if dispatch were exclusive
            let reader = handle.clone();
            let tempo = thread::spawn(move || reader.tempo_at(0)).join().unwrap();
            *sink.lock() = Some(tempo);
        });

        shared.insert_tempo(0, 75.0, None).unwrap();
        assert_eq!(*seen.lock(), Some(Bpm::from_qpm(75.0).unwrap()));
    }

    #[test]
    fn test_writers_wait_for_dispatch_to_finish() {
        let shared = SharedTimeline::default();
        let handle = shared.clone();
        let events = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::new(Mutex::new(None));
        let first = Arc::new(AtomicUsize::new(0));

        let sink = Arc::clone(&events);
        let slot = Arc::clone(&writer);
        shared.register(move |_, _| {
            if first.fetch_add(1, Ordering::SeqCst) != 0 {
                return;
            }
            let other = handle.clone();
            let order = Arc::clone(&sink);
            *slot.lock() = Some(thread::spawn(move || {
                other.insert_tempo(960, 90.0, None).unwrap();
                order.lock().push("writer done");
            }));
            thread::sleep(Duration::from_millis(50));
            sink.lock().push("listener done");
        });

        shared.insert_tempo(0, 80.0, None).unwrap();
        let pending = writer.lock().take();
        pending.unwrap().join().unwrap();

        assert_eq!(*events.lock(), vec!["listener done", "writer done"]);
        assert_eq!(shared.read().tempo_timeline().count(), 2);
    }
}
