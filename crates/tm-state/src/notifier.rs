//! Change notification
//!
//! Listeners are told *which* timeline changed and re-query the converter
//! they are handed; no delta is delivered.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::TimeConverter;

/// Which timeline changed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Tempo,
    TimeSignature,
}

/// Registration handle, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// Listener callback. Receives the updated converter to re-query from.
pub type Listener = Arc<dyn Fn(ChangeKind, &TimeConverter) + Send + Sync>;

/// Registration list of change listeners, invoked synchronously in
/// registration order
pub struct ChangeNotifier {
    listeners: Mutex<Vec<(ListenerId, Listener)>>,
    next_id: AtomicU64,
}

impl ChangeNotifier {
    pub fn new() -> Self {
        Self {
            listeners: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(ChangeKind, &TimeConverter) + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.lock().push((id, Arc::new(listener)));
        log::debug!("Registered timeline listener {:?}", id);
        id
    }

    /// Returns false if `id` was not registered
    pub fn unregister(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        before != listeners.len()
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.lock().len()
    }

    /// Invoke every listener. The list is snapshotted first, so a listener
    /// may register or unregister without deadlocking.
    pub fn notify(&self, kind: ChangeKind, timeline: &TimeConverter) {
        let snapshot: Vec<Listener> = self
            .listeners
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            listener(kind, timeline);
        }
    }
}

impl Default for ChangeNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ChangeNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChangeNotifier")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
