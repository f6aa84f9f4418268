//! tm-state: Tempo and time signature timelines
//!
//! Provides:
//! - Tempo timeline with constant and ramped segments, real-time integration
//! - Time signature timeline with bar/beat arithmetic
//! - Time converter tying both together, with change notification
//! - Thread-safe shared handle and document ownership
//! - Snapshot persistence
//! - Position/duration field editing

mod converter;
mod document;
mod fields;
mod notifier;
mod shared;
mod signature_timeline;
mod snapshot;
mod tempo_timeline;

pub use converter::*;
pub use document::*;
pub use fields::*;
pub use notifier::*;
pub use shared::*;
pub use signature_timeline::*;
pub use snapshot::*;
pub use tempo_timeline::*;
