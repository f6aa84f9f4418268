//! tm-core: Shared types for the Tempomap timeline
//!
//! Tick/real-time units, fixed-point tempo values, time signatures, the
//! error taxonomy and the per-document configuration used by `tm-state`.

mod config;
mod error;
mod signature;
mod tempo;
mod time;

pub use config::*;
pub use error::*;
pub use signature::*;
pub use tempo::*;
pub use time::*;
