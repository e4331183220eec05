//! Download engine -- session lifecycle, chapter fetching and persistence.
//!
//! Split into focused submodules:
//! - [`session`] - Session state, collaborators and the planning phase
//! - [`orchestration`] - Top-level run: chapter loop and background stages
//! - [`chapter`] - Rate-limited page fetching with one retry pass
//! - [`persistence`] - Session-wide queue drained into the commit hook
//! - [`progress`] - Periodic progress snapshots
//! - [`finalization`] - Finalize and abort
//! - [`counters`] - Session counters and the single-slot error cell

mod chapter;
mod counters;
mod finalization;
mod orchestration;
mod persistence;
mod progress;
mod session;


pub use progress::PROGRESS_UPDATE_INTERVAL;
pub use session::{Session, SessionOptions, SessionParams, SessionProviders};
