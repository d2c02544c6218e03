//! Core data models for the duel tracker.

mod ids;
mod session;
mod stats;

pub use ids::*;
pub use session::*;
pub use stats::*;
