//! # Duel Tracker
//!
//! Record keeping for TCG ranked play: sessions of matches with a running
//! points ledger that is re-derived whenever history changes.
//!
//! ## Architecture
//!
//! - **models**: Core data structures (sessions, matches, statistics)
//! - **ledger**: Points scoring, recomputation and match mutations
//! - **calculate**: Session and user statistics
//! - **storage**: JSONL persistence for sessions and user aggregates
//! - **api**: REST API endpoints
//! - **config**: Configuration loading and validation

pub mod api;
pub mod calculate;
pub mod config;
pub mod ledger;
pub mod models;
pub mod storage;

pub use models::*;
