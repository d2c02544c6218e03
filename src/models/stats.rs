//! Derived statistics models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{MatchResult, SessionId};

/// Win/loss tally for one deck label.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeckRecord {
    /// Deck label
    pub name: String,

    pub games: u32,

    pub wins: u32,

    pub losses: u32,

    /// Win percentage rounded to one decimal (0.0 to 100.0)
    pub win_rate: f64,
}

impl DeckRecord {
    /// Create an empty record.
    pub fn new(name: String) -> Self {
        Self {
            name,
            games: 0,
            wins: 0,
            losses: 0,
            win_rate: 0.0,
        }
    }

    /// Count one match result. `win_rate` is left for the caller to finalize.
    pub fn record(&mut self, result: MatchResult) {
        self.games += 1;
        match result {
            MatchResult::Win => self.wins += 1,
            MatchResult::Loss => self.losses += 1,
        }
    }
}

/// Read-only aggregate over one session, recomputed on every read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub session_id: SessionId,

    pub total_matches: u32,

    pub wins: u32,

    pub losses: u32,

    /// Win percentage rounded to one decimal
    pub win_rate: f64,

    /// Win percentage over matches where the owner went first
    pub first_win_rate: f64,

    /// Win percentage over matches where the owner went second
    pub second_win_rate: f64,

    /// Last match's points_after, or points_start if empty
    pub current_points: f64,

    /// Highest of points_start and every points_after
    pub peak_points: f64,

    /// Per own-deck results, most played first
    pub deck_breakdown: Vec<DeckRecord>,

    /// Per opponent-deck results, most faced first
    pub matchups: Vec<DeckRecord>,
}

/// Aggregate over every session a user owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserStats {
    pub user_id: String,

    pub session_count: u32,

    pub total_matches: u32,

    pub wins: u32,

    pub losses: u32,

    /// Win percentage rounded to one decimal
    pub win_rate: f64,

    /// Best peak over rated sessions
    pub best_rated_peak: Option<f64>,

    /// Best peak over dc sessions
    pub best_dc_peak: Option<f64>,

    pub most_played_deck: Option<String>,

    /// When these stats were computed
    pub computed_at: DateTime<Utc>,
}
