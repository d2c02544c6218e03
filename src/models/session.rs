//! Match-tracking session model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::{EntityId, MatchId, SessionId};

/// Scoring formula a session is tracked under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PointsFormula {
    /// Ranked ladder: +7 / -7 per match.
    #[default]
    Rated,
    /// DC cup: +1 per win, -1 per loss (-0.5 below 15 points).
    Dc,
}

impl PointsFormula {
    /// Starting points used when a session doesn't specify one.
    pub fn default_start(&self) -> f64 {
        match self {
            PointsFormula::Rated => 1500.0,
            PointsFormula::Dc => 0.0,
        }
    }
}

impl std::fmt::Display for PointsFormula {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PointsFormula::Rated => write!(f, "rated"),
            PointsFormula::Dc => write!(f, "dc"),
        }
    }
}

impl FromStr for PointsFormula {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "rated" => Ok(PointsFormula::Rated),
            "dc" => Ok(PointsFormula::Dc),
            other => Err(format!("unknown points formula '{}' (expected rated or dc)", other)),
        }
    }
}

/// Outcome of a single match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchResult {
    Win,
    Loss,
}

impl MatchResult {
    pub fn is_win(&self) -> bool {
        matches!(self, MatchResult::Win)
    }
}

impl std::fmt::Display for MatchResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MatchResult::Win => write!(f, "Win"),
            MatchResult::Loss => write!(f, "Loss"),
        }
    }
}

impl FromStr for MatchResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "win" | "w" => Ok(MatchResult::Win),
            "loss" | "l" => Ok(MatchResult::Loss),
            other => Err(format!("'{}' is not a valid result (expected Win or Loss)", other)),
        }
    }
}

/// Which player went first. Informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Turn {
    #[serde(rename = "1st")]
    First,
    #[serde(rename = "2nd")]
    Second,
}

impl std::fmt::Display for Turn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Turn::First => write!(f, "1st"),
            Turn::Second => write!(f, "2nd"),
        }
    }
}

impl FromStr for Turn {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1st" | "first" | "1" => Ok(Turn::First),
            "2nd" | "second" | "2" => Ok(Turn::Second),
            other => Err(format!("'{}' is not a valid turn (expected 1st or 2nd)", other)),
        }
    }
}

/// A single match inside a session.
///
/// `points_before` and `points_after` are owned by the ledger and are only
/// ever written by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    /// Unique identifier (random)
    pub id: MatchId,

    /// Deck the session owner played
    pub deck: String,

    /// Deck the opponent played
    pub opponent_deck: String,

    pub result: MatchResult,

    pub turn: Turn,

    /// Points carried in from the previous match
    pub points_before: f64,

    /// Points after this match
    pub points_after: f64,

    /// Manual override for `points_after`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_points_after: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    /// When the match was recorded
    pub played_at: DateTime<Utc>,
}

/// An ordered run of matches tracked under one scoring formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Unique identifier (derived from user_id + name + created_at)
    pub id: SessionId,

    /// Owner of the session
    pub user_id: String,

    /// Display name
    pub name: String,

    pub points_formula: PointsFormula,

    /// Points before the first match
    pub points_start: f64,

    /// Matches in play order
    #[serde(default)]
    pub matches: Vec<Match>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Session {
    /// Create an empty session starting at the formula's default points.
    pub fn new(user_id: String, name: String, points_formula: PointsFormula) -> Self {
        let created_at = Utc::now();
        let id = EntityId::generate(&[&user_id, &name, &created_at.to_rfc3339()]);

        Self {
            id,
            user_id,
            name,
            points_formula,
            points_start: points_formula.default_start(),
            matches: Vec::new(),
            created_at,
            updated_at: created_at,
        }
    }

    /// Builder method to set starting points.
    pub fn with_points_start(mut self, points_start: f64) -> Self {
        self.points_start = points_start;
        self
    }

    /// Points the next appended match starts from.
    pub fn current_points(&self) -> f64 {
        self.matches
            .last()
            .map(|m| m.points_after)
            .unwrap_or(self.points_start)
    }

    /// Position of a match by ID.
    pub fn position_of(&self, id: &MatchId) -> Option<usize> {
        self.matches.iter().position(|m| &m.id == id)
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }

    /// Bump `updated_at` after a mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
