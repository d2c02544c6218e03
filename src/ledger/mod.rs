//! Points ledger engine.
//!
//! Owns the ordered match list of a session and keeps every match's
//! `points_before`/`points_after` consistent with the session's scoring
//! formula:
//!
//! - match 0 starts from `points_start`
//! - match i starts from match i-1's `points_after`
//! - `custom_points_after`, when set, replaces the formula for that match
//!   only; later matches still chain from it
//!
//! Every mutation validates and resolves its target before touching the
//! session, so an error leaves the session exactly as it was. Any change
//! that can move a baseline is followed by a full forward recompute of the
//! suffix.

mod input;

pub use input::*;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::models::{EntityId, Match, MatchId, MatchResult, PointsFormula, Session};

/// Errors raised by ledger operations. Raised before any mutation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Invalid {field}: {message}")]
    Validation {
        field: &'static str,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl LedgerError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field,
            message: message.into(),
        }
    }
}

/// Points delta for one match.
pub fn score(prior: f64, result: MatchResult, formula: PointsFormula) -> f64 {
    match (formula, result) {
        (PointsFormula::Rated, MatchResult::Win) => prior + 7.0,
        (PointsFormula::Rated, MatchResult::Loss) => prior - 7.0,
        (PointsFormula::Dc, MatchResult::Win) => prior + 1.0,
        (PointsFormula::Dc, MatchResult::Loss) if prior >= 15.0 => prior - 1.0,
        (PointsFormula::Dc, MatchResult::Loss) => prior - 0.5,
    }
}

/// Points the match at `index` should start from.
pub fn prior_points(session: &Session, index: usize) -> f64 {
    match index.checked_sub(1).and_then(|i| session.matches.get(i)) {
        Some(previous) => previous.points_after,
        None => session.points_start,
    }
}

/// Re-derive `points_before`/`points_after` for every match from `start` to
/// the end, seeding the first with `prior`. Returns the number of matches
/// touched.
pub fn recompute_from(session: &mut Session, start: usize, prior: f64) -> usize {
    let formula = session.points_formula;
    let mut carry = prior;
    let mut touched = 0;

    for m in session.matches.iter_mut().skip(start) {
        m.points_before = carry;
        m.points_after = match m.custom_points_after {
            Some(custom) => custom,
            None => score(carry, m.result, formula),
        };
        carry = m.points_after;
        touched += 1;
    }

    debug!(
        "Recomputed {} matches in session {} from index {}",
        touched, session.id, start
    );
    touched
}

/// How a match is addressed by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchLocator {
    Index(usize),
    Id(MatchId),
}

impl MatchLocator {
    /// Resolve to a position in the session.
    pub fn resolve(&self, session: &Session) -> Result<usize, LedgerError> {
        match self {
            MatchLocator::Index(i) if *i < session.len() => Ok(*i),
            MatchLocator::Index(i) => Err(LedgerError::NotFound(format!(
                "match #{} (session {} has {} matches)",
                i,
                session.id,
                session.len()
            ))),
            MatchLocator::Id(id) => session.position_of(id).ok_or_else(|| {
                LedgerError::NotFound(format!("match {} in session {}", id, session.id))
            }),
        }
    }
}

/// Kind of points value worth flagging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyKind {
    Negative,
    NonFinite,
}

/// A points value that is accepted but suspicious. Never blocks a mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    pub match_id: MatchId,
    pub position: usize,
    pub kind: AnomalyKind,
    pub points_after: f64,
}

/// Outcome of a single-match mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchChange {
    /// The created, edited, or removed match (post-recompute for the first two)
    pub entry: Match,

    /// Matches whose points were re-derived, including the entry itself
    pub recomputed: usize,

    pub anomalies: Vec<Anomaly>,

    /// Set when the legacy result edit left points out of date
    pub stale: bool,
}

/// Behavior switches for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerOptions {
    /// Re-derive points when an edit changes `result` without touching the
    /// override. Turning this off reproduces the legacy behavior where only an
    /// override change triggers a recompute.
    #[serde(default = "default_recompute_on_result_change")]
    pub recompute_on_result_change: bool,
}

fn default_recompute_on_result_change() -> bool {
    true
}

impl Default for LedgerOptions {
    fn default() -> Self {
        Self {
            recompute_on_result_change: default_recompute_on_result_change(),
        }
    }
}

/// The points ledger engine.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    options: LedgerOptions,
}

impl Ledger {
    pub fn new(options: LedgerOptions) -> Self {
        Self { options }
    }

    /// Append a match to the end of the session.
    pub fn append(&self, session: &mut Session, input: &MatchInput) -> Result<MatchChange, LedgerError> {
        let new = input.validate()?;

        let prior = session.current_points();
        let points_after = match new.custom_points_after {
            Some(custom) => custom,
            None => score(prior, new.result, session.points_formula),
        };
        let entry = build_match(new, prior, points_after);

        session.matches.push(entry.clone());
        session.touch();

        let position = session.len() - 1;
        info!(
            "Appended match {} to session {} ({} -> {})",
            entry.id, session.id, entry.points_before, entry.points_after
        );

        Ok(MatchChange {
            entry,
            recomputed: 1,
            anomalies: scan(session, position, position + 1),
            stale: false,
        })
    }

    /// Insert a match at `position` (0..=len) and re-derive everything after it.
    pub fn insert(
        &self,
        session: &mut Session,
        position: usize,
        input: &MatchInput,
    ) -> Result<MatchChange, LedgerError> {
        if position > session.len() {
            return Err(LedgerError::NotFound(format!(
                "position {} (session {} has {} matches)",
                position,
                session.id,
                session.len()
            )));
        }
        let new = input.validate()?;

        let prior = prior_points(session, position);
        session.matches.insert(position, build_match(new, prior, prior));
        let recomputed = recompute_from(session, position, prior);
        session.touch();

        let entry = session.matches[position].clone();
        info!(
            "Inserted match {} at position {} in session {}",
            entry.id, position, session.id
        );

        Ok(MatchChange {
            entry,
            recomputed,
            anomalies: scan(session, position, session.len()),
            stale: false,
        })
    }

    /// Apply a partial update to one match.
    pub fn edit(
        &self,
        session: &mut Session,
        locator: &MatchLocator,
        update: &MatchUpdate,
    ) -> Result<MatchChange, LedgerError> {
        let index = locator.resolve(session)?;
        let update = update.validate()?;

        let prior = prior_points(session, index);
        let target = &mut session.matches[index];

        if let Some(deck) = update.deck {
            target.deck = deck;
        }
        if let Some(opponent_deck) = update.opponent_deck {
            target.opponent_deck = opponent_deck;
        }
        if let Some(turn) = update.turn {
            target.turn = turn;
        }
        if let Some(notes) = update.notes {
            target.notes = Some(notes).filter(|n| !n.is_empty());
        }
        let result_changed = match update.result {
            Some(result) if result != target.result => {
                target.result = result;
                true
            }
            _ => false,
        };

        // Where the recompute starts, and from which baseline.
        let restart = if let Some(custom) = update.custom_points_after {
            target.custom_points_after = Some(custom);
            target.points_after = custom;
            Some((index + 1, custom))
        } else if update.clear_custom_points && target.custom_points_after.is_some() {
            target.custom_points_after = None;
            Some((index, prior))
        } else if result_changed && self.options.recompute_on_result_change {
            Some((index, prior))
        } else {
            None
        };

        // An override pins points_after, so only an unpinned match goes stale.
        let stale = result_changed && restart.is_none() && target.custom_points_after.is_none();
        if stale {
            warn!(
                "Result of match {} changed without recompute; its points and later ones are stale",
                target.id
            );
        }

        let (recomputed, anomalies) = match restart {
            Some((start, baseline)) => {
                let touched = recompute_from(session, start, baseline);
                // An override sets the edited match directly, outside the recompute range.
                let touched = if start > index { touched + 1 } else { touched };
                (touched, scan(session, index, session.len()))
            }
            None => (0, scan(session, index, index + 1)),
        };
        session.touch();

        let entry = session.matches[index].clone();
        info!(
            "Edited match {} in session {} ({} matches recomputed)",
            entry.id, session.id, recomputed
        );

        Ok(MatchChange {
            entry,
            recomputed,
            anomalies,
            stale,
        })
    }

    /// Remove one match and re-derive everything that followed it.
    pub fn delete(&self, session: &mut Session, locator: &MatchLocator) -> Result<MatchChange, LedgerError> {
        let index = locator.resolve(session)?;

        let entry = session.matches.remove(index);
        let prior = prior_points(session, index);
        let recomputed = recompute_from(session, index, prior);
        session.touch();

        info!(
            "Deleted match {} from session {} ({} matches recomputed)",
            entry.id, session.id, recomputed
        );

        Ok(MatchChange {
            entry,
            recomputed,
            anomalies: scan(session, index, session.len()),
            stale: false,
        })
    }

    /// Drop every match. Returns how many were removed.
    pub fn clear(&self, session: &mut Session) -> usize {
        let removed = session.matches.len();
        session.matches.clear();
        session.touch();

        info!("Cleared {} matches from session {}", removed, session.id);
        removed
    }

    /// Re-derive the whole chain from `points_start`.
    pub fn rebuild(&self, session: &mut Session) -> Vec<Anomaly> {
        let start = session.points_start;
        recompute_from(session, 0, start);
        scan(session, 0, session.len())
    }

    /// Rename a session and/or change its formula or starting points.
    /// Any points-affecting change rebuilds the whole chain.
    pub fn update_settings(
        &self,
        session: &mut Session,
        settings: &SessionSettings,
    ) -> Result<Vec<Anomaly>, LedgerError> {
        let settings = settings.validate()?;
        let rebuild = settings.affects_points();

        if let Some(name) = settings.name {
            session.name = name;
        }
        match (settings.points_formula, settings.points_start) {
            (_, Some(start)) => {
                if let Some(formula) = settings.points_formula {
                    session.points_formula = formula;
                }
                session.points_start = start;
            }
            // A new formula without an explicit start begins at its own default.
            (Some(formula), None) if formula != session.points_formula => {
                session.points_formula = formula;
                session.points_start = formula.default_start();
            }
            (_, None) => {}
        }
        let anomalies = if rebuild {
            self.rebuild(session)
        } else {
            Vec::new()
        };
        session.touch();

        info!(
            "Updated session {} ({}, start {})",
            session.id, session.points_formula, session.points_start
        );
        Ok(anomalies)
    }
}

fn build_match(new: NewMatch, points_before: f64, points_after: f64) -> Match {
    Match {
        id: EntityId::random(),
        deck: new.deck,
        opponent_deck: new.opponent_deck,
        result: new.result,
        turn: new.turn,
        points_before,
        points_after,
        custom_points_after: new.custom_points_after,
        notes: new.notes,
        played_at: Utc::now(),
    }
}

/// Flag negative or non-finite `points_after` values in `[from, to)`.
fn scan(session: &Session, from: usize, to: usize) -> Vec<Anomaly> {
    let to = to.min(session.len());
    let from = from.min(to);
    let anomalies: Vec<Anomaly> = session.matches[from..to]
        .iter()
        .enumerate()
        .filter_map(|(offset, m)| {
            let kind = if !m.points_after.is_finite() {
                AnomalyKind::NonFinite
            } else if m.points_after < 0.0 {
                AnomalyKind::Negative
            } else {
                return None;
            };
            Some(Anomaly {
                match_id: m.id.clone(),
                position: from + offset,
                kind,
                points_after: m.points_after,
            })
        })
        .collect();

    for a in &anomalies {
        warn!(
            "Points anomaly in session {}: match {} at #{} is {:?} ({})",
            session.id, a.match_id, a.position, a.kind, a.points_after
        );
    }
    anomalies
}
