//! Inbound session and match payloads and their validation.
//!
//! Payloads arrive loosely typed (every field optional, enums as strings) so
//! that a missing or malformed field is reported as a validation error rather
//! than a deserialization failure.

use serde::{Deserialize, Serialize};

use super::LedgerError;
use crate::models::{MatchResult, PointsFormula, Session, Turn};

/// Payload for opening a new session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionInput {
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub points_formula: Option<String>,
    pub points_start: Option<f64>,
}

impl SessionInput {
    /// Build an empty session. `default_formula` applies when none is given;
    /// starting points default to the formula's own default.
    pub fn validate(&self, default_formula: PointsFormula) -> Result<Session, LedgerError> {
        let user_id = required_text("user_id", self.user_id.as_deref())?;
        let name = required_text("name", self.name.as_deref())?;
        let formula = self
            .points_formula
            .as_deref()
            .map(parse_formula)
            .transpose()?
            .unwrap_or(default_formula);
        let start = finite_start(self.points_start)?;

        let session = Session::new(user_id, name, formula);
        Ok(match start {
            Some(start) => session.with_points_start(start),
            None => session,
        })
    }
}

/// Partial update of a session's settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSettings {
    pub name: Option<String>,
    pub points_formula: Option<String>,
    pub points_start: Option<f64>,
}

/// Session settings that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidSettings {
    pub name: Option<String>,
    pub points_formula: Option<PointsFormula>,
    pub points_start: Option<f64>,
}

impl ValidSettings {
    /// Whether applying these settings can move any points value.
    pub fn affects_points(&self) -> bool {
        self.points_formula.is_some() || self.points_start.is_some()
    }
}

impl SessionSettings {
    pub fn validate(&self) -> Result<ValidSettings, LedgerError> {
        Ok(ValidSettings {
            name: self
                .name
                .as_deref()
                .map(|n| required_text("name", Some(n)))
                .transpose()?,
            points_formula: self
                .points_formula
                .as_deref()
                .map(parse_formula)
                .transpose()?,
            points_start: finite_start(self.points_start)?,
        })
    }
}

/// Payload for creating a match.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchInput {
    pub deck: Option<String>,
    pub opponent_deck: Option<String>,
    pub result: Option<String>,
    pub turn: Option<String>,
    pub custom_points_after: Option<f64>,
    pub notes: Option<String>,
}

/// A match payload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMatch {
    pub deck: String,
    pub opponent_deck: String,
    pub result: MatchResult,
    pub turn: Turn,
    pub custom_points_after: Option<f64>,
    pub notes: Option<String>,
}

impl MatchInput {
    /// Check required fields and parse enums.
    pub fn validate(&self) -> Result<NewMatch, LedgerError> {
        let deck = required_text("deck", self.deck.as_deref())?;
        let opponent_deck = required_text("opponent_deck", self.opponent_deck.as_deref())?;
        let result = parse_result(required_text("result", self.result.as_deref())?.as_str())?;
        let turn = parse_turn(required_text("turn", self.turn.as_deref())?.as_str())?;
        let custom_points_after = finite_points(self.custom_points_after)?;

        Ok(NewMatch {
            deck,
            opponent_deck,
            result,
            turn,
            custom_points_after,
            notes: clean_notes(self.notes.as_deref()),
        })
    }
}

/// Partial update for an existing match. Absent fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MatchUpdate {
    pub deck: Option<String>,
    pub opponent_deck: Option<String>,
    pub result: Option<String>,
    pub turn: Option<String>,
    pub custom_points_after: Option<f64>,
    /// Drop an existing override and fall back to the formula
    #[serde(default)]
    pub clear_custom_points: bool,
    pub notes: Option<String>,
}

/// A partial update that passed validation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidUpdate {
    pub deck: Option<String>,
    pub opponent_deck: Option<String>,
    pub result: Option<MatchResult>,
    pub turn: Option<Turn>,
    pub custom_points_after: Option<f64>,
    pub clear_custom_points: bool,
    pub notes: Option<String>,
}

impl MatchUpdate {
    /// Check every supplied field. Nothing is required.
    pub fn validate(&self) -> Result<ValidUpdate, LedgerError> {
        if self.clear_custom_points && self.custom_points_after.is_some() {
            return Err(LedgerError::validation(
                "custom_points_after",
                "cannot set and clear the override in the same update",
            ));
        }

        let deck = self
            .deck
            .as_deref()
            .map(|d| required_text("deck", Some(d)))
            .transpose()?;
        let opponent_deck = self
            .opponent_deck
            .as_deref()
            .map(|d| required_text("opponent_deck", Some(d)))
            .transpose()?;
        let result = self.result.as_deref().map(parse_result).transpose()?;
        let turn = self.turn.as_deref().map(parse_turn).transpose()?;

        Ok(ValidUpdate {
            deck,
            opponent_deck,
            result,
            turn,
            custom_points_after: finite_points(self.custom_points_after)?,
            clear_custom_points: self.clear_custom_points,
            notes: self.notes.as_deref().map(|n| n.trim().to_string()),
        })
    }
}

fn required_text(field: &'static str, value: Option<&str>) -> Result<String, LedgerError> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v.to_string()),
        _ => Err(LedgerError::validation(field, "is required")),
    }
}

fn parse_result(value: &str) -> Result<MatchResult, LedgerError> {
    value
        .parse::<MatchResult>()
        .map_err(|e| LedgerError::validation("result", e))
}

fn parse_turn(value: &str) -> Result<Turn, LedgerError> {
    value
        .parse::<Turn>()
        .map_err(|e| LedgerError::validation("turn", e))
}

fn parse_formula(value: &str) -> Result<PointsFormula, LedgerError> {
    value
        .parse::<PointsFormula>()
        .map_err(|e| LedgerError::validation("points_formula", e))
}

fn finite_start(value: Option<f64>) -> Result<Option<f64>, LedgerError> {
    match value {
        Some(v) if !v.is_finite() => Err(LedgerError::validation(
            "points_start",
            format!("must be a finite number (got {})", v),
        )),
        other => Ok(other),
    }
}

fn finite_points(value: Option<f64>) -> Result<Option<f64>, LedgerError> {
    match value {
        Some(v) if !v.is_finite() => Err(LedgerError::validation(
            "custom_points_after",
            format!("must be a finite number (got {})", v),
        )),
        other => Ok(other),
    }
}

fn clean_notes(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_input() -> MatchInput {
        MatchInput {
            deck: Some(" Snake-Eye ".to_string()),
            opponent_deck: Some("Yubel".to_string()),
            result: Some("Win".to_string()),
            turn: Some("1st".to_string()),
            custom_points_after: None,
            notes: Some("   ".to_string()),
        }
    }

    fn field_of(err: LedgerError) -> &'static str {
        match err {
            LedgerError::Validation { field, .. } => field,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_ok_trims_fields() {
        let valid = full_input().validate().unwrap();
        assert_eq!(valid.deck, "Snake-Eye");
        assert_eq!(valid.result, MatchResult::Win);
        assert_eq!(valid.turn, Turn::First);
        assert_eq!(valid.notes, None);
    }

    #[test]
    fn test_validate_missing_deck() {
        let mut input = full_input();
        input.deck = None;
        assert_eq!(field_of(input.validate().unwrap_err()), "deck");

        let mut input = full_input();
        input.opponent_deck = Some("  ".to_string());
        assert_eq!(field_of(input.validate().unwrap_err()), "opponent_deck");
    }

    #[test]
    fn test_validate_bad_enums() {
        let mut input = full_input();
        input.result = Some("Draw".to_string());
        assert_eq!(field_of(input.validate().unwrap_err()), "result");

        let mut input = full_input();
        input.turn = None;
        assert_eq!(field_of(input.validate().unwrap_err()), "turn");
    }

    #[test]
    fn test_validate_non_finite_override() {
        let mut input = full_input();
        input.custom_points_after = Some(f64::NAN);
        assert_eq!(field_of(input.validate().unwrap_err()), "custom_points_after");
    }

    #[test]
    fn test_update_all_optional() {
        let valid = MatchUpdate::default().validate().unwrap();
        assert_eq!(valid, ValidUpdate::default());
    }

    #[test]
    fn test_update_rejects_blank_deck() {
        let update = MatchUpdate {
            deck: Some("".to_string()),
            ..Default::default()
        };
        assert_eq!(field_of(update.validate().unwrap_err()), "deck");
    }

    #[test]
    fn test_update_rejects_set_and_clear() {
        let update = MatchUpdate {
            custom_points_after: Some(1600.0),
            clear_custom_points: true,
            ..Default::default()
        };
        assert_eq!(field_of(update.validate().unwrap_err()), "custom_points_after");
    }

    #[test]
    fn test_session_input_defaults() {
        let input = SessionInput {
            user_id: Some("alice".to_string()),
            name: Some("Ladder".to_string()),
            ..Default::default()
        };
        let session = input.validate(PointsFormula::Dc).unwrap();
        assert_eq!(session.points_formula, PointsFormula::Dc);
        assert_eq!(session.points_start, 0.0);

        let input = SessionInput {
            points_formula: Some("rated".to_string()),
            points_start: Some(1600.0),
            ..input
        };
        let session = input.validate(PointsFormula::Dc).unwrap();
        assert_eq!(session.points_formula, PointsFormula::Rated);
        assert_eq!(session.points_start, 1600.0);
    }

    #[test]
    fn test_session_input_rejects_bad_fields() {
        let input = SessionInput {
            user_id: Some("alice".to_string()),
            name: None,
            ..Default::default()
        };
        assert_eq!(field_of(input.validate(PointsFormula::Rated).unwrap_err()), "name");

        let input = SessionInput {
            user_id: Some("alice".to_string()),
            name: Some("Ladder".to_string()),
            points_formula: Some("elo".to_string()),
            ..Default::default()
        };
        assert_eq!(
            field_of(input.validate(PointsFormula::Rated).unwrap_err()),
            "points_formula"
        );
    }

    #[test]
    fn test_session_settings() {
        let valid = SessionSettings {
            name: Some(" Renamed ".to_string()),
            ..Default::default()
        }
        .validate()
        .unwrap();
        assert_eq!(valid.name.as_deref(), Some("Renamed"));
        assert!(!valid.affects_points());

        let err = SessionSettings {
            points_start: Some(f64::NEG_INFINITY),
            ..Default::default()
        }
        .validate()
        .unwrap_err();
        assert_eq!(field_of(err), "points_start");
    }

    #[test]
    fn test_input_deserializes_from_partial_json() {
        let input: MatchInput =
            serde_json::from_str(r#"{"deck":"Tenpai","result":"Loss"}"#).unwrap();
        assert_eq!(input.deck.as_deref(), Some("Tenpai"));
        assert!(input.turn.is_none());
        assert_eq!(field_of(input.validate().unwrap_err()), "opponent_deck");
    }
}
