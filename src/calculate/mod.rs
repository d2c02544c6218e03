//! Statistics calculation engine.
//!
//! Computes derived, read-only metrics from stored sessions:
//! - Session win rates (overall and by turn order)
//! - Current and peak points
//! - Deck and matchup breakdowns
//! - Per-user aggregates across sessions

use std::collections::HashMap;

use chrono::Utc;

use crate::models::{DeckRecord, Match, PointsFormula, Session, SessionStats, Turn, UserStats};

/// Win percentage rounded to one decimal place. Zero when there are no games.
pub fn calculate_win_rate(wins: u32, total: u32) -> f64 {
    if total == 0 {
        0.0
    } else {
        (wins as f64 / total as f64 * 1000.0).round() / 10.0
    }
}

/// Highest points value the session reached, including its start.
pub fn calculate_peak_points(session: &Session) -> f64 {
    session
        .matches
        .iter()
        .map(|m| m.points_after)
        .fold(session.points_start, f64::max)
}

fn turn_win_rate(matches: &[Match], turn: Turn) -> f64 {
    let subset: Vec<&Match> = matches.iter().filter(|m| m.turn == turn).collect();
    let wins = subset.iter().filter(|m| m.result.is_win()).count() as u32;
    calculate_win_rate(wins, subset.len() as u32)
}

/// Tally matches by a deck label, most played first (ties by name).
pub fn breakdown_by<F>(matches: &[Match], label: F) -> Vec<DeckRecord>
where
    F: Fn(&Match) -> &str,
{
    let mut records: HashMap<String, DeckRecord> = HashMap::new();
    for m in matches {
        let name = label(m);
        records
            .entry(name.to_lowercase())
            .or_insert_with(|| DeckRecord::new(name.to_string()))
            .record(m.result);
    }

    let mut records: Vec<DeckRecord> = records
        .into_values()
        .map(|mut r| {
            r.win_rate = calculate_win_rate(r.wins, r.games);
            r
        })
        .collect();
    records.sort_by(|a, b| b.games.cmp(&a.games).then_with(|| a.name.cmp(&b.name)));
    records
}

/// Compute the stats view of one session.
pub fn session_stats(session: &Session) -> SessionStats {
    let total = session.matches.len() as u32;
    let wins = session.matches.iter().filter(|m| m.result.is_win()).count() as u32;

    SessionStats {
        session_id: session.id.clone(),
        total_matches: total,
        wins,
        losses: total - wins,
        win_rate: calculate_win_rate(wins, total),
        first_win_rate: turn_win_rate(&session.matches, Turn::First),
        second_win_rate: turn_win_rate(&session.matches, Turn::Second),
        current_points: session.current_points(),
        peak_points: calculate_peak_points(session),
        deck_breakdown: breakdown_by(&session.matches, |m| m.deck.as_str()),
        matchups: breakdown_by(&session.matches, |m| m.opponent_deck.as_str()),
    }
}

/// Aggregate every session owned by `user_id`. Sessions owned by other users
/// are ignored, so callers can pass an unfiltered list.
pub fn recompute_user_stats(user_id: &str, sessions: &[Session]) -> UserStats {
    let owned: Vec<&Session> = sessions.iter().filter(|s| s.user_id == user_id).collect();

    let all_matches: Vec<Match> = owned
        .iter()
        .flat_map(|s| s.matches.iter().cloned())
        .collect();
    let total = all_matches.len() as u32;
    let wins = all_matches.iter().filter(|m| m.result.is_win()).count() as u32;

    let best_peak = |formula: PointsFormula| {
        owned
            .iter()
            .filter(|s| s.points_formula == formula)
            .map(|s| calculate_peak_points(s))
            .reduce(f64::max)
    };

    let most_played_deck = breakdown_by(&all_matches, |m| m.deck.as_str())
        .into_iter()
        .next()
        .map(|r| r.name);

    UserStats {
        user_id: user_id.to_string(),
        session_count: owned.len() as u32,
        total_matches: total,
        wins,
        losses: total - wins,
        win_rate: calculate_win_rate(wins, total),
        best_rated_peak: best_peak(PointsFormula::Rated),
        best_dc_peak: best_peak(PointsFormula::Dc),
        most_played_deck,
        computed_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::{Ledger, MatchInput};

    fn play(session: &mut Session, deck: &str, opponent: &str, result: &str, turn: &str) {
        let input = MatchInput {
            deck: Some(deck.to_string()),
            opponent_deck: Some(opponent.to_string()),
            result: Some(result.to_string()),
            turn: Some(turn.to_string()),
            ..Default::default()
        };
        Ledger::default().append(session, &input).unwrap();
    }

    fn new_session(user: &str, formula: PointsFormula) -> Session {
        Session::new(user.to_string(), "Test".to_string(), formula)
    }

    #[test]
    fn test_calculate_win_rate_rounding() {
        assert_eq!(calculate_win_rate(1, 3), 33.3);
        assert_eq!(calculate_win_rate(2, 3), 66.7);
        assert_eq!(calculate_win_rate(3, 3), 100.0);
        assert_eq!(calculate_win_rate(0, 0), 0.0);
    }

    #[test]
    fn test_session_stats_empty() {
        let session = new_session("alice", PointsFormula::Rated);
        let stats = session_stats(&session);

        assert_eq!(stats.total_matches, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.first_win_rate, 0.0);
        assert_eq!(stats.second_win_rate, 0.0);
        assert_eq!(stats.current_points, 1500.0);
        assert_eq!(stats.peak_points, 1500.0);
        assert!(stats.deck_breakdown.is_empty());
    }

    #[test]
    fn test_session_stats_turn_split() {
        let mut session = new_session("alice", PointsFormula::Rated);
        play(&mut session, "Snake-Eye", "Yubel", "Win", "1st");
        play(&mut session, "Snake-Eye", "Yubel", "Loss", "2nd");
        play(&mut session, "Snake-Eye", "Tenpai", "Loss", "2nd");

        let stats = session_stats(&session);
        assert_eq!(stats.total_matches, 3);
        assert_eq!(stats.wins, 1);
        assert_eq!(stats.losses, 2);
        assert_eq!(stats.win_rate, 33.3);
        assert_eq!(stats.first_win_rate, 100.0);
        assert_eq!(stats.second_win_rate, 0.0);
        assert_eq!(stats.current_points, 1493.0);
        assert_eq!(stats.peak_points, 1507.0);
    }

    #[test]
    fn test_session_stats_peak_never_below_start() {
        let mut session = new_session("alice", PointsFormula::Rated);
        play(&mut session, "A", "B", "Loss", "1st");
        play(&mut session, "A", "B", "Loss", "1st");

        let stats = session_stats(&session);
        assert_eq!(stats.peak_points, 1500.0);
        assert_eq!(stats.current_points, 1486.0);
    }

    #[test]
    fn test_breakdowns_sorted_by_games() {
        let mut session = new_session("alice", PointsFormula::Dc);
        play(&mut session, "Tenpai", "Yubel", "Win", "1st");
        play(&mut session, "Snake-Eye", "Yubel", "Win", "1st");
        play(&mut session, "snake-eye", "Branded", "Loss", "2nd");

        let stats = session_stats(&session);
        assert_eq!(stats.deck_breakdown.len(), 2);
        assert_eq!(stats.deck_breakdown[0].name, "Snake-Eye");
        assert_eq!(stats.deck_breakdown[0].games, 2);
        assert_eq!(stats.deck_breakdown[0].win_rate, 50.0);
        assert_eq!(stats.matchups[0].name, "Yubel");
        assert_eq!(stats.matchups[0].wins, 2);
        assert_eq!(stats.matchups[1].name, "Branded");
    }

    #[test]
    fn test_recompute_user_stats() {
        let mut rated = new_session("alice", PointsFormula::Rated);
        play(&mut rated, "Tenpai", "Yubel", "Win", "1st");
        play(&mut rated, "Tenpai", "Yubel", "Win", "1st");
        play(&mut rated, "Tenpai", "Yubel", "Loss", "2nd");

        let mut dc = new_session("alice", PointsFormula::Dc);
        play(&mut dc, "Snake-Eye", "Branded", "Loss", "2nd");

        let mut other = new_session("bob", PointsFormula::Rated);
        play(&mut other, "Yubel", "Tenpai", "Win", "1st");

        let stats = recompute_user_stats("alice", &[rated, dc, other]);
        assert_eq!(stats.session_count, 2);
        assert_eq!(stats.total_matches, 4);
        assert_eq!(stats.wins, 2);
        assert_eq!(stats.losses, 2);
        assert_eq!(stats.win_rate, 50.0);
        assert_eq!(stats.best_rated_peak, Some(1514.0));
        assert_eq!(stats.best_dc_peak, Some(0.0));
        assert_eq!(stats.most_played_deck.as_deref(), Some("Tenpai"));
    }

    #[test]
    fn test_recompute_user_stats_no_sessions() {
        let stats = recompute_user_stats("nobody", &[]);
        assert_eq!(stats.session_count, 0);
        assert_eq!(stats.win_rate, 0.0);
        assert_eq!(stats.best_rated_peak, None);
        assert_eq!(stats.most_played_deck, None);
    }
}
