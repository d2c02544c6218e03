use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::ledger::{Anomaly, MatchChange, MatchInput, MatchLocator, MatchUpdate};
use crate::models::{Match, MatchId, Session, SessionId};

#[derive(Debug, Deserialize)]
pub struct AddMatchParams {
    /// Insert at this position instead of appending
    pub position: Option<usize>,
}

/// Response for any single-match mutation.
#[derive(Debug, Serialize)]
pub struct MatchChangeResponse {
    #[serde(rename = "match")]
    pub entry: Match,
    pub recomputed: usize,
    pub anomalies: Vec<Anomaly>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stale: bool,
    pub session: Session,
}

impl MatchChangeResponse {
    fn new(change: MatchChange, session: Session) -> Self {
        Self {
            entry: change.entry,
            recomputed: change.recomputed,
            anomalies: change.anomalies,
            stale: change.stale,
            session,
        }
    }
}

pub async fn add_match(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(params): Query<AddMatchParams>,
    payload: Result<Json<MatchInput>, JsonRejection>,
) -> Result<(StatusCode, Json<MatchChangeResponse>), ApiError> {
    let Json(input) = payload?;
    let _guard = state.write_lock.lock().await;
    let mut session = state.store.get(&SessionId::from(id))?;

    let change = match params.position {
        Some(position) => state.ledger.insert(&mut session, position, &input)?,
        None => state.ledger.append(&mut session, &input)?,
    };
    state.store.save(&session)?;

    Ok((
        StatusCode::CREATED,
        Json(MatchChangeResponse::new(change, session)),
    ))
}

pub async fn edit_match(
    State(state): State<AppState>,
    Path((id, match_id)): Path<(String, String)>,
    payload: Result<Json<MatchUpdate>, JsonRejection>,
) -> Result<Json<MatchChangeResponse>, ApiError> {
    let Json(update) = payload?;
    let _guard = state.write_lock.lock().await;
    let mut session = state.store.get(&SessionId::from(id))?;

    let locator = MatchLocator::Id(MatchId::from(match_id));
    let change = state.ledger.edit(&mut session, &locator, &update)?;
    state.store.save(&session)?;

    Ok(Json(MatchChangeResponse::new(change, session)))
}

pub async fn delete_match(
    State(state): State<AppState>,
    Path((id, match_id)): Path<(String, String)>,
) -> Result<Json<MatchChangeResponse>, ApiError> {
    let _guard = state.write_lock.lock().await;
    let mut session = state.store.get(&SessionId::from(id))?;

    let locator = MatchLocator::Id(MatchId::from(match_id));
    let change = state.ledger.delete(&mut session, &locator)?;
    state.store.save(&session)?;

    Ok(Json(MatchChangeResponse::new(change, session)))
}

#[derive(Debug, Serialize)]
pub struct ClearMatchesResponse {
    pub removed: usize,
    pub session: Session,
}

pub async fn clear_matches(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ClearMatchesResponse>, ApiError> {
    let _guard = state.write_lock.lock().await;
    let mut session = state.store.get(&SessionId::from(id))?;

    let removed = state.ledger.clear(&mut session);
    state.store.save(&session)?;

    Ok(Json(ClearMatchesResponse { removed, session }))
}

#[cfg(test)]
mod tests {
    use crate::api::build_router;
    use crate::api::routes::test_support::{
        create_session, get_json, match_body, send_json, setup_test_state,
        setup_test_state_with,
    };
    use crate::ledger::LedgerOptions;
    use axum::http::StatusCode;
    use serde_json::Value;

    fn points(session: &Value) -> Vec<(f64, f64)> {
        session["matches"]
            .as_array()
            .unwrap()
            .iter()
            .map(|m| {
                (
                    m["points_before"].as_f64().unwrap(),
                    m["points_after"].as_f64().unwrap(),
                )
            })
            .collect()
    }

    async fn session_with(app: axum::Router, results: &[&str]) -> (String, Vec<String>) {
        let id = create_session(app.clone(), r#"{"user_id":"alice","name":"Ladder"}"#).await;
        let uri = format!("/api/sessions/{}/matches", id);
        let mut match_ids = Vec::new();
        for r in results {
            let (status, json) =
                send_json(app.clone(), "POST", &uri, Some(&match_body(r, "1st"))).await;
            assert_eq!(status, StatusCode::CREATED, "{}", json);
            match_ids.push(json["match"]["id"].as_str().unwrap().to_string());
        }
        (id, match_ids)
    }

    #[tokio::test]
    async fn test_append_match() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, _) = session_with(app.clone(), &["Win"]).await;

        let (status, json) = send_json(
            app,
            "POST",
            &format!("/api/sessions/{}/matches", id),
            Some(&match_body("Loss", "2nd")),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["match"]["points_before"], 1507.0);
        assert_eq!(json["match"]["points_after"], 1500.0);
        assert_eq!(json["match"]["turn"], "2nd");
        assert_eq!(json["anomalies"].as_array().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_append_invalid_payload_is_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, _) = session_with(app.clone(), &["Win"]).await;

        let (status, json) = send_json(
            app.clone(),
            "POST",
            &format!("/api/sessions/{}/matches", id),
            Some(r#"{"deck":"Tenpai","opponent_deck":"Yubel","result":"Draw","turn":"1st"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(json["error"]["message"].as_str().unwrap().contains("result"));

        let (_, json) = get_json(app, &format!("/api/sessions/{}", id)).await;
        assert_eq!(json["matches"].as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_mistyped_payload_gets_error_envelope() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, match_ids) = session_with(app.clone(), &["Win"]).await;
        let uri = format!("/api/sessions/{}/matches", id);

        let (status, json) = send_json(
            app.clone(),
            "POST",
            &uri,
            Some(r#"{"deck":"A","opponent_deck":"B","result":5,"turn":"1st"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");

        let (status, json) = send_json(app.clone(), "POST", &uri, Some("{not json")).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");

        let (status, json) = send_json(
            app.clone(),
            "PATCH",
            &format!("{}/{}", uri, match_ids[0]),
            Some(r#"{"custom_points_after":"abc"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(json["error"]["code"], "BAD_REQUEST");

        let (_, json) = get_json(app, &format!("/api/sessions/{}", id)).await;
        assert_eq!(json["matches"].as_array().unwrap().len(), 1);
        assert_eq!(json["matches"][0]["points_after"], 1507.0);
    }

    #[tokio::test]
    async fn test_append_to_missing_session() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));

        let (status, _) = send_json(
            app,
            "POST",
            "/api/sessions/missing/matches",
            Some(&match_body("Win", "1st")),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_insert_at_position() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, _) = session_with(app.clone(), &["Win", "Win"]).await;

        let (status, json) = send_json(
            app,
            "POST",
            &format!("/api/sessions/{}/matches?position=0", id),
            Some(&match_body("Loss", "1st")),
        )
        .await;

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(json["recomputed"], 3);
        assert_eq!(
            points(&json["session"]),
            vec![(1500.0, 1493.0), (1493.0, 1500.0), (1500.0, 1507.0)]
        );
    }

    #[tokio::test]
    async fn test_edit_override_propagates() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, match_ids) = session_with(app.clone(), &["Win", "Loss", "Win"]).await;

        let (status, json) = send_json(
            app.clone(),
            "PATCH",
            &format!("/api/sessions/{}/matches/{}", id, match_ids[0]),
            Some(r#"{"custom_points_after":1600}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["match"]["custom_points_after"], 1600.0);
        assert_eq!(
            points(&json["session"]),
            vec![(1500.0, 1600.0), (1600.0, 1593.0), (1593.0, 1600.0)]
        );

        // Persisted
        let (_, json) = get_json(app, &format!("/api/sessions/{}", id)).await;
        assert_eq!(json["matches"][2]["points_after"], 1600.0);
    }

    #[tokio::test]
    async fn test_edit_result_respects_legacy_flag() {
        let tmp = tempfile::tempdir().unwrap();
        let options = LedgerOptions {
            recompute_on_result_change: false,
        };
        let app = build_router(setup_test_state_with(tmp.path(), options));
        let (id, match_ids) = session_with(app.clone(), &["Win", "Win"]).await;

        let (status, json) = send_json(
            app,
            "PATCH",
            &format!("/api/sessions/{}/matches/{}", id, match_ids[0]),
            Some(r#"{"result":"Loss"}"#),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["match"]["result"], "Loss");
        assert_eq!(json["recomputed"], 0);
        assert_eq!(json["stale"], true);
        assert_eq!(
            points(&json["session"]),
            vec![(1500.0, 1507.0), (1507.0, 1514.0)]
        );
    }

    #[tokio::test]
    async fn test_edit_unknown_match() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, _) = session_with(app.clone(), &["Win"]).await;

        let (status, _) = send_json(
            app,
            "PATCH",
            &format!("/api/sessions/{}/matches/nope", id),
            Some(r#"{"deck":"Tenpai"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_delete_match_reconverges() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, match_ids) = session_with(app.clone(), &["Win", "Loss", "Win"]).await;

        let (status, json) = send_json(
            app,
            "DELETE",
            &format!("/api/sessions/{}/matches/{}", id, match_ids[1]),
            None,
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["match"]["result"], "Loss");
        assert_eq!(
            points(&json["session"]),
            vec![(1500.0, 1507.0), (1507.0, 1514.0)]
        );
    }

    #[tokio::test]
    async fn test_clear_matches() {
        let tmp = tempfile::tempdir().unwrap();
        let app = build_router(setup_test_state(tmp.path()));
        let (id, _) = session_with(app.clone(), &["Win", "Loss"]).await;

        let (status, json) = send_json(
            app.clone(),
            "DELETE",
            &format!("/api/sessions/{}/matches", id),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["removed"], 2);

        let (_, json) = get_json(app, &format!("/api/sessions/{}/stats", id)).await;
        assert_eq!(json["total_matches"], 0);
        assert_eq!(json["current_points"], 1500.0);
    }
}
