use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::state::AppState;
use crate::api::{ApiError, Pagination, PaginationMeta};
use crate::calculate;
use crate::ledger::{Anomaly, SessionInput, SessionSettings};
use crate::models::{PointsFormula, Session, SessionId, SessionStats};

#[derive(Debug, Deserialize)]
pub struct ListSessionsParams {
    pub user_id: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub points_formula: PointsFormula,
    pub points_start: f64,
    pub match_count: usize,
    pub current_points: f64,
    pub updated_at: DateTime<Utc>,
}

impl From<&Session> for SessionSummary {
    fn from(s: &Session) -> Self {
        Self {
            id: s.id.as_str().to_string(),
            user_id: s.user_id.clone(),
            name: s.name.clone(),
            points_formula: s.points_formula,
            points_start: s.points_start,
            match_count: s.len(),
            current_points: s.current_points(),
            updated_at: s.updated_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionListResponse {
    pub sessions: Vec<SessionSummary>,
    pub pagination: PaginationMeta,
}

pub async fn list_sessions(
    State(state): State<AppState>,
    Query(params): Query<ListSessionsParams>,
) -> Result<Json<SessionListResponse>, ApiError> {
    let mut sessions = match params.user_id.as_deref() {
        Some(user_id) => state.store.list_for_user(user_id)?,
        None => state.store.list()?,
    };

    // Most recently updated first
    sessions.sort_by(|a, b| {
        b.updated_at
            .cmp(&a.updated_at)
            .then_with(|| a.name.cmp(&b.name))
    });

    let pagination = Pagination::new(params.page, params.page_size);
    let meta = PaginationMeta::new(&pagination, sessions.len() as u32);
    let summaries = pagination
        .apply(&sessions)
        .iter()
        .map(SessionSummary::from)
        .collect();

    Ok(Json(SessionListResponse {
        sessions: summaries,
        pagination: meta,
    }))
}

pub async fn create_session(
    State(state): State<AppState>,
    payload: Result<Json<SessionInput>, JsonRejection>,
) -> Result<(StatusCode, Json<Session>), ApiError> {
    let Json(input) = payload?;
    let session = input.validate(state.default_formula)?;

    let _guard = state.write_lock.lock().await;
    state.store.insert(&session)?;

    Ok((StatusCode::CREATED, Json(session)))
}

#[derive(Debug, Serialize)]
pub struct SessionDetailResponse {
    #[serde(flatten)]
    pub session: Session,
    pub stats: SessionStats,
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionDetailResponse>, ApiError> {
    let session = state.store.get(&SessionId::from(id))?;
    let stats = calculate::session_stats(&session);

    Ok(Json(SessionDetailResponse { session, stats }))
}

pub async fn session_stats(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<SessionStats>, ApiError> {
    let session = state.store.get(&SessionId::from(id))?;
    Ok(Json(calculate::session_stats(&session)))
}

#[derive(Debug, Serialize)]
pub struct UpdateSessionResponse {
    pub session: Session,
    pub anomalies: Vec<Anomaly>,
}

pub async fn update_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
    payload: Result<Json<SessionSettings>, JsonRejection>,
) -> Result<Json<UpdateSessionResponse>, ApiError> {
    let Json(settings) = payload?;
    let _guard = state.write_lock.lock().await;
    let mut session = state.store.get(&SessionId::from(id))?;

    let anomalies = state.ledger.update_settings(&mut session, &settings)?;
    state.store.save(&session)?;

    Ok(Json(UpdateSessionResponse { session, anomalies }))
}

#[derive(Debug, Serialize)]
pub struct DeleteSessionResponse {
    pub id: String,
    pub matches_removed: usize,
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DeleteSessionResponse>, ApiError> {
    let _guard = state.write_lock.lock().await;
    let removed = state.store.delete(&SessionId::from(id))?;

    Ok(Json(DeleteSessionResponse {
        id: removed.id.as_str().to_string(),
        matches_removed: removed.len(),
    }))
}
