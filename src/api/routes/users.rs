use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use crate::api::state::AppState;
use crate::api::ApiError;
use crate::calculate;
use crate::models::UserStats;
use crate::storage::{read_user_stats, write_user_stats};

/// Last persisted aggregate for a user. Aggregates are only refreshed by
/// `recompute_user_stats`.
pub async fn get_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, ApiError> {
    read_user_stats(state.store.config(), &user_id)?
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("No stats recorded for user {}", user_id)))
}

pub async fn recompute_user_stats(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Result<Json<UserStats>, ApiError> {
    let _guard = state.write_lock.lock().await;

    let sessions = state.store.list_for_user(&user_id)?;
    let stats = calculate::recompute_user_stats(&user_id, &sessions);
    write_user_stats(state.store.config(), &stats)?;

    info!(
        "Recomputed stats for {} ({} sessions, {} matches)",
        user_id, stats.session_count, stats.total_matches
    );
    Ok(Json(stats))
}
