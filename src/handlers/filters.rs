//! Filter dropdown endpoint

use axum::extract::State;
use axum::response::Json;
use std::time::{Duration, Instant};

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::FilterOptions;

const SLOW_RESPONSE_THRESHOLD: Duration = Duration::from_millis(500);

/// GET /api/filters
pub async fn get_filters(
    State(state): State<AppState>,
) -> Result<Json<FilterOptions>, AppError> {
    let start = Instant::now();
    let options = state
        .filter_cache
        .get(&state.store)
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to get filter options");
            e
        })?;

    let elapsed = start.elapsed();
    if elapsed > SLOW_RESPONSE_THRESHOLD {
        tracing::warn!(
            duration_ms = elapsed.as_millis() as u64,
            "slow filter options response"
        );
    }

    Ok(Json(options))
}
