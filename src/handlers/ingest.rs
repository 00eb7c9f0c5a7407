//! Ingestion endpoint
//!
//! Accepts one log object or an array of them. A request is one unit: every
//! entry is validated before anything is persisted, and a batch is stored in
//! a single transaction. Persisted entries are then handed to the broadcast
//! hub for live subscribers.

use axum::body::Bytes;
use axum::extract::{ConnectInfo, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use std::net::SocketAddr;

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::LogEntry;
use crate::rate_limit::client_identity;

/// Maximum accepted request body size (10MB)
pub const MAX_BODY_SIZE: usize = 10 * 1024 * 1024;

/// POST /api/ingest
pub async fn ingest(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let identity = client_identity(&headers, addr);
    if !state.limiter.allow(&identity) {
        return Err(AppError::RateLimited);
    }

    if body.len() > MAX_BODY_SIZE {
        return Err(AppError::PayloadTooLarge);
    }

    let mut entries = decode_entries(&body)?;

    let received_at = Utc::now();
    let total = entries.len();
    for (index, entry) in entries.iter_mut().enumerate() {
        if entry.timestamp_is_unset() {
            entry.timestamp = Some(received_at);
        }

        if let Err(e) = entry.validate(index) {
            tracing::warn!(
                sender = %identity,
                index,
                total,
                reason = %e,
                "rejecting ingest request"
            );
            return Err(e);
        }
    }

    if entries.len() > 1 {
        state.store.insert_batch(&entries).await.map_err(|e| {
            tracing::error!(error = %e, count = entries.len(), "failed to insert batch");
            e
        })?;
    } else if let Some(entry) = entries.first() {
        state.store.insert_log(entry).await.map_err(|e| {
            tracing::error!(error = %e, "failed to insert log");
            e
        })?;
    }

    if !entries.is_empty() {
        state.hub.broadcast(&entries);
    }

    Ok(StatusCode::CREATED)
}

/// Decode the body as an array first, then as a single wrapped object.
fn decode_entries(body: &[u8]) -> Result<Vec<LogEntry>, AppError> {
    if let Ok(entries) = serde_json::from_slice::<Vec<LogEntry>>(body) {
        return Ok(entries);
    }
    match serde_json::from_slice::<LogEntry>(body) {
        Ok(entry) => Ok(vec![entry]),
        Err(_) => Err(AppError::InvalidPayload),
    }
}
