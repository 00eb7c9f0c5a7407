//! Historical query endpoint

use axum::extract::{Query, State};
use axum::http::{header::HeaderName, HeaderValue};
use axum::response::{IntoResponse, Json, Response};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::error::AppError;
use crate::handlers::AppState;
use crate::models::LogFilter;
use crate::retention::{retention_cutoff, RETENTION_DAYS};

/// Advisory header attached when the requested range predates retention.
pub static WARNING_HEADER: HeaderName = HeaderName::from_static("x-log-gateway-warning");

#[derive(Debug, Default, Deserialize)]
pub struct LogQueryParams {
    pub service: Option<String>,
    pub level: Option<String>,
    pub host: Option<String>,
    pub search: Option<String>,
    pub limit: Option<String>,
    pub start: Option<String>,
    pub end: Option<String>,
}

/// GET /api/logs
pub async fn query_logs(
    State(state): State<AppState>,
    Query(params): Query<LogQueryParams>,
) -> Result<Response, AppError> {
    let filter = parse_filter(params)?;

    let warning = retention_warning(&filter);

    let logs = state.store.query_logs(&filter).await.map_err(|e| {
        tracing::error!(error = %e, ?filter, "query failed");
        e
    })?;

    let mut response = Json(logs).into_response();
    if let Some(warning) = warning {
        if let Ok(value) = HeaderValue::from_str(&warning) {
            response.headers_mut().insert(WARNING_HEADER.clone(), value);
        }
    }
    Ok(response)
}

fn parse_filter(params: LogQueryParams) -> Result<LogFilter, AppError> {
    let mut filter = LogFilter {
        service: params.service.filter(|s| !s.is_empty()),
        level: params.level.filter(|s| !s.is_empty()),
        host: params.host.filter(|s| !s.is_empty()),
        search: params.search.filter(|s| !s.is_empty()),
        ..Default::default()
    };

    if let Some(raw) = params.limit.filter(|s| !s.is_empty()) {
        let limit: i64 = raw.parse().map_err(|_| {
            tracing::warn!(limit = %raw, "invalid limit");
            AppError::QueryParameter {
                parameter: "limit",
                message: format!("must be a non-negative integer, got: {}", raw),
            }
        })?;
        if limit < 0 {
            tracing::warn!(limit, "negative limit");
            return Err(AppError::QueryParameter {
                parameter: "limit",
                message: "must not be negative".to_string(),
            });
        }
        filter.limit = Some(limit);
    }

    filter.start = parse_date(params.start, "start")?;
    filter.end = parse_date(params.end, "end")?;

    if let (Some(start), Some(end)) = (filter.start, filter.end) {
        if start > end {
            tracing::warn!(%start, %end, "start date after end date");
            return Err(AppError::QueryParameter {
                parameter: "start",
                message: format!("start ({}) is after end ({})", start.to_rfc3339(), end.to_rfc3339()),
            });
        }
    }

    Ok(filter)
}

fn parse_date(
    raw: Option<String>,
    parameter: &'static str,
) -> Result<Option<DateTime<Utc>>, AppError> {
    match raw.filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|t| Some(t.with_timezone(&Utc)))
            .map_err(|_| {
                tracing::warn!(parameter, value = %raw, "invalid date");
                AppError::QueryParameter {
                    parameter,
                    message: format!(
                        "must be RFC3339 (e.g. 2025-01-15T00:00:00Z), got: {}",
                        raw
                    ),
                }
            }),
    }
}

fn retention_warning(filter: &LogFilter) -> Option<String> {
    let cutoff = retention_cutoff();
    if filter.end.is_some_and(|end| end < cutoff) {
        tracing::info!(
            end = %filter.end.unwrap_or_default(),
            %cutoff,
            "query entirely outside retention window"
        );
        Some(format!(
            "Query end date is beyond the {RETENTION_DAYS}-day retention window. Logs older than {RETENTION_DAYS} days are automatically deleted."
        ))
    } else if filter.start.is_some_and(|start| start < cutoff) {
        tracing::info!(
            start = %filter.start.unwrap_or_default(),
            %cutoff,
            "query partially outside retention window"
        );
        Some(format!(
            "Query start date is beyond the {RETENTION_DAYS}-day retention window. Results will only include logs from {} onwards.",
            cutoff.format("%Y-%m-%d")
        ))
    } else {
        None
    }
}
