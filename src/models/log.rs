//! Wire and storage model for log entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AppError;

/// A single log entry.
///
/// `id` and `created_at` are assigned by the store on insert; `timestamp` is
/// caller-supplied and defaulted to the ingestion time when absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,

    #[serde(default)]
    pub service: String,

    #[serde(default)]
    pub level: String,

    #[serde(default)]
    pub message: String,

    /// Opaque JSON document; stored serialized and round-tripped verbatim.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl LogEntry {
    /// Check required fields in a fixed order; the first violation wins.
    ///
    /// `index` is the entry's position within the ingested batch and is
    /// carried into the error for the client.
    pub fn validate(&self, index: usize) -> Result<(), AppError> {
        if self.service.trim().is_empty() {
            return Err(AppError::Validation {
                field: "service",
                index,
            });
        }
        if self.level.trim().is_empty() {
            return Err(AppError::Validation {
                field: "level",
                index,
            });
        }
        if self.message.trim().is_empty() {
            return Err(AppError::Validation {
                field: "message",
                index,
            });
        }
        Ok(())
    }

    /// True when the caller did not supply a usable event time.
    ///
    /// Some shippers emit the Unix epoch for "unset", so an exact epoch
    /// timestamp counts as absent too.
    pub fn timestamp_is_unset(&self) -> bool {
        match self.timestamp {
            None => true,
            Some(t) => t.timestamp() == 0 && t.timestamp_subsec_nanos() == 0,
        }
    }
}

/// Query specification for historical reads.
///
/// All supplied predicates are AND-ed; an empty filter matches everything.
#[derive(Debug, Clone, Default)]
pub struct LogFilter {
    pub service: Option<String>,
    pub level: Option<String>,
    pub host: Option<String>,
    /// Case-insensitive substring match on `message`.
    pub search: Option<String>,
    /// Inclusive lower bound on `timestamp`.
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `timestamp`.
    pub end: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

/// Distinct values for the filter dropdowns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterOptions {
    pub services: Vec<String>,
    pub levels: Vec<String>,
    pub hosts: Vec<String>,
}
