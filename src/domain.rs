use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ServiceError};

/// a single sensor observation
/// the json field names are the wire format of both endpoints.
/// capitalized keys are accepted on input for older clients.
#[derive(Clone, Serialize, Deserialize, Debug, PartialEq)]
pub struct Reading {
    /// room identifier (e.g., "kitchen")
    #[serde(alias = "Room")]
    pub room: String,
    /// RFC3339 timestamp, stored exactly as submitted
    #[serde(alias = "Time")]
    pub time: String,
    /// temperature in celsius
    #[serde(alias = "Temperature")]
    pub temperature: f64,
    /// relative humidity (0-100%)
    #[serde(alias = "Humidity")]
    pub humidity: f64,
}

impl Reading {
    /// check an ingested reading and return its parsed timestamp
    pub fn validate(&self) -> Result<DateTime<Utc>> {
        if self.room.is_empty() {
            return Err(ServiceError::BadRequest("field 'room' must not be empty".into()));
        }
        let timestamp = parse_rfc3339("time", &self.time)?;
        // stores order by nanoseconds since the epoch, which i64 covers for 1677..2262
        if timestamp.timestamp_nanos_opt().is_none() {
            return Err(ServiceError::BadRequest(format!(
                "'time' {} is outside the supported range 1677-2262",
                self.time
            )));
        }
        Ok(timestamp)
    }
}

/// raw query string of GET /api/get
#[derive(Debug, Default, Deserialize)]
pub struct ReadingQuery {
    pub room: Option<String>,
    #[serde(rename = "startTime")]
    pub start_time: Option<String>,
    #[serde(rename = "endTime")]
    pub end_time: Option<String>,
}

/// what a validated query asks the store for
#[derive(Debug, Clone, PartialEq)]
pub enum QueryPlan {
    /// most recent reading of a room
    Latest { room: String },
    /// every reading of a room in [start, end], newest first
    Range {
        room: String,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    },
}

impl ReadingQuery {
    pub fn plan(self) -> Result<QueryPlan> {
        let room = match self.room {
            Some(room) if !room.is_empty() => room,
            _ => return Err(ServiceError::BadRequest("query parameter 'room' is required".into())),
        };

        let start = self
            .start_time
            .as_deref()
            .map(|s| parse_rfc3339("startTime", s))
            .transpose()?;
        let end = self
            .end_time
            .as_deref()
            .map(|s| parse_rfc3339("endTime", s))
            .transpose()?;

        // an endTime without a startTime is accepted but has no effect
        Ok(match start {
            None => QueryPlan::Latest { room },
            Some(start) => QueryPlan::Range { room, start, end },
        })
    }
}

fn parse_rfc3339(field: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| ServiceError::BadRequest(format!("'{}' is not an RFC3339 timestamp ({}): {}", field, value, e)))
}
