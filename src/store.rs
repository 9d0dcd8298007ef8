//! ==============================================================================
//! store.rs - reading store abstraction
//! ==============================================================================
//!
//! purpose:
//!     the seam between the http handlers and persistence. handlers only see
//!     `ReadingStore`; which implementation backs it is picked at startup.
//!
//! implementations:
//!     - MongoStore (mongo.rs): connect, ping, operate, close on every call.
//!     - MemoryStore (here): in-process vector, for local runs and tests.
//!
//! ordering contract:
//!     every implementation orders by the parsed timestamp of `time`, newest
//!     first. `latest` returns the head of that order, `range` the slice of it
//!     with start <= time (<= end).
//!
//! ==============================================================================

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::domain::Reading;
use crate::error::Result;

#[async_trait]
pub trait ReadingStore: Send + Sync {
    /// persist a new, independent record. `timestamp` is the parsed `time`
    async fn insert(&self, reading: Reading, timestamp: DateTime<Utc>) -> Result<()>;

    /// most recent reading of `room`, if any
    async fn latest(&self, room: &str) -> Result<Option<Reading>>;

    /// readings of `room` with start <= time (<= end), newest first
    async fn range(
        &self,
        room: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Reading>>;
}

/// In-process store. Records live only as long as the process.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<Vec<(DateTime<Utc>, Reading)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// records of `room` matching `keep`, newest first
    async fn select<F>(&self, room: &str, keep: F) -> Vec<Reading>
    where
        F: Fn(&DateTime<Utc>) -> bool,
    {
        let records = self.records.read().await;
        let mut matches: Vec<_> = records
            .iter()
            .filter(|(ts, r)| r.room == room && keep(ts))
            .collect();
        // stable sort, then reverse: on equal timestamps the later insert comes first
        matches.sort_by(|a, b| a.0.cmp(&b.0));
        matches.into_iter().rev().map(|(_, r)| r.clone()).collect()
    }
}

#[async_trait]
impl ReadingStore for MemoryStore {
    async fn insert(&self, reading: Reading, timestamp: DateTime<Utc>) -> Result<()> {
        tracing::debug!("[MEMORY] insert room={} time={}", reading.room, reading.time);
        self.records.write().await.push((timestamp, reading));
        Ok(())
    }

    async fn latest(&self, room: &str) -> Result<Option<Reading>> {
        Ok(self.select(room, |_| true).await.into_iter().next())
    }

    async fn range(
        &self,
        room: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Reading>> {
        Ok(self
            .select(room, |ts| *ts >= start && end.map_or(true, |end| *ts <= end))
            .await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(room: &str, time: &str, temperature: f64) -> (Reading, DateTime<Utc>) {
        let r = Reading {
            room: room.into(),
            time: time.into(),
            temperature,
            humidity: 50.0,
        };
        let ts = r.validate().unwrap();
        (r, ts)
    }

    async fn seeded() -> MemoryStore {
        let store = MemoryStore::new();
        for (room, time, t) in [
            ("kitchen", "2021-01-02T00:00:00Z", 22.0),
            ("kitchen", "2021-01-01T00:00:00Z", 21.5),
            ("kitchen", "2021-01-03T01:00:00+01:00", 23.0),
            ("attic", "2021-01-05T00:00:00Z", 10.0),
        ] {
            let (r, ts) = reading(room, time, t);
            store.insert(r, ts).await.unwrap();
        }
        store
    }

    fn ts(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    #[tokio::test]
    async fn latest_picks_newest_by_timestamp_not_insert_order() {
        let store = seeded().await;
        let latest = store.latest("kitchen").await.unwrap().unwrap();
        assert_eq!(latest.time, "2021-01-03T01:00:00+01:00");
        assert!(store.latest("cellar").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn range_is_newest_first_and_bounded() {
        let store = seeded().await;

        let all = store.range("kitchen", ts("2021-01-01T00:00:00Z"), None).await.unwrap();
        let temps: Vec<f64> = all.iter().map(|r| r.temperature).collect();
        assert_eq!(temps, vec![23.0, 22.0, 21.5]);

        let bounded = store
            .range("kitchen", ts("2021-01-01T12:00:00Z"), Some(ts("2021-01-02T00:00:00Z")))
            .await
            .unwrap();
        assert_eq!(bounded.len(), 1);
        assert_eq!(bounded[0].temperature, 22.0);
    }

    #[tokio::test]
    async fn range_for_unknown_room_is_empty() {
        let store = seeded().await;
        let none = store.range("cellar", ts("2000-01-01T00:00:00Z"), None).await.unwrap();
        assert!(none.is_empty());
    }
}
