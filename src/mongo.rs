//! ==============================================================================
//! mongo.rs - mongodb connection provider and reading store
//! ==============================================================================
//!
//! purpose:
//!     scoped access to the readings collection. every call to `with_database`
//!     is one full cycle:
//!
//!         parse uri -> connect -> ping -> operate -> close
//!         \____ connect deadline ____/   \_ op deadline _/
//!
//!     the connection is closed whether or not the operation succeeded, and
//!     the operation's own error is what the caller sees. nothing is pooled
//!     or kept between requests.
//!
//! document shape:
//!     { room, time, temperature, humidity, timestamp, epoch_nanos }
//!     `time` is the string the client sent and is returned verbatim.
//!     `timestamp` is the same instant as a bson datetime (millisecond
//!     precision, for people browsing the collection).
//!     `epoch_nanos` is the instant in nanoseconds since the unix epoch and is
//!     what filters and sorts use, so "+01:00" and "Z" inputs and
//!     sub-millisecond fractions all order exactly.
//!     documents written before these two keys existed still decode, but are
//!     never matched by a range filter and sort after every keyed document.
//!
//! relationships:
//!     - used by: main.rs (builds MongoStore when store.backend = "mongo")
//!     - implements: store.rs (ReadingStore)
//!     - reads: config.rs (DatabaseConfig)
//!
//! ==============================================================================

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::{
    bson::{self, doc, Document},
    error::ErrorKind,
    options::ClientOptions,
    Client, Collection,
};
use serde::{Deserialize, Serialize};

use crate::config::DatabaseConfig;
use crate::domain::Reading;
use crate::error::{Result, ServiceError};
use crate::store::ReadingStore;

/// a reading as persisted in the collection
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoredReading {
    pub room: String,
    pub time: String,
    pub temperature: f64,
    pub humidity: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<bson::DateTime>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch_nanos: Option<i64>,
}

impl StoredReading {
    pub fn new(reading: Reading, timestamp: DateTime<Utc>) -> Self {
        Self {
            room: reading.room,
            time: reading.time,
            temperature: reading.temperature,
            humidity: reading.humidity,
            timestamp: Some(bson::DateTime::from_millis(timestamp.timestamp_millis())),
            epoch_nanos: Some(epoch_nanos(timestamp)),
        }
    }
}

impl From<StoredReading> for Reading {
    fn from(stored: StoredReading) -> Self {
        Reading {
            room: stored.room,
            time: stored.time,
            temperature: stored.temperature,
            humidity: stored.humidity,
        }
    }
}

/// nanoseconds since the unix epoch, saturating outside 1677..2262
fn epoch_nanos(t: DateTime<Utc>) -> i64 {
    t.timestamp_nanos_opt()
        .unwrap_or(if t.timestamp() < 0 { i64::MIN } else { i64::MAX })
}

// ==============================================================================
// filters
// ==============================================================================

/// point lookup: every reading of the room
pub fn latest_filter(room: &str) -> Document {
    doc! { "room": room }
}

/// range lookup: readings of the room with start <= time (<= end)
pub fn range_filter(room: &str, start: DateTime<Utc>, end: Option<DateTime<Utc>>) -> Document {
    let mut bounds = doc! { "$gte": epoch_nanos(start) };
    if let Some(end) = end {
        bounds.insert("$lte", epoch_nanos(end));
    }
    doc! { "room": room, "epoch_nanos": bounds }
}

pub fn newest_first() -> Document {
    doc! { "epoch_nanos": -1 }
}

// ==============================================================================
// connection provider
// ==============================================================================

/// Run `op` against the configured collection on a fresh connection
pub async fn with_database<T, F, Fut>(config: &DatabaseConfig, op: F) -> Result<T>
where
    F: FnOnce(Collection<StoredReading>) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let uri = config.connection_string()?;

    let client = match tokio::time::timeout(config.connect_timeout(), connect(config, uri)).await {
        Ok(client) => client?,
        Err(_) => {
            return Err(ServiceError::Connectivity(format!(
                "no connection within {}s",
                config.connect_timeout_seconds
            )))
        }
    };

    let collection = client
        .database(&config.name)
        .collection::<StoredReading>(&config.collection);

    scoped(op(collection), config.operation_timeout(), async move {
        client.shutdown().await;
        tracing::debug!("[DB] connection closed");
    })
    .await
}

/// Drive `op` under `deadline`, then run `release` no matter how `op` ended.
/// The result is always the operation's own outcome.
pub async fn scoped<T, Op, Rel>(op: Op, deadline: Duration, release: Rel) -> Result<T>
where
    Op: Future<Output = Result<T>>,
    Rel: Future<Output = ()>,
{
    let outcome = match tokio::time::timeout(deadline, op).await {
        Ok(result) => result,
        Err(_) => Err(ServiceError::Persistence(format!(
            "operation exceeded {:?} deadline",
            deadline
        ))),
    };
    release.await;
    outcome
}

async fn connect(config: &DatabaseConfig, uri: &str) -> Result<Client> {
    let mut options = ClientOptions::parse(uri).await.map_err(|e| {
        if matches!(*e.kind, ErrorKind::InvalidArgument { .. }) {
            ServiceError::Configuration(format!("invalid connection string: {}", e))
        } else {
            ServiceError::Connectivity(e.to_string())
        }
    })?;
    options.connect_timeout = Some(config.connect_timeout());
    options.server_selection_timeout = Some(config.connect_timeout());
    options.retry_writes = Some(config.retry_writes);
    options.direct_connection = Some(config.direct_connection);

    let client = Client::with_options(options)
        .map_err(|e| ServiceError::Configuration(format!("invalid client options: {}", e)))?;

    if let Err(e) = client.database("admin").run_command(doc! { "ping": 1 }).await {
        client.shutdown().await;
        return Err(ServiceError::Connectivity(format!("ping failed: {}", e)));
    }
    tracing::debug!("[DB] connected to {}/{}", config.name, config.collection);

    Ok(client)
}

fn persistence(e: mongodb::error::Error) -> ServiceError {
    ServiceError::Persistence(e.to_string())
}

// ==============================================================================
// store
// ==============================================================================

pub struct MongoStore {
    config: DatabaseConfig,
}

impl MongoStore {
    pub fn new(config: DatabaseConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ReadingStore for MongoStore {
    async fn insert(&self, reading: Reading, timestamp: DateTime<Utc>) -> Result<()> {
        let document = StoredReading::new(reading, timestamp);
        with_database(&self.config, |collection| async move {
            collection.insert_one(document).await.map_err(persistence)?;
            Ok(())
        })
        .await
    }

    async fn latest(&self, room: &str) -> Result<Option<Reading>> {
        let filter = latest_filter(room);
        with_database(&self.config, |collection| async move {
            let found = collection
                .find_one(filter)
                .sort(newest_first())
                .await
                .map_err(persistence)?;
            Ok(found.map(Reading::from))
        })
        .await
    }

    async fn range(
        &self,
        room: &str,
        start: DateTime<Utc>,
        end: Option<DateTime<Utc>>,
    ) -> Result<Vec<Reading>> {
        let filter = range_filter(room, start, end);
        with_database(&self.config, |collection| async move {
            let cursor = collection
                .find(filter)
                .sort(newest_first())
                .await
                .map_err(persistence)?;
            let stored: Vec<StoredReading> = cursor.try_collect().await.map_err(persistence)?;
            Ok(stored.into_iter().map(Reading::from).collect())
        })
        .await
    }
}
