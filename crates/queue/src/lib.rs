//! Named job queues bound to an external backend.
//!
//! [`QueueFactory::create_queue`] hands out [`Queue`] handles; how a handle
//! reaches its backend is decided by the injected [`QueueConnector`]. The
//! crate only produces jobs. Nothing here consumes or executes them.

mod memory_queue;
mod redis_queue;
mod sqlite_queue;

use std::{fmt, sync::Arc};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sqlx::migrate::MigrateError;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

pub use memory_queue::{MemoryConnector, MemoryQueue};
pub use redis_queue::{RedisConnector, RedisQueue};
pub use sqlite_queue::{SqliteConnector, SqliteQueue};

/// A unit of work stored on a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: String,
    pub name: String,
    pub data: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Storage side of a queue handle.
#[async_trait]
pub trait QueueBackend: Send + Sync {
    /// Short backend label used in logs and metrics.
    fn kind(&self) -> &'static str;

    async fn add(&self, job: &Job) -> Result<(), QueueError>;

    async fn waiting_count(&self) -> Result<u64, QueueError>;
}

/// Opens a backend for a named queue at a connection URL.
#[async_trait]
pub trait QueueConnector: Send + Sync {
    async fn connect(
        &self,
        name: &str,
        connection_url: &str,
    ) -> Result<Arc<dyn QueueBackend>, QueueError>;
}

/// Client-side handle to a named queue.
#[derive(Clone)]
pub struct Queue {
    name: String,
    backend: Arc<dyn QueueBackend>,
}

impl Queue {
    pub fn new(name: impl Into<String>, backend: Arc<dyn QueueBackend>) -> Self {
        Self {
            name: name.into(),
            backend,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backend_kind(&self) -> &'static str {
        self.backend.kind()
    }

    /// Appends a job and returns it as stored.
    pub async fn add(
        &self,
        job_name: &str,
        data: Value,
        org_id: Option<&str>,
    ) -> Result<Job, QueueError> {
        let job = Job {
            id: Uuid::new_v4().to_string(),
            name: job_name.to_string(),
            data,
            org_id: org_id.map(str::to_string),
            created_at: Utc::now(),
        };
        self.backend.add(&job).await?;
        debug!(stage = "queue", queue = %self.name, job_id = %job.id, backend = self.backend.kind(), "job added");
        Ok(job)
    }

    /// Number of jobs waiting on this queue.
    pub async fn waiting_count(&self) -> Result<u64, QueueError> {
        self.backend.waiting_count().await
    }
}

impl fmt::Debug for Queue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Queue")
            .field("name", &self.name)
            .field("backend", &self.backend.kind())
            .finish()
    }
}

/// Creates queue handles through a single injected connector.
#[derive(Clone)]
pub struct QueueFactory {
    connector: Arc<dyn QueueConnector>,
}

impl QueueFactory {
    pub fn new(connector: Arc<dyn QueueConnector>) -> Self {
        Self { connector }
    }

    /// Picks the built-in connector matching the URL scheme.
    ///
    /// Only the scheme is inspected; the rest of the URL is left to the
    /// backend.
    pub fn for_url(connection_url: &str) -> Result<Self, QueueError> {
        let connector: Arc<dyn QueueConnector> = match scheme(connection_url) {
            Some("redis" | "rediss") => Arc::new(RedisConnector),
            Some("sqlite") => Arc::new(SqliteConnector),
            Some("memory") => Arc::new(MemoryConnector::new()),
            _ => return Err(QueueError::UnsupportedScheme(connection_url.to_string())),
        };
        Ok(Self::new(connector))
    }

    /// Returns a new handle to the queue `name` at `connection_url`.
    ///
    /// Every call goes to the connector and yields a distinct handle.
    /// Connectors may pool the underlying connections per URL. Connector
    /// failures are returned as-is.
    pub async fn create_queue(&self, name: &str, connection_url: &str) -> Result<Queue, QueueError> {
        let backend = self.connector.connect(name, connection_url).await?;
        Ok(Queue::new(name, backend))
    }
}

impl fmt::Debug for QueueFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFactory").finish_non_exhaustive()
    }
}

/// Shorthand for [`QueueFactory::for_url`] followed by
/// [`QueueFactory::create_queue`].
pub async fn create_queue(name: &str, connection_url: &str) -> Result<Queue, QueueError> {
    QueueFactory::for_url(connection_url)?
        .create_queue(name, connection_url)
        .await
}

fn scheme(connection_url: &str) -> Option<&str> {
    connection_url
        .split_once(':')
        .map(|(scheme, _)| scheme)
        .filter(|scheme| !scheme.is_empty())
}

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("unsupported queue connection url: {0}")]
    UnsupportedScheme(String),
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] sqlx::Error),
    #[error("failed to run queue migrations: {0}")]
    Migration(#[from] MigrateError),
    #[error("failed to serialize job: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_queue_delegates_to_connector() {
        let connector = MemoryConnector::new();
        let factory = QueueFactory::new(Arc::new(connector.clone()));

        let queue = factory
            .create_queue("emails", "memory://primary")
            .await
            .expect("queue");

        assert_eq!(queue.name(), "emails");
        assert_eq!(queue.backend_kind(), "memory");
        assert_eq!(
            connector.connections().await,
            vec![("emails".to_string(), "memory://primary".to_string())]
        );
    }

    #[tokio::test]
    async fn repeated_calls_produce_distinct_handles() {
        let connector = MemoryConnector::new();
        let factory = QueueFactory::new(Arc::new(connector.clone()));

        let first = factory.create_queue("emails", "memory://a").await.expect("first");
        let second = factory.create_queue("emails", "memory://a").await.expect("second");

        assert!(!Arc::ptr_eq(&first.backend, &second.backend));
        assert_eq!(connector.connections().await.len(), 2);

        first
            .add("welcome", json!({ "to": "a@example.com" }), Some("acme"))
            .await
            .expect("add");
        assert_eq!(second.waiting_count().await.expect("count"), 1);
    }

    #[tokio::test]
    async fn add_stamps_job_metadata() {
        let connector = MemoryConnector::new();
        let queue = QueueFactory::new(Arc::new(connector.clone()))
            .create_queue("reports", "memory://a")
            .await
            .expect("queue");

        let job = queue
            .add("monthly", json!({ "month": 3 }), Some("acme-42"))
            .await
            .expect("add");

        assert_eq!(job.name, "monthly");
        assert_eq!(job.org_id.as_deref(), Some("acme-42"));
        assert!(Uuid::parse_str(&job.id).is_ok());
        assert_eq!(connector.jobs("memory://a", "reports").await, vec![job]);
    }

    #[test]
    fn for_url_selects_connector_by_scheme() {
        assert!(QueueFactory::for_url("redis://127.0.0.1:6379").is_ok());
        assert!(QueueFactory::for_url("rediss://cache.internal:6380").is_ok());
        assert!(QueueFactory::for_url("sqlite::memory:").is_ok());
        assert!(QueueFactory::for_url("memory://local").is_ok());

        let err = QueueFactory::for_url("amqp://broker").expect_err("unsupported");
        assert!(matches!(err, QueueError::UnsupportedScheme(url) if url == "amqp://broker"));
        assert!(QueueFactory::for_url("no-scheme").is_err());
    }

    #[tokio::test]
    async fn create_queue_for_redis_url_does_not_touch_the_network() {
        let queue = create_queue("emails", "redis://127.0.0.1:6379")
            .await
            .expect("redis handle is created lazily");
        assert_eq!(queue.name(), "emails");
        assert_eq!(queue.backend_kind(), "redis");
    }

    #[tokio::test]
    async fn create_queue_propagates_backend_errors() {
        let err = create_queue("emails", "sqlite:///definitely/missing/dir/queue.db")
            .await
            .expect_err("missing database directory should fail");
        assert!(matches!(err, QueueError::Sqlite(_)));
    }
}
