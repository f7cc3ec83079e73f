use std::{
    collections::HashMap,
    sync::{Arc, Mutex, OnceLock},
};

use async_trait::async_trait;
use chrono::SecondsFormat;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tokio::sync::OnceCell;

use crate::{Job, QueueBackend, QueueConnector, QueueError};

type PoolCell = Arc<OnceCell<SqlitePool>>;

/// Migrated pools, one per database URL for the life of the process.
static POOLS: OnceLock<Mutex<HashMap<String, PoolCell>>> = OnceLock::new();

/// Connector for `sqlite:` URLs.
///
/// Handles opened against the same URL share one pool, and the queue
/// migrations run once per URL. In-memory URLs therefore name a single
/// database rather than one per connection.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteConnector;

#[async_trait]
impl QueueConnector for SqliteConnector {
    async fn connect(
        &self,
        name: &str,
        connection_url: &str,
    ) -> Result<Arc<dyn QueueBackend>, QueueError> {
        let queue = SqliteQueue::connect(name, connection_url).await?;
        Ok(Arc::new(queue))
    }
}

#[derive(Clone)]
pub struct SqliteQueue {
    name: String,
    pool: SqlitePool,
}

impl SqliteQueue {
    pub async fn connect(name: &str, database_url: &str) -> Result<Self, QueueError> {
        let cell = pool_cell(database_url);
        let pool = cell
            .get_or_try_init(|| open_pool(database_url))
            .await?
            .clone();

        Ok(Self {
            name: name.to_string(),
            pool,
        })
    }

    /// Exposes the inner pool when lower level access is required.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

fn pool_cell(database_url: &str) -> PoolCell {
    let mut pools = POOLS
        .get_or_init(|| Mutex::new(HashMap::new()))
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    pools
        .entry(database_url.to_string())
        .or_default()
        .clone()
}

async fn open_pool(database_url: &str) -> Result<SqlitePool, QueueError> {
    let options = if is_in_memory(database_url) {
        // every connection to `:memory:` is its own database, so keep exactly one alive
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };
    let pool = options.connect(database_url).await?;

    apply_pragmas(&pool).await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;
    Ok(pool)
}

fn is_in_memory(database_url: &str) -> bool {
    database_url.contains(":memory:") || database_url.contains("mode=memory")
}

async fn apply_pragmas(pool: &SqlitePool) -> Result<(), QueueError> {
    sqlx::query("PRAGMA journal_mode = WAL;")
        .fetch_one(pool)
        .await?;

    sqlx::query("PRAGMA busy_timeout = 5000;")
        .execute(pool)
        .await?;

    Ok(())
}

#[async_trait]
impl QueueBackend for SqliteQueue {
    fn kind(&self) -> &'static str {
        "sqlite"
    }

    async fn add(&self, job: &Job) -> Result<(), QueueError> {
        let data_json = serde_json::to_string(&job.data)?;
        sqlx::query(
            "INSERT INTO queue_jobs (id, queue, name, data_json, org_id, created_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&job.id)
        .bind(&self.name)
        .bind(&job.name)
        .bind(data_json)
        .bind(job.org_id.as_deref())
        .bind(job.created_at.to_rfc3339_opts(SecondsFormat::Millis, true))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn waiting_count(&self) -> Result<u64, QueueError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM queue_jobs WHERE queue = ?")
            .bind(&self.name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }
}
