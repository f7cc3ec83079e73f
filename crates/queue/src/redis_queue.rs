use std::sync::Arc;

use async_trait::async_trait;

use crate::{Job, QueueBackend, QueueConnector, QueueError};

const KEY_PREFIX: &str = "queue";

/// Connector for `redis://` and `rediss://` URLs.
///
/// Opening a queue only parses the URL into a client; the TCP connection is
/// made on the first operation and re-acquired for each one.
#[derive(Debug, Clone, Copy, Default)]
pub struct RedisConnector;

#[async_trait]
impl QueueConnector for RedisConnector {
    async fn connect(
        &self,
        name: &str,
        connection_url: &str,
    ) -> Result<Arc<dyn QueueBackend>, QueueError> {
        let client = redis::Client::open(connection_url)?;
        Ok(Arc::new(RedisQueue::new(client, name)))
    }
}

/// Queue stored as a Redis list at `queue:{name}:wait`.
#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    wait_key: String,
}

impl RedisQueue {
    pub fn new(client: redis::Client, name: &str) -> Self {
        Self {
            client,
            wait_key: wait_key(name),
        }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection, QueueError> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl QueueBackend for RedisQueue {
    fn kind(&self) -> &'static str {
        "redis"
    }

    async fn add(&self, job: &Job) -> Result<(), QueueError> {
        let payload = serde_json::to_string(job)?;
        let mut conn = self.connection().await?;
        let _: i64 = redis::cmd("LPUSH")
            .arg(&self.wait_key)
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn waiting_count(&self) -> Result<u64, QueueError> {
        let mut conn = self.connection().await?;
        let len: u64 = redis::cmd("LLEN")
            .arg(&self.wait_key)
            .query_async(&mut conn)
            .await?;
        Ok(len)
    }
}

fn wait_key(name: &str) -> String {
    format!("{KEY_PREFIX}:{name}:wait")
}
