use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{Job, QueueBackend, QueueConnector, QueueError};

type QueueKey = (String, String);

/// Process-local connector. Queues opened through clones of the same
/// connector share storage, keyed by connection URL and queue name.
///
/// Used for `memory:` URLs and as a test double for the network backends.
#[derive(Clone, Default)]
pub struct MemoryConnector {
    store: Arc<Mutex<HashMap<QueueKey, Vec<Job>>>>,
    connections: Arc<Mutex<Vec<QueueKey>>>,
}

impl MemoryConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `(name, connection_url)` pair passed to `connect`, in call order.
    pub async fn connections(&self) -> Vec<(String, String)> {
        self.connections.lock().await.clone()
    }

    /// Snapshot of the jobs stored for a queue.
    pub async fn jobs(&self, connection_url: &str, name: &str) -> Vec<Job> {
        self.store
            .lock()
            .await
            .get(&(connection_url.to_string(), name.to_string()))
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl QueueConnector for MemoryConnector {
    async fn connect(
        &self,
        name: &str,
        connection_url: &str,
    ) -> Result<Arc<dyn QueueBackend>, QueueError> {
        self.connections
            .lock()
            .await
            .push((name.to_string(), connection_url.to_string()));
        Ok(Arc::new(MemoryQueue {
            key: (connection_url.to_string(), name.to_string()),
            store: self.store.clone(),
        }))
    }
}

pub struct MemoryQueue {
    key: QueueKey,
    store: Arc<Mutex<HashMap<QueueKey, Vec<Job>>>>,
}

#[async_trait]
impl QueueBackend for MemoryQueue {
    fn kind(&self) -> &'static str {
        "memory"
    }

    async fn add(&self, job: &Job) -> Result<(), QueueError> {
        self.store
            .lock()
            .await
            .entry(self.key.clone())
            .or_default()
            .push(job.clone());
        Ok(())
    }

    async fn waiting_count(&self) -> Result<u64, QueueError> {
        let store = self.store.lock().await;
        Ok(store.get(&self.key).map_or(0, |jobs| jobs.len() as u64))
    }
}
