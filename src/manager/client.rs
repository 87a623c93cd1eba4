use std::sync::Arc;

use async_trait::async_trait;

use super::types::{ManagerError, ManagerResult};
use crate::tasks::{Task, TaskEvent};
use crate::worker::{Worker, WorkerStats};

/// How the manager reaches a worker's dispatch and reporting surfaces.
#[async_trait]
pub trait WorkerClient: Send + Sync {
    fn name(&self) -> &str;

    async fn enqueue(&self, event: TaskEvent) -> ManagerResult<()>;

    async fn stats(&self) -> ManagerResult<WorkerStats>;

    async fn tasks(&self) -> ManagerResult<Vec<Task>>;
}

/// A worker running in the same process.
#[derive(Clone)]
pub struct LocalWorker {
    worker: Arc<Worker>,
}

impl LocalWorker {
    pub fn new(worker: Arc<Worker>) -> Self {
        Self { worker }
    }
}

#[async_trait]
impl WorkerClient for LocalWorker {
    fn name(&self) -> &str {
        &self.worker.name
    }

    async fn enqueue(&self, event: TaskEvent) -> ManagerResult<()> {
        self.worker.enqueue(event).await;
        Ok(())
    }

    async fn stats(&self) -> ManagerResult<WorkerStats> {
        Ok(self.worker.stats().await)
    }

    async fn tasks(&self) -> ManagerResult<Vec<Task>> {
        Ok(self.worker.tasks().await)
    }
}

/// A worker reached over its HTTP API at `host:port`.
#[derive(Debug, Clone)]
pub struct HttpWorker {
    address: String,
    client: reqwest::Client,
}

impl HttpWorker {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            client: reqwest::Client::new(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.address, path)
    }

    fn communication_error(&self, err: impl std::fmt::Display) -> ManagerError {
        ManagerError::WorkerCommunication(format!("{}: {}", self.address, err))
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> ManagerResult<T> {
        let resp = self
            .client
            .get(self.url(path))
            .send()
            .await
            .map_err(|e| self.communication_error(e))?;

        if !resp.status().is_success() {
            return Err(self.communication_error(format!("GET {} returned {}", path, resp.status())));
        }

        resp.json().await.map_err(|e| self.communication_error(e))
    }
}

#[async_trait]
impl WorkerClient for HttpWorker {
    fn name(&self) -> &str {
        &self.address
    }

    async fn enqueue(&self, event: TaskEvent) -> ManagerResult<()> {
        let resp = self
            .client
            .post(self.url("/tasks"))
            .json(&event)
            .send()
            .await
            .map_err(|e| self.communication_error(e))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(self.communication_error(format!("failed to send event: {}", resp.status())))
        }
    }

    async fn stats(&self) -> ManagerResult<WorkerStats> {
        self.get_json("/stats").await
    }

    async fn tasks(&self) -> ManagerResult<Vec<Task>> {
        self.get_json("/tasks").await
    }
}
