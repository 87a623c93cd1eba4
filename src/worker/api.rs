use axum::{
    Json, Router,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
};

use super::types::{TaskServer, Worker, WorkerStats};
use crate::tasks::{State, Task, TaskEvent};
use std::sync::Arc;
use tokio::net::TcpListener;
use uuid::Uuid;

impl TaskServer {
    pub fn new(worker: Arc<Worker>, address: &str, port: u16) -> Self {
        Self {
            worker,
            address: address.to_string(),
            port,
        }
    }

    async fn get_tasks(AxumState(worker): AxumState<Arc<Worker>>) -> Json<Vec<Task>> {
        Json(worker.tasks().await)
    }

    async fn start_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        Json(task_event): Json<TaskEvent>,
    ) -> impl IntoResponse {
        tracing::info!(task_id = %task_event.task.id, state = %task_event.state, "Task event received");
        worker.enqueue(task_event).await;
        StatusCode::CREATED
    }

    async fn stop_task(
        AxumState(worker): AxumState<Arc<Worker>>,
        Path(id): Path<Uuid>,
    ) -> impl IntoResponse {
        let Some(task) = worker.task(&id).await else {
            return (
                StatusCode::NOT_FOUND,
                format!("Task with id {} not found", id),
            );
        };

        worker.enqueue(TaskEvent::new(State::Completed, task)).await;
        tracing::info!(task_id = %id, "Task queued to stop");
        (StatusCode::ACCEPTED, format!("Task with id {} queued to stop", id))
    }

    async fn get_stats(AxumState(worker): AxumState<Arc<Worker>>) -> Json<WorkerStats> {
        Json(worker.stats().await)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/tasks", get(TaskServer::get_tasks).post(TaskServer::start_task))
            .route("/tasks/{id}", axum::routing::delete(TaskServer::stop_task))
            .route("/stats", get(TaskServer::get_stats))
            .with_state(self.worker.clone())
    }

    pub async fn start_server(self) -> std::io::Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(format!("{}:{}", self.address, self.port)).await?;
        tracing::info!(address = %self.address, port = self.port, worker = %self.worker.name, "Worker API listening");

        axum::serve(listener, app).await
    }
}
