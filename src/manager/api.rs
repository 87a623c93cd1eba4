use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::Serialize;
use tokio::net::TcpListener;
use uuid::Uuid;

use super::types::{Manager, ManagerError, ManagerServer};
use crate::tasks::Task;

#[derive(Debug, Serialize)]
struct Submitted {
    id: Uuid,
}

impl IntoResponse for ManagerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ManagerError::TaskNotFound(_) => StatusCode::NOT_FOUND,
            ManagerError::InvalidTransition { .. } => StatusCode::CONFLICT,
            ManagerError::NoFeasibleWorker(_) => StatusCode::SERVICE_UNAVAILABLE,
            ManagerError::UnknownWorker(_) | ManagerError::WorkerCommunication(_) => {
                StatusCode::BAD_GATEWAY
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl ManagerServer {
    pub fn new(manager: Arc<Manager>, address: &str, port: u16) -> Self {
        Self {
            manager,
            address: address.to_string(),
            port,
        }
    }

    async fn submit_task(
        AxumState(manager): AxumState<Arc<Manager>>,
        Json(task): Json<Task>,
    ) -> impl IntoResponse {
        let id = manager.submit_task(task).await;
        (StatusCode::CREATED, Json(Submitted { id }))
    }

    async fn list_tasks(AxumState(manager): AxumState<Arc<Manager>>) -> Json<Vec<Task>> {
        Json(manager.list_tasks().await)
    }

    async fn get_task(
        AxumState(manager): AxumState<Arc<Manager>>,
        Path(id): Path<Uuid>,
    ) -> Result<Json<Task>, ManagerError> {
        manager.get_task(id).await.map(Json)
    }

    async fn stop_task(
        AxumState(manager): AxumState<Arc<Manager>>,
        Path(id): Path<Uuid>,
    ) -> Result<StatusCode, ManagerError> {
        manager.stop_task(id).await?;
        Ok(StatusCode::ACCEPTED)
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route(
                "/tasks",
                get(ManagerServer::list_tasks).post(ManagerServer::submit_task),
            )
            .route(
                "/tasks/{id}",
                get(ManagerServer::get_task).delete(ManagerServer::stop_task),
            )
            .with_state(self.manager.clone())
    }

    pub async fn start_server(self) -> std::io::Result<()> {
        let app = self.router();
        let listener = TcpListener::bind(format!("{}:{}", self.address, self.port)).await?;
        tracing::info!(address = %self.address, port = self.port, "Manager API listening");

        axum::serve(listener, app).await
    }
}
