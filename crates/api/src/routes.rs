use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use geo_core::ExecutionLogStore;
use geo_dispatcher::TaskScheduler;

use crate::error::ApiError;
use crate::handlers::{
    executions::{list_article_executions, list_task_executions},
    health::health_check,
    tasks::{
        clear_quarantine, get_task, list_tasks, pause_task, resume_task, trigger_task,
        update_task,
    },
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub scheduler: TaskScheduler,
    pub execution_logs: Arc<dyn ExecutionLogStore>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/tasks", get(list_tasks))
        .route("/api/tasks/{key}", get(get_task))
        .route("/api/tasks/{key}/update", post(update_task))
        .route("/api/tasks/{key}/trigger", post(trigger_task))
        .route("/api/tasks/{key}/pause", post(pause_task))
        .route("/api/tasks/{key}/resume", post(resume_task))
        .route("/api/tasks/{key}/clear-quarantine", post(clear_quarantine))
        .route("/api/tasks/{key}/executions", get(list_task_executions))
        .route("/api/articles/{id}/executions", get(list_article_executions))
        .fallback(not_found)
        .with_state(state)
}

async fn not_found() -> ApiError {
    ApiError::NotFound
}
