//! # GEO API
//!
//! 面向运维的HTTP接口，基于Axum构建，只是 [`TaskScheduler`] 与执行记录存储之上的薄封装。
//!
//! ## API 端点
//!
//! ### 定时任务
//! - `GET /api/tasks` - 任务列表（含调度状态与下次触发时间）
//! - `GET /api/tasks/{key}` - 单个任务详情
//! - `POST /api/tasks/{key}/update` - 修改 cron / 启用状态，立即生效
//! - `POST /api/tasks/{key}/trigger` - 立即执行一次
//! - `POST /api/tasks/{key}/pause` - 暂停
//! - `POST /api/tasks/{key}/resume` - 恢复
//! - `POST /api/tasks/{key}/clear-quarantine` - 解除隔离
//!
//! ### 执行记录
//! - `GET /api/tasks/{key}/executions` - 任务的执行记录
//! - `GET /api/articles/{id}/executions` - 单篇文章的发布记录
//!
//! ### 健康检查
//! - `GET /health`
//!
//! ## 响应格式
//!
//! 成功时返回 `{"success": true, "data": ..., "message": ..., "timestamp": ...}`，
//! 失败时返回 `{"error": {"message", "type", "code", "timestamp"}}`。
//!
//! [`TaskScheduler`]: geo_dispatcher::TaskScheduler

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;

use std::future::Future;

use anyhow::Context;
use axum::Router;
use tower::ServiceBuilder;
use tracing::info;

use middleware::{request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建带日志中间件的完整应用
pub fn create_app(state: AppState) -> Router {
    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}

/// 在指定地址上提供服务，直到 `shutdown` 完成
pub async fn serve<F>(bind_address: &str, state: AppState, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let listener = tokio::net::TcpListener::bind(bind_address)
        .await
        .with_context(|| format!("无法绑定API监听地址: {bind_address}"))?;
    info!("API服务监听: {}", bind_address);

    axum::serve(listener, create_app(state))
        .with_graceful_shutdown(shutdown)
        .await
        .context("API服务异常退出")?;

    info!("API服务已停止");
    Ok(())
}
