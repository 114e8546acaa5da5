use axum::{
    extract::{Path, State},
    response::IntoResponse,
    Json,
};
use geo_core::TaskScheduleUpdate;
use serde::Serialize;
use tracing::info;

use crate::{
    error::{ApiError, ApiResult},
    response::{success, success_with_message},
    routes::AppState,
};

/// 立即执行的结果
#[derive(Debug, Serialize)]
pub struct TriggerResponse {
    pub task_key: String,
    pub triggered: bool,
}

/// 获取任务列表
pub async fn list_tasks(State(state): State<AppState>) -> ApiResult<impl IntoResponse> {
    let jobs = state.scheduler.jobs().await?;
    Ok(success(jobs))
}

/// 获取单个任务
pub async fn get_task(
    State(state): State<AppState>,
    Path(task_key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let job = state.scheduler.job(&task_key).await?;
    Ok(success(job))
}

/// 修改任务的 cron / 启用状态，保存后立即重新注册
pub async fn update_task(
    State(state): State<AppState>,
    Path(task_key): Path<String>,
    Json(request): Json<TaskScheduleUpdate>,
) -> ApiResult<impl IntoResponse> {
    if request.is_empty() {
        return Err(ApiError::BadRequest("至少需要提供一个修改字段".to_string()));
    }
    if request
        .cron_expression
        .as_deref()
        .is_some_and(|expr| expr.trim().is_empty())
    {
        return Err(ApiError::BadRequest("cron表达式不能为空".to_string()));
    }

    info!("收到任务配置修改请求: {} {:?}", task_key, request);
    state.scheduler.update_task(&task_key, &request).await?;
    let job = state.scheduler.job(&task_key).await?;
    Ok(success_with_message(job, "任务配置已更新"))
}

/// 立即执行一次
pub async fn trigger_task(
    State(state): State<AppState>,
    Path(task_key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let triggered = state.scheduler.trigger_now(&task_key).await?;
    let message = if triggered {
        "任务已触发"
    } else {
        "上一次运行尚未结束，本次触发已跳过"
    };
    Ok(success_with_message(
        TriggerResponse {
            task_key,
            triggered,
        },
        message,
    ))
}

pub async fn pause_task(
    State(state): State<AppState>,
    Path(task_key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.pause(&task_key).await?;
    let job = state.scheduler.job(&task_key).await?;
    Ok(success_with_message(job, "任务已暂停"))
}

pub async fn resume_task(
    State(state): State<AppState>,
    Path(task_key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.resume(&task_key).await?;
    let job = state.scheduler.job(&task_key).await?;
    Ok(success_with_message(job, "任务已恢复"))
}

/// 解除隔离
pub async fn clear_quarantine(
    State(state): State<AppState>,
    Path(task_key): Path<String>,
) -> ApiResult<impl IntoResponse> {
    state.scheduler.clear_quarantine(&task_key).await?;
    let job = state.scheduler.job(&task_key).await?;
    Ok(success_with_message(job, "任务已解除隔离"))
}
