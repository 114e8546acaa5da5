use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
};
use geo_core::TASK_AUTO_PUBLISH;
use serde::Deserialize;

use crate::{
    error::{ApiError, ApiResult},
    response::success,
    routes::AppState,
};

const DEFAULT_LIMIT: i64 = 20;
const MAX_LIMIT: i64 = 200;

/// 执行记录查询参数
#[derive(Debug, Default, Deserialize)]
pub struct ExecutionQueryParams {
    pub limit: Option<i64>,
    /// 文章记录默认查自动发布任务
    pub task_key: Option<String>,
}

impl ExecutionQueryParams {
    fn limit(&self) -> ApiResult<i64> {
        match self.limit {
            None => Ok(DEFAULT_LIMIT),
            Some(limit) if (1..=MAX_LIMIT).contains(&limit) => Ok(limit),
            Some(limit) => Err(ApiError::BadRequest(format!(
                "limit 必须在 1 到 {MAX_LIMIT} 之间，当前为 {limit}"
            ))),
        }
    }
}

/// 任务的执行记录，按开始时间倒序
pub async fn list_task_executions(
    State(state): State<AppState>,
    Path(task_key): Path<String>,
    Query(params): Query<ExecutionQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit()?;
    // 先确认任务存在，未知任务返回 404 而不是空列表
    state.scheduler.job_state(&task_key).await?;
    let entries = state
        .execution_logs
        .list_by_task(&task_key, limit)
        .await?;
    Ok(success(entries))
}

/// 单篇文章的发布记录
pub async fn list_article_executions(
    State(state): State<AppState>,
    Path(article_id): Path<i64>,
    Query(params): Query<ExecutionQueryParams>,
) -> ApiResult<impl IntoResponse> {
    let limit = params.limit()?;
    let task_key = params.task_key.as_deref().unwrap_or(TASK_AUTO_PUBLISH);
    let entries = state
        .execution_logs
        .list_by_target(task_key, article_id, limit)
        .await?;
    Ok(success(entries))
}
