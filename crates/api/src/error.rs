use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use geo_core::GeoError;
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("调度器错误: {0}")]
    Geo(#[from] GeoError),

    #[error("请求参数错误: {0}")]
    BadRequest(String),

    #[error("未找到资源")]
    NotFound,
}

impl ApiError {
    fn status_and_type(&self) -> (StatusCode, &'static str) {
        match self {
            ApiError::Geo(err) => match err {
                GeoError::TaskNotFound { .. } => (StatusCode::NOT_FOUND, "TASK_NOT_FOUND"),
                GeoError::ArticleNotFound { .. } => (StatusCode::NOT_FOUND, "ARTICLE_NOT_FOUND"),
                GeoError::ExecutionLogNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "EXECUTION_NOT_FOUND")
                }
                GeoError::IndexTargetNotFound { .. } => {
                    (StatusCode::NOT_FOUND, "INDEX_TARGET_NOT_FOUND")
                }
                GeoError::InvalidCron { .. } => {
                    (StatusCode::BAD_REQUEST, "INVALID_CRON_EXPRESSION")
                }
                GeoError::Configuration(_) => (StatusCode::BAD_REQUEST, "INVALID_CONFIGURATION"),
                GeoError::TaskQuarantined { .. } => (StatusCode::CONFLICT, "TASK_QUARANTINED"),
                GeoError::HandlerNotRegistered { .. } => {
                    (StatusCode::CONFLICT, "HANDLER_NOT_REGISTERED")
                }
                _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND"),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type) = self.status_and_type();
        let message = match &self {
            ApiError::Geo(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!("请求处理失败: {}", err);
                "系统内部错误".to_string()
            }
            ApiError::Geo(err) => err.to_string(),
            other => other.to_string(),
        };

        let body = Json(json!({
            "error": {
                "message": message,
                "type": error_type,
                "code": status.as_u16(),
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }
        }));

        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_task_not_found_is_404() {
        let error: ApiError = GeoError::TaskNotFound {
            task_key: "auto_publish".to_string(),
        }
        .into();
        assert_eq!(error.into_response().status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn test_invalid_cron_is_400() {
        let error: ApiError = GeoError::InvalidCron {
            expr: "bad".to_string(),
            message: "格式错误".to_string(),
        }
        .into();
        assert_eq!(error.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_quarantined_task_is_409() {
        let error: ApiError = GeoError::TaskQuarantined {
            task_key: "index_check".to_string(),
            reason: "连续失败".to_string(),
        }
        .into();
        assert_eq!(error.into_response().status(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_store_failure_is_500() {
        let error: ApiError = GeoError::DatabaseOperation("连接已关闭".to_string()).into();
        assert_eq!(
            error.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_api_error_display() {
        assert_eq!(ApiError::NotFound.to_string(), "未找到资源");
        assert_eq!(
            ApiError::BadRequest("limit".to_string()).to_string(),
            "请求参数错误: limit"
        );
    }
}
