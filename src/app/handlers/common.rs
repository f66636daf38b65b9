use crate::api::error::{ApiError, ApiResult};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value as JsonValue};

// ==========================================
// 公共工具：响应封装、错误映射、请求体解析
// ==========================================

/// 5xx 对外返回的通用消息
pub const INTERNAL_ERROR_MESSAGE: &str = "内部服务器错误";

/// 处理器响应 (HTTP 等价状态 + JSON 正文)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl HandlerResponse {
    pub fn ok(body: JsonValue) -> Self {
        Self { status: 200, body }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: 400,
            body: json!({ "error": message.into(), "code": "INVALID_INPUT" }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// 同步 API 调用放到 blocking 线程执行, 不占用异步工作线程
///
/// 任务 panic 映射为内部错误
pub(super) async fn run_blocking<T, F>(f: F) -> ApiResult<T>
where
    F: FnOnce() -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .unwrap_or_else(|e| Err(ApiError::InternalError(format!("阻塞任务失败: {}", e))))
}

/// 错误日志上下文
pub(super) struct ErrorContext<'a> {
    pub operation: &'a str,
    pub batch_id: Option<&'a str>,
    pub actor_id: Option<&'a str>,
}

/// 将ApiError转换为响应
///
/// 5xx: 完整错误只写日志, 正文为通用消息
pub(super) fn map_api_error(err: ApiError, ctx: ErrorContext<'_>) -> HandlerResponse {
    let status = err.status();
    let message = if err.is_internal() {
        tracing::error!(
            operation = ctx.operation,
            batch_id = ctx.batch_id.unwrap_or("-"),
            actor_id = ctx.actor_id.unwrap_or("system"),
            error = %err,
            "请求处理失败"
        );
        INTERNAL_ERROR_MESSAGE.to_string()
    } else {
        tracing::debug!(operation = ctx.operation, error = %err, "请求被拒绝");
        err.to_string()
    };

    HandlerResponse {
        status,
        body: json!({ "error": message, "code": err.code() }),
    }
}

/// 解析请求体
pub(super) fn parse_body<T: DeserializeOwned>(body: JsonValue) -> Result<T, HandlerResponse> {
    serde_json::from_value(body).map_err(|e| HandlerResponse::bad_request(format!("请求体格式错误: {}", e)))
}

/// 序列化响应正文
pub(super) fn to_body<T: Serialize>(value: &T, operation: &str) -> HandlerResponse {
    match serde_json::to_value(value) {
        Ok(body) => HandlerResponse::ok(body),
        Err(e) => map_api_error(
            ApiError::InternalError(format!("序列化失败: {}", e)),
            ErrorContext {
                operation,
                batch_id: None,
                actor_id: None,
            },
        ),
    }
}
