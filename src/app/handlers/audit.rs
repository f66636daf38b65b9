use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use crate::api::audit_api::CommentRequest;
use crate::app::state::AppState;
use crate::domain::actor::ActorContext;
use crate::domain::audit_log::{AuditSearchFilter, RequestMetadata};
use crate::domain::types::{AuditAction, AuditEntityType, AuditModule};

use super::common::{map_api_error, parse_body, run_blocking, to_body, ErrorContext, HandlerResponse};

// ==========================================
// 审计相关处理器
// ==========================================

/// 实体审计历史 (新 -> 旧)
pub async fn audit_history(state: &AppState, entity_type: String, entity_id: String) -> HandlerResponse {
    let api = Arc::clone(&state.audit_api);
    match run_blocking(move || api.history(&entity_type, &entity_id)).await {
        Ok(logs) => to_body(&logs, "audit_history"),
        Err(e) => map_api_error(
            e,
            ErrorContext {
                operation: "audit_history",
                batch_id: None,
                actor_id: None,
            },
        ),
    }
}

/// 审计检索查询参数
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListAuditQuery {
    #[serde(default)]
    entity_type: Option<String>,
    #[serde(default)]
    entity_id: Option<String>,
    #[serde(default)]
    module: Option<String>,
    #[serde(default)]
    action: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    date_from: Option<String>,
    #[serde(default)]
    date_to: Option<String>,
    #[serde(default)]
    search: Option<String>,
    #[serde(default)]
    page: Option<u32>,
    #[serde(default)]
    limit: Option<u32>,
}

/// 条件检索审计日志
pub async fn list_audit_logs(state: &AppState, query: JsonValue) -> HandlerResponse {
    let query: ListAuditQuery = match parse_body(query) {
        Ok(q) => q,
        Err(resp) => return resp,
    };
    let filter = match build_filter(&query) {
        Ok(f) => f,
        Err(msg) => return HandlerResponse::bad_request(msg),
    };

    let api = Arc::clone(&state.audit_api);
    let (page, limit) = (query.page, query.limit);
    match run_blocking(move || api.search(&filter, page, limit)).await {
        Ok(page) => to_body(&page, "list_audit_logs"),
        Err(e) => map_api_error(
            e,
            ErrorContext {
                operation: "list_audit_logs",
                batch_id: None,
                actor_id: None,
            },
        ),
    }
}

/// 人工评论 {entityType, entityId, entityReference?, comment, module?}
pub async fn add_audit_comment(
    state: &AppState,
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    body: JsonValue,
) -> HandlerResponse {
    let req: CommentRequest = match parse_body(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let actor_id = actor.as_ref().map(|a| a.user_id.clone());

    let bounds = state.audit_api.comment_bounds().await;
    let api = Arc::clone(&state.audit_api);
    match run_blocking(move || api.record_comment(&req, actor, metadata, bounds)).await {
        Ok(entry) => HandlerResponse::ok(json!({ "success": true, "log": entry })),
        Err(e) => map_api_error(
            e,
            ErrorContext {
                operation: "add_audit_comment",
                batch_id: None,
                actor_id: actor_id.as_deref(),
            },
        ),
    }
}

fn build_filter(query: &ListAuditQuery) -> Result<AuditSearchFilter, String> {
    let text = |v: &Option<String>| {
        v.as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    let entity_type = match text(&query.entity_type) {
        Some(raw) => Some(AuditEntityType::from_str(&raw).ok_or_else(|| format!("无效实体类型: {}", raw))?),
        None => None,
    };
    let module = match text(&query.module) {
        Some(raw) => Some(AuditModule::from_str(&raw).ok_or_else(|| format!("无效模块: {}", raw))?),
        None => None,
    };
    let action = match text(&query.action) {
        Some(raw) => Some(AuditAction::from_str(&raw).ok_or_else(|| format!("无效动作: {}", raw))?),
        None => None,
    };

    Ok(AuditSearchFilter {
        entity_type,
        entity_id: text(&query.entity_id),
        module,
        action,
        user_id: text(&query.user_id),
        from: text(&query.date_from).map(|s| parse_bound(&s, false)).transpose()?,
        to: text(&query.date_to).map(|s| parse_bound(&s, true)).transpose()?,
        search: text(&query.search),
    })
}

/// 解析时间边界: RFC 3339 或 YYYY-MM-DD (结束边界取当日最后一微秒)
fn parse_bound(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, String> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Ok(ts.with_timezone(&Utc));
    }
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|e| format!("日期格式错误（应为YYYY-MM-DD或RFC 3339）: {}", e))?;
    let time = if end_of_day {
        date.and_hms_micro_opt(23, 59, 59, 999_999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    time.map(|t| t.and_utc())
        .ok_or_else(|| format!("无效日期: {}", raw))
}
