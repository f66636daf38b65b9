use serde_json::{json, Value as JsonValue};
use std::sync::Arc;

use crate::app::state::AppState;
use crate::domain::actor::ActorContext;
use crate::domain::audit_log::RequestMetadata;
use crate::domain::ledger::LedgerOperation;

use super::common::{map_api_error, parse_body, run_blocking, to_body, ErrorContext, HandlerResponse};

// ==========================================
// 财务相关处理器
// ==========================================

/// 批次成本/收入累加 {batchId, type: cost|revenue, amount, description?}
pub async fn update_batch_totals(
    state: &AppState,
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    body: JsonValue,
) -> HandlerResponse {
    apply_ledger(state, actor, metadata, body, "update_batch_totals", false).await
}

/// 分科目费用 {batchId, type: acquisition|logistics|..., amount, description?}
pub async fn set_batch_expense(
    state: &AppState,
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    body: JsonValue,
) -> HandlerResponse {
    apply_ledger(state, actor, metadata, body, "set_batch_expense", true).await
}

async fn apply_ledger(
    state: &AppState,
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    body: JsonValue,
    operation: &str,
    itemized: bool,
) -> HandlerResponse {
    let op: LedgerOperation = match parse_body(body) {
        Ok(op) => op,
        Err(resp) => return resp,
    };
    let actor_id = actor.as_ref().map(|a| a.user_id.clone());

    let api = Arc::clone(&state.finance_api);
    let request = op.clone();
    let result = run_blocking(move || {
        if itemized {
            api.set_batch_expense(&request, actor, metadata)
        } else {
            api.update_batch_totals(&request, actor, metadata)
        }
    })
    .await;

    match result {
        Ok(_) => HandlerResponse::ok(json!({ "success": true })),
        Err(e) => map_api_error(
            e,
            ErrorContext {
                operation,
                batch_id: op.batch_id.as_deref(),
                actor_id: actor_id.as_deref(),
            },
        ),
    }
}

/// 批次损益汇总
pub async fn get_batch_financials(state: &AppState, batch_id: String) -> HandlerResponse {
    let api = Arc::clone(&state.finance_api);
    let id = batch_id.clone();
    match run_blocking(move || api.get_batch_financials(&id)).await {
        Ok(summary) => to_body(&summary, "get_batch_financials"),
        Err(e) => map_api_error(
            e,
            ErrorContext {
                operation: "get_batch_financials",
                batch_id: Some(&batch_id),
                actor_id: None,
            },
        ),
    }
}
