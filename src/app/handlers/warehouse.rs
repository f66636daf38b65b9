use serde::Deserialize;
use serde_json::{json, Value as JsonValue};
use std::sync::Arc;
use tracing::warn;

use crate::app::state::AppState;
use crate::config::ledger_config_trait::LedgerConfigReader;
use crate::domain::actor::ActorContext;
use crate::domain::audit_log::RequestMetadata;
use crate::domain::batch::{Batch, Unit};
use crate::domain::ledger::PriceDistributionRequest;

use super::common::{map_api_error, parse_body, run_blocking, to_body, ErrorContext, HandlerResponse};

const DEFAULT_CURRENCY_SYMBOL: &str = "Q";

// ==========================================
// 仓库相关处理器
// ==========================================

/// 批次售价分摊 {batchId, warehouseCode?, totalPrice}
pub async fn set_batch_price(
    state: &AppState,
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    body: JsonValue,
) -> HandlerResponse {
    let req: PriceDistributionRequest = match parse_body(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let actor_id = actor.as_ref().map(|a| a.user_id.clone());

    let api = Arc::clone(&state.warehouse_api);
    let request = req.clone();
    let outcome = match run_blocking(move || api.set_batch_price(&request, actor, metadata)).await {
        Ok(outcome) => outcome,
        Err(e) => {
            return map_api_error(
                e,
                ErrorContext {
                    operation: "set_batch_price",
                    batch_id: req.batch_id.as_deref(),
                    actor_id: actor_id.as_deref(),
                },
            )
        }
    };

    let symbol = state.config.get_currency_symbol().await.unwrap_or_else(|e| {
        warn!(error = %e, "读取货币符号失败，使用默认值");
        DEFAULT_CURRENCY_SYMBOL.to_string()
    });

    HandlerResponse::ok(json!({
        "success": true,
        "count": outcome.count,
        "pricePerUnit": outcome.price_per_unit,
        "message": format!("售价 {}{} 已分摊到 {} 台设备", symbol, outcome.total_price, outcome.count),
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterBatchRequest {
    batch_id: String,
    warehouse_code: String,
    #[serde(default)]
    ticket_id: Option<String>,
    #[serde(default)]
    batch_reference: Option<String>,
}

/// 登记批次 {batchId, warehouseCode, ticketId?, batchReference?}
pub async fn register_batch(
    state: &AppState,
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    body: JsonValue,
) -> HandlerResponse {
    let req: RegisterBatchRequest = match parse_body(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let actor_id = actor.as_ref().map(|a| a.user_id.clone());

    let mut batch = Batch::new(req.batch_id.trim().to_string(), req.warehouse_code.trim().to_string());
    batch.ticket_id = req.ticket_id;
    batch.batch_reference = req.batch_reference;
    let batch_id = batch.batch_id.clone();

    let api = Arc::clone(&state.warehouse_api);
    match run_blocking(move || api.register_batch(batch, actor, metadata)).await {
        Ok(batch) => to_body(&batch, "register_batch"),
        Err(e) => map_api_error(
            e,
            ErrorContext {
                operation: "register_batch",
                batch_id: Some(&batch_id),
                actor_id: actor_id.as_deref(),
            },
        ),
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegisterUnitRequest {
    unit_id: String,
    batch_id: String,
    warehouse_code: String,
    #[serde(default)]
    serial_number: Option<String>,
}

/// 登记设备 {unitId, batchId, warehouseCode, serialNumber?}
pub async fn register_unit(
    state: &AppState,
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    body: JsonValue,
) -> HandlerResponse {
    let req: RegisterUnitRequest = match parse_body(body) {
        Ok(req) => req,
        Err(resp) => return resp,
    };
    let actor_id = actor.as_ref().map(|a| a.user_id.clone());

    let mut unit = Unit::new(
        req.unit_id.trim().to_string(),
        req.batch_id.trim().to_string(),
        req.warehouse_code.trim().to_string(),
    );
    unit.serial_number = req.serial_number;

    let api = Arc::clone(&state.warehouse_api);
    match run_blocking(move || api.register_unit(unit, actor, metadata)).await {
        Ok(unit) => to_body(&unit, "register_unit"),
        Err(e) => map_api_error(
            e,
            ErrorContext {
                operation: "register_unit",
                batch_id: Some(req.batch_id.trim()),
                actor_id: actor_id.as_deref(),
            },
        ),
    }
}
