// ==========================================
// IT 资产处置 ERP - 价格分摊引擎
// ==========================================
// 职责: 将批次总售价平均分摊到批次内的设备
// 红线: 覆盖而非累加; 读设备集合到写完所有单价在同一事务内
// 规则: 每台 floor(total/count) 分, 余数 r 分由 unit_id 升序的最后 r 台各得 1 分
// ==========================================

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::{json, Map, Value as JsonValue};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

use crate::domain::audit_log::AuditDraft;
use crate::domain::ledger::{DistributionOutcome, ValidatedDistribution};
use crate::domain::money::Money;
use crate::domain::types::{AuditAction, AuditEntityType, AuditModule};
use crate::engine::audit_recorder::AuditRecorder;
use crate::engine::error::{retry_on_conflict, LedgerError};
use crate::engine::session::ScopedContext;
use crate::repository::batch_repo::BatchRepository;
use crate::repository::error::RepositoryError;
use crate::repository::unit_repo::UnitRepository;

/// 平均分摊
///
/// 返回 count 个金额, 总和严格等于 total, 且彼此相差不超过 1 分。
/// count == 0 或 total 为负时返回 None。
pub fn allocate_evenly(total: Money, count: usize) -> Option<Vec<Money>> {
    if count == 0 || total.is_negative() {
        return None;
    }
    let n = count as i64;
    let base = total.cents() / n;
    let residual = (total.cents() % n) as usize;

    Some(
        (0..count)
            .map(|i| {
                let bump = if i >= count - residual { 1 } else { 0 };
                Money::from_cents(base + bump)
            })
            .collect(),
    )
}

// ==========================================
// PriceDistributionEngine - 价格分摊引擎
// ==========================================
pub struct PriceDistributionEngine {
    conn: Arc<Mutex<Connection>>,
    recorder: Arc<AuditRecorder>,
}

impl PriceDistributionEngine {
    pub fn new(conn: Arc<Mutex<Connection>>, recorder: Arc<AuditRecorder>) -> Self {
        Self { conn, recorder }
    }

    /// 分摊总价到批次设备
    ///
    /// # 返回
    /// - Err(NoUnitsInBatch): 没有可分摊的设备, 不做任何修改
    /// - Err(BatchNotFound): 批次不存在
    #[instrument(skip(self, req, scope), fields(batch_id = %req.batch_id, actor_id = scope.actor_id()))]
    pub fn distribute(
        &self,
        req: &ValidatedDistribution,
        scope: &ScopedContext,
    ) -> Result<DistributionOutcome, LedgerError> {
        let outcome = retry_on_conflict("distribute_batch_price", || self.distribute_once(req, scope))?;
        info!(
            count = outcome.count,
            total_price = %outcome.total_price,
            price_per_unit = outcome.price_per_unit,
            "批次售价已分摊"
        );
        Ok(outcome)
    }

    fn distribute_once(
        &self,
        req: &ValidatedDistribution,
        scope: &ScopedContext,
    ) -> Result<DistributionOutcome, LedgerError> {
        if req.total_price.is_negative() {
            return Err(LedgerError::InvalidPrice(format!("总价不能为负: {}", req.total_price)));
        }

        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let batch = BatchRepository::find_by_id_tx(&tx, &req.batch_id)?
            .ok_or_else(|| LedgerError::BatchNotFound(req.batch_id.clone()))?;

        let units = UnitRepository::list_by_batch_tx(&tx, &req.batch_id, req.warehouse_code.as_deref())?;
        let prices = allocate_evenly(req.total_price, units.len())
            .ok_or_else(|| LedgerError::NoUnitsInBatch(req.batch_id.clone()))?;
        let count = units.len() as u64;
        let (price_per_unit, unit_sale_price) = req
            .total_price
            .exact_share(count)
            .zip(req.total_price.div_round_half_up(count))
            .ok_or_else(|| LedgerError::NoUnitsInBatch(req.batch_id.clone()))?;

        let now = Utc::now();
        let mut unit_prices = Vec::with_capacity(units.len());
        for (unit, price) in units.iter().zip(prices) {
            UnitRepository::set_sale_price_tx(&tx, &unit.unit_id, price, now)?;
            unit_prices.push((unit.unit_id.clone(), price));
        }
        BatchRepository::set_unit_sale_price_tx(&tx, &req.batch_id, unit_sale_price, now)?;

        let before = json!({
            "unit_sale_price": batch.unit_sale_price,
            "unit_prices": price_map(units.iter().map(|u| (u.unit_id.as_str(), u.sale_price))),
        });
        let after = json!({
            "unit_sale_price": unit_sale_price,
            "unit_prices": price_map(unit_prices.iter().map(|(id, p)| (id.as_str(), Some(*p)))),
        });

        let name = batch.batch_reference.as_deref().unwrap_or(&batch.batch_id);
        let draft = AuditDraft::new(
            AuditAction::Update,
            AuditModule::Warehouse,
            AuditEntityType::Batch,
            &batch.batch_id,
            format!("批次 {} 售价分摊: 总价 {} / {} 台", name, req.total_price, units.len()),
        )
        .with_reference(batch.batch_reference.clone())
        .with_batch_id(Some(batch.batch_id.clone()))
        .with_ticket_id(batch.ticket_id.clone())
        .with_before(before)
        .with_after(after)
        .with_additional_data(json!({
            "total_price": req.total_price,
            "warehouse_code": req.warehouse_code,
            "count": units.len(),
        }));

        let outcome = self.recorder.record_tx(&tx, draft, scope);
        tx.commit()?;
        self.recorder.settle(outcome);

        Ok(DistributionOutcome {
            batch_id: batch.batch_id,
            count: units.len(),
            price_per_unit,
            unit_sale_price,
            total_price: req.total_price,
            unit_prices,
        })
    }
}

fn price_map<'a>(prices: impl Iterator<Item = (&'a str, Option<Money>)>) -> JsonValue {
    let map: Map<String, JsonValue> = prices
        .map(|(id, price)| (id.to_string(), json!(price)))
        .collect();
    JsonValue::Object(map)
}
