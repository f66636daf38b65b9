// ==========================================
// IT 资产处置 ERP - 批次累计引擎
// ==========================================
// 职责: 将校验后的成本/收入增量累加到批次,并在同一事务内写审计日志
// 红线: 累加而非覆盖; 读-改-写在 IMMEDIATE 事务内完成,不丢更新
// ==========================================

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde_json::json;
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

use crate::domain::audit_log::AuditDraft;
use crate::domain::batch::Batch;
use crate::domain::ledger::ValidatedOperation;
use crate::domain::types::{AuditAction, AuditEntityType, AuditModule, LedgerKind};
use crate::engine::audit_recorder::AuditRecorder;
use crate::engine::error::{retry_on_conflict, LedgerError};
use crate::engine::session::ScopedContext;
use crate::repository::batch_repo::BatchRepository;
use crate::repository::error::RepositoryError;

/// 累计结果
#[derive(Debug, Clone)]
pub struct AppliedOperation {
    pub batch: Batch,
    pub audit_recorded: bool,
}

// ==========================================
// BatchTotalsAccumulator - 批次累计引擎
// ==========================================
pub struct BatchTotalsAccumulator {
    conn: Arc<Mutex<Connection>>,
    recorder: Arc<AuditRecorder>,
}

impl BatchTotalsAccumulator {
    pub fn new(conn: Arc<Mutex<Connection>>, recorder: Arc<AuditRecorder>) -> Self {
        Self { conn, recorder }
    }

    /// 累加一笔成本或收入
    ///
    /// # 返回
    /// - Ok(AppliedOperation): 更新后的批次
    /// - Err(BatchNotFound): 批次不存在, 不重试
    /// - Err(ConcurrencyConflict): 重试一次后仍冲突
    #[instrument(skip(self, op, scope), fields(batch_id = %op.batch_id, kind = %op.kind, actor_id = scope.actor_id()))]
    pub fn apply(&self, op: &ValidatedOperation, scope: &ScopedContext) -> Result<AppliedOperation, LedgerError> {
        let applied = retry_on_conflict("apply_ledger_operation", || self.apply_once(op, scope))?;
        info!(
            amount = %op.amount,
            total_cost = %applied.batch.total_cost(),
            revenue_total = %applied.batch.revenue_total,
            "批次台账已累加"
        );
        Ok(applied)
    }

    fn apply_once(&self, op: &ValidatedOperation, scope: &ScopedContext) -> Result<AppliedOperation, LedgerError> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let before = BatchRepository::find_by_id_tx(&tx, &op.batch_id)?
            .ok_or_else(|| LedgerError::BatchNotFound(op.batch_id.clone()))?;

        ensure_within_bounds(&before, op)?;

        let now = Utc::now();
        match op.kind {
            LedgerKind::Cost(kind) => BatchRepository::add_cost_tx(&tx, &op.batch_id, kind, op.amount, now)?,
            LedgerKind::Revenue => BatchRepository::add_revenue_tx(&tx, &op.batch_id, op.amount, now)?,
        }

        let after = BatchRepository::find_by_id_tx(&tx, &op.batch_id)?
            .ok_or_else(|| LedgerError::BatchNotFound(op.batch_id.clone()))?;

        let draft = AuditDraft::new(
            AuditAction::Update,
            AuditModule::Finance,
            AuditEntityType::Batch,
            &op.batch_id,
            describe(op, &after),
        )
        .with_reference(after.batch_reference.clone())
        .with_batch_id(Some(after.batch_id.clone()))
        .with_ticket_id(after.ticket_id.clone())
        .with_before(before.audit_snapshot())
        .with_after(after.audit_snapshot())
        .with_additional_data(json!({
            "kind": op.kind.label(),
            "amount": op.amount,
            "description": op.description,
        }));

        let outcome = self.recorder.record_tx(&tx, draft, scope);
        tx.commit()?;
        let outcome = self.recorder.settle(outcome);

        Ok(AppliedOperation {
            batch: after,
            audit_recorded: outcome.is_recorded(),
        })
    }
}

/// 累加后的科目小计、总成本、收入都必须仍在 i64 分范围内
fn ensure_within_bounds(batch: &Batch, op: &ValidatedOperation) -> Result<(), LedgerError> {
    let fits = match op.kind {
        LedgerKind::Cost(kind) => {
            batch.cost_of(kind).checked_add(op.amount).is_some()
                && batch
                    .checked_total_cost()
                    .and_then(|total| total.checked_add(op.amount))
                    .is_some()
        }
        LedgerKind::Revenue => batch.revenue_total.checked_add(op.amount).is_some(),
    };
    if fits {
        Ok(())
    } else {
        Err(LedgerError::InvalidAmount(format!(
            "累加后金额超出上限: 批次 {} {} + {}",
            batch.batch_id,
            op.kind.label(),
            op.amount
        )))
    }
}

fn describe(op: &ValidatedOperation, batch: &Batch) -> String {
    let name = batch.batch_reference.as_deref().unwrap_or(&batch.batch_id);
    let line = match op.kind {
        LedgerKind::Cost(kind) => format!("成本({})", kind.as_str()),
        LedgerKind::Revenue => "收入".to_string(),
    };
    match &op.description {
        Some(text) => format!("批次 {} {} 增加 {}: {}", name, line, op.amount, text),
        None => format!("批次 {} {} 增加 {}", name, line, op.amount),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::money::Money;
    use crate::domain::types::CostKind;
    use crate::repository::audit_log_repo::AuditLogRepository;

    fn setup() -> (Arc<Mutex<Connection>>, BatchTotalsAccumulator) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        BatchRepository::insert_tx(&conn, &Batch::new("B1".to_string(), "W1".to_string())).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        let recorder = Arc::new(AuditRecorder::new(conn.clone()));
        (conn.clone(), BatchTotalsAccumulator::new(conn, recorder))
    }

    fn op(kind: LedgerKind, cents: i64) -> ValidatedOperation {
        ValidatedOperation {
            batch_id: "B1".to_string(),
            kind,
            amount: Money::from_cents(cents),
            description: Some("flete".to_string()),
        }
    }

    #[test]
    fn test_apply_is_additive_and_audited() {
        let (conn, acc) = setup();
        let scope = ScopedContext::system();

        acc.apply(&op(LedgerKind::Cost(CostKind::Logistics), 1_000), &scope).unwrap();
        let applied = acc.apply(&op(LedgerKind::Cost(CostKind::Logistics), 500), &scope).unwrap();
        assert_eq!(applied.batch.cost_of(CostKind::Logistics), Money::from_cents(1_500));
        assert!(applied.audit_recorded);

        let logs = AuditLogRepository::new(conn).list_for_entity(AuditEntityType::Batch, "B1").unwrap();
        assert_eq!(logs.len(), 2);
        let latest = &logs[0];
        assert_eq!(latest.module, AuditModule::Finance);
        let changes = latest.changes_summary.as_ref().unwrap();
        assert_eq!(changes["logistics_cost"].old, json!(10.0));
        assert_eq!(changes["logistics_cost"].new, json!(15.0));
        assert_eq!(latest.additional_data.as_ref().unwrap()["description"], json!("flete"));
    }

    #[test]
    fn test_unknown_batch_is_not_found_and_writes_nothing() {
        let (conn, acc) = setup();
        let mut missing = op(LedgerKind::Revenue, 100);
        missing.batch_id = "B404".to_string();

        let err = acc.apply(&missing, &ScopedContext::system()).unwrap_err();
        assert!(matches!(err, LedgerError::BatchNotFound(id) if id == "B404"));
        assert_eq!(AuditLogRepository::new(conn).count().unwrap(), 0);
    }

    #[test]
    fn test_audit_failure_does_not_roll_back_mutation() {
        let (conn, acc) = setup();
        conn.lock().unwrap().execute_batch("DROP TABLE audit_logs").unwrap();

        let applied = acc.apply(&op(LedgerKind::Revenue, 4_000), &ScopedContext::system()).unwrap();
        assert!(!applied.audit_recorded);

        let batch = BatchRepository::new(conn).find_by_id("B1").unwrap().unwrap();
        assert_eq!(batch.revenue_total, Money::from_cents(4_000));
    }

    #[test]
    fn test_overflowing_totals_are_rejected_without_mutation() {
        let (conn, acc) = setup();
        let scope = ScopedContext::system();
        let near_max = i64::MAX - 5;

        acc.apply(&op(LedgerKind::Revenue, near_max), &scope).unwrap();
        let err = acc.apply(&op(LedgerKind::Revenue, 10), &scope).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
        let applied = acc.apply(&op(LedgerKind::Revenue, 5), &scope).unwrap();
        assert_eq!(applied.batch.revenue_total, Money::from_cents(i64::MAX));

        // 单科目未溢出,但总成本溢出
        acc.apply(&op(LedgerKind::Cost(CostKind::Logistics), near_max), &scope).unwrap();
        let err = acc.apply(&op(LedgerKind::Cost(CostKind::Parts), 10), &scope).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let batch = BatchRepository::new(conn.clone()).find_by_id("B1").unwrap().unwrap();
        assert_eq!(batch.cost_of(CostKind::Parts), Money::ZERO);
        assert_eq!(AuditLogRepository::new(conn).count().unwrap(), 3);
    }
}
