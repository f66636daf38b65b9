// ==========================================
// IT 资产处置 ERP - 接收登记
// ==========================================
// 职责: 登记批次与设备,维护批次设备数,写入 RECEPTION 审计
// ==========================================

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use std::sync::{Arc, Mutex};
use tracing::{info, instrument};

use crate::domain::audit_log::AuditDraft;
use crate::domain::batch::{Batch, Unit};
use crate::domain::types::{AuditAction, AuditEntityType, AuditModule};
use crate::engine::audit_recorder::AuditRecorder;
use crate::engine::error::{retry_on_conflict, LedgerError};
use crate::engine::session::ScopedContext;
use crate::repository::batch_repo::BatchRepository;
use crate::repository::error::RepositoryError;
use crate::repository::unit_repo::UnitRepository;

pub struct BatchIntake {
    conn: Arc<Mutex<Connection>>,
    recorder: Arc<AuditRecorder>,
}

impl BatchIntake {
    pub fn new(conn: Arc<Mutex<Connection>>, recorder: Arc<AuditRecorder>) -> Self {
        Self { conn, recorder }
    }

    /// 登记新批次
    #[instrument(skip(self, batch, scope), fields(batch_id = %batch.batch_id, actor_id = scope.actor_id()))]
    pub fn register_batch(&self, batch: Batch, scope: &ScopedContext) -> Result<Batch, LedgerError> {
        if batch.batch_id.trim().is_empty() {
            return Err(LedgerError::MissingField("batchId".to_string()));
        }
        if batch.warehouse_code.trim().is_empty() {
            return Err(LedgerError::MissingField("warehouseCode".to_string()));
        }

        let batch = retry_on_conflict("register_batch", || {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            if BatchRepository::exists_tx(&tx, &batch.batch_id)? {
                return Err(LedgerError::Validation(format!("批次已存在: {}", batch.batch_id)));
            }
            BatchRepository::insert_tx(&tx, &batch)?;

            let name = batch.batch_reference.as_deref().unwrap_or(&batch.batch_id);
            let draft = AuditDraft::new(
                AuditAction::Create,
                AuditModule::Reception,
                AuditEntityType::Batch,
                &batch.batch_id,
                format!("登记批次 {} (仓库 {})", name, batch.warehouse_code),
            )
            .with_reference(batch.batch_reference.clone())
            .with_batch_id(Some(batch.batch_id.clone()))
            .with_ticket_id(batch.ticket_id.clone())
            .with_after(batch.audit_snapshot());

            let outcome = self.recorder.record_tx(&tx, draft, scope);
            tx.commit()?;
            self.recorder.settle(outcome);
            Ok(batch.clone())
        })?;

        info!(warehouse_code = %batch.warehouse_code, "批次已登记");
        Ok(batch)
    }

    /// 登记设备并累加批次设备数
    #[instrument(skip(self, unit, scope), fields(unit_id = %unit.unit_id, batch_id = %unit.batch_id, actor_id = scope.actor_id()))]
    pub fn register_unit(&self, unit: Unit, scope: &ScopedContext) -> Result<Unit, LedgerError> {
        if unit.unit_id.trim().is_empty() {
            return Err(LedgerError::MissingField("unitId".to_string()));
        }

        let unit = retry_on_conflict("register_unit", || {
            let mut conn = self.lock()?;
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

            let batch = BatchRepository::find_by_id_tx(&tx, &unit.batch_id)?
                .ok_or_else(|| LedgerError::BatchNotFound(unit.batch_id.clone()))?;
            if UnitRepository::find_by_id_tx(&tx, &unit.unit_id)?.is_some() {
                return Err(LedgerError::Validation(format!("设备已存在: {}", unit.unit_id)));
            }

            UnitRepository::insert_tx(&tx, &unit)?;
            BatchRepository::increment_unit_count_tx(&tx, &unit.batch_id, Utc::now())?;

            let reference = unit.serial_number.clone();
            let draft = AuditDraft::new(
                AuditAction::Create,
                AuditModule::Reception,
                AuditEntityType::Asset,
                &unit.unit_id,
                format!(
                    "登记设备 {} 到批次 {}",
                    reference.as_deref().unwrap_or(&unit.unit_id),
                    batch.batch_reference.as_deref().unwrap_or(&batch.batch_id)
                ),
            )
            .with_reference(reference)
            .with_asset_id(Some(unit.unit_id.clone()))
            .with_batch_id(Some(batch.batch_id.clone()))
            .with_ticket_id(batch.ticket_id.clone())
            .with_after(unit.audit_snapshot());

            let outcome = self.recorder.record_tx(&tx, draft, scope);
            tx.commit()?;
            self.recorder.settle(outcome);
            Ok(unit.clone())
        })?;

        info!("设备已登记");
        Ok(unit)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, LedgerError> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()).into())
    }
}
