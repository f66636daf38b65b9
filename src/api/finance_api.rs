// ==========================================
// IT 资产处置 ERP - 财务 API
// ==========================================
// 职责: 批次成本/收入累加、分科目费用、批次损益查询
// 流程: 绑定操作人 -> 校验 -> 累加 (同事务审计)
// ==========================================

use std::sync::Arc;

use crate::api::error::{ApiError, ApiResult};
use crate::domain::actor::ActorContext;
use crate::domain::audit_log::RequestMetadata;
use crate::domain::batch::BatchFinancials;
use crate::domain::ledger::{LedgerOperation, LedgerRoute};
use crate::engine::ledger_validator::LedgerEntryValidator;
use crate::engine::session::SessionContextPropagator;
use crate::engine::totals::{AppliedOperation, BatchTotalsAccumulator};
use crate::repository::batch_repo::BatchRepository;

// ==========================================
// FinanceApi - 财务 API
// ==========================================
pub struct FinanceApi {
    validator: LedgerEntryValidator,
    accumulator: Arc<BatchTotalsAccumulator>,
    batch_repo: Arc<BatchRepository>,
    propagator: Arc<SessionContextPropagator>,
}

impl FinanceApi {
    pub fn new(
        accumulator: Arc<BatchTotalsAccumulator>,
        batch_repo: Arc<BatchRepository>,
        propagator: Arc<SessionContextPropagator>,
    ) -> Self {
        Self {
            validator: LedgerEntryValidator::new(),
            accumulator,
            batch_repo,
            propagator,
        }
    }

    /// 粗粒度累加: type = cost | revenue
    pub fn update_batch_totals(
        &self,
        op: &LedgerOperation,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
    ) -> ApiResult<AppliedOperation> {
        self.apply(op, LedgerRoute::BatchTotals, actor, metadata)
    }

    /// 分科目费用: type = acquisition | logistics | parts | labor | data_wipe | storage | other
    pub fn set_batch_expense(
        &self,
        op: &LedgerOperation,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
    ) -> ApiResult<AppliedOperation> {
        self.apply(op, LedgerRoute::ItemizedExpense, actor, metadata)
    }

    fn apply(
        &self,
        op: &LedgerOperation,
        route: LedgerRoute,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
    ) -> ApiResult<AppliedOperation> {
        let scope = self.propagator.bind(actor).with_metadata(metadata);
        let validated = self.validator.validate(op, route)?;
        Ok(self.accumulator.apply(&validated, &scope)?)
    }

    /// 批次损益汇总
    pub fn get_batch_financials(&self, batch_id: &str) -> ApiResult<BatchFinancials> {
        let batch_id = batch_id.trim();
        if batch_id.is_empty() {
            return Err(ApiError::InvalidInput("批次ID不能为空".to_string()));
        }

        let batch = self
            .batch_repo
            .find_by_id(batch_id)?
            .ok_or_else(|| ApiError::NotFound(format!("批次(id={})不存在", batch_id)))?;

        Ok(BatchFinancials::from_batch(&batch))
    }
}
