// ==========================================
// IT 资产处置 ERP - 仓库 API
// ==========================================
// 职责: 批次/设备登记、批次售价分摊
// ==========================================

use std::sync::Arc;

use crate::api::error::ApiResult;
use crate::domain::actor::ActorContext;
use crate::domain::audit_log::RequestMetadata;
use crate::domain::batch::{Batch, Unit};
use crate::domain::ledger::{DistributionOutcome, PriceDistributionRequest};
use crate::engine::distribution::PriceDistributionEngine;
use crate::engine::intake::BatchIntake;
use crate::engine::ledger_validator::LedgerEntryValidator;
use crate::engine::session::SessionContextPropagator;

pub struct WarehouseApi {
    validator: LedgerEntryValidator,
    distribution: Arc<PriceDistributionEngine>,
    intake: Arc<BatchIntake>,
    propagator: Arc<SessionContextPropagator>,
}

impl WarehouseApi {
    pub fn new(
        distribution: Arc<PriceDistributionEngine>,
        intake: Arc<BatchIntake>,
        propagator: Arc<SessionContextPropagator>,
    ) -> Self {
        Self {
            validator: LedgerEntryValidator::new(),
            distribution,
            intake,
            propagator,
        }
    }

    /// 批次售价分摊 (覆盖设备单价)
    pub fn set_batch_price(
        &self,
        req: &PriceDistributionRequest,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
    ) -> ApiResult<DistributionOutcome> {
        let scope = self.propagator.bind(actor).with_metadata(metadata);
        let validated = self.validator.validate_distribution(req)?;
        Ok(self.distribution.distribute(&validated, &scope)?)
    }

    pub fn register_batch(
        &self,
        batch: Batch,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
    ) -> ApiResult<Batch> {
        let scope = self.propagator.bind(actor).with_metadata(metadata);
        Ok(self.intake.register_batch(batch, &scope)?)
    }

    pub fn register_unit(
        &self,
        unit: Unit,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
    ) -> ApiResult<Unit> {
        let scope = self.propagator.bind(actor).with_metadata(metadata);
        Ok(self.intake.register_unit(unit, &scope)?)
    }
}
