// ==========================================
// IT 资产处置 ERP - 领域模型层
// ==========================================
// 职责: 定义领域实体、封闭枚举、金额值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod actor;
pub mod audit_log;
pub mod batch;
pub mod ledger;
pub mod money;
pub mod types;

// 重导出核心类型
pub use actor::ActorContext;
pub use audit_log::{
    AuditDraft, AuditLogEntry, AuditPage, AuditSearchFilter, ChangesSummary, FieldChange,
    RequestMetadata,
};
pub use batch::{Batch, BatchFinancials, Unit};
pub use ledger::{
    DistributionOutcome, LedgerOperation, LedgerRoute, PriceDistributionRequest,
    ValidatedDistribution, ValidatedOperation,
};
pub use money::Money;
pub use types::{AuditAction, AuditEntityType, AuditModule, CostKind, LedgerKind};
