// ==========================================
// IT 资产处置 ERP - 引擎层
// ==========================================
// 职责: 台账累加 / 价格分摊 / 审计记录与查询 / 会话上下文
// 红线: 引擎不拼业务 SQL 以外的展示逻辑; 审计失败不回滚业务变更
// ==========================================

pub mod audit_query;
pub mod audit_recorder;
pub mod distribution;
pub mod error;
pub mod intake;
pub mod ledger_validator;
pub mod session;
pub mod totals;

// 重导出核心引擎
pub use audit_query::AuditQueryService;
pub use audit_recorder::{diff_snapshots, AuditOutcome, AuditRecorder, FlushReport};
pub use distribution::{allocate_evenly, PriceDistributionEngine};
pub use error::{retry_on_conflict, LedgerError};
pub use intake::BatchIntake;
pub use ledger_validator::LedgerEntryValidator;
pub use session::{ScopedContext, SessionChannel, SessionContextPropagator, SqliteSessionChannel};
pub use totals::{AppliedOperation, BatchTotalsAccumulator};
