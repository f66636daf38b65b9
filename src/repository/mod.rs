// ==========================================
// IT 资产处置 ERP - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// 职责: 提供数据访问接口,屏蔽数据库细节
// 约束: 所有查询使用参数化,防止 SQL 注入
// 约定: `*_tx` 关联函数在调用方持有的连接/事务上执行
// ==========================================

pub mod audit_log_repo;
pub mod audit_outbox_repo;
pub mod batch_repo;
pub mod error;
pub mod row_utils;
pub mod unit_repo;

// 重导出核心仓储
pub use audit_log_repo::AuditLogRepository;
pub use audit_outbox_repo::{AuditOutboxRepository, OutboxRecord, OutboxStatus};
pub use batch_repo::BatchRepository;
pub use error::{RepositoryError, RepositoryResult};
pub use unit_repo::UnitRepository;
