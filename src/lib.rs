// ==========================================
// IT 资产处置 ERP - 核心库
// ==========================================
// 职责: 批次财务台账 (累加/分摊) 与审计追踪
// 技术栈: Rust + SQLite + tokio
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 业务规则
pub mod engine;

// 配置层 - 系统配置
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA/建表）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// 应用层 - 状态组装与请求处理器
pub mod app;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{AuditAction, AuditEntityType, AuditModule, CostKind, LedgerKind};

// 领域实体
pub use domain::{
    ActorContext, AuditLogEntry, Batch, BatchFinancials, LedgerOperation, Money,
    PriceDistributionRequest, RequestMetadata, Unit,
};

// 引擎
pub use engine::{
    AuditQueryService, AuditRecorder, BatchTotalsAccumulator, LedgerEntryValidator, LedgerError,
    PriceDistributionEngine, ScopedContext, SessionContextPropagator,
};

// API
pub use api::{ApiError, AuditApi, CommentRequest, FinanceApi, WarehouseApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "IT 资产处置 ERP - 财务台账与审计";
