// ==========================================
// IT 资产处置 ERP - API 层
// ==========================================
// 职责: 用例编排与错误翻译,供应用层请求处理器调用
// ==========================================

pub mod audit_api;
pub mod error;
pub mod finance_api;
pub mod warehouse_api;

// 重导出核心类型
pub use audit_api::{AuditApi, CommentRequest};
pub use error::{ApiError, ApiResult};
pub use finance_api::FinanceApi;
pub use warehouse_api::WarehouseApi;
