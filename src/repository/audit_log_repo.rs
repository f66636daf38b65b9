// ==========================================
// IT 资产处置 ERP - 审计日志数据仓储
// ==========================================
// 对齐: audit_logs 表
// 红线: 只提供插入与查询,不提供更新/删除
// ==========================================

mod core;
mod queries;


pub use core::AuditLogRepository;
