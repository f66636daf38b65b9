// ==========================================
// IT 资产处置 ERP - 审计查询服务
// ==========================================
// 职责: 只读查询审计日志 (实体历史 / 条件检索 / 单条)
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};
use tracing::debug;

use crate::domain::audit_log::{AuditLogEntry, AuditPage, AuditSearchFilter};
use crate::domain::types::{canonical_entity_type, AuditEntityType};
use crate::engine::error::LedgerError;
use crate::repository::audit_log_repo::AuditLogRepository;

/// 默认每页条数
pub const DEFAULT_PAGE_LIMIT: u32 = 50;
/// 每页条数上限
pub const MAX_PAGE_LIMIT: u32 = 200;

pub struct AuditQueryService {
    repo: AuditLogRepository,
}

impl AuditQueryService {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            repo: AuditLogRepository::new(conn),
        }
    }

    /// 实体审计历史 (新 -> 旧)
    ///
    /// entity_type 仅做规范化 ("batch" -> "BATCH"); 未知类型没有任何记录, 返回空列表
    pub fn list_for(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditLogEntry>, LedgerError> {
        let Some(kind) = AuditEntityType::from_str(entity_type) else {
            debug!(entity_type = %canonical_entity_type(entity_type), "未知实体类型，返回空历史");
            return Ok(Vec::new());
        };
        Ok(self.repo.list_for_entity(kind, entity_id.trim())?)
    }

    /// 条件检索
    ///
    /// page 从 1 开始; limit 缺省 50, 限制在 1..=200
    pub fn search(
        &self,
        filter: &AuditSearchFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> Result<AuditPage, LedgerError> {
        let page = page.unwrap_or(1).max(1);
        let limit = limit.unwrap_or(DEFAULT_PAGE_LIMIT).clamp(1, MAX_PAGE_LIMIT);
        let offset = (page - 1).saturating_mul(limit);

        let (logs, total) = self.repo.search(filter, offset, limit)?;
        let total_pages = ((total.max(0) as u64 + limit as u64 - 1) / limit as u64) as u32;

        Ok(AuditPage {
            logs,
            total,
            page,
            limit,
            total_pages,
        })
    }

    pub fn find_by_id(&self, id: &str) -> Result<AuditLogEntry, LedgerError> {
        self.repo.find_by_id(id)?.ok_or_else(|| LedgerError::NotFound {
            entity: "AuditLog".to_string(),
            id: id.to_string(),
        })
    }
}
