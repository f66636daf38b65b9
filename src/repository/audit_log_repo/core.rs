use crate::domain::audit_log::{AuditLogEntry, RequestMetadata};
use crate::domain::types::{AuditAction, AuditEntityType, AuditModule};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, get_enum, get_json, get_json_as, get_ts};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex};

/// 查询列 (与 map_row 顺序一致)
pub(super) const SELECT_COLUMNS: &str = r#"
    id, action, module, description,
    user_id, user_name, user_email, user_role,
    entity_type, entity_id, entity_reference,
    ticket_id, batch_id, asset_id,
    data_before, data_after, changes_summary,
    ip_address, user_agent, session_id, http_method, endpoint,
    additional_data, created_at
"#;

// ==========================================
// AuditLogRepository - 审计日志仓储
// ==========================================
// 红线: Repository 不做业务逻辑,只做数据映射
pub struct AuditLogRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditLogRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 获取数据库连接
    pub(super) fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作
    // ==========================================

    /// 在给定连接/事务上插入审计日志
    pub fn insert_tx(conn: &Connection, entry: &AuditLogEntry) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO audit_logs (
                id, action, module, description,
                user_id, user_name, user_email, user_role,
                entity_type, entity_id, entity_reference,
                ticket_id, batch_id, asset_id,
                data_before, data_after, changes_summary,
                ip_address, user_agent, session_id, http_method, endpoint,
                additional_data, created_at
            ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24
            )
            "#,
            params![
                entry.id,
                entry.action.as_str(),
                entry.module.as_str(),
                entry.description,
                entry.user_id,
                entry.user_name,
                entry.user_email,
                entry.user_role,
                entry.entity_type.as_str(),
                entry.entity_id,
                entry.entity_reference,
                entry.ticket_id,
                entry.batch_id,
                entry.asset_id,
                entry.data_before.as_ref().map(|v| v.to_string()),
                entry.data_after.as_ref().map(|v| v.to_string()),
                entry
                    .changes_summary
                    .as_ref()
                    .map(serde_json::to_string)
                    .transpose()?,
                entry.metadata.ip_address,
                entry.metadata.user_agent,
                entry.metadata.session_id,
                entry.metadata.http_method,
                entry.metadata.endpoint,
                entry.additional_data.as_ref().map(|v| v.to_string()),
                format_ts(&entry.created_at),
            ],
        )?;
        Ok(())
    }

    /// 插入审计日志
    pub fn insert(&self, entry: &AuditLogEntry) -> RepositoryResult<String> {
        let conn = self.get_conn()?;
        Self::insert_tx(&conn, entry)?;
        Ok(entry.id.clone())
    }

    /// 补写 (发件箱重放): 已存在相同 id 时视为已送达
    ///
    /// # 返回
    /// - Ok(true): 新插入
    /// - Ok(false): 已存在
    pub fn insert_if_absent_tx(conn: &Connection, entry: &AuditLogEntry) -> RepositoryResult<bool> {
        match Self::insert_tx(conn, entry) {
            Ok(()) => Ok(true),
            Err(RepositoryError::UniqueConstraintViolation(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    // ==========================================
    // 行映射
    // ==========================================

    pub(super) fn map_row(row: &Row) -> rusqlite::Result<AuditLogEntry> {
        Ok(AuditLogEntry {
            id: row.get(0)?,
            action: get_enum(row, 1, AuditAction::from_str)?,
            module: get_enum(row, 2, AuditModule::from_str)?,
            description: row.get(3)?,
            user_id: row.get(4)?,
            user_name: row.get(5)?,
            user_email: row.get(6)?,
            user_role: row.get(7)?,
            entity_type: get_enum(row, 8, AuditEntityType::from_str)?,
            entity_id: row.get(9)?,
            entity_reference: row.get(10)?,
            ticket_id: row.get(11)?,
            batch_id: row.get(12)?,
            asset_id: row.get(13)?,
            data_before: get_json(row, 14)?,
            data_after: get_json(row, 15)?,
            changes_summary: get_json_as(row, 16)?,
            metadata: RequestMetadata {
                ip_address: row.get(17)?,
                user_agent: row.get(18)?,
                session_id: row.get(19)?,
                http_method: row.get(20)?,
                endpoint: row.get(21)?,
            },
            additional_data: get_json(row, 22)?,
            created_at: get_ts(row, 23)?,
        })
    }
}
