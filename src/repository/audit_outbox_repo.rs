// ==========================================
// IT 资产处置 ERP - 审计发件箱仓储
// ==========================================
// 职责: 审计日志写入失败时的持久化补写队列
// 对齐: audit_outbox 表
// ==========================================

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, Row};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::audit_log::AuditLogEntry;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::format_ts;

// ==========================================
// OutboxStatus - 发件箱状态
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutboxStatus {
    Pending,   // 待补写
    Delivered, // 已补写
    Failed,    // 超过最大重试次数
}

impl OutboxStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxStatus::Pending => "PENDING",
            OutboxStatus::Delivered => "DELIVERED",
            OutboxStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(OutboxStatus::Pending),
            "DELIVERED" => Some(OutboxStatus::Delivered),
            "FAILED" => Some(OutboxStatus::Failed),
            _ => None,
        }
    }
}

/// 发件箱记录
#[derive(Debug, Clone)]
pub struct OutboxRecord {
    pub entry: AuditLogEntry,
    pub status: OutboxStatus,
    pub retry_count: i64,
    pub last_error: Option<String>,
}

pub struct AuditOutboxRepository {
    conn: Arc<Mutex<Connection>>,
}

impl AuditOutboxRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    /// 入队 (同一 entry_id 只保留首次)
    pub fn enqueue_tx(
        conn: &Connection,
        entry: &AuditLogEntry,
        error: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let payload = serde_json::to_string(entry)?;
        let ts = format_ts(&now);
        conn.execute(
            r#"
            INSERT INTO audit_outbox (entry_id, payload, status, retry_count, last_error, created_at, updated_at)
            VALUES (?1, ?2, 'PENDING', 0, ?3, ?4, ?4)
            ON CONFLICT(entry_id) DO NOTHING
            "#,
            params![entry.id, payload, error, ts],
        )?;
        Ok(())
    }

    pub fn enqueue(&self, entry: &AuditLogEntry, error: &str, now: DateTime<Utc>) -> RepositoryResult<()> {
        let conn = self.get_conn()?;
        Self::enqueue_tx(&conn, entry, error, now)
    }

    /// 读取待补写记录 (先入先出)
    pub fn list_pending_tx(conn: &Connection, limit: u32) -> RepositoryResult<Vec<OutboxRecord>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT payload, status, retry_count, last_error
            FROM audit_outbox
            WHERE status = 'PENDING'
            ORDER BY created_at ASC, rowid ASC
            LIMIT ?1
            "#,
        )?;
        let records = stmt
            .query_map(params![limit], map_record)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    pub fn list_pending(&self, limit: u32) -> RepositoryResult<Vec<OutboxRecord>> {
        let conn = self.get_conn()?;
        Self::list_pending_tx(&conn, limit)
    }

    pub fn mark_delivered_tx(conn: &Connection, entry_id: &str, now: DateTime<Utc>) -> RepositoryResult<()> {
        conn.execute(
            "UPDATE audit_outbox SET status = 'DELIVERED', last_error = NULL, updated_at = ?1 WHERE entry_id = ?2",
            params![format_ts(&now), entry_id],
        )?;
        Ok(())
    }

    /// 记录一次补写失败; 达到 max_retries 后标记 FAILED
    ///
    /// # 返回
    /// - 更新后的状态
    pub fn record_failure_tx(
        conn: &Connection,
        entry_id: &str,
        error: &str,
        max_retries: u32,
        now: DateTime<Utc>,
    ) -> RepositoryResult<OutboxStatus> {
        conn.execute(
            r#"
            UPDATE audit_outbox
            SET retry_count = retry_count + 1,
                last_error = ?1,
                status = CASE WHEN retry_count + 1 >= ?2 THEN 'FAILED' ELSE 'PENDING' END,
                updated_at = ?3
            WHERE entry_id = ?4
            "#,
            params![error, max_retries, format_ts(&now), entry_id],
        )?;
        let raw: String = conn.query_row(
            "SELECT status FROM audit_outbox WHERE entry_id = ?1",
            params![entry_id],
            |row| row.get(0),
        )?;
        Ok(OutboxStatus::from_str(&raw).unwrap_or(OutboxStatus::Pending))
    }

    /// 指定状态的记录数
    pub fn count_by_status(&self, status: OutboxStatus) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM audit_outbox WHERE status = ?1",
            params![status.as_str()],
            |row| row.get(0),
        )?;
        Ok(n)
    }

    pub fn find_tx(conn: &Connection, entry_id: &str) -> RepositoryResult<Option<OutboxRecord>> {
        let mut stmt = conn.prepare(
            "SELECT payload, status, retry_count, last_error FROM audit_outbox WHERE entry_id = ?1",
        )?;
        let mut rows = stmt.query_map(params![entry_id], map_record)?;
        let record = rows.next().transpose()?;
        Ok(record)
    }

    pub fn find(&self, entry_id: &str) -> RepositoryResult<Option<OutboxRecord>> {
        let conn = self.get_conn()?;
        Self::find_tx(&conn, entry_id)
    }
}

fn map_record(row: &Row) -> rusqlite::Result<OutboxRecord> {
    let payload: String = row.get(0)?;
    let entry: AuditLogEntry = serde_json::from_str(&payload).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let status: String = row.get(1)?;
    Ok(OutboxRecord {
        entry,
        status: OutboxStatus::from_str(&status).unwrap_or(OutboxStatus::Pending),
        retry_count: row.get(2)?,
        last_error: row.get(3)?,
    })
}
