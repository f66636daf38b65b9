use super::core::{AuditLogRepository, SELECT_COLUMNS};
use crate::domain::audit_log::{AuditLogEntry, AuditSearchFilter};
use crate::domain::types::AuditEntityType;
use crate::repository::error::RepositoryResult;
use crate::repository::row_utils::format_ts;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, OptionalExtension, Result as SqliteResult};

impl AuditLogRepository {
    // ==========================================
    // 查询操作
    // ==========================================

    /// 按 id 查询单条审计日志
    pub fn find_by_id(&self, id: &str) -> RepositoryResult<Option<AuditLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!("SELECT {} FROM audit_logs WHERE id = ?1", SELECT_COLUMNS);
        let entry = conn
            .query_row(&sql, params![id], Self::map_row)
            .optional()?;
        Ok(entry)
    }

    /// 查询指定实体的全部审计日志 (新 -> 旧)
    ///
    /// 同一时间戳按插入顺序倒序
    pub fn list_for_entity(
        &self,
        entity_type: AuditEntityType,
        entity_id: &str,
    ) -> RepositoryResult<Vec<AuditLogEntry>> {
        let conn = self.get_conn()?;
        let sql = format!(
            "SELECT {} FROM audit_logs WHERE entity_type = ?1 AND entity_id = ?2 \
             ORDER BY created_at DESC, rowid DESC",
            SELECT_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params![entity_type.as_str(), entity_id], Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;
        Ok(logs)
    }

    /// 条件检索 + 分页
    ///
    /// # 返回
    /// - (当前页日志, 总条数)
    pub fn search(
        &self,
        filter: &AuditSearchFilter,
        offset: u32,
        limit: u32,
    ) -> RepositoryResult<(Vec<AuditLogEntry>, i64)> {
        let (where_clause, mut values) = build_where(filter);
        let conn = self.get_conn()?;

        let count_sql = format!("SELECT COUNT(*) FROM audit_logs{}", where_clause);
        let total: i64 = conn.query_row(&count_sql, params_from_iter(values.iter()), |row| row.get(0))?;

        let sql = format!(
            "SELECT {} FROM audit_logs{} ORDER BY created_at DESC, rowid DESC LIMIT ? OFFSET ?",
            SELECT_COLUMNS, where_clause
        );
        values.push(SqlValue::Integer(limit as i64));
        values.push(SqlValue::Integer(offset as i64));

        let mut stmt = conn.prepare(&sql)?;
        let logs = stmt
            .query_map(params_from_iter(values.iter()), Self::map_row)?
            .collect::<SqliteResult<Vec<_>>>()?;

        Ok((logs, total))
    }

    /// 审计日志总数
    pub fn count(&self) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let total: i64 = conn.query_row("SELECT COUNT(*) FROM audit_logs", [], |row| row.get(0))?;
        Ok(total)
    }
}

/// 构造 WHERE 子句与参数 (全部参数化)
fn build_where(filter: &AuditSearchFilter) -> (String, Vec<SqlValue>) {
    let mut clauses: Vec<&'static str> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();

    if let Some(entity_type) = filter.entity_type {
        clauses.push("entity_type = ?");
        values.push(SqlValue::Text(entity_type.as_str().to_string()));
    }
    if let Some(entity_id) = &filter.entity_id {
        clauses.push("entity_id = ?");
        values.push(SqlValue::Text(entity_id.clone()));
    }
    if let Some(module) = filter.module {
        clauses.push("module = ?");
        values.push(SqlValue::Text(module.as_str().to_string()));
    }
    if let Some(action) = filter.action {
        clauses.push("action = ?");
        values.push(SqlValue::Text(action.as_str().to_string()));
    }
    if let Some(user_id) = &filter.user_id {
        clauses.push("user_id = ?");
        values.push(SqlValue::Text(user_id.clone()));
    }
    if let Some(from) = &filter.from {
        clauses.push("created_at >= ?");
        values.push(SqlValue::Text(format_ts(from)));
    }
    if let Some(to) = &filter.to {
        clauses.push("created_at <= ?");
        values.push(SqlValue::Text(format_ts(to)));
    }
    if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        clauses.push("(instr(lower(COALESCE(entity_reference, '')), ?) > 0 OR instr(lower(description), ?) > 0)");
        let needle = search.to_lowercase();
        values.push(SqlValue::Text(needle.clone()));
        values.push(SqlValue::Text(needle));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", clauses.join(" AND ")), values)
    }
}
