// ==========================================
// IT 资产处置 ERP - 审计记录器
// ==========================================
// 职责: 构造并持久化审计日志 (唯一的审计写入路径)
// 红线: 只追加; 审计写入失败不回滚业务变更
// 降级: 事务内插入失败 -> 同事务写发件箱 -> 仍失败则进入内存待补写队列
// ==========================================

use chrono::Utc;
use rusqlite::{Connection, TransactionBehavior};
use serde::Serialize;
use serde_json::Value as JsonValue;
use std::collections::{BTreeSet, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::domain::audit_log::{AuditDraft, AuditLogEntry, ChangesSummary, FieldChange};
use crate::engine::error::LedgerError;
use crate::engine::session::ScopedContext;
use crate::repository::audit_log_repo::AuditLogRepository;
use crate::repository::audit_outbox_repo::{AuditOutboxRepository, OutboxStatus};
use crate::repository::error::RepositoryError;

/// 变更摘要忽略的字段
const IGNORED_FIELDS: [&str; 2] = ["created_at", "updated_at"];

/// 单次补写处理的发件箱记录上限
const FLUSH_BATCH_LIMIT: u32 = 500;

// ==========================================
// AuditOutcome - 审计写入结果
// ==========================================
#[derive(Debug, Clone)]
pub enum AuditOutcome {
    /// 已写入 audit_logs
    Recorded(AuditLogEntry),
    /// 写入失败, 已延后补写 (durable = 已进入发件箱表)
    Deferred { entry: AuditLogEntry, durable: bool },
}

impl AuditOutcome {
    pub fn entry(&self) -> &AuditLogEntry {
        match self {
            AuditOutcome::Recorded(entry) => entry,
            AuditOutcome::Deferred { entry, .. } => entry,
        }
    }

    pub fn is_recorded(&self) -> bool {
        matches!(self, AuditOutcome::Recorded(_))
    }
}

/// 补写统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FlushReport {
    pub delivered: usize,
    pub retried: usize,
    pub failed: usize,
    pub memory_pending: usize,
}

/// 按字段对比前后快照
///
/// - 两侧都缺失: None
/// - 一侧缺失: 另一侧所有字段都视为变更
/// - created_at / updated_at 不参与对比
pub fn diff_snapshots(before: Option<&JsonValue>, after: Option<&JsonValue>) -> Option<ChangesSummary> {
    if before.is_none() && after.is_none() {
        return None;
    }

    let empty = serde_json::Map::new();
    let as_object = |v: Option<&JsonValue>| match v {
        Some(JsonValue::Object(map)) => map.clone(),
        Some(other) => {
            let mut map = serde_json::Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
        None => empty.clone(),
    };
    let before_map = as_object(before);
    let after_map = as_object(after);

    let keys: BTreeSet<&String> = before_map.keys().chain(after_map.keys()).collect();
    let mut changes = ChangesSummary::new();
    for key in keys {
        if IGNORED_FIELDS.contains(&key.as_str()) {
            continue;
        }
        let old = before_map.get(key).cloned().unwrap_or(JsonValue::Null);
        let new = after_map.get(key).cloned().unwrap_or(JsonValue::Null);
        if old != new {
            changes.insert(key.clone(), FieldChange { old, new });
        }
    }
    Some(changes)
}

// ==========================================
// AuditRecorder - 审计记录器
// ==========================================
pub struct AuditRecorder {
    conn: Arc<Mutex<Connection>>,
    pending: Mutex<VecDeque<AuditLogEntry>>,
}

impl AuditRecorder {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            conn,
            pending: Mutex::new(VecDeque::new()),
        }
    }

    /// 补全审计日志: id / 操作人 / 变更摘要 / 服务端时间戳
    pub fn build_entry(&self, draft: AuditDraft, scope: &ScopedContext) -> AuditLogEntry {
        let changes = diff_snapshots(draft.data_before.as_ref(), draft.data_after.as_ref());
        let mut draft = draft;
        if draft.metadata.is_empty() {
            draft.metadata = scope.metadata().clone();
        }
        draft.into_entry(Uuid::new_v4().to_string(), scope.actor(), changes, Utc::now())
    }

    /// 在业务事务内写入审计日志
    ///
    /// 永不返回错误: 失败时降级到发件箱 / 内存队列。
    /// 调用方提交事务后必须调用 [`AuditRecorder::settle`]。
    pub fn record_tx(&self, conn: &Connection, draft: AuditDraft, scope: &ScopedContext) -> AuditOutcome {
        let entry = self.build_entry(draft, scope);

        match AuditLogRepository::insert_tx(conn, &entry) {
            Ok(()) => AuditOutcome::Recorded(entry),
            Err(insert_err) => {
                warn!(
                    audit_id = %entry.id,
                    entity_id = %entry.entity_id,
                    actor_id = scope.actor_id(),
                    error = %insert_err,
                    "审计日志写入失败，转入发件箱"
                );
                let durable = match AuditOutboxRepository::enqueue_tx(conn, &entry, &insert_err.to_string(), Utc::now()) {
                    Ok(()) => true,
                    Err(outbox_err) => {
                        error!(
                            audit_id = %entry.id,
                            entity_id = %entry.entity_id,
                            error = %outbox_err,
                            "审计发件箱写入失败，转入内存待补写队列"
                        );
                        false
                    }
                };
                AuditOutcome::Deferred { entry, durable }
            }
        }
    }

    /// 业务事务提交后的收尾: 非持久化的延后记录进入内存队列
    pub fn settle(&self, outcome: AuditOutcome) -> AuditOutcome {
        if let AuditOutcome::Deferred { entry, durable: false } = &outcome {
            match self.pending.lock() {
                Ok(mut queue) => queue.push_back(entry.clone()),
                Err(e) => error!(audit_id = %entry.id, error = %e, "待补写队列锁获取失败，审计日志丢失"),
            }
        }
        outcome
    }

    /// 独立写入 (无业务事务)
    pub fn record(&self, draft: AuditDraft, scope: &ScopedContext) -> Result<AuditOutcome, LedgerError> {
        let outcome = {
            let conn = self
                .conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            self.record_tx(&conn, draft, scope)
        };
        Ok(self.settle(outcome))
    }

    /// 内存待补写数量
    pub fn pending_in_memory(&self) -> usize {
        self.pending.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// 补写延后的审计日志
    ///
    /// 1. 内存队列: 直接补写, 失败则尝试转入发件箱
    /// 2. 发件箱: 逐条补写; 失败累计重试次数, 超过 max_retries 标记 FAILED
    ///
    /// 已存在相同 id 的记录视为已送达; 原始 id 与时间戳保持不变。
    pub fn flush_outbox(&self, max_retries: u32) -> Result<FlushReport, LedgerError> {
        let mut report = FlushReport::default();
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))?;

        // ===== 内存队列 =====
        let drained: Vec<AuditLogEntry> = match self.pending.lock() {
            Ok(mut queue) => queue.drain(..).collect(),
            Err(e) => {
                error!(error = %e, "待补写队列锁获取失败");
                Vec::new()
            }
        };
        let mut still_pending = Vec::new();
        for entry in drained {
            match AuditLogRepository::insert_if_absent_tx(&conn, &entry) {
                Ok(_) => report.delivered += 1,
                Err(e) => {
                    let reason = e.to_string();
                    if AuditOutboxRepository::enqueue_tx(&conn, &entry, &reason, Utc::now()).is_err() {
                        still_pending.push(entry);
                    }
                }
            }
        }
        if !still_pending.is_empty() {
            if let Ok(mut queue) = self.pending.lock() {
                queue.extend(still_pending);
            }
        }

        // ===== 发件箱 =====
        let records = AuditOutboxRepository::list_pending_tx(&conn, FLUSH_BATCH_LIMIT)?;
        for record in records {
            let entry_id = record.entry.id.clone();
            let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
            match AuditLogRepository::insert_if_absent_tx(&tx, &record.entry) {
                Ok(_) => {
                    AuditOutboxRepository::mark_delivered_tx(&tx, &entry_id, Utc::now())?;
                    tx.commit()?;
                    report.delivered += 1;
                }
                Err(e) => {
                    let status = AuditOutboxRepository::record_failure_tx(
                        &tx,
                        &entry_id,
                        &e.to_string(),
                        max_retries,
                        Utc::now(),
                    )?;
                    tx.commit()?;
                    if status == OutboxStatus::Failed {
                        error!(audit_id = %entry_id, error = %e, "审计日志补写失败次数超限，标记 FAILED");
                        report.failed += 1;
                    } else {
                        report.retried += 1;
                    }
                }
            }
        }

        report.memory_pending = self.pending_in_memory();
        if report.delivered > 0 || report.failed > 0 {
            info!(
                delivered = report.delivered,
                retried = report.retried,
                failed = report.failed,
                memory_pending = report.memory_pending,
                "审计发件箱补写完成"
            );
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::actor::ActorContext;
    use crate::domain::types::{AuditAction, AuditEntityType, AuditModule};
    use crate::engine::session::SessionContextPropagator;
    use serde_json::json;

    fn setup_recorder() -> (Arc<Mutex<Connection>>, AuditRecorder) {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        let conn = Arc::new(Mutex::new(conn));
        (conn.clone(), AuditRecorder::new(conn))
    }

    fn draft() -> AuditDraft {
        AuditDraft::new(AuditAction::Update, AuditModule::Finance, AuditEntityType::Batch, "B1", "x")
            .with_before(json!({"total_cost": 0.0, "revenue_total": 5.0, "updated_at": "a"}))
            .with_after(json!({"total_cost": 100.0, "revenue_total": 5.0, "updated_at": "b"}))
    }

    #[test]
    fn test_diff_only_changed_fields() {
        let changes = diff_snapshots(
            Some(&json!({"a": 1, "b": 2, "created_at": "x"})),
            Some(&json!({"a": 1, "b": 3, "c": true, "created_at": "y"})),
        )
        .unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes["b"], FieldChange { old: json!(2), new: json!(3) });
        assert_eq!(changes["c"], FieldChange { old: JsonValue::Null, new: json!(true) });

        let created = diff_snapshots(None, Some(&json!({"a": 1}))).unwrap();
        assert_eq!(created["a"].old, JsonValue::Null);
        assert!(diff_snapshots(None, None).is_none());
    }

    #[test]
    fn test_record_stamps_actor_and_changes() {
        let (_conn, recorder) = setup_recorder();
        let scope = SessionContextPropagator::detached()
            .bind(Some(ActorContext::new("u-9").with_email("Fin@ITAD.gt").with_role("finance")));

        let outcome = recorder.record(draft(), &scope).unwrap();
        assert!(outcome.is_recorded());
        let entry = outcome.entry();
        assert_eq!(entry.user_id.as_deref(), Some("u-9"));
        assert_eq!(entry.user_email.as_deref(), Some("fin@itad.gt"));
        let changes = entry.changes_summary.as_ref().unwrap();
        assert_eq!(changes.keys().collect::<Vec<_>>(), vec!["total_cost"]);
    }

    #[test]
    fn test_failed_insert_goes_to_outbox_then_replays() {
        let (conn, recorder) = setup_recorder();
        let scope = ScopedContext::system();

        conn.lock().unwrap().execute_batch("DROP TABLE audit_logs").unwrap();
        let outcome = recorder.record(draft(), &scope).unwrap();
        let original = outcome.entry().clone();
        assert!(matches!(outcome, AuditOutcome::Deferred { durable: true, .. }));

        {
            let guard = conn.lock().unwrap();
            crate::db::ensure_schema(&guard).unwrap();
        }
        let report = recorder.flush_outbox(5).unwrap();
        assert_eq!(report.delivered, 1);

        let repo = AuditLogRepository::new(conn.clone());
        let replayed = repo.find_by_id(&original.id).unwrap().unwrap();
        assert_eq!(replayed.created_at, original.created_at);
        assert!(replayed.is_system());

        // 再次补写不重复
        let report = recorder.flush_outbox(5).unwrap();
        assert_eq!(report.delivered, 0);
        assert_eq!(repo.count().unwrap(), 1);
    }

    #[test]
    fn test_outbox_marks_failed_after_max_retries() {
        let (conn, recorder) = setup_recorder();
        conn.lock().unwrap().execute_batch("DROP TABLE audit_logs").unwrap();
        let outcome = recorder.record(draft(), &ScopedContext::system()).unwrap();

        let first = recorder.flush_outbox(2).unwrap();
        assert_eq!(first.retried, 1);
        let second = recorder.flush_outbox(2).unwrap();
        assert_eq!(second.failed, 1);

        let outbox = AuditOutboxRepository::new(conn.clone());
        let record = outbox.find(&outcome.entry().id).unwrap().unwrap();
        assert_eq!(record.status, OutboxStatus::Failed);
        assert_eq!(record.retry_count, 2);
    }

    #[test]
    fn test_in_memory_queue_when_outbox_unavailable() {
        let (conn, recorder) = setup_recorder();
        conn.lock()
            .unwrap()
            .execute_batch("DROP TABLE audit_logs; DROP TABLE audit_outbox;")
            .unwrap();

        let outcome = recorder.record(draft(), &ScopedContext::system()).unwrap();
        assert!(matches!(outcome, AuditOutcome::Deferred { durable: false, .. }));
        assert_eq!(recorder.pending_in_memory(), 1);

        {
            let guard = conn.lock().unwrap();
            crate::db::ensure_schema(&guard).unwrap();
        }
        let report = recorder.flush_outbox(5).unwrap();
        assert_eq!(report.delivered, 1);
        assert_eq!(report.memory_pending, 0);
        assert_eq!(AuditLogRepository::new(conn).count().unwrap(), 1);
    }
}
