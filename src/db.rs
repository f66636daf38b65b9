// ==========================================
// IT 资产处置 ERP - SQLite 连接初始化与建库
// ==========================================
// 目标:
// - 统一所有 Connection::open 的 PRAGMA 行为 (外键/busy_timeout)
// - 幂等建库: 批次、设备、审计日志、审计发件箱、配置表
// - 审计日志表由触发器强制只追加
// ==========================================

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use std::time::Duration;

/// 默认 busy_timeout（毫秒）
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

/// 当前代码所期望的 schema_version
pub const CURRENT_SCHEMA_VERSION: i64 = 1;

/// 配置 SQLite 连接的统一 PRAGMA
///
/// 说明：
/// - foreign_keys 需要“每个连接”单独开启
/// - busy_timeout 需要“每个连接”单独配置
pub fn configure_sqlite_connection(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    conn.busy_timeout(Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

/// 打开 SQLite 连接并应用统一配置
pub fn open_sqlite_connection(db_path: &str) -> rusqlite::Result<Connection> {
    let conn = Connection::open(db_path)?;
    configure_sqlite_connection(&conn)?;
    // 内存库忽略 WAL
    conn.query_row("PRAGMA journal_mode = WAL", [], |_row| Ok(()))?;
    Ok(conn)
}

/// 读取 schema_version（若表不存在则返回 None）
pub fn read_schema_version(conn: &Connection) -> rusqlite::Result<Option<i64>> {
    let has_table: bool = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version' LIMIT 1",
            [],
            |_row| Ok(true),
        )
        .optional()?
        .unwrap_or(false);

    if !has_table {
        return Ok(None);
    }

    let v: Option<i64> = conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| row.get(0))?;
    Ok(v)
}

/// 幂等建库
///
/// 金额列统一为 INTEGER (分)。
pub fn ensure_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    ensure_audit_log_guards(conn)?;

    let version = read_schema_version(conn)?;
    if version.unwrap_or(0) < CURRENT_SCHEMA_VERSION {
        conn.execute(
            "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, datetime('now'))",
            [CURRENT_SCHEMA_VERSION],
        )?;
    }
    Ok(())
}

/// 审计日志只追加: 禁止 UPDATE / DELETE
///
/// 单独暴露,便于重建 audit_logs 后重新安装。
pub fn ensure_audit_log_guards(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
        CREATE TRIGGER IF NOT EXISTS trg_audit_logs_no_update
        BEFORE UPDATE ON audit_logs
        BEGIN
            SELECT RAISE(ABORT, 'audit_logs is append-only');
        END;

        CREATE TRIGGER IF NOT EXISTS trg_audit_logs_no_delete
        BEFORE DELETE ON audit_logs
        BEGIN
            SELECT RAISE(ABORT, 'audit_logs is append-only');
        END;
        "#,
    )
}

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version    INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS config_kv (
    scope_id   TEXT NOT NULL DEFAULT 'global',
    key        TEXT NOT NULL,
    value      TEXT NOT NULL,
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    PRIMARY KEY (scope_id, key)
);

CREATE TABLE IF NOT EXISTS batches (
    batch_id        TEXT PRIMARY KEY,
    warehouse_code  TEXT NOT NULL,
    ticket_id       TEXT,
    batch_reference TEXT,
    unit_count      INTEGER NOT NULL DEFAULT 0 CHECK (unit_count >= 0),
    revenue_total   INTEGER NOT NULL DEFAULT 0 CHECK (revenue_total >= 0),
    unit_sale_price INTEGER CHECK (unit_sale_price IS NULL OR unit_sale_price >= 0),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS batch_cost_totals (
    batch_id   TEXT NOT NULL REFERENCES batches(batch_id),
    cost_kind  TEXT NOT NULL,
    amount     INTEGER NOT NULL DEFAULT 0 CHECK (amount >= 0),
    updated_at TEXT NOT NULL,
    PRIMARY KEY (batch_id, cost_kind)
);

CREATE TABLE IF NOT EXISTS units (
    unit_id        TEXT PRIMARY KEY,
    batch_id       TEXT NOT NULL REFERENCES batches(batch_id),
    warehouse_code TEXT NOT NULL,
    serial_number  TEXT,
    sale_price     INTEGER CHECK (sale_price IS NULL OR sale_price >= 0),
    created_at     TEXT NOT NULL,
    updated_at     TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_units_batch ON units(batch_id, warehouse_code);

CREATE TABLE IF NOT EXISTS audit_logs (
    id               TEXT PRIMARY KEY,
    action           TEXT NOT NULL,
    module           TEXT NOT NULL,
    description      TEXT NOT NULL,
    user_id          TEXT,
    user_name        TEXT,
    user_email       TEXT,
    user_role        TEXT,
    entity_type      TEXT NOT NULL,
    entity_id        TEXT NOT NULL,
    entity_reference TEXT,
    ticket_id        TEXT,
    batch_id         TEXT,
    asset_id         TEXT,
    data_before      TEXT,
    data_after       TEXT,
    changes_summary  TEXT,
    ip_address       TEXT,
    user_agent       TEXT,
    session_id       TEXT,
    http_method      TEXT,
    endpoint         TEXT,
    additional_data  TEXT,
    created_at       TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_logs_entity ON audit_logs(entity_type, entity_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_audit_logs_created ON audit_logs(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_audit_logs_module ON audit_logs(module, action);
CREATE INDEX IF NOT EXISTS idx_audit_logs_user ON audit_logs(user_id);

CREATE TABLE IF NOT EXISTS audit_outbox (
    entry_id    TEXT PRIMARY KEY,
    payload     TEXT NOT NULL,
    status      TEXT NOT NULL DEFAULT 'PENDING',
    retry_count INTEGER NOT NULL DEFAULT 0,
    last_error  TEXT,
    created_at  TEXT NOT NULL,
    updated_at  TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_audit_outbox_status ON audit_outbox(status, created_at);
"#;
