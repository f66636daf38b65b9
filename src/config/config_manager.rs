// ==========================================
// IT 资产处置 ERP - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写管理
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::ledger_config_trait::{ConfigResult, LedgerConfigReader};
use crate::db::open_sqlite_connection;
use async_trait::async_trait;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 说明：为保证连接行为一致，会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    fn get_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
            params![key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(Box::new(e)),
        }
    }

    /// 读取 global scope 的配置值（公开方法，供其他模块复用）
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        self.get_config_value(key)
    }

    /// 写入 global scope 的配置值 (UPSERT)
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, datetime('now'))
             ON CONFLICT(scope_id, key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value],
        )?;
        Ok(())
    }

    /// 获取所有 global 配置的快照
    pub fn get_config_snapshot(&self) -> ConfigResult<BTreeMap<String, String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt = conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    /// 读取并解析数值配置; 缺失或格式错误时返回默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy,
    {
        let Some(raw) = self.get_config_value(key)? else {
            return Ok(default);
        };
        match raw.trim().parse::<T>() {
            Ok(v) => Ok(v),
            Err(_) => {
                tracing::warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }
}

// ==========================================
// LedgerConfigReader Trait 实现
// ==========================================
#[async_trait]
impl LedgerConfigReader for ConfigManager {
    async fn get_outbox_max_retries(&self) -> ConfigResult<u32> {
        let v = self.get_parsed_or_default(config_keys::OUTBOX_MAX_RETRIES, 5u32)?;
        Ok(v.max(1))
    }

    async fn get_outbox_flush_interval_secs(&self) -> ConfigResult<u64> {
        let v = self.get_parsed_or_default(config_keys::OUTBOX_FLUSH_INTERVAL_SECS, 30u64)?;
        Ok(v.max(1))
    }

    async fn get_comment_min_len(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::COMMENT_MIN_LEN, 3usize)
    }

    async fn get_comment_max_len(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::COMMENT_MAX_LEN, 1000usize)
    }

    async fn get_currency_symbol(&self) -> ConfigResult<String> {
        let value = self
            .get_config_value(config_keys::CURRENCY_SYMBOL)?
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        Ok(value.unwrap_or_else(|| "Q".to_string()))
    }
}

// ==========================================
// 配置键常量
// ==========================================
pub mod config_keys {
    // 审计发件箱
    pub const OUTBOX_MAX_RETRIES: &str = "audit.outbox_max_retries";
    pub const OUTBOX_FLUSH_INTERVAL_SECS: &str = "audit.outbox_flush_interval_secs";

    // 审计评论
    pub const COMMENT_MIN_LEN: &str = "audit.comment_min_len";
    pub const COMMENT_MAX_LEN: &str = "audit.comment_max_len";

    // 展示
    pub const CURRENCY_SYMBOL: &str = "ledger.currency_symbol";
}
