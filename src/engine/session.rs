// ==========================================
// IT 资产处置 ERP - 会话上下文传播
// ==========================================
// 职责: 在变更执行期间绑定操作人身份,供审计记录与存储侧工具读取
// 红线: 绑定失败绝不阻断业务变更; 回退为"系统"并记录 warn
// 说明: 身份通过 ScopedContext 显式传递,不依赖线程局部状态
// ==========================================

use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::actor::ActorContext;
use crate::domain::audit_log::RequestMetadata;

// ==========================================
// SessionChannel - 身份发布通道
// ==========================================
// 将身份发布到存储侧可见的位置 (例如连接级临时表)
// scope_id 区分同时存活的作用域; clear 只清理自己发布的那一份
pub trait SessionChannel: Send + Sync {
    fn publish(&self, scope_id: &str, actor: &ActorContext) -> anyhow::Result<()>;
    fn clear(&self, scope_id: &str) -> anyhow::Result<()>;
}

// ==========================================
// SqliteSessionChannel - 连接级临时表
// ==========================================
// session_context 为 TEMP 表,只对当前连接可见
// 共享连接上多个作用域可能重叠,按 scope_id 分行存放
pub struct SqliteSessionChannel {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteSessionChannel {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    /// 最近发布且仍存活的身份 (存储侧工具/测试使用)
    pub fn current(&self) -> anyhow::Result<Option<ActorContext>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("锁获取失败: {}", e))?;
        ensure_session_table(&conn)?;

        let latest: Option<String> = conn
            .query_row(
                "SELECT scope_id FROM temp.session_context ORDER BY rowid DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        match latest {
            Some(scope_id) => read_scope(&conn, &scope_id),
            None => Ok(None),
        }
    }

    /// 指定作用域发布的身份
    pub fn current_for(&self, scope_id: &str) -> anyhow::Result<Option<ActorContext>> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("锁获取失败: {}", e))?;
        ensure_session_table(&conn)?;
        read_scope(&conn, scope_id)
    }
}

fn ensure_session_table(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TEMP TABLE IF NOT EXISTS session_context (
            scope_id TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT,
            PRIMARY KEY (scope_id, key)
        )",
    )
}

fn read_scope(conn: &Connection, scope_id: &str) -> anyhow::Result<Option<ActorContext>> {
    let mut stmt =
        conn.prepare("SELECT key, value FROM temp.session_context WHERE scope_id = ?1")?;
    let rows = stmt.query_map(params![scope_id], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
    })?;

    let mut actor: Option<ActorContext> = None;
    let mut email = None;
    let mut role = None;
    for row in rows {
        let (key, value) = row?;
        match key.as_str() {
            "user_id" => actor = value.map(ActorContext::new),
            "user_email" => email = value,
            "user_role" => role = value,
            _ => {}
        }
    }

    Ok(actor.map(|mut a| {
        a.email = email;
        a.role = role;
        a
    }))
}

impl SessionChannel for SqliteSessionChannel {
    fn publish(&self, scope_id: &str, actor: &ActorContext) -> anyhow::Result<()> {
        let mut conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("锁获取失败: {}", e))?;
        ensure_session_table(&conn).context("创建 session_context 失败")?;

        // 三个字段同时可见或同时不可见
        let tx = conn.transaction()?;
        for (key, value) in [
            ("user_id", Some(actor.user_id.as_str())),
            ("user_email", actor.email.as_deref()),
            ("user_role", actor.role.as_deref()),
        ] {
            tx.execute(
                "INSERT OR REPLACE INTO temp.session_context (scope_id, key, value) VALUES (?1, ?2, ?3)",
                params![scope_id, key, value],
            )
            .with_context(|| format!("写入会话字段 {} 失败", key))?;
        }
        tx.commit()?;
        Ok(())
    }

    fn clear(&self, scope_id: &str) -> anyhow::Result<()> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("锁获取失败: {}", e))?;
        ensure_session_table(&conn)?;
        conn.execute(
            "DELETE FROM temp.session_context WHERE scope_id = ?1",
            params![scope_id],
        )?;
        Ok(())
    }
}

// ==========================================
// ScopedContext - 作用域内的操作人身份
// ==========================================
// Drop 时清理已发布的身份
pub struct ScopedContext {
    actor: Option<ActorContext>,
    metadata: RequestMetadata,
    published: Option<(Arc<dyn SessionChannel>, String)>,
    degraded: bool,
}

impl ScopedContext {
    /// 系统身份 (无操作人)
    pub fn system() -> Self {
        Self {
            actor: None,
            metadata: RequestMetadata::default(),
            published: None,
            degraded: false,
        }
    }

    /// 附加请求元数据
    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// 替换请求元数据
    pub fn set_metadata(&mut self, metadata: RequestMetadata) {
        self.metadata = metadata;
    }

    pub fn actor(&self) -> Option<&ActorContext> {
        self.actor.as_ref()
    }

    pub fn actor_id(&self) -> &str {
        self.actor.as_ref().map(|a| a.user_id.as_str()).unwrap_or("system")
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn is_system(&self) -> bool {
        self.actor.is_none()
    }

    /// 请求了身份但绑定失败,已回退为系统
    pub fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// 存储侧发布时使用的作用域标识; 未发布时为 None
    pub fn scope_id(&self) -> Option<&str> {
        self.published.as_ref().map(|(_, id)| id.as_str())
    }
}

impl Drop for ScopedContext {
    fn drop(&mut self) {
        if let Some((channel, scope_id)) = self.published.take() {
            if let Err(e) = channel.clear(&scope_id) {
                warn!(scope_id = %scope_id, error = %e, "会话上下文清理失败");
            }
        }
    }
}

// ==========================================
// SessionContextPropagator - 会话上下文传播器
// ==========================================
pub struct SessionContextPropagator {
    channel: Option<Arc<dyn SessionChannel>>,
}

impl SessionContextPropagator {
    pub fn new(channel: Arc<dyn SessionChannel>) -> Self {
        Self {
            channel: Some(channel),
        }
    }

    /// 不发布到存储侧的传播器
    pub fn detached() -> Self {
        Self { channel: None }
    }

    /// 绑定操作人身份
    ///
    /// - None: 匿名/系统操作
    /// - 身份无效或通道不可用: 回退为系统, 仅记录 warn
    pub fn bind(&self, actor: Option<ActorContext>) -> ScopedContext {
        let Some(raw) = actor else {
            debug!("未提供操作人，按系统操作处理");
            return ScopedContext::system();
        };

        let Some(actor) = raw.normalized() else {
            warn!(user_id = %raw.user_id, "会话身份绑定失败: user_id 为空，回退为系统");
            return Self::degraded();
        };

        let published = match &self.channel {
            Some(channel) => {
                let scope_id = Uuid::new_v4().to_string();
                match channel.publish(&scope_id, &actor) {
                    Ok(()) => Some((Arc::clone(channel), scope_id)),
                    Err(e) => {
                        warn!(user_id = %actor.user_id, error = %e, "会话身份绑定失败，回退为系统");
                        return Self::degraded();
                    }
                }
            }
            None => None,
        };

        debug!(user_id = %actor.user_id, "会话身份已绑定");
        ScopedContext {
            actor: Some(actor),
            metadata: RequestMetadata::default(),
            published,
            degraded: false,
        }
    }

    fn degraded() -> ScopedContext {
        ScopedContext {
            actor: None,
            metadata: RequestMetadata::default(),
            published: None,
            degraded: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct BrokenChannel;

    impl SessionChannel for BrokenChannel {
        fn publish(&self, _scope_id: &str, _actor: &ActorContext) -> anyhow::Result<()> {
            anyhow::bail!("channel unavailable")
        }
        fn clear(&self, _scope_id: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn sqlite_channel() -> Arc<SqliteSessionChannel> {
        let conn = Connection::open_in_memory().unwrap();
        Arc::new(SqliteSessionChannel::new(Arc::new(Mutex::new(conn))))
    }

    #[test]
    fn test_bind_publishes_and_clears_on_drop() {
        let channel = sqlite_channel();
        let propagator = SessionContextPropagator::new(channel.clone());

        {
            let scope = propagator.bind(Some(ActorContext::new("u-1").with_email("A@B.GT")));
            assert_eq!(scope.actor_id(), "u-1");
            let published = channel.current().unwrap().unwrap();
            assert_eq!(published.user_id, "u-1");
            assert_eq!(published.email.as_deref(), Some("a@b.gt"));
            assert_eq!(published.role.as_deref(), Some("authenticated"));
        }

        assert!(channel.current().unwrap().is_none());
    }

    #[test]
    fn test_broken_channel_degrades_to_system() {
        let propagator = SessionContextPropagator::new(Arc::new(BrokenChannel));
        let scope = propagator.bind(Some(ActorContext::new("u-1")));
        assert!(scope.is_system());
        assert!(scope.is_degraded());
    }

    #[test]
    fn test_blank_actor_degrades_and_none_is_plain_system() {
        let propagator = SessionContextPropagator::detached();
        let scope = propagator.bind(Some(ActorContext::new("  ")));
        assert!(scope.is_system() && scope.is_degraded());

        let scope = propagator.bind(None);
        assert!(scope.is_system() && !scope.is_degraded());
        assert_eq!(scope.actor_id(), "system");
    }

    #[test]
    fn test_overlapping_scopes_keep_their_own_identity() {
        let channel = sqlite_channel();
        let propagator = SessionContextPropagator::new(channel.clone());

        let alice = propagator.bind(Some(ActorContext::new("alice")));
        let alice_scope = alice.scope_id().unwrap().to_string();
        {
            let bob = propagator.bind(Some(ActorContext::new("bob")));
            assert_ne!(bob.scope_id(), alice.scope_id());
            assert_eq!(channel.current().unwrap().unwrap().user_id, "bob");
            assert_eq!(channel.current_for(&alice_scope).unwrap().unwrap().user_id, "alice");
        }

        // bob 结束不影响仍存活的 alice
        assert_eq!(channel.current().unwrap().unwrap().user_id, "alice");
        assert_eq!(channel.current_for(&alice_scope).unwrap().unwrap().user_id, "alice");

        drop(alice);
        assert!(channel.current().unwrap().is_none());
        assert!(channel.current_for(&alice_scope).unwrap().is_none());
    }

    #[test]
    fn test_scopes_released_out_of_order() {
        let channel = sqlite_channel();
        let propagator = SessionContextPropagator::new(channel.clone());

        let first = propagator.bind(Some(ActorContext::new("u-1")));
        let second = propagator.bind(Some(ActorContext::new("u-2")));
        drop(first);
        assert_eq!(channel.current().unwrap().unwrap().user_id, "u-2");
        drop(second);
        assert!(channel.current().unwrap().is_none());
    }
}
