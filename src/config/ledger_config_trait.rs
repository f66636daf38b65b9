// ==========================================
// IT 资产处置 ERP - 台账/审计配置读取 Trait
// ==========================================
// 职责: 定义台账与审计模块所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// LedgerConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait LedgerConfigReader: Send + Sync {
    // ===== 审计发件箱 =====

    /// 发件箱单条记录的最大补写次数
    ///
    /// # 默认值
    /// - 5
    async fn get_outbox_max_retries(&self) -> ConfigResult<u32>;

    /// 后台补写间隔（秒）
    ///
    /// # 默认值
    /// - 30
    async fn get_outbox_flush_interval_secs(&self) -> ConfigResult<u64>;

    // ===== 审计评论 =====

    /// 评论最小长度（去除首尾空白后, 按字符计）
    ///
    /// # 默认值
    /// - 3
    async fn get_comment_min_len(&self) -> ConfigResult<usize>;

    /// 评论最大长度
    ///
    /// # 默认值
    /// - 1000
    async fn get_comment_max_len(&self) -> ConfigResult<usize>;

    // ===== 展示 =====

    /// 货币符号（用于分摊结果提示）
    ///
    /// # 默认值
    /// - "Q"
    async fn get_currency_symbol(&self) -> ConfigResult<String>;
}
