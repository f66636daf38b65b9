// ==========================================
// IT 资产处置 ERP - 应用状态
// ==========================================
// 职责: 管理应用级别的共享状态和API实例
// ==========================================

use rusqlite::Connection;
use std::sync::{Arc, Mutex};

use crate::api::{AuditApi, FinanceApi, WarehouseApi};
use crate::config::config_manager::ConfigManager;
use crate::config::ledger_config_trait::LedgerConfigReader;
use crate::db::{ensure_schema, open_sqlite_connection};
use crate::engine::{
    AuditQueryService, AuditRecorder, BatchIntake, BatchTotalsAccumulator,
    PriceDistributionEngine, SessionContextPropagator, SqliteSessionChannel,
};
use crate::repository::{batch_repo::BatchRepository, unit_repo::UnitRepository};

/// 应用状态
///
/// 包含所有API实例和共享资源; 全部组件共用同一个连接
pub struct AppState {
    /// 数据库路径
    pub db_path: String,

    /// 共享连接
    pub conn: Arc<Mutex<Connection>>,

    /// 配置管理器
    pub config: Arc<ConfigManager>,

    /// 财务API
    pub finance_api: Arc<FinanceApi>,

    /// 仓库API
    pub warehouse_api: Arc<WarehouseApi>,

    /// 审计API
    pub audit_api: Arc<AuditApi>,

    /// 审计记录器（后台补写任务使用）
    pub audit_recorder: Arc<AuditRecorder>,
}

impl AppState {
    /// 创建新的AppState实例
    ///
    /// # 说明
    /// 1. 打开数据库并建表 (幂等)
    /// 2. 初始化 Repository / Engine
    /// 3. 创建 API 实例
    pub fn new(db_path: String) -> Result<Self, String> {
        tracing::info!(db_path = %db_path, "初始化AppState");

        let conn = open_sqlite_connection(&db_path).map_err(|e| format!("无法打开数据库: {}", e))?;
        ensure_schema(&conn).map_err(|e| format!("数据库建表失败: {}", e))?;

        Self::from_connection(db_path, Arc::new(Mutex::new(conn)))
    }

    /// 基于已初始化 schema 的连接组装
    pub fn from_connection(db_path: String, conn: Arc<Mutex<Connection>>) -> Result<Self, String> {
        // ==========================================
        // 初始化Repository层
        // ==========================================
        let batch_repo = Arc::new(BatchRepository::new(conn.clone()));
        let unit_repo = Arc::new(UnitRepository::new(conn.clone()));

        let config = Arc::new(
            ConfigManager::from_connection(conn.clone())
                .map_err(|e| format!("无法创建ConfigManager: {}", e))?,
        );

        // ==========================================
        // 初始化Engine层
        // ==========================================
        let propagator = Arc::new(SessionContextPropagator::new(Arc::new(
            SqliteSessionChannel::new(conn.clone()),
        )));
        let audit_recorder = Arc::new(AuditRecorder::new(conn.clone()));
        let accumulator = Arc::new(BatchTotalsAccumulator::new(conn.clone(), audit_recorder.clone()));
        let distribution = Arc::new(PriceDistributionEngine::new(conn.clone(), audit_recorder.clone()));
        let intake = Arc::new(BatchIntake::new(conn.clone(), audit_recorder.clone()));
        let audit_query = Arc::new(AuditQueryService::new(conn.clone()));

        // ==========================================
        // 初始化API层
        // ==========================================
        let finance_api = Arc::new(FinanceApi::new(accumulator, batch_repo.clone(), propagator.clone()));
        let warehouse_api = Arc::new(WarehouseApi::new(distribution, intake, propagator.clone()));
        let audit_api = Arc::new(AuditApi::new(
            audit_query,
            audit_recorder.clone(),
            batch_repo,
            unit_repo,
            propagator,
            config.clone() as Arc<dyn LedgerConfigReader>,
        ));

        tracing::info!("AppState初始化完成");

        Ok(Self {
            db_path,
            conn,
            config,
            finance_api,
            warehouse_api,
            audit_api,
            audit_recorder,
        })
    }

    /// 获取数据库路径
    pub fn get_db_path(&self) -> &str {
        &self.db_path
    }
}

// ==========================================
// 默认数据库路径辅助函数
// ==========================================

/// 获取默认数据库路径
///
/// # 返回
/// - 环境变量 ITAD_LEDGER_DB_PATH (非空时)
/// - 否则: 用户数据目录/itad-ledger/itad_ledger.db
pub fn get_default_db_path() -> String {
    use std::path::PathBuf;

    if let Ok(path) = std::env::var("ITAD_LEDGER_DB_PATH") {
        let trimmed = path.trim();
        if !trimmed.is_empty() {
            return trimmed.to_string();
        }
    }

    let mut path = PathBuf::from("./itad_ledger.db");
    if let Some(data_dir) = dirs::data_dir() {
        let dir = data_dir.join("itad-ledger");
        // 目录创建失败时回退到当前目录
        if std::fs::create_dir_all(&dir).is_ok() {
            path = dir.join("itad_ledger.db");
        }
    }

    path.to_string_lossy().to_string()
}
