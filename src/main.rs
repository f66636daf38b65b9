// ==========================================
// IT 资产处置 ERP - 主入口
// ==========================================
// 职责: 初始化日志与数据库,补写遗留审计日志,运行后台补写任务直到 Ctrl-C
// ==========================================

use std::sync::Arc;

use itad_ledger::app::outbox_worker::run_flush;
use itad_ledger::app::{get_default_db_path, AppState, OutboxWorker};
use itad_ledger::config::LedgerConfigReader;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志系统
    itad_ledger::logging::init();

    tracing::info!("==================================================");
    tracing::info!("{}", itad_ledger::APP_NAME);
    tracing::info!("系统版本: {}", itad_ledger::VERSION);
    tracing::info!("==================================================");

    // 获取数据库路径
    let db_path = get_default_db_path();
    tracing::info!("使用数据库: {}", db_path);

    let state = AppState::new(db_path).map_err(|e| anyhow::anyhow!("无法初始化AppState: {}", e))?;
    let config: Arc<dyn LedgerConfigReader> = state.config.clone();

    // 启动时补写上次运行遗留的审计日志
    let max_retries = config.get_outbox_max_retries().await.unwrap_or(5);
    if let Some(report) = run_flush(state.audit_recorder.clone(), max_retries).await {
        tracing::info!(
            delivered = report.delivered,
            failed = report.failed,
            "启动补写完成"
        );
    }

    let worker = OutboxWorker::spawn(state.audit_recorder.clone(), config).await;

    tracing::info!("服务就绪，按 Ctrl-C 退出");
    tokio::signal::ctrl_c().await?;

    worker.shutdown().await;
    tracing::info!("已退出");
    Ok(())
}
