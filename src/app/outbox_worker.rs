// ==========================================
// IT 资产处置 ERP - 审计发件箱后台补写
// ==========================================
// 职责: 按配置间隔补写延后的审计日志,收到关闭信号后退出
// ==========================================

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::ledger_config_trait::LedgerConfigReader;
use crate::engine::audit_recorder::{AuditRecorder, FlushReport};

const DEFAULT_MAX_RETRIES: u32 = 5;
const DEFAULT_INTERVAL_SECS: u64 = 30;

/// 后台补写任务句柄
pub struct OutboxWorker {
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<()>,
}

impl OutboxWorker {
    /// 启动后台补写任务 (需在 tokio 运行时内调用)
    pub async fn spawn(recorder: Arc<AuditRecorder>, config: Arc<dyn LedgerConfigReader>) -> Self {
        let secs = config.get_outbox_flush_interval_secs().await.unwrap_or_else(|e| {
            warn!(error = %e, "读取补写间隔失败，使用默认值");
            DEFAULT_INTERVAL_SECS
        });
        Self::spawn_with_interval(recorder, config, Duration::from_secs(secs.max(1)))
    }

    pub fn spawn_with_interval(
        recorder: Arc<AuditRecorder>,
        config: Arc<dyn LedgerConfigReader>,
        period: Duration,
    ) -> Self {
        let (tx, mut rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            info!(period_ms = period.as_millis() as u64, "审计发件箱补写任务已启动");

            loop {
                tokio::select! {
                    _ = &mut rx => {
                        info!("审计发件箱补写任务收到关闭信号");
                        break;
                    }
                    _ = interval.tick() => {
                        let max_retries = config.get_outbox_max_retries().await.unwrap_or_else(|e| {
                            warn!(error = %e, "读取最大补写次数失败，使用默认值");
                            DEFAULT_MAX_RETRIES
                        });
                        run_flush(recorder.clone(), max_retries).await;
                    }
                }
            }
        });

        Self {
            shutdown: Some(tx),
            handle,
        }
    }

    /// 发送关闭信号并等待任务结束
    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Err(e) = self.handle.await {
            error!(error = %e, "审计发件箱补写任务异常退出");
        }
    }
}

/// 补写一次 (阻塞操作放到 blocking 线程)
pub async fn run_flush(recorder: Arc<AuditRecorder>, max_retries: u32) -> Option<FlushReport> {
    match tokio::task::spawn_blocking(move || recorder.flush_outbox(max_retries)).await {
        Ok(Ok(report)) => {
            debug!(delivered = report.delivered, retried = report.retried, failed = report.failed, "补写完成");
            Some(report)
        }
        Ok(Err(e)) => {
            error!(error = %e, "审计发件箱补写失败");
            None
        }
        Err(e) => {
            error!(error = %e, "审计发件箱补写任务 panic");
            None
        }
    }
}
