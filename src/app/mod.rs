// ==========================================
// IT 资产处置 ERP - 应用层
// ==========================================
// 职责: 应用状态组装、请求处理器、后台补写任务
// ==========================================

pub mod handlers;
pub mod outbox_worker;
pub mod state;

// 重导出
pub use handlers::HandlerResponse;
pub use outbox_worker::OutboxWorker;
pub use state::{get_default_db_path, AppState};
