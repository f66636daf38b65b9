// ==========================================
// IT 资产处置 ERP - 请求处理器（按域拆分）
// ==========================================
// 职责: JSON 入 / JSON 出的异步处理器,连接外部传输层与 API
// 约定: 调用方负责解析已认证身份并以 ActorContext 传入
// ==========================================

mod audit;
mod common;
mod finance;
mod warehouse;

pub use audit::*;
pub use common::{HandlerResponse, INTERNAL_ERROR_MESSAGE};
pub use finance::*;
pub use warehouse::*;
