// ==========================================
// IT 资产处置 ERP - 引擎层错误类型
// ==========================================
// 分类: 校验错误 / 未找到 / 并发冲突 / 持久化错误
// 说明: 审计写入失败不是错误值,见 AuditOutcome::Deferred
// ==========================================

use thiserror::Error;
use tracing::warn;

use crate::repository::error::RepositoryError;

/// 台账/审计引擎错误
#[derive(Error, Debug)]
pub enum LedgerError {
    // ===== 校验错误 =====
    #[error("缺少必填字段: {0}")]
    MissingField(String),

    #[error("无效金额: {0}")]
    InvalidAmount(String),

    #[error("无效科目: {0}")]
    InvalidKind(String),

    #[error("无效价格: {0}")]
    InvalidPrice(String),

    #[error("数据验证失败: {0}")]
    Validation(String),

    #[error("未认证: {0}")]
    Unauthenticated(String),

    // ===== 未找到 =====
    #[error("批次不存在: {0}")]
    BatchNotFound(String),

    #[error("记录不存在: {entity} id={id}")]
    NotFound { entity: String, id: String },

    #[error("批次 {0} 中没有设备")]
    NoUnitsInBatch(String),

    // ===== 并发 =====
    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    // ===== 持久化 =====
    #[error("持久化失败: {0}")]
    Persistence(RepositoryError),
}

impl LedgerError {
    /// 是否为调用方输入问题 (4xx)
    pub fn is_client_error(&self) -> bool {
        !matches!(self, LedgerError::Persistence(_) | LedgerError::ConcurrencyConflict(_))
    }
}

impl From<RepositoryError> for LedgerError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConcurrencyConflict(msg) => LedgerError::ConcurrencyConflict(msg),
            other => LedgerError::Persistence(other),
        }
    }
}

impl From<rusqlite::Error> for LedgerError {
    fn from(err: rusqlite::Error) -> Self {
        RepositoryError::from(err).into()
    }
}

/// 并发冲突时内部重试一次,仍冲突则上抛
pub fn retry_on_conflict<T, F>(operation: &str, mut f: F) -> Result<T, LedgerError>
where
    F: FnMut() -> Result<T, LedgerError>,
{
    match f() {
        Err(LedgerError::ConcurrencyConflict(msg)) => {
            warn!(operation, error = %msg, "并发冲突，重试一次");
            f()
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_busy_repository_error_becomes_conflict() {
        let err: LedgerError = RepositoryError::ConcurrencyConflict("locked".to_string()).into();
        assert!(matches!(err, LedgerError::ConcurrencyConflict(_)));
        assert!(!err.is_client_error());

        let err: LedgerError = RepositoryError::DatabaseQueryError("disk".to_string()).into();
        assert!(matches!(err, LedgerError::Persistence(_)));
    }

    #[test]
    fn test_retry_on_conflict_retries_once() {
        let mut calls = 0;
        let result: Result<u32, LedgerError> = retry_on_conflict("test", || {
            calls += 1;
            if calls == 1 {
                Err(LedgerError::ConcurrencyConflict("busy".to_string()))
            } else {
                Ok(7)
            }
        });
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls, 2);

        let mut calls = 0;
        let result: Result<u32, LedgerError> = retry_on_conflict("test", || {
            calls += 1;
            Err(LedgerError::ConcurrencyConflict("busy".to_string()))
        });
        assert!(matches!(result, Err(LedgerError::ConcurrencyConflict(_))));
        assert_eq!(calls, 2);
    }
}
