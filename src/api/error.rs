// ==========================================
// IT 资产处置 ERP - API层错误类型
// ==========================================
// 职责: 将引擎/仓储错误翻译为带稳定错误码与 HTTP 等价状态的边界错误
// 约定: 5xx 错误的原始信息只进日志,对外返回通用消息
// ==========================================

use crate::engine::error::LedgerError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 输入错误 (400)
    // ==========================================
    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("无效金额: {0}")]
    InvalidAmount(String),

    #[error("无效科目: {0}")]
    InvalidKind(String),

    #[error("无效价格: {0}")]
    InvalidPrice(String),

    #[error("批次 {0} 中没有设备")]
    NoUnitsInBatch(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 认证 (401)
    // ==========================================
    #[error("未认证: {0}")]
    Unauthenticated(String),

    // ==========================================
    // 未找到 (404)
    // ==========================================
    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制 (409)
    // ==========================================
    #[error("并发冲突: {0}")]
    ConcurrencyConflict(String),

    // ==========================================
    // 数据访问错误 (500)
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ApiError {
    /// 稳定的机器可读错误码
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::InvalidInput(_) => "INVALID_INPUT",
            ApiError::InvalidAmount(_) => "INVALID_AMOUNT",
            ApiError::InvalidKind(_) => "INVALID_KIND",
            ApiError::InvalidPrice(_) => "INVALID_PRICE",
            ApiError::NoUnitsInBatch(_) => "NO_UNITS_IN_BATCH",
            ApiError::ValidationError(_) => "VALIDATION_ERROR",
            ApiError::Unauthenticated(_) => "UNAUTHENTICATED",
            ApiError::NotFound(_) => "NOT_FOUND",
            ApiError::ConcurrencyConflict(_) => "CONCURRENCY_CONFLICT",
            ApiError::DatabaseError(_) => "PERSISTENCE_ERROR",
            ApiError::InternalError(_) | ApiError::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// HTTP 等价状态码
    pub fn status(&self) -> u16 {
        match self {
            ApiError::InvalidInput(_)
            | ApiError::InvalidAmount(_)
            | ApiError::InvalidKind(_)
            | ApiError::InvalidPrice(_)
            | ApiError::NoUnitsInBatch(_)
            | ApiError::ValidationError(_) => 400,
            ApiError::Unauthenticated(_) => 401,
            ApiError::NotFound(_) => 404,
            ApiError::ConcurrencyConflict(_) => 409,
            ApiError::DatabaseError(_) | ApiError::InternalError(_) | ApiError::Other(_) => 500,
        }
    }

    pub fn is_internal(&self) -> bool {
        self.status() >= 500
    }
}

// ==========================================
// 从 LedgerError 转换
// ==========================================
impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::MissingField(field) => ApiError::InvalidInput(format!("缺少必填字段: {}", field)),
            LedgerError::InvalidAmount(msg) => ApiError::InvalidAmount(msg),
            LedgerError::InvalidKind(msg) => ApiError::InvalidKind(msg),
            LedgerError::InvalidPrice(msg) => ApiError::InvalidPrice(msg),
            LedgerError::Validation(msg) => ApiError::ValidationError(msg),
            LedgerError::Unauthenticated(msg) => ApiError::Unauthenticated(msg),
            LedgerError::BatchNotFound(id) => ApiError::NotFound(format!("批次(id={})不存在", id)),
            LedgerError::NotFound { entity, id } => ApiError::NotFound(format!("{}(id={})不存在", entity, id)),
            LedgerError::NoUnitsInBatch(id) => ApiError::NoUnitsInBatch(id),
            LedgerError::ConcurrencyConflict(msg) => ApiError::ConcurrencyConflict(msg),
            LedgerError::Persistence(err) => err.into(),
        }
    }
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::ConcurrencyConflict(msg) => ApiError::ConcurrencyConflict(msg),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})不存在", entity, id))
            }
            RepositoryError::FieldValueError { field, message } => {
                ApiError::InvalidInput(format!("字段{}错误: {}", field, message))
            }
            RepositoryError::UniqueConstraintViolation(msg) => {
                ApiError::ValidationError(format!("唯一约束违反: {}", msg))
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                ApiError::ValidationError(format!("外键约束违反: {}", msg))
            }
            RepositoryError::CheckConstraintViolation(msg) => {
                ApiError::ValidationError(format!("检查约束违反: {}", msg))
            }
            RepositoryError::LockError(msg) => {
                ApiError::DatabaseError(format!("数据库锁获取失败: {}", msg))
            }
            RepositoryError::DatabaseConnectionError(msg)
            | RepositoryError::DatabaseTransactionError(msg)
            | RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::SerializationError(msg) => ApiError::DatabaseError(msg),
            RepositoryError::InternalError(msg) => ApiError::InternalError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
