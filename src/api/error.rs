// ==========================================
// 药盒分装排产系统 - API层错误类型
// ==========================================
// 职责: 把引擎层/仓储层错误转换为调用方可读的错误消息
// ==========================================

use crate::engine::error::SchedulerError;
use crate::repository::error::RepositoryError;
use thiserror::Error;

/// API层错误类型
#[derive(Error, Debug)]
pub enum ApiError {
    // ==========================================
    // 配置与输入错误
    // ==========================================
    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("数据不足: {0}")]
    InsufficientData(String),

    #[error("无效输入: {0}")]
    InvalidInput(String),

    #[error("资源未找到: {0}")]
    NotFound(String),

    // ==========================================
    // 并发控制错误
    // ==========================================
    #[error("乐观锁冲突: {0}")]
    OptimisticLockFailure(String),

    // ==========================================
    // 数据访问错误
    // ==========================================
    #[error("数据库错误: {0}")]
    DatabaseError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据验证失败: {0}")]
    ValidationError(String),

    // ==========================================
    // 通用错误
    // ==========================================
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ==========================================
// 从 RepositoryError 转换
// ==========================================
impl From<RepositoryError> for ApiError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::OptimisticLockFailure {
                system_id,
                expected,
                actual,
            } => ApiError::OptimisticLockFailure(format!(
                "设备{}的批次已被其他排产提交（期望序号={}，实际序号={}）",
                system_id, expected, actual
            )),
            RepositoryError::NotFound { entity, id } => {
                ApiError::NotFound(format!("{}(id={})", entity, id))
            }
            RepositoryError::LockError(msg) => ApiError::DatabaseError(format!("锁获取失败: {}", msg)),
            RepositoryError::DatabaseTransactionError(msg) => ApiError::DatabaseTransactionError(msg),
            RepositoryError::DatabaseQueryError(msg)
            | RepositoryError::UniqueConstraintViolation(msg)
            | RepositoryError::ForeignKeyViolation(msg) => ApiError::DatabaseError(msg),
            RepositoryError::ValidationError(msg) => ApiError::ValidationError(msg),
            RepositoryError::Other(err) => ApiError::Other(err),
        }
    }
}

// ==========================================
// 从 SchedulerError 转换
// ==========================================
impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::Configuration { .. } => ApiError::Configuration(err.to_string()),
            SchedulerError::InsufficientData { .. } => ApiError::InsufficientData(err.to_string()),
            SchedulerError::InvalidInput(msg) => ApiError::InvalidInput(msg),
            SchedulerError::Repository(repo) => repo.into(),
            SchedulerError::Other(err) => ApiError::Other(err),
        }
    }
}

/// Result 类型别名
pub type ApiResult<T> = Result<T, ApiError>;
