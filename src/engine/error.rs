// ==========================================
// 药盒分装排产系统 - 排产引擎错误类型
// ==========================================
// 工具: thiserror 派生宏
// 说明: 产能耗尽不是错误，走人工/超载分流
// ==========================================

use crate::repository::error::RepositoryError;
use thiserror::Error;

/// 排产引擎错误类型
#[derive(Error, Debug)]
pub enum SchedulerError {
    // ===== 配置错误 (致命，分配开始前抛出) =====
    #[error("配置错误 (key={key}): {message}")]
    Configuration { key: String, message: String },

    // ===== 数据不足 =====
    #[error("数据不足 ({entity} id={id}): {message}")]
    InsufficientData {
        entity: String,
        id: String,
        message: String,
    },

    // ===== 输入错误 =====
    #[error("无效输入: {0}")]
    InvalidInput(String),

    // ===== 外部数据访问错误 (原样上抛，不重试) =====
    #[error(transparent)]
    Repository(#[from] RepositoryError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SchedulerError {
    pub fn configuration(key: &str, message: impl Into<String>) -> Self {
        SchedulerError::Configuration {
            key: key.to_string(),
            message: message.into(),
        }
    }
}

/// Result 类型别名
pub type SchedulerResult<T> = Result<T, SchedulerError>;
