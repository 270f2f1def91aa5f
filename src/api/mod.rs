// ==========================================
// 药盒分装排产系统 - API 层
// ==========================================
// 职责: 组装仓储与引擎，供命令行和上层服务调用
// ==========================================

pub mod error;
pub mod schedule_api;

// 重导出核心类型
pub use error::{ApiError, ApiResult};
pub use schedule_api::{PlanResponse, ScheduleApi};
