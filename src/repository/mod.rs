// ==========================================
// 药盒分装排产系统 - 数据仓储层
// ==========================================
// 红线: Repository 不含业务逻辑
// ==========================================
// 职责: 加班工时与批次提交的数据访问
// 约束: 所有查询使用参数化,防止 SQL 注入
// ==========================================

pub mod batch_repo;
pub mod error;
pub mod extra_hours_repo;

// 重导出核心仓储
pub use batch_repo::{BatchRepository, LastBatchInfo, SystemBatches};
pub use error::{RepositoryError, RepositoryResult};
pub use extra_hours_repo::ExtraHoursRepository;
