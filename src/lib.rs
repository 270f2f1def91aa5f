// ==========================================
// 药盒分装排产系统 - 核心库
// ==========================================
// 技术栈: Rust + SQLite
// 系统定位: 把待分装药盒分到自动设备批次、人工分装与超载
// ==========================================

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与类型
pub mod domain;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 排产算法
pub mod engine;

// 配置层 - 工时与排产策略
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// 日志系统
pub mod logging;

// API 层 - 业务接口
pub mod api;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::types::{Assignment, CutReason, FillMode, OverloadDistributionType, SortLogic};

// 领域实体
pub use domain::{
    Batch, BatchAnalysis, DrugKey, ManualUser, OverloadDistribution, OverloadRequest, Pack,
    SchedulingRequest, SplitInfo, UnitKey, WorkingTime, Zone,
};

// 配置
pub use config::{ConfigManager, SchedulerConfig, SettingsReader, StaticSettings};

// 引擎
pub use engine::{
    CapacityCalendar, ManualFillOptimizer, MultiBatchRecommender, OverloadDistributor,
    PatientAggregator, ScheduleOrchestrator, ScheduleOutcome, SchedulerError, SchedulerResult,
    SplitRecommender,
};

// API
pub use api::{ApiError, ApiResult, ScheduleApi};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "药盒分装排产系统";
