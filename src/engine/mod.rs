// ==========================================
// 药盒分装排产系统 - 引擎层
// ==========================================
// 职责: 产能日历、聚合、拆分、批次推荐、超载分配
// 红线: Engine 不访问数据库，所有外部数据在调用前读好
// ==========================================

pub mod aggregator;
pub mod alternate;
pub mod batch_context;
pub mod calendar;
pub mod error;
pub mod manual_fill;
pub mod manual_users;
pub mod multi_batch;
pub mod orchestrator;
pub mod overload;
pub mod split_recommender;

// 重导出核心引擎
pub use aggregator::{AggregatedData, PatientAggregator, UnitData};
pub use alternate::{select_zone_alternates, zone_wise_drugs};
pub use batch_context::{BatchAccumulator, SchedulingContext, WorkQueue};
pub use calendar::{fill_date_with_buffer, CapacityCalendar, DateWalk};
pub use error::{SchedulerError, SchedulerResult};
pub use manual_fill::{ManualFillInput, ManualFillOptimizer, ManualFillPlan, ThresholdSplit};
pub use manual_users::{lpt_assign, ManualUserDistributor, ManualUserPlan};
pub use multi_batch::{evaluate_cut, BatchPlanInput, MultiBatchRecommender, MultiBatchResult};
pub use orchestrator::{ScheduleOrchestrator, ScheduleOutcome, ZoneSchedule};
pub use overload::{smooth_dates, summary_hours, OverloadDistributor, OverloadResources};
pub use split_recommender::{partition_pack_sets, CapacityWindow, SplitRecommendation, SplitRecommender};
