// ==========================================
// 药盒分装排产系统 - 领域模型层
// ==========================================
// 职责: 定义领域实体、类型、值对象
// 红线: 不含数据访问逻辑,不含引擎逻辑
// ==========================================

pub mod batch;
pub mod capacity;
pub mod overload;
pub mod pack;
pub mod request;
pub mod split;
pub mod types;
pub mod zone;

// 重导出核心类型
pub use batch::{Batch, BatchAnalysis};
pub use capacity::{DateCapacityMap, ExtraHoursMap, ExtraHoursOwner, WorkingTime};
pub use overload::{
    AutomaticOverloadEntry, ManualOverloadEntry, ManualUserLoad, OverloadDistribution,
    OverloadHoursSummary,
};
pub use pack::{
    DrugKey, FacilityId, Pack, PackId, PatientId, SlotDrug, SystemId, UnitKey, UserId, ZoneId,
};
pub use request::{ManualFillRequest, OverloadRequest, SchedulingRequest};
pub use split::{SortedEntry, SplitInfo};
pub use types::{Assignment, CutReason, DayKind, FillMode, OverloadDistributionType, SortLogic};
pub use zone::{AlternateOption, ManualUser, Zone};
