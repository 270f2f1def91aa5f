// ==========================================
// 药盒分装排产系统 - 产能领域模型
// ==========================================
// 职责: 日期产能表、工时表示
// ==========================================

use crate::domain::pack::SystemId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// 日期 -> 药盒数（产能或剩余产能，可为负）
pub type DateCapacityMap = BTreeMap<NaiveDate, i64>;

// ==========================================
// WorkingTime - 工时 (小时 + 分钟)
// ==========================================
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkingTime {
    pub hours: u32,
    #[serde(rename = "min")]
    pub minutes: u32,
}

impl WorkingTime {
    /// 小数小时 -> 整小时 + 四舍五入分钟
    pub fn from_hours(value: f64) -> Self {
        let value = value.max(0.0);
        let hours = value.trunc();
        Self {
            hours: hours as u32,
            minutes: ((value - hours) * 60.0).round() as u32,
        }
    }

    /// 按件数与每小时产能折算
    pub fn for_packs(pack_count: usize, packs_per_hour: u32) -> Self {
        if packs_per_hour == 0 {
            return Self::default();
        }
        Self::from_hours(pack_count as f64 / packs_per_hour as f64)
    }

    pub fn as_hours(&self) -> f64 {
        self.hours as f64 + self.minutes as f64 / 60.0
    }
}

impl std::ops::AddAssign for WorkingTime {
    fn add_assign(&mut self, rhs: Self) {
        let minutes = self.minutes + rhs.minutes;
        self.hours += rhs.hours + minutes / 60;
        self.minutes = minutes % 60;
    }
}

// ==========================================
// ExtraHoursOwner - 临时加班工时的归属
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum ExtraHoursOwner {
    System(SystemId),
    ManualTeam,
}

impl ExtraHoursOwner {
    /// 存储层使用的归属键
    pub fn owner_key(&self) -> String {
        match self {
            ExtraHoursOwner::System(id) => format!("system/{}", id),
            ExtraHoursOwner::ManualTeam => "manual".to_string(),
        }
    }
}

impl fmt::Display for ExtraHoursOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner_key())
    }
}

/// 日期 -> 加班小时
pub type ExtraHoursMap = BTreeMap<NaiveDate, f64>;
