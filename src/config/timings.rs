// ==========================================
// 药盒分装排产系统 - 设备/人工工时配置
// ==========================================
// 职责: 把 key-value 设置解析为强类型工时配置
// 红线: 缺失或非数字的必需项直接报配置错误，不做默认
// ==========================================

use crate::domain::types::DayKind;
use crate::engine::error::{SchedulerError, SchedulerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 设置项键名
pub mod timing_keys {
    pub const AUTOMATIC_PER_HOUR: &str = "AUTOMATIC_PER_HOUR";
    pub const AUTOMATIC_PER_DAY_HOURS: &str = "AUTOMATIC_PER_DAY_HOURS";
    pub const AUTOMATIC_SATURDAY_HOURS: &str = "AUTOMATIC_SATURDAY_HOURS";
    pub const AUTOMATIC_SUNDAY_HOURS: &str = "AUTOMATIC_SUNDAY_HOURS";
    pub const BATCH_DURATION_IN_DAYS: &str = "BATCH_DURATION_IN_DAYS";
    pub const MFD_CANISTER_THRESHOLD_PER_HOUR: &str = "MFD_CANISTER_THRESHOLD_PER_HOUR";

    pub const MANUAL_PER_HOUR: &str = "MANUAL_PER_HOUR";
    pub const MANUAL_PER_DAY_HOURS: &str = "MANUAL_PER_DAY_HOURS";
    pub const MANUAL_SATURDAY_HOURS: &str = "MANUAL_SATURDAY_HOURS";
    pub const MANUAL_SUNDAY_HOURS: &str = "MANUAL_SUNDAY_HOURS";
}

use timing_keys::*;

// ==========================================
// ResourceTimings - 单一资源的周工时
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceTimings {
    pub per_hour: u32,       // 每小时药盒数
    pub per_day_hours: u32,  // 工作日工时
    pub saturday_hours: u32, // 周六工时，可为 0
    pub sunday_hours: u32,   // 周日工时，可为 0
}

impl ResourceTimings {
    /// 按日期类别取工时
    pub fn hours_for(&self, kind: DayKind) -> u32 {
        match kind {
            DayKind::Weekday => self.per_day_hours,
            DayKind::Saturday => self.saturday_hours,
            DayKind::Sunday => self.sunday_hours,
        }
    }

    /// 按日期类别取药盒产能
    pub fn capacity_for(&self, kind: DayKind) -> i64 {
        self.per_hour as i64 * self.hours_for(kind) as i64
    }

    /// 人数倍增 (人工团队)
    pub fn scaled(&self, headcount: u32) -> Self {
        Self {
            per_hour: self.per_hour,
            per_day_hours: self.per_day_hours.saturating_mul(headcount),
            saturday_hours: self.saturday_hours.saturating_mul(headcount),
            sunday_hours: self.sunday_hours.saturating_mul(headcount),
        }
    }

    fn validate(&self, per_hour_key: &str) -> SchedulerResult<()> {
        if self.per_hour == 0 {
            return Err(SchedulerError::configuration(per_hour_key, "每小时产能必须大于 0"));
        }
        if self.per_day_hours == 0 && self.saturday_hours == 0 && self.sunday_hours == 0 {
            return Err(SchedulerError::configuration(per_hour_key, "一周内没有任何工作时间"));
        }
        Ok(())
    }
}

// ==========================================
// SystemTimings - 自动设备配置
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemTimings {
    pub automatic: ResourceTimings,
    pub batch_duration_days: u32,
    pub mfd_canister_threshold_per_hour: u32,
}

impl SystemTimings {
    /// 从设备设置解析
    ///
    /// # 参数
    /// - settings: 设备的 key-value 设置
    ///
    /// # 返回
    /// - Err(Configuration): 缺失/非数字/无效
    pub fn from_settings(settings: &HashMap<String, String>) -> SchedulerResult<Self> {
        let automatic = ResourceTimings {
            per_hour: read_u32(settings, AUTOMATIC_PER_HOUR)?,
            per_day_hours: read_u32(settings, AUTOMATIC_PER_DAY_HOURS)?,
            saturday_hours: read_u32(settings, AUTOMATIC_SATURDAY_HOURS)?,
            sunday_hours: read_u32(settings, AUTOMATIC_SUNDAY_HOURS)?,
        };
        automatic.validate(AUTOMATIC_PER_HOUR)?;

        Ok(Self {
            automatic,
            batch_duration_days: read_u32(settings, BATCH_DURATION_IN_DAYS)?,
            mfd_canister_threshold_per_hour: read_u32(settings, MFD_CANISTER_THRESHOLD_PER_HOUR)?,
        })
    }

    /// 单批次处理时长上限 (小时)
    pub fn batch_duration_hours(&self) -> f64 {
        self.batch_duration_days as f64 * self.automatic.per_day_hours as f64
    }

    /// MFD 阈值 (设备数)
    pub fn mfd_threshold(&self) -> usize {
        let threshold = u64::from(self.batch_duration_days)
            .saturating_mul(u64::from(self.automatic.per_day_hours))
            .saturating_mul(u64::from(self.mfd_canister_threshold_per_hour));
        usize::try_from(threshold).unwrap_or(usize::MAX)
    }
}

// ==========================================
// ManualTimings - 人工配置 (单人)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualTimings {
    pub per_user: ResourceTimings,
}

impl ManualTimings {
    pub fn from_settings(settings: &HashMap<String, String>) -> SchedulerResult<Self> {
        let per_user = ResourceTimings {
            per_hour: read_u32(settings, MANUAL_PER_HOUR)?,
            per_day_hours: read_u32(settings, MANUAL_PER_DAY_HOURS)?,
            saturday_hours: read_u32(settings, MANUAL_SATURDAY_HOURS)?,
            sunday_hours: read_u32(settings, MANUAL_SUNDAY_HOURS)?,
        };
        if per_user.per_hour == 0 {
            return Err(SchedulerError::configuration(MANUAL_PER_HOUR, "每小时产能必须大于 0"));
        }
        Ok(Self { per_user })
    }

    /// 团队工时 (工时 × 人数)
    pub fn team(&self, headcount: usize) -> ResourceTimings {
        self.per_user.scaled(headcount as u32)
    }
}

fn read_u32(settings: &HashMap<String, String>, key: &str) -> SchedulerResult<u32> {
    let raw = settings
        .get(key)
        .ok_or_else(|| SchedulerError::configuration(key, "缺少必需配置项"))?;
    raw.trim()
        .parse::<u32>()
        .map_err(|e| SchedulerError::configuration(key, format!("非法数值 '{}': {}", raw, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    // 测试辅助函数
    fn create_test_settings() -> HashMap<String, String> {
        [
            (AUTOMATIC_PER_HOUR, "50"),
            (AUTOMATIC_PER_DAY_HOURS, "8"),
            (AUTOMATIC_SATURDAY_HOURS, "4"),
            (AUTOMATIC_SUNDAY_HOURS, "0"),
            (BATCH_DURATION_IN_DAYS, "2"),
            (MFD_CANISTER_THRESHOLD_PER_HOUR, "3"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
    }

    #[test]
    fn test_parse_system_timings() {
        let timings = SystemTimings::from_settings(&create_test_settings()).unwrap();
        assert_eq!(timings.automatic.capacity_for(DayKind::Weekday), 400);
        assert_eq!(timings.automatic.capacity_for(DayKind::Saturday), 200);
        assert_eq!(timings.automatic.capacity_for(DayKind::Sunday), 0);
        assert_eq!(timings.batch_duration_hours(), 16.0);
        assert_eq!(timings.mfd_threshold(), 48);
    }

    #[test]
    fn test_large_mfd_settings_do_not_overflow() {
        let mut settings = create_test_settings();
        settings.insert(AUTOMATIC_PER_DAY_HOURS.to_string(), "24".to_string());
        settings.insert(BATCH_DURATION_IN_DAYS.to_string(), "100000".to_string());
        settings.insert(MFD_CANISTER_THRESHOLD_PER_HOUR.to_string(), "4000000".to_string());
        let timings = SystemTimings::from_settings(&settings).unwrap();
        assert!(timings.mfd_threshold() >= u32::MAX as usize);
        assert_eq!(timings.batch_duration_hours(), 2_400_000.0);
    }

    #[test]
    fn test_missing_key_is_configuration_error() {
        let mut settings = create_test_settings();
        settings.remove(AUTOMATIC_PER_HOUR);
        let err = SystemTimings::from_settings(&settings).unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration { ref key, .. } if key == AUTOMATIC_PER_HOUR));
    }

    #[test]
    fn test_non_numeric_is_configuration_error() {
        let mut settings = create_test_settings();
        settings.insert(AUTOMATIC_SUNDAY_HOURS.to_string(), "abc".to_string());
        assert!(matches!(
            SystemTimings::from_settings(&settings),
            Err(SchedulerError::Configuration { .. })
        ));
    }

    #[test]
    fn test_zero_per_hour_rejected() {
        let mut settings = create_test_settings();
        settings.insert(AUTOMATIC_PER_HOUR.to_string(), "0".to_string());
        assert!(SystemTimings::from_settings(&settings).is_err());
    }

    #[test]
    fn test_manual_team_scaling() {
        let settings: HashMap<String, String> = [
            (MANUAL_PER_HOUR, "10"),
            (MANUAL_PER_DAY_HOURS, "8"),
            (MANUAL_SATURDAY_HOURS, "0"),
            (MANUAL_SUNDAY_HOURS, "0"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let manual = ManualTimings::from_settings(&settings).unwrap();
        assert_eq!(manual.team(3).capacity_for(DayKind::Weekday), 240);
        assert_eq!(manual.team(0).capacity_for(DayKind::Weekday), 0);
    }
}
