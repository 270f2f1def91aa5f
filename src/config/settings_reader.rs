// ==========================================
// 药盒分装排产系统 - 设置读取 Trait
// ==========================================
// 职责: 定义排产所需的设置读取接口，以及内存实现
// 红线: 不包含配置写入、不包含排产逻辑
// ==========================================

use crate::config::scheduler_config::SchedulerConfig;
use crate::config::timings::{ManualTimings, SystemTimings};
use crate::domain::capacity::{ExtraHoursMap, ExtraHoursOwner};
use crate::domain::pack::SystemId;
use crate::engine::error::{SchedulerError, SchedulerResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

// ==========================================
// SettingsReader Trait
// ==========================================
// 用途: 每次排产开始前一次性读取
// 实现者: ConfigManager (config_kv 表), StaticSettings (内存)
pub trait SettingsReader: Send + Sync {
    /// 读取自动设备的原始设置
    ///
    /// # 返回
    /// - 设备未登记任何设置时返回空表，由解析阶段报配置错误
    fn system_settings(&self, system_id: SystemId) -> SchedulerResult<HashMap<String, String>>;

    /// 读取公司级人工设置 (MANUAL_*)
    fn manual_settings(&self) -> SchedulerResult<HashMap<String, String>>;

    /// 读取排产策略配置
    ///
    /// # 默认值
    /// - 未配置的键取 SchedulerConfig::default()
    fn scheduler_config(&self) -> SchedulerResult<SchedulerConfig>;

    /// 读取闭区间 [from, to] 内的加班工时
    fn extra_hours(
        &self,
        owner: ExtraHoursOwner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SchedulerResult<ExtraHoursMap>;

    // ===== 解析后的强类型配置 =====

    fn system_timings(&self, system_id: SystemId) -> SchedulerResult<SystemTimings> {
        SystemTimings::from_settings(&self.system_settings(system_id)?)
    }

    fn manual_timings(&self) -> SchedulerResult<ManualTimings> {
        ManualTimings::from_settings(&self.manual_settings()?)
    }
}

// ==========================================
// StaticSettings - 内存设置
// ==========================================
// 用于命令行和测试
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StaticSettings {
    pub systems: BTreeMap<SystemId, HashMap<String, String>>,
    pub manual: HashMap<String, String>,
    pub scheduler: SchedulerConfig,
    pub extra_hours: BTreeMap<String, ExtraHoursMap>, // owner_key -> 日期 -> 小时
}

impl StaticSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_system(mut self, system_id: SystemId, settings: HashMap<String, String>) -> Self {
        self.systems.insert(system_id, settings);
        self
    }

    pub fn with_manual(mut self, settings: HashMap<String, String>) -> Self {
        self.manual = settings;
        self
    }

    pub fn with_scheduler(mut self, config: SchedulerConfig) -> Self {
        self.scheduler = config;
        self
    }

    pub fn with_extra_hours(mut self, owner: ExtraHoursOwner, date: NaiveDate, hours: f64) -> Self {
        self.extra_hours
            .entry(owner.owner_key())
            .or_default()
            .insert(date, hours);
        self
    }
}

impl SettingsReader for StaticSettings {
    fn system_settings(&self, system_id: SystemId) -> SchedulerResult<HashMap<String, String>> {
        Ok(self.systems.get(&system_id).cloned().unwrap_or_default())
    }

    fn manual_settings(&self) -> SchedulerResult<HashMap<String, String>> {
        Ok(self.manual.clone())
    }

    fn scheduler_config(&self) -> SchedulerResult<SchedulerConfig> {
        Ok(self.scheduler.clone())
    }

    fn extra_hours(
        &self,
        owner: ExtraHoursOwner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SchedulerResult<ExtraHoursMap> {
        if from > to {
            return Err(SchedulerError::InvalidInput(format!(
                "加班查询区间无效: {} > {}",
                from, to
            )));
        }
        Ok(self
            .extra_hours
            .get(&owner.owner_key())
            .map(|by_date| {
                by_date
                    .range(from..=to)
                    .map(|(d, h)| (*d, *h))
                    .collect()
            })
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    #[test]
    fn test_extra_hours_are_range_filtered() {
        let settings = StaticSettings::new()
            .with_extra_hours(ExtraHoursOwner::System(1), d(2), 2.0)
            .with_extra_hours(ExtraHoursOwner::System(1), d(9), 3.0)
            .with_extra_hours(ExtraHoursOwner::ManualTeam, d(3), 1.0);

        let hours = settings
            .extra_hours(ExtraHoursOwner::System(1), d(1), d(5))
            .unwrap();
        assert_eq!(hours.len(), 1);
        assert_eq!(hours[&d(2)], 2.0);

        let manual = settings
            .extra_hours(ExtraHoursOwner::ManualTeam, d(1), d(31))
            .unwrap();
        assert_eq!(manual[&d(3)], 1.0);
    }

    #[test]
    fn test_unknown_system_fails_at_parse() {
        let settings = StaticSettings::new();
        assert!(matches!(
            settings.system_timings(42),
            Err(SchedulerError::Configuration { .. })
        ));
    }
}
