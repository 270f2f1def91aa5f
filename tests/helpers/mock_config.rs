// ==========================================
// Mock 设置 - 用于集成测试
// ==========================================

#![allow(dead_code)]

use pack_fill_scheduler::config::{timing_keys, ConfigManager, ConfigScope, SchedulerConfig, StaticSettings};
use std::collections::HashMap;

/// 自动设备设置: 周一至周五 per_day_hours 小时，周末不工作
pub fn system_settings(per_hour: u32, per_day_hours: u32, batch_days: u32, mfd_threshold: u32) -> HashMap<String, String> {
    HashMap::from([
        (timing_keys::AUTOMATIC_PER_HOUR.to_string(), per_hour.to_string()),
        (timing_keys::AUTOMATIC_PER_DAY_HOURS.to_string(), per_day_hours.to_string()),
        (timing_keys::AUTOMATIC_SATURDAY_HOURS.to_string(), "0".to_string()),
        (timing_keys::AUTOMATIC_SUNDAY_HOURS.to_string(), "0".to_string()),
        (timing_keys::BATCH_DURATION_IN_DAYS.to_string(), batch_days.to_string()),
        (timing_keys::MFD_CANISTER_THRESHOLD_PER_HOUR.to_string(), mfd_threshold.to_string()),
    ])
}

/// 人工设置: 每人每小时 per_hour 盒，工作日 8 小时
pub fn manual_settings(per_hour: u32) -> HashMap<String, String> {
    HashMap::from([
        (timing_keys::MANUAL_PER_HOUR.to_string(), per_hour.to_string()),
        (timing_keys::MANUAL_PER_DAY_HOURS.to_string(), "8".to_string()),
        (timing_keys::MANUAL_SATURDAY_HOURS.to_string(), "0".to_string()),
        (timing_keys::MANUAL_SUNDAY_HOURS.to_string(), "0".to_string()),
    ])
}

/// 标准内存设置: 设备 10 每小时 50 盒 × 8 小时，人工每小时 10 盒
pub fn standard_settings() -> StaticSettings {
    StaticSettings::new()
        .with_system(10, system_settings(50, 8, 2, 100))
        .with_manual(manual_settings(10))
        .with_scheduler(SchedulerConfig::default())
}

/// 写入数据库设置
pub fn seed_config_manager(manager: &ConfigManager, system_id: i64, system: &HashMap<String, String>) {
    for (key, value) in system {
        manager
            .set_config_value(ConfigScope::System(system_id), key, value)
            .unwrap();
    }
    for (key, value) in manual_settings(10) {
        manager.set_config_value(ConfigScope::Global, &key, &value).unwrap();
    }
}
