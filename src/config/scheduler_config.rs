// ==========================================
// 药盒分装排产系统 - 排产策略配置
// ==========================================
// 职责: 算法开关与阈值的值对象，显式传入各引擎
// 存储: config_kv 表 (scope_id='global')
// ==========================================

use crate::domain::types::{FillMode, SortLogic};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::str::FromStr;
use tracing::warn;

/// 策略配置键名
pub mod scheduler_keys {
    pub const FILL_MODE: &str = "fill_mode";
    pub const CONSIDER_SIMILAR_PACKS: &str = "consider_similar_packs";
    pub const UNIQUE_DRUG_WINDOW: &str = "unique_drug_window";
    pub const MFD_SLOTS_PER_DEVICE: &str = "mfd_slots_per_device";
    pub const HALF_PILL_DROPS_PER_PENALTY: &str = "half_pill_drops_per_penalty";
    pub const BATCH_REORDER: &str = "batch_reorder";
    pub const FILL_BUFFER_DAYS: &str = "fill_buffer_days";
    pub const STRICT_DELIVERY_DATES: &str = "strict_delivery_dates";
    pub const OVERLOAD_AUTOMATIC_SHARE_PERCENT: &str = "overload_automatic_share_percent";
}

use scheduler_keys::*;

// ==========================================
// SchedulerConfig
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    // ===== 分组方式 =====
    pub fill_mode: FillMode,

    // ===== 批次切分 =====
    pub consider_similar_packs: bool, // 切分时吸收药品子集相同的单元
    pub unique_drug_window: usize,    // 罐装药品目标窗口宽度
    pub mfd_slots_per_device: usize,  // 每台 MFD 对应的人工 slot 数
    pub batch_reorder: Option<SortLogic>,

    // ===== 拆分排序 =====
    pub half_pill_drops_per_penalty: u32,

    // ===== 交付日期 =====
    pub fill_buffer_days: u32,
    pub strict_delivery_dates: bool, // 缺失交付日期时报错而不是计入超载

    // ===== 超载分配 =====
    pub overload_automatic_share_percent: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::PatientWise,
            consider_similar_packs: true,
            unique_drug_window: 8,
            mfd_slots_per_device: 4,
            batch_reorder: None,
            half_pill_drops_per_penalty: 7,
            fill_buffer_days: 0,
            strict_delivery_dates: false,
            overload_automatic_share_percent: 20,
        }
    }
}

impl SchedulerConfig {
    /// 从 key-value 设置构建
    ///
    /// 缺失的键取默认值；格式错误的键记录告警后取默认值。
    pub fn from_settings(settings: &HashMap<String, String>) -> Self {
        let defaults = Self::default();

        let batch_reorder = match settings.get(BATCH_REORDER).map(|v| v.trim()) {
            None | Some("") => defaults.batch_reorder,
            Some(raw) if raw.eq_ignore_ascii_case("NONE") => None,
            Some(raw) => match SortLogic::from_str(raw) {
                Ok(logic) => Some(logic),
                Err(e) => {
                    warn!(config_key = BATCH_REORDER, raw_value = %raw, error = %e, "配置格式错误，使用默认值");
                    defaults.batch_reorder
                }
            },
        };

        Self {
            fill_mode: parse_or(settings, FILL_MODE, defaults.fill_mode),
            consider_similar_packs: parse_bool_or(
                settings,
                CONSIDER_SIMILAR_PACKS,
                defaults.consider_similar_packs,
            ),
            unique_drug_window: parse_or(settings, UNIQUE_DRUG_WINDOW, defaults.unique_drug_window),
            mfd_slots_per_device: parse_or(
                settings,
                MFD_SLOTS_PER_DEVICE,
                defaults.mfd_slots_per_device,
            )
            .max(1),
            batch_reorder,
            half_pill_drops_per_penalty: parse_or(
                settings,
                HALF_PILL_DROPS_PER_PENALTY,
                defaults.half_pill_drops_per_penalty,
            )
            .max(1),
            fill_buffer_days: parse_or(settings, FILL_BUFFER_DAYS, defaults.fill_buffer_days),
            strict_delivery_dates: parse_bool_or(
                settings,
                STRICT_DELIVERY_DATES,
                defaults.strict_delivery_dates,
            ),
            overload_automatic_share_percent: parse_or(
                settings,
                OVERLOAD_AUTOMATIC_SHARE_PERCENT,
                defaults.overload_automatic_share_percent,
            )
            .min(100),
        }
    }
}

fn parse_or<T>(settings: &HashMap<String, String>, key: &str, default: T) -> T
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match settings.get(key) {
        None => default,
        Some(raw) => raw.trim().parse::<T>().unwrap_or_else(|e| {
            warn!(config_key = key, raw_value = %raw, error = %e, "配置格式错误，使用默认值");
            default
        }),
    }
}

fn parse_bool_or(settings: &HashMap<String, String>, key: &str, default: bool) -> bool {
    match settings.get(key).map(|v| v.trim().to_ascii_lowercase()) {
        None => default,
        Some(v) => match v.as_str() {
            "1" | "true" | "yes" | "y" => true,
            "0" | "false" | "no" | "n" => false,
            _ => {
                warn!(config_key = key, raw_value = %v, "布尔配置格式错误，使用默认值");
                default
            }
        },
    }
}
