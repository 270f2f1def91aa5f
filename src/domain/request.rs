// ==========================================
// 药盒分装排产系统 - 排产请求
// ==========================================
// 职责: 一次排产调用的只读输入快照
// ==========================================

use crate::domain::pack::{DrugKey, Pack, SystemId};
use crate::domain::zone::{AlternateOption, ManualUser, Zone};
use crate::domain::types::OverloadDistributionType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// SchedulingRequest - 批次排产请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulingRequest {
    pub company_id: i64,
    pub today: NaiveDate, // 排产基准日

    // ===== 数据快照 =====
    pub packs: Vec<Pack>,
    pub zones: Vec<Zone>,
    #[serde(default)]
    pub alternates: Vec<AlternateOption>,
    #[serde(default)]
    pub manual_users: Vec<ManualUser>,

    // ===== 设备当前排产截止日 =====
    #[serde(default)]
    pub system_end_dates: BTreeMap<SystemId, NaiveDate>,
}

// ==========================================
// OverloadRequest - 超载药盒分配请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverloadRequest {
    pub company_id: i64,
    pub packs: Vec<Pack>,
    #[serde(default)]
    pub automatic_systems: Option<Vec<SystemId>>,
    #[serde(default)]
    pub manual_users: Option<Vec<ManualUser>>,
    #[serde(default)]
    pub schedule_dates: Vec<NaiveDate>, // 参与平滑的空闲日期，可为空
}

impl OverloadRequest {
    /// 由所选资源推导分配方式
    pub fn distribution_type(&self) -> Option<OverloadDistributionType> {
        let has_systems = self.automatic_systems.as_ref().map_or(false, |s| !s.is_empty());
        let has_users = self.manual_users.as_ref().map_or(false, |u| !u.is_empty());
        match (has_systems, has_users) {
            (true, false) => Some(OverloadDistributionType::Automatic),
            (false, true) => Some(OverloadDistributionType::Manual),
            (true, true) => Some(OverloadDistributionType::Both),
            (false, false) => None,
        }
    }
}

// ==========================================
// ManualFillRequest - 人工分装优化请求
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualFillRequest {
    pub company_id: i64,
    pub packs: Vec<Pack>,
    pub canister_drugs: BTreeSet<DrugKey>,
    pub manual_percent: u32,
    #[serde(default)]
    pub max_allowed_manual_fill: usize,
    #[serde(default)]
    pub manual_users: Vec<ManualUser>,
    #[serde(default)]
    pub include_undated: bool,
}
