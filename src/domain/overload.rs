// ==========================================
// 药盒分装排产系统 - 超载分配报告
// ==========================================
// 职责: 超载药盒在设备/人员间的分配结果与额外工时
// ==========================================

use crate::domain::capacity::WorkingTime;
use crate::domain::pack::{PackId, SystemId, UserId};
use crate::domain::types::OverloadDistributionType;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 单设备单日的超载分配
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AutomaticOverloadEntry {
    pub fill_date: NaiveDate,
    pub system_id: SystemId,
    pub pack_count: usize,
    pub extra_working_hours: WorkingTime,
    pub pack_ids: Vec<PackId>,
}

/// 人工团队单日的超载分配
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManualOverloadEntry {
    pub fill_date: NaiveDate,
    pub pack_count: usize,
    pub extra_working_hours: WorkingTime,
    pub pack_ids: Vec<PackId>,
}

/// 单人员单日的分配
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualUserLoad {
    pub pack_ids: BTreeSet<PackId>,
    pub extra_working_hours: WorkingTime,
}

// ==========================================
// OverloadDistribution - 分配报告
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverloadDistribution {
    pub distribution_type: OverloadDistributionType,
    pub automatic: Vec<AutomaticOverloadEntry>,
    pub manual: Vec<ManualOverloadEntry>,
    pub manual_user_distribution: BTreeMap<UserId, BTreeMap<NaiveDate, ManualUserLoad>>,
    pub undated_manual_packs: BTreeMap<UserId, BTreeSet<PackId>>, // 无交付日期的药盒按人员
    pub unassigned_packs: Vec<PackId>, // 无交付日期且无人工人员可接收
}

impl OverloadDistribution {
    pub fn empty(distribution_type: OverloadDistributionType) -> Self {
        Self {
            distribution_type,
            automatic: Vec::new(),
            manual: Vec::new(),
            manual_user_distribution: BTreeMap::new(),
            undated_manual_packs: BTreeMap::new(),
            unassigned_packs: Vec::new(),
        }
    }
}

/// 排产结果中的超载工时估算
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OverloadHoursSummary {
    pub overloaded_pack_count: usize,
    pub manual_hours: f64,
    pub automatic_hours: BTreeMap<SystemId, f64>,
}
