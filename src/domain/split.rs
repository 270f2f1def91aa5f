// ==========================================
// 药盒分装排产系统 - 自动/人工拆分结果
// ==========================================
// 职责: 拆分结果 (SplitInfo) 与排序条目
// 红线: 每个单元只落入 自动/人工/超载 之一
// ==========================================

use crate::domain::pack::{PackId, UnitKey};
use crate::domain::types::Assignment;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// SortedEntry - 人工负担排序条目
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortedEntry {
    pub unit: UnitKey,
    pub manual_drug_length: usize,   // 含半片惩罚
    pub canister_drug_length: usize,
}

// ==========================================
// SplitInfo - 拆分结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SplitInfo {
    // ===== 单元 =====
    pub automatic_units: Vec<UnitKey>,
    pub manual_units: Vec<UnitKey>,
    pub overloaded_units: Vec<UnitKey>,

    // ===== 药盒 =====
    pub automatic_packs: Vec<PackId>,
    pub manual_packs: Vec<PackId>,
    pub overloaded_packs: Vec<PackId>,

    // ===== 超载明细 =====
    pub overloaded_datewise: BTreeMap<NaiveDate, BTreeSet<PackId>>, // 覆盖全部排产日期，空集表示当日无超载
    pub undated_units: Vec<UnitKey>, // 无交付日期，直接计入超载
}

impl SplitInfo {
    /// 查询单元去向
    pub fn assignment_of(&self, unit: &UnitKey) -> Option<Assignment> {
        if self.automatic_units.contains(unit) {
            Some(Assignment::Automatic)
        } else if self.manual_units.contains(unit) {
            Some(Assignment::Manual)
        } else if self.overloaded_units.contains(unit) {
            Some(Assignment::Overloaded)
        } else {
            None
        }
    }

    pub fn total_units(&self) -> usize {
        self.automatic_units.len() + self.manual_units.len() + self.overloaded_units.len()
    }
}
