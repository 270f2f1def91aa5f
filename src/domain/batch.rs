// ==========================================
// 药盒分装排产系统 - 批次领域模型
// ==========================================
// 职责: 自动设备的批次、批次统计
// ==========================================

use crate::domain::capacity::WorkingTime;
use crate::domain::pack::{PackId, UnitKey};
use crate::domain::types::CutReason;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ==========================================
// BatchAnalysis - 批次统计
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchAnalysis {
    pub total_packs: usize,
    pub total_batch_slots: usize,
    pub manual_slots: usize,
    pub canister_drugs: usize,
    pub manual_drugs: usize,
}

// ==========================================
// Batch - 批次
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    // ===== 标识 =====
    pub batch_no: u32,
    pub name: String, // "Batch-N  YYYY-MM-DD"

    // ===== 日历 =====
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub processing_time: WorkingTime,

    // ===== 内容 =====
    pub units: Vec<UnitKey>,
    pub pack_ids: Vec<PackId>,
    pub analysis: BatchAnalysis,
    pub cut_reason: Option<CutReason>,
}

impl Batch {
    /// 批次展示名
    pub fn display_name(batch_no: u32, start_date: NaiveDate) -> String {
        format!("Batch-{}  {}", batch_no, start_date.format("%Y-%m-%d"))
    }

    pub fn pack_count(&self) -> usize {
        self.pack_ids.len()
    }
}
