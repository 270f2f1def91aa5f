// ==========================================
// 药盒分装排产系统 - 区域与资源模型
// ==========================================
// 职责: 区域罐装库存、替代药候选、人工分装人员
// ==========================================

use crate::domain::pack::{DrugKey, SystemId, UserId, ZoneId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

// ==========================================
// Zone - 区域
// ==========================================
// 一组罐装药品 + 可访问这些罐的自动设备
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub zone_id: ZoneId,
    pub system_ids: Vec<SystemId>,          // 首个设备代表该区域参与排产
    pub canister_drugs: BTreeSet<DrugKey>,  // 区域内罐装药品

    // ===== 机器人罐位容量 =====
    pub quadrant_canister_capacity: usize, // 单象限罐位数
    pub quadrant_count: usize,             // 象限数
}

impl Zone {
    /// 单批次目标唯一罐装药品数
    pub fn unique_drugs_target(&self) -> usize {
        self.quadrant_canister_capacity * self.quadrant_count
    }

    /// 代表设备
    pub fn primary_system(&self) -> Option<SystemId> {
        self.system_ids.first().copied()
    }
}

// ==========================================
// AlternateOption - 替代药候选
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlternateOption {
    pub drug: DrugKey,      // 原药
    pub alternate: DrugKey, // 替代药
    pub zone_id: ZoneId,
    pub canister_count: u32,      // 该区域中替代药的罐数
    pub available_quantity: u64,  // 该区域中替代药的可用量
}

// ==========================================
// ManualUser - 人工分装人员
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManualUser {
    pub user_id: UserId,
    pub hours: u32, // 当日可分配工时
}
