// ==========================================
// 药盒分装排产系统 - 药盒领域模型
// ==========================================
// 职责: 药盒、槽位、药品标识、聚合单元标识
// 说明: 药盒由上游订单生成，本系统只读
// ==========================================

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

pub type PackId = i64;
pub type PatientId = i64;
pub type FacilityId = i64;
pub type ZoneId = i64;
pub type SystemId = i64;
pub type UserId = i64;

// ==========================================
// DrugKey - 药品标识
// ==========================================
// 身份为 (formatted_ndc, txr) 组合键
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DrugKey {
    pub formatted_ndc: String,
    pub txr: String,
}

impl DrugKey {
    pub fn new(formatted_ndc: impl Into<String>, txr: impl Into<String>) -> Self {
        Self {
            formatted_ndc: formatted_ndc.into(),
            txr: txr.into(),
        }
    }
}

impl fmt::Display for DrugKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}##{}", self.formatted_ndc, self.txr)
    }
}

// ==========================================
// SlotDrug - 槽位内的一种药品
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlotDrug {
    pub drug: DrugKey,
    pub quantity: f64,            // 片数，可为半片
    #[serde(default)]
    pub alternate_allowed: bool,  // 患者是否允许替代药
}

impl SlotDrug {
    /// 是否为整片数量（罐装可投放）
    pub fn is_whole_quantity(&self) -> bool {
        self.quantity.fract() == 0.0
    }
}

// ==========================================
// Pack - 药盒
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pack {
    // ===== 主键与归属 =====
    pub pack_id: PackId,
    pub patient_id: PatientId,
    pub facility_id: FacilityId,

    // ===== 交付 =====
    pub delivery_date: Option<NaiveDate>, // 缺失时不可进入自动/人工窗口

    // ===== 槽位 =====
    pub slots: BTreeMap<u32, Vec<SlotDrug>>, // slot 序号 -> 药品列表
}

impl Pack {
    /// 半片投放次数（非整数量的槽位药品条目数）
    pub fn half_pill_drop_count(&self) -> u32 {
        self.slots
            .values()
            .flat_map(|drugs| drugs.iter())
            .filter(|d| !d.is_whole_quantity())
            .count() as u32
    }

    /// 药盒内出现过的全部药品
    pub fn drugs(&self) -> impl Iterator<Item = &DrugKey> {
        self.slots.values().flat_map(|drugs| drugs.iter().map(|d| &d.drug))
    }

    /// 该药品在本药盒内是否只能人工分装（所有数量均非整片）
    pub fn is_drug_forced_manual(&self, drug: &DrugKey) -> bool {
        let mut seen = false;
        for slot_drug in self.slots.values().flatten() {
            if &slot_drug.drug == drug {
                seen = true;
                if slot_drug.is_whole_quantity() {
                    return false;
                }
            }
        }
        seen
    }
}

// ==========================================
// UnitKey - 聚合单元标识
// ==========================================
// 患者模式下为患者，机构模式下为机构
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "id")]
pub enum UnitKey {
    Patient(PatientId),
    Facility(FacilityId),
}

impl UnitKey {
    pub fn id(&self) -> i64 {
        match self {
            UnitKey::Patient(id) | UnitKey::Facility(id) => *id,
        }
    }
}

impl fmt::Display for UnitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitKey::Patient(id) => write!(f, "patient:{}", id),
            UnitKey::Facility(id) => write!(f, "facility:{}", id),
        }
    }
}
