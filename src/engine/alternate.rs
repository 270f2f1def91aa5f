// ==========================================
// 药盒分装排产系统 - 区域替代药选择
// ==========================================
// 职责: 为每个 (药品, 区域) 选定替代药；生成区域维度的患者药品集合
// 选择规则: 罐数最多 -> 可用量最大 -> 药品键最小
// ==========================================

use crate::domain::pack::{DrugKey, PatientId, ZoneId};
use crate::domain::zone::AlternateOption;
use std::collections::{BTreeMap, BTreeSet};

/// 药品 -> 区域 -> 选定的替代药
pub type AlternateChoice = BTreeMap<DrugKey, BTreeMap<ZoneId, DrugKey>>;

/// 区域 -> 原药 -> 替代药
pub type ZoneOldNewMap = BTreeMap<ZoneId, BTreeMap<DrugKey, DrugKey>>;

/// 区域维度的患者药品
#[derive(Debug, Clone, Default)]
pub struct ZoneDrugData {
    pub zone_patient_drugs: BTreeMap<ZoneId, BTreeMap<PatientId, BTreeSet<DrugKey>>>,
    pub zone_old_new: ZoneOldNewMap,
}

/// 为每个 (药品, 区域) 选出替代药
pub fn select_zone_alternates(options: &[AlternateOption]) -> AlternateChoice {
    let mut best: BTreeMap<(DrugKey, ZoneId), &AlternateOption> = BTreeMap::new();

    for option in options {
        let key = (option.drug.clone(), option.zone_id);
        let replace = match best.get(&key) {
            None => true,
            Some(current) => {
                (option.canister_count, option.available_quantity, std::cmp::Reverse(&option.alternate))
                    > (current.canister_count, current.available_quantity, std::cmp::Reverse(&current.alternate))
            }
        };
        if replace {
            best.insert(key, option);
        }
    }

    let mut choice = AlternateChoice::new();
    for ((drug, zone_id), option) in best {
        choice
            .entry(drug)
            .or_default()
            .insert(zone_id, option.alternate.clone());
    }
    choice
}

/// 生成各区域的患者药品集合
///
/// # 参数
/// - patient_drugs: 患者 -> 原始药品
/// - patient_alternate_allowed: 患者 -> 允许替代的药品
/// - choice: select_zone_alternates 的结果
/// - zone_ids: 参与排产的区域
pub fn zone_wise_drugs(
    patient_drugs: &BTreeMap<PatientId, BTreeSet<DrugKey>>,
    patient_alternate_allowed: &BTreeMap<PatientId, BTreeSet<DrugKey>>,
    choice: &AlternateChoice,
    zone_ids: &[ZoneId],
) -> ZoneDrugData {
    let mut data = ZoneDrugData::default();

    for &zone_id in zone_ids {
        let per_patient = data.zone_patient_drugs.entry(zone_id).or_default();
        let old_new = data.zone_old_new.entry(zone_id).or_default();

        for (patient_id, drugs) in patient_drugs {
            let allowed = patient_alternate_allowed.get(patient_id);
            let zone_drugs = per_patient.entry(*patient_id).or_default();

            for drug in drugs {
                let alternate = allowed
                    .filter(|set| set.contains(drug))
                    .and_then(|_| choice.get(drug))
                    .and_then(|by_zone| by_zone.get(&zone_id));

                match alternate {
                    Some(new_drug) => {
                        zone_drugs.insert(new_drug.clone());
                        old_new.insert(drug.clone(), new_drug.clone());
                    }
                    None => {
                        zone_drugs.insert(drug.clone());
                    }
                }
            }
        }
    }

    data
}
