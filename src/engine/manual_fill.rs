// ==========================================
// 药盒分装排产系统 - 人工分装比例优化
// ==========================================
// 职责: 按公司罐装药品集合与人工比例，把患者分为罐装/人工两组
// 附带: 每个人工药品数阈值下的罐装/人工药盒数统计，可选按人员分配
// ==========================================

use crate::domain::pack::{DrugKey, Pack, PackId, PatientId};
use crate::domain::zone::ManualUser;
use crate::engine::error::{SchedulerError, SchedulerResult};
use crate::engine::manual_users::{ManualUserDistributor, ManualUserPlan};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument};

// ==========================================
// ManualFillInput - 优化输入
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct ManualFillInput<'a> {
    pub packs: &'a [Pack],
    pub canister_drugs: &'a BTreeSet<DrugKey>, // 公司全部罐装药品
    pub manual_percent: u32,                   // 人工药盒占比 (0..=100)
    pub max_allowed_manual_fill: usize,        // 阈值统计上限 (不含)
    pub half_pill_drops_per_penalty: u32,

    // ===== 人员分配 (可选) =====
    pub users: &'a [ManualUser],
    pub manual_per_hour: u32,
    pub include_undated: bool, // 无交付日期药盒也分给人员
}

/// 单个阈值下的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThresholdSplit {
    pub manual_packs: usize,
    pub canister_packs: usize,
}

// ==========================================
// ManualFillPlan - 优化结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualFillPlan {
    pub canister_packs: BTreeSet<PackId>,
    pub manual_packs: BTreeSet<PackId>,
    pub undated_packs: BTreeSet<PackId>,
    pub split_by_threshold: BTreeMap<usize, ThresholdSplit>,
    pub user_plan: Option<ManualUserPlan>, // 仅指定人员时生成
}

#[derive(Debug, Clone)]
struct PatientBurden {
    patient: PatientId,
    manual: usize,
    canister: usize,
    packs: BTreeSet<PackId>,
}

pub struct ManualFillOptimizer {}

impl ManualFillOptimizer {
    pub fn new() -> Self {
        Self {}
    }

    /// 按人工负担优化罐装/人工拆分
    ///
    /// # 规则
    /// - 患者按 (人工药品数 + 半片惩罚) 升序、罐装药品数降序；罐装药品数为 0 的患者排在最后
    /// - 依次放入罐装组，直到超过 (100 - 人工%) × 总数 / 100，放不下的进人工组
    /// - 阈值 t: 人工药品数 ≤ t 且有罐装药品计为罐装，其余计为人工
    #[instrument(skip_all, fields(packs = input.packs.len(), manual_percent = input.manual_percent))]
    pub fn optimise(&self, input: &ManualFillInput<'_>) -> SchedulerResult<ManualFillPlan> {
        if input.manual_percent > 100 {
            return Err(SchedulerError::InvalidInput(format!(
                "人工比例超出范围: {}",
                input.manual_percent
            )));
        }

        let mut plan = ManualFillPlan {
            split_by_threshold: (0..input.max_allowed_manual_fill)
                .map(|t| (t, ThresholdSplit::default()))
                .collect(),
            ..Default::default()
        };

        let (mut burdens, undated) = self.patient_burdens(input);
        plan.undated_packs = undated;

        let total: usize = burdens.iter().map(|b| b.packs.len()).sum();
        let canister_limit = (100 - input.manual_percent) as f64 * total as f64 / 100.0;

        burdens.sort_by_key(|b| (b.canister == 0, b.manual, Reverse(b.canister)));

        for burden in &burdens {
            let count = burden.packs.len();
            debug!(patient = burden.patient, manual = burden.manual, canister = burden.canister, "患者人工负担");
            if (plan.canister_packs.len() + count) as f64 <= canister_limit {
                plan.canister_packs.extend(burden.packs.iter().copied());
            } else {
                plan.manual_packs.extend(burden.packs.iter().copied());
            }

            for (threshold, split) in plan.split_by_threshold.iter_mut() {
                if burden.manual <= *threshold && burden.canister > 0 {
                    split.canister_packs += count;
                } else {
                    split.manual_packs += count;
                }
            }
        }

        if !input.users.is_empty() {
            let by_id: BTreeMap<PackId, &Pack> = input.packs.iter().map(|p| (p.pack_id, p)).collect();
            let mut to_users: Vec<&Pack> = plan
                .manual_packs
                .iter()
                .filter_map(|id| by_id.get(id).copied())
                .collect();
            if input.include_undated {
                to_users.extend(plan.undated_packs.iter().filter_map(|id| by_id.get(id).copied()));
            }
            let users = sorted_by_hours(input.users);
            plan.user_plan = Some(ManualUserDistributor::new().distribute(&users, &to_users, input.manual_per_hour)?);
        }

        info!(
            canister = plan.canister_packs.len(),
            manual = plan.manual_packs.len(),
            undated = plan.undated_packs.len(),
            "人工比例优化完成"
        );
        Ok(plan)
    }

    fn patient_burdens(&self, input: &ManualFillInput<'_>) -> (Vec<PatientBurden>, BTreeSet<PackId>) {
        let per_penalty = input.half_pill_drops_per_penalty.max(1);
        let mut drugs: BTreeMap<PatientId, BTreeSet<&DrugKey>> = BTreeMap::new();
        let mut packs: BTreeMap<PatientId, BTreeSet<PackId>> = BTreeMap::new();
        let mut penalty: BTreeMap<PatientId, usize> = BTreeMap::new();
        let mut dated: BTreeSet<PatientId> = BTreeSet::new();

        for pack in input.packs {
            drugs.entry(pack.patient_id).or_default().extend(pack.drugs());
            packs.entry(pack.patient_id).or_default().insert(pack.pack_id);
            if pack.delivery_date.is_some() {
                dated.insert(pack.patient_id);
            }
            let drops = pack.half_pill_drop_count();
            if drops > 0 {
                *penalty.entry(pack.patient_id).or_default() += 1 + (drops / per_penalty) as usize;
            }
        }

        let mut burdens = Vec::new();
        let mut undated = BTreeSet::new();
        for (patient, pack_ids) in packs {
            if !dated.contains(&patient) {
                undated.extend(pack_ids);
                continue;
            }
            let patient_drugs = drugs.get(&patient).map_or(0, |d| d.len());
            let canister = drugs
                .get(&patient)
                .map_or(0, |d| d.iter().filter(|drug| input.canister_drugs.contains(**drug)).count());
            burdens.push(PatientBurden {
                patient,
                manual: patient_drugs - canister + penalty.get(&patient).copied().unwrap_or(0),
                canister,
                packs: pack_ids,
            });
        }
        (burdens, undated)
    }
}

impl Default for ManualFillOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

/// 人员按工时降序 (相同工时保持输入顺序)
fn sorted_by_hours(users: &[ManualUser]) -> Vec<ManualUser> {
    let mut sorted = users.to_vec();
    sorted.sort_by_key(|u| Reverse(u.hours));
    sorted
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pack::SlotDrug;
    use chrono::NaiveDate;

    // 测试辅助函数
    fn create_test_pack(pack_id: PackId, patient_id: PatientId, drugs: &[(&str, f64)], dated: bool) -> Pack {
        Pack {
            pack_id,
            patient_id,
            facility_id: patient_id,
            delivery_date: dated.then(|| NaiveDate::from_ymd_opt(2024, 1, 2).unwrap()),
            slots: drugs
                .iter()
                .enumerate()
                .map(|(i, (ndc, qty))| {
                    (
                        i as u32,
                        vec![SlotDrug {
                            drug: DrugKey::new(*ndc, "T"),
                            quantity: *qty,
                            alternate_allowed: false,
                        }],
                    )
                })
                .collect(),
        }
    }

    fn canisters(ndcs: &[&str]) -> BTreeSet<DrugKey> {
        ndcs.iter().map(|n| DrugKey::new(*n, "T")).collect()
    }

    fn create_test_input<'a>(packs: &'a [Pack], canister_drugs: &'a BTreeSet<DrugKey>, manual_percent: u32) -> ManualFillInput<'a> {
        ManualFillInput {
            packs,
            canister_drugs,
            manual_percent,
            max_allowed_manual_fill: 3,
            half_pill_drops_per_penalty: 7,
            users: &[],
            manual_per_hour: 10,
            include_undated: false,
        }
    }

    #[test]
    fn test_low_burden_patients_fill_canister_first() {
        let packs = vec![
            create_test_pack(1, 1, &[("A", 1.0), ("X", 1.0), ("Y", 1.0)], true), // 人工 2
            create_test_pack(2, 2, &[("A", 1.0), ("B", 1.0)], true),             // 人工 0
            create_test_pack(3, 3, &[("A", 1.0), ("X", 1.0)], true),             // 人工 1
            create_test_pack(4, 4, &[("X", 1.0)], true),                         // 无罐装
        ];
        let can = canisters(&["A", "B"]);
        let plan = ManualFillOptimizer::new()
            .optimise(&create_test_input(&packs, &can, 50))
            .unwrap();

        assert_eq!(plan.canister_packs, BTreeSet::from([2, 3]));
        assert_eq!(plan.manual_packs, BTreeSet::from([1, 4]));
        assert!(plan.user_plan.is_none());
    }

    #[test]
    fn test_threshold_statistics() {
        let packs = vec![
            create_test_pack(1, 1, &[("A", 1.0), ("X", 1.0), ("Y", 1.0)], true),
            create_test_pack(2, 2, &[("A", 1.0), ("B", 1.0)], true),
            create_test_pack(3, 3, &[("A", 1.0), ("X", 1.0)], true),
            create_test_pack(4, 4, &[("X", 1.0)], true),
        ];
        let can = canisters(&["A", "B"]);
        let plan = ManualFillOptimizer::new()
            .optimise(&create_test_input(&packs, &can, 50))
            .unwrap();

        assert_eq!(plan.split_by_threshold[&0], ThresholdSplit { manual_packs: 3, canister_packs: 1 });
        assert_eq!(plan.split_by_threshold[&1], ThresholdSplit { manual_packs: 2, canister_packs: 2 });
        assert_eq!(plan.split_by_threshold[&2], ThresholdSplit { manual_packs: 1, canister_packs: 3 });
    }

    #[test]
    fn test_half_pill_penalty_raises_burden() {
        let packs = vec![
            create_test_pack(1, 1, &[("A", 0.5)], true), // 人工 0 + 惩罚 1
            create_test_pack(2, 2, &[("A", 1.0), ("X", 1.0)], true),
        ];
        let can = canisters(&["A"]);
        let plan = ManualFillOptimizer::new()
            .optimise(&create_test_input(&packs, &can, 50))
            .unwrap();

        // 同为 1: 罐装数相同，保持患者顺序
        assert_eq!(plan.canister_packs, BTreeSet::from([1]));
        assert_eq!(plan.split_by_threshold[&0].manual_packs, 2);
    }

    #[test]
    fn test_undated_and_user_distribution() {
        let packs = vec![
            create_test_pack(1, 1, &[("X", 1.0)], true),
            create_test_pack(2, 2, &[("Y", 1.0)], true),
            create_test_pack(3, 3, &[("A", 1.0)], false),
        ];
        let can = canisters(&["A"]);
        let users = vec![ManualUser { user_id: 1, hours: 4 }, ManualUser { user_id: 2, hours: 8 }];
        let mut input = create_test_input(&packs, &can, 100);
        input.users = &users;
        input.include_undated = true;

        let plan = ManualFillOptimizer::new().optimise(&input).unwrap();

        assert_eq!(plan.undated_packs, BTreeSet::from([3]));
        assert_eq!(plan.manual_packs, BTreeSet::from([1, 2]));
        let user_plan = plan.user_plan.unwrap();
        assert_eq!(user_plan.all_pack_ids(), BTreeSet::from([1, 2, 3]));
    }

    #[test]
    fn test_percent_out_of_range() {
        let can = canisters(&[]);
        let err = ManualFillOptimizer::new()
            .optimise(&create_test_input(&[], &can, 101))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInput(_)));
    }
}
