// ==========================================
// 药盒分装排产系统 - 人工分装人员分配
// ==========================================
// 职责: 按人员工时把人工药盒分给各人员，按日期输出人员负载
// 规则:
// - 人员配额 = ceil(药盒总数 × 人员工时 / 工时合计)
// - 每个日期: 整机构优先 (药盒数降序，首个放得下的人员)
// - 放不下的机构拆成患者簇，按剩余配额最大堆分配 (LPT)
// - 无交付日期的药盒按患者分给当前药盒最少的人员
// ==========================================

use crate::domain::capacity::WorkingTime;
use crate::domain::overload::ManualUserLoad;
use crate::domain::pack::{FacilityId, Pack, PackId, PatientId, UserId};
use crate::domain::zone::ManualUser;
use crate::engine::error::{SchedulerError, SchedulerResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use tracing::{debug, instrument};

/// 最长处理时间优先分配
///
/// 簇按大小降序依次交给剩余容量最大的人员 (并列取 id 小者)，人员剩余容量随之扣减
///
/// # 参数
/// - clusters: (簇标识, 大小)
/// - remaining: 人员 -> 剩余容量，可为负
///
/// # 返回
/// - 人员 -> 分到的簇 (按分配顺序)
pub fn lpt_assign<K: Clone>(
    clusters: &[(K, usize)],
    remaining: &BTreeMap<UserId, i64>,
) -> BTreeMap<UserId, Vec<K>> {
    let mut result: BTreeMap<UserId, Vec<K>> = BTreeMap::new();
    if remaining.is_empty() {
        return result;
    }

    let mut heap: BinaryHeap<(i64, Reverse<UserId>)> = remaining
        .iter()
        .map(|(user, capacity)| (*capacity, Reverse(*user)))
        .collect();

    let mut order: Vec<&(K, usize)> = clusters.iter().collect();
    order.sort_by_key(|(_, size)| Reverse(*size));

    for (key, size) in order {
        let Some((capacity, Reverse(user))) = heap.pop() else {
            break;
        };
        result.entry(user).or_default().push(key.clone());
        heap.push((capacity - *size as i64, Reverse(user)));
    }
    result
}

// ==========================================
// ManualUserPlan - 人员分配结果
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ManualUserPlan {
    pub by_user_date: BTreeMap<UserId, BTreeMap<NaiveDate, ManualUserLoad>>,
    pub undated: BTreeMap<UserId, BTreeSet<PackId>>,
}

impl ManualUserPlan {
    /// 人员分到的药盒总数 (含无日期药盒)
    pub fn pack_count(&self, user: UserId) -> usize {
        let dated: usize = self
            .by_user_date
            .get(&user)
            .map_or(0, |dates| dates.values().map(|l| l.pack_ids.len()).sum());
        dated + self.undated.get(&user).map_or(0, |p| p.len())
    }

    pub fn all_pack_ids(&self) -> BTreeSet<PackId> {
        self.by_user_date
            .values()
            .flat_map(|dates| dates.values().flat_map(|l| l.pack_ids.iter().copied()))
            .chain(self.undated.values().flat_map(|p| p.iter().copied()))
            .collect()
    }
}

// ==========================================
// ManualUserDistributor - 人员分配引擎
// ==========================================
pub struct ManualUserDistributor {}

impl ManualUserDistributor {
    pub fn new() -> Self {
        Self {}
    }

    /// 人员配额
    pub fn user_split(&self, users: &[ManualUser], pack_count: usize) -> SchedulerResult<BTreeMap<UserId, i64>> {
        if users.is_empty() {
            return Err(SchedulerError::InvalidInput("未选择人工分装人员".to_string()));
        }
        let total_hours: u64 = users.iter().map(|u| u.hours as u64).sum();
        if total_hours == 0 {
            return Err(SchedulerError::InvalidInput("人工分装人员工时合计为 0".to_string()));
        }
        Ok(users
            .iter()
            .map(|u| {
                let share = (pack_count as u64 * u.hours as u64).div_ceil(total_hours);
                (u.user_id, share as i64)
            })
            .collect())
    }

    /// 分配人工药盒
    ///
    /// # 参数
    /// - users: 人员及工时
    /// - packs: 待分配药盒 (同一患者的药盒视为一簇)
    /// - manual_per_hour: 人工每小时药盒数，用于折算额外工时
    #[instrument(skip_all, fields(users = users.len(), packs = packs.len()))]
    pub fn distribute(
        &self,
        users: &[ManualUser],
        packs: &[&Pack],
        manual_per_hour: u32,
    ) -> SchedulerResult<ManualUserPlan> {
        let split = self.user_split(users, packs.len())?;
        let mut assigned: BTreeMap<UserId, i64> = split.keys().map(|u| (*u, 0)).collect();
        let mut plan = ManualUserPlan::default();

        // 1. 患者维度: 药盒、机构、日期 (患者取最早交付日期)
        let mut patient_packs: BTreeMap<PatientId, BTreeSet<PackId>> = BTreeMap::new();
        let mut patient_facility: BTreeMap<PatientId, FacilityId> = BTreeMap::new();
        let mut patient_date: BTreeMap<PatientId, NaiveDate> = BTreeMap::new();
        for pack in packs {
            patient_packs.entry(pack.patient_id).or_default().insert(pack.pack_id);
            patient_facility.entry(pack.patient_id).or_insert(pack.facility_id);
            if let Some(date) = pack.delivery_date {
                patient_date
                    .entry(pack.patient_id)
                    .and_modify(|d| *d = (*d).min(date))
                    .or_insert(date);
            }
        }
        let mut datewise: BTreeMap<NaiveDate, Vec<PatientId>> = BTreeMap::new();
        let mut undated_patients: Vec<PatientId> = Vec::new();
        for patient in patient_packs.keys() {
            match patient_date.get(patient) {
                Some(date) => datewise.entry(*date).or_default().push(*patient),
                None => undated_patients.push(*patient),
            }
        }

        // 2. 按日期分配
        for (date, patients) in &datewise {
            let mut day_load: BTreeMap<UserId, BTreeSet<PackId>> =
                split.keys().map(|u| (*u, BTreeSet::new())).collect();

            let mut facility_packs: BTreeMap<FacilityId, Vec<PatientId>> = BTreeMap::new();
            for patient in patients {
                let facility = patient_facility.get(patient).copied().unwrap_or_default();
                facility_packs.entry(facility).or_default().push(*patient);
            }
            let facility_size = |members: &Vec<PatientId>| -> usize {
                members.iter().map(|p| patient_packs.get(p).map_or(0, |s| s.len())).sum()
            };
            let mut facilities: Vec<(FacilityId, usize)> = facility_packs
                .iter()
                .map(|(f, members)| (*f, facility_size(members)))
                .collect();
            facilities.sort_by_key(|(_, size)| Reverse(*size));

            let remaining_of = |assigned: &BTreeMap<UserId, i64>, day_load: &BTreeMap<UserId, BTreeSet<PackId>>| {
                split
                    .iter()
                    .map(|(u, quota)| {
                        let used = assigned.get(u).copied().unwrap_or(0)
                            + day_load.get(u).map_or(0, |s| s.len() as i64);
                        (*u, quota - used)
                    })
                    .collect::<BTreeMap<UserId, i64>>()
            };

            // 2.1 整机构
            let mut leftover: Vec<PatientId> = Vec::new();
            for (facility, size) in facilities {
                let remaining = remaining_of(&assigned, &day_load);
                let mut user_order: Vec<(UserId, i64)> = remaining.into_iter().collect();
                user_order.sort_by_key(|(u, r)| (Reverse(*r), *u));

                let members = &facility_packs[&facility];
                match user_order.iter().find(|(_, r)| size as i64 <= *r) {
                    Some((user, _)) => {
                        let load = day_load.entry(*user).or_default();
                        for patient in members {
                            if let Some(ids) = patient_packs.get(patient) {
                                load.extend(ids.iter().copied());
                            }
                        }
                    }
                    None => leftover.extend(members.iter().copied()),
                }
            }

            // 2.2 剩余患者簇
            if !leftover.is_empty() {
                let clusters: Vec<(PatientId, usize)> = leftover
                    .iter()
                    .map(|p| (*p, patient_packs.get(p).map_or(0, |s| s.len())))
                    .collect();
                let remaining = remaining_of(&assigned, &day_load);
                for (user, patients) in lpt_assign(&clusters, &remaining) {
                    let load = day_load.entry(user).or_default();
                    for patient in patients {
                        if let Some(ids) = patient_packs.get(&patient) {
                            load.extend(ids.iter().copied());
                        }
                    }
                }
                debug!(date = %date, leftover = leftover.len(), "患者簇按剩余配额分配");
            }

            for (user, pack_ids) in day_load {
                if pack_ids.is_empty() {
                    continue;
                }
                *assigned.entry(user).or_insert(0) += pack_ids.len() as i64;
                let extra = WorkingTime::for_packs(pack_ids.len(), manual_per_hour);
                plan.by_user_date.entry(user).or_default().insert(
                    *date,
                    ManualUserLoad {
                        pack_ids,
                        extra_working_hours: extra,
                    },
                );
            }
        }

        // 3. 无交付日期
        for patient in undated_patients {
            let user = users
                .iter()
                .map(|u| u.user_id)
                .min_by_key(|u| (plan.pack_count(*u), *u));
            if let (Some(user), Some(ids)) = (user, patient_packs.get(&patient)) {
                plan.undated.entry(user).or_default().extend(ids.iter().copied());
            }
        }

        Ok(plan)
    }
}

impl Default for ManualUserDistributor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pack::{DrugKey, SlotDrug};

    // 测试辅助函数
    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn create_test_packs(first_id: PackId, patient: PatientId, facility: FacilityId, count: usize, day: Option<u32>) -> Vec<Pack> {
        (0..count)
            .map(|i| Pack {
                pack_id: first_id + i as i64,
                patient_id: patient,
                facility_id: facility,
                delivery_date: day.map(d),
                slots: BTreeMap::from([(
                    0,
                    vec![SlotDrug {
                        drug: DrugKey::new("A", "1"),
                        quantity: 1.0,
                        alternate_allowed: false,
                    }],
                )]),
            })
            .collect()
    }

    fn user(user_id: UserId, hours: u32) -> ManualUser {
        ManualUser { user_id, hours }
    }

    #[test]
    fn test_lpt_largest_cluster_to_most_remaining() {
        let remaining = BTreeMap::from([(1, 10), (2, 6)]);
        let clusters = vec![("a", 3), ("b", 7), ("c", 5), ("d", 2)];
        let result = lpt_assign(&clusters, &remaining);

        // b(7) -> 1 (10->3); c(5) -> 2 (6->1); a(3) -> 1 (3->0); d(2) -> 2 (1->-1)
        assert_eq!(result[&1], vec!["b", "a"]);
        assert_eq!(result[&2], vec!["c", "d"]);
    }

    #[test]
    fn test_lpt_ties_go_to_lower_user_id() {
        let remaining = BTreeMap::from([(5, 4), (3, 4)]);
        let result = lpt_assign(&[("x", 1)], &remaining);
        assert_eq!(result[&3], vec!["x"]);
        assert!(!result.contains_key(&5));
    }

    #[test]
    fn test_lpt_empty_inputs() {
        let result = lpt_assign::<&str>(&[], &BTreeMap::from([(1, 4)]));
        assert!(result.is_empty());
        let result = lpt_assign(&[("x", 1)], &BTreeMap::new());
        assert!(result.is_empty());
    }

    #[test]
    fn test_user_split_proportional_to_hours() {
        let split = ManualUserDistributor::new()
            .user_split(&[user(1, 8), user(2, 4)], 10)
            .unwrap();
        // ceil(10×8/12)=7, ceil(10×4/12)=4
        assert_eq!(split[&1], 7);
        assert_eq!(split[&2], 4);
    }

    #[test]
    fn test_no_users_is_invalid() {
        let err = ManualUserDistributor::new().distribute(&[], &[], 10).unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInput(_)));
        let err = ManualUserDistributor::new()
            .user_split(&[user(1, 0)], 3)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInput(_)));
    }

    #[test]
    fn test_whole_facilities_first_then_patient_clusters() {
        let packs = [
            create_test_packs(100, 1, 10, 6, Some(2)), // 机构 10: 6 盒
            create_test_packs(200, 2, 20, 3, Some(2)), // 机构 20: 3+3 盒
            create_test_packs(300, 3, 20, 3, Some(2)),
        ]
        .concat();
        let refs: Vec<&Pack> = packs.iter().collect();
        let plan = ManualUserDistributor::new()
            .distribute(&[user(1, 8), user(2, 8)], &refs, 6)
            .unwrap();

        // 配额各 6: 两机构同为 6 盒，机构 10 先给用户 1，机构 20 给用户 2
        let day1 = &plan.by_user_date[&1][&d(2)];
        let day2 = &plan.by_user_date[&2][&d(2)];
        assert_eq!(day1.pack_ids, (100..106).collect::<BTreeSet<_>>());
        assert!(day2.pack_ids.contains(&200) && day2.pack_ids.contains(&300));
        assert_eq!(day2.pack_ids.len(), 6);
        assert_eq!(day1.extra_working_hours, WorkingTime { hours: 1, minutes: 0 });
        assert_eq!(plan.all_pack_ids().len(), 12);
    }

    #[test]
    fn test_oversized_facility_split_by_patient() {
        let packs = [
            create_test_packs(100, 1, 10, 4, Some(2)),
            create_test_packs(200, 2, 10, 4, Some(2)),
            create_test_packs(300, 3, 10, 4, Some(2)),
        ]
        .concat();
        let refs: Vec<&Pack> = packs.iter().collect();
        let plan = ManualUserDistributor::new()
            .distribute(&[user(1, 4), user(2, 4)], &refs, 10)
            .unwrap();

        // 机构 12 盒放不下任何人 (配额 6)，按患者 4/4/4 分配
        assert_eq!(plan.pack_count(1), 8);
        assert_eq!(plan.pack_count(2), 4);
        assert_eq!(plan.all_pack_ids().len(), 12);
    }

    #[test]
    fn test_undated_packs_go_to_least_loaded_user() {
        let packs = [
            create_test_packs(100, 1, 10, 5, Some(2)),
            create_test_packs(200, 2, 20, 2, None),
        ]
        .concat();
        let refs: Vec<&Pack> = packs.iter().collect();
        let plan = ManualUserDistributor::new()
            .distribute(&[user(1, 8), user(2, 8)], &refs, 10)
            .unwrap();

        let dated_user = if plan.by_user_date.contains_key(&1) { 1 } else { 2 };
        let other = 3 - dated_user;
        assert_eq!(plan.undated[&other], BTreeSet::from([200, 201]));
        assert_eq!(plan.all_pack_ids().len(), 7);
    }
}
