// ==========================================
// 药盒分装排产系统 - 超载药盒分配
// ==========================================
// 职责: 把超出总产能的药盒分给所选自动设备和/或人工人员，折算额外工时
// 流程:
// 1. 按患者取最早交付日期，得到日期 -> 药盒
// 2. 日期平滑: 超载日期的最大者摊到其后的空闲日期
// 3. 自动: 每个日期内轮转分给各设备
// 4. 人工: 团队按日期汇总 + 按工时配额分到人员
// 5. 混合: 按患者把前 ceil(总数 × 自动占比%) 盒给自动，其余给人工
// ==========================================

use crate::config::timings::timing_keys::MANUAL_PER_HOUR;
use crate::config::timings::{ManualTimings, SystemTimings};
use crate::domain::capacity::WorkingTime;
use crate::domain::overload::{
    AutomaticOverloadEntry, ManualOverloadEntry, OverloadDistribution, OverloadHoursSummary,
};
use crate::domain::pack::{Pack, PackId, PatientId, SystemId};
use crate::domain::types::OverloadDistributionType;
use crate::domain::zone::ManualUser;
use crate::engine::error::{SchedulerError, SchedulerResult};
use crate::engine::manual_users::ManualUserDistributor;
use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// 日期 -> 药盒 (有序)
pub type DatewisePacks = BTreeMap<NaiveDate, Vec<PackId>>;

// ==========================================
// OverloadResources - 可用于消化超载的资源
// ==========================================
#[derive(Debug, Clone, Copy)]
pub struct OverloadResources<'a> {
    pub systems: &'a [(SystemId, SystemTimings)],
    pub users: &'a [ManualUser],
    pub manual: Option<&'a ManualTimings>, // 选择人工人员时必需
    pub automatic_share_percent: u32,
}

impl OverloadResources<'_> {
    pub fn distribution_type(&self) -> Option<OverloadDistributionType> {
        match (!self.systems.is_empty(), !self.users.is_empty()) {
            (true, false) => Some(OverloadDistributionType::Automatic),
            (false, true) => Some(OverloadDistributionType::Manual),
            (true, true) => Some(OverloadDistributionType::Both),
            (false, false) => None,
        }
    }

    fn manual_per_hour(&self) -> SchedulerResult<u32> {
        self.manual
            .map(|m| m.per_user.per_hour)
            .ok_or_else(|| SchedulerError::configuration(MANUAL_PER_HOUR, "已选人工人员但缺少人工工时配置"))
    }
}

/// 按患者归并药盒: 患者取其药盒的最早交付日期
///
/// # 返回
/// - (日期 -> 药盒, 无交付日期药盒)
pub fn group_by_delivery_date(packs: &[&Pack], schedule_dates: &[NaiveDate]) -> (DatewisePacks, Vec<PackId>) {
    let mut datewise: DatewisePacks = schedule_dates.iter().map(|d| (*d, Vec::new())).collect();
    let mut undated = Vec::new();

    for patient_packs in by_patient(packs).values() {
        let date = patient_packs.iter().filter_map(|p| p.delivery_date).min();
        let ids = patient_packs.iter().map(|p| p.pack_id);
        match date {
            Some(date) => datewise.entry(date).or_default().extend(ids),
            None => undated.extend(ids),
        }
    }
    (datewise, undated)
}

fn by_patient<'a>(packs: &[&'a Pack]) -> BTreeMap<PatientId, Vec<&'a Pack>> {
    let mut patients: BTreeMap<PatientId, Vec<&Pack>> = BTreeMap::new();
    for pack in packs {
        patients.entry(pack.patient_id).or_default().push(pack);
    }
    for list in patients.values_mut() {
        list.sort_by_key(|p| p.pack_id);
    }
    patients
}

/// 日期平滑
///
/// 连续超载日期 + 其后连续空闲日期构成一段；段内药盒最多的日期 (并列取最早)
/// 按 ceil(m / (k+1)) 切块，首块留在原日期，其余依次放到 k 个空闲日期。
/// 药盒只移动不增减。
pub fn smooth_dates(datewise: &DatewisePacks) -> DatewisePacks {
    let dates: Vec<NaiveDate> = datewise.keys().copied().collect();
    let is_empty = |date: &NaiveDate| datewise.get(date).map_or(true, |p| p.is_empty());
    let mut smoothed = datewise.clone();

    let mut i = 0;
    while i < dates.len() {
        if is_empty(&dates[i]) {
            i += 1;
            continue;
        }
        let busy_start = i;
        while i < dates.len() && !is_empty(&dates[i]) {
            i += 1;
        }
        let busy = &dates[busy_start..i];
        let idle_start = i;
        while i < dates.len() && is_empty(&dates[i]) {
            i += 1;
        }
        let idle = &dates[idle_start..i];
        if idle.is_empty() {
            continue;
        }

        let Some(busiest) = busy
            .iter()
            .max_by_key(|d| (datewise.get(*d).map_or(0, |p| p.len()), Reverse(**d)))
        else {
            continue;
        };
        let packs = smoothed.remove(busiest).unwrap_or_default();
        let chunk_size = packs.len().div_ceil(idle.len() + 1).max(1);
        let mut chunks = packs.chunks(chunk_size);
        smoothed.insert(*busiest, chunks.next().map(<[PackId]>::to_vec).unwrap_or_default());
        for date in idle {
            smoothed.insert(*date, chunks.next().map(<[PackId]>::to_vec).unwrap_or_default());
        }
    }
    smoothed
}

/// 超载工时估算
///
/// # 返回
/// - 人工: 总数 / MANUAL_PER_HOUR
/// - 各设备: ceil(总数 / 设备数) / 该设备 AUTOMATIC_PER_HOUR
pub fn summary_hours(
    overloaded_pack_count: usize,
    manual: Option<&ManualTimings>,
    systems: &[(SystemId, SystemTimings)],
) -> OverloadHoursSummary {
    let manual_hours = manual
        .filter(|m| m.per_user.per_hour > 0)
        .map_or(0.0, |m| overloaded_pack_count as f64 / m.per_user.per_hour as f64);

    let automatic_hours = if systems.is_empty() {
        BTreeMap::new()
    } else {
        let per_system = overloaded_pack_count.div_ceil(systems.len());
        systems
            .iter()
            .filter(|(_, timings)| timings.automatic.per_hour > 0)
            .map(|(id, timings)| (*id, per_system as f64 / timings.automatic.per_hour as f64))
            .collect()
    };

    OverloadHoursSummary {
        overloaded_pack_count,
        manual_hours,
        automatic_hours,
    }
}

// ==========================================
// OverloadDistributor - 超载分配引擎
// ==========================================
pub struct OverloadDistributor {}

impl OverloadDistributor {
    pub fn new() -> Self {
        Self {}
    }

    /// 分配超载药盒
    ///
    /// # 参数
    /// - packs: 超载药盒
    /// - schedule_dates: 排产日期 (未出现在药盒中的日期作为平滑用的空闲日期)
    /// - resources: 所选设备/人员
    ///
    /// # 返回
    /// - Err(InvalidInput): 未选择任何设备或人员
    #[instrument(skip_all, fields(packs = packs.len(), systems = resources.systems.len(), users = resources.users.len()))]
    pub fn distribute(
        &self,
        packs: &[Pack],
        schedule_dates: &[NaiveDate],
        resources: &OverloadResources<'_>,
    ) -> SchedulerResult<OverloadDistribution> {
        let distribution_type = resources
            .distribution_type()
            .ok_or_else(|| SchedulerError::InvalidInput("未选择自动设备或人工人员".to_string()))?;

        let refs: Vec<&Pack> = packs.iter().collect();
        let (automatic_packs, manual_packs) = match distribution_type {
            OverloadDistributionType::Automatic => (refs, Vec::new()),
            OverloadDistributionType::Manual => (Vec::new(), refs),
            OverloadDistributionType::Both => {
                let quota = (packs.len() * resources.automatic_share_percent as usize).div_ceil(100);
                let mut automatic: Vec<&Pack> = Vec::new();
                let mut manual: Vec<&Pack> = Vec::new();
                for patient_packs in by_patient(&refs).into_values() {
                    if automatic.len() < quota {
                        automatic.extend(patient_packs);
                    } else {
                        manual.extend(patient_packs);
                    }
                }
                (automatic, manual)
            }
        };

        let mut distribution = OverloadDistribution::empty(distribution_type);
        if !automatic_packs.is_empty() {
            self.distribute_automatic(&automatic_packs, schedule_dates, resources, &mut distribution);
        }
        if !manual_packs.is_empty() {
            self.distribute_manual(&manual_packs, schedule_dates, resources, &mut distribution)?;
        }

        info!(
            distribution_type = ?distribution_type,
            automatic = automatic_packs.len(),
            manual = manual_packs.len(),
            unassigned = distribution.unassigned_packs.len(),
            "超载药盒分配完成"
        );
        Ok(distribution)
    }

    fn distribute_automatic(
        &self,
        packs: &[&Pack],
        schedule_dates: &[NaiveDate],
        resources: &OverloadResources<'_>,
        distribution: &mut OverloadDistribution,
    ) {
        let (datewise, undated) = group_by_delivery_date(packs, schedule_dates);
        if !undated.is_empty() {
            warn!(count = undated.len(), "无交付日期的药盒无法分给自动设备");
            distribution.unassigned_packs.extend(undated);
        }

        let systems = resources.systems;
        for (date, pack_ids) in smooth_dates(&datewise) {
            if pack_ids.is_empty() {
                continue;
            }
            let mut per_system: Vec<Vec<PackId>> = vec![Vec::new(); systems.len()];
            for (i, pack_id) in pack_ids.into_iter().enumerate() {
                per_system[i % systems.len()].push(pack_id);
            }
            for ((system_id, timings), ids) in systems.iter().zip(per_system) {
                distribution.automatic.push(AutomaticOverloadEntry {
                    fill_date: date,
                    system_id: *system_id,
                    pack_count: ids.len(),
                    extra_working_hours: WorkingTime::for_packs(ids.len(), timings.automatic.per_hour),
                    pack_ids: ids,
                });
            }
        }
    }

    fn distribute_manual(
        &self,
        packs: &[&Pack],
        schedule_dates: &[NaiveDate],
        resources: &OverloadResources<'_>,
        distribution: &mut OverloadDistribution,
    ) -> SchedulerResult<()> {
        let per_hour = resources.manual_per_hour()?;
        let team_per_hour = per_hour * resources.users.len() as u32;

        let (datewise, _undated) = group_by_delivery_date(packs, schedule_dates);
        for (date, pack_ids) in smooth_dates(&datewise) {
            if pack_ids.is_empty() {
                continue;
            }
            distribution.manual.push(ManualOverloadEntry {
                fill_date: date,
                pack_count: pack_ids.len(),
                extra_working_hours: WorkingTime::for_packs(pack_ids.len(), team_per_hour),
                pack_ids,
            });
        }

        let plan = ManualUserDistributor::new().distribute(resources.users, packs, per_hour)?;
        distribution.manual_user_distribution = plan.by_user_date;
        distribution.undated_manual_packs = plan.undated;
        Ok(())
    }
}

impl Default for OverloadDistributor {
    fn default() -> Self {
        Self::new()
    }
}
