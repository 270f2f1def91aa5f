// ==========================================
// 药盒分装排产系统 - 引擎编排器
// ==========================================
// 用途: 协调聚合、拆分、多批次推荐的执行顺序
// 流程:
// 1. 读取配置 (缺失即致命，分配前报错)
// 2. 聚合药盒为患者/机构单元
// 3. 区域按首台设备 AUTOMATIC_PER_HOUR 降序，逐区域: 拆分 -> 批次推荐
// 4. 无待排单元时提前结束；最后一次拆分的人工/超载即最终结果
// ==========================================

use crate::config::{SchedulerConfig, SettingsReader, SystemTimings};
use crate::domain::batch::Batch;
use crate::domain::capacity::ExtraHoursOwner;
use crate::domain::overload::OverloadHoursSummary;
use crate::domain::pack::{PackId, SystemId, UnitKey, ZoneId};
use crate::domain::request::SchedulingRequest;
use crate::domain::split::{SortedEntry, SplitInfo};
use crate::domain::zone::Zone;
use crate::engine::aggregator::{AggregatedData, PatientAggregator};
use crate::engine::calendar::CapacityCalendar;
use crate::engine::error::{SchedulerError, SchedulerResult};
use crate::engine::multi_batch::{BatchPlanInput, MultiBatchRecommender};
use crate::engine::overload::summary_hours;
use crate::engine::split_recommender::SplitRecommender;
use chrono::NaiveDate;
use serde::Serialize;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use uuid::Uuid;

// ==========================================
// ZoneSchedule - 单区域排产结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct ZoneSchedule {
    pub zone_id: ZoneId,
    pub system_id: SystemId,
    pub split: SplitInfo,
    pub sorted_entries: Vec<SortedEntry>,
    pub batches: Vec<Batch>,
    pub next_start: Option<NaiveDate>, // 该设备下一批次可开始日期
}

// ==========================================
// ScheduleOutcome - 排产结果
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct ScheduleOutcome {
    pub run_id: String,
    pub company_id: i64,
    pub today: NaiveDate,

    // 各区域 (按处理顺序)
    pub zones: Vec<ZoneSchedule>,

    // 全部区域后仍未进入自动设备的单元
    pub manual_units: Vec<UnitKey>,
    pub manual_packs: Vec<PackId>,
    pub overloaded_units: Vec<UnitKey>,
    pub overloaded_packs: Vec<PackId>,
    pub overloaded_datewise: BTreeMap<NaiveDate, BTreeSet<PackId>>,
    pub overload_hours: OverloadHoursSummary,
}

impl ScheduleOutcome {
    pub fn batches(&self) -> impl Iterator<Item = &Batch> {
        self.zones.iter().flat_map(|z| z.batches.iter())
    }

    pub fn automatic_pack_count(&self) -> usize {
        self.batches().map(Batch::pack_count).sum()
    }
}

/// 已解析的区域资源
struct ZonePlan<'a> {
    zone: &'a Zone,
    system_id: SystemId,
    timings: SystemTimings,
}

// ==========================================
// ScheduleOrchestrator - 引擎编排器
// ==========================================
pub struct ScheduleOrchestrator<S>
where
    S: SettingsReader,
{
    settings: Arc<S>,
    aggregator: PatientAggregator,
    splitter: SplitRecommender,
    batcher: MultiBatchRecommender,
}

impl<S> ScheduleOrchestrator<S>
where
    S: SettingsReader,
{
    /// 创建编排器
    ///
    /// # 参数
    /// - settings: 设置读取器
    pub fn new(settings: Arc<S>) -> Self {
        Self {
            settings,
            aggregator: PatientAggregator::new(),
            splitter: SplitRecommender::new(),
            batcher: MultiBatchRecommender::new(),
        }
    }

    /// 执行一次完整排产
    ///
    /// # 返回
    /// - Err(Configuration): 设备/人工工时设置缺失或无效
    /// - Err(InvalidInput): 未提供区域，或区域没有设备
    /// - Err(InsufficientData): 严格模式下存在无交付日期的单元
    #[instrument(skip_all, fields(company_id = request.company_id, packs = request.packs.len(), zones = request.zones.len()))]
    pub fn run(&self, request: &SchedulingRequest) -> SchedulerResult<ScheduleOutcome> {
        let run_id = Uuid::new_v4().to_string();
        info!(run_id = %run_id, today = %request.today, "开始排产");

        // ==========================================
        // 步骤1: 配置
        // ==========================================
        let config = self.settings.scheduler_config()?;
        let manual_timings = self.settings.manual_timings()?;
        let zone_plans = self.resolve_zones(&request.zones)?;

        // ==========================================
        // 步骤2: 聚合
        // ==========================================
        let data = self
            .aggregator
            .aggregate(&request.packs, &request.zones, &request.alternates, &config)?;
        let horizon = data
            .units
            .values()
            .filter_map(|u| u.fill_date)
            .max()
            .unwrap_or(request.today)
            .max(request.today);

        let manual_calendar = CapacityCalendar::new(
            manual_timings.team(request.manual_users.len()),
            self.settings
                .extra_hours(ExtraHoursOwner::ManualTeam, request.today, horizon)?,
        );

        // ==========================================
        // 步骤3: 逐区域拆分 + 批次推荐
        // ==========================================
        let mut pending: Vec<UnitKey> = data.units.keys().copied().collect();
        let mut zones = Vec::new();
        let mut last_split: Option<SplitInfo> = None;

        for plan in &zone_plans {
            if pending.is_empty() {
                debug!(zone_id = plan.zone.zone_id, "无待排单元，结束区域循环");
                break;
            }
            let (schedule, still_pending) = self.schedule_zone(
                plan,
                &pending,
                &data,
                &manual_calendar,
                request,
                &config,
                horizon,
            )?;
            pending = still_pending;
            last_split = Some(schedule.split.clone());
            zones.push(schedule);
        }

        // ==========================================
        // 步骤4: 汇总
        // ==========================================
        let remaining = if pending.is_empty() { None } else { last_split };
        let split = remaining.unwrap_or_default();
        let systems: Vec<(SystemId, SystemTimings)> =
            zone_plans.iter().map(|p| (p.system_id, p.timings)).collect();
        let overload_hours = summary_hours(split.overloaded_packs.len(), Some(&manual_timings), &systems);

        let outcome = ScheduleOutcome {
            run_id,
            company_id: request.company_id,
            today: request.today,
            zones,
            manual_units: split.manual_units,
            manual_packs: split.manual_packs,
            overloaded_units: split.overloaded_units,
            overloaded_packs: split.overloaded_packs,
            overloaded_datewise: split.overloaded_datewise,
            overload_hours,
        };

        info!(
            run_id = %outcome.run_id,
            batches = outcome.batches().count(),
            automatic_packs = outcome.automatic_pack_count(),
            manual_packs = outcome.manual_packs.len(),
            overloaded_packs = outcome.overloaded_packs.len(),
            "排产完成"
        );
        Ok(outcome)
    }

    /// 读取各区域首台设备配置，按 AUTOMATIC_PER_HOUR 降序 (相同保持输入顺序)
    ///
    /// # 返回
    /// - Err(InvalidInput): 区域没有设备，或两个区域共用同一首台设备
    fn resolve_zones<'a>(&self, zones: &'a [Zone]) -> SchedulerResult<Vec<ZonePlan<'a>>> {
        if zones.is_empty() {
            return Err(SchedulerError::InvalidInput("未提供任何区域".to_string()));
        }
        let mut plans = Vec::with_capacity(zones.len());
        let mut seen_systems = BTreeSet::new();
        for zone in zones {
            let system_id = zone.primary_system().ok_or_else(|| {
                SchedulerError::InvalidInput(format!("区域 {} 没有自动设备", zone.zone_id))
            })?;
            // 同一设备的日历产能只能分配一次
            if !seen_systems.insert(system_id) {
                return Err(SchedulerError::InvalidInput(format!(
                    "设备 {} 同时是多个区域的首台设备",
                    system_id
                )));
            }
            let timings = self.settings.system_timings(system_id)?;
            plans.push(ZonePlan {
                zone,
                system_id,
                timings,
            });
        }
        plans.sort_by_key(|p| Reverse(p.timings.automatic.per_hour));
        Ok(plans)
    }

    /// 单区域: 拆分 -> 批次推荐
    ///
    /// # 返回
    /// - (区域结果, 仍待排单元)
    #[allow(clippy::too_many_arguments)]
    fn schedule_zone(
        &self,
        plan: &ZonePlan<'_>,
        pending: &[UnitKey],
        data: &AggregatedData,
        manual_calendar: &CapacityCalendar,
        request: &SchedulingRequest,
        config: &SchedulerConfig,
        horizon: NaiveDate,
    ) -> SchedulerResult<(ZoneSchedule, Vec<UnitKey>)> {
        let calendar = CapacityCalendar::new(
            plan.timings.automatic,
            self.settings
                .extra_hours(ExtraHoursOwner::System(plan.system_id), request.today, horizon)?,
        );

        let recommendation = self.splitter.get_split_recommendations(
            plan.zone,
            pending,
            data,
            &calendar,
            manual_calendar,
            request.today,
        );

        let units = recommendation.sorted_automatic_units();
        let first_start = calendar.first_batch_start_date(
            request.today,
            request.system_end_dates.get(&plan.system_id).copied(),
        );
        let batches = self.batcher.recommend(&BatchPlanInput {
            zone: plan.zone,
            units: &units,
            data,
            calendar: &calendar,
            timings: &plan.timings,
            region_capacity: &recommendation.automatic_region_capacity,
            first_start,
            first_batch_no: 1,
            config,
        });

        info!(
            zone_id = plan.zone.zone_id,
            system_id = plan.system_id,
            batches = batches.batches.len(),
            still_pending = recommendation.still_pending.len(),
            "区域排产完成"
        );

        let schedule = ZoneSchedule {
            zone_id: plan.zone.zone_id,
            system_id: plan.system_id,
            split: recommendation.split_info,
            sorted_entries: recommendation.sorted_entries,
            batches: batches.batches,
            next_start: batches.next_start,
        };
        Ok((schedule, recommendation.still_pending))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StaticSettings;
    use crate::domain::pack::{DrugKey, Pack, SlotDrug};
    use crate::domain::zone::ManualUser;
    use std::collections::HashMap;

    // 测试辅助函数
    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn create_test_system_settings(per_hour: u32, per_day_hours: u32) -> HashMap<String, String> {
        HashMap::from([
            ("AUTOMATIC_PER_HOUR".to_string(), per_hour.to_string()),
            ("AUTOMATIC_PER_DAY_HOURS".to_string(), per_day_hours.to_string()),
            ("AUTOMATIC_SATURDAY_HOURS".to_string(), "0".to_string()),
            ("AUTOMATIC_SUNDAY_HOURS".to_string(), "0".to_string()),
            ("BATCH_DURATION_IN_DAYS".to_string(), "1".to_string()),
            ("MFD_CANISTER_THRESHOLD_PER_HOUR".to_string(), "100".to_string()),
        ])
    }

    fn create_test_manual_settings(per_hour: u32) -> HashMap<String, String> {
        HashMap::from([
            ("MANUAL_PER_HOUR".to_string(), per_hour.to_string()),
            ("MANUAL_PER_DAY_HOURS".to_string(), "8".to_string()),
            ("MANUAL_SATURDAY_HOURS".to_string(), "0".to_string()),
            ("MANUAL_SUNDAY_HOURS".to_string(), "0".to_string()),
        ])
    }

    fn create_test_zone(zone_id: ZoneId, system_id: SystemId, canisters: &[&str]) -> Zone {
        Zone {
            zone_id,
            system_ids: vec![system_id],
            canister_drugs: canisters.iter().map(|n| DrugKey::new(*n, "T")).collect(),
            quadrant_canister_capacity: 10,
            quadrant_count: 4,
        }
    }

    fn create_test_pack(pack_id: PackId, patient_id: i64, day: u32, ndc: &str) -> Pack {
        Pack {
            pack_id,
            patient_id,
            facility_id: 1,
            delivery_date: Some(d(day)),
            slots: BTreeMap::from([(
                0,
                vec![SlotDrug {
                    drug: DrugKey::new(ndc, "T"),
                    quantity: 1.0,
                    alternate_allowed: false,
                }],
            )]),
        }
    }

    fn create_test_request(packs: Vec<Pack>, zones: Vec<Zone>) -> SchedulingRequest {
        SchedulingRequest {
            company_id: 3,
            today: d(1), // 周一
            packs,
            zones,
            alternates: vec![],
            manual_users: vec![ManualUser { user_id: 1, hours: 8 }],
            system_end_dates: BTreeMap::new(),
        }
    }

    #[test]
    fn test_missing_system_settings_is_fatal() {
        let settings = StaticSettings::new().with_manual(create_test_manual_settings(1));
        let orchestrator = ScheduleOrchestrator::new(Arc::new(settings));
        let request = create_test_request(vec![create_test_pack(1, 1, 3, "A")], vec![create_test_zone(1, 10, &["A"])]);

        let err = orchestrator.run(&request).unwrap_err();
        assert!(matches!(err, SchedulerError::Configuration { .. }));
    }

    #[test]
    fn test_zone_without_system_is_invalid() {
        let settings = StaticSettings::new().with_manual(create_test_manual_settings(1));
        let orchestrator = ScheduleOrchestrator::new(Arc::new(settings));
        let mut zone = create_test_zone(1, 10, &["A"]);
        zone.system_ids.clear();

        let err = orchestrator
            .run(&create_test_request(vec![create_test_pack(1, 1, 3, "A")], vec![zone]))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInput(_)));
    }

    #[test]
    fn test_zones_sharing_primary_system_are_invalid() {
        let settings = StaticSettings::new()
            .with_system(10, create_test_system_settings(10, 8))
            .with_manual(create_test_manual_settings(1));
        let orchestrator = ScheduleOrchestrator::new(Arc::new(settings));
        let zones = vec![create_test_zone(1, 10, &["A"]), create_test_zone(2, 10, &["A"])];

        let err = orchestrator
            .run(&create_test_request(vec![create_test_pack(1, 1, 3, "A")], zones))
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InvalidInput(ref msg) if msg.contains("设备 10")));
    }

    #[test]
    fn test_all_units_fit_first_zone() {
        let settings = StaticSettings::new()
            .with_system(10, create_test_system_settings(10, 8))
            .with_manual(create_test_manual_settings(1));
        let orchestrator = ScheduleOrchestrator::new(Arc::new(settings));
        let packs = vec![
            create_test_pack(1, 1, 3, "A"),
            create_test_pack(2, 2, 4, "A"),
            create_test_pack(3, 3, 5, "A"),
        ];
        let request = create_test_request(packs, vec![create_test_zone(1, 10, &["A"])]);

        let outcome = orchestrator.run(&request).unwrap();

        assert_eq!(outcome.zones.len(), 1);
        assert_eq!(outcome.automatic_pack_count(), 3);
        assert!(outcome.manual_packs.is_empty());
        assert!(outcome.overloaded_packs.is_empty());
        assert_eq!(outcome.overload_hours.overloaded_pack_count, 0);
        assert!(!outcome.run_id.is_empty());
    }

    #[test]
    fn test_faster_zone_runs_first_and_loop_stops_when_nothing_pending() {
        let settings = StaticSettings::new()
            .with_system(10, create_test_system_settings(5, 8))
            .with_system(20, create_test_system_settings(50, 8))
            .with_manual(create_test_manual_settings(1));
        let orchestrator = ScheduleOrchestrator::new(Arc::new(settings));
        let packs = vec![create_test_pack(1, 1, 3, "A"), create_test_pack(2, 2, 4, "A")];
        let request = create_test_request(
            packs,
            vec![create_test_zone(1, 10, &["A"]), create_test_zone(2, 20, &["A"])],
        );

        let outcome = orchestrator.run(&request).unwrap();

        assert_eq!(outcome.zones.len(), 1);
        assert_eq!(outcome.zones[0].system_id, 20);
    }

    #[test]
    fn test_leftover_units_become_manual_or_overloaded() {
        // 自动 1 盒/小时 × 1 小时，人工 1 盒/小时 × 8 小时
        let settings = StaticSettings::new()
            .with_system(10, create_test_system_settings(1, 1))
            .with_manual(create_test_manual_settings(1));
        let orchestrator = ScheduleOrchestrator::new(Arc::new(settings));
        let packs: Vec<Pack> = (1..=30).map(|i| create_test_pack(i, i, 2, "A")).collect();
        let request = create_test_request(packs, vec![create_test_zone(1, 10, &["A"])]);

        let outcome = orchestrator.run(&request).unwrap();

        let automatic = outcome.automatic_pack_count();
        let manual = outcome.manual_packs.len();
        let overloaded = outcome.overloaded_packs.len();
        assert_eq!(automatic + manual + overloaded, 30);
        assert!(overloaded > 0);
        assert_eq!(outcome.overload_hours.overloaded_pack_count, overloaded);
        assert!(outcome.overloaded_datewise.contains_key(&d(2)));
    }
}
