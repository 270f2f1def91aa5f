// ==========================================
// 药盒分装排产系统 - 多批次推荐
// ==========================================
// 职责: 把分配到自动设备的单元切成连续批次，计算每批开始/结束日期与处理时长
// 状态: 载入区间 -> 取单元累加 -> 判定切批 -> (定稿 | 继续) -> ...
// ==========================================
// 切批条件 (任一满足):
// - 罐装药品数落在 [目标, 目标 + 窗口]
// - 处理时长 ≥ 批次天数 × 工作日工时
// - 人工槽位 / 每台 MFD 槽位数 ≥ 批次天数 × 工作日工时 × MFD 阈值
// 终点日仍有待排单元时推迟定稿；队列耗尽时必定稿
// ==========================================

use crate::config::scheduler_config::SchedulerConfig;
use crate::config::timings::SystemTimings;
use crate::domain::batch::Batch;
use crate::domain::capacity::{DateCapacityMap, WorkingTime};
use crate::domain::pack::{DrugKey, PackId, UnitKey};
use crate::domain::types::{CutReason, SortLogic};
use crate::domain::zone::Zone;
use crate::engine::aggregator::AggregatedData;
use crate::engine::batch_context::{BatchAccumulator, SchedulingContext, WorkQueue};
use crate::engine::calendar::CapacityCalendar;
use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, instrument, warn};

/// 切批判定
///
/// # 参数
/// - canister_drugs: 批次罐装药品数
/// - manual_slots: 批次人工槽位数
/// - processing_hours: 批次当前处理时长
/// - timings: 设备配置
/// - target: 罐装药品目标数
/// - config: 目标窗口宽度、每台 MFD 槽位数
///
/// # 返回
/// - 命中的第一个切批原因 (罐装药品 > 时长 > MFD)
pub fn evaluate_cut(
    canister_drugs: usize,
    manual_slots: usize,
    processing_hours: f64,
    timings: &SystemTimings,
    target: usize,
    config: &SchedulerConfig,
) -> Option<CutReason> {
    if (target..=target + config.unique_drug_window).contains(&canister_drugs) {
        return Some(CutReason::UniqueDrugTarget);
    }
    if processing_hours >= timings.batch_duration_hours() {
        return Some(CutReason::DurationLimit);
    }
    let devices = manual_slots / config.mfd_slots_per_device.max(1);
    if devices >= timings.mfd_threshold() {
        return Some(CutReason::MfdThreshold);
    }
    None
}

// ==========================================
// BatchPlanInput - 单区域批次推荐输入
// ==========================================
pub struct BatchPlanInput<'a> {
    pub zone: &'a Zone,
    pub units: &'a [UnitKey], // 已按拆分顺序排列的自动单元
    pub data: &'a AggregatedData,
    pub calendar: &'a CapacityCalendar,
    pub timings: &'a SystemTimings,
    pub region_capacity: &'a DateCapacityMap,
    pub first_start: NaiveDate,
    pub first_batch_no: u32,
    pub config: &'a SchedulerConfig,
}

// ==========================================
// MultiBatchResult - 批次推荐结果
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct MultiBatchResult {
    pub batches: Vec<Batch>,
    pub canister_traces: Vec<Vec<usize>>, // 每批次罐装药品数随加入单元的变化
    pub next_start: Option<NaiveDate>,    // 下一批次可开始日期
}

impl MultiBatchResult {
    pub fn pack_ids(&self) -> Vec<PackId> {
        self.batches.iter().flat_map(|b| b.pack_ids.iter().copied()).collect()
    }
}

// ==========================================
// MultiBatchRecommender - 多批次推荐引擎
// ==========================================
pub struct MultiBatchRecommender {}

impl MultiBatchRecommender {
    pub fn new() -> Self {
        Self {}
    }

    /// 生成批次
    ///
    /// 循环直到队列为空；每个单元恰好进入一个批次
    #[instrument(skip_all, fields(zone_id = input.zone.zone_id, units = input.units.len()))]
    pub fn recommend(&self, input: &BatchPlanInput<'_>) -> MultiBatchResult {
        let mut result = MultiBatchResult::default();
        if input.units.is_empty() {
            return result;
        }

        let unit_dates: BTreeMap<UnitKey, (NaiveDate, i64)> = input
            .units
            .iter()
            .filter_map(|u| {
                input
                    .data
                    .fill_date(u)
                    .map(|d| (*u, (d, input.data.pack_count(u) as i64)))
            })
            .collect();
        if unit_dates.len() < input.units.len() {
            warn!(
                skipped = input.units.len() - unit_dates.len(),
                "自动单元缺少分装日期，已跳过"
            );
        }

        let target = input.zone.unique_drugs_target();
        let canister_set = |unit: &UnitKey| input.data.canister_drugs(unit, input.zone);

        let mut ctx = SchedulingContext::prepare(&unit_dates, input.region_capacity);
        let mut queue = WorkQueue::new(
            input
                .units
                .iter()
                .filter(|u| unit_dates.contains_key(u))
                .copied()
                .collect(),
        );
        let mut batch_no = input.first_batch_no;
        let mut batch_start = input.first_start;
        ctx.load_next_region();

        while !queue.is_empty() {
            ctx.refresh_allowing();

            // 1. 取单元
            let index = match self.pick(&ctx, &queue, &unit_dates) {
                Some(index) => index,
                None => {
                    if ctx.load_next_region() {
                        continue;
                    }
                    // 区间耗尽，按队列顺序取
                    debug!("区间已耗尽，取队首单元");
                    match queue.pending().next() {
                        Some((index, _)) => index,
                        None => break,
                    }
                }
            };
            let Some(unit) = queue.take(index) else {
                break;
            };
            let Some(&(date, _)) = unit_dates.get(&unit) else {
                continue;
            };

            // 2. 累加
            let canister = canister_set(&unit);
            let pack_ids = self.accumulate(&mut ctx.batch, input, &unit, &canister);
            ctx.record_allocation(date, &pack_ids);
            ctx.batch.canister_trace.push(ctx.batch.canister_drugs.len());

            // 3. 切批判定
            let processing_hours = input
                .calendar
                .calculate_processing_hours(ctx.batch.pack_count() as i64, batch_start);
            let cut = evaluate_cut(
                ctx.batch.canister_drugs.len(),
                ctx.batch.manual_slots,
                processing_hours,
                input.timings,
                target,
                input.config,
            );

            if cut.is_some() && input.config.consider_similar_packs {
                self.absorb_similar(&mut ctx, &mut queue, input, &unit_dates);
            }

            // 4. 定稿
            let region_end_pending = ctx.region_end.map_or(false, |end| {
                queue
                    .pending()
                    .any(|(_, u)| unit_dates.get(&u).map(|(d, _)| *d) == Some(end))
            });
            let finalize = queue.is_empty() || (cut.is_some() && !region_end_pending);
            if !finalize {
                if cut.is_some() {
                    debug!(batch_no, "区间终点日仍有单元，推迟切批");
                }
                continue;
            }

            let reason = cut.unwrap_or(CutReason::QueueExhausted);
            let mut accumulated = ctx.batch.take();
            let trace = std::mem::take(&mut accumulated.canister_trace);
            let previous_drugs = accumulated.canister_drugs.clone();
            let batch = self.finalize(input, accumulated, batch_no, batch_start, reason);
            batch_start = input.calendar.calculate_batch_start_date(batch.end_date);
            result.canister_traces.push(trace);
            result.batches.push(batch);
            batch_no += 1;

            if !queue.is_empty() {
                if let Some(logic) = input.config.batch_reorder {
                    self.reorder(&mut queue, logic, &previous_drugs, &canister_set);
                }
                ctx.load_next_region();
            }
        }

        result.next_start = Some(batch_start);
        info!(batches = result.batches.len(), "多批次推荐完成");
        result
    }

    /// 按区间规则选出下一个单元
    fn pick(
        &self,
        ctx: &SchedulingContext,
        queue: &WorkQueue,
        unit_dates: &BTreeMap<UnitKey, (NaiveDate, i64)>,
    ) -> Option<usize> {
        queue.pending().find_map(|(index, unit)| {
            let (date, packs) = unit_dates.get(&unit)?;
            if ctx.is_allowed(*date) && !ctx.blocks(*date, *packs) {
                Some(index)
            } else {
                None
            }
        })
    }

    /// 单元计入批次累加器，返回其药盒 id
    fn accumulate(
        &self,
        batch: &mut BatchAccumulator,
        input: &BatchPlanInput<'_>,
        unit: &UnitKey,
        canister: &BTreeSet<DrugKey>,
    ) -> Vec<PackId> {
        let data = input.data;
        let zone_id = input.zone.zone_id;
        let zone_drugs = data.zone_drugs(unit, zone_id);
        let old_new = data.zone_old_new.get(&zone_id);

        let mut pack_ids = Vec::new();
        if let Some(unit_data) = data.unit(unit) {
            for pack_id in &unit_data.packs {
                pack_ids.push(*pack_id);
                let Some(pack) = data.packs.get(pack_id) else {
                    continue;
                };
                for drugs in pack.slots.values() {
                    batch.total_slots += 1;
                    let manual = drugs.iter().any(|slot_drug| {
                        let mut drug = &slot_drug.drug;
                        if !zone_drugs.contains(drug) {
                            // 区域内已换成替代药
                            if let Some(alternate) = old_new.and_then(|m| m.get(drug)) {
                                drug = alternate;
                            }
                        }
                        !canister.contains(drug)
                    });
                    if manual {
                        batch.manual_slots += 1;
                    }
                }
            }
        }

        for drug in zone_drugs {
            if canister.contains(drug) {
                batch.canister_drugs.insert(drug.clone());
            } else {
                batch.manual_drugs.insert(drug.clone());
            }
        }

        batch.units.push(*unit);
        batch.pack_ids.extend(pack_ids.iter().copied());
        pack_ids
    }

    /// 吸收药品全部落在批次罐装药品内的剩余单元
    fn absorb_similar(
        &self,
        ctx: &mut SchedulingContext,
        queue: &mut WorkQueue,
        input: &BatchPlanInput<'_>,
        unit_dates: &BTreeMap<UnitKey, (NaiveDate, i64)>,
    ) {
        let candidates: Vec<(usize, UnitKey)> = queue
            .pending()
            .filter(|(_, u)| {
                input
                    .data
                    .zone_drugs(u, input.zone.zone_id)
                    .is_subset(&ctx.batch.canister_drugs)
            })
            .collect();

        for (index, unit) in candidates {
            if queue.take(index).is_none() {
                continue;
            }
            let canister = input.data.canister_drugs(&unit, input.zone);
            self.accumulate(&mut ctx.batch, input, &unit, &canister);
            ctx.batch.canister_trace.push(ctx.batch.canister_drugs.len());
            if let Some((date, packs)) = unit_dates.get(&unit) {
                ctx.record_absorbed(*date, *packs);
            }
            debug!(unit = %unit, "吸收相似单元");
        }
    }

    /// 定稿批次
    fn finalize(
        &self,
        input: &BatchPlanInput<'_>,
        accumulated: BatchAccumulator,
        batch_no: u32,
        start_date: NaiveDate,
        reason: CutReason,
    ) -> Batch {
        let walk = input
            .calendar
            .get_end_date(accumulated.pack_count() as i64, start_date);
        let analysis = accumulated.analysis();

        info!(
            batch_no,
            reason = %reason,
            total_packs = analysis.total_packs,
            total_batch_slots = analysis.total_batch_slots,
            manual_slots = analysis.manual_slots,
            canister_drugs = analysis.canister_drugs,
            manual_drugs = analysis.manual_drugs,
            start_date = %start_date,
            end_date = %walk.end_date,
            "批次定稿"
        );

        Batch {
            batch_no,
            name: Batch::display_name(batch_no, start_date),
            start_date,
            end_date: walk.end_date,
            processing_time: WorkingTime::from_hours(walk.processing_hours),
            units: accumulated.units,
            pack_ids: accumulated.pack_ids,
            analysis,
            cut_reason: Some(reason),
        }
    }

    /// 按上一批次罐装药品重排剩余队列
    fn reorder(
        &self,
        queue: &mut WorkQueue,
        logic: SortLogic,
        previous: &BTreeSet<DrugKey>,
        canister_set: &dyn Fn(&UnitKey) -> BTreeSet<DrugKey>,
    ) {
        match logic {
            SortLogic::Legacy => queue.reorder_by_key(|u| {
                Reverse(canister_set(u).intersection(previous).count())
            }),
            SortLogic::Updated => {
                queue.reorder_by_key(|u| canister_set(u).difference(previous).count())
            }
        }
    }
}

impl Default for MultiBatchRecommender {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::timings::ResourceTimings;
    use crate::domain::capacity::ExtraHoursMap;
    use crate::domain::pack::{Pack, SlotDrug};
    use crate::engine::aggregator::PatientAggregator;

    // 测试辅助函数
    fn d(day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, day).unwrap()
    }

    fn create_test_timings() -> SystemTimings {
        SystemTimings {
            automatic: ResourceTimings {
                per_hour: 10,
                per_day_hours: 10,
                saturday_hours: 0,
                sunday_hours: 0,
            },
            batch_duration_days: 1,
            mfd_canister_threshold_per_hour: 100,
        }
    }

    fn create_test_zone(target_per_quadrant: usize) -> Zone {
        Zone {
            zone_id: 1,
            system_ids: vec![1],
            canister_drugs: (0..100).map(|i| DrugKey::new(format!("C{}", i), "1")).collect(),
            quadrant_canister_capacity: target_per_quadrant,
            quadrant_count: 1,
        }
    }

    /// 患者 patient_id: count 个药盒，每盒一个槽位装入 drugs
    fn create_test_packs(patient_id: i64, count: usize, day: u32, drugs: &[String]) -> Vec<Pack> {
        (0..count)
            .map(|i| {
                let mut slots = BTreeMap::new();
                slots.insert(
                    0,
                    drugs
                        .iter()
                        .map(|ndc| SlotDrug {
                            drug: DrugKey::new(ndc.clone(), "1"),
                            quantity: 1.0,
                            alternate_allowed: false,
                        })
                        .collect(),
                );
                Pack {
                    pack_id: patient_id * 1000 + i as i64,
                    patient_id,
                    facility_id: 1,
                    delivery_date: Some(d(day)),
                    slots,
                }
            })
            .collect()
    }

    fn canister(range: std::ops::Range<usize>) -> Vec<String> {
        range.map(|i| format!("C{}", i)).collect()
    }

    fn run(
        packs: &[Pack],
        zone: &Zone,
        order: &[UnitKey],
        config: &SchedulerConfig,
    ) -> MultiBatchResult {
        let data = PatientAggregator::new()
            .aggregate(packs, &[zone.clone()], &[], config)
            .unwrap();
        let timings = create_test_timings();
        let calendar = CapacityCalendar::new(timings.automatic, ExtraHoursMap::new());
        let dates: Vec<NaiveDate> = order.iter().filter_map(|u| data.fill_date(u)).collect();
        let region = calendar.region_capacity(d(1), &dates);
        let input = BatchPlanInput {
            zone,
            units: order,
            data: &data,
            calendar: &calendar,
            timings: &timings,
            region_capacity: &region,
            first_start: d(1),
            first_batch_no: 1,
            config,
        };
        MultiBatchRecommender::new().recommend(&input)
    }

    #[test]
    fn test_unique_drug_window_inclusive() {
        let timings = create_test_timings();
        let config = SchedulerConfig::default();
        // 目标 20，窗口 [20, 28]
        assert_eq!(
            evaluate_cut(24, 0, 1.0, &timings, 20, &config),
            Some(CutReason::UniqueDrugTarget)
        );
        assert_eq!(
            evaluate_cut(20, 0, 1.0, &timings, 20, &config),
            Some(CutReason::UniqueDrugTarget)
        );
        assert_eq!(
            evaluate_cut(28, 0, 1.0, &timings, 20, &config),
            Some(CutReason::UniqueDrugTarget)
        );
        assert_eq!(evaluate_cut(29, 0, 1.0, &timings, 20, &config), None);
        assert_eq!(evaluate_cut(19, 0, 1.0, &timings, 20, &config), None);
    }

    #[test]
    fn test_duration_and_mfd_cuts() {
        let timings = create_test_timings();
        let config = SchedulerConfig::default();
        assert_eq!(
            evaluate_cut(0, 0, 10.0, &timings, 20, &config),
            Some(CutReason::DurationLimit)
        );
        // 阈值 = 1 × 10 × 100 = 1000 台 MFD = 4000 槽位
        assert_eq!(evaluate_cut(0, 3999, 1.0, &timings, 20, &config), None);
        assert_eq!(
            evaluate_cut(0, 4000, 1.0, &timings, 20, &config),
            Some(CutReason::MfdThreshold)
        );
    }

    #[test]
    fn test_every_unit_lands_in_exactly_one_batch() {
        let zone = create_test_zone(6);
        let mut packs = Vec::new();
        let mut order = Vec::new();
        for p in 0..10i64 {
            let start = (p as usize * 2) % 20;
            packs.extend(create_test_packs(p, 3, 2 + (p % 3) as u32, &canister(start..start + 3)));
            order.push(UnitKey::Patient(p));
        }
        let config = SchedulerConfig {
            consider_similar_packs: false,
            unique_drug_window: 2,
            ..SchedulerConfig::default()
        };
        let result = run(&packs, &zone, &order, &config);

        let units: Vec<UnitKey> = result.batches.iter().flat_map(|b| b.units.clone()).collect();
        let unique: BTreeSet<UnitKey> = units.iter().copied().collect();
        assert_eq!(units.len(), 10);
        assert_eq!(unique.len(), 10);
        assert_eq!(result.pack_ids().len(), 30);
        // 只有最后一个批次可能因队列耗尽而定稿
        let (_, closed) = result.batches.split_last().unwrap();
        assert!(closed.iter().all(|b| b.cut_reason != Some(CutReason::QueueExhausted)));
    }

    #[test]
    fn test_canister_count_monotonic_within_batch() {
        let zone = create_test_zone(5);
        let mut packs = Vec::new();
        let mut order = Vec::new();
        for p in 0..8i64 {
            let start = p as usize * 2;
            packs.extend(create_test_packs(p, 2, 2 + p as u32, &canister(start..start + 3)));
            order.push(UnitKey::Patient(p));
        }
        let config = SchedulerConfig {
            consider_similar_packs: false,
            unique_drug_window: 0,
            ..SchedulerConfig::default()
        };
        let result = run(&packs, &zone, &order, &config);

        assert_eq!(result.canister_traces.len(), result.batches.len());
        for trace in &result.canister_traces {
            assert!(trace.windows(2).all(|w| w[0] <= w[1]), "trace {:?}", trace);
        }
        assert_eq!(result.batches.len(), 4);
        // 每个批次从空累加器开始
        for (trace, batch) in result.canister_traces.iter().zip(&result.batches) {
            assert_eq!(trace[0], 3);
            assert_eq!(*trace.last().unwrap(), batch.analysis.canister_drugs);
        }
    }

    #[test]
    fn test_batches_chain_start_dates() {
        let zone = create_test_zone(3);
        let mut packs = Vec::new();
        let mut order = Vec::new();
        // 每个单元 3 种独有药品 => 每个单元单独成批；每批 150 盒 = 1.5 天
        for p in 0..3i64 {
            let start = p as usize * 3;
            packs.extend(create_test_packs(p, 150, 10 + p as u32, &canister(start..start + 3)));
            order.push(UnitKey::Patient(p));
        }
        let config = SchedulerConfig {
            unique_drug_window: 0,
            ..SchedulerConfig::default()
        };
        let result = run(&packs, &zone, &order, &config);

        assert_eq!(result.batches.len(), 3);
        // 1/1 周一开始，1/2 结束；1/3 开始，1/4 结束；1/5 开始，周末跳过，1/8 结束
        assert_eq!(result.batches[0].start_date, d(1));
        assert_eq!(result.batches[0].end_date, d(2));
        assert_eq!(result.batches[1].start_date, d(3));
        assert_eq!(result.batches[2].start_date, d(5));
        assert_eq!(result.batches[2].end_date, d(8));
        assert_eq!(result.batches[0].processing_time, WorkingTime { hours: 15, minutes: 0 });
        assert_eq!(result.batches[0].name, "Batch-1  2024-01-01");
        assert_eq!(result.next_start, Some(d(9)));
    }

    #[test]
    fn test_similar_units_absorbed_on_cut() {
        let zone = create_test_zone(4);
        let packs = [
            create_test_packs(1, 2, 2, &canister(0..4)),
            create_test_packs(2, 2, 3, &canister(10..14)),
            create_test_packs(3, 2, 3, &canister(1..3)),
        ]
        .concat();
        let order = [UnitKey::Patient(1), UnitKey::Patient(2), UnitKey::Patient(3)];
        let config = SchedulerConfig {
            unique_drug_window: 0,
            ..SchedulerConfig::default()
        };
        let result = run(&packs, &zone, &order, &config);

        // 患者 3 的药品是批次 1 罐装药品的子集
        assert_eq!(result.batches.len(), 2);
        assert_eq!(result.batches[0].units, vec![UnitKey::Patient(1), UnitKey::Patient(3)]);
        assert_eq!(result.batches[0].analysis.total_packs, 4);
        assert_eq!(result.batches[1].units, vec![UnitKey::Patient(2)]);
    }

    #[test]
    fn test_cut_deferred_while_region_end_units_queued() {
        let zone = create_test_zone(3);
        let packs = [
            create_test_packs(1, 1, 2, &canister(0..3)),
            create_test_packs(2, 1, 2, &canister(3..6)),
            create_test_packs(3, 1, 3, &canister(6..9)),
        ]
        .concat();
        let order = [UnitKey::Patient(1), UnitKey::Patient(2), UnitKey::Patient(3)];
        let config = SchedulerConfig {
            consider_similar_packs: false,
            unique_drug_window: 3,
            ..SchedulerConfig::default()
        };
        let result = run(&packs, &zone, &order, &config);

        // 患者 1 触发切批，但区间终点 1/2 还有患者 2，推迟到患者 2 加入后
        assert_eq!(result.batches[0].units, vec![UnitKey::Patient(1), UnitKey::Patient(2)]);
        assert_eq!(result.batches[0].analysis.canister_drugs, 6);
        assert_eq!(result.batches.len(), 2);
    }

    #[test]
    fn test_updated_reorder_prefers_fewest_new_drugs() {
        let zone = create_test_zone(3);
        let packs = [
            create_test_packs(1, 1, 2, &canister(0..3)),
            create_test_packs(2, 1, 3, &canister(20..23)),
            create_test_packs(3, 1, 3, &canister(1..4)),
        ]
        .concat();
        let order = [UnitKey::Patient(1), UnitKey::Patient(2), UnitKey::Patient(3)];
        let config = SchedulerConfig {
            consider_similar_packs: false,
            unique_drug_window: 0,
            batch_reorder: Some(SortLogic::Updated),
            ..SchedulerConfig::default()
        };
        let result = run(&packs, &zone, &order, &config);

        // 批次 1 = 患者 1；患者 3 只有 1 种新药品，排到患者 2 之前
        assert_eq!(result.batches[0].units, vec![UnitKey::Patient(1)]);
        assert_eq!(result.batches[1].units[0], UnitKey::Patient(3));
    }
}
