// ==========================================
// 药盒分装排产系统 - 自动/人工拆分推荐
// ==========================================
// 职责: 按人工负担排序排产单元，逐个贪心放入自动设备产能窗口，
//       溢出部分放入人工产能窗口，再溢出即超载
// 红线: 产能不足不是错误，只改变单元去向
// ==========================================
// 产能窗口:
// - 累计产能表 date -> 截至该日可完成药盒数
// - 接收单元 (日期 d, n 个药盒) 时，所有 ≥ d 的日期扣减
// - 任一日期累计产能 ≤ 0 时，该日及之前的日期移出窗口
// - 扣减量恒为单元药盒数，允许单次超扣，不做回补
// ==========================================

use crate::domain::capacity::DateCapacityMap;
use crate::domain::pack::{PackId, UnitKey};
use crate::domain::split::{SortedEntry, SplitInfo};
use crate::domain::zone::Zone;
use crate::engine::aggregator::AggregatedData;
use crate::engine::calendar::CapacityCalendar;
use chrono::NaiveDate;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use tracing::{debug, info, instrument};

// ==========================================
// CapacityWindow - 可接收日期窗口
// ==========================================
#[derive(Debug, Clone)]
pub struct CapacityWindow {
    cumulative: DateCapacityMap,
    window: VecDeque<NaiveDate>,
}

impl CapacityWindow {
    pub fn new(cumulative: DateCapacityMap) -> Self {
        let window = cumulative.keys().copied().collect();
        let mut this = Self { cumulative, window };
        this.prune();
        this
    }

    pub fn accepts(&self, date: NaiveDate) -> bool {
        self.window.contains(&date)
    }

    /// 接收 date 日的 packs 个药盒
    pub fn accept(&mut self, date: NaiveDate, packs: i64) {
        for (_, value) in self.cumulative.range_mut(date..) {
            *value -= packs;
        }
        self.prune();
    }

    fn prune(&mut self) {
        let cut = self
            .cumulative
            .iter()
            .filter(|(_, v)| **v <= 0)
            .map(|(d, _)| *d)
            .max();
        if let Some(cut) = cut {
            while self.window.front().map_or(false, |front| *front <= cut) {
                self.window.pop_front();
            }
        }
    }

    pub fn remaining(&self) -> &DateCapacityMap {
        &self.cumulative
    }

    pub fn into_remaining(self) -> DateCapacityMap {
        self.cumulative
    }
}

// ==========================================
// SplitRecommendation - 拆分结果
// ==========================================
#[derive(Debug, Clone)]
pub struct SplitRecommendation {
    pub split_info: SplitInfo,
    pub sorted_entries: Vec<SortedEntry>,
    pub fill_schedule_dates: BTreeMap<UnitKey, NaiveDate>,
    pub date_pack_count: DateCapacityMap, // 自动设备贪心结束后的累计余量
    pub automatic_region_capacity: DateCapacityMap,
    pub manual_region_capacity: DateCapacityMap,
    pub still_pending: Vec<UnitKey>,
}

impl SplitRecommendation {
    /// 自动单元按排序顺序排列
    pub fn sorted_automatic_units(&self) -> Vec<UnitKey> {
        let automatic: BTreeSet<&UnitKey> = self.split_info.automatic_units.iter().collect();
        self.sorted_entries
            .iter()
            .map(|e| e.unit)
            .filter(|u| automatic.contains(u))
            .collect()
    }
}

// ==========================================
// SplitRecommender - 拆分引擎
// ==========================================
pub struct SplitRecommender {}

impl SplitRecommender {
    pub fn new() -> Self {
        Self {}
    }

    /// 按人工负担排序
    ///
    /// 排序键: (人工药品数 + 半片惩罚) 升序，可上罐药品数降序；相同键保持输入顺序
    pub fn sort_units(
        &self,
        zone: &Zone,
        pending: &[UnitKey],
        data: &AggregatedData,
    ) -> Vec<SortedEntry> {
        let mut entries: Vec<SortedEntry> = pending
            .iter()
            .filter(|u| data.unit(u).is_some())
            .map(|unit| {
                let drug_count = data.zone_drugs(unit, zone.zone_id).len();
                let canister = data.canister_drugs(unit, zone).len();
                let penalty = data.unit(unit).map_or(0, |u| u.half_pill_penalty);
                SortedEntry {
                    unit: *unit,
                    manual_drug_length: drug_count - canister + penalty,
                    canister_drug_length: canister,
                }
            })
            .collect();
        entries.sort_by_key(|e| (e.manual_drug_length, Reverse(e.canister_drug_length)));
        entries
    }

    /// 生成拆分推荐
    ///
    /// # 参数
    /// - zone: 当前区域
    /// - pending: 尚未分配到自动设备的单元
    /// - data: 聚合数据
    /// - automatic: 区域首台设备的产能日历
    /// - manual: 人工团队产能日历
    /// - today: 排产基准日
    ///
    /// # 返回
    /// - 每个 pending 单元恰好落入 自动/人工/超载 之一
    #[instrument(skip_all, fields(zone_id = zone.zone_id, pending = pending.len()))]
    pub fn get_split_recommendations(
        &self,
        zone: &Zone,
        pending: &[UnitKey],
        data: &AggregatedData,
        automatic: &CapacityCalendar,
        manual: &CapacityCalendar,
        today: NaiveDate,
    ) -> SplitRecommendation {
        let sorted_entries = self.sort_units(zone, pending, data);

        let mut fill_schedule_dates = BTreeMap::new();
        let mut split = SplitInfo::default();
        let mut dated: Vec<(UnitKey, NaiveDate, i64)> = Vec::new();
        for entry in &sorted_entries {
            match data.fill_date(&entry.unit) {
                Some(date) => {
                    fill_schedule_dates.insert(entry.unit, date);
                    dated.push((entry.unit, date, data.pack_count(&entry.unit) as i64));
                }
                None => split.undated_units.push(entry.unit),
            }
        }

        let all_dates: Vec<NaiveDate> = {
            let set: BTreeSet<NaiveDate> = dated.iter().map(|(_, d, _)| *d).collect();
            set.into_iter().collect()
        };
        for date in &all_dates {
            split.overloaded_datewise.insert(*date, BTreeSet::new());
        }

        // 1. 自动设备
        let mut auto_window = CapacityWindow::new(automatic.cumulative_capacity(today, &all_dates));
        let mut manual_candidates: Vec<(UnitKey, NaiveDate, i64)> = Vec::new();
        for (unit, date, packs) in &dated {
            if auto_window.accepts(*date) {
                auto_window.accept(*date, *packs);
                split.automatic_units.push(*unit);
            } else {
                manual_candidates.push((*unit, *date, *packs));
            }
        }
        let automatic_dates: Vec<NaiveDate> = split
            .automatic_units
            .iter()
            .filter_map(|u| fill_schedule_dates.get(u).copied())
            .collect();
        let automatic_region_capacity = automatic.region_capacity(today, &automatic_dates);

        // 2. 人工 (逆序)
        manual_candidates.reverse();
        let manual_dates: Vec<NaiveDate> = manual_candidates.iter().map(|(_, d, _)| *d).collect();
        let mut manual_window = CapacityWindow::new(manual.cumulative_capacity(today, &manual_dates));
        for (unit, date, packs) in &manual_candidates {
            if manual_window.accepts(*date) {
                manual_window.accept(*date, *packs);
                split.manual_units.push(*unit);
            } else {
                split.overloaded_units.push(*unit);
                if let Some(unit_data) = data.unit(unit) {
                    split
                        .overloaded_datewise
                        .entry(*date)
                        .or_default()
                        .extend(unit_data.packs.iter().copied());
                }
            }
        }
        let accepted_manual_dates: Vec<NaiveDate> = split
            .manual_units
            .iter()
            .filter_map(|u| fill_schedule_dates.get(u).copied())
            .collect();
        let manual_region_capacity = manual.region_capacity(today, &accepted_manual_dates);

        // 3. 无交付日期直接超载
        split.overloaded_units.extend(split.undated_units.iter().copied());

        split.automatic_packs = data.unit_pack_ids(&split.automatic_units);
        split.manual_packs = data.unit_pack_ids(&split.manual_units);
        split.overloaded_packs = data.unit_pack_ids(&split.overloaded_units);

        let automatic_set: BTreeSet<&UnitKey> = split.automatic_units.iter().collect();
        let still_pending: Vec<UnitKey> = pending
            .iter()
            .filter(|u| !automatic_set.contains(u))
            .copied()
            .collect();

        info!(
            automatic_units = split.automatic_units.len(),
            manual_units = split.manual_units.len(),
            overloaded_units = split.overloaded_units.len(),
            undated_units = split.undated_units.len(),
            "拆分完成"
        );
        debug!(automatic_packs = split.automatic_packs.len(), manual_packs = split.manual_packs.len(), overloaded_packs = split.overloaded_packs.len());

        SplitRecommendation {
            split_info: split,
            sorted_entries,
            fill_schedule_dates,
            date_pack_count: auto_window.into_remaining(),
            automatic_region_capacity,
            manual_region_capacity,
            still_pending,
        }
    }
}

impl Default for SplitRecommender {
    fn default() -> Self {
        Self::new()
    }
}

/// 拆分结果中各去向的药盒 id 集合 (测试与校验用)
pub fn partition_pack_sets(split: &SplitInfo) -> [BTreeSet<PackId>; 3] {
    [
        split.automatic_packs.iter().copied().collect(),
        split.manual_packs.iter().copied().collect(),
        split.overloaded_packs.iter().copied().collect(),
    ]
}
