// ==========================================
// 药盒分装排产系统 - 多批次排产上下文
// ==========================================
// 职责: 多批次推荐的单次运行状态 (日期区间、待填量、批次累加器)
//       与工作队列 (每个单元恰好被取出一次)
// 红线: 只在一次运行内存活，运行结束即丢弃
// ==========================================
// 区间推进:
// - 区间终点依次取排产日期
// - 进入新区间时，待填量 > 0 的日期允许取单元
// - 区间内已有分配且终点日仍有待填量时，只取终点日的单元
// ==========================================

use crate::domain::batch::BatchAnalysis;
use crate::domain::capacity::DateCapacityMap;
use crate::domain::pack::{DrugKey, PackId, UnitKey};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};

// ==========================================
// WorkQueue - 工作队列
// ==========================================
// 取出只打标记，不移动元素；head 跳过已取出的前缀
#[derive(Debug, Clone)]
pub struct WorkQueue {
    items: Vec<UnitKey>,
    consumed: Vec<bool>,
    head: usize,
    remaining: usize,
}

impl WorkQueue {
    pub fn new(units: Vec<UnitKey>) -> Self {
        let len = units.len();
        Self {
            items: units,
            consumed: vec![false; len],
            head: 0,
            remaining: len,
        }
    }

    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// 按队列顺序遍历未取出的单元 (下标, 单元)
    pub fn pending(&self) -> impl Iterator<Item = (usize, UnitKey)> + '_ {
        (self.head..self.items.len())
            .filter(move |i| !self.consumed[*i])
            .map(move |i| (i, self.items[i]))
    }

    pub fn pending_units(&self) -> Vec<UnitKey> {
        self.pending().map(|(_, u)| u).collect()
    }

    /// 取出下标 index 处的单元；已取出时返回 None
    pub fn take(&mut self, index: usize) -> Option<UnitKey> {
        if index >= self.items.len() || self.consumed[index] {
            return None;
        }
        self.consumed[index] = true;
        self.remaining -= 1;
        while self.head < self.items.len() && self.consumed[self.head] {
            self.head += 1;
        }
        Some(self.items[index])
    }

    /// 按 key 稳定重排剩余单元
    pub fn reorder_by_key<K: Ord>(&mut self, mut key: impl FnMut(&UnitKey) -> K) {
        let mut pending = self.pending_units();
        pending.sort_by_cached_key(|u| key(u));
        *self = WorkQueue::new(pending);
    }
}

// ==========================================
// BatchAccumulator - 当前批次累加器
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct BatchAccumulator {
    pub units: Vec<UnitKey>,
    pub pack_ids: Vec<PackId>,
    pub total_slots: usize,
    pub manual_slots: usize,
    pub canister_drugs: BTreeSet<DrugKey>,
    pub manual_drugs: BTreeSet<DrugKey>,
    pub canister_trace: Vec<usize>, // 每次加入单元后的罐装药品数
}

impl BatchAccumulator {
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn pack_count(&self) -> usize {
        self.pack_ids.len()
    }

    pub fn analysis(&self) -> BatchAnalysis {
        BatchAnalysis {
            total_packs: self.pack_ids.len(),
            total_batch_slots: self.total_slots,
            manual_slots: self.manual_slots,
            canister_drugs: self.canister_drugs.len(),
            manual_drugs: self.manual_drugs.len(),
        }
    }

    /// 取走当前批次并清空累加器
    pub fn take(&mut self) -> BatchAccumulator {
        std::mem::take(self)
    }
}

// ==========================================
// SchedulingContext - 运行状态
// ==========================================
#[derive(Debug, Clone)]
pub struct SchedulingContext {
    // ===== 日期表 =====
    pub schedule_dates: Vec<NaiveDate>,
    pub to_be_filled: DateCapacityMap,          // 日期 -> 尚未分配的药盒数
    pub region_allowing: BTreeMap<NaiveDate, bool>,
    pub left_movable: DateCapacityMap,          // 日期 -> 可前移的药盒数
    pub region_capacity: DateCapacityMap,       // 分区产能 (只读)
    pub max_capacity: DateCapacityMap,          // 分区产能余量

    // ===== 当前区间 =====
    pub region_index: usize,
    pub region_end: Option<NaiveDate>,
    pub region_changed: bool,
    pub region_remaining: i64,
    pub distributed: BTreeMap<NaiveDate, BTreeMap<NaiveDate, i64>>, // 区间终点 -> 单元日期 -> 药盒数
    pub distributed_ids: BTreeMap<NaiveDate, Vec<PackId>>,

    // ===== 当前批次 =====
    pub batch: BatchAccumulator,
}

impl SchedulingContext {
    /// 初始化运行状态
    ///
    /// # 参数
    /// - unit_dates: 自动单元 -> (分装日期, 药盒数)
    /// - region_capacity: 自动单元日期上的分区产能
    pub fn prepare(
        unit_dates: &BTreeMap<UnitKey, (NaiveDate, i64)>,
        region_capacity: &DateCapacityMap,
    ) -> Self {
        let mut to_be_filled = DateCapacityMap::new();
        for (date, packs) in unit_dates.values() {
            *to_be_filled.entry(*date).or_insert(0) += *packs;
        }
        let schedule_dates: Vec<NaiveDate> = to_be_filled.keys().copied().collect();
        let region_allowing = schedule_dates.iter().map(|d| (*d, true)).collect();

        // left(d) = region(d) + Σ_{x<d} region(x) - Σ_{x≤d} to_be_filled(x)
        let mut left_movable = DateCapacityMap::new();
        let mut required: i64 = 0;
        let mut total: i64 = 0;
        for (date, packs) in &to_be_filled {
            required += packs;
            let region = region_capacity.get(date).copied().unwrap_or(0);
            left_movable.insert(*date, region + total - required);
            total += region;
        }

        Self {
            schedule_dates,
            to_be_filled,
            region_allowing,
            left_movable,
            region_capacity: region_capacity.clone(),
            max_capacity: region_capacity.clone(),
            region_index: 0,
            region_end: None,
            region_changed: false,
            region_remaining: 0,
            distributed: BTreeMap::new(),
            distributed_ids: BTreeMap::new(),
            batch: BatchAccumulator::default(),
        }
    }

    /// 切换到下一个区间
    ///
    /// # 返回
    /// - false: 已无后续区间，保持当前区间不变
    pub fn load_next_region(&mut self) -> bool {
        let Some(end) = self.schedule_dates.get(self.region_index).copied() else {
            return false;
        };
        self.region_end = Some(end);
        self.region_index += 1;
        self.region_changed = true;
        self.region_remaining = self.region_capacity.get(&end).copied().unwrap_or(0);
        true
    }

    /// 区间切换后重置允许标记
    pub fn refresh_allowing(&mut self) {
        if !self.region_changed {
            return;
        }
        for (date, allowed) in self.region_allowing.iter_mut() {
            *allowed = self.to_be_filled.get(date).copied().unwrap_or(0) > 0;
        }
        self.region_changed = false;
    }

    pub fn is_allowed(&self, date: NaiveDate) -> bool {
        self.region_allowing.get(&date).copied().unwrap_or(false)
    }

    /// 当前区间是否拒收该日期的单元
    ///
    /// 区间内已有分配时，终点日仍有待填量则先让出给终点日的单元
    pub fn blocks(&self, date: NaiveDate, packs: i64) -> bool {
        let Some(end) = self.region_end else {
            return false;
        };
        if !self.distributed.contains_key(&end) || date == end {
            return false;
        }
        let distributed = self.distributed_ids.get(&end).map_or(0, |ids| ids.len() as i64);
        let max_capacity = self.max_capacity.get(&end).copied().unwrap_or(0);
        let region_capacity = self.region_capacity.get(&end).copied().unwrap_or(0);
        let end_pending = self.to_be_filled.get(&end).copied().unwrap_or(0);

        packs + distributed + max_capacity > region_capacity && end_pending > 0
    }

    /// 记录一个单元的分配
    pub fn record_allocation(&mut self, date: NaiveDate, pack_ids: &[PackId]) {
        let packs = pack_ids.len() as i64;
        *self.to_be_filled.entry(date).or_insert(0) -= packs;

        let Some(end) = self.region_end else {
            return;
        };
        *self.max_capacity.entry(end).or_insert(0) -= packs;
        if date > end {
            // 日期早于 date 的全部条目都扣减，不限于当前区间
            for (d, left) in self.left_movable.iter_mut() {
                if *d < date {
                    *left -= packs;
                }
            }
        }
        *self
            .distributed
            .entry(end)
            .or_default()
            .entry(date)
            .or_insert(0) += packs;
        self.distributed_ids
            .entry(end)
            .or_default()
            .extend(pack_ids.iter().copied());
        self.region_remaining -= packs;
    }

    /// 切批吸收的单元只扣减待填量
    pub fn record_absorbed(&mut self, date: NaiveDate, packs: i64) {
        *self.to_be_filled.entry(date).or_insert(0) -= packs;
    }
}
