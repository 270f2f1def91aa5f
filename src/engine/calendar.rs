// ==========================================
// 药盒分装排产系统 - 产能日历
// ==========================================
// 职责: 工时设置 -> 日期产能表；按产能逐日推进求结束日期/处理时长
// 红线: 纯函数，不读写任何外部状态
// ==========================================
// 产能口径:
// - 基础产能 = 当日工时 × 每小时药盒数 (周六/周日工时可为 0)
// - 加班产能 = floor(每小时药盒数 × 加班小时)
// - 逐日推进只使用基础产能
// ==========================================

use crate::config::timings::ResourceTimings;
use crate::domain::capacity::{DateCapacityMap, ExtraHoursMap};
use crate::domain::types::DayKind;
use chrono::{Duration, NaiveDate};

/// 一次逐日推进的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DateWalk {
    pub end_date: NaiveDate,
    pub processing_hours: f64,
}

// ==========================================
// CapacityCalendar - 产能日历
// ==========================================
#[derive(Debug, Clone)]
pub struct CapacityCalendar {
    timings: ResourceTimings,
    extra_hours: ExtraHoursMap,
}

impl CapacityCalendar {
    /// 创建产能日历
    ///
    /// # 参数
    /// - timings: 资源工时 (自动设备或人工团队)
    /// - extra_hours: 日期 -> 加班小时
    pub fn new(timings: ResourceTimings, extra_hours: ExtraHoursMap) -> Self {
        Self {
            timings,
            extra_hours,
        }
    }

    pub fn timings(&self) -> &ResourceTimings {
        &self.timings
    }

    /// 一周内是否存在产能，否则逐日推进无意义
    pub fn has_capacity(&self) -> bool {
        self.timings.per_hour > 0
            && [DayKind::Weekday, DayKind::Saturday, DayKind::Sunday]
                .iter()
                .any(|k| self.timings.hours_for(*k) > 0)
    }

    // ===== 单日产能 =====

    pub fn base_capacity(&self, date: NaiveDate) -> i64 {
        self.timings.capacity_for(DayKind::of(date))
    }

    pub fn extra_capacity(&self, date: NaiveDate) -> i64 {
        self.extra_hours
            .get(&date)
            .map(|h| (self.timings.per_hour as f64 * h).floor() as i64)
            .unwrap_or(0)
    }

    /// 当日工作小时 (基础 + 加班)
    pub fn hours_on(&self, date: NaiveDate) -> f64 {
        self.timings.hours_for(DayKind::of(date)) as f64 + self.extra_hours.get(&date).copied().unwrap_or(0.0)
    }

    /// 当日总产能 (基础 + 加班)
    pub fn capacity_on(&self, date: NaiveDate) -> i64 {
        self.base_capacity(date) + self.extra_capacity(date)
    }

    // ===== 日期产能表 =====

    /// 截至各日期可完成的累计产能
    ///
    /// cumulative(d) = Σ_{today ≤ x < d} capacity_on(x) + extra_capacity(d)
    ///
    /// # 参数
    /// - today: 排产基准日
    /// - dates: 排产日期 (任意顺序，重复忽略)
    pub fn cumulative_capacity(&self, today: NaiveDate, dates: &[NaiveDate]) -> DateCapacityMap {
        let mut sorted: Vec<NaiveDate> = dates.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut result = DateCapacityMap::new();
        let mut cursor = today;
        let mut running: i64 = 0;
        for date in sorted {
            while cursor < date {
                running += self.capacity_on(cursor);
                cursor += Duration::days(1);
            }
            result.insert(date, running + self.extra_capacity(date));
        }
        result
    }

    /// 分区产能: 相邻排产日期之间的基础产能 + 区尾加班产能
    ///
    /// region(d_i) = Σ_{d_{i-1} ≤ x < d_i} base_capacity(x) + extra_capacity(d_i)，d_{-1} = today
    pub fn region_capacity(&self, today: NaiveDate, dates: &[NaiveDate]) -> DateCapacityMap {
        let mut sorted: Vec<NaiveDate> = dates.to_vec();
        sorted.sort();
        sorted.dedup();

        let mut result = DateCapacityMap::new();
        let mut previous = today;
        for date in sorted {
            let mut region: i64 = 0;
            let mut cursor = previous;
            while cursor < date {
                region += self.base_capacity(cursor);
                cursor += Duration::days(1);
            }
            result.insert(date, region + self.extra_capacity(date));
            if date > previous {
                previous = date;
            }
        }
        result
    }

    // ===== 逐日推进 =====

    /// 从 start 起逐日消耗产能，求完成 packs 个药盒的结束日期与处理时长
    ///
    /// # 规则
    /// - 当日产能含加班；零产能日只推进日期，不消耗、不计时
    /// - 剩余量 ≥ 当日产能: 扣减并计入当日全部工时 (含加班小时)
    /// - 否则计入 剩余量 / 每小时药盒数 小时，当日结束
    /// - packs ≤ 0 时结束日期即 start
    pub fn get_end_date(&self, packs: i64, start: NaiveDate) -> DateWalk {
        let mut walk = DateWalk {
            end_date: start,
            processing_hours: 0.0,
        };
        if packs <= 0 || !self.has_capacity() {
            return walk;
        }

        let per_hour = self.timings.per_hour as f64;
        let mut remaining = packs;
        let mut date = start;
        while remaining > 0 {
            let capacity = self.capacity_on(date);
            if capacity == 0 {
                date += Duration::days(1);
                continue;
            }
            walk.end_date = date;
            if remaining >= capacity {
                remaining -= capacity;
                walk.processing_hours += self.hours_on(date);
                date += Duration::days(1);
            } else {
                walk.processing_hours += remaining as f64 / per_hour;
                remaining = 0;
            }
        }
        walk
    }

    /// 处理 packs 个药盒所需工时 (小时)
    pub fn calculate_processing_hours(&self, packs: i64, start: NaiveDate) -> f64 {
        self.get_end_date(packs, start).processing_hours
    }

    /// date 当日或之后的第一个有基础产能的日期
    pub fn next_working_day(&self, date: NaiveDate) -> NaiveDate {
        if !self.has_capacity() {
            return date;
        }
        let mut cursor = date;
        while self.base_capacity(cursor) == 0 {
            cursor += Duration::days(1);
        }
        cursor
    }

    /// 上一批次结束后的下一批次开始日期
    pub fn calculate_batch_start_date(&self, previous_end: NaiveDate) -> NaiveDate {
        self.next_working_day(previous_end + Duration::days(1))
    }

    /// 首个批次开始日期
    ///
    /// # 参数
    /// - today: 当前日期
    /// - system_end: 设备当前排产截止日 (None 表示无历史批次)
    pub fn first_batch_start_date(&self, today: NaiveDate, system_end: Option<NaiveDate>) -> NaiveDate {
        match system_end {
            Some(end) if end >= today => self.calculate_batch_start_date(end),
            _ => self.next_working_day(today),
        }
    }
}

/// 交付日期向前回退 buffer_days 个非周日，得到分装日期
pub fn fill_date_with_buffer(delivery_date: NaiveDate, buffer_days: u32) -> NaiveDate {
    let mut counted = 0;
    let mut date = delivery_date;
    while counted < buffer_days {
        date -= Duration::days(1);
        if DayKind::of(date) != DayKind::Sunday {
            counted += 1;
        }
    }
    date
}
