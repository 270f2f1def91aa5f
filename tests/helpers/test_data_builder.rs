// ==========================================
// 测试数据构建器 - 用于集成测试
// ==========================================

#![allow(dead_code)]

use chrono::NaiveDate;
use pack_fill_scheduler::domain::{DrugKey, ManualUser, Pack, SchedulingRequest, SlotDrug, Zone};
use std::collections::BTreeMap;

pub fn date(month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, month, day).unwrap()
}

pub fn drug(ndc: &str) -> DrugKey {
    DrugKey::new(ndc, "T")
}

// ==========================================
// Pack 构建器
// ==========================================

pub struct PackBuilder {
    pack_id: i64,
    patient_id: i64,
    facility_id: i64,
    delivery_date: Option<NaiveDate>,
    slots: BTreeMap<u32, Vec<SlotDrug>>,
}

impl PackBuilder {
    pub fn new(pack_id: i64) -> Self {
        Self {
            pack_id,
            patient_id: pack_id,
            facility_id: 1,
            delivery_date: None,
            slots: BTreeMap::new(),
        }
    }

    pub fn patient(mut self, patient_id: i64) -> Self {
        self.patient_id = patient_id;
        self
    }

    pub fn facility(mut self, facility_id: i64) -> Self {
        self.facility_id = facility_id;
        self
    }

    pub fn delivery(mut self, date: NaiveDate) -> Self {
        self.delivery_date = Some(date);
        self
    }

    /// 新增一个槽位，每种药品整片 1 粒
    pub fn slot(mut self, ndcs: &[&str]) -> Self {
        let index = self.slots.len() as u32;
        self.slots.insert(
            index,
            ndcs.iter()
                .map(|n| SlotDrug {
                    drug: drug(n),
                    quantity: 1.0,
                    alternate_allowed: false,
                })
                .collect(),
        );
        self
    }

    /// 新增一个半片槽位
    pub fn half_pill_slot(mut self, ndc: &str) -> Self {
        let index = self.slots.len() as u32;
        self.slots.insert(
            index,
            vec![SlotDrug {
                drug: drug(ndc),
                quantity: 0.5,
                alternate_allowed: false,
            }],
        );
        self
    }

    pub fn build(self) -> Pack {
        Pack {
            pack_id: self.pack_id,
            patient_id: self.patient_id,
            facility_id: self.facility_id,
            delivery_date: self.delivery_date,
            slots: self.slots,
        }
    }
}

// ==========================================
// Zone 构建器
// ==========================================

pub struct ZoneBuilder {
    zone: Zone,
}

impl ZoneBuilder {
    pub fn new(zone_id: i64, system_id: i64) -> Self {
        Self {
            zone: Zone {
                zone_id,
                system_ids: vec![system_id],
                canister_drugs: Default::default(),
                quadrant_canister_capacity: 5,
                quadrant_count: 4,
            },
        }
    }

    pub fn canisters(mut self, ndcs: &[&str]) -> Self {
        self.zone.canister_drugs.extend(ndcs.iter().map(|n| drug(n)));
        self
    }

    pub fn robot(mut self, quadrant_capacity: usize, quadrants: usize) -> Self {
        self.zone.quadrant_canister_capacity = quadrant_capacity;
        self.zone.quadrant_count = quadrants;
        self
    }

    pub fn build(self) -> Zone {
        self.zone
    }
}

// ==========================================
// SchedulingRequest 构建器
// ==========================================

pub struct RequestBuilder {
    request: SchedulingRequest,
}

impl RequestBuilder {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            request: SchedulingRequest {
                company_id: 3,
                today,
                packs: Vec::new(),
                zones: Vec::new(),
                alternates: Vec::new(),
                manual_users: Vec::new(),
                system_end_dates: BTreeMap::new(),
            },
        }
    }

    pub fn packs(mut self, packs: Vec<Pack>) -> Self {
        self.request.packs.extend(packs);
        self
    }

    pub fn zone(mut self, zone: Zone) -> Self {
        self.request.zones.push(zone);
        self
    }

    pub fn manual_users(mut self, count: i64) -> Self {
        self.request.manual_users = (1..=count).map(|user_id| ManualUser { user_id, hours: 8 }).collect();
        self
    }

    pub fn system_end(mut self, system_id: i64, end: NaiveDate) -> Self {
        self.request.system_end_dates.insert(system_id, end);
        self
    }

    pub fn build(self) -> SchedulingRequest {
        self.request
    }
}
