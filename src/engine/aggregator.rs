// ==========================================
// 药盒分装排产系统 - 患者/机构聚合
// ==========================================
// 职责: 药盒 -> 排产单元 (患者或机构) 的药盒集合、区域药品、交付日期、半片惩罚
// 红线: 只读输入快照，不做分配
// ==========================================

use crate::config::scheduler_config::SchedulerConfig;
use crate::domain::pack::{DrugKey, FacilityId, Pack, PackId, PatientId, UnitKey, ZoneId};
use crate::domain::types::FillMode;
use crate::domain::zone::{AlternateOption, Zone};
use crate::engine::alternate::{select_zone_alternates, zone_wise_drugs, ZoneOldNewMap};
use crate::engine::calendar::fill_date_with_buffer;
use crate::engine::error::{SchedulerError, SchedulerResult};
use chrono::NaiveDate;
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, instrument};

static EMPTY_DRUGS: BTreeSet<DrugKey> = BTreeSet::new();

// ==========================================
// UnitData - 单个排产单元
// ==========================================
#[derive(Debug, Clone, Default)]
pub struct UnitData {
    pub patients: Vec<PatientId>,
    pub packs: BTreeSet<PackId>,

    // ===== 日期 =====
    pub delivery_date: Option<NaiveDate>,
    pub fill_date: Option<NaiveDate>, // 交付日期回退缓冲天数

    // ===== 药品 =====
    pub zone_drugs: BTreeMap<ZoneId, BTreeSet<DrugKey>>, // 含替代药
    pub forced_manual_drugs: BTreeSet<DrugKey>,         // 单元内所有出现都只有半片用量的药品
    pub half_pill_penalty: usize,
}

// ==========================================
// AggregatedData - 聚合结果
// ==========================================
#[derive(Debug, Clone)]
pub struct AggregatedData {
    pub fill_mode: FillMode,
    pub units: BTreeMap<UnitKey, UnitData>,
    pub pack_unit: BTreeMap<PackId, UnitKey>,
    pub packs: BTreeMap<PackId, Pack>,
    pub zone_old_new: ZoneOldNewMap,
}

impl AggregatedData {
    pub fn unit(&self, unit: &UnitKey) -> Option<&UnitData> {
        self.units.get(unit)
    }

    pub fn pack_count(&self, unit: &UnitKey) -> usize {
        self.units.get(unit).map_or(0, |u| u.packs.len())
    }

    pub fn fill_date(&self, unit: &UnitKey) -> Option<NaiveDate> {
        self.units.get(unit).and_then(|u| u.fill_date)
    }

    /// 单元在区域内的药品 (区域未登记时为空)
    pub fn zone_drugs(&self, unit: &UnitKey, zone_id: ZoneId) -> &BTreeSet<DrugKey> {
        self.units
            .get(unit)
            .and_then(|u| u.zone_drugs.get(&zone_id))
            .unwrap_or(&EMPTY_DRUGS)
    }

    /// 单元在区域内可上罐的药品
    pub fn canister_drugs(&self, unit: &UnitKey, zone: &Zone) -> BTreeSet<DrugKey> {
        let forced = self.units.get(unit).map(|u| &u.forced_manual_drugs);
        self.zone_drugs(unit, zone.zone_id)
            .iter()
            .filter(|d| zone.canister_drugs.contains(*d))
            .filter(|d| forced.map_or(true, |f| !f.contains(*d)))
            .cloned()
            .collect()
    }

    pub fn unit_pack_ids(&self, units: &[UnitKey]) -> Vec<PackId> {
        units
            .iter()
            .filter_map(|u| self.units.get(u))
            .flat_map(|u| u.packs.iter().copied())
            .collect()
    }

    /// 无交付日期的单元
    pub fn undated_units(&self) -> Vec<UnitKey> {
        self.units
            .iter()
            .filter(|(_, u)| u.fill_date.is_none())
            .map(|(k, _)| *k)
            .collect()
    }
}

// ==========================================
// PatientAggregator - 聚合引擎
// ==========================================
pub struct PatientAggregator {}

impl PatientAggregator {
    pub fn new() -> Self {
        Self {}
    }

    /// 聚合药盒
    ///
    /// # 参数
    /// - packs: 待排产药盒
    /// - zones: 参与排产的区域
    /// - alternates: 替代药候选
    /// - config: 分组方式、缓冲天数、半片惩罚步长、严格日期模式
    ///
    /// # 返回
    /// - Err(InvalidInput): 药盒 id 重复
    /// - Err(InsufficientData): 严格模式下存在无交付日期的单元
    #[instrument(skip(self, packs, zones, alternates, config), fields(packs = packs.len(), mode = %config.fill_mode))]
    pub fn aggregate(
        &self,
        packs: &[Pack],
        zones: &[Zone],
        alternates: &[AlternateOption],
        config: &SchedulerConfig,
    ) -> SchedulerResult<AggregatedData> {
        // 1. 患者维度
        let mut pack_map: BTreeMap<PackId, Pack> = BTreeMap::new();
        let mut patient_packs: BTreeMap<PatientId, BTreeSet<PackId>> = BTreeMap::new();
        let mut patient_drugs: BTreeMap<PatientId, BTreeSet<DrugKey>> = BTreeMap::new();
        let mut patient_alternate_allowed: BTreeMap<PatientId, BTreeSet<DrugKey>> = BTreeMap::new();
        let mut patient_facility: BTreeMap<PatientId, FacilityId> = BTreeMap::new();
        let mut patient_dates: BTreeMap<PatientId, NaiveDate> = BTreeMap::new();
        let mut patient_forced: BTreeMap<PatientId, BTreeSet<DrugKey>> = BTreeMap::new();
        let mut patient_whole: BTreeMap<PatientId, BTreeSet<DrugKey>> = BTreeMap::new();
        let mut patient_penalty: BTreeMap<PatientId, usize> = BTreeMap::new();

        let per_penalty = config.half_pill_drops_per_penalty.max(1);

        for pack in packs {
            if pack_map.contains_key(&pack.pack_id) {
                return Err(SchedulerError::InvalidInput(format!(
                    "药盒 id 重复: {}",
                    pack.pack_id
                )));
            }

            let pid = pack.patient_id;
            patient_packs.entry(pid).or_default().insert(pack.pack_id);
            patient_facility.entry(pid).or_insert(pack.facility_id);

            let drugs = patient_drugs.entry(pid).or_default();
            let allowed = patient_alternate_allowed.entry(pid).or_default();
            let forced = patient_forced.entry(pid).or_default();
            let whole = patient_whole.entry(pid).or_default();
            for slot_drug in pack.slots.values().flatten() {
                drugs.insert(slot_drug.drug.clone());
                if slot_drug.alternate_allowed {
                    allowed.insert(slot_drug.drug.clone());
                }
                // 按药盒判定: 本盒有整片用量即可上罐
                if pack.is_drug_forced_manual(&slot_drug.drug) {
                    forced.insert(slot_drug.drug.clone());
                } else {
                    whole.insert(slot_drug.drug.clone());
                }
            }

            if let Some(date) = pack.delivery_date {
                patient_dates
                    .entry(pid)
                    .and_modify(|d| *d = (*d).min(date))
                    .or_insert(date);
            }

            let drops = pack.half_pill_drop_count();
            if drops > 0 {
                *patient_penalty.entry(pid).or_default() += 1 + (drops / per_penalty) as usize;
            }

            pack_map.insert(pack.pack_id, pack.clone());
        }

        // 2. 区域替代药
        let zone_ids: Vec<ZoneId> = zones.iter().map(|z| z.zone_id).collect();
        let choice = select_zone_alternates(alternates);
        let zone_data = zone_wise_drugs(&patient_drugs, &patient_alternate_allowed, &choice, &zone_ids);

        let patient_zone_drugs = |pid: PatientId| -> BTreeMap<ZoneId, BTreeSet<DrugKey>> {
            zone_data
                .zone_patient_drugs
                .iter()
                .filter_map(|(zone_id, per_patient)| {
                    per_patient.get(&pid).map(|drugs| (*zone_id, drugs.clone()))
                })
                .collect()
        };

        // 3. 按分组方式组装单元
        let mut units: BTreeMap<UnitKey, UnitData> = BTreeMap::new();
        let mut unit_whole: BTreeMap<UnitKey, BTreeSet<DrugKey>> = BTreeMap::new();
        for (pid, pack_ids) in &patient_packs {
            let key = match config.fill_mode {
                FillMode::PatientWise => UnitKey::Patient(*pid),
                FillMode::FacilityWise => UnitKey::Facility(patient_facility[pid]),
            };
            let unit = units.entry(key).or_default();
            unit.patients.push(*pid);
            unit.packs.extend(pack_ids.iter().copied());
            for (zone_id, drugs) in patient_zone_drugs(*pid) {
                unit.zone_drugs.entry(zone_id).or_default().extend(drugs);
            }
            if let Some(forced) = patient_forced.get(pid) {
                unit.forced_manual_drugs.extend(forced.iter().cloned());
            }
            if let Some(whole) = patient_whole.get(pid) {
                unit_whole.entry(key).or_default().extend(whole.iter().cloned());
            }
            unit.half_pill_penalty += patient_penalty.get(pid).copied().unwrap_or(0);

            // 患者取最早交付日期；机构取其患者中最晚的交付日期
            if let Some(date) = patient_dates.get(pid) {
                unit.delivery_date = Some(match unit.delivery_date {
                    Some(existing) => existing.max(*date),
                    None => *date,
                });
            }
        }

        let mut pack_unit = BTreeMap::new();
        for (key, unit) in units.iter_mut() {
            if let Some(whole) = unit_whole.get(key) {
                unit.forced_manual_drugs.retain(|d| !whole.contains(d));
            }
            unit.fill_date = unit
                .delivery_date
                .map(|d| fill_date_with_buffer(d, config.fill_buffer_days));
            for pack_id in &unit.packs {
                pack_unit.insert(*pack_id, *key);
            }
        }

        let data = AggregatedData {
            fill_mode: config.fill_mode,
            units,
            pack_unit,
            packs: pack_map,
            zone_old_new: zone_data.zone_old_new,
        };

        let undated = data.undated_units();
        if !undated.is_empty() {
            if config.strict_delivery_dates {
                let first = undated[0];
                return Err(SchedulerError::InsufficientData {
                    entity: match first {
                        UnitKey::Patient(_) => "Patient".to_string(),
                        UnitKey::Facility(_) => "Facility".to_string(),
                    },
                    id: first.id().to_string(),
                    message: format!("{} 个排产单元缺少交付日期", undated.len()),
                });
            }
            debug!(undated = undated.len(), "存在缺少交付日期的单元，将计入超载");
        }

        debug!(units = data.units.len(), "聚合完成");
        Ok(data)
    }
}

impl Default for PatientAggregator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::pack::SlotDrug;

    // 测试辅助函数
    fn create_test_pack(
        pack_id: PackId,
        patient_id: PatientId,
        facility_id: FacilityId,
        date: Option<(u32, u32)>,
        drugs: &[(&str, f64, bool)],
    ) -> Pack {
        let mut slots = BTreeMap::new();
        for (i, (ndc, qty, alt)) in drugs.iter().enumerate() {
            slots.insert(
                i as u32,
                vec![SlotDrug {
                    drug: DrugKey::new(*ndc, "1"),
                    quantity: *qty,
                    alternate_allowed: *alt,
                }],
            );
        }
        Pack {
            pack_id,
            patient_id,
            facility_id,
            delivery_date: date.map(|(m, d)| NaiveDate::from_ymd_opt(2024, m, d).unwrap()),
            slots,
        }
    }

    fn create_test_zone() -> Zone {
        Zone {
            zone_id: 1,
            system_ids: vec![100],
            canister_drugs: BTreeSet::from([DrugKey::new("A", "1"), DrugKey::new("B", "1")]),
            quadrant_canister_capacity: 10,
            quadrant_count: 2,
        }
    }

    #[test]
    fn test_patient_wise_aggregation() {
        let packs = vec![
            create_test_pack(1, 10, 7, Some((1, 12)), &[("A", 1.0, false), ("B", 0.5, false)]),
            create_test_pack(2, 10, 7, Some((1, 10)), &[("C", 1.0, false)]),
            create_test_pack(3, 11, 7, None, &[("A", 1.0, false)]),
        ];
        let zone = create_test_zone();
        let data = PatientAggregator::new()
            .aggregate(&packs, &[zone.clone()], &[], &SchedulerConfig::default())
            .unwrap();

        let p10 = UnitKey::Patient(10);
        assert_eq!(data.pack_count(&p10), 2);
        // 患者取最早交付日期
        assert_eq!(
            data.fill_date(&p10),
            Some(NaiveDate::from_ymd_opt(2024, 1, 10).unwrap())
        );
        // B 仅半片 -> 不可上罐
        assert_eq!(
            data.canister_drugs(&p10, &zone),
            BTreeSet::from([DrugKey::new("A", "1")])
        );
        assert_eq!(data.unit(&p10).unwrap().half_pill_penalty, 1);
        assert_eq!(data.undated_units(), vec![UnitKey::Patient(11)]);
        assert_eq!(data.pack_unit[&3], UnitKey::Patient(11));
    }

    #[test]
    fn test_facility_wise_uses_latest_patient_date() {
        let packs = vec![
            create_test_pack(1, 10, 7, Some((1, 12)), &[("A", 1.0, false)]),
            create_test_pack(2, 11, 7, Some((1, 15)), &[("B", 1.0, false)]),
        ];
        let config = SchedulerConfig {
            fill_mode: FillMode::FacilityWise,
            ..SchedulerConfig::default()
        };
        let data = PatientAggregator::new()
            .aggregate(&packs, &[create_test_zone()], &[], &config)
            .unwrap();

        let facility = UnitKey::Facility(7);
        assert_eq!(data.units.len(), 1);
        assert_eq!(data.unit(&facility).unwrap().patients, vec![10, 11]);
        assert_eq!(
            data.fill_date(&facility),
            Some(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert_eq!(data.zone_drugs(&facility, 1).len(), 2);
    }

    #[test]
    fn test_strict_mode_rejects_undated() {
        let packs = vec![create_test_pack(1, 10, 7, None, &[("A", 1.0, false)])];
        let config = SchedulerConfig {
            strict_delivery_dates: true,
            ..SchedulerConfig::default()
        };
        let err = PatientAggregator::new()
            .aggregate(&packs, &[create_test_zone()], &[], &config)
            .unwrap_err();
        assert!(matches!(err, SchedulerError::InsufficientData { ref id, .. } if id == "10"));
    }

    #[test]
    fn test_duplicate_pack_id_rejected() {
        let packs = vec![
            create_test_pack(1, 10, 7, Some((1, 3)), &[("A", 1.0, false)]),
            create_test_pack(1, 11, 7, Some((1, 3)), &[("A", 1.0, false)]),
        ];
        assert!(matches!(
            PatientAggregator::new().aggregate(&packs, &[], &[], &SchedulerConfig::default()),
            Err(SchedulerError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_alternate_substitution_in_zone_drugs() {
        let packs = vec![create_test_pack(1, 10, 7, Some((1, 3)), &[("Z", 1.0, true)])];
        let alternates = vec![AlternateOption {
            drug: DrugKey::new("Z", "1"),
            alternate: DrugKey::new("A", "1"),
            zone_id: 1,
            canister_count: 1,
            available_quantity: 100,
        }];
        let zone = create_test_zone();
        let data = PatientAggregator::new()
            .aggregate(&packs, &[zone.clone()], &alternates, &SchedulerConfig::default())
            .unwrap();
        let unit = UnitKey::Patient(10);
        assert_eq!(data.canister_drugs(&unit, &zone).len(), 1);
        assert_eq!(data.zone_old_new[&1][&DrugKey::new("Z", "1")], DrugKey::new("A", "1"));
    }

    #[test]
    fn test_fractional_drug_classified_per_pack() {
        // B 在 1 号盒为半片，在 2 号盒为整片；C 在所有药盒都是半片
        let packs = vec![
            create_test_pack(1, 10, 7, Some((1, 12)), &[("B", 0.5, false), ("C", 0.5, false)]),
            create_test_pack(2, 10, 7, Some((1, 12)), &[("B", 1.0, false)]),
            create_test_pack(3, 11, 7, Some((1, 12)), &[("A", 0.5, false)]),
            create_test_pack(4, 12, 7, Some((1, 12)), &[("A", 2.0, false)]),
        ];
        let zone = Zone {
            canister_drugs: BTreeSet::from([
                DrugKey::new("A", "1"),
                DrugKey::new("B", "1"),
                DrugKey::new("C", "1"),
            ]),
            ..create_test_zone()
        };
        let data = PatientAggregator::new()
            .aggregate(&packs, &[zone.clone()], &[], &SchedulerConfig::default())
            .unwrap();

        let p10 = UnitKey::Patient(10);
        assert_eq!(
            data.unit(&p10).unwrap().forced_manual_drugs,
            BTreeSet::from([DrugKey::new("C", "1")])
        );
        assert_eq!(
            data.canister_drugs(&p10, &zone),
            BTreeSet::from([DrugKey::new("B", "1")])
        );
        assert!(data.canister_drugs(&UnitKey::Patient(11), &zone).is_empty());

        // 机构维度: 患者 12 的整片 A 使机构单元的 A 可上罐
        let config = SchedulerConfig {
            fill_mode: FillMode::FacilityWise,
            ..SchedulerConfig::default()
        };
        let data = PatientAggregator::new()
            .aggregate(&packs, &[zone.clone()], &[], &config)
            .unwrap();
        assert_eq!(
            data.canister_drugs(&UnitKey::Facility(7), &zone),
            BTreeSet::from([DrugKey::new("A", "1"), DrugKey::new("B", "1")])
        );
    }
}
