// ==========================================
// 药盒分装排产系统 - 排产 API
// ==========================================
// 职责: 读取设置与历史批次 -> 内存排产 -> 提交批次；超载药盒分配
// 约束: 数据库只在排产前后访问，排产过程为纯内存计算
// ==========================================

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use rusqlite::Connection;
use serde::Serialize;
use tracing::{info, instrument, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::{ConfigManager, SettingsReader, SystemTimings};
use crate::db::ensure_schema;
use crate::domain::capacity::ExtraHoursOwner;
use crate::domain::overload::OverloadDistribution;
use crate::domain::pack::SystemId;
use crate::domain::request::{ManualFillRequest, OverloadRequest, SchedulingRequest};
use crate::engine::calendar::CapacityCalendar;
use crate::engine::manual_fill::{ManualFillInput, ManualFillOptimizer, ManualFillPlan};
use crate::engine::orchestrator::{ScheduleOrchestrator, ScheduleOutcome};
use crate::engine::overload::{OverloadDistributor, OverloadResources};
use crate::repository::batch_repo::{BatchRepository, SystemBatches};
use crate::repository::error::RepositoryError;

// ==========================================
// PlanResponse - 排产响应
// ==========================================
#[derive(Debug, Clone, Serialize)]
pub struct PlanResponse {
    pub outcome: ScheduleOutcome,
    pub sequences: BTreeMap<SystemId, i64>, // 排产开始时读取的批次序号，提交时校验
}

// ==========================================
// ScheduleApi - 排产 API
// ==========================================
pub struct ScheduleApi {
    config_manager: Arc<ConfigManager>,
    batch_repo: Arc<BatchRepository>,
    orchestrator: ScheduleOrchestrator<ConfigManager>,
    overload: OverloadDistributor,
    manual_fill: ManualFillOptimizer,
}

impl ScheduleApi {
    /// 创建新的 ScheduleApi 实例
    pub fn new(config_manager: Arc<ConfigManager>, batch_repo: Arc<BatchRepository>) -> Self {
        Self {
            orchestrator: ScheduleOrchestrator::new(config_manager.clone()),
            overload: OverloadDistributor::new(),
            manual_fill: ManualFillOptimizer::new(),
            config_manager,
            batch_repo,
        }
    }

    /// 基于已有连接创建 (建表幂等)
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ApiResult<Self> {
        {
            let guard = conn.lock().map_err(RepositoryError::from)?;
            ensure_schema(&guard).map_err(|e| ApiError::DatabaseError(e.to_string()))?;
        }
        let config_manager = Arc::new(ConfigManager::from_connection(conn.clone())?);
        let batch_repo = Arc::new(BatchRepository::from_connection(conn));
        Ok(Self::new(config_manager, batch_repo))
    }

    pub fn config_manager(&self) -> &ConfigManager {
        &self.config_manager
    }

    // ==========================================
    // 排产
    // ==========================================

    /// 执行一次排产 (不提交)
    ///
    /// # 说明
    /// - 请求未给出设备截止日时，由该设备最近提交的批次推算
    /// - 返回的 sequences 供 commit 做乐观锁校验
    ///
    /// # 返回
    /// - Err(InvalidInput): 药盒列表为空
    #[instrument(skip_all, fields(company_id = request.company_id, packs = request.packs.len()))]
    pub fn plan(&self, mut request: SchedulingRequest) -> ApiResult<PlanResponse> {
        if request.packs.is_empty() {
            return Err(ApiError::InvalidInput("药盒列表为空".to_string()));
        }

        let mut sequences = BTreeMap::new();
        let system_ids: Vec<SystemId> = request.zones.iter().filter_map(|z| z.primary_system()).collect();
        for system_id in system_ids {
            sequences.insert(system_id, self.batch_repo.current_sequence(system_id)?);
            if request.system_end_dates.contains_key(&system_id) {
                continue;
            }
            if let Some(end_date) = self.system_end_date(system_id)? {
                request.system_end_dates.insert(system_id, end_date);
            }
        }

        let outcome = self.orchestrator.run(&request)?;
        Ok(PlanResponse { outcome, sequences })
    }

    /// 提交排产产生的批次
    ///
    /// # 说明
    /// - 全部设备在同一事务内校验序号并写入，任一设备冲突则整次不写入
    ///
    /// # 返回
    /// - 设备 -> 新批次序号
    /// - Err(OptimisticLockFailure): 排产期间某台设备已有其他提交
    #[instrument(skip_all, fields(run_id = %response.outcome.run_id))]
    pub fn commit(&self, response: &PlanResponse) -> ApiResult<BTreeMap<SystemId, i64>> {
        let systems: Vec<SystemBatches<'_>> = response
            .outcome
            .zones
            .iter()
            .filter(|zone| !zone.batches.is_empty())
            .map(|zone| SystemBatches {
                system_id: zone.system_id,
                expected_sequence: response.sequences.get(&zone.system_id).copied().unwrap_or(0),
                batches: &zone.batches,
            })
            .collect();

        let committed = self
            .batch_repo
            .commit_run(&response.outcome.run_id, &systems)?;
        info!(systems = committed.len(), "排产结果已提交");
        Ok(committed)
    }

    /// 设备当前排产截止日: 最近提交批次的开始日期 + 药盒数逐日推进 (含该设备加班)
    fn system_end_date(&self, system_id: SystemId) -> ApiResult<Option<chrono::NaiveDate>> {
        let Some(last) = self.batch_repo.last_batch(system_id)? else {
            return Ok(None);
        };
        let timings = self.config_manager.system_timings(system_id)?;
        let packs = last.pack_count as i64;

        // 加班只会提前完成，不含加班的结束日期即查询上界
        let upper = CapacityCalendar::new(timings.automatic, Default::default())
            .get_end_date(packs, last.start_date)
            .end_date;
        let extra = self.config_manager.extra_hours(
            ExtraHoursOwner::System(system_id),
            last.start_date,
            upper,
        )?;
        let walk = CapacityCalendar::new(timings.automatic, extra).get_end_date(packs, last.start_date);
        Ok(Some(walk.end_date))
    }

    // ==========================================
    // 超载分配
    // ==========================================

    /// 把超载药盒分给所选设备/人员
    ///
    /// # 返回
    /// - Err(InvalidInput): 未选择任何设备或人员
    /// - Err(Configuration): 所选设备或人工工时配置缺失
    #[instrument(skip_all, fields(company_id = request.company_id, packs = request.packs.len()))]
    pub fn distribute_overload(&self, request: &OverloadRequest) -> ApiResult<OverloadDistribution> {
        let Some(distribution_type) = request.distribution_type() else {
            return Err(ApiError::InvalidInput("未选择自动设备或人工人员".to_string()));
        };

        let mut systems: Vec<(SystemId, SystemTimings)> = Vec::new();
        for system_id in request.automatic_systems.iter().flatten() {
            systems.push((*system_id, self.config_manager.system_timings(*system_id)?));
        }
        let users = request.manual_users.clone().unwrap_or_default();
        let manual = if users.is_empty() {
            None
        } else {
            Some(self.config_manager.manual_timings()?)
        };
        let config = self.config_manager.scheduler_config()?;

        let resources = OverloadResources {
            systems: &systems,
            users: &users,
            manual: manual.as_ref(),
            automatic_share_percent: config.overload_automatic_share_percent,
        };
        let distribution = self
            .overload
            .distribute(&request.packs, &request.schedule_dates, &resources)?;

        if !distribution.unassigned_packs.is_empty() {
            warn!(count = distribution.unassigned_packs.len(), "存在无法分配的超载药盒");
        }
        info!(distribution_type = ?distribution_type, "超载分配完成");
        Ok(distribution)
    }

    // ==========================================
    // 人工分装优化
    // ==========================================

    /// 按人工比例拆分罐装/人工药盒，可选分给人工人员
    ///
    /// # 返回
    /// - Err(InvalidInput): 人工比例超过 100
    /// - Err(Configuration): 指定了人员但人工工时配置缺失
    #[instrument(skip_all, fields(company_id = request.company_id, packs = request.packs.len()))]
    pub fn optimise_manual_fill(&self, request: &ManualFillRequest) -> ApiResult<ManualFillPlan> {
        let config = self.config_manager.scheduler_config()?;
        let manual_per_hour = if request.manual_users.is_empty() {
            0
        } else {
            self.config_manager.manual_timings()?.per_user.per_hour
        };

        let plan = self.manual_fill.optimise(&ManualFillInput {
            packs: &request.packs,
            canister_drugs: &request.canister_drugs,
            manual_percent: request.manual_percent,
            max_allowed_manual_fill: request.max_allowed_manual_fill,
            half_pill_drops_per_penalty: config.half_pill_drops_per_penalty,
            users: &request.manual_users,
            manual_per_hour,
            include_undated: request.include_undated,
        })?;
        Ok(plan)
    }

    /// 记录加班工时
    pub fn set_extra_hours(
        &self,
        owner: ExtraHoursOwner,
        date: chrono::NaiveDate,
        hours: f64,
    ) -> ApiResult<()> {
        if !(0.0..=24.0).contains(&hours) {
            return Err(ApiError::InvalidInput(format!("加班小时超出范围: {}", hours)));
        }
        self.config_manager.extra_hours_repo().upsert(owner, date, hours)?;
        Ok(())
    }
}
