// ==========================================
// 药盒分装排产系统 - 领域类型定义
// ==========================================
// 职责: 策略枚举、日期类别、分配去向、切批原因
// 序列化格式: SCREAMING_SNAKE_CASE (与 config_kv 存储一致)
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 分装模式 (Fill Mode)
// ==========================================
// 患者维度与机构维度互斥，由配置切换
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FillMode {
    PatientWise,  // 按患者聚合
    FacilityWise, // 按机构聚合
}

impl FillMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FillMode::PatientWise => "PATIENT_WISE",
            FillMode::FacilityWise => "FACILITY_WISE",
        }
    }
}

impl Default for FillMode {
    fn default() -> Self {
        FillMode::PatientWise
    }
}

impl fmt::Display for FillMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FillMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "PATIENT_WISE" | "PATIENT" => Ok(FillMode::PatientWise),
            "FACILITY_WISE" | "FACILITY" => Ok(FillMode::FacilityWise),
            other => Err(format!("未知分装模式: {}", other)),
        }
    }
}

// ==========================================
// 批次重排逻辑 (Sort Logic)
// ==========================================
// 切批后按上一批次罐装药品重排剩余队列
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SortLogic {
    Legacy,  // 与上批共有药品数降序
    Updated, // 与上批非共有药品数升序
}

impl SortLogic {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortLogic::Legacy => "LEGACY",
            SortLogic::Updated => "UPDATED",
        }
    }
}

impl fmt::Display for SortLogic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SortLogic {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LEGACY" => Ok(SortLogic::Legacy),
            "UPDATED" => Ok(SortLogic::Updated),
            other => Err(format!("未知排序逻辑: {}", other)),
        }
    }
}

// ==========================================
// 超载分配方式 (Overload Distribution Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverloadDistributionType {
    Automatic, // 仅自动设备
    Manual,    // 仅人工
    Both,      // 自动/人工按比例拆分
}

impl fmt::Display for OverloadDistributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OverloadDistributionType::Automatic => write!(f, "AUTOMATIC"),
            OverloadDistributionType::Manual => write!(f, "MANUAL"),
            OverloadDistributionType::Both => write!(f, "BOTH"),
        }
    }
}

// ==========================================
// 日期类别 (Day Kind)
// ==========================================
// 决定取哪一组工时配置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DayKind {
    Weekday,
    Saturday,
    Sunday,
}

impl DayKind {
    /// 按星期几归类
    pub fn of(date: chrono::NaiveDate) -> Self {
        use chrono::{Datelike, Weekday};
        match date.weekday() {
            Weekday::Sat => DayKind::Saturday,
            Weekday::Sun => DayKind::Sunday,
            _ => DayKind::Weekday,
        }
    }
}

// ==========================================
// 分配去向 (Assignment)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Assignment {
    Automatic,  // 自动分装设备
    Manual,     // 人工分装
    Overloaded, // 超出总产能
}

impl fmt::Display for Assignment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Assignment::Automatic => write!(f, "AUTOMATIC"),
            Assignment::Manual => write!(f, "MANUAL"),
            Assignment::Overloaded => write!(f, "OVERLOADED"),
        }
    }
}

// ==========================================
// 切批原因 (Cut Reason)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CutReason {
    UniqueDrugTarget, // 罐装药品数落入目标窗口
    DurationLimit,    // 处理时长达到上限
    MfdThreshold,     // 人工槽位超过 MFD 阈值
    QueueExhausted,   // 队列耗尽
}

impl fmt::Display for CutReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CutReason::UniqueDrugTarget => write!(f, "UNIQUE_DRUG_TARGET"),
            CutReason::DurationLimit => write!(f, "DURATION_LIMIT"),
            CutReason::MfdThreshold => write!(f, "MFD_THRESHOLD"),
            CutReason::QueueExhausted => write!(f, "QUEUE_EXHAUSTED"),
        }
    }
}
