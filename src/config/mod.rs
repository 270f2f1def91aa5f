// ==========================================
// 药盒分装排产系统 - 配置层
// ==========================================
// 职责: 工时设置解析、排产策略配置、设置读取接口
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod scheduler_config;
pub mod settings_reader;
pub mod timings;

// 重导出核心配置类型
pub use config_manager::{ConfigManager, ConfigScope};
pub use scheduler_config::{scheduler_keys, SchedulerConfig};
pub use settings_reader::{SettingsReader, StaticSettings};
pub use timings::{timing_keys, ManualTimings, ResourceTimings, SystemTimings};
