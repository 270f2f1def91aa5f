// ==========================================
// 药盒分装排产系统 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、写入
// 存储: config_kv 表 (key-value + scope)
//   - scope 'global': 公司级人工设置 + 排产策略
//   - scope 'system/{id}': 自动设备工时设置
// ==========================================

use crate::config::scheduler_config::SchedulerConfig;
use crate::config::settings_reader::SettingsReader;
use crate::db::{configure_sqlite_connection, open_sqlite_connection};
use crate::domain::capacity::{ExtraHoursMap, ExtraHoursOwner};
use crate::domain::pack::SystemId;
use crate::engine::error::SchedulerResult;
use crate::repository::error::RepositoryResult;
use crate::repository::extra_hours_repo::ExtraHoursRepository;
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// 配置作用域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigScope {
    Global,
    System(SystemId),
}

impl ConfigScope {
    pub fn scope_id(&self) -> String {
        match self {
            ConfigScope::Global => "global".to_string(),
            ConfigScope::System(id) => format!("system/{}", id),
        }
    }
}

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
    extra_hours_repo: ExtraHoursRepository,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> RepositoryResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        Ok(Self::build(Arc::new(Mutex::new(conn))))
    }

    /// 从已有连接创建 ConfigManager
    ///
    /// 会对传入连接再次应用统一 PRAGMA（幂等）。
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn.lock()?;
            configure_sqlite_connection(&guard)?;
        }
        Ok(Self::build(conn))
    }

    fn build(conn: Arc<Mutex<Connection>>) -> Self {
        Self {
            extra_hours_repo: ExtraHoursRepository::from_connection(conn.clone()),
            conn,
        }
    }

    /// 读取单个配置值
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_config_value(&self, scope: ConfigScope, key: &str) -> RepositoryResult<Option<String>> {
        let conn = self.conn.lock()?;

        let result = conn.query_row(
            "SELECT value FROM config_kv WHERE scope_id = ?1 AND key = ?2",
            params![scope.scope_id(), key],
            |row| row.get::<_, String>(0),
        );

        match result {
            Ok(value) => Ok(Some(value)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// 写入配置值 (UPSERT)
    pub fn set_config_value(&self, scope: ConfigScope, key: &str, value: &str) -> RepositoryResult<()> {
        let conn = self.conn.lock()?;
        conn.execute(
            r#"INSERT INTO config_kv (scope_id, key, value) VALUES (?1, ?2, ?3)
               ON CONFLICT(scope_id, key) DO UPDATE SET value = ?3, updated_at = CURRENT_TIMESTAMP"#,
            params![scope.scope_id(), key, value],
        )?;
        Ok(())
    }

    /// 读取某个作用域下全部配置
    pub fn get_scope(&self, scope: ConfigScope) -> RepositoryResult<HashMap<String, String>> {
        let conn = self.conn.lock()?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = ?1 ORDER BY key")?;

        let rows = stmt.query_map(params![scope.scope_id()], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut config_map = HashMap::new();
        for row in rows {
            let (key, value) = row?;
            config_map.insert(key, value);
        }
        Ok(config_map)
    }

    /// 加班工时仓储
    pub fn extra_hours_repo(&self) -> &ExtraHoursRepository {
        &self.extra_hours_repo
    }
}

// ==========================================
// SettingsReader Trait 实现
// ==========================================
impl SettingsReader for ConfigManager {
    fn system_settings(&self, system_id: SystemId) -> SchedulerResult<HashMap<String, String>> {
        Ok(self.get_scope(ConfigScope::System(system_id))?)
    }

    fn manual_settings(&self) -> SchedulerResult<HashMap<String, String>> {
        Ok(self.get_scope(ConfigScope::Global)?)
    }

    fn scheduler_config(&self) -> SchedulerResult<SchedulerConfig> {
        Ok(SchedulerConfig::from_settings(&self.get_scope(ConfigScope::Global)?))
    }

    fn extra_hours(
        &self,
        owner: ExtraHoursOwner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> SchedulerResult<ExtraHoursMap> {
        Ok(self.extra_hours_repo.find_range(owner, from, to)?)
    }
}
