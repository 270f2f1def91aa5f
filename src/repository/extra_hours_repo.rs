// ==========================================
// 药盒分装排产系统 - 加班工时仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 存储: extra_hours 表 (owner_key + work_date)
// ==========================================

use crate::domain::capacity::{ExtraHoursMap, ExtraHoursOwner};
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection};
use std::sync::{Arc, Mutex};

/// 加班工时仓储
/// 职责: 管理 extra_hours 表的读写
pub struct ExtraHoursRepository {
    conn: Arc<Mutex<Connection>>,
}

impl ExtraHoursRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        Ok(self.conn.lock()?)
    }

    /// 写入或覆盖某日加班工时
    ///
    /// # 参数
    /// - owner: 自动设备或人工团队
    /// - date: 日期
    /// - hours: 加班小时，不可为负
    pub fn upsert(&self, owner: ExtraHoursOwner, date: NaiveDate, hours: f64) -> RepositoryResult<()> {
        if !hours.is_finite() || hours < 0.0 {
            return Err(RepositoryError::ValidationError(format!(
                "加班工时无效: owner={}, date={}, hours={}",
                owner, date, hours
            )));
        }

        let conn = self.get_conn()?;
        conn.execute(
            r#"INSERT INTO extra_hours (owner_key, work_date, hours) VALUES (?1, ?2, ?3)
               ON CONFLICT(owner_key, work_date) DO UPDATE SET hours = ?3"#,
            params![owner.owner_key(), date.format("%Y-%m-%d").to_string(), hours],
        )?;
        Ok(())
    }

    /// 查询闭区间 [from, to] 内的加班工时
    ///
    /// # 返回
    /// - 日期 -> 小时，未登记的日期不出现
    pub fn find_range(
        &self,
        owner: ExtraHoursOwner,
        from: NaiveDate,
        to: NaiveDate,
    ) -> RepositoryResult<ExtraHoursMap> {
        let conn = self.get_conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT work_date, hours
            FROM extra_hours
            WHERE owner_key = ?1 AND work_date BETWEEN ?2 AND ?3
            ORDER BY work_date
            "#,
        )?;

        let rows = stmt.query_map(
            params![
                owner.owner_key(),
                from.format("%Y-%m-%d").to_string(),
                to.format("%Y-%m-%d").to_string()
            ],
            |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut result = ExtraHoursMap::new();
        for row in rows {
            let (raw_date, hours) = row?;
            let date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|e| {
                RepositoryError::ValidationError(format!("日期格式错误 '{}': {}", raw_date, e))
            })?;
            result.insert(date, hours);
        }
        Ok(result)
    }
}
