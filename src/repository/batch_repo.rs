// ==========================================
// 药盒分装排产系统 - 批次仓储
// ==========================================
// 红线: Repository 不含业务逻辑
// 存储: batch / batch_pack / batch_sequence 表
// 并发: batch_sequence 作为乐观锁，整次提交在单事务内完成
// ==========================================

use crate::domain::batch::Batch;
use crate::domain::pack::SystemId;
use crate::repository::error::{RepositoryError, RepositoryResult};
use chrono::NaiveDate;
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use tracing::info;
use uuid::Uuid;

/// 设备最近一次提交的批次概要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LastBatchInfo {
    pub batch_id: String,
    pub start_date: NaiveDate,
    pub pack_count: usize,
}

/// 批次仓储
pub struct BatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BatchRepository {
    /// 从已有连接创建仓储实例
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<std::sync::MutexGuard<Connection>> {
        Ok(self.conn.lock()?)
    }

    /// 读取设备当前批次序号 (无记录视为 0)
    pub fn current_sequence(&self, system_id: SystemId) -> RepositoryResult<i64> {
        let conn = self.get_conn()?;
        let seq = conn
            .query_row(
                "SELECT sequence FROM batch_sequence WHERE system_id = ?1",
                params![system_id],
                |row| row.get::<_, i64>(0),
            )
            .optional()?;
        Ok(seq.unwrap_or(0))
    }

    /// 设备最近提交的批次 (按开始日期)
    ///
    /// # 返回
    /// - Ok(None): 设备没有历史批次
    pub fn last_batch(&self, system_id: SystemId) -> RepositoryResult<Option<LastBatchInfo>> {
        let conn = self.get_conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT b.batch_id, b.start_date,
                       (SELECT COUNT(*) FROM batch_pack bp WHERE bp.batch_id = b.batch_id)
                FROM batch b
                WHERE b.system_id = ?1
                ORDER BY b.start_date DESC, b.sequence DESC, b.batch_no DESC
                LIMIT 1
                "#,
                params![system_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                    ))
                },
            )
            .optional()?;

        match row {
            None => Ok(None),
            Some((batch_id, raw_date, pack_count)) => {
                let start_date = NaiveDate::parse_from_str(&raw_date, "%Y-%m-%d").map_err(|e| {
                    RepositoryError::ValidationError(format!("日期格式错误 '{}': {}", raw_date, e))
                })?;
                Ok(Some(LastBatchInfo {
                    batch_id,
                    start_date,
                    pack_count: pack_count.max(0) as usize,
                }))
            }
        }
    }

    /// 提交单台设备的批次
    ///
    /// # 参数
    /// - system_id: 设备
    /// - expected_sequence: 排产开始时读取的序号
    /// - run_id: 本次排产标识
    /// - batches: 有序批次列表
    ///
    /// # 返回
    /// - Ok(新序号)
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: 序号已被其他排产推进，不写入任何数据
    pub fn commit_batches(
        &self,
        system_id: SystemId,
        expected_sequence: i64,
        run_id: &str,
        batches: &[Batch],
    ) -> RepositoryResult<i64> {
        let committed = self.commit_run(
            run_id,
            &[SystemBatches {
                system_id,
                expected_sequence,
                batches,
            }],
        )?;
        Ok(committed.get(&system_id).copied().unwrap_or(expected_sequence + 1))
    }

    /// 提交一次排产涉及的全部设备批次 (单事务)
    ///
    /// # 返回
    /// - Ok(设备 -> 新序号)
    ///
    /// # 错误
    /// - `RepositoryError::OptimisticLockFailure`: 任一设备序号已被推进，整次提交回滚
    /// - `RepositoryError::ValidationError`: 同一设备出现多次
    pub fn commit_run(
        &self,
        run_id: &str,
        systems: &[SystemBatches<'_>],
    ) -> RepositoryResult<BTreeMap<SystemId, i64>> {
        let mut conn = self.get_conn()?;
        let tx = conn.transaction()?;

        // 1. 乐观锁检查 (全部设备先校验，再写入)
        let mut next_sequences = BTreeMap::new();
        for entry in systems {
            let actual: i64 = tx
                .query_row(
                    "SELECT sequence FROM batch_sequence WHERE system_id = ?1",
                    params![entry.system_id],
                    |row| row.get(0),
                )
                .optional()?
                .unwrap_or(0);
            if actual != entry.expected_sequence {
                return Err(RepositoryError::OptimisticLockFailure {
                    system_id: entry.system_id,
                    expected: entry.expected_sequence,
                    actual,
                });
            }
            if next_sequences.insert(entry.system_id, actual + 1).is_some() {
                return Err(RepositoryError::ValidationError(format!(
                    "设备 {} 在同一次提交中出现多次",
                    entry.system_id
                )));
            }
        }

        // 2. 写入批次与药盒
        for entry in systems {
            let next_sequence = next_sequences[&entry.system_id];
            for batch in entry.batches {
                insert_batch(&tx, entry.system_id, run_id, next_sequence, batch)?;
            }

            // 3. 推进序号
            tx.execute(
                r#"INSERT INTO batch_sequence (system_id, sequence) VALUES (?1, ?2)
                   ON CONFLICT(system_id) DO UPDATE SET sequence = ?2"#,
                params![entry.system_id, next_sequence],
            )?;
        }

        tx.commit()
            .map_err(|e| RepositoryError::DatabaseTransactionError(e.to_string()))?;

        let batch_count: usize = systems.iter().map(|e| e.batches.len()).sum();
        info!(run_id, systems = systems.len(), batches = batch_count, "批次已提交");
        Ok(next_sequences)
    }
}

/// 单台设备待提交的批次
#[derive(Debug, Clone, Copy)]
pub struct SystemBatches<'a> {
    pub system_id: SystemId,
    pub expected_sequence: i64,
    pub batches: &'a [Batch],
}

fn insert_batch(
    tx: &Transaction<'_>,
    system_id: SystemId,
    run_id: &str,
    sequence: i64,
    batch: &Batch,
) -> RepositoryResult<()> {
    let batch_id = Uuid::new_v4().to_string();
    let analysis_json = serde_json::to_string(&batch.analysis)
        .map_err(|e| RepositoryError::ValidationError(e.to_string()))?;
    tx.execute(
        r#"INSERT INTO batch (
               batch_id, system_id, run_id, sequence, batch_no, name,
               start_date, end_date, hours, minutes, analysis_json, cut_reason
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"#,
        params![
            batch_id,
            system_id,
            run_id,
            sequence,
            batch.batch_no,
            batch.name,
            batch.start_date.format("%Y-%m-%d").to_string(),
            batch.end_date.format("%Y-%m-%d").to_string(),
            batch.processing_time.hours,
            batch.processing_time.minutes,
            analysis_json,
            batch.cut_reason.map(|r| r.to_string()),
        ],
    )?;

    let mut stmt =
        tx.prepare_cached("INSERT INTO batch_pack (batch_id, pack_id, seq_no) VALUES (?1, ?2, ?3)")?;
    for (seq_no, pack_id) in batch.pack_ids.iter().enumerate() {
        stmt.execute(params![batch_id, pack_id, seq_no as i64])?;
    }
    Ok(())
}
