// ==========================================
// IT 资产处置 ERP - 批次数据仓储
// ==========================================
// 对齐: batches / batch_cost_totals 表
// 红线: Repository 不含业务逻辑; 累加使用 SQL 原子自增
// ==========================================

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::batch::Batch;
use crate::domain::money::Money;
use crate::domain::types::CostKind;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, get_ts};

// ==========================================
// BatchRepository - 批次仓储
// ==========================================
pub struct BatchRepository {
    conn: Arc<Mutex<Connection>>,
}

impl BatchRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    // ==========================================
    // 写入操作 (事务内)
    // ==========================================

    /// 插入新批次 (含非零成本小计)
    pub fn insert_tx(conn: &Connection, batch: &Batch) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO batches (
                batch_id, warehouse_code, ticket_id, batch_reference, unit_count,
                revenue_total, unit_sale_price, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                batch.batch_id,
                batch.warehouse_code,
                batch.ticket_id,
                batch.batch_reference,
                batch.unit_count,
                batch.revenue_total,
                batch.unit_sale_price,
                format_ts(&batch.created_at),
                format_ts(&batch.updated_at),
            ],
        )?;

        for (kind, amount) in &batch.cost_totals {
            Self::add_cost_tx(conn, &batch.batch_id, *kind, *amount, batch.updated_at)?;
        }
        Ok(())
    }

    /// 成本小计原子累加
    ///
    /// 调用方须先确认批次存在 (外键保证不会写入孤儿行)
    pub fn add_cost_tx(
        conn: &Connection,
        batch_id: &str,
        kind: CostKind,
        amount: Money,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let ts = format_ts(&now);
        conn.execute(
            r#"
            INSERT INTO batch_cost_totals (batch_id, cost_kind, amount, updated_at)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT(batch_id, cost_kind) DO UPDATE SET
                amount = amount + excluded.amount,
                updated_at = excluded.updated_at
            "#,
            params![batch_id, kind.as_str(), amount, ts],
        )?;
        Self::touch_tx(conn, batch_id, now)
    }

    /// 收入原子累加
    pub fn add_revenue_tx(
        conn: &Connection,
        batch_id: &str,
        amount: Money,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE batches SET revenue_total = revenue_total + ?1, updated_at = ?2 WHERE batch_id = ?3",
            params![amount, format_ts(&now), batch_id],
        )?;
        Self::expect_one(rows, batch_id)
    }

    /// 覆盖批次单价
    pub fn set_unit_sale_price_tx(
        conn: &Connection,
        batch_id: &str,
        price: Money,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE batches SET unit_sale_price = ?1, updated_at = ?2 WHERE batch_id = ?3",
            params![price, format_ts(&now), batch_id],
        )?;
        Self::expect_one(rows, batch_id)
    }

    /// 设备数 +1
    pub fn increment_unit_count_tx(
        conn: &Connection,
        batch_id: &str,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE batches SET unit_count = unit_count + 1, updated_at = ?1 WHERE batch_id = ?2",
            params![format_ts(&now), batch_id],
        )?;
        Self::expect_one(rows, batch_id)
    }

    fn touch_tx(conn: &Connection, batch_id: &str, now: DateTime<Utc>) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE batches SET updated_at = ?1 WHERE batch_id = ?2",
            params![format_ts(&now), batch_id],
        )?;
        Self::expect_one(rows, batch_id)
    }

    fn expect_one(rows: usize, batch_id: &str) -> RepositoryResult<()> {
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Batch".to_string(),
                id: batch_id.to_string(),
            });
        }
        Ok(())
    }

    // ==========================================
    // 查询操作
    // ==========================================

    /// 在给定连接/事务上读取批次 (含成本小计)
    pub fn find_by_id_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Option<Batch>> {
        let batch = conn
            .query_row(
                r#"
                SELECT batch_id, warehouse_code, ticket_id, batch_reference, unit_count,
                       revenue_total, unit_sale_price, created_at, updated_at
                FROM batches
                WHERE batch_id = ?1
                "#,
                params![batch_id],
                |row| {
                    Ok(Batch {
                        batch_id: row.get(0)?,
                        warehouse_code: row.get(1)?,
                        ticket_id: row.get(2)?,
                        batch_reference: row.get(3)?,
                        unit_count: row.get(4)?,
                        cost_totals: BTreeMap::new(),
                        revenue_total: row.get(5)?,
                        unit_sale_price: row.get(6)?,
                        created_at: get_ts(row, 7)?,
                        updated_at: get_ts(row, 8)?,
                    })
                },
            )
            .optional()?;

        let Some(mut batch) = batch else {
            return Ok(None);
        };

        let mut stmt = conn.prepare(
            "SELECT cost_kind, amount FROM batch_cost_totals WHERE batch_id = ?1",
        )?;
        let rows = stmt.query_map(params![batch_id], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, Money>(1)?))
        })?;
        for row in rows {
            let (raw_kind, amount) = row?;
            match CostKind::from_str(&raw_kind) {
                Some(kind) => {
                    batch.cost_totals.insert(kind, amount);
                }
                None => {
                    return Err(RepositoryError::FieldValueError {
                        field: "cost_kind".to_string(),
                        message: format!("未知成本科目: {}", raw_kind),
                    })
                }
            }
        }

        Ok(Some(batch))
    }

    pub fn find_by_id(&self, batch_id: &str) -> RepositoryResult<Option<Batch>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, batch_id)
    }

    /// 批次关联的工单号
    pub fn find_ticket_id_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<Option<String>> {
        let ticket: Option<Option<String>> = conn
            .query_row(
                "SELECT ticket_id FROM batches WHERE batch_id = ?1",
                params![batch_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(ticket.flatten())
    }

    pub fn exists_tx(conn: &Connection, batch_id: &str) -> RepositoryResult<bool> {
        let found = conn
            .query_row(
                "SELECT 1 FROM batches WHERE batch_id = ?1",
                params![batch_id],
                |_row| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }
}
