// ==========================================
// IT 资产处置 ERP - 设备单元数据仓储
// ==========================================
// 对齐: units 表
// ==========================================

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::domain::batch::Unit;
use crate::domain::money::Money;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::row_utils::{format_ts, get_ts};

pub struct UnitRepository {
    conn: Arc<Mutex<Connection>>,
}

impl UnitRepository {
    pub fn new(conn: Arc<Mutex<Connection>>) -> Self {
        Self { conn }
    }

    fn get_conn(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }

    pub fn insert_tx(conn: &Connection, unit: &Unit) -> RepositoryResult<()> {
        conn.execute(
            r#"
            INSERT INTO units (
                unit_id, batch_id, warehouse_code, serial_number, sale_price, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                unit.unit_id,
                unit.batch_id,
                unit.warehouse_code,
                unit.serial_number,
                unit.sale_price,
                format_ts(&unit.created_at),
                format_ts(&unit.updated_at),
            ],
        )?;
        Ok(())
    }

    /// 批次内设备快照 (按 unit_id 升序)
    ///
    /// warehouse_code 为空时不按仓库过滤
    pub fn list_by_batch_tx(
        conn: &Connection,
        batch_id: &str,
        warehouse_code: Option<&str>,
    ) -> RepositoryResult<Vec<Unit>> {
        let mut stmt = conn.prepare(
            r#"
            SELECT unit_id, batch_id, warehouse_code, serial_number, sale_price, created_at, updated_at
            FROM units
            WHERE batch_id = ?1
              AND (?2 IS NULL OR warehouse_code = ?2)
            ORDER BY unit_id ASC
            "#,
        )?;
        let units = stmt
            .query_map(params![batch_id, warehouse_code], map_unit)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(units)
    }

    pub fn list_by_batch(&self, batch_id: &str, warehouse_code: Option<&str>) -> RepositoryResult<Vec<Unit>> {
        let conn = self.get_conn()?;
        Self::list_by_batch_tx(&conn, batch_id, warehouse_code)
    }

    /// 覆盖单台设备的销售价
    pub fn set_sale_price_tx(
        conn: &Connection,
        unit_id: &str,
        price: Money,
        now: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let rows = conn.execute(
            "UPDATE units SET sale_price = ?1, updated_at = ?2 WHERE unit_id = ?3",
            params![price, format_ts(&now), unit_id],
        )?;
        if rows == 0 {
            return Err(RepositoryError::NotFound {
                entity: "Unit".to_string(),
                id: unit_id.to_string(),
            });
        }
        Ok(())
    }

    pub fn find_by_id_tx(conn: &Connection, unit_id: &str) -> RepositoryResult<Option<Unit>> {
        let unit = conn
            .query_row(
                r#"
                SELECT unit_id, batch_id, warehouse_code, serial_number, sale_price, created_at, updated_at
                FROM units
                WHERE unit_id = ?1
                "#,
                params![unit_id],
                map_unit,
            )
            .optional()?;
        Ok(unit)
    }

    pub fn find_by_id(&self, unit_id: &str) -> RepositoryResult<Option<Unit>> {
        let conn = self.get_conn()?;
        Self::find_by_id_tx(&conn, unit_id)
    }
}

fn map_unit(row: &Row) -> rusqlite::Result<Unit> {
    Ok(Unit {
        unit_id: row.get(0)?,
        batch_id: row.get(1)?,
        warehouse_code: row.get(2)?,
        serial_number: row.get(3)?,
        sale_price: row.get(4)?,
        created_at: get_ts(row, 5)?,
        updated_at: get_ts(row, 6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::batch::Batch;
    use crate::repository::batch_repo::BatchRepository;

    fn setup_test_db() -> Arc<Mutex<Connection>> {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::configure_sqlite_connection(&conn).unwrap();
        crate::db::ensure_schema(&conn).unwrap();
        BatchRepository::insert_tx(&conn, &Batch::new("B1".to_string(), "W1".to_string())).unwrap();
        Arc::new(Mutex::new(conn))
    }

    #[test]
    fn test_list_by_batch_orders_and_filters() {
        let conn = setup_test_db();
        let repo = UnitRepository::new(conn.clone());
        {
            let guard = conn.lock().unwrap();
            for (id, wh) in [("U3", "W1"), ("U1", "W1"), ("U2", "W2")] {
                let unit = Unit::new(id.to_string(), "B1".to_string(), wh.to_string());
                UnitRepository::insert_tx(&guard, &unit).unwrap();
            }
        }

        let all: Vec<String> = repo
            .list_by_batch("B1", None)
            .unwrap()
            .into_iter()
            .map(|u| u.unit_id)
            .collect();
        assert_eq!(all, vec!["U1", "U2", "U3"]);

        let in_w1 = repo.list_by_batch("B1", Some("W1")).unwrap();
        assert_eq!(in_w1.len(), 2);
        assert!(repo.list_by_batch("B9", None).unwrap().is_empty());
    }

    #[test]
    fn test_set_sale_price_overwrites() {
        let conn = setup_test_db();
        let repo = UnitRepository::new(conn.clone());
        {
            let guard = conn.lock().unwrap();
            let unit = Unit::new("U1".to_string(), "B1".to_string(), "W1".to_string());
            UnitRepository::insert_tx(&guard, &unit).unwrap();
            UnitRepository::set_sale_price_tx(&guard, "U1", Money::from_cents(500), Utc::now()).unwrap();
            UnitRepository::set_sale_price_tx(&guard, "U1", Money::from_cents(120), Utc::now()).unwrap();
        }
        let unit = repo.find_by_id("U1").unwrap().unwrap();
        assert_eq!(unit.sale_price, Some(Money::from_cents(120)));
    }
}
