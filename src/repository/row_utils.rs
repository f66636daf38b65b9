// ==========================================
// IT 资产处置 ERP - 行映射工具
// ==========================================
// 时间戳: UTC, 微秒精度, RFC 3339 文本 (字典序即时间序)
// 金额: INTEGER (分)
// ==========================================

use chrono::{DateTime, Utc};
use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, Type, ValueRef};
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;

use crate::domain::money::Money;

const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// 时间戳 -> 存储文本
pub fn format_ts(ts: &DateTime<Utc>) -> String {
    ts.format(TS_FORMAT).to_string()
}

/// 存储文本 -> 时间戳
pub fn parse_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

/// 按列读取时间戳
pub fn get_ts(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(idx)?;
    parse_ts(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("无效时间戳: {}", raw).into(),
        )
    })
}

/// 按列读取可空 JSON 文本
pub fn get_json(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<JsonValue>> {
    get_json_as(row, idx)
}

/// 按列读取可空 JSON 文本并反序列化
pub fn get_json_as<T: DeserializeOwned>(row: &rusqlite::Row, idx: usize) -> rusqlite::Result<Option<T>> {
    let raw: Option<String> = row.get(idx)?;
    match raw {
        None => Ok(None),
        Some(text) => serde_json::from_str(&text)
            .map(Some)
            .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))),
    }
}

/// 按列读取枚举 (存储为字符串)
pub fn get_enum<T>(row: &rusqlite::Row, idx: usize, parse: fn(&str) -> Option<T>) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    parse(&raw).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            Type::Text,
            format!("未知枚举值: {}", raw).into(),
        )
    })
}

impl ToSql for Money {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.cents()))
    }
}

impl FromSql for Money {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        match value {
            ValueRef::Integer(cents) => Ok(Money::from_cents(cents)),
            _ => Err(FromSqlError::InvalidType),
        }
    }
}
