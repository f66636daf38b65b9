// ==========================================
// IT 资产处置 ERP - 台账操作校验器
// ==========================================
// 职责: 规范化并校验台账操作与价格分摊请求
// 红线: 纯函数,无副作用
// ==========================================

use crate::domain::ledger::{
    LedgerOperation, LedgerRoute, PriceDistributionRequest, ValidatedDistribution,
    ValidatedOperation,
};
use crate::domain::money::Money;
use crate::domain::types::{CostKind, LedgerKind};
use crate::engine::error::LedgerError;

// ==========================================
// LedgerEntryValidator - 台账校验器
// ==========================================
#[derive(Debug, Default, Clone, Copy)]
pub struct LedgerEntryValidator;

impl LedgerEntryValidator {
    pub fn new() -> Self {
        Self
    }

    /// 校验台账操作
    ///
    /// 顺序: batchId -> type -> 科目合法性 -> amount
    pub fn validate(
        &self,
        op: &LedgerOperation,
        route: LedgerRoute,
    ) -> Result<ValidatedOperation, LedgerError> {
        let batch_id = required(op.batch_id.as_deref(), "batchId")?;
        let raw_kind = required(op.kind.as_deref(), "type")?;
        let kind = Self::parse_kind(route, raw_kind)?;

        let amount = match &op.amount {
            None => return Err(LedgerError::InvalidAmount("缺少金额".to_string())),
            Some(value) => Money::from_json(value)
                .ok_or_else(|| LedgerError::InvalidAmount(format!("金额必须为非负数: {}", value)))?,
        };

        let description = op
            .description
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        Ok(ValidatedOperation {
            batch_id: batch_id.to_string(),
            kind,
            amount,
            description,
        })
    }

    /// 按入口粒度解析科目
    ///
    /// - BatchTotals: cost | revenue (cost 计入采购成本)
    /// - ItemizedExpense: 七个成本科目
    pub fn parse_kind(route: LedgerRoute, raw: &str) -> Result<LedgerKind, LedgerError> {
        let normalized = raw.trim().to_ascii_lowercase();
        let kind = match route {
            LedgerRoute::BatchTotals => match normalized.as_str() {
                "cost" => Some(LedgerKind::Cost(CostKind::Acquisition)),
                "revenue" => Some(LedgerKind::Revenue),
                _ => None,
            },
            LedgerRoute::ItemizedExpense => CostKind::from_str(&normalized).map(LedgerKind::Cost),
        };

        kind.ok_or_else(|| {
            let allowed = match route {
                LedgerRoute::BatchTotals => "cost, revenue".to_string(),
                LedgerRoute::ItemizedExpense => CostKind::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            };
            LedgerError::InvalidKind(format!("{} (允许: {})", raw.trim(), allowed))
        })
    }

    /// 校验价格分摊请求
    pub fn validate_distribution(
        &self,
        req: &PriceDistributionRequest,
    ) -> Result<ValidatedDistribution, LedgerError> {
        let batch_id = required(req.batch_id.as_deref(), "batchId")?;
        let warehouse_code = req
            .warehouse_code
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let total_price = match &req.total_price {
            None => return Err(LedgerError::InvalidPrice("缺少总价".to_string())),
            Some(value) => Money::from_json(value)
                .ok_or_else(|| LedgerError::InvalidPrice(format!("总价必须为非负数: {}", value)))?,
        };

        Ok(ValidatedDistribution {
            batch_id: batch_id.to_string(),
            warehouse_code,
            total_price,
        })
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str, LedgerError> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| LedgerError::MissingField(field.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_coarse_route_kinds() {
        let v = LedgerEntryValidator::new();
        let op = LedgerOperation::new("B1", "COST", json!(100)).with_description("  ");
        let validated = v.validate(&op, LedgerRoute::BatchTotals).unwrap();
        assert_eq!(validated.kind, LedgerKind::Cost(CostKind::Acquisition));
        assert_eq!(validated.amount, Money::from_cents(10_000));
        assert_eq!(validated.description, None);

        let op = LedgerOperation::new("B1", "revenue", json!("40.5"));
        assert_eq!(v.validate(&op, LedgerRoute::BatchTotals).unwrap().kind, LedgerKind::Revenue);

        let op = LedgerOperation::new("B1", "logistics", json!(1));
        assert!(matches!(v.validate(&op, LedgerRoute::BatchTotals), Err(LedgerError::InvalidKind(_))));
    }

    #[test]
    fn test_itemized_route_kinds() {
        let v = LedgerEntryValidator::new();
        let op = LedgerOperation::new("B1", "data_wipe", json!(12.5));
        let validated = v.validate(&op, LedgerRoute::ItemizedExpense).unwrap();
        assert_eq!(validated.kind, LedgerKind::Cost(CostKind::DataWipe));

        let op = LedgerOperation::new("B1", "revenue", json!(1));
        assert!(matches!(v.validate(&op, LedgerRoute::ItemizedExpense), Err(LedgerError::InvalidKind(_))));
    }

    #[test]
    fn test_rejects_bad_amounts() {
        let v = LedgerEntryValidator::new();
        for amount in [json!(-1), json!("NaN"), json!("abc"), json!(null), json!(true), json!("-0")] {
            let op = LedgerOperation::new("B1", "cost", amount.clone());
            assert!(
                matches!(v.validate(&op, LedgerRoute::BatchTotals), Err(LedgerError::InvalidAmount(_))),
                "amount {:?} should be rejected",
                amount
            );
        }

        let mut op = LedgerOperation::new("B1", "cost", json!(1));
        op.amount = None;
        assert!(matches!(v.validate(&op, LedgerRoute::BatchTotals), Err(LedgerError::InvalidAmount(_))));
    }

    #[test]
    fn test_missing_fields() {
        let v = LedgerEntryValidator::new();
        let op = LedgerOperation::new(" ", "cost", json!(1));
        assert!(matches!(v.validate(&op, LedgerRoute::BatchTotals), Err(LedgerError::MissingField(f)) if f == "batchId"));

        let op = LedgerOperation {
            batch_id: Some("B1".to_string()),
            ..Default::default()
        };
        assert!(matches!(v.validate(&op, LedgerRoute::BatchTotals), Err(LedgerError::MissingField(f)) if f == "type"));
    }

    #[test]
    fn test_distribution_request() {
        let v = LedgerEntryValidator::new();
        let req = PriceDistributionRequest {
            batch_id: Some("B2".to_string()),
            warehouse_code: Some(" ".to_string()),
            total_price: Some(json!(100.0)),
        };
        let validated = v.validate_distribution(&req).unwrap();
        assert_eq!(validated.warehouse_code, None);
        assert_eq!(validated.total_price, Money::from_cents(10_000));

        let req = PriceDistributionRequest {
            total_price: Some(json!(-5)),
            ..req
        };
        assert!(matches!(v.validate_distribution(&req), Err(LedgerError::InvalidPrice(_))));
    }
}
