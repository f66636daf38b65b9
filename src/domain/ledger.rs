// ==========================================
// IT 资产处置 ERP - 台账操作模型
// ==========================================
// 职责: 台账操作与价格分摊的输入/输出结构
// 说明: LedgerOperation 为瞬态输入,不单独落表
// ==========================================

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::domain::money::Money;
use crate::domain::types::LedgerKind;

// ==========================================
// LedgerRoute - 台账入口粒度
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LedgerRoute {
    /// 粗粒度: cost | revenue
    BatchTotals,
    /// 分科目: acquisition | logistics | parts | labor | data_wipe | storage | other
    ItemizedExpense,
}

// ==========================================
// LedgerOperation - 原始台账请求
// ==========================================
// amount 保留原始 JSON 值,由校验器决定是否可接受
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerOperation {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub amount: Option<JsonValue>,
    #[serde(default)]
    pub description: Option<String>,
}

impl LedgerOperation {
    pub fn new(batch_id: &str, kind: &str, amount: JsonValue) -> Self {
        Self {
            batch_id: Some(batch_id.to_string()),
            kind: Some(kind.to_string()),
            amount: Some(amount),
            description: None,
        }
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}

// ==========================================
// ValidatedOperation - 校验后的台账操作
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedOperation {
    pub batch_id: String,
    pub kind: LedgerKind,
    pub amount: Money,
    pub description: Option<String>,
}

// ==========================================
// PriceDistributionRequest - 价格分摊请求
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PriceDistributionRequest {
    #[serde(default)]
    pub batch_id: Option<String>,
    #[serde(default)]
    pub warehouse_code: Option<String>,
    #[serde(default)]
    pub total_price: Option<JsonValue>,
}

/// 校验后的分摊请求
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedDistribution {
    pub batch_id: String,
    /// 为空时分摊到批次内所有设备
    pub warehouse_code: Option<String>,
    pub total_price: Money,
}

// ==========================================
// DistributionOutcome - 分摊结果
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributionOutcome {
    pub batch_id: String,
    pub count: usize,
    /// 精确商 (主单位), price_per_unit * count 与总价相差不到 1 分
    pub price_per_unit: f64,
    /// 精确商按 half-up 取整到分, 写入批次 unit_sale_price
    pub unit_sale_price: Money,
    pub total_price: Money,
    /// 按 unit_id 升序
    pub unit_prices: Vec<(String, Money)>,
}
