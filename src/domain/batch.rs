// ==========================================
// IT 资产处置 ERP - 批次与设备领域模型
// ==========================================
// 职责: 批次(聚合根)的累计成本/收入、设备单元的销售单价
// 对齐: batches / batch_cost_totals / units 表
// 红线: 批次不做物理删除; 累计金额不得为负
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as JsonValue};
use std::collections::BTreeMap;

use crate::domain::money::Money;
use crate::domain::types::CostKind;

// ==========================================
// Batch - 批次
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Batch {
    // ===== 主键与归属 =====
    pub batch_id: String,
    pub warehouse_code: String,
    pub ticket_id: Option<String>,        // 来源工单
    pub batch_reference: Option<String>,  // 人类可读批次号 (审计冗余字段)

    // ===== 数量 =====
    pub unit_count: i64,

    // ===== 财务累计 =====
    pub cost_totals: BTreeMap<CostKind, Money>, // 按科目的成本小计 (未出现的科目视为 0)
    pub revenue_total: Money,
    pub unit_sale_price: Option<Money>,          // 分摊后的单价 (未分摊前为空)

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Batch {
    /// 创建新批次 (所有累计为 0)
    pub fn new(batch_id: String, warehouse_code: String) -> Self {
        let now = Utc::now();
        Self {
            batch_id,
            warehouse_code,
            ticket_id: None,
            batch_reference: None,
            unit_count: 0,
            cost_totals: BTreeMap::new(),
            revenue_total: Money::ZERO,
            unit_sale_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_ticket_id(mut self, ticket_id: String) -> Self {
        self.ticket_id = Some(ticket_id);
        self
    }

    pub fn with_reference(mut self, reference: String) -> Self {
        self.batch_reference = Some(reference);
        self
    }

    /// 指定科目的成本小计
    pub fn cost_of(&self, kind: CostKind) -> Money {
        self.cost_totals.get(&kind).copied().unwrap_or(Money::ZERO)
    }

    /// 总成本 = 各科目小计之和 (溢出时饱和, 展示用)
    pub fn total_cost(&self) -> Money {
        self.cost_totals.values().copied().sum()
    }

    /// 总成本; 溢出返回 None
    pub fn checked_total_cost(&self) -> Option<Money> {
        Money::checked_sum(self.cost_totals.values().copied())
    }

    /// 审计快照
    ///
    /// 每个成本科目展开为独立字段 (例如 `logistics_cost`),
    /// 以便变更摘要按字段对比。
    pub fn audit_snapshot(&self) -> JsonValue {
        let mut map = Map::new();
        map.insert("batch_id".to_string(), json!(self.batch_id));
        map.insert("warehouse_code".to_string(), json!(self.warehouse_code));
        map.insert("unit_count".to_string(), json!(self.unit_count));
        for kind in CostKind::ALL {
            map.insert(format!("{}_cost", kind.as_str()), json!(self.cost_of(kind)));
        }
        map.insert("total_cost".to_string(), json!(self.total_cost()));
        map.insert("revenue_total".to_string(), json!(self.revenue_total));
        map.insert("unit_sale_price".to_string(), json!(self.unit_sale_price));
        JsonValue::Object(map)
    }
}

// ==========================================
// Unit - 设备单元 (资产)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Unit {
    pub unit_id: String,
    pub batch_id: String,
    pub warehouse_code: String,          // 当前所在仓库
    pub serial_number: Option<String>,
    pub sale_price: Option<Money>,       // 由价格分摊写入,覆盖而非累加
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Unit {
    pub fn new(unit_id: String, batch_id: String, warehouse_code: String) -> Self {
        let now = Utc::now();
        Self {
            unit_id,
            batch_id,
            warehouse_code,
            serial_number: None,
            sale_price: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_serial_number(mut self, serial_number: String) -> Self {
        self.serial_number = Some(serial_number);
        self
    }

    pub fn audit_snapshot(&self) -> JsonValue {
        json!({
            "unit_id": self.unit_id,
            "batch_id": self.batch_id,
            "warehouse_code": self.warehouse_code,
            "serial_number": self.serial_number,
            "sale_price": self.sale_price,
        })
    }
}

// ==========================================
// BatchFinancials - 批次损益汇总 (只读聚合)
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchFinancials {
    pub batch_id: String,
    pub batch_reference: Option<String>,
    pub unit_count: i64,
    pub unit_sale_price: Option<Money>,

    pub cost_breakdown: BTreeMap<CostKind, Money>,
    pub acquisition_cost: Money,
    pub operating_expenses: Money, // 除采购外的费用合计
    pub total_cost: Money,
    pub revenue_total: Money,

    pub gross_profit: Money,     // 收入 - 采购成本
    pub operating_profit: Money, // 毛利 - 运营费用
    pub profit_margin_pct: f64,  // 保留 1 位小数; 收入为 0 时为 0
}

impl BatchFinancials {
    pub fn from_batch(batch: &Batch) -> Self {
        let cost_breakdown: BTreeMap<CostKind, Money> = CostKind::ALL
            .into_iter()
            .map(|kind| (kind, batch.cost_of(kind)))
            .collect();

        let acquisition_cost = batch.cost_of(CostKind::Acquisition);
        let total_cost = batch.total_cost();
        let operating_expenses = total_cost - acquisition_cost;
        let gross_profit = batch.revenue_total - acquisition_cost;
        let operating_profit = gross_profit - operating_expenses;

        let profit_margin_pct = if batch.revenue_total.cents() > 0 {
            let pct = operating_profit.cents() as f64 / batch.revenue_total.cents() as f64 * 100.0;
            (pct * 10.0).round() / 10.0
        } else {
            0.0
        };

        Self {
            batch_id: batch.batch_id.clone(),
            batch_reference: batch.batch_reference.clone(),
            unit_count: batch.unit_count,
            unit_sale_price: batch.unit_sale_price,
            cost_breakdown,
            acquisition_cost,
            operating_expenses,
            total_cost,
            revenue_total: batch.revenue_total,
            gross_profit,
            operating_profit,
            profit_margin_pct,
        }
    }
}
