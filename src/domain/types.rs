// ==========================================
// IT 资产处置 ERP - 领域类型定义
// ==========================================
// 职责: 审计动作/模块/实体类型的封闭集合,成本科目
// 对齐: audit_logs.action / module / entity_type 列, batch_cost_totals.cost_kind 列
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// AuditAction - 审计动作类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditAction {
    Create,
    Update,
    Delete,
    StatusChange,
    Assign,
    Move,
    Transfer,
    Liquidate,
    Comment,
    Approve,
    Reject,
    Dispatch,
    Receive,
    Classify,
    Repair,
    Export,
}

impl AuditAction {
    pub const ALL: [AuditAction; 16] = [
        AuditAction::Create,
        AuditAction::Update,
        AuditAction::Delete,
        AuditAction::StatusChange,
        AuditAction::Assign,
        AuditAction::Move,
        AuditAction::Transfer,
        AuditAction::Liquidate,
        AuditAction::Comment,
        AuditAction::Approve,
        AuditAction::Reject,
        AuditAction::Dispatch,
        AuditAction::Receive,
        AuditAction::Classify,
        AuditAction::Repair,
        AuditAction::Export,
    ];

    /// 转换为字符串 (用于数据库存储)
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::Create => "CREATE",
            AuditAction::Update => "UPDATE",
            AuditAction::Delete => "DELETE",
            AuditAction::StatusChange => "STATUS_CHANGE",
            AuditAction::Assign => "ASSIGN",
            AuditAction::Move => "MOVE",
            AuditAction::Transfer => "TRANSFER",
            AuditAction::Liquidate => "LIQUIDATE",
            AuditAction::Comment => "COMMENT",
            AuditAction::Approve => "APPROVE",
            AuditAction::Reject => "REJECT",
            AuditAction::Dispatch => "DISPATCH",
            AuditAction::Receive => "RECEIVE",
            AuditAction::Classify => "CLASSIFY",
            AuditAction::Repair => "REPAIR",
            AuditAction::Export => "EXPORT",
        }
    }

    /// 从字符串解析 (大小写不敏感)
    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|a| a.as_str() == normalized)
    }
}

// ==========================================
// AuditModule - 业务模块
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditModule {
    Tickets,
    Logistics,
    Reception,
    Warehouse,
    Workshop,
    Sales,
    Finance,
    Admin,
    Catalog,
    Reports,
}

impl AuditModule {
    pub const ALL: [AuditModule; 10] = [
        AuditModule::Tickets,
        AuditModule::Logistics,
        AuditModule::Reception,
        AuditModule::Warehouse,
        AuditModule::Workshop,
        AuditModule::Sales,
        AuditModule::Finance,
        AuditModule::Admin,
        AuditModule::Catalog,
        AuditModule::Reports,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditModule::Tickets => "TICKETS",
            AuditModule::Logistics => "LOGISTICS",
            AuditModule::Reception => "RECEPTION",
            AuditModule::Warehouse => "WAREHOUSE",
            AuditModule::Workshop => "WORKSHOP",
            AuditModule::Sales => "SALES",
            AuditModule::Finance => "FINANCE",
            AuditModule::Admin => "ADMIN",
            AuditModule::Catalog => "CATALOG",
            AuditModule::Reports => "REPORTS",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_uppercase();
        Self::ALL.into_iter().find(|m| m.as_str() == normalized)
    }
}

// ==========================================
// AuditEntityType - 审计实体类型
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEntityType {
    Ticket,
    Batch,
    Asset,
    WorkOrder,
    Sale,
    Invoice,
    Payment,
    User,
    Client,
}

impl AuditEntityType {
    pub const ALL: [AuditEntityType; 9] = [
        AuditEntityType::Ticket,
        AuditEntityType::Batch,
        AuditEntityType::Asset,
        AuditEntityType::WorkOrder,
        AuditEntityType::Sale,
        AuditEntityType::Invoice,
        AuditEntityType::Payment,
        AuditEntityType::User,
        AuditEntityType::Client,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            AuditEntityType::Ticket => "TICKET",
            AuditEntityType::Batch => "BATCH",
            AuditEntityType::Asset => "ASSET",
            AuditEntityType::WorkOrder => "WORK_ORDER",
            AuditEntityType::Sale => "SALE",
            AuditEntityType::Invoice => "INVOICE",
            AuditEntityType::Payment => "PAYMENT",
            AuditEntityType::User => "USER",
            AuditEntityType::Client => "CLIENT",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = canonical_entity_type(s);
        Self::ALL.into_iter().find(|e| e.as_str() == normalized)
    }
}

/// 实体类型规范化: 去空白、转大写、连字符视为下划线
///
/// 例: "batch" -> "BATCH", "work-order" -> "WORK_ORDER"
pub fn canonical_entity_type(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace('-', "_")
}

// ==========================================
// CostKind - 成本科目
// ==========================================
// 每个科目在批次上有独立的累计小计,总成本 = 各小计之和
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostKind {
    Acquisition,
    Logistics,
    Parts,
    Labor,
    DataWipe,
    Storage,
    Other,
}

impl CostKind {
    pub const ALL: [CostKind; 7] = [
        CostKind::Acquisition,
        CostKind::Logistics,
        CostKind::Parts,
        CostKind::Labor,
        CostKind::DataWipe,
        CostKind::Storage,
        CostKind::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CostKind::Acquisition => "acquisition",
            CostKind::Logistics => "logistics",
            CostKind::Parts => "parts",
            CostKind::Labor => "labor",
            CostKind::DataWipe => "data_wipe",
            CostKind::Storage => "storage",
            CostKind::Other => "other",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        Self::ALL.into_iter().find(|k| k.as_str() == normalized)
    }
}

// ==========================================
// LedgerKind - 台账操作种类
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "cost_kind")]
pub enum LedgerKind {
    /// 成本 (指定科目)
    Cost(CostKind),
    /// 收入
    Revenue,
}

impl LedgerKind {
    /// 审计/日志中使用的科目名
    pub fn label(&self) -> &'static str {
        match self {
            LedgerKind::Cost(kind) => kind.as_str(),
            LedgerKind::Revenue => "revenue",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AuditModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for AuditEntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for LedgerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}
