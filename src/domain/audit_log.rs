// ==========================================
// IT 资产处置 ERP - 审计日志领域模型
// ==========================================
// 红线: 审计日志只追加,创建后不可修改/删除
// 对齐: audit_logs 表 (字段名即对外契约,变更需迁移)
// ==========================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;

use crate::domain::actor::ActorContext;
use crate::domain::types::{AuditAction, AuditEntityType, AuditModule};

/// 单字段变更 {old, new}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub old: JsonValue,
    pub new: JsonValue,
}

/// 变更摘要: 字段名 -> {old, new}
pub type ChangesSummary = BTreeMap<String, FieldChange>;

// ==========================================
// RequestMetadata - 请求元数据
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestMetadata {
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub session_id: Option<String>,
    pub http_method: Option<String>,
    pub endpoint: Option<String>,
}

impl RequestMetadata {
    pub fn is_empty(&self) -> bool {
        self.ip_address.is_none()
            && self.user_agent.is_none()
            && self.session_id.is_none()
            && self.http_method.is_none()
            && self.endpoint.is_none()
    }
}

// ==========================================
// AuditLogEntry - 审计日志
// ==========================================
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditLogEntry {
    pub id: String,
    pub action: AuditAction,
    pub module: AuditModule,
    pub description: String,

    // ===== 操作人 (全部为空表示系统) =====
    pub user_id: Option<String>,
    pub user_name: Option<String>,
    pub user_email: Option<String>,
    pub user_role: Option<String>,

    // ===== 实体 =====
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    pub entity_reference: Option<String>,

    // ===== 关联 =====
    pub ticket_id: Option<String>,
    pub batch_id: Option<String>,
    pub asset_id: Option<String>,

    // ===== 快照与差异 =====
    pub data_before: Option<JsonValue>,
    pub data_after: Option<JsonValue>,
    pub changes_summary: Option<ChangesSummary>,

    #[serde(flatten)]
    pub metadata: RequestMetadata,
    pub additional_data: Option<JsonValue>,

    pub created_at: DateTime<Utc>,
}

impl AuditLogEntry {
    /// 是否为系统操作 (无操作人)
    pub fn is_system(&self) -> bool {
        self.user_id.is_none()
    }

    /// 展示用操作人名称
    pub fn actor_display(&self) -> &str {
        self.user_name
            .as_deref()
            .or(self.user_email.as_deref())
            .or(self.user_id.as_deref())
            .unwrap_or("system")
    }
}

// ==========================================
// AuditDraft - 待记录的审计内容
// ==========================================
// 由业务层构造,交给 AuditRecorder 补全 id/操作人/时间戳/变更摘要
#[derive(Debug, Clone)]
pub struct AuditDraft {
    pub action: AuditAction,
    pub module: AuditModule,
    pub description: String,
    pub entity_type: AuditEntityType,
    pub entity_id: String,
    pub entity_reference: Option<String>,
    pub ticket_id: Option<String>,
    pub batch_id: Option<String>,
    pub asset_id: Option<String>,
    pub data_before: Option<JsonValue>,
    pub data_after: Option<JsonValue>,
    pub metadata: RequestMetadata,
    pub additional_data: Option<JsonValue>,
}

impl AuditDraft {
    pub fn new(
        action: AuditAction,
        module: AuditModule,
        entity_type: AuditEntityType,
        entity_id: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            action,
            module,
            description: description.into(),
            entity_type,
            entity_id: entity_id.into(),
            entity_reference: None,
            ticket_id: None,
            batch_id: None,
            asset_id: None,
            data_before: None,
            data_after: None,
            metadata: RequestMetadata::default(),
            additional_data: None,
        }
    }

    pub fn with_reference(mut self, reference: Option<String>) -> Self {
        self.entity_reference = reference;
        self
    }

    pub fn with_ticket_id(mut self, ticket_id: Option<String>) -> Self {
        self.ticket_id = ticket_id;
        self
    }

    pub fn with_batch_id(mut self, batch_id: Option<String>) -> Self {
        self.batch_id = batch_id;
        self
    }

    pub fn with_asset_id(mut self, asset_id: Option<String>) -> Self {
        self.asset_id = asset_id;
        self
    }

    pub fn with_before(mut self, before: JsonValue) -> Self {
        self.data_before = Some(before);
        self
    }

    pub fn with_after(mut self, after: JsonValue) -> Self {
        self.data_after = Some(after);
        self
    }

    pub fn with_metadata(mut self, metadata: RequestMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_additional_data(mut self, data: JsonValue) -> Self {
        self.additional_data = Some(data);
        self
    }

    /// 补全为完整审计日志
    pub fn into_entry(
        self,
        id: String,
        actor: Option<&ActorContext>,
        changes_summary: Option<ChangesSummary>,
        created_at: DateTime<Utc>,
    ) -> AuditLogEntry {
        AuditLogEntry {
            id,
            action: self.action,
            module: self.module,
            description: self.description,
            user_id: actor.map(|a| a.user_id.clone()),
            user_name: actor.and_then(|a| a.name.clone()),
            user_email: actor.and_then(|a| a.email.clone()),
            user_role: actor.and_then(|a| a.role.clone()),
            entity_type: self.entity_type,
            entity_id: self.entity_id,
            entity_reference: self.entity_reference,
            ticket_id: self.ticket_id,
            batch_id: self.batch_id,
            asset_id: self.asset_id,
            data_before: self.data_before,
            data_after: self.data_after,
            changes_summary,
            metadata: self.metadata,
            additional_data: self.additional_data,
            created_at,
        }
    }
}

// ==========================================
// AuditSearchFilter - 审计检索条件
// ==========================================
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSearchFilter {
    pub entity_type: Option<AuditEntityType>,
    pub entity_id: Option<String>,
    pub module: Option<AuditModule>,
    pub action: Option<AuditAction>,
    pub user_id: Option<String>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
    /// 在 entity_reference / description 中模糊匹配
    pub search: Option<String>,
}

/// 分页结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditPage {
    pub logs: Vec<AuditLogEntry>,
    pub total: i64,
    pub page: u32,
    pub limit: u32,
    pub total_pages: u32,
}
