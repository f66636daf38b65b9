// ==========================================
// IT 资产处置 ERP - 审计 API
// ==========================================
// 职责: 审计历史查询、条件检索、人工评论
// 红线: 审计日志只追加; 评论必须有已认证的操作人
// ==========================================

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{info, warn};

use crate::api::error::{ApiError, ApiResult};
use crate::config::ledger_config_trait::LedgerConfigReader;
use crate::domain::actor::ActorContext;
use crate::domain::audit_log::{AuditDraft, AuditLogEntry, AuditPage, AuditSearchFilter, RequestMetadata};
use crate::domain::types::{AuditAction, AuditEntityType, AuditModule};
use crate::engine::audit_query::AuditQueryService;
use crate::engine::audit_recorder::AuditRecorder;
use crate::engine::session::SessionContextPropagator;
use crate::repository::batch_repo::BatchRepository;
use crate::repository::unit_repo::UnitRepository;

const DEFAULT_COMMENT_MIN_LEN: usize = 3;
const DEFAULT_COMMENT_MAX_LEN: usize = 1000;

/// 人工评论请求
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRequest {
    #[serde(default)]
    pub entity_type: Option<String>,
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub entity_reference: Option<String>,
    #[serde(default)]
    pub comment: Option<String>,
    #[serde(default)]
    pub module: Option<String>,
}

/// 实体关联 (工单/批次/设备)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Linkage {
    ticket_id: Option<String>,
    batch_id: Option<String>,
    asset_id: Option<String>,
}

// ==========================================
// AuditApi - 审计 API
// ==========================================
pub struct AuditApi {
    query: Arc<AuditQueryService>,
    recorder: Arc<AuditRecorder>,
    batch_repo: Arc<BatchRepository>,
    unit_repo: Arc<UnitRepository>,
    propagator: Arc<SessionContextPropagator>,
    config: Arc<dyn LedgerConfigReader>,
}

impl AuditApi {
    pub fn new(
        query: Arc<AuditQueryService>,
        recorder: Arc<AuditRecorder>,
        batch_repo: Arc<BatchRepository>,
        unit_repo: Arc<UnitRepository>,
        propagator: Arc<SessionContextPropagator>,
        config: Arc<dyn LedgerConfigReader>,
    ) -> Self {
        Self {
            query,
            recorder,
            batch_repo,
            unit_repo,
            propagator,
            config,
        }
    }

    /// 实体审计历史 (新 -> 旧)
    pub fn history(&self, entity_type: &str, entity_id: &str) -> ApiResult<Vec<AuditLogEntry>> {
        if entity_type.trim().is_empty() || entity_id.trim().is_empty() {
            return Err(ApiError::InvalidInput("entityType 与 entityId 不能为空".to_string()));
        }
        Ok(self.query.list_for(entity_type, entity_id)?)
    }

    pub fn search(
        &self,
        filter: &AuditSearchFilter,
        page: Option<u32>,
        limit: Option<u32>,
    ) -> ApiResult<AuditPage> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(ApiError::InvalidInput("起始时间不能晚于结束时间".to_string()));
            }
        }
        Ok(self.query.search(filter, page, limit)?)
    }

    pub fn find(&self, id: &str) -> ApiResult<AuditLogEntry> {
        Ok(self.query.find_by_id(id)?)
    }

    /// 人工评论
    ///
    /// - 实体类型仅限 TICKET / BATCH / ASSET
    /// - 去除首尾空白后长度在配置区间内 (默认 3..=1000)
    /// - 关联从存储解析: 批次 -> 工单, 设备 -> 批次 -> 工单
    pub async fn add_comment(
        &self,
        req: &CommentRequest,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
    ) -> ApiResult<AuditLogEntry> {
        let bounds = self.comment_bounds().await;
        self.record_comment(req, actor, metadata, bounds)
    }

    /// 按给定长度区间校验并写入评论 (同步, 访问存储)
    pub fn record_comment(
        &self,
        req: &CommentRequest,
        actor: Option<ActorContext>,
        metadata: RequestMetadata,
        (min_len, max_len): (usize, usize),
    ) -> ApiResult<AuditLogEntry> {
        let actor = actor
            .and_then(|a| a.normalized())
            .ok_or_else(|| ApiError::Unauthenticated("评论需要已认证的用户".to_string()))?;

        let entity_type = required(req.entity_type.as_deref(), "entityType")?;
        let entity_id = required(req.entity_id.as_deref(), "entityId")?;
        let comment = required(req.comment.as_deref(), "comment")?;

        let entity_type = match AuditEntityType::from_str(entity_type) {
            Some(t @ (AuditEntityType::Ticket | AuditEntityType::Batch | AuditEntityType::Asset)) => t,
            _ => {
                return Err(ApiError::InvalidInput(format!(
                    "不支持评论的实体类型: {} (允许: TICKET, BATCH, ASSET)",
                    entity_type
                )))
            }
        };

        let module = match req.module.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            Some(raw) => AuditModule::from_str(raw)
                .ok_or_else(|| ApiError::InvalidInput(format!("无效模块: {}", raw)))?,
            None => default_module(entity_type),
        };

        let length = comment.chars().count();
        if length < min_len {
            return Err(ApiError::ValidationError(format!("评论至少需要 {} 个字符", min_len)));
        }
        if length > max_len {
            return Err(ApiError::ValidationError(format!("评论不能超过 {} 个字符", max_len)));
        }

        let linkage = self.resolve_linkage(entity_type, entity_id)?;
        let reference = req
            .entity_reference
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let draft = AuditDraft::new(AuditAction::Comment, module, entity_type, entity_id, comment)
            .with_reference(reference)
            .with_ticket_id(linkage.ticket_id)
            .with_batch_id(linkage.batch_id)
            .with_asset_id(linkage.asset_id)
            .with_additional_data(json!({
                "comment_length": length,
                "is_manual": true,
            }));

        let scope = self.propagator.bind(Some(actor)).with_metadata(metadata);
        let outcome = self.recorder.record(draft, &scope)?;
        info!(
            audit_id = %outcome.entry().id,
            entity_type = %entity_type,
            entity_id = %entity_id,
            actor_id = scope.actor_id(),
            "审计评论已记录"
        );
        Ok(outcome.entry().clone())
    }

    /// 评论长度区间 (最小, 最大); 读取失败时使用默认值
    pub async fn comment_bounds(&self) -> (usize, usize) {
        let min_len = self.config.get_comment_min_len().await.unwrap_or_else(|e| {
            warn!(error = %e, "读取评论最小长度失败，使用默认值");
            DEFAULT_COMMENT_MIN_LEN
        });
        let max_len = self.config.get_comment_max_len().await.unwrap_or_else(|e| {
            warn!(error = %e, "读取评论最大长度失败，使用默认值");
            DEFAULT_COMMENT_MAX_LEN
        });
        (min_len, max_len.max(min_len))
    }

    fn resolve_linkage(&self, entity_type: AuditEntityType, entity_id: &str) -> ApiResult<Linkage> {
        let linkage = match entity_type {
            AuditEntityType::Ticket => Linkage {
                ticket_id: Some(entity_id.to_string()),
                ..Linkage::default()
            },
            AuditEntityType::Batch => Linkage {
                ticket_id: self.batch_repo.find_by_id(entity_id)?.and_then(|b| b.ticket_id),
                batch_id: Some(entity_id.to_string()),
                asset_id: None,
            },
            AuditEntityType::Asset => {
                let batch_id = self.unit_repo.find_by_id(entity_id)?.map(|u| u.batch_id);
                let ticket_id = match &batch_id {
                    Some(id) => self.batch_repo.find_by_id(id)?.and_then(|b| b.ticket_id),
                    None => None,
                };
                Linkage {
                    ticket_id,
                    batch_id,
                    asset_id: Some(entity_id.to_string()),
                }
            }
            _ => Linkage::default(),
        };
        Ok(linkage)
    }
}

fn default_module(entity_type: AuditEntityType) -> AuditModule {
    match entity_type {
        AuditEntityType::Ticket => AuditModule::Tickets,
        _ => AuditModule::Warehouse,
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> ApiResult<&'a str> {
    value
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| ApiError::InvalidInput(format!("缺少必填字段: {}", field)))
}
