// ==========================================
// IT 资产处置 ERP - 操作人上下文
// ==========================================
// 职责: 描述当前操作的执行者 (由调用方从已验证的会话中解析)
// 约定: 审计记录中 actor 为空即表示"系统"
// ==========================================

use serde::{Deserialize, Serialize};

/// 未提供角色时的默认值
pub const DEFAULT_ROLE: &str = "authenticated";

// ==========================================
// ActorContext - 操作人身份
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActorContext {
    pub user_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
}

impl ActorContext {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            email: None,
            role: None,
            name: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_role(mut self, role: impl Into<String>) -> Self {
        self.role = Some(role.into());
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// 规范化身份
    ///
    /// - user_id / name 去除首尾空白
    /// - email 去空白并转小写, 空串视为未提供
    /// - role 缺省为 `authenticated`
    ///
    /// user_id 为空时返回 None (无法归属)
    pub fn normalized(&self) -> Option<ActorContext> {
        let user_id = self.user_id.trim();
        if user_id.is_empty() {
            return None;
        }

        let non_empty = |v: &Option<String>| {
            v.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        Some(ActorContext {
            user_id: user_id.to_string(),
            email: non_empty(&self.email).map(|e| e.to_lowercase()),
            role: Some(non_empty(&self.role).unwrap_or_else(|| DEFAULT_ROLE.to_string())),
            // 名称缺省时回退为邮箱
            name: non_empty(&self.name).or_else(|| non_empty(&self.email)),
        })
    }
}
