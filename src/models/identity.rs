//! 用户资料数据模型
//!
//! 便签作者的公开展示信息（名称 + 头像）

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Display name used when an author has no identity record.
pub const UNKNOWN_AUTHOR: &str = "Unknown";

/// 用户资料
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// 用户 ID（对应 Annotation.author_id）
    pub id: String,

    /// 展示名称（全局唯一，由持久层保证）
    #[serde(rename = "username")]
    pub display_name: String,

    /// 头像地址
    #[serde(default)]
    pub avatar_url: Option<String>,

    /// 创建时间
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

impl Identity {
    pub fn new(id: &str, display_name: &str) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            avatar_url: None,
            created_at: None,
        }
    }

    pub fn with_avatar(mut self, avatar_url: &str) -> Self {
        self.avatar_url = Some(avatar_url.to_string());
        self
    }
}

/// 当前登录用户
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionUser {
    pub id: String,
    pub email: Option<String>,
}

impl SessionUser {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            email: None,
        }
    }

    pub fn with_email(mut self, email: &str) -> Self {
        self.email = Some(email.to_string());
        self
    }
}
