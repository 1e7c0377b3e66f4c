//! 便签数据模型
//!
//! 场景中由用户放置的、带三维坐标的标注记录

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Placeholder shown when the data tier withholds note text.
pub const TEXT_UNAVAILABLE: &str = "(unavailable)";

/// 场景坐标
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScenePoint {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl ScenePoint {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl From<glam::Vec3> for ScenePoint {
    fn from(v: glam::Vec3) -> Self {
        Self::new(v.x as f64, v.y as f64, v.z as f64)
    }
}

/// 便签
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Annotation {
    /// 便签唯一标识（服务端分配）
    pub id: String,

    /// 作者 ID（对应 Identity.id）
    #[serde(rename = "user_id")]
    pub author_id: String,

    /// === 场景坐标 ===
    pub x: f64,
    pub y: f64,
    pub z: f64,

    /// 正文；普通权限读取时由数据层省略
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// 创建时间（排序依据）
    pub created_at: DateTime<Utc>,
}

impl Annotation {
    pub fn position(&self) -> ScenePoint {
        ScenePoint::new(self.x, self.y, self.z)
    }

    /// Text for display, or a placeholder when it was withheld.
    pub fn text_or_placeholder(&self) -> &str {
        self.text.as_deref().unwrap_or(TEXT_UNAVAILABLE)
    }

    /// Newest first; ties fall back to id so the order is total.
    pub fn newest_first(a: &Annotation, b: &Annotation) -> Ordering {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.id.cmp(&a.id))
    }
}

/// 新便签写入请求（ID 与时间戳由持久层分配）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAnnotation {
    #[serde(rename = "user_id")]
    pub author_id: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub text: String,
}

impl NewAnnotation {
    pub fn new(author_id: &str, point: ScenePoint, text: &str) -> Self {
        Self {
            author_id: author_id.to_string(),
            x: point.x,
            y: point.y,
            z: point.z,
            text: text.to_string(),
        }
    }
}
