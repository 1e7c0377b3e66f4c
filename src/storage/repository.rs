//! 外部协作方接口
//!
//! 核心只依赖这些 trait：持久写入、全量读取、批量资料查询、通知发送与当前会话。

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::error::Result;
use crate::models::annotation::{Annotation, NewAnnotation};
use crate::models::identity::{Identity, SessionUser};
use crate::models::notification::Notification;

/// 便签仓储 trait
#[async_trait]
pub trait AnnotationRepository: Send + Sync {
    /// 持久写入；ID 与创建时间由服务端分配
    async fn insert(&self, note: &NewAnnotation) -> Result<Annotation>;

    /// 读取调用者可见的全部便签（按创建时间倒序）
    async fn fetch_all(&self) -> Result<Vec<Annotation>>;
}

/// 用户资料仓储 trait
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    /// 批量查询；不存在的 ID 直接缺席于结果中
    async fn fetch_by_ids(&self, ids: &[String]) -> Result<Vec<Identity>>;
}

/// 通知发送 trait
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notification: &Notification) -> Result<()>;
}

/// 当前用户访问器
pub trait SessionSource: Send + Sync {
    fn current_user(&self) -> Option<SessionUser>;
}

/// Session whose user is set explicitly by the host application.
#[derive(Debug, Default)]
pub struct StaticSession {
    user: RwLock<Option<SessionUser>>,
}

impl StaticSession {
    pub fn new(user: Option<SessionUser>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    pub fn signed_in(user: SessionUser) -> Self {
        Self::new(Some(user))
    }

    pub fn sign_in(&self, user: SessionUser) {
        *self.user.write() = Some(user);
    }

    pub fn sign_out(&self) {
        *self.user.write() = None;
    }
}

impl SessionSource for StaticSession {
    fn current_user(&self) -> Option<SessionUser> {
        self.user.read().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_static_session_sign_in_out() {
        let session = StaticSession::default();
        assert!(session.current_user().is_none());

        session.sign_in(SessionUser::new("u1").with_email("u1@tree.test"));
        assert_eq!(session.current_user().map(|u| u.id), Some("u1".to_string()));

        session.sign_out();
        assert!(session.current_user().is_none());
    }
}
