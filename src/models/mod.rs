//! 核心数据模型模块
//!
//! 便签（Annotation）、作者资料（Identity）、会话用户与通知。

pub mod annotation;
pub mod identity;
pub mod notification;

pub use annotation::*;
pub use identity::*;
pub use notification::*;
