//! 存储层模块
//!
//! 外部接口（仓库、资料、通知、会话）及其 REST 与内存实现。

pub mod memory;
pub mod repository;
pub mod rest;

pub use memory::InMemoryBackend;
pub use repository::{
    AnnotationRepository, IdentityRepository, Notifier, SessionSource, StaticSession,
};
pub use rest::RestBackend;
