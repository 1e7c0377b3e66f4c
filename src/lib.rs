//! Tree Notes - 共享 3D 场景便签同步核心
//!
//! 屏幕坐标拾取、与远端权威数据保持一致的便签集合、作者资料批量缓存，
//! 以及乐观写入流程。

pub mod app_state;
pub mod config;
pub mod error;
pub mod models;
pub mod observability;
pub mod picking;
pub mod realtime;
pub mod services;
pub mod storage;

pub use app_state::{AppState, Marker};
pub use error::{AppError, Result};
