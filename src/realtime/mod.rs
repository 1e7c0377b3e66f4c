//! 实时同步模块
//!
//! 变更订阅、主题过滤，以及把信号转成重新拉取的同步驱动。

pub mod feed;
pub mod subscription;
pub mod sync;

pub use feed::{BroadcastChangeFeed, ChangeFeed, ChangeKind, ChangeSignal, PollingChangeFeed};
pub use subscription::TopicFilter;
pub use sync::SyncDriver;
