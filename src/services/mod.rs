//! 服务模块

pub mod annotation_store;
pub mod profile_resolver;
pub mod write_pipeline;

pub use annotation_store::{AnnotationStore, ReconcileOutcome, StoreState, StoreSubscription};
pub use profile_resolver::ProfileResolver;
pub use write_pipeline::{WritePipeline, validate_text};
