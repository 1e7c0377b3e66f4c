//! 可观测性模块
//!
//! 提供结构化日志初始化和同步核心的计数指标。

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::config::LoggingConfig;

// ===== Logging =====

/// 初始化 tracing
///
/// `RUST_LOG` 优先于配置中的日志级别。配置了 `log_dir` 时额外写入按天滚动的文件，
/// 返回的 guard 需在进程生命周期内持有。
pub fn init_tracing(config: &LoggingConfig) -> Option<WorkerGuard> {
    let level = if config.level.is_empty() {
        "info"
    } else {
        config.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let (file_writer, guard) = match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tree-notes.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        None => (None, None),
    };

    let file_layer = file_writer.map(|writer| fmt::layer().with_ansi(false).with_writer(writer));
    let registry = tracing_subscriber::registry().with(filter).with(file_layer);

    // a second init (tests, embedding hosts) is not an error
    let _ = if config.structured {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    guard
}

// ===== Sync Metrics =====

/// 同步核心指标
#[derive(Debug, Default)]
pub struct SyncMetrics {
    pub reconciliations_total: AtomicU64,
    pub reconciliation_failures: AtomicU64,
    pub coalesced_signals: AtomicU64,
    pub optimistic_inserts: AtomicU64,
    pub writes_total: AtomicU64,
    pub write_failures: AtomicU64,
    pub identity_fetches: AtomicU64,
    pub identity_fetch_failures: AtomicU64,
    pub notifications_sent: AtomicU64,
    pub notification_failures: AtomicU64,
}

/// 指标快照
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub reconciliations_total: u64,
    pub reconciliation_failures: u64,
    pub coalesced_signals: u64,
    pub optimistic_inserts: u64,
    pub writes_total: u64,
    pub write_failures: u64,
    pub identity_fetches: u64,
    pub identity_fetch_failures: u64,
    pub notifications_sent: u64,
    pub notification_failures: u64,
}

impl SyncMetrics {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录一次对账
    pub fn record_reconciliation(&self, success: bool) {
        Self::incr(&self.reconciliations_total);
        if !success {
            Self::incr(&self.reconciliation_failures);
        }
    }

    /// 记录一次写入
    pub fn record_write(&self, success: bool) {
        Self::incr(&self.writes_total);
        if !success {
            Self::incr(&self.write_failures);
        }
    }

    /// 记录一次资料批量查询
    pub fn record_identity_fetch(&self, success: bool) {
        Self::incr(&self.identity_fetches);
        if !success {
            Self::incr(&self.identity_fetch_failures);
        }
    }

    /// 记录一次通知
    pub fn record_notification(&self, success: bool) {
        if success {
            Self::incr(&self.notifications_sent);
        } else {
            Self::incr(&self.notification_failures);
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            reconciliations_total: self.reconciliations_total.load(Ordering::SeqCst),
            reconciliation_failures: self.reconciliation_failures.load(Ordering::SeqCst),
            coalesced_signals: self.coalesced_signals.load(Ordering::SeqCst),
            optimistic_inserts: self.optimistic_inserts.load(Ordering::SeqCst),
            writes_total: self.writes_total.load(Ordering::SeqCst),
            write_failures: self.write_failures.load(Ordering::SeqCst),
            identity_fetches: self.identity_fetches.load(Ordering::SeqCst),
            identity_fetch_failures: self.identity_fetch_failures.load(Ordering::SeqCst),
            notifications_sent: self.notifications_sent.load(Ordering::SeqCst),
            notification_failures: self.notification_failures.load(Ordering::SeqCst),
        }
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        let s = self.snapshot();
        format!(
            r#"# HELP reconciliations_total Full re-fetches of the note collection
# TYPE reconciliations_total counter
reconciliations_total {}
# HELP reconciliation_failures_total Failed re-fetches
# TYPE reconciliation_failures_total counter
reconciliation_failures_total {}
# HELP coalesced_signals_total Change signals folded into a pending re-fetch
# TYPE coalesced_signals_total counter
coalesced_signals_total {}
# HELP optimistic_inserts_total Local inserts applied before confirmation
# TYPE optimistic_inserts_total counter
optimistic_inserts_total {}
# HELP writes_total Durable note writes
# TYPE writes_total counter
writes_total {}
# HELP write_failures_total Rejected durable writes
# TYPE write_failures_total counter
write_failures_total {}
# HELP identity_fetches_total Batched identity lookups
# TYPE identity_fetches_total counter
identity_fetches_total {}
# HELP identity_fetch_failures_total Failed identity lookups
# TYPE identity_fetch_failures_total counter
identity_fetch_failures_total {}
# HELP notifications_sent_total Side notifications delivered
# TYPE notifications_sent_total counter
notifications_sent_total {}
# HELP notification_failures_total Side notifications that failed
# TYPE notification_failures_total counter
notification_failures_total {}
"#,
            s.reconciliations_total,
            s.reconciliation_failures,
            s.coalesced_signals,
            s.optimistic_inserts,
            s.writes_total,
            s.write_failures,
            s.identity_fetches,
            s.identity_fetch_failures,
            s.notifications_sent,
            s.notification_failures,
        )
    }
}
