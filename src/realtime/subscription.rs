//! 变更主题过滤
//!
//! 主题形如 `<table>:<kind>`，订阅模式可以是精确主题，或 `<table>:*` 匹配该表的所有变更。

use std::collections::BTreeSet;

/// Whether `pattern` covers `topic`.
fn pattern_matches(pattern: &str, topic: &str) -> bool {
    match pattern.strip_suffix(":*") {
        Some(table) => topic
            .split_once(':')
            .is_some_and(|(t, kind)| t == table && !kind.is_empty()),
        None => pattern == topic,
    }
}

/// Set of topic patterns a feed consumer listens to
#[derive(Debug, Clone, Default)]
pub struct TopicFilter {
    patterns: BTreeSet<String>,
}

impl TopicFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter accepting a single topic pattern
    pub fn single(pattern: &str) -> Self {
        let mut filter = Self::new();
        filter.subscribe(pattern);
        filter
    }

    /// Add a pattern; returns false when already present
    pub fn subscribe(&mut self, pattern: &str) -> bool {
        self.patterns.insert(pattern.to_string())
    }

    pub fn unsubscribe(&mut self, pattern: &str) -> bool {
        self.patterns.remove(pattern)
    }

    /// An empty filter accepts nothing.
    pub fn accepts(&self, topic: &str) -> bool {
        self.patterns.iter().any(|p| pattern_matches(p, topic))
    }

    pub fn topics(&self) -> Vec<&str> {
        self.patterns.iter().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}
