//! Fire-and-forget usage counters.

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use utoipa::ToSchema;

/// A countable event on the request path
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsageEvent {
    AnalysisStarted,
    RankingStarted,
    StreamCompleted { records: usize },
    StreamFailed { records: usize, code: &'static str },
}

/// Sink for usage events. Implementations must not block or fail.
#[cfg_attr(test, mockall::automock)]
pub trait UsageRecorder: Send + Sync {
    fn record(&self, event: UsageEvent);
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UsageSnapshot {
    pub analysis_started: u64,
    pub ranking_started: u64,
    pub stream_completed: u64,
    pub stream_failed: u64,
    pub items_emitted: u64,
}

#[derive(Debug, Default)]
pub struct InMemoryUsageRecorder {
    analysis_started: AtomicU64,
    ranking_started: AtomicU64,
    stream_completed: AtomicU64,
    stream_failed: AtomicU64,
    items_emitted: AtomicU64,
}

impl InMemoryUsageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> UsageSnapshot {
        UsageSnapshot {
            analysis_started: self.analysis_started.load(Ordering::Relaxed),
            ranking_started: self.ranking_started.load(Ordering::Relaxed),
            stream_completed: self.stream_completed.load(Ordering::Relaxed),
            stream_failed: self.stream_failed.load(Ordering::Relaxed),
            items_emitted: self.items_emitted.load(Ordering::Relaxed),
        }
    }
}

impl UsageRecorder for InMemoryUsageRecorder {
    fn record(&self, event: UsageEvent) {
        tracing::debug!(?event, "Usage event");
        match event {
            UsageEvent::AnalysisStarted => {
                self.analysis_started.fetch_add(1, Ordering::Relaxed);
            }
            UsageEvent::RankingStarted => {
                self.ranking_started.fetch_add(1, Ordering::Relaxed);
            }
            UsageEvent::StreamCompleted { records } => {
                self.stream_completed.fetch_add(1, Ordering::Relaxed);
                self.items_emitted
                    .fetch_add(records as u64, Ordering::Relaxed);
            }
            UsageEvent::StreamFailed { records, .. } => {
                self.stream_failed.fetch_add(1, Ordering::Relaxed);
                self.items_emitted
                    .fetch_add(records as u64, Ordering::Relaxed);
            }
        }
    }
}
