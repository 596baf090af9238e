use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::TraceId;
use super::scan_target::SourceBucket;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Degraded,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Indexing,
    OfflineWorld,
    OfflineNested,
    OfflineNetwork,
    Runtime,
    Completed,
    Degraded,
}

/// Closed set of session-level fault reasons. See SPEC_FULL.md §7.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    NoTargets,
    WorldIndexFailed,
    NestedDataUnavailable,
    NetworkDataUnavailable,
    HealthGuardBlocked,
    PartialCompleted,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Failure {
    pub code: FailureCode,
    pub message: String,
}

impl Failure {
    pub fn new(code: FailureCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Per-source totals, indexed by [`SourceBucket`]. Kept as named fields
/// (rather than a map) so the wire payload matches §3's
/// `targets_total_by_source{world_containers, nested_offline,
/// network_offline, online_runtime}` shape exactly.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SourceCounters {
    pub world_containers: u64,
    pub nested_offline: u64,
    pub network_offline: u64,
    pub online_runtime: u64,
}

impl SourceCounters {
    pub fn get_mut(&mut self, bucket: SourceBucket) -> &mut u64 {
        match bucket {
            SourceBucket::WorldContainers => &mut self.world_containers,
            SourceBucket::NestedOffline => &mut self.nested_offline,
            SourceBucket::NetworkOffline => &mut self.network_offline,
            SourceBucket::OnlineRuntime => &mut self.online_runtime,
        }
    }

    pub fn total(&self) -> u64 {
        self.world_containers + self.nested_offline + self.network_offline + self.online_runtime
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Counters {
    pub total: u64,
    pub done: u64,
    pub targets_total_by_source: SourceCounters,
    pub done_by_source: SourceCounters,
}

/// Versioned progress payload pushed to the backend. Carries only
/// `state`/`phase`; `running()` is a derived projection, never a stored
/// field (Open Question #1, resolved in DESIGN.md).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProgressRecord {
    pub state: SessionState,
    pub phase: Phase,
    pub counters: Counters,
    pub updated_at: DateTime<Utc>,
    pub failure: Option<Failure>,
    pub trace_id: TraceId,
    pub throughput_per_sec: f64,
}

impl ProgressRecord {
    pub fn idle(trace_id: TraceId, now: DateTime<Utc>) -> Self {
        Self {
            state: SessionState::Idle,
            phase: Phase::Completed,
            counters: Counters::default(),
            updated_at: now,
            failure: None,
            trace_id,
            throughput_per_sec: 0.0,
        }
    }

    pub fn running(&self) -> bool {
        self.state == SessionState::Running
    }
}
