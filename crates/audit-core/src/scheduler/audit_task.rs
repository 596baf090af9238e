use std::collections::VecDeque;
use std::sync::Arc;

use arc_swap::ArcSwap;
use chrono::Utc;
use tracing::{debug, warn};

use crate::aggregator::{aggregate_container, ItemFilter};
use crate::config::ScannerConfig;
use crate::host::{HostBridge, OnlinePlayer};
use crate::indexer;
use crate::sink::EventSink;
use crate::types::{
    ActorType, Counters, Failure, FailureCode, Phase, ProgressRecord, ServerId, SessionState,
    SnapshotEventBuilder, SnapshotEventType, TraceId,
};

const PROGRESS_INTERVAL_MS: i64 = 2000;
const PROGRESS_DONE_STEP: u64 = 20;

fn soft_failure(code: FailureCode) -> bool {
    matches!(code, FailureCode::NoTargets)
}

/// Per-player online scan, the "audit" half of the Monitor Scheduler
/// (SPEC_FULL.md §4.E). Unlike the Storage Scanner, every step here is an
/// in-process `HostBridge` call plus an aggregator walk — there is no
/// background worker pool, so the whole session drains synchronously across
/// ticks, budgeted only by `audit_players_per_tick`.
pub struct AuditTask {
    server_id: ServerId,
    host: Arc<dyn HostBridge>,
    sink: Arc<dyn EventSink>,
    config: Arc<ArcSwap<ScannerConfig>>,

    state: SessionState,
    phase: Phase,
    trace_id: TraceId,
    failure: Option<Failure>,
    counters: Counters,

    queue: VecDeque<OnlinePlayer>,

    force_requested: bool,
    next_scheduled_ms: Option<i64>,
    started_ms: i64,
    last_report_ms: i64,
    last_reported_done: u64,
}

impl AuditTask {
    pub fn new(server_id: ServerId, host: Arc<dyn HostBridge>, sink: Arc<dyn EventSink>, config: Arc<ArcSwap<ScannerConfig>>) -> Self {
        Self {
            server_id,
            host,
            sink,
            config,
            state: SessionState::Idle,
            phase: Phase::Completed,
            trace_id: TraceId::new(),
            failure: None,
            counters: Counters::default(),
            queue: VecDeque::new(),
            force_requested: false,
            next_scheduled_ms: None,
            started_ms: 0,
            last_report_ms: 0,
            last_reported_done: 0,
        }
    }

    /// `request_audit_now() → bool` (SPEC_FULL.md §4.E): a single-shot flag,
    /// rejected while a session is already in flight.
    pub fn request_audit_now(&mut self) -> bool {
        if self.state != SessionState::Idle || !self.queue.is_empty() {
            return false;
        }
        self.force_requested = true;
        true
    }

    pub fn progress(&self) -> ProgressRecord {
        let now = Utc::now();
        let elapsed_secs = ((now.timestamp_millis() - self.started_ms).max(1)) as f64 / 1000.0;
        let throughput = if self.state == SessionState::Running {
            self.counters.done as f64 / elapsed_secs
        } else {
            0.0
        };
        ProgressRecord {
            state: self.state,
            phase: self.phase,
            counters: self.counters,
            updated_at: now,
            failure: self.failure.clone(),
            trace_id: self.trace_id,
            throughput_per_sec: throughput,
        }
    }

    pub fn apply_config(&self, next: ScannerConfig) {
        self.config.store(Arc::new(next));
    }

    pub fn shutdown(&mut self) {
        self.queue.clear();
        self.state = SessionState::Idle;
        self.phase = Phase::Completed;
        self.force_requested = false;
    }

    /// `tick(now_ms)` (SPEC_FULL.md §4.E). Mirrors the Storage Scanner's
    /// `IDLE → RUNNING → COMPLETED|DEGRADED → IDLE` state machine: the
    /// terminal-to-idle transition happens on the *next* tick so `progress()`
    /// can observe the terminal state at least once.
    pub fn tick(&mut self, now_ms: i64) {
        let cfg = self.config.load_full();

        if matches!(self.state, SessionState::Completed | SessionState::Degraded) {
            self.state = SessionState::Idle;
        }

        if self.state == SessionState::Idle {
            let time_to_start = self.next_scheduled_ms.map(|t| now_ms >= t).unwrap_or(false);
            if !cfg.audit_enabled {
                // disabled: never auto-starts, force-start still works below.
            } else if time_to_start || self.force_requested {
                self.start_session(&cfg, now_ms);
            }
        }

        if self.state == SessionState::Running {
            self.drain(&cfg, now_ms);
        }

        self.maybe_report(now_ms, false);
    }

    fn start_session(&mut self, cfg: &ScannerConfig, now_ms: i64) {
        self.force_requested = false;
        self.trace_id = TraceId::new();
        self.failure = None;
        self.counters = Counters::default();
        self.started_ms = now_ms;
        self.last_report_ms = now_ms;
        self.last_reported_done = 0;

        self.queue = self.host.online_players().into_iter().collect();
        self.counters.total = self.queue.len() as u64;

        if self.queue.is_empty() {
            self.finish_session(now_ms, FailureCode::NoTargets, "no online players to audit");
            return;
        }
        self.state = SessionState::Running;
        self.phase = Phase::Runtime;
    }

    fn drain(&mut self, cfg: &ScannerConfig, now_ms: i64) {
        let filter = ItemFilter::new(cfg.audit_item_filter.iter().cloned());
        let world_root = self.host.world_root();
        let mut budget = cfg.audit_players_per_tick as usize;

        while budget > 0 {
            let Some(player) = self.queue.pop_front() else {
                break;
            };
            budget -= 1;
            self.audit_one_player(&player, &filter, &world_root, now_ms);
            self.counters.done += 1;
        }

        if self.queue.is_empty() {
            self.finish_session(now_ms, FailureCode::NoTargets, "no online players to audit");
        }
    }

    fn audit_one_player(
        &mut self,
        player: &OnlinePlayer,
        filter: &ItemFilter,
        world_root: &std::path::Path,
        now_ms: i64,
    ) {
        let player_uuid = uuid::Uuid::parse_str(&player.uuid).ok();
        let group_trace = TraceId::new();

        let inventory = self.host.player_inventory(&player.uuid);
        let inventory_outcome = aggregate_container(&inventory, filter);
        self.publish_player_items(
            player,
            player_uuid,
            group_trace,
            "player_inventory",
            inventory_outcome.counts,
            now_ms,
        );

        let ender_chest = self.host.player_ender_chest(&player.uuid);
        let ender_outcome = aggregate_container(&ender_chest, filter);
        self.publish_player_items(
            player,
            player_uuid,
            group_trace,
            "player_ender_chest",
            ender_outcome.counts,
            now_ms,
        );

        let mut linked_items = Vec::new();
        linked_items.extend(inventory.iter().cloned());
        linked_items.extend(ender_chest.iter().cloned());
        match indexer::resolve_player_linked_storage(world_root, &linked_items, filter) {
            Ok(roots) => {
                for (storage_id, counts, truncated) in roots {
                    if truncated {
                        debug!(player = %player.uuid, storage_id = storage_id.as_str(), "nested storage traversal truncated for player-linked container");
                    }
                    let builder = SnapshotEventBuilder {
                        server_id: self.server_id.clone(),
                        event_type: SnapshotEventType::StorageSnapshot,
                        player_uuid,
                        player_name: Some(player.name.clone()),
                        origin_type: "player_nested_storage".to_string(),
                        storage_mod: "unknown".to_string(),
                        storage_id,
                        actor_type: ActorType::Player,
                        trace_id: group_trace,
                        position: None,
                    };
                    for (item_id, count) in counts {
                        self.sink.enqueue(builder_clone(&builder).build(item_id, count, now_ms));
                    }
                }
            }
            Err(err) => {
                warn!(player = %player.uuid, error = %err, "failed to resolve player-linked nested storage");
                if self.failure.is_none() {
                    self.failure = Some(Failure::new(
                        FailureCode::NestedDataUnavailable,
                        format!("nested storage resolution failed for a player: {err}"),
                    ));
                }
            }
        }
    }

    fn publish_player_items(
        &self,
        player: &OnlinePlayer,
        player_uuid: Option<uuid::Uuid>,
        group_trace: TraceId,
        origin_type: &str,
        counts: std::collections::HashMap<String, i64>,
        now_ms: i64,
    ) {
        if counts.is_empty() {
            return;
        }
        let builder = SnapshotEventBuilder {
            server_id: self.server_id.clone(),
            event_type: SnapshotEventType::InventorySnapshot,
            player_uuid,
            player_name: Some(player.name.clone()),
            origin_type: origin_type.to_string(),
            storage_mod: "minecraft".to_string(),
            storage_id: crate::types::StorageId::new(player.uuid.clone()),
            actor_type: ActorType::Player,
            trace_id: group_trace,
            position: None,
        };
        for (item_id, count) in counts {
            self.sink.enqueue(builder_clone(&builder).build(item_id, count, now_ms));
        }
    }

    fn finish_session(&mut self, now_ms: i64, default_code: FailureCode, default_message: &str) {
        if self.failure.is_none() && self.counters.total == 0 {
            self.failure = Some(Failure::new(default_code, default_message));
        }
        let degraded = self
            .failure
            .as_ref()
            .map(|f| !soft_failure(f.code))
            .unwrap_or(false);
        self.state = if degraded {
            SessionState::Degraded
        } else {
            SessionState::Completed
        };
        self.phase = if degraded {
            Phase::Degraded
        } else {
            Phase::Completed
        };
        self.next_scheduled_ms = self
            .config
            .load()
            .audit_interval_ms()
            .map(|interval| now_ms + interval);
        self.maybe_report(now_ms, true);
    }

    fn maybe_report(&mut self, now_ms: i64, forced: bool) {
        let due_by_time = now_ms - self.last_report_ms >= PROGRESS_INTERVAL_MS;
        let due_by_progress =
            self.counters.done.saturating_sub(self.last_reported_done) >= PROGRESS_DONE_STEP;
        if !forced && !due_by_time && !due_by_progress {
            return;
        }
        self.last_report_ms = now_ms;
        self.last_reported_done = self.counters.done;
    }
}

/// `SnapshotEventBuilder` holds no `Copy`/`Clone` derive (its fields are
/// deliberately consumed by `build`), but one player can own several stacks
/// sharing every field except `item_id`/`count` — cloning the handful of
/// owned strings per stack is cheaper than restructuring the builder around
/// a borrowed-fields shape for this one caller.
fn builder_clone(builder: &SnapshotEventBuilder) -> SnapshotEventBuilder {
    SnapshotEventBuilder {
        server_id: builder.server_id.clone(),
        event_type: builder.event_type,
        player_uuid: builder.player_uuid,
        player_name: builder.player_name.clone(),
        origin_type: builder.origin_type.clone(),
        storage_mod: builder.storage_mod.clone(),
        storage_id: builder.storage_id.clone(),
        actor_type: builder.actor_type,
        trace_id: builder.trace_id,
        position: builder.position,
    }
}
