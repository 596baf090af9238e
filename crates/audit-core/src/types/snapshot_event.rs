use serde::{Deserialize, Serialize};

use super::ids::{EventId, ServerId, StorageId, TraceId};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SnapshotEventType {
    InventorySnapshot,
    StorageSnapshot,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ActorType {
    Player,
    System,
}

/// Coordinates a snapshot event was taken at, when the origin has a fixed
/// world position (a container or a decoded block entity).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorldPosition {
    pub dimension: String,
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

/// Immutable once built — one `(container, item-id, count)` tuple with
/// provenance metadata. See SPEC_FULL.md §3.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SnapshotEvent {
    pub event_id: EventId,
    pub timestamp_ms: i64,
    pub server_id: ServerId,
    pub event_type: SnapshotEventType,
    pub player_uuid: Option<uuid::Uuid>,
    pub player_name: Option<String>,
    pub item_id: String,
    pub count: u32,
    pub origin_type: String,
    pub storage_mod: String,
    pub storage_id: StorageId,
    pub actor_type: ActorType,
    pub trace_id: TraceId,
    pub item_fingerprint: String,
    pub position: Option<WorldPosition>,
}

/// Parameters required to build a [`SnapshotEvent`]; mirrors the builder-less
/// `::new` constructors the rest of this crate's types use.
pub struct SnapshotEventBuilder {
    pub server_id: ServerId,
    pub event_type: SnapshotEventType,
    pub player_uuid: Option<uuid::Uuid>,
    pub player_name: Option<String>,
    pub origin_type: String,
    pub storage_mod: String,
    pub storage_id: StorageId,
    pub actor_type: ActorType,
    pub trace_id: TraceId,
    pub position: Option<WorldPosition>,
}

impl SnapshotEventBuilder {
    /// Clamps `count` to a positive 32-bit value, per §3's "count (clamped to
    /// 32-bit positive)". Non-positive counts are the aggregator's
    /// responsibility to have already excluded, but clamping here keeps the
    /// invariant true even for a hand-built test event.
    pub fn build(self, item_id: impl Into<String>, count: i64, now_ms: i64) -> SnapshotEvent {
        let item_id = item_id.into();
        let count = count.clamp(0, i32::MAX as i64) as u32;
        let event_id = EventId::new();
        let item_fingerprint = format!("{}:snapshot:{}", item_id, self.trace_id);
        SnapshotEvent {
            event_id,
            timestamp_ms: now_ms,
            server_id: self.server_id,
            event_type: self.event_type,
            player_uuid: self.player_uuid,
            player_name: self.player_name,
            item_id,
            count,
            origin_type: self.origin_type,
            storage_mod: self.storage_mod,
            storage_id: self.storage_id,
            actor_type: self.actor_type,
            trace_id: self.trace_id,
            item_fingerprint,
            position: self.position,
        }
    }
}
