pub mod config_envelope;
pub mod ids;
pub mod progress;
pub mod scan_target;
pub mod snapshot_event;

pub use config_envelope::{AckStatus, ConfigAck, ConfigEnvelope};
pub use ids::{EventId, ServerId, StorageId, TraceId};
pub use progress::{Counters, Failure, FailureCode, Phase, ProgressRecord, SessionState, SourceCounters};
pub use scan_target::{NetworkHandle, ScanTarget, SourceBucket};
pub use snapshot_event::{ActorType, SnapshotEvent, SnapshotEventBuilder, SnapshotEventType, WorldPosition};
