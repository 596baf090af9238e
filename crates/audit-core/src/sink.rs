use crate::types::{ProgressRecord, SnapshotEvent};

/// Destination for finished [`SnapshotEvent`]s. Implementations are assumed
/// thread-safe but, per SPEC_FULL.md §5, are only ever called from the
/// scheduler thread in practice.
pub trait EventSink: Send + Sync {
    fn enqueue(&self, event: SnapshotEvent);
}

/// Destination for [`ProgressRecord`] snapshots. Transport errors are the
/// implementation's problem to swallow — per §4.F the reporter itself never
/// surfaces a transport failure to its caller.
pub trait ProgressTransport: Send + Sync {
    fn send(&self, record: ProgressRecord);
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingEventSink {
        pub events: Mutex<Vec<SnapshotEvent>>,
    }

    impl EventSink for RecordingEventSink {
        fn enqueue(&self, event: SnapshotEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    #[derive(Default)]
    pub struct RecordingProgressTransport {
        pub records: Mutex<Vec<ProgressRecord>>,
    }

    impl ProgressTransport for RecordingProgressTransport {
        fn send(&self, record: ProgressRecord) {
            self.records.lock().unwrap().push(record);
        }
    }
}
