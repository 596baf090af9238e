use std::sync::Arc;

use crate::scheduler::SchedulerProgress;
use crate::sink::ProgressTransport;
use crate::types::{ProgressRecord, SessionState};

const PROGRESS_INTERVAL_MS: i64 = 2000;
const PROGRESS_DONE_STEP: u64 = 20;

/// Per-stream cadence bookkeeping, identical to the gate the scan and audit
/// tasks each keep internally (SPEC_FULL.md §4.D/§4.E): due on a 2s timer, a
/// 20-item progress step, or a state transition, whichever comes first.
struct ReportCadence {
    last_report_ms: i64,
    last_reported_done: u64,
    last_state: Option<SessionState>,
}

impl ReportCadence {
    fn new() -> Self {
        Self {
            last_report_ms: 0,
            last_reported_done: 0,
            last_state: None,
        }
    }

    fn due(&mut self, now_ms: i64, record: &ProgressRecord) -> bool {
        let transitioned = self.last_state != Some(record.state);
        let due_by_time = now_ms - self.last_report_ms >= PROGRESS_INTERVAL_MS;
        let due_by_progress = record
            .counters
            .done
            .saturating_sub(self.last_reported_done)
            >= PROGRESS_DONE_STEP;
        if !transitioned && !due_by_time && !due_by_progress {
            return false;
        }
        self.last_report_ms = now_ms;
        self.last_reported_done = record.counters.done;
        self.last_state = Some(record.state);
        true
    }
}

/// Translates Monitor Scheduler state into the versioned payload described in
/// SPEC_FULL.md §3/§4.F and pushes it to the backend. Holds no reference into
/// either task's internal state — every call it makes takes an
/// already-built, already-owned `ProgressRecord` snapshot, per §4.F's "MUST
/// NOT retain references to internal mutable state; it copies or snapshots
/// before transmitting".
pub struct ProgressReporter {
    transport: Arc<dyn ProgressTransport>,
    scan_cadence: ReportCadence,
    audit_cadence: ReportCadence,
}

impl ProgressReporter {
    pub fn new(transport: Arc<dyn ProgressTransport>) -> Self {
        Self {
            transport,
            scan_cadence: ReportCadence::new(),
            audit_cadence: ReportCadence::new(),
        }
    }

    /// Reports both streams' current snapshot if either is due. Called once
    /// per host tick alongside `MonitorScheduler::tick`, after the tick has
    /// run so counters reflect the work just drained.
    pub fn report(&mut self, now_ms: i64, progress: &SchedulerProgress) {
        if self.scan_cadence.due(now_ms, &progress.scan) {
            self.transport.send(progress.scan.clone());
        }
        if self.audit_cadence.due(now_ms, &progress.audit) {
            self.transport.send(progress.audit.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::test_support::RecordingProgressTransport;
    use crate::types::{Counters, Phase, TraceId};
    use chrono::Utc;

    fn record(state: SessionState, done: u64) -> ProgressRecord {
        ProgressRecord {
            state,
            phase: Phase::Runtime,
            counters: Counters {
                total: 100,
                done,
                ..Counters::default()
            },
            updated_at: Utc::now(),
            failure: None,
            trace_id: TraceId::new(),
            throughput_per_sec: 0.0,
        }
    }

    fn progress(scan_state: SessionState, scan_done: u64, audit_state: SessionState, audit_done: u64) -> SchedulerProgress {
        SchedulerProgress {
            scan: record(scan_state, scan_done),
            audit: record(audit_state, audit_done),
        }
    }

    #[test]
    fn first_report_always_sends_both_streams() {
        let transport = Arc::new(RecordingProgressTransport::default());
        let mut reporter = ProgressReporter::new(transport.clone());
        reporter.report(0, &progress(SessionState::Running, 0, SessionState::Idle, 0));
        assert_eq!(transport.records.lock().unwrap().len(), 2);
    }

    #[test]
    fn unchanged_state_and_progress_is_not_reported_again_before_cadence() {
        let transport = Arc::new(RecordingProgressTransport::default());
        let mut reporter = ProgressReporter::new(transport.clone());
        reporter.report(0, &progress(SessionState::Running, 0, SessionState::Running, 0));
        transport.records.lock().unwrap().clear();
        reporter.report(500, &progress(SessionState::Running, 0, SessionState::Running, 0));
        assert!(transport.records.lock().unwrap().is_empty());
    }

    #[test]
    fn state_transition_forces_a_report_even_mid_cadence_window() {
        let transport = Arc::new(RecordingProgressTransport::default());
        let mut reporter = ProgressReporter::new(transport.clone());
        reporter.report(0, &progress(SessionState::Running, 0, SessionState::Idle, 0));
        transport.records.lock().unwrap().clear();
        reporter.report(100, &progress(SessionState::Completed, 5, SessionState::Idle, 0));
        let sent = transport.records.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].state, SessionState::Completed);
    }

    #[test]
    fn twenty_item_progress_step_forces_a_report() {
        let transport = Arc::new(RecordingProgressTransport::default());
        let mut reporter = ProgressReporter::new(transport.clone());
        reporter.report(0, &progress(SessionState::Running, 0, SessionState::Idle, 0));
        transport.records.lock().unwrap().clear();
        reporter.report(100, &progress(SessionState::Running, 20, SessionState::Idle, 0));
        assert_eq!(transport.records.lock().unwrap().len(), 1);
    }
}
