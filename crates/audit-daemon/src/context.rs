use std::sync::Arc;

use arc_swap::ArcSwap;
use audit_core::config::ScannerConfig;
use audit_core::host::HostBridge;
use audit_core::sink::{EventSink, ProgressTransport};
use audit_core::types::ServerId;

/// The single explicit struct bundling the `HostBridge`, `EventSink`,
/// `ProgressTransport`, and live-config cell handed to the
/// `MonitorScheduler`/`ConfigSync` constructors — per DESIGN NOTES' "no
/// process-wide singletons" rule, nothing here is a global.
pub struct AppContext {
    pub server_id: ServerId,
    pub host: Arc<dyn HostBridge>,
    pub sink: Arc<dyn EventSink>,
    pub progress_transport: Arc<dyn ProgressTransport>,
    pub live_config: Arc<ArcSwap<ScannerConfig>>,
}
