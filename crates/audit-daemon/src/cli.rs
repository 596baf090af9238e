use std::path::PathBuf;

use clap::Parser;

/// Startup flags for the audit daemon, mirroring the reference binaries'
/// `#[arg(long, env = "...")]` CLI-flag-with-env-fallback shape so an
/// operator can wire either flags or a process environment.
#[derive(Parser, Debug)]
#[command(name = "audit-daemon", about = "Inventory audit Monitor Scheduler daemon")]
pub struct Args {
    /// Identity of the server instance being audited.
    #[arg(long, env = "AUDIT_SERVER_ID")]
    pub server_id: String,

    /// Base URL of the ingest/config backend, e.g. `https://backend.example`.
    #[arg(long, env = "AUDIT_BACKEND_URL")]
    pub backend_url: String,

    /// Bearer token presented to the backend's config-sync and event
    /// endpoints. Omitted when the backend is unauthenticated.
    #[arg(long, env = "AUDIT_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Path to the persisted `key=value` scanner config file. Falls back to
    /// `audit-config`'s own default-candidate search when unset.
    #[arg(long, env = "AUDIT_CONFIG_PATH")]
    pub config_path: Option<PathBuf>,

    /// Root directory of the on-disk world this instance audits.
    #[arg(long, env = "AUDIT_WORLD_ROOT")]
    pub world_root: PathBuf,

    /// Wall-clock spacing between host ticks. Production deployments
    /// embedded in a live server instead drive `MonitorScheduler::tick` from
    /// the host's own tick loop; this flag only matters for this standalone
    /// binary.
    #[arg(long, env = "AUDIT_TICK_INTERVAL_MS", default_value_t = 50)]
    pub tick_interval_ms: u64,
}
