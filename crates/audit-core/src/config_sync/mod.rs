use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use chrono::Utc;
use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::ScannerConfig;
use crate::error::{AuditError, Result};
use crate::types::{AckStatus, ConfigAck, ConfigEnvelope, ServerId};

const BACKOFF_SCHEDULE_SECS: [u64; 6] = [1, 2, 4, 8, 16, 30];
const PING_INTERVAL: Duration = Duration::from_secs(15);
const POLL_INTERVAL: Duration = Duration::from_secs(15);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Persists the raw, unknown-key-preserving config map to the on-disk file
/// format described in SPEC_FULL.md §3.1. Implemented by `audit-config`;
/// `audit-core` only needs this narrow write surface.
pub trait ConfigStore: Send + Sync {
    fn persist(&self, config: &serde_json::Map<String, JsonValue>) -> Result<()>;
}

#[cfg(any(test, feature = "test-support"))]
pub mod test_support {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct RecordingConfigStore {
        pub writes: Mutex<Vec<serde_json::Map<String, JsonValue>>>,
    }

    impl ConfigStore for RecordingConfigStore {
        fn persist(&self, config: &serde_json::Map<String, JsonValue>) -> Result<()> {
            self.writes.lock().unwrap().push(config.clone());
            Ok(())
        }
    }
}

fn parse_scanner_config(config: &serde_json::Map<String, JsonValue>) -> Result<ScannerConfig> {
    serde_json::from_value(JsonValue::Object(config.clone()))
        .map_err(|e| AuditError::Config(format!("invalid config envelope: {e}")))
}

/// Dynamic Configuration Synchroniser (SPEC_FULL.md §4.G). Runs on its own
/// dedicated `tokio` task and is the sole writer to `live` — the scheduler
/// and progress reporter only ever read it (§5's single-writer/many-reader
/// rule).
pub struct ConfigSync {
    server_id: ServerId,
    base_url: String,
    auth_token: Option<String>,
    http: Client,
    live: Arc<ArcSwap<ScannerConfig>>,
    store: Arc<dyn ConfigStore>,
    known_revision: u64,
    last_envelope: Option<ConfigEnvelope>,
}

impl ConfigSync {
    pub fn new(
        server_id: ServerId,
        base_url: String,
        auth_token: Option<String>,
        live: Arc<ArcSwap<ScannerConfig>>,
        store: Arc<dyn ConfigStore>,
    ) -> Self {
        Self {
            server_id,
            base_url,
            auth_token,
            http: Client::new(),
            live,
            store,
            known_revision: 0,
            last_envelope: None,
        }
    }

    /// Applies the apply-diff-ack pipeline from SPEC_FULL.md §4.G step 4 to
    /// one received envelope. Shared by both the WebSocket path and the
    /// polling fallback so there is exactly one implementation of "what an
    /// envelope does once received". Returns `None` when the envelope is
    /// stale and silently dropped; otherwise the ack that should be POSTed.
    pub fn apply_envelope(&mut self, envelope: ConfigEnvelope) -> Option<ConfigAck> {
        if envelope.revision <= self.known_revision {
            debug!(
                revision = envelope.revision,
                known_revision = self.known_revision,
                "dropping stale config envelope"
            );
            return None;
        }

        let changed_keys = envelope.changed_keys(self.last_envelope.as_ref());
        let applied_at_ms = Utc::now().timestamp_millis();

        let (status, message) = match parse_scanner_config(&envelope.config) {
            Ok(next) => {
                if let Err(err) = self.store.persist(&envelope.config) {
                    warn!(error = %err, "failed to persist synced config to local store");
                }
                self.live.store(Arc::new(next));
                self.known_revision = envelope.revision;
                info!(
                    revision = envelope.revision,
                    changed_keys = ?changed_keys,
                    origin = format!("remote_revision_{}", envelope.revision),
                    "applied remote config envelope"
                );
                self.last_envelope = Some(envelope.clone());
                (AckStatus::Applied, None)
            }
            Err(err) => {
                warn!(revision = envelope.revision, error = %err, "rejected remote config envelope");
                (AckStatus::Rejected, Some(err.to_string()))
            }
        };

        Some(ConfigAck {
            server_id: self.server_id.clone(),
            revision: envelope.revision,
            status,
            applied_at_ms,
            message,
            changed_keys,
        })
    }

    fn ws_url(&self) -> String {
        let scheme_stripped = self
            .base_url
            .strip_prefix("https://")
            .map(|rest| format!("wss://{rest}"))
            .or_else(|| self.base_url.strip_prefix("http://").map(|rest| format!("ws://{rest}")))
            .unwrap_or_else(|| self.base_url.clone());
        format!(
            "{scheme_stripped}/ops/mod-config/stream?server_id={}",
            self.server_id.as_str()
        )
    }

    async fn connect_ws(
        &self,
    ) -> Option<tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>> {
        use tokio_tungstenite::tungstenite::client::IntoClientRequest;
        use tokio_tungstenite::tungstenite::http::HeaderValue;

        let mut request = self.ws_url().into_client_request().ok()?;
        if let Some(token) = &self.auth_token {
            let value = HeaderValue::from_str(&format!("Bearer {token}")).ok()?;
            request.headers_mut().insert("authorization", value);
        }
        match tokio_tungstenite::connect_async(request).await {
            Ok((stream, _response)) => Some(stream),
            Err(err) => {
                warn!(error = %err, "config sync websocket connect failed");
                None
            }
        }
    }

    async fn poll_once(&mut self) {
        let url = format!(
            "{}/ops/mod-config/pull?server_id={}&after_revision={}",
            self.base_url,
            self.server_id.as_str(),
            self.known_revision
        );
        let response = match self.http.get(&url).timeout(HTTP_TIMEOUT).send().await {
            Ok(resp) => resp,
            Err(err) => {
                warn!(error = %err, "config sync poll request failed");
                return;
            }
        };
        let body: JsonValue = match response.json().await {
            Ok(body) => body,
            Err(err) => {
                warn!(error = %err, "config sync poll response was not valid JSON");
                return;
            }
        };
        if body.is_null() {
            return;
        }
        let envelope: ConfigEnvelope = match serde_json::from_value(body) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "config sync poll response was not a valid envelope");
                return;
            }
        };
        if let Some(ack) = self.apply_envelope(envelope) {
            self.send_ack(ack).await;
        }
    }

    async fn send_ack(&self, ack: ConfigAck) {
        let url = format!("{}/ops/mod-config/ack", self.base_url);
        if let Err(err) = self.http.post(&url).json(&ack).timeout(HTTP_TIMEOUT).send().await {
            warn!(error = %err, revision = ack.revision, "config sync ack POST failed");
        }
    }

    /// Drives the loop described in SPEC_FULL.md §4.G until `shutdown` fires.
    /// Intended to be spawned as its own `tokio` task per §5.1.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        let mut attempt: usize = 0;
        let mut socket = None;
        let mut ping_due = tokio::time::interval(PING_INTERVAL);
        let mut poll_due = tokio::time::interval(POLL_INTERVAL);

        loop {
            if *shutdown.borrow() {
                break;
            }

            if socket.is_none() {
                let backoff = BACKOFF_SCHEDULE_SECS[attempt.min(BACKOFF_SCHEDULE_SECS.len() - 1)];
                tokio::select! {
                    _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
                    _ = tokio::time::sleep(Duration::from_secs(backoff)) => {}
                }
                match self.connect_ws().await {
                    Some(stream) => {
                        info!("config sync websocket connected");
                        attempt = 0;
                        socket = Some(stream);
                    }
                    None => {
                        attempt = (attempt + 1).min(BACKOFF_SCHEDULE_SECS.len() - 1);
                        continue;
                    }
                }
            }

            let Some(ws) = socket.as_mut() else { continue };
            tokio::select! {
                _ = shutdown.changed() => { if *shutdown.borrow() { break; } }
                _ = ping_due.tick() => {
                    if ws.send(Message::Text("ping".into())).await.is_err() {
                        warn!("config sync heartbeat failed, reconnecting");
                        socket = None;
                    }
                }
                _ = poll_due.tick() => {
                    self.poll_once().await;
                }
                msg = ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if text == "pong" {
                                continue;
                            }
                            match serde_json::from_str::<ConfigEnvelope>(&text) {
                                Ok(envelope) => {
                                    if let Some(ack) = self.apply_envelope(envelope) {
                                        self.send_ack(ack).await;
                                    }
                                }
                                Err(err) => warn!(error = %err, "config sync received a non-envelope text frame"),
                            }
                        }
                        Some(Ok(Message::Close(_))) | None => {
                            info!("config sync websocket closed, will reconnect");
                            socket = None;
                        }
                        Some(Err(err)) => {
                            warn!(error = %err, "config sync websocket error, reconnecting");
                            socket = None;
                        }
                        _ => {}
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_sync::test_support::RecordingConfigStore;
    use serde_json::Map;

    fn envelope(revision: u64, config: Map<String, JsonValue>) -> ConfigEnvelope {
        ConfigEnvelope {
            server_id: ServerId("server-1".to_string()),
            revision,
            updated_at_ms: 0,
            updated_by: "test".to_string(),
            checksum_sha256: "deadbeef".to_string(),
            config,
        }
    }

    fn make_sync() -> (ConfigSync, Arc<ArcSwap<ScannerConfig>>, Arc<RecordingConfigStore>) {
        let live = Arc::new(ArcSwap::from_pointee(ScannerConfig::default()));
        let store = Arc::new(RecordingConfigStore::default());
        let sync = ConfigSync::new(
            ServerId("server-1".to_string()),
            "https://backend.example".to_string(),
            Some("token".to_string()),
            live.clone(),
            store.clone(),
        );
        (sync, live, store)
    }

    #[test]
    fn stale_revision_is_dropped_with_no_ack() {
        let (mut sync, _live, store) = make_sync();
        sync.known_revision = 5;
        let ack = sync.apply_envelope(envelope(5, Map::new()));
        assert!(ack.is_none());
        assert!(store.writes.lock().unwrap().is_empty());
    }

    #[test]
    fn valid_envelope_applies_and_acks() {
        let (mut sync, live, store) = make_sync();
        let mut config = Map::new();
        config.insert("scan_enabled".to_string(), JsonValue::Bool(false));
        let ack = sync.apply_envelope(envelope(1, config)).unwrap();
        assert_eq!(ack.status, AckStatus::Applied);
        assert_eq!(ack.changed_keys, vec!["scan_enabled".to_string()]);
        assert!(!live.load().scan_enabled);
        assert_eq!(store.writes.lock().unwrap().len(), 1);
        assert_eq!(sync.known_revision, 1);
    }

    #[test]
    fn invalid_envelope_rejects_without_mutating_live_config() {
        let (mut sync, live, _store) = make_sync();
        let mut config = Map::new();
        config.insert(
            "scan_containers_per_tick".to_string(),
            JsonValue::String("not-a-number".to_string()),
        );
        let ack = sync.apply_envelope(envelope(1, config)).unwrap();
        assert_eq!(ack.status, AckStatus::Rejected);
        assert!(ack.message.is_some());
        assert_eq!(live.load().scan_containers_per_tick, ScannerConfig::default().scan_containers_per_tick);
        assert_eq!(sync.known_revision, 0);
    }

    #[test]
    fn unknown_keys_round_trip_through_changed_keys_against_prior_envelope() {
        let (mut sync, _live, _store) = make_sync();
        let mut first = Map::new();
        first.insert("scan_enabled".to_string(), JsonValue::Bool(true));
        first.insert("some_future_key".to_string(), JsonValue::String("x".to_string()));
        sync.apply_envelope(envelope(1, first));

        let mut second = Map::new();
        second.insert("scan_enabled".to_string(), JsonValue::Bool(true));
        second.insert("some_future_key".to_string(), JsonValue::String("y".to_string()));
        let ack = sync.apply_envelope(envelope(2, second)).unwrap();
        assert_eq!(ack.changed_keys, vec!["some_future_key".to_string()]);
    }
}
