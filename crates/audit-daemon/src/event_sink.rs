use std::time::Duration;

use audit_core::sink::EventSink;
use audit_core::types::SnapshotEvent;
use reqwest::Client;
use tracing::warn;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each [`SnapshotEvent`] to the backend's opaque event sink endpoint
/// (SPEC_FULL.md §6: "best-effort; failures swallowed"). Spawns one
/// fire-and-forget task per event on the handed-in runtime rather than
/// blocking `enqueue`, since `EventSink::enqueue` is called synchronously
/// from the scheduler tick.
pub struct HttpEventSink {
    http: Client,
    url: String,
    auth_token: Option<String>,
    runtime: tokio::runtime::Handle,
}

impl HttpEventSink {
    pub fn new(base_url: &str, auth_token: Option<String>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            http: Client::new(),
            url: format!("{base_url}/ops/events"),
            auth_token,
            runtime,
        }
    }
}

impl EventSink for HttpEventSink {
    fn enqueue(&self, event: SnapshotEvent) {
        let http = self.http.clone();
        let url = self.url.clone();
        let auth_token = self.auth_token.clone();
        self.runtime.spawn(async move {
            let mut request = http.post(&url).json(&event).timeout(HTTP_TIMEOUT);
            if let Some(token) = auth_token {
                request = request.bearer_auth(token);
            }
            if let Err(err) = request.send().await {
                warn!(error = %err, event_id = ?event.event_id, "snapshot event POST failed");
            }
        });
    }
}
