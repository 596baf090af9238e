use std::time::Duration;

use audit_core::sink::ProgressTransport;
use audit_core::types::ProgressRecord;
use reqwest::Client;
use tracing::warn;

const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

/// Posts each [`ProgressRecord`] to `/ops/task-progress` (SPEC_FULL.md §6),
/// best-effort. Mirrors `HttpEventSink`'s fire-and-forget shape so a slow or
/// unreachable backend never stalls the tick task that calls
/// `ProgressTransport::send`.
pub struct HttpProgressTransport {
    http: Client,
    url: String,
    auth_token: Option<String>,
    runtime: tokio::runtime::Handle,
}

impl HttpProgressTransport {
    pub fn new(base_url: &str, auth_token: Option<String>, runtime: tokio::runtime::Handle) -> Self {
        Self {
            http: Client::new(),
            url: format!("{base_url}/ops/task-progress"),
            auth_token,
            runtime,
        }
    }
}

impl ProgressTransport for HttpProgressTransport {
    fn send(&self, record: ProgressRecord) {
        let http = self.http.clone();
        let url = self.url.clone();
        let auth_token = self.auth_token.clone();
        self.runtime.spawn(async move {
            let mut request = http.post(&url).json(&record).timeout(HTTP_TIMEOUT);
            if let Some(token) = auth_token {
                request = request.bearer_auth(token);
            }
            if let Err(err) = request.send().await {
                warn!(error = %err, state = ?record.state, "progress record POST failed");
            }
        });
    }
}
