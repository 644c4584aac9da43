use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use tokio::time::{Instant, sleep};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::*;
use crate::response::Response;
use crate::stats::{LocalStats, Stats};

/// Per-VU handle passed to every iteration of a scenario.
pub struct VuContext {
    vu_id: u64,
    client: Client,
    stats: Arc<Stats>,
    local_stats: LocalStats,
    stop: CancellationToken,
}

impl VuContext {
    pub fn new(vu_id: u64, client: Client, stats: Arc<Stats>, stop: CancellationToken) -> Result<Self> {
        Ok(Self {
            vu_id,
            client,
            stats,
            local_stats: LocalStats::new()?,
            stop,
        })
    }

    pub fn vu_id(&self) -> u64 {
        self.vu_id
    }

    /// True once the runner has retired this VU or the run is ending.
    pub fn is_stopping(&self) -> bool {
        self.stop.is_cancelled()
    }

    pub fn check(&self, name: &'static str, ok: bool) {
        self.local_stats.record_check(name, ok);
    }

    pub fn record_error(&self, error: String) {
        self.local_stats.record_error(error);
    }

    pub(crate) fn record_iteration(&self) {
        self.local_stats.record_iteration();
    }

    pub fn flush_stats(&self) {
        self.local_stats.flush(&self.stats);
    }

    /// Sleeps for `duration`, returning early if the VU is told to stop.
    pub async fn pause(&self, duration: Duration) {
        tokio::select! {
            _ = sleep(duration) => {}
            _ = self.stop.cancelled() => {}
        }
    }

    /// POSTs a pre-serialized JSON body and records latency, size and status.
    pub async fn post_json(&self, url: &str, body: String) -> std::result::Result<Response, reqwest::Error> {
        let start = Instant::now();
        let resp = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await;
        self.process_response(resp, start).await
    }

    async fn process_response(
        &self,
        resp: reqwest::Result<reqwest::Response>,
        start: Instant,
    ) -> std::result::Result<Response, reqwest::Error> {
        let result = match resp {
            Ok(r) => Response::new(r).await,
            Err(e) => Err(e),
        };
        let latency = start.elapsed();

        match result {
            Ok(response) => {
                self.local_stats.record_request(
                    latency,
                    response.total_size() as u64,
                    Some(response.status()),
                );
                debug!(
                    vu = self.vu_id,
                    status = response.status(),
                    body_len = response.body_len(),
                    ?latency,
                    "request completed"
                );
                Ok(response)
            }
            Err(e) => {
                self.local_stats.record_request(latency, 0, None);
                let msg = if e.is_timeout() {
                    "Request timeout".to_owned()
                } else if e.is_connect() {
                    format!("Connection error: {}", e)
                } else {
                    format!("Request error: {}", e)
                };
                debug!(vu = self.vu_id, error = %msg, "request failed");
                self.local_stats.record_error(msg);
                Err(e)
            }
        }
    }
}
