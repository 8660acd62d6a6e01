//! Timed-polling fallback transport
//!
//! Fetches everything changed since a cursor on a fixed interval and
//! re-shapes the response into the same `items_updated` events the push
//! channels deliver. The cursor is the newest `updated_at` observed across
//! applied items, not wall clock, so an update landing while a response was
//! in flight cannot be skipped.

use chrono::{DateTime, Utc};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wholib_common::events::ServerEvent;
use wholib_common::types::{EnrichmentStats, LibraryItem};
use wholib_common::{Error, Result};

/// Response body of `GET /api/library/updates?since=...`
#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    items: Vec<LibraryItem>,
    #[serde(default)]
    stats: Option<EnrichmentStats>,
}

/// Polling channel; always constructible, fails only per-fetch.
pub struct PollTransport {
    http: reqwest::Client,
    base_url: String,
    interval: std::time::Duration,
    cursor: Option<DateTime<Utc>>,
}

impl PollTransport {
    pub fn new(http: reqwest::Client, base_url: String, interval: std::time::Duration) -> Self {
        Self {
            http,
            base_url,
            interval,
            cursor: None,
        }
    }

    fn updates_url(&self) -> String {
        format!(
            "{}/api/library/updates",
            self.base_url.trim_end_matches('/')
        )
    }

    /// Fetch one page of changes and advance the cursor.
    async fn fetch(&mut self) -> Result<Option<ServerEvent>> {
        let mut request = self.http.get(self.updates_url());
        if let Some(cursor) = self.cursor {
            request = request.query(&[("since", cursor.to_rfc3339())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(Error::Api {
                status: response.status().as_u16(),
                message: "polling fetch failed".to_string(),
            });
        }

        let body: UpdatesResponse = response.json().await?;
        if body.items.is_empty() && body.stats.is_none() {
            return Ok(None);
        }

        if let Some(newest) = body.items.iter().map(|i| i.updated_at).max() {
            self.cursor = Some(self.cursor.map_or(newest, |c| c.max(newest)));
        }

        Ok(Some(ServerEvent::ItemsUpdated {
            items: body.items,
            stats: body.stats,
        }))
    }

    /// Poll on the configured interval until the receiver drops.
    ///
    /// Individual fetch failures are logged and retried on the next tick;
    /// polling never escalates to the reconnection manager because it *is*
    /// the fallback.
    pub async fn run(mut self, tx: mpsc::Sender<ServerEvent>) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.fetch().await {
                Ok(Some(event)) => {
                    if tx.send(event).await.is_err() {
                        debug!("Polling consumer dropped; stopping");
                        return Ok(());
                    }
                }
                Ok(None) => {
                    // Nothing changed; heartbeat keeps liveness indicators fresh.
                    if tx.send(ServerEvent::Heartbeat).await.is_err() {
                        return Ok(());
                    }
                }
                Err(e) => warn!("Polling fetch failed (retrying next tick): {}", e),
            }
        }
    }
}
