//! Search-as-you-type driver
//!
//! Keystrokes arrive far faster than the search endpoint should be hit.
//! The driver debounces input, keeps at most one request in flight, and
//! drops responses whose query has already been superseded, so the UI never
//! renders results for something the user is no longer typing.

use std::future::Future;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use wholib_common::types::LibraryItem;
use wholib_common::Result;

/// Results published for the most recent stable query.
#[derive(Debug, Clone, Default)]
pub struct SearchResults {
    pub query: String,
    pub items: Vec<LibraryItem>,
}

/// Debounced search loop handle.
///
/// Feed keystrokes with [`set_query`](Self::set_query); observe results on
/// the receiver from [`results`](Self::results). Dropping the driver (or
/// calling [`shutdown`](Self::shutdown)) cancels the background task.
pub struct SearchDriver {
    query_tx: watch::Sender<String>,
    results_rx: watch::Receiver<SearchResults>,
    task: JoinHandle<()>,
}

impl SearchDriver {
    /// Spawn the driver around any async search function (in production,
    /// `LibraryApi::search`).
    ///
    /// Queries shorter than `min_len` clear results instead of calling the
    /// server.
    pub fn spawn<F, Fut>(search: F, debounce: Duration, min_len: usize) -> Self
    where
        F: Fn(String) -> Fut + Send + 'static,
        Fut: Future<Output = Result<Vec<LibraryItem>>> + Send + 'static,
    {
        let (query_tx, query_rx) = watch::channel(String::new());
        let (results_tx, results_rx) = watch::channel(SearchResults::default());

        let task = tokio::spawn(run_loop(search, query_rx, results_tx, debounce, min_len));

        Self {
            query_tx,
            results_rx,
            task,
        }
    }

    /// Record the latest keystroke state; restarts the debounce window.
    pub fn set_query(&self, query: impl Into<String>) {
        let _ = self.query_tx.send(query.into());
    }

    /// Receiver of published results; `changed().await` to observe updates.
    pub fn results(&self) -> watch::Receiver<SearchResults> {
        self.results_rx.clone()
    }

    pub fn shutdown(self) {
        self.task.abort();
    }
}

async fn run_loop<F, Fut>(
    search: F,
    mut query_rx: watch::Receiver<String>,
    results_tx: watch::Sender<SearchResults>,
    debounce: Duration,
    min_len: usize,
) where
    F: Fn(String) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Vec<LibraryItem>>> + Send + 'static,
{
    loop {
        if query_rx.changed().await.is_err() {
            return; // driver dropped
        }

        // Debounce: restart the window while keystrokes keep arriving.
        let query = loop {
            let candidate = query_rx.borrow_and_update().clone();
            tokio::select! {
                _ = tokio::time::sleep(debounce) => break candidate,
                changed = query_rx.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
            }
        };

        if query.trim().len() < min_len {
            let _ = results_tx.send(SearchResults {
                query,
                items: Vec::new(),
            });
            continue;
        }

        match search(query.clone()).await {
            Ok(items) => {
                // Stale-response check: only publish if the query is still
                // what the user has typed.
                if *query_rx.borrow() == query {
                    debug!("Search for {:?} returned {} item(s)", query, items.len());
                    let _ = results_tx.send(SearchResults { query, items });
                } else {
                    debug!("Dropping stale search response for {:?}", query);
                }
            }
            Err(e) => warn!("Search for {:?} failed: {}", query, e),
        }
    }
}
