//! Live-update transports
//!
//! Three channels can carry `ServerEvent`s, tried in preference order:
//! server push (SSE), the socket channel, then timed polling as a last
//! resort. Whichever connects feeds the same mpsc stream, so downstream
//! consumers never know which transport is active.

pub mod poll;
pub mod socket;
pub mod sse;

use tokio::sync::mpsc;
use tracing::{debug, info};
use wholib_common::config::ClientConfig;
use wholib_common::events::ServerEvent;
use wholib_common::{Error, Result};

/// Which channel is (or was) carrying events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Sse,
    Socket,
    Polling,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TransportKind::Sse => "sse",
            TransportKind::Socket => "socket",
            TransportKind::Polling => "polling",
        };
        write!(f, "{}", s)
    }
}

/// An established channel, ready to pump events.
pub enum ActiveTransport {
    Sse(sse::SseTransport),
    Socket(socket::SocketTransport),
    Polling(poll::PollTransport),
}

impl ActiveTransport {
    pub fn kind(&self) -> TransportKind {
        match self {
            ActiveTransport::Sse(_) => TransportKind::Sse,
            ActiveTransport::Socket(_) => TransportKind::Socket,
            ActiveTransport::Polling(_) => TransportKind::Polling,
        }
    }

    /// Pump events into `tx` until the channel fails or the receiver drops.
    ///
    /// Returns `Ok(())` only for orderly shutdown (receiver dropped); any
    /// transport failure is an `Err` for the reconnection manager.
    pub async fn run(self, tx: mpsc::Sender<ServerEvent>) -> Result<()> {
        match self {
            ActiveTransport::Sse(t) => t.run(tx).await,
            ActiveTransport::Socket(t) => t.run(tx).await,
            ActiveTransport::Polling(t) => t.run(tx).await,
        }
    }
}

/// Establish one channel, best first.
///
/// A setup error on one transport moves on to the next enabled one; only
/// when every enabled transport refuses to come up does this return an
/// error (which routes to the reconnection manager, not the caller).
pub async fn establish(
    http: &reqwest::Client,
    config: &ClientConfig,
) -> Result<ActiveTransport> {
    if config.sse_enabled {
        match sse::SseTransport::connect(http.clone(), config.events_url()).await {
            Ok(t) => {
                info!("Live-update channel established: sse");
                return Ok(ActiveTransport::Sse(t));
            }
            Err(e) => debug!("SSE setup failed ({}), trying next transport", e),
        }
    }

    if config.socket_enabled {
        if let Some(addr) = &config.socket_addr {
            match socket::SocketTransport::connect(addr).await {
                Ok(t) => {
                    info!("Live-update channel established: socket");
                    return Ok(ActiveTransport::Socket(t));
                }
                Err(e) => debug!("Socket setup failed ({}), trying next transport", e),
            }
        }
    }

    if config.polling_fallback {
        info!("Live-update channel established: polling");
        return Ok(ActiveTransport::Polling(poll::PollTransport::new(
            http.clone(),
            config.base_url.clone(),
            config.poll_interval,
        )));
    }

    Err(Error::Disconnected)
}

/// Polling is always constructible; used when the reconnection manager
/// decides to fall back permanently.
pub fn polling_transport(http: &reqwest::Client, config: &ClientConfig) -> poll::PollTransport {
    poll::PollTransport::new(http.clone(), config.base_url.clone(), config.poll_interval)
}
