//! Socket transport
//!
//! A TCP stream of newline-delimited JSON `ServerEvent`s, offered by
//! servers that expose a raw event socket alongside the HTTP API. One JSON
//! document per line; blank lines are keep-alives.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, warn};
use wholib_common::events::ServerEvent;
use wholib_common::{Error, Result};

/// Established socket channel.
pub struct SocketTransport {
    reader: BufReader<TcpStream>,
}

impl SocketTransport {
    /// Connect to the event socket.
    pub async fn connect(addr: &str) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        debug!("Connected to event socket at {}", addr);
        Ok(Self {
            reader: BufReader::new(stream),
        })
    }

    /// Read lines and pump decoded events until the peer closes or the
    /// receiver drops.
    pub async fn run(mut self, tx: mpsc::Sender<ServerEvent>) -> Result<()> {
        let mut line = String::new();
        loop {
            line.clear();
            let n = self.reader.read_line(&mut line).await?;
            if n == 0 {
                return Err(Error::Protocol(
                    "event socket closed by server".to_string(),
                ));
            }

            let event = match decode_line(&line) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    warn!("Dropping malformed socket line: {}", e);
                    continue;
                }
            };
            if tx.send(event).await.is_err() {
                debug!("Socket consumer dropped; closing stream");
                return Ok(());
            }
        }
    }
}

/// Decode one line into a `ServerEvent`; blank lines are keep-alives.
pub fn decode_line(line: &str) -> Result<Option<ServerEvent>> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(Some(ServerEvent::Heartbeat));
    }
    serde_json::from_str(trimmed)
        .map(Some)
        .map_err(|e| Error::Protocol(format!("bad socket payload: {}", e)))
}
