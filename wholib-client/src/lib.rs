//! wholib-client: live-update client for the media library
//!
//! Connects a frontend to the library server over the best available
//! channel (SSE, the raw event socket, or timed polling), keeps a local
//! item cache consistent through debounced batching, and supports
//! optimistic mutations with automatic rollback.
//!
//! Most consumers only need [`LiveUpdateClient`]; the individual layers
//! are public for frontends that want to compose them differently.

pub mod api;
pub mod batch;
pub mod cache;
pub mod client;
pub mod optimistic;
pub mod reconnect;
pub mod search;
pub mod transport;

pub use api::{ItemFilter, LibraryApi};
pub use batch::UpdateBatcher;
pub use cache::ItemCache;
pub use client::LiveUpdateClient;
pub use optimistic::OptimisticTracker;
pub use reconnect::{ConnectionState, ReconnectDecision, ReconnectManager, ReconnectPolicy};
pub use search::{SearchDriver, SearchResults};
pub use transport::TransportKind;
