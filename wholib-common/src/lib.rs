//! # Wholib Common Library
//!
//! Shared code for the Doctor Who library client:
//! - Catalogue item model and enrichment status
//! - Server event types (ServerEvent enum) and the UpdateBus
//! - Configuration loading
//! - Common error types

pub mod config;
pub mod error;
pub mod events;
pub mod types;

pub use error::{Error, Result};
pub use types::{EnrichmentStatus, LibraryItem};
