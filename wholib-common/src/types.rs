//! Catalogue item model and related shared types
//!
//! These mirror the REST API's JSON representations. The server owns the
//! data; the client holds read-through cached copies keyed by item id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Enrichment lifecycle of a catalogue entry
///
/// Enrichment is the server-side background process that attaches wiki
/// metadata (summary, image, confidence score) to an item. The client only
/// ever observes the status; transitions happen server-side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EnrichmentStatus {
    /// Not yet processed by the enrichment pipeline
    #[default]
    Pending,
    /// Successfully enriched with wiki metadata
    Enriched,
    /// Enrichment attempted and failed
    Failed,
    /// Intentionally skipped (e.g. unmatchable title)
    Skipped,
}

impl std::fmt::Display for EnrichmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            EnrichmentStatus::Pending => "pending",
            EnrichmentStatus::Enriched => "enriched",
            EnrichmentStatus::Failed => "failed",
            EnrichmentStatus::Skipped => "skipped",
        };
        write!(f, "{}", s)
    }
}

/// Media format of a catalogue entry
///
/// The catalogue mixes televised stories with audio dramas and comics.
/// Unknown values deserialize as `Other` so new server-side types don't
/// break older clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Episode,
    Serial,
    Special,
    Audio,
    Comic,
    #[serde(other)]
    Other,
}

/// A single Doctor Who catalogue entry
///
/// Owned by the server. Client-side copies are provisional only while an
/// optimistic mutation is outstanding; server updates are authoritative.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LibraryItem {
    /// Stable identifier, assigned by the server
    pub id: Uuid,

    /// Canonical title
    pub title: String,
    /// Preferred display title (falls back to `title` when absent)
    #[serde(default)]
    pub display_title: Option<String>,

    /// Section this item belongs to (e.g. "Classic Series")
    #[serde(default)]
    pub section_name: Option<String>,
    /// Group within a section (e.g. a season or a Doctor's era)
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub content_type: Option<ContentType>,

    /// Enrichment pipeline status
    #[serde(default)]
    pub enrichment_status: EnrichmentStatus,
    /// Match confidence reported by the enrichment pipeline (0.0-1.0)
    #[serde(default)]
    pub enrichment_confidence: f32,
    /// Failure or skip reason, when the pipeline reported one
    #[serde(default)]
    pub enrichment_error: Option<String>,

    /// External reference URL attached by enrichment
    #[serde(default)]
    pub wiki_url: Option<String>,
    /// Summary text attached by enrichment
    #[serde(default)]
    pub wiki_summary: Option<String>,
    /// Cover/still image URL attached by enrichment
    #[serde(default)]
    pub wiki_image_url: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LibraryItem {
    /// Title to render on cards: display title when present, else title.
    pub fn display_title(&self) -> &str {
        self.display_title.as_deref().unwrap_or(&self.title)
    }

    /// Whether the enrichment pipeline may still pick this item up.
    pub fn can_be_enriched(&self) -> bool {
        self.enrichment_status == EnrichmentStatus::Pending
    }
}

/// Per-status enrichment counts, carried as optional aggregate statistics
/// in `items_updated` payloads and returned by the stats endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EnrichmentStats {
    pub pending: u64,
    pub enriched: u64,
    pub failed: u64,
    pub skipped: u64,
    pub avg_confidence: f32,
}

/// Library-wide statistics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryStats {
    pub total_items: u64,
    pub total_sections: u64,
    pub total_groups: u64,
    pub enrichment_stats: EnrichmentStats,
}

/// One page of library items
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginatedItems {
    pub items: Vec<LibraryItem>,
    pub total: u64,
    pub page: u64,
    pub size: u64,
    pub pages: u64,
}

/// Favorite marker: a (user, item) join row
///
/// Plain CRUD; the only invariant is uniqueness of the pair, enforced
/// server-side.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Favorite {
    pub user_id: Uuid,
    pub item_id: Uuid,
    pub created_at: DateTime<Utc>,
}

/// Watch-history entry: a (user, item) join row with optional progress
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchEntry {
    pub user_id: Uuid,
    pub item_id: Uuid,
    /// How far through the item the user got, 0.0-100.0
    #[serde(default)]
    pub progress_percent: Option<f32>,
    pub created_at: DateTime<Utc>,
}
