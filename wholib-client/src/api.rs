//! Library REST API client
//!
//! Thin typed wrapper over the server's `/api` surface: catalogue browsing
//! and search, enrichment statistics and mutations (the priority re-scrape
//! action), and the user preference rows (favorites, watch history).

use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use wholib_common::types::{
    EnrichmentStats, EnrichmentStatus, Favorite, LibraryItem, LibraryStats, PaginatedItems,
    WatchEntry,
};
use wholib_common::{Error, Result};

/// Optional filter for item listing; the server accepts at most one.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemFilter {
    Section(String),
    Group(String),
    Status(EnrichmentStatus),
}

/// Result of a single-item enrichment request.
#[derive(Debug, Clone, Deserialize)]
pub struct EnrichItemResponse {
    pub id: Uuid,
    pub title: String,
    pub enrichment_status: EnrichmentStatus,
    pub enrichment_confidence: f32,
    #[serde(default)]
    pub wiki_url: Option<String>,
    pub message: String,
}

/// Error body shape the server uses for non-2xx responses.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: String,
}

#[derive(Debug, Serialize)]
struct AddFavoriteRequest {
    item_id: Uuid,
}

#[derive(Debug, Serialize)]
struct RecordWatchRequest {
    item_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    progress_percent: Option<f32>,
}

/// Typed client for the library REST API.
#[derive(Clone)]
pub struct LibraryApi {
    http: reqwest::Client,
    base_url: String,
}

impl LibraryApi {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self { http, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Map a non-success response to a typed error, reading the server's
    /// error body when one is present.
    async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .map(|b| b.detail)
            .unwrap_or_else(|_| status.canonical_reason().unwrap_or("request failed").to_string());

        if status == reqwest::StatusCode::NOT_FOUND {
            Err(Error::NotFound(message))
        } else {
            Err(Error::Api {
                status: status.as_u16(),
                message,
            })
        }
    }

    // ------------------------------------------------------------------
    // Catalogue browsing
    // ------------------------------------------------------------------

    /// Paginated item listing with optional filtering.
    pub async fn get_items(
        &self,
        filter: Option<&ItemFilter>,
        limit: u64,
        offset: u64,
    ) -> Result<PaginatedItems> {
        let mut request = self
            .http
            .get(self.url("/api/library/items"))
            .query(&[("limit", limit), ("offset", offset)]);

        match filter {
            Some(ItemFilter::Section(s)) => request = request.query(&[("section", s)]),
            Some(ItemFilter::Group(g)) => request = request.query(&[("group", g)]),
            Some(ItemFilter::Status(status)) => {
                request = request.query(&[("enrichment_status", status.to_string())])
            }
            None => {}
        }

        let response = Self::check(request.send().await?).await?;
        Ok(response.json().await?)
    }

    pub async fn get_item(&self, id: Uuid) -> Result<LibraryItem> {
        let response = self
            .http
            .get(self.url(&format!("/api/library/items/{}", id)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Full-text search; queries must be non-empty.
    pub async fn search(&self, query: &str, limit: u64) -> Result<Vec<LibraryItem>> {
        if query.trim().is_empty() {
            return Err(Error::Config("search query must not be empty".to_string()));
        }
        let response = self
            .http
            .get(self.url("/api/library/search"))
            .query(&[("q", query)])
            .query(&[("limit", limit)])
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn stats(&self) -> Result<LibraryStats> {
        let response = self.http.get(self.url("/api/library/stats")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn sections(&self) -> Result<Vec<String>> {
        let response = self
            .http
            .get(self.url("/api/library/sections"))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn groups(&self) -> Result<Vec<String>> {
        let response = self.http.get(self.url("/api/library/groups")).send().await?;
        Ok(Self::check(response).await?.json().await?)
    }

    // ------------------------------------------------------------------
    // Enrichment
    // ------------------------------------------------------------------

    pub async fn enrichment_stats(&self) -> Result<EnrichmentStats> {
        let response = self
            .http
            .get(self.url("/api/enrichment/stats"))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Request a priority re-scrape of one item. This is the mutation the
    /// optimistic tracker wraps.
    pub async fn enrich_item(&self, id: Uuid) -> Result<EnrichItemResponse> {
        debug!("Requesting priority re-scrape for item {}", id);
        let response = self
            .http
            .post(self.url(&format!("/api/enrichment/items/{}/enrich", id)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Reset one item's enrichment back to pending.
    pub async fn reset_item(&self, id: Uuid) -> Result<()> {
        let response = self
            .http
            .post(self.url(&format!("/api/enrichment/items/{}/reset", id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // User preferences (plain CRUD join rows)
    // ------------------------------------------------------------------

    pub async fn list_favorites(&self, user_id: Uuid) -> Result<Vec<Favorite>> {
        let response = self
            .http
            .get(self.url(&format!("/api/users/{}/favorites", user_id)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn add_favorite(&self, user_id: Uuid, item_id: Uuid) -> Result<Favorite> {
        let response = self
            .http
            .post(self.url(&format!("/api/users/{}/favorites", user_id)))
            .json(&AddFavoriteRequest { item_id })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn remove_favorite(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/api/users/{}/favorites/{}", user_id, item_id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }

    pub async fn watch_history(&self, user_id: Uuid) -> Result<Vec<WatchEntry>> {
        let response = self
            .http
            .get(self.url(&format!("/api/users/{}/history", user_id)))
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    /// Record (or update) a watch-history row; the server upserts on the
    /// (user, item) pair.
    pub async fn record_watch(
        &self,
        user_id: Uuid,
        item_id: Uuid,
        progress_percent: Option<f32>,
    ) -> Result<WatchEntry> {
        let response = self
            .http
            .post(self.url(&format!("/api/users/{}/history", user_id)))
            .json(&RecordWatchRequest {
                item_id,
                progress_percent,
            })
            .send()
            .await?;
        Ok(Self::check(response).await?.json().await?)
    }

    pub async fn remove_watch(&self, user_id: Uuid, item_id: Uuid) -> Result<()> {
        let response = self
            .http
            .delete(self.url(&format!("/api/users/{}/history/{}", user_id, item_id)))
            .send()
            .await?;
        Self::check(response).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let api = LibraryApi::new(reqwest::Client::new(), "http://localhost:8000/");
        assert_eq!(
            api.url("/api/library/items"),
            "http://localhost:8000/api/library/items"
        );
    }

    #[test]
    fn test_record_watch_request_omits_missing_progress() {
        let body = RecordWatchRequest {
            item_id: Uuid::nil(),
            progress_percent: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("progress_percent"));

        let body = RecordWatchRequest {
            item_id: Uuid::nil(),
            progress_percent: Some(42.5),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("42.5"));
    }

    #[test]
    fn test_enrich_response_decodes() {
        let json = format!(
            r#"{{"id":"{}","title":"Blink","enrichment_status":"enriched","enrichment_confidence":0.97,"wiki_url":"https://tardis.fandom.com/wiki/Blink","message":"Item enriched with status: enriched"}}"#,
            Uuid::new_v4()
        );
        let response: EnrichItemResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(response.enrichment_status, EnrichmentStatus::Enriched);
        assert!(response.enrichment_confidence > 0.9);
    }

    #[tokio::test]
    async fn test_search_rejects_empty_query() {
        let api = LibraryApi::new(reqwest::Client::new(), "http://localhost:8000");
        let result = api.search("   ", 10).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }
}
