//! MangaDex catalog client with rate limiting.
//!
//! Wraps the three API calls the engine makes (chapter feed, single-title
//! latest chapter, manga details batch) behind the [`CatalogClient`]
//! contract. Every request waits on a client-side rate limiter first; the
//! API bans clients that burst past its limits.

use std::collections::HashMap;
use std::num::NonZeroU32;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::DateTime;
use governor::{
    Quota, RateLimiter,
    clock::DefaultClock,
    state::{InMemoryState, direct::NotKeyed},
};
use reqwest::{
    Client, StatusCode,
    header::{HeaderMap, HeaderValue, REFERER, USER_AGENT},
};
use serde::Deserialize;

use crate::domain::manga::TitleDetail;
use crate::domain::services::{
    CatalogClient, CatalogError, FeedItem, FeedPage, FeedResponse, LatestChapter,
};
use crate::infrastructure::config::CatalogConfig;

/// Catalog client configuration.
#[derive(Debug, Clone)]
pub struct MangaDexClientConfig {
    pub api_base: String,
    pub user_agent: String,
    pub referer: String,
    pub timeout_seconds: u64,
    pub max_requests_per_second: u32,
}

impl Default for MangaDexClientConfig {
    fn default() -> Self {
        Self::from(&CatalogConfig::default())
    }
}

impl From<&CatalogConfig> for MangaDexClientConfig {
    fn from(config: &CatalogConfig) -> Self {
        Self {
            api_base: config.api_base.clone(),
            user_agent: config.user_agent.clone(),
            referer: config.referer.clone(),
            timeout_seconds: config.request_timeout_seconds,
            max_requests_per_second: config.max_requests_per_second,
        }
    }
}

pub struct MangaDexClient {
    client: Client,
    rate_limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,
    config: MangaDexClientConfig,
}

impl MangaDexClient {
    pub fn new(config: MangaDexClientConfig) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).context("Invalid user agent")?,
        );
        // The API rejects anonymous scripted traffic without a referer.
        headers.insert(
            REFERER,
            HeaderValue::from_str(&config.referer).context("Invalid referer")?,
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        let quota = Quota::per_second(
            NonZeroU32::new(config.max_requests_per_second)
                .context("Rate limit must be greater than 0")?,
        );
        let rate_limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            rate_limiter,
            config,
        })
    }

    /// Rate-limited GET returning the raw response; status handling is
    /// per-endpoint because 204 means different things to different calls.
    async fn fetch(&self, url: &str) -> Result<reqwest::Response, CatalogError> {
        self.rate_limiter.until_ready().await;
        tracing::debug!("catalog request: {}", url);
        let response = self.client.get(url).send().await?;
        Ok(response)
    }

    fn feed_url(&self, since_epoch: i64, offset: u32, page_size: u32) -> String {
        let since = DateTime::from_timestamp_millis(since_epoch)
            .unwrap_or_default()
            .format("%Y-%m-%dT%H:%M:%S");
        format!(
            "{}/chapter?limit={}&offset={}&publishAtSince={}&order[publishAt]=desc&translatedLanguage[]=en&includeFutureUpdates=0",
            self.config.api_base, page_size, offset, since
        )
    }

    fn latest_chapter_url(&self, title_id: &str) -> String {
        format!(
            "{}/chapter?manga={}&limit=1&order[publishAt]=desc&translatedLanguage[]=en&includeFutureUpdates=0",
            self.config.api_base, title_id
        )
    }

    fn details_url(&self, manga_ids: &[String], page_size: u32) -> String {
        let mut url = format!("{}/manga?limit={}", self.config.api_base, page_size);
        for manga_id in manga_ids {
            url.push_str("&ids[]=");
            url.push_str(manga_id);
        }
        url
    }
}

#[async_trait]
impl CatalogClient for MangaDexClient {
    async fn changes_since(
        &self,
        since_epoch: i64,
        offset: u32,
        page_size: u32,
    ) -> Result<FeedResponse, CatalogError> {
        let url = self.feed_url(since_epoch, offset, page_size);
        let response = self.fetch(&url).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(FeedResponse::NoContent);
        }
        if !response.status().is_success() {
            return Err(CatalogError::from_status(response.status().as_u16()));
        }

        let body = response.text().await?;
        Ok(FeedResponse::Page(parse_feed_page(&body)?))
    }

    async fn latest_chapter(&self, title_id: &str) -> Result<Option<LatestChapter>, CatalogError> {
        let url = self.latest_chapter_url(title_id);
        let response = self.fetch(&url).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !response.status().is_success() {
            return Err(CatalogError::from_status(response.status().as_u16()));
        }

        let body = response.text().await?;
        let page = parse_feed_page(&body)?;
        Ok(page
            .items
            .first()
            .map(|item| LatestChapter {
                publish_at: item.publish_at,
                page_count: item.page_count,
            }))
    }

    async fn title_details(
        &self,
        manga_ids: &[String],
        page_size: u32,
    ) -> Result<Vec<TitleDetail>, CatalogError> {
        if manga_ids.is_empty() {
            return Ok(Vec::new());
        }

        let url = self.details_url(manga_ids, page_size);
        let response = self.fetch(&url).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(Vec::new());
        }
        if !response.status().is_success() {
            return Err(CatalogError::from_status(response.status().as_u16()));
        }

        let body = response.text().await?;
        parse_title_details(&body)
    }
}

// ---- wire models -------------------------------------------------------

#[derive(Debug, Deserialize)]
struct ChapterFeed {
    data: Vec<ChapterEntry>,
    #[serde(default)]
    total: u32,
}

#[derive(Debug, Deserialize)]
struct ChapterEntry {
    #[serde(default)]
    attributes: ChapterAttributes,
    #[serde(default)]
    relationships: Vec<Relationship>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChapterAttributes {
    publish_at: Option<String>,
    #[serde(default)]
    pages: u32,
}

#[derive(Debug, Deserialize)]
struct Relationship {
    id: String,
    #[serde(rename = "type")]
    kind: String,
}

#[derive(Debug, Deserialize)]
struct MangaList {
    data: Vec<MangaEntry>,
}

#[derive(Debug, Deserialize)]
struct MangaEntry {
    id: String,
    #[serde(default)]
    attributes: MangaAttributes,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MangaAttributes {
    #[serde(default)]
    title: HashMap<String, String>,
    #[serde(default)]
    alt_titles: Vec<HashMap<String, String>>,
    status: Option<String>,
    last_volume: Option<String>,
    last_chapter: Option<String>,
}

fn parse_feed_page(body: &str) -> Result<FeedPage, CatalogError> {
    let feed: ChapterFeed = serde_json::from_str(body).map_err(|e| CatalogError::Malformed {
        detail: e.to_string(),
    })?;

    let items = feed
        .data
        .into_iter()
        .filter_map(|entry| {
            // Entries without an attributable title or a parseable publish
            // time cannot be matched against anything; skip them.
            let title_id = entry
                .relationships
                .iter()
                .find(|r| r.kind == "manga")
                .map(|r| r.id.clone())?;
            let publish_at = entry
                .attributes
                .publish_at
                .as_deref()
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|dt| dt.timestamp_millis())?;
            Some(FeedItem {
                title_id,
                publish_at,
                page_count: entry.attributes.pages,
            })
        })
        .collect();

    Ok(FeedPage {
        items,
        total: feed.total,
    })
}

fn parse_title_details(body: &str) -> Result<Vec<TitleDetail>, CatalogError> {
    let list: MangaList = serde_json::from_str(body).map_err(|e| CatalogError::Malformed {
        detail: e.to_string(),
    })?;

    Ok(list
        .data
        .into_iter()
        .map(|entry| TitleDetail {
            manga_id: entry.id,
            title: pick_title(&entry.attributes.title, &entry.attributes.alt_titles),
            status: entry.attributes.status,
            last_volume: entry.attributes.last_volume,
            last_chapter: entry.attributes.last_chapter,
        })
        .collect())
}

/// Display-title preference: the primary `en` title, else the first
/// alternate containing a Latin letter, else any alternate at all.
/// Whatever wins gets its HTML entities decoded.
fn pick_title(
    title: &HashMap<String, String>,
    alt_titles: &[HashMap<String, String>],
) -> Option<String> {
    let decoded = |raw: &str| html_escape::decode_html_entities(raw).into_owned();

    if let Some(en) = title.get("en") {
        return Some(decoded(en));
    }

    for alt in alt_titles {
        for value in alt.values() {
            if value.chars().any(|c| c.is_ascii_alphabetic()) {
                return Some(decoded(value));
            }
        }
    }

    alt_titles
        .iter()
        .flat_map(|alt| alt.values())
        .next()
        .map(|value| decoded(value))
}
