//! Public Telegram channel adapter.
//!
//! Scrapes the channel's web preview (`https://t.me/s/<channel>`), newest
//! posts first, following `?before=<id>` pages until `limit` posts have been
//! seen. Posts without text (media only) count toward the limit but are not
//! emitted.
//!
//! Config keys:
//! - `channel_name` (required): public channel username, with or without `@`
//! - `limit` (required): number of most recent posts to look at
//! - `timeout` (optional): request timeout in seconds, default 30
//! - `base_url` (optional): preview host, default `https://t.me`

use std::sync::{Arc, LazyLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use reqwest::Client;
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::content::{ContentKind, Metadata, NewContentItem};
use crate::source::{AdapterConfig, SourceKind};
use crate::text::html_to_text;

use super::http_client::build_adapter_http_client;
use super::item_id::stable_item_id;
use super::settings::ConfigReader;
use super::{AdapterDescriptor, AdapterError, FetchAdapter};

/// Registry id of this adapter.
pub const TCHAN_ADAPTER_ID: &str = "tchan";

const DEFAULT_BASE_URL: &str = "https://t.me";

/// Upper bound on preview pages fetched per cycle.
const MAX_PAGES: usize = 20;

/// Marker present on every channel preview page.
const CHANNEL_PAGE_MARKER: &str = "tgme_channel_info";

#[allow(clippy::expect_used)]
static CHANNEL_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9_]{3,64}$").expect("channel name regex is valid")
});

#[allow(clippy::expect_used)]
static POST_ANCHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"data-post="([^"/]+)/(\d+)""#).expect("post anchor regex is valid")
});

#[allow(clippy::expect_used)]
static POST_TEXT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<div class="tgme_widget_message_text[^"]*"[^>]*>(.*?)</div>"#)
        .expect("post text regex is valid")
});

#[allow(clippy::expect_used)]
static POST_TIME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<time[^>]*datetime="([^"]+)""#).expect("post time regex is valid")
});

#[allow(clippy::expect_used)]
static POST_AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?s)class="tgme_widget_message_(?:from_author|owner_name)"[^>]*>(?:\s*<span[^>]*>)?(.*?)</"#,
    )
    .expect("post author regex is valid")
});

#[allow(clippy::expect_used)]
static POST_VIEWS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<span class="tgme_widget_message_views">([^<]+)</span>"#)
        .expect("post views regex is valid")
});

/// Describes the Telegram adapter for the registry.
#[must_use]
pub fn descriptor() -> AdapterDescriptor {
    AdapterDescriptor::new(
        TCHAN_ADAPTER_ID,
        "Telegram channel",
        |source_id, config| Ok(Box::new(TelegramChannelAdapter::new(source_id, config)?)),
    )
    .with_description("Reads recent posts from a public Telegram channel's web preview")
    .with_supported_kinds(&[SourceKind::Custom])
    .with_required_config(&["channel_name", "limit"])
}

/// A post scraped from the preview page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelPost {
    pub id: u64,
    pub text: Option<String>,
    pub author: Option<String>,
    pub published_at: Option<DateTime<Utc>>,
    pub views: Option<String>,
}

/// Scrapes recent posts of one public channel.
#[derive(Debug, Clone)]
pub struct TelegramChannelAdapter {
    source_id: String,
    channel: String,
    limit: usize,
    base_url: Url,
    client: Arc<Client>,
}

impl TelegramChannelAdapter {
    /// Validates `config` and prepares the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when `channel_name` or `limit` is
    /// missing or invalid.
    pub fn new(source_id: &str, config: &AdapterConfig) -> Result<Self, AdapterError> {
        let reader = ConfigReader::new(TCHAN_ADAPTER_ID, config);
        let raw_channel = reader.required_str("channel_name")?;
        let channel = raw_channel.trim_start_matches('@').to_string();
        if !CHANNEL_NAME.is_match(&channel) {
            return Err(AdapterError::invalid_value(
                TCHAN_ADAPTER_ID,
                "channel_name",
                &format!("{raw_channel}: expected a public channel username"),
            ));
        }

        let limit = reader.required_positive_u64("limit")?;
        let limit = usize::try_from(limit).map_err(|_| {
            AdapterError::invalid_value(TCHAN_ADAPTER_ID, "limit", "value too large")
        })?;

        let base_url = if reader.optional_str("base_url")?.is_some() {
            reader.http_url("base_url")?
        } else {
            Url::parse(DEFAULT_BASE_URL).map_err(|e| {
                AdapterError::invalid_value(TCHAN_ADAPTER_ID, "base_url", &e.to_string())
            })?
        };

        let client = build_adapter_http_client(
            TCHAN_ADAPTER_ID,
            reader.timeout()?,
            reqwest::header::HeaderMap::new(),
        )?;

        Ok(Self {
            source_id: source_id.to_string(),
            channel,
            limit,
            base_url,
            client: Arc::new(client),
        })
    }

    fn base(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    fn preview_url(&self, before: Option<u64>) -> String {
        match before {
            Some(id) => format!("{}/s/{}?before={id}", self.base(), self.channel),
            None => format!("{}/s/{}", self.base(), self.channel),
        }
    }

    fn post_url(&self, id: u64) -> String {
        format!("{}/{}/{id}", self.base(), self.channel)
    }

    async fn get_page(&self, url: &str) -> Result<String, AdapterError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(url, &e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::protocol(url, format!("HTTP {status}")));
        }
        response
            .text()
            .await
            .map_err(|e| AdapterError::from_reqwest(url, &e))
    }

    fn post_to_item(&self, post: ChannelPost, text: String) -> NewContentItem {
        let key = format!("{}/{}", self.channel, post.id);
        let mut item = NewContentItem::new(
            stable_item_id(&self.source_id, Some(&key)),
            &self.source_id,
            ContentKind::Post,
        );
        item.body = text;
        item.url = Some(self.post_url(post.id));
        item.author = post.author;
        item.published_at = post.published_at;

        let mut metadata = Metadata::new();
        metadata.insert("channel".to_string(), Value::from(self.channel.as_str()));
        metadata.insert("message_id".to_string(), Value::from(post.id));
        if let Some(views) = post.views {
            metadata.insert("views".to_string(), Value::from(views));
        }
        item.metadata = metadata;
        item
    }
}

#[async_trait]
impl FetchAdapter for TelegramChannelAdapter {
    fn adapter_id(&self) -> &'static str {
        TCHAN_ADAPTER_ID
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    #[instrument(skip(self), fields(source_id = %self.source_id, channel = %self.channel))]
    async fn fetch(&self) -> Result<Vec<NewContentItem>, AdapterError> {
        let mut collected: Vec<ChannelPost> = Vec::new();
        let mut before: Option<u64> = None;

        for _ in 0..MAX_PAGES {
            let url = self.preview_url(before);
            let page = self.get_page(&url).await?;
            let mut posts = parse_channel_page(&page, &self.channel);
            if let Some(cursor) = before {
                posts.retain(|post| post.id < cursor);
            }
            if posts.is_empty() {
                if before.is_none() && !page.contains(CHANNEL_PAGE_MARKER) {
                    return Err(AdapterError::protocol(
                        &url,
                        "page is not a public channel preview",
                    ));
                }
                break;
            }

            // Pages list oldest first; walk newest first.
            posts.sort_by(|a, b| b.id.cmp(&a.id));
            before = posts.last().map(|post| post.id);
            collected.extend(posts);
            if collected.len() >= self.limit {
                break;
            }
        }

        collected.truncate(self.limit);
        debug!(posts = collected.len(), "channel preview scraped");

        Ok(collected
            .into_iter()
            .filter_map(|mut post| {
                let text = post.text.take()?;
                Some(self.post_to_item(post, text))
            })
            .collect())
    }

    #[instrument(skip(self), fields(source_id = %self.source_id, channel = %self.channel))]
    async fn test_connection(&self) -> bool {
        match self.get_page(&self.preview_url(None)).await {
            Ok(page) => page.contains(CHANNEL_PAGE_MARKER),
            Err(e) => {
                debug!(error = %e, "connection test failed");
                false
            }
        }
    }
}

/// Extracts posts of `channel` from a preview page, in page order.
#[must_use]
pub fn parse_channel_page(html: &str, channel: &str) -> Vec<ChannelPost> {
    let anchors: Vec<(usize, u64)> = POST_ANCHOR
        .captures_iter(html)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            if !caps[1].eq_ignore_ascii_case(channel) {
                return None;
            }
            let id = caps[2].parse::<u64>().ok()?;
            Some((whole.start(), id))
        })
        .collect();

    anchors
        .iter()
        .enumerate()
        .map(|(index, (start, id))| {
            let end = anchors.get(index + 1).map_or(html.len(), |(next, _)| *next);
            let block = &html[*start..end];

            let text = POST_TEXT
                .captures(block)
                .map(|caps| html_to_text(&caps[1]))
                .filter(|text| !text.is_empty());
            let author = POST_AUTHOR
                .captures(block)
                .map(|caps| html_to_text(&caps[1]))
                .filter(|author| !author.is_empty());
            let published_at = POST_TIME.captures(block).and_then(|caps| {
                DateTime::parse_from_rfc3339(&caps[1])
                    .ok()
                    .map(|date| date.with_timezone(&Utc))
            });
            let views = POST_VIEWS
                .captures(block)
                .map(|caps| caps[1].trim().to_string());

            ChannelPost {
                id: *id,
                text,
                author,
                published_at,
                views,
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAGE: &str = r#"
<div class="tgme_channel_info"><div class="tgme_channel_info_header_title">Test</div></div>
<div class="tgme_widget_message_wrap"><div class="tgme_widget_message" data-post="tchantest/7">
  <a class="tgme_widget_message_owner_name" href="https://t.me/tchantest"><span dir="auto">Test Channel</span></a>
  <div class="tgme_widget_message_text js-message_text" dir="auto">First <b>post</b><br/>second line</div>
  <span class="tgme_widget_message_views">1.2K</span>
  <time datetime="2025-06-10T12:00:00+00:00" class="time">12:00</time>
</div></div>
<div class="tgme_widget_message_wrap"><div class="tgme_widget_message" data-post="tchantest/8">
  <a class="tgme_widget_message_photo_wrap" href="https://t.me/tchantest/8"></a>
  <time datetime="2025-06-10T13:00:00+00:00" class="time">13:00</time>
</div></div>
<div class="tgme_widget_message_wrap"><div class="tgme_widget_message" data-post="tchantest/9">
  <div class="tgme_widget_message_text js-message_text" dir="auto">Tom &amp; Jerry</div>
  <time datetime="2025-06-10T14:00:00+00:00" class="time">14:00</time>
</div></div>
"#;

    #[test]
    fn test_parse_channel_page_extracts_posts() {
        let posts = parse_channel_page(PAGE, "tchantest");
        assert_eq!(posts.len(), 3);

        assert_eq!(posts[0].id, 7);
        assert_eq!(posts[0].text.as_deref(), Some("First post\nsecond line"));
        assert_eq!(posts[0].author.as_deref(), Some("Test Channel"));
        assert_eq!(posts[0].views.as_deref(), Some("1.2K"));
        assert!(posts[0].published_at.is_some());

        assert_eq!(posts[1].id, 8);
        assert!(posts[1].text.is_none(), "photo-only post has no text");

        assert_eq!(posts[2].text.as_deref(), Some("Tom & Jerry"));
    }

    #[test]
    fn test_parse_channel_page_ignores_other_channels() {
        assert!(parse_channel_page(PAGE, "otherchannel").is_empty());
    }

    #[test]
    fn test_new_requires_channel_and_limit() {
        let missing_limit = json!({"channel_name": "tchantest"});
        let err = TelegramChannelAdapter::new("tg", missing_limit.as_object().unwrap()).unwrap_err();
        assert!(err.to_string().contains("`limit`"));

        let missing_channel = json!({"limit": 5});
        assert!(TelegramChannelAdapter::new("tg", missing_channel.as_object().unwrap()).is_err());

        let bad_channel = json!({"channel_name": "no spaces allowed", "limit": 5});
        assert!(TelegramChannelAdapter::new("tg", bad_channel.as_object().unwrap()).is_err());
    }

    #[test]
    fn test_urls_strip_at_sign_and_use_base() {
        let config = json!({"channel_name": "@tchantest", "limit": "3"});
        let adapter = TelegramChannelAdapter::new("tg", config.as_object().unwrap()).unwrap();
        assert_eq!(adapter.preview_url(None), "https://t.me/s/tchantest");
        assert_eq!(
            adapter.preview_url(Some(40)),
            "https://t.me/s/tchantest?before=40"
        );
        assert_eq!(adapter.post_url(41), "https://t.me/tchantest/41");
    }
}
