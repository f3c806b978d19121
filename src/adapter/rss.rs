//! RSS 2.0 / RSS 1.0 / Atom feed adapter.
//!
//! Config keys:
//! - `url` (required): http(s) feed address
//! - `headers` (optional): extra request headers
//! - `timeout` (optional): request timeout in seconds, default 30

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;
use reqwest::{Client, StatusCode};
use serde_json::Value;
use tracing::{debug, instrument};
use url::Url;

use crate::content::{ContentKind, Metadata, NewContentItem};
use crate::source::{AdapterConfig, SourceKind};

use super::http_client::build_adapter_http_client;
use super::item_id::stable_item_id;
use super::settings::ConfigReader;
use super::{AdapterDescriptor, AdapterError, FetchAdapter};

/// Registry id of this adapter.
pub const RSS_ADAPTER_ID: &str = "rss";

/// Title used for entries that carry none.
const UNTITLED: &str = "Untitled";

/// Describes the RSS adapter for the registry.
#[must_use]
pub fn descriptor() -> AdapterDescriptor {
    AdapterDescriptor::new(RSS_ADAPTER_ID, "RSS/Atom feed", |source_id, config| {
        Ok(Box::new(RssAdapter::new(source_id, config)?))
    })
    .with_description("Polls an RSS 2.0, RSS 1.0 or Atom feed over HTTP")
    .with_supported_kinds(&[SourceKind::Rss])
    .with_required_config(&["url"])
}

/// Fetches and parses a syndication feed.
#[derive(Debug, Clone)]
pub struct RssAdapter {
    source_id: String,
    url: Url,
    client: Arc<Client>,
}

impl RssAdapter {
    /// Validates `config` and prepares the HTTP client.
    ///
    /// # Errors
    ///
    /// Returns [`AdapterError::Config`] when `url` is missing or malformed, or
    /// `headers`/`timeout` are unusable.
    pub fn new(source_id: &str, config: &AdapterConfig) -> Result<Self, AdapterError> {
        let reader = ConfigReader::new(RSS_ADAPTER_ID, config);
        let url = reader.http_url("url")?;
        let client = build_adapter_http_client(
            RSS_ADAPTER_ID,
            reader.timeout()?,
            reader.headers("headers")?,
        )?;
        Ok(Self {
            source_id: source_id.to_string(),
            url,
            client: Arc::new(client),
        })
    }

    /// Feed address this adapter polls.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    fn entry_to_item(&self, entry: FeedEntry, feed_title: Option<&str>) -> NewContentItem {
        let key = entry.guid.as_deref().or(entry.link.as_deref());
        let mut item = NewContentItem::new(
            stable_item_id(&self.source_id, key),
            &self.source_id,
            ContentKind::Article,
        );
        item.title = entry
            .title
            .filter(|title| !title.trim().is_empty())
            .unwrap_or_else(|| UNTITLED.to_string());
        item.body = entry.content.or(entry.summary).unwrap_or_default();
        item.url = entry.link;
        item.author = entry.author;
        item.published_at = entry.published.or(entry.updated);

        let mut metadata = Metadata::new();
        if let Some(feed_title) = feed_title {
            metadata.insert("feed_title".to_string(), Value::from(feed_title));
        }
        metadata.insert("categories".to_string(), Value::from(entry.categories));
        item.metadata = metadata;
        item
    }
}

#[async_trait]
impl FetchAdapter for RssAdapter {
    fn adapter_id(&self) -> &'static str {
        RSS_ADAPTER_ID
    }

    fn source_id(&self) -> &str {
        &self.source_id
    }

    #[instrument(skip(self), fields(source_id = %self.source_id, url = %self.url))]
    async fn fetch(&self) -> Result<Vec<NewContentItem>, AdapterError> {
        let target = self.url.as_str();
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(|e| AdapterError::from_reqwest(target, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AdapterError::protocol(target, format!("HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AdapterError::from_reqwest(target, &e))?;
        let feed = parse_feed(&body).map_err(|reason| AdapterError::protocol(target, reason))?;

        debug!(entries = feed.entries.len(), "feed parsed");
        let feed_title = feed.title.as_deref();
        Ok(feed
            .entries
            .into_iter()
            .map(|entry| self.entry_to_item(entry, feed_title))
            .collect())
    }

    #[instrument(skip(self), fields(source_id = %self.source_id, url = %self.url))]
    async fn test_connection(&self) -> bool {
        match self.client.head(self.url.clone()).send().await {
            Ok(response) => response.status() == StatusCode::OK,
            Err(e) => {
                debug!(error = %e, "connection test failed");
                false
            }
        }
    }
}

/// A parsed feed document.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Feed {
    pub title: Option<String>,
    pub entries: Vec<FeedEntry>,
}

/// One `<item>` / `<entry>`, with fields from either dialect.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FeedEntry {
    pub title: Option<String>,
    pub link: Option<String>,
    pub guid: Option<String>,
    pub published: Option<DateTime<Utc>>,
    pub updated: Option<DateTime<Utc>>,
    pub summary: Option<String>,
    pub content: Option<String>,
    pub author: Option<String>,
    pub categories: Vec<String>,
}

#[derive(Debug, Default)]
struct EntryBuilder {
    entry: FeedEntry,
    published: Option<String>,
    updated: Option<String>,
}

impl EntryBuilder {
    fn finish(mut self) -> FeedEntry {
        self.entry.published = self.published.as_deref().and_then(parse_date);
        self.entry.updated = self.updated.as_deref().and_then(parse_date);
        self.entry
    }
}

fn append(slot: &mut Option<String>, text: &str) {
    match slot {
        Some(existing) if !existing.is_empty() => {
            existing.push(' ');
            existing.push_str(text);
        }
        _ => *slot = Some(text.to_string()),
    }
}

fn attribute(element: &BytesStart<'_>, name: &str) -> Option<String> {
    element
        .try_get_attribute(name)
        .ok()
        .flatten()
        .and_then(|attr| attr.unescape_value().ok().map(|value| value.into_owned()))
}

/// Parses RFC 2822 (RSS) or RFC 3339 (Atom) timestamps.
fn parse_date(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    DateTime::parse_from_rfc2822(raw)
        .or_else(|_| DateTime::parse_from_rfc3339(raw))
        .map(|date| date.with_timezone(&Utc))
        .ok()
}

/// Tracks where the reader is while walking the document.
#[derive(Debug, Default)]
struct FeedParser {
    stack: Vec<String>,
    root: Option<String>,
    feed: Feed,
    current: Option<EntryBuilder>,
    /// Index in `stack` of the open `<item>`/`<entry>`.
    entry_depth: usize,
}

impl FeedParser {
    fn start(&mut self, element: &BytesStart<'_>, self_closing: bool) {
        let name = String::from_utf8_lossy(element.local_name().as_ref()).into_owned();
        if self.root.is_none() {
            self.root = Some(name.clone());
        }

        if self.current.is_none() && !self_closing && (name == "item" || name == "entry") {
            self.current = Some(EntryBuilder::default());
            self.entry_depth = self.stack.len();
        } else if let Some(builder) = self.current.as_mut()
            && self.stack.len() == self.entry_depth + 1
        {
            match name.as_str() {
                // Atom: <link rel="alternate" href="..."/>
                "link" => {
                    let rel = attribute(element, "rel");
                    if builder.entry.link.is_none()
                        && matches!(rel.as_deref(), None | Some("alternate"))
                        && let Some(href) = attribute(element, "href")
                    {
                        builder.entry.link = Some(href);
                    }
                }
                // Atom: <category term="..."/>
                "category" => {
                    if let Some(term) = attribute(element, "term") {
                        builder.entry.categories.push(term);
                    }
                }
                _ => {}
            }
        }

        if !self_closing {
            self.stack.push(name);
        }
    }

    fn end(&mut self) {
        self.stack.pop();
        if self.stack.len() == self.entry_depth
            && let Some(builder) = self.current.take()
        {
            self.feed.entries.push(builder.finish());
        }
    }

    fn text(&mut self, text: &str) {
        let text = text.trim();
        if text.is_empty() {
            return;
        }

        if self.current.is_none() {
            if self.is_feed_title() {
                append(&mut self.feed.title, text);
            }
            return;
        }
        let Some(builder) = self.current.as_mut() else {
            return;
        };

        let Some(field) = self.stack.get(self.entry_depth + 1) else {
            return;
        };
        let nested = self.stack.len() > self.entry_depth + 2;
        let entry = &mut builder.entry;
        match field.as_str() {
            "title" => append(&mut entry.title, text),
            "link" if entry.link.is_none() => entry.link = Some(text.to_string()),
            "guid" | "id" if entry.guid.is_none() => entry.guid = Some(text.to_string()),
            "pubDate" | "published" | "issued" | "date" => append(&mut builder.published, text),
            "updated" | "modified" => append(&mut builder.updated, text),
            "description" | "summary" => append(&mut entry.summary, text),
            "encoded" | "content" => append(&mut entry.content, text),
            "author" | "creator" => {
                // Atom nests <name>/<email>/<uri>; only the name is wanted.
                if !nested || self.stack.last().is_some_and(|inner| inner == "name") {
                    append(&mut entry.author, text);
                }
            }
            "category" | "subject" => entry.categories.push(text.to_string()),
            _ => {}
        }
    }

    fn is_feed_title(&self) -> bool {
        match self.stack.as_slice() {
            [.., parent, last] if last == "title" => parent == "channel" || parent == "feed",
            _ => false,
        }
    }
}

/// Parses an RSS or Atom document.
///
/// # Errors
///
/// Returns a description of the problem when the document is not well-formed
/// XML or its root is not `rss`, `RDF` or `feed`.
pub fn parse_feed(xml: &str) -> Result<Feed, String> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut parser = FeedParser::default();

    loop {
        match reader.read_event() {
            Ok(Event::Start(element)) => parser.start(&element, false),
            Ok(Event::Empty(element)) => parser.start(&element, true),
            Ok(Event::End(_)) => parser.end(),
            Ok(Event::Text(text)) => {
                let decoded = text
                    .unescape()
                    .map(std::borrow::Cow::into_owned)
                    .unwrap_or_else(|_| String::from_utf8_lossy(&text).into_owned());
                parser.text(&decoded);
            }
            Ok(Event::CData(data)) => {
                let raw = data.into_inner();
                parser.text(&String::from_utf8_lossy(&raw));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ));
            }
        }
    }

    match parser.root.as_deref() {
        Some("rss" | "RDF" | "feed") => Ok(parser.feed),
        Some(other) => Err(format!("not a feed document (root element <{other}>)")),
        None => Err("empty document".to_string()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    const RSS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0" xmlns:content="http://purl.org/rss/1.0/modules/content/" xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel>
    <title>Example News</title>
    <link>https://example.com/</link>
    <item>
      <title>AI regulation passed</title>
      <link>https://example.com/a</link>
      <guid isPermaLink="false">urn:example:a</guid>
      <pubDate>Tue, 10 Jun 2025 04:00:00 GMT</pubDate>
      <description>Short &amp; sweet</description>
      <content:encoded><![CDATA[<p>The <b>full</b> story</p>]]></content:encoded>
      <dc:creator>Jane Doe</dc:creator>
      <category>Politics</category>
      <category>Tech</category>
    </item>
    <item>
      <link>https://example.com/b</link>
      <description>No title here</description>
    </item>
  </channel>
</rss>"#;

    const ATOM: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Blog</title>
  <entry>
    <title>First post</title>
    <link rel="self" href="https://blog.example/api/1"/>
    <link rel="alternate" href="https://blog.example/posts/1"/>
    <id>tag:blog.example,2025:1</id>
    <updated>2025-06-10T12:00:00Z</updated>
    <author><name>Sam</name><email>sam@blog.example</email></author>
    <category term="rust"/>
    <summary>Summary text</summary>
    <content type="html">&lt;p&gt;Body text&lt;/p&gt;</content>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_rss_items() {
        let feed = parse_feed(RSS).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Example News"));
        assert_eq!(feed.entries.len(), 2);

        let first = &feed.entries[0];
        assert_eq!(first.title.as_deref(), Some("AI regulation passed"));
        assert_eq!(first.link.as_deref(), Some("https://example.com/a"));
        assert_eq!(first.guid.as_deref(), Some("urn:example:a"));
        assert_eq!(first.summary.as_deref(), Some("Short & sweet"));
        assert_eq!(first.content.as_deref(), Some("<p>The <b>full</b> story</p>"));
        assert_eq!(first.author.as_deref(), Some("Jane Doe"));
        assert_eq!(first.categories, vec!["Politics", "Tech"]);
        assert_eq!(
            first.published.unwrap().to_rfc3339(),
            "2025-06-10T04:00:00+00:00"
        );

        assert!(feed.entries[1].title.is_none());
    }

    #[test]
    fn test_parse_atom_entries() {
        let feed = parse_feed(ATOM).unwrap();
        assert_eq!(feed.title.as_deref(), Some("Atom Blog"));
        let entry = &feed.entries[0];
        assert_eq!(entry.link.as_deref(), Some("https://blog.example/posts/1"));
        assert_eq!(entry.guid.as_deref(), Some("tag:blog.example,2025:1"));
        assert_eq!(entry.author.as_deref(), Some("Sam"));
        assert_eq!(entry.categories, vec!["rust"]);
        assert_eq!(entry.content.as_deref(), Some("<p>Body text</p>"));
        assert!(entry.published.is_none());
        assert!(entry.updated.is_some());
    }

    #[test]
    fn test_parse_rejects_non_feed_documents() {
        assert!(parse_feed("<html><body>hi</body></html>").is_err());
        assert!(parse_feed("").is_err());
        assert!(parse_feed("<rss><channel><item></channel></rss>").is_err());
    }

    #[test]
    fn test_empty_channel_is_ok() {
        let feed = parse_feed("<rss><channel><title>Quiet</title></channel></rss>").unwrap();
        assert!(feed.entries.is_empty());
    }

    fn adapter() -> RssAdapter {
        let config = json!({"url": "https://example.com/feed.xml"});
        RssAdapter::new("feed-1", config.as_object().unwrap()).unwrap()
    }

    #[test]
    fn test_into_item_maps_fields_and_defaults() {
        let adapter = adapter();
        let feed = parse_feed(RSS).unwrap();
        let mut entries = feed.entries.into_iter();

        let first = adapter.entry_to_item(entries.next().unwrap(), Some("Example News"));
        assert_eq!(first.id, stable_item_id("feed-1", Some("urn:example:a")));
        assert_eq!(first.source_id, "feed-1");
        assert_eq!(first.kind, ContentKind::Article);
        assert_eq!(first.body, "<p>The <b>full</b> story</p>");
        assert_eq!(first.metadata["feed_title"], "Example News");
        assert_eq!(first.metadata["categories"], json!(["Politics", "Tech"]));

        let second = adapter.entry_to_item(entries.next().unwrap(), None);
        assert_eq!(second.title, UNTITLED);
        assert_eq!(second.body, "No title here");
        assert_eq!(
            second.id,
            stable_item_id("feed-1", Some("https://example.com/b"))
        );
    }

    #[test]
    fn test_new_requires_valid_url() {
        let missing = AdapterConfig::new();
        assert!(matches!(
            RssAdapter::new("feed-1", &missing).unwrap_err(),
            AdapterError::Config { .. }
        ));

        let config = json!({"url": "::not-a-url::"});
        assert!(RssAdapter::new("feed-1", config.as_object().unwrap()).is_err());
    }
}
