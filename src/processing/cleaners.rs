//! Processors that clean up item text.

use async_trait::async_trait;

use crate::content::ContentItem;
use crate::text::{decode_entities, html_to_text, looks_like_html};

use super::{ProcessingError, Processor};

/// Strips markup from bodies and titles that arrive as HTML.
///
/// A reader-mode-lite pass: scripts, styles and comments are dropped, block
/// elements become line breaks, entities are decoded. Plain text is left
/// alone apart from entity decoding in the title.
#[derive(Debug, Clone, Copy, Default)]
pub struct HtmlCleaner;

impl HtmlCleaner {
    pub const ID: &'static str = "html_cleaner";
}

#[async_trait]
impl Processor for HtmlCleaner {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "HTML cleaner"
    }

    async fn process(&self, item: &ContentItem) -> Result<ContentItem, ProcessingError> {
        let mut cleaned = item.clone();
        if looks_like_html(&item.body) {
            cleaned.body = html_to_text(&item.body);
        }
        cleaned.title = if looks_like_html(&item.title) {
            html_to_text(&item.title)
        } else {
            decode_entities(&item.title)
        };
        cleaned.title = cleaned.title.split_whitespace().collect::<Vec<_>>().join(" ");
        Ok(cleaned)
    }
}
