//! Processors that add derived attributes to items.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use rake::{Rake, StopWords};

use crate::content::ContentItem;
use crate::language::{self, Language};

use super::{ProcessingError, Processor};

/// Metadata key holding extracted keywords.
pub const KEYWORDS_KEY: &str = "keywords";

/// Maximum keywords stored per item.
pub const MAX_KEYWORDS: usize = 10;

/// Re-detects the item language from its (cleaned) text.
///
/// A detection that comes back [`Language::Simple`] keeps the existing
/// value, so a language declared by the feed is not thrown away.
#[derive(Debug, Clone, Copy, Default)]
pub struct LanguageDetector;

impl LanguageDetector {
    pub const ID: &'static str = "language_detector";
}

#[async_trait]
impl Processor for LanguageDetector {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Language detector"
    }

    async fn process(&self, item: &ContentItem) -> Result<ContentItem, ProcessingError> {
        let sample = if item.body.trim().is_empty() {
            &item.title
        } else {
            &item.body
        };
        let mut enriched = item.clone();
        let detected = language::detect(sample);
        if detected != Language::Simple {
            enriched.set_language(detected.as_str());
        }
        Ok(enriched)
    }
}

/// Extracts RAKE keywords into the `keywords` metadata entry.
///
/// Uses the stop words of the item's language, falling back to English.
/// The title is counted twice so its phrases rank higher.
pub struct KeywordExtractor {
    rakes: HashMap<Language, Rake>,
}

impl std::fmt::Debug for KeywordExtractor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordExtractor")
            .field("languages", &self.rakes.len())
            .finish()
    }
}

impl Default for KeywordExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl KeywordExtractor {
    pub const ID: &'static str = "keyword_extractor";

    /// Builds one RAKE instance per detectable language.
    #[must_use]
    pub fn new() -> Self {
        let rakes = Language::DETECTABLE
            .into_iter()
            .map(|language| {
                let mut stop_words = StopWords::new();
                for word in language.stop_words() {
                    stop_words.insert(word.clone());
                }
                (language, Rake::new(stop_words))
            })
            .collect();
        Self { rakes }
    }

    /// Top keywords of `title` + `body`, lowercased and deduplicated in rank order.
    #[must_use]
    pub fn extract(&self, title: &str, body: &str, language: Language) -> Vec<String> {
        let text = match (title.trim().is_empty(), body.trim().is_empty()) {
            (true, true) => return Vec::new(),
            (false, true) => title.to_string(),
            (true, false) => body.to_string(),
            (false, false) => format!("{title}. {title}. {body}"),
        };
        let Some(rake) = self
            .rakes
            .get(&language)
            .or_else(|| self.rakes.get(&Language::English))
        else {
            return Vec::new();
        };

        let mut seen = HashSet::new();
        rake.run(&text)
            .into_iter()
            .map(|scored| scored.keyword.trim().to_lowercase())
            .filter(|keyword| !keyword.is_empty() && seen.insert(keyword.clone()))
            .take(MAX_KEYWORDS)
            .collect()
    }
}

#[async_trait]
impl Processor for KeywordExtractor {
    fn id(&self) -> &str {
        Self::ID
    }

    fn name(&self) -> &str {
        "Keyword extractor"
    }

    async fn process(&self, item: &ContentItem) -> Result<ContentItem, ProcessingError> {
        let language = item.language.parse().unwrap_or(Language::English);
        let keywords = self.extract(&item.title, &item.body, language);
        let mut enriched = item.clone();
        enriched.metadata.insert(
            KEYWORDS_KEY.to_string(),
            serde_json::Value::Array(keywords.into_iter().map(serde_json::Value::String).collect()),
        );
        Ok(enriched)
    }
}
