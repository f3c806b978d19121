//! Best-effort language detection by stop-word frequency.
//!
//! Each detectable language carries a stop-word set (from `stop-words`). A text
//! is attributed to the language whose stop words it uses most, provided that
//! language wins outright and stop words make up a meaningful share of the
//! tokens. Anything else falls back to [`Language::Simple`], which applies no
//! language-specific processing.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};
use stop_words::{LANGUAGE, get};

/// Minimum share of tokens (in percent) that must be stop words of the winner.
const MIN_STOP_WORD_SHARE_PERCENT: usize = 10;

/// Languages the detector can recognise, plus the `simple` fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    English,
    German,
    French,
    Spanish,
    Italian,
    Portuguese,
    Russian,
    Dutch,
    Swedish,
    /// No detected language; text is processed without stop-word filtering.
    Simple,
}

impl Language {
    /// Every language the detector scores, in tie-break order.
    pub const DETECTABLE: [Self; 9] = [
        Self::English,
        Self::German,
        Self::French,
        Self::Spanish,
        Self::Italian,
        Self::Portuguese,
        Self::Russian,
        Self::Dutch,
        Self::Swedish,
    ];

    /// Returns the configuration name stored alongside content items.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::English => "english",
            Self::German => "german",
            Self::French => "french",
            Self::Spanish => "spanish",
            Self::Italian => "italian",
            Self::Portuguese => "portuguese",
            Self::Russian => "russian",
            Self::Dutch => "dutch",
            Self::Swedish => "swedish",
            Self::Simple => "simple",
        }
    }

    /// ISO 639-1 code, `None` for [`Language::Simple`].
    #[must_use]
    pub fn iso_code(self) -> Option<&'static str> {
        match self {
            Self::English => Some("en"),
            Self::German => Some("de"),
            Self::French => Some("fr"),
            Self::Spanish => Some("es"),
            Self::Italian => Some("it"),
            Self::Portuguese => Some("pt"),
            Self::Russian => Some("ru"),
            Self::Dutch => Some("nl"),
            Self::Swedish => Some("sv"),
            Self::Simple => None,
        }
    }

    /// Stop words for this language; empty for [`Language::Simple`].
    #[must_use]
    pub fn stop_words(self) -> &'static HashSet<String> {
        STOP_WORDS.get(&self).unwrap_or(&EMPTY_STOP_WORDS)
    }

    /// Returns `true` when `token` (already lowercased) is a stop word.
    #[must_use]
    pub fn is_stop_word(self, token: &str) -> bool {
        self.stop_words().contains(token)
    }

    fn stop_word_source(self) -> Option<LANGUAGE> {
        match self {
            Self::English => Some(LANGUAGE::English),
            Self::German => Some(LANGUAGE::German),
            Self::French => Some(LANGUAGE::French),
            Self::Spanish => Some(LANGUAGE::Spanish),
            Self::Italian => Some(LANGUAGE::Italian),
            Self::Portuguese => Some(LANGUAGE::Portuguese),
            Self::Russian => Some(LANGUAGE::Russian),
            Self::Dutch => Some(LANGUAGE::Dutch),
            Self::Swedish => Some(LANGUAGE::Swedish),
            Self::Simple => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    /// Accepts configuration names (`english`) and ISO codes (`en`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        if normalized == "simple" {
            return Ok(Self::Simple);
        }
        Self::DETECTABLE
            .into_iter()
            .find(|language| {
                language.as_str() == normalized || language.iso_code() == Some(normalized.as_str())
            })
            .ok_or_else(|| format!("unknown language: {s}"))
    }
}

static STOP_WORDS: LazyLock<HashMap<Language, HashSet<String>>> = LazyLock::new(|| {
    Language::DETECTABLE
        .into_iter()
        .filter_map(|language| {
            let source = language.stop_word_source()?;
            let words = get(source)
                .iter()
                .map(|word| word.to_string().to_lowercase())
                .collect::<HashSet<_>>();
            Some((language, words))
        })
        .collect()
});

static EMPTY_STOP_WORDS: LazyLock<HashSet<String>> = LazyLock::new(HashSet::new);

/// Splits text into lowercase alphanumeric tokens.
#[must_use]
pub fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|token| !token.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Detects the dominant language of `text`, or [`Language::Simple`].
#[must_use]
pub fn detect(text: &str) -> Language {
    let tokens = tokenize(text);
    if tokens.is_empty() {
        return Language::Simple;
    }

    let mut scores: Vec<(Language, usize)> = Language::DETECTABLE
        .into_iter()
        .map(|language| {
            let hits = tokens
                .iter()
                .filter(|token| language.is_stop_word(token))
                .count();
            (language, hits)
        })
        .collect();
    // Stable: equal scores keep DETECTABLE order.
    scores.sort_by(|a, b| b.1.cmp(&a.1));

    let (best, best_hits) = scores[0];
    let runner_up_hits = scores.get(1).map_or(0, |(_, hits)| *hits);

    if best_hits == 0
        || best_hits == runner_up_hits
        || best_hits * 100 < tokens.len() * MIN_STOP_WORD_SHARE_PERCENT
    {
        return Language::Simple;
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detect_english_prose() {
        let text = "The committee said that it would not be able to finish the report \
                    before the end of the year, and they were not happy about it.";
        assert_eq!(detect(text), Language::English);
    }

    #[test]
    fn test_detect_german_prose() {
        let text = "Der Ausschuss sagte, dass er den Bericht nicht vor dem Ende des Jahres \
                    fertigstellen kann, und das ist für uns alle sehr ärgerlich.";
        assert_eq!(detect(text), Language::German);
    }

    #[test]
    fn test_detect_empty_or_stopword_free_text_is_simple() {
        assert_eq!(detect(""), Language::Simple);
        assert_eq!(detect("   \n"), Language::Simple);
        assert_eq!(detect("kubernetes grafana prometheus"), Language::Simple);
    }

    #[test]
    fn test_tokenize_lowercases_and_splits_on_punctuation() {
        assert_eq!(
            tokenize("AI-regulation, passed!  Über"),
            vec!["ai", "regulation", "passed", "über"]
        );
    }

    #[test]
    fn test_language_parses_names_and_iso_codes() {
        assert_eq!("english".parse::<Language>(), Ok(Language::English));
        assert_eq!("DE".parse::<Language>(), Ok(Language::German));
        assert_eq!("simple".parse::<Language>(), Ok(Language::Simple));
        assert!("klingon".parse::<Language>().is_err());
    }

    #[test]
    fn test_simple_has_no_stop_words() {
        assert!(Language::Simple.stop_words().is_empty());
        assert!(Language::English.is_stop_word("the"));
    }
}
