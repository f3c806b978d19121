//! Hybrid search over stored content.
//!
//! Blends SQLite FTS5 bm25 ranking with `pg_trgm`-style trigram similarity:
//!
//! ```text
//! score = lexical_weight * rank + fuzzy_weight * max(sim(title), sim(body))
//! ```
//!
//! Candidates are the union of full-text matches and items whose trigram
//! word similarity (best match against a run of words in the title or body)
//! exceeds the caller's threshold. Lexical-only, fuzzy-only and
//! plain substring modes return the same [`SearchHit`] shape.

mod error;
mod excerpt;
mod lexical;
mod trigram;

pub use error::SearchError;
pub use excerpt::{FALLBACK_EXCERPT_CHARS, choose_excerpt, prefix_excerpt, substring_excerpt};
pub use lexical::{HIGHLIGHT_END, HIGHLIGHT_START, build_match_query, normalize_bm25};
pub use trigram::{
    TrigramSet, set_similarity, similarity, trigrams, word_count, word_set_similarity,
    word_similarity,
};

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use futures_util::TryStreamExt;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::content::{ContentItem, ContentRow, ContentStore};
use crate::language;

use lexical::LexicalMatch;

/// Default minimum trigram similarity for fuzzy candidates.
pub const DEFAULT_SIMILARITY_THRESHOLD: f64 = 0.3;

/// Default weight of the full-text rank.
pub const DEFAULT_LEXICAL_WEIGHT: f64 = 0.4;

/// Default weight of the trigram similarity.
pub const DEFAULT_FUZZY_WEIGHT: f64 = 0.6;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Which signals a search uses.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Full-text rank blended with trigram similarity.
    #[default]
    Hybrid,
    /// Full-text matches only; score is the normalized rank.
    Lexical,
    /// Trigram similarity only; score is the similarity.
    Fuzzy,
    /// Case-insensitive substring scan; every hit scores 1.0.
    Substring,
}

impl SearchMode {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hybrid => "hybrid",
            Self::Lexical => "lexical",
            Self::Fuzzy => "fuzzy",
            Self::Substring => "substring",
        }
    }
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "hybrid" => Ok(Self::Hybrid),
            "lexical" => Ok(Self::Lexical),
            "fuzzy" => Ok(Self::Fuzzy),
            "substring" => Ok(Self::Substring),
            _ => Err(format!(
                "invalid search mode: {s} (expected hybrid, lexical, fuzzy or substring)"
            )),
        }
    }
}

/// Blend weights for hybrid scoring.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SearchWeights {
    pub lexical: f64,
    pub fuzzy: f64,
}

impl Default for SearchWeights {
    fn default() -> Self {
        Self {
            lexical: DEFAULT_LEXICAL_WEIGHT,
            fuzzy: DEFAULT_FUZZY_WEIGHT,
        }
    }
}

impl SearchWeights {
    /// Creates validated weights.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidWeights`] unless both weights are in
    /// `[0, 1]` and sum to 1.
    pub fn new(lexical: f64, fuzzy: f64) -> Result<Self, SearchError> {
        let weights = Self { lexical, fuzzy };
        weights.validate()?;
        Ok(weights)
    }

    /// Checks ranges and the unit sum.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidWeights`] when the check fails.
    pub fn validate(&self) -> Result<(), SearchError> {
        let in_range = |w: f64| (0.0..=1.0).contains(&w);
        if in_range(self.lexical)
            && in_range(self.fuzzy)
            && ((self.lexical + self.fuzzy) - 1.0).abs() <= WEIGHT_SUM_TOLERANCE
        {
            Ok(())
        } else {
            Err(SearchError::InvalidWeights {
                lexical: self.lexical,
                fuzzy: self.fuzzy,
            })
        }
    }

    /// Blended score of one candidate.
    #[must_use]
    pub fn score(&self, lexical_rank: f64, similarity: f64) -> f64 {
        self.lexical * lexical_rank + self.fuzzy * similarity
    }
}

/// One search invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub query: String,
    pub similarity_threshold: f64,
    pub mode: SearchMode,
    /// Maximum number of hits; `None` returns every candidate.
    pub limit: Option<usize>,
}

impl SearchRequest {
    /// Hybrid request without a limit.
    #[must_use]
    pub fn hybrid(query: impl Into<String>, similarity_threshold: f64) -> Self {
        Self {
            query: query.into(),
            similarity_threshold,
            mode: SearchMode::Hybrid,
            limit: None,
        }
    }

    #[must_use]
    pub fn with_mode(mut self, mode: SearchMode) -> Self {
        self.mode = mode;
        self
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A ranked search result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub item: ContentItem,
    pub score: f64,
    /// Normalized bm25 rank; 0 when the index did not match.
    pub lexical_rank: f64,
    /// Whether the full-text index matched the item.
    pub lexical_match: bool,
    pub title_similarity: f64,
    pub body_similarity: f64,
    pub excerpt: String,
}

impl SearchHit {
    /// Fuzzy similarity used in scoring: the better of title and body.
    #[must_use]
    pub fn similarity(&self) -> f64 {
        self.title_similarity.max(self.body_similarity)
    }
}

/// Search engine over a [`ContentStore`].
#[derive(Debug, Clone)]
pub struct SearchEngine {
    store: ContentStore,
    weights: SearchWeights,
}

impl SearchEngine {
    /// Creates an engine with the default 0.4 / 0.6 weights.
    #[must_use]
    pub fn new(store: ContentStore) -> Self {
        Self {
            store,
            weights: SearchWeights::default(),
        }
    }

    /// Replaces the blend weights.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidWeights`] for invalid weights.
    pub fn with_weights(mut self, weights: SearchWeights) -> Result<Self, SearchError> {
        weights.validate()?;
        self.weights = weights;
        Ok(self)
    }

    #[must_use]
    pub fn weights(&self) -> SearchWeights {
        self.weights
    }

    /// Runs a search.
    ///
    /// Hits are ordered by score (descending) with the item id as tie-breaker,
    /// and never contain the same item twice. An empty or whitespace query
    /// returns no hits.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::InvalidThreshold`] before touching the database
    /// when the threshold is NaN or outside `[0, 1]`, and
    /// [`SearchError::Store`] when a query fails.
    #[instrument(skip(self, request), fields(mode = %request.mode, threshold = request.similarity_threshold))]
    pub async fn search(&self, request: &SearchRequest) -> Result<Vec<SearchHit>, SearchError> {
        let threshold = request.similarity_threshold;
        if !(0.0..=1.0).contains(&threshold) {
            return Err(SearchError::InvalidThreshold(threshold));
        }
        let query = request.query.trim();
        if query.is_empty() {
            return Ok(Vec::new());
        }

        let mut hits = match request.mode {
            SearchMode::Substring => self.substring(query).await?,
            SearchMode::Lexical => self.lexical_only(query).await?,
            SearchMode::Hybrid | SearchMode::Fuzzy => {
                self.blended(query, threshold, request.mode).await?
            }
        };

        sort_hits(&mut hits);
        if let Some(limit) = request.limit {
            hits.truncate(limit);
        }
        debug!(hits = hits.len(), "search complete");
        Ok(hits)
    }

    async fn lexical_candidates(&self, query: &str) -> Result<Vec<LexicalMatch>, SearchError> {
        let language = language::detect(query);
        let Some(match_query) = build_match_query(query, language) else {
            debug!(%language, "query has no searchable terms after stop-word removal");
            return Ok(Vec::new());
        };
        debug!(%language, match_query = %match_query, "running full-text query");
        lexical::lexical_matches(self.store.database().pool(), &match_query).await
    }

    async fn lexical_only(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let query_trigrams = trigrams(query);
        let hits = self
            .lexical_candidates(query)
            .await?
            .into_iter()
            .map(|matched| {
                let title_similarity = set_similarity(&query_trigrams, &trigrams(&matched.item.title));
                let body_similarity = set_similarity(&query_trigrams, &trigrams(&matched.item.body));
                let excerpt = choose_excerpt(Some(&matched.snippet), &matched.item.body);
                SearchHit {
                    score: matched.rank,
                    lexical_rank: matched.rank,
                    lexical_match: true,
                    title_similarity,
                    body_similarity,
                    excerpt,
                    item: matched.item,
                }
            })
            .collect();
        Ok(hits)
    }

    /// Hybrid and fuzzy modes: one pass over every stored item.
    async fn blended(
        &self,
        query: &str,
        threshold: f64,
        mode: SearchMode,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let lexical: HashMap<String, LexicalMatch> = if mode == SearchMode::Hybrid {
            self.lexical_candidates(query)
                .await?
                .into_iter()
                .map(|matched| (matched.item.id.clone(), matched))
                .collect()
        } else {
            HashMap::new()
        };

        let query_trigrams = trigrams(query);
        let query_words = word_count(query);
        let mut hits = Vec::new();
        let mut rows = sqlx::query_as::<_, ContentRow>("SELECT * FROM content_items")
            .fetch(self.store.database().pool());
        while let Some(row) = rows.try_next().await? {
            let item = ContentItem::try_from(row)?;
            let matched = lexical.get(&item.id);
            if matched.is_none() {
                let word_match = word_set_similarity(&query_trigrams, query_words, &item.title)
                    .max(word_set_similarity(&query_trigrams, query_words, &item.body));
                if word_match <= threshold {
                    continue;
                }
            }

            let title_similarity = set_similarity(&query_trigrams, &trigrams(&item.title));
            let body_similarity = set_similarity(&query_trigrams, &trigrams(&item.body));
            let similarity = title_similarity.max(body_similarity);

            let lexical_rank = matched.map_or(0.0, |m| m.rank);
            let score = match mode {
                SearchMode::Fuzzy => similarity,
                _ => self.weights.score(lexical_rank, similarity),
            };
            let excerpt = choose_excerpt(matched.map(|m| m.snippet.as_str()), &item.body);
            hits.push(SearchHit {
                item,
                score,
                lexical_rank,
                lexical_match: matched.is_some(),
                title_similarity,
                body_similarity,
                excerpt,
            });
        }
        Ok(hits)
    }

    /// Case-insensitive substring scan over title and body.
    async fn substring(&self, query: &str) -> Result<Vec<SearchHit>, SearchError> {
        let pattern = format!("%{}%", escape_like(query));
        let rows = sqlx::query_as::<_, ContentRow>(
            r"SELECT * FROM content_items
              WHERE title LIKE ?1 ESCAPE '\' OR body LIKE ?1 ESCAPE '\'",
        )
        .bind(pattern)
        .fetch_all(self.store.database().pool())
        .await?;

        let query_trigrams = trigrams(query);
        rows.into_iter()
            .map(|row| -> Result<SearchHit, SearchError> {
                let item = ContentItem::try_from(row)?;
                let excerpt = substring_excerpt(&item.body, query)
                    .or_else(|| substring_excerpt(&item.title, query))
                    .unwrap_or_else(|| prefix_excerpt(&item.body));
                Ok(SearchHit {
                    score: 1.0,
                    lexical_rank: 0.0,
                    lexical_match: false,
                    title_similarity: set_similarity(&query_trigrams, &trigrams(&item.title)),
                    body_similarity: set_similarity(&query_trigrams, &trigrams(&item.body)),
                    excerpt,
                    item,
                })
            })
            .collect()
    }
}

fn escape_like(query: &str) -> String {
    let mut escaped = String::with_capacity(query.len());
    for c in query.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Score descending, then id ascending; drops repeated ids (first wins).
fn sort_hits(hits: &mut Vec<SearchHit>) {
    hits.sort_by(|a, b| match b.score.total_cmp(&a.score) {
        Ordering::Equal => a.item.id.cmp(&b.item.id),
        other => other,
    });
    let mut seen = HashSet::new();
    hits.retain(|hit| seen.insert(hit.item.id.clone()));
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::content::{ContentKind, NewContentItem};
    use crate::db::Database;
    use crate::source::{NewSource, SourceKind, SourceRegistry};

    async fn store_with(items: &[(&str, &str, &str)]) -> ContentStore {
        let db = Database::new_in_memory().await.unwrap();
        let mut source = NewSource::new("News", SourceKind::Rss, "rss");
        source.id = Some("news".to_string());
        SourceRegistry::new(db.clone()).create(source).await.unwrap();

        let store = ContentStore::new(db);
        let batch: Vec<NewContentItem> = items
            .iter()
            .map(|(id, title, body)| {
                let mut item = NewContentItem::new(*id, "news", ContentKind::Article);
                item.title = (*title).to_string();
                item.body = (*body).to_string();
                item
            })
            .collect();
        store.bulk_insert(&batch).await.unwrap();
        store
    }

    #[test]
    fn test_weights_validation() {
        assert!(SearchWeights::default().validate().is_ok());
        assert!(SearchWeights::new(0.5, 0.5).is_ok());
        assert!(matches!(
            SearchWeights::new(0.7, 0.7),
            Err(SearchError::InvalidWeights { .. })
        ));
        assert!(SearchWeights::new(-0.2, 1.2).is_err());
        assert!(SearchWeights::new(f64::NAN, 1.0).is_err());
    }

    #[test]
    fn test_search_mode_parse() {
        assert_eq!("Fuzzy".parse::<SearchMode>(), Ok(SearchMode::Fuzzy));
        assert!("regex".parse::<SearchMode>().is_err());
        assert_eq!(SearchMode::default(), SearchMode::Hybrid);
    }

    #[test]
    fn test_sort_hits_orders_by_score_then_id_and_dedups() {
        let item = |id: &str| ContentItem {
            id: id.to_string(),
            title: String::new(),
            body: String::new(),
            kind: ContentKind::Article,
            url: None,
            author: None,
            published_at: None,
            retrieved_at: chrono::Utc::now(),
            source_id: "news".to_string(),
            language: "simple".to_string(),
            metadata: crate::content::Metadata::new(),
            processed: false,
        };
        let hit = |id: &str, score: f64| SearchHit {
            item: item(id),
            score,
            lexical_rank: 0.0,
            lexical_match: false,
            title_similarity: 0.0,
            body_similarity: 0.0,
            excerpt: String::new(),
        };
        let mut hits = vec![hit("b", 0.5), hit("a", 0.5), hit("c", 0.9), hit("a", 0.1)];
        sort_hits(&mut hits);
        let order: Vec<_> = hits.iter().map(|h| (h.item.id.as_str(), h.score)).collect();
        assert_eq!(order, vec![("c", 0.9), ("a", 0.5), ("b", 0.5)]);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(escape_like(r"50%_off\"), r"50\%\_off\\");
    }

    #[tokio::test]
    async fn test_invalid_threshold_rejected_before_query() {
        let store = store_with(&[]).await;
        let engine = SearchEngine::new(store);
        for threshold in [-0.1, 1.5, f64::NAN] {
            let err = engine
                .search(&SearchRequest::hybrid("anything", threshold))
                .await
                .unwrap_err();
            assert!(matches!(err, SearchError::InvalidThreshold(_)));
        }
    }

    #[tokio::test]
    async fn test_blank_query_returns_nothing() {
        let store = store_with(&[("news:1", "AI regulation", "")]).await;
        let hits = store.search("   ", 0.3).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn test_hybrid_scores_follow_formula() {
        let store = store_with(&[
            ("news:1", "AI regulation passed", ""),
            ("news:2", "New rules on AI regulation", ""),
            ("news:3", "Cooking pasta", "Boil water and add salt."),
        ])
        .await;

        let hits = store.search("AI regulation", 0.3).await.unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.item.id.as_str()).collect();
        assert_eq!(ids, vec!["news:1", "news:2"]);

        let weights = SearchWeights::default();
        for hit in &hits {
            assert!(hit.lexical_match);
            assert!(hit.lexical_rank > 0.0 && hit.lexical_rank < 1.0);
            let expected = weights.score(hit.lexical_rank, hit.similarity());
            assert!((hit.score - expected).abs() < 1e-9);
            assert!(hit.excerpt.contains(HIGHLIGHT_START), "excerpt: {}", hit.excerpt);
        }
    }

    #[tokio::test]
    async fn test_fuzzy_mode_finds_misspellings() {
        let store = store_with(&[
            ("news:1", "Regulation", "Artificial intelligence rules"),
            ("news:2", "Cooking pasta", ""),
        ])
        .await;
        let engine = SearchEngine::new(store);

        let hits = engine
            .search(&SearchRequest::hybrid("regulaton", 0.3).with_mode(SearchMode::Fuzzy))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, "news:1");
        assert!(!hits[0].lexical_match);
        assert!((hits[0].score - hits[0].similarity()).abs() < f64::EPSILON);
        assert!(hits[0].score > 0.3);
    }

    #[tokio::test]
    async fn test_hybrid_finds_misspelled_word_inside_long_body() {
        let store = store_with(&[
            (
                "news:1",
                "Tech policy",
                "Lawmakers passed a sweeping regulation on artificial intelligence today.",
            ),
            ("news:2", "Cooking pasta", "Boil water and add salt."),
        ])
        .await;

        let hits = store.search("regulaton", 0.3).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, "news:1");
        assert!(!hits[0].lexical_match);
        // ranked by whole-text similarity, selected by word similarity
        assert!(hits[0].similarity() < 0.3);
    }

    #[tokio::test]
    async fn test_lexical_mode_uses_rank_only() {
        let store = store_with(&[
            ("news:1", "Parliament debates regulation", "Long debate."),
            ("news:2", "Regulations", "Nothing else."),
            ("news:3", "Cooking pasta", "Boil water."),
        ])
        .await;
        let engine = SearchEngine::new(store);

        let hits = engine
            .search(&SearchRequest::hybrid("regulation", 0.3).with_mode(SearchMode::Lexical))
            .await
            .unwrap();
        // porter stemming matches the plural too
        assert_eq!(hits.len(), 2);
        for hit in &hits {
            assert!((hit.score - hit.lexical_rank).abs() < f64::EPSILON);
        }
    }

    #[tokio::test]
    async fn test_substring_mode_is_case_insensitive() {
        let store = store_with(&[
            ("news:1", "Budget", "The 50% tax cut was approved."),
            ("news:2", "Weather", "Sunny."),
        ])
        .await;
        let engine = SearchEngine::new(store);

        let hits = engine
            .search(&SearchRequest::hybrid("50% TAX", 0.3).with_mode(SearchMode::Substring))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].score, 1.0);
        assert_eq!(hits[0].excerpt, "The [50% tax] cut was approved.");
    }

    #[tokio::test]
    async fn test_limit_truncates_after_sorting() {
        let store = store_with(&[
            ("news:1", "AI regulation passed", ""),
            ("news:2", "New rules on AI regulation", ""),
        ])
        .await;
        let engine = SearchEngine::new(store);
        let hits = engine
            .search(&SearchRequest::hybrid("AI regulation", 0.3).with_limit(1))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item.id, "news:1");
    }
}
