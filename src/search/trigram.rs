//! Word-trigram similarity, compatible with PostgreSQL's `pg_trgm`.
//!
//! Text is split into lowercase alphanumeric words; each word is padded with
//! two leading blanks and one trailing blank and cut into 3-character
//! windows. Similarity is the Jaccard index of the two trigram sets.
//! Word similarity compares the query against the best-matching run of
//! consecutive words in the text instead of the whole text.

use std::collections::HashSet;

/// Set of trigrams extracted from a text.
pub type TrigramSet = HashSet<[char; 3]>;

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
}

fn add_word_trigrams(word: &str, set: &mut TrigramSet) {
    let padded: Vec<char> = ['\u{20}', '\u{20}']
        .into_iter()
        .chain(word.chars().flat_map(char::to_lowercase))
        .chain(std::iter::once('\u{20}'))
        .collect();
    for window in padded.windows(3) {
        set.insert([window[0], window[1], window[2]]);
    }
}

/// Extracts the trigram set of `text`.
#[must_use]
pub fn trigrams(text: &str) -> TrigramSet {
    let mut set = TrigramSet::new();
    for word in words(text) {
        add_word_trigrams(word, &mut set);
    }
    set
}

/// Number of words in `text`, as counted by [`trigrams`].
#[must_use]
pub fn word_count(text: &str) -> usize {
    words(text).count()
}

/// Jaccard similarity of two trigram sets, in `[0, 1]`. Empty sets score 0.
#[must_use]
pub fn set_similarity(a: &TrigramSet, b: &TrigramSet) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let shared = a.intersection(b).count();
    let union = a.len() + b.len() - shared;
    #[allow(clippy::cast_precision_loss)]
    let score = shared as f64 / union as f64;
    score
}

/// Trigram similarity of two texts.
#[must_use]
pub fn similarity(a: &str, b: &str) -> f64 {
    set_similarity(&trigrams(a), &trigrams(b))
}

/// Best similarity of `query` against any run of consecutive words in `text`.
///
/// Runs are at most one word longer than the query, so a misspelled word in
/// a long body scores as it would against a short title.
#[must_use]
pub fn word_similarity(query: &str, text: &str) -> f64 {
    word_set_similarity(&trigrams(query), word_count(query), text)
}

/// [`word_similarity`] with the query's trigrams and word count precomputed.
#[must_use]
pub fn word_set_similarity(query: &TrigramSet, query_words: usize, text: &str) -> f64 {
    if query.is_empty() {
        return 0.0;
    }
    let word_sets: Vec<TrigramSet> = words(text)
        .map(|word| {
            let mut set = TrigramSet::new();
            add_word_trigrams(word, &mut set);
            set
        })
        .collect();
    let max_run = query_words.max(1) + 1;

    let mut best = 0.0_f64;
    for start in 0..word_sets.len() {
        let mut run = TrigramSet::new();
        for set in word_sets.iter().skip(start).take(max_run) {
            run.extend(set.iter().copied());
            best = best.max(set_similarity(query, &run));
        }
        if best >= 1.0 {
            break;
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trigrams_pad_each_word() {
        let set = trigrams("Cat");
        let expected: TrigramSet = [
            [' ', ' ', 'c'],
            [' ', 'c', 'a'],
            ['c', 'a', 't'],
            ['a', 't', ' '],
        ]
        .into_iter()
        .collect();
        assert_eq!(set, expected);
    }

    #[test]
    fn test_identical_texts_score_one() {
        assert!((similarity("AI regulation", "ai REGULATION!") - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_disjoint_and_empty_texts_score_zero() {
        assert_eq!(similarity("", "anything"), 0.0);
        assert_eq!(similarity("xyz", "qqq"), 0.0);
    }

    #[test]
    fn test_partial_overlap_matches_pg_trgm() {
        // pg_trgm: similarity('word', 'words') = 4 / 6
        let score = similarity("word", "words");
        assert!((score - 4.0 / 6.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_word_similarity_finds_misspelling_in_long_text() {
        let body = "Lawmakers passed a sweeping regulation on artificial intelligence today.";
        assert!(similarity("regulaton", body) < 0.3);
        // "regulaton" vs "regulation": 8 shared of 13 trigrams
        let score = word_similarity("regulaton", body);
        assert!((score - 8.0 / 13.0).abs() < 1e-9, "got {score}");
    }

    #[test]
    fn test_word_similarity_matches_multi_word_runs() {
        let body = "Markets were calm. Parliament passed new AI regulation rules this week.";
        assert!((word_similarity("AI regulation", body) - 1.0).abs() < f64::EPSILON);
        assert_eq!(word_similarity("", body), 0.0);
        assert_eq!(word_similarity("regulation", ""), 0.0);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let a = "New rules on AI regulation";
        let b = "AI regulation passed";
        assert!((similarity(a, b) - similarity(b, a)).abs() < f64::EPSILON);
    }
}
