//! Deterministic review text cleaning.
//!
//! The cleaned text feeds the vectorizer and downstream embedding, so the
//! transform must be a fixed point after one pass:
//! `clean(clean(x)) == clean(x)`.
//!
//! Steps: lowercase, strip URLs and e-mail-like tokens, replace anything
//! outside `[a-zA-Z0-9 ]` with a space, collapse whitespace, drop stopwords
//! and single-character tokens, rejoin with single spaces.

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;

static URL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"http\S+|www\.\S+").expect("url pattern"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\S+@\S+").expect("email pattern"));
static NON_ALNUM_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-zA-Z0-9 ]").expect("non-alphanumeric pattern"));

/// English stopwords removed from cleaned text.
pub const STOPWORDS: &[&str] = &[
    "i", "me", "my", "myself", "we", "our", "ours", "ourselves", "you", "your", "yours",
    "yourself", "yourselves", "he", "him", "his", "himself", "she", "her", "hers", "herself",
    "it", "its", "itself", "they", "them", "their", "theirs", "themselves", "what", "which",
    "who", "whom", "this", "that", "these", "those", "am", "is", "are", "was", "were", "be",
    "been", "being", "have", "has", "had", "having", "do", "does", "did", "doing", "a", "an",
    "the", "and", "but", "if", "or", "because", "as", "until", "while", "of", "at", "by",
    "for", "with", "about", "against", "between", "into", "through", "during", "before",
    "after", "above", "below", "to", "from", "up", "down", "in", "out", "on", "off", "over",
    "under", "again", "further", "then", "once", "here", "there", "when", "where", "why",
    "how", "all", "each", "few", "more", "most", "other", "some", "such", "no", "nor", "not",
    "only", "own", "same", "so", "than", "too", "very", "s", "t", "can", "will", "just",
    "don", "should", "now", "d", "ll", "m", "o", "re", "ve", "y",
];

#[derive(Debug, Clone)]
pub struct TextNormalizer {
    stopwords: HashSet<String>,
}

impl Default for TextNormalizer {
    fn default() -> Self {
        Self::new(&[])
    }
}

impl TextNormalizer {
    /// Built-in stopwords plus `extra` (compared lowercased).
    pub fn new(extra: &[String]) -> Self {
        let stopwords = STOPWORDS
            .iter()
            .map(|w| w.to_string())
            .chain(extra.iter().map(|w| w.trim().to_lowercase()))
            .collect();
        Self { stopwords }
    }

    pub fn is_stopword(&self, token: &str) -> bool {
        self.stopwords.contains(token)
    }

    /// Clean `text`. The result may be empty; callers drop such records.
    pub fn clean(&self, text: &str) -> String {
        let lowered = text.to_lowercase();
        let without_urls = URL_RE.replace_all(&lowered, "");
        let without_emails = EMAIL_RE.replace_all(&without_urls, "");
        let alnum = NON_ALNUM_RE.replace_all(&without_emails, " ");

        alnum
            .split_whitespace()
            .filter(|token| token.len() > 1 && !self.is_stopword(token))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleans_markup_and_noise() {
        let cleaner = TextNormalizer::default();
        let out = cleaner.clean(
            "This MOVIE was <b>GREAT</b>!!! See https://example.com/x?y=1 or mail me@site.org :)",
        );
        assert_eq!(out, "movie great see mail");
    }

    #[test]
    fn strips_www_and_single_chars() {
        let cleaner = TextNormalizer::default();
        assert_eq!(cleaner.clean("visit www.foo.bar a b c plot twist"), "visit plot twist");
    }

    #[test]
    fn non_ascii_becomes_separator() {
        let cleaner = TextNormalizer::default();
        assert_eq!(cleaner.clean("café—noir élan"), "caf noir lan");
    }

    #[test]
    fn stopword_only_text_cleans_to_empty() {
        let cleaner = TextNormalizer::default();
        assert_eq!(cleaner.clean("it is what it is"), "");
        assert_eq!(cleaner.clean(""), "");
        assert_eq!(cleaner.clean("!!! ??? ..."), "");
    }

    #[test]
    fn extra_stopwords_apply() {
        let cleaner = TextNormalizer::new(&["Movie".to_string()]);
        assert_eq!(cleaner.clean("great movie"), "great");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let cleaner = TextNormalizer::default();
        let samples = [
            "Great movie! Loved it. Would watch again?",
            "HTTP is not a URL but http://x.y is; so is www.z.com",
            "xhttp token and httpfoo token",
            "emails: a@b.c, foo@@bar, @handle and trailing@",
            "tabs\tand\nnewlines   and   spaces",
            "ÀÉÎÕÜ mixed ünïcödé 123 4 56",
            "",
            "a b c d e",
            "İstanbul ǅ ß ﬁ",
        ];
        for s in samples {
            let once = cleaner.clean(s);
            assert_eq!(cleaner.clean(&once), once, "not idempotent for {:?}", s);
        }
    }
}
