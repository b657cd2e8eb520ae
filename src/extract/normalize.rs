//! Word normalization shared by trigger phrases and transcripts.
//! Matching is case- and diacritic-insensitive and ignores punctuation;
//! dispatch text keeps the speaker's casing and only has whitespace tidied.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Normalize a single word for matching: NFD, drop combining marks,
/// lowercase, keep only alphanumerics.
///
/// Returns an empty string for tokens that are pure punctuation.
pub fn normalize_word(word: &str) -> String {
    word.nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .filter(|c| c.is_alphanumeric())
        .collect()
}

/// Split free text into normalized words, dropping tokens that normalize to nothing.
pub fn normalize_words(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(normalize_word)
        .filter(|w| !w.is_empty())
        .collect()
}

/// Trim and collapse internal whitespace runs to single spaces.
pub fn collapse_whitespace(text: &str) -> String {
    WHITESPACE_RUN.replace_all(text.trim(), " ").into_owned()
}

/// A configured wake phrase as an ordered sequence of normalized words.
/// Never empty.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TriggerPhrase {
    words: Vec<String>,
}

impl TriggerPhrase {
    /// Parse a raw trigger string. Returns `None` when nothing survives normalization.
    pub fn parse(raw: &str) -> Option<Self> {
        let words = normalize_words(raw);
        if words.is_empty() {
            return None;
        }
        Some(Self { words })
    }

    pub fn words(&self) -> &[String] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

impl fmt::Display for TriggerPhrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.words.join(" "))
    }
}

/// Sanitize an externally stored trigger list: normalize, drop empties,
/// drop duplicates (first occurrence wins, order preserved).
pub fn sanitize_triggers<S: AsRef<str>>(raw: &[S]) -> Vec<TriggerPhrase> {
    let mut out: Vec<TriggerPhrase> = Vec::with_capacity(raw.len());
    for entry in raw {
        if let Some(phrase) = TriggerPhrase::parse(entry.as_ref()) {
            if !out.contains(&phrase) {
                out.push(phrase);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_word_strips_case_punctuation_and_diacritics() {
        assert_eq!(normalize_word("Assistant,"), "assistant");
        assert_eq!(normalize_word("Café!"), "cafe");
        assert_eq!(normalize_word("JOSÉ"), "jose");
        assert_eq!(normalize_word("..."), "");
    }

    #[test]
    fn test_normalize_words_drops_punctuation_tokens() {
        assert_eq!(
            normalize_words("  Hey — Assistant!  "),
            vec!["hey".to_string(), "assistant".to_string()]
        );
    }

    #[test]
    fn test_collapse_whitespace() {
        assert_eq!(collapse_whitespace("  Turn   on\tthe\nlights "), "Turn on the lights");
        assert_eq!(collapse_whitespace("   "), "");
    }

    #[test]
    fn test_sanitize_removes_empty_and_duplicate_entries() {
        let raw = vec!["Hey Assistant", "", "   ", "hey  assistant!", "Computer", "?!"];
        let phrases = sanitize_triggers(&raw);
        let rendered: Vec<String> = phrases.iter().map(ToString::to_string).collect();
        assert_eq!(rendered, vec!["hey assistant", "computer"]);
    }

    #[test]
    fn test_sanitize_treats_diacritic_variants_as_duplicates() {
        let phrases = sanitize_triggers(&["Hé Ordinateur", "he ordinateur"]);
        assert_eq!(phrases.len(), 1);
        assert_eq!(phrases[0].words(), ["he", "ordinateur"]);
    }

    #[test]
    fn test_parse_rejects_punctuation_only() {
        assert!(TriggerPhrase::parse("--").is_none());
        assert!(TriggerPhrase::parse("").is_none());
    }
}
