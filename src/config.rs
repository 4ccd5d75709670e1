//! Per-session parse configuration.
//
//  Everything here is handed to a session once, before the first fragment,
//  and never changes while that session runs.

use std::collections::HashSet;

/// Case-insensitive set of bare keywords (`None`, `NIL`, `yes`, …).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeywordSet {
    words: HashSet<String>,
}

impl KeywordSet {
    pub fn new<I, S>(words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            words: words
                .into_iter()
                .map(|w| w.as_ref().trim().to_lowercase())
                .filter(|w| !w.is_empty())
                .collect(),
        }
    }

    pub fn contains(&self, word: &str) -> bool {
        self.words.contains(&word.trim().to_lowercase())
    }

    pub fn insert(&mut self, word: &str) {
        let w = word.trim().to_lowercase();
        if !w.is_empty() {
            self.words.insert(w);
        }
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }
}

/// Options for one parse session.
#[derive(Debug, Clone, PartialEq)]
pub struct ParseOptions {
    pub null_keywords: KeywordSet,
    pub true_keywords: KeywordSet,
    pub false_keywords: KeywordSet,
    /// `( … )` in value position builds a sequence instead of failing.
    pub allow_parenthesized_sequences: bool,
    /// Two adjacent elements without a `,` get a synthetic separator.
    pub allow_missing_commas: bool,
    /// Bare words are accepted as object keys.
    pub allow_unquoted_keys: bool,
    /// Strip code fences, `return`, `return(...)` and `<Tag>` wrappers.
    pub unwrap_response: bool,
    /// Tag names accepted as wrappers; empty accepts any tag.
    pub response_tags: Vec<String>,
    pub coerce_numeric_strings: bool,
    pub stringify_numbers: bool,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            null_keywords: KeywordSet::new(["null", "none", "nil", "nothing"]),
            true_keywords: KeywordSet::new(["true", "yes", "on", "y", "t"]),
            false_keywords: KeywordSet::new(["false", "no", "off", "n", "f"]),
            allow_parenthesized_sequences: true,
            allow_missing_commas: true,
            allow_unquoted_keys: true,
            unwrap_response: true,
            response_tags: Vec::new(),
            coerce_numeric_strings: true,
            stringify_numbers: false,
        }
    }
}

impl ParseOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recovery rule switched off. Well-formed JSON still parses;
    /// bare keywords still lex as ambiguous scalars.
    pub fn strict() -> Self {
        Self {
            allow_parenthesized_sequences: false,
            allow_missing_commas: false,
            allow_unquoted_keys: false,
            unwrap_response: false,
            coerce_numeric_strings: false,
            ..Self::default()
        }
    }

    pub fn with_null_keywords<I, S>(mut self, words: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.null_keywords = KeywordSet::new(words);
        self
    }

    pub fn with_bool_keywords<I, S, J, T>(mut self, truthy: I, falsy: J) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
        J: IntoIterator<Item = T>,
        T: AsRef<str>,
    {
        self.true_keywords = KeywordSet::new(truthy);
        self.false_keywords = KeywordSet::new(falsy);
        self
    }

    pub fn with_parenthesized_sequences(mut self, allow: bool) -> Self {
        self.allow_parenthesized_sequences = allow;
        self
    }

    pub fn with_missing_commas(mut self, allow: bool) -> Self {
        self.allow_missing_commas = allow;
        self
    }

    pub fn with_unquoted_keys(mut self, allow: bool) -> Self {
        self.allow_unquoted_keys = allow;
        self
    }

    pub fn with_unwrap_response(mut self, unwrap: bool) -> Self {
        self.unwrap_response = unwrap;
        self
    }

    pub fn with_response_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.response_tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_numeric_string_coercion(mut self, coerce: bool) -> Self {
        self.coerce_numeric_strings = coerce;
        self
    }

    pub fn with_stringified_numbers(mut self, stringify: bool) -> Self {
        self.stringify_numbers = stringify;
        self
    }

    /// Which boolean keyword set `word` belongs to, if any.
    pub fn bool_keyword(&self, word: &str) -> Option<bool> {
        if self.true_keywords.contains(word) {
            Some(true)
        } else if self.false_keywords.contains(word) {
            Some(false)
        } else {
            None
        }
    }

    pub fn is_null_keyword(&self, word: &str) -> bool {
        self.null_keywords.contains(word)
    }

    /// Null or boolean keyword.
    pub fn is_keyword(&self, word: &str) -> bool {
        self.is_null_keyword(word) || self.bool_keyword(word).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_are_case_insensitive() {
        let opts = ParseOptions::default();
        assert!(opts.is_null_keyword("None"));
        assert!(opts.is_null_keyword("NIL"));
        assert!(opts.is_null_keyword("nothing"));
        assert!(!opts.is_null_keyword("nope"));
        assert_eq!(opts.bool_keyword("YES"), Some(true));
        assert_eq!(opts.bool_keyword("Off"), Some(false));
        assert_eq!(opts.bool_keyword("maybe"), None);
    }

    #[test]
    fn builder_replaces_sets() {
        let opts = ParseOptions::new()
            .with_null_keywords(["undefined"])
            .with_missing_commas(false);
        assert!(opts.is_null_keyword("Undefined"));
        assert!(!opts.is_null_keyword("null"));
        assert!(!opts.allow_missing_commas);
        assert!(opts.allow_unquoted_keys);
    }

    #[test]
    fn strict_disables_recovery() {
        let opts = ParseOptions::strict();
        assert!(!opts.allow_parenthesized_sequences);
        assert!(!opts.allow_missing_commas);
        assert!(!opts.allow_unquoted_keys);
        assert!(!opts.unwrap_response);
    }
}
