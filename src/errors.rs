use nom_supreme::final_parser::Location;
use thiserror::Error;

use crate::resolved::Path;

/// Why the grammar gave up. No recovery rule covers any of these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FatalReason {
    #[error("'{found}' cannot close '{open}'")]
    MismatchedClose { open: char, found: char },
    #[error("'{0}' closes nothing")]
    UnexpectedClose(char),
    #[error("second ':' in one key-value pair")]
    DoubleColon,
    #[error("key is not followed by ':'")]
    MissingColon,
    #[error("key has no value")]
    MissingValue,
    #[error("value where an object key was expected")]
    ValueWhereKeyExpected,
    #[error("':' where no key can precede it")]
    UnexpectedColon,
    #[error("input needs the {0} rule, which is disabled")]
    RuleDisabled(&'static str),
    #[error("input ended with {open} unclosed container(s)")]
    StreamExhausted { open: usize },
    #[error("input ended inside a quoted string")]
    UnterminatedString,
    #[error("input ended before any value")]
    EmptyInput,
}

/// A grammar violation that terminates the session.
#[derive(Debug, Clone, Error)]
#[error("{reason} at byte {offset} (line {}, column {}); expected {}", .location.line, .location.column, expected_list(.expected))]
pub struct GrammarFatal {
    pub reason: FatalReason,
    /// Byte offset into the unwrapped document text.
    pub offset: usize,
    pub location: Location,
    pub expected: Vec<&'static str>,
}

impl GrammarFatal {
    /// End-of-input with something still open (`StreamExhausted`).
    pub fn is_exhaustion(&self) -> bool {
        matches!(
            self.reason,
            FatalReason::StreamExhausted { .. }
                | FatalReason::UnterminatedString
                | FatalReason::EmptyInput
        )
    }
}

fn expected_list(expected: &[&'static str]) -> String {
    match expected {
        [] => "nothing".to_string(),
        [one] => one.to_string(),
        many => many.join(" | "),
    }
}

/// Resolution-time failure, scoped to the subtree at `path`.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{kind} at {path}")]
pub struct ResolveError {
    pub path: Path,
    pub kind: ResolveErrorKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolveErrorKind {
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: String,
        found: &'static str,
    },
    #[error("missing field `{field}`{}", did_you_mean(.suggestion))]
    MissingField {
        field: String,
        suggestion: Option<String>,
    },
    #[error("value is still incomplete")]
    Incomplete,
}

fn did_you_mean(suggestion: &Option<String>) -> String {
    suggestion
        .as_ref()
        .map(|s| format!(" (did you mean `{}`?)", s))
        .unwrap_or_default()
}

impl ResolveError {
    pub fn mismatch(path: &Path, expected: impl Into<String>, found: &'static str) -> Self {
        Self {
            path: path.clone(),
            kind: ResolveErrorKind::TypeMismatch {
                expected: expected.into(),
                found,
            },
        }
    }

    pub fn missing(path: &Path, field: &str, suggestion: Option<String>) -> Self {
        Self {
            path: path.clone(),
            kind: ResolveErrorKind::MissingField {
                field: field.to_string(),
                suggestion,
            },
        }
    }

    pub fn incomplete(path: &Path) -> Self {
        Self {
            path: path.clone(),
            kind: ResolveErrorKind::Incomplete,
        }
    }

    pub fn is_type_mismatch(&self) -> bool {
        matches!(self.kind, ResolveErrorKind::TypeMismatch { .. })
    }

    pub fn is_missing_field(&self) -> bool {
        matches!(self.kind, ResolveErrorKind::MissingField { .. })
    }
}

/// Everything a caller can get back instead of a value.
#[derive(Debug, Clone, Error)]
pub enum LmonError {
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarFatal),
    #[error("resolution error: {0}")]
    Resolve(#[from] ResolveError),
    #[error("bad type notation: {0}")]
    TypeNotation(String),
    #[error("no `return(answer)` statement found")]
    NoAnswer,
}

impl LmonError {
    pub fn as_fatal(&self) -> Option<&GrammarFatal> {
        match self {
            LmonError::Grammar(g) => Some(g),
            _ => None,
        }
    }

    pub fn as_resolve(&self) -> Option<&ResolveError> {
        match self {
            LmonError::Resolve(r) => Some(r),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolved::PathItem;

    #[test]
    fn fatal_message_names_position_and_expectations() {
        let fatal = GrammarFatal {
            reason: FatalReason::MismatchedClose {
                open: '{',
                found: ']',
            },
            offset: 7,
            location: Location { line: 1, column: 8 },
            expected: vec!["','", "'}'"],
        };
        assert_eq!(
            fatal.to_string(),
            "']' cannot close '{' at byte 7 (line 1, column 8); expected ',' | '}'"
        );
        assert!(!fatal.is_exhaustion());
    }

    #[test]
    fn missing_field_suggests_a_spelling() {
        let err = ResolveError::missing(&Path::root(), "city", Some("cty".into()));
        assert_eq!(
            err.to_string(),
            "missing field `city` (did you mean `cty`?) at ."
        );
        let nested = ResolveError::mismatch(
            &Path::new(vec![PathItem::Key("id".into())]),
            "number",
            "string",
        );
        assert_eq!(nested.to_string(), "expected number, found string at .id");
    }
}
