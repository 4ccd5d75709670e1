//! The provisional value tree.
//
//  Built by the grammar, read by the resolver. Nothing in here commits to
//  a type: a bare word keeps every reading it might have, a sequence
//  remembers which delimiter produced it and a container that has not seen
//  its closing delimiter is wrapped in `Incomplete`.

use std::fmt;

use crate::config::ParseOptions;
use crate::resolved::{Number, Path, PathItem};

/// A value whose type the source text committed to.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    String(String),
    Number { value: Number, raw: String },
    Bool(bool),
    Null,
}

/// One reading of a bare word besides its raw text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Candidate {
    Null,
    Bool(bool),
    Number(Number),
}

/// An unquoted word: always its raw text, plus any keyword readings.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousScalar {
    pub raw: String,
    pub candidates: Vec<Candidate>,
}

impl AmbiguousScalar {
    pub fn classify(word: &str, opts: &ParseOptions) -> Self {
        let mut candidates = Vec::new();
        if opts.is_null_keyword(word) {
            candidates.push(Candidate::Null);
        }
        if let Some(b) = opts.bool_keyword(word) {
            candidates.push(Candidate::Bool(b));
        }
        if let Some(f) = special_float(word) {
            candidates.push(Candidate::Number(Number::Float(f)));
        }
        Self {
            raw: word.to_string(),
            candidates,
        }
    }

    /// A word with no keyword reading at all.
    pub fn plain(word: &str) -> Self {
        Self {
            raw: word.to_string(),
            candidates: Vec::new(),
        }
    }

    pub fn can_be_null(&self) -> bool {
        self.candidates.contains(&Candidate::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.candidates.iter().find_map(|c| match c {
            Candidate::Bool(b) => Some(*b),
            _ => None,
        })
    }

    pub fn as_number(&self) -> Option<Number> {
        self.candidates.iter().find_map(|c| match c {
            Candidate::Number(n) => Some(*n),
            _ => None,
        })
    }
}

fn special_float(word: &str) -> Option<f64> {
    match word.to_lowercase().as_str() {
        "nan" | "-nan" | "+nan" => Some(f64::NAN),
        "inf" | "infinity" | "+inf" | "+infinity" => Some(f64::INFINITY),
        "-inf" | "-infinity" => Some(f64::NEG_INFINITY),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delimiter {
    Bracket,
    Paren,
}

impl Delimiter {
    pub fn open_char(self) -> char {
        match self {
            Delimiter::Bracket => '[',
            Delimiter::Paren => '(',
        }
    }

    pub fn close_char(self) -> char {
        match self {
            Delimiter::Bracket => ']',
            Delimiter::Paren => ')',
        }
    }
}

/// A malformation the grammar repaired.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recovery {
    MissingComma,
    TrailingComma,
    ExtraComma,
    Parenthesized,
    UnquotedKey(String),
    NumericKey(String),
    InferredClose,
}

impl fmt::Display for Recovery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Recovery::MissingComma => f.write_str("inserted missing ','"),
            Recovery::TrailingComma => f.write_str("dropped trailing ','"),
            Recovery::ExtraComma => f.write_str("dropped repeated ','"),
            Recovery::Parenthesized => f.write_str("read '(...)' as a sequence"),
            Recovery::UnquotedKey(k) => write!(f, "accepted unquoted key `{}`", k),
            Recovery::NumericKey(k) => write!(f, "accepted numeric key `{}`", k),
            Recovery::InferredClose => f.write_str("inferred closing delimiter"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sequence {
    pub items: Vec<ProvisionalNode>,
    pub delimiter: Delimiter,
    pub recoveries: Vec<Recovery>,
}

impl Sequence {
    pub fn new(delimiter: Delimiter) -> Self {
        Self {
            items: Vec::new(),
            delimiter,
            recoveries: Vec::new(),
        }
    }

    pub fn is_parenthesized(&self) -> bool {
        self.delimiter == Delimiter::Paren
    }
}

/// Entries in source order. Duplicate keys are kept; lookups see the last.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mapping {
    pub entries: Vec<(String, ProvisionalNode)>,
    pub recoveries: Vec<Recovery>,
}

impl Mapping {
    pub fn get(&self, key: &str) -> Option<&ProvisionalNode> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Distinct keys, first-occurrence order.
    pub fn keys(&self) -> Vec<&str> {
        let mut out: Vec<&str> = Vec::new();
        for (k, _) in &self.entries {
            if !out.contains(&k.as_str()) {
                out.push(k);
            }
        }
        out
    }

    /// Entries with duplicates collapsed: first position, last value.
    pub fn deduplicated(&self) -> Vec<(&str, &ProvisionalNode)> {
        self.keys()
            .into_iter()
            .filter_map(|k| self.get(k).map(|v| (k, v)))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProvisionalNode {
    Scalar(Scalar),
    Ambiguous(AmbiguousScalar),
    Sequence(Sequence),
    Mapping(Mapping),
    /// A container whose closing delimiter has not arrived yet.
    Incomplete(Box<ProvisionalNode>),
}

impl ProvisionalNode {
    pub fn string(s: impl Into<String>) -> Self {
        ProvisionalNode::Scalar(Scalar::String(s.into()))
    }

    pub fn is_incomplete(&self) -> bool {
        matches!(self, ProvisionalNode::Incomplete(_))
    }

    /// No `Incomplete` anywhere in this subtree.
    pub fn is_complete(&self) -> bool {
        match self {
            ProvisionalNode::Incomplete(_) => false,
            ProvisionalNode::Sequence(s) => s.items.iter().all(Self::is_complete),
            ProvisionalNode::Mapping(m) => m.entries.iter().all(|(_, v)| v.is_complete()),
            _ => true,
        }
    }

    /// The node with any `Incomplete` wrapper peeled off.
    pub fn content(&self) -> &ProvisionalNode {
        match self {
            ProvisionalNode::Incomplete(inner) => inner.content(),
            other => other,
        }
    }

    pub fn kind_name(&self) -> &'static str {
        match self {
            ProvisionalNode::Scalar(Scalar::String(_)) => "string",
            ProvisionalNode::Scalar(Scalar::Number { .. }) => "number",
            ProvisionalNode::Scalar(Scalar::Bool(_)) => "bool",
            ProvisionalNode::Scalar(Scalar::Null) => "null",
            ProvisionalNode::Ambiguous(_) => "bare word",
            ProvisionalNode::Sequence(s) if s.is_parenthesized() => "parenthesized sequence",
            ProvisionalNode::Sequence(_) => "array",
            ProvisionalNode::Mapping(_) => "object",
            ProvisionalNode::Incomplete(_) => "incomplete value",
        }
    }

    /// Walk down `path`, looking through `Incomplete` wrappers.
    pub fn get_path(&self, path: &Path) -> Option<&ProvisionalNode> {
        path.items()
            .iter()
            .try_fold(self, |node, item| match (node.content(), item) {
                (ProvisionalNode::Mapping(m), PathItem::Key(k)) => m.get(k),
                (ProvisionalNode::Sequence(s), PathItem::Index(i)) => s.items.get(*i),
                _ => None,
            })
    }
}

impl fmt::Display for ProvisionalNode {
    /// Debug rendering: `?` marks bare words, `…` marks open containers.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionalNode::Scalar(Scalar::String(s)) => write!(f, "{:?}", s),
            ProvisionalNode::Scalar(Scalar::Number { raw, .. }) => f.write_str(raw),
            ProvisionalNode::Scalar(Scalar::Bool(b)) => write!(f, "{}", b),
            ProvisionalNode::Scalar(Scalar::Null) => f.write_str("null"),
            ProvisionalNode::Ambiguous(a) => write!(f, "?{}", a.raw),
            ProvisionalNode::Sequence(s) => {
                write!(f, "{}", s.delimiter.open_char())?;
                for (i, item) in s.items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                write!(f, "{}", s.delimiter.close_char())
            }
            ProvisionalNode::Mapping(m) => {
                f.write_str("{")?;
                for (i, (k, v)) in m.entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{:?}: {}", k, v)?;
                }
                f.write_str("}")
            }
            ProvisionalNode::Incomplete(inner) => write!(f, "{}…", inner),
        }
    }
}
