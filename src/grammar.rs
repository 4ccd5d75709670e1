//! `grammar` – token-at-a-time tree builder with local recovery rules.
//
//  One frame per open container. Each frame knows what it expects next
//  (a value, a key, a ':' or a ','/close); a token that violates that
//  expectation is either repaired by one of the recovery rules below or
//  turned into a fatal `Violation`, after which the grammar accepts
//  nothing more.
//
//  Rules, in the order they are tried:
//    1. value directly after a value           → synthetic ','
//    2. ',' right before a close / repeated ','  → dropped
//    3. '(' … ')' where a value is expected      → sequence (parenthesized)
//    4. bare word in value position              → ambiguous scalar
//    5. bare word / number in key position       → string key

use log::{debug, trace};
use nom_supreme::final_parser::Location;

use crate::config::ParseOptions;
use crate::errors::{FatalReason, GrammarFatal};
use crate::lexer::{Spanned, Token};
use crate::provisional::{
    AmbiguousScalar, Delimiter, Mapping, ProvisionalNode, Recovery, Scalar, Sequence,
};
use crate::resolved::{Path, PathItem};

/// A fatal grammar violation before it is placed on a line and column.
#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub reason: FatalReason,
    pub offset: usize,
    pub expected: Vec<&'static str>,
}

impl Violation {
    pub fn locate(self, location: Location) -> GrammarFatal {
        GrammarFatal {
            reason: self.reason,
            offset: self.offset,
            location,
            expected: self.expected,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParserAction {
    Continue,
    /// A value was closed; `path` is where it sits in the document.
    NodeCompleted { path: Path, node: ProvisionalNode },
    Fatal(Violation),
}

/// One applied recovery, kept for the whole session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub offset: usize,
    pub recovery: Recovery,
}

/*──────────────────────────── frames ─────────────────────────────────*/

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Expect {
    Value,
    Key,
    Colon,
    CommaOrClose,
}

#[derive(Debug, Clone)]
enum Container {
    Seq(Sequence),
    Map(Mapping),
}

#[derive(Debug, Clone)]
struct Frame {
    container: Container,
    path: Path,
    expect: Expect,
    key: Option<String>, // set between a key and its value
    after_comma: bool,
}

impl Frame {
    fn is_map(&self) -> bool {
        matches!(self.container, Container::Map(_))
    }

    fn open_char(&self) -> char {
        match &self.container {
            Container::Seq(s) => s.delimiter.open_char(),
            Container::Map(_) => '{',
        }
    }

    fn close_char(&self) -> char {
        match &self.container {
            Container::Seq(s) => s.delimiter.close_char(),
            Container::Map(_) => '}',
        }
    }

    fn recoveries_mut(&mut self) -> &mut Vec<Recovery> {
        match &mut self.container {
            Container::Seq(s) => &mut s.recoveries,
            Container::Map(m) => &mut m.recoveries,
        }
    }

    /// Path the next child of this frame will get.
    fn child_path(&self) -> Path {
        match &self.container {
            Container::Seq(s) => self.path.child(PathItem::Index(s.items.len())),
            Container::Map(_) => self
                .path
                .child(PathItem::Key(self.key.clone().unwrap_or_default())),
        }
    }

    /// The container as it stands, with `child` (an open descendant)
    /// appended in the slot it is being built for.
    fn partial(&self, child: Option<ProvisionalNode>) -> ProvisionalNode {
        match &self.container {
            Container::Seq(s) => {
                let mut s = s.clone();
                s.items.extend(child);
                ProvisionalNode::Sequence(s)
            }
            Container::Map(m) => {
                let mut m = m.clone();
                if let (Some(child), Some(key)) = (child, &self.key) {
                    m.entries.push((key.clone(), child));
                }
                ProvisionalNode::Mapping(m)
            }
        }
    }

    fn into_node(self) -> ProvisionalNode {
        match self.container {
            Container::Seq(s) => ProvisionalNode::Sequence(s),
            Container::Map(m) => ProvisionalNode::Mapping(m),
        }
    }
}

fn close_token(delimiter: Delimiter) -> &'static str {
    match delimiter {
        Delimiter::Bracket => "']'",
        Delimiter::Paren => "')'",
    }
}

/*──────────────────────────── Grammar ────────────────────────────────*/

#[derive(Debug, Clone)]
pub struct Grammar {
    opts: ParseOptions,
    frames: Vec<Frame>,
    root: Option<ProvisionalNode>,
    fatal: Option<Violation>,
    diagnostics: Vec<Diagnostic>,
}

impl Grammar {
    pub fn new(opts: ParseOptions) -> Self {
        Self {
            opts,
            frames: Vec::new(),
            root: None,
            fatal: None,
            diagnostics: Vec::new(),
        }
    }

    /// Root value finished; everything after it is ignored.
    pub fn is_done(&self) -> bool {
        self.root.is_some()
    }

    pub fn is_failed(&self) -> bool {
        self.fatal.is_some()
    }

    pub fn root(&self) -> Option<&ProvisionalNode> {
        self.root.as_ref()
    }

    /// Open containers.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    /// Feed one token.
    pub fn feed(&mut self, tok: Spanned) -> ParserAction {
        if let Some(v) = &self.fatal {
            return ParserAction::Fatal(v.clone());
        }
        if self.root.is_some() {
            trace!("ignoring {} after the root value", tok.token.describe());
            return ParserAction::Continue;
        }
        match self.step(tok) {
            Ok(action) => action,
            Err(v) => {
                self.fatal = Some(v.clone());
                ParserAction::Fatal(v)
            }
        }
    }

    fn step(&mut self, tok: Spanned) -> Result<ParserAction, Violation> {
        let at = tok.start;
        match tok.token {
            Token::EndOfInput if self.frames.is_empty() => {
                Err(self.violation(FatalReason::EmptyInput, at))
            }
            Token::EndOfInput => Err(self.violation(
                FatalReason::StreamExhausted {
                    open: self.frames.len(),
                },
                at,
            )),

            Token::Comma => self.comma(at),
            Token::Colon => self.colon(at),
            Token::CloseBracket => self.close(']', at),
            Token::CloseBrace => self.close('}', at),
            Token::CloseParen => self.close(')', at),

            Token::OpenBracket => self.open(Container::Seq(Sequence::new(Delimiter::Bracket)), at),
            Token::OpenBrace => self.open(Container::Map(Mapping::default()), at),
            Token::OpenParen => {
                if !self.opts.allow_parenthesized_sequences {
                    return Err(self.violation(FatalReason::RuleDisabled("parenthesized-sequence"), at));
                }
                let action = self.open(Container::Seq(Sequence::new(Delimiter::Paren)), at)?;
                self.record(Recovery::Parenthesized, at);
                Ok(action)
            }

            Token::StringLiteral(s) if self.expects_key() => self.key(s, None, at),
            Token::StringLiteral(s) => self.value(ProvisionalNode::Scalar(Scalar::String(s)), at),

            Token::BareWord(w) if self.expects_key() => {
                if !self.opts.allow_unquoted_keys {
                    return Err(self.violation(FatalReason::RuleDisabled("unquoted-key"), at));
                }
                let recovery = Recovery::UnquotedKey(w.clone());
                self.key(w, Some(recovery), at)
            }
            Token::BareWord(w) => {
                let node = ProvisionalNode::Ambiguous(AmbiguousScalar::classify(&w, &self.opts));
                self.value(node, at)
            }

            Token::NumberLiteral { raw, .. } if self.expects_key() => {
                if !self.opts.allow_unquoted_keys {
                    return Err(self.violation(FatalReason::RuleDisabled("unquoted-key"), at));
                }
                let recovery = Recovery::NumericKey(raw.clone());
                self.key(raw, Some(recovery), at)
            }
            Token::NumberLiteral { value, raw } => {
                self.value(ProvisionalNode::Scalar(Scalar::Number { value, raw }), at)
            }
        }
    }

    /*──────── helpers ────────*/

    fn expected(&self) -> Vec<&'static str> {
        let Some(top) = self.frames.last() else {
            return vec!["value"];
        };
        match (&top.container, top.expect) {
            (Container::Seq(s), Expect::CommaOrClose) => vec!["','", close_token(s.delimiter)],
            (Container::Seq(s), _) => vec!["value", close_token(s.delimiter)],
            (Container::Map(_), Expect::Key) => vec!["key", "'}'"],
            (Container::Map(_), Expect::Colon) => vec!["':'"],
            (Container::Map(_), Expect::Value) => vec!["value"],
            (Container::Map(_), Expect::CommaOrClose) => vec!["','", "'}'"],
        }
    }

    fn violation(&self, reason: FatalReason, offset: usize) -> Violation {
        Violation {
            reason,
            offset,
            expected: self.expected(),
        }
    }

    fn expects_key(&self) -> bool {
        self.frames
            .last()
            .map_or(false, |f| f.is_map() && matches!(f.expect, Expect::Key | Expect::CommaOrClose))
    }

    /// Note a recovery on the innermost open container.
    fn record(&mut self, recovery: Recovery, offset: usize) {
        debug!("recovery at byte {}: {}", offset, recovery);
        if let Some(top) = self.frames.last_mut() {
            top.recoveries_mut().push(recovery.clone());
        }
        self.diagnostics.push(Diagnostic { offset, recovery });
    }

    fn missing_comma(&mut self, offset: usize) -> Result<(), Violation> {
        if !self.opts.allow_missing_commas {
            return Err(self.violation(FatalReason::RuleDisabled("missing-comma"), offset));
        }
        self.record(Recovery::MissingComma, offset);
        Ok(())
    }

    /// Make the innermost container ready to take a value.
    fn slot(&mut self, offset: usize) -> Result<(), Violation> {
        let Some(top) = self.frames.last() else {
            return Ok(());
        };
        match (top.is_map(), top.expect) {
            (_, Expect::Value) => Ok(()),
            (false, _) => {
                self.missing_comma(offset)?;
                if let Some(top) = self.frames.last_mut() {
                    top.expect = Expect::Value;
                }
                Ok(())
            }
            (true, Expect::Colon) => Err(self.violation(FatalReason::MissingColon, offset)),
            (true, _) => Err(self.violation(FatalReason::ValueWhereKeyExpected, offset)),
        }
    }

    /// Place a finished value in its parent (or make it the root).
    fn attach(&mut self, node: ProvisionalNode) -> ParserAction {
        let Some(top) = self.frames.last_mut() else {
            debug!("root value complete: {}", node.kind_name());
            self.root = Some(node.clone());
            return ParserAction::NodeCompleted {
                path: Path::root(),
                node,
            };
        };
        let path = match &mut top.container {
            Container::Seq(s) => {
                let path = top.path.child(PathItem::Index(s.items.len()));
                s.items.push(node.clone());
                path
            }
            Container::Map(m) => {
                let key = top.key.take().unwrap_or_default();
                let path = top.path.child(PathItem::Key(key.clone()));
                m.entries.push((key, node.clone()));
                path
            }
        };
        top.expect = Expect::CommaOrClose;
        top.after_comma = false;
        ParserAction::NodeCompleted { path, node }
    }

    /*──────── token handlers ────────*/

    fn value(&mut self, node: ProvisionalNode, offset: usize) -> Result<ParserAction, Violation> {
        self.slot(offset)?;
        Ok(self.attach(node))
    }

    fn open(&mut self, container: Container, offset: usize) -> Result<ParserAction, Violation> {
        self.slot(offset)?;
        let path = self
            .frames
            .last()
            .map_or_else(Path::root, Frame::child_path);
        let expect = match container {
            Container::Seq(_) => Expect::Value,
            Container::Map(_) => Expect::Key,
        };
        self.frames.push(Frame {
            container,
            path,
            expect,
            key: None,
            after_comma: false,
        });
        Ok(ParserAction::Continue)
    }

    fn key(
        &mut self,
        key: String,
        recovery: Option<Recovery>,
        offset: usize,
    ) -> Result<ParserAction, Violation> {
        if self.frames.last().map(|f| f.expect) == Some(Expect::CommaOrClose) {
            self.missing_comma(offset)?;
        }
        if let Some(r) = recovery {
            self.record(r, offset);
        }
        if let Some(top) = self.frames.last_mut() {
            top.key = Some(key);
            top.expect = Expect::Colon;
            top.after_comma = false;
        }
        Ok(ParserAction::Continue)
    }

    fn comma(&mut self, offset: usize) -> Result<ParserAction, Violation> {
        let Some(top) = self.frames.last() else {
            trace!("stray ',' before the root value");
            return Ok(ParserAction::Continue);
        };
        match (top.is_map(), top.expect) {
            (is_map, Expect::CommaOrClose) => {
                if let Some(top) = self.frames.last_mut() {
                    top.expect = if is_map { Expect::Key } else { Expect::Value };
                    top.after_comma = true;
                }
                Ok(ParserAction::Continue)
            }
            (true, Expect::Colon) => Err(self.violation(FatalReason::MissingColon, offset)),
            (true, Expect::Value) => Err(self.violation(FatalReason::MissingValue, offset)),
            // leading or repeated separator
            _ => {
                self.record(Recovery::ExtraComma, offset);
                Ok(ParserAction::Continue)
            }
        }
    }

    fn colon(&mut self, offset: usize) -> Result<ParserAction, Violation> {
        let Some(top) = self.frames.last() else {
            trace!("stray ':' before the root value");
            return Ok(ParserAction::Continue);
        };
        match (top.is_map(), top.expect) {
            (true, Expect::Colon) => {
                if let Some(top) = self.frames.last_mut() {
                    top.expect = Expect::Value;
                }
                Ok(ParserAction::Continue)
            }
            (true, Expect::Value) => Err(self.violation(FatalReason::DoubleColon, offset)),
            _ => Err(self.violation(FatalReason::UnexpectedColon, offset)),
        }
    }

    fn close(&mut self, found: char, offset: usize) -> Result<ParserAction, Violation> {
        let Some(top) = self.frames.last() else {
            return Err(self.violation(FatalReason::UnexpectedClose(found), offset));
        };
        if top.close_char() != found {
            let open = top.open_char();
            return Err(self.violation(FatalReason::MismatchedClose { open, found }, offset));
        }
        match (top.is_map(), top.expect, top.after_comma) {
            (true, Expect::Colon, _) => {
                return Err(self.violation(FatalReason::MissingColon, offset))
            }
            (true, Expect::Value, _) => {
                return Err(self.violation(FatalReason::MissingValue, offset))
            }
            (_, Expect::Value | Expect::Key, true) => self.record(Recovery::TrailingComma, offset),
            _ => {}
        }
        let node = match self.frames.pop() {
            Some(frame) => frame.into_node(),
            None => return Err(self.violation(FatalReason::UnexpectedClose(found), offset)),
        };
        Ok(self.attach(node))
    }

    /*──────── views ────────*/

    /// The tree so far; open containers are wrapped in `Incomplete`.
    pub fn snapshot(&self) -> Option<ProvisionalNode> {
        if let Some(root) = &self.root {
            return Some(root.clone());
        }
        self.frames.iter().rev().fold(None, |child, frame| {
            Some(ProvisionalNode::Incomplete(Box::new(frame.partial(child))))
        })
    }

    /// The tree so far with every open container closed and flagged
    /// `InferredClose`. Diagnostic only: a session never returns this as
    /// its result.
    pub fn salvage(&self) -> Option<ProvisionalNode> {
        if let Some(root) = &self.root {
            return Some(root.clone());
        }
        self.frames.iter().rev().fold(None, |child, frame| {
            let mut node = frame.partial(child);
            match &mut node {
                ProvisionalNode::Sequence(s) => s.recoveries.push(Recovery::InferredClose),
                ProvisionalNode::Mapping(m) => m.recoveries.push(Recovery::InferredClose),
                _ => {}
            }
            Some(node)
        })
    }
}
