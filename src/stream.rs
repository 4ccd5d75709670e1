//! Streaming controller.
//
//  A session owns one framer, one lexer and one grammar. `advance()` takes
//  the next fragment, runs every token it completes through the grammar and
//  reports what happened; the caller holds the loop and decides when to
//  fetch more text, when to peek at a finished subfield and when to cut the
//  source off. Fatal and Done are terminal: later calls repeat them.

use std::collections::VecDeque;

use log::{debug, trace, warn};
use thiserror::Error;

use crate::config::ParseOptions;
use crate::errors::{FatalReason, GrammarFatal, LmonError, ResolveError};
use crate::framing::ResponseFramer;
use crate::grammar::{Diagnostic, Grammar, ParserAction, Violation};
use crate::lexer::{Lexed, Lexer};
use crate::provisional::ProvisionalNode;
use crate::resolved::{Path, ResolvedValue};
use crate::resolver::Resolver;
use crate::target_type::TargetType;

#[derive(Debug, Clone)]
pub enum StreamEvent {
    NeedMore,
    /// A top-level field (or top-level array element) is complete.
    FieldReady { path: Path, node: ProvisionalNode },
    Fatal(GrammarFatal),
    Done(ProvisionalNode),
}

/// Progress of one session.
#[derive(Debug, Clone, Default)]
pub struct StreamCursor {
    /// Bytes of document text the lexer has consumed.
    pub consumed: usize,
    /// Bytes dropped by the framer or left after the root value.
    pub ignored: usize,
    pub root_incomplete: bool,
    pub fatal: Option<GrammarFatal>,
    pub done: bool,
}

#[derive(Debug, Clone, Error)]
pub enum SubfieldError {
    #[error("{0} is not complete yet")]
    NotYetAvailable(Path),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

pub struct StreamSession {
    opts: ParseOptions,
    target: TargetType,
    framer: ResponseFramer,
    lexer: Lexer,
    grammar: Grammar,
    cursor: StreamCursor,
    queue: VecDeque<StreamEvent>,
}

impl StreamSession {
    pub fn new(target: TargetType, opts: ParseOptions) -> Self {
        let framer = ResponseFramer::new(opts.unwrap_response, opts.response_tags.clone());
        Self {
            grammar: Grammar::new(opts.clone()),
            lexer: Lexer::with_options(opts.clone()),
            opts,
            target,
            framer,
            cursor: StreamCursor {
                root_incomplete: true,
                ..StreamCursor::default()
            },
            queue: VecDeque::new(),
        }
    }

    pub fn target(&self) -> &TargetType {
        &self.target
    }

    pub fn options(&self) -> &ParseOptions {
        &self.opts
    }

    pub fn cursor(&self) -> &StreamCursor {
        &self.cursor
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        self.grammar.diagnostics()
    }

    pub fn is_done(&self) -> bool {
        self.cursor.done
    }

    pub fn is_fatal(&self) -> bool {
        self.cursor.fatal.is_some()
    }

    /// Feed the next fragment. Returns the first event it produced; the
    /// rest are queued for [`StreamSession::next_event`].
    pub fn advance(&mut self, fragment: &str) -> StreamEvent {
        if let Some(terminal) = self.terminal() {
            self.cursor.ignored += fragment.len();
            return terminal;
        }
        let text = self.framer.push(fragment);
        self.lexer.push(&text);
        self.pump();
        self.queue.pop_front().unwrap_or(StreamEvent::NeedMore)
    }

    /// End-of-stream marker. Always ends in `Done` or `Fatal`.
    pub fn finish(&mut self) -> StreamEvent {
        if let Some(terminal) = self.terminal() {
            return terminal;
        }
        let tail = self.framer.finish();
        self.lexer.push(&tail);
        self.lexer.close();
        self.pump();
        self.queue
            .pop_front()
            .or_else(|| self.terminal())
            .unwrap_or(StreamEvent::NeedMore)
    }

    /// Events queued by the last `advance`/`finish` beyond the one it returned.
    pub fn next_event(&mut self) -> Option<StreamEvent> {
        self.queue.pop_front()
    }

    fn terminal(&self) -> Option<StreamEvent> {
        if let Some(f) = &self.cursor.fatal {
            return Some(StreamEvent::Fatal(f.clone()));
        }
        if self.cursor.done {
            return self.grammar.root().cloned().map(StreamEvent::Done);
        }
        None
    }

    fn pump(&mut self) {
        while !self.cursor.done && self.cursor.fatal.is_none() {
            match self.lexer.next_token() {
                Lexed::Suspend => break,
                Lexed::Unterminated { start } => {
                    self.fail(Violation {
                        reason: FatalReason::UnterminatedString,
                        offset: start,
                        expected: vec!["closing quote"],
                    });
                }
                Lexed::Token(tok) => {
                    let action = self.grammar.feed(tok);
                    self.cursor.consumed = self.lexer.position();
                    match action {
                        ParserAction::Continue => {}
                        ParserAction::NodeCompleted { path, node } if path.is_root() => {
                            debug!("document complete after {} bytes", self.cursor.consumed);
                            self.cursor.done = true;
                            self.queue.push_back(StreamEvent::Done(node));
                        }
                        ParserAction::NodeCompleted { path, node } if path.depth() == 1 => {
                            trace!("field {} ready", path);
                            self.queue.push_back(StreamEvent::FieldReady { path, node });
                        }
                        ParserAction::NodeCompleted { .. } => {}
                        ParserAction::Fatal(v) => self.fail(v),
                    }
                }
            }
        }
        self.cursor.consumed = self.lexer.position();
        self.cursor.root_incomplete = !self.cursor.done;
        self.cursor.ignored = self.framer.discarded()
            + if self.cursor.done {
                self.lexer.buffered() - self.lexer.position()
            } else {
                0
            };
    }

    fn fail(&mut self, v: Violation) {
        let location = self.lexer.location(v.offset);
        let fatal = v.locate(location);
        warn!("parse session failed: {}", fatal);
        self.cursor.fatal = Some(fatal.clone());
        self.queue.push_back(StreamEvent::Fatal(fatal));
    }

    /*──────── views ────────*/

    /// The provisional tree so far.
    pub fn snapshot(&self) -> Option<ProvisionalNode> {
        self.grammar.snapshot()
    }

    /// The tree so far with every open container closed. Diagnostic only.
    pub fn salvage(&self) -> Option<ProvisionalNode> {
        self.grammar.salvage()
    }

    /// Resolve one subfield as soon as its subtree is complete, even while
    /// its siblings are still streaming.
    pub fn peek_subfield(
        &self,
        path: &Path,
        ty: &TargetType,
    ) -> Result<ResolvedValue, SubfieldError> {
        let not_yet = || SubfieldError::NotYetAvailable(path.clone());
        let snapshot = self.grammar.snapshot().ok_or_else(not_yet)?;
        let node = snapshot.get_path(path).ok_or_else(not_yet)?;
        if !node.is_complete() {
            return Err(not_yet());
        }
        Ok(Resolver::new(&self.opts).resolve_at(node, ty, path)?)
    }

    /// `true` when nothing that could still arrive would make the document
    /// resolve against `ty`. Never `true` for an unfinished prefix that is
    /// still consistent with `ty`.
    pub fn abort_if_invalid(&self, ty: &TargetType) -> bool {
        if self.cursor.fatal.is_some() {
            return true;
        }
        match self.grammar.snapshot() {
            Some(node) => !Resolver::new(&self.opts).plausible(&node, ty),
            None => false,
        }
    }

    /// [`StreamSession::abort_if_invalid`] against the session target.
    pub fn should_abort(&self) -> bool {
        self.abort_if_invalid(&self.target)
    }

    /// Why the session should be aborted, if it should.
    pub fn abort_error(&self) -> Option<LmonError> {
        if let Some(f) = &self.cursor.fatal {
            return Some(f.clone().into());
        }
        if !self.should_abort() {
            return None;
        }
        let salvaged = self.grammar.salvage()?;
        Resolver::new(&self.opts)
            .resolve(&salvaged, &self.target)
            .err()
            .map(LmonError::from)
    }

    /// The finished document resolved against the session target.
    pub fn resolve(&self) -> Result<ResolvedValue, LmonError> {
        if let Some(f) = &self.cursor.fatal {
            return Err(f.clone().into());
        }
        match self.grammar.root() {
            Some(root) => Ok(Resolver::new(&self.opts).resolve(root, &self.target)?),
            None => Err(ResolveError::incomplete(&Path::root()).into()),
        }
    }
}

/// Drive a session over `fragments`, pulling no further fragment once the
/// document is complete or can no longer satisfy `ty`.
pub fn parse_stream<I, S>(
    fragments: I,
    ty: &TargetType,
    opts: ParseOptions,
) -> Result<ResolvedValue, LmonError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut session = StreamSession::new(ty.clone(), opts);
    for fragment in fragments {
        session.advance(fragment.as_ref());
        if let Some(err) = session.abort_error() {
            debug!(
                "cutting the source off after {} bytes: {}",
                session.cursor().consumed,
                err
            );
            return Err(err);
        }
        if session.is_done() {
            break;
        }
    }
    session.finish();
    session.resolve()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::target_type::FieldSpec;
    use serde_json::json;
    use std::cell::Cell;

    fn person() -> TargetType {
        TargetType::mapping(vec![
            FieldSpec::required("name", TargetType::string()),
            FieldSpec::required("age", TargetType::integer()),
        ])
    }

    #[test]
    fn test_subfield_ready_before_the_closing_brace() {
        let mut s = StreamSession::new(person(), ParseOptions::default());
        let name: Path = ".name".parse().unwrap();

        match s.advance(r#"{"name": "Ann","#) {
            StreamEvent::FieldReady { path, .. } => assert_eq!(path, name),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(
            s.peek_subfield(&name, &TargetType::string()).unwrap(),
            ResolvedValue::String("Ann".into())
        );
        assert!(matches!(
            s.peek_subfield(&".age".parse().unwrap(), &TargetType::integer()),
            Err(SubfieldError::NotYetAvailable(_))
        ));
        assert!(s.cursor().root_incomplete);

        match s.advance(r#" "age": 30}"#) {
            StreamEvent::FieldReady { path, .. } => assert_eq!(path.to_string(), ".age"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(s.next_event(), Some(StreamEvent::Done(_))));
        assert!(s.next_event().is_none());
        assert_eq!(
            s.resolve().unwrap().to_json(),
            json!({"name": "Ann", "age": 30})
        );
    }

    #[test]
    fn test_abort_on_first_mismatching_field() {
        let ty = TargetType::mapping(vec![FieldSpec::required("id", TargetType::number())]);
        let mut s = StreamSession::new(ty.clone(), ParseOptions::default());
        s.advance(r#"{"id": "ab"#);
        assert!(!s.should_abort());
        s.advance(r#"c""#);
        // the string is complete once the quote arrives
        assert!(s.abort_if_invalid(&ty));
        assert!(!s.is_done());
        match s.abort_error() {
            Some(LmonError::Resolve(e)) => assert_eq!(e.path.to_string(), ".id"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_incomplete_but_plausible_is_not_aborted() {
        let mut s = StreamSession::new(person(), ParseOptions::default());
        for chunk in ["{", "\"na", "me\": \"A", "nn\", ", "\"age\"", ": 3"] {
            s.advance(chunk);
            assert!(!s.should_abort(), "aborted after {:?}", chunk);
        }
    }

    #[test]
    fn test_numbered_keys_with_spaces_are_plausible_for_a_list() {
        let ty = TargetType::sequence_of(TargetType::integer());
        let mut s = StreamSession::new(ty.clone(), ParseOptions::default());
        s.advance(r#"{" 0": 1"#);
        assert!(!s.abort_if_invalid(&ty));
        s.advance(r#", "1 ": 2}"#);
        assert!(!s.should_abort());
        assert_eq!(s.resolve().unwrap().to_json(), json!([1, 2]));
    }

    #[test]
    fn test_unclosed_bracket_is_stream_exhausted() {
        let mut s = StreamSession::new(TargetType::Any, ParseOptions::default());
        assert!(matches!(s.advance("[1, 2"), StreamEvent::NeedMore));
        match s.finish() {
            StreamEvent::Fatal(f) => {
                assert_eq!(f.reason, FatalReason::StreamExhausted { open: 1 });
                assert!(f.is_exhaustion());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(s.resolve().is_err());
        // the salvaged tree is still there for diagnostics
        assert_eq!(s.salvage().unwrap().to_string(), "[1, 2]");
    }

    #[test]
    fn test_fatal_is_sticky_and_located() {
        let mut s = StreamSession::new(TargetType::Any, ParseOptions::default());
        let f = match s.advance("{\n  \"a\": [1}") {
            StreamEvent::Fatal(f) => f,
            other => panic!("unexpected {:?}", other),
        };
        assert_eq!((f.location.line, f.location.column), (2, 10));
        assert!(matches!(s.advance("]}"), StreamEvent::Fatal(_)));
        assert!(matches!(s.finish(), StreamEvent::Fatal(_)));
        assert!(s.should_abort());
        assert!(s.cursor().fatal.is_some());
    }

    #[test]
    fn test_unterminated_string_at_end() {
        let mut s = StreamSession::new(TargetType::Any, ParseOptions::default());
        s.advance(r#"{"a": "abc"#);
        match s.finish() {
            StreamEvent::Fatal(f) => assert_eq!(f.reason, FatalReason::UnterminatedString),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_stream_stops_pulling_on_abort() {
        let pulled = Cell::new(0);
        let chunks = ["[1, ", "\"two\", ", "3, ", "4, ", "5]"];
        let result = parse_stream(
            chunks.iter().inspect(|_| pulled.set(pulled.get() + 1)),
            &TargetType::sequence_of(TargetType::integer()),
            ParseOptions::default().with_numeric_string_coercion(false),
        );
        assert!(matches!(result, Err(LmonError::Resolve(_))));
        assert_eq!(pulled.get(), 2);
    }

    #[test]
    fn test_trailing_chatter_is_ignored() {
        let mut s = StreamSession::new(TargetType::Any, ParseOptions::default());
        s.advance("```json\n[1]\n```\nLet me know if");
        assert!(s.is_done());
        s.advance(" you need more.");
        assert!(s.cursor().ignored > 0);
        assert_eq!(s.resolve().unwrap().to_json(), json!([1]));
    }
}
