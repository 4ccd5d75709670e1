//! Incremental unwrapping of model responses.
//
//  Models put the answer inside something: a ```json fence, a pair of
//  backticks, `return …`, `return(…)`, or a `<Answer> … </Answer>` tag.
//  The framer strips the opener once enough text has arrived to recognise
//  it, passes the body through as it streams, holds back anything that
//  might be the start of the closer, and drops everything after the closer.

use log::trace;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::LmonError;

static FENCE_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"^```[^\n]*\n").expect("fence pattern"));
static TAG_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^<([A-Za-z_][\w.:-]*)[^<>]*>").expect("tag pattern"));
static RETURN_CALL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^return\s*\(").expect("call pattern"));
static RETURN_KW: Lazy<Regex> = Lazy::new(|| Regex::new(r"^return\s+").expect("keyword pattern"));
static ANSWER_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"return\s*\(\s*(.+?)\s*\)[^)\n]*$").expect("answer pattern")
});

/// Longest opener we wait for before giving up and passing text through.
const MAX_OPENER: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Closer {
    Nothing,
    Fence,
    Backtick,
    Tag(String),
    Call {
        depth: usize,
        quote: Option<char>,
        escape: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum State {
    Leading,
    Body(Closer),
    Finished,
}

#[derive(Debug, Clone)]
pub struct ResponseFramer {
    enabled: bool,
    tags: Vec<String>,
    state: State,
    /// Closer of an enclosing tag, used if nothing else opens inside it.
    wrapper: Option<Closer>,
    pending: String,
    discarded: usize,
}

impl ResponseFramer {
    /// `tags` lists accepted wrapper tag names; empty accepts any.
    pub fn new(enabled: bool, tags: Vec<String>) -> Self {
        Self {
            enabled,
            tags,
            state: State::Leading,
            wrapper: None,
            pending: String::new(),
            discarded: 0,
        }
    }

    /// Pass-through framer.
    pub fn disabled() -> Self {
        Self::new(false, Vec::new())
    }

    /// Bytes dropped after the closer.
    pub fn discarded(&self) -> usize {
        self.discarded
    }

    /// The closer has been seen; further input is dropped.
    pub fn is_finished(&self) -> bool {
        self.state == State::Finished
    }

    /// Feed a chunk, get back the document text it releases.
    pub fn push(&mut self, chunk: &str) -> String {
        if !self.enabled {
            return chunk.to_string();
        }
        self.pending.push_str(chunk);
        self.pump(false)
    }

    /// End of the response: release whatever was held back.
    pub fn finish(&mut self) -> String {
        if !self.enabled {
            return String::new();
        }
        self.pump(true)
    }

    fn accepts_tag(&self, name: &str) -> bool {
        self.tags.is_empty() || self.tags.iter().any(|t| t.eq_ignore_ascii_case(name))
    }

    fn pump(&mut self, eof: bool) -> String {
        let mut out = String::new();
        loop {
            match &mut self.state {
                State::Leading => {
                    if !self.leave_leading(eof) {
                        break;
                    }
                }
                State::Body(Closer::Nothing) => {
                    out.push_str(&self.pending);
                    self.pending.clear();
                    break;
                }
                State::Body(Closer::Call {
                    depth,
                    quote,
                    escape,
                }) => {
                    let mut end = None;
                    for (i, c) in self.pending.char_indices() {
                        if *escape {
                            *escape = false;
                        } else if let Some(q) = *quote {
                            match c {
                                '\\' => *escape = true,
                                c if c == q => *quote = None,
                                _ => {}
                            }
                        } else {
                            match c {
                                '"' | '\'' | '`' => *quote = Some(c),
                                '(' => *depth += 1,
                                ')' => {
                                    *depth -= 1;
                                    if *depth == 0 {
                                        end = Some(i);
                                        break;
                                    }
                                }
                                _ => {}
                            }
                        }
                    }
                    match end {
                        Some(i) => {
                            out.push_str(&self.pending[..i]);
                            self.discard_from(i);
                            self.state = State::Finished;
                        }
                        None => {
                            out.push_str(&self.pending);
                            self.pending.clear();
                        }
                    }
                    break;
                }
                State::Body(closer) => {
                    let terminator = match closer {
                        Closer::Fence => "```".to_string(),
                        Closer::Backtick => "`".to_string(),
                        Closer::Tag(name) => format!("</{}>", name),
                        _ => String::new(),
                    };
                    if self.release_until(&terminator, eof, &mut out) {
                        self.state = State::Finished;
                    }
                    break;
                }
                State::Finished => {
                    let n = self.pending.len();
                    if n > 0 {
                        self.discard_from(0);
                    }
                    break;
                }
            }
        }
        out
    }

    fn discard_from(&mut self, i: usize) {
        let dropped = self.pending.len() - i;
        if dropped > 0 {
            trace!("framer: dropping {} byte(s) after the answer", dropped);
        }
        self.discarded += dropped;
        self.pending.clear();
    }

    /// Move body text to `out` up to `terminator`. Returns `true` once the
    /// terminator is found. A tail that could begin the terminator stays
    /// pending unless this is the end of the response.
    fn release_until(&mut self, terminator: &str, eof: bool, out: &mut String) -> bool {
        if let Some(i) = self.pending.find(terminator) {
            out.push_str(&self.pending[..i]);
            self.discard_from(i + terminator.len());
            return true;
        }
        let keep = if eof {
            0
        } else {
            (1..terminator.len())
                .rev()
                .filter(|&k| terminator.is_char_boundary(k))
                .find(|&k| self.pending.ends_with(&terminator[..k]))
                .unwrap_or(0)
        };
        let cut = self.pending.len() - keep;
        out.push_str(&self.pending[..cut]);
        self.pending.drain(..cut);
        false
    }

    /// Try to recognise an opener at the start of `pending`. Returns `false`
    /// when more text is needed to decide.
    fn leave_leading(&mut self, eof: bool) -> bool {
        let lead = self.pending.len() - self.pending.trim_start().len();
        self.pending.drain(..lead);
        let text = self.pending.as_str();
        if text.is_empty() {
            if eof {
                self.state = State::Body(self.wrapper.take().unwrap_or(Closer::Nothing));
            }
            return eof;
        }
        let undecided = !eof && text.len() < MAX_OPENER;

        if text.starts_with("```") {
            match FENCE_OPEN.find(text) {
                Some(m) => {
                    let end = m.end();
                    self.pending.drain(..end);
                    self.state = State::Body(Closer::Fence);
                }
                None if undecided => return false,
                None => {
                    self.pending.drain(..3);
                    self.state = State::Body(Closer::Fence);
                }
            }
            return true;
        }

        if text.starts_with('`') {
            // "`" or "``" may still grow into a fence
            if undecided && text.len() < 3 && text.chars().all(|c| c == '`') {
                return false;
            }
            self.pending.drain(..1);
            self.state = State::Body(Closer::Backtick);
            return true;
        }

        if text.starts_with('<') && self.wrapper.is_none() {
            match TAG_OPEN.captures(text) {
                Some(caps) => {
                    let name = caps.get(1).map_or("", |m| m.as_str()).to_string();
                    let end = caps.get(0).map_or(0, |m| m.end());
                    if self.accepts_tag(&name) {
                        trace!("framer: answer wrapped in <{}>", name);
                        self.pending.drain(..end);
                        self.wrapper = Some(Closer::Tag(name));
                        return true;
                    }
                }
                None if undecided && !text.contains('>') => return false,
                None => {}
            }
            self.state = State::Body(self.wrapper.take().unwrap_or(Closer::Nothing));
            return true;
        }

        if undecided && "return".starts_with(text) {
            return false;
        }
        if text.starts_with("return") {
            if let Some(m) = RETURN_CALL.find(text) {
                let end = m.end();
                self.pending.drain(..end);
                self.wrapper = None;
                self.state = State::Body(Closer::Call {
                    depth: 1,
                    quote: None,
                    escape: false,
                });
                return true;
            }
            if let Some(m) = RETURN_KW.find(text) {
                // `return` then only whitespace: a '(' may still follow
                if undecided && m.end() == text.len() {
                    return false;
                }
                let end = m.end();
                self.pending.drain(..end);
                return true;
            }
        }

        self.state = State::Body(self.wrapper.take().unwrap_or(Closer::Nothing));
        true
    }
}

/*──────────────────────────── chain of thought ───────────────────────*/

/// Reasoning lines followed by a final `return(answer)` line.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOfThought<T> {
    pub thoughts: Vec<String>,
    pub answer: T,
}

/// Split a chain-of-thought response into its thought lines and the raw
/// payload of the last line's `return(...)`.
pub fn split_chain_of_thought(text: &str) -> Result<(Vec<String>, String), LmonError> {
    let mut lines: Vec<&str> = text.trim_end().lines().collect();
    let last = lines.pop().ok_or(LmonError::NoAnswer)?;
    let caps = ANSWER_LINE.captures(last).ok_or(LmonError::NoAnswer)?;
    let answer = caps.get(1).map_or("", |m| m.as_str()).to_string();
    let thoughts = lines.into_iter().map(|l| l.trim_end().to_string()).collect();
    Ok((thoughts, answer))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unwrap_all(chunks: &[&str]) -> String {
        let mut f = ResponseFramer::new(true, Vec::new());
        let mut out = String::new();
        for c in chunks {
            out.push_str(&f.push(c));
        }
        out.push_str(&f.finish());
        out
    }

    #[test]
    fn test_fence_is_stripped_across_chunks() {
        let doc = unwrap_all(&["``", "`json\n{\"a\": ", "1}\n`", "``\nHope this helps!"]);
        assert_eq!(doc, "{\"a\": 1}\n");
    }

    #[test]
    fn test_backticks_and_return_keyword() {
        assert_eq!(unwrap_all(&[" `[1, 2]` "]), "[1, 2]");
        assert_eq!(unwrap_all(&["ret", "urn {\"a\": 1}"]), "{\"a\": 1}");
        assert_eq!(unwrap_all(&["returned: 5"]), "returned: 5");
    }

    #[test]
    fn test_return_call_tracks_depth_and_quotes() {
        assert_eq!(
            unwrap_all(&["return(", "(\"a)\", 2)", ") # done"]),
            "(\"a)\", 2)"
        );
    }

    #[test]
    fn test_tag_wrapper_with_inner_fence() {
        let doc = unwrap_all(&["<Answer>\n```json\n[1]\n```\n</Ans", "wer>"]);
        assert_eq!(doc, "[1]\n");
        let doc = unwrap_all(&["<Answer>{\"x\": 1}</Ans", "wer> trailing"]);
        assert_eq!(doc, "{\"x\": 1}");
    }

    #[test]
    fn test_non_ascii_tag_split_inside_a_character() {
        let doc = unwrap_all(&["<Résultat>[1", ", 2]</R\u{e9}", "sultat>"]);
        assert_eq!(doc, "[1, 2]");
        let doc = unwrap_all(&["<Résultat>[1", ", 2]</Résultat>"]);
        assert_eq!(doc, "[1, 2]");
    }

    #[test]
    fn test_unlisted_tags_pass_through() {
        let mut f = ResponseFramer::new(true, vec!["Result".into()]);
        let mut out = f.push("<b>bold</b>");
        out.push_str(&f.finish());
        assert_eq!(out, "<b>bold</b>");
    }

    #[test]
    fn test_disabled_framer_is_identity() {
        let mut f = ResponseFramer::disabled();
        assert_eq!(f.push("```x```"), "```x```");
        assert_eq!(f.finish(), "");
    }

    #[test]
    fn test_chain_of_thought_split() {
        let text = "Today is Friday.\nSo tomorrow is Saturday.\nreturn(\"Saturday\")\n";
        let (thoughts, answer) = split_chain_of_thought(text).unwrap();
        assert_eq!(thoughts, vec!["Today is Friday.", "So tomorrow is Saturday."]);
        assert_eq!(answer, "\"Saturday\"");

        let (_, answer) = split_chain_of_thought("return ( [1, (2)] ) .").unwrap();
        assert_eq!(answer, "[1, (2)]");

        assert!(matches!(
            split_chain_of_thought("no answer here"),
            Err(LmonError::NoAnswer)
        ));
    }
}
