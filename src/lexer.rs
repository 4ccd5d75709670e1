//! `lexer` – tolerant, resumable tokenizer over a growing text buffer.
//
//  Fragments are appended with `push()`. A token that runs into the end of
//  the buffer is not emitted: `next_token` returns `Lexed::Suspend` without
//  consuming it and the scan restarts from the token's first byte once more
//  text (or the end-of-stream mark) arrives. Offsets are absolute byte
//  positions in the buffer, which only ever grows.

use log::trace;
use nom_supreme::final_parser::Location;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ParseOptions;
use crate::resolved::Number;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    OpenBracket,
    CloseBracket,
    OpenBrace,
    CloseBrace,
    OpenParen,
    CloseParen,
    Comma,
    Colon,
    StringLiteral(String),
    BareWord(String),
    NumberLiteral { value: Number, raw: String },
    EndOfInput,
}

impl Token {
    /// Can this token begin a value?
    pub fn starts_value(&self) -> bool {
        matches!(
            self,
            Token::OpenBracket
                | Token::OpenBrace
                | Token::OpenParen
                | Token::StringLiteral(_)
                | Token::BareWord(_)
                | Token::NumberLiteral { .. }
        )
    }

    pub fn describe(&self) -> &'static str {
        match self {
            Token::OpenBracket => "'['",
            Token::CloseBracket => "']'",
            Token::OpenBrace => "'{'",
            Token::CloseBrace => "'}'",
            Token::OpenParen => "'('",
            Token::CloseParen => "')'",
            Token::Comma => "','",
            Token::Colon => "':'",
            Token::StringLiteral(_) => "string",
            Token::BareWord(_) => "bare word",
            Token::NumberLiteral { .. } => "number",
            Token::EndOfInput => "end of input",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned {
    pub token: Token,
    pub start: usize, // byte offsets in the buffer
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Lexed {
    Token(Spanned),
    /// The buffer ends mid-token; push more text and ask again.
    Suspend,
    /// The stream was closed inside a quoted string that began at `start`.
    Unterminated { start: usize },
}

#[derive(Debug, Clone, Default)]
pub struct Lexer {
    buf: String,
    pos: usize,
    closed: bool,
    anomalies: usize,
    opts: ParseOptions, // keywords end a bare word
}

/// What a run of blanks inside a bare word means.
enum Gap {
    /// The word goes on at this offset.
    Joins(usize),
    /// The word ends before the blanks.
    Splits,
    /// Not enough text yet to tell.
    Unknown,
}

#[inline]
fn peek(bytes: &[u8], i: usize) -> Option<u8> {
    bytes.get(i).copied()
}

#[inline]
fn is_structural(b: u8) -> bool {
    matches!(b, b'{' | b'}' | b'[' | b']' | b'(' | b')' | b',' | b':')
}

#[inline]
fn starts_word(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'$' || b >= 0x80
}

#[inline]
fn ends_segment(b: u8) -> bool {
    is_structural(b) || b.is_ascii_whitespace() || matches!(b, b'"' | b'\'' | b'`' | b'#')
}

#[inline]
fn in_number_run(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'.' | b'+' | b'-')
}

impl Lexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Lexer that splits bare words at the keywords of `opts`.
    pub fn with_options(opts: ParseOptions) -> Self {
        Self {
            opts,
            ..Self::default()
        }
    }

    /// Append the next fragment of the document.
    pub fn push(&mut self, fragment: &str) {
        self.buf.push_str(fragment);
    }

    /// Mark end-of-stream: tokens at the buffer edge are now final.
    pub fn close(&mut self) {
        self.closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Bytes fully consumed so far.
    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Stray characters skipped as whitespace.
    pub fn anomalies(&self) -> usize {
        self.anomalies
    }

    /// Line/column (both 1-based) of a byte offset.
    pub fn location(&self, offset: usize) -> Location {
        let offset = offset.min(self.buf.len());
        let before = &self.buf.as_bytes()[..offset];
        let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
        let line_start = before
            .iter()
            .rposition(|&b| b == b'\n')
            .map(|i| i + 1)
            .unwrap_or(0);
        let column = self.buf[line_start..offset].chars().count() + 1;
        Location { line, column }
    }

    fn single(&mut self, token: Token) -> Lexed {
        let start = self.pos;
        self.pos += 1;
        Lexed::Token(Spanned {
            token,
            start,
            end: start + 1,
        })
    }

    fn skip_anomaly(&mut self) {
        trace!(
            "skipping stray {:?} at byte {}",
            self.buf.as_bytes()[self.pos] as char,
            self.pos
        );
        self.anomalies += 1;
        self.pos += 1;
    }

    /// Next token, `Suspend` if the buffer edge cuts one in half.
    pub fn next_token(&mut self) -> Lexed {
        loop {
            let bytes = self.buf.as_bytes();
            while self.pos < bytes.len() && bytes[self.pos].is_ascii_whitespace() {
                self.pos += 1;
            }
            if self.pos >= bytes.len() {
                return if self.closed {
                    Lexed::Token(Spanned {
                        token: Token::EndOfInput,
                        start: self.pos,
                        end: self.pos,
                    })
                } else {
                    Lexed::Suspend
                };
            }

            let b = bytes[self.pos];
            if b >= 0x80 {
                // no-break space, ideographic space ...
                if let Some(c) = self.buf[self.pos..].chars().next().filter(|c| c.is_whitespace()) {
                    self.pos += c.len_utf8();
                    continue;
                }
            }
            let next = peek(bytes, self.pos + 1);
            match b {
                b'{' => return self.single(Token::OpenBrace),
                b'}' => return self.single(Token::CloseBrace),
                b'[' => return self.single(Token::OpenBracket),
                b']' => return self.single(Token::CloseBracket),
                b'(' => return self.single(Token::OpenParen),
                b')' => return self.single(Token::CloseParen),
                b',' => return self.single(Token::Comma),
                b':' => return self.single(Token::Colon),
                b'"' | b'\'' | b'`' => return self.lex_string(b),
                b'#' => {
                    if !self.skip_line_comment() {
                        return Lexed::Suspend;
                    }
                }
                b'/' => match next {
                    Some(b'/') => {
                        if !self.skip_line_comment() {
                            return Lexed::Suspend;
                        }
                    }
                    Some(b'*') => {
                        if !self.skip_block_comment() {
                            return Lexed::Suspend;
                        }
                    }
                    None if !self.closed => return Lexed::Suspend,
                    _ => self.skip_anomaly(),
                },
                b'0'..=b'9' => return self.lex_number_or_word(),
                b'-' | b'+' | b'.' => match next {
                    Some(d) if d.is_ascii_digit() => return self.lex_number_or_word(),
                    Some(b'.') if b != b'.' => return self.lex_number_or_word(),
                    // -inf, -Infinity, -nan
                    Some(d) if b == b'-' && d.is_ascii_alphabetic() => return self.lex_word(),
                    None if !self.closed => return Lexed::Suspend,
                    _ => self.skip_anomaly(),
                },
                b if starts_word(b) => return self.lex_word(),
                _ => self.skip_anomaly(),
            }
        }
    }

    /* ───────────── comments ───────────── */

    /// `false` when the comment runs past the buffer and more may follow.
    fn skip_line_comment(&mut self) -> bool {
        match self.buf[self.pos..].find('\n') {
            Some(off) => {
                self.pos += off + 1;
                true
            }
            None if self.closed => {
                self.pos = self.buf.len();
                true
            }
            None => false,
        }
    }

    fn skip_block_comment(&mut self) -> bool {
        match self.buf[self.pos + 2..].find("*/") {
            Some(off) => {
                self.pos += 2 + off + 2;
                true
            }
            None if self.closed => {
                self.pos = self.buf.len();
                true
            }
            None => false,
        }
    }

    /* ───────────── strings ───────────── */

    fn lex_string(&mut self, quote: u8) -> Lexed {
        let bytes = self.buf.as_bytes();
        let start = self.pos;

        // One or two bytes of look-ahead decide between "", "x" and """x""".
        let triple = match (peek(bytes, start + 1), peek(bytes, start + 2)) {
            (None, _) if !self.closed => return Lexed::Suspend,
            (Some(q1), None) if q1 == quote && !self.closed => return Lexed::Suspend,
            (Some(q1), Some(q2)) => q1 == quote && q2 == quote,
            _ => false,
        };
        let open_len = if triple { 3 } else { 1 };

        let mut i = start + open_len;
        let mut escape = false;
        while i < bytes.len() {
            let b = bytes[i];
            if escape {
                escape = false;
                i += 1;
                continue;
            }
            if b == b'\\' {
                escape = true;
                i += 1;
                continue;
            }
            if b == quote {
                if !triple {
                    let text = unescape(&self.buf[start + 1..i]);
                    self.pos = i + 1;
                    return Lexed::Token(Spanned {
                        token: Token::StringLiteral(text),
                        start,
                        end: i + 1,
                    });
                }
                match (peek(bytes, i + 1), peek(bytes, i + 2)) {
                    (Some(a), Some(c)) if a == quote && c == quote => {
                        let text = unescape(&self.buf[start + 3..i]);
                        self.pos = i + 3;
                        return Lexed::Token(Spanned {
                            token: Token::StringLiteral(text),
                            start,
                            end: i + 3,
                        });
                    }
                    (None, _) | (Some(_), None) if !self.closed => return Lexed::Suspend,
                    _ => {}
                }
            }
            i += 1;
        }

        if self.closed {
            Lexed::Unterminated { start }
        } else {
            Lexed::Suspend
        }
    }

    /* ───────────── numbers & bare words ───────────── */

    fn lex_number_or_word(&mut self) -> Lexed {
        let bytes = self.buf.as_bytes();
        let start = self.pos;
        let mut i = start;
        while i < bytes.len() && in_number_run(bytes[i]) {
            i += 1;
        }
        if i == bytes.len() && !self.closed {
            return Lexed::Suspend;
        }

        let raw = &self.buf[start..i];
        match normalize_number(raw) {
            Some(value) => {
                let raw = raw.to_string();
                self.pos = i;
                Lexed::Token(Spanned {
                    token: Token::NumberLiteral { value, raw },
                    start,
                    end: i,
                })
            }
            // `1.2.3`, `2024-01-01`, `3rd` … are words, not numbers
            None => self.lex_word(),
        }
    }

    fn lex_word(&mut self) -> Lexed {
        let bytes = self.buf.as_bytes();
        let start = self.pos;
        let mut segment = start;
        let mut i = start;
        while i < bytes.len() {
            let b = bytes[i];
            if is_structural(b) || matches!(b, b'\n' | b'\r' | b'"' | b'`') {
                break;
            }
            if b == b' ' || b == b'\t' {
                match self.gap(segment, i) {
                    Gap::Joins(next) => {
                        segment = next;
                        i = next;
                        continue;
                    }
                    Gap::Splits => break,
                    Gap::Unknown => return Lexed::Suspend,
                }
            }
            // ` // note` and ` /* note */` after a word start a comment
            if b == b'/' && i > start && bytes[i - 1].is_ascii_whitespace() {
                match peek(bytes, i + 1) {
                    Some(b'/') | Some(b'*') => break,
                    None if !self.closed => return Lexed::Suspend,
                    _ => {}
                }
            }
            if b == b'#' && i > start && bytes[i - 1].is_ascii_whitespace() {
                break;
            }
            i += 1;
        }
        if i == bytes.len() && !self.closed {
            return Lexed::Suspend;
        }

        let word = self.buf[start..i].trim_end();
        let end = start + word.len();
        let token = Token::BareWord(word.to_string());
        self.pos = i;
        Lexed::Token(Spanned { token, start, end })
    }

    /// Blanks at `at` follow the word segment starting at `segment`. The word
    /// keeps going (`John Smith`) unless a number, a quote or a keyword is
    /// next to them.
    fn gap(&self, segment: usize, at: usize) -> Gap {
        let bytes = self.buf.as_bytes();
        let mut j = at;
        while j < bytes.len() && matches!(bytes[j], b' ' | b'\t') {
            j += 1;
        }
        let Some(&next) = bytes.get(j) else {
            return if self.closed { Gap::Splits } else { Gap::Unknown };
        };
        match next {
            b'"' | b'\'' | b'`' | b'0'..=b'9' => return Gap::Splits,
            b'-' | b'+' | b'.' => match peek(bytes, j + 1) {
                Some(d) if d.is_ascii_digit() => return Gap::Splits,
                None if !self.closed => return Gap::Unknown,
                _ => {}
            },
            _ => {}
        }
        if !starts_word(next) {
            // structural, line break or comment: the word loop stops there
            return Gap::Joins(j);
        }

        let mut k = j;
        while k < bytes.len() && !ends_segment(bytes[k]) {
            k += 1;
        }
        if k == bytes.len() && !self.closed {
            return Gap::Unknown;
        }
        if self.opts.is_keyword(&self.buf[segment..at]) || self.opts.is_keyword(&self.buf[j..k]) {
            Gap::Splits
        } else {
            Gap::Joins(j)
        }
    }
}

/* ───────────── literal helpers ───────────── */

static DECIMAL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<int>[0-9]*)(?:\.(?P<frac>[0-9]*))?(?:[eE](?P<exp>[+-]?[0-9]+))?$")
        .expect("decimal pattern compiles")
});

/// Canonical value of a loosely written numeric literal, `None` if `raw`
/// is not one. Accepts `+1`, `.5`, `5.`, `007`, `1_000`, `0x1F`, `0o17`,
/// `0b101`, `1e3`; integers beyond `i64` become floats.
pub fn normalize_number(raw: &str) -> Option<Number> {
    let cleaned: String = raw.chars().filter(|&c| c != '_').collect();
    let (negative, body) = match cleaned.as_bytes().first()? {
        b'-' => (true, &cleaned[1..]),
        b'+' => (false, &cleaned[1..]),
        _ => (false, cleaned.as_str()),
    };
    if body.is_empty() {
        return None;
    }

    let radix = match body.get(..2) {
        Some("0x") | Some("0X") => Some(16),
        Some("0o") | Some("0O") => Some(8),
        Some("0b") | Some("0B") => Some(2),
        _ => None,
    };
    if let Some(radix) = radix {
        let digits = &body[2..];
        let magnitude = i128::from_str_radix(digits, radix).ok()?;
        let signed = if negative { -magnitude } else { magnitude };
        return Some(match i64::try_from(signed) {
            Ok(i) => Number::Integer(i),
            Err(_) => Number::Float(signed as f64),
        });
    }

    let caps = DECIMAL.captures(body)?;
    let int = caps.name("int").map_or("", |m| m.as_str());
    let frac = caps.name("frac");
    let exp = caps.name("exp");
    if int.is_empty() && frac.map_or(true, |m| m.as_str().is_empty()) {
        return None;
    }

    let sign = if negative { "-" } else { "" };
    if frac.is_none() && exp.is_none() {
        let text = format!("{sign}{int}");
        return Some(match text.parse::<i64>() {
            Ok(i) => Number::Integer(i),
            Err(_) => Number::Float(text.parse::<f64>().ok()?),
        });
    }

    let int = if int.is_empty() { "0" } else { int };
    let frac = frac.map(|m| m.as_str()).filter(|f| !f.is_empty()).unwrap_or("0");
    let exp = exp.map(|m| format!("e{}", m.as_str())).unwrap_or_default();
    format!("{sign}{int}.{frac}{exp}")
        .parse::<f64>()
        .ok()
        .map(Number::Float)
}

/// Decode backslash escapes. Unknown escapes keep the escaped character;
/// malformed numeric escapes keep their source text.
pub fn unescape(src: &str) -> String {
    let mut out = String::with_capacity(src.len());
    let mut chars = src.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(e) = chars.next() else {
            out.push('\\');
            break;
        };
        match e {
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'b' => out.push('\u{0008}'),
            'f' => out.push('\u{000C}'),
            'v' => out.push('\u{000B}'),
            'a' => out.push('\u{0007}'),
            'e' => out.push('\u{001B}'),
            '0' => out.push('\0'),
            'x' => {
                let hex: String = chars.by_ref().take(2).collect();
                push_code_point(&mut out, &hex, 16, "\\x");
            }
            'u' if chars.peek() == Some(&'{') => {
                chars.next();
                let hex: String = chars.by_ref().take_while(|&c| c != '}').collect();
                push_code_point(&mut out, &hex, 16, "\\u{");
            }
            'u' => {
                let hex: String = chars.by_ref().take(4).collect();
                match u32::from_str_radix(&hex, 16) {
                    // high surrogate: try to pair with a following \uDC00-\uDFFF
                    Ok(hi @ 0xD800..=0xDBFF) => {
                        let mut look = chars.clone();
                        let lo = match (look.next(), look.next()) {
                            (Some('\\'), Some('u')) => {
                                let lo: String = look.by_ref().take(4).collect();
                                u32::from_str_radix(&lo, 16)
                                    .ok()
                                    .filter(|lo| (0xDC00..=0xDFFF).contains(lo))
                            }
                            _ => None,
                        };
                        match lo {
                            Some(lo) => {
                                chars = look;
                                let cp = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
                                out.push(char::from_u32(cp).unwrap_or('\u{FFFD}'));
                            }
                            None => out.push('\u{FFFD}'),
                        }
                    }
                    Ok(cp) => out.push(char::from_u32(cp).unwrap_or('\u{FFFD}')),
                    Err(_) => {
                        out.push_str("\\u");
                        out.push_str(&hex);
                    }
                }
            }
            'U' => {
                let hex: String = chars.by_ref().take(8).collect();
                push_code_point(&mut out, &hex, 16, "\\U");
            }
            // \" \' \\ \/ and anything unknown: keep the character
            other => out.push(other),
        }
    }
    out
}

fn push_code_point(out: &mut String, digits: &str, radix: u32, prefix: &str) {
    match u32::from_str_radix(digits, radix).ok().and_then(char::from_u32) {
        Some(c) => out.push(c),
        None => {
            out.push_str(prefix);
            out.push_str(digits);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Lex a complete document into its tokens (without `EndOfInput`).
    fn lex_all(src: &str) -> Vec<Token> {
        let mut lx = Lexer::new();
        lx.push(src);
        lx.close();
        let mut out = Vec::new();
        loop {
            match lx.next_token() {
                Lexed::Token(Spanned {
                    token: Token::EndOfInput,
                    ..
                }) => return out,
                Lexed::Token(sp) => out.push(sp.token),
                other => panic!("unexpected {:?} for {:?}", other, src),
            }
        }
    }

    fn int(i: i64) -> Number {
        Number::Integer(i)
    }

    #[test]
    fn test_structural_and_scalars() {
        let toks = lex_all(r#"{"a": [1, 2.5], b: (x, y)}"#);
        assert_eq!(toks[0], Token::OpenBrace);
        assert_eq!(toks[1], Token::StringLiteral("a".into()));
        assert_eq!(toks[2], Token::Colon);
        assert_eq!(toks[3], Token::OpenBracket);
        assert!(matches!(toks[4], Token::NumberLiteral { value, .. } if value == int(1)));
        assert!(
            matches!(toks[6], Token::NumberLiteral { value: Number::Float(f), .. } if f == 2.5)
        );
        assert_eq!(toks[9], Token::BareWord("b".into()));
        assert_eq!(toks[11], Token::OpenParen);
        assert_eq!(toks[12], Token::BareWord("x".into()));
        assert_eq!(toks.last(), Some(&Token::CloseBrace));
    }

    #[test]
    fn test_number_anomalies_normalize() {
        for (raw, want) in [
            ("007", int(7)),
            ("+3", int(3)),
            ("1_000", int(1000)),
            ("0x1F", int(31)),
            ("0o17", int(15)),
            ("0b101", int(5)),
            ("-0x10", int(-16)),
            (".5", Number::Float(0.5)),
            ("5.", Number::Float(5.0)),
            ("-.25", Number::Float(-0.25)),
            ("1e3", Number::Float(1000.0)),
            ("2.5E-1", Number::Float(0.25)),
        ] {
            assert_eq!(normalize_number(raw), Some(want), "{}", raw);
        }
        for raw in ["1.2.3", "2024-01-01", "3rd", "-", ".", "0xZZ", "e5"] {
            assert_eq!(normalize_number(raw), None, "{}", raw);
        }
        assert_eq!(
            normalize_number("99999999999999999999"),
            Some(Number::Float(1e20))
        );
    }

    #[test]
    fn test_non_numbers_become_words() {
        let toks = lex_all("[1.2.3, 2024-01-01, 3rd place]");
        assert_eq!(toks[1], Token::BareWord("1.2.3".into()));
        assert_eq!(toks[3], Token::BareWord("2024-01-01".into()));
        assert_eq!(toks[5], Token::BareWord("3rd place".into()));
    }

    #[test]
    fn test_quotes_and_escapes() {
        let toks = lex_all(r#"'single' "dq\n\"x\"" `tick` "é\x41\u{1F600}" "😀""#);
        assert_eq!(toks[0], Token::StringLiteral("single".into()));
        assert_eq!(toks[1], Token::StringLiteral("dq\n\"x\"".into()));
        assert_eq!(toks[2], Token::StringLiteral("tick".into()));
        assert_eq!(toks[3], Token::StringLiteral("éA😀".into()));
        assert_eq!(toks[4], Token::StringLiteral("😀".into()));
        assert_eq!(lex_all(r#"'it\'s'"#), vec![Token::StringLiteral("it's".into())]);
        assert_eq!(lex_all(r#""\q""#), vec![Token::StringLiteral("q".into())]);
    }

    #[test]
    fn test_triple_and_empty_strings() {
        let toks = lex_all("\"\"\"line one\nsays \"hi\" ok\"\"\" ''");
        assert_eq!(
            toks[0],
            Token::StringLiteral("line one\nsays \"hi\" ok".into())
        );
        assert_eq!(toks[1], Token::StringLiteral(String::new()));
    }

    #[test]
    fn test_bare_words_keep_inner_spaces() {
        let toks = lex_all("{name: John Smith  , ok: None}");
        assert_eq!(toks[1], Token::BareWord("name".into()));
        assert_eq!(toks[3], Token::BareWord("John Smith".into()));
        assert_eq!(toks[7], Token::BareWord("None".into()));
    }

    #[test]
    fn test_bare_words_end_before_the_next_value() {
        let word = |w: &str| Token::BareWord(w.into());
        assert_eq!(
            lex_all("[true false]"),
            vec![Token::OpenBracket, word("true"), word("false"), Token::CloseBracket]
        );
        assert_eq!(
            lex_all(r#"[x "y"]"#),
            vec![Token::OpenBracket, word("x"), Token::StringLiteral("y".into()), Token::CloseBracket]
        );
        let toks = lex_all(r#"{"a": yes "b": 2}"#);
        assert_eq!(toks[3], word("yes"));
        assert_eq!(toks[4], Token::StringLiteral("b".into()));
        let toks = lex_all("[item 12, Ann Lee null, don't]");
        assert_eq!(toks[1], word("item"));
        assert!(matches!(toks[2], Token::NumberLiteral { value, .. } if value == int(12)));
        assert_eq!(toks[4], word("Ann Lee"));
        assert_eq!(toks[5], word("null"));
        assert_eq!(toks[7], word("don't"));
    }

    #[test]
    fn test_configured_keywords_split_words() {
        let mut lx = Lexer::with_options(ParseOptions::default().with_null_keywords(["missing"]));
        lx.push("[n/a missing]");
        lx.close();
        let mut words = Vec::new();
        while let Lexed::Token(sp) = lx.next_token() {
            match sp.token {
                Token::EndOfInput => break,
                Token::BareWord(w) => words.push(w),
                _ => {}
            }
        }
        assert_eq!(words, vec!["n/a", "missing"]);
    }

    #[test]
    fn test_word_gap_waits_for_the_next_run() {
        let mut lx = Lexer::new();
        lx.push("[John ");
        assert!(matches!(lx.next_token(), Lexed::Token(_)));
        assert_eq!(lx.next_token(), Lexed::Suspend);
        lx.push("Smi");
        assert_eq!(lx.next_token(), Lexed::Suspend);
        lx.push("th, yes]");
        assert!(matches!(
            lx.next_token(),
            Lexed::Token(Spanned { token: Token::BareWord(ref w), .. }) if w == "John Smith"
        ));
    }

    #[test]
    fn test_unicode_whitespace_is_skipped() {
        let toks = lex_all("[1,\u{a0}2,\u{3000}x\u{2003}]");
        assert_eq!(toks.len(), 7);
        assert!(matches!(toks[3], Token::NumberLiteral { value, .. } if value == int(2)));
        assert_eq!(toks[5], Token::BareWord("x".into()));
    }

    #[test]
    fn test_comments_are_skipped() {
        let toks = lex_all("[1, // one\n 2 /* two */, # three\n word // tail\n]");
        assert_eq!(toks.len(), 7);
        assert_eq!(toks[5], Token::BareWord("word".into()));
    }

    #[test]
    fn test_stray_characters_are_whitespace() {
        let mut lx = Lexer::new();
        lx.push("@[1 ; 2]!");
        lx.close();
        let mut toks = Vec::new();
        while let Lexed::Token(sp) = lx.next_token() {
            if sp.token == Token::EndOfInput {
                break;
            }
            toks.push(sp.token);
        }
        assert_eq!(toks.len(), 4);
        assert_eq!(lx.anomalies(), 3);
    }

    #[test]
    fn test_suspends_mid_token() {
        let mut lx = Lexer::new();
        lx.push(r#"{"na"#);
        assert!(matches!(lx.next_token(), Lexed::Token(Spanned { token: Token::OpenBrace, .. })));
        assert_eq!(lx.next_token(), Lexed::Suspend);
        assert_eq!(lx.position(), 1);
        lx.push(r#"me": 12"#);
        assert!(matches!(
            lx.next_token(),
            Lexed::Token(Spanned { token: Token::StringLiteral(ref s), start: 1, end: 7 }) if s == "name"
        ));
        assert!(matches!(lx.next_token(), Lexed::Token(Spanned { token: Token::Colon, .. })));
        // `12` may still grow
        assert_eq!(lx.next_token(), Lexed::Suspend);
        lx.push("3}");
        assert!(matches!(
            lx.next_token(),
            Lexed::Token(Spanned { token: Token::NumberLiteral { value: Number::Integer(123), .. }, .. })
        ));
    }

    #[test]
    fn test_unterminated_string_at_close() {
        let mut lx = Lexer::new();
        lx.push(r#"["abc"#);
        assert!(matches!(lx.next_token(), Lexed::Token(_)));
        assert_eq!(lx.next_token(), Lexed::Suspend);
        lx.close();
        assert_eq!(lx.next_token(), Lexed::Unterminated { start: 1 });
    }

    #[test]
    fn test_location_is_line_and_column() {
        let mut lx = Lexer::new();
        lx.push("{\n  \"a\": ]");
        let loc = lx.location(9);
        assert_eq!((loc.line, loc.column), (2, 8));
    }
}
