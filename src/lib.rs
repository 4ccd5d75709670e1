//! Permissive, type-directed parsing of JSON-like model output.
//
//  text ─▶ framing ─▶ lexer ─▶ grammar ─▶ provisional tree ─▶ resolver ─▶ value
//
//  The grammar accepts the usual model mistakes (bare words, missing or
//  trailing commas, parenthesized lists, comments, odd quoting) and keeps
//  any reading it cannot settle on its own as an ambiguous node. The
//  resolver settles them against the caller's `TargetType`. The same
//  pipeline runs incrementally through `StreamSession`.

pub mod config;
pub mod errors;
pub mod framing;
pub mod grammar;
pub mod lexer;
pub mod provisional;
pub mod resolved;
pub mod resolver;
pub mod stream;
pub mod target_type;
mod type_string_parser;

#[cfg(feature = "python")]
mod python;

#[cfg(test)]
mod tests;

pub use config::{KeywordSet, ParseOptions};
pub use errors::{FatalReason, GrammarFatal, LmonError, ResolveError, ResolveErrorKind};
pub use framing::{ChainOfThought, ResponseFramer};
pub use provisional::{AmbiguousScalar, ProvisionalNode, Recovery};
pub use resolved::{Number, Path, PathItem, ResolvedValue};
pub use resolver::{resolve, Resolver};
pub use stream::{parse_stream, StreamCursor, StreamEvent, StreamSession, SubfieldError};
pub use target_type::{FieldSpec, ScalarKind, TargetType};

/// Parse a complete response with the default options.
pub fn parse_str(text: &str, ty: &TargetType) -> Result<ResolvedValue, LmonError> {
    parse_with(text, ty, ParseOptions::default())
}

/// Parse a complete response. Equivalent to streaming it as one fragment.
pub fn parse_with(
    text: &str,
    ty: &TargetType,
    opts: ParseOptions,
) -> Result<ResolvedValue, LmonError> {
    parse_stream(std::iter::once(text), ty, opts)
}

/// Parse a response made of reasoning lines ending in `return(answer)`;
/// only the answer is resolved against `ty`.
pub fn parse_chain_of_thought(
    text: &str,
    ty: &TargetType,
    opts: ParseOptions,
) -> Result<ChainOfThought<ResolvedValue>, LmonError> {
    let (thoughts, raw) = framing::split_chain_of_thought(text)?;
    log::debug!("{} thought line(s) before the answer", thoughts.len());
    let answer = parse_with(&raw, ty, opts)?;
    Ok(ChainOfThought { thoughts, answer })
}

/// Install the `env_logger` backend, filtered by `LOG_LEVEL`
/// (e.g. `LOG_LEVEL=lmon=debug`). Calling it twice is harmless.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::new().filter("LOG_LEVEL")).try_init();
}
