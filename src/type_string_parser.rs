//! Parser for the type notation shown to models in prompts.
//
//  type    := member ('|' member)*
//  member  := primary '?'*
//  primary := '{' fields '}' | '(' type ')' | quoted | name ('[' type, … ']')?
//  fields  := (field (',' field)*)? (',' '...')? ','?
//  field   := (name | quoted) '?'? ':' type
//
//  Names follow Python's spelling where one exists: `str`, `int`,
//  `list[T]`, `dict[str, T]`, `tuple[A, B]`, `Optional[T]`, `Union[A, B]`,
//  `Literal["a", "b"]`.

use nom::{
    branch::alt,
    bytes::complete::{is_not, tag, take_while1},
    character::complete::{char, multispace0},
    combinator::{map, map_res, opt},
    multi::{many0_count, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, terminated, tuple},
    IResult, Parser,
};
use nom_supreme::error::ErrorTree;
use nom_supreme::final_parser::{final_parser, Location};
use nom_supreme::ParserExt;
use thiserror::Error;

use crate::target_type::{FieldSpec, ScalarKind, TargetType};

type Res<'a, T> = IResult<&'a str, T, ErrorTree<&'a str>>;

#[derive(Debug, Error)]
enum NotationError {
    #[error("unknown type `{0}`")]
    UnknownName(String),
    #[error("`{name}` takes {expected} type argument(s), got {got}")]
    Arity {
        name: String,
        expected: &'static str,
        got: usize,
    },
    #[error("`Literal[...]` takes quoted strings only")]
    LiteralArgs,
}

/// Parse a complete type notation string.
pub fn parse_type_notation(input: &str) -> Result<TargetType, ErrorTree<Location>> {
    final_parser(ws(type_expr))(input)
}

fn ws<'a, O>(
    inner: impl FnMut(&'a str) -> Res<'a, O>,
) -> impl FnMut(&'a str) -> Res<'a, O> {
    delimited(multispace0, inner, multispace0)
}

fn name(input: &str) -> Res<&str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_')(input)
}

fn quoted(input: &str) -> Res<String> {
    let body = |q: char| {
        delimited(
            char(q),
            map(opt(is_not(if q == '"' { "\"" } else { "'" })), |s: Option<&str>| {
                s.unwrap_or_default().to_string()
            }),
            char(q),
        )
    };
    alt((body('"'), body('\'')))(input)
}

fn type_expr(input: &str) -> Res<TargetType> {
    map(separated_list1(ws(char('|')), member), |members| {
        let mut merged = merge_literals(members);
        if merged.len() == 1 {
            merged.remove(0)
        } else {
            TargetType::Union(merged)
        }
    })(input)
}

/// `"a" | "b"` reads as one literal set, not a union of two.
fn merge_literals(members: Vec<TargetType>) -> Vec<TargetType> {
    let mut out: Vec<TargetType> = Vec::with_capacity(members.len());
    for m in members {
        match (out.last_mut(), m) {
            (Some(TargetType::Literal(prev)), TargetType::Literal(next)) => prev.extend(next),
            (_, m) => out.push(m),
        }
    }
    out
}

fn member(input: &str) -> Res<TargetType> {
    map(
        pair(ws(primary), many0_count(ws(char('?')))),
        |(ty, marks)| {
            if marks > 0 {
                TargetType::optional(ty)
            } else {
                ty
            }
        },
    )(input)
}

fn primary(input: &str) -> Res<TargetType> {
    alt((
        object.context("object"),
        delimited(char('('), ws(type_expr), char(')')).context("group"),
        map(quoted, |s| TargetType::Literal(vec![s])),
        named.context("type name"),
    ))(input)
}

fn named(input: &str) -> Res<TargetType> {
    map_res(
        pair(
            name,
            opt(preceded(
                ws(char('[')),
                terminated(
                    separated_list1(ws(char(',')), type_expr),
                    pair(opt(ws(char(','))), char(']')),
                ),
            )),
        ),
        |(name, args)| build(name, args),
    )(input)
}

fn build(name: &str, args: Option<Vec<TargetType>>) -> Result<TargetType, NotationError> {
    let arity = |expected: &'static str, got: usize| NotationError::Arity {
        name: name.to_string(),
        expected,
        got,
    };
    let lower = name.to_ascii_lowercase();
    let Some(mut args) = args else {
        return Ok(match lower.as_str() {
            "str" | "string" | "text" => TargetType::Scalar(ScalarKind::String),
            "int" | "integer" => TargetType::Scalar(ScalarKind::Integer),
            "float" | "double" => TargetType::Scalar(ScalarKind::Float),
            "number" | "num" => TargetType::Scalar(ScalarKind::Number),
            "bool" | "boolean" => TargetType::Scalar(ScalarKind::Bool),
            "null" | "none" | "nonetype" => TargetType::Scalar(ScalarKind::Null),
            "any" | "object" => TargetType::Any,
            "list" | "array" | "set" | "sequence" => TargetType::sequence_of(TargetType::Any),
            "dict" | "mapping" => TargetType::map_of(TargetType::Any),
            _ => return Err(NotationError::UnknownName(name.to_string())),
        });
    };

    match lower.as_str() {
        "list" | "array" | "set" | "sequence" => match args.len() {
            1 => Ok(TargetType::sequence_of(args.remove(0))),
            n => Err(arity("1", n)),
        },
        "tuple" => Ok(TargetType::Tuple(args)),
        // keys are always strings; the key type is accepted and ignored
        "dict" | "mapping" => match args.len() {
            2 => Ok(TargetType::map_of(args.remove(1))),
            n => Err(arity("2", n)),
        },
        "optional" => match args.len() {
            1 => Ok(TargetType::optional(args.remove(0))),
            n => Err(arity("1", n)),
        },
        "union" => match args.len() {
            0 => Err(arity("1 or more", 0)),
            1 => Ok(args.remove(0)),
            _ => Ok(TargetType::Union(args)),
        },
        "literal" => {
            let mut values = Vec::new();
            for arg in args {
                match arg {
                    TargetType::Literal(v) => values.extend(v),
                    _ => return Err(NotationError::LiteralArgs),
                }
            }
            Ok(TargetType::Literal(values))
        }
        _ => Err(NotationError::UnknownName(name.to_string())),
    }
}

fn object(input: &str) -> Res<TargetType> {
    let (input, _) = char('{')(input)?;
    let (input, fields) = separated_list0(ws(char(',')), ws(field))(input)?;
    let (input, extra) = opt(preceded(opt(ws(char(','))), ws(tag("..."))))(input)?;
    let (input, _) = opt(ws(char(',')))(input)?;
    let (input, _) = ws(char('}')).cut().context("closing '}'").parse(input)?;
    Ok((
        input,
        TargetType::Mapping {
            fields,
            extra_allowed: extra.is_some(),
        },
    ))
}

fn field(input: &str) -> Res<FieldSpec> {
    map(
        tuple((
            alt((quoted, map(name, String::from))),
            opt(ws(char('?'))),
            ws(char(':')),
            type_expr,
        )),
        |(name, optional, _, ty)| FieldSpec {
            name,
            ty,
            required: optional.is_none(),
            default: None,
        },
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_types() {
        assert_eq!(parse_type_notation("int").unwrap(), TargetType::integer());
        assert_eq!(parse_type_notation(" str ").unwrap(), TargetType::string());
        assert_eq!(parse_type_notation("None").unwrap(), TargetType::null());
        assert_eq!(parse_type_notation("list").unwrap(), TargetType::sequence_of(TargetType::Any));
    }

    #[test]
    fn test_parse_generic_types() {
        assert_eq!(
            parse_type_notation("list[dict[str, int]]").unwrap(),
            TargetType::sequence_of(TargetType::map_of(TargetType::integer()))
        );
        assert_eq!(
            parse_type_notation("tuple[str, int, Optional[float]]").unwrap(),
            TargetType::Tuple(vec![
                TargetType::string(),
                TargetType::integer(),
                TargetType::optional(TargetType::float()),
            ])
        );
        assert_eq!(
            parse_type_notation("Union[int, str]").unwrap(),
            TargetType::union(vec![TargetType::integer(), TargetType::string()])
        );
        assert_eq!(
            parse_type_notation("Literal['red', \"green\"]").unwrap(),
            TargetType::literal(["red", "green"])
        );
    }

    #[test]
    fn test_parse_object_notation() {
        let ty = parse_type_notation("{ id: int, 'full name'?: str?, tags: list[str], ... }").unwrap();
        match ty {
            TargetType::Mapping {
                fields,
                extra_allowed,
            } => {
                assert!(extra_allowed);
                assert_eq!(fields.len(), 3);
                assert_eq!(fields[1].name, "full name");
                assert!(!fields[1].required);
                assert_eq!(fields[1].ty, TargetType::optional(TargetType::string()));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_rejects_bad_notation() {
        assert!(parse_type_notation("list[int").is_err());
        assert!(parse_type_notation("widget").is_err());
        assert!(parse_type_notation("dict[int]").is_err());
        assert!(parse_type_notation("{a: int").is_err());
        assert!(parse_type_notation("int extra").is_err());
    }

    #[test]
    fn test_type_expr_stops_at_foreign_input() {
        // same parser without the end-of-input check
        let (rest, _) = ws(type_expr).parse("int | str )").unwrap();
        assert_eq!(rest, ")");
    }
}
