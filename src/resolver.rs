//! Type-directed resolution of a provisional tree.
//
//  The target type alone decides what an ambiguous node means: a bare
//  word is its raw text under `string`, its keyword under `bool`/`null`,
//  a parenthesized sequence is a list under `list[...]` and a mismatch
//  under a scalar. Resolution never mutates the provisional tree, so one
//  snapshot can be resolved against several targets.

use log::debug;
use strsim::damerau_levenshtein;

use crate::config::ParseOptions;
use crate::errors::{ResolveError, ResolveErrorKind};
use crate::lexer::normalize_number;
use crate::provisional::{AmbiguousScalar, Candidate, Mapping, ProvisionalNode, Scalar};
use crate::resolved::{Number, Path, PathItem, ResolvedValue};
use crate::target_type::{FieldSpec, ScalarKind, TargetType};

/// Resolve `node` against `ty` with the given options.
pub fn resolve(
    node: &ProvisionalNode,
    ty: &TargetType,
    opts: &ParseOptions,
) -> Result<ResolvedValue, ResolveError> {
    Resolver::new(opts).resolve(node, ty)
}

#[derive(Debug, Clone, Copy)]
pub struct Resolver<'o> {
    opts: &'o ParseOptions,
}

impl<'o> Resolver<'o> {
    pub fn new(opts: &'o ParseOptions) -> Self {
        Self { opts }
    }

    pub fn resolve(
        &self,
        node: &ProvisionalNode,
        ty: &TargetType,
    ) -> Result<ResolvedValue, ResolveError> {
        self.at(node, ty, &Path::root())
    }

    /// Resolve a node that sits at `path` in the document; errors carry it.
    pub fn resolve_at(
        &self,
        node: &ProvisionalNode,
        ty: &TargetType,
        path: &Path,
    ) -> Result<ResolvedValue, ResolveError> {
        self.at(node, ty, path)
    }

    fn at(
        &self,
        node: &ProvisionalNode,
        ty: &TargetType,
        path: &Path,
    ) -> Result<ResolvedValue, ResolveError> {
        if node.is_incomplete() {
            return Err(ResolveError::incomplete(path));
        }
        match ty {
            TargetType::Any => self.any(node, path),
            TargetType::Optional(inner) => {
                if self.reads_as_null(node) {
                    Ok(ResolvedValue::Null)
                } else {
                    self.at(node, inner, path)
                }
            }
            TargetType::Union(members) => {
                for member in members {
                    match self.at(node, member, path) {
                        Ok(v) => return Ok(v),
                        Err(e) if e.kind == ResolveErrorKind::Incomplete => return Err(e),
                        Err(e) => debug!("{}: union member {} rejected: {}", path, member, e),
                    }
                }
                Err(ResolveError::mismatch(path, ty.notation(), node.kind_name()))
            }
            TargetType::Scalar(kind) => self.scalar(node, *kind, path),
            TargetType::Literal(values) => self.literal(node, values, ty, path),
            TargetType::Sequence(item) => {
                let items = self
                    .sequence_items(node)
                    .ok_or_else(|| ResolveError::mismatch(path, ty.notation(), node.kind_name()))?;
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, child)| self.at(child, item, &path.child(PathItem::Index(i))))
                    .collect::<Result<Vec<_>, _>>()
                    .map(ResolvedValue::Array)
            }
            TargetType::Tuple(types) => match node {
                ProvisionalNode::Sequence(s) if s.items.len() == types.len() => s
                    .items
                    .iter()
                    .zip(types)
                    .enumerate()
                    .map(|(i, (child, t))| self.at(child, t, &path.child(PathItem::Index(i))))
                    .collect::<Result<Vec<_>, _>>()
                    .map(ResolvedValue::Array),
                _ => Err(ResolveError::mismatch(path, ty.notation(), node.kind_name())),
            },
            TargetType::MapOf(value) => match node {
                ProvisionalNode::Mapping(m) => m
                    .deduplicated()
                    .into_iter()
                    .map(|(k, child)| {
                        self.at(child, value, &path.child(PathItem::Key(k.to_string())))
                            .map(|v| (k.to_string(), v))
                    })
                    .collect::<Result<Vec<_>, _>>()
                    .map(ResolvedValue::Object),
                _ => Err(ResolveError::mismatch(path, ty.notation(), node.kind_name())),
            },
            TargetType::Mapping {
                fields,
                extra_allowed,
            } => match node {
                ProvisionalNode::Mapping(m) => self.mapping(m, fields, *extra_allowed, path),
                _ => Err(ResolveError::mismatch(path, ty.notation(), node.kind_name())),
            },
        }
    }

    /*──────────────── scalars ────────────────*/

    fn reads_as_null(&self, node: &ProvisionalNode) -> bool {
        match node {
            ProvisionalNode::Scalar(Scalar::Null) => true,
            ProvisionalNode::Ambiguous(a) => a.can_be_null(),
            _ => false,
        }
    }

    /// The single boolean reading of a bare word; two readings is no reading.
    fn bool_reading(a: &AmbiguousScalar) -> Option<bool> {
        let mut readings = a.candidates.iter().filter_map(|c| match c {
            Candidate::Bool(b) => Some(*b),
            _ => None,
        });
        match (readings.next(), readings.next()) {
            (Some(b), None) => Some(b),
            _ => None,
        }
    }

    fn numeric(n: Number, kind: ScalarKind) -> Option<ResolvedValue> {
        let n = match (kind, n) {
            (ScalarKind::Integer, n) => Number::Integer(n.as_i64()?),
            (ScalarKind::Float, n) => Number::Float(n.as_f64()),
            (_, n) => n,
        };
        Some(ResolvedValue::Number(n))
    }

    fn scalar(
        &self,
        node: &ProvisionalNode,
        kind: ScalarKind,
        path: &Path,
    ) -> Result<ResolvedValue, ResolveError> {
        use crate::target_type::ScalarKind as K;
        let numeric_kind = matches!(kind, K::Number | K::Integer | K::Float);

        let resolved = match (kind, node) {
            (K::String, ProvisionalNode::Scalar(Scalar::String(s))) => {
                Some(ResolvedValue::String(s.clone()))
            }
            // string context always wins over keyword-likeness
            (K::String, ProvisionalNode::Ambiguous(a)) => Some(ResolvedValue::String(a.raw.clone())),
            (K::String, ProvisionalNode::Scalar(Scalar::Number { raw, .. }))
                if self.opts.stringify_numbers =>
            {
                debug!("{}: number {} taken as a string", path, raw);
                Some(ResolvedValue::String(raw.clone()))
            }

            (K::Bool, ProvisionalNode::Scalar(Scalar::Bool(b))) => Some(ResolvedValue::Boolean(*b)),
            (K::Bool, ProvisionalNode::Ambiguous(a)) => {
                Self::bool_reading(a).map(ResolvedValue::Boolean)
            }
            (K::Bool, ProvisionalNode::Scalar(Scalar::String(s)))
                if self.opts.coerce_numeric_strings =>
            {
                let b = self.opts.bool_keyword(s);
                if b.is_some() {
                    debug!("{}: string {:?} coerced to bool", path, s);
                }
                b.map(ResolvedValue::Boolean)
            }
            (K::Bool, ProvisionalNode::Scalar(Scalar::Number { value, .. }))
                if self.opts.coerce_numeric_strings =>
            {
                match value {
                    Number::Integer(0) => Some(ResolvedValue::Boolean(false)),
                    Number::Integer(1) => Some(ResolvedValue::Boolean(true)),
                    _ => None,
                }
            }

            (K::Null, ProvisionalNode::Scalar(Scalar::Null)) => Some(ResolvedValue::Null),
            (K::Null, ProvisionalNode::Ambiguous(a)) if a.can_be_null() => Some(ResolvedValue::Null),

            (_, ProvisionalNode::Scalar(Scalar::Number { value, .. })) if numeric_kind => {
                Self::numeric(*value, kind)
            }
            (K::Number | K::Float, ProvisionalNode::Ambiguous(a)) => {
                a.as_number().map(ResolvedValue::Number)
            }
            (_, ProvisionalNode::Scalar(Scalar::String(s)))
                if numeric_kind && self.opts.coerce_numeric_strings =>
            {
                let n = normalize_number(s.trim()).and_then(|n| Self::numeric(n, kind));
                if n.is_some() {
                    debug!("{}: string {:?} coerced to {}", path, s, kind.name());
                }
                n
            }
            _ => None,
        };
        resolved.ok_or_else(|| ResolveError::mismatch(path, kind.name(), node.kind_name()))
    }

    fn literal(
        &self,
        node: &ProvisionalNode,
        values: &[String],
        ty: &TargetType,
        path: &Path,
    ) -> Result<ResolvedValue, ResolveError> {
        let text = match node {
            ProvisionalNode::Scalar(Scalar::String(s)) => Some(s.as_str()),
            ProvisionalNode::Ambiguous(a) => Some(a.raw.as_str()),
            ProvisionalNode::Scalar(Scalar::Number { raw, .. }) => Some(raw.as_str()),
            _ => None,
        };
        let found = text.and_then(|t| {
            values
                .iter()
                .find(|v| v.as_str() == t)
                .or_else(|| values.iter().find(|v| v.eq_ignore_ascii_case(t)))
        });
        match found {
            Some(v) => Ok(ResolvedValue::String(v.clone())),
            None => Err(ResolveError::mismatch(path, ty.notation(), node.kind_name())),
        }
    }

    /*──────────────── containers ────────────────*/

    /// Children of anything that may stand for a list: a sequence of either
    /// delimiter, or a mapping keyed `0..n`.
    fn sequence_items<'n>(&self, node: &'n ProvisionalNode) -> Option<Vec<&'n ProvisionalNode>> {
        match node {
            ProvisionalNode::Sequence(s) => Some(s.items.iter().collect()),
            ProvisionalNode::Mapping(m) => {
                let items = numbered_entries(m)?;
                debug!("object with keys 0..{} read as a list", items.len());
                Some(items)
            }
            _ => None,
        }
    }

    fn mapping(
        &self,
        m: &Mapping,
        fields: &[FieldSpec],
        extra_allowed: bool,
        path: &Path,
    ) -> Result<ResolvedValue, ResolveError> {
        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            let field_path = path.child(PathItem::Key(field.name.clone()));
            match m.get(&field.name) {
                Some(child) => match self.at(child, &field.ty, &field_path) {
                    Ok(v) => out.push((field.name.clone(), v)),
                    Err(e) if e.kind == ResolveErrorKind::Incomplete => return Err(e),
                    Err(e) => match (&field.default, field.required) {
                        (Some(default), false) => {
                            debug!("{}: {}; using default", field_path, e);
                            out.push((field.name.clone(), default.clone()));
                        }
                        _ => return Err(e),
                    },
                },
                None if field.required => {
                    return Err(ResolveError::missing(
                        path,
                        &field.name,
                        suggest(m, fields, &field.name),
                    ))
                }
                None => {
                    if let Some(default) = &field.default {
                        out.push((field.name.clone(), default.clone()));
                    }
                }
            }
        }

        for (key, child) in m.deduplicated() {
            if fields.iter().any(|f| f.name == key) {
                continue;
            }
            if extra_allowed {
                let v = self.any(child, &path.child(PathItem::Key(key.to_string())))?;
                out.push((key.to_string(), v));
            } else {
                debug!("{}: dropping undeclared field `{}`", path, key);
            }
        }
        Ok(ResolvedValue::Object(out))
    }

    /// No type context: keywords win, parentheses mean a list.
    fn any(&self, node: &ProvisionalNode, path: &Path) -> Result<ResolvedValue, ResolveError> {
        Ok(match node {
            ProvisionalNode::Incomplete(_) => return Err(ResolveError::incomplete(path)),
            ProvisionalNode::Scalar(Scalar::String(s)) => ResolvedValue::String(s.clone()),
            ProvisionalNode::Scalar(Scalar::Number { value, .. }) => ResolvedValue::Number(*value),
            ProvisionalNode::Scalar(Scalar::Bool(b)) => ResolvedValue::Boolean(*b),
            ProvisionalNode::Scalar(Scalar::Null) => ResolvedValue::Null,
            ProvisionalNode::Ambiguous(a) if a.can_be_null() => ResolvedValue::Null,
            ProvisionalNode::Ambiguous(a) => match Self::bool_reading(a) {
                Some(b) => ResolvedValue::Boolean(b),
                None => ResolvedValue::String(a.raw.clone()),
            },
            ProvisionalNode::Sequence(s) => ResolvedValue::Array(
                s.items
                    .iter()
                    .enumerate()
                    .map(|(i, child)| self.any(child, &path.child(PathItem::Index(i))))
                    .collect::<Result<_, _>>()?,
            ),
            ProvisionalNode::Mapping(m) => ResolvedValue::Object(
                m.deduplicated()
                    .into_iter()
                    .map(|(k, child)| {
                        self.any(child, &path.child(PathItem::Key(k.to_string())))
                            .map(|v| (k.to_string(), v))
                    })
                    .collect::<Result<_, _>>()?,
            ),
        })
    }

    /*──────────────── plausibility ────────────────*/

    /// Could `node`, once its open containers are finished, still resolve
    /// against `ty`? Complete subtrees are judged exactly; open ones only by
    /// what has arrived, so an unfinished prefix is never rejected for what
    /// it lacks.
    pub fn plausible(&self, node: &ProvisionalNode, ty: &TargetType) -> bool {
        if node.is_complete() {
            return self.resolve(node, ty).is_ok();
        }
        let inner = node.content();
        match ty {
            TargetType::Any => true,
            TargetType::Optional(t) => self.plausible(node, t),
            TargetType::Union(members) => members.iter().any(|m| self.plausible(node, m)),
            TargetType::Scalar(_) | TargetType::Literal(_) => false,
            TargetType::Sequence(item) => match inner {
                ProvisionalNode::Sequence(s) => s.items.iter().all(|c| self.plausible(c, item)),
                ProvisionalNode::Mapping(m) => m
                    .entries
                    .iter()
                    .all(|(k, v)| k.trim().parse::<usize>().is_ok() && self.plausible(v, item)),
                _ => false,
            },
            TargetType::Tuple(types) => match inner {
                ProvisionalNode::Sequence(s) => {
                    s.items.len() <= types.len()
                        && s.items.iter().zip(types).all(|(c, t)| self.plausible(c, t))
                }
                _ => false,
            },
            TargetType::MapOf(value) => match inner {
                ProvisionalNode::Mapping(m) => m.entries.iter().all(|(_, v)| self.plausible(v, value)),
                _ => false,
            },
            TargetType::Mapping { fields, .. } => match inner {
                ProvisionalNode::Mapping(m) => m.deduplicated().into_iter().all(|(k, v)| {
                    match fields.iter().find(|f| f.name == k) {
                        Some(f) => {
                            self.plausible(v, &f.ty) || (!f.required && f.default.is_some())
                        }
                        // kept as `any` or dropped; either way harmless
                        None => true,
                    }
                }),
                _ => false,
            },
        }
    }
}

/// Values of a mapping whose keys are exactly `0..n`, in index order.
fn numbered_entries(m: &Mapping) -> Option<Vec<&ProvisionalNode>> {
    let entries = m.deduplicated();
    let mut slots: Vec<Option<&ProvisionalNode>> = vec![None; entries.len()];
    for (k, v) in entries {
        let i: usize = k.trim().parse().ok()?;
        let slot = slots.get_mut(i)?;
        *slot = Some(v);
    }
    slots.into_iter().collect()
}

/// Closest undeclared key to a missing field name.
fn suggest(m: &Mapping, fields: &[FieldSpec], missing: &str) -> Option<String> {
    m.keys()
        .into_iter()
        .filter(|k| !fields.iter().any(|f| f.name == *k))
        .map(|k| (damerau_levenshtein(k, missing), k))
        .filter(|(d, _)| *d <= 2)
        .min_by_key(|(d, _)| *d)
        .map(|(_, k)| k.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{Grammar, ParserAction};
    use crate::lexer::{Lexed, Lexer, Token};
    use serde_json::json;

    fn tree_with(src: &str, opts: &ParseOptions) -> ProvisionalNode {
        let mut lx = Lexer::with_options(opts.clone());
        lx.push(src);
        lx.close();
        let mut g = Grammar::new(opts.clone());
        while let Lexed::Token(sp) = lx.next_token() {
            let end = sp.token == Token::EndOfInput;
            if let ParserAction::Fatal(v) = g.feed(sp) {
                panic!("fatal {:?} for {:?}", v, src);
            }
            if end || g.is_done() {
                break;
            }
        }
        g.root().cloned().unwrap()
    }

    fn tree(src: &str) -> ProvisionalNode {
        tree_with(src, &ParseOptions::default())
    }

    fn ok(src: &str, ty: &TargetType) -> serde_json::Value {
        resolve(&tree(src), ty, &ParseOptions::default())
            .unwrap_or_else(|e| panic!("{} against {}: {}", src, ty, e))
            .to_json()
    }

    fn err(src: &str, ty: &TargetType) -> ResolveError {
        match resolve(&tree(src), ty, &ParseOptions::default()) {
            Ok(v) => panic!("{} resolved to {} against {}", src, v, ty),
            Err(e) => e,
        }
    }

    #[test]
    fn none_depends_on_the_target() {
        let opt = TargetType::optional(TargetType::string());
        assert_eq!(ok("None", &opt), json!(null));
        assert_eq!(ok("None", &TargetType::string()), json!("None"));
        assert_eq!(ok("\"None\"", &opt), json!("None"));
        assert_eq!(ok("NIL", &TargetType::null()), json!(null));
        assert!(err("Ann", &TargetType::null()).is_type_mismatch());
    }

    #[test]
    fn bool_keywords_and_coercions() {
        let b = TargetType::boolean();
        assert_eq!(ok("yes", &b), json!(true));
        assert_eq!(ok("False", &b), json!(false));
        assert_eq!(ok("\"true\"", &b), json!(true));
        assert_eq!(ok("1", &b), json!(true));
        assert!(err("2", &b).is_type_mismatch());
        assert!(err("maybe", &b).is_type_mismatch());
    }

    #[test]
    fn numbers_and_numeric_strings() {
        assert_eq!(ok("\"42\"", &TargetType::integer()), json!(42));
        assert_eq!(ok("\" 0x10 \"", &TargetType::number()), json!(16));
        assert_eq!(ok("3", &TargetType::float()), json!(3.0));
        assert_eq!(ok("4.0", &TargetType::integer()), json!(4));
        assert!(err("4.5", &TargetType::integer()).is_type_mismatch());
        assert!(err("\"abc\"", &TargetType::number()).is_type_mismatch());
        assert!(err("12", &TargetType::string()).is_type_mismatch());

        let opts = ParseOptions::default().with_stringified_numbers(true);
        let v = resolve(&tree("007"), &TargetType::string(), &opts).unwrap();
        assert_eq!(v, ResolvedValue::String("007".into()));

        let strict = ParseOptions::strict();
        assert!(resolve(&tree("\"42\""), &TargetType::integer(), &strict).is_err());
    }

    #[test]
    fn parenthesized_sequences_need_a_sequence_target() {
        let list = TargetType::sequence_of(TargetType::string());
        assert_eq!(ok("(a, b, \"c\")", &list), ok("[a, b, \"c\"]", &list));
        assert!(err("(a, b)", &TargetType::string()).is_type_mismatch());
        let pair = TargetType::Tuple(vec![TargetType::string(), TargetType::integer()]);
        assert_eq!(ok("(x, 2)", &pair), json!(["x", 2]));
        assert!(err("(x, 2, 3)", &pair).is_type_mismatch());
    }

    #[test]
    fn numbered_objects_read_as_lists() {
        let list = TargetType::sequence_of(TargetType::integer());
        assert_eq!(ok(r#"{"1": 20, "0": 10}"#, &list), json!([10, 20]));
        assert!(err(r#"{"0": 10, "2": 30}"#, &list).is_type_mismatch());
    }

    #[test]
    fn mapping_fields_extras_and_defaults() {
        let ty = TargetType::mapping(vec![
            FieldSpec::required("name", TargetType::string()),
            FieldSpec::optional("age", TargetType::integer())
                .with_default(ResolvedValue::Number(Number::Integer(0))),
            FieldSpec::optional("nick", TargetType::string()),
        ]);
        assert_eq!(
            ok("{name: Ann, age: unknown, extra: 1}", &ty),
            json!({"name": "Ann", "age": 0})
        );
        assert_eq!(
            ok("{name: Bob, extra: None}", &ty.clone().allow_extra()),
            json!({"name": "Bob", "age": 0, "extra": null})
        );

        let e = err("{nmae: Ann}", &ty);
        assert_eq!(
            e.kind,
            ResolveErrorKind::MissingField {
                field: "name".into(),
                suggestion: Some("nmae".into())
            }
        );

        // a mismatch on a required field names the field
        let strict = TargetType::mapping(vec![FieldSpec::required("id", TargetType::number())]);
        assert_eq!(err(r#"{"id": "abc"}"#, &strict).path.to_string(), ".id");
    }

    #[test]
    fn duplicate_keys_last_wins() {
        let ty = TargetType::mapping(vec![FieldSpec::required("a", TargetType::integer())]);
        assert_eq!(ok(r#"{"a":1,"a":2}"#, &ty), json!({"a": 2}));
        assert_eq!(ok(r#"{"a":1,"a":2}"#, &TargetType::Any), json!({"a": 2}));
    }

    #[test]
    fn unions_follow_declared_order() {
        let s_or_null = TargetType::union(vec![TargetType::string(), TargetType::null()]);
        assert_eq!(ok("None", &s_or_null), json!("None"));
        let null_or_s = TargetType::union(vec![TargetType::null(), TargetType::string()]);
        assert_eq!(ok("None", &null_or_s), json!(null));
        let int_or_list = TargetType::union(vec![
            TargetType::integer(),
            TargetType::sequence_of(TargetType::integer()),
        ]);
        assert_eq!(ok("(1 2)", &int_or_list), json!([1, 2]));
        assert!(err("{}", &int_or_list).is_type_mismatch());
    }

    #[test]
    fn literals_match_exact_then_caseless() {
        let color = TargetType::literal(["Red", "green"]);
        assert_eq!(ok("red", &color), json!("Red"));
        assert_eq!(ok("'green'", &color), json!("green"));
        assert!(err("blue", &color).is_type_mismatch());
    }

    #[test]
    fn any_prefers_keywords() {
        assert_eq!(
            ok("{a: None, b: yes, c: (1, x), d: nan}", &TargetType::Any),
            json!({"a": null, "b": true, "c": [1, "x"], "d": "nan"})
        );
    }

    #[test]
    fn incomplete_nodes_do_not_resolve() {
        let open = ProvisionalNode::Incomplete(Box::new(tree("[1]")));
        let e = resolve(&open, &TargetType::Any, &ParseOptions::default()).unwrap_err();
        assert_eq!(e.kind, ResolveErrorKind::Incomplete);
    }

    #[test]
    fn plausibility_is_optimistic_about_open_containers() {
        let opts = ParseOptions::default();
        let r = Resolver::new(&opts);
        let id = TargetType::mapping(vec![FieldSpec::required("id", TargetType::number())]);
        let wrap = |m: ProvisionalNode| ProvisionalNode::Incomplete(Box::new(m));

        let bad = wrap(tree(r#"{"id": "abc"}"#));
        let good = wrap(tree(r#"{"id": "12"}"#));
        let empty = wrap(tree("{}"));
        assert!(!r.plausible(&bad, &id));
        assert!(r.plausible(&good, &id));
        assert!(r.plausible(&empty, &id));
        assert!(!r.plausible(&empty, &TargetType::string()));
        assert!(r.plausible(&wrap(tree("[1, 2]")), &TargetType::sequence_of(TargetType::integer())));
        assert!(!r.plausible(&wrap(tree("[1, x]")), &TargetType::sequence_of(TargetType::integer())));
    }
}
