use std::fmt;

use crate::errors::LmonError;
use crate::resolved::ResolvedValue;
use crate::type_string_parser::parse_type_notation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    String,
    /// Integer or float, whichever the text says.
    Number,
    Integer,
    Float,
    Bool,
    Null,
}

impl ScalarKind {
    pub fn name(self) -> &'static str {
        match self {
            ScalarKind::String => "string",
            ScalarKind::Number => "number",
            ScalarKind::Integer => "int",
            ScalarKind::Float => "float",
            ScalarKind::Bool => "bool",
            ScalarKind::Null => "null",
        }
    }
}

/// The shape a caller expects back. Immutable for a session.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetType {
    Scalar(ScalarKind),
    /// Null first, then the inner type.
    Optional(Box<TargetType>),
    Sequence(Box<TargetType>),
    Tuple(Vec<TargetType>),
    Mapping {
        fields: Vec<FieldSpec>,
        extra_allowed: bool,
    },
    /// String keys, homogeneous values.
    MapOf(Box<TargetType>),
    /// One of a fixed set of strings.
    Literal(Vec<String>),
    /// First member that resolves wins.
    Union(Vec<TargetType>),
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: TargetType,
    pub required: bool,
    /// Used when the field is absent or does not resolve.
    pub default: Option<ResolvedValue>,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, ty: TargetType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, ty: TargetType) -> Self {
        Self {
            name: name.into(),
            ty,
            required: false,
            default: None,
        }
    }

    /// Makes the field optional as well.
    pub fn with_default(mut self, value: ResolvedValue) -> Self {
        self.required = false;
        self.default = Some(value);
        self
    }
}

impl TargetType {
    pub fn string() -> Self {
        TargetType::Scalar(ScalarKind::String)
    }

    pub fn number() -> Self {
        TargetType::Scalar(ScalarKind::Number)
    }

    pub fn integer() -> Self {
        TargetType::Scalar(ScalarKind::Integer)
    }

    pub fn float() -> Self {
        TargetType::Scalar(ScalarKind::Float)
    }

    pub fn boolean() -> Self {
        TargetType::Scalar(ScalarKind::Bool)
    }

    pub fn null() -> Self {
        TargetType::Scalar(ScalarKind::Null)
    }

    pub fn optional(inner: TargetType) -> Self {
        TargetType::Optional(Box::new(inner))
    }

    pub fn sequence_of(item: TargetType) -> Self {
        TargetType::Sequence(Box::new(item))
    }

    pub fn map_of(value: TargetType) -> Self {
        TargetType::MapOf(Box::new(value))
    }

    pub fn literal<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        TargetType::Literal(values.into_iter().map(Into::into).collect())
    }

    pub fn union(members: Vec<TargetType>) -> Self {
        TargetType::Union(members)
    }

    /// A closed mapping; see [`TargetType::allow_extra`].
    pub fn mapping(fields: Vec<FieldSpec>) -> Self {
        TargetType::Mapping {
            fields,
            extra_allowed: false,
        }
    }

    /// Keep undeclared fields of a mapping target (typed as `Any`).
    pub fn allow_extra(self) -> Self {
        match self {
            TargetType::Mapping { fields, .. } => TargetType::Mapping {
                fields,
                extra_allowed: true,
            },
            other => other,
        }
    }

    /// Parse the prompt notation, e.g. `{name: string, tags: list[str], age?: int}`.
    pub fn parse(notation: &str) -> Result<Self, LmonError> {
        parse_type_notation(notation).map_err(|e| LmonError::TypeNotation(e.to_string()))
    }

    /// The prompt notation for this type; `parse` reads it back.
    pub fn notation(&self) -> String {
        self.to_string()
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        match self {
            TargetType::Mapping { fields, .. } => fields.iter().find(|f| f.name == name),
            _ => None,
        }
    }

    /// Type expected for a child of this type (`key` for mappings, `index`
    /// for sequences). `None` when the child cannot exist.
    pub fn child_type(&self, key: Option<&str>, index: Option<usize>) -> Option<TargetType> {
        match self {
            TargetType::Any => Some(TargetType::Any),
            TargetType::Optional(inner) => inner.child_type(key, index),
            TargetType::Sequence(item) => index.map(|_| (**item).clone()),
            TargetType::Tuple(items) => index.and_then(|i| items.get(i).cloned()),
            TargetType::MapOf(value) => key.map(|_| (**value).clone()),
            TargetType::Mapping {
                fields,
                extra_allowed,
            } => {
                let key = key?;
                match fields.iter().find(|f| f.name == key) {
                    Some(f) => Some(f.ty.clone()),
                    None if *extra_allowed => Some(TargetType::Any),
                    None => None,
                }
            }
            TargetType::Union(members) => {
                let mut found: Vec<TargetType> = members
                    .iter()
                    .filter_map(|m| m.child_type(key, index))
                    .collect();
                match found.len() {
                    0 => None,
                    1 => found.pop(),
                    _ => Some(TargetType::Union(found)),
                }
            }
            TargetType::Scalar(_) | TargetType::Literal(_) => None,
        }
    }
}

fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_')
}

fn write_quoted(f: &mut fmt::Formatter<'_>, s: &str) -> fmt::Result {
    if s.contains('"') {
        write!(f, "'{}'", s)
    } else {
        write!(f, "\"{}\"", s)
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetType::Scalar(kind) => f.write_str(kind.name()),
            TargetType::Any => f.write_str("any"),
            TargetType::Optional(inner) => match inner.as_ref() {
                TargetType::Union(_) => write!(f, "({})?", inner),
                TargetType::Literal(v) if v.len() > 1 => write!(f, "({})?", inner),
                _ => write!(f, "{}?", inner),
            },
            TargetType::Sequence(item) => write!(f, "list[{}]", item),
            TargetType::Tuple(items) => {
                f.write_str("tuple[")?;
                for (i, t) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", t)?;
                }
                f.write_str("]")
            }
            TargetType::MapOf(value) => write!(f, "dict[str, {}]", value),
            TargetType::Literal(values) => {
                for (i, v) in values.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    write_quoted(f, v)?;
                }
                Ok(())
            }
            TargetType::Union(members) => {
                for (i, m) in members.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" | ")?;
                    }
                    match m {
                        TargetType::Union(_) => write!(f, "({})", m)?,
                        _ => write!(f, "{}", m)?,
                    }
                }
                Ok(())
            }
            TargetType::Mapping {
                fields,
                extra_allowed,
            } => {
                f.write_str("{")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    if is_plain_name(&field.name) {
                        f.write_str(&field.name)?;
                    } else {
                        write_quoted(f, &field.name)?;
                    }
                    if !field.required {
                        f.write_str("?")?;
                    }
                    write!(f, ": {}", field.ty)?;
                }
                if *extra_allowed {
                    if !fields.is_empty() {
                        f.write_str(", ")?;
                    }
                    f.write_str("...")?;
                }
                f.write_str("}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person() -> TargetType {
        TargetType::mapping(vec![
            FieldSpec::required("name", TargetType::string()),
            FieldSpec::optional("age", TargetType::optional(TargetType::integer())),
            FieldSpec::required("tags", TargetType::sequence_of(TargetType::string())),
            FieldSpec::required("first name", TargetType::literal(["a", "b"])),
        ])
        .allow_extra()
    }

    #[test]
    fn test_notation_reads_like_a_prompt() {
        assert_eq!(
            person().notation(),
            r#"{name: string, age?: int?, tags: list[string], "first name": "a" | "b", ...}"#
        );
        assert_eq!(
            TargetType::optional(TargetType::union(vec![
                TargetType::integer(),
                TargetType::string()
            ]))
            .notation(),
            "(int | string)?"
        );
        assert_eq!(
            TargetType::map_of(TargetType::Tuple(vec![TargetType::float(), TargetType::Any]))
                .notation(),
            "dict[str, tuple[float, any]]"
        );
    }

    #[test]
    fn test_notation_parses_back() {
        for ty in [
            person(),
            TargetType::union(vec![TargetType::string(), TargetType::null()]),
            TargetType::sequence_of(TargetType::optional(TargetType::literal(["x", "y"]))),
            TargetType::mapping(vec![]),
        ] {
            assert_eq!(TargetType::parse(&ty.notation()).unwrap(), ty, "{}", ty);
        }
    }

    #[test]
    fn test_child_types() {
        let p = person();
        assert_eq!(p.child_type(Some("name"), None), Some(TargetType::string()));
        assert_eq!(p.child_type(Some("other"), None), Some(TargetType::Any));
        let closed = TargetType::mapping(vec![FieldSpec::required("a", TargetType::boolean())]);
        assert_eq!(closed.child_type(Some("b"), None), None);
        let tags = p.child_type(Some("tags"), None).unwrap();
        assert_eq!(tags.child_type(None, Some(3)), Some(TargetType::string()));
    }

    #[test]
    fn test_default_makes_field_optional() {
        let f = FieldSpec::required("n", TargetType::integer()).with_default(ResolvedValue::Null);
        assert!(!f.required);
        assert_eq!(f.default, Some(ResolvedValue::Null));
    }
}
