use std::fmt;
use std::str::FromStr;

/// A committed value tree: every ambiguity collapsed, every delimiter closed.
///
/// Objects keep insertion order; keys are unique.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedValue {
    Object(Vec<(String, ResolvedValue)>),
    Array(Vec<ResolvedValue>),
    String(String),
    Number(Number),
    Boolean(bool),
    Null,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Number {
    Integer(i64),
    Float(f64),
}

impl Number {
    pub fn is_i64(&self) -> bool {
        matches!(self, Self::Integer(_))
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            Self::Float(f) if f.fract() == 0.0 && f.is_finite() && f.abs() < 9.2e18 => {
                Some(*f as i64)
            }
            _ => None,
        }
    }

    pub fn as_f64(&self) -> f64 {
        match self {
            Self::Integer(i) => *i as f64,
            Self::Float(f) => *f,
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Integer(i) => write!(f, "{}", i),
            Number::Float(n) => {
                let s = n.to_string();
                // Ensure float numbers are formatted with a decimal point
                if n.is_finite() && !s.contains('.') && !s.contains('e') {
                    write!(f, "{}.0", s)
                } else {
                    write!(f, "{}", s)
                }
            }
        }
    }
}

impl fmt::Display for ResolvedValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResolvedValue::Object(entries) => {
                f.write_str("{")?;
                for (i, (key, value)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", serde_json::Value::String(key.clone()), value)?;
                }
                f.write_str("}")
            }
            ResolvedValue::Array(items) => {
                f.write_str("[")?;
                for (i, value) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                f.write_str("]")
            }
            ResolvedValue::String(s) => write!(f, "{}", serde_json::Value::String(s.clone())),
            ResolvedValue::Number(n) => write!(f, "{}", n),
            ResolvedValue::Boolean(b) => write!(f, "{}", b),
            ResolvedValue::Null => f.write_str("null"),
        }
    }
}

impl ResolvedValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ResolvedValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<ResolvedValue>> {
        match self {
            ResolvedValue::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Vec<(String, ResolvedValue)>> {
        match self {
            ResolvedValue::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_number(&self) -> Option<&Number> {
        match self {
            ResolvedValue::Number(n) => Some(n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            ResolvedValue::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, ResolvedValue::Null)
    }

    /// Short shape name used in mismatch messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ResolvedValue::Object(_) => "object",
            ResolvedValue::Array(_) => "array",
            ResolvedValue::String(_) => "string",
            ResolvedValue::Number(_) => "number",
            ResolvedValue::Boolean(_) => "bool",
            ResolvedValue::Null => "null",
        }
    }

    /// Borrow a child value by object key or array index.
    pub fn get<K: ValueIndex>(&self, key: K) -> Option<&ResolvedValue> {
        key.at(self)
    }

    pub fn get_path(&self, path: &Path) -> Option<&ResolvedValue> {
        path.items().iter().try_fold(self, |node, item| match item {
            PathItem::Key(k) => node.get(k.as_str()),
            PathItem::Index(i) => node.get(*i),
        })
    }

    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            ResolvedValue::Object(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            ResolvedValue::Array(items) => Value::Array(items.iter().map(|v| v.to_json()).collect()),
            ResolvedValue::String(s) => Value::String(s.clone()),
            ResolvedValue::Number(Number::Integer(i)) => Value::from(*i),
            // NaN and infinities have no JSON spelling
            ResolvedValue::Number(Number::Float(f)) => serde_json::Number::from_f64(*f)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            ResolvedValue::Boolean(b) => Value::Bool(*b),
            ResolvedValue::Null => Value::Null,
        }
    }
}

impl From<&serde_json::Value> for ResolvedValue {
    fn from(v: &serde_json::Value) -> Self {
        use serde_json::Value;
        match v {
            Value::Null => ResolvedValue::Null,
            Value::Bool(b) => ResolvedValue::Boolean(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => ResolvedValue::Number(Number::Integer(i)),
                None => ResolvedValue::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Value::String(s) => ResolvedValue::String(s.clone()),
            Value::Array(a) => ResolvedValue::Array(a.iter().map(ResolvedValue::from).collect()),
            Value::Object(o) => ResolvedValue::Object(
                o.iter()
                    .map(|(k, v)| (k.clone(), ResolvedValue::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<ResolvedValue> for serde_json::Value {
    fn from(v: ResolvedValue) -> Self {
        v.to_json()
    }
}

/* ------------------------------------------------------------------ */
/*  Generic “key” helper                                              */
/* ------------------------------------------------------------------ */

/// Anything that can address a child inside a `ResolvedValue`.
///
/// * `&str`  → object key
/// * `usize` → array index
pub trait ValueIndex {
    fn at<'v>(self, parent: &'v ResolvedValue) -> Option<&'v ResolvedValue>;
}

impl ValueIndex for &str {
    fn at<'v>(self, parent: &'v ResolvedValue) -> Option<&'v ResolvedValue> {
        match parent {
            ResolvedValue::Object(entries) => entries.iter().find(|(k, _)| k == self).map(|(_, v)| v),
            _ => None,
        }
    }
}

impl ValueIndex for usize {
    fn at<'v>(self, parent: &'v ResolvedValue) -> Option<&'v ResolvedValue> {
        match parent {
            ResolvedValue::Array(items) => items.get(self),
            _ => None,
        }
    }
}

/* ------------------------------------------------------------------ */
/*  Paths                                                             */
/* ------------------------------------------------------------------ */

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathItem {
    Key(String),
    Index(usize),
}

/// Location of a node below the root, written `.name[2].street`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Path(Vec<PathItem>);

impl Path {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn new(items: Vec<PathItem>) -> Self {
        Self(items)
    }

    pub fn items(&self) -> &[PathItem] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn push(&mut self, item: PathItem) {
        self.0.push(item);
    }

    pub fn pop(&mut self) -> Option<PathItem> {
        self.0.pop()
    }

    pub fn child(&self, item: PathItem) -> Self {
        let mut items = self.0.clone();
        items.push(item);
        Self(items)
    }

    /// True when `self` is `other` or lies underneath it.
    pub fn starts_with(&self, other: &Path) -> bool {
        self.0.starts_with(&other.0)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str(".");
        }
        for item in &self.0 {
            match item {
                PathItem::Key(k) => write!(f, ".{}", k)?,
                PathItem::Index(i) => write!(f, "[{}]", i)?,
            }
        }
        Ok(())
    }
}

impl FromStr for Path {
    type Err = String;

    /// Accepts `.`, `$`, `.a.b[0]`, `a.b`, `$.a[1][2]`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let s = s.strip_prefix('$').unwrap_or(s);
        let mut items = Vec::new();
        let mut rest = s;

        while !rest.is_empty() {
            if let Some(after) = rest.strip_prefix('[') {
                let close = after
                    .find(']')
                    .ok_or_else(|| format!("unclosed '[' in path {:?}", s))?;
                let idx = after[..close]
                    .trim()
                    .parse::<usize>()
                    .map_err(|_| format!("bad index {:?} in path {:?}", &after[..close], s))?;
                items.push(PathItem::Index(idx));
                rest = &after[close + 1..];
                continue;
            }
            let body = rest.strip_prefix('.').unwrap_or(rest);
            let end = body.find(['.', '[']).unwrap_or(body.len());
            let key = &body[..end];
            if !key.is_empty() {
                items.push(PathItem::Key(key.to_string()));
            } else if end == body.len() && !items.is_empty() {
                return Err(format!("trailing '.' in path {:?}", s));
            }
            rest = &body[end..];
        }
        Ok(Self(items))
    }
}
