//! Record features and opaque tokens.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::Value;

static NEXT_TOKEN: AtomicU64 = AtomicU64::new(1);

/// An unforgeable value, equal only to itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Token(u64);

impl Token {
    /// Mint a token distinct from every other token in this process.
    pub fn fresh() -> Self {
        Token(NEXT_TOKEN.fetch_add(1, Ordering::Relaxed))
    }

    #[inline]
    pub fn id(self) -> u64 {
        self.0
    }
}

/// The key of a record field.
///
/// The derived ordering is the record field order: every string sorts before
/// every integer, integers before booleans, then the end-of-file marker,
/// null, and tokens. Within a kind the natural order applies. Variant order
/// is therefore load-bearing.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    Str(Arc<str>),
    Int(i64),
    Bool(bool),
    Eof,
    Null,
    Token(Token),
}

impl Feature {
    pub fn str(s: &str) -> Self {
        Feature::Str(Arc::from(s))
    }

    /// Interpret a resolved scalar as a feature.
    ///
    /// Returns `None` for values that cannot key a record (floats, chars,
    /// composites, unbound cells).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Str(s) => Some(Feature::Str(s.clone())),
            Value::Int(n) => Some(Feature::Int(*n)),
            Value::Bool(b) => Some(Feature::Bool(*b)),
            Value::Eof => Some(Feature::Eof),
            Value::Null => Some(Feature::Null),
            Value::Token(t) => Some(Feature::Token(*t)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Feature::Str(s) => Value::Str(s.clone()),
            Feature::Int(n) => Value::Int(*n),
            Feature::Bool(b) => Value::Bool(*b),
            Feature::Eof => Value::Eof,
            Feature::Null => Value::Null,
            Feature::Token(t) => Value::Token(*t),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Feature::Str(s) => Some(s),
            _ => None,
        }
    }
}

impl From<&str> for Feature {
    fn from(s: &str) -> Self {
        Feature::str(s)
    }
}

impl From<i64> for Feature {
    fn from(n: i64) -> Self {
        Feature::Int(n)
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Feature::Str(s) => f.write_str(s),
            Feature::Int(n) => write!(f, "{n}"),
            Feature::Bool(b) => write!(f, "{b}"),
            Feature::Eof => f.write_str("eof"),
            Feature::Null => f.write_str("null"),
            Feature::Token(t) => write!(f, "<token {}>", t.0),
        }
    }
}
