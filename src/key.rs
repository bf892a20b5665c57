//! Query key types and conversion utilities
//!
//! A [`QueryKey`] is an ordered sequence of primitive parts that identifies a
//! distinct fetchable resource, e.g. `["tasks", <access token>]`. Two keys
//! address the same cache entry iff they are equal part-for-part; a key `A`
//! matches a key `B` as a prefix iff every part of `A` equals the part at the
//! same position in `B` and `A` is no longer than `B`. Prefix matching is what
//! drives [`QueryClient::invalidate_queries`](crate::client::QueryClient::invalidate_queries).
//!
//! Keys serialize canonically (stable ordering, tagged primitive kinds, no
//! float identity), so the derived `Hash`/`Eq` used for map lookup and the
//! serialized form always agree.
//!
//! # Examples
//!
//! ```rust
//! use query_broker::{query_key, key::QueryKey};
//!
//! let key = query_key!["tasks", "tok1", 42];
//! let prefix = query_key!["tasks"];
//! assert!(key.starts_with(&prefix));
//!
//! // Single-part keys convert directly:
//! let simple: QueryKey = "leaderboard".into();
//! assert_eq!(simple.len(), 1);
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

/// One element of a query key: a tagged primitive value.
///
/// Floats are deliberately not a permitted kind; their identity is not stable
/// under serialization, which would break the canonical-form guarantee.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum KeyPart {
    /// Absent/placeholder part, serialized as `null`
    Null,
    /// Boolean part
    Bool(bool),
    /// Integer part
    Int(i64),
    /// String part
    Str(String),
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyPart::Null => write!(f, "null"),
            KeyPart::Bool(value) => write!(f, "{value}"),
            KeyPart::Int(value) => write!(f, "{value}"),
            KeyPart::Str(value) => write!(f, "{value:?}"),
        }
    }
}

/// Conversion trait for building key parts from common primitive types
///
/// This is what lets [`query_key!`](crate::query_key) and the tuple
/// conversions accept mixed-type keys without manual wrapping:
/// `query_key!["tasks", token, 7]` instead of
/// `QueryKey::new(vec![KeyPart::Str(..), KeyPart::Str(..), KeyPart::Int(7)])`.
pub trait IntoKeyPart {
    /// Convert the value into its tagged key part
    fn into_key_part(self) -> KeyPart;
}

impl IntoKeyPart for KeyPart {
    fn into_key_part(self) -> KeyPart {
        self
    }
}

impl IntoKeyPart for String {
    fn into_key_part(self) -> KeyPart {
        KeyPart::Str(self)
    }
}

impl IntoKeyPart for &str {
    fn into_key_part(self) -> KeyPart {
        KeyPart::Str(self.to_string())
    }
}

impl IntoKeyPart for bool {
    fn into_key_part(self) -> KeyPart {
        KeyPart::Bool(self)
    }
}

impl IntoKeyPart for i64 {
    fn into_key_part(self) -> KeyPart {
        KeyPart::Int(self)
    }
}

// Integer widths that embed losslessly into i64. u64/usize are deliberately
// left out: values above i64::MAX have no faithful Int form, and a silent
// wrap would collapse distinct keys.
macro_rules! int_key_part {
    ($($ty:ty),+) => {
        $(
            impl IntoKeyPart for $ty {
                fn into_key_part(self) -> KeyPart {
                    KeyPart::Int(self as i64)
                }
            }
        )+
    };
}

int_key_part!(i8, i16, i32, u8, u16, u32);

impl<T: IntoKeyPart> IntoKeyPart for Option<T> {
    fn into_key_part(self) -> KeyPart {
        match self {
            Some(value) => value.into_key_part(),
            None => KeyPart::Null,
        }
    }
}

/// An ordered sequence of [`KeyPart`]s identifying one cacheable resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QueryKey(Vec<KeyPart>);

impl QueryKey {
    /// Create a key from already-tagged parts
    pub fn new(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }

    /// The parts of this key, in order
    pub fn parts(&self) -> &[KeyPart] {
        &self.0
    }

    /// Number of parts in this key
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether this key has no parts (the match-everything prefix)
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Append one part, returning the extended key
    pub fn with(mut self, part: impl IntoKeyPart) -> Self {
        self.0.push(part.into_key_part());
        self
    }

    /// Whether `prefix` partially matches this key
    ///
    /// Every part of `prefix` must equal the part at the same position of
    /// `self`, and `prefix` must be no longer than `self`. The empty prefix
    /// matches every key.
    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        prefix.0.len() <= self.0.len()
            && prefix.0.iter().zip(self.0.iter()).all(|(a, b)| a == b)
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (index, part) in self.0.iter().enumerate() {
            if index > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{part}")?;
        }
        write!(f, "]")
    }
}

impl From<Vec<KeyPart>> for QueryKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self(parts)
    }
}

impl From<&str> for QueryKey {
    fn from(part: &str) -> Self {
        Self(vec![part.into_key_part()])
    }
}

impl From<String> for QueryKey {
    fn from(part: String) -> Self {
        Self(vec![part.into_key_part()])
    }
}

impl From<&QueryKey> for QueryKey {
    fn from(key: &QueryKey) -> Self {
        key.clone()
    }
}

impl<P: IntoKeyPart, const N: usize> From<[P; N]> for QueryKey {
    fn from(parts: [P; N]) -> Self {
        Self(parts.into_iter().map(IntoKeyPart::into_key_part).collect())
    }
}

impl<A: IntoKeyPart> From<(A,)> for QueryKey {
    fn from((a,): (A,)) -> Self {
        Self(vec![a.into_key_part()])
    }
}

impl<A: IntoKeyPart, B: IntoKeyPart> From<(A, B)> for QueryKey {
    fn from((a, b): (A, B)) -> Self {
        Self(vec![a.into_key_part(), b.into_key_part()])
    }
}

impl<A: IntoKeyPart, B: IntoKeyPart, C: IntoKeyPart> From<(A, B, C)> for QueryKey {
    fn from((a, b, c): (A, B, C)) -> Self {
        Self(vec![a.into_key_part(), b.into_key_part(), c.into_key_part()])
    }
}

impl<A: IntoKeyPart, B: IntoKeyPart, C: IntoKeyPart, D: IntoKeyPart> From<(A, B, C, D)>
    for QueryKey
{
    fn from((a, b, c, d): (A, B, C, D)) -> Self {
        Self(vec![
            a.into_key_part(),
            b.into_key_part(),
            c.into_key_part(),
            d.into_key_part(),
        ])
    }
}

/// Build a [`QueryKey`] from mixed-type parts
///
/// ```rust
/// use query_broker::query_key;
///
/// let token = "tok1".to_string();
/// let key = query_key!["tasks", token, 7];
/// assert_eq!(key.len(), 3);
/// ```
#[macro_export]
macro_rules! query_key {
    () => {
        $crate::key::QueryKey::default()
    };
    ($($part:expr),+ $(,)?) => {
        $crate::key::QueryKey::new(vec![
            $($crate::key::IntoKeyPart::into_key_part($part)),+
        ])
    };
}
