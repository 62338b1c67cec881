//! The two value spaces reconciled by the mapper.
//!
//! [`WireValue`] is the JSON exchanged with the FortiOS REST API.
//! [`LocalValue`] is what the host's configuration/state tree holds: scalar
//! leaves plus lists of maps for nested blocks.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;

/// An untyped JSON value as returned by or sent to the REST endpoint.
pub type WireValue = serde_json::Value;

/// A JSON object on the wire.
pub type WireObject = serde_json::Map<String, WireValue>;

/// One mapping in the local tree (a resource root or a nested block element).
pub type LocalObject = BTreeMap<String, LocalValue>;

/// A value held in the local configuration/state tree.
///
/// Serialized untagged, so local state converts to and from plain JSON.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LocalValue {
    /// No value.
    #[default]
    Null,
    /// A boolean.
    Bool(bool),
    /// An integer.
    Int(i64),
    /// A floating point number.
    Float(f64),
    /// A string.
    String(String),
    /// An ordered sequence; nested blocks hold [`LocalValue::Map`] elements.
    List(Vec<LocalValue>),
    /// A mapping of local keys to values.
    Map(LocalObject),
}

impl LocalValue {
    /// Short name of this value's kind, used in error messages.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "integer",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Whether this is [`LocalValue::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is the zero value of its kind.
    ///
    /// `get_ok` style lookups treat zero values as "not set".
    pub fn is_zero(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Bool(b) => !b,
            Self::Int(i) => *i == 0,
            Self::Float(f) => *f == 0.0,
            Self::String(s) => s.is_empty(),
            Self::List(l) => l.is_empty(),
            Self::Map(m) => m.is_empty(),
        }
    }

    /// Borrow the string, if this is one.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// The integer, if this is one.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Borrow the list, if this is one.
    pub fn as_list(&self) -> Option<&[LocalValue]> {
        match self {
            Self::List(l) => Some(l),
            _ => None,
        }
    }

    /// Borrow the map, if this is one.
    pub fn as_map(&self) -> Option<&LocalObject> {
        match self {
            Self::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Canonical string form of a scalar, used to match list elements.
    ///
    /// Integral floats render like integers so `36.0` matches `36` and `"36"`.
    pub fn scalar_key(&self) -> Option<String> {
        match self {
            Self::Bool(b) => Some(b.to_string()),
            Self::Int(i) => Some(i.to_string()),
            Self::Float(f) => Some(float_key(*f)),
            Self::String(s) => Some(s.clone()),
            Self::Null | Self::List(_) | Self::Map(_) => None,
        }
    }

    /// Look up a dotted path (`secondaryip.0.ip`) below this value.
    pub fn lookup(&self, path: &str) -> Option<&LocalValue> {
        if path.is_empty() {
            return Some(self);
        }
        path.split('.').try_fold(self, |current, segment| match current {
            Self::Map(map) => map.get(segment),
            Self::List(list) => segment.parse::<usize>().ok().and_then(|i| list.get(i)),
            _ => None,
        })
    }

    /// Structural conversion to JSON. Non-finite floats become `null`.
    pub fn to_wire(&self) -> WireValue {
        match self {
            Self::Null => WireValue::Null,
            Self::Bool(b) => WireValue::Bool(*b),
            Self::Int(i) => WireValue::from(*i),
            Self::Float(f) => serde_json::Number::from_f64(*f)
                .map(WireValue::Number)
                .unwrap_or(WireValue::Null),
            Self::String(s) => WireValue::String(s.clone()),
            Self::List(l) => WireValue::Array(l.iter().map(Self::to_wire).collect()),
            Self::Map(m) => WireValue::Object(
                m.iter()
                    .map(|(k, v)| (k.clone(), v.to_wire()))
                    .collect(),
            ),
        }
    }
}

impl From<&WireValue> for LocalValue {
    fn from(value: &WireValue) -> Self {
        match value {
            WireValue::Null => Self::Null,
            WireValue::Bool(b) => Self::Bool(*b),
            WireValue::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or_default()),
            },
            WireValue::String(s) => Self::String(s.clone()),
            WireValue::Array(a) => Self::List(a.iter().map(Self::from).collect()),
            WireValue::Object(o) => Self::Map(
                o.iter()
                    .map(|(k, v)| (k.clone(), Self::from(v)))
                    .collect(),
            ),
        }
    }
}

impl From<&str> for LocalValue {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for LocalValue {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<i64> for LocalValue {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<bool> for LocalValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<LocalObject> for LocalValue {
    fn from(m: LocalObject) -> Self {
        Self::Map(m)
    }
}

/// Short name of a wire value's kind, used in error messages.
pub fn wire_kind_name(value: &WireValue) -> &'static str {
    match value {
        WireValue::Null => "null",
        WireValue::Bool(_) => "bool",
        WireValue::Number(_) => "number",
        WireValue::String(_) => "string",
        WireValue::Array(_) => "array",
        WireValue::Object(_) => "object",
    }
}

/// Canonical string form of a wire scalar; see [`LocalValue::scalar_key`].
pub fn wire_scalar_key(value: &WireValue) -> Option<String> {
    match value {
        WireValue::Bool(b) => Some(b.to_string()),
        WireValue::Number(n) => match n.as_i64() {
            Some(i) => Some(i.to_string()),
            None => n.as_f64().map(float_key),
        },
        WireValue::String(s) => Some(s.clone()),
        WireValue::Null | WireValue::Array(_) | WireValue::Object(_) => None,
    }
}

fn float_key(f: f64) -> String {
    if f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        (f as i64).to_string()
    } else {
        f.to_string()
    }
}

/// Order two local values for sorting.
///
/// Kinds rank `null < bool < number < string < list < map`. Numbers compare
/// numerically. Strings compare lexically, or with digit runs compared as
/// numbers when `natural` is set.
pub fn compare_values(a: &LocalValue, b: &LocalValue, natural: bool) -> Ordering {
    fn rank(v: &LocalValue) -> u8 {
        match v {
            LocalValue::Null => 0,
            LocalValue::Bool(_) => 1,
            LocalValue::Int(_) | LocalValue::Float(_) => 2,
            LocalValue::String(_) => 3,
            LocalValue::List(_) => 4,
            LocalValue::Map(_) => 5,
        }
    }

    match (a, b) {
        (LocalValue::Bool(x), LocalValue::Bool(y)) => x.cmp(y),
        (LocalValue::Int(x), LocalValue::Int(y)) => x.cmp(y),
        (LocalValue::Int(x), LocalValue::Float(y)) => {
            (*x as f64).partial_cmp(y).unwrap_or(Ordering::Equal)
        },
        (LocalValue::Float(x), LocalValue::Int(y)) => {
            x.partial_cmp(&(*y as f64)).unwrap_or(Ordering::Equal)
        },
        (LocalValue::Float(x), LocalValue::Float(y)) => {
            x.partial_cmp(y).unwrap_or(Ordering::Equal)
        },
        (LocalValue::String(x), LocalValue::String(y)) if natural => natural_cmp(x, y),
        (LocalValue::String(x), LocalValue::String(y)) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

/// Compare strings treating runs of ASCII digits as numbers (`port2 < port10`).
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let mut left = a.chars().peekable();
    let mut right = b.chars().peekable();

    loop {
        match (left.peek().copied(), right.peek().copied()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(x), Some(y)) if x.is_ascii_digit() && y.is_ascii_digit() => {
                let run_a = take_digits(&mut left);
                let run_b = take_digits(&mut right);
                let trimmed_a = run_a.trim_start_matches('0');
                let trimmed_b = run_b.trim_start_matches('0');
                let ord = trimmed_a
                    .len()
                    .cmp(&trimmed_b.len())
                    .then_with(|| trimmed_a.cmp(trimmed_b))
                    .then_with(|| run_a.len().cmp(&run_b.len()));
                if ord != Ordering::Equal {
                    return ord;
                }
            },
            (Some(x), Some(y)) => {
                if x != y {
                    return x.cmp(&y);
                }
                left.next();
                right.next();
            },
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut run = String::new();
    while let Some(c) = chars.peek().copied() {
        if !c.is_ascii_digit() {
            break;
        }
        run.push(c);
        chars.next();
    }
    run
}
