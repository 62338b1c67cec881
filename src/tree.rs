//! The local configuration/state tree.
//!
//! [`ConfigTree`] is the contract the mapper reads prior values through and
//! the dispatcher writes results through. [`ResourceData`] implements it for
//! one resource instance, holding the prior state next to the current values
//! so `has_change` can compare them.
//!
//! Paths are dotted, with numeric list indices: `secondaryip.0.ip`.

use serde_json::Value;

use crate::error::MapperError;
use crate::value::{LocalObject, LocalValue};

/// Local attribute holding the object identifier.
pub const ID_KEY: &str = "id";

/// Local attribute overriding the provider's default vdom.
pub const VDOMPARAM_KEY: &str = "vdomparam";

/// Local attribute overriding the provider's subtable sort mode.
pub const SORT_MODE_KEY: &str = "dynamic_sort_subtable";

/// Read/write access to a local configuration/state tree.
pub trait ConfigTree {
    /// The value at `path`, if any.
    fn get(&self, path: &str) -> Option<&LocalValue>;

    /// The value at `path` if it is set to a non-zero value.
    fn get_ok(&self, path: &str) -> Option<&LocalValue> {
        self.get(path).filter(|v| !v.is_zero())
    }

    /// The value at `path` if it is set, zero values included.
    fn get_ok_exists(&self, path: &str) -> Option<&LocalValue> {
        self.get(path).filter(|v| !v.is_null())
    }

    /// Write `value` at `path`. The parent of `path` must exist.
    fn set(&mut self, path: &str, value: LocalValue) -> Result<(), MapperError>;

    /// Whether the value at `path` differs from prior state.
    fn has_change(&self, path: &str) -> bool;
}

/// State of one resource instance during a CRUD call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResourceData {
    id: Option<String>,
    prior: LocalObject,
    values: LocalObject,
}

impl ResourceData {
    /// Create from prior state and current (planned or refreshed) values.
    ///
    /// The id comes from the `id` attribute of `values`, falling back to `prior`.
    pub fn new(mut prior: LocalObject, mut values: LocalObject) -> Self {
        let prior_id = take_id(&mut prior);
        let id = take_id(&mut values).or(prior_id);
        Self { id, prior, values }
    }

    /// Create from a single state with no pending changes.
    pub fn from_state(state: LocalObject) -> Self {
        Self::new(state.clone(), state)
    }

    /// Create from JSON state. `null` is treated as an empty object.
    pub fn from_json(prior: Option<&Value>, values: &Value) -> Result<Self, MapperError> {
        let prior = match prior {
            Some(prior) => json_object(prior)?,
            None => LocalObject::new(),
        };
        Ok(Self::new(prior, json_object(values)?))
    }

    /// The object identifier, if the object exists.
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Set the object identifier.
    pub fn set_id(&mut self, id: impl Into<String>) {
        self.id = Some(id.into());
    }

    /// Forget the object identifier, marking the object as gone.
    pub fn clear_id(&mut self) {
        self.id = None;
    }

    /// Current values.
    pub fn values(&self) -> &LocalObject {
        &self.values
    }

    /// Current values as JSON, with the id under [`ID_KEY`].
    pub fn to_json(&self) -> Value {
        let mut state = self.values.clone();
        if let Some(id) = &self.id {
            state.insert(ID_KEY.to_string(), LocalValue::String(id.clone()));
        }
        LocalValue::Map(state).to_wire()
    }
}

impl ConfigTree for ResourceData {
    fn get(&self, path: &str) -> Option<&LocalValue> {
        lookup(&self.values, path)
    }

    fn set(&mut self, path: &str, value: LocalValue) -> Result<(), MapperError> {
        let invalid = || MapperError::InvalidPath(path.to_string());
        let (parent, last) = match path.rsplit_once('.') {
            Some((parent, last)) => (Some(parent), last),
            None => (None, path),
        };
        if last.is_empty() {
            return Err(invalid());
        }

        let Some(parent) = parent else {
            self.values.insert(last.to_string(), value);
            return Ok(());
        };

        match lookup_mut(&mut self.values, parent).ok_or_else(invalid)? {
            LocalValue::Map(map) => {
                map.insert(last.to_string(), value);
                Ok(())
            },
            LocalValue::List(list) => {
                let index: usize = last.parse().map_err(|_| invalid())?;
                let slot = list.get_mut(index).ok_or_else(invalid)?;
                *slot = value;
                Ok(())
            },
            _ => Err(invalid()),
        }
    }

    fn has_change(&self, path: &str) -> bool {
        // Absent and zero values are the same "unset".
        let before = lookup(&self.prior, path).filter(|v| !v.is_zero());
        let after = lookup(&self.values, path).filter(|v| !v.is_zero());
        before != after
    }
}

fn take_id(object: &mut LocalObject) -> Option<String> {
    match object.remove(ID_KEY) {
        Some(LocalValue::String(id)) if !id.is_empty() => Some(id),
        _ => None,
    }
}

fn json_object(value: &Value) -> Result<LocalObject, MapperError> {
    match value {
        Value::Null => Ok(LocalObject::new()),
        Value::Object(_) => Ok(serde_json::from_value(value.clone())?),
        _ => Err(MapperError::Validation(
            "resource state must be an object".to_string(),
        )),
    }
}

fn lookup<'a>(root: &'a LocalObject, path: &str) -> Option<&'a LocalValue> {
    let (head, rest) = path.split_once('.').unwrap_or((path, ""));
    root.get(head)?.lookup(rest)
}

fn lookup_mut<'a>(root: &'a mut LocalObject, path: &str) -> Option<&'a mut LocalValue> {
    let mut segments = path.split('.');
    let mut current = root.get_mut(segments.next()?)?;
    for segment in segments {
        current = match current {
            LocalValue::Map(map) => map.get_mut(segment)?,
            LocalValue::List(list) => list.get_mut(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}
