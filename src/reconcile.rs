//! Reconciliation of repeated nested blocks.
//!
//! FortiOS returns repeated blocks (channel lists, secondary addresses,
//! trusted hosts) as plain arrays with no identity beyond field values.
//! [`merge_block`] matches each freshly fetched element against the prior
//! local list so per-element bookkeeping survives a refresh, and
//! [`dynamic_sort_subtable`] gives set-semantics blocks a canonical order.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::MapperError;
use crate::value::{compare_values, wire_scalar_key, LocalValue, WireObject};

/// One fresh wire element tagged with whether prior local state knew it.
///
/// Serializes as the wire fields plus a `tf_exist` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledElement {
    /// Shallow copy of the wire element.
    #[serde(flatten)]
    pub fields: WireObject,
    /// Whether a matching element exists in the prior local list.
    pub tf_exist: bool,
    /// Position of the matching prior element.
    #[serde(skip)]
    pub prior_index: Option<usize>,
}

impl ReconciledElement {
    fn new(fields: WireObject, prior_index: Option<usize>) -> Self {
        Self {
            fields,
            tf_exist: prior_index.is_some(),
            prior_index,
        }
    }
}

/// Match fresh wire elements against a prior local list by key.
///
/// The output has one element per fresh element, in wire order. An element
/// whose `match_key_wire` value equals the `match_key_local` value of some
/// prior element is tagged `tf_exist = true`. When several prior elements
/// share a key, the first one wins. An element without a usable key is
/// treated as new.
pub fn merge_block(
    prior: &[LocalValue],
    fresh: &[WireObject],
    match_key_wire: &str,
    match_key_local: &str,
) -> Vec<ReconciledElement> {
    let mut index: HashMap<String, usize> = HashMap::new();
    for (i, element) in prior.iter().enumerate() {
        let key = element
            .as_map()
            .and_then(|m| m.get(match_key_local))
            .and_then(LocalValue::scalar_key);
        if let Some(key) = key {
            index.entry(key).or_insert(i);
        }
    }

    fresh
        .iter()
        .enumerate()
        .map(|(i, element)| {
            let key = element.get(match_key_wire).and_then(wire_scalar_key);
            if key.is_none() {
                warn!(
                    match_key = match_key_wire,
                    index = i,
                    "list element has no usable match key; treating it as new"
                );
            }
            let prior_index = key.and_then(|k| index.get(&k).copied());
            ReconciledElement::new(element.clone(), prior_index)
        })
        .collect()
}

/// Match fresh wire elements against a prior local list by position.
pub fn reconcile_by_position(prior_len: usize, fresh: &[WireObject]) -> Vec<ReconciledElement> {
    fresh
        .iter()
        .enumerate()
        .map(|(i, element)| ReconciledElement::new(element.clone(), (i < prior_len).then_some(i)))
        .collect()
}

/// Ordering applied to set-semantics blocks after a refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SubtableSort {
    /// Ascending by the key's natural scalar ordering.
    #[default]
    #[serde(rename = "true")]
    Ascending,
    /// Ascending, with digit runs inside strings compared as numbers.
    #[serde(rename = "natural")]
    Natural,
    /// Keep the device's order.
    #[serde(rename = "false")]
    Disabled,
}

impl SubtableSort {
    /// The attribute value selecting this mode.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ascending => "true",
            Self::Natural => "natural",
            Self::Disabled => "false",
        }
    }
}

impl fmt::Display for SubtableSort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SubtableSort {
    type Err = MapperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "true" => Ok(Self::Ascending),
            "natural" => Ok(Self::Natural),
            "false" => Ok(Self::Disabled),
            other => Err(MapperError::Configuration(format!(
                "dynamic_sort_subtable must be \"true\", \"false\" or \"natural\", got {:?}",
                other
            ))),
        }
    }
}

/// Stable-sort flattened block elements by `sort_key`.
///
/// Elements missing the key sort first. Does nothing when `mode` is
/// [`SubtableSort::Disabled`].
pub fn dynamic_sort_subtable(list: &mut [LocalValue], sort_key: &str, mode: SubtableSort) {
    let natural = match mode {
        SubtableSort::Disabled => return,
        SubtableSort::Ascending => false,
        SubtableSort::Natural => true,
    };

    let key_of = |element: &LocalValue| -> LocalValue {
        element
            .as_map()
            .and_then(|m| m.get(sort_key))
            .cloned()
            .unwrap_or_default()
    };
    list.sort_by(|a, b| compare_values(&key_of(a), &key_of(b), natural));
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire_list(value: serde_json::Value) -> Vec<WireObject> {
        value
            .as_array()
            .unwrap()
            .iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect()
    }

    fn local_list(value: serde_json::Value) -> Vec<LocalValue> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_merge_block_one_new_one_existing() {
        let prior = local_list(json!([{"chan": "36"}]));
        let fresh = wire_list(json!([{"chan": "36"}, {"chan": "40"}]));

        let merged = merge_block(&prior, &fresh, "chan", "chan");
        assert_eq!(
            serde_json::to_value(&merged).unwrap(),
            json!([
                {"chan": "36", "tf_exist": true},
                {"chan": "40", "tf_exist": false}
            ])
        );
        assert_eq!(merged[0].prior_index, Some(0));
        assert_eq!(merged[1].prior_index, None);
    }

    #[test]
    fn test_merge_block_keeps_wire_order_and_length() {
        let prior = local_list(json!([{"id": 3}, {"id": 1}, {"id": 2}]));
        let fresh = wire_list(json!([{"id": 1}, {"id": 4}, {"id": 2}, {"id": 3}, {"id": 5}]));

        let merged = merge_block(&prior, &fresh, "id", "id");
        assert_eq!(merged.len(), fresh.len());
        for (out, input) in merged.iter().zip(&fresh) {
            assert_eq!(&out.fields, input);
        }
        let tags: Vec<_> = merged.iter().map(|m| m.tf_exist).collect();
        assert_eq!(tags, vec![true, false, true, true, false]);
        let indices: Vec<_> = merged.iter().map(|m| m.prior_index).collect();
        assert_eq!(indices, vec![Some(1), None, Some(2), Some(0), None]);
    }

    #[test]
    fn test_merge_block_different_key_names() {
        let prior = local_list(json!([{"trust_host": "10.0.0.0/8"}]));
        let fresh = wire_list(json!([{"trust-host": "10.0.0.0/8"}]));

        let merged = merge_block(&prior, &fresh, "trust-host", "trust_host");
        assert!(merged[0].tf_exist);
    }

    #[test]
    fn test_merge_block_numeric_keys_match_across_encodings() {
        let prior = local_list(json!([{"id": 1}]));
        let fresh = wire_list(json!([{"id": 1.0}, {"id": "1"}]));

        let merged = merge_block(&prior, &fresh, "id", "id");
        assert!(merged.iter().all(|m| m.tf_exist));
    }

    #[test]
    fn test_merge_block_missing_key_is_new() {
        let prior = local_list(json!([{"chan": "36"}, {"other": "x"}]));
        let fresh = wire_list(json!([{"other": "x"}, {"chan": null}, {"chan": {"a": 1}}]));

        let merged = merge_block(&prior, &fresh, "chan", "chan");
        assert_eq!(merged.len(), 3);
        assert!(merged.iter().all(|m| !m.tf_exist));
    }

    #[test]
    fn test_merge_block_duplicate_prior_keys_first_wins() {
        let prior = local_list(json!([{"chan": "36"}, {"chan": "36"}]));
        let fresh = wire_list(json!([{"chan": "36"}]));

        let merged = merge_block(&prior, &fresh, "chan", "chan");
        assert_eq!(merged[0].prior_index, Some(0));
    }

    #[test]
    fn test_merge_block_empty_inputs() {
        assert!(merge_block(&[], &[], "id", "id").is_empty());

        let fresh = wire_list(json!([{"id": 1}]));
        let merged = merge_block(&[], &fresh, "id", "id");
        assert_eq!(merged.len(), 1);
        assert!(!merged[0].tf_exist);
    }

    #[test]
    fn test_reconcile_by_position() {
        let fresh = wire_list(json!([{"a": 1}, {"a": 2}, {"a": 3}]));
        let merged = reconcile_by_position(2, &fresh);
        let tags: Vec<_> = merged.iter().map(|m| m.tf_exist).collect();
        assert_eq!(tags, vec![true, true, false]);
        assert_eq!(merged[1].prior_index, Some(1));
    }

    #[test]
    fn test_sort_ascending() {
        let mut list = local_list(json!([{"chan": 40}, {"chan": 36}, {"chan": 149}]));
        dynamic_sort_subtable(&mut list, "chan", SubtableSort::Ascending);
        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!([{"chan": 36}, {"chan": 40}, {"chan": 149}])
        );
    }

    #[test]
    fn test_sort_natural() {
        let mut list = local_list(json!([{"name": "port10"}, {"name": "port2"}, {"name": "port1"}]));
        dynamic_sort_subtable(&mut list, "name", SubtableSort::Ascending);
        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!([{"name": "port1"}, {"name": "port10"}, {"name": "port2"}])
        );

        dynamic_sort_subtable(&mut list, "name", SubtableSort::Natural);
        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!([{"name": "port1"}, {"name": "port2"}, {"name": "port10"}])
        );
    }

    #[test]
    fn test_sort_disabled_keeps_order() {
        let mut list = local_list(json!([{"chan": 40}, {"chan": 36}]));
        dynamic_sort_subtable(&mut list, "chan", SubtableSort::Disabled);
        assert_eq!(
            serde_json::to_value(&list).unwrap(),
            json!([{"chan": 40}, {"chan": 36}])
        );
    }

    #[test]
    fn test_sort_is_stable_and_deterministic() {
        let first = local_list(json!([
            {"k": "b", "tag": 1},
            {"k": "a", "tag": 2},
            {"k": "b", "tag": 3},
            {"tag": 4}
        ]));
        let second = local_list(json!([
            {"k": "a", "tag": 2},
            {"tag": 4},
            {"k": "b", "tag": 1},
            {"k": "b", "tag": 3}
        ]));

        let mut a = first.clone();
        let mut b = second.clone();
        dynamic_sort_subtable(&mut a, "k", SubtableSort::Ascending);
        dynamic_sort_subtable(&mut b, "k", SubtableSort::Ascending);
        assert_eq!(a, b);
        assert_eq!(
            serde_json::to_value(&a).unwrap(),
            json!([
                {"tag": 4},
                {"k": "a", "tag": 2},
                {"k": "b", "tag": 1},
                {"k": "b", "tag": 3}
            ])
        );

        let mut again = a.clone();
        dynamic_sort_subtable(&mut again, "k", SubtableSort::Ascending);
        assert_eq!(again, a);
    }

    #[test]
    fn test_subtable_sort_parse() {
        assert_eq!("true".parse::<SubtableSort>().unwrap(), SubtableSort::Ascending);
        assert_eq!("natural".parse::<SubtableSort>().unwrap(), SubtableSort::Natural);
        assert_eq!("false".parse::<SubtableSort>().unwrap(), SubtableSort::Disabled);
        assert!("yes".parse::<SubtableSort>().is_err());
        assert_eq!(SubtableSort::default(), SubtableSort::Ascending);
        assert_eq!(SubtableSort::Natural.to_string(), "natural");

        let parsed: SubtableSort = serde_json::from_value(json!("false")).unwrap();
        assert_eq!(parsed, SubtableSort::Disabled);
    }
}
