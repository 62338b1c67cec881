//! The generic flatten/expand engine.
//!
//! A [`FieldMapper`] walks a [`FieldSpec`] table and converts a whole object
//! between its wire form and its local form. Prior local values (needed for
//! CIDR normalization, sensitive fields and list reconciliation) are read
//! from the [`ConfigTree`] the mapper is built with.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MapperError;
use crate::naming;
use crate::reconcile::{dynamic_sort_subtable, merge_block, reconcile_by_position, SubtableSort};
use crate::scalar::{expand_scalar, flatten_scalar};
use crate::schema::{FieldKind, FieldSpec, ListOptions, ScalarKind};
use crate::tree::ConfigTree;
use crate::value::{wire_kind_name, LocalObject, LocalValue, WireObject, WireValue};

/// Knobs the operator can turn per call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MapperOptions {
    /// Ordering applied to set-semantics blocks after a refresh.
    pub sort: SubtableSort,
}

/// Result of flattening a whole object.
///
/// On a type mismatch, flattening stops: `values` holds the fields flattened
/// before the failure and `error` names the failing field.
#[derive(Debug)]
pub struct Assembly {
    /// Flattened top-level values, keyed by local key.
    pub values: LocalObject,
    /// The error that stopped assembly, if any.
    pub error: Option<MapperError>,
}

impl Assembly {
    /// Whether every field was flattened.
    pub fn is_complete(&self) -> bool {
        self.error.is_none()
    }

    /// The values, or the error if assembly stopped early.
    pub fn into_result(self) -> Result<LocalObject, MapperError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.values),
        }
    }
}

/// Converts objects between wire and local form, driven by a field table.
pub struct FieldMapper<'a, T: ConfigTree + ?Sized> {
    tree: &'a T,
    options: MapperOptions,
}

impl<'a, T: ConfigTree + ?Sized> FieldMapper<'a, T> {
    /// Create a mapper reading prior values from `tree`.
    pub fn new(tree: &'a T, options: MapperOptions) -> Self {
        Self { tree, options }
    }

    /// The options this mapper was built with.
    pub fn options(&self) -> MapperOptions {
        self.options
    }

    // =========================================================================
    // Flatten (wire -> local)
    // =========================================================================

    /// Flatten a wire object into top-level local values.
    ///
    /// Fields absent from `wire` are skipped, leaving whatever the tree holds.
    pub fn flatten_object(&self, fields: &[FieldSpec], wire: &WireObject) -> Assembly {
        let mut values = LocalObject::new();
        for field in fields {
            let Some(value) = wire.get(&field.wire_key) else {
                continue;
            };
            let path = field.local_key.as_str();
            match self.flatten_field(field, value, path, Some(path)) {
                Ok(local) => {
                    values.insert(field.local_key.clone(), local);
                },
                Err(err) => {
                    return Assembly {
                        values,
                        error: Some(err),
                    }
                },
            }
        }
        Assembly {
            values,
            error: None,
        }
    }

    /// Flatten one field.
    ///
    /// `path` is where the result lands (used in errors). `prior_path` is
    /// where the prior value for the same field lives in the tree, or `None`
    /// when the field has no prior counterpart.
    pub fn flatten_field(
        &self,
        field: &FieldSpec,
        wire: &WireValue,
        path: &str,
        prior_path: Option<&str>,
    ) -> Result<LocalValue, MapperError> {
        match &field.kind {
            FieldKind::Scalar(kind) => {
                let prior = prior_path.and_then(|p| self.tree.get(p));
                flatten_scalar(*kind, wire, prior, field.is_sensitive(), path)
            },
            FieldKind::NestedObject => self.flatten_singleton(field, wire, path, prior_path),
            FieldKind::NestedList(options) => {
                self.flatten_list(field, options, wire, path, prior_path)
            },
        }
    }

    fn flatten_singleton(
        &self,
        field: &FieldSpec,
        wire: &WireValue,
        path: &str,
        prior_path: Option<&str>,
    ) -> Result<LocalValue, MapperError> {
        match wire {
            WireValue::Null => Ok(LocalValue::List(Vec::new())),
            WireValue::Object(object) => {
                let element_path = format!("{}.0", path);
                let element_prior = prior_path.map(|p| format!("{}.0", p));
                let map = self.flatten_children(
                    &field.children,
                    object,
                    &element_path,
                    element_prior.as_deref(),
                )?;
                Ok(LocalValue::List(vec![LocalValue::Map(map)]))
            },
            other => Err(MapperError::type_mismatch(
                path,
                "object",
                wire_kind_name(other),
            )),
        }
    }

    fn flatten_list(
        &self,
        field: &FieldSpec,
        options: &ListOptions,
        wire: &WireValue,
        path: &str,
        prior_path: Option<&str>,
    ) -> Result<LocalValue, MapperError> {
        let items = match wire {
            WireValue::Null => return Ok(LocalValue::List(Vec::new())),
            WireValue::Array(items) => items,
            other => {
                return Err(MapperError::type_mismatch(
                    path,
                    "list",
                    wire_kind_name(other),
                ))
            },
        };

        let fresh = items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                item.as_object().cloned().ok_or_else(|| {
                    MapperError::type_mismatch(
                        format!("{}.{}", path, i),
                        "object",
                        wire_kind_name(item),
                    )
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let prior = prior_path
            .and_then(|p| self.tree.get(p))
            .and_then(LocalValue::as_list)
            .unwrap_or_default();

        let reconciled = match &options.match_key {
            Some(wire_key) => {
                let local_key = field
                    .child(wire_key)
                    .map(|c| c.local_key.clone())
                    .unwrap_or_else(|| naming::wire_to_local(wire_key));
                merge_block(prior, &fresh, wire_key, &local_key)
            },
            None => reconcile_by_position(prior.len(), &fresh),
        };

        let mut elements = Vec::with_capacity(reconciled.len());
        for (i, element) in reconciled.iter().enumerate() {
            let element_path = format!("{}.{}", path, i);
            let element_prior = match (prior_path, element.prior_index) {
                (Some(p), Some(j)) if element.tf_exist => Some(format!("{}.{}", p, j)),
                _ => None,
            };
            let map = self.flatten_children(
                &field.children,
                &element.fields,
                &element_path,
                element_prior.as_deref(),
            )?;
            elements.push(LocalValue::Map(map));
        }

        if options.set {
            if let Some(sort_key) = &options.sort_key {
                debug!(field = %path, sort_key = %sort_key, mode = %self.options.sort, "sorting subtable");
                dynamic_sort_subtable(&mut elements, sort_key, self.options.sort);
            }
        }

        Ok(LocalValue::List(elements))
    }

    fn flatten_children(
        &self,
        children: &[FieldSpec],
        wire: &WireObject,
        path: &str,
        prior_path: Option<&str>,
    ) -> Result<LocalObject, MapperError> {
        let mut map = LocalObject::new();
        for child in children {
            let child_path = format!("{}.{}", path, child.local_key);
            let child_prior = prior_path.map(|p| format!("{}.{}", p, child.local_key));
            match wire.get(&child.wire_key) {
                Some(value) => {
                    let local =
                        self.flatten_field(child, value, &child_path, child_prior.as_deref())?;
                    map.insert(child.local_key.clone(), local);
                },
                // The device never echoes secrets; keep what we knew.
                None if child.is_sensitive() => {
                    let prior = child_prior
                        .as_deref()
                        .and_then(|p| self.tree.get(p))
                        .filter(|v| !v.is_zero());
                    if let Some(prior) = prior {
                        map.insert(child.local_key.clone(), prior.clone());
                    }
                },
                None => {},
            }
        }
        Ok(map)
    }

    // =========================================================================
    // Expand (local -> wire)
    // =========================================================================

    /// Expand the tree's top-level values into a wire object.
    ///
    /// Unset fields are omitted, unless the tree reports the field was
    /// cleared: then `null` is sent (an empty array for repeated blocks).
    /// Computed-only fields are never sent.
    pub fn expand_object(&self, fields: &[FieldSpec]) -> Result<WireObject, MapperError> {
        let mut object = WireObject::new();
        for field in fields.iter().filter(|f| is_writable(f)) {
            let path = field.local_key.as_str();
            let present = match &field.kind {
                FieldKind::Scalar(ScalarKind::Integer | ScalarKind::Float | ScalarKind::Bool) => {
                    self.tree.get_ok_exists(path)
                },
                _ => self.tree.get_ok(path),
            };

            match present {
                Some(local) => {
                    if let Some(wire) = self.expand_field(field, local, path)? {
                        object.insert(field.wire_key.clone(), wire);
                    }
                },
                None if self.tree.has_change(path) => {
                    object.insert(field.wire_key.clone(), cleared(field));
                },
                None => {},
            }
        }
        Ok(object)
    }

    /// Expand one local value. `None` means the field is omitted.
    pub fn expand_field(
        &self,
        field: &FieldSpec,
        local: &LocalValue,
        path: &str,
    ) -> Result<Option<WireValue>, MapperError> {
        match (&field.kind, local) {
            (FieldKind::Scalar(kind), _) => expand_scalar(*kind, local, path).map(Some),
            (FieldKind::NestedObject, LocalValue::List(items)) => match items.first() {
                None => Ok(None),
                Some(element) => {
                    let element_path = format!("{}.0", path);
                    self.expand_element(field, element, &element_path)
                        .map(|object| Some(WireValue::Object(object)))
                },
            },
            (FieldKind::NestedObject, LocalValue::Map(_)) => self
                .expand_element(field, local, path)
                .map(|object| Some(WireValue::Object(object))),
            (FieldKind::NestedList(_), LocalValue::List(items)) => {
                let mut array = Vec::with_capacity(items.len());
                for (i, element) in items.iter().enumerate() {
                    let element_path = format!("{}.{}", path, i);
                    let object = self.expand_element(field, element, &element_path)?;
                    array.push(WireValue::Object(object));
                }
                Ok(Some(WireValue::Array(array)))
            },
            (_, LocalValue::Null) => Ok(None),
            _ => Err(MapperError::type_mismatch(
                path,
                field.kind_name(),
                local.kind_name(),
            )),
        }
    }

    fn expand_element(
        &self,
        field: &FieldSpec,
        element: &LocalValue,
        path: &str,
    ) -> Result<WireObject, MapperError> {
        let map = element
            .as_map()
            .ok_or_else(|| MapperError::type_mismatch(path, "map", element.kind_name()))?;

        let mut object = WireObject::new();
        for child in field.children.iter().filter(|c| is_writable(c)) {
            let Some(local) = map.get(&child.local_key).filter(|v| !v.is_null()) else {
                continue;
            };
            let child_path = format!("{}.{}", path, child.local_key);
            if let Some(wire) = self.expand_field(child, local, &child_path)? {
                object.insert(child.wire_key.clone(), wire);
            }
        }
        Ok(object)
    }
}

fn is_writable(field: &FieldSpec) -> bool {
    field.flags.required || field.flags.optional || !field.flags.computed
}

fn cleared(field: &FieldSpec) -> WireValue {
    match field.kind {
        FieldKind::NestedList(_) => WireValue::Array(Vec::new()),
        _ => WireValue::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::ResourceData;
    use serde_json::{json, Value};

    fn interface_fields() -> Vec<FieldSpec> {
        vec![
            FieldSpec::string("name").required(),
            FieldSpec::integer("vlanid"),
            FieldSpec::ipmask("ip"),
            FieldSpec::string("alias"),
            FieldSpec::string("password").sensitive(),
            FieldSpec::object(
                "dhcp-relay",
                vec![FieldSpec::string("server"), FieldSpec::integer("port")],
            ),
            FieldSpec::list(
                "secondaryip",
                vec![
                    FieldSpec::integer("id"),
                    FieldSpec::ipmask("ip"),
                    FieldSpec::string("secret").sensitive(),
                ],
            )
            .with_match_key("id"),
            FieldSpec::set("channel", vec![FieldSpec::string("chan")])
                .with_match_key("chan")
                .with_sort_key("chan"),
            FieldSpec::string("status").computed(),
        ]
    }

    fn tree(prior: Value, values: Value) -> ResourceData {
        ResourceData::from_json(Some(&prior), &values).unwrap()
    }

    fn wire(value: Value) -> WireObject {
        value.as_object().unwrap().clone()
    }

    fn flatten(tree: &ResourceData, fields: &[FieldSpec], object: Value) -> Value {
        let mapper = FieldMapper::new(tree, MapperOptions::default());
        let values = mapper.flatten_object(fields, &wire(object)).into_result().unwrap();
        LocalValue::Map(values).to_wire()
    }

    #[test]
    fn test_scalar_passthrough_scenario() {
        let fields = vec![FieldSpec::string("hostname")];
        let t = tree(json!({}), json!({}));
        assert_eq!(
            flatten(&t, &fields, json!({"hostname": "fw01"})),
            json!({"hostname": "fw01"})
        );

        let t = tree(json!({}), json!({"hostname": "fw01"}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        assert_eq!(
            Value::Object(mapper.expand_object(&fields).unwrap()),
            json!({"hostname": "fw01"})
        );
    }

    #[test]
    fn test_integer_coercion_scenario() {
        let t = tree(json!({}), json!({}));
        assert_eq!(
            flatten(&t, &interface_fields(), json!({"vlanid": 100.0})),
            json!({"vlanid": 100})
        );
    }

    #[test]
    fn test_cidr_uses_tree_prior() {
        let t = tree(json!({}), json!({"ip": "10.0.0.1/24"}));
        assert_eq!(
            flatten(&t, &interface_fields(), json!({"ip": "10.0.0.1 255.255.255.0"})),
            json!({"ip": "10.0.0.1/24"})
        );
    }

    #[test]
    fn test_absent_wire_fields_are_skipped() {
        let t = tree(json!({}), json!({}));
        let out = flatten(&t, &interface_fields(), json!({"name": "port1", "unknown": 1}));
        assert_eq!(out, json!({"name": "port1"}));
    }

    #[test]
    fn test_singleton_flatten() {
        let t = tree(json!({}), json!({}));
        let out = flatten(
            &t,
            &interface_fields(),
            json!({"dhcp-relay": {"server": "10.0.0.5", "port": 67.0, "extra": true}}),
        );
        assert_eq!(
            out,
            json!({"dhcp_relay": [{"server": "10.0.0.5", "port": 67}]})
        );

        let out = flatten(&t, &interface_fields(), json!({"dhcp-relay": {"port": 67}}));
        assert_eq!(out, json!({"dhcp_relay": [{"port": 67}]}));
    }

    #[test]
    fn test_null_nested_values_flatten_to_empty() {
        let t = tree(json!({}), json!({}));
        let out = flatten(
            &t,
            &interface_fields(),
            json!({"dhcp-relay": null, "secondaryip": null, "channel": null}),
        );
        assert_eq!(
            out,
            json!({"dhcp_relay": [], "secondaryip": [], "channel": []})
        );
    }

    #[test]
    fn test_nested_type_mismatch() {
        let t = tree(json!({}), json!({}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());

        let err = mapper
            .flatten_object(&interface_fields(), &wire(json!({"dhcp-relay": "x"})))
            .into_result()
            .unwrap_err();
        assert_eq!(err.message(), "dhcp_relay");

        let err = mapper
            .flatten_object(&interface_fields(), &wire(json!({"secondaryip": [{"id": 1}, 5]})))
            .into_result()
            .unwrap_err();
        assert_eq!(err.message(), "secondaryip.1");

        let err = mapper
            .flatten_object(
                &interface_fields(),
                &wire(json!({"secondaryip": [{"id": "one"}]})),
            )
            .into_result()
            .unwrap_err();
        assert_eq!(err.message(), "secondaryip.0.id");
    }

    #[test]
    fn test_partial_assembly_on_mismatch() {
        let fields = vec![
            FieldSpec::string("hostname"),
            FieldSpec::integer("vlanid"),
            FieldSpec::string("alias"),
        ];
        let t = tree(json!({}), json!({}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let assembly = mapper.flatten_object(
            &fields,
            &wire(json!({"hostname": "fw01", "vlanid": "abc", "alias": "lan"})),
        );

        assert!(!assembly.is_complete());
        assert_eq!(assembly.values.len(), 1);
        assert_eq!(assembly.values["hostname"], LocalValue::from("fw01"));
        assert!(matches!(
            assembly.error,
            Some(MapperError::TypeMismatch { ref path, .. }) if path == "vlanid"
        ));
    }

    #[test]
    fn test_list_reconciliation_uses_prior_for_existing_elements() {
        let t = tree(
            json!({}),
            json!({"secondaryip": [
                {"id": 2, "ip": "10.0.2.1/24", "secret": "two"},
                {"id": 1, "ip": "10.0.1.1/24", "secret": "one"}
            ]}),
        );
        let out = flatten(
            &t,
            &interface_fields(),
            json!({"secondaryip": [
                {"id": 1, "ip": "10.0.1.1 255.255.255.0"},
                {"id": 3, "ip": "10.0.3.1 255.255.255.0"},
                {"id": 2, "ip": "10.0.2.1 255.255.0.0"}
            ]}),
        );

        // Wire order wins; existing elements are normalized against their
        // matched prior element, new ones are taken verbatim.
        assert_eq!(
            out,
            json!({"secondaryip": [
                {"id": 1, "ip": "10.0.1.1/24", "secret": "one"},
                {"id": 3, "ip": "10.0.3.1 255.255.255.0"},
                {"id": 2, "ip": "10.0.2.1/16", "secret": "two"}
            ]})
        );
    }

    #[test]
    fn test_set_sorted_by_key() {
        let t = tree(json!({}), json!({"channel": [{"chan": "40"}]}));
        let out = flatten(
            &t,
            &interface_fields(),
            json!({"channel": [{"chan": "44"}, {"chan": "36"}, {"chan": "40"}]}),
        );
        assert_eq!(
            out,
            json!({"channel": [{"chan": "36"}, {"chan": "40"}, {"chan": "44"}]})
        );
    }

    #[test]
    fn test_set_sort_disabled() {
        let t = tree(json!({}), json!({}));
        let mapper = FieldMapper::new(
            &t,
            MapperOptions {
                sort: SubtableSort::Disabled,
            },
        );
        let values = mapper
            .flatten_object(
                &interface_fields(),
                &wire(json!({"channel": [{"chan": "44"}, {"chan": "36"}]})),
            )
            .into_result()
            .unwrap();
        assert_eq!(
            LocalValue::Map(values).to_wire(),
            json!({"channel": [{"chan": "44"}, {"chan": "36"}]})
        );
    }

    #[test]
    fn test_set_sort_is_order_independent() {
        let t = tree(json!({}), json!({}));
        let a = flatten(
            &t,
            &interface_fields(),
            json!({"channel": [{"chan": "149"}, {"chan": "36"}, {"chan": "40"}]}),
        );
        let b = flatten(
            &t,
            &interface_fields(),
            json!({"channel": [{"chan": "40"}, {"chan": "149"}, {"chan": "36"}]}),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn test_top_level_sensitive_retained() {
        let t = tree(json!({}), json!({"password": "s3cret"}));
        let out = flatten(&t, &interface_fields(), json!({"password": ""}));
        assert_eq!(out, json!({"password": "s3cret"}));
    }

    #[test]
    fn test_expand_full_object() {
        let t = tree(
            json!({}),
            json!({
                "name": "port1",
                "vlanid": 100,
                "ip": "10.0.0.1/24",
                "password": "s3cret",
                "dhcp_relay": [{"server": "10.0.0.5", "port": null}],
                "secondaryip": [
                    {"id": 2, "ip": "10.0.2.1/24"},
                    {"id": 1, "ip": "10.0.1.1/24"}
                ],
                "status": "up"
            }),
        );
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let object = mapper.expand_object(&interface_fields()).unwrap();

        assert_eq!(
            Value::Object(object),
            json!({
                "name": "port1",
                "vlanid": 100,
                "ip": "10.0.0.1/24",
                "password": "s3cret",
                "dhcp-relay": {"server": "10.0.0.5"},
                "secondaryip": [
                    {"id": 2, "ip": "10.0.2.1/24"},
                    {"id": 1, "ip": "10.0.1.1/24"}
                ]
            })
        );
    }

    #[test]
    fn test_expand_zero_integer_is_sent() {
        let t = tree(json!({}), json!({"vlanid": 0}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let object = mapper.expand_object(&interface_fields()).unwrap();
        assert_eq!(Value::Object(object), json!({"vlanid": 0}));
    }

    #[test]
    fn test_expand_cleared_fields() {
        let t = tree(
            json!({
                "password": "old",
                "alias": "lan",
                "dhcp_relay": [{"server": "10.0.0.5"}],
                "secondaryip": [{"id": 1}]
            }),
            json!({"dhcp_relay": [], "secondaryip": []}),
        );
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let object = mapper.expand_object(&interface_fields()).unwrap();
        assert_eq!(
            Value::Object(object),
            json!({
                "alias": null,
                "password": null,
                "dhcp-relay": null,
                "secondaryip": []
            })
        );
    }

    #[test]
    fn test_expand_unset_fields_omitted() {
        let t = tree(json!({}), json!({"dhcp_relay": []}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let object = mapper.expand_object(&interface_fields()).unwrap();
        assert!(object.is_empty());
    }

    #[test]
    fn test_expand_type_mismatch() {
        let t = tree(json!({}), json!({"vlanid": "100"}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let err = mapper.expand_object(&interface_fields()).unwrap_err();
        assert_eq!(err.message(), "vlanid");

        let t = tree(json!({}), json!({"secondaryip": ["10.0.0.1/24"]}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let err = mapper.expand_object(&interface_fields()).unwrap_err();
        assert_eq!(err.message(), "secondaryip.0");

        let t = tree(json!({}), json!({"dhcp_relay": "x"}));
        let mapper = FieldMapper::new(&t, MapperOptions::default());
        let err = mapper.expand_object(&interface_fields()).unwrap_err();
        assert_eq!(err.message(), "dhcp_relay");
    }

    #[test]
    fn test_flatten_then_expand_round_trip() {
        let fields = vec![
            FieldSpec::string("name"),
            FieldSpec::integer("mtu"),
            FieldSpec::boolean("enabled"),
            FieldSpec::list(
                "members",
                vec![FieldSpec::string("interface-name"), FieldSpec::integer("weight")],
            ),
        ];
        let original = json!({
            "name": "agg1",
            "mtu": 1500,
            "enabled": true,
            "members": [
                {"interface-name": "port2", "weight": 1},
                {"interface-name": "port1", "weight": 2}
            ]
        });

        let empty = tree(json!({}), json!({}));
        let flattened = FieldMapper::new(&empty, MapperOptions::default())
            .flatten_object(&fields, &wire(original.clone()))
            .into_result()
            .unwrap();

        let state = ResourceData::from_state(flattened);
        let expanded = FieldMapper::new(&state, MapperOptions::default())
            .expand_object(&fields)
            .unwrap();
        assert_eq!(Value::Object(expanded), original);
    }
}
