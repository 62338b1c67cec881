//! Validation of local configuration against a field table.
//!
//! Configuration arrives as JSON keyed by local keys. Each [`FieldSpec`] of
//! the [`ResourceSpec`] is checked for presence and kind, recursing into
//! nested blocks.
//!
//! # Example
//!
//! ```
//! use fortios_mapper::schema::{FieldSpec, ResourceSpec};
//! use fortios_mapper::validation::validate;
//! use serde_json::json;
//!
//! let spec = ResourceSpec::new("fortios_system_interface", "system/interface")
//!     .with_mkey("name")
//!     .with_field(FieldSpec::string("name").required())
//!     .with_field(FieldSpec::integer("vlanid"));
//!
//! assert!(validate(&spec, &json!({"name": "port1", "vlanid": 100})).is_empty());
//!
//! let diagnostics = validate(&spec, &json!({"name": "port1", "vlanid": "x"}));
//! assert_eq!(diagnostics.len(), 1);
//! assert_eq!(diagnostics[0].attribute, Some("vlanid".to_string()));
//! ```

use serde_json::Value;

use crate::reconcile::SubtableSort;
use crate::scalar::{ipmask_to_cidr, is_cidr};
use crate::schema::{Diagnostic, FieldKind, FieldSpec, ResourceSpec, ScalarKind};
use crate::tree::{ID_KEY, SORT_MODE_KEY, VDOMPARAM_KEY};
use crate::value::wire_kind_name;

/// Local attributes every resource accepts in addition to its field table.
pub const RESERVED_ATTRIBUTES: &[&str] = &[ID_KEY, VDOMPARAM_KEY, SORT_MODE_KEY];

/// Validate local configuration against a resource's field table.
///
/// Returns an empty list when the configuration is valid.
///
/// - Required fields must be present and non-null
/// - Computed-only fields are skipped (the device sets these)
/// - Scalars must have their declared kind
/// - Nested singletons hold at most one element
/// - Unknown attributes are reported as warnings
pub fn validate(spec: &ResourceSpec, config: &Value) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    match config {
        Value::Object(object) => {
            validate_fields(&spec.fields, object, "", &mut diagnostics);
            validate_reserved(object, &mut diagnostics);
            for key in object.keys() {
                let known = RESERVED_ATTRIBUTES.contains(&key.as_str())
                    || spec.fields.iter().any(|f| &f.local_key == key);
                if !known {
                    diagnostics.push(
                        Diagnostic::warning(format!("Unknown attribute '{}'", key))
                            .with_detail(format!("{} has no such field", spec.name))
                            .with_attribute(key.as_str()),
                    );
                }
            }
        },
        Value::Null => validate_fields(&spec.fields, &serde_json::Map::new(), "", &mut diagnostics),
        other => diagnostics.push(
            Diagnostic::error("Expected object").with_detail(format!("Got {}", wire_kind_name(other))),
        ),
    }
    diagnostics
}

/// Validate, returning the error diagnostics on failure.
///
/// Warnings alone do not fail validation.
pub fn validate_result(spec: &ResourceSpec, config: &Value) -> Result<(), Vec<Diagnostic>> {
    let diagnostics = validate(spec, config);
    if diagnostics.iter().any(Diagnostic::is_error) {
        Err(diagnostics.into_iter().filter(Diagnostic::is_error).collect())
    } else {
        Ok(())
    }
}

/// Check whether configuration is free of errors.
pub fn is_valid(spec: &ResourceSpec, config: &Value) -> bool {
    validate_result(spec, config).is_ok()
}

fn validate_reserved(object: &serde_json::Map<String, Value>, diagnostics: &mut Vec<Diagnostic>) {
    if let Some(value) = object.get(VDOMPARAM_KEY) {
        if !value.is_null() && !value.is_string() {
            diagnostics.push(type_error(VDOMPARAM_KEY, "string", value));
        }
    }
    match object.get(SORT_MODE_KEY) {
        None | Some(Value::Null) => {},
        Some(Value::String(mode)) => {
            if let Err(err) = mode.parse::<SubtableSort>() {
                diagnostics.push(
                    Diagnostic::error("Invalid value for attribute 'dynamic_sort_subtable'")
                        .with_detail(err.message())
                        .with_attribute(SORT_MODE_KEY),
                );
            }
        },
        Some(other) => diagnostics.push(type_error(SORT_MODE_KEY, "string", other)),
    }
}

fn validate_fields(
    fields: &[FieldSpec],
    object: &serde_json::Map<String, Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    for field in fields {
        let field_path = join_path(path, &field.local_key);
        validate_field(field, object.get(&field.local_key), &field_path, diagnostics);
    }
}

fn validate_field(
    field: &FieldSpec,
    value: Option<&Value>,
    path: &str,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let flags = &field.flags;
    if flags.computed && !flags.optional && !flags.required {
        return;
    }

    let value = match value {
        None | Some(Value::Null) => {
            if flags.required {
                diagnostics.push(
                    Diagnostic::error(format!("Missing required attribute '{}'", path))
                        .with_detail("This attribute is required and must be provided")
                        .with_attribute(path),
                );
            }
            return;
        },
        Some(value) => value,
    };

    match &field.kind {
        FieldKind::Scalar(kind) => validate_scalar(*kind, value, path, diagnostics),
        FieldKind::NestedObject => {
            validate_block(field, value, path, Some(1), diagnostics);
        },
        FieldKind::NestedList(_) => {
            validate_block(field, value, path, None, diagnostics);
        },
    }
}

fn validate_scalar(kind: ScalarKind, value: &Value, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    match kind {
        ScalarKind::String => {
            if !value.is_string() {
                diagnostics.push(type_error(path, kind.name(), value));
            }
        },
        ScalarKind::Integer => {
            if !is_integer(value) {
                diagnostics.push(type_error(path, kind.name(), value));
            }
        },
        ScalarKind::Float => {
            if !value.is_number() {
                diagnostics.push(type_error(path, kind.name(), value));
            }
        },
        ScalarKind::Bool => {
            if !value.is_boolean() {
                diagnostics.push(type_error(path, kind.name(), value));
            }
        },
        ScalarKind::Ipv4Mask => match value.as_str() {
            Some(text) if text.is_empty() || is_cidr(text) || ipmask_to_cidr(text).is_some() => {},
            Some(text) => diagnostics.push(
                Diagnostic::error(format!("Invalid address for attribute '{}'", path))
                    .with_detail(format!(
                        "Expected \"a.b.c.d/nn\" or \"a.b.c.d m.m.m.m\", got {:?}",
                        text
                    ))
                    .with_attribute(path),
            ),
            None => diagnostics.push(type_error(path, kind.name(), value)),
        },
        ScalarKind::Any => {
            if value.is_array() || value.is_object() {
                diagnostics.push(type_error(path, kind.name(), value));
            }
        },
    }
}

fn validate_block(
    field: &FieldSpec,
    value: &Value,
    path: &str,
    max_items: Option<usize>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    let Some(items) = value.as_array() else {
        diagnostics.push(
            Diagnostic::error(format!("Expected list for block '{}'", path))
                .with_detail(format!("Got {}", wire_kind_name(value)))
                .with_attribute(path),
        );
        return;
    };

    if let Some(max) = max_items {
        if items.len() > max {
            diagnostics.push(
                Diagnostic::error(format!(
                    "Block '{}' allows at most {} item(s), got {}",
                    path,
                    max,
                    items.len()
                ))
                .with_attribute(path),
            );
        }
    }

    for (i, item) in items.iter().enumerate() {
        let item_path = format!("{}.{}", path, i);
        match item.as_object() {
            Some(object) => validate_fields(&field.children, object, &item_path, diagnostics),
            None => diagnostics.push(
                Diagnostic::error("Expected object")
                    .with_detail(format!("Got {}", wire_kind_name(item)))
                    .with_attribute(item_path),
            ),
        }
    }
}

fn join_path(base: &str, name: &str) -> String {
    if base.is_empty() {
        name.to_string()
    } else {
        format!("{}.{}", base, name)
    }
}

fn is_integer(value: &Value) -> bool {
    match value {
        Value::Number(n) => n.is_i64() || n.as_f64().is_some_and(|f| f.fract() == 0.0),
        _ => false,
    }
}

fn type_error(path: &str, expected: &str, got: &Value) -> Diagnostic {
    Diagnostic::error(format!("Invalid type for attribute '{}'", path))
        .with_detail(format!("Expected {}, got {}", expected, wire_kind_name(got)))
        .with_attribute(path)
}
