//! Declarative field tables for FortiOS objects.
//!
//! Every FortiOS object is described by a [`ResourceSpec`] holding a tree of
//! [`FieldSpec`] entries. The [`FieldMapper`](crate::mapper::FieldMapper)
//! interprets the table to flatten wire objects into local state and to expand
//! local configuration into wire objects, so no per-field code is needed.

use crate::naming;
use serde::{Deserialize, Serialize};

/// The kind of a scalar leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalarKind {
    /// A string, passed through unchanged.
    String,
    /// An integer. The wire may encode it as a JSON float.
    Integer,
    /// A floating point number.
    Float,
    /// A boolean.
    Bool,
    /// An IPv4 address plus netmask, normalized to CIDR when local state uses CIDR.
    Ipv4Mask,
    /// Any scalar, passed through unchanged.
    Any,
}

impl ScalarKind {
    /// Name used in type mismatch errors.
    pub fn name(self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::Bool => "bool",
            Self::Ipv4Mask => "ipv4 address/mask",
            Self::Any => "scalar",
        }
    }
}

/// Options for a repeated nested block.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListOptions {
    /// Wire key of the child used to match fresh elements against prior state.
    ///
    /// Without one, elements are matched by position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub match_key: Option<String>,
    /// Local key of the child used to order set-semantics blocks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<String>,
    /// Whether the block is unordered in the local schema.
    #[serde(default)]
    pub set: bool,
}

/// How a field is represented.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    /// A scalar leaf.
    Scalar(ScalarKind),
    /// A wire object held locally as a list of at most one mapping.
    NestedObject,
    /// A wire array of objects held locally as a list of mappings.
    NestedList(ListOptions),
}

/// Describes how an attribute can be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct AttributeFlags {
    /// The attribute is required in configuration.
    pub required: bool,
    /// The attribute is optional in configuration.
    pub optional: bool,
    /// The attribute is computed by the device (read-only).
    pub computed: bool,
    /// The attribute is sensitive: never read back in plaintext.
    pub sensitive: bool,
}

impl AttributeFlags {
    /// Create flags for a required attribute.
    pub fn required() -> Self {
        Self {
            required: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional attribute.
    pub fn optional() -> Self {
        Self {
            optional: true,
            ..Default::default()
        }
    }

    /// Create flags for a computed attribute.
    pub fn computed() -> Self {
        Self {
            computed: true,
            ..Default::default()
        }
    }

    /// Create flags for an optional+computed attribute (FortiOS fills in a default).
    pub fn optional_computed() -> Self {
        Self {
            optional: true,
            computed: true,
            ..Default::default()
        }
    }

    /// Mark the attribute as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// One entry of a field table.
///
/// `wire_key` is hyphenated, `local_key` uses underscores. The constructors
/// derive the local key from the wire key; use [`FieldSpec::with_local_key`]
/// for the exceptions FortiOS has.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Key in the wire object.
    pub wire_key: String,
    /// Key in the local tree.
    pub local_key: String,
    /// Representation of the value.
    pub kind: FieldKind,
    /// Child fields of a nested block. Empty for scalars.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<FieldSpec>,
    /// Usage flags.
    #[serde(flatten)]
    pub flags: AttributeFlags,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Changing the field forces the object to be replaced.
    #[serde(default)]
    pub force_new: bool,
}

impl FieldSpec {
    /// Create an optional field of the given kind.
    pub fn new(wire_key: impl Into<String>, kind: FieldKind) -> Self {
        let wire_key = wire_key.into();
        Self {
            local_key: naming::wire_to_local(&wire_key),
            wire_key,
            kind,
            children: Vec::new(),
            flags: AttributeFlags::optional(),
            description: None,
            force_new: false,
        }
    }

    /// An optional string field.
    pub fn string(wire_key: impl Into<String>) -> Self {
        Self::new(wire_key, FieldKind::Scalar(ScalarKind::String))
    }

    /// An optional integer field.
    pub fn integer(wire_key: impl Into<String>) -> Self {
        Self::new(wire_key, FieldKind::Scalar(ScalarKind::Integer))
    }

    /// An optional float field.
    pub fn float(wire_key: impl Into<String>) -> Self {
        Self::new(wire_key, FieldKind::Scalar(ScalarKind::Float))
    }

    /// An optional boolean field.
    pub fn boolean(wire_key: impl Into<String>) -> Self {
        Self::new(wire_key, FieldKind::Scalar(ScalarKind::Bool))
    }

    /// An optional address/netmask field.
    pub fn ipmask(wire_key: impl Into<String>) -> Self {
        Self::new(wire_key, FieldKind::Scalar(ScalarKind::Ipv4Mask))
    }

    /// An optional field accepting any scalar.
    pub fn any(wire_key: impl Into<String>) -> Self {
        Self::new(wire_key, FieldKind::Scalar(ScalarKind::Any))
    }

    /// A singleton nested block.
    pub fn object(wire_key: impl Into<String>, children: Vec<FieldSpec>) -> Self {
        Self {
            children,
            ..Self::new(wire_key, FieldKind::NestedObject)
        }
    }

    /// An ordered repeated nested block.
    pub fn list(wire_key: impl Into<String>, children: Vec<FieldSpec>) -> Self {
        Self {
            children,
            ..Self::new(wire_key, FieldKind::NestedList(ListOptions::default()))
        }
    }

    /// An unordered (set-semantics) repeated nested block.
    pub fn set(wire_key: impl Into<String>, children: Vec<FieldSpec>) -> Self {
        let options = ListOptions {
            set: true,
            ..Default::default()
        };
        Self {
            children,
            ..Self::new(wire_key, FieldKind::NestedList(options))
        }
    }

    /// Override the derived local key.
    pub fn with_local_key(mut self, local_key: impl Into<String>) -> Self {
        self.local_key = local_key.into();
        self
    }

    /// Mark the field as required.
    pub fn required(mut self) -> Self {
        self.flags = AttributeFlags {
            sensitive: self.flags.sensitive,
            ..AttributeFlags::required()
        };
        self
    }

    /// Mark the field as optional and computed.
    pub fn optional_computed(mut self) -> Self {
        self.flags = AttributeFlags {
            sensitive: self.flags.sensitive,
            ..AttributeFlags::optional_computed()
        };
        self
    }

    /// Mark the field as computed only.
    pub fn computed(mut self) -> Self {
        self.flags = AttributeFlags {
            sensitive: self.flags.sensitive,
            ..AttributeFlags::computed()
        };
        self
    }

    /// Mark the field as sensitive.
    pub fn sensitive(mut self) -> Self {
        self.flags.sensitive = true;
        self
    }

    /// Mark the field as forcing replacement when changed.
    pub fn with_force_new(mut self) -> Self {
        self.force_new = true;
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Match list elements by the child with this wire key. Ignored for non-lists.
    pub fn with_match_key(mut self, wire_key: impl Into<String>) -> Self {
        if let FieldKind::NestedList(options) = &mut self.kind {
            options.match_key = Some(wire_key.into());
        }
        self
    }

    /// Sort set elements by the child with this local key. Ignored for non-lists.
    pub fn with_sort_key(mut self, local_key: impl Into<String>) -> Self {
        if let FieldKind::NestedList(options) = &mut self.kind {
            options.sort_key = Some(local_key.into());
        }
        self
    }

    /// Whether the field is sensitive.
    pub fn is_sensitive(&self) -> bool {
        self.flags.sensitive
    }

    /// List options, if this is a repeated block.
    pub fn list_options(&self) -> Option<&ListOptions> {
        match &self.kind {
            FieldKind::NestedList(options) => Some(options),
            _ => None,
        }
    }

    /// Find a child by wire key.
    pub fn child(&self, wire_key: &str) -> Option<&FieldSpec> {
        self.children.iter().find(|c| c.wire_key == wire_key)
    }

    /// Name of the expected kind, used in errors.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            FieldKind::Scalar(scalar) => scalar.name(),
            FieldKind::NestedObject => "object",
            FieldKind::NestedList(_) => "list",
        }
    }
}

/// The field table and REST location of one FortiOS object type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSpec {
    /// Resource type name (e.g. `fortios_system_interface`).
    pub name: String,
    /// CMDB path below `/api/v2/cmdb/` (e.g. `system/interface`).
    pub path: String,
    /// Wire key of the field identifying one object in a table.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mkey: Option<String>,
    /// Fixed id of a settings object that exists exactly once.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub singleton_id: Option<String>,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// The field table.
    pub fields: Vec<FieldSpec>,
}

impl ResourceSpec {
    /// Create an empty resource spec.
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            mkey: None,
            singleton_id: None,
            description: None,
            fields: Vec::new(),
        }
    }

    /// Identify table entries by the field with this wire key.
    pub fn with_mkey(mut self, wire_key: impl Into<String>) -> Self {
        self.mkey = Some(wire_key.into());
        self
    }

    /// Declare a settings object with a fixed id.
    pub fn singleton(mut self, id: impl Into<String>) -> Self {
        self.singleton_id = Some(id.into());
        self
    }

    /// Set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Add a field.
    pub fn with_field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    /// Add several fields.
    pub fn with_fields(mut self, fields: impl IntoIterator<Item = FieldSpec>) -> Self {
        self.fields.extend(fields);
        self
    }

    /// Whether this is a settings object.
    pub fn is_singleton(&self) -> bool {
        self.singleton_id.is_some()
    }

    /// Find a top-level field by local key.
    pub fn field(&self, local_key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.local_key == local_key)
    }

    /// The field named by `mkey`.
    pub fn mkey_field(&self) -> Option<&FieldSpec> {
        let mkey = self.mkey.as_deref()?;
        self.fields.iter().find(|f| f.wire_key == mkey)
    }
}

/// Diagnostic severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    /// An error that prevents the operation from completing.
    Error,
    /// A warning that doesn't prevent the operation but should be addressed.
    Warning,
}

/// A diagnostic message about configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// The severity of the diagnostic.
    pub severity: DiagnosticSeverity,
    /// A short summary of the issue.
    pub summary: String,
    /// A detailed description of the issue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// The attribute path where the issue occurred.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Error,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(summary: impl Into<String>) -> Self {
        Self {
            severity: DiagnosticSeverity::Warning,
            summary: summary.into(),
            detail: None,
            attribute: None,
        }
    }

    /// Add detail to this diagnostic.
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    /// Set the attribute path for this diagnostic.
    pub fn with_attribute(mut self, attribute: impl Into<String>) -> Self {
        self.attribute = Some(attribute.into());
        self
    }

    /// Whether this is an error.
    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}
