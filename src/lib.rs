//! FortiOS field mapper
//!
//! This crate converts FortiOS configuration objects between the untyped JSON
//! of the FortiOS REST API (the *wire* form) and the configuration/state tree
//! a provider host keeps (the *local* form).
//!
//! # Overview
//!
//! - **Field tables**: every object type is a [`ResourceSpec`] holding
//!   [`FieldSpec`](schema::FieldSpec) entries; see [`catalog`] for examples
//! - **Mapping engine**: [`FieldMapper`] flattens wire objects into local
//!   values and expands local values into wire objects, driven by the table
//! - **Reconciliation**: repeated blocks are matched against prior state with
//!   [`merge_block`](reconcile::merge_block) and ordered with
//!   [`dynamic_sort_subtable`](reconcile::dynamic_sort_subtable)
//! - **Dispatch**: [`FortiosProvider`] runs create/read/update/delete over an
//!   injected [`RestClient`]
//! - **Logging**: `tracing` integration, see [`logging`]
//!
//! # Quick Start
//!
//! ```
//! use fortios_mapper::schema::FieldSpec;
//! use fortios_mapper::{FieldMapper, MapperOptions, ResourceData};
//! use serde_json::json;
//!
//! let fields = vec![
//!     FieldSpec::string("name"),
//!     FieldSpec::integer("vlanid"),
//!     FieldSpec::ipmask("ip"),
//! ];
//!
//! // Local state already holds the address in CIDR form.
//! let state = ResourceData::from_json(None, &json!({"ip": "10.0.0.1/24"})).unwrap();
//! let mapper = FieldMapper::new(&state, MapperOptions::default());
//!
//! let wire = json!({"name": "port1", "vlanid": 100.0, "ip": "10.0.0.1 255.255.255.0"});
//! let values = mapper
//!     .flatten_object(&fields, wire.as_object().unwrap())
//!     .into_result()
//!     .unwrap();
//!
//! assert_eq!(values["vlanid"].as_i64(), Some(100));
//! assert_eq!(values["ip"].as_str(), Some("10.0.0.1/24"));
//! ```
//!
//! # Key convention
//!
//! Wire keys are hyphenated (`dhcp-relay-ip`), local keys use underscores
//! (`dhcp_relay_ip`). Nested blocks are held locally as lists of maps, with
//! singleton blocks as lists of at most one element.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod mapper;
pub mod naming;
pub mod provider;
pub mod reconcile;
pub mod scalar;
pub mod schema;
pub mod testing;
pub mod tree;
pub mod types;
pub mod validation;
pub mod value;

// Re-export main types at crate root
pub use config::ProviderConfig;
pub use error::MapperError;
pub use logging::{init_logging, init_logging_with_default, try_init_logging};
pub use mapper::{Assembly, FieldMapper, MapperOptions};
pub use provider::{FortiosProvider, RestClient};
pub use reconcile::SubtableSort;
pub use schema::{Diagnostic, ResourceSpec};
pub use tree::{ConfigTree, ResourceData};
pub use types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
pub use validation::{is_valid, validate, validate_result};
pub use value::{LocalValue, WireObject, WireValue};

// Re-export async_trait for RestClient implementors
pub use async_trait::async_trait;

// Re-export commonly used external types
pub use serde_json;
pub use tracing;
