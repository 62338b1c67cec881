//! CRUD dispatch over an injected REST client.
//!
//! [`FortiosProvider`] holds the registered field tables and turns each
//! lifecycle call into one REST call plus a flatten or expand pass. It never
//! talks HTTP itself: the [`RestClient`] it is built with does.
//!
//! # Example
//!
//! ```ignore
//! use fortios_mapper::{catalog, FortiosProvider};
//! use serde_json::json;
//!
//! let provider = FortiosProvider::new(client).with_catalog();
//! provider.configure(json!({"vdom": "root"})).await?;
//!
//! let state = provider
//!     .create("fortios_system_interface", json!({
//!         "name": "port1",
//!         "vdom": "root",
//!         "ip": "10.0.0.1/24"
//!     }))
//!     .await?;
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, info, instrument, warn};

use crate::catalog;
use crate::config::ProviderConfig;
use crate::error::MapperError;
use crate::mapper::{FieldMapper, MapperOptions};
use crate::reconcile::{dynamic_sort_subtable, SubtableSort};
use crate::schema::{Diagnostic, FieldSpec, ResourceSpec};
use crate::tree::{ConfigTree, ResourceData, ID_KEY, SORT_MODE_KEY, VDOMPARAM_KEY};
use crate::types::{AttributeChange, ImportedResource, PlanResult, ProviderMetadata};
use crate::validation;
use crate::value::{wire_scalar_key, LocalValue, WireObject};

/// Response key FortiOS uses to report the id of a created object.
pub const MKEY_RESPONSE_KEY: &str = "mkey";

/// The FortiOS REST API, as seen by the provider.
///
/// `path` is the CMDB path of the object type (`system/interface`), `mkey`
/// the id of one object. `vdom` is passed through untouched.
#[async_trait]
pub trait RestClient: Send + Sync {
    /// Create an object. The response may carry the new id under `mkey`.
    async fn create(
        &self,
        path: &str,
        object: WireObject,
        vdom: Option<&str>,
    ) -> Result<WireObject, MapperError>;

    /// Read one object. `None` means it does not exist.
    async fn read(
        &self,
        path: &str,
        mkey: &str,
        vdom: Option<&str>,
    ) -> Result<Option<WireObject>, MapperError>;

    /// Update one object.
    async fn update(
        &self,
        path: &str,
        mkey: &str,
        object: WireObject,
        vdom: Option<&str>,
    ) -> Result<WireObject, MapperError>;

    /// Delete one object.
    async fn delete(&self, path: &str, mkey: &str, vdom: Option<&str>) -> Result<(), MapperError>;
}

#[async_trait]
impl<C: RestClient + ?Sized> RestClient for Arc<C> {
    async fn create(
        &self,
        path: &str,
        object: WireObject,
        vdom: Option<&str>,
    ) -> Result<WireObject, MapperError> {
        (**self).create(path, object, vdom).await
    }

    async fn read(
        &self,
        path: &str,
        mkey: &str,
        vdom: Option<&str>,
    ) -> Result<Option<WireObject>, MapperError> {
        (**self).read(path, mkey, vdom).await
    }

    async fn update(
        &self,
        path: &str,
        mkey: &str,
        object: WireObject,
        vdom: Option<&str>,
    ) -> Result<WireObject, MapperError> {
        (**self).update(path, mkey, object, vdom).await
    }

    async fn delete(&self, path: &str, mkey: &str, vdom: Option<&str>) -> Result<(), MapperError> {
        (**self).delete(path, mkey, vdom).await
    }
}

/// Per-call settings resolved from provider config and resource overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct CallOptions {
    vdom: Option<String>,
    mapper: MapperOptions,
}

/// Dispatches lifecycle calls for registered FortiOS object types.
pub struct FortiosProvider<C> {
    client: C,
    resources: BTreeMap<String, ResourceSpec>,
    data_sources: BTreeMap<String, ResourceSpec>,
    config: RwLock<ProviderConfig>,
}

impl<C: RestClient> FortiosProvider<C> {
    /// Create a provider with no registered types.
    pub fn new(client: C) -> Self {
        Self {
            client,
            resources: BTreeMap::new(),
            data_sources: BTreeMap::new(),
            config: RwLock::new(ProviderConfig::default()),
        }
    }

    /// Register a resource type.
    pub fn with_resource(mut self, spec: ResourceSpec) -> Self {
        self.resources.insert(spec.name.clone(), spec);
        self
    }

    /// Register a data source type.
    pub fn with_data_source(mut self, spec: ResourceSpec) -> Self {
        self.data_sources.insert(spec.name.clone(), spec);
        self
    }

    /// Register every type in [`catalog`].
    pub fn with_catalog(self) -> Self {
        let provider = catalog::resources()
            .into_iter()
            .fold(self, |p, spec| p.with_resource(spec));
        catalog::data_sources()
            .into_iter()
            .fold(provider, |p, spec| p.with_data_source(spec))
    }

    /// The injected client.
    pub fn client(&self) -> &C {
        &self.client
    }

    /// Registered type names.
    pub fn metadata(&self) -> ProviderMetadata {
        ProviderMetadata {
            resources: self.resources.keys().cloned().collect(),
            data_sources: self.data_sources.keys().cloned().collect(),
        }
    }

    /// The field table of a resource type.
    pub fn resource(&self, resource_type: &str) -> Result<&ResourceSpec, MapperError> {
        self.resources
            .get(resource_type)
            .ok_or_else(|| MapperError::UnknownResource(resource_type.to_string()))
    }

    /// The field table of a data source type.
    pub fn data_source(&self, data_source_type: &str) -> Result<&ResourceSpec, MapperError> {
        self.data_sources
            .get(data_source_type)
            .ok_or_else(|| MapperError::UnknownResource(data_source_type.to_string()))
    }

    /// A copy of the current provider configuration.
    pub async fn provider_config(&self) -> ProviderConfig {
        self.config.read().await.clone()
    }

    // =========================================================================
    // Provider lifecycle
    // =========================================================================

    /// Parse and store provider configuration.
    ///
    /// On error diagnostics the previous configuration is kept.
    #[instrument(skip(self, config), name = "fortios.configure")]
    pub async fn configure(&self, config: Value) -> Result<Vec<Diagnostic>, MapperError> {
        let diagnostics = ProviderConfig::validate(&config);
        if diagnostics.iter().any(Diagnostic::is_error) {
            warn!(diagnostics = diagnostics.len(), "configure rejected");
            return Ok(diagnostics);
        }

        let parsed = ProviderConfig::from_value(&config)?;
        info!(vdom = ?parsed.vdom, sort = %parsed.dynamic_sort_subtable, "provider configured");
        *self.config.write().await = parsed;
        Ok(diagnostics)
    }

    // =========================================================================
    // Resource operations
    // =========================================================================

    /// Validate resource configuration.
    #[instrument(skip(self, config), name = "fortios.validate_resource_config")]
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, MapperError> {
        let spec = self.resource(resource_type)?;
        Ok(validation::validate(spec, &config))
    }

    /// Diff proposed state against prior state.
    ///
    /// Before diffing, the proposal is settled against prior state the way a
    /// refresh would shape it: attributes the device computes keep their
    /// prior value when the proposal leaves them unset, and set blocks take
    /// their sorted order. Numbers compare by value. A change to a
    /// `force_new` field requires replacement; a `null` proposal plans a
    /// deletion.
    #[instrument(skip(self, prior_state, proposed_state), name = "fortios.plan")]
    pub async fn plan(
        &self,
        resource_type: &str,
        prior_state: Option<Value>,
        proposed_state: Value,
    ) -> Result<PlanResult, MapperError> {
        let spec = self.resource(resource_type)?;
        let prior = match prior_state.filter(|p| !p.is_null()) {
            Some(prior_state) => state_object(&prior_state)?,
            None => WireObject::new(),
        };

        if proposed_state.is_null() {
            let changes = prior
                .iter()
                .filter(|(key, value)| key.as_str() != ID_KEY && !is_unset(value))
                .map(|(key, value)| AttributeChange::removed(key.as_str(), value.clone()))
                .collect();
            return Ok(PlanResult::new(Value::Null, changes, false));
        }

        let mut planned = state_object(&proposed_state)?;
        if !prior.is_empty() {
            let data = ResourceData::from_json(None, &proposed_state)?;
            let sort = self.call_options(&data).await?.mapper.sort;
            settle_planned(&spec.fields, &mut planned, &prior, sort);
            if planned.get(ID_KEY).map_or(true, is_unset) {
                if let Some(id) = prior.get(ID_KEY) {
                    planned.insert(ID_KEY.to_string(), id.clone());
                }
            }
        }

        let mut changes = Vec::new();
        let mut requires_replace = false;
        let keys: BTreeSet<&String> = prior.keys().chain(planned.keys()).collect();
        for key in keys {
            if key == ID_KEY {
                continue;
            }
            let before = prior.get(key).filter(|v| !is_unset(v));
            let after = planned.get(key).filter(|v| !is_unset(v));
            let change = match (before, after) {
                (Some(b), Some(a)) if same_value(b, a) => continue,
                (None, None) => continue,
                (Some(b), Some(a)) => AttributeChange::modified(key.as_str(), b.clone(), a.clone()),
                (None, Some(a)) => AttributeChange::added(key.as_str(), a.clone()),
                (Some(b), None) => AttributeChange::removed(key.as_str(), b.clone()),
            };
            // Creation is not a replacement.
            if !prior.is_empty() && spec.field(key).is_some_and(|f| f.force_new) {
                requires_replace = true;
            }
            changes.push(change);
        }

        debug!(changes = changes.len(), requires_replace, "plan computed");
        Ok(PlanResult::new(
            Value::Object(planned),
            changes,
            requires_replace,
        ))
    }

    /// Create an object and return its refreshed state.
    ///
    /// Settings objects already exist, so creating one updates it.
    #[instrument(skip(self, planned_state), name = "fortios.create")]
    pub async fn create(
        &self,
        resource_type: &str,
        planned_state: Value,
    ) -> Result<Value, MapperError> {
        let spec = self.resource(resource_type)?;
        check_config(spec, &planned_state)?;

        let mut data = ResourceData::from_json(None, &planned_state)?;
        let options = self.call_options(&data).await?;
        let object = FieldMapper::new(&data, options.mapper).expand_object(&spec.fields)?;
        let vdom = options.vdom.as_deref();

        let id = match &spec.singleton_id {
            Some(singleton) => {
                debug!(path = %spec.path, "creating a settings object updates it");
                self.client.update(&spec.path, singleton, object, vdom).await?;
                singleton.clone()
            },
            None => {
                let local_mkey = object_mkey(spec, &object);
                let response = self.client.create(&spec.path, object, vdom).await?;
                response_mkey(&response).or(local_mkey).ok_or_else(|| {
                    MapperError::Validation(format!(
                        "{}: cannot determine the id of the created object",
                        spec.name
                    ))
                })?
            },
        };
        debug!(id = %id, "object created");
        data.set_id(id);

        if !self.refresh(spec, &mut data, &options).await? {
            return Err(MapperError::NotFound(format!(
                "{} disappeared after create",
                spec.name
            )));
        }
        Ok(data.to_json())
    }

    /// Refresh state from the device.
    ///
    /// Returns `Ok(None)` when the object no longer exists, so the caller can
    /// drop it from state.
    #[instrument(skip(self, current_state), name = "fortios.read")]
    pub async fn read(
        &self,
        resource_type: &str,
        current_state: Value,
    ) -> Result<Option<Value>, MapperError> {
        let mut data = ResourceData::from_json(Some(&current_state), &current_state)?;
        if self.read_data(resource_type, &mut data).await? {
            Ok(Some(data.to_json()))
        } else {
            Ok(None)
        }
    }

    /// Refresh `data` in place. Returns whether the object exists.
    ///
    /// On a type mismatch the fields flattened before the failing one are
    /// already written into `data` when the error is returned.
    pub async fn read_data(
        &self,
        resource_type: &str,
        data: &mut ResourceData,
    ) -> Result<bool, MapperError> {
        let spec = self.resource(resource_type)?;
        if data.id().is_none() {
            if let Some(singleton) = &spec.singleton_id {
                data.set_id(singleton.as_str());
            }
        }
        let options = self.call_options(data).await?;
        self.refresh(spec, data, &options).await
    }

    /// Update an object and return its refreshed state.
    #[instrument(skip(self, prior_state, planned_state), name = "fortios.update")]
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, MapperError> {
        let spec = self.resource(resource_type)?;
        check_config(spec, &planned_state)?;

        let mut data = ResourceData::from_json(Some(&prior_state), &planned_state)?;
        let id = match (&spec.singleton_id, data.id()) {
            (Some(singleton), _) => singleton.clone(),
            (None, Some(id)) => id.to_string(),
            (None, None) => {
                return Err(MapperError::Validation(format!(
                    "{}: cannot update an object without an id",
                    spec.name
                )))
            },
        };

        let options = self.call_options(&data).await?;
        let object = FieldMapper::new(&data, options.mapper).expand_object(&spec.fields)?;
        let response = self
            .client
            .update(&spec.path, &id, object, options.vdom.as_deref())
            .await?;

        // Renaming an object changes its id.
        let id = match (&spec.singleton_id, response_mkey(&response)) {
            (None, Some(new_id)) => new_id,
            _ => id,
        };
        data.set_id(id);

        if !self.refresh(spec, &mut data, &options).await? {
            return Err(MapperError::NotFound(format!(
                "{} disappeared after update",
                spec.name
            )));
        }
        Ok(data.to_json())
    }

    /// Delete an object.
    #[instrument(skip(self, current_state), name = "fortios.delete")]
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), MapperError> {
        let mut data = ResourceData::from_json(Some(&current_state), &current_state)?;
        self.delete_data(resource_type, &mut data).await
    }

    /// Delete the object `data` refers to and clear its id.
    ///
    /// Settings objects cannot be deleted; only the local id is cleared.
    pub async fn delete_data(
        &self,
        resource_type: &str,
        data: &mut ResourceData,
    ) -> Result<(), MapperError> {
        let spec = self.resource(resource_type)?;
        if spec.is_singleton() {
            debug!(path = %spec.path, "settings object kept on the device");
            data.clear_id();
            return Ok(());
        }

        let Some(id) = data.id().map(str::to_string) else {
            debug!(path = %spec.path, "no id; nothing to delete");
            return Ok(());
        };
        let options = self.call_options(data).await?;
        self.client
            .delete(&spec.path, &id, options.vdom.as_deref())
            .await?;
        data.clear_id();
        Ok(())
    }

    /// Import an existing object by id.
    #[instrument(skip(self), name = "fortios.import_resource")]
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, MapperError> {
        let mut data = ResourceData::default();
        data.set_id(id);
        if !self.read_data(resource_type, &mut data).await? {
            return Err(MapperError::NotFound(format!("{} {}", resource_type, id)));
        }
        Ok(vec![ImportedResource::new(resource_type, data.to_json())])
    }

    // =========================================================================
    // Data source operations
    // =========================================================================

    /// Validate data source configuration.
    pub async fn validate_data_source_config(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Vec<Diagnostic>, MapperError> {
        let spec = self.data_source(data_source_type)?;
        Ok(validation::validate(spec, &config))
    }

    /// Look up one object by the mkey in `config`.
    #[instrument(skip(self, config), name = "fortios.read_data_source")]
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, MapperError> {
        let spec = self.data_source(data_source_type)?;
        check_config(spec, &config)?;

        let mut data = ResourceData::from_json(None, &config)?;
        let id = match (&spec.singleton_id, spec.mkey_field()) {
            (Some(singleton), _) => Some(singleton.clone()),
            (None, Some(field)) => data.get(&field.local_key).and_then(LocalValue::scalar_key),
            (None, None) => data.id().map(str::to_string),
        };
        let id = id.filter(|id| !id.is_empty()).ok_or_else(|| {
            MapperError::Validation(format!("{}: no object id in configuration", spec.name))
        })?;
        data.set_id(id.as_str());

        let options = self.call_options(&data).await?;
        if !self.refresh(spec, &mut data, &options).await? {
            return Err(MapperError::NotFound(format!("{} {}", spec.name, id)));
        }
        Ok(data.to_json())
    }

    // =========================================================================
    // Internals
    // =========================================================================

    async fn call_options(&self, data: &ResourceData) -> Result<CallOptions, MapperError> {
        let config = self.config.read().await;
        let vdom = match data.get(VDOMPARAM_KEY) {
            Some(LocalValue::String(vdom)) if !vdom.is_empty() => Some(vdom.clone()),
            _ => config.vdom.clone(),
        };
        let sort = match data.get(SORT_MODE_KEY) {
            Some(LocalValue::String(mode)) if !mode.is_empty() => mode.parse()?,
            _ => config.dynamic_sort_subtable,
        };
        Ok(CallOptions {
            vdom,
            mapper: MapperOptions { sort },
        })
    }

    /// Read the object `data` refers to and flatten it into `data`.
    async fn refresh(
        &self,
        spec: &ResourceSpec,
        data: &mut ResourceData,
        options: &CallOptions,
    ) -> Result<bool, MapperError> {
        let Some(id) = data.id().map(str::to_string) else {
            return Ok(false);
        };

        let wire = self
            .client
            .read(&spec.path, &id, options.vdom.as_deref())
            .await?;
        let wire = match wire {
            Some(wire) if !wire.is_empty() => wire,
            _ => {
                debug!(path = %spec.path, id = %id, "object is gone");
                data.clear_id();
                return Ok(false);
            },
        };

        let assembly = FieldMapper::new(&*data, options.mapper).flatten_object(&spec.fields, &wire);
        for (key, value) in assembly.values {
            data.set(&key, value)?;
        }
        match assembly.error {
            Some(err) => {
                warn!(path = %spec.path, id = %id, error = %err, "refresh stopped early");
                Err(err)
            },
            None => Ok(true),
        }
    }
}

fn check_config(spec: &ResourceSpec, config: &Value) -> Result<(), MapperError> {
    validation::validate_result(spec, config).map_err(|errors| {
        let summary = errors
            .iter()
            .map(|d| match &d.detail {
                Some(detail) => format!("{}: {}", d.summary, detail),
                None => d.summary.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        MapperError::Validation(summary)
    })
}

fn state_object(state: &Value) -> Result<WireObject, MapperError> {
    match state {
        Value::Null => Ok(WireObject::new()),
        Value::Object(object) => Ok(object.clone()),
        _ => Err(MapperError::Validation(
            "resource state must be an object".to_string(),
        )),
    }
}

fn response_mkey(response: &WireObject) -> Option<String> {
    response
        .get(MKEY_RESPONSE_KEY)
        .and_then(wire_scalar_key)
        .filter(|id| !id.is_empty())
}

fn object_mkey(spec: &ResourceSpec, object: &WireObject) -> Option<String> {
    let mkey = spec.mkey.as_deref()?;
    object
        .get(mkey)
        .and_then(wire_scalar_key)
        .filter(|id| !id.is_empty())
}

/// Shape `planned` the way a refresh of `prior` would.
///
/// Unset attributes the device computes take their prior value. Elements of
/// nested blocks are paired with prior elements by match key (or position)
/// and settled in turn. Set blocks are sorted by their sort key.
fn settle_planned(
    fields: &[FieldSpec],
    planned: &mut WireObject,
    prior: &WireObject,
    sort: SubtableSort,
) {
    for field in fields {
        let key = field.local_key.as_str();
        if planned.get(key).map_or(true, is_unset) {
            if field.flags.computed {
                if let Some(value) = prior.get(key).filter(|v| !is_unset(v)) {
                    planned.insert(key.to_string(), value.clone());
                }
            }
            continue;
        }
        if field.children.is_empty() {
            continue;
        }
        let Some(Value::Array(elements)) = planned.get_mut(key) else {
            continue;
        };

        let prior_elements = match prior.get(key) {
            Some(Value::Array(items)) => items.as_slice(),
            _ => &[],
        };
        let match_key = field
            .list_options()
            .and_then(|options| options.match_key.as_deref())
            .and_then(|wire_key| field.child(wire_key))
            .map(|child| child.local_key.as_str());

        for (i, element) in elements.iter_mut().enumerate() {
            let Value::Object(element) = element else {
                continue;
            };
            let prior_element = match match_key {
                Some(match_key) => element
                    .get(match_key)
                    .and_then(wire_scalar_key)
                    .and_then(|wanted| {
                        prior_elements.iter().find(|p| {
                            p.get(match_key).and_then(wire_scalar_key).as_deref()
                                == Some(wanted.as_str())
                        })
                    }),
                None => prior_elements.get(i),
            };
            if let Some(Value::Object(prior_element)) = prior_element {
                settle_planned(&field.children, element, prior_element, sort);
            }
        }

        if let Some(options) = field.list_options().filter(|options| options.set) {
            if let Some(sort_key) = &options.sort_key {
                let mut local: Vec<LocalValue> = elements.iter().map(LocalValue::from).collect();
                dynamic_sort_subtable(&mut local, sort_key, sort);
                *elements = local.iter().map(LocalValue::to_wire).collect();
            }
        }
    }
}

/// Structural equality with numbers compared by value and unset members of
/// objects ignored.
fn same_value(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => {
            x == y || matches!((x.as_f64(), y.as_f64()), (Some(p), Some(q)) if p == q)
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| same_value(a, b))
        },
        (Value::Object(x), Value::Object(y)) => x.keys().chain(y.keys()).all(|key| {
            let left = x.get(key).filter(|v| !is_unset(v));
            let right = y.get(key).filter(|v| !is_unset(v));
            match (left, right) {
                (Some(l), Some(r)) => same_value(l, r),
                (None, None) => true,
                _ => false,
            }
        }),
        _ => a == b,
    }
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(object) => object.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    }
}
