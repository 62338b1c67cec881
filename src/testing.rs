//! Testing utilities.
//!
//! [`MockFortios`] is an in-memory [`RestClient`] that answers the way a
//! FortiOS device does: integers come back as JSON floats, CIDR addresses
//! come back as `"address mask"`, and secrets are never echoed.
//! [`ProviderTester`] drives a [`FortiosProvider`] through whole lifecycles.
//!
//! # Example
//!
//! ```ignore
//! use fortios_mapper::testing::{MockFortios, ProviderTester};
//! use fortios_mapper::FortiosProvider;
//! use serde_json::json;
//!
//! #[tokio::test]
//! async fn test_interface() {
//!     let tester = ProviderTester::new(FortiosProvider::new(MockFortios::new()).with_catalog());
//!     let state = tester
//!         .lifecycle_create("fortios_system_interface", json!({"name": "port1", "vdom": "root"}))
//!         .await
//!         .unwrap();
//!     assert_eq!(state["id"], "port1");
//! }
//! ```

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::MapperError;
use crate::provider::{FortiosProvider, RestClient, MKEY_RESPONSE_KEY};
use crate::scalar::is_cidr;
use crate::schema::{Diagnostic, DiagnosticSeverity};
use crate::types::{ImportedResource, PlanResult};
use crate::value::{WireObject, WireValue};

/// One call received by [`MockFortios`].
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCall {
    /// `POST path`
    Create {
        /// CMDB path.
        path: String,
        /// Body sent.
        object: WireObject,
        /// vdom parameter.
        vdom: Option<String>,
    },
    /// `GET path/mkey`
    Read {
        /// CMDB path.
        path: String,
        /// Object id.
        mkey: String,
        /// vdom parameter.
        vdom: Option<String>,
    },
    /// `PUT path/mkey`
    Update {
        /// CMDB path.
        path: String,
        /// Object id.
        mkey: String,
        /// Body sent.
        object: WireObject,
        /// vdom parameter.
        vdom: Option<String>,
    },
    /// `DELETE path/mkey`
    Delete {
        /// CMDB path.
        path: String,
        /// Object id.
        mkey: String,
        /// vdom parameter.
        vdom: Option<String>,
    },
}

#[derive(Debug, Default)]
struct MockState {
    objects: BTreeMap<(String, String), WireObject>,
    calls: Vec<RecordedCall>,
    failures: VecDeque<String>,
    next_id: u64,
}

/// An in-memory FortiOS CMDB.
///
/// Objects are stored as sent, plus any defaults registered for their path.
/// Reads render them the way the device does.
/// Objects are keyed by their `name` (or `id`) attribute; objects with
/// neither get a generated numeric id.
#[derive(Debug)]
pub struct MockFortios {
    state: Mutex<MockState>,
    secret_keys: Vec<String>,
    defaults: BTreeMap<String, WireObject>,
}

impl Default for MockFortios {
    fn default() -> Self {
        Self::new()
    }
}

impl MockFortios {
    /// Create an empty device that hides `password` on reads.
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            secret_keys: vec!["password".to_string()],
            defaults: BTreeMap::new(),
        }
    }

    /// Replace the set of keys hidden on reads.
    pub fn with_secret_keys<I, S>(mut self, keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.secret_keys = keys.into_iter().map(Into::into).collect();
        self
    }

    /// Attributes the device fills in when an object under `path` is created
    /// without them.
    pub fn with_defaults(mut self, path: &str, defaults: Value) -> Self {
        if let Value::Object(defaults) = defaults {
            self.defaults.insert(path.to_string(), defaults);
        }
        self
    }

    /// Store an object directly, bypassing call recording.
    ///
    /// Non-object values are stored as an empty object.
    pub fn insert(&self, path: &str, mkey: &str, object: Value) {
        let object = match object {
            Value::Object(object) => object,
            _ => WireObject::new(),
        };
        self.lock()
            .objects
            .insert((path.to_string(), mkey.to_string()), object);
    }

    /// The stored (unrendered) object.
    pub fn object(&self, path: &str, mkey: &str) -> Option<WireObject> {
        self.lock()
            .objects
            .get(&(path.to_string(), mkey.to_string()))
            .cloned()
    }

    /// Calls received so far, oldest first.
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.lock().calls.clone()
    }

    /// Forget recorded calls.
    pub fn clear_calls(&self) {
        self.lock().calls.clear();
    }

    /// Make the next call fail with a transport error.
    pub fn fail_next(&self, message: impl Into<String>) {
        self.lock().failures.push_back(message.into());
    }

    fn lock(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, call: RecordedCall) -> Result<MutexGuard<'_, MockState>, MapperError> {
        let mut state = self.lock();
        state.calls.push(call);
        match state.failures.pop_front() {
            Some(message) => Err(MapperError::Transport(message)),
            None => Ok(state),
        }
    }

    fn render(&self, value: &WireValue) -> WireValue {
        match value {
            WireValue::String(s) if is_cidr(s) => cidr_to_ipmask(s)
                .map(WireValue::String)
                .unwrap_or_else(|| value.clone()),
            WireValue::Number(n) => match n.as_i64() {
                Some(i) => serde_json::Number::from_f64(i as f64)
                    .map(WireValue::Number)
                    .unwrap_or_else(|| value.clone()),
                None => value.clone(),
            },
            WireValue::Array(items) => {
                WireValue::Array(items.iter().map(|item| self.render(item)).collect())
            },
            WireValue::Object(object) => WireValue::Object(self.render_object(object)),
            _ => value.clone(),
        }
    }

    fn render_object(&self, object: &WireObject) -> WireObject {
        object
            .iter()
            .filter(|(key, _)| !self.secret_keys.contains(*key))
            .map(|(key, value)| (key.clone(), self.render(value)))
            .collect()
    }
}

#[async_trait]
impl RestClient for MockFortios {
    async fn create(
        &self,
        path: &str,
        object: WireObject,
        vdom: Option<&str>,
    ) -> Result<WireObject, MapperError> {
        let mut state = self.begin(RecordedCall::Create {
            path: path.to_string(),
            object: object.clone(),
            vdom: vdom.map(str::to_string),
        })?;

        let mkey = match object_key(&object) {
            Some(mkey) => mkey,
            None => {
                state.next_id += 1;
                state.next_id.to_string()
            },
        };
        let key = (path.to_string(), mkey.clone());
        if state.objects.contains_key(&key) {
            return Err(MapperError::Transport(format!(
                "object {}/{} already exists",
                path, mkey
            )));
        }
        let mut object = object;
        if let Some(defaults) = self.defaults.get(path) {
            for (field, value) in defaults {
                object.entry(field.clone()).or_insert_with(|| value.clone());
            }
        }
        state.objects.insert(key, object);
        Ok(mkey_response(mkey))
    }

    async fn read(
        &self,
        path: &str,
        mkey: &str,
        vdom: Option<&str>,
    ) -> Result<Option<WireObject>, MapperError> {
        let state = self.begin(RecordedCall::Read {
            path: path.to_string(),
            mkey: mkey.to_string(),
            vdom: vdom.map(str::to_string),
        })?;
        Ok(state
            .objects
            .get(&(path.to_string(), mkey.to_string()))
            .map(|object| self.render_object(object)))
    }

    async fn update(
        &self,
        path: &str,
        mkey: &str,
        object: WireObject,
        vdom: Option<&str>,
    ) -> Result<WireObject, MapperError> {
        let mut state = self.begin(RecordedCall::Update {
            path: path.to_string(),
            mkey: mkey.to_string(),
            object: object.clone(),
            vdom: vdom.map(str::to_string),
        })?;

        let key = (path.to_string(), mkey.to_string());
        let Some(mut stored) = state.objects.remove(&key) else {
            return Err(MapperError::Transport(format!(
                "404 Not Found: {}/{}",
                path, mkey
            )));
        };
        for (field, value) in object {
            if value.is_null() {
                stored.remove(&field);
            } else {
                stored.insert(field, value);
            }
        }

        let new_mkey = match stored.get("name").and_then(Value::as_str) {
            Some(name) if !name.is_empty() => name.to_string(),
            _ => mkey.to_string(),
        };
        state.objects.insert((path.to_string(), new_mkey.clone()), stored);
        Ok(mkey_response(new_mkey))
    }

    async fn delete(&self, path: &str, mkey: &str, vdom: Option<&str>) -> Result<(), MapperError> {
        let mut state = self.begin(RecordedCall::Delete {
            path: path.to_string(),
            mkey: mkey.to_string(),
            vdom: vdom.map(str::to_string),
        })?;
        match state.objects.remove(&(path.to_string(), mkey.to_string())) {
            Some(_) => Ok(()),
            None => Err(MapperError::Transport(format!(
                "404 Not Found: {}/{}",
                path, mkey
            ))),
        }
    }
}

fn object_key(object: &WireObject) -> Option<String> {
    ["name", "id"].iter().find_map(|key| match object.get(*key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn mkey_response(mkey: String) -> WireObject {
    let mut response = WireObject::new();
    response.insert(MKEY_RESPONSE_KEY.to_string(), Value::String(mkey));
    response
}

/// Rewrite `"10.0.0.1/24"` as `"10.0.0.1 255.255.255.0"`.
fn cidr_to_ipmask(text: &str) -> Option<String> {
    let (addr, prefix) = text.split_once('/')?;
    let addr: Ipv4Addr = addr.parse().ok()?;
    let prefix: u32 = prefix.parse().ok()?;
    let mask = u32::MAX.checked_shl(32u32.checked_sub(prefix)?).unwrap_or(0);
    Some(format!("{} {}", addr, Ipv4Addr::from(mask)))
}

// =========================================================================
// Provider harness
// =========================================================================

/// A test harness around a [`FortiosProvider`].
pub struct ProviderTester<C: RestClient> {
    provider: FortiosProvider<C>,
}

impl<C: RestClient> ProviderTester<C> {
    /// Create a new tester for the given provider.
    pub fn new(provider: FortiosProvider<C>) -> Self {
        Self { provider }
    }

    /// Get a reference to the underlying provider.
    pub fn provider(&self) -> &FortiosProvider<C> {
        &self.provider
    }

    /// The injected client.
    pub fn client(&self) -> &C {
        self.provider.client()
    }

    /// Registered resource type names.
    pub fn resource_types(&self) -> Vec<String> {
        self.provider.metadata().resources
    }

    /// Registered data source type names.
    pub fn data_source_types(&self) -> Vec<String> {
        self.provider.metadata().data_sources
    }

    /// Configure the provider, failing on error diagnostics.
    pub async fn configure(&self, config: Value) -> Result<(), TestError> {
        let diagnostics = self.provider.configure(config).await?;
        check_diagnostics(diagnostics)
    }

    /// Validate resource configuration, failing on error diagnostics.
    pub async fn validate_resource_config(
        &self,
        resource_type: &str,
        config: Value,
    ) -> Result<(), TestError> {
        let diagnostics = self
            .provider
            .validate_resource_config(resource_type, config)
            .await?;
        check_diagnostics(diagnostics)
    }

    /// Plan an object creation.
    pub async fn plan_create(
        &self,
        resource_type: &str,
        proposed_state: Value,
    ) -> Result<PlanResult, MapperError> {
        self.provider.plan(resource_type, None, proposed_state).await
    }

    /// Plan an update.
    pub async fn plan_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<PlanResult, MapperError> {
        self.provider
            .plan(resource_type, Some(prior_state), proposed_state)
            .await
    }

    /// Plan a deletion.
    pub async fn plan_delete(
        &self,
        resource_type: &str,
        prior_state: Value,
    ) -> Result<PlanResult, MapperError> {
        self.provider
            .plan(resource_type, Some(prior_state), Value::Null)
            .await
    }

    /// Create an object.
    pub async fn create(&self, resource_type: &str, planned_state: Value) -> Result<Value, MapperError> {
        self.provider.create(resource_type, planned_state).await
    }

    /// Read an object; a vanished object is a [`MapperError::NotFound`].
    pub async fn read(&self, resource_type: &str, current_state: Value) -> Result<Value, MapperError> {
        let id = current_state
            .get("id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        self.provider
            .read(resource_type, current_state)
            .await?
            .ok_or_else(|| MapperError::NotFound(format!("{} {}", resource_type, id)))
    }

    /// Update an object.
    pub async fn update(
        &self,
        resource_type: &str,
        prior_state: Value,
        planned_state: Value,
    ) -> Result<Value, MapperError> {
        self.provider
            .update(resource_type, prior_state, planned_state)
            .await
    }

    /// Delete an object.
    pub async fn delete(&self, resource_type: &str, current_state: Value) -> Result<(), MapperError> {
        self.provider.delete(resource_type, current_state).await
    }

    /// Import an object by id.
    pub async fn import_resource(
        &self,
        resource_type: &str,
        id: &str,
    ) -> Result<Vec<ImportedResource>, MapperError> {
        self.provider.import_resource(resource_type, id).await
    }

    /// Read a data source.
    pub async fn read_data_source(
        &self,
        data_source_type: &str,
        config: Value,
    ) -> Result<Value, MapperError> {
        self.provider.read_data_source(data_source_type, config).await
    }

    // =========================================================================
    // Lifecycle helpers
    // =========================================================================

    /// plan, create, read. Returns the state after read.
    pub async fn lifecycle_create(&self, resource_type: &str, config: Value) -> Result<Value, MapperError> {
        let plan = self.plan_create(resource_type, config).await?;
        let created = self.create(resource_type, plan.planned_state).await?;
        self.read(resource_type, created).await
    }

    /// plan, update, read. Returns the state after read.
    pub async fn lifecycle_update(
        &self,
        resource_type: &str,
        prior_state: Value,
        proposed_state: Value,
    ) -> Result<Value, MapperError> {
        let plan = self
            .plan_update(resource_type, prior_state.clone(), proposed_state)
            .await?;
        let updated = self
            .update(resource_type, prior_state, plan.planned_state)
            .await?;
        self.read(resource_type, updated).await
    }

    /// plan, delete.
    pub async fn lifecycle_delete(&self, resource_type: &str, current_state: Value) -> Result<(), MapperError> {
        self.plan_delete(resource_type, current_state.clone()).await?;
        self.delete(resource_type, current_state).await
    }

    /// create, update, delete. Returns the state after the update.
    pub async fn lifecycle_crud(
        &self,
        resource_type: &str,
        initial_config: Value,
        updated_config: Value,
    ) -> Result<Value, MapperError> {
        let created = self.lifecycle_create(resource_type, initial_config).await?;
        let updated = self
            .lifecycle_update(resource_type, created, updated_config)
            .await?;
        self.lifecycle_delete(resource_type, updated.clone()).await?;
        Ok(updated)
    }
}

/// Error type for test operations that may fail with diagnostics.
#[derive(Debug)]
pub enum TestError {
    /// The operation returned error diagnostics.
    Diagnostics(Vec<Diagnostic>),
    /// The operation failed.
    Provider(MapperError),
}

impl std::fmt::Display for TestError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TestError::Diagnostics(diags) => {
                writeln!(f, "Operation failed with {} diagnostic(s):", diags.len())?;
                for diag in diags {
                    write!(f, "  [{:?}] {}", diag.severity, diag.summary)?;
                    if let Some(detail) = &diag.detail {
                        write!(f, ": {}", detail)?;
                    }
                    if let Some(attr) = &diag.attribute {
                        write!(f, " (at {})", attr)?;
                    }
                    writeln!(f)?;
                }
                Ok(())
            },
            TestError::Provider(e) => write!(f, "Provider error: {}", e),
        }
    }
}

impl std::error::Error for TestError {}

impl From<MapperError> for TestError {
    fn from(e: MapperError) -> Self {
        TestError::Provider(e)
    }
}

fn check_diagnostics(diagnostics: Vec<Diagnostic>) -> Result<(), TestError> {
    let errors: Vec<_> = diagnostics.into_iter().filter(Diagnostic::is_error).collect();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(TestError::Diagnostics(errors))
    }
}

// =========================================================================
// Assertion helpers
// =========================================================================

/// Assert that a plan changes something without replacing the object.
///
/// # Panics
///
/// Panics if the plan has no changes or requires replacement.
pub fn assert_plan_updates_in_place(plan: &PlanResult) {
    assert!(
        plan.has_changes(),
        "Expected plan to have changes, but got no changes"
    );
    assert!(
        !plan.requires_replace,
        "Expected plan to update in place, but it requires replacement"
    );
}

/// Assert that a plan has no changes.
///
/// # Panics
///
/// Panics if the plan has any changes.
pub fn assert_plan_no_changes(plan: &PlanResult) {
    assert!(
        plan.changes.is_empty(),
        "Expected no changes, but got {} change(s): {:?}",
        plan.changes.len(),
        plan.changes
    );
}

/// Assert that a plan requires replacement.
///
/// # Panics
///
/// Panics if the plan does not require replacement.
pub fn assert_plan_replaces(plan: &PlanResult) {
    assert!(
        plan.requires_replace,
        "Expected plan to require replacement, but it does not"
    );
}

/// Assert that a plan changes the attribute at `path`.
///
/// # Panics
///
/// Panics if the attribute is not changed.
pub fn assert_plan_changes_attribute(plan: &PlanResult, path: &str) {
    assert!(
        plan.changes.iter().any(|c| c.path == path),
        "Expected plan to change attribute '{}'. Changed attributes: {:?}",
        path,
        plan.changed_paths()
    );
}

/// Assert that diagnostics contain no errors.
///
/// # Panics
///
/// Panics if there are any error diagnostics.
pub fn assert_no_errors(diagnostics: &[Diagnostic]) {
    let errors: Vec<_> = diagnostics
        .iter()
        .filter(|d| matches!(d.severity, DiagnosticSeverity::Error))
        .collect();
    assert!(
        errors.is_empty(),
        "Expected no errors, but got {} error(s): {:?}",
        errors.len(),
        errors.iter().map(|d| &d.summary).collect::<Vec<_>>()
    );
}

/// Assert that some error diagnostic is attached to `attribute`.
///
/// # Panics
///
/// Panics if no error names the attribute.
pub fn assert_error_at(diagnostics: &[Diagnostic], attribute: &str) {
    assert!(
        diagnostics
            .iter()
            .any(|d| d.is_error() && d.attribute.as_deref() == Some(attribute)),
        "Expected an error at '{}'. Errors: {:?}",
        attribute,
        diagnostics
            .iter()
            .filter(|d| d.is_error())
            .map(|d| (&d.attribute, &d.summary))
            .collect::<Vec<_>>()
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;
    use tokio_test::{assert_err, assert_ok};

    const INTERFACE: &str = "fortios_system_interface";
    const ADMIN: &str = "fortios_system_admin";
    const WIDS: &str = "fortios_wirelesscontroller_widsprofile";
    const GLOBAL: &str = "fortios_system_global";

    fn tester() -> ProviderTester<Arc<MockFortios>> {
        ProviderTester::new(FortiosProvider::new(Arc::new(MockFortios::new())).with_catalog())
    }

    #[test]
    fn test_cidr_to_ipmask() {
        assert_eq!(
            cidr_to_ipmask("10.0.0.1/24").as_deref(),
            Some("10.0.0.1 255.255.255.0")
        );
        assert_eq!(cidr_to_ipmask("0.0.0.0/0").as_deref(), Some("0.0.0.0 0.0.0.0"));
        assert_eq!(
            cidr_to_ipmask("10.0.0.1/32").as_deref(),
            Some("10.0.0.1 255.255.255.255")
        );
    }

    #[test]
    fn test_mock_renders_like_the_device() {
        let mock = MockFortios::new();
        mock.insert(
            "system/admin",
            "admin",
            json!({
                "name": "admin",
                "password": "secret",
                "trusthost1": "10.0.0.0/8",
                "vdom": [{"name": "root"}],
                "gui-dashboard": [{"id": 1}]
            }),
        );

        let object = tokio_test::block_on(mock.read("system/admin", "admin", None));
        let object = assert_ok!(object).unwrap();
        assert_eq!(
            Value::Object(object),
            json!({
                "name": "admin",
                "trusthost1": "10.0.0.0 255.0.0.0",
                "vdom": [{"name": "root"}],
                "gui-dashboard": [{"id": 1.0}]
            })
        );
    }

    #[test]
    fn test_mock_failure_injection() {
        let mock = MockFortios::new();
        mock.fail_next("timeout");
        assert_err!(tokio_test::block_on(mock.delete("system/interface", "port1", None)));
        // The failure is consumed; the next call reaches the store.
        let err = tokio_test::block_on(mock.delete("system/interface", "port1", None)).unwrap_err();
        assert!(err.message().starts_with("404"));
        assert_eq!(mock.calls().len(), 2);
    }

    #[tokio::test]
    async fn test_mock_create_assigns_ids() {
        let mock = MockFortios::new();
        let response = mock
            .create("firewall/policy", json!({"action": "accept"}).as_object().unwrap().clone(), None)
            .await
            .unwrap();
        assert_eq!(response[MKEY_RESPONSE_KEY], "1");

        let object = json!({"name": "port1"}).as_object().unwrap().clone();
        assert_ok!(mock.create("system/interface", object.clone(), None).await);
        assert_err!(mock.create("system/interface", object, None).await);
    }

    #[tokio::test]
    async fn test_tester_configure() {
        let tester = tester();
        assert_ok!(tester.configure(json!({"vdom": "root"})).await);
        let err = tester.configure(json!({"vdom": ["root"]})).await.unwrap_err();
        assert!(matches!(err, TestError::Diagnostics(_)));
    }

    #[tokio::test]
    async fn test_tester_validate() {
        let tester = tester();
        assert_ok!(
            tester
                .validate_resource_config(INTERFACE, json!({"name": "port1", "vdom": "root"}))
                .await
        );

        let diagnostics = tester
            .provider()
            .validate_resource_config(INTERFACE, json!({"vdom": "root", "vlanid": "x"}))
            .await
            .unwrap();
        assert_error_at(&diagnostics, "name");
        assert_error_at(&diagnostics, "vlanid");
    }

    #[tokio::test]
    async fn test_tester_resource_types() {
        let tester = tester();
        assert!(tester.resource_types().contains(&ADMIN.to_string()));
        assert_eq!(tester.data_source_types(), vec![INTERFACE.to_string()]);
    }

    #[tokio::test]
    async fn test_lifecycle_crud_interface() {
        let tester = tester();
        let state = tester
            .lifecycle_crud(
                INTERFACE,
                json!({
                    "name": "port1",
                    "vdom": "root",
                    "ip": "192.168.1.99/24",
                    "secondaryip": [
                        {"id": 1, "ip": "10.0.1.1/24"},
                        {"id": 2, "ip": "10.0.2.1/24"}
                    ]
                }),
                json!({
                    "name": "port1",
                    "vdom": "root",
                    "ip": "192.168.1.99/24",
                    "alias": "lan",
                    "secondaryip": [{"id": 2, "ip": "10.0.2.1/16"}]
                }),
            )
            .await
            .unwrap();

        assert_eq!(state["id"], "port1");
        assert_eq!(state["alias"], "lan");
        assert_eq!(state["ip"], "192.168.1.99/24");
        assert_eq!(state["secondaryip"], json!([{"id": 2, "ip": "10.0.2.1/16"}]));
        assert!(tester.client().object("system/interface", "port1").is_none());
    }

    #[tokio::test]
    async fn test_lifecycle_admin_keeps_password_and_sorts_vdoms() {
        let tester = tester();
        let config = json!({
            "name": "ops",
            "password": "hunter2",
            "trusthost1": "10.0.0.0/8",
            "vdom": [{"name": "root"}, {"name": "dmz"}]
        });
        let state = tester.lifecycle_create(ADMIN, config.clone()).await.unwrap();

        assert_eq!(state["password"], "hunter2");
        assert_eq!(state["trusthost1"], "10.0.0.0/8");
        assert_eq!(state["vdom"], json!([{"name": "dmz"}, {"name": "root"}]));

        // The configured vdom order differs from the refreshed one.
        let plan = tester
            .plan_update(ADMIN, state.clone(), config)
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
        assert_eq!(
            plan.planned_state["vdom"],
            json!([{"name": "dmz"}, {"name": "root"}])
        );

        let plan = tester
            .plan_update(
                ADMIN,
                state.clone(),
                json!({
                    "name": "ops",
                    "password": "hunter2",
                    "trusthost1": "10.0.0.0/8",
                    "vdom": [{"name": "root"}]
                }),
            )
            .await
            .unwrap();
        assert_plan_updates_in_place(&plan);
        assert_plan_changes_attribute(&plan, "vdom");

        let mut renamed = state.clone();
        renamed["name"] = json!("ops2");
        let plan = tester.plan_update(ADMIN, state, renamed).await.unwrap();
        assert_plan_replaces(&plan);
        assert_plan_changes_attribute(&plan, "name");
    }

    #[tokio::test]
    async fn test_lifecycle_wids_channels() {
        let tester = tester();
        let created = tester
            .lifecycle_create(
                WIDS,
                json!({
                    "name": "default",
                    "ap_scan_channel_list_2g_5g": [{"chan": "40"}, {"chan": "36"}]
                }),
            )
            .await
            .unwrap();
        assert_eq!(
            created["ap_scan_channel_list_2g_5g"],
            json!([{"chan": "36"}, {"chan": "40"}])
        );

        let sent = tester
            .client()
            .calls()
            .into_iter()
            .find_map(|c| match c {
                RecordedCall::Create { object, .. } => Some(object),
                _ => None,
            })
            .unwrap();
        assert_eq!(
            sent["ap-scan-channel-list-2G-5G"],
            json!([{"chan": "40"}, {"chan": "36"}])
        );

        let mut proposed = created.clone();
        proposed["ap_scan_channel_list_2g_5g"] = json!([]);
        let plan = tester
            .plan_update(WIDS, created.clone(), proposed)
            .await
            .unwrap();
        assert_plan_updates_in_place(&plan);

        let updated = tester
            .update(WIDS, created, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(updated["ap_scan_channel_list_2g_5g"], json!([]));
        let stored = tester
            .client()
            .object("wireless-controller/wids-profile", "default")
            .unwrap();
        assert_eq!(stored["ap-scan-channel-list-2G-5G"], json!([]));
    }

    #[tokio::test]
    async fn test_lifecycle_interface_keeps_device_defaults() {
        let mock = MockFortios::new().with_defaults(
            "system/interface",
            json!({"mtu": 1500, "status": "up", "type": "physical"}),
        );
        let tester = ProviderTester::new(FortiosProvider::new(Arc::new(mock)).with_catalog());
        let config = json!({
            "name": "port1",
            "vdom": "root",
            "ip": "192.168.1.99/24",
            "secondaryip": [{"id": 1, "ip": "10.0.1.1/24"}]
        });
        let state = tester.lifecycle_create(INTERFACE, config.clone()).await.unwrap();
        assert_eq!(state["mtu"], 1500);
        assert_eq!(state["status"], "up");

        let plan = tester
            .plan_update(INTERFACE, state.clone(), config.clone())
            .await
            .unwrap();
        assert_plan_no_changes(&plan);
        assert_eq!(plan.planned_state["mtu"], 1500);

        // Applying the unchanged config leaves the device values alone.
        tester.client().clear_calls();
        let updated = tester
            .update(INTERFACE, state, plan.planned_state)
            .await
            .unwrap();
        assert_eq!(updated["mtu"], 1500);
        let sent = tester
            .client()
            .calls()
            .into_iter()
            .find_map(|c| match c {
                RecordedCall::Update { object, .. } => Some(object),
                _ => None,
            })
            .unwrap();
        assert!(sent.values().all(|v| !v.is_null()), "update cleared {:?}", sent);
        let stored = tester.client().object("system/interface", "port1").unwrap();
        assert_eq!(stored["status"], "up");

        // Overriding a device value is still a change.
        let mut override_mtu = config;
        override_mtu["mtu"] = json!(1400);
        let plan = tester
            .plan_update(INTERFACE, updated, override_mtu)
            .await
            .unwrap();
        assert_plan_changes_attribute(&plan, "mtu");
        assert_eq!(plan.changes.len(), 1);
    }

    #[tokio::test]
    async fn test_lifecycle_global_float_settings() {
        let tester = tester();
        tester.client().insert(
            "system/global",
            "SystemGlobal",
            json!({"hostname": "FGT60F", "timezone": "04", "admintimeout": 5}),
        );
        let config = json!({"hostname": "fw", "cpu_use_threshold": 80});
        let state = tester.lifecycle_create(GLOBAL, config.clone()).await.unwrap();
        assert_eq!(state["id"], "SystemGlobal");
        assert_eq!(state["timezone"], "04");
        assert_eq!(state["cpu_use_threshold"].as_f64(), Some(80.0));

        let plan = tester.plan_update(GLOBAL, state.clone(), config).await.unwrap();
        assert_plan_no_changes(&plan);

        let plan = tester
            .plan_update(GLOBAL, state, json!({"hostname": "fw", "cpu_use_threshold": 80.5}))
            .await
            .unwrap();
        assert_plan_changes_attribute(&plan, "cpu_use_threshold");
    }

    #[tokio::test]
    async fn test_mock_hides_secret_keys_at_any_depth() {
        let mock = MockFortios::new().with_secret_keys(["secret", "psksecret"]);
        mock.insert(
            "vpn.ipsec/phase1-interface",
            "hq",
            json!({
                "name": "hq",
                "psksecret": "s3cret",
                "password": "visible",
                "backup-gateway": [{"address": "198.51.100.1", "secret": "x"}]
            }),
        );

        let object = mock
            .read("vpn.ipsec/phase1-interface", "hq", None)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            Value::Object(object),
            json!({
                "name": "hq",
                "password": "visible",
                "backup-gateway": [{"address": "198.51.100.1"}]
            })
        );
    }

    #[tokio::test]
    async fn test_read_after_external_delete() {
        let tester = tester();
        let state = tester
            .lifecycle_create(INTERFACE, json!({"name": "port3", "vdom": "root"}))
            .await
            .unwrap();
        assert_ok!(
            tester
                .client()
                .delete("system/interface", "port3", None)
                .await
        );

        let err = tester.read(INTERFACE, state.clone()).await.unwrap_err();
        assert!(matches!(err, MapperError::NotFound(_)));
        assert_eq!(tester.provider().read(INTERFACE, state).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_import_then_read_data_source() {
        let tester = tester();
        tester.client().insert(
            "system/interface",
            "wan1",
            json!({"name": "wan1", "vdom": "root", "mtu": 1500}),
        );

        let imported = tester.import_resource(INTERFACE, "wan1").await.unwrap();
        assert_eq!(imported[0].state["mtu"], 1500);

        let data = tester
            .read_data_source(INTERFACE, json!({"name": "wan1"}))
            .await
            .unwrap();
        assert_eq!(data["vdom"], "root");
    }

    #[test]
    fn test_assert_no_errors() {
        assert_no_errors(&[Diagnostic::warning("Just a warning")]);
    }

    #[test]
    #[should_panic(expected = "Expected no errors")]
    fn test_assert_no_errors_fails() {
        assert_no_errors(&[Diagnostic::error("An error")]);
    }

    #[test]
    fn test_test_error_display() {
        let err = TestError::Diagnostics(vec![
            Diagnostic::error("First error").with_attribute("vlanid"),
            Diagnostic::error("Second error").with_detail("More info"),
        ]);

        let display = format!("{}", err);
        assert!(display.contains("First error"));
        assert!(display.contains("Second error"));
        assert!(display.contains("vlanid"));
        assert!(display.contains("More info"));

        let err = TestError::from(MapperError::Transport("reset".to_string()));
        assert_eq!(format!("{}", err), "Provider error: Transport error: reset");
    }
}
