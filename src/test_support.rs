//! Test support utilities shared across unit and integration tests.
//!
//! [`FakeArray`] is an in-memory array answering the REST wire format used by
//! the driver; [`ScriptedHost`] stands in for the host-side attach and copy
//! primitives.

use std::collections::{BTreeMap, BTreeSet};
use std::env;
use std::ffi::OsString;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use camino::Utf8PathBuf;
use serde_json::{Map, Value, json};
use tokio::sync::{Mutex, MutexGuard};

use crate::array::{ArrayError, ArrayRequest, BackendFuture, Method, Transport};
use crate::config::K2Config;
use crate::connector::{
    AttachInfo, ConnectionInfo, Connector, ConnectorError, CopyRequest, HostConnector,
};
use crate::driver::K2Driver;
use crate::naming;

/// Busy answer used by [`FakeArray::busy_next`] and [`FakeArray::always_busy`].
pub const BUSY_BODY: &str = r#"{"error_code": "MC_ERR_BUSY", "message": "system is busy"}"#;

/// Returns a configuration accepted by [`K2Config::validate`].
#[must_use]
pub fn valid_config() -> K2Config {
    K2Config {
        san_ip: String::from("10.0.0.5"),
        san_login: String::from("admin"),
        san_password: String::from("secret"),
        api_path: String::from("/api/v2"),
        ssl_validate: None,
        suppress_ssl_warnings: Some(true),
        auto_calc_max_oversubscription_ratio: None,
        max_over_subscription_ratio: 20.0,
        volume_dd_blocksize: String::from("1M"),
        volume_backend_name: None,
        storage_protocol: String::from("iSCSI"),
        http_timeout_secs: 30,
    }
}

/// Builds a driver over a [`FakeArray::seeded`] array and returns both.
///
/// # Panics
///
/// Panics if [`valid_config`] stops validating.
#[must_use]
#[expect(clippy::expect_used, reason = "test helper with a known-valid configuration")]
pub fn fake_driver() -> (K2Driver<FakeArray>, FakeArray) {
    let array = FakeArray::seeded();
    let driver = K2Driver::with_transport(valid_config(), array.clone())
        .expect("valid config builds a driver");
    (driver, array)
}

#[derive(Debug)]
struct InjectedFailure {
    method: Method,
    collection: String,
    error: ArrayError,
}

#[derive(Debug, Default)]
struct ArrayState {
    collections: BTreeMap<String, BTreeMap<u64, Value>>,
    next_id: u64,
    next_lun: u32,
    requests: Vec<ArrayRequest>,
    failures: Vec<InjectedFailure>,
    busy_remaining: u32,
    always_busy: bool,
}

/// In-memory array implementing [`Transport`].
///
/// Objects are stored as JSON per collection. Searches match query pairs
/// against top-level fields, comparing references by path. Clones share the
/// same state, so a test can keep a handle while the driver owns another.
#[derive(Clone, Debug, Default)]
pub struct FakeArray {
    state: Arc<StdMutex<ArrayState>>,
}

impl FakeArray {
    /// Creates an empty array.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an array with a supported API version, capacity counters and
    /// the retention policy every snapshot needs.
    #[must_use]
    pub fn seeded() -> Self {
        let array = Self::new();
        array.insert("system/state", json!({"rest_api_version": "2.2.0"}));
        array.insert(
            "system/capacity",
            json!({
                "free": 8 * 1_048_576_u64,
                "total": 10 * 1_048_576_u64,
                "provisioned": 6 * 1_048_576_u64,
                "provisioned_volumes": 4 * 1_048_576_u64,
            }),
        );
        array.insert(
            "retention_policies",
            json!({"name": naming::RETENTION_POLICY_NAME}),
        );
        array
    }

    fn state(&self) -> std::sync::MutexGuard<'_, ArrayState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores `object` in `collection` and returns its new id.
    pub fn insert(&self, collection: &str, object: Value) -> u64 {
        let mut state = self.state();
        state.insert(collection, object)
    }

    /// Merges `fields` into the object `id` of `collection`.
    pub fn update(&self, collection: &str, id: u64, fields: Value) {
        let mut state = self.state();
        if let Some(object) = state
            .collections
            .get_mut(collection)
            .and_then(|objects| objects.get_mut(&id))
        {
            merge(object, fields);
        }
    }

    /// Removes every object of `collection`.
    pub fn clear(&self, collection: &str) {
        self.state().collections.remove(collection);
    }

    /// Returns every object in `collection`.
    #[must_use]
    pub fn objects(&self, collection: &str) -> Vec<Value> {
        self.state()
            .collections
            .get(collection)
            .map(|objects| objects.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Returns the object of `collection` whose `field` equals `value`.
    #[must_use]
    pub fn find(&self, collection: &str, field: &str, value: &str) -> Option<Value> {
        self.objects(collection)
            .into_iter()
            .find(|object| field_matches(object, field, value))
    }

    /// Returns true when `collection` holds an object named `name`.
    #[must_use]
    pub fn has_named(&self, collection: &str, name: &str) -> bool {
        let field = if collection == "snapshots" {
            "short_name"
        } else {
            "name"
        };
        self.find(collection, field, name).is_some()
    }

    /// Number of objects in `collection`.
    #[must_use]
    pub fn count(&self, collection: &str) -> usize {
        self.state()
            .collections
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Fails the next `method` request against `collection` with `error`.
    pub fn fail_next(&self, method: Method, collection: &str, error: ArrayError) {
        self.state().failures.push(InjectedFailure {
            method,
            collection: collection.to_owned(),
            error,
        });
    }

    /// Answers the next `count` requests with a busy error.
    pub fn busy_next(&self, count: u32) {
        self.state().busy_remaining = count;
    }

    /// Answers every request with a busy error while `enabled`.
    pub fn always_busy(&self, enabled: bool) {
        self.state().always_busy = enabled;
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn requests(&self) -> Vec<ArrayRequest> {
        self.state().requests.clone()
    }

    /// Forgets the recorded requests.
    pub fn clear_requests(&self) {
        self.state().requests.clear();
    }

    fn answer(&self, request: &ArrayRequest) -> Result<Value, ArrayError> {
        let mut state = self.state();
        state.requests.push(request.clone());

        if state.always_busy {
            return Err(busy());
        }
        if state.busy_remaining > 0 {
            state.busy_remaining -= 1;
            return Err(busy());
        }

        let (collection, id) = split_path(&request.path);
        if let Some(position) = state
            .failures
            .iter()
            .position(|failure| failure.method == request.method && failure.collection == collection)
        {
            return Err(state.failures.remove(position).error);
        }

        match (request.method, id) {
            (Method::Get, None) => Ok(state.search(&collection, &request.query)),
            (Method::Get, Some(object_id)) => state.get(&collection, object_id),
            (Method::Post, None) => state.create(&collection, request.body.clone()),
            (Method::Patch, Some(object_id)) => {
                state.patch(&collection, object_id, request.body.clone())
            }
            (Method::Delete, Some(object_id)) => state.delete(&collection, object_id),
            _ => Err(ArrayError::Request {
                status: 405,
                body: format!("{} not allowed on {}", request.method.as_str(), request.path),
            }),
        }
    }
}

impl Transport for FakeArray {
    fn send<'a>(&'a self, request: &'a ArrayRequest) -> BackendFuture<'a, Value, ArrayError> {
        Box::pin(std::future::ready(self.answer(request)))
    }
}

impl ArrayState {
    fn insert(&mut self, collection: &str, object: Value) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        let mut stored = object;
        if let Value::Object(fields) = &mut stored {
            fields.insert(String::from("id"), json!(id));
        }
        self.collections
            .entry(collection.to_owned())
            .or_default()
            .insert(id, stored);
        id
    }

    fn search(&self, collection: &str, query: &[(String, String)]) -> Value {
        let hits: Vec<Value> = self
            .collections
            .get(collection)
            .map(|objects| {
                objects
                    .values()
                    .filter(|object| {
                        query
                            .iter()
                            .all(|(field, value)| field_matches(object, field, value))
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        json!({"total": hits.len(), "hits": hits})
    }

    fn get(&self, collection: &str, id: u64) -> Result<Value, ArrayError> {
        self.collections
            .get(collection)
            .and_then(|objects| objects.get(&id))
            .cloned()
            .ok_or_else(|| not_found(collection, id))
    }

    fn create(&mut self, collection: &str, body: Option<Value>) -> Result<Value, ArrayError> {
        let mut object = body.unwrap_or_else(|| Value::Object(Map::new()));
        if let Some(name) = object.get("name").and_then(Value::as_str) {
            let taken = self
                .collections
                .get(collection)
                .is_some_and(|objects| {
                    objects
                        .values()
                        .any(|existing| field_matches(existing, "name", name))
                });
            if taken {
                return Err(ArrayError::Request {
                    status: 400,
                    body: format!(r#"{{"error_code": "MC_ERR_NAME_EXISTS", "name": "{name}"}}"#),
                });
            }
        }

        if collection == "mappings" {
            self.next_lun += 1;
            merge(&mut object, json!({"lun": self.next_lun}));
        }
        let exposable = collection == "snapshots"
            && object.get("is_exposable").and_then(Value::as_bool) == Some(true);

        let id = self.insert(collection, object);
        if exposable {
            self.insert(
                "volsnaps",
                json!({"snapshot": {"ref": format!("/snapshots/{id}")}}),
            );
        }
        self.get(collection, id)
    }

    fn patch(&mut self, collection: &str, id: u64, body: Option<Value>) -> Result<Value, ArrayError> {
        let object = self
            .collections
            .get_mut(collection)
            .and_then(|objects| objects.get_mut(&id))
            .ok_or_else(|| not_found(collection, id))?;
        if let Some(fields) = body {
            merge(object, fields);
        }
        Ok(object.clone())
    }

    fn delete(&mut self, collection: &str, id: u64) -> Result<Value, ArrayError> {
        self.collections
            .get_mut(collection)
            .and_then(|objects| objects.remove(&id))
            .ok_or_else(|| not_found(collection, id))?;

        let reference = format!("/{collection}/{id}");
        let dependants: &[(&str, &str)] = match collection {
            "volume_groups" => &[("volumes", "volume_group")],
            "snapshots" => &[("volsnaps", "snapshot")],
            "hosts" => &[("host_iqns", "host"), ("mappings", "host")],
            "volumes" => &[("mappings", "volume")],
            _ => &[],
        };
        for (child, field) in dependants {
            if let Some(objects) = self.collections.get_mut(*child) {
                objects.retain(|_, object| !field_matches(object, field, &reference));
            }
        }
        Ok(Value::Null)
    }
}

fn busy() -> ArrayError {
    ArrayError::Request {
        status: 400,
        body: BUSY_BODY.to_owned(),
    }
}

fn not_found(collection: &str, id: u64) -> ArrayError {
    ArrayError::Request {
        status: 404,
        body: format!("/{collection}/{id} not found"),
    }
}

/// Splits `/collection/id` into its parts; paths without a numeric tail are
/// whole collections.
fn split_path(path: &str) -> (String, Option<u64>) {
    let trimmed = path.trim_start_matches('/');
    trimmed
        .rsplit_once('/')
        .and_then(|(collection, tail)| {
            tail.parse::<u64>()
                .ok()
                .map(|id| (collection.to_owned(), Some(id)))
        })
        .unwrap_or_else(|| (trimmed.to_owned(), None))
}

fn field_matches(object: &Value, field: &str, expected: &str) -> bool {
    match object.get(field) {
        Some(Value::String(actual)) => actual == expected,
        Some(Value::Number(actual)) => actual.to_string() == expected,
        Some(Value::Bool(actual)) => actual.to_string() == expected,
        Some(Value::Object(reference)) => reference
            .get("ref")
            .and_then(Value::as_str)
            .is_some_and(|path| path == expected),
        _ => false,
    }
}

fn merge(target: &mut Value, fields: Value) {
    if let (Value::Object(existing), Value::Object(updates)) = (target, fields) {
        existing.extend(updates);
    }
}

/// Call recorded by [`ScriptedHost`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum HostCall {
    /// A device was attached.
    Connect(ConnectionInfo),
    /// A device was detached.
    Disconnect(Utf8PathBuf),
    /// Blocks were copied.
    Copy(CopyRequest),
}

#[derive(Debug, Default)]
struct HostState {
    calls: Vec<HostCall>,
    attached: BTreeSet<Utf8PathBuf>,
    fail_copy: bool,
    failing_detaches: u32,
}

/// Scripted [`HostConnector`] recording every call.
#[derive(Clone, Debug)]
pub struct ScriptedHost {
    connector: Connector,
    state: Arc<StdMutex<HostState>>,
}

impl ScriptedHost {
    /// Creates a host reporting `host` as its name.
    #[must_use]
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            connector: Connector::new(host),
            state: Arc::default(),
        }
    }

    /// Reports `iqn` as the host's initiator.
    #[must_use]
    pub fn with_initiator(mut self, iqn: impl Into<String>) -> Self {
        self.connector = self.connector.initiator(iqn);
        self
    }

    /// Makes every copy fail.
    pub fn fail_copy(&self) {
        self.state().fail_copy = true;
    }

    /// Makes the next `count` detaches fail, leaving their devices attached.
    pub fn fail_detaches(&self, count: u32) {
        self.state().failing_detaches = count;
    }

    /// Returns the recorded calls.
    #[must_use]
    pub fn calls(&self) -> Vec<HostCall> {
        self.state().calls.clone()
    }

    /// Returns the recorded copies.
    #[must_use]
    pub fn copies(&self) -> Vec<CopyRequest> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                HostCall::Copy(request) => Some(request),
                _ => None,
            })
            .collect()
    }

    /// Returns the devices still attached.
    #[must_use]
    pub fn attached(&self) -> Vec<Utf8PathBuf> {
        self.state().attached.iter().cloned().collect()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, HostState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl HostConnector for ScriptedHost {
    fn properties(&self) -> Connector {
        self.connector.clone()
    }

    fn connect_device<'a>(
        &'a self,
        connection: &'a ConnectionInfo,
    ) -> BackendFuture<'a, AttachInfo, ConnectorError> {
        let device_path = Utf8PathBuf::from(format!(
            "/dev/k2/{}/lun{}",
            connection.target_name, connection.lun
        ));
        let mut state = self.state();
        state.calls.push(HostCall::Connect(connection.clone()));
        state.attached.insert(device_path.clone());
        Box::pin(std::future::ready(Ok(AttachInfo {
            device_path,
            connection: connection.clone(),
        })))
    }

    fn disconnect_volume<'a>(
        &'a self,
        attach: &'a AttachInfo,
    ) -> BackendFuture<'a, (), ConnectorError> {
        let mut state = self.state();
        state
            .calls
            .push(HostCall::Disconnect(attach.device_path.clone()));
        if state.failing_detaches > 0 {
            state.failing_detaches -= 1;
            return Box::pin(std::future::ready(Err(ConnectorError::new(
                "detach",
                "injected detach failure",
            ))));
        }
        state.attached.remove(&attach.device_path);
        Box::pin(std::future::ready(Ok(())))
    }

    fn copy_blocks<'a>(
        &'a self,
        request: &'a CopyRequest,
    ) -> BackendFuture<'a, (), ConnectorError> {
        let mut state = self.state();
        state.calls.push(HostCall::Copy(request.clone()));
        let outcome = if state.fail_copy {
            Err(ConnectorError::new("copy", "injected copy failure"))
        } else {
            Ok(())
        };
        Box::pin(std::future::ready(outcome))
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
#[derive(Debug)]
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("/volumes", "volumes", None)]
    #[case("/volumes/7", "volumes", Some(7))]
    #[case("/system/capacity", "system/capacity", None)]
    #[case("/system/capacity/1", "system/capacity", Some(1))]
    fn paths_split_into_collection_and_id(
        #[case] path: &str,
        #[case] collection: &str,
        #[case] id: Option<u64>,
    ) {
        assert_eq!(split_path(path), (collection.to_owned(), id));
    }

    #[test]
    fn references_match_by_path() {
        let mapping = json!({"volume": {"ref": "/volumes/3"}, "lun": 1});
        assert!(field_matches(&mapping, "volume", "/volumes/3"));
        assert!(field_matches(&mapping, "lun", "1"));
        assert!(!field_matches(&mapping, "volume", "/volumes/4"));
    }

    #[test]
    fn deleting_a_group_removes_its_volumes() {
        let array = FakeArray::new();
        let group = array.insert("volume_groups", json!({"name": "cvg-1", "is_dedup": true}));
        array.insert(
            "volumes",
            json!({"name": "cv-1", "size": 1, "volume_group": {"ref": format!("/volume_groups/{group}")}}),
        );
        let outcome = array.answer(&ArrayRequest::delete(format!("/volume_groups/{group}")));
        assert_eq!(outcome, Ok(Value::Null));
        assert_eq!(array.count("volumes"), 0);
    }
}
