use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex, MutexGuard},
};

use build_core::{
    crds::openshift::{Build, BuildConfig},
    labels::BUILD_CONFIG_LABEL,
};
use chrono::{DateTime, SecondsFormat};
use serde_json::{Value, json};

use crate::services::store::{ClusterStore, Object, StoreError};

type Key = (String, String, String);

/// Kinds served with a `/status` subresource. Everything else keeps its status
/// in the object itself.
const STATUS_SUBRESOURCE: [&str; 2] = ["BuildPlan", "ImageStream"];

/// What happens to a Build after `status.cancelled` is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelBehavior {
    Cancel,
    Ignore,
}

struct Inner {
    objects: BTreeMap<Key, Value>,
    version: u64,
    clock: i64,
    writes: Vec<String>,
    conflicts: BTreeMap<Key, u32>,
    cancel: CancelBehavior,
}

/// In-memory [`ClusterStore`] with the API server's optimistic concurrency rules.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                objects: BTreeMap::new(),
                version: 0,
                clock: 0,
                writes: Vec::new(),
                conflicts: BTreeMap::new(),
                cancel: CancelBehavior::Cancel,
            })),
        }
    }
}

fn key<K: Object>(ns: &str, name: &str) -> Key {
    (K::kind(&()).to_string(), ns.to_string(), name.to_string())
}

fn name_of(value: &Value) -> Result<String, StoreError> {
    value["metadata"]["name"]
        .as_str()
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .ok_or(StoreError::MissingName)
}

fn matches_selector(value: &Value, selector: &str) -> bool {
    selector
        .split(',')
        .filter(|pair| !pair.is_empty())
        .all(|pair| match pair.split_once('=') {
            Some((k, v)) => value["metadata"]["labels"][k].as_str() == Some(v),
            None => false,
        })
}

impl Inner {
    fn next_version(&mut self) -> String {
        self.version += 1;
        self.version.to_string()
    }

    fn next_timestamp(&mut self) -> String {
        self.clock += 1;
        // 2026-01-01T00:00:00Z plus one second per created object
        DateTime::from_timestamp(1_767_225_600 + self.clock, 0)
            .unwrap_or_default()
            .to_rfc3339_opts(SecondsFormat::Secs, true)
    }

    fn insert_new(&mut self, kind: &str, ns: &str, mut value: Value) -> Result<Value, StoreError> {
        let name = name_of(&value)?;
        let key = (kind.to_string(), ns.to_string(), name.clone());
        if self.objects.contains_key(&key) {
            return Err(StoreError::AlreadyExists(format!("{kind} {ns}/{name}")));
        }

        let version = self.next_version();
        let created = self.next_timestamp();
        let metadata = &mut value["metadata"];
        metadata["namespace"] = json!(ns);
        metadata["resourceVersion"] = json!(version);
        metadata["uid"] = json!(format!("uid-{name}"));
        metadata["creationTimestamp"] = json!(created);

        self.writes.push(format!("create {kind} {ns}/{name}"));
        self.objects.insert(key, value.clone());
        Ok(value)
    }

    /// Applies an injected conflict, or checks the caller's resource version.
    fn check_version(&mut self, key: &Key, value: &Value) -> Result<(), StoreError> {
        let label = format!("{} {}/{}", key.0, key.1, key.2);
        if let Some(remaining) = self.conflicts.get_mut(key).filter(|n| **n > 0) {
            *remaining -= 1;
            // someone else wrote in between
            let version = self.next_version();
            if let Some(stored) = self.objects.get_mut(key) {
                stored["metadata"]["resourceVersion"] = json!(version);
            }
            return Err(StoreError::Conflict(label));
        }

        let stored = self
            .objects
            .get(key)
            .ok_or_else(|| StoreError::NotFound(label.clone()))?;
        let expected = &stored["metadata"]["resourceVersion"];
        let given = &value["metadata"]["resourceVersion"];
        if !given.is_null() && given != expected {
            return Err(StoreError::Conflict(label));
        }
        Ok(())
    }

    fn lock_in_cancellation(&self, value: &mut Value) {
        if self.cancel == CancelBehavior::Cancel && value["status"]["cancelled"] == json!(true) {
            value["status"]["phase"] = json!("Cancelled");
        }
    }
}

impl MemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap()
    }

    /// Seeds an object without counting it as a write.
    pub fn insert<K: Object>(&self, ns: &str, object: &K) -> K {
        let mut inner = self.lock();
        let value = inner
            .insert_new(&K::kind(&()), ns, serde_json::to_value(object).unwrap())
            .unwrap();
        inner.writes.pop();
        serde_json::from_value(value).unwrap()
    }

    pub fn object<K: Object>(&self, ns: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .get(&key::<K>(ns, name))
            .map(|v| serde_json::from_value(v.clone()).unwrap())
    }

    pub fn set_build_phase(&self, ns: &str, name: &str, phase: &str) {
        let mut inner = self.lock();
        if let Some(build) = inner.objects.get_mut(&key::<Build>(ns, name)) {
            build["status"]["phase"] = json!(phase);
        }
    }

    pub fn set_cancel_behavior(&self, cancel: CancelBehavior) {
        self.lock().cancel = cancel;
    }

    /// The next `times` replaces of this object fail with a conflict.
    pub fn inject_conflicts<K: Object>(&self, ns: &str, name: &str, times: u32) {
        self.lock().conflicts.insert(key::<K>(ns, name), times);
    }

    pub fn writes(&self) -> Vec<String> {
        self.lock().writes.clone()
    }

    pub fn clear_writes(&self) {
        self.lock().writes.clear();
    }
}

impl ClusterStore for MemoryStore {
    async fn get<K: Object>(&self, ns: &str, name: &str) -> Result<Option<K>, StoreError> {
        let value = self.lock().objects.get(&key::<K>(ns, name)).cloned();
        Ok(value.map(serde_json::from_value).transpose()?)
    }

    async fn list<K: Object>(&self, ns: &str, selector: &str) -> Result<Vec<K>, StoreError> {
        let kind = K::kind(&()).to_string();
        let values: Vec<Value> = self
            .lock()
            .objects
            .iter()
            .filter(|((k, n, _), v)| *k == kind && n == ns && matches_selector(v, selector))
            .map(|(_, v)| v.clone())
            .collect();

        Ok(values
            .into_iter()
            .map(serde_json::from_value)
            .collect::<Result<_, _>>()?)
    }

    async fn create<K: Object>(&self, ns: &str, object: &K) -> Result<K, StoreError> {
        let value = serde_json::to_value(object)?;
        let created = self.lock().insert_new(&K::kind(&()), ns, value)?;
        Ok(serde_json::from_value(created)?)
    }

    async fn replace<K: Object>(&self, ns: &str, object: &K) -> Result<K, StoreError> {
        let mut value = serde_json::to_value(object)?;
        let name = name_of(&value)?;
        let key = key::<K>(ns, &name);

        let mut inner = self.lock();
        inner.check_version(&key, &value)?;

        let version = inner.next_version();
        let stored = inner
            .objects
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        // the status subresource is not writable through a replace
        if STATUS_SUBRESOURCE.contains(&key.0.as_str()) {
            value["status"] = stored["status"].clone();
        }
        value["metadata"]["uid"] = stored["metadata"]["uid"].clone();
        value["metadata"]["creationTimestamp"] = stored["metadata"]["creationTimestamp"].clone();
        value["metadata"]["resourceVersion"] = json!(version);
        inner.lock_in_cancellation(&mut value);

        inner.writes.push(format!("replace {} {ns}/{name}", key.0));
        inner.objects.insert(key, value.clone());
        Ok(serde_json::from_value(value)?)
    }

    async fn replace_status<K: Object>(&self, ns: &str, object: &K) -> Result<K, StoreError> {
        let value = serde_json::to_value(object)?;
        let name = name_of(&value)?;
        let key = key::<K>(ns, &name);
        if !STATUS_SUBRESOURCE.contains(&key.0.as_str()) {
            return Err(StoreError::NotFound(format!("{}/status {ns}/{name}", key.0)));
        }

        let mut inner = self.lock();
        inner.check_version(&key, &value)?;

        let version = inner.next_version();
        let mut stored = inner
            .objects
            .get(&key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.clone()))?;
        stored["status"] = value["status"].clone();
        stored["metadata"]["resourceVersion"] = json!(version);

        inner.writes.push(format!("status {} {ns}/{name}", key.0));
        inner.objects.insert(key, stored.clone());
        Ok(serde_json::from_value(stored)?)
    }

    async fn delete<K: Object>(&self, ns: &str, name: &str) -> Result<(), StoreError> {
        let key = key::<K>(ns, name);
        let mut inner = self.lock();
        inner
            .objects
            .remove(&key)
            .ok_or_else(|| StoreError::NotFound(format!("{} {ns}/{name}", key.0)))?;
        inner.writes.push(format!("delete {} {ns}/{name}", key.0));
        Ok(())
    }

    async fn instantiate(&self, ns: &str, build_config: &str) -> Result<Build, StoreError> {
        let mut inner = self.lock();
        let config = inner
            .objects
            .get(&key::<BuildConfig>(ns, build_config))
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("BuildConfig {ns}/{build_config}")))?;

        let started = inner
            .objects
            .iter()
            .filter(|((k, n, _), v)| {
                k == "Build"
                    && n == ns
                    && v["metadata"]["labels"][BUILD_CONFIG_LABEL].as_str() == Some(build_config)
            })
            .count();

        let mut labels = config["metadata"]["labels"].clone();
        if !labels.is_object() {
            labels = json!({});
        }
        labels[BUILD_CONFIG_LABEL] = json!(build_config);

        let build = json!({
            "apiVersion": "build.openshift.io/v1",
            "kind": "Build",
            "metadata": {
                "name": format!("{build_config}-{}", started + 1),
                "labels": labels,
            },
            "spec": {},
            "status": { "phase": "New" },
        });

        let created = inner.insert_new("Build", ns, build)?;
        inner.writes.pop();
        inner
            .writes
            .push(format!("instantiate BuildConfig {ns}/{build_config}"));
        Ok(serde_json::from_value(created)?)
    }
}
