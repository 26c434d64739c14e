use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use tfk8s_patch::PatchOperations;

use super::{ObjectApi, ObjectTarget};

type Key = (String, Option<String>, String);

/// An API server that only stores objects.
///
/// It assigns `uid` and `resourceVersion`, applies JSON patches with
/// `json_patch`, and records every patch it receives.
#[derive(Default)]
pub(crate) struct MemoryObjectApi {
    objects: Mutex<BTreeMap<Key, Value>>,
    patches: Mutex<Vec<PatchOperations>>,
    counter: AtomicU64,
    /// Make every `get` fail, as if the server were unreachable
    pub(crate) unreachable: AtomicBool,
    /// Number of `get` calls that still see an object after its deletion
    pub(crate) lingering_gets: AtomicU64,
}

impl MemoryObjectApi {
    fn key(target: &ObjectTarget, name: &str) -> Key {
        (
            target.resource.plural.clone(),
            target.namespace.clone(),
            name.to_string(),
        )
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub(crate) fn patches(&self) -> Vec<PatchOperations> {
        self.patches.lock().unwrap().clone()
    }

    pub(crate) fn object(&self, target: &ObjectTarget, name: &str) -> Option<Value> {
        self.objects
            .lock()
            .unwrap()
            .get(&Self::key(target, name))
            .cloned()
    }

    pub(crate) fn insert(&self, target: &ObjectTarget, name: &str, object: Value) {
        self.objects
            .lock()
            .unwrap()
            .insert(Self::key(target, name), object);
    }
}

#[async_trait]
impl ObjectApi for MemoryObjectApi {
    async fn create(&self, target: &ObjectTarget, mut object: Value) -> Result<Value> {
        let n = self.next();
        let name = match object.pointer("/metadata/name").and_then(Value::as_str) {
            Some(name) => name.to_string(),
            None => match object
                .pointer("/metadata/generateName")
                .and_then(Value::as_str)
            {
                Some(prefix) => format!("{}{:05}", prefix, n),
                None => bail!("{} has neither name nor generateName", target.resource.kind),
            },
        };
        let key = Self::key(target, &name);
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(&key) {
            bail!("{} already exists", target.describe(&name));
        }
        let metadata = object
            .get_mut("metadata")
            .and_then(Value::as_object_mut)
            .ok_or_else(|| anyhow!("object has no metadata"))?;
        metadata.insert("name".to_string(), json!(name));
        metadata.insert("uid".to_string(), json!(format!("uid-{}", n)));
        metadata.insert("resourceVersion".to_string(), json!(n.to_string()));
        if let Some(namespace) = &target.namespace {
            metadata.insert("namespace".to_string(), json!(namespace));
        }
        objects.insert(key, object.clone());
        Ok(object)
    }

    async fn get(&self, target: &ObjectTarget, name: &str) -> Result<Option<Value>> {
        if self.unreachable.load(Ordering::Relaxed) {
            bail!("connection refused");
        }
        let found = self.object(target, name);
        if found.is_none() && self.lingering_gets.load(Ordering::Relaxed) > 0 {
            self.lingering_gets.fetch_sub(1, Ordering::Relaxed);
            return Ok(Some(json!({ "metadata": { "name": name } })));
        }
        Ok(found)
    }

    async fn patch(
        &self,
        target: &ObjectTarget,
        name: &str,
        patch: &PatchOperations,
    ) -> Result<Value> {
        let n = self.next();
        let document = json_patch::Patch::try_from(patch)?;
        let mut objects = self.objects.lock().unwrap();
        let object = objects
            .get_mut(&Self::key(target, name))
            .ok_or_else(|| anyhow!("{} not found", target.describe(name)))?;
        let mut patched = object.clone();
        json_patch::patch(&mut patched, &document.0)?;
        patched["metadata"]["resourceVersion"] = json!(n.to_string());
        *object = patched.clone();
        self.patches.lock().unwrap().push(patch.clone());
        Ok(patched)
    }

    async fn delete(&self, target: &ObjectTarget, name: &str) -> Result<()> {
        self.objects
            .lock()
            .unwrap()
            .remove(&Self::key(target, name));
        Ok(())
    }
}
