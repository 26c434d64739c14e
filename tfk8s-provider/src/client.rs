//! Access to Kubernetes objects.
//!
//! The provider only needs four verbs, on untyped JSON objects. Keeping them
//! behind [`ObjectApi`] lets the lifecycle code run against an in-memory
//! store in tests.

use anyhow::{Context, Result};
use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, DynamicObject, Patch, PatchParams, PostParams},
    core::ApiResource,
    Client,
};
use serde_json::Value;
use tfk8s_patch::PatchOperations;

#[cfg(test)]
pub(crate) mod memory;

/// A kind of object, and the namespace to address it in (`None` for
/// cluster-scoped kinds).
#[derive(Debug, Clone)]
pub struct ObjectTarget {
    pub resource: ApiResource,
    pub namespace: Option<String>,
}

impl ObjectTarget {
    fn describe(&self, name: &str) -> String {
        match &self.namespace {
            Some(namespace) => format!("{} {}/{}", self.resource.kind, namespace, name),
            None => format!("{} {}", self.resource.kind, name),
        }
    }
}

#[async_trait]
pub trait ObjectApi: Send + Sync {
    /// Create an object, returning it as stored by the server.
    async fn create(&self, target: &ObjectTarget, object: Value) -> Result<Value>;

    /// Fetch an object; `None` if it does not exist.
    async fn get(&self, target: &ObjectTarget, name: &str) -> Result<Option<Value>>;

    /// Apply a JSON Patch document to an object.
    async fn patch(
        &self,
        target: &ObjectTarget,
        name: &str,
        patch: &PatchOperations,
    ) -> Result<Value>;

    /// Delete an object. Deleting an object that does not exist succeeds.
    async fn delete(&self, target: &ObjectTarget, name: &str) -> Result<()>;
}

/// [`ObjectApi`] backed by a `kube` client.
#[derive(Clone)]
pub struct KubeObjectApi {
    client: Client,
}

impl KubeObjectApi {
    pub fn new(client: Client) -> Self {
        KubeObjectApi { client }
    }

    fn api(&self, target: &ObjectTarget) -> Api<DynamicObject> {
        match &target.namespace {
            Some(namespace) => {
                Api::namespaced_with(self.client.clone(), namespace, &target.resource)
            }
            None => Api::all_with(self.client.clone(), &target.resource),
        }
    }
}

#[async_trait]
impl ObjectApi for KubeObjectApi {
    async fn create(&self, target: &ObjectTarget, object: Value) -> Result<Value> {
        let object: DynamicObject = serde_json::from_value(object)
            .with_context(|| format!("Could not convert {} manifest", target.resource.kind))?;
        let name = object.metadata.name.clone().unwrap_or_default();
        tracing::debug!(object = %target.describe(&name), "POST");
        let created = self
            .api(target)
            .create(&PostParams::default(), &object)
            .await
            .with_context(|| format!("Failed to create {}", target.describe(&name)))?;
        Ok(serde_json::to_value(created)?)
    }

    async fn get(&self, target: &ObjectTarget, name: &str) -> Result<Option<Value>> {
        tracing::debug!(object = %target.describe(name), "GET");
        let object = self
            .api(target)
            .get_opt(name)
            .await
            .with_context(|| format!("Failed to read {}", target.describe(name)))?;
        object
            .map(serde_json::to_value)
            .transpose()
            .map_err(Into::into)
    }

    async fn patch(
        &self,
        target: &ObjectTarget,
        name: &str,
        patch: &PatchOperations,
    ) -> Result<Value> {
        let body = patch.to_json()?;
        tracing::debug!(
            object = %target.describe(name),
            content_type = tfk8s_patch::JSON_PATCH_CONTENT_TYPE,
            patch = %String::from_utf8_lossy(&body),
            "PATCH"
        );
        let document: json_patch::Patch = serde_json::from_slice(&body)
            .with_context(|| "Could not convert patch operations to a JSON Patch document")?;
        let patched = self
            .api(target)
            .patch(name, &PatchParams::default(), &Patch::Json::<()>(document))
            .await
            .with_context(|| format!("Failed to patch {}", target.describe(name)))?;
        Ok(serde_json::to_value(patched)?)
    }

    async fn delete(&self, target: &ObjectTarget, name: &str) -> Result<()> {
        tracing::debug!(object = %target.describe(name), "DELETE");
        match self
            .api(target)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ref err)) if err.code == 404 => {
                tracing::debug!(object = %target.describe(name), "already gone");
                Ok(())
            }
            Err(e) => Err(e).with_context(|| format!("Failed to delete {}", target.describe(name))),
        }
    }
}
