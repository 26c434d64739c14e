//! Create, read, update, delete and exists, once for every [`ResourceKind`].

use std::marker::PhantomData;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use kube::core::ApiResource;
use kube::Resource as _;
use serde::Deserialize;
use serde_json::{Map, Value};
use tfk8s_resource::framework::Existence;
use tfk8s_resource::schema::v0::{ExtantResource, InputProperties, OutputProperties};

use super::metadata::{needs_server_maps, patch_metadata, MetadataConfig, ServerMaps};
use super::{ObjectId, ResourceKind, Settings};
use crate::client::{ObjectApi, ObjectTarget};

/// The type-erased lifecycle of one resource kind.
#[async_trait]
pub trait ResourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn api_resource(&self) -> ApiResource;

    fn namespaced(&self) -> bool;

    async fn create(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        inputs: &InputProperties,
    ) -> Result<OutputProperties>;

    /// `None` when the object does not exist anymore.
    async fn read(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
    ) -> Result<Option<OutputProperties>>;

    async fn update(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
        inputs: &InputProperties,
    ) -> Result<OutputProperties>;

    async fn delete(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
    ) -> Result<()>;

    async fn exists(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
    ) -> Result<Existence>;
}

#[async_trait]
pub trait DataSourceHandler: Send + Sync {
    fn type_name(&self) -> &'static str;

    fn api_resource(&self) -> ApiResource;

    fn namespaced(&self) -> bool;

    async fn read(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        inputs: &InputProperties,
    ) -> Result<OutputProperties>;
}

struct Handler<R>(PhantomData<fn() -> R>);

pub fn handler<R: ResourceKind>() -> Box<dyn ResourceHandler> {
    Box::new(Handler::<R>(PhantomData))
}

pub fn data_source<R: ResourceKind>() -> Box<dyn DataSourceHandler> {
    Box::new(Handler::<R>(PhantomData))
}

fn parse_config<R: ResourceKind>(properties: &Map<String, Value>) -> Result<R::Config> {
    serde_json::from_value(Value::Object(properties.clone())).with_context(|| {
        format!(
            "Could not deserialize input properties for {} resource",
            R::TYPE_NAME
        )
    })
}

fn target<R: ResourceKind>(namespace: Option<String>) -> ObjectTarget {
    ObjectTarget {
        resource: ApiResource::erase::<R::Object>(&()),
        namespace: if R::NAMESPACED { namespace } else { None },
    }
}

fn effective_namespace<R: ResourceKind>(
    settings: &Settings,
    metadata: &MetadataConfig,
) -> Option<String> {
    if R::NAMESPACED {
        Some(
            metadata
                .namespace
                .clone()
                .unwrap_or_else(|| settings.default_namespace.clone()),
        )
    } else {
        None
    }
}

/// The object an extant resource refers to: its `id` output if known,
/// otherwise the name and namespace it was configured with.
fn object_id<R: ResourceKind>(settings: &Settings, resource: &ExtantResource) -> Result<ObjectId> {
    let id = resource
        .output_properties
        .as_ref()
        .and_then(|o| o.get("id"))
        .and_then(Value::as_str);
    if let Some(id) = id {
        return ObjectId::parse(id, R::NAMESPACED);
    }
    let config = parse_config::<R>(&resource.input_properties)?;
    let metadata = R::metadata(&config);
    let name = metadata.name.clone().ok_or_else(|| {
        anyhow!(
            "{} resource has neither an id nor a metadata.name",
            R::TYPE_NAME
        )
    })?;
    Ok(ObjectId {
        namespace: effective_namespace::<R>(settings, metadata),
        name,
    })
}

fn output_properties<R: ResourceKind>(object: Value) -> Result<OutputProperties> {
    let object: R::Object = serde_json::from_value(object).with_context(|| {
        format!(
            "Could not deserialize {} object returned by the API server",
            R::TYPE_NAME
        )
    })?;
    let id = ObjectId {
        namespace: if R::NAMESPACED {
            object.meta().namespace.clone()
        } else {
            None
        },
        name: object.meta().name.clone().ok_or_else(|| {
            anyhow!(
                "The API server returned a {} object without a name",
                R::TYPE_NAME
            )
        })?,
    };
    let config = R::flatten(object)?;
    let mut properties = match serde_json::to_value(config)? {
        Value::Object(o) => o,
        _ => bail!("Expected object as output"),
    };
    properties.insert("id".to_string(), Value::String(id.to_string()));
    Ok(OutputProperties(properties))
}

async fn wait_for_deletion(
    client: &dyn ObjectApi,
    settings: &Settings,
    target: &ObjectTarget,
    id: &ObjectId,
) -> Result<()> {
    let deadline = tokio::time::Instant::now() + settings.delete_timeout;
    while client.get(target, &id.name).await?.is_some() {
        if tokio::time::Instant::now() >= deadline {
            bail!(
                "Timed out after {:?} waiting for {} {} to be deleted",
                settings.delete_timeout,
                target.resource.kind,
                id
            );
        }
        tracing::debug!(%id, "waiting for deletion to finish");
        tokio::time::sleep(settings.poll_interval).await;
    }
    Ok(())
}

#[async_trait]
impl<R: ResourceKind> ResourceHandler for Handler<R> {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn api_resource(&self) -> ApiResource {
        ApiResource::erase::<R::Object>(&())
    }

    fn namespaced(&self) -> bool {
        R::NAMESPACED
    }

    async fn create(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        inputs: &InputProperties,
    ) -> Result<OutputProperties> {
        let config = parse_config::<R>(inputs)?;
        let namespace = effective_namespace::<R>(settings, R::metadata(&config));
        let mut object = R::expand(&config)?;
        object.meta_mut().namespace = namespace.clone();

        tracing::info!(
            resource_type = R::TYPE_NAME,
            name = ?R::metadata(&config).name,
            namespace = ?namespace,
            "creating object"
        );
        let created = client
            .create(&target::<R>(namespace), serde_json::to_value(&object)?)
            .await?;
        output_properties::<R>(created)
    }

    async fn read(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
    ) -> Result<Option<OutputProperties>> {
        let id = object_id::<R>(settings, resource)?;
        match client
            .get(&target::<R>(id.namespace.clone()), &id.name)
            .await?
        {
            Some(object) => Ok(Some(output_properties::<R>(object)?)),
            None => {
                tracing::info!(resource_type = R::TYPE_NAME, %id, "object no longer exists");
                Ok(None)
            }
        }
    }

    async fn update(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
        inputs: &InputProperties,
    ) -> Result<OutputProperties> {
        let id = object_id::<R>(settings, resource)?;

        // The last read is the best knowledge of what is on the server.
        let old_properties = match &resource.output_properties {
            Some(outputs) if !outputs.is_empty() => &outputs.0,
            _ => &resource.input_properties.0,
        };
        let old = parse_config::<R>(old_properties)?;
        let new = parse_config::<R>(inputs)?;

        let new_metadata = R::metadata(&new);
        if let Some(name) = &new_metadata.name {
            if *name != id.name {
                bail!(
                    "{}: changing metadata.name from {:?} to {:?} requires replacement",
                    R::TYPE_NAME,
                    id.name,
                    name
                );
            }
        }
        let new_namespace = effective_namespace::<R>(settings, new_metadata);
        if new_namespace != id.namespace {
            bail!(
                "{}: changing metadata.namespace from {:?} to {:?} requires replacement",
                R::TYPE_NAME,
                id.namespace,
                new_namespace
            );
        }
        R::validate_update(&old, &new)?;

        let target = target::<R>(id.namespace.clone());
        let old_metadata = R::metadata(&old);
        let server = if needs_server_maps(old_metadata, new_metadata) {
            client
                .get(&target, &id.name)
                .await?
                .map(|object| ServerMaps::of(&object))
                .ok_or_else(|| anyhow!("{} {} no longer exists", R::TYPE_NAME, id))?
        } else {
            ServerMaps::default()
        };
        let mut ops = patch_metadata("/metadata/", old_metadata, new_metadata, server);
        ops.extend(R::patch(&old, &new)?);

        let object = if ops.is_empty() {
            tracing::info!(resource_type = R::TYPE_NAME, %id, "no changes to apply");
            client
                .get(&target, &id.name)
                .await?
                .ok_or_else(|| anyhow!("{} {} no longer exists", R::TYPE_NAME, id))?
        } else {
            tracing::info!(
                resource_type = R::TYPE_NAME,
                %id,
                operations = ops.len(),
                "patching object"
            );
            client.patch(&target, &id.name, &ops).await?
        };
        output_properties::<R>(object)
    }

    async fn delete(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
    ) -> Result<()> {
        let id = object_id::<R>(settings, resource)?;
        let target = target::<R>(id.namespace.clone());
        tracing::info!(resource_type = R::TYPE_NAME, %id, "deleting object");
        client.delete(&target, &id.name).await?;
        if R::WAIT_FOR_DELETION {
            wait_for_deletion(client, settings, &target, &id).await?;
        }
        Ok(())
    }

    async fn exists(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        resource: &ExtantResource,
    ) -> Result<Existence> {
        let id = object_id::<R>(settings, resource)?;
        let object = client
            .get(&target::<R>(id.namespace.clone()), &id.name)
            .await?;
        Ok(Existence::from(object.is_some()))
    }
}

#[async_trait]
impl<R: ResourceKind> DataSourceHandler for Handler<R> {
    fn type_name(&self) -> &'static str {
        R::TYPE_NAME
    }

    fn api_resource(&self) -> ApiResource {
        ApiResource::erase::<R::Object>(&())
    }

    fn namespaced(&self) -> bool {
        R::NAMESPACED
    }

    async fn read(
        &self,
        client: &dyn ObjectApi,
        settings: &Settings,
        inputs: &InputProperties,
    ) -> Result<OutputProperties> {
        #[derive(Deserialize)]
        struct Lookup {
            metadata: MetadataConfig,
        }

        let lookup: Lookup = serde_json::from_value(Value::Object(inputs.0.clone()))
            .with_context(|| {
                format!(
                    "Could not deserialize input properties for {} data source",
                    R::TYPE_NAME
                )
            })?;
        let name = lookup
            .metadata
            .name
            .clone()
            .ok_or_else(|| anyhow!("{} data source requires metadata.name", R::TYPE_NAME))?;
        let id = ObjectId {
            namespace: effective_namespace::<R>(settings, &lookup.metadata),
            name,
        };
        let object = client
            .get(&target::<R>(id.namespace.clone()), &id.name)
            .await?
            .ok_or_else(|| anyhow!("{} {} not found", R::TYPE_NAME, id))?;
        output_properties::<R>(object)
    }
}
