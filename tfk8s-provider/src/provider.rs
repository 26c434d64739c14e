use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use tfk8s_resource::framework::{Existence, ResourceProvider};
use tfk8s_resource::schema::v0;

use crate::client::ObjectApi;
use crate::resources::{
    data_source_handlers, resource_handlers, DataSourceHandler, ResourceHandler, Settings,
};

pub struct KubernetesProvider {
    client: Arc<dyn ObjectApi>,
    settings: Settings,
    resources: BTreeMap<&'static str, Box<dyn ResourceHandler>>,
    data_sources: BTreeMap<&'static str, Box<dyn DataSourceHandler>>,
}

impl KubernetesProvider {
    pub fn new(client: Arc<dyn ObjectApi>, settings: Settings) -> Self {
        Self {
            client,
            settings,
            resources: resource_handlers()
                .into_iter()
                .map(|h| (h.type_name(), h))
                .collect(),
            data_sources: data_source_handlers()
                .into_iter()
                .map(|h| (h.type_name(), h))
                .collect(),
        }
    }

    fn resource(&self, operation: &str, type_: &v0::ResourceType) -> Result<&dyn ResourceHandler> {
        self.resources
            .get(type_.as_str())
            .map(|h| h.as_ref())
            .ok_or_else(|| {
                anyhow!(
                    "KubernetesProvider::{}: unknown resource type: {}",
                    operation,
                    type_
                )
            })
    }
}

#[async_trait::async_trait]
impl ResourceProvider for KubernetesProvider {
    async fn create(
        &self,
        request: v0::CreateResourceRequest,
    ) -> Result<v0::CreateResourceResponse> {
        let output_properties = self
            .resource("create", &request.type_)?
            .create(self.client.as_ref(), &self.settings, &request.input_properties)
            .await?;
        Ok(v0::CreateResourceResponse { output_properties })
    }

    async fn read(&self, request: v0::ReadResourceRequest) -> Result<v0::ReadResourceResponse> {
        let output_properties = self
            .resource("read", &request.resource.type_)?
            .read(self.client.as_ref(), &self.settings, &request.resource)
            .await?;
        Ok(v0::ReadResourceResponse { output_properties })
    }

    async fn update(
        &self,
        request: v0::UpdateResourceRequest,
    ) -> Result<v0::UpdateResourceResponse> {
        let output_properties = self
            .resource("update", &request.resource.type_)?
            .update(
                self.client.as_ref(),
                &self.settings,
                &request.resource,
                &request.input_properties,
            )
            .await?;
        Ok(v0::UpdateResourceResponse { output_properties })
    }

    async fn delete(
        &self,
        request: v0::DeleteResourceRequest,
    ) -> Result<v0::DeleteResourceResponse> {
        self.resource("delete", &request.resource.type_)?
            .delete(self.client.as_ref(), &self.settings, &request.resource)
            .await?;
        Ok(v0::DeleteResourceResponse {})
    }

    async fn exists(&self, request: v0::ExistsResourceRequest) -> Result<Existence> {
        self.resource("exists", &request.resource.type_)?
            .exists(self.client.as_ref(), &self.settings, &request.resource)
            .await
    }

    async fn read_data_source(
        &self,
        request: v0::ReadDataSourceRequest,
    ) -> Result<v0::ReadDataSourceResponse> {
        let handler = self.data_sources.get(request.type_.as_str()).ok_or_else(|| {
            anyhow!(
                "KubernetesProvider::read_data_source: unknown data source type: {}",
                request.type_
            )
        })?;
        let output_properties = handler
            .read(self.client.as_ref(), &self.settings, &request.input_properties)
            .await?;
        Ok(v0::ReadDataSourceResponse { output_properties })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    use super::*;
    use crate::client::memory::MemoryObjectApi;
    use crate::client::ObjectTarget;
    use k8s_openapi::api::core::v1::ConfigMap;
    use kube::core::ApiResource;
    use serde_json::{json, Value};
    use tfk8s_patch::{PatchOperation, PatchOperations};

    fn provider() -> (Arc<MemoryObjectApi>, KubernetesProvider) {
        let api = Arc::new(MemoryObjectApi::default());
        let settings = Settings {
            poll_interval: Duration::from_millis(1),
            ..Settings::default()
        };
        (api.clone(), KubernetesProvider::new(api, settings))
    }

    fn inputs(value: Value) -> v0::InputProperties {
        match value {
            Value::Object(o) => v0::InputProperties(o),
            _ => panic!("inputs must be an object"),
        }
    }

    fn extant(
        type_: &str,
        input_properties: &v0::InputProperties,
        output_properties: &v0::OutputProperties,
    ) -> v0::ExtantResource {
        v0::ExtantResource {
            type_: v0::ResourceType(type_.to_string()),
            input_properties: input_properties.clone(),
            output_properties: Some(output_properties.clone()),
        }
    }

    async fn create(
        provider: &KubernetesProvider,
        type_: &str,
        input_properties: &v0::InputProperties,
    ) -> v0::OutputProperties {
        provider
            .create(v0::CreateResourceRequest {
                type_: v0::ResourceType(type_.to_string()),
                input_properties: input_properties.clone(),
            })
            .await
            .unwrap()
            .output_properties
    }

    #[tokio::test]
    async fn config_map_lifecycle() {
        let (api, provider) = provider();
        let initial = inputs(json!({
            "metadata": { "name": "settings", "labels": { "app": "web" } },
            "data": { "one": "1", "two": "2" },
        }));
        let outputs = create(&provider, "kubernetes_config_map", &initial).await;
        assert_eq!(outputs["id"], json!("default/settings"));
        assert_eq!(outputs["data"], json!({ "one": "1", "two": "2" }));
        assert_eq!(outputs["metadata"]["uid"], json!("uid-1"));

        let resource = extant("kubernetes_config_map", &initial, &outputs);
        let read = provider
            .read(v0::ReadResourceRequest {
                resource: resource.clone(),
            })
            .await
            .unwrap();
        assert_eq!(read.output_properties.as_ref(), Some(&outputs));

        let changed = inputs(json!({
            "metadata": { "name": "settings", "labels": { "app": "web", "tier": "frontend" } },
            "data": { "two": "22", "three": "3" },
        }));
        let updated = provider
            .update(v0::UpdateResourceRequest {
                resource: resource.clone(),
                input_properties: changed.clone(),
            })
            .await
            .unwrap()
            .output_properties;
        assert_eq!(updated["data"], json!({ "two": "22", "three": "3" }));
        assert_eq!(
            api.patches(),
            vec![PatchOperations(vec![
                PatchOperation::add("/metadata/labels/tier", "frontend"),
                PatchOperation::remove("/data/one"),
                PatchOperation::replace("/data/two", "22"),
                PatchOperation::add("/data/three", "3"),
            ])]
        );

        let resource = extant("kubernetes_config_map", &changed, &updated);
        let exists = provider
            .exists(v0::ExistsResourceRequest {
                resource: resource.clone(),
            })
            .await
            .unwrap();
        assert_eq!(exists, Existence::Exists);

        provider
            .delete(v0::DeleteResourceRequest {
                resource: resource.clone(),
            })
            .await
            .unwrap();
        let exists = provider
            .exists(v0::ExistsResourceRequest {
                resource: resource.clone(),
            })
            .await
            .unwrap();
        assert_eq!(exists, Existence::Absent);

        let read = provider
            .read(v0::ReadResourceRequest { resource })
            .await
            .unwrap();
        assert_eq!(read.output_properties, None);
    }

    #[tokio::test]
    async fn read_reflects_changes_made_elsewhere() {
        let (api, provider) = provider();
        let config = inputs(json!({
            "metadata": { "name": "settings" },
            "data": { "mode": "fast" },
        }));
        let outputs = create(&provider, "kubernetes_config_map", &config).await;

        let target = ObjectTarget {
            resource: ApiResource::erase::<ConfigMap>(&()),
            namespace: Some("default".to_string()),
        };
        let mut object = api.object(&target, "settings").unwrap();
        object["data"]["mode"] = json!("slow");
        object["metadata"]["annotations"] = json!({
            "owner": "ops",
            "kubectl.kubernetes.io/last-applied-configuration": "{}",
        });
        api.insert(&target, "settings", object);

        let read = provider
            .read(v0::ReadResourceRequest {
                resource: extant("kubernetes_config_map", &config, &outputs),
            })
            .await
            .unwrap()
            .output_properties
            .unwrap();
        assert_eq!(read["data"], json!({ "mode": "slow" }));
        assert_eq!(read["metadata"]["annotations"], json!({ "owner": "ops" }));
    }

    #[tokio::test]
    async fn internal_annotations_survive_an_update() {
        let (api, provider) = provider();
        let config = inputs(json!({
            "metadata": { "name": "settings" },
            "data": { "mode": "fast" },
        }));
        let outputs = create(&provider, "kubernetes_config_map", &config).await;

        let target = ObjectTarget {
            resource: ApiResource::erase::<ConfigMap>(&()),
            namespace: Some("default".to_string()),
        };
        let mut object = api.object(&target, "settings").unwrap();
        object["metadata"]["annotations"] = json!({
            "kubectl.kubernetes.io/last-applied-configuration": "{}",
        });
        api.insert(&target, "settings", object);

        let resource = extant("kubernetes_config_map", &config, &outputs);
        let read = provider
            .read(v0::ReadResourceRequest {
                resource: resource.clone(),
            })
            .await
            .unwrap()
            .output_properties
            .unwrap();
        assert_eq!(read["metadata"]["annotations"], json!({}));

        let changed = inputs(json!({
            "metadata": { "name": "settings", "annotations": { "owner": "ops" } },
            "data": { "mode": "fast" },
        }));
        let updated = provider
            .update(v0::UpdateResourceRequest {
                resource: extant("kubernetes_config_map", &config, &read),
                input_properties: changed,
            })
            .await
            .unwrap()
            .output_properties;
        assert_eq!(
            api.patches(),
            vec![PatchOperations(vec![PatchOperation::add(
                "/metadata/annotations/owner",
                "ops"
            )])]
        );
        assert_eq!(updated["metadata"]["annotations"], json!({ "owner": "ops" }));
        assert_eq!(
            api.object(&target, "settings").unwrap()["metadata"]["annotations"],
            json!({
                "kubectl.kubernetes.io/last-applied-configuration": "{}",
                "owner": "ops",
            })
        );
    }

    #[tokio::test]
    async fn update_without_changes_sends_no_patch() {
        let (api, provider) = provider();
        let config = inputs(json!({ "metadata": { "name": "ops" } }));
        let outputs = create(&provider, "kubernetes_namespace", &config).await;
        let updated = provider
            .update(v0::UpdateResourceRequest {
                resource: extant("kubernetes_namespace", &config, &outputs),
                input_properties: config.clone(),
            })
            .await
            .unwrap()
            .output_properties;
        assert_eq!(updated, outputs);
        assert!(api.patches().is_empty());
    }

    #[tokio::test]
    async fn generated_names_end_up_in_the_id() {
        let (_api, provider) = provider();
        let outputs = create(
            &provider,
            "kubernetes_secret",
            &inputs(json!({
                "metadata": { "generate_name": "token-", "namespace": "apps" },
                "data": { "token": "hunter2" },
            })),
        )
        .await;
        assert_eq!(outputs["id"], json!("apps/token-00001"));
        assert_eq!(outputs["data"], json!({ "token": "hunter2" }));
    }

    #[tokio::test]
    async fn renaming_requires_replacement() {
        let (api, provider) = provider();
        let config = inputs(json!({ "metadata": { "name": "settings" } }));
        let outputs = create(&provider, "kubernetes_config_map", &config).await;
        let err = provider
            .update(v0::UpdateResourceRequest {
                resource: extant("kubernetes_config_map", &config, &outputs),
                input_properties: inputs(json!({ "metadata": { "name": "renamed" } })),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("requires replacement"), "{}", err);
        assert!(api.patches().is_empty());
    }

    #[tokio::test]
    async fn unreachable_server_leaves_existence_undetermined() {
        let (api, provider) = provider();
        let config = inputs(json!({ "metadata": { "name": "ops" } }));
        let outputs = create(&provider, "kubernetes_namespace", &config).await;
        api.unreachable.store(true, Ordering::Relaxed);
        let result = provider
            .exists(v0::ExistsResourceRequest {
                resource: extant("kubernetes_namespace", &config, &outputs),
            })
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn namespace_deletion_waits_until_gone() {
        let (api, provider) = provider();
        let config = inputs(json!({ "metadata": { "name": "ops" } }));
        let outputs = create(&provider, "kubernetes_namespace", &config).await;
        api.lingering_gets.store(3, Ordering::Relaxed);
        provider
            .delete(v0::DeleteResourceRequest {
                resource: extant("kubernetes_namespace", &config, &outputs),
            })
            .await
            .unwrap();
        assert_eq!(api.lingering_gets.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn namespace_deletion_times_out() {
        let api = Arc::new(MemoryObjectApi::default());
        let provider = KubernetesProvider::new(
            api.clone(),
            Settings {
                delete_timeout: Duration::from_millis(20),
                poll_interval: Duration::from_millis(5),
                ..Settings::default()
            },
        );
        let config = inputs(json!({ "metadata": { "name": "stuck" } }));
        let outputs = create(&provider, "kubernetes_namespace", &config).await;
        api.lingering_gets.store(u64::MAX, Ordering::Relaxed);
        let err = provider
            .delete(v0::DeleteResourceRequest {
                resource: extant("kubernetes_namespace", &config, &outputs),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().starts_with("Timed out"), "{}", err);
    }

    #[tokio::test]
    async fn data_source_reads_existing_object() {
        let (_api, provider) = provider();
        create(
            &provider,
            "kubernetes_config_map",
            &inputs(json!({
                "metadata": { "name": "settings", "namespace": "apps" },
                "data": { "mode": "fast" },
            })),
        )
        .await;

        let found = provider
            .read_data_source(v0::ReadDataSourceRequest {
                type_: v0::ResourceType("kubernetes_config_map".to_string()),
                input_properties: inputs(
                    json!({ "metadata": { "name": "settings", "namespace": "apps" } }),
                ),
            })
            .await
            .unwrap();
        assert_eq!(found.output_properties["data"], json!({ "mode": "fast" }));

        let err = provider
            .read_data_source(v0::ReadDataSourceRequest {
                type_: v0::ResourceType("kubernetes_config_map".to_string()),
                input_properties: inputs(json!({ "metadata": { "name": "settings" } })),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().ends_with("not found"), "{}", err);
    }

    #[tokio::test]
    async fn unknown_types_are_rejected() {
        let (_api, provider) = provider();
        let err = provider
            .create(v0::CreateResourceRequest {
                type_: v0::ResourceType("kubernetes_pod".to_string()),
                input_properties: v0::InputProperties::default(),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "KubernetesProvider::create: unknown resource type: kubernetes_pod"
        );

        let err = provider
            .read_data_source(v0::ReadDataSourceRequest {
                type_: v0::ResourceType("kubernetes_role".to_string()),
                input_properties: v0::InputProperties::default(),
            })
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unknown data source type"), "{}", err);
    }

    #[tokio::test]
    async fn malformed_ids_are_reported() {
        let (_api, provider) = provider();
        let config = inputs(json!({ "metadata": { "name": "settings" } }));
        let outputs = v0::OutputProperties(
            json!({ "id": "a/b/c" }).as_object().cloned().unwrap_or_default(),
        );
        let err = provider
            .read(v0::ReadResourceRequest {
                resource: extant("kubernetes_config_map", &config, &outputs),
            })
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "Unexpected ID format (\"a/b/c\"), expected \"namespace/name\"."
        );
    }
}
