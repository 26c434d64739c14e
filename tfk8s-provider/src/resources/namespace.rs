use anyhow::Result;
use k8s_openapi::api::core::v1 as core;
use serde::{Deserialize, Serialize};
use tfk8s_patch::PatchOperations;

use super::metadata::{expand_metadata, flatten_metadata, MetadataConfig};
use super::ResourceKind;

pub struct Namespace;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamespaceConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
}

impl ResourceKind for Namespace {
    const TYPE_NAME: &'static str = "kubernetes_namespace";
    const NAMESPACED: bool = false;
    // Finalizers remove the namespace's contents first
    const WAIT_FOR_DELETION: bool = true;

    type Config = NamespaceConfig;
    type Object = core::Namespace;

    fn metadata(config: &NamespaceConfig) -> &MetadataConfig {
        &config.metadata
    }

    fn expand(config: &NamespaceConfig) -> Result<core::Namespace> {
        Ok(core::Namespace {
            metadata: expand_metadata(&config.metadata),
            ..Default::default()
        })
    }

    fn flatten(object: core::Namespace) -> Result<NamespaceConfig> {
        Ok(NamespaceConfig {
            metadata: flatten_metadata(object.metadata),
        })
    }

    fn patch(_old: &NamespaceConfig, _new: &NamespaceConfig) -> Result<PatchOperations> {
        Ok(PatchOperations::new())
    }
}
