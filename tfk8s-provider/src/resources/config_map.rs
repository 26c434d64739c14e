use std::collections::BTreeMap;

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use tfk8s_patch::{diff_map, PatchOperations};

use super::metadata::{expand_metadata, flatten_metadata, MetadataConfig};
use super::{patch_field, validate_immutable_flag, ResourceKind};

pub struct ConfigMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigMapConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Values are base64 encoded
    #[serde(default)]
    pub binary_data: BTreeMap<String, String>,
    #[serde(default)]
    pub immutable: bool,
}

impl ResourceKind for ConfigMap {
    const TYPE_NAME: &'static str = "kubernetes_config_map";
    const NAMESPACED: bool = true;

    type Config = ConfigMapConfig;
    type Object = core::ConfigMap;

    fn metadata(config: &ConfigMapConfig) -> &MetadataConfig {
        &config.metadata
    }

    fn expand(config: &ConfigMapConfig) -> Result<core::ConfigMap> {
        let binary_data = config
            .binary_data
            .iter()
            .map(|(k, v)| {
                let bytes = STANDARD
                    .decode(v)
                    .with_context(|| format!("binary_data.{} is not valid base64", k))?;
                Ok((k.clone(), ByteString(bytes)))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(core::ConfigMap {
            metadata: expand_metadata(&config.metadata),
            data: (!config.data.is_empty()).then(|| config.data.clone()),
            binary_data: (!binary_data.is_empty()).then_some(binary_data),
            immutable: config.immutable.then_some(true),
            ..Default::default()
        })
    }

    fn flatten(object: core::ConfigMap) -> Result<ConfigMapConfig> {
        Ok(ConfigMapConfig {
            metadata: flatten_metadata(object.metadata),
            data: object.data.unwrap_or_default(),
            binary_data: object
                .binary_data
                .unwrap_or_default()
                .into_iter()
                .map(|(k, v)| (k, STANDARD.encode(v.0)))
                .collect(),
            immutable: object.immutable.unwrap_or(false),
        })
    }

    fn patch(old: &ConfigMapConfig, new: &ConfigMapConfig) -> Result<PatchOperations> {
        let mut ops = diff_map("/data/", &old.data, &new.data);
        ops.extend(diff_map("/binaryData/", &old.binary_data, &new.binary_data));
        patch_field(
            &mut ops,
            "/immutable",
            old.immutable.then_some(&true),
            new.immutable.then_some(&true),
        )?;
        Ok(ops)
    }

    fn validate_update(old: &ConfigMapConfig, new: &ConfigMapConfig) -> Result<()> {
        validate_immutable_flag(
            Self::TYPE_NAME,
            old.immutable,
            new.immutable,
            &(&old.data, &old.binary_data),
            &(&new.data, &new.binary_data),
        )
    }
}
