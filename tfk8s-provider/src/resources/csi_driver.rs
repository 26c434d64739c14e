use anyhow::{bail, Result};
use k8s_openapi::api::storage::v1 as storage;
use serde::{Deserialize, Serialize};
use tfk8s_patch::PatchOperations;

use super::metadata::{expand_metadata, flatten_metadata, MetadataConfig};
use super::ResourceKind;

pub struct CsiDriver;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsiDriverConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub spec: CsiDriverSpecConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsiDriverSpecConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attach_required: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_info_on_mount: Option<bool>,
    /// `Persistent` and/or `Ephemeral`
    #[serde(default)]
    pub volume_lifecycle_modes: Vec<String>,
}

impl ResourceKind for CsiDriver {
    const TYPE_NAME: &'static str = "kubernetes_csi_driver";
    const NAMESPACED: bool = false;

    type Config = CsiDriverConfig;
    type Object = storage::CSIDriver;

    fn metadata(config: &CsiDriverConfig) -> &MetadataConfig {
        &config.metadata
    }

    fn expand(config: &CsiDriverConfig) -> Result<storage::CSIDriver> {
        let spec = &config.spec;
        Ok(storage::CSIDriver {
            metadata: expand_metadata(&config.metadata),
            spec: storage::CSIDriverSpec {
                attach_required: spec.attach_required,
                pod_info_on_mount: spec.pod_info_on_mount,
                volume_lifecycle_modes: (!spec.volume_lifecycle_modes.is_empty())
                    .then(|| spec.volume_lifecycle_modes.clone()),
                ..Default::default()
            },
        })
    }

    fn flatten(object: storage::CSIDriver) -> Result<CsiDriverConfig> {
        Ok(CsiDriverConfig {
            metadata: flatten_metadata(object.metadata),
            spec: CsiDriverSpecConfig {
                attach_required: object.spec.attach_required,
                pod_info_on_mount: object.spec.pod_info_on_mount,
                volume_lifecycle_modes: object.spec.volume_lifecycle_modes.unwrap_or_default(),
            },
        })
    }

    /// Only metadata can change in place; the API server rejects spec updates.
    fn patch(_old: &CsiDriverConfig, _new: &CsiDriverConfig) -> Result<PatchOperations> {
        Ok(PatchOperations::new())
    }

    fn validate_update(old: &CsiDriverConfig, new: &CsiDriverConfig) -> Result<()> {
        if old.spec != new.spec {
            bail!(
                "{}: changing spec from {:?} to {:?} requires replacement",
                Self::TYPE_NAME,
                old.spec,
                new.spec
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config(spec: serde_json::Value) -> CsiDriverConfig {
        serde_json::from_value(json!({
            "metadata": { "name": "csi.example.com" },
            "spec": spec,
        }))
        .unwrap()
    }

    #[test]
    fn expand_and_flatten() {
        let config = config(json!({
            "attach_required": true,
            "volume_lifecycle_modes": ["Persistent", "Ephemeral"],
        }));
        let driver = CsiDriver::expand(&config).unwrap();
        assert_eq!(
            serde_json::to_value(&driver).unwrap()["spec"],
            json!({
                "attachRequired": true,
                "volumeLifecycleModes": ["Persistent", "Ephemeral"],
            })
        );
        assert_eq!(CsiDriver::flatten(driver).unwrap(), config);
    }

    #[test]
    fn spec_changes_require_replacement() {
        let old = config(json!({
            "attach_required": true,
            "volume_lifecycle_modes": ["Persistent"],
        }));
        let new = config(json!({
            "attach_required": true,
            "volume_lifecycle_modes": ["Persistent", "Ephemeral"],
        }));
        let err = CsiDriver::validate_update(&old, &new).unwrap_err();
        assert!(err.to_string().contains("requires replacement"), "{}", err);
        assert!(CsiDriver::validate_update(&old, &old).is_ok());
        assert!(CsiDriver::patch(&old, &old).unwrap().is_empty());
    }
}
