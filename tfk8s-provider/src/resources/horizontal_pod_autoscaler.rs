use anyhow::Result;
use k8s_openapi::api::autoscaling::v1 as autoscaling;
use serde::{Deserialize, Serialize};
use tfk8s_patch::PatchOperations;

use super::metadata::{expand_metadata, flatten_metadata, MetadataConfig};
use super::{patch_field, ResourceKind};

pub struct HorizontalPodAutoscaler;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizontalPodAutoscalerConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    pub spec: HorizontalPodAutoscalerSpecConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HorizontalPodAutoscalerSpecConfig {
    pub max_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_replicas: Option<i32>,
    pub scale_target_ref: ScaleTargetRefConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_cpu_utilization_percentage: Option<i32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleTargetRefConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
    pub kind: String,
    pub name: String,
}

fn expand_scale_target_ref(config: &ScaleTargetRefConfig) -> autoscaling::CrossVersionObjectReference {
    autoscaling::CrossVersionObjectReference {
        api_version: config.api_version.clone(),
        kind: config.kind.clone(),
        name: config.name.clone(),
    }
}

impl ResourceKind for HorizontalPodAutoscaler {
    const TYPE_NAME: &'static str = "kubernetes_horizontal_pod_autoscaler";
    const NAMESPACED: bool = true;

    type Config = HorizontalPodAutoscalerConfig;
    type Object = autoscaling::HorizontalPodAutoscaler;

    fn metadata(config: &HorizontalPodAutoscalerConfig) -> &MetadataConfig {
        &config.metadata
    }

    fn expand(config: &HorizontalPodAutoscalerConfig) -> Result<autoscaling::HorizontalPodAutoscaler> {
        let spec = &config.spec;
        Ok(autoscaling::HorizontalPodAutoscaler {
            metadata: expand_metadata(&config.metadata),
            spec: Some(autoscaling::HorizontalPodAutoscalerSpec {
                max_replicas: spec.max_replicas,
                min_replicas: spec.min_replicas,
                scale_target_ref: expand_scale_target_ref(&spec.scale_target_ref),
                target_cpu_utilization_percentage: spec.target_cpu_utilization_percentage,
            }),
            ..Default::default()
        })
    }

    fn flatten(object: autoscaling::HorizontalPodAutoscaler) -> Result<HorizontalPodAutoscalerConfig> {
        let spec = object.spec.unwrap_or_default();
        Ok(HorizontalPodAutoscalerConfig {
            metadata: flatten_metadata(object.metadata),
            spec: HorizontalPodAutoscalerSpecConfig {
                max_replicas: spec.max_replicas,
                min_replicas: spec.min_replicas,
                scale_target_ref: ScaleTargetRefConfig {
                    api_version: spec.scale_target_ref.api_version,
                    kind: spec.scale_target_ref.kind,
                    name: spec.scale_target_ref.name,
                },
                target_cpu_utilization_percentage: spec.target_cpu_utilization_percentage,
            },
        })
    }

    fn patch(
        old: &HorizontalPodAutoscalerConfig,
        new: &HorizontalPodAutoscalerConfig,
    ) -> Result<PatchOperations> {
        let (old, new) = (&old.spec, &new.spec);
        let mut ops = PatchOperations::new();
        patch_field(
            &mut ops,
            "/spec/maxReplicas",
            Some(&old.max_replicas),
            Some(&new.max_replicas),
        )?;
        patch_field(
            &mut ops,
            "/spec/minReplicas",
            old.min_replicas.as_ref(),
            new.min_replicas.as_ref(),
        )?;
        patch_field(
            &mut ops,
            "/spec/scaleTargetRef",
            Some(&expand_scale_target_ref(&old.scale_target_ref)),
            Some(&expand_scale_target_ref(&new.scale_target_ref)),
        )?;
        patch_field(
            &mut ops,
            "/spec/targetCPUUtilizationPercentage",
            old.target_cpu_utilization_percentage.as_ref(),
            new.target_cpu_utilization_percentage.as_ref(),
        )?;
        Ok(ops)
    }
}
