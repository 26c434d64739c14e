use anyhow::Result;
use k8s_openapi::api::rbac::v1 as rbac;
use serde::{Deserialize, Serialize};
use tfk8s_patch::{PatchOperation, PatchOperations};

use super::metadata::{expand_metadata, flatten_metadata, MetadataConfig};
use super::ResourceKind;

pub struct Role;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    #[serde(default)]
    pub rule: Vec<PolicyRuleConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyRuleConfig {
    #[serde(default)]
    pub api_groups: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    #[serde(default)]
    pub resource_names: Vec<String>,
    pub verbs: Vec<String>,
}

fn non_empty(values: &[String]) -> Option<Vec<String>> {
    (!values.is_empty()).then(|| values.to_vec())
}

fn expand_rules(rules: &[PolicyRuleConfig]) -> Vec<rbac::PolicyRule> {
    rules
        .iter()
        .map(|rule| rbac::PolicyRule {
            api_groups: non_empty(&rule.api_groups),
            resources: non_empty(&rule.resources),
            resource_names: non_empty(&rule.resource_names),
            verbs: rule.verbs.clone(),
            ..Default::default()
        })
        .collect()
}

fn flatten_rules(rules: Vec<rbac::PolicyRule>) -> Vec<PolicyRuleConfig> {
    rules
        .into_iter()
        .map(|rule| PolicyRuleConfig {
            api_groups: rule.api_groups.unwrap_or_default(),
            resources: rule.resources.unwrap_or_default(),
            resource_names: rule.resource_names.unwrap_or_default(),
            verbs: rule.verbs,
        })
        .collect()
}

impl ResourceKind for Role {
    const TYPE_NAME: &'static str = "kubernetes_role";
    const NAMESPACED: bool = true;

    type Config = RoleConfig;
    type Object = rbac::Role;

    fn metadata(config: &RoleConfig) -> &MetadataConfig {
        &config.metadata
    }

    fn expand(config: &RoleConfig) -> Result<rbac::Role> {
        let rules = expand_rules(&config.rule);
        Ok(rbac::Role {
            metadata: expand_metadata(&config.metadata),
            rules: (!rules.is_empty()).then_some(rules),
            ..Default::default()
        })
    }

    fn flatten(object: rbac::Role) -> Result<RoleConfig> {
        Ok(RoleConfig {
            metadata: flatten_metadata(object.metadata),
            rule: flatten_rules(object.rules.unwrap_or_default()),
        })
    }

    /// Rules are a list without identity, so any change replaces all of them.
    fn patch(old: &RoleConfig, new: &RoleConfig) -> Result<PatchOperations> {
        let mut ops = PatchOperations::new();
        if old.rule == new.rule {
            return Ok(ops);
        }
        let rules = serde_json::to_value(expand_rules(&new.rule))?;
        match (old.rule.is_empty(), new.rule.is_empty()) {
            (true, _) => ops.push(PatchOperation::add("/rules", rules)),
            (false, true) => ops.push(PatchOperation::remove("/rules")),
            (false, false) => ops.push(PatchOperation::replace("/rules", rules)),
        }
        Ok(ops)
    }
}
