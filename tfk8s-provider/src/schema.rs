use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resources::{data_source_handlers, resource_handlers};

/// The resource and data source types this provider serves
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSchema {
    pub resource_schemas: BTreeMap<String, TypeSchema>,
    pub data_source_schemas: BTreeMap<String, TypeSchema>,
}

/// The Kubernetes kind behind a resource or data source type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeSchema {
    pub api_version: String,
    pub kind: String,
    /// Whether objects live in a namespace, and so have `namespace/name` IDs
    pub namespaced: bool,
}

impl ProviderSchema {
    pub fn from_registry() -> Self {
        ProviderSchema {
            resource_schemas: resource_handlers()
                .iter()
                .map(|h| {
                    let resource = h.api_resource();
                    (
                        h.type_name().to_string(),
                        TypeSchema {
                            api_version: resource.api_version,
                            kind: resource.kind,
                            namespaced: h.namespaced(),
                        },
                    )
                })
                .collect(),
            data_source_schemas: data_source_handlers()
                .iter()
                .map(|h| {
                    let resource = h.api_resource();
                    (
                        h.type_name().to_string(),
                        TypeSchema {
                            api_version: resource.api_version,
                            kind: resource.kind,
                            namespaced: h.namespaced(),
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn has_resource(&self, name: &str) -> bool {
        self.resource_schemas.contains_key(name)
    }

    pub fn get_resource_schema(&self, name: &str) -> Option<&TypeSchema> {
        self.resource_schemas.get(name)
    }

    pub fn has_data_source(&self, name: &str) -> bool {
        self.data_source_schemas.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn registry_lists_all_types() {
        let schema = ProviderSchema::from_registry();
        for name in [
            "kubernetes_namespace",
            "kubernetes_config_map",
            "kubernetes_secret",
            "kubernetes_role",
            "kubernetes_horizontal_pod_autoscaler",
            "kubernetes_csi_driver",
        ] {
            assert!(schema.has_resource(name), "missing {}", name);
        }
        assert_eq!(schema.resource_schemas.len(), 6);

        assert!(schema.has_data_source("kubernetes_secret"));
        assert!(!schema.has_data_source("kubernetes_role"));
    }

    #[test]
    fn kinds_and_scopes() {
        let schema = ProviderSchema::from_registry();
        assert_eq!(
            schema.get_resource_schema("kubernetes_role"),
            Some(&TypeSchema {
                api_version: "rbac.authorization.k8s.io/v1".to_string(),
                kind: "Role".to_string(),
                namespaced: true,
            })
        );
        assert_eq!(
            serde_json::to_value(schema.get_resource_schema("kubernetes_csi_driver")).unwrap(),
            json!({ "api_version": "storage.k8s.io/v1", "kind": "CSIDriver", "namespaced": false })
        );
        assert_eq!(
            schema
                .get_resource_schema("kubernetes_horizontal_pod_autoscaler")
                .map(|s| s.api_version.as_str()),
            Some("autoscaling/v1")
        );
    }
}
