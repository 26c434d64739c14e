use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tfk8s_patch::{child_path, diff_map, PatchOperation, PatchOperations};

/// The `metadata` block shared by every resource kind.
///
/// `uid`, `resource_version` and `generation` are computed by the API server
/// and only ever flow out.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generate_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub annotations: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation: Option<i64>,
}

pub fn expand_metadata(config: &MetadataConfig) -> ObjectMeta {
    ObjectMeta {
        name: config.name.clone(),
        generate_name: config.generate_name.clone(),
        namespace: config.namespace.clone(),
        labels: non_empty(&config.labels),
        annotations: non_empty(&config.annotations),
        ..Default::default()
    }
}

pub fn flatten_metadata(meta: ObjectMeta) -> MetadataConfig {
    MetadataConfig {
        name: meta.name,
        generate_name: meta.generate_name,
        namespace: meta.namespace,
        labels: remove_internal_keys(meta.labels.unwrap_or_default()),
        annotations: remove_internal_keys(meta.annotations.unwrap_or_default()),
        uid: meta.uid,
        resource_version: meta.resource_version,
        generation: meta.generation,
    }
}

/// Which of the label and annotation maps exist on the server object, even
/// if they only hold internal keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ServerMaps {
    pub annotations: bool,
    pub labels: bool,
}

impl ServerMaps {
    pub fn of(object: &Value) -> Self {
        let present = |key: &str| {
            object
                .get("metadata")
                .and_then(|m| m.get(key))
                .is_some_and(Value::is_object)
        };
        ServerMaps {
            annotations: present("annotations"),
            labels: present("labels"),
        }
    }
}

/// Whether [`patch_metadata`] needs to know about the server maps: only an
/// empty visible map can be hiding internal keys from the diff.
pub fn needs_server_maps(old: &MetadataConfig, new: &MetadataConfig) -> bool {
    (old.annotations.is_empty() && !new.annotations.is_empty())
        || (old.labels.is_empty() && !new.labels.is_empty())
}

/// Label and annotation changes under `path_prefix` (e.g. `/metadata/`).
pub fn patch_metadata(
    path_prefix: &str,
    old: &MetadataConfig,
    new: &MetadataConfig,
    server: ServerMaps,
) -> PatchOperations {
    let mut ops = PatchOperations::new();
    if old.annotations != new.annotations {
        ops.extend(diff_keys(
            &format!("{}annotations/", path_prefix),
            &old.annotations,
            &new.annotations,
            server.annotations,
        ));
    }
    if old.labels != new.labels {
        ops.extend(diff_keys(
            &format!("{}labels/", path_prefix),
            &old.labels,
            &new.labels,
            server.labels,
        ));
    }
    ops
}

/// Like [`diff_map`], but an existing map on the server is never replaced as
/// a whole, so that the internal keys hidden from `old` survive.
fn diff_keys(
    path_prefix: &str,
    old: &BTreeMap<String, String>,
    new: &BTreeMap<String, String>,
    on_server: bool,
) -> PatchOperations {
    if old.is_empty() && on_server {
        new.iter()
            .map(|(k, v)| PatchOperation::add(child_path(path_prefix, k), v.as_str()))
            .collect()
    } else {
        diff_map(path_prefix, old, new)
    }
}

fn non_empty(map: &BTreeMap<String, String>) -> Option<BTreeMap<String, String>> {
    if map.is_empty() {
        None
    } else {
        Some(map.clone())
    }
}

/// Whether a label or annotation key is owned by Kubernetes itself, in which
/// case it is hidden from the resource's state.
pub fn is_internal_key(key: &str) -> bool {
    let host = match key.split_once('/') {
        Some((host, _)) => host,
        None => return false,
    };
    match host {
        // user specified application keys
        "app.kubernetes.io" => false,
        // load balancer configuration
        "service.beta.kubernetes.io" => false,
        _ if host.ends_with("kubernetes.io") => true,
        _ => key.contains("deprecated.daemonset.template.generation"),
    }
}

fn remove_internal_keys(map: BTreeMap<String, String>) -> BTreeMap<String, String> {
    map.into_iter().filter(|(k, _)| !is_internal_key(k)).collect()
}
