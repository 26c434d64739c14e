//! The resource kinds this provider manages.
//!
//! Every kind is a [`ResourceKind`]: a typed configuration struct, the
//! `k8s-openapi` object it expands to, and the patch assembler used on update.
//! The lifecycle around them is shared (see [`lifecycle`]), and
//! [`resource_handlers`] / [`data_source_handlers`] are the registration
//! tables the provider dispatches on.

use std::time::Duration;

use anyhow::{bail, Result};
use serde::{de::DeserializeOwned, Serialize};
use tfk8s_patch::{PatchOperation, PatchOperations};

pub mod config_map;
pub mod csi_driver;
pub mod horizontal_pod_autoscaler;
pub mod lifecycle;
pub mod metadata;
pub mod namespace;
pub mod role;
pub mod secret;

pub use lifecycle::{DataSourceHandler, ResourceHandler};
use metadata::MetadataConfig;

/// Settings shared by all lifecycle operations.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Namespace for namespaced objects that do not set one
    pub default_namespace: String,
    /// How long to wait for objects with finalizers to disappear
    pub delete_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            default_namespace: "default".to_string(),
            delete_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_secs(1),
        }
    }
}

pub trait ResourceKind: Send + Sync + 'static {
    /// The resource type name used in requests, e.g. `kubernetes_namespace`
    const TYPE_NAME: &'static str;
    const NAMESPACED: bool;
    /// Whether deletion is only complete once the object is gone, rather than
    /// when the API server accepted the request.
    const WAIT_FOR_DELETION: bool = false;

    type Config: Serialize + DeserializeOwned + Send + Sync;
    type Object: kube::Resource<DynamicType = ()> + Serialize + DeserializeOwned + Send + Sync;

    fn metadata(config: &Self::Config) -> &MetadataConfig;

    fn expand(config: &Self::Config) -> Result<Self::Object>;

    fn flatten(object: Self::Object) -> Result<Self::Config>;

    /// The operations for an in-place update from `old` to `new`.
    ///
    /// Metadata and the immutable identity fields are handled by the caller
    /// through [`validate_update`](Self::validate_update) and
    /// [`metadata::patch_metadata`].
    fn patch(old: &Self::Config, new: &Self::Config) -> Result<PatchOperations>;

    /// Reject changes that cannot be made in place.
    fn validate_update(_old: &Self::Config, _new: &Self::Config) -> Result<()> {
        Ok(())
    }
}

/// The registered resource types.
pub fn resource_handlers() -> Vec<Box<dyn ResourceHandler>> {
    vec![
        lifecycle::handler::<namespace::Namespace>(),
        lifecycle::handler::<config_map::ConfigMap>(),
        lifecycle::handler::<secret::Secret>(),
        lifecycle::handler::<role::Role>(),
        lifecycle::handler::<horizontal_pod_autoscaler::HorizontalPodAutoscaler>(),
        lifecycle::handler::<csi_driver::CsiDriver>(),
    ]
}

/// The registered data source types.
pub fn data_source_handlers() -> Vec<Box<dyn DataSourceHandler>> {
    vec![
        lifecycle::data_source::<namespace::Namespace>(),
        lifecycle::data_source::<config_map::ConfigMap>(),
        lifecycle::data_source::<secret::Secret>(),
    ]
}

/// Where an object lives: `namespace/name` for namespaced kinds, `name`
/// otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectId {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectId {
    pub fn parse(id: &str, namespaced: bool) -> Result<ObjectId> {
        if namespaced {
            match id.split('/').collect::<Vec<_>>()[..] {
                [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
                    Ok(ObjectId {
                        namespace: Some(namespace.to_string()),
                        name: name.to_string(),
                    })
                }
                _ => bail!(
                    "Unexpected ID format ({:?}), expected {:?}.",
                    id,
                    "namespace/name"
                ),
            }
        } else {
            if id.is_empty() || id.contains('/') {
                bail!("Unexpected ID format ({:?}), expected {:?}.", id, "name");
            }
            Ok(ObjectId {
                namespace: None,
                name: id.to_string(),
            })
        }
    }
}

impl std::fmt::Display for ObjectId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(namespace) => write!(f, "{}/{}", namespace, self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Push the operation that moves an optional field at `path` from `old` to
/// `new`, if any.
pub fn patch_field<T: Serialize + PartialEq>(
    ops: &mut PatchOperations,
    path: &str,
    old: Option<&T>,
    new: Option<&T>,
) -> Result<()> {
    match (old, new) {
        (Some(_), None) => ops.push(PatchOperation::remove(path)),
        (None, Some(new)) => ops.push(PatchOperation::add(path, serde_json::to_value(new)?)),
        (Some(old), Some(new)) if old != new => {
            ops.push(PatchOperation::replace(path, serde_json::to_value(new)?))
        }
        _ => {}
    }
    Ok(())
}

/// `immutable` objects only accept the change that makes them immutable.
pub fn validate_immutable_flag<T: PartialEq>(
    type_name: &str,
    old_immutable: bool,
    new_immutable: bool,
    old_contents: &T,
    new_contents: &T,
) -> Result<()> {
    if old_immutable && !new_immutable {
        bail!(
            "{}: immutable cannot be unset; changing it requires replacement",
            type_name
        );
    }
    if old_immutable && old_contents != new_contents {
        bail!(
            "{}: the object is immutable; changing its data requires replacement",
            type_name
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_namespaced_id() {
        assert_eq!(
            ObjectId::parse("kube-system/coredns", true).unwrap(),
            ObjectId {
                namespace: Some("kube-system".to_string()),
                name: "coredns".to_string(),
            }
        );
    }

    #[test]
    fn parse_malformed_ids() {
        for id in ["a/b/c", "noslash", "/name", "ns/", ""] {
            let err = ObjectId::parse(id, true).unwrap_err();
            assert!(
                err.to_string().starts_with("Unexpected ID format"),
                "{}",
                err
            );
        }
        assert!(ObjectId::parse("a/b", false).is_err());
        assert!(ObjectId::parse("", false).is_err());
    }

    #[test]
    fn id_display_roundtrip() {
        for (id, namespaced) in [("default/web", true), ("csi.example.com", false)] {
            assert_eq!(ObjectId::parse(id, namespaced).unwrap().to_string(), id);
        }
    }

    #[test]
    fn patch_field_transitions() {
        let mut ops = PatchOperations::new();
        patch_field(&mut ops, "/spec/a", None::<&i32>, None).unwrap();
        patch_field(&mut ops, "/spec/b", Some(&1), Some(&1)).unwrap();
        assert!(ops.is_empty());

        patch_field(&mut ops, "/spec/c", None, Some(&2)).unwrap();
        patch_field(&mut ops, "/spec/d", Some(&2), Some(&3)).unwrap();
        patch_field(&mut ops, "/spec/e", Some(&4), None).unwrap();
        assert_eq!(
            ops,
            PatchOperations(vec![
                PatchOperation::add("/spec/c", 2),
                PatchOperation::replace("/spec/d", 3),
                PatchOperation::remove("/spec/e"),
            ])
        );
    }

    #[test]
    fn immutable_flag() {
        assert!(validate_immutable_flag("t", false, true, &1, &2).is_ok());
        assert!(validate_immutable_flag("t", true, true, &1, &1).is_ok());
        assert!(validate_immutable_flag("t", true, false, &1, &1).is_err());
        assert!(validate_immutable_flag("t", true, true, &1, &2).is_err());
    }
}
