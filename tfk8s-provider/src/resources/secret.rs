use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use k8s_openapi::api::core::v1 as core;
use k8s_openapi::ByteString;
use serde::{Deserialize, Serialize};
use tfk8s_patch::{diff_map, PatchOperations};

use super::metadata::{expand_metadata, flatten_metadata, MetadataConfig};
use super::{patch_field, validate_immutable_flag, ResourceKind};

pub struct Secret;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretConfig {
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Plain text values; encoding is the provider's job
    #[serde(default)]
    pub data: BTreeMap<String, String>,
    /// Base64 encoded values, for contents that are not UTF-8
    #[serde(default)]
    pub binary_data: BTreeMap<String, String>,
    #[serde(rename = "type", default = "default_secret_type")]
    pub type_: String,
    #[serde(default)]
    pub immutable: bool,
}

fn default_secret_type() -> String {
    "Opaque".to_string()
}

/// `data` and `binary_data` merged into the base64 map the API server stores.
///
/// The server has a single `data` map, so a value reads back under `data`
/// whenever it is valid UTF-8. Comparing wire values keeps that move from
/// showing up as a change.
fn wire_data(config: &SecretConfig) -> Result<BTreeMap<String, String>> {
    let mut wire = config
        .data
        .iter()
        .map(|(k, v)| (k.clone(), STANDARD.encode(v)))
        .collect::<BTreeMap<_, _>>();
    for (k, v) in &config.binary_data {
        if wire.contains_key(k) {
            bail!("{} is set in both data and binary_data", k);
        }
        wire.insert(k.clone(), v.clone());
    }
    Ok(wire)
}

impl ResourceKind for Secret {
    const TYPE_NAME: &'static str = "kubernetes_secret";
    const NAMESPACED: bool = true;

    type Config = SecretConfig;
    type Object = core::Secret;

    fn metadata(config: &SecretConfig) -> &MetadataConfig {
        &config.metadata
    }

    fn expand(config: &SecretConfig) -> Result<core::Secret> {
        let data = wire_data(config)?
            .into_iter()
            .map(|(k, v)| {
                let bytes = STANDARD
                    .decode(&v)
                    .with_context(|| format!("binary_data.{} is not valid base64", k))?;
                Ok((k, ByteString(bytes)))
            })
            .collect::<Result<BTreeMap<_, _>>>()?;
        Ok(core::Secret {
            metadata: expand_metadata(&config.metadata),
            data: (!data.is_empty()).then_some(data),
            type_: Some(config.type_.clone()),
            immutable: config.immutable.then_some(true),
            ..Default::default()
        })
    }

    fn flatten(object: core::Secret) -> Result<SecretConfig> {
        let mut data = BTreeMap::new();
        let mut binary_data = BTreeMap::new();
        for (k, v) in object.data.unwrap_or_default() {
            match String::from_utf8(v.0) {
                Ok(text) => {
                    data.insert(k, text);
                }
                Err(e) => {
                    binary_data.insert(k, STANDARD.encode(e.into_bytes()));
                }
            }
        }
        Ok(SecretConfig {
            metadata: flatten_metadata(object.metadata),
            data,
            binary_data,
            type_: object.type_.unwrap_or_else(default_secret_type),
            immutable: object.immutable.unwrap_or(false),
        })
    }

    fn patch(old: &SecretConfig, new: &SecretConfig) -> Result<PatchOperations> {
        let mut ops = diff_map("/data/", &wire_data(old)?, &wire_data(new)?);
        patch_field(
            &mut ops,
            "/immutable",
            old.immutable.then_some(&true),
            new.immutable.then_some(&true),
        )?;
        Ok(ops)
    }

    fn validate_update(old: &SecretConfig, new: &SecretConfig) -> Result<()> {
        if old.type_ != new.type_ {
            bail!(
                "{}: changing type from {:?} to {:?} requires replacement",
                Self::TYPE_NAME,
                old.type_,
                new.type_
            );
        }
        validate_immutable_flag(
            Self::TYPE_NAME,
            old.immutable,
            new.immutable,
            &wire_data(old)?,
            &wire_data(new)?,
        )
    }
}
