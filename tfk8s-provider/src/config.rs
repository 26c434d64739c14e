//! Connection and behavior settings, from the command line or the environment.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};

use crate::resources::Settings;

#[derive(clap::Args, Debug, Clone)]
pub struct ProviderConfig {
    /// Path to a kubeconfig file; without it, the default kubeconfig or the
    /// in-cluster service account is used
    #[arg(long, env = "TFK8S_KUBECONFIG")]
    pub kubeconfig: Option<PathBuf>,

    /// The kubeconfig context to use instead of the current one
    #[arg(long, env = "TFK8S_CONTEXT")]
    pub context: Option<String>,

    /// Namespace for namespaced resources that do not specify one
    #[arg(long, env = "TFK8S_NAMESPACE", default_value = "default")]
    pub namespace: String,

    /// Seconds to wait for a deleted namespace to disappear
    #[arg(long, value_name = "SECONDS", default_value_t = 300)]
    pub delete_timeout: u64,

    /// Seconds to wait for a response from the API server
    #[arg(long, value_name = "SECONDS", default_value_t = 30)]
    pub request_timeout: u64,
}

impl ProviderConfig {
    pub fn settings(&self) -> Settings {
        Settings {
            default_namespace: self.namespace.clone(),
            delete_timeout: Duration::from_secs(self.delete_timeout),
            ..Settings::default()
        }
    }

    pub async fn connect(&self) -> Result<Client> {
        let options = KubeConfigOptions {
            context: self.context.clone(),
            ..Default::default()
        };
        let mut config = match (&self.kubeconfig, &self.context) {
            (Some(path), _) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Could not read kubeconfig {}", path.display()))?;
                Config::from_custom_kubeconfig(kubeconfig, &options)
                    .await
                    .with_context(|| format!("Could not load kubeconfig {}", path.display()))?
            }
            (None, Some(context)) => Config::from_kubeconfig(&options)
                .await
                .with_context(|| format!("Could not load kubeconfig context {}", context))?,
            (None, None) => Config::infer()
                .await
                .context("Could not infer a Kubernetes client configuration")?,
        };
        config.read_timeout = Some(Duration::from_secs(self.request_timeout));
        tracing::debug!(cluster_url = %config.cluster_url, "connecting to cluster");
        Client::try_from(config).context("Could not create Kubernetes client")
    }
}
