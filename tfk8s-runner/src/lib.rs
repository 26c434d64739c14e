use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
    process::{Command, Stdio},
};

use anyhow::{anyhow, bail, Context, Result};
use serde_json::{Map, Value};
use tfk8s_resource::schema::v0;

pub struct ResourceProviderConfig {
    pub provider_executable: String,
    pub provider_args: Vec<String>,
}

/// Talks to a provider by spawning it once per request.
pub struct ResourceProviderClient {
    provider_config: ResourceProviderConfig,
}

fn to_map(properties: &BTreeMap<String, Value>) -> Map<String, Value> {
    properties
        .iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn from_map(properties: Map<String, Value>) -> BTreeMap<String, Value> {
    properties.into_iter().collect()
}

fn unexpected(expected: &str, response: v0::Response) -> anyhow::Error {
    match response {
        v0::Response::Error(e) => anyhow!("Provider error: {}", e.message),
        other => anyhow!(
            "Unexpected response from provider: expected {}, got {:?}",
            expected,
            other
        ),
    }
}

impl ResourceProviderClient {
    pub fn new(provider_config: ResourceProviderConfig) -> Self {
        ResourceProviderClient { provider_config }
    }

    /// Send one request and return the provider's response, which may be an
    /// error response.
    pub fn request(&self, request: &v0::Request) -> Result<v0::Response> {
        let executable = &self.provider_config.provider_executable;
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        tracing::debug!(request = %line.trim_end(), "sending request");

        let mut process = Command::new(executable)
            .args(&self.provider_config.provider_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .with_context(|| format!("Could not spawn provider process {}", executable))?;

        let response = {
            let mut child_in = process
                .stdin
                .take()
                .ok_or_else(|| anyhow!("Provider process has no stdin"))?;
            let child_out = process
                .stdout
                .take()
                .ok_or_else(|| anyhow!("Provider process has no stdout"))?;
            let mut child_reader = std::io::BufReader::new(child_out);

            child_in
                .write_all(line.as_bytes())
                .and_then(|()| child_in.flush())
                .with_context(|| "Could not write request to provider")?;

            let mut response = String::new();
            child_reader
                .read_line(&mut response)
                .with_context(|| "Could not read response from provider")?;
            response
            // This closes stdin
        };

        let status = process
            .wait()
            .with_context(|| format!("Could not wait for provider process {}", executable))?;

        if response.trim().is_empty() {
            bail!(
                "Provider {} exited ({}) without responding",
                executable,
                status
            );
        }
        if !status.success() {
            tracing::warn!(%status, "provider exited unsuccessfully after responding");
        }
        serde_json::from_str(&response)
            .with_context(|| format!("Could not parse provider response: {}", response.trim_end()))
    }

    pub fn create(
        &self,
        type_: &str,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>> {
        let request = v0::Request::Create(v0::CreateResourceRequest {
            type_: v0::ResourceType(type_.to_string()),
            input_properties: v0::InputProperties(to_map(inputs)),
        });
        match self.request(&request)? {
            v0::Response::Create(r) => Ok(from_map(r.output_properties.0)),
            other => Err(unexpected("create", other)),
        }
    }

    /// `None` if the provider reports that the resource is gone.
    pub fn read(&self, resource: &v0::ExtantResource) -> Result<Option<BTreeMap<String, Value>>> {
        let request = v0::Request::Read(v0::ReadResourceRequest {
            resource: resource.clone(),
        });
        match self.request(&request)? {
            v0::Response::Read(r) => Ok(r.output_properties.map(|o| from_map(o.0))),
            other => Err(unexpected("read", other)),
        }
    }

    pub fn update(
        &self,
        resource: &v0::ExtantResource,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>> {
        let request = v0::Request::Update(v0::UpdateResourceRequest {
            resource: resource.clone(),
            input_properties: v0::InputProperties(to_map(inputs)),
        });
        match self.request(&request)? {
            v0::Response::Update(r) => Ok(from_map(r.output_properties.0)),
            other => Err(unexpected("update", other)),
        }
    }

    pub fn delete(&self, resource: &v0::ExtantResource) -> Result<()> {
        let request = v0::Request::Delete(v0::DeleteResourceRequest {
            resource: resource.clone(),
        });
        match self.request(&request)? {
            v0::Response::Delete(_) => Ok(()),
            other => Err(unexpected("delete", other)),
        }
    }

    pub fn exists(&self, resource: &v0::ExtantResource) -> Result<bool> {
        let request = v0::Request::Exists(v0::ExistsResourceRequest {
            resource: resource.clone(),
        });
        match self.request(&request)? {
            v0::Response::Exists(r) => Ok(r.exists),
            other => Err(unexpected("exists", other)),
        }
    }

    pub fn read_data_source(
        &self,
        type_: &str,
        inputs: &BTreeMap<String, Value>,
    ) -> Result<BTreeMap<String, Value>> {
        let request = v0::Request::ReadDataSource(v0::ReadDataSourceRequest {
            type_: v0::ResourceType(type_.to_string()),
            input_properties: v0::InputProperties(to_map(inputs)),
        });
        match self.request(&request)? {
            v0::Response::ReadDataSource(r) => Ok(from_map(r.output_properties.0)),
            other => Err(unexpected("readDataSource", other)),
        }
    }
}
