//! The tfk8s-runner executable
//!
//! Sends a single request to a resource provider and prints the outcome,
//! without a declarative engine in between.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use serde_json::{Map, Value};
use tfk8s_resource::schema::v0;
use tfk8s_runner::{ResourceProviderClient, ResourceProviderConfig};

fn main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Commands::Create { provider, inputs } => {
            let outputs = provider.client().create(&provider.resource_type, &inputs.collect()?)?;
            print_json(&outputs)?;
        }
        Commands::Read {
            provider,
            inputs,
            outputs,
        } => {
            let resource = extant(provider, inputs, outputs)?;
            match provider.client().read(&resource)? {
                Some(outputs) => print_json(&outputs)?,
                None => eprintln!("resource no longer exists"),
            }
        }
        Commands::Update {
            provider,
            inputs,
            outputs,
            new_inputs_json,
        } => {
            let resource = extant(provider, inputs, outputs)?;
            let new_inputs: BTreeMap<String, Value> = match new_inputs_json {
                Some(json) => parse_object("--new-inputs-json", json)?.into_iter().collect(),
                None => inputs.collect()?,
            };
            let outputs = provider.client().update(&resource, &new_inputs)?;
            print_json(&outputs)?;
        }
        Commands::Delete {
            provider,
            inputs,
            outputs,
        } => {
            let resource = extant(provider, inputs, outputs)?;
            provider.client().delete(&resource)?;
        }
        Commands::Exists {
            provider,
            inputs,
            outputs,
        } => {
            let resource = extant(provider, inputs, outputs)?;
            let exists = provider.client().exists(&resource)?;
            print_json(&serde_json::json!({ "exists": exists }))?;
        }
        Commands::Data { provider, inputs } => {
            let outputs = provider
                .client()
                .read_data_source(&provider.resource_type, &inputs.collect()?)?;
            print_json(&outputs)?;
        }
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "tfk8s-runner", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_object(flag: &str, json: &str) -> Result<Map<String, Value>> {
    serde_json::from_str::<Map<String, Value>>(json)
        .with_context(|| format!("failed to parse value of {}", flag))
}

fn extant(
    provider: &ProviderArgs,
    inputs: &InputArgs,
    outputs: &OutputArgs,
) -> Result<v0::ExtantResource> {
    Ok(v0::ExtantResource {
        type_: v0::ResourceType(provider.resource_type.clone()),
        input_properties: v0::InputProperties(inputs.collect()?.into_iter().collect()),
        output_properties: outputs
            .outputs_json
            .as_deref()
            .map(|json| parse_object("--outputs-json", json).map(v0::OutputProperties))
            .transpose()?,
    })
}

/// Send single requests to a tfk8s resource provider
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args, Debug)]
struct ProviderArgs {
    /// The executable that implements the resource operations
    #[arg(long)]
    provider_exe: String,

    /// Arguments to pass to the provider executable, e.g. `run`
    #[arg(long("provider-arg"), value_name = "ARG")]
    provider_args: Vec<String>,

    /// The resource or data source type: an identifier recognized by the provider
    #[arg(long("type"))]
    resource_type: String,
}

impl ProviderArgs {
    fn client(&self) -> ResourceProviderClient {
        ResourceProviderClient::new(ResourceProviderConfig {
            provider_executable: self.provider_exe.clone(),
            provider_args: self.provider_args.clone(),
        })
    }
}

#[derive(clap::Args, Debug)]
struct InputArgs {
    /// The (whole) JSON input properties for the resource
    ///
    /// This is a JSON object with the values needed to create the resource.
    /// The structure of this object is defined by the resource type.
    #[arg(long("inputs-json"))]
    input_properties_json: Option<String>,

    /// An individual input property for the resource, in JSON format
    #[arg(long("input-json"), short('j'), number_of_values = 2, value_names = &["NAME", "JSON"])]
    input_property_json: Vec<String>,

    /// An individual input property for the resource, as a raw string.
    ///
    /// This is equivalent to `--input-json NAME JSON` if JSON is the JSON string formatting of STR.
    #[arg(long("input-str"), short('s'), number_of_values = 2, value_names = &["NAME", "STR"])]
    input_property_str: Vec<String>,
}

impl InputArgs {
    /// Gather all input properties.
    ///
    /// clap does not preserve the relative order of different flags, so
    /// there is no "later one wins". Duplicates are rejected instead, which
    /// leaves room for adding override semantics later.
    fn collect(&self) -> Result<BTreeMap<String, Value>> {
        let mut inputs: BTreeMap<String, Value> = match &self.input_properties_json {
            Some(json) => parse_object("--inputs-json", json)?.into_iter().collect(),
            None => BTreeMap::new(),
        };

        for pair in self.input_property_json.chunks(2) {
            let [k, v] = pair else {
                bail!("--input-json takes a NAME and a JSON value");
            };
            if inputs.contains_key(k) {
                bail!("duplicate input: {}", k);
            }
            let value = serde_json::from_str(v)
                .with_context(|| format!("failed to parse JSON value for input: {}", k))?;
            inputs.insert(k.clone(), value);
        }
        for pair in self.input_property_str.chunks(2) {
            let [k, v] = pair else {
                bail!("--input-str takes a NAME and a string");
            };
            if inputs.contains_key(k) {
                bail!("duplicate input: {}", k);
            }
            inputs.insert(k.clone(), Value::String(v.clone()));
        }
        Ok(inputs)
    }
}

#[derive(clap::Args, Debug)]
struct OutputArgs {
    /// The output properties from a previous create, read or update
    #[arg(long("outputs-json"))]
    outputs_json: Option<String>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create a resource
    Create {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Read the current state of a resource
    Read {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        outputs: OutputArgs,
    },

    /// Update a resource in place
    Update {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        outputs: OutputArgs,
        /// The desired input properties; defaults to the current ones
        #[arg(long("new-inputs-json"))]
        new_inputs_json: Option<String>,
    },

    /// Delete a resource
    Delete {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        outputs: OutputArgs,
    },

    /// Check whether a resource still exists
    Exists {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
        #[command(flatten)]
        outputs: OutputArgs,
    },

    /// Read a data source
    Data {
        #[command(flatten)]
        provider: ProviderArgs,
        #[command(flatten)]
        inputs: InputArgs,
    },

    /// Generate markdown documentation for tfk8s-runner
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage for tfk8s-runner
    #[command(hide = true)]
    GenerateMan,

    /// Generate shell completion
    #[command(hide = true)]
    GenerateCompletion {
        /// The shell to generate completion for
        #[arg(long)]
        shell: clap_complete::Shell,
    },
}
