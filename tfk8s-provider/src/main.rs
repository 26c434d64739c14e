use std::sync::Arc;

use anyhow::Result;
use clap::{CommandFactory, Parser, Subcommand};

mod client;
mod config;
mod logging;
mod provider;
mod resources;
mod schema;

fn main() -> Result<()> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?
        .block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = Args::parse();

    match &args.command {
        Commands::Run { config } => {
            logging::set_up(args.verbose)?;
            let client = config.connect().await?;
            let provider = provider::KubernetesProvider::new(
                Arc::new(client::KubeObjectApi::new(client)),
                config.settings(),
            );
            tracing::info!(namespace = %config.namespace, "serving provider requests");
            tfk8s_resource::framework::run_main(provider).await;
            Ok(())
        }
        Commands::Schema => {
            let schema = schema::ProviderSchema::from_registry();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
        Commands::GenerateMan => {
            let cmd = Args::command();
            let man = clap_mangen::Man::new(cmd);
            let mut buffer: Vec<u8> = Default::default();
            man.render(&mut buffer)?;
            println!("{}", String::from_utf8(buffer)?);
            Ok(())
        }
        Commands::GenerateMarkdown => {
            let opts = clap_markdown::MarkdownOptions::new().show_footer(false);
            let markdown: String = clap_markdown::help_markdown_custom::<Args>(&opts);
            println!("{}", markdown);
            Ok(())
        }
        Commands::GenerateCompletion { shell } => {
            let mut cmd = Args::command();
            clap_complete::generate(*shell, &mut cmd, "tfk8s-provider", &mut std::io::stdout());
            Ok(())
        }
    }
}

/// Kubernetes resource provider for tfk8s
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Increase log verbosity; repeat for more
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Serve provider requests on stdin/stdout
    Run {
        #[command(flatten)]
        config: config::ProviderConfig,
    },

    /// Print the supported resource and data source types
    Schema,

    /// Generate markdown documentation
    #[command(hide = true)]
    GenerateMarkdown,

    /// Generate a manpage
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
