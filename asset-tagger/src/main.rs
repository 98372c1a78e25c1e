use anyhow::{Context, Result};
use asset_tagger::{Credentials, InferenceEndpoint, PromptBuilder, TaggerConfig, TaggingPipeline, TaggingRequest};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "asset-tagger", about = "Tag repository assets with a vision model")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Tag one asset and print the report as JSON
    Run {
        /// Invocation JSON (`assetPath`, `promptConfigs`, `aemInstanceUrl`), `-` for stdin
        #[arg(long, default_value = "-")]
        request: PathBuf,

        #[arg(long, env = "AEM_ACCESS_TOKEN", hide_env_values = true)]
        access_token: String,

        #[arg(long, env = "AZURE_OPENAI_ENDPOINT")]
        inference_endpoint: String,

        #[arg(long, env = "AZURE_OPENAI_API_KEY", hide_env_values = true)]
        inference_api_key: String,

        /// Chain the content-node write after the Assets API gives up
        #[arg(long)]
        commit_fallback: bool,
    },
    /// Print the prompt that would be sent for a request, without any network calls
    Prompt {
        #[arg(long, default_value = "-")]
        request: PathBuf,
    },
}

fn read_request(source: &Path) -> Result<TaggingRequest> {
    let raw = if source.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).context("reading request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(source).with_context(|| format!("reading request from {}", source.display()))?
    };
    serde_json::from_str(&raw).context("request is not valid JSON")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Prompt { request } => {
            let request = read_request(&request)?;
            let spec = PromptBuilder::new().build(request.configs()?, &request.asset_path)?;
            println!("{}", serde_json::to_string_pretty(&spec)?);
            Ok(())
        }
        Command::Run {
            request,
            access_token,
            inference_endpoint,
            inference_api_key,
            commit_fallback,
        } => {
            let request = read_request(&request)?;

            let mut config = TaggerConfig::from_env()?;
            config.commit.fallback_on_primary_failure |= commit_fallback;

            let credentials = Credentials {
                access_token,
                inference: InferenceEndpoint {
                    url: inference_endpoint,
                    api_key: inference_api_key,
                },
            };

            let pipeline = TaggingPipeline::from_config(&config, credentials).context("building pipeline")?;
            let report = pipeline.run(&request).await;

            println!("{}", serde_json::to_string_pretty(&report)?);

            if report.is_success() {
                info!("Tagged {} ({} properties)", report.asset_path, report.properties_count);
                Ok(())
            } else {
                error!("Tagging failed for {}", report.asset_path);
                std::process::exit(1);
            }
        }
    }
}
