use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use retriever_engine::{CallbackRegistry, EntityCollection, EntityConfiguration, parse_delimiter};
use tracing::info;

/// Retrieve data about entities listed in a CSV file from a JSON API and
/// export the results to `<export-dir>/<name>.csv`.
#[derive(Debug, Parser)]
#[command(name = "api-retriever", version, about)]
struct Cli {
    /// Entity configuration (JSON with comments, or YAML)
    #[arg(short = 'c', long = "config-file")]
    config_file: PathBuf,

    /// CSV file with one row per entity
    #[arg(short = 'i', long = "input-file")]
    input_file: PathBuf,

    /// Directory for the exported CSV file
    #[arg(short = 'e', long = "export-dir")]
    export_dir: PathBuf,

    /// Column delimiter of input and output files
    #[arg(short = 'd', long, default_value = ",")]
    delimiter: String,

    /// Overrides the api_key of the configuration
    #[arg(long, env = "RETRIEVER_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Log at debug level unless RUST_LOG is set
    #[arg(long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    run(cli).await
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose { "debug" } else { "info" };
    let filter = std::env::var("RUST_LOG").unwrap_or_else(|_| default_filter.into());
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let delimiter = parse_delimiter(&cli.delimiter).context("invalid --delimiter")?;

    let registry = CallbackRegistry::default();
    let mut configuration = EntityConfiguration::load(&cli.config_file, &registry)
        .with_context(|| format!("failed to load configuration {}", cli.config_file.display()))?;
    if let Some(api_key) = cli.api_key {
        configuration = configuration.with_api_key(api_key);
    }

    let mut collection = EntityCollection::new(configuration)?;
    collection
        .load_from_path(&cli.input_file, delimiter)
        .with_context(|| format!("failed to read entities from {}", cli.input_file.display()))?;

    let retrieval = collection.retrieve_all().await?;

    let export_path = collection.export_path(&cli.export_dir);
    let export = collection
        .export_to_dir(&cli.export_dir, delimiter)
        .with_context(|| format!("failed to export entities to {}", export_path.display()))?;

    info!(
        retrieved = retrieval.retrieved,
        failed = retrieval.failed,
        excluded = retrieval.excluded,
        exported = export.written,
        skipped = export.skipped,
        path = %export_path.display(),
        "run finished"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_short_flags_with_default_delimiter() {
        let cli = Cli::try_parse_from(["api-retriever", "-c", "users.json", "-i", "users.csv", "-e", "out"]).unwrap();
        assert_eq!(cli.config_file, PathBuf::from("users.json"));
        assert_eq!(cli.delimiter, ",");
        assert!(!cli.verbose);
    }

    #[test]
    fn requires_config_input_and_export_dir() {
        assert!(Cli::try_parse_from(["api-retriever", "-c", "users.json"]).is_err());
    }
}
