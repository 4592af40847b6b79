//! Signpost server entry point.

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use signpost::{choropleth, registry, to_keyed_dataset, ConvertOptions, SparqlResults};
use signpost_server::config::{ConfigOverrides, SignpostConfig};
use signpost_server::fetch::Fetcher;
use signpost_server::session::choropleth::build_choropleth;

#[derive(Parser)]
#[command(
    name = "signpost-server",
    about = "Signpost map server: datasets, boundaries and linked data for the map client",
    version
)]
struct Cli {
    /// Dataset registry file or URL.
    #[arg(short, long)]
    registry: Option<String>,

    /// SPARQL endpoint for choropleth data.
    #[arg(long)]
    endpoint: Option<String>,

    /// Nominatim-compatible geocoder base URL.
    #[arg(long)]
    geocoder: Option<String>,

    /// Request timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the map client API over HTTP (default).
    Serve {
        /// Listen address (host:port).
        #[arg(long, default_value = "127.0.0.1:3100")]
        addr: String,
    },

    /// Convert a SPARQL results JSON file into keyed JSON.
    Convert {
        /// SPARQL results JSON file.
        input: PathBuf,

        /// Variable whose value keys each record.
        #[arg(short, long)]
        key: String,

        /// Convert every value to this type (integer, float, boolean, string).
        #[arg(long)]
        force_type: Option<String>,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print the dataset and choropleth selectors as JSON.
    Datasets {
        /// Dataset to mark as selected.
        #[arg(long)]
        dataset: Option<String>,
    },

    /// Fetch and print a styled choropleth layer as GeoJSON.
    Choropleth {
        /// Choropleth layer key.
        #[arg(default_value = choropleth::CLAIMANT_COUNT)]
        name: String,

        /// Output file. Defaults to stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Generate shell completion scripts.
    ///
    /// Examples:
    ///   signpost-server completions bash > ~/.local/share/bash-completion/completions/signpost-server
    ///   signpost-server completions zsh > ~/.zfunc/_signpost-server
    Completions {
        /// Shell type (bash, zsh, fish, powershell, elvish).
        shell: Shell,
    },
}

fn write_output(output: Option<PathBuf>, json: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(&path, json)?;
            tracing::info!("Wrote {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let overrides = ConfigOverrides {
        registry: cli.registry,
        endpoint: cli.endpoint,
        geocoder: cli.geocoder,
        timeout_ms: cli.timeout_ms,
    };

    match cli.command.unwrap_or(Commands::Serve {
        addr: "127.0.0.1:3100".to_string(),
    }) {
        Commands::Serve { addr } => {
            let config = SignpostConfig::resolve(overrides)?;
            serve(config, &addr).await?;
        }

        Commands::Convert {
            input,
            key,
            force_type,
            output,
        } => {
            let text = std::fs::read_to_string(&input)?;
            let results = SparqlResults::from_json(&text)?;
            let options = force_type
                .as_deref()
                .map(ConvertOptions::with_force_type_name)
                .unwrap_or_default();
            let keyed = to_keyed_dataset(&results, &key, &options)?;
            tracing::info!("Converted {} rows into {} records", results.len(), keyed.len());
            write_output(output, &serde_json::to_string_pretty(&keyed)?)?;
        }

        Commands::Datasets { dataset } => {
            let config = SignpostConfig::resolve(overrides)?;
            let fetcher = Fetcher::new(config.timeout_ms)?;
            let datasets = fetcher.load_registry(&config.registry).await?;
            let chooser = registry::select_options(&datasets, dataset.as_deref());
            println!("{}", serde_json::to_string_pretty(&chooser)?);
        }

        Commands::Choropleth { name, output } => {
            let config = SignpostConfig::resolve(overrides)?;
            let def = choropleth::find(&name)
                .ok_or_else(|| anyhow::anyhow!("Unknown choropleth layer: {name}"))?;
            let fetcher = Fetcher::new(config.timeout_ms)?;
            let layer = build_choropleth(&fetcher, &config, def).await?;
            write_output(output, &serde_json::to_string_pretty(&layer)?)?;
        }

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            clap_complete::generate(shell, &mut cmd, "signpost-server", &mut std::io::stdout());
        }
    }

    Ok(())
}

#[cfg(feature = "http")]
async fn serve(config: SignpostConfig, addr: &str) -> anyhow::Result<()> {
    use signpost_server::{HttpTransport, SignpostSession};

    tracing::info!("Signpost server");
    tracing::info!("Registry: {}", config.registry);
    let session = SignpostSession::open(config).await?;
    HttpTransport::new(session).run(addr).await?;
    Ok(())
}

#[cfg(not(feature = "http"))]
async fn serve(_config: SignpostConfig, _addr: &str) -> anyhow::Result<()> {
    anyhow::bail!("signpost-server was built without the `http` feature")
}
