use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use ga_report::prelude::*;
use serde_json::json;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "gaq", version, about = "Build and replay analytics reporting queries")]
struct Cli {
    /// Config file; defaults to $XDG_CONFIG_HOME/gaq/config.toml
    #[arg(long, global = true, env = "GAQ_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the columns of a metadata file
    Columns {
        /// Metadata JSON (`{"items": [...], "segments": [...]}`)
        #[arg(long)]
        metadata: PathBuf,

        /// Only metrics
        #[arg(long, conflicts_with = "dimensions")]
        metrics: bool,

        /// Only dimensions
        #[arg(long)]
        dimensions: bool,

        /// Include deprecated columns
        #[arg(long)]
        all: bool,

        /// List realtime columns instead of core ones
        #[arg(long)]
        realtime: bool,
    },
    /// Print the wire parameters and signature of every blueprint query
    Build {
        #[arg(long)]
        metadata: PathBuf,

        #[arg(long)]
        blueprint: PathBuf,

        /// Profile id; defaults to the blueprint's scope.profile
        #[arg(long)]
        profile: Option<String>,
    },
    /// Run one blueprint query against recorded response pages
    Replay {
        #[arg(long)]
        metadata: PathBuf,

        #[arg(long)]
        blueprint: PathBuf,

        /// JSON file with one page or an array of pages
        #[arg(long)]
        pages: PathBuf,

        /// Query title; defaults to the first query
        #[arg(long)]
        query: Option<String>,

        #[arg(long)]
        profile: Option<String>,

        #[arg(long, value_enum, default_value_t = Format::Table)]
        format: Format,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum Format {
    Json,
    Csv,
    Table,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<ClientConfig> {
    match path {
        Some(path) => {
            let mut config = ClientConfig::load_from(path)
                .with_context(|| format!("loading config from {}", path.display()))?;
            config.apply_env();
            config.validate()?;
            Ok(config)
        }
        None => ClientConfig::load().context("loading config"),
    }
}

fn profile_for(explicit: Option<String>, blueprint: &Blueprint) -> Result<String> {
    match explicit.or_else(|| blueprint.profile()) {
        Some(profile) => Ok(profile),
        None => bail!("no profile: pass --profile or set scope.profile in the blueprint"),
    }
}

fn open_api(
    metadata: &Path,
    profile: String,
    transport: Arc<dyn Transport>,
    config: ClientConfig,
) -> Result<ReportingApi> {
    let metadata = StaticMetadata::from_path(metadata)?;
    Ok(ReportingApi::from_metadata(profile, &metadata, transport, config)?)
}

fn list_columns(
    metadata: &Path,
    config: ClientConfig,
    metrics: bool,
    dimensions: bool,
    all: bool,
    realtime: bool,
) -> Result<()> {
    let api = open_api(
        metadata,
        String::new(),
        Arc::new(ReplayTransport::default()),
        config,
    )?;
    let registry = if realtime {
        api.realtime_columns()
    } else {
        api.columns()
    };
    let registry = match (metrics, dimensions) {
        (true, _) => registry.metrics(),
        (_, true) => registry.dimensions(),
        _ => registry.clone(),
    };
    let registry = if all { registry } else { registry.supported() };
    for column in registry.iter() {
        println!(
            "{}\t{}\t{}\t{}",
            column.id, column.name, column.kind, column.data_type
        );
    }
    Ok(())
}

fn build(metadata: &Path, blueprint: &Path, profile: Option<String>, config: ClientConfig) -> Result<()> {
    let blueprint = Blueprint::from_path(blueprint)?;
    let profile = profile_for(profile, &blueprint)?;
    let api = open_api(metadata, profile, Arc::new(ReplayTransport::default()), config)?;
    let queries = blueprint.queries(&api)?;
    let out: Vec<_> = queries
        .iter()
        .map(|query| {
            let wire = query.build();
            json!({
                "title": query.title(),
                "endpoint": wire.endpoint(),
                "params": wire.as_json(),
                "signature": wire.signature(),
                "cache_key": wire.cache_key(),
            })
        })
        .collect();
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn replay(
    metadata: &Path,
    blueprint: &Path,
    pages: &Path,
    title: Option<&str>,
    profile: Option<String>,
    format: Format,
    config: ClientConfig,
) -> Result<()> {
    let blueprint = Blueprint::from_path(blueprint)?;
    let profile = profile_for(profile, &blueprint)?;
    let transport = Arc::new(ReplayTransport::from_path(pages)?);
    let api = open_api(metadata, profile, transport, config)?;
    let title = match title {
        Some(title) => title.to_string(),
        None => blueprint
            .titles()
            .next()
            .map(str::to_string)
            .context("blueprint has no queries")?,
    };
    let query = blueprint.query(&api, &title)?;
    let report = query
        .get()
        .with_context(|| format!("running query '{title}'"))?;
    let envelope = query.envelope();
    match format {
        Format::Json => println!("{}", serde_json::to_string_pretty(&report.to_json(Some(&envelope)))?),
        Format::Csv => print!("{}", report.to_csv(Some(&envelope))),
        Format::Table => print!("{}", report.to_table(Some(&envelope))),
    }
    Ok(())
}

fn main() -> Result<()> {
    // Load .env early; ignore if missing.
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Columns {
            metadata,
            metrics,
            dimensions,
            all,
            realtime,
        } => list_columns(&metadata, config, metrics, dimensions, all, realtime),
        Command::Build {
            metadata,
            blueprint,
            profile,
        } => build(&metadata, &blueprint, profile, config),
        Command::Replay {
            metadata,
            blueprint,
            pages,
            query,
            profile,
            format,
        } => replay(
            &metadata,
            &blueprint,
            &pages,
            query.as_deref(),
            profile,
            format,
            config,
        ),
    }
}
