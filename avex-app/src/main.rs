mod app;
pub use app::App;

use anyhow::Context;
use avex_experiment::{ExperimentConfig, PropertyStore};
use avex_timing::{HighPrecisionTimer, ManualTimer};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Runs an audio/visual experiment with a simulated subject
#[derive(Debug, Parser)]
#[command(name = "avex", version)]
pub struct Cli {
    /// Experiment properties file; results are written next to it
    #[arg(long)]
    pub properties: PathBuf,

    /// Directory holding the stimulus subdirectories and playlists
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    #[arg(long, default_value = "NA")]
    pub ra: String,

    #[arg(long, default_value = "NA")]
    pub subject: String,

    #[arg(long, default_value = "1")]
    pub session: String,

    /// Seed for every shuffle and warmup pick; overrides `randomSeed`
    #[arg(long)]
    pub seed: Option<u64>,

    /// Use a virtual clock so silences take no wall time
    #[arg(long)]
    pub fast: bool,

    /// Print the resolved configuration as JSON and exit
    #[arg(long)]
    pub dump_config: bool,

    /// Also write the trial log as JSON
    #[arg(long)]
    pub json: Option<PathBuf>,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let store = PropertyStore::load(&cli.properties)
        .with_context(|| format!("failed to load {}", cli.properties.display()))?;
    let config =
        ExperimentConfig::from_properties(&store).context("invalid experiment configuration")?;

    let default_level = if config.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    if cli.dump_config {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    if cli.fast {
        App::new(&cli, config, ManualTimer::new())?.run()
    } else {
        App::new(&cli, config, HighPrecisionTimer::new())?.run()
    }
}
