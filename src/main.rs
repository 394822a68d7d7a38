use csv_tap::csv_processor::discover_catalog;
use csv_tap::extraction::sync_entities;
use csv_tap::utils::LoggingConfig;
use csv_tap::{CheckpointManager, MessageEmitter, ShutdownSignal, SyncOptions, SyncSummary, TapConfig};
use std::env;
use std::io::Write;
use std::path::PathBuf;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const USAGE: &str = "usage: csv-tap --config <file> [--state-db <file>] [--discover] [--config-schema]";

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    state_db: Option<PathBuf>,
    discover: bool,
    config_schema: bool,
}

impl Args {
    fn parse(mut args: impl Iterator<Item = String>) -> anyhow::Result<Self> {
        let mut parsed = Args::default();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" => parsed.config = args.next().map(PathBuf::from),
                "--state-db" => parsed.state_db = args.next().map(PathBuf::from),
                "--discover" => parsed.discover = true,
                "--config-schema" => parsed.config_schema = true,
                other => anyhow::bail!("unexpected argument '{}'\n{}", other, USAGE),
            }
        }
        Ok(parsed)
    }
}

fn init_logging(logging: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("csv_tap={}", logging.level)))?;
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the message stream, so logs go to stderr.
    if logging.format.eq_ignore_ascii_case("json") {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        registry
            .with(fmt::layer().with_writer(std::io::stderr))
            .try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse(env::args().skip(1))?;

    if args.config_schema {
        let schema = schemars::schema_for!(TapConfig);
        println!("{}", serde_json::to_string_pretty(&schema)?);
        return Ok(());
    }

    let config_path = args
        .config
        .clone()
        .ok_or_else(|| anyhow::anyhow!("missing --config\n{}", USAGE))?;
    let config = TapConfig::load_from_file(&config_path)?;
    init_logging(&config.logging)?;
    tracing::info!(config = %config_path.display(), "Loaded configuration");

    let entities = config.resolve()?;

    if args.discover {
        let catalog = discover_catalog(&entities)?;
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({ "streams": catalog }))?
        );
        return Ok(());
    }

    let shutdown = ShutdownSignal::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown signal received");
                shutdown.request();
            }
        });
    }

    let options = SyncOptions {
        checkpoint_every_rows: config.checkpoint_every_rows,
        shutdown,
    };
    let state_db = args.state_db.unwrap_or_else(|| config.state_db.clone());

    let summaries = tokio::task::spawn_blocking(move || -> csv_tap::Result<Vec<SyncSummary>> {
        let checkpoints = CheckpointManager::new(&state_db)?;
        let stdout = std::io::BufWriter::new(std::io::stdout().lock());
        let mut emitter = MessageEmitter::new(stdout);
        let summaries = sync_entities(&entities, &options, Some(&checkpoints), &mut emitter)?;
        let written = emitter.finish()?;
        tracing::info!(records = written, "Output flushed");
        Ok(summaries)
    })
    .await??;

    let mut stderr = std::io::stderr().lock();
    for summary in &summaries {
        writeln!(stderr, "{}", serde_json::to_string(summary)?)?;
    }

    tracing::info!("csv-tap finished");
    Ok(())
}
