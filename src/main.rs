use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use serde_json::json;

use ticketscan::{load_config, EngineKind, ScanConfig, TicketScanner};

/// Find six-digit ticket numbers in a photographed lottery ticket.
///
/// Prints `{"success":true,"data":[...]}` on stdout. Logging goes to stderr
/// and is controlled with `RUST_LOG`.
#[derive(Parser)]
#[command(name = "ticketscan", version)]
struct Args {
    /// Ticket image (PNG or JPEG).
    image: PathBuf,

    /// JSON configuration file. Missing sections use defaults.
    #[arg(long, env = "TICKETSCAN_CONFIG")]
    config: Option<PathBuf>,

    /// Overall time budget in milliseconds.
    #[arg(long)]
    deadline_ms: Option<u64>,

    /// Skip the external OCR process even if one is configured.
    #[arg(long)]
    no_external: bool,

    /// Recognition backend.
    #[arg(long, value_enum)]
    engine: Option<Engine>,

    /// Pretty-print the JSON output.
    #[arg(long)]
    pretty: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Engine {
    Cli,
    Library,
}

impl From<Engine> for EngineKind {
    fn from(e: Engine) -> Self {
        match e {
            Engine::Cli => EngineKind::Cli,
            Engine::Library => EngineKind::Library,
        }
    }
}

fn build_config(args: &Args) -> anyhow::Result<ScanConfig> {
    let mut config = match &args.config {
        Some(path) => load_config(path)?,
        None => ScanConfig::default(),
    };
    config
        .apply_env_overrides()
        .context("invalid environment override")?;

    if let Some(ms) = args.deadline_ms {
        config.deadline_ms = Some(ms);
    }
    if args.no_external {
        config.external.program = None;
    }
    if let Some(engine) = args.engine {
        config.recognition.engine = engine.into();
    }
    Ok(config)
}

fn print(value: &serde_json::Value, pretty: bool) {
    let text = if pretty {
        serde_json::to_string_pretty(value)
    } else {
        serde_json::to_string(value)
    };
    match text {
        Ok(text) => println!("{text}"),
        Err(e) => eprintln!("cannot encode output: {e}"),
    }
}

/// How long blocking jobs get to kill their engine children after the
/// result is printed.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(500);

async fn run(args: Args) -> ExitCode {
    let config = match build_config(&args) {
        Ok(config) => config,
        Err(e) => {
            print(&json!({ "success": false, "error": format!("{e:#}") }), args.pretty);
            return ExitCode::FAILURE;
        }
    };
    if !args.image.is_file() {
        let error = format!("image not found: {}", args.image.display());
        print(&json!({ "success": false, "error": error }), args.pretty);
        return ExitCode::FAILURE;
    }

    let scanner = TicketScanner::from_config(config);
    log::debug!("[SCAN] strategies: {:?}", scanner.strategy_names());
    let found = scanner.scan(&args.image).await;
    print(&json!({ "success": true, "data": found }), args.pretty);
    ExitCode::SUCCESS
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args = Args::parse();
    let pretty = args.pretty;

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            print(&json!({ "success": false, "error": format!("cannot start runtime: {e}") }), pretty);
            return ExitCode::FAILURE;
        }
    };
    let code = runtime.block_on(run(args));
    // engine calls abandoned at the deadline must not delay exit
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
    code
}
