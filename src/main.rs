use clap::{Parser, ValueEnum};
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use wifi_positioning::core::now_ms;
use wifi_positioning::fingerprint::JsonFileSource;
use wifi_positioning::processing::parser::decode_hex;
use wifi_positioning::{ApId, ConfigurationManager, IngestionMode, PositioningService};

#[derive(Parser, Debug)]
#[command(name = "wifi-positioning")]
#[command(about = "WKNN indoor positioning from live WiFi scans")]
struct Cli {
    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Fingerprint capture file (overrides the configured database)
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Ingestion mode (overrides the configured mode)
    #[arg(short, long, value_enum)]
    mode: Option<ModeArg>,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Incremental,
    Batch,
}

impl From<ModeArg> for IngestionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Incremental => IngestionMode::Incremental,
            ModeArg::Batch => IngestionMode::Batch,
        }
    }
}

/// One line of driver input
#[derive(Debug, PartialEq)]
enum Command {
    Reading { ap_id: ApId, rssi: i32 },
    Batch(Vec<u8>),
    Query,
    History,
    Reload(PathBuf),
}

fn parse_command(line: &str) -> Result<Command, String> {
    let mut parts = line.split_whitespace();
    match parts.next() {
        Some("reading") => {
            let ap_id = parts.next().ok_or("missing access point id")?;
            let rssi = parts
                .next()
                .ok_or("missing signal strength")?
                .parse::<i32>()
                .map_err(|e| format!("invalid signal strength: {e}"))?;
            Ok(Command::Reading {
                ap_id: ApId::new(ap_id),
                rssi,
            })
        }
        Some("batch") => {
            let hex: String = parts.collect();
            decode_hex(&hex)
                .map(Command::Batch)
                .map_err(|e| e.to_string())
        }
        Some("query") => Ok(Command::Query),
        Some("history") => Ok(Command::History),
        Some("reload") => parts
            .next()
            .map(|path| Command::Reload(PathBuf::from(path)))
            .ok_or_else(|| "missing database path".to_string()),
        Some(other) => Err(format!("unknown command '{other}'")),
        None => Err("empty command".to_string()),
    }
}

fn run_command(service: &PositioningService, command: Command) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    let value = match command {
        Command::Reading { ap_id, rssi } => {
            let outcome = service.ingest_reading(ap_id, rssi, now_ms())?;
            serde_json::json!({ "ingested": format!("{outcome:?}") })
        }
        Command::Batch(payload) => {
            let outcome = service.ingest_batch(payload, now_ms())?;
            serde_json::json!({ "ingested": format!("{outcome:?}") })
        }
        Command::Query => serde_json::to_value(service.get_estimate(now_ms()))?,
        Command::History => serde_json::to_value(service.history())?,
        Command::Reload(path) => {
            let count = service.reload_fingerprints(&JsonFileSource::new(path))?;
            serde_json::json!({ "fingerprints": count })
        }
    };
    Ok(value)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigurationManager::from_file(path)?,
        None => ConfigurationManager::new(),
    };
    let mut config = manager.get_system_config().clone();
    if let Some(database) = cli.database {
        config.database_path = Some(database);
    }
    if let Some(mode) = cli.mode {
        config.ingestion_mode = mode.into();
    }

    let service = PositioningService::from_config(config)?;
    info!(
        mode = ?service.ingestion_mode(),
        fingerprints = service.fingerprints().len(),
        "reading commands from stdin"
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        let command = match parse_command(&line) {
            Ok(command) => command,
            Err(message) => {
                warn!(line = %line, "{message}");
                continue;
            }
        };

        match run_command(&service, command) {
            Ok(value) => writeln!(stdout, "{value}")?,
            Err(e) => {
                error!("{e}");
                writeln!(stdout, "{}", serde_json::json!({ "error": e.to_string() }))?;
            }
        }
    }

    Ok(())
}
