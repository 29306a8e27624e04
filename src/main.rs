use anyhow::{bail, Result};
use chrono::Utc;
use clap::Parser;
use sensordump::settings::Settings;
use sensordump::{
    DirectoryShare, LogTarget, LoggerConfig, SensorKind, SensorLogger, SensorState,
    SyntheticBackend,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::time::{sleep, Duration};

#[derive(Parser, Debug)]
#[command(name = "sensordump")]
#[command(about = "Log onboard sensors to CSV", long_about = None)]
struct Args {
    /// Duration in seconds (0 = until Ctrl-C)
    #[arg(value_name = "SECONDS", default_value = "10")]
    duration: u64,

    /// Sampling interval in milliseconds
    #[arg(long, default_value_t = sensordump::logger::DEFAULT_INTERVAL_MS)]
    interval_ms: u64,

    /// Append-only log file with START/END session markers
    #[arg(long, default_value = "logdata.txt", conflicts_with = "log_dir")]
    log_file: PathBuf,

    /// Write one dataLogNNNNN.csv per session into this directory instead
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Comma-separated sensors to log (default: saved selection)
    #[arg(long, value_delimiter = ',', value_parser = parse_sensor)]
    sensors: Option<Vec<SensorKind>>,

    /// Settings file holding the last sensor selection
    #[arg(long, default_value = "sensordump_settings.json")]
    settings: PathBuf,

    /// Truncate the log file and exit
    #[arg(long)]
    clear: bool,

    /// Copy the log file into this directory after the session
    #[arg(long)]
    export_dir: Option<PathBuf>,
}

fn parse_sensor(name: &str) -> std::result::Result<SensorKind, String> {
    SensorKind::ALL
        .into_iter()
        .find(|kind| kind.name().eq_ignore_ascii_case(name.trim()))
        .ok_or_else(|| {
            let names: Vec<&str> = SensorKind::ALL.iter().map(SensorKind::name).collect();
            format!("unknown sensor '{}' (expected one of: {})", name, names.join(", "))
        })
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let target = match &args.log_dir {
        Some(dir) => LogTarget::Rotating { dir: dir.clone() },
        None => LogTarget::SingleFile {
            path: args.log_file.clone(),
        },
    };
    let config = LoggerConfig {
        target,
        interval_ms: args.interval_ms,
    };

    let mut logger = SensorLogger::new(Arc::new(SyntheticBackend::new()), config)?;
    if let Some(dir) = &args.export_dir {
        std::fs::create_dir_all(dir)?;
        logger = logger.with_share_target(Arc::new(DirectoryShare::new(dir)));
    }

    if args.clear {
        logger.clear_log_file().await?;
        println!("[{}] Log file cleared", ts_now());
        return Ok(());
    }

    let mut settings = Settings::load(&args.settings)?;
    if let Some(kinds) = &args.sensors {
        settings.sensor_states = SensorState::from_kinds(kinds);
    }

    let available = logger.detect_availability();
    let granted = logger.request_permissions().await?;
    let usable = available.intersect(&granted);
    for kind in settings.sensor_states.not_in(&usable) {
        log::warn!("{} is not usable and will not be logged", kind);
    }
    let mask = settings.sensor_states.intersect(&usable);
    if mask.count() == 0 {
        bail!("no usable sensors selected");
    }

    println!("[{}] Sensor Dump Starting", ts_now());
    println!("  Duration: {} seconds (0=until Ctrl-C)", args.duration);
    println!("  Interval: {} ms", args.interval_ms);
    println!("  Target:   {:?}", logger.config().target);
    println!(
        "  Sensors:  {}",
        mask.enabled().map(|k| k.name()).collect::<Vec<_>>().join(", ")
    );

    let meta = logger.start_logging(mask).await?;
    println!("[{}] Logging to {}", ts_now(), meta.path.display());

    if args.duration > 0 {
        tokio::select! {
            _ = sleep(Duration::from_secs(args.duration)) => {
                println!("[{}] Duration reached, stopping...", ts_now());
            }
            _ = tokio::signal::ctrl_c() => {
                println!("[{}] Interrupted, stopping...", ts_now());
            }
        }
    } else {
        tokio::signal::ctrl_c().await?;
        println!("[{}] Interrupted, stopping...", ts_now());
    }

    let records = logger
        .session()
        .metadata()
        .await
        .map(|m| m.records_written)
        .unwrap_or(0);
    let verified = logger.stop_logging().await?;
    println!("[{}] Session closed: {} records, verified={}", ts_now(), records, verified);

    settings.save(&args.settings)?;

    if args.export_dir.is_some() {
        let outcome = logger.share_log_file().await;
        println!("[{}] {}", ts_now(), outcome.message());
    }

    if !verified {
        bail!("END marker could not be verified");
    }
    Ok(())
}

fn ts_now() -> String {
    Utc::now().format("%H:%M:%S").to_string()
}
