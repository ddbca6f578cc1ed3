use std::io::{IsTerminal as _, Write as _};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use log::{error, info};

use zmotion_rs::commands::spawn_keystroke_thread;
use zmotion_rs::connection::BleSensor;
use zmotion_rs::recorder::{Recorder, RecorderConfig};
use zmotion_rs::scanner::{ScanLock, Scanner};
use zmotion_rs::session::{Session, SessionConfig};
use zmotion_rs::types::StreamMode;

/// Record Z_Motion telemetry to CSV.
///
/// Example:
///   zmotion-rs "6TRON Sensor 1" --output-dir acquired_data/ --files-prefix 1_ --stream-config 3
#[derive(Parser, Debug)]
#[command(name = "zmotion-rs", version, about)]
struct Args {
    /// Advertised name of the sensor to connect to.
    #[arg(value_name = "BLE_SENSOR_NAME")]
    sensor_name: String,

    /// Stream config: 1 = acc+gyro+mag, 2 = acc+Euler angles, 3 = acc+quaternion.
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=3))]
    stream_config: u8,

    /// Directory receiving the epoch CSV files.
    #[arg(long, required_unless_present = "no_record")]
    output_dir: Option<PathBuf>,

    /// Prefix of the epoch CSV file names (`{prefix}{epoch}.csv`).
    #[arg(long, required_unless_present = "no_record")]
    files_prefix: Option<String>,

    /// Stream and log without recording.
    #[arg(long)]
    no_record: bool,

    /// BLE scan window per connection attempt, in seconds.
    #[arg(long, default_value_t = 5.0)]
    scan_timeout: f64,

    /// Connect timeout, in seconds.
    #[arg(long, default_value_t = 10.0)]
    connect_timeout: f64,

    /// Reconnect when the stream config or a subscription is not confirmed.
    #[arg(long)]
    strict_setup: bool,

    /// Show every discovered device, the GATT table, and each decoded row.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let interactive = std::io::stdin().is_terminal();

    // ── Logging ───────────────────────────────────────────────────────────────
    // RUST_LOG overrides the default, e.g. RUST_LOG=zmotion_rs=debug.
    // Raw mode disables the terminal's newline translation, hence the "\r".
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(move |buf, record| {
            let eol = if interactive { "\r\n" } else { "\n" };
            write!(buf, "[{} {}] {}{eol}", record.level(), record.target(), record.args())
        })
        .init();

    // ── Configuration ─────────────────────────────────────────────────────────
    let stream_mode = StreamMode::from_selector(args.stream_config)
        .ok_or_else(|| anyhow!("invalid stream config {}", args.stream_config))?;
    info!("{stream_mode} selected");

    let config = SessionConfig {
        sensor_name: args.sensor_name.clone(),
        stream_mode,
        scan_timeout: Duration::from_secs_f64(args.scan_timeout),
        connect_timeout: Duration::from_secs_f64(args.connect_timeout),
        verbose: args.verbose,
        strict_setup: args.strict_setup,
        ..Default::default()
    };

    let recorder = match (args.no_record, args.output_dir, args.files_prefix) {
        (false, Some(output_dir), Some(file_prefix)) => {
            std::fs::create_dir_all(&output_dir)
                .with_context(|| format!("cannot create {}", output_dir.display()))?;
            Some(Arc::new(Recorder::new(RecorderConfig {
                output_dir,
                file_prefix,
                stream_mode,
            })))
        }
        _ => None,
    };

    // ── Transport ─────────────────────────────────────────────────────────────
    let scanner = Scanner::first_adapter(ScanLock::new(), args.verbose).await?;
    let mut session = Session::new(BleSensor::new(scanner), config, recorder.clone());

    // ── Commands ──────────────────────────────────────────────────────────────
    let (quit_tx, mut quit_rx) = tokio::sync::mpsc::unbounded_channel::<()>();
    if interactive {
        crossterm::terminal::enable_raw_mode()?;
        spawn_keystroke_thread(recorder, quit_tx.clone());
    }

    let shutdown = async move {
        tokio::select! {
            Some(()) = quit_rx.recv() => {}
            _ = tokio::signal::ctrl_c() => {}
        }
    };

    let outcome = session.run_until(shutdown).await;
    drop(quit_tx);

    if interactive {
        crossterm::terminal::disable_raw_mode().ok();
    }
    match outcome {
        Ok(()) => {
            info!("Closing");
            Ok(())
        }
        Err(e) => {
            error!("{e}");
            Err(e.into())
        }
    }
}
