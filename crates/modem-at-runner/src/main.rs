//! modem-at: serve an AT command table over stdin/stdout.
//!
//! # Usage
//!
//! ```bash
//! # Answer requests typed on the terminal
//! modem-at --config demos/modem.yaml
//!
//! # Trace every engine transition
//! RUST_LOG=modem_at=trace modem-at --config demos/modem.yaml
//! ```

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use modem_at::{AtError, Engine, Registry, Status};
use modem_at_runner::config::RequestConfig;
use modem_at_runner::{table, Result, RunnerConfig, RunnerContext, StdioTransport};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "modem-at")]
#[command(about = "Serve an AT command table over stdin/stdout", long_about = None)]
struct Args {
    /// Command table (YAML)
    #[arg(short, long)]
    config: PathBuf,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Sleep between polls while the engine is idle, in milliseconds
    #[arg(long, default_value_t = 5)]
    poll_interval_ms: u64,
}

fn main() {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(e) = run(&args) {
        tracing::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> Result<()> {
    let config = RunnerConfig::load(&args.config)?;
    tracing::info!("Loaded {} groups from {}", config.groups.len(), args.config.display());

    let mut storage = table::allocate(&config);
    let mut variables = table::bind_variables(&config, &mut storage)?;
    let mut commands = table::bind_commands(&config, &mut variables);
    let mut groups = table::bind_groups(&config, &mut commands);

    let mut working = vec![0u8; config.working_buffer];
    let mut unsolicited = vec![0u8; config.unsolicited_buffer];

    let (rx, _reader) = modem_at_runner::stdio::spawn_reader(std::io::stdin());
    let transport = StdioTransport::from_channel(rx, std::io::stdout());

    let mut engine = Engine::new(
        transport,
        Registry::new(&mut groups),
        &mut working,
        RunnerContext::default(),
    )?
    .with_config(config.engine);
    if !unsolicited.is_empty() {
        engine = engine.with_unsolicited(&mut unsolicited);
    }
    tracing::info!(
        "Serving {} commands",
        engine.registry().enabled().count()
    );

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    if let Err(e) = ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst)) {
        tracing::warn!("Cannot install Ctrl-C handler: {}", e);
    }

    let mut requests: VecDeque<RequestConfig> = config.requests.iter().cloned().collect();
    let mut in_flight: Option<String> = None;
    let poll_interval = Duration::from_millis(args.poll_interval_ms);

    while running.load(Ordering::SeqCst) {
        if engine.step() == Status::Busy {
            continue;
        }
        engine.transport_mut().flush()?;

        if let Some(error) = engine.take_last_error() {
            tracing::debug!("Last line failed: {}", error);
        }

        if engine.pending_request().is_none() {
            if let Some(name) = in_flight.take() {
                tracing::info!(command = %name, result = ?engine.last_result(), "request completed");
            }
            if let Some(next) = requests.front() {
                match engine.request(&next.command, next.op, &next.args) {
                    Ok(()) => {
                        in_flight = Some(next.command.clone());
                        requests.pop_front();
                    }
                    Err(AtError::UnsolicitedBusy) => {}
                    Err(e) => {
                        tracing::warn!("Dropping request {}: {}", next.command, e);
                        requests.pop_front();
                    }
                }
            }
        }

        if engine.transport().is_closed() {
            break;
        }
        std::thread::sleep(poll_interval);
    }

    engine.transport_mut().flush()?;
    let (_, context) = engine.release();
    tracing::info!(
        "Shutting down: {} runs, {} reads, {} writes, {} tests",
        context.count(modem_at::Operation::Run),
        context.count(modem_at::Operation::Read),
        context.count(modem_at::Operation::Write),
        context.count(modem_at::Operation::Test)
    );
    Ok(())
}
