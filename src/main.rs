//! ASI Frame Pipe CLI
//!
//! Streams raw camera frames to stdout. Diagnostics go to stderr.

use asi_frame_pipe::{
    capture::{FileConfig, SimulatedDriver},
    metrics::MetricsRegistry,
    pipeline::{run_session, signal, CaptureContext, CaptureSummary, ExitFlag, PipelineError},
    Args,
};
use clap::Parser;
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{error, info, warn};

fn main() -> ExitCode {
    // Help exits 0, invalid arguments exit 2.
    let args = Args::parse();
    let config = args.load_config();

    let verbose = args.verbose || config.as_ref().is_ok_and(|c| c.capture.verbose);
    init_logging(verbose);

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("{e}");
            return ExitCode::FAILURE;
        }
    };

    info!("ASI Frame Pipe v{}", asi_frame_pipe::VERSION);

    match run(&args, &config) {
        Ok(summary) => {
            info!("{summary}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    // stdout carries video; logs must stay on stderr.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

fn run(args: &Args, config: &FileConfig) -> Result<CaptureSummary, PipelineError> {
    let exit = ExitFlag::new();
    signal::install(exit.clone()).map_err(PipelineError::Signal)?;

    let registry = MetricsRegistry::new()?;
    start_metrics_server(config.metrics.port, &registry);

    let mut ctx = CaptureContext::new(&config.capture, exit).with_metrics(registry);

    let stdout = std::io::stdout();
    let is_terminal = stdout.is_terminal();
    let mut out = stdout.lock();

    if args.simulate {
        info!("Using simulated camera");
        let driver = SimulatedDriver::new(config.simulation.clone());
        return run_session(&driver, &config.capture, &mut out, is_terminal, &mut ctx);
    }
    run_hardware(config, &mut out, is_terminal, &mut ctx)
}

#[cfg(feature = "asi")]
fn run_hardware(
    config: &FileConfig,
    out: &mut impl std::io::Write,
    is_terminal: bool,
    ctx: &mut CaptureContext,
) -> Result<CaptureSummary, PipelineError> {
    let driver = asi_frame_pipe::capture::AsiDriver::load()?;
    run_session(&driver, &config.capture, out, is_terminal, ctx)
}

#[cfg(not(feature = "asi"))]
fn run_hardware(
    _config: &FileConfig,
    _out: &mut impl std::io::Write,
    _is_terminal: bool,
    _ctx: &mut CaptureContext,
) -> Result<CaptureSummary, PipelineError> {
    Err(PipelineError::NoBackend)
}

#[cfg(feature = "metrics")]
fn start_metrics_server(port: u16, registry: &MetricsRegistry) {
    use asi_frame_pipe::metrics::{MetricsServer, MetricsServerConfig};

    if port == 0 {
        return;
    }
    let server = MetricsServer::new(MetricsServerConfig::with_port(port), registry.clone());
    if let Err(e) = server.spawn() {
        warn!(error = %e, "Failed to start metrics server");
    }
}

#[cfg(not(feature = "metrics"))]
fn start_metrics_server(port: u16, _registry: &MetricsRegistry) {
    if port != 0 {
        warn!(port, "Built without the metrics feature, not serving metrics");
    }
}
