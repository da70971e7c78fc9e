use std::io;
use std::process::ExitCode;

use clap::{CommandFactory, Parser};
use colored::*;
use tokio::signal;
use tracing::{error, info, warn, Level};
use tracing_subscriber::EnvFilter;

use asic_tuner::analysis::analyze_file;
use asic_tuner::cli::{AnalyzeArgs, Args, Command, SweepArgs};
use asic_tuner::device::DeviceClient;
use asic_tuner::report::{format_progress, SweepEnd};
use asic_tuner::settings::TunerSettings;
use asic_tuner::sink::CsvSink;
use asic_tuner::sweep::{StopSignal, SweepController};

const EXIT_FAILURE: u8 = 1;
const EXIT_DEVICE_UNREACHABLE: u8 = 2;
const EXIT_THERMAL_ABORT: u8 = 3;

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(&args.log_level);

    match args.command {
        Command::Sweep(sweep_args) => sweep(sweep_args).await,
        Command::Analyze(analyze_args) => analyze(analyze_args),
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Args::command(), "asic-tuner", &mut io::stdout());
            ExitCode::SUCCESS
        }
    }
}

/// `RUST_LOG` wins; otherwise `--log-level`. Logs go to stderr so progress
/// and the summary on stdout stay clean.
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
}

fn fail(msg: impl std::fmt::Display, code: u8) -> ExitCode {
    eprintln!("{} {}", "error:".bright_red().bold(), msg);
    ExitCode::from(code)
}

async fn sweep(args: SweepArgs) -> ExitCode {
    let mut settings = match TunerSettings::load_or_default(args.config.as_deref()) {
        Ok(s) => s,
        Err(e) => return fail(e, EXIT_FAILURE),
    };
    settings.apply_overrides(args.overrides());

    let config = match settings.sweep_config() {
        Ok(c) => c,
        Err(e) => return fail(format!("configuration error: {e}"), EXIT_FAILURE),
    };
    let device = match settings.device_client() {
        Ok(d) => d,
        Err(e) => return fail(format!("configuration error: {e}"), EXIT_FAILURE),
    };

    info!(device = %device.config().base_url, "probing device");
    match device.system_info().await {
        Ok(info) => {
            let running = info
                .active_point()
                .map(|p| p.to_string())
                .unwrap_or_else(|| "unknown".into());
            info!(hashrate = info.hash_rate, temp_c = info.temp, %running, "device reachable");
        }
        Err(e) => return fail(format!("device unreachable: {e}"), EXIT_DEVICE_UNREACHABLE),
    }

    let mut sink = match CsvSink::append(&settings.output.results) {
        Ok(s) => s,
        Err(e) => {
            return fail(
                format!("cannot open {}: {e}", settings.output.results.display()),
                EXIT_FAILURE,
            )
        }
    };

    let stop = StopSignal::new();
    tokio::spawn({
        let stop = stop.clone();
        async move {
            shutdown_signal().await;
            stop.trigger();
        }
    });

    println!(
        "Sweeping {}-{} MHz, {}-{} mV ({} points max), results -> {}",
        config.freq_start_mhz,
        config.freq_end_mhz,
        config.cv_start_mv,
        config.cv_max_mv,
        config.planned_points(),
        settings.output.results.display()
    );

    let report = match SweepController::new(&device, &mut sink, stop)
        .on_verdict(|v| println!("{}", format_progress(v)))
        .run_sweep(&config)
        .await
    {
        Ok(r) => r,
        Err(e) => return fail(e, EXIT_FAILURE),
    };

    println!();
    print!("{}", report.render());

    let mut code = match report.end {
        SweepEnd::Completed | SweepEnd::Interrupted => ExitCode::SUCCESS,
        SweepEnd::ThermalAbort { .. } => ExitCode::from(EXIT_THERMAL_ABORT),
        SweepEnd::SinkFailed { .. } => ExitCode::from(EXIT_FAILURE),
    };

    if let Some(path) = &settings.output.report_json {
        match report.export_json(path) {
            Ok(()) => info!(path = %path.display(), "report written"),
            Err(e) => code = fail(format!("cannot write {}: {e}", path.display()), EXIT_FAILURE),
        }
    }

    if args.apply_best {
        match &report.best {
            Some(best) if config.contains(best.point) => {
                info!(point = %best.point, "applying best stable point");
                if let Err(e) = device.apply_config(best.point).await {
                    error!(point = %best.point, error = %e, "failed to apply best point");
                } else {
                    println!("Applied {}", best.point.to_string().bright_green());
                }
            }
            _ => warn!("no stable point to apply"),
        }
    }

    code
}

fn analyze(args: AnalyzeArgs) -> ExitCode {
    let analysis = match analyze_file(&args.results, args.all) {
        Ok(a) => a,
        Err(e) => return fail(format!("cannot read {}: {e}", args.results.display()), EXIT_FAILURE),
    };

    if args.json {
        match serde_json::to_string_pretty(&analysis) {
            Ok(json) => println!("{json}"),
            Err(e) => return fail(e, EXIT_FAILURE),
        }
    } else {
        print!("{}", analysis.render());
    }
    ExitCode::SUCCESS
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("received Ctrl+C, stopping after the current point is recorded");
        },
        _ = terminate => {
            warn!("received terminate signal, stopping after the current point is recorded");
        },
    }
}
