//! downshiftd — the downshift daemon.
//!
//! Watches a cluster's utilization and trims managed capacity while
//! the cluster idles, restoring it when load returns. The binary
//! wires the orchestrator to its collaborators and offers:
//!
//! ```text
//! downshiftd run --config downshift.toml --simulated
//! downshiftd simulate --config downshift.toml --pattern decreasing
//! downshiftd check-config --config downshift.toml
//! ```
//!
//! Real telemetry and capacity integrations plug in behind the
//! `TelemetrySource` / `CapacityController` seams; the built-in
//! simulated cluster covers dry runs and tests.
//!
//! On Unix, SIGHUP re-validates the config file and swaps the new
//! parameters into the running loop between ticks; a reload that
//! fails validation is logged and the current parameters stay in
//! effect.

use std::f64::consts::PI;
use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use tokio::sync::watch;
use tracing::info;

use downshift_core::{ScalingParameters, ScalingVerdict, Settings};
use downshift_orchestrator::{ScalingOrchestrator, SimulatedCluster};

#[derive(Parser)]
#[command(name = "downshiftd", about = "downshift daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scaling loop.
    Run {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "downshift.toml")]
        config: PathBuf,

        /// Drive the loop against the built-in simulated cluster.
        #[arg(long)]
        simulated: bool,

        /// Starting capacity of the simulated cluster.
        #[arg(long, default_value = "20")]
        capacity: u32,

        /// Utilization pattern for the simulated feed, which settles
        /// at its last value once the script runs out.
        #[arg(long, value_enum, default_value_t = Pattern::Fluctuating)]
        pattern: Pattern,

        /// Number of scripted samples in the simulated feed.
        #[arg(long, default_value = "32")]
        samples: usize,

        /// Utilization at the start of the pattern.
        #[arg(long, default_value = "0.7")]
        initial_utilization: f64,

        /// Utilization at the end of decreasing/increasing patterns.
        #[arg(long, default_value = "0.2")]
        final_utilization: f64,
    },

    /// Replay a synthetic utilization pattern through the real engine
    /// without touching any cluster.
    Simulate {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "downshift.toml")]
        config: PathBuf,

        /// Utilization pattern to generate.
        #[arg(short, long, value_enum, default_value_t = Pattern::Decreasing)]
        pattern: Pattern,

        /// Number of samples to generate.
        #[arg(short, long, default_value = "15")]
        samples: usize,

        /// Utilization at the start of the pattern.
        #[arg(long, default_value = "0.7")]
        initial_utilization: f64,

        /// Utilization at the end of decreasing/increasing patterns.
        #[arg(long, default_value = "0.2")]
        final_utilization: f64,

        /// Starting capacity of the simulated cluster.
        #[arg(long, default_value = "20")]
        capacity: u32,

        /// Emit the result as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Load and validate a configuration file.
    CheckConfig {
        /// Path to the configuration file.
        #[arg(short, long, default_value = "downshift.toml")]
        config: PathBuf,
    },
}

/// Synthetic utilization shapes for dry runs.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Pattern {
    Decreasing,
    Increasing,
    Fluctuating,
    StableLow,
    StableHigh,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,downshiftd=debug,downshift=debug".parse().unwrap()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            simulated,
            capacity,
            pattern,
            samples,
            initial_utilization,
            final_utilization,
        } => {
            run(
                config,
                simulated,
                capacity,
                pattern,
                samples,
                initial_utilization,
                final_utilization,
            )
            .await
        }
        Command::Simulate {
            config,
            pattern,
            samples,
            initial_utilization,
            final_utilization,
            capacity,
            json,
        } => {
            simulate(
                config,
                pattern,
                samples,
                initial_utilization,
                final_utilization,
                capacity,
                json,
            )
            .await
        }
        Command::CheckConfig { config } => check_config(config),
    }
}

async fn run(
    config: PathBuf,
    simulated: bool,
    capacity: u32,
    pattern: Pattern,
    samples: usize,
    initial_utilization: f64,
    final_utilization: f64,
) -> anyhow::Result<()> {
    let settings = Settings::load(&config)?;
    info!(
        cluster_id = %settings.cluster_id,
        interval_secs = settings.sampling_interval.as_secs(),
        "downshift daemon starting"
    );

    if !simulated {
        anyhow::bail!(
            "no cluster integration is wired into this build; \
             pass --simulated, or implement the TelemetrySource and \
             CapacityController seams for your platform"
        );
    }

    // Scripted load that settles at its final value once the script
    // runs out.
    let sim = SimulatedCluster::new(capacity).repeat_last();
    sim.extend_feed(generate_pattern(
        pattern,
        samples,
        initial_utilization,
        final_utilization,
    ));

    let interval = settings.sampling_interval;
    let (reload_tx, reload_rx) = watch::channel(settings.parameters.clone());
    let mut orchestrator =
        ScalingOrchestrator::new(settings, sim.clone(), sim).with_reload(reload_rx);
    spawn_reload_on_hangup(config, reload_tx);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        let _ = shutdown_tx.send(true);
    });

    orchestrator.run(interval, shutdown_rx).await;
    info!("downshift daemon stopped");
    Ok(())
}

/// Re-validate the config file on SIGHUP and hand the new parameter
/// set to the run loop. A reload that fails validation keeps the
/// current parameters.
#[cfg(unix)]
fn spawn_reload_on_hangup(config: PathBuf, reload_tx: watch::Sender<ScalingParameters>) {
    use tokio::signal::unix::{SignalKind, signal};

    tokio::spawn(async move {
        let mut hangup = match signal(SignalKind::hangup()) {
            Ok(stream) => stream,
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGHUP handler, reload disabled");
                return;
            }
        };
        while hangup.recv().await.is_some() {
            match Settings::load(&config) {
                Ok(reloaded) => {
                    info!(path = %config.display(), "configuration reloaded");
                    let _ = reload_tx.send(reloaded.parameters);
                }
                Err(e) => {
                    tracing::error!(error = %e, "config reload failed, keeping current parameters");
                }
            }
        }
    });
}

#[cfg(not(unix))]
fn spawn_reload_on_hangup(_config: PathBuf, _reload_tx: watch::Sender<ScalingParameters>) {}

async fn simulate(
    config: PathBuf,
    pattern: Pattern,
    samples: usize,
    initial_utilization: f64,
    final_utilization: f64,
    capacity: u32,
    json: bool,
) -> anyhow::Result<()> {
    let settings = Settings::load(&config)?;
    let values = generate_pattern(pattern, samples, initial_utilization, final_utilization);

    let sim = SimulatedCluster::new(capacity);
    sim.extend_feed(values.iter().copied());
    let mut orchestrator = ScalingOrchestrator::new(settings, sim.clone(), sim.clone());

    let mut verdicts = Vec::with_capacity(values.len());
    for _ in 0..values.len() {
        verdicts.push(orchestrator.tick().await?);
    }
    let summary = orchestrator.summary();

    if json {
        let report = serde_json::json!({
            "pattern": format!("{pattern:?}"),
            "initial_capacity": capacity,
            "final_capacity": sim.current_capacity(),
            "capacity_changes": sim.capacity_changes(),
            "summary": summary,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("tick  utilization  verdict");
    println!("----  -----------  -------");
    for (i, (value, verdict)) in values.iter().zip(&verdicts).enumerate() {
        let verdict = match verdict {
            ScalingVerdict::NoAction => "-".to_string(),
            ScalingVerdict::ScaleDown { target_capacity } => {
                format!("scale down to {target_capacity}")
            }
            ScalingVerdict::Restore => "restore".to_string(),
        };
        println!("{i:>4}  {value:>11.2}  {verdict}");
    }

    println!();
    println!("pattern:                {pattern:?}");
    println!("capacity:               {capacity} -> {}", sim.current_capacity());
    println!("average utilization:    {:.2}", summary.avg_utilization);
    println!("weighted average:       {:.2}", summary.weighted_avg);
    println!(
        "samples below threshold: {}/{}",
        summary.below_threshold_count, summary.sample_count
    );
    println!("would scale down:       {}", summary.should_scale_down);
    Ok(())
}

fn check_config(config: PathBuf) -> anyhow::Result<()> {
    let settings = Settings::load(&config)?;
    println!("configuration OK");
    println!("cluster id:        {}", settings.cluster_id);
    println!(
        "sampling interval: {}s",
        settings.sampling_interval.as_secs()
    );
    println!("parameters:        {:#?}", settings.parameters);
    Ok(())
}

/// Generate `n` utilization values following the requested shape.
fn generate_pattern(pattern: Pattern, n: usize, initial: f64, final_: f64) -> Vec<f64> {
    let span = (n.saturating_sub(1)).max(1) as f64;
    (0..n)
        .map(|i| {
            let t = i as f64 / span;
            let value = match pattern {
                Pattern::Decreasing => initial - t * (initial - final_),
                Pattern::Increasing => final_ + t * (initial - final_),
                Pattern::Fluctuating => {
                    let mean = (initial + final_) / 2.0;
                    let amplitude = (initial - final_) / 2.0;
                    mean + amplitude * (i as f64 * PI / 4.0).sin()
                }
                Pattern::StableLow => final_ + 0.05 * ((i % 3) as f64 - 1.0),
                Pattern::StableHigh => initial + 0.05 * ((i % 3) as f64 - 1.0),
            };
            value.clamp(0.0, 1.0)
        })
        .collect()
}
