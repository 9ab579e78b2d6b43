//! arpsweep CLI - discover live hosts on the local IPv4 subnet
//!
//! Sends one ARP request to every usable address of the first active
//! non-loopback IPv4 interface and prints the hosts that answered.

use anyhow::{Context, Result};
use arpsweep_core::config::{ScanConfig, environment_variables};
use arpsweep_core::scanner::{self, privileges};
use arpsweep_core::{ProbeResult, ScanError, ScanSummary};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "arpsweep")]
#[command(version)]
#[command(about = "Discover live hosts on the local IPv4 subnet with ARP requests")]
#[command(long_about = "
arpsweep finds the first active non-loopback IPv4 interface, sends one ARP
request to every usable address of its subnet and lists the hosts that
answered. It needs root (Linux/macOS, using arping) or Administrator
(Windows, using nping).

Examples:
  sudo arpsweep
  sudo arpsweep scan --max-concurrency 128 --timeout-ms 2000
  sudo arpsweep --format json
")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output format
    #[arg(short, long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    /// Human-readable text output
    Text,
    /// JSON output for scripting
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Scan the local subnet (default)
    Scan {
        /// Maximum number of probes in flight (default: unbounded)
        #[arg(short = 'c', long)]
        max_concurrency: Option<usize>,

        /// Per-probe deadline in milliseconds (default: none)
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Show the effective configuration
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Logs go to stderr so stdout only carries scan output
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("arpsweep={},arpsweep_core={}", log_level, log_level).into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        None => cmd_scan(&cli, None, None).await,
        Some(Commands::Scan {
            max_concurrency,
            timeout_ms,
        }) => cmd_scan(&cli, max_concurrency, timeout_ms).await,
        Some(Commands::Config) => cmd_config(&cli),
    }
}

/// Print a fatal scan error and exit with a non-zero status
fn exit_with(err: ScanError) -> ! {
    tracing::error!("{}", err);
    eprintln!("Error: {}", err.user_message());
    std::process::exit(1);
}

async fn cmd_scan(cli: &Cli, max_concurrency: Option<usize>, timeout_ms: Option<u64>) -> Result<()> {
    if let Err(e) = privileges::require_elevated() {
        exit_with(e);
    }

    let config = ScanConfig::from_env().with_overrides(max_concurrency, timeout_ms);
    tracing::debug!("Configuration loaded from {}", config.source);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received Ctrl+C, waiting for running probes to finish (press again to abort)");
            ctrl_c.cancel();
        }
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Received second Ctrl+C, aborting");
            std::process::exit(130);
        }
    });

    // Progress goes to stderr next to the logs; stdout carries hosts and the summary
    let progress_callback: Option<scanner::ProgressCallback> = match cli.format {
        OutputFormat::Text => Some(Box::new(|progress: scanner::ScanProgress| {
            if let Some(pct) = progress.percent {
                eprintln!("  [{:>3}%] {}", pct, progress.message);
            } else {
                eprintln!("  {}", progress.message);
            }
        })),
        OutputFormat::Json => None,
    };
    let host_callback: Option<scanner::HostCallback> = match cli.format {
        OutputFormat::Text => Some(Box::new(|result: &ProbeResult| print_host(result))),
        OutputFormat::Json => None,
    };

    let summary =
        match scanner::scan_network_with_progress(&config, progress_callback, host_callback, cancel)
            .await
        {
            Ok(summary) => summary,
            Err(e) => exit_with(e),
        };

    match cli.format {
        OutputFormat::Text => print_summary(&summary),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&summary)
                .context("Failed to serialize scan summary")?;
            println!("{}", json);
        }
    }

    Ok(())
}

fn print_host(result: &ProbeResult) {
    println!();
    println!("ARP Request: Who has {}?", result.target);
    println!("{}", result.output.trim_end());
}

fn print_summary(summary: &ScanSummary) {
    let started = summary
        .started_at
        .with_timezone(&chrono::Local)
        .format("%Y-%m-%d %H:%M:%S");

    println!();
    println!(
        "{} of {} addresses on {} responded ({} probed, started {}, {:.1}s)",
        summary.hosts.len(),
        summary.candidates,
        summary.network.cidr(),
        summary.dispatched,
        started,
        summary.elapsed_secs
    );
    if summary.cancelled {
        println!(
            "Scan was cancelled; {} addresses were not probed.",
            summary.candidates - summary.dispatched
        );
    }
    for host in &summary.hosts {
        println!("  {}", host.target);
    }
}

fn cmd_config(cli: &Cli) -> Result<()> {
    let config = ScanConfig::from_env();
    let concurrency = config
        .max_concurrency
        .map(|n| n.to_string())
        .unwrap_or_else(|| "unbounded".to_string());
    let timeout = config
        .probe_timeout
        .map(|d| format!("{}ms", d.as_millis()))
        .unwrap_or_else(|| "none".to_string());

    match cli.format {
        OutputFormat::Text => {
            println!("Configuration");
            println!("=============");
            println!();
            println!("Source:           {}", config.source);
            println!("Max concurrency:  {}", concurrency);
            println!("Probe timeout:    {}", timeout);
            println!("arping program:   {}", config.arping_program);
            println!("nping program:    {}", config.nping_program);
            println!("Elevated:         {}", privileges::is_elevated());
            println!();
            println!("Environment variables:");
            for (name, description) in environment_variables() {
                println!("  {:<28} {}", name, description);
            }
        }
        OutputFormat::Json => {
            println!(
                "{}",
                serde_json::json!({
                    "source": config.source.to_string(),
                    "max_concurrency": config.max_concurrency,
                    "probe_timeout_ms": config.probe_timeout.map(|d| d.as_millis() as u64),
                    "arping_program": config.arping_program,
                    "nping_program": config.nping_program,
                    "elevated": privileges::is_elevated(),
                })
            );
        }
    }

    Ok(())
}
