//! LBSim CLI — Explore load-balancer routing behavior tick by tick.

use clap::{Parser, Subcommand};
use lbsim_core::config::SimConfig;
use lbsim_core::metrics;
use lbsim_core::workload::{self, Workload};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "lbsim",
    about = "Simulate load-balanced request routing in discrete time",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a simulation with a single algorithm.
    Run {
        /// Path to TOML configuration file. Built-in defaults when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Simulated duration in seconds.
        #[arg(short, long, default_value = "60")]
        duration: u64,
        /// Routing algorithm name (overrides the config).
        #[arg(short, long)]
        algorithm: Option<String>,
        /// Workload preset name (overrides the config).
        #[arg(short, long)]
        workload: Option<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Compare multiple algorithms on the same config.
    Compare {
        /// Path to TOML configuration file. Built-in defaults when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Simulated duration in seconds.
        #[arg(short, long, default_value = "60")]
        duration: u64,
        /// Comma-separated list of algorithm names.
        #[arg(short = 'A', long, value_delimiter = ',')]
        algorithms: Vec<String>,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Sweep steady arrival rates to find the saturation point.
    Sweep {
        /// Path to TOML configuration file. Built-in defaults when omitted.
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Routing algorithm name (overrides the config).
        #[arg(short, long)]
        algorithm: Option<String>,
        /// Comma-separated list of request rates.
        #[arg(long, value_delimiter = ',')]
        rates: Vec<f64>,
        /// Duration per rate point in seconds.
        #[arg(long, default_value = "60")]
        duration: u64,
        /// Output results to JSON file.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// List available algorithms.
    ListAlgorithms,
    /// List available workload presets.
    ListWorkloads,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            config,
            duration,
            algorithm,
            workload,
            output,
        } => {
            let mut sim_config = load_config(config.as_deref());
            if let Some(name) = algorithm {
                apply_algorithm(&mut sim_config, &name);
            }
            if let Some(name) = workload {
                sim_config.workload = workload::workload_by_name(&name).unwrap_or_else(|| {
                    eprintln!(
                        "Unknown workload: {}. Available: {:?}",
                        name,
                        workload::available_workloads()
                    );
                    std::process::exit(1);
                });
            }

            let result = lbsim_core::run_simulation(&sim_config, duration * 1000)
                .unwrap_or_else(|e| {
                    eprintln!("Error starting simulation: {}", e);
                    std::process::exit(1);
                });
            println!("{}", metrics::format_table(&result));

            if let Some(output_path) = output {
                write_json(&result, &output_path);
            }
        }
        Commands::Compare {
            config,
            duration,
            algorithms,
            output,
        } => {
            let sim_config = load_config(config.as_deref());
            let algo_names: Vec<&str> = if algorithms.is_empty() {
                lbsim_algorithms::available_algorithms()
            } else {
                algorithms.iter().map(|s| s.as_str()).collect()
            };

            let results =
                lbsim_core::compare_algorithms(&sim_config, duration * 1000, &algo_names)
                    .unwrap_or_else(|e| {
                        eprintln!("Error starting simulation: {}", e);
                        std::process::exit(1);
                    });
            println!("{}", metrics::format_comparison_table(&results));

            for result in &results {
                println!("{}", metrics::format_table(result));
            }

            if let Some(output_path) = output {
                write_json(&results, &output_path);
            }
        }
        Commands::Sweep {
            config,
            algorithm,
            rates,
            duration,
            output,
        } => {
            let mut sim_config = load_config(config.as_deref());
            if let Some(name) = algorithm {
                apply_algorithm(&mut sim_config, &name);
            }

            let mut all_results = Vec::new();
            for rate in &rates {
                let mut cfg = sim_config.clone();
                cfg.workload = Workload::Steady { rate: *rate };
                let result = lbsim_core::run_simulation(&cfg, duration * 1000)
                    .unwrap_or_else(|e| {
                        eprintln!("Error starting simulation: {}", e);
                        std::process::exit(1);
                    });
                println!(
                    "Rate {:.0} req/s: E2E p50={:.1}ms p95={:.1}ms | {:.1} done/s | failure rate {:.1}%",
                    rate,
                    result.latency.p50,
                    result.latency.p95,
                    result.throughput_per_sec,
                    result.totals.failure_rate() * 100.0
                );
                all_results.push(result);
            }

            if let Some(output_path) = output {
                write_json(&all_results, &output_path);
            }
        }
        Commands::ListAlgorithms => {
            println!("Available routing algorithms:");
            for name in lbsim_algorithms::available_algorithms() {
                println!("  - {}", name);
            }
        }
        Commands::ListWorkloads => {
            println!("Available workload presets:");
            for name in workload::available_workloads() {
                if let Some(w) = workload::workload_by_name(name) {
                    println!("  - {:<8} {}", name, w.label());
                }
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> SimConfig {
    match path {
        Some(p) => SimConfig::from_file(p).unwrap_or_else(|e| {
            eprintln!("Error loading config: {}", e);
            std::process::exit(1);
        }),
        None => SimConfig::default(),
    }
}

/// Route every balancer with `name`, dropping per-balancer overrides.
fn apply_algorithm(config: &mut SimConfig, name: &str) {
    let algorithm = lbsim_algorithms::algorithm_by_name(name).unwrap_or_else(|| {
        eprintln!(
            "Unknown algorithm: {}. Available: {:?}",
            name,
            lbsim_algorithms::available_algorithms()
        );
        std::process::exit(1);
    });
    config.routing.algorithm = algorithm;
    for lb in &mut config.balancers {
        lb.algorithm = None;
    }
}

fn write_json<T: Serialize + ?Sized>(value: &T, output_path: &Path) {
    let json = serde_json::to_string_pretty(value).unwrap_or_else(|e| {
        eprintln!("Error serializing results: {}", e);
        std::process::exit(1);
    });
    std::fs::write(output_path, json).unwrap_or_else(|e| {
        eprintln!("Error writing output: {}", e);
        std::process::exit(1);
    });
    println!("Results written to {}", output_path.display());
}
