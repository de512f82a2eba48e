//! Rahyab - DNS Tunnel Compatibility Scanner
//!
//! Probes candidate DNS resolvers for covert-tunnel compatibility and
//! ranks them for the connection layer to pick from.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;

use rahyab::{
    parse_server, ProbeTask, ProtocolKind, ScanBoard, ScanConfig, ScanEvent, Scanner, ScoreResult,
};

#[derive(Parser)]
#[command(name = "rahyab")]
#[command(author = "Sina Rabbani")]
#[command(version = "0.1.0")]
#[command(about = "DNS Tunnel Compatibility Scanner", long_about = None)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan candidate servers and print the ranked compatibility table
    Scan {
        /// Test domain (authoritative nameserver must be tunnel-aware)
        #[arg(short, long)]
        domain: Option<String>,

        /// Tunnel protocol family to test (dnstt, other)
        #[arg(short, long, default_value = "dnstt")]
        mode: String,

        /// Per-query timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,

        /// Concurrent probe workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Candidate server (repeatable); defaults to the configured list
        #[arg(short = 's', long = "server")]
        servers: Vec<String>,

        /// Emit results as JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Probe a single server; exit code reflects compatibility
    Check {
        /// Server address, IPv4[:port]
        server: String,

        /// Test domain (authoritative nameserver must be tunnel-aware)
        #[arg(short, long)]
        domain: Option<String>,

        /// Tunnel protocol family to test (dnstt, other)
        #[arg(short, long, default_value = "dnstt")]
        mode: String,

        /// Per-query timeout in seconds
        #[arg(short, long)]
        timeout: Option<u64>,
    },

    /// List the candidate servers in effect
    Servers,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logger
    if cli.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Scan {
            domain,
            mode,
            timeout,
            workers,
            servers,
            json,
        } => {
            run_scan(config, domain, &mode, timeout, workers, servers, json).await?;
        }
        Commands::Check {
            server,
            domain,
            mode,
            timeout,
        } => {
            run_check(config, server, domain, &mode, timeout).await?;
        }
        Commands::Servers => {
            list_servers(&config);
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<ScanConfig> {
    match path {
        Some(path) => ScanConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {:?}", path)),
        None => Ok(ScanConfig::default()),
    }
}

fn parse_mode(mode: &str) -> Result<ProtocolKind> {
    match mode {
        "dnstt" => Ok(ProtocolKind::Dnstt),
        "other" | "streamgate" => Ok(ProtocolKind::Other),
        _ => anyhow::bail!("Unknown protocol mode: {}", mode),
    }
}

/// Merge CLI overrides into the configured scan parameters
fn effective_config(
    mut config: ScanConfig,
    domain: Option<String>,
    timeout: Option<u64>,
    workers: Option<usize>,
    servers: Vec<String>,
) -> Result<ScanConfig> {
    if let Some(domain) = domain {
        config.domain = domain;
    }
    if let Some(seconds) = timeout {
        config.timeout = std::time::Duration::from_secs(seconds);
    }
    if let Some(workers) = workers {
        config.workers = workers;
    }
    if !servers.is_empty() {
        config.servers = servers;
    }

    config
        .validate()
        .map_err(|message| anyhow::anyhow!(message))?;
    Ok(config)
}

async fn run_scan(
    config: ScanConfig,
    domain: Option<String>,
    mode: &str,
    timeout: Option<u64>,
    workers: Option<usize>,
    servers: Vec<String>,
    json: bool,
) -> Result<()> {
    let mode = parse_mode(mode)?;
    let config = effective_config(config, domain, timeout, workers, servers)?;

    info!(
        "Scanning {} servers for {:?} compatibility via {}",
        config.servers.len(),
        mode,
        config.domain
    );

    let tasks: Vec<ProbeTask> = config
        .servers
        .iter()
        .map(|server| {
            ProbeTask::new(server.clone(), config.domain.clone(), mode)
                .with_timeout(config.timeout_seconds())
        })
        .collect();

    let mut board = ScanBoard::new();
    for task in &tasks {
        board.enqueue(task.server.clone());
    }

    let scanner = Scanner::new(config.workers);
    let mut events = scanner.scan(tasks);

    while let Some(event) = events.recv().await {
        match &event {
            ScanEvent::Checking(server) => info!("Checking {}", server),
            ScanEvent::Finished(result) => {
                if result.success {
                    info!(
                        "{} done in {} ms (compatible: {})",
                        result.server,
                        result.elapsed_ms,
                        result.is_compatible()
                    );
                } else {
                    info!(
                        "{} failed: {}",
                        result.server,
                        result.message.as_deref().unwrap_or("unknown")
                    );
                }
            }
        }
        board.apply(event);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&board.ranked())?);
    } else {
        print_table(&board);
    }

    Ok(())
}

fn print_table(board: &ScanBoard) {
    println!();
    println!(
        "{:<22} {:<11} {:<7} {:<12} Details",
        "Server", "Compatible", "Score", "Latency"
    );
    println!("{}", "=".repeat(76));

    for result in board.ranked() {
        let (compatible, score, details) = match &result.score {
            Some(score) => (
                if score.is_compatible() { "yes" } else { "no" },
                score.summary(),
                match score {
                    ScoreResult::Dnstt(s) => s.details.clone(),
                    ScoreResult::StreamGate(s) => s.details.clone(),
                },
            ),
            None => (
                "-",
                "-".to_string(),
                result.message.clone().unwrap_or_default(),
            ),
        };

        let latency = match &result.score {
            Some(ScoreResult::StreamGate(s)) if s.stats.is_some() => {
                format!("{:.0} ms avg", result.ranking_metric())
            }
            _ => format!("{} ms", result.elapsed_ms),
        };

        let server = parse_server(&result.server)
            .map(|addr| addr.to_string())
            .unwrap_or_else(|_| result.server.clone());

        println!(
            "{:<22} {:<11} {:<7} {:<12} {}",
            server, compatible, score, latency, details
        );
    }

    println!();
    let compatible = board
        .results()
        .iter()
        .filter(|result| result.is_compatible())
        .count();
    println!(
        "Total: {} servers, {} compatible",
        board.results().len(),
        compatible
    );
}

async fn run_check(
    config: ScanConfig,
    server: String,
    domain: Option<String>,
    mode: &str,
    timeout: Option<u64>,
) -> Result<()> {
    let mode = parse_mode(mode)?;
    let config = effective_config(config, domain, timeout, None, vec![server.clone()])?;

    let task = ProbeTask::new(server, config.domain.clone(), mode)
        .with_timeout(config.timeout_seconds());

    let scanner = Scanner::new(1);
    let results = scanner.scan_collect(vec![task]).await;
    let result = results
        .first()
        .context("scan produced no result")?;

    println!("{}", serde_json::to_string_pretty(result)?);

    if !result.is_compatible() {
        std::process::exit(1);
    }

    Ok(())
}

fn list_servers(config: &ScanConfig) {
    println!("Candidate DNS Servers");
    println!("=====================");

    for server in &config.servers {
        match parse_server(server) {
            Ok(addr) => println!("{}", addr),
            Err(_) => println!("{} (invalid)", server),
        }
    }

    println!();
    println!("Total: {} servers", config.servers.len());
}
