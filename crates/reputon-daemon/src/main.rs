// crates/reputon-daemon/src/main.rs
//
// Binary entrypoint for the Reputon daemon.
//
// `round` serves one host invocation over stdin/stdout, `responder` runs the
// probe echo responder for this node, and `scores` prints the local score
// board from the data directory.

use clap::{Parser, Subcommand};

use reputon_core::identity::PeerKey;
use reputon_core::traits::StateStore;
use reputon_daemon::config::DaemonConfig;
use reputon_daemon::logging::init_logging;
use reputon_daemon::node::NodeServices;
use reputon_daemon::runtime::{serve_invocation, HostChannel};
use reputon_probe::ProbeResponder;
use reputon_reputation::compute_scores;
use reputon_store::JsonFileStore;

/// Reputon daemon: proof-of-work and reachability reputation for a fixed
/// peer set.
#[derive(Parser, Debug)]
#[command(name = "reputon-daemon", version = "0.1.0", about = "Reputon node daemon")]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long, global = true, default_value = "~/.reputon/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Serve one round invocation from the host runtime on stdin/stdout.
    Round,

    /// Answer reachability probes on the ports in this node's instance info.
    Responder {
        /// Public key to answer for. Defaults to the instance info pubkey.
        #[arg(long)]
        pubkey: Option<String>,
    },

    /// Print the score board computed from the local ledger.
    Scores,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config_path = reputon_daemon::config::expand_tilde(&cli.config);

    // Load configuration from TOML file, falling back to defaults if the file
    // is not found.
    let (config, load_error) = match DaemonConfig::load(&config_path) {
        Ok(cfg) => (cfg, None),
        Err(e) => (DaemonConfig::default(), Some(e)),
    };

    init_logging(&config.log_level, Some(&config.log_path()))?;
    match load_error {
        None => tracing::info!("Loaded configuration from {}", config_path),
        Some(e) => tracing::warn!("{}. Using defaults.", e),
    }
    tracing::info!("Data directory: {}", config.data_dir().display());

    match cli.command.unwrap_or(Commands::Round) {
        Commands::Round => run_round(&config).await?,
        Commands::Responder { pubkey } => run_responder(&config, pubkey).await?,
        Commands::Scores => print_scores(&config).await?,
    }

    Ok(())
}

async fn run_round(config: &DaemonConfig) -> Result<(), Box<dyn std::error::Error>> {
    let node = NodeServices::build(config)?;
    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    let host = HostChannel::new(tokio::io::stdout());

    match serve_invocation(reader, host, &node.runner, &node.queries).await? {
        Some(outcome) => tracing::info!(
            "Round {} finished with {} executions recorded",
            outcome.sequence_number,
            outcome.executions
        ),
        None => tracing::info!("Read-only invocation finished"),
    }
    Ok(())
}

async fn run_responder(
    config: &DaemonConfig,
    pubkey: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = JsonFileStore::open(config.data_dir())?.with_instance_file(config.instance_path());
    let info = store.load_instance_info().await.ok_or_else(|| {
        format!(
            "no instance info at {}, cannot tell which ports to serve",
            config.instance_path().display()
        )
    })?;

    let key = match pubkey.or_else(|| info.pubkey.clone()) {
        Some(raw) => PeerKey::parse(&raw)?,
        None => return Err("no public key given and none in instance info".into()),
    };

    let count = config.reachability.ports_per_transport;
    let handle = ProbeResponder::new(key.clone())
        .bind(&config.responder_host, &info.tcp_ports(count), &info.udp_ports(count))
        .await?;
    tracing::info!(
        "Probe responder for {} serving {} tcp and {} udp ports",
        key,
        handle.tcp_addrs.len(),
        handle.udp_addrs.len()
    );

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down probe responder");
    handle.shutdown();
    Ok(())
}

async fn print_scores(config: &DaemonConfig) -> Result<(), Box<dyn std::error::Error>> {
    config.validate()?;
    let store = JsonFileStore::open(config.data_dir())?;
    let snapshot = store.load_snapshot().await;

    let board = compute_scores(
        &snapshot.resource,
        &snapshot.port,
        snapshot.executions,
        &config.score,
    );
    let Some(board) = board.filter(|b| !b.is_empty()) else {
        println!("No scores recorded yet.");
        return Ok(());
    };

    println!("{:<68} {:>5} {:>9} {:>6}", "PEER", "SCORE", "RESOURCE", "PORT");
    for (peer, score) in &board.entries {
        println!(
            "{:<68} {:>5} {:>9} {:>6}",
            peer.as_str(),
            score.score,
            rate_cell(score.resource_rate),
            rate_cell(score.port_rate)
        );
    }
    println!("{} rounds executed", snapshot.executions.get());
    Ok(())
}

fn rate_cell(rate: Option<f64>) -> String {
    match rate {
        Some(r) => format!("{:.2}", r),
        None => "-".to_string(),
    }
}
