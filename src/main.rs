// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

use anyhow::{Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use clusterfw::{
    api::FirewallApi,
    config::{NodeFirewallConfig, Settings},
    firewall::find,
    hcloud::HcloudClient,
    labels::{sanitize_cluster_id, validate_cluster_id},
    lifecycle::{NodeFirewall, NodeFirewallState},
    metrics::gather_metrics,
    model::{NodeAddress, ServerId},
    retry::{deadline_token, RetryScheduler},
    rules::members,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Shared cluster firewall coordination for Hetzner Cloud machines.
#[derive(Debug, Parser)]
#[command(name = "clusterfw", version, about)]
struct Cli {
    /// Settings file (YAML)
    #[arg(long, global = true, env = "CLUSTERFW_CONFIG")]
    config: Option<PathBuf>,

    /// Hetzner Cloud API token
    #[arg(long, global = true, env = "HCLOUD_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Print Prometheus metrics to stdout after the command
    #[arg(long, global = true)]
    print_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Set up the shared firewall for a running server
    Join {
        #[command(flatten)]
        node: NodeArgs,
        /// Server the node runs on
        #[arg(long)]
        server_id: ServerId,
        /// Public IPv4 address of the server
        #[arg(long)]
        ipv4: Option<String>,
        /// Where to store the node's firewall state (stdout if absent)
        #[arg(long)]
        state_file: Option<PathBuf>,
    },
    /// Remove the node's address before its server is deleted
    Leave {
        #[command(flatten)]
        node: NodeArgs,
        #[arg(long)]
        state_file: PathBuf,
    },
    /// Delete the shared firewall after the owning node's server is deleted,
    /// if nothing else uses it
    Reap {
        #[command(flatten)]
        node: NodeArgs,
        #[arg(long)]
        state_file: PathBuf,
    },
    /// Print the shared firewall of a cluster
    Show {
        #[arg(long)]
        cluster_id: String,
    },
    /// Check that a cluster ID is usable as a label value
    ValidateClusterId { id: String },
    /// Generate shell completions
    Completions { shell: Shell },
}

/// Firewall flags of a node.
#[derive(Debug, Clone, Default, Args)]
struct NodeArgs {
    /// Find or create the shared firewall and attach it to the server
    #[arg(long = "create-firewall", env = "HETZNER_CREATE_FIREWALL")]
    manage_firewall: bool,

    /// Name of a created firewall (default: rancher-<cluster-id>)
    #[arg(long, env = "HETZNER_FIREWALL_NAME")]
    firewall_name: Option<String>,

    /// Create the firewall with public and cluster-internal rules
    #[arg(long = "auto-create-firewall-rules", env = "HETZNER_AUTO_CREATE_FIREWALL_RULES")]
    populate_rules: bool,

    /// Cluster identifier for the shared firewall
    #[arg(long, env = "HETZNER_CLUSTER_ID", default_value = "")]
    cluster_id: String,

    /// Pre-existing firewalls applied to the server instead
    #[arg(long = "firewall", env = "HETZNER_FIREWALLS", value_delimiter = ',')]
    static_firewalls: Vec<String>,

    #[arg(long, env = "HETZNER_DISABLE_PUBLIC_IPV4")]
    disable_public_ipv4: bool,

    #[arg(long, env = "HETZNER_DISABLE_PUBLIC_IPV6")]
    disable_public_ipv6: bool,

    /// Machine name, used to derive a missing cluster ID
    #[arg(long, env = "HETZNER_MACHINE_NAME")]
    machine_name: Option<String>,
}

impl From<NodeArgs> for NodeFirewallConfig {
    fn from(args: NodeArgs) -> Self {
        Self {
            manage_firewall: args.manage_firewall,
            firewall_name: args.firewall_name,
            populate_rules: args.populate_rules,
            cluster_id: args.cluster_id,
            static_firewalls: args.static_firewalls,
            disable_public_ipv4: args.disable_public_ipv4,
            disable_public_ipv6: args.disable_public_ipv6,
            machine_name: args.machine_name,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Build Tokio runtime with custom thread names
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("clusterfw")
        .enable_all()
        .build()?;

    runtime.block_on(async_main(cli))
}

/// Initialize logging on stderr, leaving stdout to command output.
///
/// Respects RUST_LOG (default `info`) and RUST_LOG_FORMAT (`json` or `text`).
fn initialize_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let log_format = std::env::var("RUST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    match log_format.to_lowercase().as_str() {
        "json" => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .json()
                .init();
        }
        _ => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .with_file(true)
                .with_line_number(true)
                .with_thread_names(true)
                .with_target(false)
                .with_ansi(true)
                .compact()
                .init();
        }
    }
}

async fn async_main(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "clusterfw", &mut std::io::stdout());
            return Ok(());
        }
        Command::ValidateClusterId { ref id } => return run_validate_cluster_id(id),
        _ => {}
    }

    initialize_logging();
    debug!("Logging initialized with file and line number tracking");

    let settings = match &cli.config {
        Some(path) => Settings::load(path)
            .await
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::default(),
    };
    let token = cli
        .token
        .context("An API token is required (--token or HCLOUD_TOKEN)")?;
    let api: Arc<dyn FirewallApi> = Arc::new(
        HcloudClient::new(token, &settings).context("Failed to create Hetzner Cloud client")?,
    );

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling the running operation");
            signal.cancel();
        }
    });
    let cancel = deadline_token(&shutdown, settings.operation_timeout());

    let result = run(cli.command, api, &settings, &cancel).await;
    cancel.cancel();

    if cli.print_metrics {
        println!("{}", gather_metrics().context("Failed to encode metrics")?);
    }
    result
}

async fn run(
    command: Command,
    api: Arc<dyn FirewallApi>,
    settings: &Settings,
    cancel: &CancellationToken,
) -> Result<()> {
    match command {
        Command::Join {
            node,
            server_id,
            ipv4,
            state_file,
        } => {
            let address = ipv4
                .as_deref()
                .map(str::parse::<NodeAddress>)
                .transpose()
                .context("Invalid --ipv4")?;
            let node = node_firewall(node, api, settings)?;
            let state = node
                .join(server_id, address, cancel)
                .await
                .with_context(|| format!("Failed to join server {server_id} to the shared firewall"))?;
            info!(
                "Server {} joined (firewall={:?}, owner={})",
                server_id, state.firewall_id, state.owns_firewall
            );
            match state_file {
                Some(path) => write_state(&path, &state).await?,
                None => println!("{}", serde_json::to_string_pretty(&state)?),
            }
        }
        Command::Leave { node, state_file } => {
            let state = read_state(&state_file).await?;
            node_firewall(node, api, settings)?.leave(&state, cancel).await;
        }
        Command::Reap { node, state_file } => {
            let state = read_state(&state_file).await?;
            match node_firewall(node, api, settings)?.reap(&state, cancel).await {
                Some(outcome) => info!("Reap finished: {:?}", outcome),
                None => info!("Node does not own a shared firewall, nothing to reap"),
            }
        }
        Command::Show { cluster_id } => {
            validate_cluster_id(&cluster_id)?;
            let firewall = find(api.as_ref(), &cluster_id, cancel)
                .await
                .with_context(|| format!("Failed to look up the firewall of cluster {cluster_id:?}"))?;
            let Some(firewall) = firewall else {
                anyhow::bail!("No shared firewall found for cluster {cluster_id:?}");
            };
            info!(
                "Firewall {:?} (ID={}) lists {} node addresses and is attached to {} resources",
                firewall.name,
                firewall.id,
                members(&firewall.rules).len(),
                firewall.applied_to.len()
            );
            println!("{}", serde_json::to_string_pretty(&firewall)?);
        }
        Command::ValidateClusterId { .. } | Command::Completions { .. } => {}
    }
    Ok(())
}

fn node_firewall(
    args: NodeArgs,
    api: Arc<dyn FirewallApi>,
    settings: &Settings,
) -> Result<NodeFirewall> {
    let config = NodeFirewallConfig::from(args)
        .validated()
        .context("Invalid node firewall configuration")?;
    let scheduler = Arc::new(RetryScheduler::new(settings.retry.clone()));
    Ok(NodeFirewall::new(api, config, scheduler).with_max_rule_addresses(settings.max_rule_addresses))
}

fn run_validate_cluster_id(id: &str) -> Result<()> {
    validate_cluster_id(id)?;
    println!("{}", sanitize_cluster_id(id));
    Ok(())
}

async fn read_state(path: &Path) -> Result<NodeFirewallState> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read state file {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse state file {}", path.display()))
}

async fn write_state(path: &Path, state: &NodeFirewallState) -> Result<()> {
    let content = serde_json::to_string_pretty(state)?;
    tokio::fs::write(path, content)
        .await
        .with_context(|| format!("Failed to write state file {}", path.display()))
}
