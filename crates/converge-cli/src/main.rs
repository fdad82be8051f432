use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use converge_cli::config::Config;
use converge_cli::inventory::load_inventory;
use converge_core::Component;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

mod commands;

use commands::{config as config_cmd, reconcile, show};

/// Converge a MongoDB cluster to the state described by an inventory
#[derive(Parser)]
#[command(name = "mongo-converge")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(long, env = "MONGO_CONVERGE_CONFIG")]
    pub config: Option<String>,

    /// Inventory file (TOML, or JSON with a .json extension)
    #[arg(long, env = "MONGO_CONVERGE_INVENTORY")]
    pub inventory: Option<String>,

    /// Configuration profile name
    #[arg(long, env = "MONGO_CONVERGE_PROFILE")]
    pub profile: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initiate or reconfigure the replica set
    ReplicaSet,
    /// Register shards with the routing tier
    Shards,
    /// Enable sharding on databases and collections
    Sharding,
    /// Create indexes
    Indexes,
    /// Provision the administrator and listed users
    Users,
    /// Run every enabled component in order
    All,
    /// Show the computed replica set members and shards without connecting
    Show,
    /// Configuration management
    Config(config_cmd::ConfigArgs),
}

fn init_tracing(verbose: bool, json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if verbose {
            EnvFilter::new("info,converge_core=debug,converge_cli=debug,mongo_converge=debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.log_json);

    let cfg = Config::load(cli.config.as_deref())?;

    let output = commands::OutputContext {
        json: cli.json,
        verbose: cli.verbose,
    };

    let show_only = matches!(cli.command, Commands::Show);
    let component = match cli.command {
        Commands::Config(args) => return config_cmd::execute(args, &cfg, cli.config.as_deref(), &output),
        Commands::ReplicaSet => Some(Component::ReplicaSet),
        Commands::Shards => Some(Component::Shards),
        Commands::Sharding => Some(Component::Sharding),
        Commands::Indexes => Some(Component::Indexes),
        Commands::Users => Some(Component::Users),
        Commands::All | Commands::Show => None,
    };

    let profile = cfg.active_profile(cli.profile.as_deref())?;
    let inventory_path = cfg
        .inventory_path(cli.inventory.as_deref(), profile)
        .context("No inventory given; use --inventory or set one in the configuration")?;
    let inventory = load_inventory(&inventory_path)?;

    if show_only {
        return show::execute(&inventory, &output);
    }

    let success = reconcile::execute(component, &cfg, profile, &inventory, &output).await?;
    if !success {
        std::process::exit(1);
    }
    Ok(())
}
