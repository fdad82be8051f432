use anyhow::Result;
use clap::{Args, Subcommand};
use converge_cli::config::{Config, Profile};
use std::path::PathBuf;

use super::OutputContext;

#[derive(Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommands,
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show current configuration
    Show,
    /// Show configuration file path
    Path,
    /// Add or replace a profile
    SetProfile {
        /// Profile name
        name: String,
        /// Inventory file
        #[arg(long)]
        inventory: Option<String>,
        /// Host the local node is reached at
        #[arg(long)]
        local_host: Option<String>,
        /// Administrator password
        #[arg(long)]
        admin_password: Option<String>,
        /// Make this the default profile
        #[arg(long)]
        default: bool,
    },
    /// Remove a profile
    RemoveProfile {
        /// Profile name
        name: String,
    },
    /// List all profiles
    ListProfiles,
}

pub fn execute(args: ConfigArgs, cfg: &Config, path: Option<&str>, output: &OutputContext) -> Result<()> {
    match args.command {
        ConfigCommands::Show => show_config(cfg, output),
        ConfigCommands::Path => show_path(path, output),
        ConfigCommands::SetProfile {
            name,
            inventory,
            local_host,
            admin_password,
            default,
        } => {
            let mut cfg = cfg.clone();
            cfg.set_profile(
                &name,
                Profile {
                    inventory,
                    local_host,
                    admin_password,
                },
            );
            if default {
                cfg.default_profile = Some(name.clone());
            }
            cfg.save(path)?;
            output.print_success(&format!("Profile '{}' saved", name));
            Ok(())
        }
        ConfigCommands::RemoveProfile { name } => {
            let mut cfg = cfg.clone();
            if cfg.remove_profile(&name) {
                cfg.save(path)?;
                output.print_success(&format!("Profile '{}' removed", name));
            } else {
                output.print_error(&format!("Profile '{}' not found", name));
            }
            Ok(())
        }
        ConfigCommands::ListProfiles => list_profiles(cfg, output),
    }
}

fn show_config(cfg: &Config, output: &OutputContext) -> Result<()> {
    if output.json {
        let mut redacted = cfg.clone();
        for profile in redacted.profiles.values_mut() {
            if profile.admin_password.is_some() {
                profile.admin_password = Some("********".to_string());
            }
        }
        output.print_json(&redacted);
        return Ok(());
    }

    let unset = || "(not set)".to_string();
    println!("Current Configuration");
    println!("=====================");
    println!("Inventory:         {}", cfg.inventory.clone().unwrap_or_else(unset));
    println!("Local host:        {}", cfg.local_host.clone().unwrap_or_else(unset));
    println!(
        "Selection timeout: {}",
        cfg.server_selection_timeout_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(unset)
    );
    println!(
        "Connect timeout:   {}",
        cfg.connect_timeout_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(unset)
    );
    println!(
        "Retries:           {}",
        cfg.max_retries.map(|n| n.to_string()).unwrap_or_else(unset)
    );
    println!(
        "Retry delay:       {}",
        cfg.retry_delay_ms
            .map(|ms| format!("{} ms", ms))
            .unwrap_or_else(unset)
    );
    println!();
    list_profiles(cfg, output)
}

fn list_profiles(cfg: &Config, output: &OutputContext) -> Result<()> {
    if cfg.profiles.is_empty() {
        output.print_info("No profiles configured");
        return Ok(());
    }

    println!("Profiles:");
    for name in cfg.list_profiles() {
        let is_default = cfg.default_profile.as_ref() == Some(name);
        if is_default {
            println!("  * {} (default)", name);
        } else {
            println!("  - {}", name);
        }
        if let Some(profile) = cfg.get_profile(name) {
            if let Some(inventory) = &profile.inventory {
                println!("      Inventory:  {}", inventory);
            }
            if let Some(host) = &profile.local_host {
                println!("      Local host: {}", host);
            }
        }
    }

    Ok(())
}

fn show_path(path: Option<&str>, output: &OutputContext) -> Result<()> {
    let path = path.map(PathBuf::from).unwrap_or_else(Config::default_path);
    println!("{}", path.display());
    if path.exists() {
        output.print_info("File exists");
    } else {
        output.print_info("File does not exist");
    }
    Ok(())
}
