//! Inventory files

use anyhow::{Context, Result};
use converge_core::inventory::Inventory;
use std::fs;
use std::path::Path;

/// Load an inventory snapshot; `.json` files are JSON, anything else TOML
///
/// Node records are resolved once here so that a bad override is reported
/// before any component touches the cluster.
pub fn load_inventory(path: &Path) -> Result<Inventory> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read inventory {}", path.display()))?;

    let inventory: Inventory = if path.extension().is_some_and(|ext| ext == "json") {
        serde_json::from_str(&content)
            .with_context(|| format!("Invalid inventory {}", path.display()))?
    } else {
        toml::from_str(&content).with_context(|| format!("Invalid inventory {}", path.display()))?
    };

    inventory
        .reference()
        .with_context(|| format!("Invalid node in {}", path.display()))?;
    inventory.replica_set_members()?;
    inventory.shard_members()?;

    Ok(inventory)
}
