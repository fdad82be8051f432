use anyhow::Result;
use converge_cli::config::{Config, Profile};
use converge_cli::orchestrate;
use converge_core::connection::{ConnectionManager, MongoConnector};
use converge_core::inventory::Inventory;
use converge_core::Component;

use super::OutputContext;

/// Run `component`, or every enabled component when `None`
///
/// Returns whether every component finished without a failed step.
pub async fn execute(
    component: Option<Component>,
    cfg: &Config,
    profile: Option<&Profile>,
    inventory: &Inventory,
    output: &OutputContext,
) -> Result<bool> {
    let settings = cfg.connection_settings(profile, inventory);
    tracing::debug!(
        "connecting via {} (auth: {}, retries: {})",
        settings.local_host,
        settings.auth,
        settings.retry.max_retries
    );
    let connections = ConnectionManager::new(MongoConnector, settings);

    let components = orchestrate::plan(component, inventory.auto_configure);
    let outcomes = orchestrate::run(&connections, inventory, &components).await;

    output.print_outcomes(&outcomes);
    Ok(outcomes.iter().all(|o| o.is_success()))
}
