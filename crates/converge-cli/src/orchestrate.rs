//! Runs reconciler components in order
//!
//! Each component gets its own inputs from the inventory and its own
//! connections; a failure in one never prevents the next from running.

use converge_core::connection::{ConnectionManager, Connector};
use converge_core::inventory::{AutoConfigure, Inventory};
use converge_core::replset::ReplicaSetReconciler;
use converge_core::sharding::ShardingConfigurator;
use converge_core::shards::ShardRegistrar;
use converge_core::users::UserProvisioner;
use converge_core::{Component, Outcome};

/// Components to run for a command
///
/// An explicit single-component command always runs; `all` honors the
/// inventory's `auto_configure` switches.
pub fn plan(requested: Option<Component>, auto: AutoConfigure) -> Vec<Component> {
    if let Some(component) = requested {
        return vec![component];
    }

    let mut components = Vec::new();
    if auto.replicaset {
        components.push(Component::ReplicaSet);
    }
    if auto.sharding {
        components.push(Component::Shards);
        components.push(Component::Sharding);
    }
    components.push(Component::Indexes);
    components.push(Component::Users);
    components
}

/// Run one component against the cluster
pub async fn run_component<C: Connector>(
    connections: &ConnectionManager<C>,
    inventory: &Inventory,
    component: Component,
) -> Outcome {
    let reference = match inventory.reference() {
        Ok(reference) => reference,
        Err(e) => return failed(component, "inventory", &e),
    };

    match component {
        Component::ReplicaSet => {
            let Some(replica_set) = &inventory.replica_set else {
                let mut outcome = Outcome::new(component);
                outcome.skipped("inventory", "no replica set configured");
                return outcome;
            };
            let candidates = match inventory.replica_set_members() {
                Ok(candidates) => candidates,
                Err(e) => return failed(component, &replica_set.name, &e),
            };
            ReplicaSetReconciler::new(connections)
                .reconcile(&reference, &candidates, &replica_set.name, replica_set.discovery)
                .await
        }
        Component::Shards => {
            let candidates = match inventory.shard_members() {
                Ok(candidates) => candidates,
                Err(e) => return failed(component, "shards", &e),
            };
            ShardRegistrar::new(connections)
                .register_shards(&reference, &candidates)
                .await
        }
        Component::Sharding => {
            ShardingConfigurator::new(connections)
                .enable_sharding(&reference, &inventory.sharded_collections())
                .await
        }
        Component::Indexes => {
            ShardingConfigurator::new(connections)
                .create_indexes(&reference, &inventory.index_specs())
                .await
        }
        Component::Users => {
            UserProvisioner::new(connections)
                .provision_users(&reference, &inventory.admin, &inventory.users, inventory.auth)
                .await
        }
    }
}

/// Run every planned component, in order
pub async fn run<C: Connector>(
    connections: &ConnectionManager<C>,
    inventory: &Inventory,
    components: &[Component],
) -> Vec<Outcome> {
    let mut outcomes = Vec::with_capacity(components.len());
    for &component in components {
        tracing::info!("running {}", component);
        outcomes.push(run_component(connections, inventory, component).await);
    }
    outcomes
}

fn failed(component: Component, target: &str, error: &converge_core::Error) -> Outcome {
    let mut outcome = Outcome::new(component);
    outcome.error(target, error);
    outcome
}
