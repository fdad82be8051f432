use anyhow::Result;
use converge_core::inventory::Inventory;
use converge_core::replset::build_target;
use converge_core::shards::{group_shards, shard_strings};
use serde_json::{Value, json};

use super::OutputContext;

/// Print the computed replica set and shard list without connecting
pub fn execute(inventory: &Inventory, output: &OutputContext) -> Result<()> {
    let reference = inventory.reference()?;
    let shards = shard_strings(&group_shards(&inventory.shard_members()?));

    let replica_set = match &inventory.replica_set {
        Some(rs) => Some(build_target(&reference, &inventory.replica_set_members()?, &rs.name)?),
        None => None,
    };

    if output.json {
        let members: Vec<Value> = replica_set
            .iter()
            .flat_map(|target| target.members.iter().zip(&target.names))
            .map(|(member, name)| {
                json!({
                    "id": member.id,
                    "name": name,
                    "host": member.host,
                    "options": member.options,
                })
            })
            .collect();
        output.print_json(&json!({
            "replica_set": replica_set.as_ref().map(|t| t.set_name.clone()),
            "members": members,
            "shards": shards,
        }));
        return Ok(());
    }

    match &replica_set {
        Some(target) => {
            output.print_info(&format!("Replica set '{}'", target.set_name));
            let columns: Vec<String> = ["Id", "Name", "Host", "IP host", "Priority", "Votes", "Hidden", "Arbiter"]
                .iter()
                .map(|c| c.to_string())
                .collect();
            let rows: Vec<Vec<Value>> = target
                .members
                .iter()
                .zip(&target.names)
                .zip(&target.ip_hosts)
                .map(|((member, name), ip_host)| {
                    vec![
                        json!(member.id),
                        json!(name),
                        json!(member.host),
                        json!(ip_host),
                        json!(member.options.priority),
                        json!(member.options.votes),
                        json!(member.options.hidden),
                        json!(member.options.arbiter_only),
                    ]
                })
                .collect();
            output.print_table(&columns, &rows);
        }
        None => output.print_info("No replica set configured"),
    }

    if shards.is_empty() {
        output.print_info("No shards configured");
    } else {
        output.print_info("Shards");
        for shard in &shards {
            println!("  {}", shard);
        }
    }

    Ok(())
}
