//! Shard registration with the routing tier

use crate::connection::{ConnectionManager, Connector};
use crate::executor::CommandExecutor;
use crate::inventory::MemberRecord;
use crate::outcome::{Component, Outcome};
use mongodb::bson::doc;

/// Key a shard candidate is grouped under
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShardGroupKey {
    /// Replica set backing the shard
    Named(String),
    /// No replication: every member is its own shard
    Standalone,
}

impl ShardGroupKey {
    /// Explicit replica set name, else `rs_<shard_name>`, else standalone
    pub fn for_member(member: &MemberRecord) -> Self {
        if let Some(set) = &member.replica_set {
            Self::Named(set.clone())
        } else if let Some(shard) = &member.shard_name {
            Self::Named(format!("rs_{}", shard))
        } else {
            Self::Standalone
        }
    }
}

/// Members that form one group, in input order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardGroup {
    pub key: ShardGroupKey,
    pub members: Vec<String>,
}

/// Group visible shard candidates by key, keeping first-seen key order
pub fn group_shards(members: &[MemberRecord]) -> Vec<ShardGroup> {
    let mut groups: Vec<ShardGroup> = Vec::new();

    for member in members.iter().filter(|m| !m.options.hidden) {
        let key = ShardGroupKey::for_member(member);
        match groups.iter_mut().find(|g| g.key == key) {
            Some(group) => group.members.push(member.host()),
            None => groups.push(ShardGroup {
                key,
                members: vec![member.host()],
            }),
        }
    }

    groups
}

/// `addShard` arguments: `host:port` per standalone member,
/// `<set>/<m1>,<m2>,...,` per named group
pub fn shard_strings(groups: &[ShardGroup]) -> Vec<String> {
    let mut shards = Vec::new();
    for group in groups {
        match &group.key {
            ShardGroupKey::Standalone => shards.extend(group.members.iter().cloned()),
            ShardGroupKey::Named(name) => {
                let members: String = group.members.iter().map(|m| format!("{},", m)).collect();
                shards.push(format!("{}/{}", name, members));
            }
        }
    }
    shards
}

/// Registers shards through the reference node
pub struct ShardRegistrar<'a, C: Connector> {
    connections: &'a ConnectionManager<C>,
    executor: CommandExecutor,
}

impl<'a, C: Connector> ShardRegistrar<'a, C> {
    pub fn new(connections: &'a ConnectionManager<C>) -> Self {
        Self {
            connections,
            executor: connections.executor(),
        }
    }

    /// One `addShard` per shard string; each is an independent step
    pub async fn register_shards(&self, reference: &MemberRecord, candidates: &[MemberRecord]) -> Outcome {
        let mut outcome = Outcome::new(Component::Shards);
        let shards = shard_strings(&group_shards(candidates));
        let local = self.connections.local_endpoint(reference.port);

        if shards.is_empty() {
            outcome.skipped(local, "no shard candidates found");
            return outcome;
        }

        let session = match self.connections.connect(std::slice::from_ref(&local)).await {
            Ok(session) => session,
            Err(e) => {
                outcome.error(local, &e);
                return outcome;
            }
        };

        tracing::info!("adding shards: {}", shards.join(" "));

        for shard in shards {
            let command = doc! { "addShard": shard.as_str() };
            match self.executor.execute_with_retry(session.as_ref(), "admin", command).await {
                Ok(reply) if reply.is_ok() => outcome.applied(shard, "shard registered"),
                Ok(reply) => outcome.failed(shard, format!("addShard returned: {}", reply)),
                Err(e) => outcome.error(shard, &e),
            }
        }

        outcome
    }
}
