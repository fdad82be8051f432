//! Replica set reconciliation
//!
//! Computes the desired member list from the inventory, tries to initiate the
//! set, and when the set already exists diffs the live configuration against
//! the desired one and submits a single `replSetReconfig`.
//!
//! Three shapes of drift are handled:
//!
//! - none: live members equal the target, nothing is sent;
//! - hostname migration: the live set was built with IP addresses and is
//!   otherwise identical, so hosts are rewritten to hostnames in place;
//! - membership/option drift: departed members are dropped, retained members
//!   get the current options and keep their ids, new members are appended at
//!   `max(id) + 1`.
//!
//! A reconfigure that changes hosts can drop the connection it was sent on.
//! A lost connection is therefore never read as a failure: the reconciler
//! reconnects, re-reads the live config and compares.

use crate::classify::{AlreadyDoneKind, ServerErrorClass, classify_reply};
use crate::connection::{ConnectionManager, Connector, Session};
use crate::executor::CommandExecutor;
use crate::inventory::{DiscoveryMode, MemberRecord, ReplicaOptions};
use crate::outcome::{Component, Outcome};
use crate::{Error, Result};
use mongodb::bson::{Bson, Document, doc};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Database holding the replication metadata
pub const LOCAL_DATABASE: &str = "local";
/// Collection holding the live replica set config
pub const REPLSET_COLLECTION: &str = "system.replset";

/// One member descriptor of a replica set config
#[derive(Debug, Clone, PartialEq)]
pub struct MemberConfig {
    pub id: i32,
    pub host: String,
    pub options: ReplicaOptions,
}

impl MemberConfig {
    /// `{_id, host, ...non-default options}`
    pub fn to_document(&self) -> Document {
        let mut member = doc! { "_id": self.id, "host": self.host.as_str() };
        self.options.write_to(&mut member);
        member
    }

    /// Same member as the server stores it: an arbiter's priority is always
    /// 0 there, whatever was submitted
    pub fn matches(&self, other: &Self) -> bool {
        if self.id != other.id || self.host != other.host {
            return false;
        }
        if self.options.arbiter_only && other.options.arbiter_only {
            let mut ours = self.options.clone();
            let mut theirs = other.options.clone();
            ours.priority = 0.0;
            theirs.priority = 0.0;
            return ours == theirs;
        }
        self.options == other.options
    }

    /// Parse a live member, filling in server defaults for absent options
    pub fn from_document(member: &Document) -> Result<Self> {
        let id = member
            .get("_id")
            .and_then(as_i64)
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| Error::malformed(format!("member without numeric _id: {}", member)))?;
        let host = member.get_str("host")?.to_string();

        let defaults = ReplicaOptions::default();
        let flag = |key: &str, default: bool| member.get_bool(key).unwrap_or(default);
        let delay = member
            .get("slaveDelay")
            .or_else(|| member.get("secondaryDelaySecs"))
            .and_then(as_i64)
            .unwrap_or(0);
        let tags = match member.get_document("tags") {
            Ok(tags) => tags
                .iter()
                .map(|(k, v)| {
                    let value = match v {
                        Bson::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    (k.clone(), value)
                })
                .collect(),
            Err(_) => BTreeMap::new(),
        };

        Ok(Self {
            id,
            host,
            options: ReplicaOptions {
                arbiter_only: flag("arbiterOnly", defaults.arbiter_only),
                build_indexes: flag("buildIndexes", defaults.build_indexes),
                hidden: flag("hidden", defaults.hidden),
                slave_delay: u64::try_from(delay).unwrap_or(0),
                priority: member.get("priority").and_then(as_f64).unwrap_or(defaults.priority),
                tags,
                votes: member
                    .get("votes")
                    .and_then(as_i64)
                    .and_then(|v| u32::try_from(v).ok())
                    .unwrap_or(defaults.votes),
            },
        })
    }
}

fn as_i64(value: &Bson) -> Option<i64> {
    match value {
        Bson::Int32(v) => Some(i64::from(*v)),
        Bson::Int64(v) => Some(*v),
        Bson::Double(v) if v.fract() == 0.0 => Some(*v as i64),
        _ => None,
    }
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// A replica set config document as stored by the server
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicaSetConfig {
    pub set_name: String,
    pub version: i64,
    pub members: Vec<MemberConfig>,
    raw: Document,
}

impl ReplicaSetConfig {
    /// Parse a live config document
    pub fn from_document(raw: Document) -> Result<Self> {
        let set_name = raw.get_str("_id")?.to_string();
        let version = raw
            .get("version")
            .and_then(as_i64)
            .ok_or_else(|| Error::malformed(format!("replica set config without version: {}", raw)))?;
        let members = raw
            .get_array("members")?
            .iter()
            .map(|m| match m {
                Bson::Document(member) => MemberConfig::from_document(member),
                other => Err(Error::malformed(format!("member is not a document: {}", other))),
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            set_name,
            version,
            members,
            raw,
        })
    }

    /// Member hosts in config order
    pub fn hosts(&self) -> Vec<String> {
        self.members.iter().map(|m| m.host.clone()).collect()
    }

    /// Highest member id in use
    pub fn max_member_id(&self) -> Option<i32> {
        self.members.iter().map(|m| m.id).max()
    }

    /// The next config: given members, version + 1, everything else kept
    pub fn successor(&self, members: Vec<MemberConfig>) -> Self {
        Self {
            set_name: self.set_name.clone(),
            version: self.version + 1,
            members,
            raw: self.raw.clone(),
        }
    }

    /// Full document for `replSetReconfig`
    pub fn to_document(&self) -> Document {
        let mut config = self.raw.clone();
        config.insert("_id", self.set_name.as_str());
        let version = match self.raw.get("version") {
            Some(Bson::Int64(_)) => Bson::Int64(self.version),
            Some(Bson::Double(_)) => Bson::Double(self.version as f64),
            _ => match i32::try_from(self.version) {
                Ok(v) => Bson::Int32(v),
                Err(_) => Bson::Int64(self.version),
            },
        };
        config.insert("version", version);
        let members: Vec<Document> = self.members.iter().map(MemberConfig::to_document).collect();
        config.insert("members", members);
        config
    }
}

/// Desired replica set, computed from the inventory
#[derive(Debug, Clone, PartialEq)]
pub struct TargetTopology {
    pub set_name: String,
    /// Members sorted by node name, ids 0..n
    pub members: Vec<MemberConfig>,
    /// `ip:port` of each member, parallel to `members`
    pub ip_hosts: Vec<String>,
    /// Node names, parallel to `members`
    pub names: Vec<String>,
    ip_to_host: HashMap<String, String>,
    options_by_host: HashMap<String, ReplicaOptions>,
}

impl TargetTopology {
    /// Merge the reference node into the candidates, sort by name and assign ids
    pub fn build(reference: &MemberRecord, candidates: &[MemberRecord], set_name: &str) -> Result<Self> {
        let mut seen = HashSet::new();
        for candidate in candidates {
            if !seen.insert(candidate.name.as_str()) {
                return Err(Error::invalid_input(format!(
                    "member '{}' listed more than once for replica set '{}'",
                    candidate.name, set_name
                )));
            }
        }

        let mut merged: Vec<&MemberRecord> = candidates.iter().collect();
        if !seen.contains(reference.name.as_str()) {
            merged.push(reference);
        }
        merged.sort_by(|a, b| a.name.cmp(&b.name));

        let mut members = Vec::with_capacity(merged.len());
        let mut ip_hosts = Vec::with_capacity(merged.len());
        let mut names = Vec::with_capacity(merged.len());
        let mut ip_to_host = HashMap::new();
        let mut options_by_host = HashMap::new();

        for (index, record) in merged.into_iter().enumerate() {
            let host = record.host();
            let options = record.options.effective();
            if options_by_host.insert(host.clone(), options.clone()).is_some() {
                return Err(Error::invalid_input(format!(
                    "host '{}' used by more than one member of replica set '{}'",
                    host, set_name
                )));
            }
            ip_to_host.insert(record.ip_host(), host.clone());
            ip_hosts.push(record.ip_host());
            names.push(record.name.clone());
            members.push(MemberConfig {
                id: index as i32,
                host,
                options,
            });
        }

        Ok(Self {
            set_name: set_name.to_string(),
            members,
            ip_hosts,
            names,
            ip_to_host,
            options_by_host,
        })
    }

    /// Target hosts in member order
    pub fn hosts(&self) -> Vec<String> {
        self.members.iter().map(|m| m.host.clone()).collect()
    }

    /// Effective options for a target host
    pub fn options_for(&self, host: &str) -> Result<&ReplicaOptions> {
        self.options_by_host
            .get(host)
            .ok_or_else(|| Error::invalid_input(format!("host '{}' is not a target member", host)))
    }

    /// Hostname for an `ip:port` member address
    pub fn hostname_for(&self, ip_host: &str) -> Option<&str> {
        self.ip_to_host.get(ip_host).map(String::as_str)
    }

    /// `replSetInitiate` command for this topology
    pub fn initiate_command(&self) -> Document {
        let members: Vec<Document> = self.members.iter().map(MemberConfig::to_document).collect();
        doc! {
            "replSetInitiate": {
                "_id": self.set_name.as_str(),
                "members": members,
            }
        }
    }

    fn matches_ip_variant(&self, live: &ReplicaSetConfig) -> bool {
        live.members.len() == self.ip_hosts.len()
            && live
                .members
                .iter()
                .zip(self.ip_hosts.iter().enumerate())
                .all(|(m, (index, ip))| m.id == index as i32 && &m.host == ip)
    }
}

/// Desired topology for `set_name`; see [`TargetTopology::build`]
pub fn build_target(
    reference: &MemberRecord,
    candidates: &[MemberRecord],
    set_name: &str,
) -> Result<TargetTopology> {
    TargetTopology::build(reference, candidates, set_name)
}

/// What to do about a live config
#[derive(Debug, Clone, PartialEq)]
pub enum ReconfigPlan {
    /// Live config already matches
    UpToDate,
    /// Same members addressed by IP; rewrite hosts to hostnames
    MigrateHostnames(ReplicaSetConfig),
    /// Membership and/or options differ
    Reconcile {
        config: ReplicaSetConfig,
        added: Vec<String>,
        removed: Vec<String>,
    },
}

/// Pairwise [`MemberConfig::matches`] in order
pub fn same_members(a: &[MemberConfig], b: &[MemberConfig]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.matches(y))
}

/// Decide how to move `live` to `target`
pub fn plan_reconfiguration(live: &ReplicaSetConfig, target: &TargetTopology) -> Result<ReconfigPlan> {
    if same_members(&live.members, &target.members) {
        return Ok(ReconfigPlan::UpToDate);
    }

    if target.matches_ip_variant(live) {
        let members = live
            .members
            .iter()
            .map(|m| {
                let host = target.hostname_for(&m.host).ok_or_else(|| {
                    Error::invalid_input(format!("no hostname known for {}", m.host))
                })?;
                Ok(MemberConfig {
                    id: m.id,
                    host: host.to_string(),
                    options: target.options_for(host)?.clone(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        return Ok(ReconfigPlan::MigrateHostnames(live.successor(members)));
    }

    let target_hosts = target.hosts();
    let live_hosts = live.hosts();
    let removed: Vec<String> = live_hosts
        .iter()
        .filter(|h| !target_hosts.contains(h))
        .cloned()
        .collect();
    let added: Vec<String> = target_hosts
        .iter()
        .filter(|h| !live_hosts.contains(h))
        .cloned()
        .collect();

    let mut members = Vec::with_capacity(target_hosts.len());
    for member in live.members.iter().filter(|m| !removed.contains(&m.host)) {
        members.push(MemberConfig {
            id: member.id,
            host: member.host.clone(),
            options: target.options_for(&member.host)?.clone(),
        });
    }

    // Freed ids below the maximum are never reused.
    let mut next_id = live.max_member_id().unwrap_or(-1);
    for host in &added {
        next_id += 1;
        members.push(MemberConfig {
            id: next_id,
            host: host.clone(),
            options: target.options_for(host)?.clone(),
        });
    }

    if same_members(&members, &live.members) {
        return Ok(ReconfigPlan::UpToDate);
    }

    Ok(ReconfigPlan::Reconcile {
        config: live.successor(members),
        added,
        removed,
    })
}

fn describe(members: &[MemberConfig]) -> String {
    let docs: Vec<String> = members.iter().map(|m| m.to_document().to_string()).collect();
    format!("[{}]", docs.join(", "))
}

/// Read the live config of `set_name` through `session`
pub async fn read_live_config(session: &dyn Session, set_name: &str) -> Result<ReplicaSetConfig> {
    let raw = session
        .find_one(LOCAL_DATABASE, REPLSET_COLLECTION, doc! { "_id": set_name })
        .await?
        .ok_or_else(|| {
            Error::malformed(format!(
                "no config for replica set '{}' on {}",
                set_name,
                session.endpoint()
            ))
        })?;
    ReplicaSetConfig::from_document(raw)
}

/// Forms and evolves a replica set
pub struct ReplicaSetReconciler<'a, C: Connector> {
    connections: &'a ConnectionManager<C>,
    executor: CommandExecutor,
}

impl<'a, C: Connector> ReplicaSetReconciler<'a, C> {
    pub fn new(connections: &'a ConnectionManager<C>) -> Self {
        Self {
            connections,
            executor: connections.executor(),
        }
    }

    /// Bring the replica set `set_name` in line with `reference` + `candidates`
    pub async fn reconcile(
        &self,
        reference: &MemberRecord,
        candidates: &[MemberRecord],
        set_name: &str,
        discovery: DiscoveryMode,
    ) -> Outcome {
        let mut outcome = Outcome::new(Component::ReplicaSet);

        if candidates.is_empty() {
            match discovery {
                DiscoveryMode::Solo => tracing::warn!(
                    "cannot search for member nodes, defaulting to single node replica set"
                ),
                DiscoveryMode::Search => {
                    outcome.skipped(
                        set_name,
                        format!("cannot configure replica set '{}', no member nodes found", set_name),
                    );
                    return outcome;
                }
            }
        }

        if let Err(e) = self.run(&mut outcome, reference, candidates, set_name).await {
            outcome.error(set_name, &e);
        }
        outcome
    }

    async fn run(
        &self,
        outcome: &mut Outcome,
        reference: &MemberRecord,
        candidates: &[MemberRecord],
        set_name: &str,
    ) -> Result<()> {
        let target = build_target(reference, candidates, set_name)?;
        let local = self.connections.local_endpoint(reference.port);
        let session = self.connections.connect(std::slice::from_ref(&local)).await?;

        tracing::info!(
            "configuring replica set '{}' with members {}",
            set_name,
            target.names.join(", ")
        );

        let reply = match self
            .executor
            .execute_with_retry(session.as_ref(), "admin", target.initiate_command())
            .await
        {
            Ok(reply) => reply,
            Err(e) => {
                outcome.failed(
                    set_name,
                    format!(
                        "replSetInitiate did not complete, a later run will pick up from the live state: {}",
                        e
                    ),
                );
                return Ok(());
            }
        };

        if reply.is_ok() {
            outcome.applied(
                set_name,
                format!("initiated replica set with {} members", target.members.len()),
            );
            return Ok(());
        }

        match classify_reply(&reply) {
            Some(ServerErrorClass::AlreadyDone(AlreadyDoneKind::ReplicaSetInitiated { responder })) => {
                drop(session);
                let host = responder.unwrap_or(local);
                self.converge_existing(outcome, reference, &target, &host).await
            }
            _ => {
                outcome.failed(set_name, format!("failed to configure replica set, reason: {}", reply));
                Ok(())
            }
        }
    }

    async fn converge_existing(
        &self,
        outcome: &mut Outcome,
        reference: &MemberRecord,
        target: &TargetTopology,
        host: &str,
    ) -> Result<()> {
        let set_name = target.set_name.as_str();
        let session = self.connections.connect(&[host.to_string()]).await?;
        let live = read_live_config(session.as_ref(), set_name).await?;
        drop(session);

        match plan_reconfiguration(&live, target)? {
            ReconfigPlan::UpToDate => {
                outcome.unchanged(set_name, format!("replica set '{}' already configured", set_name));
                Ok(())
            }
            ReconfigPlan::MigrateHostnames(config) => {
                tracing::info!("need to convert ips to hostnames for replica set '{}'", set_name);
                self.apply(outcome, reference, &live, &config, "converted member addresses to hostnames")
                    .await
            }
            ReconfigPlan::Reconcile {
                config,
                added,
                removed,
            } => {
                let summary = format!(
                    "reconfigured members (added [{}], removed [{}])",
                    added.join(", "),
                    removed.join(", ")
                );
                self.apply(outcome, reference, &live, &config, &summary).await
            }
        }
    }

    /// Submit `config` against the still-current member set
    async fn apply(
        &self,
        outcome: &mut Outcome,
        reference: &MemberRecord,
        live: &ReplicaSetConfig,
        config: &ReplicaSetConfig,
        summary: &str,
    ) -> Result<()> {
        let set_name = config.set_name.as_str();
        let session = self.connections.connect_primary(&live.hosts()).await?;
        let command = doc! { "replSetReconfig": config.to_document() };

        match self.executor.execute(session.as_ref(), "admin", command).await {
            Ok(reply) if reply.is_ok() => {
                outcome.applied(set_name, format!("{}, version {}", summary, config.version));
                Ok(())
            }
            Ok(reply) => {
                outcome.failed(set_name, format!("configuring replica set returned: {}", reply));
                Ok(())
            }
            Err(e) => {
                drop(session);
                tracing::info!("reconfigure of '{}' lost its connection ({}), verifying", set_name, e);
                self.verify_applied(outcome, reference, config, summary, &e).await
            }
        }
    }

    /// Re-read the live config after a dropped reconfigure and compare
    async fn verify_applied(
        &self,
        outcome: &mut Outcome,
        reference: &MemberRecord,
        config: &ReplicaSetConfig,
        summary: &str,
        cause: &Error,
    ) -> Result<()> {
        let local = self.connections.local_endpoint(reference.port);
        let session = self.connections.connect(&[local]).await?;
        let current = read_live_config(session.as_ref(), &config.set_name).await?;

        if same_members(&current.members, &config.members) {
            outcome.applied(
                config.set_name.as_str(),
                format!(
                    "{}, version {}; new config successfully applied, previous error: {}",
                    summary, current.version, cause
                ),
            );
            Ok(())
        } else {
            Err(Error::ConfigMismatch {
                current: describe(&current.members),
                target: describe(&config.members),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(name: &str, ip: &str) -> MemberRecord {
        MemberRecord {
            name: name.to_string(),
            fqdn: format!("{name}.example"),
            ipaddress: ip.to_string(),
            port: 27017,
            options: ReplicaOptions::default(),
            replica_set: None,
            shard_name: None,
        }
    }

    fn live(version: i32, members: Vec<Document>) -> ReplicaSetConfig {
        ReplicaSetConfig::from_document(doc! {
            "_id": "rs0",
            "version": version,
            "protocolVersion": 1_i64,
            "members": members,
            "settings": { "chainingAllowed": true },
        })
        .unwrap()
    }

    #[test]
    fn test_build_merges_and_sorts_by_name() {
        let candidates = vec![record("b", "10.0.0.2"), record("a", "10.0.0.1")];
        let reference = record("c", "10.0.0.3");

        let target = TargetTopology::build(&reference, &candidates, "rs0").unwrap();
        assert_eq!(target.names, ["a", "b", "c"]);
        let ids: Vec<i32> = target.members.iter().map(|m| m.id).collect();
        assert_eq!(ids, [0, 1, 2]);
        assert_eq!(target.hosts(), ["a.example:27017", "b.example:27017", "c.example:27017"]);
        assert_eq!(target.ip_hosts, ["10.0.0.1:27017", "10.0.0.2:27017", "10.0.0.3:27017"]);
    }

    #[test]
    fn test_build_does_not_duplicate_reference() {
        let candidates = vec![record("a", "10.0.0.1"), record("c", "10.0.0.3")];
        let target = TargetTopology::build(&record("c", "10.0.0.3"), &candidates, "rs0").unwrap();
        assert_eq!(target.members.len(), 2);
    }

    #[test]
    fn test_build_rejects_duplicate_names() {
        let candidates = vec![record("a", "10.0.0.1"), record("a", "10.0.0.9")];
        assert!(matches!(
            TargetTopology::build(&record("c", "10.0.0.3"), &candidates, "rs0"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_build_applies_priority_invariant() {
        let mut hidden = record("a", "10.0.0.1");
        hidden.options.hidden = true;
        hidden.options.priority = 10.0;
        let target = TargetTopology::build(&record("b", "10.0.0.2"), &[hidden], "rs0").unwrap();
        assert_eq!(target.members[0].options.priority, 0.0);
        assert_eq!(
            target.initiate_command(),
            doc! {
                "replSetInitiate": {
                    "_id": "rs0",
                    "members": [
                        { "_id": 0, "host": "a.example:27017", "hidden": true, "priority": 0.0 },
                        { "_id": 1, "host": "b.example:27017" },
                    ],
                }
            }
        );
    }

    #[test]
    fn test_member_from_live_document_fills_defaults() {
        let member = MemberConfig::from_document(&doc! {
            "_id": 3,
            "host": "a.example:27017",
            "arbiterOnly": false,
            "buildIndexes": true,
            "hidden": false,
            "priority": 1.0,
            "tags": {},
            "secondaryDelaySecs": 0_i64,
            "votes": 1,
        })
        .unwrap();
        assert_eq!(member.id, 3);
        assert_eq!(member.options, ReplicaOptions::default());
    }

    #[test]
    fn test_plan_up_to_date() {
        let target = TargetTopology::build(&record("a", "10.0.0.1"), &[record("b", "10.0.0.2")], "rs0")
            .unwrap();
        let live = live(
            4,
            vec![
                doc! { "_id": 0, "host": "a.example:27017", "priority": 1.0, "votes": 1 },
                doc! { "_id": 1, "host": "b.example:27017" },
            ],
        );
        assert_eq!(plan_reconfiguration(&live, &target).unwrap(), ReconfigPlan::UpToDate);
    }

    #[test]
    fn test_plan_hostname_migration_in_one_step() {
        let target = TargetTopology::build(&record("a", "10.0.0.1"), &[record("b", "10.0.0.2")], "rs0")
            .unwrap();
        let live = live(
            7,
            vec![
                doc! { "_id": 0, "host": "10.0.0.1:27017" },
                doc! { "_id": 1, "host": "10.0.0.2:27017" },
            ],
        );

        match plan_reconfiguration(&live, &target).unwrap() {
            ReconfigPlan::MigrateHostnames(config) => {
                assert_eq!(config.version, 8);
                assert_eq!(config.members, target.members);
                let document = config.to_document();
                assert_eq!(document.get_i32("version").unwrap(), 8);
                assert_eq!(
                    document.get_document("settings").unwrap(),
                    &doc! { "chainingAllowed": true }
                );
            }
            other => panic!("expected hostname migration, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_adds_and_removes_members() {
        // live: a(0), old(1), b(4); target: a, b, c, d
        let reference = record("a", "10.0.0.1");
        let candidates = [record("b", "10.0.0.2"), record("c", "10.0.0.3"), record("d", "10.0.0.4")];
        let target = TargetTopology::build(&reference, &candidates, "rs0").unwrap();
        let live = live(
            2,
            vec![
                doc! { "_id": 0, "host": "a.example:27017" },
                doc! { "_id": 1, "host": "old.example:27017" },
                doc! { "_id": 4, "host": "b.example:27017", "priority": 3.0 },
            ],
        );

        match plan_reconfiguration(&live, &target).unwrap() {
            ReconfigPlan::Reconcile {
                config,
                added,
                removed,
            } => {
                assert_eq!(config.version, 3);
                assert_eq!(removed, ["old.example:27017"]);
                assert_eq!(added, ["c.example:27017", "d.example:27017"]);
                let ids: Vec<(i32, &str)> =
                    config.members.iter().map(|m| (m.id, m.host.as_str())).collect();
                assert_eq!(
                    ids,
                    [
                        (0, "a.example:27017"),
                        (4, "b.example:27017"),
                        (5, "c.example:27017"),
                        (6, "d.example:27017"),
                    ]
                );
                // Options are re-applied from the inventory.
                assert_eq!(config.members[1].options.priority, 1.0);
            }
            other => panic!("expected reconcile, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_options_only_change_keeps_ids() {
        let mut b = record("b", "10.0.0.2");
        b.options.votes = 0;
        b.options.priority = 0.0;
        let target = TargetTopology::build(&record("a", "10.0.0.1"), &[b], "rs0").unwrap();
        let live = live(
            1,
            vec![
                doc! { "_id": 0, "host": "a.example:27017" },
                doc! { "_id": 1, "host": "b.example:27017" },
            ],
        );

        match plan_reconfiguration(&live, &target).unwrap() {
            ReconfigPlan::Reconcile { config, added, removed } => {
                assert!(added.is_empty() && removed.is_empty());
                assert_eq!(config.version, 2);
                assert_eq!(config.members[1].id, 1);
                assert_eq!(config.members[1].options.votes, 0);
            }
            other => panic!("expected reconcile, got {other:?}"),
        }
    }

    #[test]
    fn test_plan_same_members_other_ids_is_up_to_date() {
        let target = TargetTopology::build(&record("a", "10.0.0.1"), &[record("b", "10.0.0.2")], "rs0")
            .unwrap();
        let live = live(
            9,
            vec![
                doc! { "_id": 0, "host": "a.example:27017" },
                doc! { "_id": 5, "host": "b.example:27017" },
            ],
        );
        assert_eq!(plan_reconfiguration(&live, &target).unwrap(), ReconfigPlan::UpToDate);
    }

    #[test]
    fn test_arbiter_priority_ignored_when_comparing() {
        let mut arbiter = record("b", "10.0.0.2");
        arbiter.options.arbiter_only = true;
        let target = TargetTopology::build(&record("a", "10.0.0.1"), &[arbiter], "rs0").unwrap();
        assert_eq!(target.members[1].options.priority, 1.0);

        // As stored by the server after initiate.
        let live = ReplicaSetConfig::from_document(doc! {
            "_id": "rs0",
            "version": 1,
            "members": [
                { "_id": 0, "host": "a.example:27017" },
                { "_id": 1, "host": "b.example:27017", "arbiterOnly": true, "priority": 0.0 },
            ],
        })
        .unwrap();
        assert_eq!(plan_reconfiguration(&live, &target).unwrap(), ReconfigPlan::UpToDate);

        // Priority still counts for data-bearing members.
        let live = ReplicaSetConfig::from_document(doc! {
            "_id": "rs0",
            "version": 1,
            "members": [
                { "_id": 0, "host": "a.example:27017", "priority": 0.0 },
                { "_id": 1, "host": "b.example:27017", "arbiterOnly": true, "priority": 0.0 },
            ],
        })
        .unwrap();
        assert!(matches!(
            plan_reconfiguration(&live, &target).unwrap(),
            ReconfigPlan::Reconcile { .. }
        ));
    }

    #[test]
    fn test_version_type_preserved() {
        let config = ReplicaSetConfig::from_document(doc! {
            "_id": "rs0",
            "version": 41_i64,
            "members": [ { "_id": 0, "host": "a.example:27017" } ],
        })
        .unwrap();
        let next = config.successor(config.members.clone());
        assert_eq!(next.to_document().get_i64("version").unwrap(), 42);
    }
}
