//! In-memory cluster for integration tests
//!
//! Answers the administrative commands the reconcilers send with the same
//! reply shapes a real server uses, and records every command it sees.

#![allow(dead_code)]

use async_trait::async_trait;
use converge_core::connection::{ConnectionManager, ConnectionSettings, Connector, Credentials, Session};
use converge_core::inventory::{MemberRecord, ReplicaOptions};
use converge_core::retry::RetryConfig;
use converge_core::{Error, Result};
use mongodb::bson::{Bson, Document, doc};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// What a reconfigure does to the connection it arrives on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconfigBehavior {
    /// Apply and answer ok
    Reply,
    /// Apply, then drop the connection before answering
    ApplyAndDrop,
    /// Drop the connection without applying
    Drop,
}

/// One command as received
#[derive(Debug, Clone)]
pub struct Received {
    pub host: String,
    pub database: String,
    pub command: Document,
}

impl Received {
    pub fn name(&self) -> &str {
        self.command.keys().next().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Default)]
struct State {
    unreachable: HashSet<String>,
    reject_credentials: bool,
    primary: Option<String>,
    replset: Option<Document>,
    reconfig: Option<ReconfigBehavior>,
    shards: Vec<String>,
    sharded_databases: HashSet<String>,
    sharded_collections: HashMap<String, Document>,
    indexes: BTreeMap<String, Vec<Document>>,
    users: BTreeMap<String, Document>,
    scripted: HashMap<String, VecDeque<Result<Document>>>,
    received: Vec<Received>,
    opened: Vec<(String, bool)>,
}

/// Shared handle to the fake cluster
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    pub fn new() -> Self {
        Self::default()
    }

    fn with<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub fn set_unreachable(&self, host: &str) {
        self.with(|s| s.unreachable.insert(host.to_string()));
    }

    pub fn reject_credentials(&self) {
        self.with(|s| s.reject_credentials = true);
    }

    pub fn set_primary(&self, host: &str) {
        self.with(|s| s.primary = Some(host.to_string()));
    }

    pub fn set_replset(&self, config: Document) {
        self.with(|s| s.replset = Some(config));
    }

    pub fn replset(&self) -> Option<Document> {
        self.with(|s| s.replset.clone())
    }

    pub fn on_reconfig(&self, behavior: ReconfigBehavior) {
        self.with(|s| s.reconfig = Some(behavior));
    }

    /// Queue a reply (or failure) for the next command named `name`
    pub fn script(&self, name: &str, reply: Result<Document>) {
        self.with(|s| {
            s.scripted
                .entry(name.to_string())
                .or_default()
                .push_back(reply)
        });
    }

    pub fn shards(&self) -> Vec<String> {
        self.with(|s| s.shards.clone())
    }

    pub fn sharded_databases(&self) -> HashSet<String> {
        self.with(|s| s.sharded_databases.clone())
    }

    pub fn sharded_collections(&self) -> HashMap<String, Document> {
        self.with(|s| s.sharded_collections.clone())
    }

    pub fn users(&self) -> BTreeMap<String, Document> {
        self.with(|s| s.users.clone())
    }

    pub fn received(&self) -> Vec<Received> {
        self.with(|s| s.received.clone())
    }

    /// Commands named `name`, in order
    pub fn received_named(&self, name: &str) -> Vec<Received> {
        self.received().into_iter().filter(|r| r.name() == name).collect()
    }

    /// `(host, with_credentials)` of every open attempt
    pub fn opened(&self) -> Vec<(String, bool)> {
        self.with(|s| s.opened.clone())
    }

    fn run(&self, host: &str, database: &str, command: Document) -> Result<Document> {
        self.with(|s| {
            let received = Received {
                host: host.to_string(),
                database: database.to_string(),
                command: command.clone(),
            };
            let name = received.name().to_string();
            s.received.push(received);

            if let Some(reply) = s.scripted.get_mut(&name).and_then(VecDeque::pop_front) {
                return reply;
            }

            match name.as_str() {
                "isMaster" => {
                    let primary = s.primary.as_deref().is_none_or(|p| p == host);
                    Ok(doc! { "ok": 1.0, "ismaster": primary })
                }
                "replSetInitiate" => Ok(initiate(s, &command)),
                "replSetReconfig" => reconfig(s, &command),
                "addShard" => {
                    let shard = command.get_str("addShard").unwrap_or_default().to_string();
                    if !s.shards.contains(&shard) {
                        s.shards.push(shard.clone());
                    }
                    Ok(doc! { "ok": 1.0, "shardAdded": shard })
                }
                "enablesharding" => {
                    let db = command.get_str("enablesharding").unwrap_or_default().to_string();
                    if s.sharded_databases.insert(db) {
                        Ok(doc! { "ok": 1.0 })
                    } else {
                        Ok(doc! { "ok": 0.0, "errmsg": "already enabled" })
                    }
                }
                "shardcollection" => {
                    let ns = command.get_str("shardcollection").unwrap_or_default().to_string();
                    if s.sharded_collections.contains_key(&ns) {
                        return Ok(doc! { "ok": 0.0, "errmsg": "already sharded" });
                    }
                    let key = command.get_document("key").cloned().unwrap_or_default();
                    s.sharded_collections.insert(ns.clone(), key);
                    Ok(doc! { "ok": 1.0, "collectionsharded": ns })
                }
                "createIndexes" => {
                    let coll = command.get_str("createIndexes").unwrap_or_default();
                    let ns = format!("{}.{}", database, coll);
                    let existing = s.indexes.entry(ns).or_default();
                    let before = existing.len() as i32 + 1;
                    for index in command.get_array("indexes").into_iter().flatten() {
                        if let Bson::Document(index) = index {
                            if !existing.contains(index) {
                                existing.push(index.clone());
                            }
                        }
                    }
                    let after = existing.len() as i32 + 1;
                    Ok(doc! { "ok": 1.0, "numIndexesBefore": before, "numIndexesAfter": after })
                }
                "createUser" => {
                    let user = command.get_str("createUser").unwrap_or_default().to_string();
                    if s.users.contains_key(&user) {
                        return Ok(doc! {
                            "ok": 0.0,
                            "errmsg": format!("User \"{}@{}\" already exists", user, database),
                            "code": 51003,
                            "codeName": "Location51003",
                        });
                    }
                    s.users.insert(user, command.clone());
                    Ok(doc! { "ok": 1.0 })
                }
                other => Ok(doc! {
                    "ok": 0.0,
                    "errmsg": format!("no such command: '{}'", other),
                    "code": 59,
                }),
            }
        })
    }
}

fn initiate(s: &mut State, command: &Document) -> Document {
    if s.replset.is_some() {
        return doc! {
            "ok": 0.0,
            "errmsg": "already initialized",
            "code": 23,
            "codeName": "AlreadyInitialized",
        };
    }
    let mut config = command.get_document("replSetInitiate").cloned().unwrap_or_default();
    config.insert("version", 1);
    s.replset = Some(stored(config));
    doc! { "ok": 1.0 }
}

/// The server stores arbiters with priority 0
fn stored(mut config: Document) -> Document {
    if let Ok(members) = config.get_array_mut("members") {
        for member in members.iter_mut() {
            if let Some(member) = member.as_document_mut() {
                if member.get_bool("arbiterOnly").unwrap_or(false) {
                    member.insert("priority", 0.0);
                }
            }
        }
    }
    config
}

fn reconfig(s: &mut State, command: &Document) -> Result<Document> {
    let config = command.get_document("replSetReconfig").cloned().unwrap_or_default();
    let current = s
        .replset
        .as_ref()
        .and_then(|c| c.get_i32("version").ok())
        .unwrap_or_default();
    if config.get_i32("version").ok() != Some(current + 1) {
        return Ok(doc! {
            "ok": 0.0,
            "errmsg": format!("version must be {}", current + 1),
            "code": 103,
        });
    }

    match s.reconfig.unwrap_or(ReconfigBehavior::Reply) {
        ReconfigBehavior::Reply => {
            s.replset = Some(stored(config));
            Ok(doc! { "ok": 1.0 })
        }
        ReconfigBehavior::ApplyAndDrop => {
            s.replset = Some(stored(config));
            Err(Error::transport("connection closed by peer"))
        }
        ReconfigBehavior::Drop => Err(Error::transport("connection closed by peer")),
    }
}

#[async_trait]
impl Connector for FakeCluster {
    async fn open(
        &self,
        host: &str,
        credentials: Option<&Credentials>,
        _settings: &ConnectionSettings,
    ) -> Result<Box<dyn Session>> {
        let (unreachable, reject) = self.with(|s| {
            s.opened.push((host.to_string(), credentials.is_some()));
            (s.unreachable.contains(host), s.reject_credentials)
        });
        if unreachable {
            return Err(Error::connection(format!("{}: connection refused", host)));
        }
        if reject && credentials.is_some() {
            return Err(Error::connection("Authentication failed"));
        }
        Ok(Box::new(FakeSession {
            host: host.to_string(),
            cluster: self.clone(),
        }))
    }
}

struct FakeSession {
    host: String,
    cluster: FakeCluster,
}

#[async_trait]
impl Session for FakeSession {
    fn endpoint(&self) -> &str {
        &self.host
    }

    async fn list_database_names(&self) -> Result<Vec<String>> {
        Ok(vec!["admin".to_string(), "config".to_string(), "local".to_string()])
    }

    async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        self.cluster.run(&self.host, database, command)
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        if database != "local" || collection != "system.replset" {
            return Ok(None);
        }
        let config = self.cluster.replset();
        Ok(config.filter(|c| filter.get("_id").is_none_or(|id| c.get("_id") == Some(id))))
    }
}

/// Settings with instant retries
pub fn settings() -> ConnectionSettings {
    ConnectionSettings {
        retry: RetryConfig::new(3, Duration::ZERO),
        ..ConnectionSettings::default()
    }
}

pub fn manager(cluster: &FakeCluster) -> ConnectionManager<FakeCluster> {
    ConnectionManager::new(cluster.clone(), settings())
}

/// Member `name` at `<name>.example:27017`, IP `ip`
pub fn member(name: &str, ip: &str) -> MemberRecord {
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

/// `(id, host)` pairs of a config document
pub fn member_ids(config: &Document) -> Vec<(i32, String)> {
    config
        .get_array("members")
        .unwrap()
        .iter()
        .map(|m| {
            let m = m.as_document().unwrap();
            (m.get_i32("_id").unwrap(), m.get_str("host").unwrap().to_string())
        })
        .collect()
}
