//! Desired-state input
//!
//! An [`Inventory`] is an immutable snapshot of what the cluster should look
//! like, assembled by whatever node inventory system drives the run. Node
//! records arrive as a default bag plus per-node overrides; they are resolved
//! into typed [`MemberRecord`]s once, up front, by [`resolve_member_view`].

use crate::{Error, Result};
use mongodb::bson::{Bson, Document};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default server port
pub const DEFAULT_PORT: u16 = 27017;

/// Replication options of one member, as configured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaOptions {
    /// Voting-only member without data
    pub arbiter_only: bool,
    /// Whether the member builds secondary indexes
    pub build_indexes: bool,
    /// Invisible to clients
    pub hidden: bool,
    /// Replication delay in seconds
    pub slave_delay: u64,
    /// Election priority
    pub priority: f64,
    /// Member tags
    pub tags: BTreeMap<String, String>,
    /// Number of votes
    pub votes: u32,
}

impl Default for ReplicaOptions {
    fn default() -> Self {
        Self {
            arbiter_only: false,
            build_indexes: true,
            hidden: false,
            slave_delay: 0,
            priority: 1.0,
            tags: BTreeMap::new(),
            votes: 1,
        }
    }
}

impl ReplicaOptions {
    /// Options as they must be submitted: a member that skips index builds,
    /// is hidden or lags behind can never become primary, so its priority is 0
    pub fn effective(&self) -> Self {
        let mut options = self.clone();
        if !self.build_indexes || self.hidden || self.slave_delay > 0 {
            options.priority = 0.0;
        }
        options
    }

    /// Append the non-default options to a member descriptor
    pub fn write_to(&self, member: &mut Document) {
        if self.arbiter_only {
            member.insert("arbiterOnly", true);
        }
        if !self.build_indexes {
            member.insert("buildIndexes", false);
        }
        if self.hidden {
            member.insert("hidden", true);
        }
        if self.slave_delay > 0 {
            member.insert("slaveDelay", self.slave_delay as i64);
        }
        if self.priority != 1.0 {
            member.insert("priority", self.priority);
        }
        if !self.tags.is_empty() {
            let tags: Document = self
                .tags
                .iter()
                .map(|(k, v)| (k.clone(), Bson::String(v.clone())))
                .collect();
            member.insert("tags", tags);
        }
        if self.votes != 1 {
            member.insert("votes", self.votes as i32);
        }
    }
}

/// Per-node overrides; every field left out falls back to [`MemberDefaults`]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberOverrides {
    pub port: Option<u16>,
    pub arbiter_only: Option<bool>,
    pub build_indexes: Option<bool>,
    pub hidden: Option<bool>,
    pub slave_delay: Option<u64>,
    pub priority: Option<f64>,
    pub tags: Option<BTreeMap<String, String>>,
    pub votes: Option<u32>,
    /// Explicit replica set this node belongs to
    pub replica_set: Option<String>,
    /// Shard this node serves
    pub shard_name: Option<String>,
}

/// Cluster-wide defaults for every node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemberDefaults {
    pub port: u16,
    pub arbiter_only: bool,
    pub build_indexes: bool,
    pub hidden: bool,
    pub slave_delay: u64,
    pub priority: f64,
    pub tags: BTreeMap<String, String>,
    pub votes: u32,
    pub replica_set: Option<String>,
    pub shard_name: Option<String>,
}

impl Default for MemberDefaults {
    fn default() -> Self {
        let options = ReplicaOptions::default();
        Self {
            port: DEFAULT_PORT,
            arbiter_only: options.arbiter_only,
            build_indexes: options.build_indexes,
            hidden: options.hidden,
            slave_delay: options.slave_delay,
            priority: options.priority,
            tags: options.tags,
            votes: options.votes,
            replica_set: None,
            shard_name: None,
        }
    }
}

/// A node as supplied by the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRecord {
    /// Stable identity
    pub name: String,
    /// Resolvable hostname
    pub fqdn: String,
    /// IP address
    pub ipaddress: String,
    #[serde(flatten)]
    pub overrides: MemberOverrides,
}

impl NodeRecord {
    /// Node with no overrides
    pub fn new(name: impl Into<String>, fqdn: impl Into<String>, ipaddress: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fqdn: fqdn.into(),
            ipaddress: ipaddress.into(),
            overrides: MemberOverrides::default(),
        }
    }

    /// Same node with the given overrides
    pub fn with_overrides(mut self, overrides: MemberOverrides) -> Self {
        self.overrides = overrides;
        self
    }
}

/// A node with defaults and overrides resolved
#[derive(Debug, Clone, PartialEq)]
pub struct MemberRecord {
    pub name: String,
    pub fqdn: String,
    pub ipaddress: String,
    pub port: u16,
    pub options: ReplicaOptions,
    pub replica_set: Option<String>,
    pub shard_name: Option<String>,
}

impl MemberRecord {
    /// `fqdn:port`
    pub fn host(&self) -> String {
        format!("{}:{}", self.fqdn, self.port)
    }

    /// `ipaddress:port`
    pub fn ip_host(&self) -> String {
        format!("{}:{}", self.ipaddress, self.port)
    }
}

/// Overlay a node's overrides on the defaults
pub fn resolve_member_view(defaults: &MemberDefaults, node: &NodeRecord) -> Result<MemberRecord> {
    let o = &node.overrides;
    let priority = o.priority.unwrap_or(defaults.priority);
    if !priority.is_finite() || priority < 0.0 {
        return Err(Error::invalid_input(format!(
            "node '{}': priority must be a non-negative number, got {}",
            node.name, priority
        )));
    }

    Ok(MemberRecord {
        name: node.name.clone(),
        fqdn: node.fqdn.clone(),
        ipaddress: node.ipaddress.clone(),
        port: o.port.unwrap_or(defaults.port),
        options: ReplicaOptions {
            arbiter_only: o.arbiter_only.unwrap_or(defaults.arbiter_only),
            build_indexes: o.build_indexes.unwrap_or(defaults.build_indexes),
            hidden: o.hidden.unwrap_or(defaults.hidden),
            slave_delay: o.slave_delay.unwrap_or(defaults.slave_delay),
            priority,
            tags: o.tags.clone().unwrap_or_else(|| defaults.tags.clone()),
            votes: o.votes.unwrap_or(defaults.votes),
        },
        replica_set: o.replica_set.clone().or_else(|| defaults.replica_set.clone()),
        shard_name: o.shard_name.clone().or_else(|| defaults.shard_name.clone()),
    })
}

/// Resolve every node of a list
pub fn resolve_members(defaults: &MemberDefaults, nodes: &[NodeRecord]) -> Result<Vec<MemberRecord>> {
    nodes.iter().map(|n| resolve_member_view(defaults, n)).collect()
}

/// Shard or index key: a bare field (ascending) or an ordered field → direction map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ShardKey {
    Field(String),
    Compound(Document),
}

impl ShardKey {
    /// Key as a field → direction document
    pub fn normalized(&self) -> Document {
        match self {
            Self::Field(field) => {
                let mut key = Document::new();
                key.insert(field.clone(), 1);
                key
            }
            Self::Compound(key) => key.clone(),
        }
    }
}

impl From<&str> for ShardKey {
    fn from(field: &str) -> Self {
        Self::Field(field.to_string())
    }
}

/// One index to create on a collection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexSpec {
    #[serde(default)]
    pub name: Option<String>,
    pub key: ShardKey,
    #[serde(default)]
    pub background: Option<bool>,
    #[serde(default)]
    pub sparse: Option<bool>,
    #[serde(default)]
    pub unique: Option<bool>,
    /// Legacy duplicate dropping on unique index builds
    #[serde(default, alias = "dropDups")]
    pub drop_dups: Option<bool>,
}

impl IndexSpec {
    /// Index over `key` with no modifiers
    pub fn new(key: ShardKey) -> Self {
        Self {
            name: None,
            key,
            background: None,
            sparse: None,
            unique: None,
            drop_dups: None,
        }
    }

    /// Descriptor for `createIndexes`, carrying only the fields that are set
    pub fn to_document(&self) -> Document {
        let mut index = Document::new();
        if let Some(name) = &self.name {
            index.insert("name", name.as_str());
        }
        index.insert("key", self.key.normalized());
        let flags = [
            ("background", self.background),
            ("sparse", self.sparse),
            ("unique", self.unique),
            ("dropDups", self.drop_dups),
        ];
        for (field, value) in flags {
            if let Some(value) = value {
                index.insert(field, value);
            }
        }
        index
    }
}

/// A role granted to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleSpec {
    pub role: String,
    pub db: String,
}

impl RoleSpec {
    pub fn new(role: impl Into<String>, db: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            db: db.into(),
        }
    }
}

/// A database user
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSpec {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub roles: Vec<RoleSpec>,
}

impl std::fmt::Debug for UserSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserSpec")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("roles", &self.roles)
            .finish()
    }
}

impl UserSpec {
    /// The built-in administrator used when nothing else is configured
    pub fn default_admin() -> Self {
        Self {
            username: "admin".to_string(),
            password: "admin".to_string(),
            roles: vec![
                RoleSpec::new("dbAdmin", "admin"),
                RoleSpec::new("dbOwner", "admin"),
                RoleSpec::new("root", "admin"),
            ],
        }
    }
}

impl Default for UserSpec {
    fn default() -> Self {
        Self::default_admin()
    }
}

/// How member nodes are found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryMode {
    /// Members come from an inventory search; an empty result is suspicious
    #[default]
    Search,
    /// No search is possible; an empty list means a single-node set
    Solo,
}

/// Replica set section of the inventory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicaSetInventory {
    pub name: String,
    #[serde(default)]
    pub discovery: DiscoveryMode,
    #[serde(default)]
    pub members: Vec<NodeRecord>,
}

/// Which components an unattended run may touch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoConfigure {
    pub replicaset: bool,
    pub sharding: bool,
}

impl Default for AutoConfigure {
    fn default() -> Self {
        Self {
            replicaset: true,
            sharding: true,
        }
    }
}

/// Desired state of the whole cluster for one run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Inventory {
    /// Whether the cluster requires authentication
    #[serde(default)]
    pub auth: bool,
    /// Administrator credentials
    #[serde(default)]
    pub admin: UserSpec,
    /// The node this run executes on
    pub node: NodeRecord,
    #[serde(default)]
    pub defaults: MemberDefaults,
    #[serde(default)]
    pub replica_set: Option<ReplicaSetInventory>,
    /// Shard candidates registered with the routing tier
    #[serde(default)]
    pub shards: Vec<NodeRecord>,
    #[serde(default)]
    pub sharded_collections: BTreeMap<String, ShardKey>,
    #[serde(default)]
    pub indexes: BTreeMap<String, Vec<IndexSpec>>,
    #[serde(default)]
    pub users: Vec<UserSpec>,
    #[serde(default)]
    pub auto_configure: AutoConfigure,
}

impl Inventory {
    /// The reference node, resolved
    pub fn reference(&self) -> Result<MemberRecord> {
        resolve_member_view(&self.defaults, &self.node)
    }

    /// Replica set candidates, resolved
    pub fn replica_set_members(&self) -> Result<Vec<MemberRecord>> {
        match &self.replica_set {
            Some(rs) => resolve_members(&self.defaults, &rs.members),
            None => Ok(Vec::new()),
        }
    }

    /// Shard candidates, resolved
    pub fn shard_members(&self) -> Result<Vec<MemberRecord>> {
        resolve_members(&self.defaults, &self.shards)
    }

    /// Sharded collections in name order
    pub fn sharded_collections(&self) -> Vec<(String, ShardKey)> {
        self.sharded_collections
            .iter()
            .map(|(name, key)| (name.clone(), key.clone()))
            .collect()
    }

    /// Index specs in collection name order
    pub fn index_specs(&self) -> Vec<(String, Vec<IndexSpec>)> {
        self.indexes
            .iter()
            .map(|(name, specs)| (name.clone(), specs.clone()))
            .collect()
    }
}
