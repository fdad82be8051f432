//! Database and collection sharding, index builds
//!
//! Both operations work item by item: a refusal or timeout on one database,
//! collection or index set is recorded and the next item is processed.

use crate::classify::{AlreadyDoneKind, ServerErrorClass, classify_reply};
use crate::connection::{ConnectionManager, Connector, Session};
use crate::executor::{CommandExecutor, CommandReply};
use crate::inventory::{IndexSpec, MemberRecord, ShardKey};
use crate::outcome::{Component, Outcome};
use crate::{Error, Result};
use mongodb::bson::{Bson, Document, doc};

/// Split `db.collection` at the first dot
///
/// The collection part may itself contain dots.
pub fn split_namespace(namespace: &str) -> Result<(&str, &str)> {
    match namespace.split_once('.') {
        Some((db, coll)) if !db.is_empty() && !coll.is_empty() => Ok((db, coll)),
        _ => Err(Error::invalid_input(format!(
            "'{}' is not a database.collection name",
            namespace
        ))),
    }
}

/// Distinct database names of the namespaces, in first-seen order
pub fn databases_of<'n>(namespaces: impl IntoIterator<Item = &'n str>) -> Vec<&'n str> {
    let mut databases: Vec<&str> = Vec::new();
    for namespace in namespaces {
        if let Ok((db, _)) = split_namespace(namespace) {
            if !databases.contains(&db) {
                databases.push(db);
            }
        }
    }
    databases
}

/// `createIndexes` command for one collection
pub fn create_indexes_command(collection: &str, specs: &[IndexSpec]) -> Document {
    let indexes: Vec<Document> = specs.iter().map(IndexSpec::to_document).collect();
    doc! { "createIndexes": collection, "indexes": indexes }
}

/// Enables sharding and builds indexes through the reference node
pub struct ShardingConfigurator<'a, C: Connector> {
    connections: &'a ConnectionManager<C>,
    executor: CommandExecutor,
}

impl<'a, C: Connector> ShardingConfigurator<'a, C> {
    pub fn new(connections: &'a ConnectionManager<C>) -> Self {
        Self {
            connections,
            executor: connections.executor(),
        }
    }

    async fn open(&self, reference: &MemberRecord, outcome: &mut Outcome) -> Option<Box<dyn Session>> {
        let local = self.connections.local_endpoint(reference.port);
        match self.connections.connect(std::slice::from_ref(&local)).await {
            Ok(session) => Some(session),
            Err(e) => {
                outcome.error(local, &e);
                None
            }
        }
    }

    /// Enable sharding on every database named, then shard each collection
    pub async fn enable_sharding(
        &self,
        reference: &MemberRecord,
        collections: &[(String, ShardKey)],
    ) -> Outcome {
        let mut outcome = Outcome::new(Component::Sharding);

        if collections.is_empty() {
            outcome.skipped("sharding", "no collections to shard, nothing to do");
            return outcome;
        }

        let Some(session) = self.open(reference, &mut outcome).await else {
            return outcome;
        };

        for db in databases_of(collections.iter().map(|(name, _)| name.as_str())) {
            let command = doc! { "enablesharding": db };
            match self.executor.execute_with_retry(session.as_ref(), "admin", command).await {
                Ok(reply) if reply.is_ok() => outcome.applied(db, "sharding enabled"),
                Ok(reply) => match classify_reply(&reply) {
                    Some(ServerErrorClass::AlreadyDone(AlreadyDoneKind::ShardingEnabled)) => {
                        outcome.unchanged(db, "sharding already enabled")
                    }
                    _ => outcome.failed(db, format!("enablesharding returned: {}", reply)),
                },
                Err(e) => record_incomplete(&mut outcome, db, "enablesharding", &e),
            }
        }

        for (name, key) in collections {
            if let Err(e) = split_namespace(name) {
                outcome.failed(name.as_str(), e.to_string());
                continue;
            }

            let command = doc! { "shardcollection": name.as_str(), "key": key.normalized() };
            match self.executor.execute_with_retry(session.as_ref(), "admin", command).await {
                Ok(reply) => record_shard_collection(&mut outcome, name, key, &reply),
                Err(e) => record_incomplete(&mut outcome, name, "shardcollection", &e),
            }
        }

        outcome
    }

    /// One `createIndexes` per collection, on the collection's database
    pub async fn create_indexes(
        &self,
        reference: &MemberRecord,
        indexes: &[(String, Vec<IndexSpec>)],
    ) -> Outcome {
        let mut outcome = Outcome::new(Component::Indexes);

        if indexes.is_empty() {
            outcome.skipped("indexes", "no indexes to create, nothing to do");
            return outcome;
        }

        let Some(session) = self.open(reference, &mut outcome).await else {
            return outcome;
        };

        for (name, specs) in indexes {
            let (db, collection) = match split_namespace(name) {
                Ok(parts) => parts,
                Err(e) => {
                    outcome.failed(name.as_str(), e.to_string());
                    continue;
                }
            };

            let command = create_indexes_command(collection, specs);
            match self.executor.execute_with_retry(session.as_ref(), db, command).await {
                Ok(reply) if reply.is_ok() => {
                    if index_count_unchanged(&reply) {
                        outcome.unchanged(name.as_str(), "indexes already exist");
                    } else {
                        outcome.applied(name.as_str(), format!("created {} index(es)", specs.len()));
                    }
                }
                Ok(reply) => outcome.failed(name.as_str(), format!("createIndexes returned: {}", reply)),
                Err(e) => record_incomplete(&mut outcome, name, "createIndexes", &e),
            }
        }

        outcome
    }
}

fn record_shard_collection(outcome: &mut Outcome, name: &str, key: &ShardKey, reply: &CommandReply) {
    if reply.is_ok() {
        if reply.get("collectionsharded").is_some() {
            outcome.applied(name, format!("sharded on {}", key.normalized()));
        } else {
            let error = Error::Ambiguous(format!(
                "shardcollection {} returned ok without collectionsharded: {}",
                name, reply
            ));
            outcome.failed(name, error.to_string());
        }
        return;
    }

    match classify_reply(reply) {
        Some(ServerErrorClass::AlreadyDone(AlreadyDoneKind::CollectionSharded)) => {
            outcome.unchanged(name, "collection already sharded")
        }
        _ => outcome.failed(name, format!("shardcollection returned: {}", reply)),
    }
}

fn index_count_unchanged(reply: &CommandReply) -> bool {
    let count = |key: &str| match reply.get(key) {
        Some(Bson::Int32(v)) => Some(i64::from(*v)),
        Some(Bson::Int64(v)) => Some(*v),
        _ => None,
    };
    matches!(
        (count("numIndexesBefore"), count("numIndexesAfter")),
        (Some(before), Some(after)) if before == after
    )
}

fn record_incomplete(outcome: &mut Outcome, target: &str, command: &str, error: &Error) {
    if error.is_connection() {
        outcome.error(target, error);
    } else {
        outcome.failed(
            target,
            format!("{} did not complete ({}), re-run to finish", command, error),
        );
    }
}
