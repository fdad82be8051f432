//! Shard registration, sharding and index builds against the in-memory cluster

mod common;

use common::{FakeCluster, manager, member};
use converge_core::Status;
use converge_core::executor::CommandExecutor;
use converge_core::inventory::{IndexSpec, ShardKey};
use converge_core::retry::RetryConfig;
use converge_core::sharding::ShardingConfigurator;
use converge_core::shards::ShardRegistrar;
use mongodb::bson::doc;

fn shard_member(name: &str, replica_set: Option<&str>) -> converge_core::inventory::MemberRecord {
    let mut m = member(name, "10.0.1.1");
    m.port = 27018;
    m.replica_set = replica_set.map(str::to_string);
    m
}

#[tokio::test]
async fn test_register_shards_twice() {
    let cluster = FakeCluster::new();
    let connections = manager(&cluster);
    let registrar = ShardRegistrar::new(&connections);
    let candidates = [
        shard_member("A", Some("rsA")),
        shard_member("B", Some("rsA")),
        shard_member("C", None),
    ];
    let reference = member("mongos", "10.0.0.1");

    let first = registrar.register_shards(&reference, &candidates).await;
    let second = registrar.register_shards(&reference, &candidates).await;

    assert!(first.is_success() && second.is_success());
    assert_eq!(second.steps.len(), 2);
    assert_eq!(
        cluster.shards(),
        ["rsA/A.example:27018,B.example:27018,", "C.example:27018"]
    );
    assert_eq!(cluster.received_named("addShard").len(), 4);
}

#[tokio::test]
async fn test_one_refused_shard_does_not_stop_the_rest() {
    let cluster = FakeCluster::new();
    cluster.script(
        "addShard",
        Ok(doc! { "ok": 0.0, "errmsg": "can't add shard: host unreachable", "code": 96 }),
    );
    let connections = manager(&cluster);

    let outcome = ShardRegistrar::new(&connections)
        .register_shards(
            &member("mongos", "10.0.0.1"),
            &[shard_member("A", None), shard_member("B", None)],
        )
        .await;

    assert_eq!(outcome.status(), Status::Failed);
    assert_eq!(outcome.steps[0].status, Status::Failed);
    assert_eq!(outcome.steps[1].status, Status::Applied);
    assert_eq!(cluster.shards(), ["B.example:27018"]);
}

#[tokio::test]
async fn test_enable_sharding_is_idempotent() {
    let cluster = FakeCluster::new();
    let connections = manager(&cluster);
    let configurator = ShardingConfigurator::new(&connections);
    let reference = member("mongos", "10.0.0.1");
    let collections = vec![
        ("app.users".to_string(), ShardKey::from("user_id")),
        ("app.events".to_string(), ShardKey::Compound(doc! { "tenant": 1, "ts": -1 })),
        ("metrics.samples".to_string(), ShardKey::from("host")),
    ];

    let first = configurator.enable_sharding(&reference, &collections).await;
    assert_eq!(first.status(), Status::Applied);
    let databases = cluster.sharded_databases();
    let sharded = cluster.sharded_collections();

    let second = configurator.enable_sharding(&reference, &collections).await;
    assert_eq!(second.status(), Status::Unchanged);
    assert_eq!(cluster.sharded_databases(), databases);
    assert_eq!(cluster.sharded_collections(), sharded);

    assert_eq!(databases.len(), 2);
    assert_eq!(sharded["app.users"], doc! { "user_id": 1 });
    assert_eq!(sharded["app.events"], doc! { "tenant": 1, "ts": -1 });
    assert_eq!(cluster.received_named("enablesharding").len(), 4);
}

#[tokio::test]
async fn test_shardcollection_without_confirmation_is_reported() {
    let cluster = FakeCluster::new();
    cluster.script("shardcollection", Ok(doc! { "ok": 1.0 }));
    let connections = manager(&cluster);

    let outcome = ShardingConfigurator::new(&connections)
        .enable_sharding(
            &member("mongos", "10.0.0.1"),
            &[
                ("app.a".to_string(), ShardKey::from("x")),
                ("app.b".to_string(), ShardKey::from("y")),
            ],
        )
        .await;

    let statuses: Vec<Status> = outcome.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, [Status::Applied, Status::Failed, Status::Applied]);
    assert!(outcome.steps[1].message.contains("collectionsharded"));
}

#[tokio::test]
async fn test_empty_inputs_are_skipped() {
    let cluster = FakeCluster::new();
    let connections = manager(&cluster);
    let configurator = ShardingConfigurator::new(&connections);
    let reference = member("mongos", "10.0.0.1");

    assert_eq!(configurator.enable_sharding(&reference, &[]).await.status(), Status::Skipped);
    assert_eq!(configurator.create_indexes(&reference, &[]).await.status(), Status::Skipped);
    assert!(cluster.received().is_empty());
}

#[tokio::test]
async fn test_create_indexes_command_per_collection() {
    let cluster = FakeCluster::new();
    let connections = manager(&cluster);
    let configurator = ShardingConfigurator::new(&connections);
    let reference = member("mongos", "10.0.0.1");

    let mut email = IndexSpec::new(ShardKey::from("email"));
    email.name = Some("email_1".to_string());
    email.unique = Some(true);
    email.drop_dups = Some(true);
    let indexes = vec![
        ("app.users".to_string(), vec![email]),
        ("logs.system.events".to_string(), vec![IndexSpec::new(ShardKey::from("ts"))]),
        ("nodots".to_string(), vec![IndexSpec::new(ShardKey::from("x"))]),
    ];

    let outcome = configurator.create_indexes(&reference, &indexes).await;
    let statuses: Vec<Status> = outcome.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, [Status::Applied, Status::Applied, Status::Failed]);

    let sent = cluster.received_named("createIndexes");
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].database, "app");
    assert_eq!(
        sent[0].command,
        doc! {
            "createIndexes": "users",
            "indexes": [
                { "name": "email_1", "key": { "email": 1 }, "unique": true, "dropDups": true },
            ],
        }
    );
    assert_eq!(sent[1].database, "logs");
    assert_eq!(sent[1].command.get_str("createIndexes").unwrap(), "system.events");

    let again = configurator.create_indexes(&reference, &indexes[..2]).await;
    assert_eq!(again.status(), Status::Unchanged);
}

#[tokio::test]
async fn test_index_timeout_is_recorded_and_processing_continues() {
    let cluster = FakeCluster::new();
    for _ in 0..4 {
        cluster.script(
            "createIndexes",
            Err(converge_core::Error::transport("operation timed out")),
        );
    }
    let connections = manager(&cluster);

    let outcome = ShardingConfigurator::new(&connections)
        .create_indexes(
            &member("mongos", "10.0.0.1"),
            &[
                ("app.a".to_string(), vec![IndexSpec::new(ShardKey::from("x"))]),
                ("app.b".to_string(), vec![IndexSpec::new(ShardKey::from("y"))]),
            ],
        )
        .await;

    assert_eq!(outcome.steps[0].status, Status::Failed);
    assert!(outcome.steps[0].message.contains("re-run"));
    assert_eq!(outcome.steps[1].status, Status::Applied);
}

#[tokio::test]
async fn test_transient_refusal_is_retried() {
    let cluster = FakeCluster::new();
    cluster.script(
        "enablesharding",
        Ok(doc! { "ok": 0.0, "errmsg": "not master", "code": 10107 }),
    );
    let connections = manager(&cluster);
    let session = connections.connect(&["localhost:27017".to_string()]).await.unwrap();
    let executor = CommandExecutor::new(RetryConfig::new(3, std::time::Duration::ZERO));

    let reply = executor
        .execute_with_retry(session.as_ref(), "admin", doc! { "enablesharding": "app" })
        .await
        .unwrap();

    assert!(reply.is_ok());
    assert_eq!(cluster.received_named("enablesharding").len(), 2);
}
