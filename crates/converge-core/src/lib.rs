//! converge-core: desired-state reconciliation for MongoDB clusters
//!
//! Each run takes an [`inventory::Inventory`] snapshot and drives the live
//! cluster towards it with idempotent administrative commands:
//!
//! - [`replset`]: initiate or reconfigure a replica set
//! - [`shards`]: register replica sets and standalones as shards
//! - [`sharding`]: enable sharding on databases and collections, create indexes
//! - [`users`]: provision users
//!
//! Every component reports an [`outcome::Outcome`] instead of failing, so a
//! caller can run them all and decide afterwards. Re-running against a
//! converged cluster changes nothing.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │  replset │ shards │ sharding (+indexes) │ users  │
//! └──────────────────────┬───────────────────────────┘
//!                        │ Outcome
//! ┌──────────────────────┴───────────────────────────┐
//! │        executor (retry) + classify (errmsg)      │
//! └──────────────────────┬───────────────────────────┘
//!                        │
//! ┌──────────────────────┴───────────────────────────┐
//! │   connection (Connector / Session, auth fallback)│
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```no_run
//! use converge_core::connection::{ConnectionManager, ConnectionSettings, MongoConnector};
//! use converge_core::shards::ShardRegistrar;
//! # async fn run(inventory: converge_core::inventory::Inventory) -> converge_core::Result<()> {
//! let connections = ConnectionManager::new(MongoConnector, ConnectionSettings::default());
//! let outcome = ShardRegistrar::new(&connections)
//!     .register_shards(&inventory.reference()?, &inventory.shard_members()?)
//!     .await;
//! assert!(outcome.is_success());
//! # Ok(())
//! # }
//! ```

#![warn(clippy::all)]

pub mod classify;
pub mod connection;
pub mod error;
pub mod executor;
pub mod inventory;
pub mod outcome;
pub mod replset;
pub mod retry;
pub mod shards;
pub mod sharding;
pub mod users;

pub use error::{Error, Result};
pub use outcome::{Component, Outcome, Status, Step};
