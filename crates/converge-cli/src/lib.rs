//! converge-cli: configuration, inventory loading and orchestration for the
//! `mongo-converge` binary

pub mod config;
pub mod inventory;
pub mod orchestrate;
