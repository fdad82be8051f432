//! Classification of free-text server errors
//!
//! The server signals "nothing to do" states only through its `errmsg`
//! wording, which has changed between server releases. All matching lives
//! here so it can be checked against the deployed server in one place.

use crate::executor::CommandReply;
use regex::Regex;
use std::sync::LazyLock;

/// Server code for `AlreadyInitialized`
pub const ALREADY_INITIALIZED_CODE: i32 = 23;

static ALREADY_INITIATED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\S+) is already initiated").expect("valid regex"));

static ALREADY_INITIALIZED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)already initialized").expect("valid regex"));

static ALREADY_EXISTS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)already exists").expect("valid regex"));

static TRANSIENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)not ?master|not ?primary|notwritableprimary|node is recovering|interrupted|timed? ?out|connection (reset|refused|closed)|network|socket",
    )
    .expect("valid regex")
});

/// A state the server reports as an error although the desired change is
/// already in place
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlreadyDoneKind {
    /// `replSetInitiate` on an initiated set; `responder` is the `host:port`
    /// named in the message, if any
    ReplicaSetInitiated {
        /// Member that answered for the existing set
        responder: Option<String>,
    },
    /// `enablesharding` on a database that already has it
    ShardingEnabled,
    /// `shardcollection` on a sharded collection
    CollectionSharded,
    /// `createUser` for an existing user
    UserExists,
}

/// Coarse class of a server error message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerErrorClass {
    /// Desired state already reached
    AlreadyDone(AlreadyDoneKind),
    /// Worth retrying
    Transient,
    /// Anything else
    Fatal,
}

/// Classify an `errmsg` string
pub fn classify_server_error(errmsg: &str) -> ServerErrorClass {
    if let Some(caps) = ALREADY_INITIATED.captures(errmsg) {
        return ServerErrorClass::AlreadyDone(AlreadyDoneKind::ReplicaSetInitiated {
            responder: caps.get(1).map(|m| m.as_str().to_string()),
        });
    }
    if ALREADY_INITIALIZED.is_match(errmsg) {
        return ServerErrorClass::AlreadyDone(AlreadyDoneKind::ReplicaSetInitiated {
            responder: None,
        });
    }

    if errmsg == "already enabled" {
        return ServerErrorClass::AlreadyDone(AlreadyDoneKind::ShardingEnabled);
    }
    if errmsg == "already sharded" {
        return ServerErrorClass::AlreadyDone(AlreadyDoneKind::CollectionSharded);
    }
    if ALREADY_EXISTS.is_match(errmsg) {
        return ServerErrorClass::AlreadyDone(AlreadyDoneKind::UserExists);
    }

    if TRANSIENT.is_match(errmsg) {
        return ServerErrorClass::Transient;
    }

    ServerErrorClass::Fatal
}

/// Classify a non-ok reply, using its code where the message is not enough
///
/// Returns `None` for ok replies.
pub fn classify_reply(reply: &CommandReply) -> Option<ServerErrorClass> {
    if reply.is_ok() {
        return None;
    }

    let class = classify_server_error(reply.errmsg().unwrap_or_default());
    if class == ServerErrorClass::Fatal && reply.code() == Some(ALREADY_INITIALIZED_CODE) {
        return Some(ServerErrorClass::AlreadyDone(
            AlreadyDoneKind::ReplicaSetInitiated { responder: None },
        ));
    }
    Some(class)
}
