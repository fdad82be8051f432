//! Administrative command execution

use crate::classify::{ServerErrorClass, classify_reply};
use crate::connection::Session;
use crate::retry::{RetryConfig, retry};
use crate::{Error, Result};
use mongodb::bson::{Bson, Document};
use std::fmt;

/// The single result document of an administrative command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandReply {
    document: Document,
}

impl CommandReply {
    /// Wrap a result document
    pub fn new(document: Document) -> Self {
        Self { document }
    }

    /// `ok` flag, accepting any numeric or boolean encoding
    pub fn is_ok(&self) -> bool {
        match self.document.get("ok") {
            Some(Bson::Double(v)) => *v == 1.0,
            Some(Bson::Int32(v)) => *v == 1,
            Some(Bson::Int64(v)) => *v == 1,
            Some(Bson::Boolean(v)) => *v,
            _ => false,
        }
    }

    /// The `errmsg` field
    pub fn errmsg(&self) -> Option<&str> {
        self.document.get_str("errmsg").ok()
    }

    /// The `code` field
    pub fn code(&self) -> Option<i32> {
        match self.document.get("code") {
            Some(Bson::Int32(v)) => Some(*v),
            Some(Bson::Int64(v)) => i32::try_from(*v).ok(),
            Some(Bson::Double(v)) => Some(*v as i32),
            _ => None,
        }
    }

    /// Look up a field of the result
    pub fn get(&self, key: &str) -> Option<&Bson> {
        self.document.get(key)
    }

    /// Raw result document
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// Consume into the raw document
    pub fn into_document(self) -> Document {
        self.document
    }

    /// Convert a non-ok reply into `Error::Server`
    pub fn into_error(self) -> Error {
        Error::server(
            self.code(),
            self.errmsg().unwrap_or("command failed without errmsg"),
        )
    }
}

impl fmt::Display for CommandReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.document)
    }
}

/// Sends commands to a database through an open session
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandExecutor {
    retry: RetryConfig,
}

impl CommandExecutor {
    /// Create an executor with the given retry policy
    pub fn new(retry: RetryConfig) -> Self {
        Self { retry }
    }

    /// The retry policy used by `execute_with_retry`
    pub fn retry_config(&self) -> &RetryConfig {
        &self.retry
    }

    /// Run one command once
    pub async fn execute(
        &self,
        session: &dyn Session,
        database: &str,
        command: Document,
    ) -> Result<CommandReply> {
        tracing::debug!("{} -> {}.$cmd {}", session.endpoint(), database, command);
        let reply = CommandReply::new(session.run_command(database, command).await?);
        tracing::debug!("{} <- {}", session.endpoint(), reply);
        Ok(reply)
    }

    /// Run one command under the retry policy
    ///
    /// Transport failures and transient refusals are retried; any other reply,
    /// ok or not, is returned to the caller to interpret.
    pub async fn execute_with_retry(
        &self,
        session: &dyn Session,
        database: &str,
        command: Document,
    ) -> Result<CommandReply> {
        let outcome = retry(&self.retry, || {
            let command = command.clone();
            async move {
                let reply = self.execute(session, database, command).await?;
                match classify_reply(&reply) {
                    Some(ServerErrorClass::Transient) => Err(reply.into_error()),
                    _ => Ok(reply),
                }
            }
        })
        .await;

        match outcome {
            Ok(reply) => Ok(reply),
            // Budget spent on refusals: hand back the last reply itself.
            Err(Error::Server { code, message }) => {
                let mut document = Document::new();
                document.insert("ok", 0);
                document.insert("errmsg", message);
                if let Some(code) = code {
                    document.insert("code", code);
                }
                Ok(CommandReply::new(document))
            }
            Err(err) => Err(err),
        }
    }
}
