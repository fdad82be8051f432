//! Connections to cluster members
//!
//! The cluster may be half-formed while it is being reconciled, so every
//! connection is direct: one candidate at a time, never topology discovery.
//! [`Connector`] and [`Session`] keep the wire driver behind a seam; the
//! production implementation is [`MongoConnector`].

use crate::retry::{RetryConfig, retry};
use crate::{Error, Result};
use async_trait::async_trait;
use mongodb::bson::{Bson, Document, doc};
use mongodb::error::ErrorKind;
use mongodb::options::{
    ClientOptions, Credential, ReadPreference, SelectionCriteria, ServerAddress,
};
use mongodb::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Administrator credentials
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    /// Authentication database
    #[serde(default = "default_auth_source")]
    pub source: String,
}

fn default_auth_source() -> String {
    "admin".to_string()
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            source: default_auth_source(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("source", &self.source)
            .finish()
    }
}

/// How to reach the cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionSettings {
    /// Host the reference node is reached at from this process
    pub local_host: String,
    /// Whether the cluster requires authentication
    pub auth: bool,
    /// Credentials tried first when `auth` is on
    pub credentials: Option<Credentials>,
    /// Server selection timeout
    pub server_selection_timeout: Duration,
    /// TCP connect timeout
    pub connect_timeout: Duration,
    /// Retry policy for connects and commands
    pub retry: RetryConfig,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            local_host: "localhost".to_string(),
            auth: false,
            credentials: None,
            server_selection_timeout: Duration::from_secs(3),
            connect_timeout: Duration::from_secs(1),
            retry: RetryConfig::default(),
        }
    }
}

impl ConnectionSettings {
    /// Credentials to try, if authentication applies
    pub fn active_credentials(&self) -> Option<&Credentials> {
        if self.auth { self.credentials.as_ref() } else { None }
    }
}

/// An open connection to one member
#[async_trait]
pub trait Session: Send + Sync {
    /// `host:port` this session talks to
    fn endpoint(&self) -> &str;

    /// Names of all databases; used to verify a fresh connection
    async fn list_database_names(&self) -> Result<Vec<String>>;

    /// Run a command and return its reply document
    ///
    /// A server refusal comes back as `Ok` with an `{ok: 0, errmsg}` document;
    /// `Err` means the command's fate is unknown (network, timeout, auth).
    async fn run_command(&self, database: &str, command: Document) -> Result<Document>;

    /// First document of `database.collection` matching `filter`
    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>>;
}

/// Opens sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open an unverified session to `host`
    async fn open(
        &self,
        host: &str,
        credentials: Option<&Credentials>,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn Session>>;
}

/// Connects to candidate endpoints with retry and auth fallback
pub struct ConnectionManager<C: Connector> {
    connector: C,
    settings: ConnectionSettings,
}

impl<C: Connector> ConnectionManager<C> {
    /// Create a manager
    pub fn new(connector: C, settings: ConnectionSettings) -> Self {
        Self {
            connector,
            settings,
        }
    }

    /// Connection settings in use
    pub fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    /// Executor sharing this manager's retry policy
    pub fn executor(&self) -> crate::executor::CommandExecutor {
        crate::executor::CommandExecutor::new(self.settings.retry)
    }

    /// `local_host:port` of the reference node
    pub fn local_endpoint(&self, port: u16) -> String {
        format!("{}:{}", self.settings.local_host, port)
    }

    /// Connect to the first reachable candidate, in order
    pub async fn connect(&self, hosts: &[String]) -> Result<Box<dyn Session>> {
        self.connect_with(hosts, false).await
    }

    /// Connect preferring the writable primary among the candidates
    ///
    /// Falls back to the first reachable candidate when none reports itself
    /// primary.
    pub async fn connect_primary(&self, hosts: &[String]) -> Result<Box<dyn Session>> {
        self.connect_with(hosts, true).await
    }

    async fn connect_with(&self, hosts: &[String], prefer_primary: bool) -> Result<Box<dyn Session>> {
        if hosts.is_empty() {
            return Err(Error::connection("no candidate endpoints to connect to"));
        }

        retry(&self.settings.retry, || self.connect_once(hosts, prefer_primary))
            .await
            .map_err(|e| match e {
                Error::Connection(_) => e,
                other => Error::connection(format!("{}: {}", hosts.join(","), other)),
            })
    }

    async fn connect_once(&self, hosts: &[String], prefer_primary: bool) -> Result<Box<dyn Session>> {
        let mut fallback: Option<Box<dyn Session>> = None;
        let mut last_error = None;

        for host in hosts {
            let session = match self.open_verified(host).await {
                Ok(session) => session,
                Err(e) => {
                    tracing::debug!("candidate {} unreachable: {}", host, e);
                    last_error = Some(e);
                    continue;
                }
            };

            if !prefer_primary || is_writable_primary(session.as_ref()).await {
                return Ok(session);
            }
            if fallback.is_none() {
                fallback = Some(session);
            }
        }

        if let Some(session) = fallback {
            tracing::warn!(
                "no primary among {}, using {}",
                hosts.join(","),
                session.endpoint()
            );
            return Ok(session);
        }

        Err(last_error.unwrap_or_else(|| Error::connection("no candidate reachable")))
    }

    /// Open and verify one endpoint: with credentials first when auth is on,
    /// then without them (auth may not be enabled yet on a fresh set)
    async fn open_verified(&self, host: &str) -> Result<Box<dyn Session>> {
        if let Some(credentials) = self.settings.active_credentials() {
            match self.try_open(host, Some(credentials)).await {
                Ok(session) => return Ok(session),
                Err(e) => {
                    tracing::debug!(
                        "authenticated connect to {} failed ({}), retrying without credentials",
                        host,
                        e
                    );
                }
            }
        }
        self.try_open(host, None).await
    }

    async fn try_open(&self, host: &str, credentials: Option<&Credentials>) -> Result<Box<dyn Session>> {
        let session = self.connector.open(host, credentials, &self.settings).await?;
        session.list_database_names().await?;
        Ok(session)
    }
}

async fn is_writable_primary(session: &dyn Session) -> bool {
    match session.run_command("admin", doc! { "isMaster": 1 }).await {
        Ok(reply) => {
            matches!(reply.get("isWritablePrimary"), Some(Bson::Boolean(true)))
                || matches!(reply.get("ismaster"), Some(Bson::Boolean(true)))
        }
        Err(_) => false,
    }
}

/// [`Connector`] backed by the official driver
#[derive(Debug, Clone, Default)]
pub struct MongoConnector;

impl MongoConnector {
    fn client_options(
        host: &str,
        credentials: Option<&Credentials>,
        settings: &ConnectionSettings,
    ) -> Result<ClientOptions> {
        let address = ServerAddress::parse(host)
            .map_err(|e| Error::connection(format!("invalid address '{}': {}", host, e)))?;

        let mut options = ClientOptions::default();
        options.hosts = vec![address];
        options.direct_connection = Some(true);
        options.server_selection_timeout = Some(settings.server_selection_timeout);
        options.connect_timeout = Some(settings.connect_timeout);
        options.default_database = Some("admin".to_string());
        options.app_name = Some("mongo-converge".to_string());
        options.selection_criteria = Some(SelectionCriteria::ReadPreference(
            ReadPreference::SecondaryPreferred {
                options: Default::default(),
            },
        ));
        if let Some(creds) = credentials {
            let mut credential = Credential::default();
            credential.username = Some(creds.username.clone());
            credential.password = Some(creds.password.clone());
            credential.source = Some(creds.source.clone());
            options.credential = Some(credential);
        }
        Ok(options)
    }
}

#[async_trait]
impl Connector for MongoConnector {
    async fn open(
        &self,
        host: &str,
        credentials: Option<&Credentials>,
        settings: &ConnectionSettings,
    ) -> Result<Box<dyn Session>> {
        let options = Self::client_options(host, credentials, settings)?;
        let client = Client::with_options(options)
            .map_err(|e| Error::connection(format!("{}: {}", host, e)))?;
        Ok(Box::new(MongoSession {
            client,
            endpoint: host.to_string(),
        }))
    }
}

/// [`Session`] over a driver client
pub struct MongoSession {
    client: Client,
    endpoint: String,
}

impl MongoSession {
    fn map_error(&self, err: mongodb::error::Error) -> Error {
        match err.kind.as_ref() {
            ErrorKind::Authentication { message, .. } => {
                Error::connection(format!("{}: authentication failed: {}", self.endpoint, message))
            }
            ErrorKind::ServerSelection { message, .. } => {
                Error::connection(format!("{}: {}", self.endpoint, message))
            }
            _ => Error::transport(format!("{}: {}", self.endpoint, err)),
        }
    }
}

#[async_trait]
impl Session for MongoSession {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_database_names(&self) -> Result<Vec<String>> {
        self.client
            .list_database_names(None, None)
            .await
            .map_err(|e| self.map_error(e))
    }

    async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        match self.client.database(database).run_command(command, None).await {
            Ok(reply) => Ok(reply),
            Err(err) => match err.kind.as_ref() {
                // A refusal is an answer, not a lost command.
                ErrorKind::Command(command_error) => Ok(doc! {
                    "ok": 0,
                    "errmsg": command_error.message.clone(),
                    "code": command_error.code,
                    "codeName": command_error.code_name.clone(),
                }),
                _ => Err(self.map_error(err)),
            },
        }
    }

    async fn find_one(
        &self,
        database: &str,
        collection: &str,
        filter: Document,
    ) -> Result<Option<Document>> {
        self.client
            .database(database)
            .collection::<Document>(collection)
            .find_one(filter, None)
            .await
            .map_err(|e| self.map_error(e))
    }
}
