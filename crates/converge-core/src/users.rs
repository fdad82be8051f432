//! User provisioning

use crate::classify::{AlreadyDoneKind, ServerErrorClass, classify_reply};
use crate::connection::{ConnectionManager, Connector, Session};
use crate::executor::CommandExecutor;
use crate::inventory::{MemberRecord, UserSpec};
use crate::outcome::{Component, Outcome};
use crate::retry::retry_if;
use crate::Result;
use mongodb::bson::{Bson, Document, doc};

/// Database users are created in
pub const USER_DATABASE: &str = "admin";

/// `createUser` command for a user
pub fn create_user_command(spec: &UserSpec) -> Document {
    let roles: Vec<Bson> = spec
        .roles
        .iter()
        .map(|r| Bson::Document(doc! { "role": r.role.as_str(), "db": r.db.as_str() }))
        .collect();
    doc! {
        "createUser": spec.username.as_str(),
        "pwd": spec.password.as_str(),
        "roles": roles,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Created {
    New,
    Existing,
}

/// Creates users through the reference node
pub struct UserProvisioner<'a, C: Connector> {
    connections: &'a ConnectionManager<C>,
    executor: CommandExecutor,
}

impl<'a, C: Connector> UserProvisioner<'a, C> {
    pub fn new(connections: &'a ConnectionManager<C>) -> Self {
        Self {
            connections,
            executor: connections.executor(),
        }
    }

    /// Create one user; an existing user is left untouched
    pub async fn provision_user(&self, reference: &MemberRecord, spec: &UserSpec) -> Outcome {
        self.provision(reference, std::slice::from_ref(spec)).await
    }

    /// Create the administrator first when `auth` is on, then every listed user
    pub async fn provision_users(
        &self,
        reference: &MemberRecord,
        admin: &UserSpec,
        users: &[UserSpec],
        auth: bool,
    ) -> Outcome {
        let mut all = Vec::with_capacity(users.len() + 1);
        if auth {
            all.push(admin.clone());
        }
        all.extend(users.iter().filter(|u| !auth || u.username != admin.username).cloned());
        self.provision(reference, &all).await
    }

    async fn provision(&self, reference: &MemberRecord, users: &[UserSpec]) -> Outcome {
        let mut outcome = Outcome::new(Component::Users);
        let local = self.connections.local_endpoint(reference.port);

        if users.is_empty() {
            outcome.skipped(local, "no users to provision");
            return outcome;
        }

        let session = match self.connections.connect(std::slice::from_ref(&local)).await {
            Ok(session) => session,
            Err(e) => {
                outcome.error(local, &e);
                return outcome;
            }
        };

        for spec in users {
            match self.create_user(session.as_ref(), spec).await {
                Ok(Created::New) => outcome.applied(spec.username.as_str(), "user created"),
                Ok(Created::Existing) => {
                    outcome.unchanged(spec.username.as_str(), "user already exists")
                }
                Err(e) => outcome.error(spec.username.as_str(), &e),
            }
        }

        outcome
    }

    /// "already exists" ends the retry loop as success; any other refusal is
    /// retried until the policy runs out
    async fn create_user(&self, session: &dyn Session, spec: &UserSpec) -> Result<Created> {
        let command = create_user_command(spec);
        retry_if(self.executor.retry_config(), |_| true, || {
            let command = command.clone();
            async move {
                let reply = self.executor.execute(session, USER_DATABASE, command).await?;
                if reply.is_ok() {
                    return Ok(Created::New);
                }
                match classify_reply(&reply) {
                    Some(ServerErrorClass::AlreadyDone(AlreadyDoneKind::UserExists)) => {
                        Ok(Created::Existing)
                    }
                    _ => Err(reply.into_error()),
                }
            }
        })
        .await
    }
}
