//! Role based access control over the policy service's data API.
//!
//! Every operation first asks the `rbac/manage/allow` policy whether the
//! session may manage bindings.
use crate::client::Client;
use crate::errors::ClientError;
use crate::session::Session;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

const AUTHZ_PATH: &str = "rbac/manage/allow";
const ROLES_PATH: &str = "rbac/roles";

// Tenant and user ids end up as single segments of the data path, so
// anything URL parsing would split, resolve or strip is refused.
fn segment(value: &str) -> Result<&str, RbacError> {
    let reserved = |c: char| matches!(c, '/' | '\\' | '?' | '#' | '%') || c.is_control();
    if value.is_empty() || value == "." || value == ".." || value.contains(reserved) {
        return Err(RbacError::InvalidSegment(value.to_string()));
    }
    Ok(value)
}

fn bindings_path(tenant: &str) -> Result<String, RbacError> {
    Ok(format!("rbac/user_bindings/{}", segment(tenant)?))
}

fn binding_path(tenant: &str, user: &User) -> Result<String, RbacError> {
    Ok(format!("{}/{}", bindings_path(tenant)?, segment(&user.id)?))
}

#[derive(thiserror::Error, Debug)]
pub enum RbacError {
    #[error("permission denied")]
    PermissionDenied,

    #[error("invalid tenant or user id: {0:?}")]
    InvalidSegment(String),

    #[error(transparent)]
    Client(#[from] ClientError),
}

#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq, Hash)]
pub struct User {
    pub id: String,
}

impl User {
    pub fn new(id: impl Into<String>) -> Self {
        User { id: id.into() }
    }
}

#[derive(Clone, Debug, Default, Deserialize, Serialize, PartialEq, Eq)]
pub struct UserBinding {
    pub id: String,
    pub roles: Vec<String>,
}

#[derive(Clone)]
pub struct Rbac {
    client: Client,
}

impl Rbac {
    pub fn new(client: Client) -> Self {
        Rbac { client }
    }

    pub async fn get_roles(&self, session: &Session) -> Result<Vec<String>, RbacError> {
        self.authorize(session).await?;

        let roles: Option<Vec<String>> = self.client.query(ROLES_PATH, &Value::Null).await?;
        Ok(roles.unwrap_or_default())
    }

    /// Every binding of the session's tenant, ordered by user id.
    pub async fn list_user_bindings_all(
        &self,
        session: &Session,
    ) -> Result<Vec<UserBinding>, RbacError> {
        let path = bindings_path(&session.tenant)?;
        self.authorize(session).await?;

        let bindings = self.tenant_bindings(&path).await?;
        Ok(bindings
            .into_iter()
            .map(|(id, roles)| UserBinding { id, roles })
            .collect())
    }

    /// One binding per user in `users`, in the same order. Users without a
    /// binding get an empty role list.
    pub async fn list_user_bindings(
        &self,
        session: &Session,
        users: &[User],
    ) -> Result<Vec<UserBinding>, RbacError> {
        let path = bindings_path(&session.tenant)?;
        self.authorize(session).await?;

        let mut bindings = self.tenant_bindings(&path).await?;
        Ok(users
            .iter()
            .map(|user| UserBinding {
                id: user.id.clone(),
                roles: bindings.remove(&user.id).unwrap_or_default(),
            })
            .collect())
    }

    pub async fn get_user_binding(
        &self,
        session: &Session,
        user: &User,
    ) -> Result<UserBinding, RbacError> {
        let path = binding_path(&session.tenant, user)?;
        self.authorize(session).await?;

        let roles: Option<Vec<String>> = self.client.get_data(&path).await?;

        Ok(UserBinding {
            id: user.id.clone(),
            roles: roles.unwrap_or_default(),
        })
    }

    pub async fn put_user_binding(
        &self,
        session: &Session,
        user: &User,
        roles: &[String],
    ) -> Result<(), RbacError> {
        let path = binding_path(&session.tenant, user)?;
        self.authorize(session).await?;

        self.client.put_data(&path, roles).await?;
        Ok(())
    }

    pub async fn delete_user_binding(&self, session: &Session, user: &User) -> Result<(), RbacError> {
        let path = binding_path(&session.tenant, user)?;
        self.authorize(session).await?;

        self.client.delete_data(&path).await?;
        Ok(())
    }

    async fn tenant_bindings(&self, path: &str) -> Result<BTreeMap<String, Vec<String>>, RbacError> {
        let bindings: Option<BTreeMap<String, Vec<String>>> = self.client.get_data(path).await?;
        Ok(bindings.unwrap_or_default())
    }

    // An error of the check itself also denies.
    async fn authorize(&self, session: &Session) -> Result<(), RbacError> {
        match self.client.check(AUTHZ_PATH, session).await {
            Ok(true) => Ok(()),
            Ok(false) => Err(RbacError::PermissionDenied),
            Err(e) => {
                tracing::warn!(
                    tenant = %session.tenant,
                    error = %e,
                    "RBAC authorization check failed"
                );
                Err(RbacError::PermissionDenied)
            }
        }
    }
}
