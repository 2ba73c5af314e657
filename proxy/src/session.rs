//! Derives the [`Session`] an incoming request is made on behalf of.
use axum::http::header::COOKIE;
use axum::http::request::Parts;
use policy_client::Session;
use std::sync::Arc;

const USER_COOKIE: &str = "user";

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum SessionError {
    #[error("missing user cookie")]
    MissingCookie,

    #[error("could not extract credentials")]
    InvalidCredentials,
}

pub trait SessionSource: Send + Sync {
    fn session(&self, parts: &Parts) -> Result<Session, SessionError>;
}

impl<F> SessionSource for F
where
    F: Fn(&Parts) -> Result<Session, SessionError> + Send + Sync,
{
    fn session(&self, parts: &Parts) -> Result<Session, SessionError> {
        self(parts)
    }
}

/// Every request gets the same session.
pub fn from_values(tenant: impl Into<String>, subject: impl Into<String>) -> Arc<dyn SessionSource> {
    let session = Session::new(tenant, subject);
    Arc::new(move |_parts: &Parts| Ok::<_, SessionError>(session.clone()))
}

/// Reads a `user=<tenant>/<subject>` cookie.
pub fn from_cookie() -> Arc<dyn SessionSource> {
    Arc::new(|parts: &Parts| {
        let value = user_cookie(parts).ok_or(SessionError::MissingCookie)?;
        parse_user(value)
    })
}

/// Uses a [`Session`] that a middleware in front of the proxy routes put into
/// the request extensions.
pub fn from_extensions() -> Arc<dyn SessionSource> {
    Arc::new(|parts: &Parts| {
        parts
            .extensions
            .get::<Session>()
            .filter(|s| !s.tenant.is_empty() && !s.subject.is_empty())
            .cloned()
            .ok_or(SessionError::InvalidCredentials)
    })
}

fn user_cookie(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|header| header.to_str().ok())
        .flat_map(|header| header.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == USER_COOKIE)
        .map(|(_, value)| value.trim_matches('"'))
}

fn parse_user(value: &str) -> Result<Session, SessionError> {
    let mut halves = value.split('/');
    let (Some(tenant), Some(subject), None) = (halves.next(), halves.next(), halves.next()) else {
        return Err(SessionError::InvalidCredentials);
    };

    let (tenant, subject) = (tenant.trim(), subject.trim());
    if tenant.is_empty() || subject.is_empty() {
        return Err(SessionError::InvalidCredentials);
    }

    Ok(Session::new(tenant, subject))
}
