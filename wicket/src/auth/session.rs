// Copyright 2024 Oxide Computer Company

//! Session storage and providers that remember their answers in it
//!
//! Asking a directory who a user is and what roles they hold on every request
//! is expensive.  [`SessionBackedAuthentication`] and
//! [`SessionBackedAuthorization`] wrap the real providers and keep the answer
//! in the request's [`Session`], so the wrapped provider is only consulted the
//! first time.  Requests without a session always go to the wrapped provider.

use super::identity::Roles;
use super::identity::User;
use super::provider::AuthProviderError;
use super::provider::AuthenticationProvider;
use super::provider::AuthorizationProvider;
use crate::request::RequestInfo;
use async_trait::async_trait;
use http::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

/// Per-client key/value storage that outlives a single request.  How it is
/// persisted (cookies, a database, memory) is up to the transport.
pub trait Session: Send + Sync {
    fn has_value(&self, key: &str) -> bool;
    fn value(&self, key: &str) -> Option<serde_json::Value>;
    fn put_value(&self, key: &str, value: serde_json::Value);
}

/// A `Session` kept in process memory.
#[derive(Debug, Default)]
pub struct MemorySession {
    values: Mutex<BTreeMap<String, serde_json::Value>>,
}

impl MemorySession {
    pub fn new() -> Self {
        MemorySession::default()
    }

    fn values(
        &self,
    ) -> std::sync::MutexGuard<'_, BTreeMap<String, serde_json::Value>> {
        // A panic while holding the lock can't leave the map half-updated.
        match self.values.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Session for MemorySession {
    fn has_value(&self, key: &str) -> bool {
        self.values().contains_key(key)
    }

    fn value(&self, key: &str) -> Option<serde_json::Value> {
        self.values().get(key).cloned()
    }

    fn put_value(&self, key: &str, value: serde_json::Value) {
        self.values().insert(key.to_string(), value);
    }
}

const USER_KEY: &str = "wicket.user";
const ROLES_KEY_PREFIX: &str = "wicket.roles.";

fn cached<T: DeserializeOwned>(
    session: &Arc<dyn Session>,
    key: &str,
) -> Option<T> {
    if !session.has_value(key) {
        return None;
    }
    // A value that no longer deserializes (say, written by an older version)
    // is treated as absent and gets overwritten.
    session.value(key).and_then(|v| serde_json::from_value(v).ok())
}

fn store<T: Serialize>(
    session: &Arc<dyn Session>,
    key: &str,
    value: &T,
) -> Result<(), AuthProviderError> {
    let value = serde_json::to_value(value).map_err(|error| {
        AuthProviderError::internal(format!(
            "failed to store \"{}\" in session: {}",
            key, error
        ))
    })?;
    session.put_value(key, value);
    Ok(())
}

/// Remembers the authenticated user in the request's session.
#[derive(Debug)]
pub struct SessionBackedAuthentication<P> {
    inner: P,
}

impl<P: AuthenticationProvider> SessionBackedAuthentication<P> {
    pub fn new(inner: P) -> Self {
        SessionBackedAuthentication { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: AuthenticationProvider> AuthenticationProvider
    for SessionBackedAuthentication<P>
{
    async fn authenticate(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<User>, AuthProviderError> {
        let session = request.session();
        if let Some(user) = session.and_then(|s| cached::<User>(s, USER_KEY)) {
            return Ok(Some(user));
        }

        let user = self.inner.authenticate(request).await?;
        if let (Some(session), Some(user)) = (session, &user) {
            store(session, USER_KEY, user)?;
        }
        Ok(user)
    }

    fn login_uri(&self, request: &RequestInfo) -> String {
        self.inner.login_uri(request)
    }

    fn challenges_for(&self, request: &RequestInfo) -> Vec<String> {
        self.inner.challenges_for(request)
    }

    fn login_redirect_status(&self) -> StatusCode {
        self.inner.login_redirect_status()
    }
}

/// Remembers each user's roles in the request's session.
#[derive(Debug)]
pub struct SessionBackedAuthorization<P> {
    inner: P,
}

impl<P: AuthorizationProvider> SessionBackedAuthorization<P> {
    pub fn new(inner: P) -> Self {
        SessionBackedAuthorization { inner }
    }

    pub fn inner(&self) -> &P {
        &self.inner
    }
}

#[async_trait]
impl<P: AuthorizationProvider> AuthorizationProvider
    for SessionBackedAuthorization<P>
{
    async fn roles(
        &self,
        user: &User,
        request: &RequestInfo,
    ) -> Result<Option<Roles>, AuthProviderError> {
        let key = format!("{}{}", ROLES_KEY_PREFIX, user.name);
        let session = request.session();
        if let Some(roles) = session.and_then(|s| cached::<Roles>(s, &key)) {
            return Ok(Some(roles));
        }

        let roles = self.inner.roles(user, request).await?;
        if let (Some(session), Some(roles)) = (session, &roles) {
            store(session, &key, roles)?;
        }
        Ok(roles)
    }
}
