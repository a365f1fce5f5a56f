// Copyright 2024 Oxide Computer Company

//! Interfaces for the services that authenticate and authorize requests
//!
//! Wicket doesn't know how users log in or where roles come from.  An
//! application supplies an [`AuthenticationProvider`] and an
//! [`AuthorizationProvider`], and the protected-resource decorator calls them
//! in that order for each request to a protected route.

use super::identity::Roles;
use super::identity::User;
use crate::request::RequestInfo;
use async_trait::async_trait;
use http::StatusCode;
use std::fmt::Debug;

/// Failure reported by an authentication or authorization provider.
///
/// `Internal` failures are bugs or misconfiguration inside the provider and
/// are reported to the client as a 500.  `External` failures come from some
/// service the provider depends on (a directory server, an identity
/// provider) and carry the status the client should see, usually 503 or 504.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AuthProviderError {
    #[error("{message}")]
    Internal { message: String },
    #[error("{message}")]
    External { message: String, status: StatusCode },
}

impl AuthProviderError {
    pub fn internal<S: Into<String>>(message: S) -> Self {
        AuthProviderError::Internal { message: message.into() }
    }

    /// An upstream dependency could not be reached (503).
    pub fn unavailable<S: Into<String>>(message: S) -> Self {
        AuthProviderError::External {
            message: message.into(),
            status: StatusCode::SERVICE_UNAVAILABLE,
        }
    }

    /// An upstream dependency did not answer in time (504).
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        AuthProviderError::External {
            message: message.into(),
            status: StatusCode::GATEWAY_TIMEOUT,
        }
    }

    pub fn external<S: Into<String>>(message: S, status: StatusCode) -> Self {
        AuthProviderError::External { message: message.into(), status }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AuthProviderError::Internal { .. } => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AuthProviderError::External { status, .. } => *status,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            AuthProviderError::Internal { message }
            | AuthProviderError::External { message, .. } => message,
        }
    }
}

/// Establishes who is making a request.
#[async_trait]
pub trait AuthenticationProvider: Debug + Send + Sync {
    /// Returns the user making `request`, or `None` if the request carries no
    /// acceptable credentials.
    async fn authenticate(
        &self,
        request: &RequestInfo,
    ) -> Result<Option<User>, AuthProviderError>;

    /// Where to send an unauthenticated browser so that it can log in.
    fn login_uri(&self, request: &RequestInfo) -> String;

    /// The `WWW-Authenticate` challenges to offer with a 401.  Must not be
    /// empty for routes that send challenges instead of redirecting.
    fn challenges_for(&self, request: &RequestInfo) -> Vec<String>;

    /// The status used when redirecting to the login URI.
    fn login_redirect_status(&self) -> StatusCode {
        StatusCode::FOUND
    }
}

/// Determines which roles an authenticated user holds.
#[async_trait]
pub trait AuthorizationProvider: Debug + Send + Sync {
    /// Returns the roles held by `user`, or `None` if the provider knows
    /// nothing about them.  `request` is the request being authorized.
    async fn roles(
        &self,
        user: &User,
        request: &RequestInfo,
    ) -> Result<Option<Roles>, AuthProviderError>;
}

#[cfg(test)]
mod test {
    use super::AuthProviderError;
    use http::StatusCode;

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AuthProviderError::internal("bug").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            AuthProviderError::unavailable("ldap down").status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AuthProviderError::timeout("idp slow").status(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            AuthProviderError::external("teapot", StatusCode::IM_A_TEAPOT)
                .status(),
            StatusCode::IM_A_TEAPOT
        );
    }
}
