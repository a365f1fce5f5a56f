// Copyright 2024 Oxide Computer Company

//! The decorator that puts authentication and authorization in front of a
//! route
//!
//! A [`ProtectedResource`] stands in for any route whose [`AuthConstraint`]
//! requires authentication.  In the pre-interceptor phase it:
//!
//! 1. asks the [`AuthenticationProvider`] who is calling.  With nobody
//!    logged in, the caller is redirected to the provider's login URI, or
//!    sent a 401 with the provider's challenges if the route asks for that.
//! 2. if the route needs roles, asks the [`AuthorizationProvider`] for the
//!    caller's roles and checks them against the constraint, answering 403
//!    when they fall short.
//! 3. attaches the caller's [`Identity`] to the request and runs the wrapped
//!    resource's pre-interceptors.
//!
//! A provider failure is written to the response here (500 for internal
//! failures, the provider's own status otherwise) and goes no further.
//! Requests turned away never reach the wrapped resource's pre-interceptors
//! or its handler, but its post-interceptors always run.

use super::constraint::AuthConstraint;
use super::identity::Identity;
use super::identity::Roles;
use super::provider::AuthProviderError;
use super::provider::AuthenticationProvider;
use super::provider::AuthorizationProvider;
use crate::error::HttpError;
use crate::handler::HandlerResult;
use crate::mime::MimeNegotiator;
use crate::mime::SupportedMimeTypes;
use crate::request::RequestContext;
use crate::request::RequestInfo;
use crate::request::ResponseSink;
use crate::resource::AuthState;
use crate::resource::PreOutcome;
use crate::resource::UriResource;
use async_trait::async_trait;
use slog::debug;
use slog::warn;
use std::sync::Arc;

/// The providers consulted by protected routes.
#[derive(Clone, Debug)]
pub struct AuthProviders {
    pub authentication: Arc<dyn AuthenticationProvider>,
    pub authorization: Arc<dyn AuthorizationProvider>,
}

impl AuthProviders {
    pub fn new(
        authentication: Arc<dyn AuthenticationProvider>,
        authorization: Arc<dyn AuthorizationProvider>,
    ) -> Self {
        AuthProviders { authentication, authorization }
    }
}

/// Outcome of authenticating (and maybe authorizing) one request.
#[derive(Debug)]
enum AuthCheck {
    Authorized(Identity),
    Rejected(AuthState),
}

/// Wraps a resource so that only authenticated (and, where required,
/// authorized) callers get through to it.
#[derive(Debug)]
pub struct ProtectedResource {
    inner: Arc<dyn UriResource>,
    constraint: Arc<AuthConstraint>,
    providers: AuthProviders,
}

impl ProtectedResource {
    pub fn new(
        inner: Arc<dyn UriResource>,
        constraint: Arc<AuthConstraint>,
        providers: AuthProviders,
    ) -> Self {
        ProtectedResource { inner, constraint, providers }
    }

    pub fn constraint(&self) -> &AuthConstraint {
        &self.constraint
    }

    pub fn inner(&self) -> &Arc<dyn UriResource> {
        &self.inner
    }

    /// Runs authentication and, if needed, authorization.  A rejection has
    /// already been written to `response` when this returns.
    async fn check(
        &self,
        rqctx: &RequestContext,
        response: &mut ResponseSink,
    ) -> Result<AuthCheck, HttpError> {
        let request = &rqctx.request;
        let authn = &self.providers.authentication;

        let user = match authn.authenticate(request).await {
            Ok(user) => user,
            Err(error) => {
                warn!(rqctx.log, "authentication provider failed";
                    "error" => %error,
                    "status" => error.status().as_u16(),
                );
                write_provider_error(&error, response);
                return Ok(AuthCheck::Rejected(AuthState::ProviderError));
            }
        };

        let user = match user {
            Some(user) => user,
            None => {
                self.reject_unauthenticated(rqctx, response)?;
                return Ok(AuthCheck::Rejected(AuthState::Unauthenticated));
            }
        };

        if !self.constraint.requires_roles() {
            debug!(rqctx.log, "authenticated"; "user" => &user.name);
            let identity = Identity::new(user, Roles::none());
            return Ok(AuthCheck::Authorized(identity));
        }

        let roles =
            match self.providers.authorization.roles(&user, request).await {
                Ok(roles) => roles,
                Err(error) => {
                    warn!(rqctx.log, "authorization provider failed";
                        "user" => &user.name,
                        "error" => %error,
                        "status" => error.status().as_u16(),
                    );
                    write_provider_error(&error, response);
                    return Ok(AuthCheck::Rejected(AuthState::ProviderError));
                }
            };

        if !self.constraint.satisfied_by_roles(roles.as_ref()) {
            debug!(rqctx.log, "forbidden";
                "user" => &user.name,
                "required_role" => ?self.constraint.required_role(),
            );
            response.forbidden();
            return Ok(AuthCheck::Rejected(AuthState::Forbidden));
        }

        debug!(rqctx.log, "authorized"; "user" => &user.name);
        let roles = roles.unwrap_or_else(Roles::none);
        Ok(AuthCheck::Authorized(Identity::new(user, roles)))
    }

    fn reject_unauthenticated(
        &self,
        rqctx: &RequestContext,
        response: &mut ResponseSink,
    ) -> Result<(), HttpError> {
        let authn = &self.providers.authentication;
        let request = &rqctx.request;
        if self.constraint.redirect_to_login() {
            let login_uri = authn.login_uri(request);
            debug!(rqctx.log, "not logged in, redirecting";
                "login_uri" => &login_uri,
            );
            response.redirect_with_status(
                &login_uri,
                authn.login_redirect_status(),
            )
        } else {
            debug!(rqctx.log, "not logged in, sending challenge");
            response.unauthorized(&authn.challenges_for(request))
        }
    }
}

/// Internal failures answer 500; external ones carry their own status.
fn write_provider_error(
    error: &AuthProviderError,
    response: &mut ResponseSink,
) {
    response.text(error.status(), error.message());
}

#[async_trait]
impl UriResource for ProtectedResource {
    fn label(&self) -> String {
        format!("protected {}", self.inner.label())
    }

    fn requires_https(&self) -> bool {
        self.inner.requires_https()
    }

    fn https_uri(&self, request: &RequestInfo) -> Option<String> {
        self.inner.https_uri(request)
    }

    fn supported_mime_types(&self) -> &SupportedMimeTypes {
        self.inner.supported_mime_types()
    }

    fn negotiator(&self) -> &MimeNegotiator {
        self.inner.negotiator()
    }

    async fn apply_pre_interceptors(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<PreOutcome, HttpError> {
        match self.check(rqctx, response).await? {
            AuthCheck::Authorized(identity) => {
                rqctx.associate(identity);
                let inner =
                    self.inner.apply_pre_interceptors(rqctx, response).await?;
                Ok(PreOutcome {
                    proceed: inner.proceed,
                    auth: AuthState::Authorized,
                })
            }
            AuthCheck::Rejected(state) => Ok(PreOutcome::rejected(state)),
        }
    }

    async fn resolve(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
        outcome: &PreOutcome,
    ) -> HandlerResult {
        if outcome.auth != AuthState::Authorized {
            return Ok(None);
        }
        self.inner.resolve(rqctx, response, outcome).await
    }

    async fn apply_post_interceptors(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<bool, HttpError> {
        self.inner.apply_post_interceptors(rqctx, response).await
    }
}
