// Copyright 2024 Oxide Computer Company

//! Interface for route handlers and the auth metadata they declare
//!
//! A route's handler is whatever produces the route's result once routing,
//! negotiation, authorization, and pre-interceptors have all let the request
//! through.  Wicket doesn't care how the handler is built, only that it
//! implements [`RouteHandler`].  Handlers may also declare auth requirements
//! of their own through [`RouteMetadata`]; those are combined with whatever
//! the route configuration asks for (see [`crate::AuthConstraint`]).

use crate::error::HttpError;
use crate::request::RequestContext;
use crate::request::ResponseSink;
use async_trait::async_trait;
use std::fmt::Debug;
use std::sync::Arc;

/// Type alias for the result returned by route handlers.  `None` means the
/// handler wrote its response directly into the `ResponseSink`.
pub type HandlerResult = Result<Option<serde_json::Value>, HttpError>;

/// Produces the result for a matched route.
#[async_trait]
pub trait RouteHandler: Debug + Send + Sync {
    /// A short name for this handler, used in logs.
    fn label(&self) -> &str;

    /// Auth requirements declared by the handler itself.
    fn metadata(&self) -> Arc<dyn RouteMetadata> {
        Arc::new(StaticMetadata::default())
    }

    async fn handle(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> HandlerResult;
}

/// Auth requirements a handler declares about itself.
///
/// Implementations should be pure: the answers are read once and cached for
/// the life of the route.
pub trait RouteMetadata: Debug + Send + Sync {
    /// Whether callers must be logged in.
    fn requires_login(&self) -> bool {
        false
    }

    /// Whether the handler checks roles itself.  A roles-aware handler needs
    /// the caller's roles resolved but accepts any set of them.
    fn roles_aware(&self) -> bool {
        false
    }

    /// The role a caller must hold, if any.
    fn required_role(&self) -> Option<String> {
        None
    }
}

/// `RouteMetadata` with fixed answers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StaticMetadata {
    pub requires_login: bool,
    pub roles_aware: bool,
    pub required_role: Option<String>,
}

impl StaticMetadata {
    pub fn requiring_login() -> Self {
        StaticMetadata { requires_login: true, ..Default::default() }
    }

    pub fn requiring_role(role: &str) -> Self {
        StaticMetadata {
            required_role: Some(role.to_string()),
            ..Default::default()
        }
    }

    pub fn checking_roles() -> Self {
        StaticMetadata { roles_aware: true, ..Default::default() }
    }
}

impl RouteMetadata for StaticMetadata {
    fn requires_login(&self) -> bool {
        self.requires_login
    }

    fn roles_aware(&self) -> bool {
        self.roles_aware
    }

    fn required_role(&self) -> Option<String> {
        self.required_role.clone()
    }
}
