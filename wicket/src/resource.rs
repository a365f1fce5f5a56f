// Copyright 2024 Oxide Computer Company

//! Resources: what a request is dispatched to once routing is done
//!
//! Every request ends up at some [`UriResource`].  Usually that's the
//! [`RouteResource`] for the route that matched, possibly wrapped by the
//! protected-resource decorator.  When nothing matches, it's one of the
//! [`FallbackResource`]s, which answer 404, 405, or `OPTIONS` on their own.
//!
//! The dispatcher drives a resource through the same sequence for every
//! request:
//!
//! 1. [`UriResource::negotiate_mime_type()`]
//! 2. [`UriResource::apply_pre_interceptors()`], which produces a
//!    [`PreOutcome`]
//! 3. [`UriResource::resolve()`], if the outcome says to proceed
//! 4. [`UriResource::apply_post_interceptors()`], always

use crate::error::HttpError;
use crate::handler::HandlerResult;
use crate::handler::RouteHandler;
use crate::interceptor::GlobalInterceptors;
use crate::interceptor::Interceptor;
use crate::interceptor::InterceptorChain;
use crate::mime::MimeNegotiator;
use crate::mime::SupportedMimeTypes;
use crate::request::RequestContext;
use crate::request::RequestInfo;
use crate::request::ResponseSink;
use crate::router::AllowedMethods;
use crate::router::MethodFilter;
use crate::uri_path::UriPathTemplate;
use async_trait::async_trait;
use http::header;
use http::StatusCode;
use slog::debug;
use std::fmt::Debug;
use std::sync::Arc;

/// Where a request stands with respect to authentication and authorization
/// after the pre-interceptor phase.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthState {
    /// The resource is not protected.
    Unprotected,
    /// The caller was authenticated and holds the roles the route requires.
    Authorized,
    /// The caller could not be authenticated and was redirected or
    /// challenged.
    Unauthenticated,
    /// The caller was authenticated but lacks the required role.
    Forbidden,
    /// A provider failed and the failure was written to the response.
    ProviderError,
}

/// Result of the pre-interceptor phase for one request.  It is handed back to
/// [`UriResource::resolve()`] so that nothing about the request needs to be
/// remembered by the (shared) resource itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PreOutcome {
    /// whether resolution should go ahead
    pub proceed: bool,
    pub auth: AuthState,
}

impl PreOutcome {
    pub fn unprotected(proceed: bool) -> Self {
        PreOutcome { proceed, auth: AuthState::Unprotected }
    }

    /// A request that was turned away by the auth pipeline.
    pub fn rejected(auth: AuthState) -> Self {
        PreOutcome { proceed: false, auth }
    }
}

/// The capabilities the dispatcher needs from whatever handles a request.
#[async_trait]
pub trait UriResource: Debug + Send + Sync {
    /// A short description of this resource for logs.
    fn label(&self) -> String;

    /// Whether the resource may only be reached over HTTPS.
    fn requires_https(&self) -> bool {
        false
    }

    /// The HTTPS equivalent of `request`'s URI, if one can be built.
    fn https_uri(&self, _request: &RequestInfo) -> Option<String> {
        None
    }

    fn supported_mime_types(&self) -> &SupportedMimeTypes;

    fn negotiator(&self) -> &MimeNegotiator;

    /// Picks the response mime type and records it in `rqctx`.  On failure
    /// the 406 or 500 response has already been written and `false` is
    /// returned.
    fn negotiate_mime_type(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<bool, HttpError> {
        let accept = rqctx.request.accept();
        match self
            .negotiator()
            .negotiate(accept.as_deref(), self.supported_mime_types())
        {
            Ok(choice) => {
                debug!(rqctx.log, "negotiated mime type";
                    "mime_type" => &choice.mime_type,
                    "serializer" => ?choice.serializer,
                );
                rqctx.mime_type = Some(choice);
                Ok(true)
            }
            Err(error) => {
                debug!(rqctx.log, "mime type negotiation failed";
                    "error" => %error,
                );
                error.write_to(response)?;
                Ok(false)
            }
        }
    }

    async fn apply_pre_interceptors(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<PreOutcome, HttpError>;

    async fn resolve(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
        outcome: &PreOutcome,
    ) -> HandlerResult;

    async fn apply_post_interceptors(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<bool, HttpError>;
}

/// Builds the `https` form of `request`'s URI.  The port is left out when it
/// is the default.
pub fn https_uri_for(request: &RequestInfo, https_port: u16) -> Option<String> {
    let host = request.host()?;
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    if https_port == 443 {
        Some(format!("https://{}{}", host, path_and_query))
    } else {
        Some(format!("https://{}:{}{}", host, https_port, path_and_query))
    }
}

/// The resource for a registered route: its handler plus the interceptors,
/// mime types, and transport requirements configured for it.
#[derive(Debug)]
pub struct RouteResource {
    method: MethodFilter,
    path: UriPathTemplate,
    handler: Arc<dyn RouteHandler>,
    mime_types: SupportedMimeTypes,
    negotiator: Arc<MimeNegotiator>,
    pre: Vec<Arc<dyn Interceptor>>,
    post: Vec<Arc<dyn Interceptor>>,
    globals: Arc<GlobalInterceptors>,
    requires_https: bool,
    https_port: u16,
}

/// Everything that goes into a `RouteResource`.
#[derive(Debug)]
pub struct RouteResourceParts {
    pub method: MethodFilter,
    pub path: UriPathTemplate,
    pub handler: Arc<dyn RouteHandler>,
    pub mime_types: SupportedMimeTypes,
    pub negotiator: Arc<MimeNegotiator>,
    pub pre: Vec<Arc<dyn Interceptor>>,
    pub post: Vec<Arc<dyn Interceptor>>,
    pub globals: Arc<GlobalInterceptors>,
    pub requires_https: bool,
    pub https_port: u16,
}

impl RouteResource {
    pub fn new(parts: RouteResourceParts) -> Self {
        RouteResource {
            method: parts.method,
            path: parts.path,
            handler: parts.handler,
            mime_types: parts.mime_types,
            negotiator: parts.negotiator,
            pre: parts.pre,
            post: parts.post,
            globals: parts.globals,
            requires_https: parts.requires_https,
            https_port: parts.https_port,
        }
    }

    pub fn handler(&self) -> &Arc<dyn RouteHandler> {
        &self.handler
    }

    fn chain(&self, rqctx: &RequestContext) -> InterceptorChain {
        InterceptorChain::for_request(
            &self.globals,
            &self.pre,
            &self.post,
            rqctx.request.method(),
            rqctx.request.path(),
        )
    }
}

#[async_trait]
impl UriResource for RouteResource {
    fn label(&self) -> String {
        format!(
            "{} {} ({})",
            self.method,
            self.path.as_str(),
            self.handler.label()
        )
    }

    fn requires_https(&self) -> bool {
        self.requires_https
    }

    fn https_uri(&self, request: &RequestInfo) -> Option<String> {
        https_uri_for(request, self.https_port)
    }

    fn supported_mime_types(&self) -> &SupportedMimeTypes {
        &self.mime_types
    }

    fn negotiator(&self) -> &MimeNegotiator {
        &self.negotiator
    }

    async fn apply_pre_interceptors(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<PreOutcome, HttpError> {
        let proceed = self.chain(rqctx).pre_process(rqctx, response).await?;
        Ok(PreOutcome::unprotected(proceed))
    }

    async fn resolve(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
        _outcome: &PreOutcome,
    ) -> HandlerResult {
        self.handler.handle(rqctx, response).await
    }

    async fn apply_post_interceptors(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<bool, HttpError> {
        self.chain(rqctx).post_process(rqctx, response).await
    }
}

/// Why no route was matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fallback {
    NotFound,
    MethodNotAllowed(AllowedMethods),
    Options(AllowedMethods),
}

/// Answers requests that no route matched.  Content negotiation is disabled
/// for these and the response always uses the default mime type.
#[derive(Debug)]
pub struct FallbackResource {
    fallback: Fallback,
    mime_types: SupportedMimeTypes,
    negotiator: Arc<MimeNegotiator>,
}

impl FallbackResource {
    pub fn new(fallback: Fallback, negotiator: Arc<MimeNegotiator>) -> Self {
        let mime_types = SupportedMimeTypes::negotiation_disabled(
            negotiator.default_mime_type(),
        );
        FallbackResource { fallback, mime_types, negotiator }
    }

    pub fn fallback(&self) -> &Fallback {
        &self.fallback
    }
}

#[async_trait]
impl UriResource for FallbackResource {
    fn label(&self) -> String {
        match &self.fallback {
            Fallback::NotFound => String::from("not found"),
            Fallback::MethodNotAllowed(_) => String::from("method not allowed"),
            Fallback::Options(_) => String::from("options"),
        }
    }

    fn supported_mime_types(&self) -> &SupportedMimeTypes {
        &self.mime_types
    }

    fn negotiator(&self) -> &MimeNegotiator {
        &self.negotiator
    }

    async fn apply_pre_interceptors(
        &self,
        _rqctx: &mut RequestContext,
        _response: &mut ResponseSink,
    ) -> Result<PreOutcome, HttpError> {
        Ok(PreOutcome::unprotected(true))
    }

    async fn resolve(
        &self,
        _rqctx: &mut RequestContext,
        response: &mut ResponseSink,
        _outcome: &PreOutcome,
    ) -> HandlerResult {
        match &self.fallback {
            Fallback::NotFound => {
                response.text(StatusCode::NOT_FOUND, "Not Found");
            }
            Fallback::MethodNotAllowed(allowed) => {
                response.set_header(header::ALLOW, &allowed.to_string())?;
                response.text(
                    StatusCode::METHOD_NOT_ALLOWED,
                    "Method Not Allowed",
                );
            }
            Fallback::Options(allowed) => {
                let allowed = allowed.to_string();
                response.set_header(header::ALLOW, &allowed)?;
                response.set_header(
                    header::ACCESS_CONTROL_ALLOW_METHODS,
                    &allowed,
                )?;
                response.set_status_code(StatusCode::NO_CONTENT);
            }
        }
        Ok(None)
    }

    async fn apply_post_interceptors(
        &self,
        _rqctx: &mut RequestContext,
        _response: &mut ResponseSink,
    ) -> Result<bool, HttpError> {
        Ok(true)
    }
}
