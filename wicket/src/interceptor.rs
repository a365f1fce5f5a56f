// Copyright 2024 Oxide Computer Company

//! Interceptors that run before and after a route's handler
//!
//! An interceptor sees the request on its way in (a *pre*-interceptor) or the
//! response on its way out (a *post*-interceptor) and may stop the rest of its
//! chain by returning [`Flow::Cancel`].  Returning an error also stops the
//! chain; the error propagates to the dispatcher.
//!
//! Interceptors come from two places: the route itself, and global
//! registrations that apply to every route whose request matches their method
//! and path conditions.  Global pre-interceptors run before the route's own,
//! and the route's post-interceptors run before the global ones, so global
//! interceptors wrap route-specific ones on both sides.

use crate::error::HttpError;
use crate::error::RouteError;
use crate::request::RequestContext;
use crate::request::ResponseSink;
use crate::router::MethodFilter;
use crate::uri_path::UriPathTemplate;
use async_trait::async_trait;
use http::Method;
use slog::debug;
use std::fmt::Debug;
use std::sync::Arc;

/// Whether the rest of an interceptor chain should run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Cancel,
}

#[async_trait]
pub trait Interceptor: Debug + Send + Sync {
    async fn intercept(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<Flow, HttpError>;
}

/// An interceptor registered for all routes, limited to requests that match
/// its method and path conditions.
#[derive(Clone, Debug)]
pub struct InterceptorRegistration {
    method: MethodFilter,
    path: UriPathTemplate,
    interceptor: Arc<dyn Interceptor>,
}

impl InterceptorRegistration {
    /// Registers `interceptor` for every method and path.
    pub fn new(interceptor: Arc<dyn Interceptor>) -> Self {
        InterceptorRegistration {
            method: MethodFilter::Any,
            path: UriPathTemplate::any(),
            interceptor,
        }
    }

    pub fn for_method(mut self, method: Method) -> Self {
        self.method = MethodFilter::Only(method);
        self
    }

    /// Limits this registration to paths that satisfy `template`.
    pub fn for_path(mut self, template: &str) -> Result<Self, RouteError> {
        if template.trim().is_empty() {
            return Err(RouteError::EmptyPathCondition);
        }
        self.path = UriPathTemplate::parse(template)?;
        Ok(self)
    }

    pub fn applies_to(&self, method: &Method, path: &str) -> bool {
        self.method.admits(method) && self.path.satisfied_by(path)
    }

    pub fn interceptor(&self) -> &Arc<dyn Interceptor> {
        &self.interceptor
    }
}

/// Interceptors registered for all routes.
#[derive(Clone, Debug, Default)]
pub struct GlobalInterceptors {
    pub pre: Vec<InterceptorRegistration>,
    pub post: Vec<InterceptorRegistration>,
}

/// The pre- and post-interceptors that apply to one request, in order.
#[derive(Clone, Debug, Default)]
pub struct InterceptorChain {
    pre: Vec<Arc<dyn Interceptor>>,
    post: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new(
        pre: Vec<Arc<dyn Interceptor>>,
        post: Vec<Arc<dyn Interceptor>>,
    ) -> Self {
        InterceptorChain { pre, post }
    }

    /// Merges the global interceptors that apply to `method` and `path` with
    /// a route's own.
    pub fn for_request(
        globals: &GlobalInterceptors,
        route_pre: &[Arc<dyn Interceptor>],
        route_post: &[Arc<dyn Interceptor>],
        method: &Method,
        path: &str,
    ) -> Self {
        let applicable = |registrations: &[InterceptorRegistration]| {
            registrations
                .iter()
                .filter(|r| r.applies_to(method, path))
                .map(|r| Arc::clone(&r.interceptor))
                .collect::<Vec<_>>()
        };

        let mut pre = applicable(&globals.pre);
        pre.extend(route_pre.iter().cloned());

        let mut post: Vec<_> = route_post.to_vec();
        post.extend(applicable(&globals.post));

        InterceptorChain { pre, post }
    }

    pub fn pre(&self) -> &[Arc<dyn Interceptor>] {
        &self.pre
    }

    pub fn post(&self) -> &[Arc<dyn Interceptor>] {
        &self.post
    }

    /// Runs the pre-interceptors.  Returns `false` if one of them cancelled
    /// the request.
    pub async fn pre_process(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<bool, HttpError> {
        run(&self.pre, "pre", rqctx, response).await
    }

    /// Runs the post-interceptors.  Returns `false` if one of them cancelled
    /// the rest.
    pub async fn post_process(
        &self,
        rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<bool, HttpError> {
        run(&self.post, "post", rqctx, response).await
    }
}

async fn run(
    interceptors: &[Arc<dyn Interceptor>],
    phase: &'static str,
    rqctx: &mut RequestContext,
    response: &mut ResponseSink,
) -> Result<bool, HttpError> {
    for (index, interceptor) in interceptors.iter().enumerate() {
        if interceptor.intercept(rqctx, response).await? == Flow::Cancel {
            debug!(rqctx.log, "interceptor cancelled request";
                "phase" => phase,
                "index" => index,
                "interceptor" => format!("{:?}", interceptor),
            );
            return Ok(false);
        }
    }
    Ok(true)
}
