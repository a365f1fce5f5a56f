// Copyright 2024 Oxide Computer Company

//! The per-request pipeline
//!
//! [`Dispatcher::dispatch()`] takes a request from the transport and carries
//! it through routing, the HTTPS check, mime type negotiation, the
//! pre-interceptors (and, for protected routes, the auth pipeline), the
//! handler, and the post-interceptors.  What comes back is the response the
//! transport should send, along with the handler's value and the negotiated
//! mime type so that the transport can serialize the value.
//!
//! Errors from handlers and interceptors are written into the response as
//! JSON [`crate::HttpErrorResponseBody`]s.  Post-interceptors run once the
//! pre-interceptor phase has started, whatever happened after that.

use crate::auth::Identity;
use crate::config::ConfigWicket;
use crate::error::HttpError;
use crate::logging::request_logger;
use crate::mime::MimeTypeChoice;
use crate::request::RequestContext;
use crate::request::RequestInfo;
use crate::request::ResponseSink;
use crate::resource::UriResource;
use crate::router::RouteTable;
use crate::uri_path::UriPath;
use slog::debug;
use slog::info;
use slog::trace;
use slog::warn;
use slog::Logger;
use std::sync::Arc;
use std::time::Instant;
use uuid::Uuid;

/// Everything produced by dispatching one request.
#[derive(Debug)]
pub struct Dispatched {
    /// unique id assigned to the request
    pub request_id: String,
    pub response: ResponseSink,
    /// the negotiated response type, if negotiation succeeded
    pub mime_type: Option<MimeTypeChoice>,
    /// the value returned by the handler, if it ran and returned one
    pub value: Option<serde_json::Value>,
    /// the path as matched by the route
    pub path: UriPath,
    /// the caller's identity, if the route is protected and the caller was
    /// authorized
    pub identity: Option<Identity>,
}

/// Runs requests against a [`RouteTable`].
#[derive(Debug)]
pub struct Dispatcher {
    table: Arc<RouteTable>,
    config: ConfigWicket,
    log: Logger,
}

impl Dispatcher {
    pub fn new(table: RouteTable, config: &ConfigWicket, log: Logger) -> Self {
        Dispatcher { table: Arc::new(table), config: config.clone(), log }
    }

    pub fn table(&self) -> &RouteTable {
        &self.table
    }

    pub fn log(&self) -> &Logger {
        &self.log
    }

    pub async fn dispatch(&self, request: RequestInfo) -> Dispatched {
        let start_time = Instant::now();
        let request_id = generate_request_id();
        let log = request_logger(
            &self.log,
            &request_id,
            &request,
            &self.config.log_headers,
        );
        trace!(log, "incoming request");

        let actual_path = request.path().to_string();
        let resolution = self.table.find_route(request.method(), &actual_path);
        let (resource, path) =
            self.table.resource_for(resolution, &actual_path);
        debug!(log, "resolved route"; "resource" => resource.label());

        let mut rqctx =
            RequestContext::new(request, path, request_id.clone(), log.clone());
        let mut response = ResponseSink::new();
        let value = run(resource.as_ref(), &mut rqctx, &mut response).await;

        let latency_us = start_time.elapsed().as_micros();
        info!(log, "request completed";
            "response_code" => response.status().as_str(),
            "latency_us" => latency_us,
        );

        let identity = rqctx.identity().cloned();
        Dispatched {
            request_id,
            response,
            mime_type: rqctx.mime_type,
            value,
            path: rqctx.path,
            identity,
        }
    }
}

async fn run(
    resource: &dyn UriResource,
    rqctx: &mut RequestContext,
    response: &mut ResponseSink,
) -> Option<serde_json::Value> {
    if resource.requires_https() && !rqctx.request.is_secure() {
        let redirect = match resource.https_uri(&rqctx.request) {
            Some(uri) => {
                debug!(rqctx.log, "redirecting to HTTPS"; "location" => &uri);
                response.redirect(&uri)
            }
            None => Err(HttpError::for_bad_request(
                None,
                String::from("this resource is only available over HTTPS"),
            )),
        };
        if let Err(error) = redirect {
            fail(rqctx, response, error);
        }
        return None;
    }

    match resource.negotiate_mime_type(rqctx, response) {
        Ok(true) => (),
        Ok(false) => return None,
        Err(error) => {
            fail(rqctx, response, error);
            return None;
        }
    }

    let value = match resource.apply_pre_interceptors(rqctx, response).await {
        Ok(outcome) if outcome.proceed => {
            resource.resolve(rqctx, response, &outcome).await
        }
        Ok(outcome) => {
            debug!(rqctx.log, "request not resolved";
                "auth" => ?outcome.auth,
            );
            Ok(None)
        }
        Err(error) => Err(error),
    };
    let value = value.unwrap_or_else(|error| {
        fail(rqctx, response, error);
        None
    });

    if let Err(error) = resource.apply_post_interceptors(rqctx, response).await
    {
        fail(rqctx, response, error);
    }

    value
}

/// Replaces whatever has been written so far with the response for `error`.
fn fail(rqctx: &RequestContext, response: &mut ResponseSink, error: HttpError) {
    if error.status_code.is_server_error() {
        warn!(rqctx.log, "request failed";
            "response_code" => error.status_code.as_str(),
            "error_message_internal" => &error.internal_message,
            "error_message_external" => &error.external_message,
        );
    } else {
        info!(rqctx.log, "request failed";
            "response_code" => error.status_code.as_str(),
            "error_message_internal" => &error.internal_message,
            "error_message_external" => &error.external_message,
        );
    }
    error.write_to(response, &rqctx.request_id);
}

fn generate_request_id() -> String {
    format!("{}", Uuid::new_v4())
}
