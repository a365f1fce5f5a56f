// Copyright 2024 Oxide Computer Company

//! Wicket is the routing and access-control layer that sits between an HTTP
//! transport and an application's handlers.  Given a request that the
//! transport has already parsed (method, URI, headers), Wicket:
//!
//! * finds the route that should handle it, or decides the request gets a 404,
//!   a 405, or an `OPTIONS` response instead
//! * redirects to HTTPS if the route requires it
//! * picks the response's mime type from the `Accept` header and the types
//!   the route can produce
//! * for protected routes, authenticates the caller, checks their roles, and
//!   redirects, challenges, or refuses them as appropriate
//! * runs the route's pre-interceptors, its handler, and its post-interceptors
//!
//! Wicket does not listen on sockets, manage sessions, or serialize response
//! bodies.  The transport does those things, using the response status,
//! headers, body, and the negotiated serializer that Wicket hands back.
//!
//! ## Usage
//!
//! The bare minimum might look like this:
//!
//! ```
//! use async_trait::async_trait;
//! use http::Method;
//! use std::sync::Arc;
//! use wicket::ConfigWicket;
//! use wicket::Dispatcher;
//! use wicket::HandlerResult;
//! use wicket::RequestContext;
//! use wicket::RequestInfo;
//! use wicket::ResponseSink;
//! use wicket::RouteHandler;
//! use wicket::RouteTable;
//! use wicket::RouteTemplate;
//!
//! #[derive(Debug)]
//! struct Greeter;
//!
//! #[async_trait]
//! impl RouteHandler for Greeter {
//!     fn label(&self) -> &str {
//!         "greeter"
//!     }
//!
//!     async fn handle(
//!         &self,
//!         rqctx: &mut RequestContext,
//!         _response: &mut ResponseSink,
//!     ) -> HandlerResult {
//!         let name = rqctx.path.argument_or("name", "world");
//!         Ok(Some(serde_json::json!({ "hello": name })))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), String> {
//!     let config = ConfigWicket::default();
//!     let log = slog::Logger::root(slog::Discard, slog::o!());
//!
//!     let mut routes = RouteTable::builder(&config);
//!     routes
//!         .register(
//!             RouteTemplate::builder(
//!                 Method::GET,
//!                 "/hello/{name}",
//!                 Arc::new(Greeter),
//!             )
//!             .produces("application/json")
//!             .build()
//!             .map_err(|error| error.to_string())?,
//!         )
//!         .map_err(|error| error.to_string())?;
//!
//!     let dispatcher = Dispatcher::new(routes.build(), &config, log);
//!     let dispatched = dispatcher
//!         .dispatch(RequestInfo::new(
//!             Method::GET,
//!             "/hello/mikey".parse().unwrap(),
//!         ))
//!         .await;
//!     assert_eq!(
//!         dispatched.value,
//!         Some(serde_json::json!({ "hello": "mikey" }))
//!     );
//!     let choice = dispatched.mime_type.unwrap();
//!     assert_eq!(choice.serializer.as_deref(), Some("json"));
//!     Ok(())
//! }
//! ```
//!
//! ## Routes and path templates
//!
//! A path template is matched against the start of the request path.  `{name}`
//! captures one path segment (anything but `/`) into the argument `name`, and
//! whatever the template doesn't consume is available as the *remainder*.  So
//! `/hello/{name}` matches `/hello/mikey/foo` with `name` = `mikey` and
//! remainder `/foo`.  Other characters in a template are regular expression
//! syntax, so a trailing `$` forbids a remainder and `(/{id})?` makes a
//! segment optional.  An empty template matches every path.
//!
//! Routes are tried in the order they were registered, and the first whose
//! path and method both match wins.  See [`RouteTable`] for the details.
//!
//! ## Protected routes
//!
//! A route is protected when its configuration or its handler's
//! [`RouteMetadata`] requires a login or a role.  Protected routes need an
//! [`AuthenticationProvider`] and an [`AuthorizationProvider`], supplied to
//! [`RouteTable::builder()`] through [`RouteTableBuilder::auth_providers()`].
//! The identity of an authorized caller is available to interceptors and
//! handlers through [`RequestContext::identity()`].
//!
//! ## Interceptors
//!
//! [`Interceptor`]s run before (pre) and after (post) a route's handler.  They
//! can be attached to a single route or registered for the whole table with
//! method and path conditions.  Post-interceptors run even when a request was
//! refused by the auth pipeline or failed in a pre-interceptor or handler.
//!
//! ## Content negotiation
//!
//! Each route lists the mime types it can produce (followed by the globally
//! configured ones).  [`MimeNegotiator`] ranks them by the quality values in
//! the request's `Accept` header and picks a serializer for the winner.  A
//! request that accepts none of them gets a 406.
//!
//! ## Logging
//!
//! Wicket logs with [`slog`].  Each request gets a child logger carrying a
//! request id, the method, and the URI, available as [`RequestContext::log`].
//! [`ConfigLogging`] builds a root logger from configuration for applications
//! that want one.

pub mod auth;
mod config;
mod dispatch;
mod error;
mod handler;
mod interceptor;
mod logging;
mod mime;
mod request;
mod resource;
mod router;
mod uri_path;

#[doc(hidden)]
pub mod test_util;

pub use auth::AuthConstraint;
pub use auth::AuthProviderError;
pub use auth::AuthProviders;
pub use auth::AuthenticationProvider;
pub use auth::AuthorizationProvider;
pub use auth::Identity;
pub use auth::MemorySession;
pub use auth::ProtectedResource;
pub use auth::Roles;
pub use auth::Session;
pub use auth::SessionBackedAuthentication;
pub use auth::SessionBackedAuthorization;
pub use auth::Token;
pub use auth::User;
pub use config::ConfigWicket;
pub use dispatch::Dispatched;
pub use dispatch::Dispatcher;
pub use error::HttpError;
pub use error::HttpErrorResponseBody;
pub use error::RouteError;
pub use handler::HandlerResult;
pub use handler::RouteHandler;
pub use handler::RouteMetadata;
pub use handler::StaticMetadata;
pub use interceptor::Flow;
pub use interceptor::GlobalInterceptors;
pub use interceptor::Interceptor;
pub use interceptor::InterceptorChain;
pub use interceptor::InterceptorRegistration;
pub use logging::request_logger;
pub use logging::ConfigLogging;
pub use logging::ConfigLoggingIfExists;
pub use logging::ConfigLoggingLevel;
pub use mime::MimeNegotiator;
pub use mime::MimeTypeChoice;
pub use mime::NegotiationError;
pub use mime::SupportedMimeTypes;
pub use mime::DEFAULT_MIME_TYPE;
pub use request::RequestContext;
pub use request::RequestInfo;
pub use request::ResponseSink;
pub use request::CONTENT_TYPE_JSON;
pub use request::CONTENT_TYPE_TEXT;
pub use resource::https_uri_for;
pub use resource::AuthState;
pub use resource::Fallback;
pub use resource::FallbackResource;
pub use resource::PreOutcome;
pub use resource::RouteResource;
pub use resource::RouteResourceParts;
pub use resource::UriResource;
pub use router::AllowedMethods;
pub use router::MethodFilter;
pub use router::Resolution;
pub use router::RouteTable;
pub use router::RouteTableBuilder;
pub use router::RouteTableIter;
pub use router::RouteTemplate;
pub use router::RouteTemplateBuilder;
pub use uri_path::UriPath;
pub use uri_path::UriPathTemplate;

// Make the versions of these crates used by our public interface available to
// consumers.
pub use async_trait;
pub use http;
