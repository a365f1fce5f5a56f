// Copyright 2024 Oxide Computer Company

//! Routes incoming requests to resources
//!
//! A [`RouteTable`] is an ordered list of [`RouteTemplate`]s.  Each template
//! pairs a path template (see [`crate::UriPathTemplate`]) with an HTTP method
//! (or any method) and a handler, along with everything else configured for
//! the route: interceptors, mime types, an HTTPS requirement, and auth
//! requirements.
//!
//! Looking up a request walks the templates in registration order.  The first
//! template whose path is satisfied by the request path *and* whose method
//! admits the request method wins, so when two templates overlap, the one
//! registered first takes precedence regardless of which is more specific.
//! A template registered for `GET` also admits `HEAD`.
//!
//! If some template's path is satisfied but none admits the method, the
//! request gets a 405 listing the methods that would have worked (or, for
//! `OPTIONS`, an empty response listing them).  If no template's path is
//! satisfied at all, the request gets a 404.
//!
//! Tables are assembled with a [`RouteTableBuilder`] during startup and are
//! read-only afterwards.

use crate::auth::AuthConstraint;
use crate::auth::AuthProviders;
use crate::auth::ProtectedResource;
use crate::config::ConfigWicket;
use crate::error::RouteError;
use crate::handler::RouteHandler;
use crate::interceptor::GlobalInterceptors;
use crate::interceptor::Interceptor;
use crate::interceptor::InterceptorRegistration;
use crate::mime::MimeNegotiator;
use crate::mime::SupportedMimeTypes;
use crate::resource::Fallback;
use crate::resource::FallbackResource;
use crate::resource::RouteResource;
use crate::resource::RouteResourceParts;
use crate::resource::UriResource;
use crate::uri_path::UriPath;
use crate::uri_path::UriPathTemplate;
use http::Method;
use indexmap::IndexSet;
use std::fmt;
use std::sync::Arc;

/// The method(s) a route or interceptor registration applies to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MethodFilter {
    Any,
    Only(Method),
}

impl MethodFilter {
    /// Restricts a route to `method`, which must be one of `GET`, `HEAD`,
    /// `POST`, `PUT` or `DELETE`.
    pub fn for_route(method: Method) -> Result<Self, RouteError> {
        match method {
            Method::GET
            | Method::HEAD
            | Method::POST
            | Method::PUT
            | Method::DELETE => Ok(MethodFilter::Only(method)),
            other => Err(RouteError::UnsupportedMethod(other.to_string())),
        }
    }

    /// Returns whether a request made with `method` passes this filter.  A
    /// filter for `GET` admits `HEAD` as well.
    pub fn admits(&self, method: &Method) -> bool {
        match self {
            MethodFilter::Any => true,
            MethodFilter::Only(only) => {
                only == method
                    || (*only == Method::GET && method == Method::HEAD)
            }
        }
    }
}

impl fmt::Display for MethodFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodFilter::Any => f.write_str("*"),
            MethodFilter::Only(method) => write!(f, "{}", method),
        }
    }
}

/// The methods registered for a path, as reported in `Allow` headers.
///
/// Methods are kept in the order the routes were registered, without
/// duplicates.  `HEAD` follows `GET` and `OPTIONS` always comes last.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AllowedMethods(IndexSet<Method>);

impl AllowedMethods {
    pub fn new() -> Self {
        AllowedMethods::default()
    }

    pub fn insert(&mut self, method: Method) {
        let is_get = method == Method::GET;
        self.0.insert(method);
        if is_get {
            self.0.insert(Method::HEAD);
        }
    }

    /// Appends `OPTIONS`, which is always allowed.
    pub fn finish(mut self) -> Self {
        self.0.shift_remove(&Method::OPTIONS);
        self.0.insert(Method::OPTIONS);
        self
    }

    pub fn contains(&self, method: &Method) -> bool {
        self.0.contains(method)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Method> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AllowedMethods {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(Method::as_str).collect();
        f.write_str(&names.join(", "))
    }
}

/// One configured route.  Built with [`RouteTemplate::builder()`] and
/// immutable afterwards.
#[derive(Debug)]
pub struct RouteTemplate {
    method: MethodFilter,
    path: UriPathTemplate,
    handler: Arc<dyn RouteHandler>,
    pre: Vec<Arc<dyn Interceptor>>,
    post: Vec<Arc<dyn Interceptor>>,
    requires_https: bool,
    mime_types: SupportedMimeTypes,
    content_negotiation: bool,
    constraint: AuthConstraint,
}

impl RouteTemplate {
    /// Starts a route for `method` requests to paths satisfying `path`.
    pub fn builder(
        method: Method,
        path: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> RouteTemplateBuilder {
        RouteTemplateBuilder::new(Some(method), path, handler)
    }

    /// Starts a route that accepts every method.
    pub fn any_method(
        path: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> RouteTemplateBuilder {
        RouteTemplateBuilder::new(None, path, handler)
    }

    pub fn method(&self) -> &MethodFilter {
        &self.method
    }

    pub fn path(&self) -> &UriPathTemplate {
        &self.path
    }

    pub fn handler(&self) -> &Arc<dyn RouteHandler> {
        &self.handler
    }

    pub fn requires_https(&self) -> bool {
        self.requires_https
    }

    pub fn mime_types(&self) -> &SupportedMimeTypes {
        &self.mime_types
    }

    pub fn constraint(&self) -> &AuthConstraint {
        &self.constraint
    }
}

/// Collects a route's configuration.  Nothing is validated until
/// [`RouteTemplateBuilder::build()`].
#[derive(Debug)]
pub struct RouteTemplateBuilder {
    method: Option<Method>,
    path: String,
    handler: Arc<dyn RouteHandler>,
    pre: Vec<Arc<dyn Interceptor>>,
    post: Vec<Arc<dyn Interceptor>>,
    requires_https: bool,
    mime_types: SupportedMimeTypes,
    content_negotiation: bool,
    constraint: AuthConstraint,
}

impl RouteTemplateBuilder {
    fn new(
        method: Option<Method>,
        path: &str,
        handler: Arc<dyn RouteHandler>,
    ) -> Self {
        let constraint = AuthConstraint::new(handler.metadata());
        RouteTemplateBuilder {
            method,
            path: path.to_string(),
            handler,
            pre: vec![],
            post: vec![],
            requires_https: false,
            mime_types: SupportedMimeTypes::new(),
            content_negotiation: true,
            constraint,
        }
    }

    pub fn pre_interceptor(
        mut self,
        interceptor: Arc<dyn Interceptor>,
    ) -> Self {
        self.pre.push(interceptor);
        self
    }

    pub fn post_interceptor(
        mut self,
        interceptor: Arc<dyn Interceptor>,
    ) -> Self {
        self.post.push(interceptor);
        self
    }

    pub fn requires_https(mut self) -> Self {
        self.requires_https = true;
        self
    }

    /// Adds `mime_type` to the types this route can produce.  Types are
    /// preferred in the order they are added.
    pub fn produces(mut self, mime_type: &str) -> Self {
        self.mime_types.push(mime_type);
        self
    }

    /// Like `produces()`, but serializes `mime_type` with `serializer` on this
    /// route instead of the globally registered one.
    pub fn produces_with(mut self, mime_type: &str, serializer: &str) -> Self {
        self.mime_types.push_with_serializer(mime_type, serializer);
        self
    }

    /// Skips negotiation for this route.  Responses always use the default
    /// mime type and the handler's output passes through unserialized.
    pub fn without_content_negotiation(mut self) -> Self {
        self.content_negotiation = false;
        self
    }

    pub fn require_login(mut self) -> Self {
        self.constraint.require_login();
        self
    }

    pub fn require_role(mut self, role: &str) -> Self {
        self.constraint.require_role(role);
        self
    }

    /// Answer unauthenticated requests with a 401 challenge instead of a
    /// redirect to the login page.
    pub fn send_challenge_when_not_logged_in(mut self) -> Self {
        self.constraint.send_challenge_when_not_logged_in();
        self
    }

    pub fn build(self) -> Result<RouteTemplate, RouteError> {
        let method = match self.method {
            Some(method) => MethodFilter::for_route(method)?,
            None => MethodFilter::Any,
        };
        let path = UriPathTemplate::parse(&self.path)?;
        Ok(RouteTemplate {
            method,
            path,
            handler: self.handler,
            pre: self.pre,
            post: self.post,
            requires_https: self.requires_https,
            mime_types: self.mime_types,
            content_negotiation: self.content_negotiation,
            constraint: self.constraint,
        })
    }
}

/// Outcome of looking up a request in a [`RouteTable`].
#[derive(Debug)]
pub enum Resolution {
    Matched { resource: Arc<dyn UriResource>, path: UriPath },
    MethodNotAllowed(AllowedMethods),
    Options(AllowedMethods),
    NotFound,
}

impl Resolution {
    pub fn is_matched(&self) -> bool {
        matches!(self, Resolution::Matched { .. })
    }
}

#[derive(Debug)]
struct Route {
    method: MethodFilter,
    path: UriPathTemplate,
    resource: Arc<dyn UriResource>,
}

/// The routes of an application, in precedence order.
#[derive(Debug)]
pub struct RouteTable {
    routes: Vec<Route>,
    negotiator: Arc<MimeNegotiator>,
}

impl RouteTable {
    pub fn builder(config: &ConfigWicket) -> RouteTableBuilder {
        RouteTableBuilder::new(config)
    }

    pub fn negotiator(&self) -> &Arc<MimeNegotiator> {
        &self.negotiator
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Returns the method and path template of each route, in registration
    /// order.
    pub fn iter(&self) -> RouteTableIter<'_> {
        RouteTableIter { routes: self.routes.iter() }
    }

    /// Looks up the resource for a request to `path` made with `method`.
    pub fn find_route(&self, method: &Method, path: &str) -> Resolution {
        let mut allowed: Option<AllowedMethods> = None;

        for route in &self.routes {
            let matched = match route.path.matches(path) {
                Some(matched) => matched,
                None => continue,
            };

            if route.method.admits(method) {
                return Resolution::Matched {
                    resource: Arc::clone(&route.resource),
                    path: matched,
                };
            }

            if let MethodFilter::Only(registered) = &route.method {
                allowed
                    .get_or_insert_with(AllowedMethods::new)
                    .insert(registered.clone());
            }
        }

        match allowed {
            None => Resolution::NotFound,
            Some(allowed) if method == Method::OPTIONS => {
                Resolution::Options(allowed.finish())
            }
            Some(allowed) => Resolution::MethodNotAllowed(allowed.finish()),
        }
    }

    /// Turns a lookup result into the resource that will handle the request,
    /// substituting a fallback resource when no route matched.
    pub fn resource_for(
        &self,
        resolution: Resolution,
        actual_path: &str,
    ) -> (Arc<dyn UriResource>, UriPath) {
        let fallback = match resolution {
            Resolution::Matched { resource, path } => return (resource, path),
            Resolution::MethodNotAllowed(allowed) => {
                Fallback::MethodNotAllowed(allowed)
            }
            Resolution::Options(allowed) => Fallback::Options(allowed),
            Resolution::NotFound => Fallback::NotFound,
        };
        let resource =
            FallbackResource::new(fallback, Arc::clone(&self.negotiator));
        (Arc::new(resource), UriPath::unrestricted(actual_path))
    }
}

/// Iterator over the `(method, path template)` pairs of a [`RouteTable`].
pub struct RouteTableIter<'a> {
    routes: std::slice::Iter<'a, Route>,
}

impl<'a> Iterator for RouteTableIter<'a> {
    type Item = (&'a MethodFilter, &'a str);

    fn next(&mut self) -> Option<Self::Item> {
        self.routes.next().map(|route| (&route.method, route.path.as_str()))
    }
}

/// Assembles a [`RouteTable`].
///
/// Auth providers must be supplied before any route that requires
/// authentication is registered.
#[derive(Debug)]
pub struct RouteTableBuilder {
    config: ConfigWicket,
    providers: Option<AuthProviders>,
    globals: GlobalInterceptors,
    routes: Vec<(RouteTemplate, Option<AuthProviders>)>,
}

impl RouteTableBuilder {
    fn new(config: &ConfigWicket) -> Self {
        RouteTableBuilder {
            config: config.clone(),
            providers: None,
            globals: GlobalInterceptors::default(),
            routes: vec![],
        }
    }

    pub fn auth_providers(mut self, providers: AuthProviders) -> Self {
        self.providers = Some(providers);
        self
    }

    /// Appends `route` to the table.  Fails if the route requires
    /// authentication and no providers were supplied.
    pub fn register(&mut self, route: RouteTemplate) -> Result<(), RouteError> {
        let providers = if route.constraint.requires_auth() {
            let providers = self.providers.clone().ok_or_else(|| {
                RouteError::MissingAuthProviders {
                    path: route.path.as_str().to_string(),
                }
            })?;
            Some(providers)
        } else {
            None
        };
        self.routes.push((route, providers));
        Ok(())
    }

    pub fn register_pre_interceptor(
        &mut self,
        registration: InterceptorRegistration,
    ) {
        self.globals.pre.push(registration);
    }

    pub fn register_post_interceptor(
        &mut self,
        registration: InterceptorRegistration,
    ) {
        self.globals.post.push(registration);
    }

    pub fn build(self) -> RouteTable {
        let config = self.config;
        let globals = Arc::new(self.globals);
        let negotiator = Arc::new(MimeNegotiator::new(
            &config.default_mime_type,
            config.serializers.clone(),
        ));

        let routes = self
            .routes
            .into_iter()
            .map(|(template, providers)| {
                let mime_types = if template.content_negotiation {
                    template.mime_types.merged_with(&config.mime_types)
                } else {
                    SupportedMimeTypes::negotiation_disabled(
                        &config.default_mime_type,
                    )
                };
                let method = template.method.clone();
                let path = template.path.clone();
                let resource: Arc<dyn UriResource> =
                    Arc::new(RouteResource::new(RouteResourceParts {
                        method: template.method,
                        path: template.path,
                        handler: template.handler,
                        mime_types,
                        negotiator: Arc::clone(&negotiator),
                        pre: template.pre,
                        post: template.post,
                        globals: Arc::clone(&globals),
                        requires_https: template.requires_https,
                        https_port: config.https_port,
                    }));
                let resource: Arc<dyn UriResource> = match providers {
                    Some(providers) => Arc::new(ProtectedResource::new(
                        resource,
                        Arc::new(template.constraint),
                        providers,
                    )),
                    None => resource,
                };
                Route { method, path, resource }
            })
            .collect();

        RouteTable { routes, negotiator }
    }
}

#[cfg(test)]
mod test {
    use super::AllowedMethods;
    use super::MethodFilter;
    use super::Resolution;
    use super::RouteTable;
    use super::RouteTemplate;
    use crate::config::ConfigWicket;
    use crate::error::RouteError;
    use crate::handler::HandlerResult;
    use crate::handler::RouteHandler;
    use crate::handler::RouteMetadata;
    use crate::handler::StaticMetadata;
    use crate::request::RequestContext;
    use crate::request::ResponseSink;
    use async_trait::async_trait;
    use http::Method;
    use std::sync::Arc;

    #[derive(Debug)]
    struct Named(&'static str, StaticMetadata);

    #[async_trait]
    impl RouteHandler for Named {
        fn label(&self) -> &str {
            self.0
        }

        fn metadata(&self) -> Arc<dyn RouteMetadata> {
            Arc::new(self.1.clone())
        }

        async fn handle(
            &self,
            _rqctx: &mut RequestContext,
            _response: &mut ResponseSink,
        ) -> HandlerResult {
            Ok(Some(serde_json::json!(self.0)))
        }
    }

    fn handler(name: &'static str) -> Arc<dyn RouteHandler> {
        Arc::new(Named(name, StaticMetadata::default()))
    }

    fn table(routes: Vec<RouteTemplate>) -> RouteTable {
        let mut builder = RouteTable::builder(&ConfigWicket::default());
        for route in routes {
            builder.register(route).unwrap();
        }
        builder.build()
    }

    fn route(method: Method, path: &str, name: &'static str) -> RouteTemplate {
        RouteTemplate::builder(method, path, handler(name)).build().unwrap()
    }

    fn matched_label(resolution: Resolution) -> String {
        match resolution {
            Resolution::Matched { resource, .. } => resource.label(),
            other => panic!("expected a match, found {:?}", other),
        }
    }

    #[test]
    fn test_method_filter() {
        assert!(MethodFilter::Any.admits(&Method::PATCH));
        let get = MethodFilter::for_route(Method::GET).unwrap();
        assert!(get.admits(&Method::GET));
        assert!(get.admits(&Method::HEAD));
        assert!(!get.admits(&Method::POST));
        let post = MethodFilter::for_route(Method::POST).unwrap();
        assert!(!post.admits(&Method::HEAD));
        assert_eq!(
            MethodFilter::for_route(Method::PATCH).unwrap_err(),
            RouteError::UnsupportedMethod(String::from("PATCH"))
        );
        assert_eq!(get.to_string(), "GET");
        assert_eq!(MethodFilter::Any.to_string(), "*");
    }

    #[test]
    fn test_allowed_methods() {
        let mut allowed = AllowedMethods::new();
        allowed.insert(Method::POST);
        allowed.insert(Method::GET);
        allowed.insert(Method::HEAD);
        allowed.insert(Method::POST);
        let allowed = allowed.finish().finish();
        assert_eq!(allowed.to_string(), "POST, GET, HEAD, OPTIONS");
        assert_eq!(allowed.len(), 4);
        assert!(allowed.contains(&Method::OPTIONS));
    }

    #[test]
    fn test_basic_match() {
        let table = table(vec![route(Method::GET, "/hello/{name}", "hello")]);
        match table.find_route(&Method::GET, "/hello/mikey/foo") {
            Resolution::Matched { path, .. } => {
                assert_eq!(path.argument("name"), Some("mikey"));
                assert_eq!(path.remaining(), Some("/foo"));
                assert_eq!(path.configured(), "/hello/{name}");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[test]
    fn test_registration_order_wins() {
        let table = table(vec![
            route(Method::GET, "/things", "general"),
            route(Method::GET, "/things/special", "specific"),
        ]);
        let label =
            matched_label(table.find_route(&Method::GET, "/things/special"));
        assert!(label.contains("general"), "{}", label);
    }

    #[test]
    fn test_method_selects_route() {
        let table = table(vec![
            route(Method::POST, "/things", "create"),
            route(Method::GET, "/things", "list"),
        ]);
        assert!(matched_label(table.find_route(&Method::POST, "/things"))
            .contains("create"));
        assert!(matched_label(table.find_route(&Method::GET, "/things"))
            .contains("list"));
        assert!(matched_label(table.find_route(&Method::HEAD, "/things"))
            .contains("list"));
    }

    #[test]
    fn test_head_not_admitted_by_post() {
        let table = table(vec![route(Method::POST, "/things", "create")]);
        match table.find_route(&Method::HEAD, "/things") {
            Resolution::MethodNotAllowed(allowed) => {
                assert_eq!(allowed.to_string(), "POST, OPTIONS");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[test]
    fn test_any_method() {
        let table = table(vec![RouteTemplate::any_method("/any", handler("any"))
            .build()
            .unwrap()]);
        for method in [Method::GET, Method::DELETE, Method::OPTIONS] {
            assert!(table.find_route(&method, "/any").is_matched());
        }
    }

    #[test]
    fn test_not_found_and_options() {
        let table = table(vec![
            route(Method::GET, "/things", "list"),
            route(Method::PUT, "/things", "replace"),
        ]);
        assert!(matches!(
            table.find_route(&Method::GET, "/unknown"),
            Resolution::NotFound
        ));
        assert!(matches!(
            table.find_route(&Method::OPTIONS, "/unknown"),
            Resolution::NotFound
        ));
        match table.find_route(&Method::OPTIONS, "/things") {
            Resolution::Options(allowed) => {
                assert_eq!(allowed.to_string(), "GET, HEAD, PUT, OPTIONS");
            }
            other => panic!("unexpected resolution: {:?}", other),
        }
    }

    #[test]
    fn test_iter() {
        let table = table(vec![
            route(Method::GET, "/b", "b"),
            route(Method::DELETE, "/a/{id}", "a"),
        ]);
        let routes: Vec<(String, &str)> =
            table.iter().map(|(m, p)| (m.to_string(), p)).collect();
        assert_eq!(
            routes,
            vec![
                (String::from("GET"), "/b"),
                (String::from("DELETE"), "/a/{id}")
            ]
        );
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_build_errors() {
        let error = RouteTemplate::builder(Method::GET, "/a/{}", handler("x"))
            .build()
            .unwrap_err();
        assert_eq!(
            error,
            RouteError::EmptyPlaceholder { path: String::from("/a/{}") }
        );

        let error =
            RouteTemplate::builder(Method::OPTIONS, "/a", handler("x"))
                .build()
                .unwrap_err();
        assert_eq!(
            error,
            RouteError::UnsupportedMethod(String::from("OPTIONS"))
        );
    }

    #[test]
    fn test_protected_route_needs_providers() {
        let mut builder = RouteTable::builder(&ConfigWicket::default());
        let route =
            RouteTemplate::builder(Method::GET, "/admin", handler("admin"))
                .require_role("admin")
                .build()
                .unwrap();
        assert_eq!(
            builder.register(route).unwrap_err(),
            RouteError::MissingAuthProviders { path: String::from("/admin") }
        );

        let login = Arc::new(Named("me", StaticMetadata::requiring_login()));
        let route = RouteTemplate::builder(Method::GET, "/me", login)
            .build()
            .unwrap();
        assert!(builder.register(route).is_err());
        assert!(builder.build().is_empty());
    }
}
