// Copyright 2024 Oxide Computer Company

//! Common facilities for automated testing.

#![allow(dead_code)]

use async_trait::async_trait;
use http::Method;
use http::StatusCode;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::sync::Mutex;
use wicket::test_util::CapturedLog;
use wicket::AuthProviderError;
use wicket::AuthProviders;
use wicket::AuthenticationProvider;
use wicket::AuthorizationProvider;
use wicket::ConfigWicket;
use wicket::Dispatcher;
use wicket::Flow;
use wicket::HandlerResult;
use wicket::HttpError;
use wicket::Interceptor;
use wicket::RequestContext;
use wicket::RequestInfo;
use wicket::ResponseSink;
use wicket::Roles;
use wicket::RouteHandler;
use wicket::RouteMetadata;
use wicket::RouteTableBuilder;
use wicket::StaticMetadata;
use wicket::User;

/// Shared record of which handlers and interceptors ran, in order.
#[derive(Clone, Debug, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Journal::default()
    }

    pub fn push(&self, entry: String) {
        self.0.lock().unwrap().push(entry);
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }

    pub fn contains(&self, entry: &str) -> bool {
        self.0.lock().unwrap().iter().any(|e| e == entry)
    }
}

/// A handler that records itself and returns its name (or fails, if told to).
#[derive(Debug)]
pub struct TestHandler {
    pub name: &'static str,
    pub journal: Journal,
    pub metadata: StaticMetadata,
    pub fail_with: Option<StatusCode>,
}

impl TestHandler {
    pub fn new(name: &'static str, journal: &Journal) -> Arc<Self> {
        Arc::new(TestHandler {
            name,
            journal: journal.clone(),
            metadata: StaticMetadata::default(),
            fail_with: None,
        })
    }

    pub fn with_metadata(
        name: &'static str,
        journal: &Journal,
        metadata: StaticMetadata,
    ) -> Arc<Self> {
        Arc::new(TestHandler {
            name,
            journal: journal.clone(),
            metadata,
            fail_with: None,
        })
    }

    pub fn failing(
        name: &'static str,
        journal: &Journal,
        status: StatusCode,
    ) -> Arc<Self> {
        Arc::new(TestHandler {
            name,
            journal: journal.clone(),
            metadata: StaticMetadata::default(),
            fail_with: Some(status),
        })
    }
}

#[async_trait]
impl RouteHandler for TestHandler {
    fn label(&self) -> &str {
        self.name
    }

    fn metadata(&self) -> Arc<dyn RouteMetadata> {
        Arc::new(self.metadata.clone())
    }

    async fn handle(
        &self,
        rqctx: &mut RequestContext,
        _response: &mut ResponseSink,
    ) -> HandlerResult {
        self.journal.push(format!("handler:{}", self.name));
        match self.fail_with {
            Some(status) if status.is_client_error() => {
                Err(HttpError::for_client_error(
                    Some(String::from("TestFailure")),
                    status,
                    format!("{} refused", self.name),
                ))
            }
            Some(_) => Err(HttpError::for_internal_error(format!(
                "{} blew up",
                self.name
            ))),
            None => Ok(Some(serde_json::json!({
                "handler": self.name,
                "user": rqctx.identity().map(|i| i.user().name.clone()),
            }))),
        }
    }
}

/// An interceptor that records itself and then continues, cancels, or fails.
#[derive(Debug)]
pub struct TestInterceptor {
    pub name: &'static str,
    pub journal: Journal,
    pub outcome: Result<Flow, StatusCode>,
}

impl TestInterceptor {
    pub fn new(name: &'static str, journal: &Journal) -> Arc<dyn Interceptor> {
        Arc::new(TestInterceptor {
            name,
            journal: journal.clone(),
            outcome: Ok(Flow::Continue),
        })
    }

    pub fn cancelling(
        name: &'static str,
        journal: &Journal,
    ) -> Arc<dyn Interceptor> {
        Arc::new(TestInterceptor {
            name,
            journal: journal.clone(),
            outcome: Ok(Flow::Cancel),
        })
    }

    pub fn failing(
        name: &'static str,
        journal: &Journal,
        status: StatusCode,
    ) -> Arc<dyn Interceptor> {
        Arc::new(TestInterceptor {
            name,
            journal: journal.clone(),
            outcome: Err(status),
        })
    }
}

#[async_trait]
impl Interceptor for TestInterceptor {
    async fn intercept(
        &self,
        _rqctx: &mut RequestContext,
        response: &mut ResponseSink,
    ) -> Result<Flow, HttpError> {
        self.journal.push(self.name.to_string());
        match self.outcome {
            Ok(Flow::Cancel) => {
                response.text(StatusCode::TOO_MANY_REQUESTS, "slow down");
                Ok(Flow::Cancel)
            }
            Ok(flow) => Ok(flow),
            Err(status) => Err(HttpError::for_status(None, status)),
        }
    }
}

/// An authentication provider with a canned answer.
#[derive(Debug)]
pub struct TestAuthn {
    pub answer: Result<Option<User>, AuthProviderError>,
    pub redirect_status: StatusCode,
    pub calls: AtomicUsize,
}

impl TestAuthn {
    pub fn user(name: &str) -> Self {
        TestAuthn::answering(Ok(Some(User::new(name))))
    }

    pub fn nobody() -> Self {
        TestAuthn::answering(Ok(None))
    }

    pub fn answering(answer: Result<Option<User>, AuthProviderError>) -> Self {
        TestAuthn {
            answer,
            redirect_status: StatusCode::FOUND,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthenticationProvider for TestAuthn {
    async fn authenticate(
        &self,
        _request: &RequestInfo,
    ) -> Result<Option<User>, AuthProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }

    fn login_uri(&self, request: &RequestInfo) -> String {
        format!("/login?from={}", request.path())
    }

    fn challenges_for(&self, _request: &RequestInfo) -> Vec<String> {
        vec![
            String::from("Basic realm=\"wicket\""),
            String::from("Bearer"),
        ]
    }

    fn login_redirect_status(&self) -> StatusCode {
        self.redirect_status
    }
}

/// An authorization provider with a canned answer.
#[derive(Debug)]
pub struct TestAuthz {
    pub answer: Result<Option<Roles>, AuthProviderError>,
    pub calls: AtomicUsize,
}

impl TestAuthz {
    pub fn roles(roles: &[&str]) -> Self {
        TestAuthz::answering(Ok(Some(Roles::of(roles.iter().copied()))))
    }

    pub fn answering(answer: Result<Option<Roles>, AuthProviderError>) -> Self {
        TestAuthz { answer, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AuthorizationProvider for TestAuthz {
    async fn roles(
        &self,
        _user: &User,
        _request: &RequestInfo,
    ) -> Result<Option<Roles>, AuthProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.answer.clone()
    }
}

pub fn providers(
    authn: &Arc<TestAuthn>,
    authz: &Arc<TestAuthz>,
) -> AuthProviders {
    AuthProviders::new(
        Arc::clone(authn) as Arc<dyn AuthenticationProvider>,
        Arc::clone(authz) as Arc<dyn AuthorizationProvider>,
    )
}

/// Builds a dispatcher whose log entries are captured for inspection.
pub fn dispatcher(
    routes: RouteTableBuilder,
    config: &ConfigWicket,
) -> (Dispatcher, CapturedLog) {
    let captured = CapturedLog::new();
    let dispatcher = Dispatcher::new(routes.build(), config, captured.logger());
    (dispatcher, captured)
}

pub fn request(method: Method, uri: &str) -> RequestInfo {
    RequestInfo::new(method, uri.parse().unwrap())
}

pub fn body_text(response: &ResponseSink) -> String {
    String::from_utf8(response.body().to_vec()).unwrap()
}
