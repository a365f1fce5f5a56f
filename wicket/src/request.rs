// Copyright 2024 Oxide Computer Company

//! Per-request state: the incoming request, the response being built, and the
//! context threaded through resources and interceptors.
//!
//! Everything in here is created fresh for each request and dropped when the
//! request completes.  Nothing in this module is shared between requests.

use crate::auth::Identity;
use crate::auth::Session;
use crate::error::HttpError;
use crate::mime::MimeTypeChoice;
use crate::uri_path::UriPath;
use bytes::Bytes;
use http::header;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use http::Method;
use http::StatusCode;
use http::Uri;
use slog::Logger;
use std::fmt;
use std::sync::Arc;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_TEXT: &str = "text/plain; charset=utf-8";

/// Basic request information (method, URI, headers) handed to us by the
/// transport, plus the session the transport associated with it, if any.
#[derive(Clone)]
pub struct RequestInfo {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
    secure: bool,
    session: Option<Arc<dyn Session>>,
}

impl RequestInfo {
    pub fn new(method: Method, uri: Uri) -> Self {
        RequestInfo {
            method,
            uri,
            headers: HeaderMap::new(),
            secure: false,
            session: None,
        }
    }

    /// Copies the method, URI, and headers out of an `http::Request`.  A URI
    /// with an `https` scheme marks the request as secure.
    pub fn from_http<B>(request: &http::Request<B>) -> Self {
        let secure = request.uri().scheme() == Some(&http::uri::Scheme::HTTPS);
        RequestInfo {
            method: request.method().clone(),
            uri: request.uri().clone(),
            headers: request.headers().clone(),
            secure,
            session: None,
        }
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Records whether the transport received this request over TLS.
    pub fn with_secure(mut self, secure: bool) -> Self {
        self.secure = secure;
        self
    }

    pub fn with_session(mut self, session: Arc<dyn Session>) -> Self {
        self.session = Some(session);
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn path(&self) -> &str {
        self.uri.path()
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    pub fn session(&self) -> Option<&Arc<dyn Session>> {
        self.session.as_ref()
    }

    /// Returns the value of the `Accept` header, or `None` if it is absent or
    /// not valid text.  Multiple `Accept` headers are joined with commas.
    pub fn accept(&self) -> Option<String> {
        let values: Vec<&str> = self
            .headers
            .get_all(header::ACCEPT)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .collect();
        if values.is_empty() {
            None
        } else {
            Some(values.join(", "))
        }
    }

    /// Returns the host this request was addressed to, without any port.
    pub fn host(&self) -> Option<String> {
        let authority = match self.uri.authority() {
            Some(authority) => authority.host().to_string(),
            None => {
                let value = self.headers.get(header::HOST)?.to_str().ok()?;
                let authority: http::uri::Authority = value.parse().ok()?;
                authority.host().to_string()
            }
        };
        Some(authority)
    }
}

impl fmt::Debug for RequestInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestInfo")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("secure", &self.secure)
            .field("session", &self.session.is_some())
            .finish()
    }
}

/// Handle for the state of one request as it moves through the pipeline.
#[derive(Debug)]
pub struct RequestContext {
    /// basic request information (method, URI, etc.)
    pub request: RequestInfo,
    /// the matched route's path and the values extracted from it
    pub path: UriPath,
    /// the negotiated response mime type, once negotiation has run
    pub mime_type: Option<MimeTypeChoice>,
    /// unique id assigned to this request
    pub request_id: String,
    /// logger for this specific request
    pub log: Logger,

    identity: Option<Identity>,
}

impl RequestContext {
    pub fn new(
        request: RequestInfo,
        path: UriPath,
        request_id: String,
        log: Logger,
    ) -> Self {
        RequestContext {
            request,
            path,
            mime_type: None,
            request_id,
            log,
            identity: None,
        }
    }

    /// Attaches the identity of an authorized caller to this request.
    pub fn associate(&mut self, identity: Identity) {
        self.identity = Some(identity);
    }

    /// Returns the identity attached by the protected-resource decorator, if
    /// this request was authorized.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }
}

/// The response being assembled for one request.
///
/// Resources, interceptors, and the auth pipeline write the status, headers,
/// and body here; the transport reads them back out once the dispatcher is
/// finished.  A new sink starts out as an empty 200.
#[derive(Debug, Clone)]
pub struct ResponseSink {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl Default for ResponseSink {
    fn default() -> Self {
        ResponseSink::new()
    }
}

impl ResponseSink {
    pub fn new() -> Self {
        ResponseSink {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status_code(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn write<B: Into<Bytes>>(&mut self, body: B) {
        self.body = body.into();
    }

    pub fn set_content_type(&mut self, content_type: &str) {
        // Content types are produced by us or by configuration, and the mime
        // strings we accept are header-safe, so a failure here means the
        // type is garbage and is better left off than half-written.
        if let Ok(value) = HeaderValue::from_str(content_type) {
            self.headers.insert(header::CONTENT_TYPE, value);
        }
    }

    /// Sets `name` to `value`, replacing any previous values.
    pub fn set_header(
        &mut self,
        name: HeaderName,
        value: &str,
    ) -> Result<(), HttpError> {
        let value = header_value(&name, value)?;
        self.headers.insert(name, value);
        Ok(())
    }

    /// Adds another value for `name`, keeping any existing ones.
    pub fn append_header(
        &mut self,
        name: HeaderName,
        value: &str,
    ) -> Result<(), HttpError> {
        let value = header_value(&name, value)?;
        self.headers.append(name, value);
        Ok(())
    }

    /// Redirects the client to `uri` with a 302.
    pub fn redirect(&mut self, uri: &str) -> Result<(), HttpError> {
        self.redirect_with_status(uri, StatusCode::FOUND)
    }

    pub fn redirect_with_status(
        &mut self,
        uri: &str,
        status: StatusCode,
    ) -> Result<(), HttpError> {
        if !status.is_redirection() {
            return Err(HttpError::for_internal_error(format!(
                "redirect to \"{}\" with non-redirect status {}",
                uri, status
            )));
        }
        self.set_header(header::LOCATION, uri)?;
        self.status = status;
        self.body = Bytes::new();
        Ok(())
    }

    /// Responds 401, offering each of `challenges` in its own
    /// `WWW-Authenticate` header.
    pub fn unauthorized(
        &mut self,
        challenges: &[String],
    ) -> Result<(), HttpError> {
        if challenges.is_empty() {
            return Err(HttpError::for_internal_error(String::from(
                "cannot send 401 without any authentication challenges",
            )));
        }
        self.headers.remove(header::WWW_AUTHENTICATE);
        for challenge in challenges {
            self.append_header(header::WWW_AUTHENTICATE, challenge)?;
        }
        self.text(StatusCode::UNAUTHORIZED, "Unauthorized");
        Ok(())
    }

    pub fn forbidden(&mut self) {
        self.text(StatusCode::FORBIDDEN, "Forbidden");
    }

    pub fn internal_server_error(&mut self, message: &str) {
        self.text(StatusCode::INTERNAL_SERVER_ERROR, message);
    }

    /// Sets `status` with a plain-text `message` as the body.
    pub fn text(&mut self, status: StatusCode, message: &str) {
        self.status = status;
        self.set_content_type(CONTENT_TYPE_TEXT);
        self.body = Bytes::copy_from_slice(message.as_bytes());
    }
}

fn header_value(
    name: &HeaderName,
    value: &str,
) -> Result<HeaderValue, HttpError> {
    HeaderValue::from_str(value).map_err(|error| {
        HttpError::for_internal_error(format!(
            "invalid value for header \"{}\": {}",
            name, error
        ))
    })
}

#[cfg(test)]
mod test {
    use super::RequestInfo;
    use super::ResponseSink;
    use http::header;
    use http::HeaderValue;
    use http::Method;
    use http::StatusCode;

    #[test]
    fn test_accept_joins_headers() {
        let request = RequestInfo::new(Method::GET, "/x".parse().unwrap())
            .with_header(header::ACCEPT, HeaderValue::from_static("text/html"))
            .with_header(
                header::ACCEPT,
                HeaderValue::from_static("application/json;q=0.5"),
            );
        assert_eq!(
            request.accept().as_deref(),
            Some("text/html, application/json;q=0.5")
        );
        let request = RequestInfo::new(Method::GET, "/x".parse().unwrap());
        assert_eq!(request.accept(), None);
    }

    #[test]
    fn test_from_http() {
        let request = http::Request::builder()
            .method(Method::POST)
            .uri("https://example.com/things?x=1")
            .header(header::ACCEPT, "application/json")
            .body(())
            .unwrap();
        let info = RequestInfo::from_http(&request);
        assert_eq!(info.method(), Method::POST);
        assert_eq!(info.path(), "/things");
        assert_eq!(info.accept().as_deref(), Some("application/json"));
        assert!(info.is_secure());
        assert!(info.session().is_none());

        let request = http::Request::builder()
            .uri("http://example.com/things")
            .body(())
            .unwrap();
        assert!(!RequestInfo::from_http(&request).is_secure());
        let request = http::Request::builder().uri("/things").body(()).unwrap();
        assert!(!RequestInfo::from_http(&request).is_secure());
    }

    #[test]
    fn test_host() {
        let request = RequestInfo::new(
            Method::GET,
            "http://example.com:8080/x".parse().unwrap(),
        );
        assert_eq!(request.host().as_deref(), Some("example.com"));
        let request = RequestInfo::new(Method::GET, "/x".parse().unwrap())
            .with_header(
                header::HOST,
                HeaderValue::from_static("api.example.com:80"),
            );
        assert_eq!(request.host().as_deref(), Some("api.example.com"));
        let request = RequestInfo::new(Method::GET, "/x".parse().unwrap());
        assert_eq!(request.host(), None);
    }

    #[test]
    fn test_unauthorized_requires_challenges() {
        let mut response = ResponseSink::new();
        assert!(response.unauthorized(&[]).is_err());
        response
            .unauthorized(&[
                String::from("Basic realm=\"wicket\""),
                String::from("Bearer"),
            ])
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenges: Vec<_> = response
            .headers()
            .get_all(header::WWW_AUTHENTICATE)
            .iter()
            .map(|v| v.to_str().unwrap().to_string())
            .collect();
        assert_eq!(challenges, vec!["Basic realm=\"wicket\"", "Bearer"]);
    }

    #[test]
    fn test_redirect() {
        let mut response = ResponseSink::new();
        response.write("stale body");
        response.redirect("/login?next=%2Fadmin").unwrap();
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/login?next=%2Fadmin"
        );
        assert!(response.body().is_empty());

        let error = response
            .redirect_with_status("/login", StatusCode::OK)
            .unwrap_err();
        assert_eq!(error.status_code, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
