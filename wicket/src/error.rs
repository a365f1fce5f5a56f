// Copyright 2024 Oxide Computer Company

//! Error types for request handling and route configuration
//!
//! Errors within Wicket fall into a few groups:
//!
//! * Errors produced while handling a request (by a route handler, by an
//!   interceptor, or by the pipeline itself).  These are [`HttpError`]s.  By
//!   the time one of these reaches the top of the request handling stack, the
//!   [`crate::Dispatcher`] turns it into a response with a 4xx or 5xx status
//!   code and a small JSON body ([`HttpErrorResponseBody`]) carrying an error
//!   code and an external message.  The internal message only goes to the log.
//! * Errors in the route configuration itself: a template that does not
//!   compile, a duplicate placeholder, a protected route with no providers to
//!   protect it, and so on.  These are [`RouteError`]s and they are reported
//!   when the route is registered, never while serving a request.
//! * Failures reported by authentication and authorization providers.  Those
//!   live with the providers (see [`crate::AuthProviderError`]) and are always
//!   translated to a response at the protected-resource boundary.
//!
//! Invariant violations (a route that requires a role without saying which)
//! are programming errors and panic.

use crate::request::ResponseSink;
use http::StatusCode;
use serde::Deserialize;
use serde::Serialize;
use std::error::Error;
use std::fmt;

/// `HttpError` represents an error generated as part of handling a request.
/// When one of these bubbles up to the dispatcher, it is turned into an HTTP
/// response, which includes:
///
///   * a status code, which is either 400-level (a client error) or 500-level
///     (a server error).
///   * a structured (JSON) body with an optional string error code (the
///     "type" of the error) and a human-readable external message.
///
/// `HttpError`s also have an internal message, which may differ from the
/// message that gets reported to clients.  For example, if an authentication
/// backend is unreachable, the client may just see "Service Unavailable",
/// while the log would say which backend failed and how.
#[derive(Debug)]
pub struct HttpError {
    /// HTTP status code for this error
    pub status_code: StatusCode,
    /// Optional string error code for this error.
    pub error_code: Option<String>,
    /// Error message to be sent to the client for this error
    pub external_message: String,
    /// Error message recorded in the log for this error
    pub internal_message: String,
}

/// Body of an HTTP response for an `HttpError`.
#[derive(Debug, Deserialize, Serialize)]
pub struct HttpErrorResponseBody {
    pub request_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    pub message: String,
}

impl HttpError {
    /// Generates an `HttpError` for any 400-level client error with a custom
    /// `message` used for both the internal and external message.
    pub fn for_client_error(
        error_code: Option<String>,
        status_code: StatusCode,
        message: String,
    ) -> Self {
        assert!(
            status_code.is_client_error(),
            "status code {} is not a client error",
            status_code
        );
        HttpError {
            status_code,
            error_code,
            internal_message: message.clone(),
            external_message: message,
        }
    }

    /// Generates an `HttpError` for a 500 "Internal Server Error" error with
    /// the given `internal_message` for the internal message.
    pub fn for_internal_error(internal_message: String) -> Self {
        let status_code = StatusCode::INTERNAL_SERVER_ERROR;
        HttpError {
            status_code,
            error_code: Some(String::from("Internal")),
            external_message: canonical_reason(status_code),
            internal_message,
        }
    }

    /// Generates a 400 "Bad Request" error with the given `message` used for
    /// both the internal and external message.
    pub fn for_bad_request(
        error_code: Option<String>,
        message: String,
    ) -> Self {
        HttpError::for_client_error(
            error_code,
            StatusCode::BAD_REQUEST,
            message,
        )
    }

    /// Generates an `HttpError` for the given HTTP `status_code` where the
    /// internal and external messages come from the standard label for the
    /// status code (e.g., "Method Not Allowed" for 405).
    pub fn for_status(
        error_code: Option<String>,
        status_code: StatusCode,
    ) -> Self {
        let message = canonical_reason(status_code);
        HttpError {
            status_code,
            error_code,
            internal_message: message.clone(),
            external_message: message,
        }
    }

    /// Writes this error into `response`, using `request_id` for the body's
    /// request id.  Any body already written is replaced.
    pub fn write_to(self, response: &mut ResponseSink, request_id: &str) {
        let body = HttpErrorResponseBody {
            request_id: request_id.to_string(),
            message: self.external_message,
            error_code: self.error_code,
        };
        response.set_status_code(self.status_code);
        response.set_content_type(crate::request::CONTENT_TYPE_JSON);
        match serde_json::to_string_pretty(&body) {
            Ok(text) => response.write(text),
            // Serializing three strings does not fail in practice; if it
            // does, the status code alone still tells the story.
            Err(_) => response.write(body.message),
        }
    }
}

fn canonical_reason(status_code: StatusCode) -> String {
    status_code.canonical_reason().unwrap_or("Unknown Error").to_string()
}

impl fmt::Display for HttpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HttpError({}): {}", self.status_code, self.external_message)
    }
}

impl Error for HttpError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        None
    }
}

/// Problems with a route or interceptor registration.
///
/// These are reported when the configuration is built, so that a misconfigured
/// application fails at startup rather than on the first matching request.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("URI path \"{path}\": invalid pattern: {message}")]
    InvalidPattern { path: String, message: String },

    #[error("URI path \"{path}\": placeholder name must not be empty")]
    EmptyPlaceholder { path: String },

    #[error("URI path \"{path}\": unterminated placeholder")]
    UnterminatedPlaceholder { path: String },

    #[error(
        "URI path \"{path}\": placeholder name \"{name}\" is used more than \
         once"
    )]
    DuplicatePlaceholder { path: String, name: String },

    #[error("unsupported HTTP method for a route: \"{0}\"")]
    UnsupportedMethod(String),

    #[error("interceptor path condition must not be empty")]
    EmptyPathCondition,

    #[error(
        "URI path \"{path}\": route requires authentication but no \
         authentication provider is configured"
    )]
    MissingAuthProviders { path: String },
}

#[cfg(test)]
mod test {
    use super::HttpError;
    use super::RouteError;
    use crate::request::ResponseSink;
    use crate::HttpErrorResponseBody;
    use http::StatusCode;

    #[test]
    fn test_serialize_error_response_body() {
        let err = HttpErrorResponseBody {
            request_id: "123".to_string(),
            error_code: None,
            message: "oy!".to_string(),
        };
        let out = serde_json::to_string(&err).unwrap();
        assert_eq!(out, r#"{"request_id":"123","message":"oy!"}"#);

        let err = HttpErrorResponseBody {
            request_id: "123".to_string(),
            error_code: Some("err".to_string()),
            message: "oy!".to_string(),
        };
        let out = serde_json::to_string(&err).unwrap();
        assert_eq!(
            out,
            r#"{"request_id":"123","error_code":"err","message":"oy!"}"#
        );
    }

    #[test]
    fn test_internal_error_hides_internal_message() {
        let error = HttpError::for_internal_error(String::from(
            "database at 10.1.2.3 is on fire",
        ));
        let mut response = ResponseSink::new();
        error.write_to(&mut response, "req-1");
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body: HttpErrorResponseBody =
            serde_json::from_slice(response.body()).unwrap();
        assert_eq!(body.request_id, "req-1");
        assert_eq!(body.error_code.as_deref(), Some("Internal"));
        assert_eq!(body.message, "Internal Server Error");
    }

    #[test]
    #[should_panic(expected = "is not a client error")]
    fn test_client_error_rejects_server_status() {
        let _ = HttpError::for_client_error(
            None,
            StatusCode::BAD_GATEWAY,
            String::from("nope"),
        );
    }

    #[test]
    fn test_route_error_messages() {
        let error = RouteError::DuplicatePlaceholder {
            path: String::from("/projects/{id}/insts/{id}"),
            name: String::from("id"),
        };
        assert_eq!(
            error.to_string(),
            "URI path \"/projects/{id}/insts/{id}\": placeholder name \"id\" \
             is used more than once"
        );
    }
}
