// Copyright 2024 Oxide Computer Company
//! Configuration for Wicket

use crate::mime::DEFAULT_MIME_TYPE;
use serde::Deserialize;
use serde::Serialize;
use std::collections::BTreeMap;

/// Configuration for a Wicket route table and dispatcher.
///
/// This type implements [`serde::Deserialize`] and [`serde::Serialize`] and it
/// can be composed with the consumer's configuration (whatever format that's
/// in).  For example, consumers could define a custom `MyAppConfig` for an app
/// that routes requests with Wicket:
///
/// ```
/// use wicket::ConfigWicket;
/// use serde::Deserialize;
///
/// #[derive(Deserialize)]
/// struct MyAppConfig {
///     routing: ConfigWicket,
///     /* ... (other app-specific config) */
/// }
///
/// fn main() -> Result<(), String> {
///     let my_config: MyAppConfig = toml::from_str(
///         r##"
///             [routing]
///             https_port = 8443
///             mime_types = [ "application/json" ]
///             token_salt = "pepper"
///
///             [routing.serializers]
///             "application/json" = "json"
///
///             ## ... (other app-specific config)
///         "##
///     ).map_err(|error| format!("parsing config: {}", error))?;
///
///     let wicket_config: &ConfigWicket = &my_config.routing;
///     assert_eq!(wicket_config.https_port, 8443);
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct ConfigWicket {
    /// port used when redirecting insecure requests to HTTPS
    pub https_port: u16,
    /// mime type used when negotiation is disabled or a route lists none
    pub default_mime_type: String,
    /// mime types every route can produce, after the route's own
    pub mime_types: Vec<String>,
    /// serializer registered for each mime type
    pub serializers: BTreeMap<String, String>,
    /// salt mixed into user tokens
    pub token_salt: String,
    /// request headers to include in each request's log entries
    pub log_headers: Vec<String>,
}

impl Default for ConfigWicket {
    fn default() -> Self {
        ConfigWicket {
            https_port: 443,
            default_mime_type: DEFAULT_MIME_TYPE.to_string(),
            mime_types: vec![],
            serializers: [
                ("text/html", "html"),
                ("application/json", "json"),
            ]
            .into_iter()
            .map(|(mime, serializer)| {
                (mime.to_string(), serializer.to_string())
            })
            .collect(),
            token_salt: String::new(),
            log_headers: vec![],
        }
    }
}
