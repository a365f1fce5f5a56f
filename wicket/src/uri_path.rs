// Copyright 2024 Oxide Computer Company

//! Matching configured path templates against request paths
//!
//! A template is a path like `"/projects/{project}/instances/{instance}"`.
//! Each `{name}` placeholder matches one or more characters other than `/`;
//! everything else in the template is a regular expression fragment, so a
//! template may carry patterns like `"/v1/[a-z0-9]+;?"`.  A `/` is always a
//! literal slash.
//!
//! Matching is anchored at the start of the request path but not at the end:
//! `"/hello/{name}"` matches `"/hello/mikey/extra"`, and the unmatched
//! `"/extra"` is reported as the *remainder*.  A template ending in `$` is
//! anchored at the end as well, so it never leaves a remainder.  An empty
//! template places no restriction on the path at all.
//!
//! Braces always introduce a placeholder, so regular-expression repetition
//! counts (`a{2}`) cannot be used in templates.

use crate::error::RouteError;
use indexmap::IndexMap;
use percent_encoding::percent_decode_str;
use regex::Regex;

/// A path template compiled for matching.
#[derive(Debug, Clone)]
pub struct UriPathTemplate {
    template: String,
    /// `None` for the empty template, which matches every path.
    pattern: Option<Regex>,
    /// Placeholder names in declaration order.
    names: Vec<String>,
}

impl UriPathTemplate {
    /// Returns a template that places no restriction on the path.
    pub fn any() -> Self {
        UriPathTemplate {
            template: String::new(),
            pattern: None,
            names: vec![],
        }
    }

    /// Compiles `template`.  Fails if a placeholder is empty, unterminated,
    /// or repeated, or if the template is not a valid pattern.
    pub fn parse(template: &str) -> Result<Self, RouteError> {
        if template.is_empty() {
            return Ok(UriPathTemplate::any());
        }

        let mut pattern = String::from("^");
        let mut names: Vec<String> = Vec::new();
        let mut rest = template;

        while let Some(c) = rest.chars().next() {
            match c {
                '{' => {
                    let end = rest.find('}').ok_or_else(|| {
                        RouteError::UnterminatedPlaceholder {
                            path: template.to_string(),
                        }
                    })?;
                    let name = &rest[1..end];
                    if name.is_empty() {
                        return Err(RouteError::EmptyPlaceholder {
                            path: template.to_string(),
                        });
                    }
                    if names.iter().any(|n| n == name) {
                        return Err(RouteError::DuplicatePlaceholder {
                            path: template.to_string(),
                            name: name.to_string(),
                        });
                    }
                    pattern.push_str(&format!(
                        "(?P<{}>[^/]+)",
                        group_name(names.len())
                    ));
                    names.push(name.to_string());
                    rest = &rest[end + 1..];
                }
                c => {
                    pattern.push(c);
                    rest = &rest[c.len_utf8()..];
                }
            }
        }

        let pattern = Regex::new(&pattern).map_err(|error| {
            RouteError::InvalidPattern {
                path: template.to_string(),
                message: error.to_string(),
            }
        })?;

        Ok(UriPathTemplate {
            template: template.to_string(),
            pattern: Some(pattern),
            names,
        })
    }

    /// Returns the template as it was configured.
    pub fn as_str(&self) -> &str {
        &self.template
    }

    /// Returns true for the empty template.
    pub fn is_any(&self) -> bool {
        self.pattern.is_none()
    }

    /// Returns the placeholder names in declaration order.
    pub fn placeholders(&self) -> &[String] {
        &self.names
    }

    /// Returns whether `actual` satisfies this template.
    pub fn satisfied_by(&self, actual: &str) -> bool {
        match &self.pattern {
            None => true,
            Some(pattern) => pattern.is_match(actual),
        }
    }

    /// Matches `actual` against this template.  On success, the returned
    /// `UriPath` carries the value of each placeholder that captured something
    /// and whatever part of `actual` the template did not consume.
    pub fn matches(&self, actual: &str) -> Option<UriPath> {
        let pattern = match &self.pattern {
            None => return Some(UriPath::unrestricted(actual)),
            Some(pattern) => pattern,
        };

        let captures = pattern.captures(actual)?;
        let mut arguments = IndexMap::new();
        for (i, name) in self.names.iter().enumerate() {
            if let Some(value) = captures.name(&group_name(i)) {
                arguments.insert(name.clone(), decode(value.as_str()));
            }
        }

        let end = captures.get(0).map(|m| m.end()).unwrap_or(0);
        let remaining = &actual[end..];

        Some(UriPath {
            configured: self.template.clone(),
            actual: actual.to_string(),
            arguments,
            remaining: if remaining.is_empty() {
                None
            } else {
                Some(remaining.to_string())
            },
        })
    }
}

fn group_name(index: usize) -> String {
    format!("wicket_arg_{}", index)
}

/// Percent-decodes a captured value.  Values that don't decode to UTF-8 are
/// passed through as they appeared in the request.
fn decode(value: &str) -> String {
    match percent_decode_str(value).decode_utf8() {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => value.to_string(),
    }
}

/// The result of matching a request path against a route's template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UriPath {
    configured: String,
    actual: String,
    arguments: IndexMap<String, String>,
    remaining: Option<String>,
}

impl UriPath {
    /// A path that was matched by the empty template, or not matched against
    /// any template at all (as for fallback responses).
    pub fn unrestricted(actual: &str) -> Self {
        UriPath {
            configured: String::new(),
            actual: actual.to_string(),
            arguments: IndexMap::new(),
            remaining: None,
        }
    }

    pub fn configured(&self) -> &str {
        &self.configured
    }

    pub fn actual(&self) -> &str {
        &self.actual
    }

    /// Returns the placeholder values in the order the template declared them.
    pub fn arguments(&self) -> &IndexMap<String, String> {
        &self.arguments
    }

    pub fn argument(&self, name: &str) -> Option<&str> {
        self.arguments.get(name).map(String::as_str)
    }

    pub fn argument_or<'a>(&'a self, name: &str, default: &'a str) -> &'a str {
        self.argument(name).unwrap_or(default)
    }

    pub fn remaining(&self) -> Option<&str> {
        self.remaining.as_deref()
    }

    pub fn remaining_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.remaining().unwrap_or(default)
    }
}
