// Copyright 2024 Oxide Computer Company

//! Response content negotiation
//!
//! Each route declares the mime types it can produce ([`SupportedMimeTypes`]),
//! in order of preference.  For each request, [`MimeNegotiator::negotiate()`]
//! picks one of them based on the request's `Accept` header and finds the
//! serializer registered for it.  Producing the body in that format is the
//! serializer's business, not ours.

use crate::error::HttpError;
use crate::request::ResponseSink;
use http::header;
use http::StatusCode;
use indexmap::IndexMap;
use std::collections::BTreeMap;

/// The type used when nothing else applies.
pub const DEFAULT_MIME_TYPE: &str = "text/html";

/// The mime types a route can produce, with optional per-route serializers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SupportedMimeTypes {
    types: Vec<String>,
    serializers: IndexMap<String, String>,
    /// When set, negotiation is disabled and this type is always used.
    fixed: Option<String>,
}

impl SupportedMimeTypes {
    pub fn new() -> Self {
        SupportedMimeTypes::default()
    }

    /// A set that skips negotiation and always answers `mime_type`.
    pub fn negotiation_disabled(mime_type: &str) -> Self {
        SupportedMimeTypes {
            types: vec![],
            serializers: IndexMap::new(),
            fixed: Some(normalize(mime_type)),
        }
    }

    /// Appends `mime_type` if it isn't already present.
    pub fn push(&mut self, mime_type: &str) {
        let mime_type = normalize(mime_type);
        if !self.types.contains(&mime_type) {
            self.types.push(mime_type);
        }
    }

    /// Appends `mime_type` and serializes it with `serializer` on this route
    /// regardless of the global registration.
    pub fn push_with_serializer(&mut self, mime_type: &str, serializer: &str) {
        self.push(mime_type);
        self.serializers.insert(normalize(mime_type), serializer.to_string());
    }

    /// Returns these types followed by any of `global` not already listed.
    pub fn merged_with(&self, global: &[String]) -> Self {
        let mut merged = self.clone();
        if merged.fixed.is_none() {
            for mime_type in global {
                merged.push(mime_type);
            }
        }
        merged
    }

    pub fn is_negotiation_disabled(&self) -> bool {
        self.fixed.is_some()
    }

    pub fn types(&self) -> &[String] {
        &self.types
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Returns the serializer this route overrides `mime_type` with, if any.
    pub fn serializer_override(&self, mime_type: &str) -> Option<&str> {
        self.serializers.get(mime_type).map(String::as_str)
    }
}

fn normalize(mime_type: &str) -> String {
    mime_type.trim().to_ascii_lowercase()
}

/// The outcome of a successful negotiation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MimeTypeChoice {
    pub mime_type: String,
    /// `None` when negotiation is disabled and the body passes through as-is.
    pub serializer: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum NegotiationError {
    #[error(
        "none of the supported types is acceptable: {}",
        supported.join(", ")
    )]
    NotAcceptable { supported: Vec<String> },
    #[error("no formatter defined for negotiated content type {mime_type}")]
    NoSerializer { mime_type: String },
}

impl NegotiationError {
    /// Writes the 406 or 500 response for this failure.  A 406 lists the
    /// supported types in an `Accept` header.
    pub fn write_to(
        &self,
        response: &mut ResponseSink,
    ) -> Result<(), HttpError> {
        match self {
            NegotiationError::NotAcceptable { supported } => {
                response.set_header(header::ACCEPT, &supported.join(", "))?;
                response.text(StatusCode::NOT_ACCEPTABLE, &self.to_string());
            }
            NegotiationError::NoSerializer { .. } => {
                response.internal_server_error(&self.to_string());
            }
        }
        Ok(())
    }
}

/// One media range from an `Accept` header.
#[derive(Clone, Debug, PartialEq)]
struct MediaRange {
    kind: String,
    subtype: String,
    quality: f32,
}

impl MediaRange {
    fn permits(&self, kind: &str, subtype: &str) -> bool {
        (self.kind == "*" || self.kind == kind)
            && (self.subtype == "*" || self.subtype == subtype)
    }
}

/// Parses an `Accept` header.  Ranges that can't be parsed are skipped; a
/// malformed quality counts as 1.
fn parse_accept(header_value: &str) -> Vec<MediaRange> {
    let mut ranges = Vec::new();

    for part in header_value.split(',') {
        let mut params = part.split(';');
        let range = params.next().unwrap_or("").trim().to_ascii_lowercase();
        if range.is_empty() {
            continue;
        }

        let (kind, subtype) = match range.split_once('/') {
            Some((kind, subtype)) => (kind.trim(), subtype.trim()),
            // Some clients send a bare "*".
            None if range == "*" => ("*", "*"),
            None => continue,
        };
        if kind.is_empty() || subtype.is_empty() {
            continue;
        }

        let mut quality = 1.0f32;
        for param in params {
            let (name, value) = match param.split_once('=') {
                Some(pair) => pair,
                None => continue,
            };
            if !name.trim().eq_ignore_ascii_case("q") {
                continue;
            }
            // `f32` parsing accepts "nan" and "inf", which are no more
            // meaningful here than any other malformed value.
            match value.trim().parse::<f32>() {
                Ok(q) if q.is_finite() => quality = q.clamp(0.0, 1.0),
                _ => (),
            }
        }

        ranges.push(MediaRange {
            kind: kind.to_string(),
            subtype: subtype.to_string(),
            quality,
        });
    }

    ranges
}

/// The highest quality any range in `ranges` gives `mime_type`.
fn quality_for(ranges: &[MediaRange], mime_type: &str) -> f32 {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    let (kind, subtype) = match essence.split_once('/') {
        Some(parts) => parts,
        None => return 0.0,
    };
    ranges
        .iter()
        .filter(|range| range.permits(kind, subtype))
        .map(|range| range.quality)
        .fold(0.0, f32::max)
}

/// Chooses a response mime type and serializer for a request.
#[derive(Clone, Debug)]
pub struct MimeNegotiator {
    default_mime_type: String,
    serializers: BTreeMap<String, String>,
}

impl MimeNegotiator {
    /// `serializers` maps mime types to the serializers registered for them
    /// globally.
    pub fn new(
        default_mime_type: &str,
        serializers: BTreeMap<String, String>,
    ) -> Self {
        MimeNegotiator {
            default_mime_type: normalize(default_mime_type),
            serializers: serializers
                .into_iter()
                .map(|(mime, serializer)| (normalize(&mime), serializer))
                .collect(),
        }
    }

    pub fn default_mime_type(&self) -> &str {
        &self.default_mime_type
    }

    /// Picks the type from `supported` that `accept` rates highest, with ties
    /// going to whichever the route listed first.
    ///
    /// * With negotiation disabled, the route's fixed type is returned
    ///   without looking at `accept`.
    /// * An empty `supported` list means the default type.
    /// * A missing or blank `accept` means the route's first type.
    pub fn negotiate(
        &self,
        accept: Option<&str>,
        supported: &SupportedMimeTypes,
    ) -> Result<MimeTypeChoice, NegotiationError> {
        if let Some(fixed) = &supported.fixed {
            return Ok(MimeTypeChoice {
                mime_type: fixed.clone(),
                serializer: None,
            });
        }

        if supported.is_empty() {
            return self.choose(&self.default_mime_type, supported);
        }

        let accept = accept.map(str::trim).unwrap_or("");
        if accept.is_empty() {
            return self.choose(&supported.types[0], supported);
        }

        let ranges = parse_accept(accept);
        let mut best: Option<(&String, f32)> = None;
        for mime_type in &supported.types {
            let quality = quality_for(&ranges, mime_type);
            if quality <= 0.0 {
                continue;
            }
            match best {
                Some((_, best_quality)) if best_quality >= quality => {}
                _ => best = Some((mime_type, quality)),
            }
        }

        match best {
            Some((mime_type, _)) => self.choose(mime_type, supported),
            None => Err(NegotiationError::NotAcceptable {
                supported: supported.types.clone(),
            }),
        }
    }

    fn choose(
        &self,
        mime_type: &str,
        supported: &SupportedMimeTypes,
    ) -> Result<MimeTypeChoice, NegotiationError> {
        let serializer = supported
            .serializer_override(mime_type)
            .or_else(|| self.serializers.get(mime_type).map(String::as_str))
            .ok_or_else(|| NegotiationError::NoSerializer {
                mime_type: mime_type.to_string(),
            })?;
        Ok(MimeTypeChoice {
            mime_type: mime_type.to_string(),
            serializer: Some(serializer.to_string()),
        })
    }
}
