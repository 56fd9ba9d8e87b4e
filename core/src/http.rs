//! HTTP request descriptors and the request builder.
//!
//! # Design
//! Requests are plain data. The core builds an `HttpRequest` for one logical
//! operation and never touches the network; the host executes it and feeds
//! the status and body back through an `Exchange`. A descriptor is built
//! fresh per call and dropped when the exchange completes.
//!
//! Authentication comes in two shapes. Basic credentials are used once, to
//! obtain a token, and produce a single `Authorization` header that is sent
//! verbatim. Every other call carries the token plus the XML content headers.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::config::TrackerConfig;

pub const TOKEN_HEADER: &str = "X-TrackerToken";
pub const CONTENT_TYPE_HEADER: &str = "Content-type";
pub const CONTENT_LENGTH_HEADER: &str = "Content-length";
pub const AUTHORIZATION_HEADER: &str = "Authorization";
pub const XML_MEDIA_TYPE: &str = "application/xml";

/// Characters left alone by `encodeURIComponent`; everything else is escaped.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Delete => "DELETE",
        }
    }
}

/// An HTTP request described as plain data.
///
/// `path` already includes the API prefix and any query string. When `body`
/// is present a matching `Content-length` header is set; token-authenticated
/// requests without a body carry `Content-length: 0`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
}

impl HttpRequest {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A fully buffered HTTP response, for hosts that read the body in one go.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

/// How a request authenticates.
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Username and password, exchanged once for a token.
    Basic { username: String, password: String },
    /// Opaque token obtained from `Basic`; never validated locally.
    Token(String),
}

impl Credential {
    pub fn basic(username: &str, password: &str) -> Self {
        Self::Basic {
            username: username.to_string(),
            password: password.to_string(),
        }
    }

    pub fn token(token: &str) -> Self {
        Self::Token(token.to_string())
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credential::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credential::Token(_) => f.debug_tuple("Token").field(&"<redacted>").finish(),
        }
    }
}

/// Assemble a descriptor for one logical operation.
pub fn build_request(
    config: &TrackerConfig,
    method: HttpMethod,
    relative_path: &str,
    credential: &Credential,
    body: Option<String>,
) -> HttpRequest {
    let headers = match credential {
        // Explicit headers replace the synthesized ones outright.
        Credential::Basic { username, password } => {
            let encoded = STANDARD.encode(format!("{username}:{password}"));
            vec![(AUTHORIZATION_HEADER.to_string(), format!("Basic {encoded}"))]
        }
        Credential::Token(token) => {
            let length = body.as_ref().map_or(0, String::len);
            vec![
                (TOKEN_HEADER.to_string(), token.clone()),
                (CONTENT_TYPE_HEADER.to_string(), XML_MEDIA_TYPE.to_string()),
                (CONTENT_LENGTH_HEADER.to_string(), length.to_string()),
            ]
        }
    };

    HttpRequest {
        method,
        path: format!("{}{}", config.api_prefix(), relative_path),
        headers,
        body,
    }
}

/// Offset, limit and filter parameters, passed through verbatim.
///
/// Accepted by every list operation. Nothing here drives automatic
/// pagination; the caller asks for the page it wants.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub filter: Option<String>,
    pub offset: Option<u32>,
    pub limit: Option<u32>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: &str) -> Self {
        self.filter = Some(filter.to_string());
        self
    }

    pub fn offset(mut self, offset: u32) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// The encoded query string including the leading `?`, or empty when no
    /// parameter is set.
    pub fn to_query_string(&self) -> String {
        let mut pairs = Vec::new();
        if let Some(filter) = &self.filter {
            pairs.push(format!("filter={}", utf8_percent_encode(filter, QUERY_VALUE)));
        }
        if let Some(offset) = self.offset {
            pairs.push(format!("offset={offset}"));
        }
        if let Some(limit) = self.limit {
            pairs.push(format!("limit={limit}"));
        }
        if pairs.is_empty() {
            String::new()
        } else {
            format!("?{}", pairs.join("&"))
        }
    }
}
