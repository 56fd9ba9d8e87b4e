//! Sans-IO client core for the Pivotal Tracker v3 XML API.
//!
//! # Overview
//! Builds `HttpRequest` values and interprets responses without touching the
//! network. The host executes the round-trip and feeds the status line and
//! body chunks into an `Exchange`, which classifies the status before any
//! body byte is read and decodes the XML incrementally as chunks arrive.
//!
//! # Design
//! - `TrackerClient` is stateless: it holds only a read-only `TrackerConfig`.
//!   Tokens are passed explicitly on every call.
//! - Each operation is split into `build_*` (produces a request) and
//!   `parse_*` (interprets the decoded `Document`).
//! - Decoded XML is a small typed tree (`Node`). Collections are always
//!   returned as a `Vec` via key-path expansion, whether the service sent
//!   one element or many.
//! - Errors are values (`TrackerError`); nothing is retried or cached here.

pub mod body;
pub mod client;
pub mod config;
pub mod decode;
pub mod error;
pub mod exchange;
pub mod http;
pub mod tree;

pub use body::{FieldValue, Fields};
pub use client::{IterationGroup, TrackerClient};
pub use config::TrackerConfig;
pub use decode::{DecodeError, XmlDecoder};
pub use error::{classify_status, TrackerError};
pub use exchange::{Exchange, Flow};
pub use http::{Credential, HttpMethod, HttpRequest, HttpResponse, ListQuery};
pub use tree::{Document, Node};
