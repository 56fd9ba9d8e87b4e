//! Lifecycle of one request/response exchange.
//!
//! # Design
//! An `Exchange` owns the request descriptor together with the slot that
//! records how the response was classified. Status and body chunks flow
//! through the same object in arrival order, so there is no state shared
//! between independent status and chunk handlers.
//!
//! ```text
//! AwaitingStatus --on_status(200)--> Decoding --finish--> Ok(Document)
//!       |                               |
//!       +--on_status(!200)--> Rejected  +--bad chunk--> Failed
//! ```
//!
//! `Rejected` and `Failed` tell the host to stop reading the body. Chunks
//! that still arrive are never handed to the decoder. `finish` consumes the
//! exchange, so it resolves exactly once.

use tracing::{debug, warn};

use crate::decode::XmlDecoder;
use crate::error::{classify_status, TrackerError};
use crate::http::{HttpRequest, HttpResponse};
use crate::tree::Document;

/// What the host should do with the rest of the body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Stop reading and drop the connection.
    Abort,
}

#[derive(Debug)]
enum State {
    AwaitingStatus,
    Decoding(XmlDecoder),
    Rejected(TrackerError),
    Failed(TrackerError),
}

/// One in-flight request and its classification.
#[derive(Debug)]
pub struct Exchange {
    request: HttpRequest,
    state: State,
}

impl Exchange {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            state: State::AwaitingStatus,
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    /// Classify the status line before any of the body is read.
    pub fn on_status(&mut self, status: u16) -> Flow {
        if !matches!(self.state, State::AwaitingStatus) {
            warn!(status, "status received twice; ignoring");
            return self.flow();
        }
        self.state = match classify_status(status) {
            Ok(()) => State::Decoding(XmlDecoder::new()),
            Err(error) => {
                debug!(
                    method = self.request.method.as_str(),
                    path = %self.request.path,
                    status,
                    "response classified as failure"
                );
                State::Rejected(error)
            }
        };
        self.flow()
    }

    pub fn on_chunk(&mut self, chunk: &[u8]) -> Flow {
        if let State::Decoding(decoder) = &mut self.state {
            if let Err(e) = decoder.feed(chunk) {
                debug!(path = %self.request.path, error = %e, "response body rejected");
                self.state = State::Failed(e.into());
            }
        }
        self.flow()
    }

    /// True once the exchange has an outcome that no further chunk can change.
    pub fn is_settled(&self) -> bool {
        matches!(self.state, State::Rejected(_) | State::Failed(_))
    }

    /// Conclude the exchange after the body ended (or was abandoned).
    pub fn finish(self) -> Result<Document, TrackerError> {
        match self.state {
            State::Decoding(decoder) => {
                let received = decoder.received();
                let document = decoder.finish()?;
                debug!(
                    path = %self.request.path,
                    root = %document.root,
                    bytes = received,
                    "response decoded"
                );
                Ok(document)
            }
            State::Rejected(error) | State::Failed(error) => Err(error),
            State::AwaitingStatus => Err(TrackerError::transport("response ended before a status line")),
        }
    }

    /// Conclude the exchange with a transport failure. A classification that
    /// already happened wins over the failure that followed it.
    pub fn fail(self, cause: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> TrackerError {
        match self.state {
            State::Rejected(error) | State::Failed(error) => error,
            State::AwaitingStatus | State::Decoding(_) => {
                let error = TrackerError::transport(cause);
                debug!(path = %self.request.path, error = %error, "exchange failed");
                error
            }
        }
    }

    /// Run a fully buffered response through the same path as a stream.
    pub fn complete(request: HttpRequest, response: HttpResponse) -> Result<Document, TrackerError> {
        let mut exchange = Exchange::new(request);
        if exchange.on_status(response.status) == Flow::Continue {
            exchange.on_chunk(&response.body);
        }
        exchange.finish()
    }

    fn flow(&self) -> Flow {
        if self.is_settled() {
            Flow::Abort
        } else {
            Flow::Continue
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::decode::DecodeError;
    use crate::http::{build_request, Credential, HttpMethod};

    fn request() -> HttpRequest {
        build_request(
            &TrackerConfig::default(),
            HttpMethod::Get,
            "/projects/1/stories",
            &Credential::token("ABC123"),
            None,
        )
    }

    const BODY: &[u8] = b"<stories><story><name>a</name></story></stories>";

    #[test]
    fn success_decodes_streamed_chunks() {
        let mut exchange = Exchange::new(request());
        assert_eq!(exchange.on_status(200), Flow::Continue);
        for chunk in BODY.chunks(7) {
            assert_eq!(exchange.on_chunk(chunk), Flow::Continue);
        }
        let doc = exchange.finish().unwrap();
        assert_eq!(doc.root, "stories");
    }

    #[test]
    fn unauthorized_wins_over_valid_xml_body() {
        let mut exchange = Exchange::new(request());
        assert_eq!(exchange.on_status(401), Flow::Abort);
        assert_eq!(exchange.on_chunk(BODY), Flow::Abort);
        assert!(matches!(exchange.finish(), Err(TrackerError::AuthenticationFailed)));
    }

    #[test]
    fn error_status_never_reaches_decoder() {
        for status in [404, 500] {
            let mut exchange = Exchange::new(request());
            assert_eq!(exchange.on_status(status), Flow::Abort);
            // Garbage would fail decoding if it were ever fed.
            exchange.on_chunk(b"<html><body>oops</p>");
            match exchange.finish() {
                Err(TrackerError::HttpStatus(code)) => assert_eq!(code, status),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn malformed_body_aborts_and_is_terminal() {
        let mut exchange = Exchange::new(request());
        exchange.on_status(200);
        assert_eq!(exchange.on_chunk(b"<a></b>"), Flow::Abort);
        assert_eq!(exchange.on_chunk(b"<a/>"), Flow::Abort);
        assert!(matches!(
            exchange.finish(),
            Err(TrackerError::Decode(DecodeError::MismatchedTag { .. }))
        ));
    }

    #[test]
    fn transport_failure_before_status() {
        let exchange = Exchange::new(request());
        let err = exchange.fail("connection reset");
        assert!(matches!(err, TrackerError::Transport(_)));
        assert!(err.to_string().contains("connection reset"));
    }

    #[test]
    fn classification_wins_over_later_transport_failure() {
        let mut exchange = Exchange::new(request());
        exchange.on_status(500);
        assert!(matches!(exchange.fail("reset"), TrackerError::HttpStatus(500)));
    }

    #[test]
    fn truncated_body_is_a_decode_error() {
        let mut exchange = Exchange::new(request());
        exchange.on_status(200);
        exchange.on_chunk(&BODY[..20]);
        assert!(matches!(
            exchange.finish(),
            Err(TrackerError::Decode(DecodeError::Incomplete))
        ));
    }

    #[test]
    fn buffered_response_takes_the_same_path() {
        let response = HttpResponse {
            status: 200,
            headers: Vec::new(),
            body: BODY.to_vec(),
        };
        let doc = Exchange::complete(request(), response).unwrap();
        assert_eq!(doc.body.expand("story").unwrap().len(), 1);

        let response = HttpResponse {
            status: 401,
            headers: Vec::new(),
            body: BODY.to_vec(),
        };
        assert!(matches!(
            Exchange::complete(request(), response),
            Err(TrackerError::AuthenticationFailed)
        ));
    }
}
