//! Incremental XML decoding.
//!
//! # Design
//! Response bodies arrive in chunks split at arbitrary byte offsets, including
//! mid-tag and mid-character. `MarkupScanner` tracks just enough lexical state
//! (inside a tag, inside a quoted attribute value, inside a comment, CDATA
//! section, processing instruction or DOCTYPE internal subset) to find where
//! the last complete construct ends. Everything up to
//! that point is handed to quick-xml as one self-contained segment; the tail
//! waits for the next chunk. Open elements live on `stack` across segments,
//! so quick-xml's own end-name check is disabled and done here instead.
//!
//! Segments always end on a `>`, which is ASCII, so text nodes, entities and
//! multi-byte characters are never split between two segments.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;
use tracing::trace;

use crate::tree::{Document, ElementBuilder};

/// Why a body could not be decoded. Terminal for the request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("XML syntax error: {0}")]
    Syntax(String),

    #[error("closing tag </{found}> does not match <{expected}>")]
    MismatchedTag { expected: String, found: String },

    #[error("text outside the root element")]
    UnexpectedText,

    #[error("more than one root element")]
    MultipleRoots,

    #[error("body ended inside an unfinished element")]
    Incomplete,

    #[error("body contained no root element")]
    Empty,

    #[error("invalid UTF-8 in element or attribute name")]
    Utf8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ScanState {
    #[default]
    Text,
    Markup { start: usize, quote: Option<u8> },
    Comment { start: usize },
    CData { start: usize },
    Instruction { start: usize },
    Doctype { depth: usize, quote: Option<u8> },
}

/// Finds the end of the last complete markup construct in a growing buffer.
#[derive(Debug, Default)]
struct MarkupScanner {
    cursor: usize,
    complete: usize,
    state: ScanState,
}

impl MarkupScanner {
    /// Inspect `buf[cursor..]` and return the offset just past the last
    /// complete construct.
    fn scan(&mut self, buf: &[u8]) -> usize {
        for (i, &b) in buf.iter().enumerate().skip(self.cursor) {
            self.state = match self.state {
                ScanState::Text if b == b'<' => ScanState::Markup { start: i, quote: None },
                ScanState::Text => ScanState::Text,
                ScanState::Markup { start, quote: Some(q) } => ScanState::Markup {
                    start,
                    quote: if b == q { None } else { Some(q) },
                },
                ScanState::Markup { start, quote: None } => {
                    let seen = &buf[start..=i];
                    if seen == b"<?" {
                        ScanState::Instruction { start }
                    } else if seen == b"<!--" {
                        ScanState::Comment { start }
                    } else if seen == b"<![CDATA[" {
                        ScanState::CData { start }
                    } else if seen == b"<!DOCTYPE" {
                        ScanState::Doctype { depth: 0, quote: None }
                    } else if b == b'"' || b == b'\'' {
                        ScanState::Markup { start, quote: Some(b) }
                    } else if b == b'>' {
                        self.complete = i + 1;
                        ScanState::Text
                    } else {
                        ScanState::Markup { start, quote: None }
                    }
                }
                // `<!---->` is the shortest comment.
                ScanState::Comment { start } if i >= start + 6 && &buf[i - 2..=i] == b"-->" => {
                    self.complete = i + 1;
                    ScanState::Text
                }
                // `<![CDATA[]]>` is the shortest section.
                ScanState::CData { start } if i >= start + 11 && &buf[i - 2..=i] == b"]]>" => {
                    self.complete = i + 1;
                    ScanState::Text
                }
                // `<?x?>` is the shortest instruction; `>` inside it is data.
                ScanState::Instruction { start } if i >= start + 3 && &buf[i - 1..=i] == b"?>" => {
                    self.complete = i + 1;
                    ScanState::Text
                }
                ScanState::Doctype { depth, quote: Some(q) } => ScanState::Doctype {
                    depth,
                    quote: if b == q { None } else { Some(q) },
                },
                // Declarations in the internal subset end with their own `>`.
                ScanState::Doctype { depth, quote: None } => match b {
                    b'"' | b'\'' => ScanState::Doctype { depth, quote: Some(b) },
                    b'[' => ScanState::Doctype { depth: depth + 1, quote: None },
                    b']' => ScanState::Doctype { depth: depth.saturating_sub(1), quote: None },
                    b'>' if depth == 0 => {
                        self.complete = i + 1;
                        ScanState::Text
                    }
                    _ => ScanState::Doctype { depth, quote: None },
                },
                other => other,
            };
        }
        self.cursor = buf.len();
        self.complete
    }

    /// The caller dropped `n` bytes from the front of the buffer.
    fn consumed(&mut self, n: usize) {
        self.cursor -= n;
        self.complete -= n;
        self.state = match self.state {
            ScanState::Text => ScanState::Text,
            ScanState::Markup { start, quote } => ScanState::Markup { start: start - n, quote },
            ScanState::Comment { start } => ScanState::Comment { start: start - n },
            ScanState::CData { start } => ScanState::CData { start: start - n },
            ScanState::Instruction { start } => ScanState::Instruction { start: start - n },
            doctype @ ScanState::Doctype { .. } => doctype,
        };
    }

    fn in_markup(&self) -> bool {
        self.state != ScanState::Text
    }
}

/// Push-style decoder: feed chunks in arrival order, then `finish`.
///
/// One decoder serves one response. After `feed` returns an error the
/// decoder must be discarded.
#[derive(Debug, Default)]
pub struct XmlDecoder {
    pending: Vec<u8>,
    scanner: MarkupScanner,
    stack: Vec<ElementBuilder>,
    root: Option<Document>,
    received: usize,
}

impl XmlDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total bytes fed so far.
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), DecodeError> {
        self.received += chunk.len();
        self.pending.extend_from_slice(chunk);

        let end = self.scanner.scan(&self.pending);
        if end == 0 {
            return Ok(());
        }
        let segment: Vec<u8> = self.pending.drain(..end).collect();
        self.scanner.consumed(end);
        trace!(bytes = segment.len(), held = self.pending.len(), "decoding segment");
        self.decode_segment(&segment)
    }

    /// Signal end of body and take the decoded document.
    pub fn finish(self) -> Result<Document, DecodeError> {
        if !self.stack.is_empty() || self.scanner.in_markup() {
            return Err(DecodeError::Incomplete);
        }
        if !is_blank(&String::from_utf8_lossy(&self.pending)) {
            return Err(if self.root.is_some() {
                DecodeError::UnexpectedText
            } else {
                DecodeError::Incomplete
            });
        }
        self.root.ok_or(DecodeError::Empty)
    }

    fn decode_segment(&mut self, segment: &[u8]) -> Result<(), DecodeError> {
        let mut reader = Reader::from_reader(segment);
        let config = reader.config_mut();
        config.check_end_names = false;
        config.allow_unmatched_ends = true;

        loop {
            match reader.read_event().map_err(syntax)? {
                Event::Start(e) => {
                    let element = self.open(&e)?;
                    self.stack.push(element);
                }
                Event::Empty(e) => {
                    let element = self.open(&e)?;
                    self.close(element)?;
                }
                Event::End(e) => {
                    let found = utf8(e.name().as_ref())?;
                    let element = self.stack.pop().ok_or_else(|| DecodeError::MismatchedTag {
                        expected: String::new(),
                        found: found.clone(),
                    })?;
                    if element.name != found {
                        return Err(DecodeError::MismatchedTag {
                            expected: element.name,
                            found,
                        });
                    }
                    self.close(element)?;
                }
                Event::Text(t) => {
                    let text = t.unescape().map_err(syntax)?;
                    self.text(&text)?;
                }
                Event::CData(c) => {
                    let text = std::str::from_utf8(&c).map_err(|_| DecodeError::Utf8)?;
                    self.text(text)?;
                }
                Event::Eof => return Ok(()),
                // Declarations, comments, processing instructions, doctype.
                _ => {}
            }
        }
    }

    fn open(&self, start: &BytesStart<'_>) -> Result<ElementBuilder, DecodeError> {
        if self.stack.is_empty() && self.root.is_some() {
            return Err(DecodeError::MultipleRoots);
        }
        let mut element = ElementBuilder::new(utf8(start.name().as_ref())?);
        for attr in start.attributes() {
            let attr = attr.map_err(syntax)?;
            let key = utf8(attr.key.as_ref())?;
            let value = attr.unescape_value().map_err(syntax)?;
            element.attribute(key, value.into_owned());
        }
        Ok(element)
    }

    fn close(&mut self, element: ElementBuilder) -> Result<(), DecodeError> {
        let name = element.name.clone();
        let node = element.finish();
        match self.stack.last_mut() {
            Some(parent) => parent.child(name, node),
            None if self.root.is_some() => return Err(DecodeError::MultipleRoots),
            None => self.root = Some(Document { root: name, body: node }),
        }
        Ok(())
    }

    fn text(&mut self, text: &str) -> Result<(), DecodeError> {
        match self.stack.last_mut() {
            Some(element) => element.push_text(text),
            None if !is_blank(text) => return Err(DecodeError::UnexpectedText),
            None => {}
        }
        Ok(())
    }
}

fn is_blank(text: &str) -> bool {
    text.chars().all(|c| c.is_whitespace() || c == '\u{feff}')
}

fn utf8(bytes: &[u8]) -> Result<String, DecodeError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|_| DecodeError::Utf8)
}

fn syntax(e: impl std::fmt::Display) -> DecodeError {
    DecodeError::Syntax(e.to_string())
}

/// Decode a complete body in one go.
pub fn decode(body: &[u8]) -> Result<Document, DecodeError> {
    let mut decoder = XmlDecoder::new();
    decoder.feed(body)?;
    decoder.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::Node;

    const STORIES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<!-- generated > by tracker -->
<stories type="array" count="2">
  <story>
    <id type="integer">1</id>
    <name>Fix &amp; ship</name>
    <description><![CDATA[a <b> c ]] d]]></description>
    <labels>ui,été</labels>
  </story>
  <story>
    <id type="integer">2</id>
    <name>Title with "quotes" and a > sign</name>
    <url href="http://x/?a=1&amp;b=>"/>
  </story>
</stories>
"#;

    fn chunked(body: &[u8], size: usize) -> Result<Document, DecodeError> {
        let mut decoder = XmlDecoder::new();
        for chunk in body.chunks(size) {
            decoder.feed(chunk)?;
        }
        decoder.finish()
    }

    #[test]
    fn decodes_whole_document() {
        let doc = decode(STORIES.as_bytes()).unwrap();
        assert_eq!(doc.root, "stories");
        assert_eq!(doc.body.attribute("count"), Some("2"));
        let stories = doc.body.expand("story").unwrap();
        assert_eq!(stories.len(), 2);
        assert_eq!(stories[0].field("id"), Some("1"));
        assert_eq!(stories[0].field("name"), Some("Fix & ship"));
        assert_eq!(stories[0].field("description"), Some("a <b> c ]] d"));
        assert_eq!(stories[0].field("labels"), Some("ui,été"));
        assert_eq!(stories[1].field("name"), Some("Title with \"quotes\" and a > sign"));
        assert_eq!(
            stories[1].get("url").and_then(|u| u.attribute("href")),
            Some("http://x/?a=1&b=>")
        );
    }

    #[test]
    fn every_chunk_size_yields_the_same_tree() {
        let whole = decode(STORIES.as_bytes()).unwrap();
        for size in 1..=STORIES.len() {
            assert_eq!(chunked(STORIES.as_bytes(), size).unwrap(), whole, "chunk size {size}");
        }
    }

    #[test]
    fn every_two_way_split_yields_the_same_tree() {
        let bytes = STORIES.as_bytes();
        let whole = decode(bytes).unwrap();
        for split in 0..=bytes.len() {
            let mut decoder = XmlDecoder::new();
            decoder.feed(&bytes[..split]).unwrap();
            decoder.feed(&bytes[split..]).unwrap();
            assert_eq!(decoder.finish().unwrap(), whole, "split at {split}");
        }
    }

    #[test]
    fn single_child_decodes_to_mapping_and_normalizes_to_list() {
        let doc = decode(b"<stories><story><name>only</name></story></stories>").unwrap();
        assert!(matches!(doc.body.get("story"), Some(Node::Mapping(_))));
        assert_eq!(doc.body.expand("story").unwrap().len(), 1);
    }

    #[test]
    fn token_guid_is_a_scalar() {
        let doc = decode(b"<token><guid>ABC123</guid><id type=\"integer\">1</id></token>").unwrap();
        assert_eq!(doc.body.field("guid"), Some("ABC123"));
    }

    #[test]
    fn empty_root_is_empty_scalar() {
        let doc = decode(b"<stories></stories>").unwrap();
        assert_eq!(doc.body, Node::Scalar(String::new()));
        assert_eq!(doc.body.expand("story"), None);
    }

    #[test]
    fn mismatched_close_is_rejected() {
        let err = decode(b"<a><b></a>").unwrap_err();
        assert_eq!(
            err,
            DecodeError::MismatchedTag {
                expected: "b".to_string(),
                found: "a".to_string()
            }
        );
    }

    #[test]
    fn truncated_body_is_incomplete() {
        assert_eq!(decode(b"<a><b>text</b>").unwrap_err(), DecodeError::Incomplete);
        assert_eq!(decode(b"<a><b attr=\"x>").unwrap_err(), DecodeError::Incomplete);
    }

    #[test]
    fn empty_body_has_no_root() {
        assert_eq!(decode(b"").unwrap_err(), DecodeError::Empty);
        assert_eq!(decode(b"<?xml version=\"1.0\"?>\n").unwrap_err(), DecodeError::Empty);
    }

    #[test]
    fn second_root_is_rejected() {
        assert_eq!(decode(b"<a/><b/>").unwrap_err(), DecodeError::MultipleRoots);
    }

    #[test]
    fn stray_text_is_rejected() {
        assert_eq!(decode(b"oops<a/>").unwrap_err(), DecodeError::UnexpectedText);
        assert_eq!(decode(b"<a/>trailing").unwrap_err(), DecodeError::UnexpectedText);
    }

    #[test]
    fn html_error_page_is_not_xml() {
        assert!(decode(b"<html><body><br></body></html>").is_err());
    }

    #[test]
    fn markup_with_inner_angle_brackets_survives_chunking() {
        let body: &[u8] = br#"<?xml version="1.0"?>
<!DOCTYPE stories [
  <!ENTITY note "a b">
  <!ELEMENT stories (story*)>
]>
<?render mode="a > b" ?>
<stories><story><name>x</name></story></stories>"#;
        let whole = decode(body).unwrap();
        assert_eq!(whole.root, "stories");
        assert_eq!(whole.body.expand("story").unwrap()[0].field("name"), Some("x"));
        for size in 1..=body.len() {
            assert_eq!(chunked(body, size).unwrap(), whole, "chunk size {size}");
        }
    }

    #[test]
    fn unfinished_instruction_is_incomplete() {
        assert_eq!(decode(b"<a/><?pi a > b").unwrap_err(), DecodeError::Incomplete);
        assert_eq!(decode(b"<!DOCTYPE a [<!ELEMENT a ANY>").unwrap_err(), DecodeError::Incomplete);
    }

    #[test]
    fn counts_received_bytes() {
        let mut decoder = XmlDecoder::new();
        decoder.feed(b"<a>").unwrap();
        decoder.feed(b"x</a>").unwrap();
        assert_eq!(decoder.received(), 8);
    }
}
