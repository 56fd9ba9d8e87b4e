//! XML request bodies for write operations.
//!
//! # Design
//! A body is a root element named for the resource with one child per
//! field, in insertion order. Values are stringified and written as text
//! nodes, so escaping is whatever quick-xml guarantees for text. The one
//! exception is `estimate`, which the service only accepts with a
//! `type="integer"` annotation.

use std::fmt;

use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;

use crate::error::TrackerError;

/// Field that carries a numeric type annotation.
const TYPED_INTEGER_FIELD: &str = "estimate";

/// A scalar field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Text(String),
    Integer(i64),
    Boolean(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Integer(n) => write!(f, "{n}"),
            FieldValue::Boolean(b) => write!(f, "{b}"),
        }
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::Text(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<i32> for FieldValue {
    fn from(value: i32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<u32> for FieldValue {
    fn from(value: u32) -> Self {
        FieldValue::Integer(value.into())
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

/// Ordered field-name to value mapping used to build a body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fields {
    entries: Vec<(String, FieldValue)>,
}

impl Fields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, value: impl Into<FieldValue>) -> Self {
        self.insert(name, value);
        self
    }

    /// Insert a field. Re-inserting an existing name replaces its value but
    /// keeps its original position.
    pub fn insert(&mut self, name: &str, value: impl Into<FieldValue>) {
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| k == name) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((name.to_string(), value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.entries.iter().find(|(k, _)| k == name).map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }
}

impl<K: AsRef<str>, V: Into<FieldValue>> FromIterator<(K, V)> for Fields {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut fields = Fields::new();
        for (k, v) in iter {
            fields.insert(k.as_ref(), v);
        }
        fields
    }
}

/// Write `fields` as children of a `root` element.
pub fn serialize(root: &str, fields: &Fields) -> Result<String, TrackerError> {
    check_element_name(root)?;

    let mut writer = Writer::new(Vec::new());
    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(write_failed)?;
    writer
        .write_event(Event::Start(BytesStart::new(root)))
        .map_err(write_failed)?;

    for (name, value) in fields.iter() {
        check_element_name(name)?;
        let mut start = BytesStart::new(name);
        if name == TYPED_INTEGER_FIELD {
            start.push_attribute(("type", "integer"));
        }
        let text = value.to_string();
        writer.write_event(Event::Start(start)).map_err(write_failed)?;
        writer
            .write_event(Event::Text(BytesText::new(&text)))
            .map_err(write_failed)?;
        writer
            .write_event(Event::End(BytesEnd::new(name)))
            .map_err(write_failed)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new(root)))
        .map_err(write_failed)?;

    String::from_utf8(writer.into_inner()).map_err(write_failed)
}

pub fn story_body(fields: &Fields) -> Result<String, TrackerError> {
    serialize("story", fields)
}

pub fn project_body(name: &str) -> Result<String, TrackerError> {
    serialize("project", &Fields::new().with("name", name))
}

fn write_failed(e: impl fmt::Display) -> TrackerError {
    TrackerError::Serialization(e.to_string())
}

/// Field names become element names verbatim, so reject anything that
/// cannot be one.
fn check_element_name(name: &str) -> Result<(), TrackerError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':');
    let valid_rest = chars.all(|c| c.is_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));
    if valid_start && valid_rest {
        Ok(())
    } else {
        Err(TrackerError::Serialization(format!(
            "{name:?} is not a valid element name"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn estimate_gets_integer_annotation() {
        let fields = Fields::new().with("name", "Fix bug").with("estimate", 3);
        let xml = story_body(&fields).unwrap();
        assert!(xml.contains("<name>Fix bug</name>"), "{xml}");
        assert!(xml.contains(r#"<estimate type="integer">3</estimate>"#), "{xml}");
    }

    #[test]
    fn other_fields_never_carry_a_type() {
        let fields = Fields::new()
            .with("name", "Fix bug")
            .with("story_type", "bug")
            .with("owned_by", "Ada")
            .with("points", 5);
        let xml = story_body(&fields).unwrap();
        assert!(!xml.contains("type="), "{xml}");
        assert!(xml.contains("<points>5</points>"));
    }

    #[test]
    fn fields_follow_insertion_order() {
        let fields = Fields::new()
            .with("zeta", "1")
            .with("alpha", "2")
            .with("mid", "3");
        let xml = story_body(&fields).unwrap();
        let z = xml.find("<zeta>").unwrap();
        let a = xml.find("<alpha>").unwrap();
        let m = xml.find("<mid>").unwrap();
        assert!(z < a && a < m);
    }

    #[test]
    fn reinsert_keeps_position() {
        let mut fields = Fields::new().with("name", "a").with("estimate", 1);
        fields.insert("name", "b");
        let names: Vec<&str> = fields.iter().map(|(k, _)| k).collect();
        assert_eq!(names, ["name", "estimate"]);
        assert_eq!(fields.get("name"), Some(&FieldValue::Text("b".to_string())));
    }

    #[test]
    fn text_is_escaped() {
        let xml = story_body(&Fields::new().with("name", "a < b & c")).unwrap();
        assert!(xml.contains("<name>a &lt; b &amp; c</name>"), "{xml}");
    }

    #[test]
    fn project_body_has_project_root() {
        let xml = project_body("Apollo").unwrap();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("<project><name>Apollo</name></project>"), "{xml}");
    }

    #[test]
    fn invalid_field_name_is_rejected() {
        let err = story_body(&Fields::new().with("bad name", "x")).unwrap_err();
        assert!(matches!(err, TrackerError::Serialization(_)));
    }

    #[test]
    fn collects_from_pairs() {
        let fields: Fields = vec![("name", "x"), ("labels", "ui")].into_iter().collect();
        assert_eq!(fields.len(), 2);
    }
}
