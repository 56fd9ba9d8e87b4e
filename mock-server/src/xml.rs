//! XML rendering and request-body reading for the mock service.
//!
//! Collections render one child per item with no wrapper for the single
//! case, which is exactly the one-vs-many ambiguity clients must handle.

use quick_xml::escape::escape;
use quick_xml::events::Event;
use quick_xml::Reader;

use crate::store::{Membership, Project, Story};

pub const DECLARATION: &str = r#"<?xml version="1.0" encoding="UTF-8"?>"#;

/// Fields rendered with an integer type annotation.
const INTEGER_FIELDS: &[&str] = &["estimate"];

fn text(out: &mut String, name: &str, value: &str) {
    out.push_str(&format!("<{name}>{}</{name}>", escape(value)));
}

fn integer(out: &mut String, name: &str, value: u64) {
    out.push_str(&format!(r#"<{name} type="integer">{value}</{name}>"#));
}

pub fn token(guid: &str, id: u64) -> String {
    let mut out = String::from(DECLARATION);
    out.push_str("<token>");
    text(&mut out, "guid", guid);
    integer(&mut out, "id", id);
    out.push_str("</token>");
    out
}

pub fn errors(message: &str) -> String {
    let mut out = String::from(DECLARATION);
    out.push_str("<errors>");
    text(&mut out, "error", message);
    out.push_str("</errors>");
    out
}

fn write_project(out: &mut String, project: &Project) {
    out.push_str("<project>");
    integer(out, "id", project.id);
    text(out, "name", &project.name);
    integer(out, "iteration_length", 1);
    out.push_str("</project>");
}

pub fn project(project: &Project) -> String {
    let mut out = String::from(DECLARATION);
    write_project(&mut out, project);
    out
}

pub fn projects<'a>(projects: impl IntoIterator<Item = &'a Project>) -> String {
    let mut out = String::from(DECLARATION);
    out.push_str(r#"<projects type="array">"#);
    for p in projects {
        write_project(&mut out, p);
    }
    out.push_str("</projects>");
    out
}

pub fn memberships<'a>(project: &Project, memberships: impl IntoIterator<Item = &'a Membership>) -> String {
    let mut out = String::from(DECLARATION);
    out.push_str(r#"<memberships type="array">"#);
    for m in memberships {
        out.push_str("<membership>");
        integer(&mut out, "id", m.id);
        out.push_str("<person>");
        text(&mut out, "email", &m.email);
        text(&mut out, "name", &m.name);
        out.push_str("</person>");
        text(&mut out, "role", &m.role);
        out.push_str("<project>");
        integer(&mut out, "id", project.id);
        text(&mut out, "name", &project.name);
        out.push_str("</project>");
        out.push_str("</membership>");
    }
    out.push_str("</memberships>");
    out
}

fn write_story(out: &mut String, story: &Story) {
    out.push_str("<story>");
    integer(out, "id", story.id);
    integer(out, "project_id", story.project_id);
    for (name, value) in &story.fields {
        match value.parse::<u64>() {
            Ok(n) if INTEGER_FIELDS.contains(&name.as_str()) => integer(out, name, n),
            _ => text(out, name, value),
        }
    }
    out.push_str("</story>");
}

pub fn story(story: &Story) -> String {
    let mut out = String::from(DECLARATION);
    write_story(&mut out, story);
    out
}

pub fn stories<'a>(stories: impl IntoIterator<Item = &'a Story>) -> String {
    let mut out = String::from(DECLARATION);
    let mut inner = String::new();
    let mut count = 0;
    for s in stories {
        write_story(&mut inner, s);
        count += 1;
    }
    out.push_str(&format!(r#"<stories type="array" count="{count}">"#));
    out.push_str(&inner);
    out.push_str("</stories>");
    out
}

/// One iteration: its number and the stories it holds.
pub struct IterationView<'a> {
    pub number: u64,
    pub stories: Vec<&'a Story>,
}

pub fn iterations(iterations: &[IterationView<'_>]) -> String {
    let mut out = String::from(DECLARATION);
    out.push_str(r#"<iterations type="array">"#);
    for it in iterations {
        out.push_str("<iteration>");
        integer(&mut out, "id", it.number);
        integer(&mut out, "number", it.number);
        out.push_str(r#"<stories type="array">"#);
        for s in &it.stories {
            write_story(&mut out, s);
        }
        out.push_str("</stories>");
        out.push_str("</iteration>");
    }
    out.push_str("</iterations>");
    out
}

/// Read the direct children of a `<root>` document as name/text pairs.
pub fn read_fields(body: &str, root: &str) -> Result<Vec<(String, String)>, String> {
    let mut reader = Reader::from_str(body);
    let mut depth = 0usize;
    let mut current: Option<String> = None;
    let mut value = String::new();
    let mut fields = Vec::new();
    let mut saw_root = false;

    loop {
        match reader.read_event().map_err(|e| e.to_string())? {
            Event::Start(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                depth += 1;
                match depth {
                    1 if name == root => saw_root = true,
                    1 => return Err(format!("expected <{root}>, found <{name}>")),
                    2 => {
                        current = Some(name);
                        value.clear();
                    }
                    _ => return Err(format!("unexpected nested element <{name}>")),
                }
            }
            Event::Empty(e) => {
                let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
                match depth {
                    0 if name == root => saw_root = true,
                    1 => fields.push((name, String::new())),
                    _ => return Err(format!("unexpected element <{name}>")),
                }
            }
            Event::Text(t) if depth == 2 => {
                value.push_str(&t.unescape().map_err(|e| e.to_string())?);
            }
            Event::CData(c) if depth == 2 => {
                value.push_str(&String::from_utf8_lossy(&c));
            }
            Event::End(_) => {
                if depth == 2 {
                    if let Some(name) = current.take() {
                        fields.push((name, value.trim().to_string()));
                    }
                }
                depth = depth.saturating_sub(1);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if saw_root {
        Ok(fields)
    } else {
        Err(format!("missing <{root}> element"))
    }
}
