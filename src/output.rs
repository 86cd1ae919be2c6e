//! Serialization of response trees to JSON or XML bytes.
//!
//! XML is produced by walking the serialized JSON tree, so element order is
//! the field order of [`crate::siri`].

use std::fmt::Write;

use bytes::Bytes;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::BuildError;
use crate::request::Format;
use crate::siri::Siri;

pub const SIRI_NAMESPACE: &str = "http://www.siri.org.uk/siri";

/// Keys rendered as attributes of their parent element.
const ATTRIBUTES: &[&str] = &["version"];

/// Renders a response in the requested format.
pub fn render(siri: &Siri, format: Format) -> Result<Bytes, BuildError> {
    let tree = serde_json::to_value(siri)?;
    let bytes = match format {
        Format::Json => {
            let mut root = Map::new();
            root.insert("Siri".to_string(), tree);
            serde_json::to_vec(&Value::Object(root))?
        }
        Format::Xml => to_xml(&tree).into_bytes(),
    };
    debug!(%format, bytes = bytes.len(), "Response rendered");
    Ok(Bytes::from(bytes))
}

/// Renders the error payload for a failed request.
pub fn render_error(response_timestamp: String, producer_ref: String, message: String, format: Format) -> Result<Bytes, BuildError> {
    render(&Siri::error(response_timestamp, producer_ref, message), format)
}

fn to_xml(tree: &Value) -> String {
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    let _ = write!(out, "<Siri xmlns=\"{SIRI_NAMESPACE}\">");
    if let Value::Object(children) = tree {
        for (name, value) in children {
            write_element(&mut out, name, value);
        }
    }
    out.push_str("</Siri>");
    out
}

fn write_element(out: &mut String, name: &str, value: &Value) {
    match value {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                write_element(out, name, item);
            }
        }
        Value::Object(fields) => {
            let _ = write!(out, "<{name}");
            for (key, attr) in fields.iter().filter(|(k, _)| ATTRIBUTES.contains(&k.as_str())) {
                let _ = write!(out, " {key}=\"{}\"", escape(&scalar(key, attr)));
            }
            let mut children = fields
                .iter()
                .filter(|(k, v)| !ATTRIBUTES.contains(&k.as_str()) && !v.is_null())
                .peekable();
            if children.peek().is_none() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for (key, child) in children {
                write_element(out, key, child);
            }
            let _ = write!(out, "</{name}>");
        }
        scalar_value => {
            let text = scalar(name, scalar_value);
            if text.is_empty() {
                let _ = write!(out, "<{name}/>");
            } else {
                let _ = write!(out, "<{name}>{}</{name}>", escape(&text));
            }
        }
    }
}

/// Text of a leaf. Coordinates get six decimals, bearings two.
fn scalar(name: &str, value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match (name, n.as_f64()) {
            ("Latitude" | "Longitude", Some(f)) => format!("{f:.6}"),
            ("Bearing", Some(f)) => format!("{f:.2}"),
            _ => n.to_string(),
        },
        _ => String::new(),
    }
}

pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}
