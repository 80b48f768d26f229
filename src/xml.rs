//! Webhook event XML parsing.
//!
//! Vendor events arrive as flat-ish XML (`<xml><InfoType>...</InfoType>...`).
//! [`parse_message`] turns a document into a nested JSON map: an element with
//! only text collapses to a trimmed scalar string (CDATA included), repeated
//! sibling names become an array, nested elements recurse.

use crate::error::AppError;
use quick_xml::events::Event;
use quick_xml::Reader;
use serde_json::{Map, Value};

#[derive(Default)]
struct Node {
    text: String,
    children: Vec<(String, Node)>,
}

/// Parse a vendor event document and return the contents of its root element.
///
/// A root that holds only text yields an empty map.
pub fn parse_message(xml: &str) -> Result<Map<String, Value>, AppError> {
    let root = parse_tree(xml)?;
    match node_to_value(root) {
        Value::Object(map) => Ok(map),
        _ => Ok(Map::new()),
    }
}

fn parse_tree(xml: &str) -> Result<Node, AppError> {
    let mut reader = Reader::from_str(xml);

    // Sentinel container; the document root ends up as its only child.
    let mut stack: Vec<(String, Node)> = vec![(String::new(), Node::default())];

    loop {
        match reader.read_event() {
            Err(e) => return Err(AppError::MalformedBody(e.to_string())),
            Ok(Event::Eof) => break,
            Ok(Event::Start(start)) => {
                let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
                stack.push((name, Node::default()));
            }
            Ok(Event::Empty(empty)) => {
                let name = String::from_utf8_lossy(empty.name().as_ref()).into_owned();
                let top = stack.last_mut().expect("sentinel never popped");
                top.1.children.push((name, Node::default()));
            }
            Ok(Event::End(_)) => {
                let (name, node) = stack.pop().expect("sentinel never popped");
                let top = stack
                    .last_mut()
                    .ok_or_else(|| AppError::MalformedBody("unbalanced element".into()))?;
                top.1.children.push((name, node));
            }
            Ok(Event::Text(text)) => {
                let text = text
                    .unescape()
                    .map_err(|e| AppError::MalformedBody(e.to_string()))?;
                stack
                    .last_mut()
                    .expect("sentinel never popped")
                    .1
                    .text
                    .push_str(&text);
            }
            Ok(Event::CData(cdata)) => {
                let raw = cdata.into_inner();
                let text = std::str::from_utf8(&raw)
                    .map_err(|e| AppError::MalformedBody(e.to_string()))?;
                stack
                    .last_mut()
                    .expect("sentinel never popped")
                    .1
                    .text
                    .push_str(text);
            }
            // Declarations, comments, PIs carry no event data.
            Ok(_) => {}
        }
    }

    if stack.len() != 1 {
        return Err(AppError::MalformedBody("unclosed element".into()));
    }
    let (_, mut sentinel) = stack.pop().expect("sentinel present");
    if sentinel.children.is_empty() {
        return Err(AppError::MalformedBody("no root element".into()));
    }
    let (_, root) = sentinel.children.remove(0);
    Ok(root)
}

fn node_to_value(node: Node) -> Value {
    if node.children.is_empty() {
        return Value::String(node.text.trim().to_string());
    }

    // Interleaved text around child elements is dropped, as in the original
    // event format.
    let mut map = Map::new();
    for (name, child) in node.children {
        let value = node_to_value(child);
        match map.get_mut(&name) {
            None => {
                map.insert(name, value);
            }
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
        }
    }
    Value::Object(map)
}
