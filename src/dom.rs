//! Shared kuchiki helpers: every processing pass parses a fresh HTML string
//! into a tree, mutates it, and serializes a fresh string back out.

use kuchiki::NodeRef;
use kuchiki::traits::TendrilSink as _;
use markup5ever::{LocalName, QualName, namespace_url, ns};

/// Parse an HTML fragment and return the synthesized `<body>` node.
pub fn parse_body(html: &str) -> NodeRef {
    let document = kuchiki::parse_html().one(html);
    match document.select_first("body") {
        Ok(body) => body.as_node().clone(),
        Err(()) => document,
    }
}

/// Parse an HTML fragment and return its top-level nodes, detached so they can
/// be appended elsewhere.
pub fn parse_fragment(html: &str) -> Vec<NodeRef> {
    let body = parse_body(html);
    let children: Vec<NodeRef> = body.children().collect();
    for child in &children {
        child.detach();
    }
    children
}

/// Serialize the children of `node`, i.e. its inner HTML.
pub fn inner_html(node: &NodeRef) -> String {
    let mut out = Vec::new();
    for child in node.children() {
        child.serialize(&mut out).ok();
    }
    String::from_utf8(out).unwrap_or_default()
}

/// Collect every node matching `selector`, so the tree can be mutated while
/// walking the result.
pub fn select_all(node: &NodeRef, selector: &str) -> Vec<NodeRef> {
    match node.select(selector) {
        Ok(matches) => matches.map(|m| m.as_node().clone()).collect(),
        Err(()) => Vec::new(),
    }
}

pub fn select_first(node: &NodeRef, selector: &str) -> Option<NodeRef> {
    node.select_first(selector)
        .ok()
        .map(|m| m.as_node().clone())
}

pub fn is_element(node: &NodeRef, name: &str) -> bool {
    node.as_element()
        .is_some_and(|el| el.name.local.as_ref() == name)
}

pub fn element_name(node: &NodeRef) -> Option<String> {
    node.as_element().map(|el| el.name.local.to_string())
}

pub fn get_attr(node: &NodeRef, name: &str) -> Option<String> {
    node.as_element()
        .and_then(|el| el.attributes.borrow().get(name).map(str::to_owned))
}

pub fn set_attr(node: &NodeRef, name: &str, value: &str) {
    if let Some(el) = node.as_element() {
        el.attributes.borrow_mut().insert(name, value.to_owned());
    }
}

pub fn new_element<I>(name: &str, attributes: I) -> NodeRef
where
    I: IntoIterator<Item = (&'static str, String)>,
{
    NodeRef::new_element(
        QualName::new(None, ns!(html), LocalName::from(name)),
        attributes.into_iter().map(|(key, value)| {
            (
                kuchiki::ExpandedName::new("", key),
                kuchiki::Attribute {
                    prefix: None,
                    value,
                },
            )
        }),
    )
}

/// Element children only, skipping text and comment nodes.
pub fn element_children(node: &NodeRef) -> Vec<NodeRef> {
    node.children()
        .filter(|child| child.as_element().is_some())
        .collect()
}

/// True when `child` is the only child of its parent, ignoring
/// whitespace-only text nodes.
pub fn is_only_child(child: &NodeRef) -> bool {
    let Some(parent) = child.parent() else {
        return false;
    };
    parent.children().all(|sibling| {
        if sibling == *child {
            return true;
        }
        match sibling.as_text() {
            Some(text) => text.borrow().trim().is_empty(),
            None => false,
        }
    })
}
