//! Footnote detection and relocation.
//!
//! Runs exactly once over the whole flat document, before chapter splitting:
//! footnote targets can appear anywhere, including after the heading that will
//! become their owning chapter's boundary. Extracted definitions are held in a
//! [`Footnotes`] map and reinserted per chapter later.

use std::collections::HashMap;

use kuchiki::NodeRef;

use crate::dom;
use crate::ids;

/// Extracted footnote definitions, keyed by the origin anchor's href.
///
/// Single-owner consumable map: [`Footnotes::claim`] removes the entry, so a
/// definition can only ever be reinserted into one chapter.
#[derive(Debug, Default)]
pub struct Footnotes {
    entries: HashMap<String, String>,
}

impl Footnotes {
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, origin_href: &str) -> bool {
        self.entries.contains_key(origin_href)
    }

    /// Take the definition for `origin_href` out of the map. Returns `None`
    /// when absent or already claimed by another chapter.
    pub fn claim(&mut self, origin_href: &str) -> Option<String> {
        self.entries.remove(origin_href)
    }
}

/// True when `anchor` is shaped like a footnote origin marker: either the sole
/// child of a `<sup>` wrapper, or itself wrapping a sole `<sup>` child.
pub fn is_origin_shaped(anchor: &NodeRef) -> bool {
    if let Some(parent) = anchor.parent()
        && dom::is_element(&parent, "sup")
        && dom::is_only_child(anchor)
    {
        return true;
    }

    let children = dom::element_children(anchor);
    matches!(&children[..], [only] if dom::is_element(only, "sup") && dom::is_only_child(only))
}

/// Remove footnote definitions from `html` and return the stripped document
/// together with the extracted [`Footnotes`] map.
///
/// An anchor qualifies as a footnote origin when it is origin-shaped (see
/// [`is_origin_shaped`]), carries an id (its own, or its `<sup>` wrapper's)
/// and a same-document href, and the referenced element links back to the
/// origin id. Anchors without a back-link are left untouched.
pub fn extract(html: &str) -> (String, Footnotes) {
    let body = dom::parse_body(html);
    let mut entries = HashMap::new();

    for anchor in dom::select_all(&body, "a") {
        if !is_origin_shaped(&anchor) {
            continue;
        }

        let Some(origin_href) = dom::get_attr(&anchor, "href") else {
            continue;
        };
        if !origin_href.starts_with('#') {
            continue;
        }

        // The origin id may sit on the anchor or on its <sup> wrapper.
        let origin_id = dom::get_attr(&anchor, "id").or_else(|| {
            anchor
                .parent()
                .filter(|parent| dom::is_element(parent, "sup"))
                .and_then(|parent| dom::get_attr(&parent, "id"))
        });
        let Some(origin_id) = origin_id else {
            continue;
        };

        let target_id = ids::id_from_ref(&origin_href);
        let Some(target) = dom::select_first(&body, &format!("[id=\"{target_id}\"]")) else {
            continue;
        };

        // Mutual linkage is what distinguishes a footnote pair from an
        // incidental anchor: the target must link back to the origin.
        let back_ref = ids::ref_from_id(&origin_id);
        let back_links = dom::select_all(&target, &format!("a[href=\"{back_ref}\"]"));
        if back_links.is_empty() {
            continue;
        }
        for back_link in back_links {
            back_link.detach();
        }

        let definition = normalize_target(&target, &anchor.text_contents());
        entries.insert(origin_href, definition);
        target.detach();
    }

    (dom::inner_html(&body), Footnotes { entries })
}

/// Rebuild the target element as `<p><sup>...</sup></p>` content: the marker
/// wrapper carries the target's attributes and its text is prefixed with the
/// origin anchor's visible text unless already present. Returns the inner HTML
/// of the paragraph wrapper.
fn normalize_target(target: &NodeRef, origin_text: &str) -> String {
    let paragraph = match dom::element_children(target).as_slice() {
        [only] if dom::is_element(only, "p") && dom::is_only_child(only) => only.clone(),
        _ => {
            let paragraph = dom::new_element("p", []);
            for child in target.children().collect::<Vec<_>>() {
                paragraph.append(child);
            }
            paragraph
        }
    };

    let marker = match dom::element_children(&paragraph).first() {
        Some(first) if dom::is_element(first, "sup") => first.clone(),
        _ => {
            let marker = dom::new_element("sup", []);
            for child in paragraph.children().collect::<Vec<_>>() {
                marker.append(child);
            }
            paragraph.append(marker.clone());
            marker
        }
    };

    let origin_text = origin_text.trim();
    let content = dom::inner_html(&marker).trim().to_owned();
    let prefixed = if origin_text.is_empty() || content.starts_with(origin_text) {
        content
    } else {
        format!("{origin_text} {content}").trim().to_owned()
    };
    for child in marker.children().collect::<Vec<_>>() {
        child.detach();
    }
    for node in dom::parse_fragment(&prefixed) {
        marker.append(node);
    }

    if let (Some(marker_el), Some(target_el)) = (marker.as_element(), target.as_element()) {
        let source = target_el.attributes.borrow();
        let mut dest = marker_el.attributes.borrow_mut();
        for (name, attribute) in &source.map {
            dest.map.insert(name.clone(), attribute.clone());
        }
    }

    dom::inner_html(&paragraph)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_a_mutually_linked_pair() {
        let html = concat!(
            "<p>content <a href=\"#fn1\" id=\"o1\"><sup>1</sup></a></p>",
            "<sup id=\"fn1\"><a href=\"#o1\">back</a>text</sup>",
        );
        let (stripped, footnotes) = extract(html);

        assert!(footnotes.contains("#fn1"));
        assert!(!stripped.contains("id=\"fn1\""));
        // The origin marker stays in the running text.
        assert!(stripped.contains("id=\"o1\""));
    }

    #[test]
    fn definition_keeps_target_attributes_and_origin_prefix() {
        let html = concat!(
            "<p><sup id=\"o1\"><a href=\"#fn1\">1</a></sup></p>",
            "<div id=\"fn1\" class=\"note\"><a href=\"#o1\">up</a> the note body</div>",
        );
        let (_, mut footnotes) = extract(html);

        let definition = footnotes.claim("#fn1").expect("definition extracted");
        assert!(definition.contains("id=\"fn1\""));
        assert!(definition.contains("1 the note body"));
        // The back-link to the origin is dropped from the definition.
        assert!(!definition.contains("href=\"#o1\""));
    }

    #[test]
    fn anchor_without_back_link_is_not_a_footnote() {
        let html = concat!(
            "<p><sup><a href=\"#section\" id=\"o1\">see</a></sup></p>",
            "<h2 id=\"section\">Section</h2>",
        );
        let (stripped, footnotes) = extract(html);

        assert!(footnotes.is_empty());
        assert!(stripped.contains("<h2 id=\"section\">Section</h2>"));
        assert!(stripped.contains("href=\"#section\""));
    }

    #[test]
    fn claim_is_exclusive() {
        let html = concat!(
            "<p><sup id=\"o1\"><a href=\"#fn1\">1</a></sup></p>",
            "<p id=\"fn1\"><a href=\"#o1\">back</a> note</p>",
        );
        let (_, mut footnotes) = extract(html);

        assert!(footnotes.claim("#fn1").is_some());
        assert!(footnotes.claim("#fn1").is_none());
    }
}
