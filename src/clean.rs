//! HTML sanitization applied to each chapter before Markdown rendering.
//!
//! Removes non-content machinery, prunes attributes to a small allowlist,
//! and flattens structures the Markdown renderer cannot express (nested
//! tables, paragraph-wrapped cells).

use anyhow::bail;

use crate::dom;
use crate::ids;

/// Tags removed outright, subtrees included.
const STRIPPED_TAGS: &[&str] = &[
    "script", "style", "meta", "link", "iframe", "object", "embed", "form",
];

/// Attributes that survive sanitization. Everything else is dropped.
const KEPT_ATTRIBUTES: &[&str] = &["id", "href", "src", "alt", "title", "colspan", "rowspan"];

/// Nested tables are hoisted, not recursed into; documents that nest deeper
/// than this are considered malformed.
const MAX_TABLE_HOISTS: usize = 100;

/// Sanitize a chapter's HTML. Idempotent: cleaning already-clean content is
/// a no-op.
pub fn clean_html(html: &str) -> anyhow::Result<String> {
    let body = dom::parse_body(html);

    for node in dom::select_all(&body, &STRIPPED_TAGS.join(", ")) {
        node.detach();
    }
    strip_comments(&body);
    // Converts before pruning, which drops the `name` attribute itself.
    name_anchors_to_ids(&body);
    prune_attributes(&body);
    ensure_heading_ids(&body);
    hoist_nested_tables(&body)?;
    unwrap_cell_paragraphs(&body);

    Ok(dom::inner_html(&body))
}

fn strip_comments(body: &kuchiki::NodeRef) {
    let comments: Vec<_> = body
        .inclusive_descendants()
        .filter(|node| node.as_comment().is_some())
        .collect();
    for comment in comments {
        comment.detach();
    }
}

fn prune_attributes(body: &kuchiki::NodeRef) {
    for node in body.inclusive_descendants() {
        let Some(element) = node.as_element() else {
            continue;
        };
        let mut attributes = element.attributes.borrow_mut();
        attributes
            .map
            .retain(|name, _| KEPT_ATTRIBUTES.contains(&name.local.as_ref()));
    }
}

/// Legacy `<a name="x">` targets become modern ids so link resolution only
/// has one kind of target to consider.
fn name_anchors_to_ids(body: &kuchiki::NodeRef) {
    for anchor in dom::select_all(body, "a[name]") {
        if dom::get_attr(&anchor, "id").is_none() {
            if let Some(name) = dom::get_attr(&anchor, "name") {
                dom::set_attr(&anchor, "id", &name);
            }
        }
    }
}

fn ensure_heading_ids(body: &kuchiki::NodeRef) {
    for heading in dom::select_all(body, "h1, h2, h3, h4, h5, h6") {
        let missing = dom::get_attr(&heading, "id").map_or(true, |id| id.is_empty());
        if missing {
            dom::set_attr(&heading, "id", &ids::normalize_id(&heading.text_contents()));
        }
    }
}

/// Move each table nested inside another table to just after its outermost
/// table ancestor. Repeats until no nesting remains.
fn hoist_nested_tables(body: &kuchiki::NodeRef) -> anyhow::Result<()> {
    for _ in 0..MAX_TABLE_HOISTS {
        let Some(nested) = dom::select_all(body, "table")
            .into_iter()
            .find(|table| outermost_table_ancestor(table).is_some())
        else {
            return Ok(());
        };
        let outermost = outermost_table_ancestor(&nested)
            .unwrap_or_else(|| nested.clone());
        nested.detach();
        outermost.insert_after(nested);
    }
    bail!("table nesting exceeds {MAX_TABLE_HOISTS} levels");
}

fn outermost_table_ancestor(table: &kuchiki::NodeRef) -> Option<kuchiki::NodeRef> {
    table
        .ancestors()
        .filter(|ancestor| dom::element_name(ancestor) == Some("table".to_owned()))
        .last()
}

/// A cell whose only child is a single `<p>` renders with a spurious blank
/// line; unwrap the paragraph into the cell.
fn unwrap_cell_paragraphs(body: &kuchiki::NodeRef) {
    for cell in dom::select_all(body, "td, th") {
        let element_children = dom::element_children(&cell);
        let [paragraph] = element_children.as_slice() else {
            continue;
        };
        if dom::element_name(paragraph) != Some("p".to_owned()) {
            continue;
        }
        if !dom::is_only_child(paragraph) {
            continue;
        }
        for child in paragraph.children().collect::<Vec<_>>() {
            cell.append(child);
        }
        paragraph.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_styles_and_comments() {
        let cleaned = clean_html(
            "<p>keep</p><script>alert(1)</script><style>p{}</style><!-- note -->",
        )
        .unwrap();
        assert_eq!(cleaned, "<p>keep</p>");
    }

    #[test]
    fn prunes_attributes_to_allowlist() {
        let cleaned = clean_html(
            "<p class=\"x\" style=\"color:red\" id=\"keep\" data-y=\"1\">t</p>",
        )
        .unwrap();
        assert_eq!(cleaned, "<p id=\"keep\">t</p>");
    }

    #[test]
    fn name_anchors_become_ids() {
        let cleaned = clean_html("<a name=\"target\"></a>").unwrap();
        assert!(cleaned.contains("id=\"target\""));
        assert!(!cleaned.contains("name="));
    }

    #[test]
    fn headings_without_ids_get_normalized_text_ids() {
        let cleaned = clean_html("<h2>Some Heading!</h2>").unwrap();
        assert!(cleaned.contains("<h2 id=\"some-heading\">Some Heading!</h2>"));
    }

    #[test]
    fn nested_tables_are_hoisted_after_the_outer_table() {
        let cleaned = clean_html(concat!(
            "<table><tbody><tr><td>outer",
            "<table><tbody><tr><td>inner</td></tr></tbody></table>",
            "</td></tr></tbody></table>",
        ))
        .unwrap();

        let outer_end = cleaned.find("outer").unwrap();
        let inner_start = cleaned.find("inner").unwrap();
        assert!(inner_start > outer_end);
        assert!(!cleaned.contains("<td>outer<table"));
    }

    #[test]
    fn sole_paragraph_in_cell_is_unwrapped() {
        let cleaned = clean_html(
            "<table><tbody><tr><td><p>text</p></td></tr></tbody></table>",
        )
        .unwrap();
        assert!(cleaned.contains("<td>text</td>"));
    }

    #[test]
    fn cleaning_is_idempotent() {
        let once = clean_html(
            "<h1 class=\"t\">Title</h1><table><tbody><tr><td><p>x</p></td></tr></tbody></table>",
        )
        .unwrap();
        let twice = clean_html(&once).unwrap();
        assert_eq!(once, twice);
    }
}
