//! Recursive partitioning of the flat document into a chapter tree.

use anyhow::Context as _;
use regex::Regex;

use crate::chapter::Chapter;
use crate::dom;
use crate::ids;

const HEADING_TAGS: [&str; 6] = ["h1", "h2", "h3", "h4", "h5", "h6"];

/// Heading tags that act as chapter boundaries: the tags actually present in
/// the document, shallowest first, truncated at `max_depth`. A deeper tag is
/// only promoted to a boundary when every shallower one is already in use.
pub fn detect_heading_tags(html: &str, max_depth: usize) -> Vec<&'static str> {
    let body = dom::parse_body(html);
    let mut tags = Vec::new();
    for tag in HEADING_TAGS {
        if tags.len() == max_depth {
            break;
        }
        if !dom::select_all(&body, tag).is_empty() {
            tags.push(tag);
        }
    }
    tags
}

/// Split the flat document into top-level chapters, recursively populated with
/// children. The returned preface is whatever content precedes the first
/// boundary heading; when the document has no qualifying headings at all it is
/// the whole document and the chapter list is empty.
pub fn parse_chapters(html: &str, max_depth: usize) -> anyhow::Result<(String, Vec<Chapter>)> {
    let tags = detect_heading_tags(html, max_depth);
    split_level(html, &tags, 0)
}

fn split_level(
    html: &str,
    tags: &[&'static str],
    level: usize,
) -> anyhow::Result<(String, Vec<Chapter>)> {
    if level >= tags.len() {
        return Ok((html.trim().to_owned(), Vec::new()));
    }

    let tag = tags[level];
    let boundary = Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
        .with_context(|| format!("compile boundary pattern for <{tag}>"))?;

    let matches: Vec<_> = boundary.find_iter(html).collect();
    if matches.is_empty() {
        return Ok((html.trim().to_owned(), Vec::new()));
    }

    let preface = html[..matches[0].start()].trim().to_owned();
    let mut chapters = Vec::new();

    for (index, heading) in matches.iter().enumerate() {
        let segment_end = matches
            .get(index + 1)
            .map(|next| next.start())
            .unwrap_or(html.len());
        let segment = &html[heading.end()..segment_end];

        let (title, title_id) = heading_info(heading.as_str(), tag);
        let (sub_preface, children) = split_level(segment, tags, level + 1)?;

        let mut content = heading.as_str().to_owned();
        if children.is_empty() {
            content.push_str(segment);
        } else {
            content.push_str(&sub_preface);
        }

        chapters.push(Chapter {
            title,
            title_id,
            level,
            num: chapters.len() + 1,
            content: content.trim().to_owned(),
            children,
            ..Chapter::default()
        });
    }

    Ok((preface, chapters))
}

/// Title text and anchor id of a boundary heading: the existing id attribute
/// wins, otherwise the normalized heading text.
fn heading_info(heading_html: &str, tag: &str) -> (String, String) {
    let body = dom::parse_body(heading_html);
    match dom::select_first(&body, tag) {
        Some(heading) => {
            let title = heading.text_contents().trim().to_owned();
            let title_id = dom::get_attr(&heading, "id")
                .filter(|id| !id.is_empty())
                .unwrap_or_else(|| ids::normalize_id(&title));
            (title, title_id)
        }
        None => (String::new(), String::new()),
    }
}
