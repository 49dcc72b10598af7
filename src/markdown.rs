//! HTML to Markdown rendering with book-specific rules layered over
//! [`html2md`]: heading anchors, footnote references and definitions,
//! definition lists, and a few tags the stock renderer mishandles.

use std::collections::HashMap;
use std::sync::LazyLock;

use html2md::{StructuredPrinter, TagHandler, TagHandlerFactory};
use markup5ever_rcdom::{Handle, NodeData};
use regex::Regex;

/// Trailing "back to origin" link inside a footnote definition body.
static BACK_LINK_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]\([^()]*\)\s*$").unwrap());

/// Render `html` to Markdown.
pub fn render(html: &str) -> String {
    html2md::parse_html_custom(html, &handlers()).trim().to_owned()
}

fn handlers() -> HashMap<String, Box<dyn TagHandlerFactory>> {
    let mut map: HashMap<String, Box<dyn TagHandlerFactory>> = HashMap::new();
    for level in 1..=6 {
        map.insert(format!("h{level}"), Box::new(HeadingFactory { level }));
    }
    map.insert("sup".to_owned(), Box::new(FootnoteFactory));
    map.insert("a".to_owned(), Box::new(AnchorFactory));
    for tag in ["section", "div", "span"] {
        map.insert(tag.to_owned(), Box::new(PassThroughFactory));
    }
    map.insert("dl".to_owned(), Box::new(DefinitionListFactory));
    for tag in ["dt", "dd"] {
        map.insert(tag.to_owned(), Box::new(DefinitionItemFactory));
    }
    map.insert("abbr".to_owned(), Box::new(AbbreviationFactory));
    map.insert("colgroup".to_owned(), Box::new(SuppressFactory));
    map
}

struct HeadingFactory {
    level: usize,
}

impl TagHandlerFactory for HeadingFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(HeadingHandler {
            level: self.level,
            id: None,
        })
    }
}

/// `#`-prefixed heading line with an explicit `{#id}` anchor suffix when the
/// heading carries an id.
struct HeadingHandler {
    level: usize,
    id: Option<String>,
}

impl TagHandler for HeadingHandler {
    fn handle(&mut self, tag: &Handle, printer: &mut StructuredPrinter) {
        self.id = attr(tag, "id").filter(|id| !id.is_empty());
        printer.insert_newline();
        printer.insert_newline();
        printer.append_str(&"#".repeat(self.level));
        printer.append_str(" ");
    }

    fn after_handle(&mut self, printer: &mut StructuredPrinter) {
        if let Some(id) = &self.id {
            printer.append_str(&format!(" {{#{id}}}"));
        }
        printer.insert_newline();
        printer.insert_newline();
    }
}

struct FootnoteFactory;

impl TagHandlerFactory for FootnoteFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(FootnoteHandler {
            state: FootnoteState::PassThrough,
        })
    }
}

enum FootnoteState {
    /// `<sup>` whose sole child is a same-document anchor: emitted as an
    /// inline `[^ref]` with descendants skipped.
    Origin,
    /// `<sup id=..>` definition body: children render normally, then the
    /// result is rewritten into a `[^ref]: content` line.
    Definition { start_pos: usize },
    /// Anything else renders as its plain content.
    PassThrough,
}

struct FootnoteHandler {
    state: FootnoteState,
}

impl TagHandler for FootnoteHandler {
    fn handle(&mut self, tag: &Handle, printer: &mut StructuredPrinter) {
        if let Some(anchor) = sole_anchor_child(tag) {
            self.state = FootnoteState::Origin;
            let reference = alphanumerics(&text_content(&anchor));
            printer.append_str(&format!("[^{reference}]"));
        } else if attr(tag, "id").is_some() {
            self.state = FootnoteState::Definition {
                start_pos: printer.data.len(),
            };
        }
    }

    fn after_handle(&mut self, printer: &mut StructuredPrinter) {
        let FootnoteState::Definition { start_pos } = &self.state else {
            return;
        };
        let start_pos = *start_pos;
        let body = printer.data.split_off(start_pos);
        let body = BACK_LINK_RE.replace(&body, "");
        let body = body.trim();

        let mut words = body.split_whitespace();
        let reference = alphanumerics(words.next().unwrap_or_default());
        let rest = words.collect::<Vec<_>>().join(" ");

        printer.insert_newline();
        printer.insert_newline();
        printer.append_str(&format!("[^{reference}]: {rest}"));
        printer.insert_newline();
    }

    fn skip_descendants(&self) -> bool {
        matches!(self.state, FootnoteState::Origin)
    }
}

struct AnchorFactory;

impl TagHandlerFactory for AnchorFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(AnchorHandler {
            href: None,
            footnote: false,
        })
    }
}

/// Standard link syntax, with two exceptions: an anchor wrapping a sole
/// `<sup>` marker becomes an inline footnote reference, and an anchor with no
/// href is stripped to its content.
struct AnchorHandler {
    href: Option<String>,
    footnote: bool,
}

impl TagHandler for AnchorHandler {
    fn handle(&mut self, tag: &Handle, printer: &mut StructuredPrinter) {
        let href = attr(tag, "href");
        if href.as_deref().is_some_and(|href| href.starts_with('#')) {
            if let Some(marker) = sole_sup_child(tag) {
                self.footnote = true;
                let reference = alphanumerics(&text_content(&marker));
                printer.append_str(&format!("[^{reference}]"));
                return;
            }
        }
        self.href = href;
        if self.href.is_some() {
            printer.append_str("[");
        }
    }

    fn after_handle(&mut self, printer: &mut StructuredPrinter) {
        if self.footnote {
            return;
        }
        if let Some(href) = &self.href {
            printer.append_str(&format!("]({href})"));
        }
    }

    fn skip_descendants(&self) -> bool {
        self.footnote
    }
}

struct PassThroughFactory;

impl TagHandlerFactory for PassThroughFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(PassThroughHandler)
    }
}

/// Renders only the tag's content. Overrides the stock block treatment of
/// `div` and friends, which inserts separators mid-sentence.
struct PassThroughHandler;

impl TagHandler for PassThroughHandler {
    fn handle(&mut self, _tag: &Handle, _printer: &mut StructuredPrinter) {}

    fn after_handle(&mut self, _printer: &mut StructuredPrinter) {}
}

struct DefinitionListFactory;

impl TagHandlerFactory for DefinitionListFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(DefinitionListHandler)
    }
}

/// `<dl>` renders like an unordered list, one item per `<dt>`/`<dd>`.
struct DefinitionListHandler;

impl TagHandler for DefinitionListHandler {
    fn handle(&mut self, _tag: &Handle, printer: &mut StructuredPrinter) {
        printer.insert_newline();
    }

    fn after_handle(&mut self, printer: &mut StructuredPrinter) {
        printer.insert_newline();
        printer.insert_newline();
    }
}

struct DefinitionItemFactory;

impl TagHandlerFactory for DefinitionItemFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(DefinitionItemHandler { start_pos: 0 })
    }
}

struct DefinitionItemHandler {
    start_pos: usize,
}

impl TagHandler for DefinitionItemHandler {
    fn handle(&mut self, tag: &Handle, printer: &mut StructuredPrinter) {
        printer.insert_newline();
        match ordered_list_position(tag) {
            Some(position) => printer.append_str(&format!("{position}.  ")),
            None => printer.append_str("*   "),
        }
        self.start_pos = printer.data.len();
    }

    fn after_handle(&mut self, printer: &mut StructuredPrinter) {
        // Continuation lines of an item are indented under its bullet.
        let body = printer.data.split_off(self.start_pos);
        let body = body.trim_start().replace('\n', "\n    ");
        printer.append_str(&body);
    }
}

struct AbbreviationFactory;

impl TagHandlerFactory for AbbreviationFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(AbbreviationHandler)
    }
}

struct AbbreviationHandler;

impl TagHandler for AbbreviationHandler {
    fn handle(&mut self, _tag: &Handle, printer: &mut StructuredPrinter) {
        printer.append_str("_");
    }

    fn after_handle(&mut self, printer: &mut StructuredPrinter) {
        printer.append_str("_");
    }
}

struct SuppressFactory;

impl TagHandlerFactory for SuppressFactory {
    fn instantiate(&self) -> Box<dyn TagHandler> {
        Box::new(SuppressHandler)
    }
}

struct SuppressHandler;

impl TagHandler for SuppressHandler {
    fn handle(&mut self, _tag: &Handle, _printer: &mut StructuredPrinter) {}

    fn after_handle(&mut self, _printer: &mut StructuredPrinter) {}

    fn skip_descendants(&self) -> bool {
        true
    }
}

/// 1-based position of `tag` among its parent's element children, when that
/// parent is an ordered-list-equivalent.
fn ordered_list_position(tag: &Handle) -> Option<usize> {
    let parent = tag.parent.take()?;
    let upgraded = parent.upgrade();
    tag.parent.set(Some(parent));
    let parent = upgraded?;

    if tag_name(&parent).as_deref() != Some("ol") {
        return None;
    }
    parent
        .children
        .borrow()
        .iter()
        .filter(|child| matches!(child.data, NodeData::Element { .. }))
        .position(|child| std::rc::Rc::ptr_eq(child, tag))
        .map(|index| index + 1)
}

fn attr(tag: &Handle, name: &str) -> Option<String> {
    match &tag.data {
        NodeData::Element { attrs, .. } => attrs
            .borrow()
            .iter()
            .find(|attr| attr.name.local.as_ref() == name)
            .map(|attr| attr.value.to_string()),
        _ => None,
    }
}

fn tag_name(tag: &Handle) -> Option<String> {
    match &tag.data {
        NodeData::Element { name, .. } => Some(name.local.to_string()),
        _ => None,
    }
}

fn text_content(tag: &Handle) -> String {
    let mut text = String::new();
    collect_text(tag, &mut text);
    text
}

fn collect_text(node: &Handle, out: &mut String) {
    if let NodeData::Text { contents } = &node.data {
        out.push_str(&contents.borrow());
    }
    for child in node.children.borrow().iter() {
        collect_text(child, out);
    }
}

/// The tag's single element child, required to be `name`, with no
/// non-whitespace text around it.
fn sole_element_child(tag: &Handle, name: &str) -> Option<Handle> {
    let mut found = None;
    for child in tag.children.borrow().iter() {
        match &child.data {
            NodeData::Element { .. } => {
                if found.is_some() || tag_name(child).as_deref() != Some(name) {
                    return None;
                }
                found = Some(child.clone());
            }
            NodeData::Text { contents } => {
                if !contents.borrow().trim().is_empty() {
                    return None;
                }
            }
            _ => {}
        }
    }
    found
}

fn sole_anchor_child(tag: &Handle) -> Option<Handle> {
    sole_element_child(tag, "a")
}

fn sole_sup_child(tag: &Handle) -> Option<Handle> {
    sole_element_child(tag, "sup")
}

fn alphanumerics(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headings_carry_anchor_suffixes() {
        let md = render("<h1 id=\"intro\">Intro</h1><p>hi</p>");
        assert!(md.starts_with("# Intro {#intro}"));
        assert!(md.contains("hi"));
    }

    #[test]
    fn headings_without_ids_have_no_suffix() {
        let md = render("<h2>Plain</h2>");
        assert_eq!(md, "## Plain");
    }

    #[test]
    fn sup_wrapped_anchor_becomes_footnote_reference() {
        let md = render("<p>word <sup id=\"o1\"><a href=\"#fn1\">1</a></sup></p>");
        assert!(md.contains("word [^1]"));
        assert!(!md.contains("#fn1"));
    }

    #[test]
    fn anchor_wrapped_sup_becomes_footnote_reference() {
        let md = render("<p>word <a href=\"#fn1\" id=\"o1\"><sup>1</sup></a></p>");
        assert!(md.contains("word [^1]"));
    }

    #[test]
    fn sup_with_id_becomes_footnote_definition() {
        let md = render("<p>body</p><p><sup id=\"fn1\">1 the note text</sup></p>");
        assert!(md.contains("[^1]: the note text"));
    }

    #[test]
    fn definition_strips_trailing_back_link() {
        let md = render("<p><sup id=\"fn1\">1 note text <a href=\"#o1\">back</a></sup></p>");
        assert!(md.contains("[^1]: note text"));
        assert!(!md.contains("back"));
    }

    #[test]
    fn links_render_and_bare_anchors_are_stripped() {
        let md = render("<p><a href=\"ch.md\">go</a> and <a>stay</a></p>");
        assert!(md.contains("[go](ch.md)"));
        assert!(md.contains("and stay"));
        assert!(!md.contains("[stay]"));
    }

    #[test]
    fn definition_lists_render_as_bullets() {
        let md = render("<dl><dt>term</dt><dd>meaning</dd></dl>");
        assert!(md.contains("*   term"));
        assert!(md.contains("*   meaning"));
    }

    #[test]
    fn abbreviations_render_as_emphasis() {
        let md = render("<p><abbr title=\"HyperText\">HTML</abbr></p>");
        assert!(md.contains("_HTML_"));
    }

    #[test]
    fn wrapper_tags_are_transparent() {
        let md = render("<div><section><span>one</span> two</section></div>");
        assert_eq!(md, "one two");
    }
}
