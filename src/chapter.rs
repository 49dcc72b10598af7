//! A chapter of the output book: one node of the tree produced by the
//! splitter, materialized as a Markdown file (or a directory with a README
//! when it has children).

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::clean;
use crate::dom;
use crate::footnotes::{self, Footnotes};
use crate::ids;
use crate::markdown;

/// Default preface used when the source document has no content before its
/// first chapter heading.
pub const DEFAULT_README_CONTENT: &str = "<p>This file serves as your book's preface, \
a great place to describe your book's content and ideas.</p>";

#[derive(Debug, Clone, Default)]
pub struct Chapter {
    pub title: String,
    pub title_id: String,
    /// Depth in the heading hierarchy, 0 for top-level chapters.
    pub level: usize,
    /// 1-based position among siblings.
    pub num: usize,
    /// HTML content, mutated in place through each processing stage.
    pub content: String,
    pub children: Vec<Chapter>,
    /// Output directory on disk. Set once by [`generate_filenames`].
    pub path: PathBuf,
    pub filename: String,
    pub filepath: PathBuf,
    /// Location relative to the export root, '/'-joined for SUMMARY.md.
    pub summary_path: String,
    /// Rendered Markdown, filled by [`Chapter::to_markdown`].
    pub markdown: String,
}

impl Chapter {
    /// The book's root chapter, emitted as `README.md` at the export root and
    /// always first in the chapter list.
    pub fn readme(document_title: &str, export_dir: &Path, content: ReadmeContent) -> Chapter {
        let content = match content {
            ReadmeContent::Default => {
                format!("<h1>{document_title}</h1>{DEFAULT_README_CONTENT}")
            }
            // Leftover top-level content already starts with its own heading
            // or running text; prefix the book title.
            ReadmeContent::Preface(preface) => format!("<h1>{document_title}</h1>{preface}"),
            // An absorbed first chapter carries its own <h1> title.
            ReadmeContent::FirstChapter(chapter_content) => chapter_content,
        };

        Chapter {
            title: document_title.to_owned(),
            title_id: ids::normalize_id(document_title),
            content,
            filename: "README.md".to_owned(),
            summary_path: "README.md".to_owned(),
            path: export_dir.to_owned(),
            filepath: export_dir.join("README.md"),
            ..Chapter::default()
        }
    }

    /// Sanitize this chapter's HTML. Failures here are recoverable: the
    /// caller logs and keeps the unsanitized content.
    pub fn clean_html(&mut self) -> anyhow::Result<()> {
        self.content = clean::clean_html(&self.content)?;
        Ok(())
    }

    /// Rewrite every same-document reference to `old_id` so it points at
    /// `new_id` instead, in hrefs and in this chapter's own title id.
    pub fn replace_link_refs(&mut self, old_id: &str, new_id: &str) {
        if old_id.is_empty() {
            return;
        }

        let old_ref = ids::ref_from_id(old_id);
        let new_ref = ids::ref_from_id(new_id);

        let body = dom::parse_body(&self.content);
        let links = dom::select_all(&body, &format!("[href=\"{old_ref}\"]"));
        if !links.is_empty() {
            for link in links {
                dom::set_attr(&link, "href", &new_ref);
            }
            self.content = dom::inner_html(&body);
        }

        if self.title_id == old_id {
            self.title_id = new_id.to_owned();
        }
    }

    /// Give every heading in this chapter a normalized, pass-unique id and
    /// return the (old, new) renames in document order. Link rewriting is the
    /// caller's second phase (see [`normalize_all_title_ids`]).
    pub fn normalize_title_ids(&mut self) -> Vec<(String, String)> {
        let body = dom::parse_body(&self.content);
        let mut renames = Vec::new();
        let mut assigned: Vec<String> = Vec::new();

        for heading in dom::select_all(&body, "h1, h2, h3, h4, h5, h6") {
            let old_id = dom::get_attr(&heading, "id").unwrap_or_default();
            let text_id = ids::normalize_id(&heading.text_contents());

            let mut new_id = text_id.clone();
            let mut counter = 0usize;
            while assigned.contains(&new_id) {
                new_id = format!("{text_id}-{counter}");
                counter += 1;
            }
            assigned.push(new_id.clone());

            dom::set_attr(&heading, "id", &new_id);
            renames.push((old_id, new_id));
        }

        self.content = dom::inner_html(&body);
        renames
    }

    /// Reinsert extracted footnotes whose origin markers live in this chapter,
    /// appending each definition after the chapter's last top-level element.
    /// Claiming removes the entry from the shared map, so no other chapter can
    /// reinsert the same footnote.
    pub fn set_footnotes(&mut self, footnotes: &mut Footnotes) {
        let body = dom::parse_body(&self.content);

        let mut claimed = Vec::new();
        for anchor in dom::select_all(&body, "a") {
            if !footnotes::is_origin_shaped(&anchor) {
                continue;
            }
            let Some(href) = dom::get_attr(&anchor, "href") else {
                continue;
            };
            if !href.starts_with('#') {
                continue;
            }
            if let Some(definition) = footnotes.claim(&href) {
                claimed.push(definition);
            }
        }

        if claimed.is_empty() {
            return;
        }

        let mut last = body
            .children()
            .filter(|child| child.as_element().is_some())
            .last();
        for definition in claimed {
            let paragraph = dom::new_element("p", []);
            for node in dom::parse_fragment(&definition) {
                paragraph.append(node);
            }
            match &last {
                Some(anchor_node) => anchor_node.insert_after(paragraph.clone()),
                None => body.append(paragraph.clone()),
            }
            last = Some(paragraph);
        }

        self.content = dom::inner_html(&body);
    }

    /// All element ids present in this chapter's content.
    pub fn reference_ids(&self) -> HashSet<String> {
        let body = dom::parse_body(&self.content);
        dom::select_all(&body, "[id]")
            .iter()
            .filter_map(|node| dom::get_attr(node, "id"))
            .collect()
    }

    /// Resolve every same-document link against this chapter and its
    /// siblings. Unresolvable links degrade to a plain `<span>` carrying the
    /// same id and inner content instead of a dangling href.
    pub fn resolve_links(&mut self, own: &LinkTargets, siblings: &[&LinkTargets]) {
        let body = dom::parse_body(&self.content);
        let mut changed = false;

        for anchor in dom::select_all(&body, "a") {
            let Some(href) = dom::get_attr(&anchor, "href") else {
                continue;
            };
            if !href.starts_with('#') {
                continue;
            }
            let id = ids::id_from_ref(&href);

            let mut link = None;
            if own.ids.contains(id) {
                // In-page anchor, keep as-is.
                link = Some(href.clone());
            } else {
                for sibling in siblings {
                    if sibling.title_id == id {
                        link = Some(ids::relative_path(&self.path, &sibling.filepath));
                    } else if sibling.ids.contains(id) {
                        link =
                            Some(format!("{}{href}", ids::relative_path(&self.path, &sibling.filepath)));
                    }
                }
            }

            match link {
                Some(resolved) => {
                    if resolved != href {
                        dom::set_attr(&anchor, "href", &resolved);
                        changed = true;
                    }
                }
                None => {
                    let attrs = dom::get_attr(&anchor, "id")
                        .map(|id| ("id", id))
                        .into_iter()
                        .collect::<Vec<_>>();
                    let replacement = dom::new_element("span", attrs);
                    for child in anchor.children().collect::<Vec<_>>() {
                        replacement.append(child);
                    }
                    anchor.insert_before(replacement);
                    anchor.detach();
                    changed = true;
                }
            }
        }

        if changed {
            self.content = dom::inner_html(&body);
        }
    }

    /// Rewrite absolute-path image sources relative to this chapter's output
    /// directory.
    pub fn resolve_asset_links(&mut self) {
        let body = dom::parse_body(&self.content);
        let mut changed = false;

        for image in dom::select_all(&body, "img") {
            let Some(src) = dom::get_attr(&image, "src") else {
                continue;
            };
            if !src.starts_with('/') {
                continue;
            }
            let relative = ids::relative_path(&self.path, Path::new(&src));
            dom::set_attr(&image, "src", &relative);
            changed = true;
        }

        if changed {
            self.content = dom::inner_html(&body);
        }
    }

    /// Render this chapter's HTML to Markdown, collapsing non-breaking spaces
    /// into ordinary ones.
    pub fn to_markdown(&mut self) {
        self.markdown = markdown::render(&self.content).replace('\u{a0}', " ");
    }
}

/// Per-chapter link targets, snapshotted before link resolution so resolution
/// never observes a half-rewritten sibling.
#[derive(Debug)]
pub struct LinkTargets {
    pub title_id: String,
    pub filepath: PathBuf,
    pub ids: HashSet<String>,
}

/// How the Readme's content is sourced.
#[derive(Debug)]
pub enum ReadmeContent {
    Default,
    /// Content that preceded the first chapter boundary.
    Preface(String),
    /// The document's first top-level chapter, absorbed as the introduction.
    FirstChapter(String),
}

/// Assign paths and filenames across the chapter tree. A chapter with
/// children becomes `<title>/README.md`; a childless chapter is a same-named
/// file in its parent's directory. Sibling filename collisions are suffixed
/// with the chapter's position (`overview.md`, `overview-2.md`).
pub fn generate_filenames(chapters: &mut [Chapter], export_dir: &Path, prefix: bool) {
    assign_filenames(chapters, export_dir, "", prefix);
}

fn assign_filenames(siblings: &mut [Chapter], export_dir: &Path, rel_dir: &str, prefix: bool) {
    let mut used: Vec<String> = Vec::new();

    for chapter in siblings.iter_mut() {
        let mut stem = ids::normalize_filename(&chapter.title, chapter.num, prefix);
        if used.contains(&stem) {
            stem = format!("{stem}-{}", chapter.num);
        }
        used.push(stem.clone());

        if chapter.children.is_empty() {
            chapter.filename = format!("{stem}.md");
            chapter.summary_path = join_summary_path(rel_dir, &chapter.filename);
            chapter.path = join_fs_path(export_dir, rel_dir);
            chapter.filepath = chapter.path.join(&chapter.filename);
        } else {
            let child_dir = join_summary_path(rel_dir, &stem);
            chapter.filename = "README.md".to_owned();
            chapter.summary_path = join_summary_path(&child_dir, "README.md");
            chapter.path = join_fs_path(export_dir, &child_dir);
            chapter.filepath = chapter.path.join(&chapter.filename);
            assign_filenames(&mut chapter.children, export_dir, &child_dir, prefix);
        }
    }
}

fn join_summary_path(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_owned()
    } else {
        format!("{dir}/{name}")
    }
}

fn join_fs_path(export_dir: &Path, rel_dir: &str) -> PathBuf {
    let mut path = export_dir.to_owned();
    for segment in rel_dir.split('/').filter(|segment| !segment.is_empty()) {
        path.push(segment);
    }
    path
}

/// Flatten the chapter tree into the pre-order list used by every
/// cross-chapter processing pass and by the summary.
pub fn flatten(chapters: Vec<Chapter>) -> Vec<Chapter> {
    let mut flat = Vec::new();
    for mut chapter in chapters {
        let children = std::mem::take(&mut chapter.children);
        flat.push(chapter);
        flat.extend(flatten(children));
    }
    flat
}

/// Normalize heading ids across all chapters. Two explicit phases per
/// chapter: first collect every rename while walking the chapter's headings,
/// then rewrite hrefs in every sibling and finally in the chapter itself, so
/// sibling rewriting always observes final ids.
pub fn normalize_all_title_ids(chapters: &mut [Chapter]) {
    for index in 0..chapters.len() {
        let renames = chapters[index].normalize_title_ids();

        for (old_id, new_id) in &renames {
            if old_id.is_empty() {
                continue;
            }
            for (sibling_index, sibling) in chapters.iter_mut().enumerate() {
                if sibling_index != index {
                    sibling.replace_link_refs(old_id, new_id);
                }
            }
            chapters[index].replace_link_refs(old_id, new_id);
        }
    }
}

/// Resolve links and asset references in every chapter against a snapshot of
/// all chapters' link targets.
pub fn resolve_all_links(chapters: &mut [Chapter]) {
    let targets: Vec<LinkTargets> = chapters
        .iter()
        .map(|chapter| LinkTargets {
            title_id: chapter.title_id.clone(),
            filepath: chapter.filepath.clone(),
            ids: chapter.reference_ids(),
        })
        .collect();

    for (index, chapter) in chapters.iter_mut().enumerate() {
        let siblings: Vec<&LinkTargets> = targets
            .iter()
            .enumerate()
            .filter(|(target_index, _)| *target_index != index)
            .map(|(_, target)| target)
            .collect();
        chapter.resolve_links(&targets[index], &siblings);
        chapter.resolve_asset_links();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(title: &str, num: usize, content: &str) -> Chapter {
        Chapter {
            title: title.to_owned(),
            title_id: ids::normalize_id(title),
            num,
            content: content.to_owned(),
            ..Chapter::default()
        }
    }

    #[test]
    fn duplicate_heading_ids_get_deterministic_suffixes() {
        let mut chapters = vec![chapter(
            "Dup",
            1,
            "<h1>Dup</h1><h2>Dup</h2><h3>Dup</h3>",
        )];
        normalize_all_title_ids(&mut chapters);

        let ids = chapters[0].reference_ids();
        assert!(ids.contains("dup"));
        assert!(ids.contains("dup-0"));
        assert!(ids.contains("dup-1"));
        assert_eq!(ids.len(), 3);
    }

    #[test]
    fn renames_rewrite_sibling_links_to_final_ids() {
        let mut chapters = vec![
            chapter("One", 1, "<h1 id=\"old-one\">One</h1>"),
            chapter("Two", 2, "<h1>Two</h1><p><a href=\"#old-one\">see one</a></p>"),
        ];
        normalize_all_title_ids(&mut chapters);

        assert!(chapters[0].content.contains("id=\"one\""));
        assert!(chapters[1].content.contains("href=\"#one\""));
        assert_eq!(chapters[0].title_id, "one");
    }

    #[test]
    fn sibling_filename_collisions_are_suffixed() {
        let mut chapters = vec![
            chapter("Overview", 1, ""),
            chapter("Overview", 2, ""),
        ];
        generate_filenames(&mut chapters, Path::new("/export"), false);

        assert_eq!(chapters[0].filename, "overview.md");
        assert_eq!(chapters[1].filename, "overview-2.md");
        assert_ne!(chapters[0].filepath, chapters[1].filepath);
    }

    #[test]
    fn parent_chapters_become_directory_readmes() {
        let mut parent = chapter("Part One", 1, "");
        parent.children.push(chapter("Sub", 1, ""));
        let mut chapters = vec![parent];
        generate_filenames(&mut chapters, Path::new("/export"), false);

        assert_eq!(chapters[0].filename, "README.md");
        assert_eq!(chapters[0].summary_path, "part-one/README.md");
        assert_eq!(
            chapters[0].children[0].filepath,
            Path::new("/export/part-one/sub.md")
        );
        assert_eq!(chapters[0].children[0].summary_path, "part-one/sub.md");
    }

    #[test]
    fn unresolved_links_degrade_to_spans() {
        let mut chapters = vec![chapter(
            "One",
            1,
            "<h1 id=\"one\">One</h1><p><a href=\"#nowhere\" id=\"keep\">gone</a></p>",
        )];
        generate_filenames(&mut chapters, Path::new("/export"), false);
        resolve_all_links(&mut chapters);

        let content = &chapters[0].content;
        assert!(!content.contains("<a href=\"#nowhere\""));
        assert!(content.contains("<span id=\"keep\">gone</span>"));
    }

    #[test]
    fn cross_chapter_links_resolve_to_relative_paths() {
        let mut chapters = vec![
            chapter("One", 1, "<h1 id=\"one\">One</h1><p><a href=\"#two\">next</a> <a href=\"#detail\">detail</a></p>"),
            chapter("Two", 2, "<h1 id=\"two\">Two</h1><p id=\"detail\">detail</p>"),
        ];
        generate_filenames(&mut chapters, Path::new("/export"), false);
        resolve_all_links(&mut chapters);

        let content = &chapters[0].content;
        assert!(content.contains("href=\"two.md\""));
        assert!(content.contains("href=\"two.md#detail\""));
    }

    #[test]
    fn footnote_definitions_append_after_last_element() {
        let (stripped, mut footnotes) = crate::footnotes::extract(concat!(
            "<h1>Ch</h1><p>text <sup id=\"o1\"><a href=\"#fn1\">1</a></sup></p>",
            "<p id=\"fn1\"><a href=\"#o1\">back</a> the note</p>",
        ));

        let mut one = chapter("Ch", 1, &stripped);
        one.set_footnotes(&mut footnotes);

        assert!(footnotes.is_empty());
        let trailing = one.content;
        assert!(trailing.trim_end().ends_with("</p>"));
        assert!(trailing.contains("1 the note"));
    }

    #[test]
    fn absolute_image_sources_become_relative() {
        let mut one = chapter(
            "One",
            1,
            "<p><img src=\"/export/assets/logo.png\" alt=\"logo\"></p>",
        );
        one.path = PathBuf::from("/export/part");
        one.resolve_asset_links();

        assert!(one.content.contains("src=\"../assets/logo.png\""));
    }
}
