//! Pure string helpers for anchor ids, hrefs and filenames.

use std::path::Path;

/// Normalize arbitrary text into a URL/anchor-safe id: runs of
/// non-alphanumeric characters collapse to a single hyphen, outer hyphens are
/// trimmed and the result is lowercased.
pub fn normalize_id(text: &str) -> String {
    let mut id = String::with_capacity(text.len());
    let mut pending_hyphen = false;
    for ch in text.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_hyphen && !id.is_empty() {
                id.push('-');
            }
            pending_hyphen = false;
            id.push(ch.to_ascii_lowercase());
        } else {
            pending_hyphen = true;
        }
    }
    id
}

/// Same-document href form of an id.
pub fn ref_from_id(id: &str) -> String {
    format!("#{id}")
}

/// Id named by a same-document href.
pub fn id_from_ref(href: &str) -> &str {
    href.strip_prefix('#').unwrap_or(href)
}

/// Normalized filename stem for a chapter title, truncated to 50 characters,
/// optionally prefixed with the chapter's 1-based position for stable sorting.
pub fn normalize_filename(title: &str, num: usize, prefix: bool) -> String {
    let mut stem = normalize_id(title);
    stem.truncate(50);
    let stem = stem.trim_end_matches('-');
    let stem = if stem.is_empty() { "untitled" } else { stem };

    if prefix {
        format!("{num:02}-{stem}")
    } else {
        stem.to_owned()
    }
}

/// Relative path from `from_dir` to `to`, '/'-joined regardless of platform
/// so it is usable inside Markdown links.
pub fn relative_path(from_dir: &Path, to: &Path) -> String {
    let from: Vec<_> = from_dir.components().collect();
    let to: Vec<_> = to.components().collect();

    let common = from
        .iter()
        .zip(to.iter())
        .take_while(|(a, b)| a == b)
        .count();

    let mut parts: Vec<String> = Vec::new();
    for _ in common..from.len() {
        parts.push("..".to_owned());
    }
    for component in &to[common..] {
        parts.push(component.as_os_str().to_string_lossy().into_owned());
    }

    if parts.is_empty() {
        ".".to_owned()
    } else {
        parts.join("/")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalize_id_collapses_and_lowercases() {
        assert_eq!(normalize_id("Hello,  World!"), "hello-world");
        assert_eq!(normalize_id("--Already--done--"), "already-done");
        assert_eq!(normalize_id("héllo"), "h-llo");
        assert_eq!(normalize_id("!!!"), "");
    }

    #[test]
    fn ref_and_id_round_trip() {
        assert_eq!(ref_from_id("intro"), "#intro");
        assert_eq!(id_from_ref("#intro"), "intro");
        assert_eq!(id_from_ref("intro"), "intro");
    }

    #[test]
    fn normalize_filename_prefixes_and_truncates() {
        assert_eq!(normalize_filename("Chapter One", 3, false), "chapter-one");
        assert_eq!(normalize_filename("Chapter One", 3, true), "03-chapter-one");
        let long = "x".repeat(80);
        assert_eq!(normalize_filename(&long, 1, false).len(), 50);
        assert_eq!(normalize_filename("???", 1, false), "untitled");
    }

    #[test]
    fn relative_path_walks_up_and_down() {
        let from = Path::new("/export/book/part-one");
        assert_eq!(
            relative_path(from, Path::new("/export/book/part-two/intro.md")),
            "../part-two/intro.md"
        );
        assert_eq!(
            relative_path(from, Path::new("/export/book/part-one/intro.md")),
            "intro.md"
        );
        assert_eq!(
            relative_path(Path::new("/export/book"), Path::new("/export/assets/img.png")),
            "../assets/img.png"
        );
    }
}
