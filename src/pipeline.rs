//! The conversion pipeline: ingest a document, split it into a chapter tree,
//! process each chapter, and write the Markdown book.

use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::chapter::{self, Chapter, ReadmeContent};
use crate::cli::ConvertArgs;
use crate::footnotes;
use crate::formats;
use crate::frontend::{self, IngestRequest};
use crate::split;

pub async fn run(args: ConvertArgs) -> anyhow::Result<()> {
    let source_path = PathBuf::from(&args.file);

    // Resolved before anything is created on disk, so an unsupported format
    // leaves no half-made export behind.
    let front_end = formats::front_end_for(&source_path)?;

    let metadata = tokio::fs::metadata(&source_path)
        .await
        .with_context(|| format!("read input: {}", source_path.display()))?;
    if !metadata.is_file() {
        anyhow::bail!("input is not a file: {}", source_path.display());
    }

    let (title, title_overridden) = match &args.title {
        Some(title) => (title.clone(), true),
        None => (frontend::default_title(&source_path), false),
    };
    let export_dir = resolve_export_dir(args.export_dir.as_deref(), &source_path)?;
    let assets_dir = export_dir.join(&args.assets_dir);

    tokio::fs::create_dir_all(&assets_dir)
        .await
        .with_context(|| format!("create export dir: {}", export_dir.display()))?;

    tracing::info!(input = %source_path.display(), export = %export_dir.display(), "converting");

    let request = IngestRequest {
        source_path,
        assets_dir,
        debug: args.debug,
    };
    let html =
        tokio::task::block_in_place(|| front_end.to_html(&request)).context("ingest document")?;

    let chapters = tokio::task::block_in_place(|| {
        build_chapters(
            &html,
            &title,
            title_overridden,
            &export_dir,
            args.depth,
            args.prefix,
        )
    })?;

    write_summary(&chapters, &export_dir).await?;
    write_files(&chapters).await?;

    tracing::info!(
        chapters = chapters.len(),
        export = %export_dir.display(),
        "conversion done"
    );
    Ok(())
}

/// Export directory as an absolute path. Pandoc rewrites extracted media
/// `src` attributes to wherever `--extract-media` points, and asset link
/// resolution only recognizes absolute sources, so a cwd-relative export dir
/// must be resolved before anything derives paths from it.
fn resolve_export_dir(export_dir: Option<&str>, source_path: &Path) -> anyhow::Result<PathBuf> {
    let dir = match export_dir {
        Some(dir) => PathBuf::from(dir),
        None => Path::new("export").join(frontend::default_title(source_path)),
    };
    std::path::absolute(&dir).with_context(|| format!("resolve export dir: {}", dir.display()))
}

/// Split, process, and render the whole document into its final flat chapter
/// list, Readme first. Pure with respect to the filesystem.
fn build_chapters(
    html: &str,
    title: &str,
    title_overridden: bool,
    export_dir: &Path,
    depth: usize,
    prefix: bool,
) -> anyhow::Result<Vec<Chapter>> {
    tracing::info!("extracting footnotes");
    let (html, mut footnotes) = footnotes::extract(html);
    tracing::debug!(count = footnotes.len(), "footnotes extracted");

    tracing::info!("parsing chapters");
    let (preface, mut tree) = split::parse_chapters(&html, depth)?;

    let readme = if !preface.is_empty() {
        Chapter::readme(title, export_dir, ReadmeContent::Preface(preface))
    } else if tree.first().is_some_and(|first| first.children.is_empty()) {
        // With no preface of its own, the document's opening chapter serves
        // as the book's introduction. An explicit title override still names
        // the book; otherwise the absorbed chapter does.
        let first = tree.remove(0);
        for (position, chapter) in tree.iter_mut().enumerate() {
            chapter.num = position + 1;
        }
        let readme_title = if title_overridden {
            title
        } else {
            first.title.as_str()
        };
        Chapter::readme(
            readme_title,
            export_dir,
            ReadmeContent::FirstChapter(first.content),
        )
    } else {
        Chapter::readme(title, export_dir, ReadmeContent::Default)
    };

    chapter::generate_filenames(&mut tree, export_dir, prefix);

    let mut chapters = chapter::flatten(tree);
    chapters.insert(0, readme);

    tracing::info!(count = chapters.len(), "processing chapters");
    process_chapters(&mut chapters, &mut footnotes);

    for chapter in &mut chapters {
        chapter.to_markdown();
    }

    Ok(chapters)
}

fn process_chapters(chapters: &mut [Chapter], footnotes: &mut footnotes::Footnotes) {
    for chapter in chapters.iter_mut() {
        chapter.set_footnotes(footnotes);
    }
    if !footnotes.is_empty() {
        tracing::warn!(count = footnotes.len(), "footnotes without origin markers were dropped");
    }

    // A chapter that fails sanitization keeps its raw content; siblings are
    // unaffected.
    for chapter in chapters.iter_mut() {
        if let Err(err) = chapter.clean_html() {
            tracing::warn!(title = %chapter.title, error = %err, "failed to clean chapter");
        }
    }

    chapter::normalize_all_title_ids(chapters);
    chapter::resolve_all_links(chapters);
}

async fn write_summary(chapters: &[Chapter], export_dir: &Path) -> anyhow::Result<()> {
    tracing::info!("writing summary");
    let mut summary = String::from("# Summary\n\n");
    for chapter in chapters {
        let indent = " ".repeat(chapter.level * 2);
        summary.push_str(&format!(
            "{indent}* [{}]({})\n",
            chapter.title, chapter.summary_path
        ));
    }

    let summary_path = export_dir.join("SUMMARY.md");
    tokio::fs::write(&summary_path, summary)
        .await
        .with_context(|| format!("write summary: {}", summary_path.display()))
}

async fn write_files(chapters: &[Chapter]) -> anyhow::Result<()> {
    for chapter in chapters {
        tracing::debug!(file = %chapter.filepath.display(), "writing chapter");
        tokio::fs::create_dir_all(&chapter.path)
            .await
            .with_context(|| format!("create chapter dir: {}", chapter.path.display()))?;
        tokio::fs::write(&chapter.filepath, &chapter.markdown)
            .await
            .with_context(|| format!("write chapter: {}", chapter.filepath.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOC: &str = concat!(
        "<h1 id=\"a\">Intro</h1><p>hi</p>",
        "<h1 id=\"b\">Ch1</h1><p>content <a href=\"#fn1\" id=\"o1\"><sup>1</sup></a></p>",
        "<sup id=\"fn1\"><a href=\"#o1\">back</a>text</sup>",
    );

    #[test]
    fn first_childless_chapter_becomes_the_readme() {
        let chapters = build_chapters(DOC, "book", false, Path::new("/export"), 1, true).unwrap();

        assert_eq!(chapters.len(), 2);
        assert_eq!(chapters[0].title, "Intro");
        assert_eq!(chapters[0].summary_path, "README.md");
        assert_eq!(chapters[1].summary_path, "01-ch1.md");
    }

    #[test]
    fn footnotes_land_in_the_markdown_of_their_origin_chapter() {
        let chapters = build_chapters(DOC, "book", false, Path::new("/export"), 1, true).unwrap();

        let ch1 = &chapters[1].markdown;
        assert!(ch1.contains("content [^1]"), "{ch1}");
        assert!(ch1.trim_end().ends_with("[^1]: text"), "{ch1}");
        assert!(!chapters[0].markdown.contains("[^1]"));
    }

    #[test]
    fn preface_content_keeps_all_chapters_as_files() {
        let html = "<p>lead-in</p><h1>One</h1><p>a</p><h1>Two</h1><p>b</p>";
        let chapters = build_chapters(html, "book", false, Path::new("/export"), 1, false).unwrap();

        assert_eq!(chapters.len(), 3);
        assert_eq!(chapters[0].title, "book");
        assert!(chapters[0].markdown.contains("lead-in"));
        assert_eq!(chapters[1].summary_path, "one.md");
        assert_eq!(chapters[2].summary_path, "two.md");
    }

    #[test]
    fn explicit_title_wins_over_the_absorbed_chapter_title() {
        let chapters =
            build_chapters(DOC, "My Book", true, Path::new("/export"), 1, true).unwrap();

        assert_eq!(chapters[0].title, "My Book");
        // The absorbed chapter still provides the README body.
        assert!(chapters[0].markdown.contains("# Intro"));
        assert_eq!(chapters[1].summary_path, "01-ch1.md");
    }

    #[test]
    fn export_dirs_resolve_to_absolute_paths() {
        let explicit = resolve_export_dir(Some("out"), Path::new("doc.docx")).unwrap();
        assert!(explicit.is_absolute());
        assert!(explicit.ends_with("out"));

        let derived = resolve_export_dir(None, Path::new("book.docx")).unwrap();
        assert!(derived.is_absolute());
        assert!(derived.ends_with("export/book"));
    }

    #[test]
    fn extracted_media_sources_become_relative_to_their_chapter() {
        let html = concat!(
            "<h1>Part</h1>",
            "<h2>Sub</h2><p><img src=\"/export/doc/assets/media/image1.png\" alt=\"i\"></p>",
        );
        let chapters =
            build_chapters(html, "doc", false, Path::new("/export/doc"), 2, false).unwrap();

        let sub = chapters
            .iter()
            .find(|chapter| chapter.title == "Sub")
            .expect("nested chapter");
        assert_eq!(sub.path, Path::new("/export/doc/part"));
        assert!(
            sub.markdown.contains("../assets/media/image1.png"),
            "{}",
            sub.markdown
        );
    }

    #[test]
    fn document_without_headings_becomes_a_single_readme() {
        let chapters =
            build_chapters("<p>just text</p>", "book", false, Path::new("/export"), 2, false).unwrap();

        assert_eq!(chapters.len(), 1);
        assert!(chapters[0].markdown.contains("# book"));
        assert!(chapters[0].markdown.contains("just text"));
    }
}
