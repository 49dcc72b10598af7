//! Input front-ends: each accepted format is turned into a single flat HTML
//! string before the pipeline proper starts. Pandoc-backed formats extract
//! embedded media into the export's assets directory on the way through.

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::Context as _;

use crate::dom;

/// Everything a front-end needs to know about one conversion.
#[derive(Debug)]
pub struct IngestRequest {
    pub source_path: PathBuf,
    /// Where pandoc drops extracted media.
    pub assets_dir: PathBuf,
    pub debug: bool,
}

pub trait FrontEnd {
    /// Produce the document's content as one HTML string.
    fn to_html(&self, request: &IngestRequest) -> anyhow::Result<String>;
}

/// Native front-end for documents that are already HTML. Uses the `<body>`
/// content when the document has one, otherwise the raw file.
pub struct HtmlFrontEnd;

impl FrontEnd for HtmlFrontEnd {
    fn to_html(&self, request: &IngestRequest) -> anyhow::Result<String> {
        let raw = std::fs::read_to_string(&request.source_path)
            .with_context(|| format!("read input: {}", request.source_path.display()))?;

        let body = dom::inner_html(&dom::parse_body(&raw));
        if body.trim().is_empty() {
            Ok(raw)
        } else {
            Ok(body)
        }
    }
}

/// Pandoc-backed front-end for office and DocBook formats.
pub struct PandocFrontEnd {
    /// Value passed to pandoc's `--from`.
    pub from: &'static str,
}

impl FrontEnd for PandocFrontEnd {
    fn to_html(&self, request: &IngestRequest) -> anyhow::Result<String> {
        let args = self.build_args(request);
        if request.debug {
            tracing::debug!(from = self.from, args = ?args, "invoking pandoc");
        }

        let output = match Command::new("pandoc").args(&args).output() {
            Ok(output) => output,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                anyhow::bail!(
                    "pandoc is not installed; install pandoc to convert {} input",
                    self.from
                );
            }
            Err(err) => return Err(err).context("run pandoc"),
        };

        if !output.status.success() {
            anyhow::bail!(
                "pandoc failed ({}): {}",
                output.status,
                String::from_utf8_lossy(&output.stderr)
            );
        }

        String::from_utf8(output.stdout).context("pandoc produced non-UTF-8 output")
    }
}

impl PandocFrontEnd {
    fn build_args(&self, request: &IngestRequest) -> Vec<OsString> {
        let mut args = Vec::new();
        args.push(request.source_path.as_os_str().to_owned());
        args.push(OsString::from("--from"));
        args.push(OsString::from(self.from));
        args.push(OsString::from("--to"));
        args.push(OsString::from("html"));
        args.push(OsString::from("--extract-media"));
        args.push(request.assets_dir.as_os_str().to_owned());

        if let Some(parent) = request.source_path.parent()
            && !parent.as_os_str().is_empty()
        {
            args.push(OsString::from("--resource-path"));
            args.push(parent.as_os_str().to_owned());
        }

        args
    }
}

/// Document title used when the user supplies none: the source filename
/// without its extension.
pub fn default_title(source_path: &Path) -> String {
    source_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "Untitled".to_owned())
}
