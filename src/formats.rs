//! Accepted input formats and their front-ends.

use std::path::Path;

use anyhow::bail;

use crate::frontend::{FrontEnd, HtmlFrontEnd, PandocFrontEnd};

pub struct SupportedFormat {
    pub extension: &'static str,
    pub description: &'static str,
}

pub const SUPPORTED_FORMATS: &[SupportedFormat] = &[
    SupportedFormat {
        extension: "docx",
        description: "Microsoft Office Open XML document",
    },
    SupportedFormat {
        extension: "html",
        description: "HTML document",
    },
    SupportedFormat {
        extension: "odt",
        description: "OpenDocument text document",
    },
    SupportedFormat {
        extension: "xml",
        description: "DocBook XML document",
    },
];

/// Pick the front-end for a source file by extension. Fails before anything
/// is written to disk, so an unsupported input leaves no half-made export.
pub fn front_end_for(source_path: &Path) -> anyhow::Result<Box<dyn FrontEnd>> {
    let extension = source_path
        .extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "html" | "htm" => Ok(Box::new(HtmlFrontEnd)),
        "docx" => Ok(Box::new(PandocFrontEnd { from: "docx" })),
        "odt" => Ok(Box::new(PandocFrontEnd { from: "odt" })),
        "xml" => Ok(Box::new(PandocFrontEnd { from: "docbook" })),
        _ => bail!(
            "unsupported input format: {} (run `mdbookify formats` to list supported formats)",
            source_path.display()
        ),
    }
}

/// The `formats` subcommand: list accepted source formats on stdout.
pub fn print_formats() {
    println!("Supported input formats:");
    for format in SUPPORTED_FORMATS {
        println!("  .{:<6} {}", format.extension, format.description);
    }
}
