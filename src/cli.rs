use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Convert a document into a Markdown book.
    Convert(ConvertArgs),
    /// List the supported source formats.
    Formats,
}

#[derive(Debug, Args)]
pub struct ConvertArgs {
    /// Source document (`.docx`, `.odt`, `.xml`, `.html`).
    pub file: String,

    /// Export directory (default: `export/<document name>`).
    pub export_dir: Option<String>,

    /// Name of the assets directory inside the export directory.
    #[arg(long, default_value = "assets")]
    pub assets_dir: String,

    /// Maximum heading depth used to split the document into sub-chapters.
    #[arg(long, default_value_t = 2)]
    pub depth: usize,

    /// Book title (default: the source file name).
    #[arg(long)]
    pub title: Option<String>,

    /// Prefix chapter filenames with their position (`01-`, `02-`, ...).
    #[arg(long)]
    pub prefix: bool,

    /// Log pipeline details at debug level.
    #[arg(long)]
    pub debug: bool,
}
