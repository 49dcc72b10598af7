use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

use mdbookify::cli::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let debug = matches!(&cli.command, Command::Convert(args) if args.debug);

    if let Err(err) = try_main(cli, debug).await {
        // Full error report (with backtrace when captured) only in debug runs.
        if debug {
            eprintln!("{err:?}");
        } else {
            eprintln!("{err:#}");
        }
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main(cli: Cli, debug: bool) -> anyhow::Result<()> {
    mdbookify::logging::init(debug).context("init logging")?;
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Convert(args) => {
            mdbookify::pipeline::run(args).await.context("convert")?;
        }
        Command::Formats => {
            mdbookify::formats::print_formats();
        }
    }

    Ok(())
}
