use std::process::ExitCode;

use camino::Utf8PathBuf;
use clap::{Parser, Subcommand};
use tsumiki::Website;

/// Builds a static site from templated pages, scripts, stylesheets and
/// assets, or serves it with live reload while you edit.
#[derive(Parser)]
#[command(name = "tsumiki", version)]
struct Cli {
    /// Project root containing `src/`, `public/` and `package.json`.
    #[arg(long, default_value = ".", global = true)]
    root: Utf8PathBuf,

    /// Dev server port, overrides `tsumiki.json`.
    #[arg(long, global = true)]
    port: Option<u16>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Clone, Copy)]
enum Command {
    /// Remove the staging and output directories.
    Clean,
    /// Produce the deployable output tree (default).
    Build,
    /// Compile into staging and serve with live reload.
    #[cfg(feature = "live")]
    Dev,
}

fn main() -> ExitCode {
    #[cfg(feature = "logging")]
    tsumiki::logging::init_logging();

    let cli = Cli::parse();

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {e}", console::style("error:").red().bold());
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut site = Website::open(&cli.root)?;

    if let Some(port) = cli.port {
        site.config.port = port;
    }

    match cli.command.unwrap_or(Command::Build) {
        Command::Clean => tsumiki::clean(&site)?,
        Command::Build => site.build()?,
        #[cfg(feature = "live")]
        Command::Dev => site.dev()?,
    }

    Ok(())
}
