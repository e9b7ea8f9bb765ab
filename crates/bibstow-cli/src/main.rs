use std::io::{self, IsTerminal};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{CommandFactory, Parser, Subcommand};

mod output;
mod prompt;

use output::ColorMode;

/// Maintain a BibTeX reference database and export formatted bibliographies.
#[derive(Parser, Debug)]
#[command(name = "bibstow", version, about, long_about = None)]
struct Cli {
    /// Disable colored output
    #[arg(long, global = true)]
    no_color: bool,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch the BibTeX record for a DOI and add it to the database
    Add {
        /// A Digital Object Identifier (DOI)
        doi: String,

        /// A bibliographic database file in BibTeX format (.bib)
        bib: PathBuf,
    },

    /// Export the database using a citation style
    Export {
        /// A bibliographic database file in BibTeX format (.bib)
        bib: PathBuf,

        /// Citation style (CSL) file
        #[arg(long, default_value = "apa.csl")]
        style: PathBuf,
    },
}

/// The user answered "no" at the confirmation prompt.
///
/// Not a failure report: `main` prints a plain abort message for this one
/// instead of an error line, but still exits non-zero.
#[derive(Debug, thiserror::Error)]
#[error("aborted by user")]
struct UserAbort;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(err) => {
            if err.downcast_ref::<UserAbort>().is_some() {
                eprintln!("Aborting, database left untouched.");
            } else {
                eprintln!("error: {err:#}");
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(ExitCode::FAILURE);
    };

    let use_color = !cli.no_color && io::stdout().is_terminal();
    let color = ColorMode(use_color);

    match command {
        Command::Add { doi, bib } => add(&doi, &bib, color)?,
        Command::Export { bib, style } => export(&bib, &style)?,
    }
    Ok(ExitCode::SUCCESS)
}

/// `add` pipeline: fetch, preview, confirm, back up, insert at front, write.
fn add(doi: &str, bib: &Path, color: ColorMode) -> anyhow::Result<()> {
    let doi = bibstow_doi::normalize_doi(doi)
        .ok_or_else(|| anyhow::anyhow!("`{doi}` does not look like a DOI"))?;

    // Resolution endpoint and timeout: env vars > defaults
    let base_url =
        std::env::var("BIBSTOW_DOI_BASE").unwrap_or_else(|_| bibstow_doi::DEFAULT_BASE_URL.into());
    let timeout = std::env::var("BIBSTOW_TIMEOUT")
        .ok()
        .and_then(|v| v.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(bibstow_doi::DEFAULT_TIMEOUT);

    let client = bibstow_doi::DoiClient::with_options(&base_url, timeout)?;
    let record = client.fetch_bibtex(&doi)?;
    let entry = bibstow_bib::first_entry(&record)?;

    let mut db = bibstow_bib::Database::from_path(bib)?;
    if db.contains_key(&entry.key) {
        anyhow::bail!(
            "citation key `{}` already exists in {}",
            entry.key,
            bib.display()
        );
    }

    println!("The following entry was found for {doi}:");
    output::print_entry(&mut io::stdout(), &entry.to_biblatex_string(), color)?;

    let question = format!(
        "Do you want to add this entry to {}?\n\
         The database will be backed up as {}.bak before being updated.",
        bib.display(),
        bib.display()
    );
    if !prompt::confirm(&question, &mut io::stdin().lock(), &mut io::stdout())? {
        return Err(UserAbort.into());
    }

    bibstow_bib::backup(bib)?;
    db.insert_front(entry)?;
    db.write_to_path(bib)?;

    println!("Database successfully updated.");
    Ok(())
}

/// `export` pipeline: parse database and style, render, print to stdout.
fn export(bib: &Path, style_path: &Path) -> anyhow::Result<()> {
    let db = bibstow_bib::Database::from_path(bib)?;
    let style = bibstow_csl::Style::from_path(style_path)?;
    let formatted = bibstow_csl::render_bibliography(&db, &style)?;
    println!("{}", formatted.trim());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_asserts() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_no_subcommand_parses_to_none() {
        let cli = Cli::try_parse_from(["bibstow"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_export_style_defaults_to_apa() {
        let cli = Cli::try_parse_from(["bibstow", "export", "refs.bib"]).unwrap();
        match cli.command {
            Some(Command::Export { bib, style }) => {
                assert_eq!(bib, PathBuf::from("refs.bib"));
                assert_eq!(style, PathBuf::from("apa.csl"));
            }
            other => panic!("expected export, got {other:?}"),
        }
    }

    #[test]
    fn test_add_takes_doi_then_bib() {
        let cli = Cli::try_parse_from(["bibstow", "add", "10.1/x", "refs.bib"]).unwrap();
        match cli.command {
            Some(Command::Add { doi, bib }) => {
                assert_eq!(doi, "10.1/x");
                assert_eq!(bib, PathBuf::from("refs.bib"));
            }
            other => panic!("expected add, got {other:?}"),
        }
    }
}
