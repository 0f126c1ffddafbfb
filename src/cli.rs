//! CLI argument parsing for the dealer-import-worker binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use uuid::Uuid;

use crate::types::ImportKind;

#[derive(Parser)]
#[command(name = "dealer-import-worker", about = "Dealership bulk import worker")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the worker server (default if no subcommand given)
    Serve,
    /// Run database migrations and exit
    Migrate,
    /// Import a file against an in-memory store and print the job summary
    Import {
        #[arg(long)]
        file: PathBuf,
        /// booking, enquiry or quotation
        #[arg(long, value_parser = parse_kind)]
        kind: ImportKind,
        /// Tenant to import into (random when omitted)
        #[arg(long)]
        dealership: Option<Uuid>,
        /// Submitting user (random when omitted)
        #[arg(long)]
        user: Option<Uuid>,
        #[arg(long)]
        batch_size: Option<usize>,
    },
    /// Parse and validate a file without importing it
    Preview {
        #[arg(long)]
        file: PathBuf,
        #[arg(long, value_parser = parse_kind)]
        kind: ImportKind,
    },
}

fn parse_kind(value: &str) -> Result<ImportKind, String> {
    ImportKind::parse(value)
        .ok_or_else(|| format!("unknown import kind '{}' (expected booking, enquiry or quotation)", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn test_cli_migrate_command_parses() {
        let cli = Cli::parse_from(["dealer-import-worker", "migrate"]);
        assert!(matches!(cli.command, Some(Command::Migrate)));
    }

    #[test]
    fn test_cli_no_command_defaults_to_none() {
        let cli = Cli::parse_from(["dealer-import-worker"]);
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_cli_import_command_parses() {
        let cli = Cli::parse_from([
            "dealer-import-worker",
            "import",
            "--file",
            "bookings.csv",
            "--kind",
            "Booking",
            "--batch-size",
            "50",
        ]);
        match cli.command {
            Some(Command::Import {
                file,
                kind,
                dealership,
                batch_size,
                ..
            }) => {
                assert_eq!(file, PathBuf::from("bookings.csv"));
                assert_eq!(kind, ImportKind::Booking);
                assert!(dealership.is_none());
                assert_eq!(batch_size, Some(50));
            }
            _ => panic!("expected import command"),
        }
    }

    #[test]
    fn test_cli_rejects_unknown_kind() {
        assert!(Cli::try_parse_from([
            "dealer-import-worker",
            "preview",
            "--file",
            "x.csv",
            "--kind",
            "invoice",
        ])
        .is_err());
    }
}
