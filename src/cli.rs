//! CLI command definitions using clap.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// ghissue-operator - keep GitHub issues in line with declared records
#[derive(Parser, Debug)]
#[command(name = "ghissue-operator")]
#[command(version)]
#[command(about = "Keep GitHub issues in sync with declarative issue records")]
#[command(
    long_about = "Reads desired issue records from a YAML manifest, creates or updates the matching GitHub issues, and closes them when records are removed."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the controller until interrupted
    Run {
        /// Manifest of desired records
        #[arg(short, long)]
        manifest: PathBuf,

        /// TOML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Number of concurrent workers
        #[arg(short, long)]
        workers: Option<usize>,

        /// Use an in-memory tracker instead of GitHub
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Parse a manifest and list the records it declares
    Validate {
        /// Manifest of desired records
        #[arg(short, long)]
        manifest: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_arguments() -> Result<(), clap::Error> {
        let cli = Cli::try_parse_from([
            "ghissue-operator",
            "run",
            "--manifest",
            "records.yaml",
            "--workers",
            "3",
            "--dry-run",
        ])?;

        let Commands::Run {
            manifest,
            config,
            workers,
            dry_run,
        } = cli.command
        else {
            return Err(clap::Error::new(clap::error::ErrorKind::InvalidSubcommand));
        };

        assert_eq!(manifest, PathBuf::from("records.yaml"));
        assert!(config.is_none());
        assert_eq!(workers, Some(3));
        assert!(dry_run);
        Ok(())
    }

    #[test]
    fn test_manifest_is_required() {
        assert!(Cli::try_parse_from(["ghissue-operator", "validate"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
