use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "loantrek", author, version, long_about = None)]
#[command(about = "Overdue equipment-loan notifications for the LoanTrek loan service")]
pub struct Args {
    #[command(subcommand)]
    pub command: Commands,

    /// Base URL of the loan service API
    #[arg(long, global = true, env = "LOANTREK_API_URL")]
    pub api_url: Option<String>,

    /// File holding local state such as read marks
    #[arg(long, global = true, env = "LOANTREK_STATE_FILE")]
    pub state_file: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch overdue loans and show the unread notifications
    Status {
        /// Print the full notification snapshot as JSON
        #[arg(long)]
        json: bool,
    },

    /// Poll for overdue loans at the configured check interval
    Watch,

    /// Mark one overdue loan notification as read
    MarkRead {
        /// Loan identifier
        id: String,
    },

    /// Mark the displayed notifications as read and clear the badge
    MarkAllRead,

    /// Forget every read mark
    ClearRead,

    /// Inspect or change the service-side check interval
    Settings {
        #[command(subcommand)]
        action: SettingsCommand,
    },

    /// Show equipment and loan statistics
    Stats {
        /// Print the statistics as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
pub enum SettingsCommand {
    /// Show the stored settings and the effective poll interval
    Show,

    /// Store a new check interval in hours
    SetInterval {
        /// Interval in hours, e.g. 0.25 for 15 minutes
        hours: f64,
    },

    /// List the common interval choices
    Presets,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_subcommands() {
        let args = Args::try_parse_from(["loantrek", "mark-read", "loan-7", "-v"]).unwrap();
        assert!(args.verbose);
        assert!(matches!(args.command, Commands::MarkRead { ref id } if id == "loan-7"));

        let args =
            Args::try_parse_from(["loantrek", "settings", "set-interval", "0.25"]).unwrap();
        match args.command {
            Commands::Settings {
                action: SettingsCommand::SetInterval { hours },
            } => assert_eq!(hours, 0.25),
            other => panic!("unexpected command: {other:?}"),
        }

        assert!(Args::try_parse_from(["loantrek", "status", "-v", "-q"]).is_err());
    }
}
