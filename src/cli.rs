//! Command-line interface definition

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::coach::{EmploymentType, LocationType};
use crate::logging::LogFormat;

#[derive(Debug, Parser)]
#[command(name = "kazilens", version, about = "Resume coaching and live interview practice")]
pub struct Cli {
    /// Settings file (defaults to the platform config directory)
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    /// Override the log line format (text or json)
    #[arg(long, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Practice a spoken interview with the AI interviewer
    Live {
        /// Resume analysis JSON used to tailor the interview
        #[arg(long)]
        analysis: Option<PathBuf>,
    },

    /// Score a plain-text resume
    Analyze {
        resume: PathBuf,

        /// Write the analysis JSON here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Search for job openings
    Jobs {
        query: String,

        #[arg(long)]
        location: String,

        #[arg(long, value_parser = parse_location_type)]
        location_type: Option<LocationType>,

        #[arg(long, value_parser = parse_employment_type)]
        employment_type: Option<EmploymentType>,
    },

    /// Compare a resume analysis against one job
    Insight {
        #[arg(long)]
        analysis: PathBuf,

        /// Job JSON as printed by `jobs`
        #[arg(long)]
        job: PathBuf,
    },

    /// Look up a company's office locations
    Company { name: String },

    /// Chat with the career coach (one message per line, Ctrl-D to quit)
    Chat {
        #[arg(long)]
        analysis: Option<PathBuf>,
    },

    /// Manage the stored Gemini API key
    Key {
        #[command(subcommand)]
        action: KeyAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum KeyAction {
    /// Store a key in the system keyring
    Set { key: String },
    /// Remove the stored key
    Clear,
    /// Show where the active key comes from
    Status,
}

fn normalize(s: &str) -> String {
    s.trim().to_ascii_lowercase().replace(['-', '_', ' '], "")
}

fn parse_location_type(s: &str) -> Result<LocationType, String> {
    match normalize(s).as_str() {
        "remote" => Ok(LocationType::Remote),
        "hybrid" => Ok(LocationType::Hybrid),
        "onsite" => Ok(LocationType::OnSite),
        "anywhere" => Ok(LocationType::Anywhere),
        _ => Err(format!(
            "'{}' is not one of remote, hybrid, on-site, anywhere",
            s
        )),
    }
}

fn parse_employment_type(s: &str) -> Result<EmploymentType, String> {
    match normalize(s).as_str() {
        "fulltime" => Ok(EmploymentType::FullTime),
        "parttime" => Ok(EmploymentType::PartTime),
        "contract" => Ok(EmploymentType::Contract),
        "internship" => Ok(EmploymentType::Internship),
        _ => Err(format!(
            "'{}' is not one of full-time, part-time, contract, internship",
            s
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_jobs_with_filters() {
        let cli = Cli::try_parse_from([
            "kazilens",
            "jobs",
            "data analyst",
            "--location",
            "Nairobi",
            "--location-type",
            "On-site",
            "--employment-type",
            "full_time",
        ])
        .unwrap();

        match cli.command {
            Command::Jobs {
                query,
                location,
                location_type,
                employment_type,
            } => {
                assert_eq!(query, "data analyst");
                assert_eq!(location, "Nairobi");
                assert_eq!(location_type, Some(LocationType::OnSite));
                assert_eq!(employment_type, Some(EmploymentType::FullTime));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_bad_filter_rejected() {
        let result = Cli::try_parse_from([
            "kazilens",
            "jobs",
            "nurse",
            "--location",
            "Mombasa",
            "--location-type",
            "moon",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli =
            Cli::try_parse_from(["kazilens", "live", "--log-format", "json"]).unwrap();
        assert_eq!(cli.log_format, Some(LogFormat::Json));
        assert!(matches!(cli.command, Command::Live { analysis: None }));
    }

    #[test]
    fn test_key_subcommands() {
        let cli = Cli::try_parse_from(["kazilens", "key", "set", "abc"]).unwrap();
        assert!(matches!(
            cli.command,
            Command::Key {
                action: KeyAction::Set { ref key }
            } if key == "abc"
        ));
    }
}
