//! Command-line interface

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// devloop - autonomous development pipeline orchestrator
#[derive(Debug, Parser)]
#[command(name = "dl", version, about)]
pub struct Cli {
    /// Path to a config file (default: .devloop.yml, then user config)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the pipeline against a project
    Run {
        /// Project root directory
        #[arg(default_value = ".")]
        project_root: PathBuf,

        /// Stop after this many iterations (0 = unbounded)
        #[arg(long)]
        max_iterations: Option<u64>,
    },

    /// Print a summary of the persisted pipeline state
    Status {
        /// Project root directory
        #[arg(default_value = ".")]
        project_root: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run() {
        let cli = Cli::parse_from(["dl", "run", "/tmp/project", "--max-iterations", "20"]);
        match cli.command {
            Command::Run {
                project_root,
                max_iterations,
            } => {
                assert_eq!(project_root, PathBuf::from("/tmp/project"));
                assert_eq!(max_iterations, Some(20));
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn test_parse_status_defaults_to_cwd() {
        let cli = Cli::parse_from(["dl", "status"]);
        match cli.command {
            Command::Status { project_root } => assert_eq!(project_root, PathBuf::from(".")),
            _ => panic!("expected status"),
        }
    }

    #[test]
    fn test_global_config_flag() {
        let cli = Cli::parse_from(["dl", "--config", "custom.yml", "status"]);
        assert_eq!(cli.config, Some(PathBuf::from("custom.yml")));
    }
}
