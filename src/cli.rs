use clap::{Parser, Subcommand};
use std::path::PathBuf;

// Build version with target info
const VERSION_INFO: &str = const_format::concatcp!(
    env!("CARGO_PKG_VERSION"), "\n",
    "Diff:   Myers (id match) + LCS move placement\n",
    "Target: ", std::env::consts::ARCH, "-", std::env::consts::OS
);

/// Declarative list builder and differ
#[derive(Parser, Debug)]
#[command(author, version = VERSION_INFO, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Increase logging verbosity (default: warn, -v: info, -vv: debug, -vvv+: trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count, global = true)]
    pub verbosity: u8,

    /// JSON configuration file (diff threads, thread names, idle sleep)
    #[arg(short = 'c', long = "config", value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Diff two JSON item lists and print the edit operations
    Diff {
        /// Previous list: array of {"key"|"id", "view_type", "props"}
        #[arg(value_name = "OLD")]
        old: PathBuf,

        /// Next list, same format
        #[arg(value_name = "NEW")]
        new: PathBuf,

        /// Print operations as JSON
        #[arg(long = "json")]
        json: bool,
    },

    /// Drive a build controller through debounced rebuilds
    Demo {
        /// Number of build requests
        #[arg(short = 'r', long = "rounds", value_name = "N", default_value_t = 5)]
        rounds: u32,

        /// Debounce delay of each request
        #[arg(short = 'd', long = "delay-ms", value_name = "MS", default_value_t = 50)]
        delay_ms: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_diff() {
        let args = Args::parse_from(["itemlist", "-vv", "diff", "a.json", "b.json", "--json"]);
        assert_eq!(args.verbosity, 2);
        match args.command {
            Command::Diff { old, new, json } => {
                assert_eq!(old, PathBuf::from("a.json"));
                assert_eq!(new, PathBuf::from("b.json"));
                assert!(json);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_demo_defaults() {
        let args = Args::parse_from(["itemlist", "demo", "--config", "cfg.json"]);
        assert_eq!(args.config, Some(PathBuf::from("cfg.json")));
        match args.command {
            Command::Demo { rounds, delay_ms } => {
                assert_eq!(rounds, 5);
                assert_eq!(delay_ms, 50);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
