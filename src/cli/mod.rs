//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "lector",
    version,
    about = "Grounded question answering over a document corpus",
    long_about = "Lector chunks and embeds a directory of documents into an exact vector index, \
                  retrieves relevant passages with combined vector and keyword search, and \
                  assembles them into per-source context with citations for answer generation."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/lector/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Configuration profile to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a new index generation from a directory of documents
    Build {
        /// Directory of <source_id>.txt files with optional <source_id>.json attributes
        #[arg(short, long, value_name = "DIR")]
        source: PathBuf,

        /// Category stamped on every document's attributes
        #[arg(long)]
        category: Option<String>,
    },

    /// Retrieve matching chunks without generating an answer
    Query {
        /// Search query text
        query: String,

        /// Number of vector hits (defaults to retrieval.top_k_vector)
        #[arg(short = 'k', long = "top-k")]
        top_k: Option<usize>,

        /// Number of keyword hits (defaults to retrieval.top_k_keyword)
        #[arg(long = "keyword-k")]
        keyword_k: Option<usize>,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Ask a question answered from the indexed corpus
    Ask {
        /// Question to ask
        question: String,

        /// Skip generation and print the assembled context and sources
        #[arg(long)]
        offline: bool,

        /// Show the answer in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Show the active index generation and storage usage
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show {
        /// Show only a specific section
        #[arg(short, long)]
        section: Option<String>,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (defaults to standard location)
        #[arg(short, long)]
        file: Option<PathBuf>,
    },

    /// Initialize default configuration
    Init {
        /// Force overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}

impl Cli {
    /// Parse CLI arguments from command line
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_cli() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }

    #[test]
    fn test_query_flags() {
        let cli = Cli::try_parse_from([
            "lector",
            "--profile",
            "precise",
            "query",
            "attention",
            "-k",
            "3",
            "--keyword-k",
            "0",
            "--json",
        ])
        .unwrap();

        assert_eq!(cli.profile.as_deref(), Some("precise"));
        match cli.command {
            Commands::Query {
                query,
                top_k,
                keyword_k,
                json,
            } => {
                assert_eq!(query, "attention");
                assert_eq!(top_k, Some(3));
                assert_eq!(keyword_k, Some(0));
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }
}
