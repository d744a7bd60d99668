//! Command line arguments.

use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "sift")]
#[command(about = "Embedding-based dedup, grouping, region diff and prioritization for news runs")]
#[command(version)]
pub struct Cli {
    /// Config file (.toml, .json or .yaml); SIFT_* variables override it
    #[arg(short, long, global = true, env = "SIFT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Embedding history database (overrides store.path)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Identity of the run being processed.
#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    /// Run id; a random one is generated when omitted
    #[arg(long)]
    pub run_id: Option<String>,

    /// Run date (YYYY-MM-DD, UTC); defaults to today
    #[arg(long)]
    pub date: Option<NaiveDate>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Dedup a run against history and group the survivors
    Process {
        /// Articles as a JSON array, {"articles": [...]}, or JSON Lines
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for groups.json, dedup_log.json, errors.json and report.json
        #[arg(short, long)]
        out_dir: PathBuf,

        #[command(flatten)]
        run: RunArgs,

        /// Append the survivors to the embedding history
        #[arg(long)]
        record_history: bool,

        /// Never call the embedding provider; unembedded articles are excluded
        #[arg(long)]
        no_embed: bool,
    },

    /// Append final (merged, enriched) articles to the embedding history
    Record {
        #[arg(short, long)]
        input: PathBuf,

        #[command(flatten)]
        run: RunArgs,
    },

    /// Report articles with no close counterpart in another region's history
    Diff {
        /// Population A articles (with embeddings)
        #[arg(short, long)]
        input: PathBuf,

        /// Region whose history is population B
        #[arg(long)]
        against: String,

        #[command(flatten)]
        run: RunArgs,

        /// Override diff.threshold
        #[arg(long)]
        threshold: Option<f32>,

        /// Override diff.lookback_days
        #[arg(long)]
        lookback_days: Option<u32>,

        /// Write the report here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rank enriched articles and keep the top N
    Prioritize {
        #[arg(short, long)]
        input: PathBuf,

        /// Override priority.top_n
        #[arg(short = 'n', long)]
        top_n: Option<usize>,

        /// Write the ranking here instead of stdout
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_process() {
        let cli = Cli::try_parse_from([
            "sift",
            "--store",
            "/tmp/e.db",
            "process",
            "-i",
            "articles.jsonl",
            "-o",
            "out",
            "--date",
            "2025-11-07",
            "--record-history",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("/tmp/e.db")));
        match cli.command {
            Commands::Process { input, run, record_history, no_embed, .. } => {
                assert_eq!(input, PathBuf::from("articles.jsonl"));
                assert_eq!(run.date, NaiveDate::from_ymd_opt(2025, 11, 7));
                assert!(record_history);
                assert!(!no_embed);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_diff_and_prioritize() {
        let cli = Cli::try_parse_from(["sift", "diff", "-i", "tr.json", "--against", "eu", "--threshold", "0.7"]).unwrap();
        assert!(matches!(cli.command, Commands::Diff { threshold: Some(t), .. } if t == 0.7));

        let cli = Cli::try_parse_from(["sift", "--log-json", "prioritize", "-i", "final.json", "-n", "5"]).unwrap();
        assert!(cli.log_json);
        assert!(matches!(cli.command, Commands::Prioritize { top_n: Some(5), .. }));
    }

    #[test]
    fn test_rejects_bad_date() {
        assert!(Cli::try_parse_from(["sift", "record", "-i", "a.json", "--date", "yesterday"]).is_err());
    }
}
