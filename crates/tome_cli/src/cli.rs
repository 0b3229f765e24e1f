use std::path::PathBuf;

use clap::Parser;
use log::LevelFilter;
use tome_logging::LogDestination;

use crate::config::TomeConfig;

/// Download every chapter of a work into a single text file, resuming where
/// the previous run stopped.
#[derive(Debug, Parser)]
#[command(name = "tome", version, about)]
pub struct Args {
    /// Id of the work to download.
    pub work_id: String,

    /// Directory for the document and its progress file.
    #[arg(short, long, value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// RON configuration file.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Maximum concurrent chapter fetches.
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Cookie header sent with every request.
    #[arg(long)]
    pub cookie: Option<String>,

    /// Also write the log to `tome.log` in the output directory.
    #[arg(long)]
    pub log_file: bool,

    /// Log at debug level.
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    /// Command-line values take precedence over the config file.
    pub fn apply(&self, config: &mut TomeConfig) {
        if let Some(output) = &self.output {
            config.output_dir = output.clone();
        }
        if let Some(concurrency) = self.concurrency {
            config.max_concurrency = concurrency;
        }
        if let Some(cookie) = &self.cookie {
            config.cookie = Some(cookie.clone());
        }
    }

    pub fn log_destination(&self) -> LogDestination {
        if self.log_file {
            LogDestination::Both
        } else {
            LogDestination::Terminal
        }
    }

    pub fn log_level(&self) -> LevelFilter {
        if self.verbose {
            LevelFilter::Debug
        } else {
            LevelFilter::Info
        }
    }
}
