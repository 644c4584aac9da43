use std::path::PathBuf;

use clap::{Parser, ValueEnum};

#[derive(ValueEnum, Clone, Debug, PartialEq)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// YAML options file overriding the built-in stages and thresholds
    #[arg(short, long, env = "RAMPR_OPTIONS")]
    pub options: Option<PathBuf>,

    /// Run a single iteration against the login endpoint and exit
    #[arg(long, default_value_t = false)]
    pub once: bool,

    /// Output format
    #[arg(short = 'O', long, value_enum, default_value_t = OutputFormat::Text)]
    pub output: OutputFormat,

    /// Disable the live progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,
}
