use clap::Parser;
use std::path::PathBuf;

#[derive(Debug, Parser, Clone, PartialEq, Eq)]
#[command(name = "sql-agent")]
#[command(
    about = "Answer natural-language questions about a SQL database with an LLM agent",
    long_about = "Answer natural-language questions about a SQL database with an LLM agent\n\nThe question is read from the command line, or from stdin when omitted.\n\nConfig file loading:\n  - --config <path> (explicit file, overrides default path discovery)\n  - Default probe path when --config is not provided:\n    1. $XDG_CONFIG_HOME/sql-agent/config.toml\n    2. ~/.config/sql-agent/config.toml\n\nEnvironment variables (and .env) override the config file."
)]
pub struct CliArgs {
    /// Load config from this file path instead of the default discovery path.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Print agent steps and HTTP exchanges to stderr.
    #[arg(short, long)]
    pub verbose: bool,

    /// Feed unparseable model output back to the model instead of failing.
    #[arg(long)]
    pub handle_parsing_errors: bool,

    /// Question to answer. Read from stdin when omitted.
    #[arg(value_name = "QUESTION")]
    pub question: Option<String>,
}
