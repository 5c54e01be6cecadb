use anyhow::Result;
use clap::Parser;
use sql_agent::cli::CliArgs;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    sql_agent::run(args).await
}
