use std::path::Path;

use clap::Command;

use crate::config::Config;

pub(super) const COMMAND: &str = "servers";

pub(super) fn command() -> Command {
    Command::new(COMMAND).about("List configured servers")
}

pub(super) async fn run(config_file: &Path) -> anyhow::Result<()> {
    let config = Config::load(config_file).await?;
    println!("{}", serde_json::to_string_pretty(&config.summaries())?);
    Ok(())
}
