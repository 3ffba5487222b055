use std::path::{Path, PathBuf};

use anyhow::{Context, anyhow};
use clap::{Arg, ArgMatches, Command, value_parser};

use crate::config::Config;

pub(super) const COMMAND: &str = "download";

const COMMAND_ARG_SERVER: &str = "server";
const COMMAND_ARG_PATH: &str = "path";
pub(super) const COMMAND_ARG_OUTPUT: &str = "output";

pub(super) fn output_arg() -> Arg {
    Arg::new(COMMAND_ARG_OUTPUT)
        .help("local file to write, defaults to the remote file name")
        .value_name("FILE")
        .value_parser(value_parser!(PathBuf))
        .short('o')
        .long("output")
}

pub(super) fn command() -> Command {
    Command::new(COMMAND)
        .about("Download a file from a configured server")
        .arg(
            Arg::new(COMMAND_ARG_SERVER)
                .help("server id, as printed by `servers`")
                .value_name("SERVER")
                .value_parser(value_parser!(usize))
                .required(true),
        )
        .arg(
            Arg::new(COMMAND_ARG_PATH)
                .value_name("PATH")
                .required(true),
        )
        .arg(output_arg())
}

pub(super) async fn run(config_file: &Path, args: &ArgMatches) -> anyhow::Result<()> {
    let id = args
        .get_one::<usize>(COMMAND_ARG_SERVER)
        .copied()
        .unwrap_or_default();
    let path = args
        .get_one::<String>(COMMAND_ARG_PATH)
        .ok_or_else(|| anyhow!("no path given"))?;
    let output = args.get_one::<PathBuf>(COMMAND_ARG_OUTPUT);

    let config = Config::load(config_file).await?;
    let profile = config.server(id)?;
    fetch_to_file(profile, path, output).await
}

pub(super) async fn fetch_to_file(
    profile: &ftpbrowse::ServerProfile,
    path: &str,
    output: Option<&PathBuf>,
) -> anyhow::Result<()> {
    let target = match output {
        Some(output) => output.clone(),
        None => PathBuf::from(remote_file_name(path)?),
    };

    let data = ftpbrowse::download_file(profile, path).await?;
    tokio::fs::write(&target, &data)
        .await
        .with_context(|| format!("failed to write {}", target.display()))?;

    tracing::info!(path, target = %target.display(), bytes = data.len(), "download saved");
    Ok(())
}

/// Base name of a remote path, for use as a local file name.
pub(super) fn remote_file_name(path: &str) -> anyhow::Result<&str> {
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .filter(|name| *name != "." && *name != "..")
        .ok_or_else(|| anyhow!("cannot derive a file name from {path:?}, use --output"))
}
