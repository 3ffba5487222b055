use std::path::Path;

use clap::{Arg, ArgMatches, Command, value_parser};
use serde_json::json;

use crate::config::Config;

pub(super) const COMMAND: &str = "browse";

const COMMAND_ARG_SERVER: &str = "server";
const COMMAND_ARG_PATH: &str = "path";

pub(super) fn command() -> Command {
    Command::new(COMMAND)
        .about("List a directory on a configured server")
        .arg(
            Arg::new(COMMAND_ARG_SERVER)
                .help("server id, as printed by `servers`")
                .value_name("SERVER")
                .value_parser(value_parser!(usize))
                .required(true),
        )
        .arg(
            Arg::new(COMMAND_ARG_PATH)
                .help("directory, relative to the server's root path unless absolute")
                .value_name("PATH")
                .num_args(1),
        )
}

pub(super) async fn run(config_file: &Path, args: &ArgMatches) -> anyhow::Result<()> {
    let id = args
        .get_one::<usize>(COMMAND_ARG_SERVER)
        .copied()
        .unwrap_or_default();
    let path = args
        .get_one::<String>(COMMAND_ARG_PATH)
        .map(|s| s.as_str())
        .unwrap_or_default();

    let config = Config::load(config_file).await?;
    let profile = config.server(id)?;
    let files = ftpbrowse::list_directory(profile, path).await?;

    let body = json!({
        "path": profile.resolve_path(path),
        "files": files,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}
