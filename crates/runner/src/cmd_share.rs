use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::anyhow;
use chrono::TimeDelta;
use clap::{Arg, ArgMatches, Command, value_parser};
use serde_json::json;

use crate::{
    cmd_download,
    config::Config,
    shares::{DEFAULT_SHARE_HOURS, DEFAULT_SWEEP_INTERVAL_SECS, ShareStore, Sweeper},
};

pub(super) const COMMAND: &str = "share";

const SUBCOMMAND_CREATE: &str = "create";
const SUBCOMMAND_FETCH: &str = "fetch";
const SUBCOMMAND_CLEAN: &str = "clean";
const SUBCOMMAND_SWEEP: &str = "sweep";

const COMMAND_ARG_SERVER: &str = "server";
const COMMAND_ARG_PATH: &str = "path";
const COMMAND_ARG_HOURS: &str = "hours";
const COMMAND_ARG_TOKEN: &str = "token";
const COMMAND_ARG_INTERVAL: &str = "interval";

pub(super) fn command() -> Command {
    Command::new(COMMAND)
        .about("Manage time-limited share links")
        .subcommand_required(true)
        .subcommand(
            Command::new(SUBCOMMAND_CREATE)
                .about("Create a share for a remote file")
                .arg(
                    Arg::new(COMMAND_ARG_SERVER)
                        .value_name("SERVER")
                        .value_parser(value_parser!(usize))
                        .required(true),
                )
                .arg(Arg::new(COMMAND_ARG_PATH).value_name("PATH").required(true))
                .arg(
                    Arg::new(COMMAND_ARG_HOURS)
                        .help("how long the share stays valid")
                        .value_name("HOURS")
                        .value_parser(value_parser!(i64).range(1..))
                        .long("hours")
                        .default_value("24"),
                ),
        )
        .subcommand(
            Command::new(SUBCOMMAND_FETCH)
                .about("Download the file behind a share token")
                .arg(
                    Arg::new(COMMAND_ARG_TOKEN)
                        .value_name("TOKEN")
                        .required(true),
                )
                .arg(cmd_download::output_arg()),
        )
        .subcommand(Command::new(SUBCOMMAND_CLEAN).about("Remove expired shares"))
        .subcommand(
            Command::new(SUBCOMMAND_SWEEP)
                .about("Remove expired shares periodically until interrupted")
                .arg(
                    Arg::new(COMMAND_ARG_INTERVAL)
                        .help("seconds between sweeps")
                        .value_name("SECS")
                        .value_parser(value_parser!(u64).range(1..))
                        .long("interval")
                        .default_value("3600"),
                ),
        )
}

/// Only `create` and `fetch` read the server config; `clean` and `sweep`
/// work on the share store alone.
pub(super) async fn run(
    config_file: &Path,
    store: Arc<ShareStore>,
    args: &ArgMatches,
) -> anyhow::Result<()> {
    match args.subcommand() {
        Some((SUBCOMMAND_CREATE, args)) => create(config_file, &store, args).await,
        Some((SUBCOMMAND_FETCH, args)) => fetch(config_file, &store, args).await,
        Some((SUBCOMMAND_CLEAN, _)) => {
            let removed = store.clean_expired().await?;
            println!("{}", json!({ "removed": removed }));
            Ok(())
        }
        Some((SUBCOMMAND_SWEEP, args)) => {
            let secs = args
                .get_one::<u64>(COMMAND_ARG_INTERVAL)
                .copied()
                .unwrap_or(DEFAULT_SWEEP_INTERVAL_SECS);
            let sweeper = Sweeper::start(store, Duration::from_secs(secs));
            tokio::signal::ctrl_c().await?;
            sweeper.stop().await;
            Ok(())
        }
        Some((cmd, _)) => Err(anyhow!("invalid share subcommand {cmd}")),
        None => Err(anyhow!("no share subcommand found")),
    }
}

async fn create(config_file: &Path, store: &ShareStore, args: &ArgMatches) -> anyhow::Result<()> {
    let id = args
        .get_one::<usize>(COMMAND_ARG_SERVER)
        .copied()
        .unwrap_or_default();
    let path = args
        .get_one::<String>(COMMAND_ARG_PATH)
        .ok_or_else(|| anyhow!("no path given"))?;
    let hours = args
        .get_one::<i64>(COMMAND_ARG_HOURS)
        .copied()
        .unwrap_or(DEFAULT_SHARE_HOURS);

    // reject unknown servers up front, not at fetch time
    Config::load(config_file).await?.server(id)?;

    let (token, share) = store.create(id, path, TimeDelta::hours(hours)).await?;
    let body = json!({
        "token": token,
        "server_id": share.server_id,
        "path": share.path,
        "expiry": share.expiry,
    });
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(())
}

async fn fetch(config_file: &Path, store: &ShareStore, args: &ArgMatches) -> anyhow::Result<()> {
    let token = args
        .get_one::<String>(COMMAND_ARG_TOKEN)
        .ok_or_else(|| anyhow!("no token given"))?;
    let output = args.get_one::<PathBuf>(cmd_download::COMMAND_ARG_OUTPUT);

    let share = store.resolve(token).await?;
    let config = Config::load(config_file).await?;
    let profile = config.server(share.server_id)?;
    cmd_download::fetch_to_file(profile, &share.path, output).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply() {
        let matches = command()
            .try_get_matches_from(["share", "create", "0", "/pub/x"])
            .unwrap();
        let (_, create) = matches.subcommand().unwrap();
        assert_eq!(create.get_one::<i64>(COMMAND_ARG_HOURS), Some(&24));

        let matches = command().try_get_matches_from(["share", "sweep"]).unwrap();
        let (_, sweep) = matches.subcommand().unwrap();
        assert_eq!(sweep.get_one::<u64>(COMMAND_ARG_INTERVAL), Some(&3600));
    }

    #[test]
    fn zero_interval_is_rejected() {
        assert!(
            command()
                .try_get_matches_from(["share", "sweep", "--interval", "0"])
                .is_err()
        );
    }

    #[tokio::test]
    async fn create_rejects_unknown_server() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ShareStore::new(dir.path()));
        let config_file = dir.path().join("server.json");
        std::fs::write(&config_file, "{}").unwrap();

        let matches = command()
            .try_get_matches_from(["share", "create", "3", "/x"])
            .unwrap();
        assert!(run(&config_file, store, &matches).await.is_err());
        assert!(!dir.path().join("shares.json").exists());
    }

    #[tokio::test]
    async fn clean_runs_without_a_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ShareStore::new(dir.path()));
        store.create(0, "/old", TimeDelta::hours(-1)).await.unwrap();
        store.create(0, "/new", TimeDelta::hours(1)).await.unwrap();

        let missing = dir.path().join("no-such-config.json");
        let matches = command().try_get_matches_from(["share", "clean"]).unwrap();
        run(&missing, store.clone(), &matches).await.unwrap();

        let raw = std::fs::read_to_string(dir.path().join("shares.json")).unwrap();
        assert!(raw.contains("/new"));
        assert!(!raw.contains("/old"));
    }

    #[tokio::test]
    async fn create_needs_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(ShareStore::new(dir.path()));

        let missing = dir.path().join("no-such-config.json");
        let matches = command()
            .try_get_matches_from(["share", "create", "0", "/x"])
            .unwrap();
        assert!(run(&missing, store, &matches).await.is_err());
    }
}
