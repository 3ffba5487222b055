//! `ftpbrowser`, a command line front end for the ftpbrowse crate: browse and
//! download from the servers in a JSON config file, and hand out
//! time-limited share tokens for single files.
//!
//! results go to stdout as JSON, logs go to stderr.

mod config;
mod shares;

mod cmd_browse;
mod cmd_download;
mod cmd_servers;
mod cmd_share;

use std::{path::PathBuf, sync::Arc};

use anyhow::anyhow;
use clap::{Arg, ArgAction, Command, value_parser};
use ftpbrowse::FtpError;
use tracing_subscriber::EnvFilter;

use crate::{
    config::DEFAULT_CONFIG_FILE,
    shares::{DEFAULT_SHARES_DIR, ShareError, ShareStore},
};

const GLOBAL_ARG_CONFIG: &str = "config";
const GLOBAL_ARG_SHARES_DIR: &str = "shares-dir";
const GLOBAL_ARG_VERBOSE: &str = "verbose";

fn build_cli_args() -> Command {
    Command::new("ftpbrowser")
        .about("Browse and download from configured FTP servers")
        .subcommand_required(true)
        .arg(
            Arg::new(GLOBAL_ARG_CONFIG)
                .help("server config file")
                .value_name("FILE")
                .value_parser(value_parser!(PathBuf))
                .short('c')
                .long("config")
                .default_value(DEFAULT_CONFIG_FILE)
                .global(true),
        )
        .arg(
            Arg::new(GLOBAL_ARG_SHARES_DIR)
                .help("directory holding shares.json")
                .value_name("DIR")
                .value_parser(value_parser!(PathBuf))
                .long("shares-dir")
                .default_value(DEFAULT_SHARES_DIR)
                .global(true),
        )
        .arg(
            Arg::new(GLOBAL_ARG_VERBOSE)
                .help("show verbose message")
                .num_args(0)
                .action(ArgAction::Count)
                .short('v')
                .global(true),
        )
        .subcommand(cmd_servers::command())
        .subcommand(cmd_browse::command())
        .subcommand(cmd_download::command())
        .subcommand(cmd_share::command())
}

fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "runner=info,ftpbrowse=info",
        1 => "runner=debug,ftpbrowse=debug",
        _ => "runner=trace,ftpbrowse=trace",
    }
}

/// Status a web front end would answer with, for errors that carry one.
fn http_status(e: &anyhow::Error) -> Option<u16> {
    if let Some(e) = e.downcast_ref::<FtpError>() {
        Some(e.kind().http_status())
    } else {
        e.downcast_ref::<ShareError>().map(ShareError::http_status)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = build_cli_args().get_matches();

    let verbose = args
        .get_one::<u8>(GLOBAL_ARG_VERBOSE)
        .copied()
        .unwrap_or_default();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_filter(verbose)));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_file = args
        .get_one::<PathBuf>(GLOBAL_ARG_CONFIG)
        .ok_or_else(|| anyhow!("no config file given"))?;
    let shares_dir = args
        .get_one::<PathBuf>(GLOBAL_ARG_SHARES_DIR)
        .ok_or_else(|| anyhow!("no shares directory given"))?;

    let store = Arc::new(ShareStore::new(shares_dir));

    let ret = match args.subcommand() {
        Some((cmd_servers::COMMAND, _)) => cmd_servers::run(config_file).await,
        Some((cmd_browse::COMMAND, args)) => cmd_browse::run(config_file, args).await,
        Some((cmd_download::COMMAND, args)) => cmd_download::run(config_file, args).await,
        Some((cmd_share::COMMAND, args)) => cmd_share::run(config_file, store, args).await,
        Some((cmd, _)) => Err(anyhow!("invalid subcommand {cmd}")),
        None => Err(anyhow!("no subcommand found")),
    };

    if let Err(e) = &ret {
        match http_status(e) {
            Some(status) => tracing::error!(status, err = %e, "command failed"),
            None => tracing::error!(err = %e, "command failed"),
        }
    }
    ret
}
