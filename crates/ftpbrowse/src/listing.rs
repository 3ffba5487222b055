//! `LIST` retrieval and parsing of Unix-style long listings.

use std::borrow::Cow;

use chrono::{Datelike, Month, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use futures::{AsyncRead, AsyncWrite};

use crate::{
    Connector, ControlChannel, FtpError, ParseError, ProtocolError,
    code::{Reply, ReplyCode},
    command::{Command, ListFormat},
    passive::enter_passive,
    transfer::read_final_reply,
};

const LISTING_FIELDS: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum_macros::Display)]
#[strum(serialize_all = "lowercase")]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "lowercase")
)]
pub enum EntryKind {
    Directory,
    File,
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct DirectoryEntry {
    pub name: String,
    pub path: String,
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: EntryKind,
    pub size: u64,
    pub permissions: String,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub modified: Option<NaiveDateTime>,
    #[cfg_attr(feature = "serde", serde(skip_serializing_if = "Option::is_none"))]
    pub link_target: Option<String>,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// Lists `path` on an authenticated channel.
///
/// Changes into `path` unless it is the root, then runs `LIST -la` over a
/// fresh passive connection, or plain `LIST` on a new one when the server
/// refuses the flags. A missing or unexpected final reply is logged
/// but does not discard what was already received.
pub async fn list<S, C>(
    channel: &mut ControlChannel<S>,
    connector: &C,
    path: &str,
) -> Result<Vec<DirectoryEntry>, FtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Connector,
{
    if !is_root(path) {
        channel
            .expect(&Command::Cwd(path.to_string()), &[ReplyCode::FileActionOk])
            .await?;
    }

    let data = enter_passive(channel, connector).await?;
    let reply = channel.execute(&Command::List(ListFormat::Long)).await?;
    let data = if opens_data(&reply) {
        data
    } else if rejects_arguments(&reply) {
        tracing::debug!(path, code = reply.code(), "LIST -la rejected, retrying plain LIST");
        drop(data);
        let data = enter_passive(channel, connector).await?;
        channel
            .expect(&Command::List(ListFormat::Plain), OPENING_REPLIES)
            .await?;
        data
    } else {
        return Err(ProtocolError::UnexpectedReply {
            command: "LIST",
            reply,
        }
        .into());
    };

    let mut raw = Vec::new();
    let received = data.drain_into(&mut raw).await?;
    read_final_reply(channel, "LIST").await;

    let entries = parse_listing(&decode_listing(&raw), path, Utc::now().date_naive());
    tracing::debug!(path, bytes = received, entries = entries.len(), "directory listed");
    Ok(entries)
}

const OPENING_REPLIES: &[ReplyCode] = &[
    ReplyCode::OpeningDataConnection,
    ReplyCode::DataConnectionAlreadyOpen,
];

fn opens_data(reply: &Reply) -> bool {
    OPENING_REPLIES.iter().any(|code| reply.is(*code))
}

// servers without `ls`-style flags refuse the argument, not the command
fn rejects_arguments(reply: &Reply) -> bool {
    [
        ReplyCode::CommandUnrecognized,
        ReplyCode::SyntaxError,
        ReplyCode::ParameterNotImplemented,
    ]
    .iter()
    .any(|code| reply.is(*code))
}

/// UTF-8 when valid, Latin-1 otherwise.
pub fn decode_listing(raw: &[u8]) -> Cow<'_, str> {
    match std::str::from_utf8(raw) {
        Ok(s) => Cow::Borrowed(s),
        Err(_) => Cow::Owned(raw.iter().map(|&b| b as char).collect()),
    }
}

/// Parses a whole listing, skipping lines that do not describe an entry.
/// The result is sorted with [`sort_entries`].
pub fn parse_listing(text: &str, base: &str, today: NaiveDate) -> Vec<DirectoryEntry> {
    let mut entries = Vec::new();

    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        match parse_line(line, base, today) {
            Ok(Some(entry)) => entries.push(entry),
            Ok(None) => {}
            Err(e) => tracing::debug!(line, err = %e, "skipping listing line"),
        }
    }

    sort_entries(&mut entries);
    entries
}

/// Parses one `ls -l` style line. `Ok(None)` for the `.` and `..` entries.
pub fn parse_line(
    line: &str,
    base: &str,
    today: NaiveDate,
) -> Result<Option<DirectoryEntry>, ParseError> {
    let fields = split_fields(line.trim_end(), LISTING_FIELDS);
    let [perms, _links, _owner, _group, size, month, day, time_or_year, name] = fields[..] else {
        return Err(ParseError::TooFewFields(fields.len()));
    };

    let (name, link_target) = match name.split_once(" -> ") {
        Some((link, target)) if perms.starts_with('l') => (link, Some(target.to_string())),
        _ => (name, None),
    };

    if name == "." || name == ".." {
        return Ok(None);
    }
    if name.contains('/') {
        return Err(ParseError::NameHasSeparator(name.to_string()));
    }

    let kind = if perms.starts_with('d') {
        EntryKind::Directory
    } else {
        EntryKind::File
    };
    let size = if size.bytes().all(|b| b.is_ascii_digit()) {
        size.parse().unwrap_or(0)
    } else {
        0
    };

    Ok(Some(DirectoryEntry {
        name: name.to_string(),
        path: join_path(base, name),
        kind,
        size,
        permissions: perms.to_string(),
        modified: parse_modified(month, day, time_or_year, today),
        link_target,
    }))
}

/// Splits on whitespace runs into at most `max` fields; the last field is
/// the untouched remainder of the line.
fn split_fields(line: &str, max: usize) -> Vec<&str> {
    let mut fields = Vec::with_capacity(max);
    let mut rest = line.trim_start();

    while !rest.is_empty() {
        if fields.len() + 1 == max {
            fields.push(rest);
            break;
        }
        match rest.find(char::is_whitespace) {
            Some(end) => {
                fields.push(&rest[..end]);
                rest = rest[end..].trim_start();
            }
            None => {
                fields.push(rest);
                break;
            }
        }
    }

    fields
}

// `ls` prints "HH:MM" for the last six months and the year otherwise, so a
// time without a year that lands in the future belongs to last year.
fn parse_modified(
    month: &str,
    day: &str,
    time_or_year: &str,
    today: NaiveDate,
) -> Option<NaiveDateTime> {
    let month = month.parse::<Month>().ok()?.number_from_month();
    let day: u32 = day.parse().ok()?;

    match time_or_year.split_once(':') {
        Some((hour, minute)) => {
            let time = NaiveTime::from_hms_opt(hour.parse().ok()?, minute.parse().ok()?, 0)?;
            let date = NaiveDate::from_ymd_opt(today.year(), month, day)?;
            let date = if (date - today).num_days() > 1 {
                NaiveDate::from_ymd_opt(today.year() - 1, month, day)?
            } else {
                date
            };
            Some(date.and_time(time))
        }
        None => {
            let year = time_or_year.parse().ok()?;
            NaiveDate::from_ymd_opt(year, month, day)?.and_hms_opt(0, 0, 0)
        }
    }
}

/// Directories first, then case-insensitive name order.
pub fn sort_entries(entries: &mut [DirectoryEntry]) {
    entries.sort_by(|a, b| {
        a.kind
            .cmp(&b.kind)
            .then_with(|| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            .then_with(|| a.name.cmp(&b.name))
    });
}

pub fn is_root(path: &str) -> bool {
    path.trim().trim_matches('/').is_empty()
}

/// Collapses repeated separators and drops a trailing one (except for `/`).
pub fn normalize_path(path: &str) -> String {
    let absolute = path.starts_with('/');
    let joined = path
        .split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/");

    match (absolute, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => "/".to_string(),
        (false, false) => joined,
    }
}

/// Joins `name` onto `base` with exactly one separator.
pub fn join_path(base: &str, name: &str) -> String {
    let base = normalize_path(base);
    let name = name.trim_start_matches('/');
    if base.ends_with('/') {
        format!("{base}{name}")
    } else {
        format!("{base}/{name}")
    }
}
