use std::fmt;

use crate::ProtocolError;

/// Upper bound on the number of lines a single reply may span.
pub const MAX_REPLY_LINES: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Port(pub u16);

impl Port {
    pub fn from_p1_p2(p1: u8, p2: u8) -> Self {
        Port(((p1 as u16) << 8) + p2 as u16)
    }
}

#[repr(u16)]
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::FromRepr, strum_macros::AsRefStr,
)]
pub enum ReplyCode {
    ServiceReadyInMinutes = 120,
    DataConnectionAlreadyOpen = 125,
    OpeningDataConnection = 150,
    Ok = 200,
    ServiceReady = 220,
    ClosingControlConnection = 221,
    ClosingDataConnectionSuccessful = 226,
    EnteringPassiveMode = 227,
    UserLoggedIn = 230,
    FileActionOk = 250,
    NeedPassword = 331,
    NeedAccount = 332,
    ServiceNotAvailable = 421,
    CantOpenDataConnection = 425,
    TransferAborted = 426,
    FileActionNotTaken = 450,
    LocalError = 451,
    CommandUnrecognized = 500,
    SyntaxError = 501,
    CommandNotImplemented = 502,
    BadSequence = 503,
    ParameterNotImplemented = 504,
    NotLoggedIn = 530,
    FileUnavailable = 550,
}

impl ReplyCode {
    pub const fn code(self) -> u16 {
        self as u16
    }
}

/// A complete logical reply read from the control channel.
///
/// `lines` holds the raw lines (status prefix included, line terminator
/// stripped) in the order they were received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    code: u16,
    lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, lines: Vec<String>) -> Self {
        Reply { code, lines }
    }

    pub fn code(&self) -> u16 {
        self.code
    }

    /// The well-known code for this reply, if it is one we name.
    pub fn kind(&self) -> Option<ReplyCode> {
        ReplyCode::from_repr(self.code)
    }

    pub fn is(&self, code: ReplyCode) -> bool {
        self.code == code.code()
    }

    /// 4xx and 5xx replies.
    pub fn is_negative(&self) -> bool {
        self.code >= 400
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    /// Text of the first line after the status code and separator.
    pub fn message(&self) -> &str {
        self.lines
            .first()
            .and_then(|line| line.get(4..))
            .unwrap_or_default()
            .trim()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, line) in self.lines.iter().enumerate() {
            if i > 0 {
                f.write_str(" | ")?;
            }
            f.write_str(line)?;
        }
        Ok(())
    }
}

/// Incremental reply framer.
///
/// Lines are fed one at a time; a reply is complete on a single line
/// `"ddd text"` (or a bare `"ddd"`), or, once a `"ddd-"` line opened a
/// multi-line reply, on the first line starting with the same three
/// digits followed by a space.
#[derive(Debug, Default)]
pub struct ReplyParser {
    code: Option<u16>,
    lines: Vec<String>,
}

impl ReplyParser {
    pub fn feed(&mut self, line: &str) -> Result<Option<Reply>, ProtocolError> {
        let line = line.trim_end_matches(['\r', '\n']);

        let Some(code) = self.code else {
            let code = parse_code(line)
                .ok_or_else(|| ProtocolError::MalformedReply(line.to_string()))?;
            return match line.as_bytes().get(3) {
                None | Some(b' ') => Ok(Some(Reply::new(code, vec![line.to_string()]))),
                Some(b'-') => {
                    self.code = Some(code);
                    self.lines.push(line.to_string());
                    Ok(None)
                }
                Some(_) => Err(ProtocolError::MalformedReply(line.to_string())),
            };
        };

        if self.lines.len() >= MAX_REPLY_LINES {
            return Err(ProtocolError::TooManyLines(MAX_REPLY_LINES));
        }
        self.lines.push(line.to_string());

        if parse_code(line) == Some(code) && line.as_bytes().get(3) == Some(&b' ') {
            self.code = None;
            let lines = std::mem::take(&mut self.lines);
            return Ok(Some(Reply::new(code, lines)));
        }

        Ok(None)
    }

    /// Lines collected for a reply that never completed.
    pub fn take_partial(&mut self) -> Vec<String> {
        self.code = None;
        std::mem::take(&mut self.lines)
    }
}

fn parse_code(line: &str) -> Option<u16> {
    let digits = line.as_bytes().get(..3)?;
    if !digits.iter().all(u8::is_ascii_digit) {
        return None;
    }

    let code = digits
        .iter()
        .fold(0u16, |acc, d| acc * 10 + (d - b'0') as u16);
    (100..600).contains(&code).then_some(code)
}
