use std::fmt;

use crate::FtpError;

/// Commands the client issues on the control channel.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum_macros::IntoStaticStr)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Command {
    User(String),
    Pass(String),
    /// `TYPE I`. Every transfer is binary.
    #[strum(serialize = "TYPE")]
    Binary,
    Cwd(String),
    Pasv,
    List(ListFormat),
    Retr(String),
    Quit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ListFormat {
    /// `LIST -la`, long format including dot files.
    #[default]
    Long,
    Plain,
}

impl Command {
    pub fn verb(&self) -> &'static str {
        self.into()
    }

    fn argument(&self) -> Option<&str> {
        match self {
            Command::User(arg) | Command::Pass(arg) | Command::Cwd(arg) | Command::Retr(arg) => {
                Some(arg)
            }
            _ => None,
        }
    }

    /// Rejects arguments that would smuggle a second command onto the wire.
    pub fn validate(&self) -> Result<(), FtpError> {
        match self.argument() {
            Some(arg) if arg.contains(['\r', '\n']) => Err(FtpError::InvalidInput(format!(
                "{} argument contains a line break",
                self.verb()
            ))),
            _ => Ok(()),
        }
    }

    /// Display adapter that masks the password of `PASS`.
    pub fn redacted(&self) -> Redacted<'_> {
        Redacted(self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = self.verb();
        match self {
            Command::Binary => write!(f, "{verb} I"),
            Command::List(ListFormat::Long) => write!(f, "{verb} -la"),
            Command::List(ListFormat::Plain) | Command::Pasv | Command::Quit => f.write_str(verb),
            _ => write!(f, "{verb} {}", self.argument().unwrap_or_default()),
        }
    }
}

pub struct Redacted<'a>(&'a Command);

impl fmt::Display for Redacted<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Command::Pass(_) => write!(f, "{} ****", self.0.verb()),
            command => fmt::Display::fmt(command, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_wire_lines() {
        assert_eq!(Command::User("bob".into()).to_string(), "USER bob");
        assert_eq!(Command::Pass("hunter2".into()).to_string(), "PASS hunter2");
        assert_eq!(Command::Binary.to_string(), "TYPE I");
        assert_eq!(Command::Binary.verb(), "TYPE");
        assert_eq!(
            Command::Cwd("/My Folder".into()).to_string(),
            "CWD /My Folder"
        );
        assert_eq!(Command::Pasv.to_string(), "PASV");
        assert_eq!(Command::List(ListFormat::Long).to_string(), "LIST -la");
        assert_eq!(Command::List(ListFormat::Plain).to_string(), "LIST");
        assert_eq!(Command::Retr("/a/b.bin".into()).to_string(), "RETR /a/b.bin");
        assert_eq!(Command::Quit.to_string(), "QUIT");
    }

    #[test]
    fn password_is_redacted() {
        let pass = Command::Pass("hunter2".into());
        assert_eq!(pass.redacted().to_string(), "PASS ****");
        let user = Command::User("bob".into());
        assert_eq!(user.redacted().to_string(), "USER bob");
    }

    #[test]
    fn rejects_line_breaks() {
        let cmd = Command::Retr("a\r\nDELE b".into());
        assert!(matches!(cmd.validate(), Err(FtpError::InvalidInput(_))));
        assert!(Command::Retr("plain name".into()).validate().is_ok());
        assert!(Command::Pasv.validate().is_ok());
    }
}
