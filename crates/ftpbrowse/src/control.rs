use std::{io, time::Duration};

use futures::{
    AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt,
    io::BufReader,
};

use crate::{
    ConnectionError, Connector, FtpError, ProtocolError, ReadFailure,
    code::{Reply, ReplyCode, ReplyParser},
    command::Command,
    connector::connect_timeout,
};

pub const MAX_LINE_LEN: usize = 4096;
pub const MAX_GREETING_DELAYS: usize = 8;

/// Lifecycle of a control channel. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum ChannelState {
    /// No socket yet. A [`ControlChannel`] is built around an open stream,
    /// so only a session that has not connected reports this.
    Disconnected,
    /// Socket open, greeting not yet accepted.
    Connected,
    /// `220` greeting accepted.
    Ready,
    Authenticated,
    Closed,
}

pub struct ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    stream: BufReader<S>,
    state: ChannelState,
    host: String,
    timeout: Duration,
}

impl<S> ControlChannel<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wraps an already connected stream. The greeting has not been read yet.
    pub fn new(stream: S, host: impl Into<String>, timeout: Duration) -> Self {
        ControlChannel {
            stream: BufReader::new(stream),
            state: ChannelState::Connected,
            host: host.into(),
            timeout,
        }
    }

    /// Connects to `host:port` and waits for the server's `220` greeting.
    pub async fn open<C>(
        connector: &C,
        host: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<Self, FtpError>
    where
        C: Connector<Io = S>,
    {
        tracing::debug!(host, port, "opening control connection");
        let stream = connect_timeout(connector, host, port, timeout)
            .await
            .map_err(|source| ConnectionError::Connect {
                addr: format!("{host}:{port}"),
                source,
            })?;

        let mut channel = ControlChannel::new(stream, host, timeout);
        channel.greet().await?;
        Ok(channel)
    }

    /// Reads the greeting, waiting through at most [`MAX_GREETING_DELAYS`]
    /// `120` replies.
    pub async fn greet(&mut self) -> Result<(), FtpError> {
        let mut delays = 0;
        loop {
            let reply = match self.read_reply().await {
                Ok(reply) => reply,
                Err(FtpError::Protocol(e)) => {
                    return Err(ConnectionError::GreetingUnreadable(e).into());
                }
                Err(e) => return Err(e),
            };

            match reply.kind() {
                Some(ReplyCode::ServiceReadyInMinutes) if delays < MAX_GREETING_DELAYS => {
                    delays += 1;
                    tracing::info!(host = %self.host, reply = %reply, "server not ready yet, waiting");
                }
                Some(ReplyCode::ServiceReady) => {
                    tracing::debug!(host = %self.host, reply = %reply, "server greeting accepted");
                    self.transition(ChannelState::Ready);
                    return Ok(());
                }
                _ => {
                    self.transition(ChannelState::Closed);
                    return Err(ConnectionError::Greeting(reply).into());
                }
            }
        }
    }

    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Host name the control connection was opened to.
    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub(crate) fn mark_authenticated(&mut self) {
        self.transition(ChannelState::Authenticated);
    }

    fn transition(&mut self, to: ChannelState) {
        if self.state == to || self.state == ChannelState::Closed {
            return;
        }
        tracing::trace!(host = %self.host, from = %self.state, %to, "control channel state change");
        self.state = to;
    }

    pub async fn send(&mut self, command: &Command) -> Result<(), FtpError> {
        match self.state {
            ChannelState::Ready | ChannelState::Authenticated => {}
            state => return Err(ConnectionError::NotReady(state).into()),
        }
        command.validate()?;

        tracing::debug!(command = %command.redacted(), "sending command");

        let line = format!("{command}\r\n");
        let stream = &mut self.stream;
        let write = async move {
            stream.write_all(line.as_bytes()).await?;
            stream.flush().await
        };

        let source = match tokio::time::timeout(self.timeout, write).await {
            Ok(Ok(())) => return Ok(()),
            Ok(Err(e)) => e,
            Err(_) => io::Error::new(io::ErrorKind::TimedOut, "write timed out"),
        };

        self.transition(ChannelState::Closed);
        Err(ConnectionError::Send {
            command: command.verb(),
            source,
        }
        .into())
    }

    pub async fn read_reply(&mut self) -> Result<Reply, FtpError> {
        if self.state == ChannelState::Closed {
            return Err(ConnectionError::NotReady(self.state).into());
        }

        let mut parser = ReplyParser::default();
        let e = match tokio::time::timeout(
            self.timeout,
            read_reply_lines(&mut self.stream, &mut parser),
        )
        .await
        {
            Ok(Ok(reply)) => {
                tracing::trace!(code = reply.code(), reply = %reply, "reply received");
                return Ok(reply);
            }
            Ok(Err(e)) => e,
            Err(_) => ProtocolError::Incomplete {
                reason: ReadFailure::TimedOut,
                partial: parser.take_partial(),
            },
        };

        if let ProtocolError::Incomplete { partial, .. } = &e
            && !partial.is_empty()
        {
            tracing::debug!(?partial, "partial reply before failure");
        }
        self.transition(ChannelState::Closed);
        Err(e.into())
    }

    pub async fn execute(&mut self, command: &Command) -> Result<Reply, FtpError> {
        self.send(command).await?;
        self.read_reply().await
    }

    /// Runs `command` and requires one of `codes` in reply.
    pub async fn expect(
        &mut self,
        command: &Command,
        codes: &[ReplyCode],
    ) -> Result<Reply, FtpError> {
        let reply = self.execute(command).await?;
        if codes.iter().any(|code| reply.is(*code)) {
            Ok(reply)
        } else {
            Err(ProtocolError::UnexpectedReply {
                command: command.verb(),
                reply,
            }
            .into())
        }
    }

    /// Says goodbye if the server is still listening, then drops the socket.
    pub async fn close(mut self) {
        if matches!(self.state, ChannelState::Ready | ChannelState::Authenticated) {
            match self.execute(&Command::Quit).await {
                Ok(reply) => tracing::debug!(code = reply.code(), "control channel quit"),
                Err(e) => tracing::debug!(err = %e, "QUIT failed, closing anyway"),
            }
        }

        self.transition(ChannelState::Closed);
        if let Ok(Err(e)) = tokio::time::timeout(self.timeout, self.stream.close()).await {
            tracing::trace!(err = %e, "error shutting down control stream");
        }
    }
}

async fn read_reply_lines<R>(
    reader: &mut R,
    parser: &mut ReplyParser,
) -> Result<Reply, ProtocolError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::with_capacity(128);

    loop {
        buf.clear();
        let n = match (&mut *reader)
            .take(MAX_LINE_LEN as u64)
            .read_until(b'\n', &mut buf)
            .await
        {
            Ok(n) => n,
            Err(e) => {
                return Err(ProtocolError::Incomplete {
                    reason: ReadFailure::Io(e),
                    partial: parser.take_partial(),
                });
            }
        };

        if buf.last() != Some(&b'\n') {
            if n >= MAX_LINE_LEN {
                return Err(ProtocolError::LineTooLong(MAX_LINE_LEN));
            }

            let mut partial = parser.take_partial();
            if n > 0 {
                partial.push(String::from_utf8_lossy(&buf).into_owned());
            }
            return Err(ProtocolError::Incomplete {
                reason: ReadFailure::Closed,
                partial,
            });
        }

        if let Some(reply) = parser.feed(&String::from_utf8_lossy(&buf))? {
            return Ok(reply);
        }
    }
}
