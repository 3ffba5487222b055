use futures::{AsyncRead, AsyncWrite};

use crate::{
    ChannelState, ConnectionError, Connector, ControlChannel, DirectoryEntry, FtpError,
    ServerProfile, auth, listing, transfer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display)]
pub enum SessionState {
    Idle,
    Connected,
    Authenticated,
    Listing,
    Downloading,
    Closed,
}

/// How many times an operation is attempted before its error is surfaced.
/// Attempts after the first each run on a brand new, freshly authenticated
/// control connection. There is no backoff between attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: u32,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        RetryPolicy {
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn never() -> Self {
        RetryPolicy::new(1)
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy::new(2)
    }
}

enum Phase<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    Idle,
    Authenticated(ControlChannel<S>),
    Closed,
}

/// A single high-level operation against one server.
///
/// `list` and `download` consume the session: it runs exactly one of them
/// and is closed afterwards, whatever the outcome.
pub struct FtpSession<C>
where
    C: Connector,
{
    profile: ServerProfile,
    connector: C,
    retry: RetryPolicy,
    phase: Phase<C::Io>,
}

impl<C> FtpSession<C>
where
    C: Connector,
{
    pub fn new(profile: ServerProfile, connector: C) -> Self {
        if !profile.passive {
            tracing::warn!(
                host = %profile.host,
                "active mode is not supported, using passive mode"
            );
        }

        FtpSession {
            profile,
            connector,
            retry: RetryPolicy::default(),
            phase: Phase::Idle,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn profile(&self) -> &ServerProfile {
        &self.profile
    }

    pub fn state(&self) -> SessionState {
        match self.phase {
            Phase::Idle => SessionState::Idle,
            Phase::Authenticated(_) => SessionState::Authenticated,
            Phase::Closed => SessionState::Closed,
        }
    }

    /// State of the control channel this session holds, if any.
    pub fn channel_state(&self) -> ChannelState {
        match &self.phase {
            Phase::Idle => ChannelState::Disconnected,
            Phase::Authenticated(channel) => channel.state(),
            Phase::Closed => ChannelState::Closed,
        }
    }

    /// Opens the control connection and logs in. Operations connect on
    /// their own when this was not called first.
    pub async fn connect(&mut self) -> Result<(), FtpError> {
        match self.phase {
            Phase::Idle => {}
            Phase::Authenticated(_) => return Ok(()),
            Phase::Closed => return Err(ConnectionError::SessionClosed.into()),
        }

        match self.establish().await {
            Ok(channel) => {
                self.phase = Phase::Authenticated(channel);
                Ok(())
            }
            Err(e) => {
                self.phase = Phase::Closed;
                Err(e)
            }
        }
    }

    pub async fn list(self, path: &str) -> Result<Vec<DirectoryEntry>, FtpError> {
        let path = self.profile.resolve_path(path);
        self.run(ListDirectory { path }).await
    }

    pub async fn download(self, path: &str) -> Result<Vec<u8>, FtpError> {
        let path = self.profile.resolve_path(path);
        self.run(Retrieve { path }).await
    }

    pub async fn close(mut self) {
        if let Phase::Authenticated(channel) = std::mem::replace(&mut self.phase, Phase::Closed) {
            channel.close().await;
        }
    }

    async fn establish(&self) -> Result<ControlChannel<C::Io>, FtpError> {
        let profile = &self.profile;
        let mut channel = ControlChannel::open(
            &self.connector,
            &profile.host,
            profile.port,
            profile.timeout(),
        )
        .await?;
        tracing::debug!(host = %profile.host, state = %SessionState::Connected, "session state change");

        if let Err(e) = auth::login(&mut channel, &profile.username, &profile.password).await {
            channel.close().await;
            return Err(e);
        }
        tracing::debug!(host = %profile.host, state = %SessionState::Authenticated, "session state change");

        Ok(channel)
    }

    async fn run<O>(mut self, op: O) -> Result<O::Output, FtpError>
    where
        O: Operation,
    {
        let mut channel = match std::mem::replace(&mut self.phase, Phase::Closed) {
            Phase::Authenticated(channel) => channel,
            Phase::Idle => self.establish().await?,
            Phase::Closed => return Err(ConnectionError::SessionClosed.into()),
        };

        let host = self.profile.host.as_str();
        let mut attempt = 1;
        loop {
            tracing::debug!(host, state = %O::STATE, attempt, "session state change");
            let result = op.run(&mut channel, &self.connector).await;
            channel.close().await;

            match result {
                Ok(output) => {
                    tracing::debug!(host, state = %SessionState::Closed, "session state change");
                    return Ok(output);
                }
                Err(e) if e.is_retryable() && attempt < self.retry.max_attempts() => {
                    tracing::warn!(host, attempt, err = %e, "operation failed, reconnecting");
                    attempt += 1;
                    channel = self.establish().await?;
                }
                Err(e) => {
                    tracing::error!(host, attempt, err = %e, "operation failed");
                    return Err(e);
                }
            }
        }
    }
}

trait Operation {
    type Output;

    const STATE: SessionState;

    fn run<C>(
        &self,
        channel: &mut ControlChannel<C::Io>,
        connector: &C,
    ) -> impl Future<Output = Result<Self::Output, FtpError>>
    where
        C: Connector;
}

struct ListDirectory {
    path: String,
}

impl Operation for ListDirectory {
    type Output = Vec<DirectoryEntry>;

    const STATE: SessionState = SessionState::Listing;

    async fn run<C>(
        &self,
        channel: &mut ControlChannel<C::Io>,
        connector: &C,
    ) -> Result<Self::Output, FtpError>
    where
        C: Connector,
    {
        listing::list(channel, connector, &self.path).await
    }
}

struct Retrieve {
    path: String,
}

impl Operation for Retrieve {
    type Output = Vec<u8>;

    const STATE: SessionState = SessionState::Downloading;

    async fn run<C>(
        &self,
        channel: &mut ControlChannel<C::Io>,
        connector: &C,
    ) -> Result<Self::Output, FtpError>
    where
        C: Connector,
    {
        transfer::download(channel, connector, &self.path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_bounds() {
        assert_eq!(RetryPolicy::default().max_attempts(), 2);
        assert_eq!(RetryPolicy::never().max_attempts(), 1);
        assert_eq!(RetryPolicy::new(0).max_attempts(), 1);
    }
}
