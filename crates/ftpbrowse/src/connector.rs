use std::{io, time::Duration};

use futures::{AsyncRead, AsyncWrite};

/// Opens the byte streams a session runs over, both for the control
/// channel and for every passive data connection.
pub trait Connector {
    type Io: AsyncRead + AsyncWrite + Unpin;

    fn connect(&self, host: &str, port: u16) -> impl Future<Output = io::Result<Self::Io>>;
}

pub(crate) async fn connect_timeout<C>(
    connector: &C,
    host: &str,
    port: u16,
    timeout: Duration,
) -> io::Result<C::Io>
where
    C: Connector,
{
    match tokio::time::timeout(timeout, connector.connect(host, port)).await {
        Ok(r) => r,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("connect timed out after {}s", timeout.as_secs_f32()),
        )),
    }
}
