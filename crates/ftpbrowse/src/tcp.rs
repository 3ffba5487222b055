use std::io;

use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncReadCompatExt};

use crate::Connector;

/// Plain TCP connections through tokio.
#[derive(Debug, Clone, Copy, Default)]
pub struct TcpConnector;

impl Connector for TcpConnector {
    type Io = Compat<TcpStream>;

    async fn connect(&self, host: &str, port: u16) -> io::Result<Self::Io> {
        let stream = match TcpStream::connect((host, port)).await {
            Ok(s) => s,
            Err(e) => {
                tracing::debug!(host, port, err = %e, "tcp connect failed");
                return Err(e);
            }
        };

        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(err = %e, "failed to set TCP_NODELAY");
        }

        match stream.peer_addr() {
            Ok(addr) => tracing::trace!(host, %addr, "tcp connection established"),
            Err(_) => tracing::trace!(host, port, "tcp connection established"),
        }

        Ok(stream.compat())
    }
}
