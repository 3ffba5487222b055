//! Passive mode negotiation and the per-operation data connection.

use std::{
    io,
    net::{Ipv4Addr, SocketAddrV4},
    time::Duration,
};

use futures::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::{
    ConnectionError, Connector, ControlChannel, FtpError, ProtocolError, TransferError,
    code::{Port, Reply, ReplyCode},
    command::Command,
    connector::connect_timeout,
};

const READ_CHUNK: usize = 8192;

/// Extracts the `(h1,h2,h3,h4,p1,p2)` tuple from the text of a `227` reply.
///
/// The tuple is taken from inside parentheses when present, otherwise from
/// the first run of digits and commas.
pub fn parse_pasv_reply(message: &str) -> Result<SocketAddrV4, ProtocolError> {
    let malformed = || ProtocolError::MalformedPassiveReply(message.to_string());

    let tuple = match (message.find('('), message.rfind(')')) {
        (Some(start), Some(end)) if start < end => &message[start + 1..end],
        _ => {
            let start = message
                .find(|c: char| c.is_ascii_digit())
                .ok_or_else(malformed)?;
            let rest = &message[start..];
            let end = rest
                .find(|c: char| !(c.is_ascii_digit() || c == ',' || c == ' '))
                .unwrap_or(rest.len());
            &rest[..end]
        }
    };

    let numbers = tuple
        .split(',')
        .map(|t| t.trim().parse::<u8>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|_| malformed())?;
    let [h1, h2, h3, h4, p1, p2] = numbers[..] else {
        return Err(malformed());
    };

    Ok(SocketAddrV4::new(
        Ipv4Addr::new(h1, h2, h3, h4),
        Port::from_p1_p2(p1, p2).0,
    ))
}

/// Finds the address tuple in any line of a `227` reply; some servers
/// put it on the last line of a multi-line reply.
pub fn passive_address(reply: &Reply) -> Result<SocketAddrV4, ProtocolError> {
    reply
        .lines()
        .iter()
        .find_map(|line| parse_pasv_reply(strip_code(line)).ok())
        .ok_or_else(|| ProtocolError::MalformedPassiveReply(reply.text()))
}

fn strip_code(line: &str) -> &str {
    match line.as_bytes() {
        [a, b, c, b' ' | b'-', ..]
            if a.is_ascii_digit() && b.is_ascii_digit() && c.is_ascii_digit() =>
        {
            &line[4..]
        }
        _ => line,
    }
}

/// Sends `PASV` and connects to the advertised address.
///
/// Servers behind NAT often advertise an address that is only reachable from
/// their own network, so a failed connect is retried once against the host
/// the control connection was opened to.
pub async fn enter_passive<S, C>(
    channel: &mut ControlChannel<S>,
    connector: &C,
) -> Result<DataConnection<C::Io>, FtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Connector,
{
    let reply = channel
        .expect(&Command::Pasv, &[ReplyCode::EnteringPassiveMode])
        .await?;
    let advertised = passive_address(&reply)?;
    let timeout = channel.timeout();

    let ip = advertised.ip().to_string();
    let e = match connect_timeout(connector, &ip, advertised.port(), timeout).await {
        Ok(stream) => return Ok(DataConnection::new(stream, advertised.to_string(), timeout)),
        Err(e) => e,
    };

    let host = channel.host();
    if host == ip {
        return Err(ConnectionError::DataConnect {
            advertised,
            fallback: None,
            source: e,
        }
        .into());
    }

    tracing::warn!(
        %advertised,
        host,
        err = %e,
        "advertised passive address unreachable, retrying with control host"
    );

    match connect_timeout(connector, host, advertised.port(), timeout).await {
        Ok(stream) => Ok(DataConnection::new(
            stream,
            format!("{host}:{}", advertised.port()),
            timeout,
        )),
        Err(source) => Err(ConnectionError::DataConnect {
            advertised,
            fallback: Some(host.to_string()),
            source,
        }
        .into()),
    }
}

/// One passive data connection, consumed by the transfer that opened it.
pub struct DataConnection<S> {
    stream: S,
    peer: String,
    timeout: Duration,
}

impl<S> DataConnection<S>
where
    S: AsyncRead + Unpin,
{
    pub fn new(stream: S, peer: String, timeout: Duration) -> Self {
        DataConnection {
            stream,
            peer,
            timeout,
        }
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Copies everything up to EOF into `sink`. Every read carries the
    /// session timeout; the connection is dropped when this returns.
    pub async fn drain_into<W>(mut self, sink: &mut W) -> Result<u64, TransferError>
    where
        W: AsyncWrite + Unpin,
    {
        let mut buf = vec![0u8; READ_CHUNK];
        let mut received = 0u64;

        loop {
            let n = match tokio::time::timeout(self.timeout, self.stream.read(&mut buf)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => n,
                Ok(Err(e)) if e.kind() == io::ErrorKind::Interrupted => continue,
                Ok(Err(source)) => {
                    tracing::warn!(peer = %self.peer, received, err = %source, "data connection failed");
                    return Err(TransferError::Interrupted { received, source });
                }
                Err(_) => {
                    tracing::warn!(peer = %self.peer, received, "data connection timed out");
                    return Err(TransferError::TimedOut { received });
                }
            };

            sink.write_all(&buf[..n])
                .await
                .map_err(TransferError::Sink)?;
            received += n as u64;
        }

        sink.flush().await.map_err(TransferError::Sink)?;
        tracing::trace!(peer = %self.peer, received, "data connection drained");
        Ok(received)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::code::ReplyParser;
    use futures::io::Cursor;

    #[test]
    fn parses_parenthesized_tuple() {
        let addr = parse_pasv_reply("Entering Passive Mode (192,168,1,5,200,15).").unwrap();
        assert_eq!(addr.ip(), &Ipv4Addr::new(192, 168, 1, 5));
        assert_eq!(addr.port(), 51215);
    }

    #[test]
    fn parses_bare_tuple() {
        let addr = parse_pasv_reply("Entering Passive Mode 10,0,0,1,4,1").unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(10, 0, 0, 1), 1025));
    }

    #[test]
    fn tolerates_spaces_in_tuple() {
        let addr = parse_pasv_reply("=127, 0, 0, 1, 0, 21").unwrap();
        assert_eq!(addr.port(), 21);
    }

    #[test]
    fn rejects_short_tuple() {
        assert!(matches!(
            parse_pasv_reply("Entering Passive Mode (192,168,1,5,200)"),
            Err(ProtocolError::MalformedPassiveReply(_))
        ));
    }

    #[test]
    fn rejects_non_numeric_and_overflow() {
        assert!(parse_pasv_reply("(192,168,one,5,200,15)").is_err());
        assert!(parse_pasv_reply("(192,168,1,5,256,15)").is_err());
        assert!(parse_pasv_reply("(1,2,3,4,5,6,7)").is_err());
        assert!(parse_pasv_reply("no numbers at all").is_err());
    }

    #[test]
    fn address_from_multi_line_reply() {
        let mut parser = ReplyParser::default();
        assert!(parser.feed("227-Entering Passive Mode\r\n").unwrap().is_none());
        let reply = parser.feed("227 (192,168,1,5,200,15)\r\n").unwrap().unwrap();

        let addr = passive_address(&reply).unwrap();
        assert_eq!(addr, SocketAddrV4::new(Ipv4Addr::new(192, 168, 1, 5), 51215));
    }

    #[test]
    fn address_from_single_line_reply() {
        let reply = Reply::new(227, vec!["227 Entering Passive Mode 10,0,0,1,4,1".into()]);
        assert_eq!(passive_address(&reply).unwrap().port(), 1025);

        let reply = Reply::new(227, vec!["227 Entering Passive Mode".into()]);
        assert!(matches!(
            passive_address(&reply),
            Err(ProtocolError::MalformedPassiveReply(_))
        ));
    }

    #[tokio::test]
    async fn drains_to_eof() {
        let data = vec![7u8; READ_CHUNK * 2 + 5];
        let conn = DataConnection::new(
            Cursor::new(data.clone()),
            "test".to_string(),
            Duration::from_secs(5),
        );
        let mut sink = Vec::new();
        let received = conn.drain_into(&mut sink).await.unwrap();
        assert_eq!(received, data.len() as u64);
        assert_eq!(sink, data);
    }

    /// Never yields a byte and never reaches EOF.
    struct Stalled;

    impl AsyncRead for Stalled {
        fn poll_read(
            self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            _buf: &mut [u8],
        ) -> std::task::Poll<io::Result<usize>> {
            std::task::Poll::Pending
        }
    }

    /// Yields some bytes, then a connection reset.
    struct Reset {
        sent: bool,
    }

    impl AsyncRead for Reset {
        fn poll_read(
            mut self: std::pin::Pin<&mut Self>,
            _cx: &mut std::task::Context<'_>,
            buf: &mut [u8],
        ) -> std::task::Poll<io::Result<usize>> {
            if self.sent {
                return std::task::Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()));
            }
            self.sent = true;
            buf[..3].copy_from_slice(b"abc");
            std::task::Poll::Ready(Ok(3))
        }
    }

    #[tokio::test]
    async fn stalled_read_times_out() {
        let conn = DataConnection::new(Stalled, "test".to_string(), Duration::from_millis(50));
        let mut sink = Vec::new();
        let err = conn.drain_into(&mut sink).await.unwrap_err();
        assert!(matches!(err, TransferError::TimedOut { received: 0 }));
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn reset_mid_transfer_is_interrupted() {
        let conn = DataConnection::new(
            Reset { sent: false },
            "test".to_string(),
            Duration::from_secs(5),
        );
        let mut sink = Vec::new();
        let err = conn.drain_into(&mut sink).await.unwrap_err();
        assert!(matches!(err, TransferError::Interrupted { received: 3, .. }));
    }
}
