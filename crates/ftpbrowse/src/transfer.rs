use futures::{AsyncRead, AsyncWrite};

use crate::{
    Connector, ControlChannel, FtpError, TransferError,
    code::{Reply, ReplyCode},
    command::Command,
    passive::enter_passive,
};

/// Streams the file at `path` into `sink` and returns the number of bytes
/// written.
///
/// A data connection that errors out mid-transfer, or a `4xx`/`5xx` final
/// reply, fails with [`TransferError`] even when some bytes already reached
/// the sink; callers that buffer per attempt can simply discard them.
pub async fn retrieve<S, C, W>(
    channel: &mut ControlChannel<S>,
    connector: &C,
    path: &str,
    sink: &mut W,
) -> Result<u64, FtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Connector,
    W: AsyncWrite + Unpin,
{
    let data = enter_passive(channel, connector).await?;
    channel
        .expect(
            &Command::Retr(path.to_string()),
            &[
                ReplyCode::OpeningDataConnection,
                ReplyCode::DataConnectionAlreadyOpen,
            ],
        )
        .await?;

    let received = data.drain_into(sink).await?;

    if let Some(reply) = read_final_reply(channel, "RETR").await
        && reply.is_negative()
    {
        return Err(TransferError::Aborted { received, reply }.into());
    }

    tracing::debug!(path, bytes = received, "file retrieved");
    Ok(received)
}

/// [`retrieve`] into memory.
pub async fn download<S, C>(
    channel: &mut ControlChannel<S>,
    connector: &C,
    path: &str,
) -> Result<Vec<u8>, FtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
    C: Connector,
{
    let mut buf = Vec::new();
    retrieve(channel, connector, path, &mut buf).await?;
    Ok(buf)
}

/// Reads the reply that closes a data transfer. Anything but `226`/`250` is
/// logged; a missing reply yields `None`.
pub(crate) async fn read_final_reply<S>(
    channel: &mut ControlChannel<S>,
    command: &'static str,
) -> Option<Reply>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match channel.read_reply().await {
        Ok(reply)
            if reply.is(ReplyCode::ClosingDataConnectionSuccessful)
                || reply.is(ReplyCode::FileActionOk) =>
        {
            Some(reply)
        }
        Ok(reply) => {
            tracing::warn!(command, code = reply.code(), reply = %reply, "unexpected final transfer reply");
            Some(reply)
        }
        Err(e) => {
            tracing::warn!(command, err = %e, "no final transfer reply");
            None
        }
    }
}
