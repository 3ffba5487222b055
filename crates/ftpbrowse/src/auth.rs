use futures::{AsyncRead, AsyncWrite};

use crate::{
    AuthenticationError, ControlChannel, FtpError,
    code::{Reply, ReplyCode},
    command::Command,
};

const ANONYMOUS: &str = "anonymous";

/// USER/PASS negotiation followed by a switch to binary mode.
///
/// An empty username logs in as `anonymous`. A rejection at either step is
/// an [`AuthenticationError`]; a server refusing `TYPE I` only earns a warning.
pub async fn login<S>(
    channel: &mut ControlChannel<S>,
    username: &str,
    password: &str,
) -> Result<(), FtpError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let username = if username.is_empty() {
        ANONYMOUS
    } else {
        username
    };

    let reply = channel.execute(&Command::User(username.to_string())).await?;
    match reply.kind() {
        Some(ReplyCode::UserLoggedIn) => {
            tracing::debug!(username, "logged in without password");
        }
        Some(ReplyCode::NeedPassword) => {
            let reply = channel.execute(&Command::Pass(password.to_string())).await?;
            if !reply.is(ReplyCode::UserLoggedIn) {
                tracing::error!(username, code = reply.code(), "password rejected");
                return Err(rejected("PASS", reply));
            }
        }
        _ => {
            tracing::error!(username, code = reply.code(), "username rejected");
            return Err(rejected("USER", reply));
        }
    }

    channel.mark_authenticated();
    tracing::info!(host = channel.host(), username, "logged in");

    let reply = channel.execute(&Command::Binary).await?;
    if !reply.is(ReplyCode::Ok) {
        tracing::warn!(code = reply.code(), reply = %reply, "server did not accept binary mode");
    }

    Ok(())
}

fn rejected(stage: &'static str, reply: Reply) -> FtpError {
    AuthenticationError {
        stage,
        code: reply.code(),
        message: reply.message().to_string(),
    }
    .into()
}
