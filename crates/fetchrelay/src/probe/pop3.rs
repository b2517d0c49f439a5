//! Just enough POP3 to log in and ask for STAT.

use futures_util::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::MailboxStat;
use crate::error::AccountError;

/// A POP3 conversation over an already established stream.
pub struct Pop3Session<S> {
    stream: BufReader<S>,
    line: Vec<u8>,
}

impl<S> Pop3Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        Self {
            stream: BufReader::new(stream),
            line: Vec::with_capacity(512),
        }
    }

    async fn read_line(&mut self) -> Result<String, AccountError> {
        self.line.clear();
        let n = self
            .stream
            .read_until(b'\n', &mut self.line)
            .await
            .map_err(|e| AccountError::Connection(e.to_string()))?;
        if n == 0 {
            return Err(AccountError::Connection(
                "server closed the connection".to_string(),
            ));
        }
        Ok(String::from_utf8_lossy(&self.line).trim_end().to_string())
    }

    async fn write_line(&mut self, line: &str) -> Result<(), AccountError> {
        let stream = self.stream.get_mut();
        let io = async {
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(b"\r\n").await?;
            stream.flush().await
        };
        io.await.map_err(|e| AccountError::Connection(e.to_string()))
    }

    /// Sends `command` and returns the text after `+OK`. A `-ERR` answer is
    /// turned into an error by `on_err`.
    async fn command(
        &mut self,
        command: &str,
        on_err: fn(String) -> AccountError,
    ) -> Result<String, AccountError> {
        self.write_line(command).await?;
        self.expect_ok(on_err).await
    }

    async fn expect_ok(
        &mut self,
        on_err: fn(String) -> AccountError,
    ) -> Result<String, AccountError> {
        let line = self.read_line().await?;
        match line.strip_prefix("+OK") {
            Some(rest) => Ok(rest.trim().to_string()),
            None => Err(on_err(line)),
        }
    }

    pub async fn greeting(&mut self) -> Result<(), AccountError> {
        self.expect_ok(|l| AccountError::Connection(format!("unexpected greeting: {}", l)))
            .await
            .map(|_| ())
    }

    pub async fn login(&mut self, user: &str, password: &SecretString) -> Result<(), AccountError> {
        self.command(&format!("USER {}", user), AccountError::Auth)
            .await?;
        self.command(&format!("PASS {}", password.expose_secret()), AccountError::Auth)
            .await?;
        Ok(())
    }

    /// Message count and total size in octets.
    pub async fn stat(&mut self) -> Result<(u32, u64), AccountError> {
        let rest = self.command("STAT", AccountError::Fetch).await?;
        let mut parts = rest.split_whitespace();
        let count = parts.next().and_then(|s| s.parse().ok());
        let size = parts.next().and_then(|s| s.parse().ok());
        match (count, size) {
            (Some(count), Some(size)) => Ok((count, size)),
            _ => Err(AccountError::Fetch(format!("malformed STAT answer: +OK {}", rest))),
        }
    }

    pub async fn quit(&mut self) -> Result<(), AccountError> {
        self.command("QUIT", AccountError::Fetch).await.map(|_| ())
    }
}

pub(super) async fn stat_mailbox<S>(
    stream: S,
    user: &str,
    password: &SecretString,
) -> Result<MailboxStat, AccountError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Pop3Session::new(stream);
    session.greeting().await?;
    session.login(user, password).await?;
    let (messages, size) = session.stat().await?;
    if let Err(e) = session.quit().await {
        debug!("POP3 QUIT failed: {}", e);
    }
    Ok(MailboxStat {
        messages,
        size: Some(size),
    })
}
