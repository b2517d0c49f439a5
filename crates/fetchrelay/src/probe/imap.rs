use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::{MailboxStat, TlsStream};
use crate::error::AccountError;

/// Logs in, opens INBOX read-only and reports its size.
pub(super) async fn examine_inbox(
    stream: TlsStream,
    user: &str,
    password: &SecretString,
) -> Result<MailboxStat, AccountError> {
    let client = async_imap::Client::new(stream);

    let mut session = client
        .login(user, password.expose_secret())
        .await
        .map_err(|(e, _)| match e {
            async_imap::error::Error::Io(io) => AccountError::Connection(io.to_string()),
            other => AccountError::Auth(other.to_string()),
        })?;

    // EXAMINE rather than SELECT so no \Recent or \Seen flag changes.
    let mailbox = session
        .examine("INBOX")
        .await
        .map_err(|e| AccountError::Fetch(format!("EXAMINE INBOX failed: {}", e)))?;

    if let Err(e) = session.logout().await {
        debug!("IMAP logout failed: {}", e);
    }

    Ok(MailboxStat {
        messages: mailbox.exists,
        size: None,
    })
}
