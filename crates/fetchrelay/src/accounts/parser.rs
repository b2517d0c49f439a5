//! Parser for the account list file.
//!
//! One account per line:
//!
//! ```text
//! # comment
//! user:"password":host:target_email
//! user:password:host:target_email
//! ```
//!
//! Inside a quoted password `\"` stands for `"` and `\\` for `\`; any other
//! backslash is literal. A bare `"` that is not followed by `:` is also kept
//! literally, so lists written for the old regex-based reader still load.
//! Unquoted passwords may not contain `:` or `"`.

use std::collections::HashMap;
use std::path::Path;

use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::record::AccountRecord;
use crate::config::is_valid_host;
use crate::error::ConfigError;

/// Reads and parses the account list at `path`.
pub fn load_accounts<P: AsRef<Path>>(path: P) -> Result<Vec<AccountRecord>, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadAccounts {
        path: path.to_path_buf(),
        source: e,
    })?;

    let accounts = parse_accounts(&content)?;
    debug!(count = accounts.len(), path = %path.display(), "Loaded account list");
    Ok(accounts)
}

/// Parses account list text into records, in file order.
///
/// Fails on the first malformed line, or when the same user is declared twice
/// for one host (their fetch state would be ambiguous).
pub fn parse_accounts(content: &str) -> Result<Vec<AccountRecord>, ConfigError> {
    let mut accounts = Vec::new();
    let mut seen: HashMap<(String, String), usize> = HashMap::new();

    for (index, raw) in content.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let record = parse_line(line, line_no)?;

        let identity = (
            record.source_user.clone(),
            record.source_host.to_ascii_lowercase(),
        );
        if let Some(&first_line) = seen.get(&identity) {
            return Err(ConfigError::DuplicateAccount {
                user: record.source_user,
                host: record.source_host,
                first_line,
                line: line_no,
            });
        }
        seen.insert(identity, line_no);
        accounts.push(record);
    }

    Ok(accounts)
}

/// Renders a record in the canonical quoted form accepted by [`parse_accounts`].
pub fn encode_line(record: &AccountRecord) -> String {
    format!(
        "{}:\"{}\":{}:{}",
        record.source_user,
        escape_password(record.source_password.expose_secret()),
        record.source_host,
        record.target_email
    )
}

fn escape_password(password: &str) -> String {
    password.replace('\\', "\\\\").replace('"', "\\\"")
}

fn parse_line(line: &str, line_no: usize) -> Result<AccountRecord, ConfigError> {
    let invalid = |reason: String| ConfigError::InvalidAccountLine {
        line: line_no,
        reason,
    };

    let (user, rest) = line.split_once(':').ok_or_else(|| {
        invalid("expected user:\"password\":host:target_email".to_string())
    })?;
    let user = user.trim();
    if user.is_empty() {
        return Err(invalid("user is empty".to_string()));
    }

    let quoted = rest.trim_start();
    let (password, remainder, was_quoted) = if let Some(body) = quoted.strip_prefix('"') {
        let (password, after) = parse_quoted(body).map_err(invalid)?;
        // `after` starts with the ':' that ended the quoted segment.
        (password, &after[1..], true)
    } else {
        let (password, after) = rest.split_once(':').ok_or_else(|| {
            invalid("expected user:\"password\":host:target_email".to_string())
        })?;
        if password.contains('"') {
            return Err(invalid(
                "unquoted password contains '\"'; wrap the password in quotes".to_string(),
            ));
        }
        // Quote the password to keep surrounding whitespace.
        (password.trim().to_string(), after, false)
    };

    if password.is_empty() {
        return Err(invalid("password is empty".to_string()));
    }

    let fields: Vec<&str> = remainder.split(':').collect();
    if fields.len() != 2 {
        let reason = if !was_quoted && fields.len() > 2 {
            "too many ':' separated fields; quote the password if it contains ':'".to_string()
        } else {
            format!(
                "expected host:target_email after the password, found {} field(s)",
                fields.len()
            )
        };
        return Err(invalid(reason));
    }

    let host = fields[0].trim();
    if host.is_empty() {
        return Err(invalid("host is empty".to_string()));
    }
    if !is_valid_host(host) {
        return Err(invalid(format!("'{}' is not a valid host name", host)));
    }

    let target = fields[1].trim();
    if target.is_empty() {
        return Err(invalid("target email is empty".to_string()));
    }
    match target.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => {}
        _ => {
            return Err(invalid(format!(
                "'{}' is not a valid target email address",
                target
            )))
        }
    }

    Ok(AccountRecord {
        source_user: user.to_string(),
        source_password: SecretString::from(password),
        source_host: host.to_string(),
        target_email: target.to_string(),
        line: line_no,
    })
}

/// Decodes a quoted password body (the text after the opening quote).
///
/// Returns the password and the rest of the line starting at the `:` that
/// follows the closing quote.
fn parse_quoted(body: &str) -> Result<(String, &str), String> {
    let mut password = String::new();
    let mut chars = body.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match c {
            '\\' => match chars.peek() {
                Some(&(_, next)) if next == '"' || next == '\\' => {
                    password.push(next);
                    chars.next();
                }
                _ => password.push('\\'),
            },
            '"' if body[i + 1..].trim_start().starts_with(':') => {
                return Ok((password, body[i + 1..].trim_start()));
            }
            _ => password.push(c),
        }
    }

    Err("unterminated quoted password (expected '\":' after the password)".to_string())
}
