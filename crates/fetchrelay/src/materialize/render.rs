//! Rendering of the getmail rc file.

use std::path::Path;

use secrecy::ExposeSecret;

use crate::accounts::{AccountRecord, Endpoint};
use crate::config::Retention;
use crate::engine::DeliveryCommand;

/// Quotes a value as a Python string literal, which is how getmail parses
/// the `arguments` tuple.
fn py_string(value: &str) -> String {
    format!("\"{}\"", value.replace('\\', "\\\\").replace('"', "\\\""))
}

fn py_tuple(items: &[String]) -> String {
    let quoted: Vec<String> = items.iter().map(|i| py_string(i)).collect();
    match quoted.len() {
        1 => format!("({},)", quoted[0]),
        _ => format!("({})", quoted.join(", ")),
    }
}

pub(crate) fn getmailrc(
    account: &AccountRecord,
    endpoint: &Endpoint,
    retention: Retention,
    delivery: &DeliveryCommand,
    message_log: &Path,
) -> String {
    let retention_comment = match retention {
        Retention::Disabled => {
            "# Source-side deletion is disabled (DELETE_AFTER_DAYS <= 0).".to_string()
        }
        Retention::DeleteAfterDays(days) => {
            format!("# Delete from the source {} days after retrieval.", days)
        }
    };

    format!(
        "# Generated by fetchrelay for {name} on every cycle. Do not edit.\n\
         [retriever]\n\
         type = {retriever}\n\
         server = {server}\n\
         port = {port}\n\
         username = {user}\n\
         password = {password}\n\
         \n\
         [destination]\n\
         type = MDA_external\n\
         path = {mda_path}\n\
         arguments = {mda_args}\n\
         ignore_stderr = true\n\
         \n\
         [options]\n\
         read_all = false\n\
         delete = false\n\
         {retention_comment}\n\
         delete_after = {delete_after}\n\
         message_log = {message_log}\n",
        name = account.display_name(),
        retriever = endpoint.protocol.retriever_type(),
        server = endpoint.host,
        port = endpoint.port,
        user = account.source_user,
        password = account.source_password.expose_secret(),
        mda_path = delivery.program.display(),
        mda_args = py_tuple(&delivery.args),
        retention_comment = retention_comment,
        delete_after = retention.delete_after(),
        message_log = message_log.display(),
    )
}
