//! Transport agents the fetch engine delivers through.

use std::path::{Path, PathBuf};

use super::{DeliveryCommand, TransportAgent};
use crate::config::RelayEndpoint;

/// Envelope sender used for every relayed message.
pub const ENVELOPE_SENDER: &str = "getmail-fetcher@localhost";

/// msmtp relaying to the local mail server over LMTP or SMTP.
///
/// Authentication and TLS are off: the relay sits inside the internal
/// network and trusts it.
#[derive(Debug, Clone)]
pub struct Msmtp {
    program: PathBuf,
}

impl Msmtp {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

impl TransportAgent for Msmtp {
    fn name(&self) -> &str {
        "msmtp"
    }

    fn render_config(&self, relay: &RelayEndpoint) -> String {
        format!(
            "# Generated by fetchrelay on every cycle. Do not edit.\n\
             defaults\n\
             auth off\n\
             tls off\n\
             syslog off\n\
             \n\
             account relay\n\
             host {host}\n\
             port {port}\n\
             protocol {protocol}\n\
             from {from}\n\
             \n\
             account default : relay\n",
            host = relay.host,
            port = relay.port,
            protocol = relay.protocol.as_str(),
            from = ENVELOPE_SENDER,
        )
    }

    fn delivery_command(&self, config_path: &Path, target_email: &str) -> DeliveryCommand {
        DeliveryCommand {
            program: self.program.clone(),
            args: vec![
                format!("--file={}", config_path.display()),
                "--".to_string(),
                target_email.to_string(),
            ],
        }
    }
}

/// Accepts and drops every message. Used when `DRY_DELIVER` is on.
#[derive(Debug, Clone, Default)]
pub struct DiscardTransport;

impl TransportAgent for DiscardTransport {
    fn name(&self) -> &str {
        "discard"
    }

    fn render_config(&self, relay: &RelayEndpoint) -> String {
        format!(
            "# Generated by fetchrelay on every cycle. Do not edit.\n\
             # DRY_DELIVER is on: messages are discarded instead of being\n\
             # relayed to {}:{}.\n",
            relay.host, relay.port
        )
    }

    fn delivery_command(&self, _config_path: &Path, _target_email: &str) -> DeliveryCommand {
        DeliveryCommand {
            program: PathBuf::from("/bin/sh"),
            args: vec!["-c".to_string(), "cat > /dev/null".to_string()],
        }
    }
}
