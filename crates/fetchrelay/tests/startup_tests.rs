//! Table-driven tests for startup validation.
//!
//! Every case here must fail (or succeed) before anything is written below
//! the state root.

mod common;

use serial_test::serial;

use common::TestHarness;
use fetchrelay::app;
use fetchrelay::config::Retention;
use fetchrelay::sysexits::{EX_CONFIG, EX_NOINPUT};
use fetchrelay::{ConfigError, Overrides};

struct EnvCase {
    name: &'static str,
    vars: &'static [(&'static str, &'static str)],
    expected_error: Option<&'static str>,
}

const ENV_CASES: &[EnvCase] = &[
    EnvCase {
        name: "defaults",
        vars: &[],
        expected_error: None,
    },
    EnvCase {
        name: "negative_interval",
        vars: &[("FETCH_INTERVAL", "-1")],
        expected_error: Some("FETCH_INTERVAL"),
    },
    EnvCase {
        name: "zero_interval",
        vars: &[("FETCH_INTERVAL", "0")],
        expected_error: Some("FETCH_INTERVAL"),
    },
    EnvCase {
        name: "non_numeric_interval",
        vars: &[("FETCH_INTERVAL", "5m")],
        expected_error: Some("FETCH_INTERVAL"),
    },
    EnvCase {
        name: "non_numeric_retention",
        vars: &[("DELETE_AFTER_DAYS", "week")],
        expected_error: Some("DELETE_AFTER_DAYS"),
    },
    EnvCase {
        name: "retention_zero",
        vars: &[("DELETE_AFTER_DAYS", "0")],
        expected_error: None,
    },
    EnvCase {
        name: "empty_relay_host",
        vars: &[("LMTP_HOST", "")],
        expected_error: Some("relay"),
    },
    EnvCase {
        name: "bad_relay_port",
        vars: &[("LMTP_PORT", "lmtp")],
        expected_error: Some("LMTP_PORT"),
    },
    EnvCase {
        name: "bad_relay_protocol",
        vars: &[("RELAY_PROTOCOL", "uucp")],
        expected_error: Some("RELAY_PROTOCOL"),
    },
    EnvCase {
        name: "bad_fetch_protocol",
        vars: &[("FETCH_PROTOCOL", "nntp")],
        expected_error: Some("FETCH_PROTOCOL"),
    },
    EnvCase {
        name: "malformed_hook_url",
        vars: &[("SUCCESS_HOOK_URL", "not a url")],
        expected_error: Some("SUCCESS_HOOK_URL"),
    },
    EnvCase {
        name: "smtp_relay",
        vars: &[("RELAY_PROTOCOL", "smtp"), ("LMTP_PORT", "25")],
        expected_error: None,
    },
];

#[test]
fn test_environment_validation_table() {
    for case in ENV_CASES {
        let mut harness = TestHarness::new();
        for (name, value) in case.vars {
            harness.set_env(name, value);
        }

        match (harness.try_settings(), case.expected_error) {
            (Ok(_), None) => {}
            (Err(e), Some(fragment)) => assert!(
                e.to_string().contains(fragment),
                "case {}: error '{}' does not mention '{}'",
                case.name,
                e,
                fragment
            ),
            (Ok(_), Some(_)) => panic!("case {}: expected an error", case.name),
            (Err(e), None) => panic!("case {}: unexpected error {}", case.name, e),
        }
        assert!(
            !harness.state_root.exists(),
            "case {}: state root created during validation",
            case.name
        );
    }
}

#[test]
fn test_retention_zero_is_explicitly_disabled() {
    let mut harness = TestHarness::new();
    harness.set_env("DELETE_AFTER_DAYS", "0");
    assert_eq!(harness.settings().retention, Retention::Disabled);
}

#[test]
#[serial]
fn test_load_reads_process_environment() {
    let harness = TestHarness::new();
    harness.write_accounts("alice:\"pw\":imap.example.com:alice@local.test\n");

    std::env::set_var("ACCOUNTS_FILE", &harness.accounts_file);
    std::env::set_var("GETMAIL_DIR", &harness.state_root);
    std::env::set_var("FETCH_INTERVAL", "60");
    let result = app::load(&Overrides::default());
    std::env::remove_var("ACCOUNTS_FILE");
    std::env::remove_var("GETMAIL_DIR");
    std::env::remove_var("FETCH_INTERVAL");

    let (settings, accounts) = result.unwrap();
    assert_eq!(settings.interval.as_secs(), 60);
    assert_eq!(accounts.len(), 1);
    assert!(!harness.state_root.exists());
}

#[test]
#[serial]
fn test_negative_interval_fails_before_materialization() {
    let harness = TestHarness::new();
    harness.write_accounts("alice:\"pw\":imap.example.com:alice@local.test\n");

    std::env::set_var("ACCOUNTS_FILE", &harness.accounts_file);
    std::env::set_var("GETMAIL_DIR", &harness.state_root);
    std::env::set_var("FETCH_INTERVAL", "-1");
    let result = app::load(&Overrides::default());
    std::env::remove_var("ACCOUNTS_FILE");
    std::env::remove_var("GETMAIL_DIR");
    std::env::remove_var("FETCH_INTERVAL");

    let err = result.err().expect("negative interval must be rejected");
    assert_eq!(err.exit_code(), EX_CONFIG);
    assert!(!harness.state_root.exists());
}

#[test]
#[serial]
fn test_cli_interval_is_validated_like_environment() {
    let harness = TestHarness::new();
    harness.write_accounts("alice:\"pw\":imap.example.com:alice@local.test\n");

    let overrides = Overrides {
        accounts_file: Some(harness.accounts_file.clone()),
        interval: Some(0),
        state_dir: Some(harness.state_root.clone()),
    };
    let err = app::load(&overrides).err().expect("zero interval must be rejected");
    assert_eq!(err.exit_code(), EX_CONFIG);
}

#[test]
#[serial]
fn test_missing_account_list_is_noinput() {
    let harness = TestHarness::new();
    let overrides = Overrides {
        accounts_file: Some(harness.path().join("missing.list")),
        interval: None,
        state_dir: Some(harness.state_root.clone()),
    };

    let err = app::load(&overrides).err().expect("missing file must fail");
    assert!(matches!(
        err,
        fetchrelay::FetchRelayError::Config(ConfigError::ReadAccounts { .. })
    ));
    assert_eq!(err.exit_code(), EX_NOINPUT);
}

#[test]
#[serial]
fn test_duplicate_account_is_config_error() {
    let harness = TestHarness::new();
    harness.write_accounts(
        "alice:\"pw\":imap.example.com:alice@local.test\n\
         alice:\"other\":IMAP.example.com:alice2@local.test\n",
    );
    let overrides = Overrides {
        accounts_file: Some(harness.accounts_file.clone()),
        interval: None,
        state_dir: Some(harness.state_root.clone()),
    };

    let err = app::load(&overrides).err().expect("duplicate must fail");
    assert_eq!(err.exit_code(), EX_CONFIG);
    assert!(err.to_string().contains("line 2"));
}
