//! End-to-end fetch cycles with a scripted fetch engine.

mod common;

use std::fs;
use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedEngine, TestHarness, FAKE_GETMAIL};
use fetchrelay::app;
use fetchrelay::engine::Getmail;
use fetchrelay::{load_accounts, AccountError, CycleStatus, SchedulerState, Shutdown};

const THREE_ACCOUNTS: &str = "\
# three mailboxes
alice:\"pw1\":imap.example.com:alice@local.test
bob:\"pw2\":imap.example.com:bob@local.test

carol:\"pw3\":pop.example.net:carol@local.test
";

#[tokio::test]
async fn test_auth_failure_does_not_stop_the_cycle() {
    let harness = TestHarness::new();
    harness.write_accounts(THREE_ACCOUNTS);
    let settings = harness.settings();
    let accounts = load_accounts(&settings.accounts_file).unwrap();

    let engine = Arc::new(
        ScriptedEngine::new()
            .succeed("alice@imap.example.com", 2)
            .fail(
                "bob@imap.example.com",
                AccountError::Auth("LOGIN failed".into()),
            )
            .succeed("carol@pop.example.net", 1),
    );
    let mut scheduler =
        app::build_scheduler(&settings, accounts, engine.clone(), Shutdown::new()).unwrap();

    assert_eq!(scheduler.step().await, SchedulerState::RunningCycle);
    assert_eq!(scheduler.step().await, SchedulerState::Sleeping);

    let summary = scheduler.last_summary().unwrap();
    assert_eq!(summary.count(CycleStatus::Success), 2);
    assert_eq!(summary.count(CycleStatus::AuthFailure), 1);
    assert_eq!(summary.total_messages, 3);
    assert_eq!(summary.results[1].status, CycleStatus::AuthFailure);
    assert_eq!(
        engine.calls(),
        vec![
            "alice@imap.example.com",
            "bob@imap.example.com",
            "carol@pop.example.net"
        ]
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_fetch_engine_exit_status_is_classified_per_account() {
    let harness = TestHarness::new();
    harness.write_accounts(THREE_ACCOUNTS);
    let settings = harness.settings();
    let accounts = load_accounts(&settings.accounts_file).unwrap();

    let getmail = harness.write_script("getmail", FAKE_GETMAIL);
    let mut scheduler = app::build_scheduler(
        &settings,
        accounts,
        Arc::new(Getmail::new(getmail)),
        Shutdown::new(),
    )
    .unwrap();

    assert_eq!(scheduler.step().await, SchedulerState::RunningCycle);
    assert_eq!(scheduler.step().await, SchedulerState::Sleeping);

    let summary = scheduler.last_summary().unwrap();
    assert_eq!(summary.count(CycleStatus::Success), 2);
    assert_eq!(summary.count(CycleStatus::AuthFailure), 1);
    assert_eq!(summary.total_messages, 4);
    assert_eq!(summary.results[1].key.as_str(), "bob_imap_example_com");
    assert_eq!(summary.results[1].status, CycleStatus::AuthFailure);
    assert!(summary.results[1]
        .detail
        .as_deref()
        .unwrap_or_default()
        .contains("AUTHENTICATIONFAILED"));
}

#[tokio::test]
async fn test_cycle_materializes_every_account() {
    let harness = TestHarness::new();
    harness.write_accounts(THREE_ACCOUNTS);
    let settings = harness.settings();
    let accounts = load_accounts(&settings.accounts_file).unwrap();

    let mut scheduler = app::build_scheduler(
        &settings,
        accounts,
        Arc::new(ScriptedEngine::new()),
        Shutdown::new(),
    )
    .unwrap();
    scheduler.step().await;
    scheduler.step().await;

    for key in [
        "alice_imap_example_com",
        "bob_imap_example_com",
        "carol_pop_example_net",
    ] {
        let dir = harness.account_dir(key);
        assert!(dir.join("getmailrc").is_file(), "{} has no getmailrc", key);
        assert!(dir.join("msmtprc").is_file(), "{} has no msmtprc", key);
    }

    let carol = fs::read_to_string(harness.account_dir("carol_pop_example_net").join("getmailrc"))
        .unwrap();
    assert!(carol.contains("type = SimplePOP3SSLRetriever"));
    assert!(carol.contains("delete_after = 7"));
}

#[tokio::test]
async fn test_shutdown_mid_cycle_finishes_current_account_then_drains() {
    let harness = TestHarness::new();
    harness.write_accounts(THREE_ACCOUNTS);
    let settings = harness.settings();
    let accounts = load_accounts(&settings.accounts_file).unwrap();

    let shutdown = Shutdown::new();
    let engine = Arc::new(
        ScriptedEngine::new()
            .succeed("alice@imap.example.com", 5)
            .shutdown_during("alice@imap.example.com", shutdown.clone()),
    );
    let mut scheduler =
        app::build_scheduler(&settings, accounts, engine.clone(), shutdown).unwrap();

    tokio::time::timeout(Duration::from_secs(5), scheduler.run())
        .await
        .expect("scheduler should stop after shutdown");

    assert_eq!(scheduler.state(), SchedulerState::Terminated);
    assert_eq!(engine.calls(), vec!["alice@imap.example.com"]);

    let summary = scheduler.last_summary().unwrap();
    assert!(summary.interrupted);
    assert_eq!(summary.results.len(), 1);
    assert_eq!(summary.results[0].status, CycleStatus::Success);
    assert_eq!(summary.results[0].messages, 5);
}

#[tokio::test]
async fn test_existing_engine_state_survives_cycles() {
    let harness = TestHarness::new();
    harness.write_accounts("alice:\"pw1\":imap.example.com:alice@local.test\n");
    let settings = harness.settings();

    let dir = harness.account_dir("alice_imap_example_com");
    fs::create_dir_all(&dir).unwrap();
    let oldmail = dir.join("oldmail-imap.example.com-993-alice-INBOX");
    fs::write(&oldmail, "msg-1\x001700000000\n").unwrap();

    let accounts = load_accounts(&settings.accounts_file).unwrap();
    let mut scheduler = app::build_scheduler(
        &settings,
        accounts,
        Arc::new(ScriptedEngine::new()),
        Shutdown::new(),
    )
    .unwrap();
    scheduler.step().await;
    scheduler.step().await;

    assert_eq!(
        fs::read_to_string(&oldmail).unwrap(),
        "msg-1\x001700000000\n"
    );
}

#[tokio::test]
async fn test_unreachable_hook_does_not_affect_cycle() {
    let mut harness = TestHarness::new();
    harness.write_accounts("alice:\"pw1\":imap.example.com:alice@local.test\n");
    harness.set_env("SUCCESS_HOOK_URL", "http://127.0.0.1:9/ping?token=abc");
    let settings = harness.settings();
    let accounts = load_accounts(&settings.accounts_file).unwrap();

    let mut scheduler = app::build_scheduler(
        &settings,
        accounts,
        Arc::new(ScriptedEngine::new().succeed("alice@imap.example.com", 1)),
        Shutdown::new(),
    )
    .unwrap();

    scheduler.step().await;
    assert_eq!(scheduler.step().await, SchedulerState::Sleeping);
    assert_eq!(
        scheduler.last_summary().unwrap().count(CycleStatus::Success),
        1
    );
}

#[tokio::test]
async fn test_dry_deliver_discards_into_separate_state() {
    let mut harness = TestHarness::new();
    harness.write_accounts("alice:\"pw1\":imap.example.com:alice@local.test\n");
    harness.set_env("DRY_DELIVER", "1");
    let settings = harness.settings();
    assert_ne!(settings.state_root, harness.state_root);
    let accounts = load_accounts(&settings.accounts_file).unwrap();

    let mut scheduler = app::build_scheduler(
        &settings,
        accounts,
        Arc::new(ScriptedEngine::new()),
        Shutdown::new(),
    )
    .unwrap();
    scheduler.step().await;
    scheduler.step().await;

    // The configured root is left alone; its oldmail files stay authoritative.
    assert!(!harness.state_root.exists());

    let rc = fs::read_to_string(
        settings
            .state_root
            .join("alice_imap_example_com")
            .join("getmailrc"),
    )
    .unwrap();
    assert!(rc.contains("path = /bin/sh"));
    assert!(!rc.contains("--file="));
}
