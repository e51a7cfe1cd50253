//! Start/stop behavior of a single instance against fake binaries.

#![cfg(unix)]

mod common;

use common::{CollectingSink, SERVER_READY, instance, ready_monitor, ready_server, script};
use embedkv::{Deadline, Error, InstanceStatus, OutputStream, Role};
use std::time::Duration;
use tempfile::TempDir;

#[tokio::test]
async fn start_then_stop() {
    let temp = TempDir::new().unwrap();
    let server = instance(Role::Server, 7000, &ready_server(temp.path(), "server.sh"));

    server.start().await.unwrap();
    assert!(server.is_active());
    assert_eq!(server.status(), InstanceStatus::Active);
    assert!(server.pid().await.is_some());

    server.stop().await.unwrap();
    assert!(!server.is_active());
    assert_eq!(server.status(), InstanceStatus::Stopped);
    assert!(server.pid().await.is_none());
}

#[tokio::test]
async fn monitor_uses_monitor_ready_line() {
    let temp = TempDir::new().unwrap();
    let monitor = instance(Role::Monitor, 26379, &ready_monitor(temp.path(), "monitor.sh"));

    monitor.start().await.unwrap();
    assert!(monitor.is_active());
    monitor.stop().await.unwrap();
}

#[tokio::test]
async fn repeated_cycles_use_fresh_children() {
    let temp = TempDir::new().unwrap();
    let server = instance(Role::Server, 7000, &ready_server(temp.path(), "server.sh"));

    let mut pids = Vec::new();
    for _ in 0..5 {
        server.start().await.unwrap();
        assert!(server.is_active());
        pids.push(server.pid().await.unwrap());
        server.stop().await.unwrap();
        assert!(!server.is_active());
    }

    pids.sort_unstable();
    pids.dedup();
    assert_eq!(pids.len(), 5);
    assert_eq!(server.status(), InstanceStatus::Stopped);
}

#[tokio::test]
async fn second_start_is_rejected() {
    let temp = TempDir::new().unwrap();
    let server = instance(Role::Server, 7000, &ready_server(temp.path(), "server.sh"));

    server.start().await.unwrap();
    let pid = server.pid().await;

    let result = server.start().await;
    assert!(matches!(
        result,
        Err(Error::AlreadyActive { port: 7000, .. })
    ));
    // Still the same child, still active.
    assert!(server.is_active());
    assert_eq!(server.pid().await, pid);

    server.stop().await.unwrap();
}

#[tokio::test]
async fn exit_before_ready_reports_all_output() {
    let temp = TempDir::new().unwrap();
    let crashing = script(
        temp.path(),
        "crash.sh",
        "echo 'starting'\necho 'loading config'\necho 'fatal: bad directive'\nexit 1",
    );
    let server = instance(Role::Server, 7000, &crashing);

    let err = server.start().await.unwrap_err();

    match &err {
        Error::Readiness { port, output, .. } => {
            assert_eq!(*port, 7000);
            assert_eq!(output, "\nstarting\nloading config\nfatal: bad directive");
        }
        other => panic!("expected Readiness, got {other:?}"),
    }
    assert!(err.to_string().contains("fatal: bad directive"));
    assert_eq!(server.status(), InstanceStatus::Stopped);
}

#[tokio::test]
async fn failed_start_can_be_retried() {
    let temp = TempDir::new().unwrap();
    let path = script(temp.path(), "flaky.sh", "echo 'nope'");
    let server = instance(Role::Server, 7000, &path);

    assert!(server.start().await.is_err());

    ready_server(temp.path(), "flaky.sh");
    server.start().await.unwrap();
    assert!(server.is_active());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn deadline_reclaims_silent_child() {
    let temp = TempDir::new().unwrap();
    let slow = script(temp.path(), "slow.sh", "echo 'still booting'\nexec sleep 600");
    let server = instance(Role::Server, 7000, &slow)
        .with_deadline(Deadline::after(Duration::from_millis(300)));

    let err = server.start().await.unwrap_err();

    match err {
        Error::DeadlineElapsed {
            deadline, output, ..
        } => {
            assert_eq!(deadline, Duration::from_millis(300));
            assert_eq!(output, "\nstill booting");
        }
        other => panic!("expected DeadlineElapsed, got {other:?}"),
    }
    assert_eq!(server.status(), InstanceStatus::Stopped);
    assert!(server.pid().await.is_none());
}

#[tokio::test]
async fn explicit_deadline_overrides_default() {
    let temp = TempDir::new().unwrap();
    let server = instance(Role::Server, 7000, &ready_server(temp.path(), "server.sh"));

    server
        .start_with_deadline(Deadline::after(Duration::from_secs(10)))
        .await
        .unwrap();
    assert!(server.is_active());
    server.stop().await.unwrap();
}

#[tokio::test]
async fn stderr_and_late_stdout_reach_the_sink() {
    let temp = TempDir::new().unwrap();
    let chatty = script(
        temp.path(),
        "chatty.sh",
        &format!(
            "echo 'warning: overcommit disabled' >&2\n{SERVER_READY}\necho 'client connected'\nexec sleep 600"
        ),
    );
    let sink = CollectingSink::new();
    let server = instance(Role::Server, 7000, &chatty).with_sink(sink.clone());

    server.start().await.unwrap();

    assert!(sink.wait_for(OutputStream::Stderr, "warning: overcommit disabled").await);
    assert!(sink.wait_for(OutputStream::Stdout, "client connected").await);
    // Lines consumed by the readiness wait are not re-sent.
    assert!(
        !sink
            .lines()
            .iter()
            .any(|(_, line)| line.contains("Ready to accept connections"))
    );

    server.stop().await.unwrap();
}

#[tokio::test]
async fn child_runs_in_executable_directory() {
    let temp = TempDir::new().unwrap();
    let marker = temp.path().join("cwd.txt");
    let path = script(
        temp.path(),
        "cwd.sh",
        &format!("pwd > '{}'\n{SERVER_READY}\nexec sleep 600", marker.display()),
    );
    let server = instance(Role::Server, 7000, &path);

    server.start().await.unwrap();
    server.stop().await.unwrap();

    // args[0] is /bin/sh, so the child runs in /bin.
    let cwd = std::fs::read_to_string(&marker).unwrap();
    assert_eq!(
        std::fs::canonicalize(cwd.trim()).unwrap(),
        std::fs::canonicalize("/bin").unwrap()
    );
}

#[tokio::test]
async fn abandoned_start_leaves_instance_stopped() {
    let temp = TempDir::new().unwrap();
    let slow = script(temp.path(), "slow.sh", "echo 'still booting'\nexec sleep 600");
    let server = instance(Role::Server, 7000, &slow);

    let raced = tokio::time::timeout(Duration::from_millis(300), server.start()).await;
    assert!(raced.is_err());
    assert_eq!(server.status(), InstanceStatus::Stopped);

    server.stop().await.unwrap();
    assert_eq!(server.status(), InstanceStatus::Stopped);
    assert!(server.pid().await.is_none());

    // Still startable afterwards.
    ready_server(temp.path(), "slow.sh");
    server.start().await.unwrap();
    assert!(server.is_active());
    server.stop().await.unwrap();
}
