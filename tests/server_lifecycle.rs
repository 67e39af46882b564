//! Lifecycle tests for the managed inference server.
//!
//! A tiny shell script stands in for the server binary (it ignores the
//! launch arguments and sleeps), and wiremock serves the `/health`
//! endpoint, so the full spawn → record → poll → stop cycle runs for real.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use hark::config::ServerConfig;
use hark::conversation::{ConversationStore, Role};
use hark::server::{Readiness, ServerManager};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Write an executable script that ignores its arguments and stays alive.
fn fake_server_binary(dir: &Path) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;
    let bin = dir.join("fake-llama-server");
    std::fs::write(&bin, "#!/bin/sh\nexec sleep 30\n").expect("write fake server");
    std::fs::set_permissions(&bin, std::fs::Permissions::from_mode(0o755))
        .expect("mark executable");
    bin
}

fn test_config(dir: &Path, port: u16) -> ServerConfig {
    ServerConfig {
        bin_path: fake_server_binary(dir),
        model_path: dir.join("model.gguf"),
        port,
        pid_file: dir.join("server.pid"),
        health_poll_interval_ms: 10,
        health_poll_attempts: 50,
        ..ServerConfig::default()
    }
}

async fn healthy_mock() -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn mock_port(server: &MockServer) -> u16 {
    server.address().port()
}

#[tokio::test]
async fn not_running_before_start_and_stop_is_harmless() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path(), 1);
    let pid_file = config.pid_file.clone();
    let manager = ServerManager::new(config).expect("manager");

    assert!(!manager.is_running());
    manager.stop(None);
    assert!(!manager.is_running());
    assert!(!pid_file.exists());
}

#[tokio::test]
async fn start_confirms_readiness_and_stop_tears_down() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mock = healthy_mock().await;
    let config = test_config(dir.path(), mock_port(&mock));
    let pid_file = config.pid_file.clone();
    let manager = ServerManager::new(config).expect("manager");

    let readiness = manager.start().await.expect("start");
    assert_eq!(readiness, Readiness::Confirmed);
    assert!(manager.is_running());
    assert!(pid_file.exists());

    manager.stop(None);
    assert!(!manager.is_running());
    assert!(!pid_file.exists());
}

#[tokio::test]
async fn second_start_is_a_no_op() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mock = healthy_mock().await;
    let config = test_config(dir.path(), mock_port(&mock));
    let pid_file = config.pid_file.clone();
    let manager = ServerManager::new(config).expect("manager");

    manager.start().await.expect("first start");
    let first_pid = std::fs::read_to_string(&pid_file).expect("pid record");

    let readiness = manager.start().await.expect("second start");
    assert_eq!(readiness, Readiness::Confirmed);
    let second_pid = std::fs::read_to_string(&pid_file).expect("pid record");
    assert_eq!(first_pid, second_pid, "second start must not spawn again");

    manager.stop(None);
}

#[tokio::test]
async fn readiness_timeout_leaves_process_and_record_in_place() {
    let dir = tempfile::tempdir().expect("tempdir");
    // Health endpoint that never succeeds.
    let mock = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/health"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&mock)
        .await;

    let mut config = test_config(dir.path(), mock_port(&mock));
    config.health_poll_attempts = 3;
    let pid_file = config.pid_file.clone();
    let manager = ServerManager::new(config).expect("manager");

    let readiness = manager.start().await.expect("start");
    assert_eq!(readiness, Readiness::Unconfirmed);
    // The process may still be loading: nothing was rolled back.
    assert!(pid_file.exists());
    assert!(manager.is_running());

    manager.stop(None);
}

#[tokio::test]
async fn stale_pid_record_reads_as_not_running() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path(), 1);
    let pid_file = config.pid_file.clone();

    // Record a PID that no longer belongs to any process of ours.
    let mut child = std::process::Command::new("true").spawn().expect("spawn");
    let dead_pid = child.id();
    child.wait().expect("reap");
    std::fs::write(&pid_file, dead_pid.to_string()).expect("write stale record");

    let manager = ServerManager::new(config).expect("manager");
    assert!(!manager.is_running());
}

#[tokio::test]
async fn stop_always_resets_conversation_memory() {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = test_config(dir.path(), 1);
    let manager = ServerManager::new(config).expect("manager");

    let conversation = Mutex::new(ConversationStore::open(
        dir.path().join("history.json"),
        "system prompt",
    ));
    conversation
        .lock()
        .unwrap()
        .append(Role::User, "remember this");

    // No server is running; stop still clears history as a matter of policy.
    manager.stop(Some(&conversation));

    let conversation = conversation.lock().unwrap();
    assert_eq!(conversation.len(), 1);
    assert_eq!(conversation.messages()[0].role, Role::System);
}

#[tokio::test]
async fn idle_tick_stops_only_past_the_threshold() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mock = healthy_mock().await;

    // Generous threshold: the tick must leave the server running.
    let mut config = test_config(dir.path(), mock_port(&mock));
    config.idle_shutdown_secs = 3600;
    let manager = ServerManager::new(config).expect("manager");
    manager.start().await.expect("start");
    manager.touch();
    assert!(!manager.idle_tick(None));
    assert!(manager.is_running());
    manager.stop(None);

    // Zero threshold: any elapsed idle time triggers the shutdown.
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = test_config(dir.path(), mock_port(&mock));
    config.idle_shutdown_secs = 0;
    let manager = ServerManager::new(config).expect("manager");
    manager.start().await.expect("start");
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    assert!(manager.idle_tick(None));
    assert!(!manager.is_running());
}
