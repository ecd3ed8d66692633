#![cfg(unix)]
#![allow(clippy::unwrap_used, clippy::expect_used)] // Integration tests use unwrap for brevity

//! End-to-end tests of the `psub` binary: stdout carries exactly the
//! channel address, logs stay on stderr, and spawn failure is fatal.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::net::UnixStream;
use tokio::process::{Child, Command};

fn psub(config_home: &Path, socket_dir: &Path, child: &[&str]) -> Child {
    Command::new(env!("CARGO_BIN_EXE_psub"))
        .arg("--socket-dir")
        .arg(socket_dir)
        .arg("--log-level")
        .arg("debug")
        .args(child)
        .env("XDG_CONFIG_HOME", config_home)
        .env_remove("RUST_LOG")
        .env_remove("PSUB_REDUNDANCY")
        .env_remove("PSUB_SOCKET_DIR")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

async fn connect(address: &Path) -> UnixStream {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match UnixStream::connect(address).await {
                Ok(stream) => return stream,
                Err(_) => tokio::time::sleep(Duration::from_millis(10)).await,
            }
        }
    })
    .await
    .expect("channel never became connectable")
}

#[tokio::test]
async fn serves_child_output_at_announced_address() {
    let dir = tempfile::tempdir().unwrap();
    let mut child = psub(
        dir.path(),
        dir.path(),
        &["/bin/sh", "-c", "printf '%s' \"$1\"", "sh", "hello world"],
    );

    let mut stdout = BufReader::new(child.stdout.take().unwrap());
    let mut line = String::new();
    stdout.read_line(&mut line).await.unwrap();
    let address = PathBuf::from(line.trim_end());
    assert!(address.starts_with(dir.path()));

    let mut stream = connect(&address).await;
    let mut received = Vec::new();
    stream.read_to_end(&mut received).await.unwrap();
    assert_eq!(received, b"hello world");

    let status = tokio::time::timeout(Duration::from_secs(5), child.wait())
        .await
        .expect("psub should exit once a client is served")
        .unwrap();
    assert!(status.success());

    let mut rest = String::new();
    stdout.read_to_string(&mut rest).await.unwrap();
    assert!(rest.is_empty(), "nothing but the address on stdout, got {rest:?}");
}

#[tokio::test]
async fn missing_program_exits_with_failure() {
    let dir = tempfile::tempdir().unwrap();
    let child = psub(dir.path(), dir.path(), &["/nonexistent/psub-child"]);

    let output = tokio::time::timeout(Duration::from_secs(5), child.wait_with_output())
        .await
        .expect("psub should exit on spawn failure")
        .unwrap();
    assert!(!output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert_eq!(stdout.lines().count(), 1, "only the announced address");
    assert!(String::from_utf8_lossy(&output.stderr).contains("Failed to spawn"));
}
