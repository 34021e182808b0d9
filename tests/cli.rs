use std::net::TcpListener;
use std::process::{Child, Command as StdCommand};
use std::time::Duration;

use assert_cmd::prelude::*;
use predicates::prelude::*;
use tempfile::tempdir;

fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0")
        .unwrap()
        .local_addr()
        .unwrap()
        .port()
}

struct ServerGuard(Child);

impl Drop for ServerGuard {
    fn drop(&mut self) {
        let _ = self.0.kill();
        let _ = self.0.wait();
    }
}

fn spawn_server(data_file: &std::path::Path, port: u16) -> ServerGuard {
    let child = StdCommand::cargo_bin("durakv-server")
        .unwrap()
        .arg("--host")
        .arg("127.0.0.1")
        .arg("--port")
        .arg(port.to_string())
        .arg("--data-file")
        .arg(data_file)
        .spawn()
        .unwrap();
    std::thread::sleep(Duration::from_millis(300));
    ServerGuard(child)
}

#[test]
fn client_set_and_get_round_trip_through_the_cli() {
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("data.log");
    let port = free_port();
    let _server = spawn_server(&data_file, port);
    let addr = format!("127.0.0.1:{}", port);

    StdCommand::cargo_bin("durakv-client")
        .unwrap()
        .args(["--addr", &addr, "set", "foo", "bar"])
        .assert()
        .success();

    StdCommand::cargo_bin("durakv-client")
        .unwrap()
        .args(["--addr", &addr, "get", "foo"])
        .assert()
        .success()
        .stdout(predicate::str::contains("bar"));
}

#[test]
fn client_get_missing_key_reports_not_found() {
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("data.log");
    let port = free_port();
    let _server = spawn_server(&data_file, port);
    let addr = format!("127.0.0.1:{}", port);

    StdCommand::cargo_bin("durakv-client")
        .unwrap()
        .args(["--addr", &addr, "get", "nope"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Key not found"));
}

#[test]
fn client_bulk_set_applies_every_pair() {
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("data.log");
    let port = free_port();
    let _server = spawn_server(&data_file, port);
    let addr = format!("127.0.0.1:{}", port);

    StdCommand::cargo_bin("durakv-client")
        .unwrap()
        .args(["--addr", &addr, "bulk-set", "a=1", "b=2"])
        .assert()
        .success();

    StdCommand::cargo_bin("durakv-client")
        .unwrap()
        .args(["--addr", &addr, "get", "b"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2"));
}

#[test]
fn client_search_text_finds_matching_key() {
    let dir = tempdir().unwrap();
    let data_file = dir.path().join("data.log");
    let port = free_port();
    let _server = spawn_server(&data_file, port);
    let addr = format!("127.0.0.1:{}", port);

    StdCommand::cargo_bin("durakv-client")
        .unwrap()
        .args(["--addr", &addr, "set", "doc1", "the quick brown fox"])
        .assert()
        .success();

    StdCommand::cargo_bin("durakv-client")
        .unwrap()
        .args(["--addr", &addr, "search-text", "quick"])
        .assert()
        .success()
        .stdout(predicate::str::contains("doc1"));
}
