#![cfg(all(unix, feature = "cli"))]

use std::io::{BufRead, BufReader};
use std::process::{Child, Command, Output, Stdio};

use serde_json::Value;

/// A `wirerpc serve` child bound to an ephemeral TCP port.
struct Server {
    child: Child,
    endpoint: String,
}

impl Server {
    fn start() -> Self {
        let mut child = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
            .args(["--log-level", "error", "--format", "json", "serve", "tcp://127.0.0.1:0"])
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .expect("serve command should start");

        let stdout = child.stdout.take().expect("stdout should be piped");
        let mut line = String::new();
        BufReader::new(stdout)
            .read_line(&mut line)
            .expect("serve should announce its endpoint");
        let announced: Value = serde_json::from_str(&line).expect("announcement should be json");
        assert_eq!(announced["event"], "listening");
        let endpoint = announced["endpoint"]
            .as_str()
            .expect("endpoint should be a string")
            .to_string();

        Self { child, endpoint }
    }

    fn call(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_wirerpc"))
            .args(["--log-level", "error", "--format", "json", "call", &self.endpoint])
            .args(args)
            .output()
            .expect("call should run")
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

fn stdout_json(output: &Output) -> Value {
    serde_json::from_slice(&output.stdout).expect("stdout should be json")
}

#[test]
fn call_uses_fury_with_builtin_protocol() {
    let server = Server::start();

    let output = server.call(&["add", "1", "2", "--builtin-protocol"]);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));
    let out = stdout_json(&output);
    assert_eq!(out["method"], "add");
    assert_eq!(out["codec"], "fury");
    assert_eq!(out["result"], 3);

    let output = server.call(&["shortUrl", "1234567890abcdefg"]);
    assert!(output.status.success());
    let out = stdout_json(&output);
    assert_eq!(out["codec"], "json");
    assert_eq!(out["result"], "1234567890");
}

#[test]
fn call_reaches_registry_services() {
    let server = Server::start();

    let output = server.call(&["text.upper", "quiet"]);
    assert!(output.status.success());
    assert_eq!(stdout_json(&output)["result"], "QUIET");

    let output = server.call(&["echo", "1", "[true]", "word"]);
    assert!(output.status.success());
    assert_eq!(
        stdout_json(&output)["result"],
        serde_json::json!([1, [true], "word"])
    );
}

#[test]
fn remote_failures_and_missing_methods_set_exit_codes() {
    let server = Server::start();

    let output = server.call(&["fail", "broken"]);
    assert_eq!(output.status.code(), Some(4));
    assert!(String::from_utf8_lossy(&output.stderr).contains("CustomError: broken"));

    let output = server.call(&["nope"]);
    assert_eq!(output.status.code(), Some(64));
}

#[test]
fn call_timeout_returns_124() {
    let server = Server::start();

    let output = server.call(&["sleep", "5000", "--timeout", "200ms"]);
    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn connect_timeout_returns_124() {
    // Bind and release a port so nothing listens on it.
    let port = std::net::TcpListener::bind("127.0.0.1:0")
        .and_then(|listener| listener.local_addr())
        .expect("ephemeral port should bind")
        .port();

    let output = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
        .args(["call", &format!("tcp://127.0.0.1:{port}"), "add", "--timeout", "1s"])
        .output()
        .expect("call should run");

    assert_eq!(output.status.code(), Some(124));
}

#[test]
fn describe_lists_builtin_protocols() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
        .args(["--format", "json", "describe"])
        .output()
        .expect("describe should run");

    assert!(output.status.success());
    let rows = stdout_json(&output);
    let methods: Vec<&str> = rows
        .as_array()
        .expect("describe should emit an array")
        .iter()
        .filter_map(|row| row["method"].as_str())
        .collect();
    assert_eq!(methods, vec!["add", "shortUrl", "sleep"]);
}

#[test]
fn describe_reads_protocol_directory() {
    let dir = std::env::temp_dir().join(format!(
        "wirerpc-cli-describe-{}-{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("time should be after epoch")
            .as_nanos()
    ));
    std::fs::create_dir_all(&dir).expect("temp dir should be creatable");
    std::fs::write(
        dir.join("greeter.protocol.json"),
        r#"{"method": "greet", "request": [{"name": "who", "type": "string"}], "response": {"type": "string"}}"#,
    )
    .expect("protocol file should be writable");

    let output = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
        .args(["--format", "raw", "describe"])
        .arg(&dir)
        .output()
        .expect("describe should run");

    assert!(output.status.success());
    assert_eq!(String::from_utf8_lossy(&output.stdout).trim(), "greet");

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn version_reports_package_version() {
    let output = Command::new(env!("CARGO_BIN_EXE_wirerpc"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    assert_eq!(
        String::from_utf8_lossy(&output.stdout).trim(),
        format!("wirerpc {}", env!("CARGO_PKG_VERSION"))
    );
}
