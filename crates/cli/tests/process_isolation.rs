//! End-to-end tests for the `turngraph` binary.
//!
//! Every test runs against the offline echo provider with `HOME` pointed at
//! an empty directory, so no user configuration or network is involved.

use std::io::Write;
use std::process::{Command, Output, Stdio};

use turngraph_agent::{IsolatedRequest, MessageType, ProcessMessage, RunConfig};
use turngraph_core::message::Message;
use turngraph_core::model::ModelConfig;

fn turngraph(home: &tempfile::TempDir) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_turngraph"));
    cmd.env("HOME", home.path())
        .env("TURNGRAPH_PROVIDER", "echo")
        .env_remove("TURNGRAPH_API_KEY")
        .env_remove("OPENAI_API_KEY")
        .env("RUST_LOG", "warn");
    cmd
}

fn with_stdin(mut cmd: Command, input: &str) -> Output {
    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .take()
        .unwrap()
        .write_all(input.as_bytes())
        .unwrap();
    child.wait_with_output().unwrap()
}

fn echo_request(run_id: &str, text: &str) -> IsolatedRequest {
    let model = ModelConfig {
        provider: "echo".into(),
        ..ModelConfig::default()
    };
    IsolatedRequest::new(
        RunConfig::new(model).with_run_id(run_id),
        vec![Message::user(text)],
    )
}

// ── worker subcommand ────────────────────────────────────────────────────

#[test]
fn worker_answers_a_command_envelope() {
    let home = tempfile::tempdir().unwrap();
    let command = ProcessMessage::command(&echo_request("w1", "hello")).unwrap();
    let line = format!("{}\n", command.encode().unwrap());

    let mut cmd = turngraph(&home);
    cmd.arg("worker");
    let output = with_stdin(cmd, &line);
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let reply: serde_json::Value = serde_json::from_str(stdout.trim()).unwrap();
    assert_eq!(reply["type"], "result");
    assert_eq!(reply["run_id"], "w1");
    assert_eq!(reply["data"]["phase"], "done");

    let messages = reply["data"]["messages"].as_array().unwrap();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[1]["content"], "echo: hello");
}

#[test]
fn worker_reports_malformed_input_in_band() {
    let home = tempfile::tempdir().unwrap();
    let mut cmd = turngraph(&home);
    cmd.arg("worker");
    let output = with_stdin(cmd, "this is not json\n");
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let reply = ProcessMessage::decode(
        stdout.trim(),
        turngraph_core::error::BoundaryKind::Process,
    )
    .unwrap();
    assert_eq!(reply.kind, MessageType::Error);
}

#[test]
fn worker_fails_when_stdin_closes_early() {
    let home = tempfile::tempdir().unwrap();
    let mut cmd = turngraph(&home);
    cmd.arg("worker");
    let output = with_stdin(cmd, "");
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}

// ── run subcommand ───────────────────────────────────────────────────────

#[test]
fn run_in_place_prints_the_reply() {
    let home = tempfile::tempdir().unwrap();
    let output = turngraph(&home)
        .args(["run", "-m", "hello there"])
        .output()
        .unwrap();
    assert!(output.status.success());
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().trim(),
        "echo: hello there"
    );
}

#[test]
fn run_through_a_child_process() {
    let home = tempfile::tempdir().unwrap();
    let output = turngraph(&home)
        .args(["run", "-m", "across the boundary", "--isolate", "process"])
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert_eq!(
        String::from_utf8(output.stdout).unwrap().trim(),
        "echo: across the boundary"
    );
}

#[test]
fn tool_turn_matches_across_isolation_modes() {
    let home = tempfile::tempdir().unwrap();
    let prompt = r#"/tool calculator {"expression":"6*7"}"#;

    let mut states = Vec::new();
    for isolate in [None, Some("thread"), Some("process")] {
        let mut cmd = turngraph(&home);
        cmd.args(["run", "--json", "-m", prompt]);
        if let Some(mode) = isolate {
            cmd.args(["--isolate", mode]);
        }
        let output = cmd.output().unwrap();
        assert!(output.status.success(), "mode {isolate:?} failed");
        let state: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        states.push(state);
    }

    for state in &states {
        assert_eq!(state["phase"], "done");
        assert_eq!(state["recursion_count"], 3);
        let messages = state["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 4);
        assert_eq!(messages[2]["role"], "tool");
        assert_eq!(messages[2]["content"], "42");
        assert_eq!(messages[3]["content"], "tool call_1 returned: 42");
        assert_eq!(state["usage"], states[0]["usage"]);
    }
}

#[test]
fn recursion_limit_flag_is_enforced() {
    let home = tempfile::tempdir().unwrap();
    let output = turngraph(&home)
        .args([
            "run",
            "-m",
            r#"/tool calculator {"expression":"1+1"}"#,
            "--recursion-limit",
            "1",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("Recursion limit (1) exceeded"));
}

fn write_config(home: &tempfile::TempDir, toml: &str) {
    let dir = home.path().join(".turngraph");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("config.toml"), toml).unwrap();
}

fn content_parts(state: &serde_json::Value) -> Vec<&str> {
    state["content_data"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["data"].as_str()).collect())
        .unwrap_or_default()
}

#[test]
fn resume_carries_streaming_content_when_kept() {
    let home = tempfile::tempdir().unwrap();
    let first = turngraph(&home)
        .args(["run", "--json", "-m", "one"])
        .output()
        .unwrap();
    assert!(first.status.success());
    let saved = home.path().join("first.json");
    std::fs::write(&saved, &first.stdout).unwrap();

    write_config(&home, "[agent]\nkeep_content = true\n");
    for isolate in [None, Some("process")] {
        let mut cmd = turngraph(&home);
        cmd.args(["run", "--json", "-m", "two", "--resume"]).arg(&saved);
        if let Some(mode) = isolate {
            cmd.args(["--isolate", mode]);
        }
        let output = cmd.output().unwrap();
        assert!(output.status.success(), "mode {isolate:?} failed");
        let state: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
        assert_eq!(content_parts(&state), ["echo:", " one", "echo:", " two"]);
    }
}

#[test]
fn resume_is_ignored_without_keep_content() {
    let home = tempfile::tempdir().unwrap();
    let first = turngraph(&home)
        .args(["run", "--json", "-m", "one"])
        .output()
        .unwrap();
    let saved = home.path().join("first.json");
    std::fs::write(&saved, &first.stdout).unwrap();

    let output = turngraph(&home)
        .args(["run", "--json", "-m", "two", "--resume"])
        .arg(&saved)
        .output()
        .unwrap();
    assert!(output.status.success());
    let state: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(content_parts(&state), ["echo:", " two"]);
}

// ── config subcommand ────────────────────────────────────────────────────

#[test]
fn config_prints_defaults() {
    let home = tempfile::tempdir().unwrap();
    let output = turngraph(&home).arg("config").output().unwrap();
    assert!(output.status.success());
    let text = String::from_utf8(output.stdout).unwrap();
    assert!(text.contains("recursion_limit = 10"));
    assert!(text.contains("[isolation]"));
}
