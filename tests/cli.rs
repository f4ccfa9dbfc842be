//! The binary keeps stdout for rendered states; log records go to stderr.

use std::fs;
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

#[test]
fn stdout_carries_only_rendered_states() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("clicks.jsonl");
    fs::write(
        &path,
        [
            concat!(
                r#"{"type":"item","thread":"rust","message_id":1,"#,
                r#""vote_state":0,"up_votes":3,"down_votes":1}"#
            ),
            r#"{"type":"click","thread":"rust","message_id":1,"action":"downvote"}"#,
            "",
        ]
        .join("\n"),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_forumvote"))
        .arg(&path)
        .env("LOG_LEVEL", "debug")
        .env("LOG_DOMAINS", "all")
        .env_remove("VOTE_API_BASE")
        .env_remove("LOG_DIR")
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8(output.stdout).unwrap();
    let lines: Vec<Value> = stdout
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line["item_id"], "rust/m/1");
        assert!(line.get("run_id").is_none());
    }
    assert_eq!(lines[1]["score"], 1);
    assert_eq!(lines[1]["vote_state"], "downvoted");

    let stderr = String::from_utf8(output.stderr).unwrap();
    let records: Vec<Value> = stderr
        .lines()
        .filter_map(|l| serde_json::from_str(l).ok())
        .collect();
    assert!(records.iter().any(|r| r["event"] == "transition"));
    assert!(records.iter().any(|r| r["event"] == "summary"));
}
