//! End-to-end tests for the invitrack binary
//!
//! Each test works in its own temp directory so ledgers never leak between runs.

use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const JOIN_LOG: &str = r#"
# alice's invite has one use before the session starts
{"event":"invites","community":"g1","invites":[{"code":"A","uses":1,"inviter":"alice#0001"},{"code":"B","uses":0,"inviter":"bob#0002"}]}
{"event":"ready","communities":["g1"]}
{"event":"invites","community":"g1","invites":[{"code":"A","uses":2,"inviter":"alice#0001"},{"code":"B","uses":0,"inviter":"bob#0002"}]}
{"event":"member_join","community":"g1","member":"carol#0003"}
{"event":"invites","community":"g1","invites":[{"code":"A","uses":2,"inviter":"alice#0001"},{"code":"B","uses":1,"inviter":"bob#0002"}]}
{"event":"member_join","community":"g1","member":"dave#0004"}
{"event":"member_join","community":"g1","member":"erin#0005"}
"#;

fn write_file(dir: &Path, name: &str, contents: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path
}

fn invitrack() -> assert_cmd::Command {
    assert_cmd::cargo::cargo_bin_cmd!("invitrack")
}

#[test]
fn test_run_prints_text_notices() {
    let dir = TempDir::new().unwrap();
    let events = write_file(dir.path(), "events.jsonl", JOIN_LOG);
    let ledger = dir.path().join("ledger.json");

    invitrack()
        .arg("run")
        .arg("--events")
        .arg(&events)
        .arg("--ledger")
        .arg(&ledger)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "carol#0003 joined g1, invited by alice#0001 via A (1 invites)",
        ))
        .stdout(predicate::str::contains(
            "dave#0004 joined g1, invited by bob#0002 via B (1 invites)",
        ))
        .stdout(predicate::str::contains("erin#0005 joined g1, inviter unknown"));

    let stored: serde_json::Value = serde_json::from_str(&fs::read_to_string(&ledger).unwrap()).unwrap();
    assert_eq!(stored["alice#0001"], 1);
    assert_eq!(stored["bob#0002"], 1);
    assert!(stored.get("unknown").is_none());
}

#[test]
fn test_run_json_notices() {
    let dir = TempDir::new().unwrap();
    let events = write_file(dir.path(), "events.jsonl", JOIN_LOG);
    let ledger = dir.path().join("ledger.json");

    let output = invitrack()
        .args(["run", "--format", "json", "--events"])
        .arg(&events)
        .arg("--ledger")
        .arg(&ledger)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let notices: Vec<serde_json::Value> = stdout
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();

    assert_eq!(notices.len(), 3);
    assert_eq!(notices[0]["member"], "carol#0003");
    assert_eq!(notices[0]["inviter"], "alice#0001");
    assert_eq!(notices[0]["code"], "A");
    assert_eq!(notices[0]["total"], 1);
    assert_eq!(notices[0]["durable"], true);
    assert!(notices[2]["inviter"].is_null());
}

#[test]
fn test_run_accumulates_across_invocations() {
    let dir = TempDir::new().unwrap();
    let events = write_file(dir.path(), "events.jsonl", JOIN_LOG);
    let ledger = dir.path().join("ledger.json");

    for _ in 0..2 {
        invitrack()
            .arg("run")
            .arg("--events")
            .arg(&events)
            .arg("--ledger")
            .arg(&ledger)
            .assert()
            .success();
    }

    invitrack()
        .args(["ledger", "get", "alice#0001", "--ledger"])
        .arg(&ledger)
        .assert()
        .success()
        .stdout("2\n");
}

#[test]
fn test_run_reads_stdin_and_skips_malformed_lines() {
    let dir = TempDir::new().unwrap();
    let ledger = dir.path().join("ledger.json");
    let input = format!("not json at all\n{}", JOIN_LOG);

    invitrack()
        .arg("run")
        .arg("--ledger")
        .arg(&ledger)
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("invited by alice#0001"));
}

#[test]
fn test_ledger_show_ranks_inviters() {
    let dir = TempDir::new().unwrap();
    let ledger = write_file(
        dir.path(),
        "ledger.json",
        r##"{"alice#0001": 3, "bob#0002": 7, "carol#0003": 3}"##,
    );

    let output = invitrack()
        .args(["ledger", "show", "--ledger"])
        .arg(&ledger)
        .output()
        .unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].ends_with("bob#0002"));
    assert!(lines[1].ends_with("alice#0001"));
    assert!(lines[2].ends_with("carol#0003"));
}

#[test]
fn test_ledger_show_top_json() {
    let dir = TempDir::new().unwrap();
    let ledger = write_file(
        dir.path(),
        "ledger.json",
        r##"{"alice#0001": 3, "bob#0002": 7}"##,
    );

    invitrack()
        .args(["ledger", "show", "--top", "1", "--format", "json", "--ledger"])
        .arg(&ledger)
        .assert()
        .success()
        .stdout(predicate::str::contains(r##""inviter":"bob#0002""##))
        .stdout(predicate::str::contains("alice").not());
}

#[test]
fn test_ledger_show_missing_file_is_empty() {
    let dir = TempDir::new().unwrap();

    invitrack()
        .args(["ledger", "show", "--ledger"])
        .arg(dir.path().join("absent.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("No attributed joins recorded"));
}

#[test]
fn test_ledger_get_unknown_inviter_is_zero() {
    let dir = TempDir::new().unwrap();
    let ledger = write_file(dir.path(), "ledger.json", r##"{"alice#0001": 3}"##);

    invitrack()
        .args(["ledger", "get", "nobody#0000", "--ledger"])
        .arg(&ledger)
        .assert()
        .success()
        .stdout("0\n");
}

#[test]
fn test_corrupt_ledger_fails() {
    let dir = TempDir::new().unwrap();
    let ledger = write_file(dir.path(), "ledger.json", "{ this is not json");

    invitrack()
        .args(["ledger", "show", "--ledger"])
        .arg(&ledger)
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to load ledger"));
}

#[test]
fn test_config_file_sets_ledger_and_templates() {
    let dir = TempDir::new().unwrap();
    let events = write_file(dir.path(), "events.jsonl", JOIN_LOG);
    let ledger = dir.path().join("from-config.json");
    let config = write_file(
        dir.path(),
        "invitrack.toml",
        &format!(
            "ledger_path = {:?}\n\n[notice]\nknown = \"{{member}} <- {{inviter}}\"\n",
            ledger.display().to_string()
        ),
    );

    invitrack()
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg("--events")
        .arg(&events)
        .assert()
        .success()
        .stdout(predicate::str::contains("carol#0003 <- alice#0001"))
        .stdout(predicate::str::contains("erin#0005 joined g1, inviter unknown"));

    assert!(ledger.exists());
}

#[test]
fn test_invalid_config_is_rejected() {
    let dir = TempDir::new().unwrap();
    let config = write_file(dir.path(), "invitrack.toml", "no_such_key = 1\n");

    invitrack()
        .arg("--config")
        .arg(&config)
        .args(["ledger", "show"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invitrack.toml"));
}

#[test]
fn test_zero_fetch_timeout_is_rejected() {
    invitrack()
        .args(["run", "--fetch-timeout-ms", "0"])
        .write_stdin("")
        .assert()
        .failure();
}
