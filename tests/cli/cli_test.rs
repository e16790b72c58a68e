//! Subcommands run against a temporary home directory.

use std::path::Path;

use assert_cmd::Command;

fn orgkernel(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("orgkernel").expect("binary builds");
    cmd.env("ORGKERNEL_HOME", home)
        .env_remove("ORGKERNEL_CONFIG_PATH")
        .env_remove("ORGKERNEL_STATE_DB")
        .env_remove("ORGKERNEL_AUDIT_LOG")
        .env_remove("ORGKERNEL_LOGS_DIR")
        .env_remove("ORGKERNEL_ROOT")
        .env_remove("RUST_LOG");
    cmd
}

fn stdout(output: &std::process::Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

const SCRIPT: &str = r#"
[[step]]
action = "create_permission"
entity = "alice"
app = "ledger"
role = "SPEND"
manager = "root"

[[step]]
action = "grant"
entity = "bob"
app = "ledger"
role = "SPEND"
predicate = { compare = { left = { arg = 0 }, op = "lte", right = 100 } }

[[step]]
action = "create_permission"
from = "mallory"
entity = "mallory"
app = "ledger"
role = "STEAL"
manager = "mallory"
expect = "denied"
"#;

#[test]
fn genesis_refuses_to_overwrite_without_force() {
    let home = tempfile::tempdir().expect("tempdir");

    let output = orgkernel(home.path())
        .arg("genesis")
        .output()
        .expect("runs");
    assert!(output.status.success());
    assert!(stdout(&output).starts_with("kernel 0x"));
    assert!(home.path().join("state.db").exists());
    assert!(home.path().join("audit.jsonl").exists());

    orgkernel(home.path()).arg("genesis").assert().failure();
    orgkernel(home.path())
        .args(["genesis", "--force"])
        .assert()
        .success();
}

#[test]
fn run_persists_between_invocations() {
    let home = tempfile::tempdir().expect("tempdir");
    let script = home.path().join("script.toml");
    std::fs::write(&script, SCRIPT).expect("write script");

    let output = orgkernel(home.path())
        .arg("run")
        .arg(&script)
        .arg("--json")
        .output()
        .expect("runs");
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    let report: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json report");
    assert_eq!(report["steps"].as_array().map(Vec::len), Some(3));
    assert_eq!(report["steps"][2]["status"], "rejected");
    assert_eq!(report["steps"][2]["kind"], "denied");

    orgkernel(home.path())
        .args(["check", "--who", "alice", "--app", "ledger", "--role", "SPEND"])
        .assert()
        .success();
    orgkernel(home.path())
        .args(["check", "--who", "bob", "--app", "ledger", "--role", "SPEND", "--arg", "40"])
        .assert()
        .success();
    orgkernel(home.path())
        .args(["check", "--who", "bob", "--app", "ledger", "--role", "SPEND", "--arg", "400"])
        .assert()
        .code(1);
    orgkernel(home.path())
        .args(["check", "--who", "mallory", "--app", "ledger", "--role", "STEAL"])
        .assert()
        .code(1);

    let audit = std::fs::read_to_string(home.path().join("audit.jsonl")).expect("audit log");
    assert!(audit.lines().count() >= 3);
}

#[test]
fn failing_script_exits_nonzero() {
    let home = tempfile::tempdir().expect("tempdir");
    let script = home.path().join("bad.toml");
    std::fs::write(
        &script,
        "[[step]]\naction = \"revoke\"\nentity = \"nobody\"\napp = \"ledger\"\nrole = \"SPEND\"\n",
    )
    .expect("write script");

    orgkernel(home.path())
        .arg("run")
        .arg(&script)
        .assert()
        .failure();
}

#[test]
fn inspect_prints_the_snapshot() {
    let home = tempfile::tempdir().expect("tempdir");
    orgkernel(home.path()).arg("inspect").assert().failure();
    orgkernel(home.path()).arg("genesis").assert().success();

    let output = orgkernel(home.path())
        .arg("inspect")
        .output()
        .expect("runs");
    assert!(output.status.success());
    let snapshot: serde_json::Value = serde_json::from_str(&stdout(&output)).expect("json");
    assert_eq!(snapshot["kernel_nonce"], 1);
    assert_eq!(snapshot["registry"].as_array().map(Vec::len), Some(4));
}
