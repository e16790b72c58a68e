//! Scripts driven through a running node.

use orgkernel::error::FailureKind;
use orgkernel::host::{spawn_node, NodeOptions};
use orgkernel::script::{Expect, Script, ScriptError, ScriptRunner, StepStatus};
use orgkernel::types::{Address, ArgValue};

use crate::common::{org, root};

const SETUP: &str = r#"
[[step]]
action = "create_permission"
entity = "root"
app = "kernel"
role = "APP_MANAGER_ROLE"
manager = "root"

[[step]]
action = "deploy"
kind = "settings"
as = "settings_base"

[[step]]
action = "new_app_instance"
app_id = "settings"
base = "settings_base"
set_default = true
initialize = []
as = "settings"

[[step]]
action = "deploy"
kind = "allowlist"
as = "allowlist_base"

[[step]]
action = "new_app_instance"
app_id = "allowlist"
base = "allowlist_base"
initialize = []
as = "allowlist"

[[step]]
action = "create_permission"
entity = "root"
app = "allowlist"
role = "MANAGE_ALLOWLIST_ROLE"
manager = "root"

[[step]]
action = "create_permission"
entity = "alice"
app = "settings"
role = "SET_ROLE"
manager = "root"
"#;

fn node_options() -> NodeOptions {
    NodeOptions {
        channel_buffer: 4,
        ..NodeOptions::default()
    }
}

#[tokio::test]
async fn full_script_runs_to_completion() {
    let (node, task) = spawn_node(org(), node_options());
    let mut runner = ScriptRunner::new(&node, root()).await.expect("runner");

    let setup = Script::from_toml(SETUP).expect("setup parses");
    let report = runner.run(&setup).await.expect("setup runs");
    assert_eq!(report.committed(), 7);
    let settings = report.aliases["settings"];

    let body = Script::from_toml(
        r#"
[[step]]
action = "call"
from = "bob"
target = "settings"
method = "set"
args = ["color", "red"]
expect = "denied"

[[step]]
action = "call"
from = "alice"
target = "settings"
method = "set"
args = ["color", "red"]

[[step]]
action = "call"
target = "settings"
method = "get"
args = ["color"]
returns = "red"

[[step]]
action = "grant"
entity = "anyone"
app = "settings"
role = "SET_ROLE"
oracle = "allowlist"

[[step]]
action = "check"
who = "bob"
app = "settings"
role = "SET_ROLE"
args = ["color", "blue"]
allowed = false

[[step]]
action = "call"
target = "allowlist"
method = "allow"
args = ["@bob"]

[[step]]
action = "check"
who = "bob"
app = "settings"
role = "SET_ROLE"
args = ["color", "blue"]
allowed = true

[[step]]
action = "get_app"
namespace = "app"
app_id = "settings"
equals = "settings"

[[step]]
action = "get_app"
namespace = "base"
app_id = "settings"
equals = "settings_base"

[[step]]
action = "revoke"
entity = "carol"
app = "settings"
role = "SET_ROLE"
expect = "invalid_config"

[[step]]
action = "advance"
blocks = 10
seconds = 120
"#,
    )
    .expect("body parses");
    let report = runner.run(&body).await.expect("body runs");

    assert_eq!(report.steps.len(), 11);
    assert!(matches!(
        report.steps[0].status,
        StepStatus::Rejected {
            kind: FailureKind::Denied,
            ..
        }
    ));
    assert_eq!(
        report.steps[2].output,
        Some(ArgValue::Bytes(b"red".to_vec()))
    );
    assert_eq!(report.steps[4].status, StepStatus::Held);
    assert_eq!(report.steps[7].output, Some(ArgValue::Address(settings)));
    assert!(matches!(
        report.steps[9].status,
        StepStatus::Rejected {
            kind: FailureKind::InvalidConfig,
            ..
        }
    ));
    assert_eq!(report.aliases["settings"], settings, "aliases persist across runs");

    let json = serde_json::to_value(&report).expect("serializes");
    assert_eq!(json["steps"][0]["status"], "rejected");
    assert_eq!(json["steps"][1]["status"], "committed");

    drop(runner);
    drop(node);
    let org = task.await.expect("node task");
    assert!(org.facts().block_number >= 10);
    assert!(org.has_permission(
        Address::from_label("bob"),
        settings,
        orgkernel::apps::settings::set_role(),
        &[]
    ));
}

#[tokio::test]
async fn unexpected_success_stops_the_script() {
    let (node, _task) = spawn_node(org(), node_options());
    let mut runner = ScriptRunner::new(&node, root()).await.expect("runner");
    let script = Script::from_toml(
        r#"
[[step]]
action = "create_permission"
entity = "alice"
app = "module"
role = "WRITE"
manager = "root"
expect = "denied"

[[step]]
action = "advance"
blocks = 1
"#,
    )
    .expect("parses");

    let err = runner.run(&script).await.expect_err("root may create");
    assert!(matches!(
        err,
        ScriptError::UnexpectedSuccess {
            step: 1,
            expected: FailureKind::Denied,
            ..
        }
    ));
    // The step committed before the runner gave up.
    assert!(runner
        .query_permission("alice", "module", "WRITE", &[])
        .await
        .expect("query"));
}

#[tokio::test]
async fn wrong_failure_kind_is_reported() {
    let (node, _task) = spawn_node(org(), node_options());
    let mut runner = ScriptRunner::new(&node, root()).await.expect("runner");
    let script = Script::from_toml(
        r#"
[[step]]
action = "create_permission"
from = "mallory"
entity = "mallory"
app = "module"
role = "WRITE"
manager = "mallory"
expect = "invalid_config"
"#,
    )
    .expect("parses");

    match runner.run(&script).await {
        Err(ScriptError::Failed {
            step: 1,
            expected: Expect::InvalidConfig,
            source,
            ..
        }) => assert_eq!(source.kind(), FailureKind::Denied),
        other => panic!("unexpected result {other:?}"),
    }
}

#[tokio::test]
async fn mismatched_queries_fail() {
    let (node, _task) = spawn_node(org(), node_options());
    let mut runner = ScriptRunner::new(&node, root()).await.expect("runner");

    let check = Script::from_toml(
        r#"
[[step]]
action = "check"
who = "root"
app = "acl"
role = "CREATE_PERMISSIONS_ROLE"
allowed = false
"#,
    )
    .expect("parses");
    assert!(matches!(
        runner.run(&check).await,
        Err(ScriptError::Mismatch { step: 1, .. })
    ));

    let registry = Script::from_toml(
        r#"
[[step]]
action = "get_app"
namespace = "core"
app_id = "kernel"
equals = "acl"
"#,
    )
    .expect("parses");
    assert!(matches!(
        runner.run(&registry).await,
        Err(ScriptError::Mismatch { step: 1, .. })
    ));

    let bad_namespace = Script::from_toml(
        r#"
[[step]]
action = "get_app"
namespace = "nowhere"
app_id = "kernel"
equals = "kernel"
"#,
    )
    .expect("parses");
    assert!(matches!(
        runner.run(&bad_namespace).await,
        Err(ScriptError::Invalid { step: 1, .. })
    ));
}

#[tokio::test]
async fn scripts_load_from_disk() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let path = tmp.path().join("setup.toml");
    std::fs::write(&path, SETUP).expect("write script");
    let script = Script::load(&path).expect("loads");
    assert_eq!(script.steps.len(), 7);

    let missing = Script::load(&tmp.path().join("absent.toml")).expect_err("missing");
    assert!(matches!(missing, ScriptError::Io { .. }));
}
