//! The node actor with audit log and state database attached.

use std::sync::Arc;

use orgkernel::acl::{create_permissions_role, DEFAULT_MAX_PARAMS};
use orgkernel::apps::builtin_catalog;
use orgkernel::audit::AuditLogger;
use orgkernel::error::FailureKind;
use orgkernel::host::{spawn_node, AclCall, Call, HostError, Limits, NodeOptions, Organization};
use orgkernel::store::StateDb;

use crate::common::{acl, addr, org, role, root};

#[tokio::test]
async fn commits_are_audited_and_persisted() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db = StateDb::open(&tmp.path().join("state.db")).await.expect("db");
    let audit_path = tmp.path().join("audit.jsonl");
    let audit = Arc::new(AuditLogger::new(&audit_path).expect("audit"));

    let org = org();
    let acl = acl(&org);
    let (node, task) = spawn_node(
        org,
        NodeOptions {
            audit: Some(audit),
            db: Some(db.clone()),
            block_time_secs: 12,
            auto_mine: true,
            channel_buffer: 4,
        },
    );

    let receipt = node
        .invoke(
            root(),
            Call::Acl(AclCall::CreatePermission {
                entity: addr("alice").into(),
                app: addr("module"),
                role: role("WRITE"),
                manager: root(),
            }),
        )
        .await
        .expect("create");
    let denied = node
        .invoke(
            addr("mallory"),
            Call::Acl(AclCall::Grant {
                entity: addr("mallory").into(),
                app: acl,
                role: create_permissions_role(),
            }),
        )
        .await;
    assert!(denied.is_err());
    assert!(node
        .has_permission(addr("alice"), addr("module"), role("WRITE"), vec![])
        .await
        .expect("alive"));

    drop(node);
    let org = task.await.expect("join");
    assert_eq!(org.facts().block_number, 1);

    let stored = db.load().await.expect("load").expect("saved");
    assert_eq!(stored, org.snapshot());

    let log = std::fs::read_to_string(&audit_path).expect("audit log");
    let lines: Vec<serde_json::Value> = log
        .lines()
        .map(|l| serde_json::from_str(l).expect("json line"))
        .collect();
    assert_eq!(lines.len(), receipt.events.len());
    for line in &lines {
        assert_eq!(line["invocation_id"], receipt.invocation_id.to_string());
        assert_eq!(line["caller"], root().to_string());
    }

    let restored = Organization::restore(
        stored,
        Arc::new(builtin_catalog()),
        Limits::default(),
        DEFAULT_MAX_PARAMS,
    )
    .expect("restore");
    assert!(restored.has_permission(addr("alice"), addr("module"), role("WRITE"), &[]));
}

#[tokio::test]
async fn advance_and_registry_reads_go_through_the_node() {
    let org = org();
    let kernel = org.kernel().address();
    let (node, _task) = spawn_node(
        org,
        NodeOptions {
            channel_buffer: 1,
            ..NodeOptions::default()
        },
    );
    let facts = node.advance(3, 30).await.expect("advance");
    assert_eq!((facts.block_number, facts.timestamp), (3, 30));
    let got = node
        .get_app(
            orgkernel::kernel::core_namespace(),
            orgkernel::kernel::kernel_app_id(),
        )
        .await
        .expect("get_app");
    assert_eq!(got, kernel);
}

#[tokio::test]
async fn failed_save_undoes_the_commit() {
    let tmp = tempfile::tempdir().expect("tempdir");
    let db_path = tmp.path().join("state.db");
    let db = StateDb::open(&db_path).await.expect("db");
    let audit_path = tmp.path().join("audit.jsonl");
    let audit = Arc::new(AuditLogger::new(&audit_path).expect("audit"));

    let org = org();
    let acl = acl(&org);
    db.save(&org.snapshot()).await.expect("genesis save");
    let before = org.snapshot();

    let raw = sqlx::SqlitePool::connect(&format!("sqlite://{}", db_path.display()))
        .await
        .expect("second connection");
    sqlx::query("DROP TABLE meta")
        .execute(&raw)
        .await
        .expect("drop table");
    raw.close().await;

    let (node, task) = spawn_node(
        org,
        NodeOptions {
            audit: Some(audit),
            db: Some(db),
            block_time_secs: 12,
            auto_mine: true,
            channel_buffer: 1,
        },
    );

    let err = node
        .invoke(
            root(),
            Call::Acl(AclCall::Grant {
                entity: addr("alice").into(),
                app: acl,
                role: create_permissions_role(),
            }),
        )
        .await
        .expect_err("save fails");
    assert!(matches!(err, HostError::Persist(_)));
    assert_eq!(err.kind(), FailureKind::Execution);
    assert!(!node
        .has_permission(addr("alice"), acl, create_permissions_role(), vec![])
        .await
        .expect("alive"));

    let err = node.advance(5, 60).await.expect_err("save fails");
    assert!(matches!(err, HostError::Persist(_)));

    drop(node);
    let org = task.await.expect("join");
    assert_eq!(org.snapshot(), before);
    let log = std::fs::read_to_string(&audit_path).unwrap_or_default();
    assert!(log.is_empty(), "nothing audited for an unsaved commit");
}
