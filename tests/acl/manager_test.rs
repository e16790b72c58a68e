//! Manager exclusivity, transfer and freezing.

use orgkernel::acl::store::Manager;
use orgkernel::error::FailureKind;
use orgkernel::host::{AclCall, Call};

use crate::common::{addr, create, fails, ok, org, role};

fn mutations(by: &str) -> Vec<Call> {
    let (module, who) = (addr("module"), addr(by));
    vec![
        Call::Acl(AclCall::Grant {
            entity: who.into(),
            app: module,
            role: role("WRITE"),
        }),
        Call::Acl(AclCall::Revoke {
            entity: addr("alice").into(),
            app: module,
            role: role("WRITE"),
        }),
        Call::Acl(AclCall::SetManager {
            new_manager: who,
            app: module,
            role: role("WRITE"),
        }),
        Call::Acl(AclCall::BurnManager {
            app: module,
            role: role("WRITE"),
        }),
    ]
}

#[test]
fn non_managers_cannot_mutate() {
    let mut org = org();
    create(&mut org, addr("alice"), addr("module"), role("WRITE"), addr("manager"));
    let before = org.snapshot();

    for caller in ["alice", "root", "mallory"] {
        for call in mutations(caller) {
            assert_eq!(fails(&mut org, addr(caller), call), FailureKind::Denied);
            assert_eq!(org.snapshot(), before);
        }
    }
}

#[test]
fn manager_transfer_moves_control() {
    let mut org = org();
    let module = addr("module");
    create(&mut org, addr("alice"), module, role("WRITE"), addr("m1"));
    ok(
        &mut org,
        addr("m1"),
        Call::Acl(AclCall::SetManager {
            new_manager: addr("m2"),
            app: module,
            role: role("WRITE"),
        }),
    );
    assert_eq!(
        org.kernel().acl().permission_manager(module, role("WRITE")),
        Some(Manager::Active(addr("m2")))
    );

    let grant_bob = Call::Acl(AclCall::Grant {
        entity: addr("bob").into(),
        app: module,
        role: role("WRITE"),
    });
    assert_eq!(fails(&mut org, addr("m1"), grant_bob.clone()), FailureKind::Denied);
    ok(&mut org, addr("m2"), grant_bob);
    assert!(org.has_permission(addr("bob"), module, role("WRITE"), &[]));
}

#[test]
fn manager_survives_full_revocation() {
    let mut org = org();
    let module = addr("module");
    create(&mut org, addr("alice"), module, role("WRITE"), addr("manager"));
    ok(
        &mut org,
        addr("manager"),
        Call::Acl(AclCall::Revoke {
            entity: addr("alice").into(),
            app: module,
            role: role("WRITE"),
        }),
    );
    assert_eq!(
        org.kernel().acl().permission_manager(module, role("WRITE")),
        Some(Manager::Active(addr("manager")))
    );

    ok(
        &mut org,
        addr("manager"),
        Call::Acl(AclCall::Grant {
            entity: addr("carol").into(),
            app: module,
            role: role("WRITE"),
        }),
    );
    assert!(org.has_permission(addr("carol"), module, role("WRITE"), &[]));
}

#[test]
fn never_created_permissions_have_no_manager() {
    let mut org = org();
    let kind = fails(
        &mut org,
        addr("anyone"),
        Call::Acl(AclCall::Grant {
            entity: addr("anyone").into(),
            app: addr("module"),
            role: role("WRITE"),
        }),
    );
    assert_eq!(kind, FailureKind::Denied);
    assert_eq!(
        org.kernel().acl().permission_manager(addr("module"), role("WRITE")),
        None
    );
}

#[test]
fn burned_permissions_reject_every_mutation() {
    let mut org = org();
    let module = addr("module");
    create(&mut org, addr("alice"), module, role("WRITE"), addr("manager"));
    ok(
        &mut org,
        addr("manager"),
        Call::Acl(AclCall::BurnManager {
            app: module,
            role: role("WRITE"),
        }),
    );
    assert_eq!(
        org.kernel().acl().permission_manager(module, role("WRITE")),
        Some(Manager::Frozen)
    );

    for call in mutations("manager") {
        assert_eq!(fails(&mut org, addr("manager"), call), FailureKind::Denied);
    }
    // Existing grants outlive the freeze.
    assert!(org.has_permission(addr("alice"), module, role("WRITE"), &[]));
}

#[test]
fn burned_at_creation_is_unusable_forever() {
    let mut org = org();
    let module = addr("module");
    ok(
        &mut org,
        addr("root"),
        Call::Acl(AclCall::CreateBurnedPermission {
            app: module,
            role: role("WRITE"),
        }),
    );
    assert!(!org.has_permission(addr("root"), module, role("WRITE"), &[]));

    let kind = fails(
        &mut org,
        addr("root"),
        Call::Acl(AclCall::CreatePermission {
            entity: addr("root").into(),
            app: module,
            role: role("WRITE"),
            manager: addr("root"),
        }),
    );
    assert_eq!(kind, FailureKind::InvalidConfig);
    for call in mutations("root") {
        assert_eq!(fails(&mut org, addr("root"), call), FailureKind::Denied);
    }
}
