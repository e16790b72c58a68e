//! Grant, revoke and query behavior of the permission store.

use orgkernel::acl::store::Grantee;
use orgkernel::error::FailureKind;
use orgkernel::host::{AclCall, Call};
use orgkernel::types::ArgValue;

use crate::common::{acl, addr, create, fails, ok, org, role};

fn arg_vectors() -> Vec<Vec<ArgValue>> {
    vec![
        vec![],
        vec![ArgValue::from(0u64)],
        vec![ArgValue::from(u64::MAX), ArgValue::Bool(true)],
        vec![addr("someone").into(), ArgValue::Bytes(vec![1, 2, 3])],
    ]
}

#[test]
fn no_permission_means_no_access() {
    let org = org();
    let module = addr("module");
    for who in [addr("alice"), addr("root"), addr("module")] {
        for r in ["WRITE", "READ", "CREATE_PERMISSIONS_ROLE"] {
            for args in arg_vectors() {
                assert!(!org.has_permission(who, module, role(r), &args));
            }
        }
    }
}

#[test]
fn unconditional_grant_holds_for_every_argument_vector() {
    let mut org = org();
    let module = addr("module");
    create(&mut org, addr("alice"), module, role("WRITE"), addr("manager"));
    for args in arg_vectors() {
        assert!(org.has_permission(addr("alice"), module, role("WRITE"), &args));
        assert!(!org.has_permission(addr("bob"), module, role("WRITE"), &args));
    }
}

#[test]
fn revocation_is_effective_and_reversible() {
    let mut org = org();
    let (module, manager, alice) = (addr("module"), addr("manager"), addr("alice"));
    create(&mut org, alice, module, role("WRITE"), manager);

    ok(
        &mut org,
        manager,
        Call::Acl(AclCall::Revoke {
            entity: alice.into(),
            app: module,
            role: role("WRITE"),
        }),
    );
    assert!(!org.has_permission(alice, module, role("WRITE"), &[]));

    ok(
        &mut org,
        manager,
        Call::Acl(AclCall::Grant {
            entity: alice.into(),
            app: module,
            role: role("WRITE"),
        }),
    );
    assert!(org.has_permission(alice, module, role("WRITE"), &[]));
}

#[test]
fn anyone_grant_covers_every_caller() {
    let mut org = org();
    let (module, manager) = (addr("module"), addr("manager"));
    create(&mut org, addr("alice"), module, role("READ"), manager);
    ok(
        &mut org,
        manager,
        Call::Acl(AclCall::Grant {
            entity: Grantee::Anyone,
            app: module,
            role: role("READ"),
        }),
    );
    for who in ["bob", "carol", "mallory"] {
        assert!(org.has_permission(addr(who), module, role("READ"), &[]));
    }
    assert!(!org.has_permission(addr("bob"), module, role("WRITE"), &[]));
}

#[test]
fn revoking_a_missing_grant_is_a_logic_error() {
    let mut org = org();
    let (module, manager) = (addr("module"), addr("manager"));
    create(&mut org, addr("alice"), module, role("WRITE"), manager);
    let kind = fails(
        &mut org,
        manager,
        Call::Acl(AclCall::Revoke {
            entity: addr("bob").into(),
            app: module,
            role: role("WRITE"),
        }),
    );
    assert_eq!(kind, FailureKind::InvalidConfig);
}

#[test]
fn permissions_are_created_once() {
    let mut org = org();
    let module = addr("module");
    create(&mut org, addr("alice"), module, role("WRITE"), addr("manager"));
    let kind = fails(
        &mut org,
        addr("root"),
        Call::Acl(AclCall::CreatePermission {
            entity: addr("bob").into(),
            app: module,
            role: role("WRITE"),
            manager: addr("bob"),
        }),
    );
    assert_eq!(kind, FailureKind::InvalidConfig);
    assert!(!org.has_permission(addr("bob"), module, role("WRITE"), &[]));
}

#[test]
fn only_holders_of_create_permissions_role_create() {
    let mut org = org();
    let create_call = Call::Acl(AclCall::CreatePermission {
        entity: addr("alice").into(),
        app: addr("module"),
        role: role("WRITE"),
        manager: addr("alice"),
    });
    assert_eq!(
        fails(&mut org, addr("alice"), create_call.clone()),
        FailureKind::Denied
    );

    let acl = acl(&org);
    ok(
        &mut org,
        addr("root"),
        Call::Acl(AclCall::Grant {
            entity: addr("alice").into(),
            app: acl,
            role: orgkernel::acl::create_permissions_role(),
        }),
    );
    ok(&mut org, addr("alice"), create_call);
    assert!(org.has_permission(addr("alice"), addr("module"), role("WRITE"), &[]));
}

#[test]
fn null_manager_and_null_grantee_are_rejected() {
    let mut org = org();
    let module = addr("module");
    let kind = fails(
        &mut org,
        addr("root"),
        Call::Acl(AclCall::CreatePermission {
            entity: addr("alice").into(),
            app: module,
            role: role("WRITE"),
            manager: orgkernel::types::Address::ZERO,
        }),
    );
    assert_eq!(kind, FailureKind::InvalidConfig);

    create(&mut org, addr("alice"), module, role("WRITE"), addr("manager"));
    let kind = fails(
        &mut org,
        addr("manager"),
        Call::Acl(AclCall::Grant {
            entity: orgkernel::types::Address::ZERO.into(),
            app: module,
            role: role("WRITE"),
        }),
    );
    assert_eq!(kind, FailureKind::InvalidConfig);
}

#[test]
fn write_permission_scenario() {
    let mut org = org();
    let (module_x, m, e, f) = (addr("moduleX"), addr("M"), addr("E"), addr("F"));
    create(&mut org, e, module_x, role("WRITE"), m);

    assert!(org.has_permission(e, module_x, role("WRITE"), &[]));
    assert!(!org.has_permission(f, module_x, role("WRITE"), &[]));

    ok(
        &mut org,
        m,
        Call::Acl(AclCall::Revoke {
            entity: e.into(),
            app: module_x,
            role: role("WRITE"),
        }),
    );
    assert!(!org.has_permission(e, module_x, role("WRITE"), &[]));

    let before = org.snapshot();
    let kind = fails(
        &mut org,
        f,
        Call::Acl(AclCall::Grant {
            entity: f.into(),
            app: module_x,
            role: role("WRITE"),
        }),
    );
    assert_eq!(kind, FailureKind::Denied);
    assert_eq!(org.snapshot(), before);
    assert!(!org.has_permission(f, module_x, role("WRITE"), &[]));
}
