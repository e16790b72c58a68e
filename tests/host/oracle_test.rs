//! Oracle predicates and their re-entrant checks.

use orgkernel::acl::predicate::Predicate;
use orgkernel::acl::store::Grantee;
use orgkernel::apps::allowlist::{allowed_role, manage_role};
use orgkernel::apps::settings::set_role;
use orgkernel::error::FailureKind;
use orgkernel::host::{AclCall, Call, Organization};
use orgkernel::types::Address;

use crate::common::{
    addr, call, create, deploy, enable_app_manager, fails, instance, ok, org, root, text,
};

struct Fixture {
    org: Organization,
    allowlist: Address,
    settings: Address,
}

/// Settings whose `SET_ROLE` is open to anyone the allowlist approves.
fn fixture() -> Fixture {
    let mut org = org();
    enable_app_manager(&mut org);
    let list_base = deploy(&mut org, "allowlist");
    let allowlist = instance(&mut org, "allowlist", list_base, false);
    let settings_base = deploy(&mut org, "settings");
    let settings = instance(&mut org, "settings", settings_base, false);

    create(&mut org, root(), allowlist, manage_role(), root());
    create(&mut org, root(), settings, set_role(), root());
    ok(
        &mut org,
        root(),
        Call::Acl(AclCall::GrantPredicate {
            entity: Grantee::Anyone,
            app: settings,
            role: set_role(),
            predicate: Predicate::Oracle(allowlist),
        }),
    );
    ok(&mut org, root(), call(allowlist, "allow", vec![addr("alice").into()]));
    Fixture {
        org,
        allowlist,
        settings,
    }
}

fn set(who: &str, settings: Address) -> (Address, Call) {
    (addr(who), call(settings, "set", vec![text("k"), text(who)]))
}

#[test]
fn listed_entities_pass_the_oracle() {
    let Fixture {
        mut org,
        allowlist,
        settings,
    } = fixture();
    let (alice, set_alice) = set("alice", settings);
    ok(&mut org, alice, set_alice);

    let (bob, set_bob) = set("bob", settings);
    assert_eq!(fails(&mut org, bob, set_bob.clone()), FailureKind::Denied);

    ok(&mut org, root(), call(allowlist, "allow", vec![bob.into()]));
    ok(&mut org, bob, set_bob.clone());

    ok(&mut org, root(), call(allowlist, "remove", vec![bob.into()]));
    assert_eq!(fails(&mut org, bob, set_bob), FailureKind::Denied);
}

#[test]
fn oracle_falls_back_to_a_nested_permission_check() {
    let Fixture {
        mut org,
        allowlist,
        settings,
    } = fixture();
    create(&mut org, addr("carol"), allowlist, allowed_role(), root());
    assert!(org.has_permission(addr("carol"), settings, set_role(), &[text("k"), text("v")]));
    assert!(!org.has_permission(addr("dave"), settings, set_role(), &[]));
}

#[test]
fn self_referential_oracles_stop_at_the_depth_bound() {
    let Fixture {
        mut org,
        allowlist,
        settings,
    } = fixture();
    create(&mut org, root(), allowlist, allowed_role(), root());
    ok(
        &mut org,
        root(),
        Call::Acl(AclCall::GrantPredicate {
            entity: Grantee::Anyone,
            app: allowlist,
            role: allowed_role(),
            predicate: Predicate::Oracle(allowlist),
        }),
    );

    // dave is not listed: every level asks the allowlist again until the
    // oracle depth runs out, which denies.
    assert!(!org.has_permission(addr("dave"), settings, set_role(), &[]));
    assert!(org.has_permission(addr("alice"), settings, set_role(), &[]));
    assert!(org.check(addr("dave"), settings, set_role(), &[]).is_ok());
}

#[test]
fn modules_that_are_not_oracles_deny() {
    let Fixture {
        mut org, settings, ..
    } = fixture();
    let module = addr("module");
    create(&mut org, root(), module, set_role(), root());
    ok(
        &mut org,
        root(),
        Call::Acl(AclCall::GrantPredicate {
            entity: addr("alice").into(),
            app: module,
            role: set_role(),
            predicate: Predicate::Oracle(settings),
        }),
    );
    assert!(!org.has_permission(addr("alice"), module, set_role(), &[]));
    assert!(org.check(addr("alice"), module, set_role(), &[]).is_err());
}

#[test]
fn list_edits_need_the_manage_role() {
    let Fixture {
        mut org, allowlist, ..
    } = fixture();
    assert_eq!(
        fails(&mut org, addr("alice"), call(allowlist, "allow", vec![addr("eve").into()])),
        FailureKind::Denied
    );
    let receipt = ok(&mut org, addr("x"), call(allowlist, "contains", vec![addr("eve").into()]));
    assert_eq!(receipt.output, Some(false.into()));
}
