//! Forwarder calls and the re-entrancy guard.

use orgkernel::apps::forwarder::execute_role;
use orgkernel::apps::settings::set_role;
use orgkernel::error::FailureKind;
use orgkernel::host::{HostError, Organization};
use orgkernel::types::{Address, ArgValue};

use crate::common::{
    addr, call, create, deploy, enable_app_manager, fails, instance, ok, org, root, text,
};

fn fixture() -> (Organization, Address, Address) {
    let mut org = org();
    enable_app_manager(&mut org);
    let fwd_base = deploy(&mut org, "forwarder");
    let forwarder = instance(&mut org, "forwarder", fwd_base, false);
    let settings_base = deploy(&mut org, "settings");
    let settings = instance(&mut org, "settings", settings_base, false);

    create(&mut org, addr("alice"), forwarder, execute_role(), root());
    create(&mut org, forwarder, settings, set_role(), root());
    (org, forwarder, settings)
}

fn forward(target: Address, method: &str, mut rest: Vec<ArgValue>) -> Vec<ArgValue> {
    let mut args = vec![target.into(), text(method)];
    args.append(&mut rest);
    args
}

#[test]
fn forwarder_acts_with_its_own_identity() {
    let (mut org, forwarder, settings) = fixture();
    assert_eq!(
        fails(&mut org, addr("alice"), call(settings, "set", vec![text("k"), text("v")])),
        FailureKind::Denied
    );
    ok(
        &mut org,
        addr("alice"),
        call(
            forwarder,
            "execute",
            forward(settings, "set", vec![text("k"), text("v")]),
        ),
    );
    let got = ok(&mut org, addr("x"), call(settings, "get", vec![text("k")])).output;
    assert_eq!(got, Some(text("v")));
}

#[test]
fn forwarding_needs_execute_role() {
    let (mut org, forwarder, settings) = fixture();
    let kind = fails(
        &mut org,
        addr("bob"),
        call(
            forwarder,
            "execute",
            forward(settings, "set", vec![text("k"), text("v")]),
        ),
    );
    assert_eq!(kind, FailureKind::Denied);
}

#[test]
fn re_entering_execute_is_rejected_and_rolled_back() {
    let (mut org, forwarder, settings) = fixture();
    let before = org.snapshot();

    let inner = forward(settings, "set", vec![text("k"), text("v")]);
    let err = org
        .invoke(
            addr("alice"),
            call(forwarder, "execute", forward(forwarder, "execute", inner)),
        )
        .expect_err("re-entry");
    assert!(matches!(err, HostError::Reentrancy { target, .. } if target == forwarder));
    assert_eq!(err.kind(), FailureKind::Execution);
    assert_eq!(org.snapshot(), before);
}

#[test]
fn guard_is_released_after_each_call() {
    let (mut org, forwarder, settings) = fixture();
    for value in ["one", "two"] {
        ok(
            &mut org,
            addr("alice"),
            call(
                forwarder,
                "execute",
                forward(settings, "set", vec![text("k"), text(value)]),
            ),
        );
    }
    let got = ok(&mut org, addr("x"), call(settings, "get", vec![text("k")])).output;
    assert_eq!(got, Some(text("two")));
}
