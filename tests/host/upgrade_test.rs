//! Upgrades through the registry keep instance storage.

use orgkernel::apps::settings::set_role;
use orgkernel::error::FailureKind;
use orgkernel::host::{Call, KernelCall, Organization};
use orgkernel::kernel::app_bases_namespace;
use orgkernel::types::{Address, AppId, ArgValue};

use crate::common::{
    addr, call, create, deploy, enable_app_manager, fails, instance, ok, org, root, text,
};

fn settings_org(pinned: bool) -> (Organization, Address) {
    let mut org = org();
    enable_app_manager(&mut org);
    let v1 = deploy(&mut org, "settings");
    let settings = instance(&mut org, "settings", v1, pinned);
    create(&mut org, addr("alice"), settings, set_role(), root());
    ok(
        &mut org,
        addr("alice"),
        call(settings, "set", vec![text("color"), text("blue")]),
    );
    (org, settings)
}

fn upgrade(org: &mut Organization) {
    let v2 = deploy(org, "settings_v2");
    ok(
        org,
        root(),
        Call::Kernel(KernelCall::SetApp {
            namespace: app_bases_namespace(),
            app_id: AppId::named("settings"),
            address: v2,
        }),
    );
}

fn read(org: &mut Organization, settings: Address, method: &str, args: Vec<ArgValue>) -> Option<ArgValue> {
    ok(org, addr("reader"), call(settings, method, args)).output
}

#[test]
fn upgrade_switches_code_and_keeps_storage() {
    let (mut org, settings) = settings_org(false);
    assert_eq!(read(&mut org, settings, "version", vec![]), Some(ArgValue::from(1u64)));
    assert_eq!(
        fails(&mut org, addr("alice"), call(settings, "unset", vec![text("color")])),
        FailureKind::Execution
    );

    upgrade(&mut org);
    assert_eq!(read(&mut org, settings, "version", vec![]), Some(ArgValue::from(2u64)));
    assert_eq!(
        read(&mut org, settings, "get", vec![text("color")]),
        Some(text("blue"))
    );

    ok(&mut org, addr("alice"), call(settings, "unset", vec![text("color")]));
    assert_eq!(read(&mut org, settings, "get", vec![text("color")]), None);
}

#[test]
fn pinned_instances_ignore_upgrades() {
    let (mut org, settings) = settings_org(true);
    upgrade(&mut org);
    assert_eq!(read(&mut org, settings, "version", vec![]), Some(ArgValue::from(1u64)));
    assert_eq!(
        read(&mut org, settings, "get", vec![text("color")]),
        Some(text("blue"))
    );
}

#[test]
fn settings_enforce_set_role_per_key_and_value() {
    let (mut org, settings) = settings_org(false);
    assert_eq!(
        fails(&mut org, addr("bob"), call(settings, "set", vec![text("color"), text("red")])),
        FailureKind::Denied
    );

    let only_size = orgkernel::acl::predicate::Operand::Arg(0)
        .eq(orgkernel::types::Word::from_be_slice(b"size").expect("fits"));
    ok(
        &mut org,
        root(),
        Call::Acl(orgkernel::host::AclCall::GrantPredicate {
            entity: addr("bob").into(),
            app: settings,
            role: set_role(),
            predicate: only_size,
        }),
    );
    ok(&mut org, addr("bob"), call(settings, "set", vec![text("size"), ArgValue::from(3u64)]));
    assert_eq!(
        fails(&mut org, addr("bob"), call(settings, "set", vec![text("color"), text("red")])),
        FailureKind::Denied
    );
    assert_eq!(
        read(&mut org, settings, "get", vec![text("color")]),
        Some(text("blue"))
    );
}

#[test]
fn instances_initialize_once() {
    let (mut org, settings) = settings_org(false);
    assert_eq!(
        fails(&mut org, root(), call(settings, "initialize", vec![])),
        FailureKind::Execution
    );
}

#[test]
fn uninitialized_settings_refuse_writes() {
    let mut org = org();
    enable_app_manager(&mut org);
    let v1 = deploy(&mut org, "settings");
    let receipt = ok(
        &mut org,
        root(),
        Call::Kernel(KernelCall::NewAppInstance {
            app_id: AppId::named("settings"),
            base: v1,
            pinned: false,
            set_default: false,
            initialize: None,
        }),
    );
    let settings = crate::common::output_address(&receipt);
    create(&mut org, addr("alice"), settings, set_role(), root());
    assert_eq!(
        fails(&mut org, addr("alice"), call(settings, "set", vec![text("k"), text("v")])),
        FailureKind::Execution
    );
}
