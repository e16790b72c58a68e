//! Registry writes through the kernel.

use orgkernel::acl::store::Grantee;
use orgkernel::error::FailureKind;
use orgkernel::host::{AclCall, Call, KernelCall};
use orgkernel::kernel::{
    acl_app_id, app_addr_namespace, app_bases_namespace, app_manager_role, core_namespace,
    kernel_app_id, registry_args,
};
use orgkernel::types::{Address, AppId};

use crate::common::{acl, addr, enable_app_manager, fails, kernel, ok, org, root};

fn set_app(namespace: orgkernel::types::NamespaceId, app_id: AppId, address: Address) -> Call {
    Call::Kernel(KernelCall::SetApp {
        namespace,
        app_id,
        address,
    })
}

#[test]
fn genesis_registers_kernel_and_acl() {
    let org = org();
    assert_eq!(org.get_app(core_namespace(), kernel_app_id()), kernel(&org));
    assert_eq!(org.get_app(app_addr_namespace(), acl_app_id()), acl(&org));
    assert!(!org.get_app(app_bases_namespace(), kernel_app_id()).is_zero());
    assert!(!org.get_app(app_bases_namespace(), acl_app_id()).is_zero());
    assert!(org.get_app(app_addr_namespace(), AppId::named("finance")).is_zero());
}

#[test]
fn later_writes_overwrite_earlier_ones() {
    let mut org = org();
    enable_app_manager(&mut org);
    let id = AppId::named("finance");
    let (a, b) = (addr("finance-a"), addr("finance-b"));

    ok(&mut org, root(), set_app(app_addr_namespace(), id, a));
    ok(&mut org, root(), set_app(app_addr_namespace(), id, b));
    assert_eq!(org.get_app(app_addr_namespace(), id), b);

    // Same app id in another namespace is a different entry.
    assert!(org.get_app(app_bases_namespace(), id).is_zero());

    ok(&mut org, root(), set_app(app_addr_namespace(), id, Address::ZERO));
    assert!(org.get_app(app_addr_namespace(), id).is_zero());
}

#[test]
fn registry_writes_need_app_manager_role() {
    let mut org = org();
    let id = AppId::named("finance");
    assert_eq!(
        fails(&mut org, root(), set_app(app_addr_namespace(), id, addr("x"))),
        FailureKind::Denied
    );
    enable_app_manager(&mut org);
    assert_eq!(
        fails(&mut org, addr("mallory"), set_app(app_addr_namespace(), id, addr("x"))),
        FailureKind::Denied
    );
    assert!(org.get_app(app_addr_namespace(), id).is_zero());
}

#[test]
fn app_manager_role_can_be_scoped_to_one_key() {
    let mut org = org();
    enable_app_manager(&mut org);
    let kernel = kernel(&org);
    let finance = AppId::named("finance");
    let args = registry_args(app_addr_namespace(), finance);
    let predicate = orgkernel::acl::predicate::Operand::Arg(0)
        .eq(args[0].as_number().expect("namespace word"))
        .and(orgkernel::acl::predicate::Operand::Arg(1).eq(args[1].as_number().expect("id word")));
    ok(
        &mut org,
        root(),
        Call::Acl(AclCall::GrantPredicate {
            entity: Grantee::Entity(addr("ops")),
            app: kernel,
            role: app_manager_role(),
            predicate,
        }),
    );

    ok(&mut org, addr("ops"), set_app(app_addr_namespace(), finance, addr("f")));
    assert_eq!(
        fails(
            &mut org,
            addr("ops"),
            set_app(app_addr_namespace(), AppId::named("payroll"), addr("p"))
        ),
        FailureKind::Denied
    );
    assert_eq!(
        fails(&mut org, addr("ops"), set_app(app_bases_namespace(), finance, addr("f"))),
        FailureKind::Denied
    );
}

#[test]
fn kernel_and_acl_entries_cannot_be_relocated() {
    let mut org = org();
    enable_app_manager(&mut org);
    let (kernel, acl) = (kernel(&org), acl(&org));

    let kind = fails(&mut org, root(), set_app(core_namespace(), kernel_app_id(), addr("evil")));
    assert_eq!(kind, FailureKind::InvalidConfig);
    let kind = fails(&mut org, root(), set_app(app_addr_namespace(), acl_app_id(), addr("evil")));
    assert_eq!(kind, FailureKind::InvalidConfig);

    // Rewriting the same value is allowed.
    ok(&mut org, root(), set_app(core_namespace(), kernel_app_id(), kernel));
    assert_eq!(org.get_app(core_namespace(), kernel_app_id()), kernel);
    assert_eq!(org.get_app(app_addr_namespace(), acl_app_id()), acl);
}

#[test]
fn recovery_vault_follows_its_app_id() {
    let mut org = org();
    enable_app_manager(&mut org);
    let treasury = AppId::named("treasury");
    ok(&mut org, root(), set_app(app_addr_namespace(), treasury, addr("treasury")));
    assert!(org.kernel().recovery_vault().is_zero());

    ok(
        &mut org,
        root(),
        Call::Kernel(KernelCall::SetRecoveryVaultAppId { app_id: treasury }),
    );
    assert_eq!(org.kernel().recovery_vault_app_id(), treasury);
    assert_eq!(org.kernel().recovery_vault(), addr("treasury"));

    assert_eq!(
        fails(
            &mut org,
            addr("mallory"),
            Call::Kernel(KernelCall::SetRecoveryVaultAppId {
                app_id: AppId::named("vault")
            })
        ),
        FailureKind::Denied
    );
}
