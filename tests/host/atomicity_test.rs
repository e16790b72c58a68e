//! All-or-nothing invocations and host limits.

use std::sync::Arc;

use orgkernel::apps::builtin_catalog;
use orgkernel::error::FailureKind;
use orgkernel::host::{AppCode, AppContext, Call, HostError, KernelCall, Organization};
use orgkernel::kernel::app_bases_namespace;
use orgkernel::types::{AppId, ArgValue};

use crate::common::{addr, call, enable_app_manager, fails, ok, root};

/// Test module that writes storage and fails on request.
struct Scratch;

impl AppCode for Scratch {
    fn kind(&self) -> &'static str {
        "scratch"
    }

    fn call(
        &self,
        ctx: &mut AppContext<'_, '_>,
        method: &str,
        args: &[ArgValue],
    ) -> Result<Option<ArgValue>, HostError> {
        match method {
            "initialize" => {
                ctx.set("initialized", ArgValue::Bool(true));
                match args.first() {
                    Some(ArgValue::Bool(true)) => Err(ctx.fail("refusing to initialize")),
                    _ => Ok(None),
                }
            }
            "write" => {
                ctx.set("written", ArgValue::Bool(true));
                Ok(None)
            }
            "write_then_fail" => {
                ctx.set("doomed", ArgValue::Bool(true));
                Err(ctx.fail("boom"))
            }
            "swallow" => {
                ctx.set("outer", ArgValue::Bool(true));
                let this = ctx.this();
                let inner = ctx.call(call(this, "write_then_fail", vec![]));
                Ok(Some(ArgValue::Bool(inner.is_err())))
            }
            "recurse" => {
                let this = ctx.this();
                ctx.call(call(this, "recurse", vec![]))
            }
            other => Err(ctx.fail(format!("unknown method {other}"))),
        }
    }
}

fn scratch_org() -> (Organization, orgkernel::types::Address) {
    let catalog = builtin_catalog().with(Arc::new(Scratch));
    let mut org = Organization::bootstrap(root(), Arc::new(catalog)).expect("bootstrap");
    enable_app_manager(&mut org);
    let base = crate::common::deploy(&mut org, "scratch");
    let instance = crate::common::instance(&mut org, "scratch", base, false);
    (org, instance)
}

#[test]
fn failed_invocations_leave_no_trace() {
    let (mut org, scratch) = scratch_org();
    let before = org.snapshot();
    let kind = fails(&mut org, addr("alice"), call(scratch, "write_then_fail", vec![]));
    assert_eq!(kind, FailureKind::Execution);
    assert_eq!(org.snapshot(), before);
}

#[test]
fn nested_failure_rolls_back_only_its_frame() {
    let (mut org, scratch) = scratch_org();
    let receipt = ok(&mut org, addr("alice"), call(scratch, "swallow", vec![]));
    assert_eq!(receipt.output, Some(ArgValue::Bool(true)));

    let storage = org.storage(scratch).expect("storage");
    assert_eq!(storage.get("outer"), Some(&ArgValue::Bool(true)));
    assert!(storage.get("doomed").is_none());
}

#[test]
fn failing_initializer_undoes_instance_creation() {
    let catalog = builtin_catalog().with(Arc::new(Scratch));
    let mut org = Organization::bootstrap(root(), Arc::new(catalog)).expect("bootstrap");
    enable_app_manager(&mut org);
    let base = crate::common::deploy(&mut org, "scratch");
    let nonce = org.kernel().nonce();

    let kind = fails(
        &mut org,
        root(),
        Call::Kernel(KernelCall::NewAppInstance {
            app_id: AppId::named("scratch"),
            base,
            pinned: false,
            set_default: true,
            initialize: Some(vec![ArgValue::Bool(true)]),
        }),
    );
    assert_eq!(kind, FailureKind::Execution);
    assert_eq!(org.kernel().nonce(), nonce);
    assert!(org
        .get_app(app_bases_namespace(), AppId::named("scratch"))
        .is_zero());
}

#[test]
fn unbounded_recursion_hits_the_depth_limit() {
    let (mut org, scratch) = scratch_org();
    let before = org.snapshot();
    let err = org
        .invoke(addr("alice"), call(scratch, "recurse", vec![]))
        .expect_err("must stop");
    assert!(matches!(err, HostError::CallDepthExceeded { max } if max == org.limits().max_call_depth));
    assert_eq!(org.snapshot(), before);
}

#[test]
fn calling_an_address_without_code_fails() {
    let (mut org, _) = scratch_org();
    let kind = fails(&mut org, addr("alice"), call(addr("nobody"), "write", vec![]));
    assert_eq!(kind, FailureKind::Execution);
}

#[test]
fn committed_receipts_carry_events_in_order() {
    let (mut org, scratch) = scratch_org();
    let receipt = ok(&mut org, addr("alice"), call(scratch, "write", vec![]));
    assert!(receipt.events.is_empty());
    assert_eq!(receipt.caller, addr("alice"));

    let acl = org.kernel().acl().address();
    let receipt = ok(
        &mut org,
        root(),
        Call::Acl(orgkernel::host::AclCall::CreatePermission {
            entity: addr("alice").into(),
            app: scratch,
            role: orgkernel::types::RoleId::named("WRITE"),
            manager: root(),
        }),
    );
    let names: Vec<&str> = receipt.events.iter().map(|e| e.name()).collect();
    assert_eq!(names, ["set_permission", "change_permission_manager"]);
    assert_ne!(acl, scratch);
}
