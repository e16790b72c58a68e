//! Forwarder: executes a call on another module with itself as caller.
//!
//! `execute` is non-reentrant. A forwarder that ends up calling back into its
//! own `execute` fails and the whole invocation rolls back.

use super::arg;
use crate::host::{AppCode, AppContext, Call, HostError};
use crate::types::{ArgValue, RoleId};

/// Role required by `execute`, checked against `[target]`.
pub fn execute_role() -> RoleId {
    RoleId::named("EXECUTE_ROLE")
}

/// The forwarder code kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct Forwarder;

impl AppCode for Forwarder {
    fn kind(&self) -> &'static str {
        "forwarder"
    }

    fn call(
        &self,
        ctx: &mut AppContext<'_, '_>,
        method: &str,
        args: &[ArgValue],
    ) -> Result<Option<ArgValue>, HostError> {
        if method != "execute" {
            return Err(ctx.fail(format!("unknown method {method:?}")));
        }
        let target = match arg(ctx, args, 0, "target")? {
            ArgValue::Address(a) => *a,
            other => return Err(ctx.fail(format!("target must be an address, got {other}"))),
        };
        let inner = match arg(ctx, args, 1, "method")? {
            ArgValue::Bytes(b) => String::from_utf8(b.clone())
                .map_err(|_| ctx.fail("method name is not UTF-8"))?,
            other => return Err(ctx.fail(format!("method must be bytes, got {other}"))),
        };
        ctx.authorize(execute_role(), vec![target.into()])?;
        ctx.call(Call::App {
            target,
            method: inner,
            args: args.get(2..).unwrap_or_default().to_vec(),
        })
    }

    fn non_reentrant(&self, method: &str) -> bool {
        method == "execute"
    }
}
