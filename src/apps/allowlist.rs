//! Allowlist oracle.
//!
//! Answers oracle params with "is the caller on the list". Entities not on
//! the list may still pass if they hold `ALLOWED_ROLE` on the allowlist
//! itself; that check re-enters the ACL one oracle level deeper.

use super::{arg, initialize_once};
use crate::acl::eval::OracleRequest;
use crate::host::{AppCode, AppContext, HostError, OracleContext};
use crate::types::{Address, ArgValue, RoleId};

/// Role required to edit the list.
pub fn manage_role() -> RoleId {
    RoleId::named("MANAGE_ALLOWLIST_ROLE")
}

/// Role that admits an entity without a list entry.
pub fn allowed_role() -> RoleId {
    RoleId::named("ALLOWED_ROLE")
}

/// The allowlist code kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct Allowlist;

fn entry(who: Address) -> String {
    format!("allow:{who}")
}

fn address_arg(ctx: &AppContext<'_, '_>, args: &[ArgValue]) -> Result<Address, HostError> {
    match arg(ctx, args, 0, "entity")? {
        ArgValue::Address(a) => Ok(*a),
        other => Err(ctx.fail(format!("expected an address, got {other}"))),
    }
}

impl AppCode for Allowlist {
    fn kind(&self) -> &'static str {
        "allowlist"
    }

    fn call(
        &self,
        ctx: &mut AppContext<'_, '_>,
        method: &str,
        args: &[ArgValue],
    ) -> Result<Option<ArgValue>, HostError> {
        match method {
            "initialize" => {
                initialize_once(ctx)?;
                Ok(None)
            }
            "allow" | "remove" => {
                let who = address_arg(ctx, args)?;
                ctx.authorize(manage_role(), vec![who.into()])?;
                if method == "allow" {
                    ctx.set(entry(who), ArgValue::Bool(true));
                } else {
                    ctx.remove(&entry(who));
                }
                Ok(None)
            }
            "contains" => {
                let who = address_arg(ctx, args)?;
                Ok(Some(ArgValue::Bool(ctx.get(&entry(who)).is_some())))
            }
            other => Err(ctx.fail(format!("unknown method {other:?}"))),
        }
    }

    fn can_perform(
        &self,
        ctx: &OracleContext<'_>,
        request: &OracleRequest<'_>,
    ) -> Result<bool, String> {
        if ctx.get(&entry(request.who)).is_some() {
            return Ok(true);
        }
        Ok(ctx.has_permission(request.who, ctx.this(), allowed_role(), request.args))
    }
}
