//! Built-in module code: the kinds a fresh node can deploy.

pub mod allowlist;
pub mod forwarder;
pub mod settings;

use std::sync::Arc;

use crate::host::{AppContext, Catalog, HostError};
use crate::types::ArgValue;

/// Catalog with every built-in kind.
pub fn builtin_catalog() -> Catalog {
    Catalog::new()
        .with(Arc::new(settings::Settings::v1()))
        .with(Arc::new(settings::Settings::v2()))
        .with(Arc::new(allowlist::Allowlist))
        .with(Arc::new(forwarder::Forwarder))
}

/// Mark the instance initialized; a second call fails.
pub(crate) fn initialize_once(ctx: &mut AppContext<'_, '_>) -> Result<(), HostError> {
    if ctx.get("initialized").is_some() {
        return Err(ctx.fail("already initialized"));
    }
    let block = ctx.facts().block_number;
    ctx.set("initialized", ArgValue::from(block));
    Ok(())
}

/// Fail unless the instance was initialized.
pub(crate) fn require_initialized(ctx: &AppContext<'_, '_>) -> Result<(), HostError> {
    if ctx.get("initialized").is_none() {
        return Err(ctx.fail("not initialized"));
    }
    Ok(())
}

/// Argument `index`, or a module failure naming it.
pub(crate) fn arg<'a>(
    ctx: &AppContext<'_, '_>,
    args: &'a [ArgValue],
    index: usize,
    name: &str,
) -> Result<&'a ArgValue, HostError> {
    args.get(index)
        .ok_or_else(|| ctx.fail(format!("missing argument {index} ({name})")))
}
