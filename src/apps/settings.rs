//! Settings: a permissioned key/value store.
//!
//! `set` requires `SET_ROLE` checked against `[key, value]`, so a manager can
//! restrict both which keys an entity may touch and which values it may
//! write. The `v2` kind reads the same storage and adds `unset`.

use super::{arg, initialize_once, require_initialized};
use crate::host::{AppCode, AppContext, HostError};
use crate::types::{ArgValue, RoleId};

/// Role required by `set` and `unset`.
pub fn set_role() -> RoleId {
    RoleId::named("SET_ROLE")
}

/// Settings code, in one of two versions.
#[derive(Debug, Clone, Copy)]
pub struct Settings {
    version: u64,
}

impl Settings {
    /// `settings` kind.
    pub fn v1() -> Self {
        Self { version: 1 }
    }

    /// `settings_v2` kind.
    pub fn v2() -> Self {
        Self { version: 2 }
    }
}

fn slot(key: &ArgValue) -> String {
    format!("setting:{key}")
}

impl AppCode for Settings {
    fn kind(&self) -> &'static str {
        if self.version >= 2 {
            "settings_v2"
        } else {
            "settings"
        }
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
            "version" => Ok(Some(ArgValue::from(self.version))),
            "get" => {
                let key = arg(ctx, args, 0, "key")?;
                Ok(ctx.get(&slot(key)).cloned())
            }
            "set" => {
                require_initialized(ctx)?;
                let key = arg(ctx, args, 0, "key")?.clone();
                let value = arg(ctx, args, 1, "value")?.clone();
                ctx.authorize(set_role(), vec![key.clone(), value.clone()])?;
                ctx.set(slot(&key), value);
                Ok(None)
            }
            "unset" if self.version >= 2 => {
                require_initialized(ctx)?;
                let key = arg(ctx, args, 0, "key")?.clone();
                ctx.authorize(set_role(), vec![key.clone()])?;
                Ok(ctx.remove(&slot(&key)))
            }
            other => Err(ctx.fail(format!("unknown method {other:?}"))),
        }
    }
}
