//! App proxies: a stable instance address in front of swappable code.
//!
//! Storage lives at the proxy address. An upgradeable proxy looks up its
//! implementation in the `APP_BASES` namespace on every call; a pinned proxy
//! uses the implementation it was created with.

use serde::{Deserialize, Serialize};

use super::registry::{app_bases_namespace, RegistryRead};
use crate::types::{Address, AppId};

/// How a proxy finds its implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProxyKind {
    /// Resolved through the registry per call.
    Upgradeable,
    /// Fixed at creation.
    Pinned(Address),
}

/// A live app instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppProxy {
    /// App id the instance forwards for.
    pub app_id: AppId,
    /// Resolution strategy.
    pub kind: ProxyKind,
}

impl AppProxy {
    /// An instance that follows upgrades of `app_id`.
    pub fn upgradeable(app_id: AppId) -> Self {
        Self {
            app_id,
            kind: ProxyKind::Upgradeable,
        }
    }

    /// An instance pinned to `implementation`.
    pub fn pinned(app_id: AppId, implementation: Address) -> Self {
        Self {
            app_id,
            kind: ProxyKind::Pinned(implementation),
        }
    }

    /// Whether this instance follows upgrades.
    pub fn is_upgradeable(&self) -> bool {
        matches!(self.kind, ProxyKind::Upgradeable)
    }

    /// Current implementation; the null address if none is registered.
    pub fn implementation(&self, registry: &dyn RegistryRead) -> Address {
        match self.kind {
            ProxyKind::Upgradeable => registry.get_app(app_bases_namespace(), self.app_id),
            ProxyKind::Pinned(addr) => addr,
        }
    }
}
