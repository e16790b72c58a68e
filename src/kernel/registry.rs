//! Namespaced app registry: `(namespace, app id) → address`.
//!
//! Exactly one address per key; writes overwrite in place and return the
//! previous value. Reads never fail: an unset key reads as the null address.

use std::collections::BTreeMap;

use crate::types::{Address, AppId, NamespaceId};

/// Namespace holding core singletons (the kernel's own entry).
pub fn core_namespace() -> NamespaceId {
    NamespaceId::named("core")
}

/// Namespace holding the base implementation per app id.
pub fn app_bases_namespace() -> NamespaceId {
    NamespaceId::named("base")
}

/// Namespace holding the default live instance per app id.
pub fn app_addr_namespace() -> NamespaceId {
    NamespaceId::named("app")
}

/// Resolve a namespace by its short name (`core`, `base`, `app`).
pub fn namespace_by_name(name: &str) -> Option<NamespaceId> {
    match name {
        "core" => Some(core_namespace()),
        "base" | "app_bases" => Some(app_bases_namespace()),
        "app" | "app_addr" => Some(app_addr_namespace()),
        _ => None,
    }
}

/// Read-only registry access, as consumed by proxies.
pub trait RegistryRead {
    /// Address registered at `(namespace, app_id)`, or the null address.
    fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Address;
}

/// The registry map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceRegistry {
    entries: BTreeMap<(NamespaceId, AppId), Address>,
}

impl NamespaceRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Write an entry and return the previous address (null if unset).
    ///
    /// Writing the null address deregisters the key.
    pub fn set(&mut self, namespace: NamespaceId, app_id: AppId, address: Address) -> Address {
        let previous = if address.is_zero() {
            self.entries.remove(&(namespace, app_id))
        } else {
            self.entries.insert((namespace, app_id), address)
        };
        previous.unwrap_or(Address::ZERO)
    }

    /// All registered entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (NamespaceId, AppId, Address)> + '_ {
        self.entries.iter().map(|((ns, id), addr)| (*ns, *id, *addr))
    }

    /// Number of registered keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl RegistryRead for NamespaceRegistry {
    fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Address {
        self.entries
            .get(&(namespace, app_id))
            .copied()
            .unwrap_or(Address::ZERO)
    }
}
