//! The kernel: owner of the registry and the ACL.
//!
//! Every registry write needs an [`Authorization`] for `APP_MANAGER_ROLE` on
//! the kernel, issued by the kernel's own ACL for the exact
//! `[namespace, app id]` arguments being written. The kernel registers itself
//! in the core namespace at genesis so it can be discovered like any app.

use thiserror::Error;
use tracing::{debug, info};

use super::proxy::AppProxy;
use super::registry::{
    app_addr_namespace, app_bases_namespace, core_namespace, NamespaceRegistry, RegistryRead,
};
use crate::acl::eval::EvalEnv;
use crate::acl::{Acl, AclError, Authorization};
use crate::audit::Event;
use crate::error::FailureKind;
use crate::types::{Address, AppId, ArgValue, NamespaceId, RoleId};

/// App id of the kernel.
pub fn kernel_app_id() -> AppId {
    AppId::named("kernel")
}

/// App id of the ACL.
pub fn acl_app_id() -> AppId {
    AppId::named("acl")
}

/// App id the recovery vault uses until changed.
pub fn default_vault_app_id() -> AppId {
    AppId::named("vault")
}

/// Role on the kernel that allows registry writes and instance creation.
pub fn app_manager_role() -> RoleId {
    RoleId::named("APP_MANAGER_ROLE")
}

/// Arguments `APP_MANAGER_ROLE` is checked against for a registry write.
pub fn registry_args(namespace: NamespaceId, app_id: AppId) -> Vec<ArgValue> {
    vec![namespace.into(), app_id.into()]
}

/// Errors from kernel operations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KernelError {
    /// Authorization or permission failure from the ACL.
    #[error(transparent)]
    Acl(#[from] AclError),

    /// The proof was issued for different registry arguments.
    #[error("authorization arguments do not match the registry key being written")]
    ArgumentMismatch,

    /// `new_app_instance` with a base that differs from the registered one.
    #[error("app {app_id} already has base {existing}, refusing {requested}")]
    InvalidAppChange {
        /// App id.
        app_id: AppId,
        /// Registered base.
        existing: Address,
        /// Requested base.
        requested: Address,
    },

    /// Attempt to relocate the kernel's or the ACL's own entry.
    #[error("registry entry {namespace}/{app_id} is fixed at genesis")]
    ReservedEntry {
        /// Namespace.
        namespace: NamespaceId,
        /// App id.
        app_id: AppId,
    },

    /// A null base implementation.
    #[error("app base cannot be the null address")]
    NullBase,

    /// The derived-address nonce is exhausted.
    #[error("instance nonce exhausted")]
    NonceExhausted,
}

impl KernelError {
    /// Failure class of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Acl(e) => e.kind(),
            Self::ArgumentMismatch => FailureKind::Denied,
            Self::InvalidAppChange { .. }
            | Self::ReservedEntry { .. }
            | Self::NullBase
            | Self::NonceExhausted => FailureKind::InvalidConfig,
        }
    }
}

/// Addresses and bootstrap identity of a new organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Genesis {
    /// Kernel instance address.
    pub kernel: Address,
    /// Kernel implementation marker.
    pub kernel_base: Address,
    /// ACL instance address.
    pub acl: Address,
    /// ACL implementation marker.
    pub acl_base: Address,
    /// Identity seeded with `CREATE_PERMISSIONS_ROLE`.
    pub root: Address,
    /// Cap on params per predicate.
    pub max_params: usize,
}

impl Genesis {
    /// Genesis with addresses derived from `root`.
    pub fn for_root(root: Address, max_params: usize) -> Self {
        let kernel = Address::derive(root, 0);
        Self {
            kernel,
            kernel_base: Address::derive(root, 1),
            acl: Address::derive(kernel, 0),
            acl_base: Address::derive(root, 2),
            root,
            max_params,
        }
    }
}

/// Kernel state.
#[derive(Debug, Clone)]
pub struct Kernel {
    address: Address,
    registry: NamespaceRegistry,
    acl: Acl,
    recovery_vault_app_id: AppId,
    nonce: u64,
}

impl Kernel {
    /// Create and bootstrap an organization's kernel and ACL.
    ///
    /// # Errors
    ///
    /// Fails if the root is the null address.
    pub fn genesis(genesis: &Genesis) -> Result<(Self, Vec<Event>), KernelError> {
        let mut kernel = Self {
            address: genesis.kernel,
            registry: NamespaceRegistry::new(),
            acl: Acl::new(genesis.acl, genesis.max_params),
            recovery_vault_app_id: default_vault_app_id(),
            // Nonce 0 derived the ACL address.
            nonce: 1,
        };
        let mut events = Vec::new();
        for (namespace, app_id, address) in [
            (core_namespace(), kernel_app_id(), genesis.kernel),
            (app_bases_namespace(), kernel_app_id(), genesis.kernel_base),
            (app_bases_namespace(), acl_app_id(), genesis.acl_base),
            (app_addr_namespace(), acl_app_id(), genesis.acl),
        ] {
            events.push(kernel.write(namespace, app_id, address));
        }
        events.extend(kernel.acl.initialize(genesis.root)?);
        info!(kernel = %genesis.kernel, acl = %genesis.acl, root = %genesis.root, "kernel genesis");
        Ok((kernel, events))
    }

    /// Rebuild a kernel from persisted parts.
    pub fn from_parts(
        address: Address,
        registry: NamespaceRegistry,
        acl: Acl,
        recovery_vault_app_id: AppId,
        nonce: u64,
    ) -> Self {
        Self {
            address,
            registry,
            acl,
            recovery_vault_app_id,
            nonce,
        }
    }

    /// Kernel instance address.
    pub fn address(&self) -> Address {
        self.address
    }

    /// The registry.
    pub fn registry(&self) -> &NamespaceRegistry {
        &self.registry
    }

    /// The ACL.
    pub fn acl(&self) -> &Acl {
        &self.acl
    }

    /// Mutable ACL, for dispatching ACL calls.
    pub fn acl_mut(&mut self) -> &mut Acl {
        &mut self.acl
    }

    /// Instances created so far (plus the ACL).
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// App id the recovery vault is registered under.
    pub fn recovery_vault_app_id(&self) -> AppId {
        self.recovery_vault_app_id
    }

    /// Default instance of the recovery vault app, or null.
    pub fn recovery_vault(&self) -> Address {
        self.registry
            .get_app(app_addr_namespace(), self.recovery_vault_app_id)
    }

    /// Registry read.
    pub fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Address {
        self.registry.get_app(namespace, app_id)
    }

    /// Permission query, delegated to the ACL.
    pub fn has_permission(
        &self,
        env: EvalEnv<'_>,
        who: Address,
        app: Address,
        role: RoleId,
        args: &[ArgValue],
    ) -> bool {
        self.acl.has_permission(env, who, app, role, args)
    }

    /// Ask the ACL for `APP_MANAGER_ROLE` on this kernel for a registry key.
    ///
    /// # Errors
    ///
    /// Returns the ACL's denial.
    pub fn authorize_registry_write(
        &self,
        env: EvalEnv<'_>,
        who: Address,
        namespace: NamespaceId,
        app_id: AppId,
    ) -> Result<Authorization, KernelError> {
        Ok(self.acl.authorize(
            env,
            who,
            self.address,
            app_manager_role(),
            registry_args(namespace, app_id),
        )?)
    }

    fn require(
        &self,
        auth: &Authorization,
        namespace: NamespaceId,
        app_id: AppId,
    ) -> Result<(), KernelError> {
        auth.require(self.address, app_manager_role())?;
        if auth.args() != registry_args(namespace, app_id).as_slice() {
            return Err(KernelError::ArgumentMismatch);
        }
        Ok(())
    }

    /// Write a registry entry.
    ///
    /// # Errors
    ///
    /// Fails on a proof for other arguments or when relocating the kernel's
    /// core entry or the ACL's instance entry.
    pub fn set_app(
        &mut self,
        auth: &Authorization,
        namespace: NamespaceId,
        app_id: AppId,
        address: Address,
    ) -> Result<Vec<Event>, KernelError> {
        self.require(auth, namespace, app_id)?;
        let fixed = (namespace == core_namespace() && app_id == kernel_app_id())
            || (namespace == app_addr_namespace() && app_id == acl_app_id());
        if fixed && address != self.registry.get_app(namespace, app_id) {
            return Err(KernelError::ReservedEntry { namespace, app_id });
        }
        Ok(vec![self.write(namespace, app_id, address)])
    }

    /// Create an instance of `app_id` backed by `base`, registering the base
    /// if the app id has none yet.
    ///
    /// The proof must cover `[APP_BASES, app_id]`. Returns the new instance
    /// address and its proxy record.
    ///
    /// # Errors
    ///
    /// Fails on a mismatched proof, a null base, or a base that differs from
    /// the registered one.
    pub fn new_app_instance(
        &mut self,
        auth: &Authorization,
        app_id: AppId,
        base: Address,
        pinned: bool,
    ) -> Result<(Address, AppProxy, Vec<Event>), KernelError> {
        self.require(auth, app_bases_namespace(), app_id)?;
        if base.is_zero() {
            return Err(KernelError::NullBase);
        }
        let mut events = Vec::new();
        let existing = self.registry.get_app(app_bases_namespace(), app_id);
        if existing.is_zero() {
            events.push(self.write(app_bases_namespace(), app_id, base));
        } else if existing != base {
            return Err(KernelError::InvalidAppChange {
                app_id,
                existing,
                requested: base,
            });
        }

        let nonce = self.nonce;
        self.nonce = nonce.checked_add(1).ok_or(KernelError::NonceExhausted)?;
        let instance = Address::derive(self.address, nonce);
        let proxy = if pinned {
            AppProxy::pinned(app_id, base)
        } else {
            AppProxy::upgradeable(app_id)
        };
        debug!(%instance, %app_id, pinned, "new app instance");
        events.push(Event::NewAppProxy {
            proxy: instance,
            app_id,
            upgradeable: !pinned,
            base,
        });
        Ok((instance, proxy, events))
    }

    /// Change the app id the recovery vault resolves through.
    ///
    /// The proof must cover `[APP_ADDR, app_id]`.
    ///
    /// # Errors
    ///
    /// Fails on a mismatched proof.
    pub fn set_recovery_vault_app_id(
        &mut self,
        auth: &Authorization,
        app_id: AppId,
    ) -> Result<Vec<Event>, KernelError> {
        self.require(auth, app_addr_namespace(), app_id)?;
        let old = std::mem::replace(&mut self.recovery_vault_app_id, app_id);
        Ok(vec![Event::SetRecoveryVaultAppId {
            old: Some(old),
            new: app_id,
        }])
    }

    fn write(&mut self, namespace: NamespaceId, app_id: AppId, address: Address) -> Event {
        let old = self.registry.set(namespace, app_id, address);
        debug!(%namespace, %app_id, %old, new = %address, "registry entry written");
        Event::SetApp {
            namespace,
            app_id,
            old,
            new: address,
        }
    }
}

impl RegistryRead for Kernel {
    fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Address {
        self.registry.get_app(namespace, app_id)
    }
}
