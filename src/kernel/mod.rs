//! Kernel: the namespaced app registry, app proxies and the kernel surface
//! that ties them to the ACL.

pub mod core;
pub mod proxy;
pub mod registry;

pub use self::core::{
    acl_app_id, app_manager_role, default_vault_app_id, kernel_app_id, registry_args, Genesis,
    Kernel, KernelError,
};
pub use self::proxy::{AppProxy, ProxyKind};
pub use self::registry::{
    app_addr_namespace, app_bases_namespace, core_namespace, namespace_by_name,
    NamespaceRegistry, RegistryRead,
};
