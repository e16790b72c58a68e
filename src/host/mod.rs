//! Module host: runs invocations against an organization's state.
//!
//! An invocation is a [`Call`] made by some caller. It runs inside a frame
//! that snapshots the state first; a failing frame restores the snapshot, so
//! every invocation is all-or-nothing, nested ones included. App calls are
//! forwarded through the target's [`AppProxy`](crate::kernel::AppProxy) to
//! code from the [`Catalog`].

pub mod code;
pub mod exec;
pub mod node;
pub mod org;
pub mod state;

use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::acl::params::Param;
use crate::acl::predicate::Predicate;
use crate::acl::store::Grantee;
use crate::acl::AclError;
use crate::audit::Event;
use crate::error::FailureKind;
use crate::kernel::KernelError;
use crate::types::{Address, AppId, ArgValue, NamespaceId, RoleId};

pub use self::code::{AppCode, Catalog, OracleContext};
pub use self::exec::AppContext;
pub use self::node::{spawn_node, NodeHandle, NodeOptions};
pub use self::org::Organization;
pub use self::state::{OrgState, Snapshot};

/// Default bound on nested call depth.
pub const DEFAULT_MAX_CALL_DEPTH: usize = 16;

/// Default bound on oracle nesting depth.
pub const DEFAULT_MAX_ORACLE_DEPTH: usize = 4;

/// Errors from running an invocation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum HostError {
    /// A kernel operation failed.
    #[error(transparent)]
    Kernel(#[from] KernelError),

    /// An ACL operation failed.
    #[error(transparent)]
    Acl(#[from] AclError),

    /// No module lives at the target, or its implementation has no code.
    #[error("no code at {target}")]
    NoCode {
        /// Called address.
        target: Address,
    },

    /// A code kind the catalog does not know.
    #[error("unknown code kind {kind:?}")]
    UnknownCode {
        /// Requested kind.
        kind: String,
    },

    /// An implementation address with no deployed code.
    #[error("nothing deployed at {base}")]
    NotDeployed {
        /// Implementation address.
        base: Address,
    },

    /// Nested calls went deeper than allowed.
    #[error("call depth limit {max} exceeded")]
    CallDepthExceeded {
        /// Configured maximum.
        max: usize,
    },

    /// A non-reentrant method was entered twice on the same instance.
    #[error("reentrant call to {method} on {target}")]
    Reentrancy {
        /// Instance address.
        target: Address,
        /// Guarded method.
        method: String,
    },

    /// The module itself reported a failure.
    #[error("{target}: {reason}")]
    App {
        /// Instance address.
        target: Address,
        /// Module-supplied reason.
        reason: String,
    },

    /// Persisted state is inconsistent.
    #[error("corrupt state: {0}")]
    Corrupt(String),

    /// The committed state could not be written to the state database.
    #[error("failed to persist state: {0}")]
    Persist(String),

    /// The node task has shut down.
    #[error("node stopped")]
    NodeStopped,
}

impl HostError {
    /// Failure class of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Kernel(e) => e.kind(),
            Self::Acl(e) => e.kind(),
            Self::UnknownCode { .. } | Self::NotDeployed { .. } => FailureKind::InvalidConfig,
            Self::NoCode { .. }
            | Self::CallDepthExceeded { .. }
            | Self::Reentrancy { .. }
            | Self::App { .. }
            | Self::Corrupt(_)
            | Self::Persist(_)
            | Self::NodeStopped => FailureKind::Execution,
        }
    }
}

/// Host limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Maximum nested call depth.
    pub max_call_depth: usize,
    /// Maximum oracle nesting depth.
    pub max_oracle_depth: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
            max_oracle_depth: DEFAULT_MAX_ORACLE_DEPTH,
        }
    }
}

/// Kernel entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelCall {
    /// Write a registry entry.
    SetApp {
        /// Namespace.
        namespace: NamespaceId,
        /// App id.
        app_id: AppId,
        /// New address (null deregisters).
        address: Address,
    },
    /// Create an app instance.
    NewAppInstance {
        /// App id.
        app_id: AppId,
        /// Implementation address (must hold deployed code).
        base: Address,
        /// Pin the instance to `base` instead of following upgrades.
        pinned: bool,
        /// Also register the instance as the app's default.
        set_default: bool,
        /// Arguments for `initialize`, called with the kernel as caller.
        initialize: Option<Vec<ArgValue>>,
    },
    /// Change the recovery vault app id.
    SetRecoveryVaultAppId {
        /// New app id.
        app_id: AppId,
    },
}

/// ACL entry points.
#[derive(Debug, Clone, PartialEq)]
pub enum AclCall {
    /// Create a permission.
    CreatePermission {
        /// First grantee.
        entity: Grantee,
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
        /// Manager.
        manager: Address,
    },
    /// Freeze a never-created permission.
    CreateBurnedPermission {
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
    },
    /// Unconditional grant.
    Grant {
        /// Grantee.
        entity: Grantee,
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
    },
    /// Conditional grant with raw params.
    GrantParams {
        /// Grantee.
        entity: Grantee,
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
        /// Flat predicate.
        params: Vec<Param>,
    },
    /// Conditional grant from a predicate tree.
    GrantPredicate {
        /// Grantee.
        entity: Grantee,
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
        /// Predicate.
        predicate: Predicate,
    },
    /// Remove a grant.
    Revoke {
        /// Grantee.
        entity: Grantee,
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
    },
    /// Transfer management.
    SetManager {
        /// New manager.
        new_manager: Address,
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
    },
    /// Freeze a permission.
    BurnManager {
        /// Module.
        app: Address,
        /// Role.
        role: RoleId,
    },
}

/// One invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    /// Deploy implementation code of a catalog kind.
    Deploy {
        /// Catalog kind name.
        kind: String,
    },
    /// Call the kernel.
    Kernel(KernelCall),
    /// Call the ACL.
    Acl(AclCall),
    /// Call an app instance.
    App {
        /// Instance address.
        target: Address,
        /// Method name.
        method: String,
        /// Arguments.
        args: Vec<ArgValue>,
    },
}

impl Call {
    /// Short label for logs.
    pub fn label(&self) -> String {
        match self {
            Self::Deploy { kind } => format!("deploy:{kind}"),
            Self::Kernel(k) => match k {
                KernelCall::SetApp { .. } => "kernel.set_app".to_owned(),
                KernelCall::NewAppInstance { .. } => "kernel.new_app_instance".to_owned(),
                KernelCall::SetRecoveryVaultAppId { .. } => {
                    "kernel.set_recovery_vault_app_id".to_owned()
                }
            },
            Self::Acl(a) => match a {
                AclCall::CreatePermission { .. } => "acl.create_permission".to_owned(),
                AclCall::CreateBurnedPermission { .. } => "acl.create_burned_permission".to_owned(),
                AclCall::Grant { .. } => "acl.grant_permission".to_owned(),
                AclCall::GrantParams { .. } | AclCall::GrantPredicate { .. } => {
                    "acl.grant_permission_p".to_owned()
                }
                AclCall::Revoke { .. } => "acl.revoke_permission".to_owned(),
                AclCall::SetManager { .. } => "acl.set_permission_manager".to_owned(),
                AclCall::BurnManager { .. } => "acl.burn_permission_manager".to_owned(),
            },
            Self::App { target, method, .. } => format!("{target}.{method}"),
        }
    }
}

/// Result of a committed invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Receipt {
    /// Unique id, shared with the audit log lines.
    pub invocation_id: Uuid,
    /// Caller of the top-level call.
    pub caller: Address,
    /// Block the invocation ran in.
    pub block_number: u64,
    /// Events in emission order.
    pub events: Vec<Event>,
    /// Return value, if any.
    pub output: Option<ArgValue>,
}
