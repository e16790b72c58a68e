//! Access control list: permission creation, grants and the query path.
//!
//! Mutations are gated two ways. Creating a permission needs
//! `CREATE_PERMISSIONS_ROLE` on the ACL itself, proven by an
//! [`Authorization`] the ACL issued. Grant, revoke and manager transfer need
//! the caller to be the permission's current manager.
//!
//! [`Acl::has_permission`] never mutates and treats every evaluation error as
//! "not permitted".

pub mod eval;
pub mod params;
pub mod predicate;
pub mod store;

use thiserror::Error;
use tracing::debug;

use self::eval::{evaluate, EvalEnv, EvalError, OracleRequest};
use self::params::{validate, Param, ParamsDefect};
use self::predicate::{Predicate, PredicateError};
use self::store::{Grant, Grantee, Manager, PermissionStore};
use crate::audit::Event;
use crate::error::FailureKind;
use crate::types::{Address, ArgValue, RoleId};

pub use self::eval::{ChainFacts, NoOracles, OracleHost};

/// Default cap on the number of params in one predicate.
pub const DEFAULT_MAX_PARAMS: usize = 256;

/// Role on the ACL that allows creating permissions.
pub fn create_permissions_role() -> RoleId {
    RoleId::named("CREATE_PERMISSIONS_ROLE")
}

/// Errors from ACL mutations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AclError {
    /// The caller does not hold the role.
    #[error("{who} may not perform {role} on {app}")]
    Unauthorized {
        /// Caller.
        who: Address,
        /// Module the role belongs to.
        app: Address,
        /// Role required.
        role: RoleId,
    },

    /// The caller is not the permission's manager.
    #[error("{caller} is not the manager of {role} on {app}")]
    NotManager {
        /// Caller.
        caller: Address,
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
    },

    /// The permission was never created, so nobody manages it.
    #[error("{role} on {app} has no manager")]
    NoManager {
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
    },

    /// The permission manager is frozen.
    #[error("{role} on {app} is frozen")]
    Frozen {
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
    },

    /// The authorization proof does not cover this operation.
    #[error("authorization for {held} on {held_app} does not cover {needed} on {needed_app}")]
    AuthorizationMismatch {
        /// Role the proof was issued for.
        held: RoleId,
        /// Module the proof was issued for.
        held_app: Address,
        /// Role the operation needs.
        needed: RoleId,
        /// Module the operation needs.
        needed_app: Address,
    },

    /// `create_permission` on a permission that already has a manager.
    #[error("{role} on {app} already exists (manager {manager})")]
    AlreadyCreated {
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
        /// Current manager record.
        manager: Manager,
    },

    /// Revoking a grant that does not exist.
    #[error("{entity} holds no grant for {role} on {app}")]
    NotGranted {
        /// Grantee.
        entity: Grantee,
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
    },

    /// The null address was given as manager.
    #[error("the null address cannot manage a permission")]
    NullManager,

    /// The null address was given as grantee.
    #[error("the null address cannot hold a grant")]
    NullEntity,

    /// `initialize` was called twice.
    #[error("ACL already initialized")]
    AlreadyInitialized,

    /// Params failed structural validation.
    #[error("malformed params: {0}")]
    MalformedParams(#[from] ParamsDefect),

    /// A predicate could not be compiled.
    #[error("invalid predicate: {0}")]
    Predicate(#[from] PredicateError),
}

impl AclError {
    /// Failure class of this error.
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Unauthorized { .. }
            | Self::NotManager { .. }
            | Self::NoManager { .. }
            | Self::Frozen { .. }
            | Self::AuthorizationMismatch { .. } => FailureKind::Denied,
            Self::AlreadyCreated { .. }
            | Self::NotGranted { .. }
            | Self::NullManager
            | Self::NullEntity
            | Self::AlreadyInitialized
            | Self::MalformedParams(_)
            | Self::Predicate(_) => FailureKind::InvalidConfig,
        }
    }
}

/// Proof that the ACL approved `who` performing `role` on `app` with `args`.
///
/// Only [`Acl::authorize`] constructs it; privileged setters take it as an
/// argument, so they cannot run without passing through the ACL.
#[derive(Debug, Clone, PartialEq)]
pub struct Authorization {
    issuer: Address,
    who: Address,
    app: Address,
    role: RoleId,
    args: Vec<ArgValue>,
}

impl Authorization {
    /// The authorized caller.
    pub fn who(&self) -> Address {
        self.who
    }

    /// The module the role belongs to.
    pub fn app(&self) -> Address {
        self.app
    }

    /// The role.
    pub fn role(&self) -> RoleId {
        self.role
    }

    /// The arguments the check was evaluated against.
    pub fn args(&self) -> &[ArgValue] {
        &self.args
    }

    /// Require that this proof covers `role` on `app`.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::AuthorizationMismatch`] otherwise.
    pub fn require(&self, app: Address, role: RoleId) -> Result<(), AclError> {
        if self.app == app && self.role == role {
            return Ok(());
        }
        Err(AclError::AuthorizationMismatch {
            held: self.role,
            held_app: self.app,
            needed: role,
            needed_app: app,
        })
    }
}

/// The access control list of one organization.
#[derive(Debug, Clone)]
pub struct Acl {
    address: Address,
    store: PermissionStore,
    max_params: usize,
    initialized: bool,
}

impl Acl {
    /// An uninitialized ACL living at `address`.
    pub fn new(address: Address, max_params: usize) -> Self {
        Self {
            address,
            store: PermissionStore::new(),
            max_params,
            initialized: false,
        }
    }

    /// Rebuild an ACL from persisted state.
    pub fn from_store(address: Address, store: PermissionStore, max_params: usize) -> Self {
        let initialized = store
            .manager(address, create_permissions_role())
            .is_some();
        Self {
            address,
            store,
            max_params,
            initialized,
        }
    }

    /// Address of the ACL module.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Read access to the raw store.
    pub fn store(&self) -> &PermissionStore {
        &self.store
    }

    /// Whether the bootstrap permission exists.
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Seed `permissions_creator` as holder and manager of
    /// `CREATE_PERMISSIONS_ROLE` on the ACL. Runs once, at genesis.
    ///
    /// # Errors
    ///
    /// Fails if already initialized or the creator is the null address.
    pub fn initialize(&mut self, permissions_creator: Address) -> Result<Vec<Event>, AclError> {
        if self.initialized {
            return Err(AclError::AlreadyInitialized);
        }
        if permissions_creator.is_zero() {
            return Err(AclError::NullManager);
        }
        let events = self.create(
            Grantee::Entity(permissions_creator),
            self.address,
            create_permissions_role(),
            permissions_creator,
        );
        self.initialized = true;
        debug!(creator = %permissions_creator, acl = %self.address, "acl initialized");
        Ok(events)
    }

    // ── Queries ──

    /// Whether `who` may perform `role` on `app` with `args`.
    ///
    /// Evaluation errors are logged and reported as `false`.
    pub fn has_permission(
        &self,
        env: EvalEnv<'_>,
        who: Address,
        app: Address,
        role: RoleId,
        args: &[ArgValue],
    ) -> bool {
        match self.check(env, who, app, role, args) {
            Ok(allowed) => allowed,
            Err(err) => {
                debug!(%who, %app, ?role, error = %err, "predicate failed; permission denied");
                false
            }
        }
    }

    /// Like [`has_permission`](Self::has_permission) but reports why an
    /// evaluation failed.
    ///
    /// # Errors
    ///
    /// Returns the [`EvalError`] of the first failing conditional grant.
    pub fn check(
        &self,
        env: EvalEnv<'_>,
        who: Address,
        app: Address,
        role: RoleId,
        args: &[ArgValue],
    ) -> Result<bool, EvalError> {
        if self.store.manager(app, role).is_none() {
            return Ok(false);
        }
        let request = OracleRequest {
            who,
            app,
            role,
            args,
        };
        for grantee in [Grantee::Entity(who), Grantee::Anyone] {
            match self.store.grant(grantee, app, role) {
                None => {}
                Some(Grant::Unconditional) => return Ok(true),
                Some(Grant::Conditional(hash)) => {
                    let params = self.store.params(&hash).ok_or_else(|| EvalError::Malformed {
                        param: 0,
                        reason: format!("params {hash} are not stored"),
                    })?;
                    if evaluate(params, &request, env)? {
                        return Ok(true);
                    }
                }
            }
        }
        Ok(false)
    }

    /// Check `role` and return a proof usable by privileged setters.
    ///
    /// # Errors
    ///
    /// Returns [`AclError::Unauthorized`] when the check fails.
    pub fn authorize(
        &self,
        env: EvalEnv<'_>,
        who: Address,
        app: Address,
        role: RoleId,
        args: Vec<ArgValue>,
    ) -> Result<Authorization, AclError> {
        if !self.has_permission(env, who, app, role, &args) {
            return Err(AclError::Unauthorized { who, app, role });
        }
        Ok(Authorization {
            issuer: self.address,
            who,
            app,
            role,
            args,
        })
    }

    /// Manager record of `(app, role)`.
    pub fn permission_manager(&self, app: Address, role: RoleId) -> Option<Manager> {
        self.store.manager(app, role)
    }

    /// Number of params behind `entity`'s grant (0 when unconditional or absent).
    pub fn permission_params_len(&self, entity: Grantee, app: Address, role: RoleId) -> usize {
        self.grant_params(entity, app, role).map_or(0, <[Param]>::len)
    }

    /// Param `index` of `entity`'s conditional grant.
    pub fn permission_param(
        &self,
        entity: Grantee,
        app: Address,
        role: RoleId,
        index: usize,
    ) -> Option<Param> {
        self.grant_params(entity, app, role)
            .and_then(|p| p.get(index))
            .copied()
    }

    fn grant_params(&self, entity: Grantee, app: Address, role: RoleId) -> Option<&[Param]> {
        match self.store.grant(entity, app, role)? {
            Grant::Conditional(hash) => self.store.params(&hash),
            Grant::Unconditional => None,
        }
    }

    // ── Creation (CREATE_PERMISSIONS_ROLE) ──

    /// Create `(app, role)` with `manager` and an unconditional grant for
    /// `entity`.
    ///
    /// # Errors
    ///
    /// Fails on a foreign proof, a null manager or entity, or when the
    /// permission already has a manager (active or frozen).
    pub fn create_permission(
        &mut self,
        auth: &Authorization,
        entity: Grantee,
        app: Address,
        role: RoleId,
        manager: Address,
    ) -> Result<Vec<Event>, AclError> {
        self.require_creator(auth)?;
        if manager.is_zero() {
            return Err(AclError::NullManager);
        }
        if entity == Grantee::Entity(Address::ZERO) {
            return Err(AclError::NullEntity);
        }
        if let Some(existing) = self.store.manager(app, role) {
            return Err(AclError::AlreadyCreated {
                app,
                role,
                manager: existing,
            });
        }
        Ok(self.create(entity, app, role, manager))
    }

    /// Freeze a never-created permission so it can never be created.
    ///
    /// # Errors
    ///
    /// Fails on a foreign proof or when the permission already exists.
    pub fn create_burned_permission(
        &mut self,
        auth: &Authorization,
        app: Address,
        role: RoleId,
    ) -> Result<Vec<Event>, AclError> {
        self.require_creator(auth)?;
        if let Some(existing) = self.store.manager(app, role) {
            return Err(AclError::AlreadyCreated {
                app,
                role,
                manager: existing,
            });
        }
        Ok(vec![self.change_manager(app, role, Manager::Frozen)])
    }

    fn require_creator(&self, auth: &Authorization) -> Result<(), AclError> {
        if auth.issuer != self.address {
            return Err(AclError::AuthorizationMismatch {
                held: auth.role,
                held_app: auth.issuer,
                needed: create_permissions_role(),
                needed_app: self.address,
            });
        }
        auth.require(self.address, create_permissions_role())
    }

    fn create(
        &mut self,
        entity: Grantee,
        app: Address,
        role: RoleId,
        manager: Address,
    ) -> Vec<Event> {
        let grant = self.set_grant(entity, app, role, Some(Grant::Unconditional));
        let manager = self.change_manager(app, role, Manager::Active(manager));
        vec![grant, manager]
    }

    // ── Manager operations ──

    /// Grant `role` on `app` to `entity` unconditionally.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is the active manager.
    pub fn grant_permission(
        &mut self,
        caller: Address,
        entity: Grantee,
        app: Address,
        role: RoleId,
    ) -> Result<Vec<Event>, AclError> {
        self.require_manager(caller, app, role)?;
        if entity == Grantee::Entity(Address::ZERO) {
            return Err(AclError::NullEntity);
        }
        let event = self.set_grant(entity, app, role, Some(Grant::Unconditional));
        self.store.prune_params();
        Ok(vec![event])
    }

    /// Grant `role` on `app` to `entity` subject to `params`.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is the active manager, or when the params are
    /// structurally invalid.
    pub fn grant_permission_p(
        &mut self,
        caller: Address,
        entity: Grantee,
        app: Address,
        role: RoleId,
        params: Vec<Param>,
    ) -> Result<Vec<Event>, AclError> {
        self.require_manager(caller, app, role)?;
        if entity == Grantee::Entity(Address::ZERO) {
            return Err(AclError::NullEntity);
        }
        validate(&params, self.max_params)?;
        let hash = self.store.store_params(params);
        let grant = self.set_grant(entity, app, role, Some(Grant::Conditional(hash)));
        self.store.prune_params();
        Ok(vec![
            grant,
            Event::SetPermissionParams {
                entity,
                app,
                role,
                params_hash: hash,
            },
        ])
    }

    /// Compile `predicate` and grant with it.
    ///
    /// # Errors
    ///
    /// As [`grant_permission_p`](Self::grant_permission_p), plus compile errors.
    pub fn grant_permission_with(
        &mut self,
        caller: Address,
        entity: Grantee,
        app: Address,
        role: RoleId,
        predicate: &Predicate,
    ) -> Result<Vec<Event>, AclError> {
        let params = predicate.compile()?;
        self.grant_permission_p(caller, entity, app, role, params)
    }

    /// Remove `entity`'s grant. The manager stays in place.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is the active manager, or when `entity` holds no
    /// grant.
    pub fn revoke_permission(
        &mut self,
        caller: Address,
        entity: Grantee,
        app: Address,
        role: RoleId,
    ) -> Result<Vec<Event>, AclError> {
        self.require_manager(caller, app, role)?;
        if self.store.grant(entity, app, role).is_none() {
            return Err(AclError::NotGranted { entity, app, role });
        }
        let event = self.set_grant(entity, app, role, None);
        self.store.prune_params();
        Ok(vec![event])
    }

    /// Hand management of `(app, role)` to `new_manager`.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is the active manager, or when `new_manager` is
    /// the null address.
    pub fn set_permission_manager(
        &mut self,
        caller: Address,
        new_manager: Address,
        app: Address,
        role: RoleId,
    ) -> Result<Vec<Event>, AclError> {
        self.require_manager(caller, app, role)?;
        if new_manager.is_zero() {
            return Err(AclError::NullManager);
        }
        Ok(vec![self.change_manager(app, role, Manager::Active(new_manager))])
    }

    /// Freeze `(app, role)`: existing grants stay, nothing can change again.
    ///
    /// # Errors
    ///
    /// Fails unless `caller` is the active manager.
    pub fn burn_permission_manager(
        &mut self,
        caller: Address,
        app: Address,
        role: RoleId,
    ) -> Result<Vec<Event>, AclError> {
        self.require_manager(caller, app, role)?;
        Ok(vec![self.change_manager(app, role, Manager::Frozen)])
    }

    fn require_manager(&self, caller: Address, app: Address, role: RoleId) -> Result<(), AclError> {
        match self.store.manager(app, role) {
            None => Err(AclError::NoManager { app, role }),
            Some(Manager::Frozen) => Err(AclError::Frozen { app, role }),
            Some(Manager::Active(m)) if m == caller => Ok(()),
            Some(Manager::Active(_)) => Err(AclError::NotManager { caller, app, role }),
        }
    }

    fn set_grant(
        &mut self,
        entity: Grantee,
        app: Address,
        role: RoleId,
        grant: Option<Grant>,
    ) -> Event {
        let old = self.store.set_grant(entity, app, role, grant);
        debug!(%entity, %app, ?role, ?old, new = ?grant, "grant changed");
        Event::SetPermission {
            entity,
            app,
            role,
            old,
            new: grant,
        }
    }

    fn change_manager(&mut self, app: Address, role: RoleId, manager: Manager) -> Event {
        let old = self.store.set_manager(app, role, manager);
        debug!(%app, ?role, ?old, new = %manager, "permission manager changed");
        Event::ChangePermissionManager {
            app,
            role,
            old,
            new: manager,
        }
    }
}
