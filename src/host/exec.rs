//! Call frames: dispatch, rollback and the context handed to module code.

use std::collections::BTreeSet;

use tracing::{debug, trace};

use super::code::Catalog;
use super::state::{OracleView, OrgState};
use super::{AclCall, Call, HostError, KernelCall, Limits};
use crate::acl::eval::{ChainFacts, EvalEnv};
use crate::acl::{create_permissions_role, Authorization};
use crate::audit::Event;
use crate::kernel::{app_addr_namespace, app_bases_namespace};
use crate::types::{Address, AppId, ArgValue, NamespaceId, RoleId};

/// Runs one top-level invocation and everything nested in it.
pub(crate) struct Executor<'a> {
    state: &'a mut OrgState,
    catalog: &'a Catalog,
    limits: Limits,
    events: Vec<Event>,
    guards: BTreeSet<Address>,
}

impl<'a> Executor<'a> {
    pub(crate) fn new(state: &'a mut OrgState, catalog: &'a Catalog, limits: Limits) -> Self {
        Self {
            state,
            catalog,
            limits,
            events: Vec::new(),
            guards: BTreeSet::new(),
        }
    }

    pub(crate) fn into_events(self) -> Vec<Event> {
        self.events
    }

    /// Run `call` in its own frame. On error, state and events are put back
    /// as they were when the frame started.
    pub(crate) fn dispatch(
        &mut self,
        caller: Address,
        call: Call,
        depth: usize,
    ) -> Result<Option<ArgValue>, HostError> {
        if depth > self.limits.max_call_depth {
            return Err(HostError::CallDepthExceeded {
                max: self.limits.max_call_depth,
            });
        }
        let snapshot = self.state.clone();
        let mark = self.events.len();
        trace!(%caller, call = %call.label(), depth, "frame enter");
        let result = self.execute(caller, call, depth);
        if let Err(err) = &result {
            debug!(%caller, depth, error = %err, "frame rolled back");
            *self.state = snapshot;
            self.events.truncate(mark);
        }
        result
    }

    fn execute(
        &mut self,
        caller: Address,
        call: Call,
        depth: usize,
    ) -> Result<Option<ArgValue>, HostError> {
        match call {
            Call::Deploy { kind } => self.deploy(kind).map(|a| Some(a.into())),
            Call::Kernel(call) => self.kernel_call(caller, call, depth),
            Call::Acl(call) => {
                self.acl_call(caller, call)?;
                Ok(None)
            }
            Call::App {
                target,
                method,
                args,
            } => self.app_call(caller, target, &method, &args, depth),
        }
    }

    fn deploy(&mut self, kind: String) -> Result<Address, HostError> {
        if !self.catalog.contains(&kind) {
            return Err(HostError::UnknownCode { kind });
        }
        let nonce = self.state.deploy_nonce;
        self.state.deploy_nonce = nonce
            .checked_add(1)
            .ok_or_else(|| HostError::Corrupt("deploy nonce exhausted".to_owned()))?;
        let address = Address::derive(Address::from_label("orgkernel.code"), nonce);
        debug!(%address, kind = %kind, "code deployed");
        self.state.code.insert(address, kind);
        Ok(address)
    }

    fn env(&self) -> (ChainFacts, usize) {
        (self.state.facts, self.limits.max_oracle_depth)
    }

    /// Ask the ACL for a proof with oracles resolved against current state.
    fn authorize(
        &self,
        who: Address,
        app: Address,
        role: RoleId,
        args: Vec<ArgValue>,
    ) -> Result<Authorization, HostError> {
        let (facts, max_depth) = self.env();
        let view = OracleView::new(&*self.state, self.catalog);
        let env = EvalEnv::new(facts, &view, max_depth);
        Ok(self
            .state
            .kernel
            .acl()
            .authorize(env, who, app, role, args)?)
    }

    fn authorize_registry(
        &self,
        who: Address,
        namespace: NamespaceId,
        app_id: AppId,
    ) -> Result<Authorization, HostError> {
        let (facts, max_depth) = self.env();
        let view = OracleView::new(&*self.state, self.catalog);
        let env = EvalEnv::new(facts, &view, max_depth);
        Ok(self
            .state
            .kernel
            .authorize_registry_write(env, who, namespace, app_id)?)
    }

    pub(crate) fn has_permission(
        &self,
        who: Address,
        app: Address,
        role: RoleId,
        args: &[ArgValue],
    ) -> bool {
        let (facts, max_depth) = self.env();
        let view = OracleView::new(&*self.state, self.catalog);
        let env = EvalEnv::new(facts, &view, max_depth);
        self.state.kernel.has_permission(env, who, app, role, args)
    }

    fn kernel_call(
        &mut self,
        caller: Address,
        call: KernelCall,
        depth: usize,
    ) -> Result<Option<ArgValue>, HostError> {
        match call {
            KernelCall::SetApp {
                namespace,
                app_id,
                address,
            } => {
                let auth = self.authorize_registry(caller, namespace, app_id)?;
                let events = self
                    .state
                    .kernel
                    .set_app(&auth, namespace, app_id, address)?;
                self.events.extend(events);
                Ok(None)
            }
            KernelCall::NewAppInstance {
                app_id,
                base,
                pinned,
                set_default,
                initialize,
            } => {
                let auth = self.authorize_registry(caller, app_bases_namespace(), app_id)?;
                if self.state.code_at(base).is_none() {
                    return Err(HostError::NotDeployed { base });
                }
                let (instance, proxy, events) =
                    self.state
                        .kernel
                        .new_app_instance(&auth, app_id, base, pinned)?;
                self.state.proxies.insert(instance, proxy);
                self.events.extend(events);

                if let Some(args) = initialize {
                    let kernel = self.state.kernel.address();
                    let init = Call::App {
                        target: instance,
                        method: "initialize".to_owned(),
                        args,
                    };
                    self.dispatch(kernel, init, nested(depth)?)?;
                }
                if set_default {
                    let auth = self.authorize_registry(caller, app_addr_namespace(), app_id)?;
                    let events =
                        self.state
                            .kernel
                            .set_app(&auth, app_addr_namespace(), app_id, instance)?;
                    self.events.extend(events);
                }
                Ok(Some(instance.into()))
            }
            KernelCall::SetRecoveryVaultAppId { app_id } => {
                let auth = self.authorize_registry(caller, app_addr_namespace(), app_id)?;
                let events = self
                    .state
                    .kernel
                    .set_recovery_vault_app_id(&auth, app_id)?;
                self.events.extend(events);
                Ok(None)
            }
        }
    }

    fn acl_call(&mut self, caller: Address, call: AclCall) -> Result<(), HostError> {
        let acl_address = self.state.kernel.acl().address();
        let events = match call {
            AclCall::CreatePermission {
                entity,
                app,
                role,
                manager,
            } => {
                let auth = self.authorize(caller, acl_address, create_permissions_role(), vec![])?;
                self.state
                    .kernel
                    .acl_mut()
                    .create_permission(&auth, entity, app, role, manager)?
            }
            AclCall::CreateBurnedPermission { app, role } => {
                let auth = self.authorize(caller, acl_address, create_permissions_role(), vec![])?;
                self.state
                    .kernel
                    .acl_mut()
                    .create_burned_permission(&auth, app, role)?
            }
            AclCall::Grant { entity, app, role } => self
                .state
                .kernel
                .acl_mut()
                .grant_permission(caller, entity, app, role)?,
            AclCall::GrantParams {
                entity,
                app,
                role,
                params,
            } => self
                .state
                .kernel
                .acl_mut()
                .grant_permission_p(caller, entity, app, role, params)?,
            AclCall::GrantPredicate {
                entity,
                app,
                role,
                predicate,
            } => self
                .state
                .kernel
                .acl_mut()
                .grant_permission_with(caller, entity, app, role, &predicate)?,
            AclCall::Revoke { entity, app, role } => self
                .state
                .kernel
                .acl_mut()
                .revoke_permission(caller, entity, app, role)?,
            AclCall::SetManager {
                new_manager,
                app,
                role,
            } => self
                .state
                .kernel
                .acl_mut()
                .set_permission_manager(caller, new_manager, app, role)?,
            AclCall::BurnManager { app, role } => self
                .state
                .kernel
                .acl_mut()
                .burn_permission_manager(caller, app, role)?,
        };
        self.events.extend(events);
        Ok(())
    }

    fn app_call(
        &mut self,
        caller: Address,
        target: Address,
        method: &str,
        args: &[ArgValue],
        depth: usize,
    ) -> Result<Option<ArgValue>, HostError> {
        let implementation = self
            .state
            .implementation(target)
            .ok_or(HostError::NoCode { target })?;
        let kind = self
            .state
            .code_at(implementation)
            .ok_or(HostError::NoCode { target })?;
        let catalog = self.catalog;
        let code = catalog.get(kind).ok_or_else(|| HostError::UnknownCode {
            kind: kind.to_owned(),
        })?;

        let guarded = code.non_reentrant(method);
        if guarded && !self.guards.insert(target) {
            return Err(HostError::Reentrancy {
                target,
                method: method.to_owned(),
            });
        }
        let result = {
            let mut ctx = AppContext {
                exec: self,
                this: target,
                caller,
                depth,
            };
            code.call(&mut ctx, method, args)
        };
        if guarded {
            self.guards.remove(&target);
        }
        result
    }
}

fn nested(depth: usize) -> Result<usize, HostError> {
    depth.checked_add(1).ok_or(HostError::CallDepthExceeded { max: depth })
}

/// Handle given to module code for the duration of one call.
pub struct AppContext<'e, 'a> {
    exec: &'e mut Executor<'a>,
    this: Address,
    caller: Address,
    depth: usize,
}

impl AppContext<'_, '_> {
    /// The called instance.
    pub fn this(&self) -> Address {
        self.this
    }

    /// Who made the call.
    pub fn caller(&self) -> Address {
        self.caller
    }

    /// Chain facts.
    pub fn facts(&self) -> ChainFacts {
        self.exec.state.facts
    }

    /// The kernel's address.
    pub fn kernel(&self) -> Address {
        self.exec.state.kernel.address()
    }

    /// A storage slot of this instance.
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.exec.state.storage(self.this).and_then(|s| s.get(key))
    }

    /// Write a storage slot of this instance.
    pub fn set(&mut self, key: impl Into<String>, value: ArgValue) {
        self.exec
            .state
            .storage
            .entry(self.this)
            .or_default()
            .insert(key.into(), value);
    }

    /// Clear a storage slot of this instance.
    pub fn remove(&mut self, key: &str) -> Option<ArgValue> {
        self.exec
            .state
            .storage
            .get_mut(&self.this)
            .and_then(|s| s.remove(key))
    }

    /// Registry read.
    pub fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Address {
        self.exec.state.kernel.get_app(namespace, app_id)
    }

    /// Whether `who` holds `role` on this instance for `args`.
    pub fn can_perform(&self, who: Address, role: RoleId, args: &[ArgValue]) -> bool {
        self.exec.has_permission(who, self.this, role, args)
    }

    /// Require the caller to hold `role` on this instance for `args`.
    ///
    /// # Errors
    ///
    /// Returns the ACL's denial.
    pub fn authorize(&self, role: RoleId, args: Vec<ArgValue>) -> Result<(), HostError> {
        self.exec
            .authorize(self.caller, self.this, role, args)
            .map(|_| ())
    }

    /// Call another module with this instance as caller.
    ///
    /// # Errors
    ///
    /// Returns the nested failure; the nested frame has already been
    /// rolled back.
    pub fn call(&mut self, call: Call) -> Result<Option<ArgValue>, HostError> {
        let depth = nested(self.depth)?;
        self.exec.dispatch(self.this, call, depth)
    }

    /// A module-reported failure.
    pub fn fail(&self, reason: impl Into<String>) -> HostError {
        HostError::App {
            target: self.this,
            reason: reason.into(),
        }
    }
}
