//! An organization: state, code catalog and host limits.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use super::code::Catalog;
use super::exec::Executor;
use super::state::{ModuleStorage, OracleView, OrgState, Snapshot};
use super::{Call, HostError, Limits, Receipt};
use crate::acl::eval::{ChainFacts, EvalEnv, EvalError};
use crate::acl::DEFAULT_MAX_PARAMS;
use crate::audit::Event;
use crate::kernel::{Genesis, Kernel};
use crate::types::{Address, AppId, ArgValue, NamespaceId, RoleId};

/// A running organization.
#[derive(Debug, Clone)]
pub struct Organization {
    state: OrgState,
    catalog: Arc<Catalog>,
    limits: Limits,
    max_params: usize,
}

impl Organization {
    /// Bootstrap a new organization.
    ///
    /// # Errors
    ///
    /// Fails if genesis fails (null root).
    pub fn genesis(
        genesis: &Genesis,
        facts: ChainFacts,
        catalog: Arc<Catalog>,
        limits: Limits,
    ) -> Result<(Self, Vec<Event>), HostError> {
        let (kernel, events) = Kernel::genesis(genesis)?;
        let org = Self {
            state: OrgState::new(kernel, facts),
            catalog,
            limits,
            max_params: genesis.max_params,
        };
        Ok((org, events))
    }

    /// Genesis with derived addresses, default limits and block 0.
    ///
    /// # Errors
    ///
    /// Fails if `root` is the null address.
    pub fn bootstrap(root: Address, catalog: Arc<Catalog>) -> Result<Self, HostError> {
        let genesis = Genesis::for_root(root, DEFAULT_MAX_PARAMS);
        Self::genesis(&genesis, ChainFacts::default(), catalog, Limits::default())
            .map(|(org, _)| org)
    }

    /// Restore an organization from a snapshot.
    ///
    /// # Errors
    ///
    /// Fails on inconsistent snapshot data.
    pub fn restore(
        snapshot: Snapshot,
        catalog: Arc<Catalog>,
        limits: Limits,
        max_params: usize,
    ) -> Result<Self, HostError> {
        Ok(Self {
            state: OrgState::from_snapshot(snapshot, max_params)?,
            catalog,
            limits,
            max_params,
        })
    }

    /// Run one top-level invocation. Nothing changes unless it succeeds.
    ///
    /// # Errors
    ///
    /// Returns the failure that aborted the invocation.
    pub fn invoke(&mut self, caller: Address, call: Call) -> Result<Receipt, HostError> {
        let label = call.label();
        let block_number = self.state.facts.block_number;
        let catalog = Arc::clone(&self.catalog);
        let mut exec = Executor::new(&mut self.state, &catalog, self.limits);
        match exec.dispatch(caller, call, 0) {
            Ok(output) => {
                let events = exec.into_events();
                let invocation_id = Uuid::new_v4();
                info!(
                    %invocation_id,
                    %caller,
                    call = %label,
                    events = events.len(),
                    "invocation committed"
                );
                Ok(Receipt {
                    invocation_id,
                    caller,
                    block_number,
                    events,
                    output,
                })
            }
            Err(err) => {
                warn!(%caller, call = %label, kind = %err.kind(), error = %err, "invocation aborted");
                Err(err)
            }
        }
    }

    /// Move the chain forward by `blocks` blocks and `seconds` seconds.
    pub fn advance(&mut self, blocks: u64, seconds: u64) -> ChainFacts {
        let facts = &mut self.state.facts;
        facts.block_number = facts.block_number.saturating_add(blocks);
        facts.timestamp = facts.timestamp.saturating_add(seconds);
        *facts
    }

    /// Permission query with oracles resolved against current state.
    pub fn has_permission(
        &self,
        who: Address,
        app: Address,
        role: RoleId,
        args: &[ArgValue],
    ) -> bool {
        let view = OracleView::new(&self.state, &self.catalog);
        let env = EvalEnv::new(self.state.facts, &view, self.limits.max_oracle_depth);
        self.state.kernel.has_permission(env, who, app, role, args)
    }

    /// Permission query that reports evaluation failures.
    ///
    /// # Errors
    ///
    /// Returns the first evaluation error met.
    pub fn check(
        &self,
        who: Address,
        app: Address,
        role: RoleId,
        args: &[ArgValue],
    ) -> Result<bool, EvalError> {
        let view = OracleView::new(&self.state, &self.catalog);
        let env = EvalEnv::new(self.state.facts, &view, self.limits.max_oracle_depth);
        self.state.kernel.acl().check(env, who, app, role, args)
    }

    /// Registry read.
    pub fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Address {
        self.state.kernel.get_app(namespace, app_id)
    }

    /// The kernel.
    pub fn kernel(&self) -> &Kernel {
        &self.state.kernel
    }

    /// Read access to the full state.
    pub fn state(&self) -> &OrgState {
        &self.state
    }

    /// Storage of an app instance.
    pub fn storage(&self, instance: Address) -> Option<&ModuleStorage> {
        self.state.storage(instance)
    }

    /// Chain facts.
    pub fn facts(&self) -> ChainFacts {
        self.state.facts
    }

    /// Host limits.
    pub fn limits(&self) -> Limits {
        self.limits
    }

    /// Cap on params per predicate.
    pub fn max_params(&self) -> usize {
        self.max_params
    }

    /// Serializable copy of the state.
    pub fn snapshot(&self) -> Snapshot {
        self.state.snapshot()
    }
}
