//! Module code and the catalog of available code kinds.
//!
//! Deployed code is recorded in state by kind name only; the behaviour lives
//! in the [`Catalog`], which is not part of the persisted state.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::exec::AppContext;
use super::state::OrgState;
use super::HostError;
use crate::acl::eval::{ChainFacts, EvalEnv, OracleRequest};
use crate::kernel::RegistryRead;
use crate::types::{Address, AppId, ArgValue, NamespaceId, RoleId};

/// Behaviour of a module implementation.
pub trait AppCode: Send + Sync {
    /// Catalog kind name.
    fn kind(&self) -> &'static str;

    /// Handle `method`. Storage reads and writes go through `ctx`, which is
    /// bound to the called instance.
    ///
    /// # Errors
    ///
    /// Any error aborts the call frame and every state change made in it.
    fn call(
        &self,
        ctx: &mut AppContext<'_, '_>,
        method: &str,
        args: &[ArgValue],
    ) -> Result<Option<ArgValue>, HostError>;

    /// Whether `method` must not be entered while already running on the
    /// same instance.
    fn non_reentrant(&self, _method: &str) -> bool {
        false
    }

    /// Answer an oracle param.
    ///
    /// # Errors
    ///
    /// The default implementation is not an oracle.
    fn can_perform(
        &self,
        _ctx: &OracleContext<'_>,
        _request: &OracleRequest<'_>,
    ) -> Result<bool, String> {
        Err(format!("{} is not an oracle", self.kind()))
    }
}

/// Code kinds by name.
#[derive(Clone, Default)]
pub struct Catalog {
    kinds: BTreeMap<&'static str, Arc<dyn AppCode>>,
}

impl fmt::Debug for Catalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.kinds.keys()).finish()
    }
}

impl Catalog {
    /// Empty catalog.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a code kind, replacing one with the same name.
    pub fn register(&mut self, code: Arc<dyn AppCode>) {
        self.kinds.insert(code.kind(), code);
    }

    /// Builder form of [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, code: Arc<dyn AppCode>) -> Self {
        self.register(code);
        self
    }

    /// Look up a kind.
    pub fn get(&self, kind: &str) -> Option<&dyn AppCode> {
        self.kinds.get(kind).map(|c| &**c)
    }

    /// Whether a kind exists.
    pub fn contains(&self, kind: &str) -> bool {
        self.kinds.contains_key(kind)
    }

    /// Kind names in order.
    pub fn kinds(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.kinds.keys().copied()
    }
}

/// What an oracle sees: its own storage and read-only queries.
#[derive(Debug)]
pub struct OracleContext<'a> {
    state: &'a OrgState,
    this: Address,
    env: EvalEnv<'a>,
}

impl<'a> OracleContext<'a> {
    pub(crate) fn new(state: &'a OrgState, this: Address, env: EvalEnv<'a>) -> Self {
        Self { state, this, env }
    }

    /// The oracle instance.
    pub fn this(&self) -> Address {
        self.this
    }

    /// Chain facts.
    pub fn facts(&self) -> ChainFacts {
        self.env.facts
    }

    /// A slot of the oracle's own storage.
    pub fn get(&self, key: &str) -> Option<&ArgValue> {
        self.state.storage(self.this).and_then(|s| s.get(key))
    }

    /// Registry read.
    pub fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Address {
        self.state.kernel().get_app(namespace, app_id)
    }

    /// Nested permission check, one oracle level deeper.
    pub fn has_permission(
        &self,
        who: Address,
        app: Address,
        role: RoleId,
        args: &[ArgValue],
    ) -> bool {
        self.state
            .kernel()
            .has_permission(self.env, who, app, role, args)
    }
}
