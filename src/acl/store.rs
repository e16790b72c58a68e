//! Permission store: manager records, grants and the params arena.
//!
//! Plain keyed maps with no authorization logic; the [`Acl`](super::Acl)
//! decides who may write. Keys are stable (app address, role id, grantee), so
//! the layout survives any upgrade of the code that uses it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::params::{params_hash, Param, ParamsHash};
use crate::types::{Address, RoleId};

/// Who manages a permission once it has been created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Manager {
    /// The identity allowed to grant, revoke and transfer.
    Active(Address),
    /// Nobody may ever change this permission again.
    Frozen,
}

impl Manager {
    /// The active manager identity, if any.
    pub fn address(&self) -> Option<Address> {
        match self {
            Self::Active(a) => Some(*a),
            Self::Frozen => None,
        }
    }
}

impl fmt::Display for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active(a) => write!(f, "{a}"),
            Self::Frozen => f.write_str("frozen"),
        }
    }
}

/// The holder side of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grantee {
    /// One specific entity.
    Entity(Address),
    /// Every caller.
    Anyone,
}

impl From<Address> for Grantee {
    fn from(value: Address) -> Self {
        Self::Entity(value)
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Entity(a) => write!(f, "{a}"),
            Self::Anyone => f.write_str("anyone"),
        }
    }
}

/// A stored grant. Absence of a grant means "no grant".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Grant {
    /// Allowed for every argument vector.
    Unconditional,
    /// Allowed when the referenced predicate holds.
    Conditional(ParamsHash),
}

impl fmt::Display for Grant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unconditional => f.write_str("unconditional"),
            Self::Conditional(h) => write!(f, "conditional({h})"),
        }
    }
}

/// `(app, role)` key of a permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PermissionKey {
    /// Module the role belongs to.
    pub app: Address,
    /// Role id.
    pub role: RoleId,
}

/// `(grantee, app, role)` key of a grant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct GrantKey {
    /// Holder of the grant.
    pub grantee: Grantee,
    /// Module the role belongs to.
    pub app: Address,
    /// Role id.
    pub role: RoleId,
}

/// Raw permission state.
#[derive(Debug, Clone, Default)]
pub struct PermissionStore {
    managers: BTreeMap<PermissionKey, Manager>,
    grants: BTreeMap<GrantKey, Grant>,
    params: BTreeMap<ParamsHash, Arc<[Param]>>,
}

impl PermissionStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Manager record of `(app, role)`; `None` if never created.
    pub fn manager(&self, app: Address, role: RoleId) -> Option<Manager> {
        self.managers.get(&PermissionKey { app, role }).copied()
    }

    /// Overwrite the manager record, returning the previous one.
    pub fn set_manager(&mut self, app: Address, role: RoleId, manager: Manager) -> Option<Manager> {
        self.managers.insert(PermissionKey { app, role }, manager)
    }

    /// Grant held by `grantee`.
    pub fn grant(&self, grantee: Grantee, app: Address, role: RoleId) -> Option<Grant> {
        self.grants
            .get(&GrantKey {
                grantee,
                app,
                role,
            })
            .copied()
    }

    /// Set or clear a grant, returning the previous one.
    pub fn set_grant(
        &mut self,
        grantee: Grantee,
        app: Address,
        role: RoleId,
        grant: Option<Grant>,
    ) -> Option<Grant> {
        let key = GrantKey {
            grantee,
            app,
            role,
        };
        match grant {
            Some(g) => self.grants.insert(key, g),
            None => self.grants.remove(&key),
        }
    }

    /// Store a param list (deduplicated by content) and return its hash.
    pub fn store_params(&mut self, params: Vec<Param>) -> ParamsHash {
        let hash = params_hash(&params);
        self.params
            .entry(hash)
            .or_insert_with(|| Arc::from(params));
        hash
    }

    /// Stored params for `hash`.
    pub fn params(&self, hash: &ParamsHash) -> Option<&[Param]> {
        self.params.get(hash).map(|p| &p[..])
    }

    /// All manager records in key order.
    pub fn managers(&self) -> impl Iterator<Item = (&PermissionKey, &Manager)> {
        self.managers.iter()
    }

    /// All grants in key order.
    pub fn grants(&self) -> impl Iterator<Item = (&GrantKey, &Grant)> {
        self.grants.iter()
    }

    /// All stored param lists.
    pub fn param_sets(&self) -> impl Iterator<Item = (&ParamsHash, &[Param])> {
        self.params.iter().map(|(h, p)| (h, &p[..]))
    }

    /// Insert a param list under a known hash (restoring persisted state).
    pub fn insert_params(&mut self, hash: ParamsHash, params: Vec<Param>) {
        self.params.insert(hash, Arc::from(params));
    }

    /// Drop param lists no grant references any more.
    pub fn prune_params(&mut self) -> usize {
        let live: std::collections::BTreeSet<ParamsHash> = self
            .grants
            .values()
            .filter_map(|g| match g {
                Grant::Conditional(h) => Some(*h),
                Grant::Unconditional => None,
            })
            .collect();
        let before = self.params.len();
        self.params.retain(|h, _| live.contains(h));
        before.saturating_sub(self.params.len())
    }
}
