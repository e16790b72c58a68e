//! Organization state and its serializable snapshot.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::code::{Catalog, OracleContext};
use super::HostError;
use crate::acl::eval::{ChainFacts, EvalEnv, OracleHost, OracleRequest};
use crate::acl::params::{params_hash, Param, ParamsHash};
use crate::acl::store::{Grant, Grantee, Manager, PermissionStore};
use crate::acl::Acl;
use crate::kernel::{AppProxy, Genesis, Kernel, NamespaceRegistry};
use crate::types::{Address, AppId, ArgValue, NamespaceId, RoleId};

/// Key/value storage of one module instance.
pub type ModuleStorage = BTreeMap<String, ArgValue>;

/// Everything an organization persists.
///
/// Cloned wholesale at the start of every call frame; a failed frame puts
/// the clone back.
#[derive(Debug, Clone)]
pub struct OrgState {
    pub(crate) kernel: Kernel,
    pub(crate) proxies: BTreeMap<Address, AppProxy>,
    pub(crate) code: BTreeMap<Address, String>,
    pub(crate) storage: BTreeMap<Address, ModuleStorage>,
    pub(crate) facts: ChainFacts,
    pub(crate) deploy_nonce: u64,
}

impl OrgState {
    /// State right after genesis.
    pub fn new(kernel: Kernel, facts: ChainFacts) -> Self {
        Self {
            kernel,
            proxies: BTreeMap::new(),
            code: BTreeMap::new(),
            storage: BTreeMap::new(),
            facts,
            deploy_nonce: 0,
        }
    }

    /// The kernel.
    pub fn kernel(&self) -> &Kernel {
        &self.kernel
    }

    /// Chain facts.
    pub fn facts(&self) -> ChainFacts {
        self.facts
    }

    /// Proxy record of an instance.
    pub fn proxy(&self, instance: Address) -> Option<AppProxy> {
        self.proxies.get(&instance).copied()
    }

    /// Code kind deployed at an implementation address.
    pub fn code_at(&self, implementation: Address) -> Option<&str> {
        self.code.get(&implementation).map(String::as_str)
    }

    /// Storage of an instance.
    pub fn storage(&self, instance: Address) -> Option<&ModuleStorage> {
        self.storage.get(&instance)
    }

    /// Current implementation of an instance.
    pub fn implementation(&self, instance: Address) -> Option<Address> {
        let proxy = self.proxies.get(&instance)?;
        Some(proxy.implementation(&self.kernel)).filter(|a| !a.is_zero())
    }

    /// Serializable copy of the whole state.
    pub fn snapshot(&self) -> Snapshot {
        let acl = self.kernel.acl();
        let store = acl.store();
        Snapshot {
            kernel: self.kernel.address(),
            acl: acl.address(),
            kernel_nonce: self.kernel.nonce(),
            deploy_nonce: self.deploy_nonce,
            recovery_vault_app_id: self.kernel.recovery_vault_app_id(),
            facts: self.facts,
            registry: self
                .kernel
                .registry()
                .entries()
                .map(|(namespace, app_id, address)| RegistryRow {
                    namespace,
                    app_id,
                    address,
                })
                .collect(),
            managers: store
                .managers()
                .map(|(key, manager)| ManagerRow {
                    app: key.app,
                    role: key.role,
                    manager: *manager,
                })
                .collect(),
            grants: store
                .grants()
                .map(|(key, grant)| GrantRow {
                    grantee: key.grantee,
                    app: key.app,
                    role: key.role,
                    grant: *grant,
                })
                .collect(),
            params: store
                .param_sets()
                .map(|(hash, params)| ParamsRow {
                    hash: *hash,
                    params: params.to_vec(),
                })
                .collect(),
            proxies: self
                .proxies
                .iter()
                .map(|(instance, proxy)| ProxyRow {
                    instance: *instance,
                    proxy: *proxy,
                })
                .collect(),
            code: self
                .code
                .iter()
                .map(|(address, kind)| CodeRow {
                    address: *address,
                    kind: kind.clone(),
                })
                .collect(),
            storage: self
                .storage
                .iter()
                .flat_map(|(module, slots)| {
                    slots.iter().map(|(key, value)| StorageRow {
                        module: *module,
                        key: key.clone(),
                        value: value.clone(),
                    })
                })
                .collect(),
        }
    }

    /// Rebuild state from a snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Corrupt`] when a stored param list does not
    /// match its hash or a grant points at missing params.
    pub fn from_snapshot(snapshot: Snapshot, max_params: usize) -> Result<Self, HostError> {
        let mut registry = NamespaceRegistry::new();
        for row in snapshot.registry {
            registry.set(row.namespace, row.app_id, row.address);
        }

        let mut store = PermissionStore::new();
        for row in snapshot.params {
            if params_hash(&row.params) != row.hash {
                return Err(HostError::Corrupt(format!(
                    "params {} do not match their hash",
                    row.hash
                )));
            }
            store.insert_params(row.hash, row.params);
        }
        for row in snapshot.managers {
            store.set_manager(row.app, row.role, row.manager);
        }
        for row in snapshot.grants {
            if let Grant::Conditional(hash) = row.grant {
                if store.params(&hash).is_none() {
                    return Err(HostError::Corrupt(format!(
                        "grant to {} references missing params {hash}",
                        row.grantee
                    )));
                }
            }
            store.set_grant(row.grantee, row.app, row.role, Some(row.grant));
        }

        let acl = Acl::from_store(snapshot.acl, store, max_params);
        let kernel = Kernel::from_parts(
            snapshot.kernel,
            registry,
            acl,
            snapshot.recovery_vault_app_id,
            snapshot.kernel_nonce,
        );

        let mut storage: BTreeMap<Address, ModuleStorage> = BTreeMap::new();
        for row in snapshot.storage {
            storage.entry(row.module).or_default().insert(row.key, row.value);
        }

        Ok(Self {
            kernel,
            proxies: snapshot
                .proxies
                .into_iter()
                .map(|row| (row.instance, row.proxy))
                .collect(),
            code: snapshot
                .code
                .into_iter()
                .map(|row| (row.address, row.kind))
                .collect(),
            storage,
            facts: snapshot.facts,
            deploy_nonce: snapshot.deploy_nonce,
        })
    }
}

/// Read-only view used to answer oracle params.
pub struct OracleView<'a> {
    /// State being evaluated against.
    pub state: &'a OrgState,
    /// Code catalog.
    pub catalog: &'a Catalog,
}

impl<'a> OracleView<'a> {
    /// A view over `state`.
    pub fn new(state: &'a OrgState, catalog: &'a Catalog) -> Self {
        Self { state, catalog }
    }
}

impl OracleHost for OracleView<'_> {
    fn consult(
        &self,
        oracle: Address,
        request: &OracleRequest<'_>,
        env: EvalEnv<'_>,
    ) -> Result<bool, String> {
        let implementation = self
            .state
            .implementation(oracle)
            .ok_or_else(|| format!("no app instance at {oracle}"))?;
        let kind = self
            .state
            .code_at(implementation)
            .ok_or_else(|| format!("no code at {implementation}"))?;
        let code = self
            .catalog
            .get(kind)
            .ok_or_else(|| format!("unknown code kind {kind:?}"))?;
        let ctx = OracleContext::new(self.state, oracle, env);
        code.can_perform(&ctx, request)
    }
}

/// Serializable organization state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Kernel instance address.
    pub kernel: Address,
    /// ACL instance address.
    pub acl: Address,
    /// Instance-address nonce of the kernel.
    pub kernel_nonce: u64,
    /// Code deployment nonce.
    pub deploy_nonce: u64,
    /// Recovery vault app id.
    pub recovery_vault_app_id: AppId,
    /// Chain facts.
    pub facts: ChainFacts,
    /// Registry entries.
    pub registry: Vec<RegistryRow>,
    /// Permission managers.
    pub managers: Vec<ManagerRow>,
    /// Grants.
    pub grants: Vec<GrantRow>,
    /// Stored param lists.
    pub params: Vec<ParamsRow>,
    /// App instances.
    pub proxies: Vec<ProxyRow>,
    /// Deployed code.
    pub code: Vec<CodeRow>,
    /// Module storage slots.
    pub storage: Vec<StorageRow>,
}

impl Snapshot {
    /// Snapshot of a freshly bootstrapped organization.
    ///
    /// # Errors
    ///
    /// Fails if genesis itself fails.
    pub fn genesis(genesis: &Genesis, facts: ChainFacts) -> Result<Self, HostError> {
        let (kernel, _) = Kernel::genesis(genesis)?;
        Ok(OrgState::new(kernel, facts).snapshot())
    }
}

/// Registry row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryRow {
    /// Namespace.
    pub namespace: NamespaceId,
    /// App id.
    pub app_id: AppId,
    /// Address.
    pub address: Address,
}

/// Manager row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManagerRow {
    /// Module.
    pub app: Address,
    /// Role.
    pub role: RoleId,
    /// Manager record.
    pub manager: Manager,
}

/// Grant row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrantRow {
    /// Grantee.
    pub grantee: Grantee,
    /// Module.
    pub app: Address,
    /// Role.
    pub role: RoleId,
    /// Grant.
    pub grant: Grant,
}

/// Params row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParamsRow {
    /// Content hash.
    pub hash: ParamsHash,
    /// Params.
    pub params: Vec<Param>,
}

/// Proxy row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProxyRow {
    /// Instance address.
    pub instance: Address,
    /// Proxy record.
    pub proxy: AppProxy,
}

/// Code row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeRow {
    /// Implementation address.
    pub address: Address,
    /// Catalog kind.
    pub kind: String,
}

/// Storage row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageRow {
    /// Instance address.
    pub module: Address,
    /// Slot key.
    pub key: String,
    /// Slot value.
    pub value: ArgValue,
}
