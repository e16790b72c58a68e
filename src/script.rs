//! TOML scripts driving a running node.
//!
//! A script is a list of `[[step]]` tables. Each step names an `action`, the
//! identity it acts `from` (default: the root identity), and what it should
//! `expect`: `ok` (the default), or the failure class `denied`,
//! `invalid_config` or `execution`. A step whose outcome differs from its
//! expectation stops the script.
//!
//! ```toml
//! [[step]]
//! action = "deploy"
//! kind = "settings"
//! as = "settings_base"
//!
//! [[step]]
//! action = "new_app_instance"
//! app_id = "settings"
//! base = "settings_base"
//! set_default = true
//! initialize = []
//! as = "settings"
//!
//! [[step]]
//! action = "call"
//! from = "alice"
//! target = "settings"
//! method = "set"
//! args = ["color", "blue"]
//! expect = "denied"
//! ```
//!
//! Address fields accept `kernel`, `acl`, an alias bound by an earlier `as`,
//! a `0x` address, or any other text, which is hashed into an address with
//! [`Address::from_label`]. App ids and roles are names hashed the same way
//! as in code (or `0x` hex). Arguments are integers, booleans, `@name`
//! addresses, plain strings (as UTF-8 bytes) or explicit
//! `{ type = "...", value = ... }` tables.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::acl::params::Param;
use crate::acl::predicate::Predicate;
use crate::acl::store::Grantee;
use crate::error::FailureKind;
use crate::host::{AclCall, Call, HostError, KernelCall, NodeHandle, Receipt};
use crate::kernel::namespace_by_name;
use crate::types::{Address, AppId, ArgValue, NamespaceId, ParseError, RoleId};

/// Errors from loading or running a script.
#[derive(Debug, Error)]
pub enum ScriptError {
    /// The script file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Script path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// The script is not valid TOML or has unknown actions.
    #[error("failed to parse script: {0}")]
    Parse(#[from] toml::de::Error),

    /// A field could not be turned into an address or identifier.
    #[error("step {step}: bad value {value:?}: {source}")]
    Value {
        /// 1-based step number.
        step: usize,
        /// Offending text.
        value: String,
        /// Parse failure.
        source: ParseError,
    },

    /// The step is well-formed TOML but makes no sense.
    #[error("step {step}: {reason}")]
    Invalid {
        /// 1-based step number.
        step: usize,
        /// What is wrong.
        reason: String,
    },

    /// The step succeeded but a failure was expected.
    #[error("step {step} ({action}): expected {expected}, but it succeeded")]
    UnexpectedSuccess {
        /// 1-based step number.
        step: usize,
        /// Action name.
        action: &'static str,
        /// Expected failure class.
        expected: FailureKind,
    },

    /// The step failed other than expected.
    #[error("step {step} ({action}): expected {expected}, got {source}")]
    Failed {
        /// 1-based step number.
        step: usize,
        /// Action name.
        action: &'static str,
        /// What the step should have done.
        expected: Expect,
        /// The failure.
        source: HostError,
    },

    /// A query or return value did not match.
    #[error("step {step} ({action}): expected {expected}, got {actual}")]
    Mismatch {
        /// 1-based step number.
        step: usize,
        /// Action name.
        action: &'static str,
        /// Expected value.
        expected: String,
        /// Observed value.
        actual: String,
    },

    /// The node went away.
    #[error("node unavailable: {0}")]
    Node(HostError),
}

/// Expected outcome of a step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expect {
    /// The step commits.
    #[default]
    Ok,
    /// The step is rejected for lack of permission.
    Denied,
    /// The step is rejected as a logic error.
    InvalidConfig,
    /// The host fails to execute the step.
    Execution,
}

impl Expect {
    fn failure(self) -> Option<FailureKind> {
        match self {
            Self::Ok => None,
            Self::Denied => Some(FailureKind::Denied),
            Self::InvalidConfig => Some(FailureKind::InvalidConfig),
            Self::Execution => Some(FailureKind::Execution),
        }
    }
}

impl std::fmt::Display for Expect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.failure() {
            None => f.write_str("ok"),
            Some(kind) => write!(f, "{kind}"),
        }
    }
}

/// A call argument as written in a script.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ScriptArg {
    /// `{ type = "uint", value = "..." }` and friends.
    Typed(ArgValue),
    /// `true` / `false`.
    Bool(bool),
    /// Non-negative integer.
    Int(u64),
    /// `@name` for an address, anything else as UTF-8 bytes.
    Text(String),
}

/// A parsed script.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Script {
    /// Steps in order.
    #[serde(default, rename = "step")]
    pub steps: Vec<Step>,
}

/// One step.
#[derive(Debug, Clone, Deserialize)]
pub struct Step {
    /// Acting identity; the runner's default caller when absent.
    #[serde(default)]
    pub from: Option<String>,
    /// Expected outcome.
    #[serde(default)]
    pub expect: Expect,
    /// What to do.
    #[serde(flatten)]
    pub action: Action,
}

/// Step actions.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum Action {
    /// Deploy code of a catalog kind.
    Deploy {
        /// Catalog kind.
        kind: String,
        /// Alias for the deployed address.
        #[serde(default, rename = "as")]
        alias: Option<String>,
    },
    /// Create an app instance.
    NewAppInstance {
        /// App id name.
        app_id: String,
        /// Implementation address.
        base: String,
        /// Pin the instance to `base`.
        #[serde(default)]
        pinned: bool,
        /// Register as the app's default instance.
        #[serde(default)]
        set_default: bool,
        /// `initialize` arguments; absent skips initialization.
        #[serde(default)]
        initialize: Option<Vec<ScriptArg>>,
        /// Alias for the instance address.
        #[serde(default, rename = "as")]
        alias: Option<String>,
    },
    /// Write a registry entry.
    SetApp {
        /// `core`, `base` or `app`.
        namespace: String,
        /// App id name.
        app_id: String,
        /// New address.
        address: String,
    },
    /// Change the recovery vault app id.
    SetRecoveryVaultAppId {
        /// App id name.
        app_id: String,
    },
    /// Create a permission.
    CreatePermission {
        /// First grantee, or `anyone`.
        entity: String,
        /// Module.
        app: String,
        /// Role name.
        role: String,
        /// Manager.
        manager: String,
    },
    /// Create a permission that is frozen from the start.
    CreateBurnedPermission {
        /// Module.
        app: String,
        /// Role name.
        role: String,
    },
    /// Grant a role, optionally under a condition.
    Grant {
        /// Grantee, or `anyone`.
        entity: String,
        /// Module.
        app: String,
        /// Role name.
        role: String,
        /// Condition as a predicate tree.
        #[serde(default)]
        predicate: Option<Predicate>,
        /// Oracle module the grant defers to (and-ed with `predicate`).
        #[serde(default)]
        oracle: Option<String>,
        /// Condition as raw params.
        #[serde(default)]
        params: Option<Vec<Param>>,
    },
    /// Revoke a grant.
    Revoke {
        /// Grantee, or `anyone`.
        entity: String,
        /// Module.
        app: String,
        /// Role name.
        role: String,
    },
    /// Hand a permission to a new manager.
    SetPermissionManager {
        /// New manager.
        manager: String,
        /// Module.
        app: String,
        /// Role name.
        role: String,
    },
    /// Freeze a permission.
    BurnPermissionManager {
        /// Module.
        app: String,
        /// Role name.
        role: String,
    },
    /// Call an app instance.
    Call {
        /// Instance.
        target: String,
        /// Method name.
        method: String,
        /// Arguments.
        #[serde(default)]
        args: Vec<ScriptArg>,
        /// Expected return value.
        #[serde(default)]
        returns: Option<ScriptArg>,
    },
    /// Move the chain forward.
    Advance {
        /// Blocks to add.
        #[serde(default)]
        blocks: u64,
        /// Seconds to add.
        #[serde(default)]
        seconds: u64,
    },
    /// Assert a permission query result.
    Check {
        /// Entity asking.
        who: String,
        /// Module.
        app: String,
        /// Role name.
        role: String,
        /// Call arguments.
        #[serde(default)]
        args: Vec<ScriptArg>,
        /// Expected answer.
        allowed: bool,
    },
    /// Assert a registry entry.
    GetApp {
        /// `core`, `base` or `app`.
        namespace: String,
        /// App id name.
        app_id: String,
        /// Expected address.
        equals: String,
    },
}

impl Action {
    /// Action name as written in scripts.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Deploy { .. } => "deploy",
            Self::NewAppInstance { .. } => "new_app_instance",
            Self::SetApp { .. } => "set_app",
            Self::SetRecoveryVaultAppId { .. } => "set_recovery_vault_app_id",
            Self::CreatePermission { .. } => "create_permission",
            Self::CreateBurnedPermission { .. } => "create_burned_permission",
            Self::Grant { .. } => "grant",
            Self::Revoke { .. } => "revoke",
            Self::SetPermissionManager { .. } => "set_permission_manager",
            Self::BurnPermissionManager { .. } => "burn_permission_manager",
            Self::Call { .. } => "call",
            Self::Advance { .. } => "advance",
            Self::Check { .. } => "check",
            Self::GetApp { .. } => "get_app",
        }
    }

    fn alias(&self) -> Option<&str> {
        match self {
            Self::Deploy { alias, .. } | Self::NewAppInstance { alias, .. } => alias.as_deref(),
            _ => None,
        }
    }
}

impl Script {
    /// Parse a script from TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Parse`] on invalid TOML or unknown actions.
    pub fn from_toml(text: &str) -> Result<Self, ScriptError> {
        Ok(toml::from_str(text)?)
    }

    /// Read and parse a script file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ScriptError> {
        let text = std::fs::read_to_string(path).map_err(|source| ScriptError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml(&text)
    }
}

/// How a step ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    /// The invocation committed.
    Committed {
        /// Invocation id, as in the audit log.
        invocation_id: Uuid,
        /// Events emitted.
        events: usize,
    },
    /// The invocation failed as expected.
    Rejected {
        /// Failure class.
        kind: FailureKind,
        /// Failure message.
        reason: String,
    },
    /// A query step held.
    Held,
}

/// Record of one executed step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepOutcome {
    /// 1-based step number.
    pub step: usize,
    /// Action name.
    pub action: &'static str,
    /// How it ended.
    #[serde(flatten)]
    pub status: StepStatus,
    /// Returned value, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<ArgValue>,
}

/// Result of a fully successful script run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScriptReport {
    /// Per-step records.
    pub steps: Vec<StepOutcome>,
    /// Aliases bound by `as`.
    pub aliases: BTreeMap<String, Address>,
}

impl ScriptReport {
    /// Number of committed invocations.
    pub fn committed(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| matches!(s.status, StepStatus::Committed { .. }))
            .count()
    }
}

/// Runs scripts against a node, keeping aliases across runs.
#[derive(Debug)]
pub struct ScriptRunner<'a> {
    node: &'a NodeHandle,
    caller: Address,
    kernel: Address,
    acl: Address,
    aliases: BTreeMap<String, Address>,
}

impl<'a> ScriptRunner<'a> {
    /// Runner acting as `caller` when a step has no `from`.
    ///
    /// # Errors
    ///
    /// Returns [`ScriptError::Node`] if the node is gone.
    pub async fn new(node: &'a NodeHandle, caller: Address) -> Result<Self, ScriptError> {
        let snapshot = node.snapshot().await.map_err(ScriptError::Node)?;
        Ok(Self {
            node,
            caller,
            kernel: snapshot.kernel,
            acl: snapshot.acl,
            aliases: BTreeMap::new(),
        })
    }

    /// Run every step in order, stopping at the first unexpected outcome.
    ///
    /// Steps that committed before the stop stay committed.
    ///
    /// # Errors
    ///
    /// Returns the first step that did not behave as expected.
    pub async fn run(&mut self, script: &Script) -> Result<ScriptReport, ScriptError> {
        let mut steps = Vec::with_capacity(script.steps.len());
        for (index, step) in script.steps.iter().enumerate() {
            let number = index.saturating_add(1);
            debug!(step = number, action = step.action.name(), "running script step");
            steps.push(self.step(number, step).await?);
        }
        info!(steps = steps.len(), "script finished");
        Ok(ScriptReport {
            steps,
            aliases: self.aliases.clone(),
        })
    }

    async fn step(&mut self, number: usize, step: &Step) -> Result<StepOutcome, ScriptError> {
        let action = step.action.name();
        let caller = match &step.from {
            Some(from) => self.address(number, from)?,
            None => self.caller,
        };

        let call = match self.query(number, step).await? {
            Some(outcome) => return Ok(outcome),
            None => self.call(number, &step.action)?,
        };

        match (self.node.invoke(caller, call).await, step.expect.failure()) {
            (Err(err @ (HostError::NodeStopped | HostError::Persist(_))), _) => {
                Err(ScriptError::Node(err))
            }
            (Ok(receipt), None) => self.committed(number, &step.action, receipt),
            (Ok(_), Some(expected)) => Err(ScriptError::UnexpectedSuccess {
                step: number,
                action,
                expected,
            }),
            (Err(err), Some(expected)) if err.kind() == expected => Ok(StepOutcome {
                step: number,
                action,
                status: StepStatus::Rejected {
                    kind: expected,
                    reason: err.to_string(),
                },
                output: None,
            }),
            (Err(source), _) => Err(ScriptError::Failed {
                step: number,
                action,
                expected: step.expect,
                source,
            }),
        }
    }

    fn committed(
        &mut self,
        number: usize,
        action: &Action,
        receipt: Receipt,
    ) -> Result<StepOutcome, ScriptError> {
        if let Some(alias) = action.alias() {
            match &receipt.output {
                Some(ArgValue::Address(addr)) => {
                    self.aliases.insert(alias.to_owned(), *addr);
                }
                other => {
                    return Err(ScriptError::Invalid {
                        step: number,
                        reason: format!("cannot bind {alias:?} to {other:?}"),
                    })
                }
            }
        }
        if let Action::Call {
            returns: Some(expected),
            ..
        } = action
        {
            let expected = self.arg(number, expected)?;
            if receipt.output.as_ref() != Some(&expected) {
                return Err(ScriptError::Mismatch {
                    step: number,
                    action: action.name(),
                    expected: expected.to_string(),
                    actual: receipt
                        .output
                        .as_ref()
                        .map_or_else(|| "nothing".to_owned(), ToString::to_string),
                });
            }
        }
        Ok(StepOutcome {
            step: number,
            action: action.name(),
            status: StepStatus::Committed {
                invocation_id: receipt.invocation_id,
                events: receipt.events.len(),
            },
            output: receipt.output,
        })
    }

    /// Run query actions directly; `None` means the action is an invocation.
    async fn query(&self, number: usize, step: &Step) -> Result<Option<StepOutcome>, ScriptError> {
        let action = step.action.name();
        let is_query = matches!(
            step.action,
            Action::Advance { .. } | Action::Check { .. } | Action::GetApp { .. }
        );
        if !is_query {
            return Ok(None);
        }
        if step.expect != Expect::Ok {
            return Err(ScriptError::Invalid {
                step: number,
                reason: format!("{action} cannot expect a failure"),
            });
        }

        let output = match &step.action {
            Action::Advance { blocks, seconds } => {
                let facts = self
                    .node
                    .advance(*blocks, *seconds)
                    .await
                    .map_err(ScriptError::Node)?;
                Some(ArgValue::from(facts.block_number))
            }
            Action::Check {
                who,
                app,
                role,
                args,
                allowed,
            } => {
                let args = args
                    .iter()
                    .map(|a| self.arg(number, a))
                    .collect::<Result<Vec<_>, _>>()?;
                let actual = self
                    .node
                    .has_permission(
                        self.address(number, who)?,
                        self.address(number, app)?,
                        role_id(number, role)?,
                        args,
                    )
                    .await
                    .map_err(ScriptError::Node)?;
                if actual != *allowed {
                    return Err(ScriptError::Mismatch {
                        step: number,
                        action,
                        expected: allowed.to_string(),
                        actual: actual.to_string(),
                    });
                }
                Some(ArgValue::Bool(actual))
            }
            Action::GetApp {
                namespace,
                app_id: id,
                equals,
            } => {
                let expected = self.address(number, equals)?;
                let actual = self
                    .node
                    .get_app(self.namespace(number, namespace)?, app_id(number, id)?)
                    .await
                    .map_err(ScriptError::Node)?;
                if actual != expected {
                    return Err(ScriptError::Mismatch {
                        step: number,
                        action,
                        expected: expected.to_string(),
                        actual: actual.to_string(),
                    });
                }
                Some(ArgValue::Address(actual))
            }
            _ => None,
        };

        Ok(Some(StepOutcome {
            step: number,
            action,
            status: StepStatus::Held,
            output,
        }))
    }

    fn call(&self, number: usize, action: &Action) -> Result<Call, ScriptError> {
        let call = match action {
            Action::Deploy { kind, .. } => Call::Deploy { kind: kind.clone() },
            Action::NewAppInstance {
                app_id: id,
                base,
                pinned,
                set_default,
                initialize,
                ..
            } => Call::Kernel(KernelCall::NewAppInstance {
                app_id: app_id(number, id)?,
                base: self.address(number, base)?,
                pinned: *pinned,
                set_default: *set_default,
                initialize: initialize
                    .as_ref()
                    .map(|args| self.args(number, args))
                    .transpose()?,
            }),
            Action::SetApp {
                namespace,
                app_id: id,
                address,
            } => Call::Kernel(KernelCall::SetApp {
                namespace: self.namespace(number, namespace)?,
                app_id: app_id(number, id)?,
                address: self.address(number, address)?,
            }),
            Action::SetRecoveryVaultAppId { app_id: id } => {
                Call::Kernel(KernelCall::SetRecoveryVaultAppId {
                    app_id: app_id(number, id)?,
                })
            }
            Action::CreatePermission {
                entity,
                app,
                role,
                manager,
            } => Call::Acl(AclCall::CreatePermission {
                entity: self.grantee(number, entity)?,
                app: self.address(number, app)?,
                role: role_id(number, role)?,
                manager: self.address(number, manager)?,
            }),
            Action::CreateBurnedPermission { app, role } => {
                Call::Acl(AclCall::CreateBurnedPermission {
                    app: self.address(number, app)?,
                    role: role_id(number, role)?,
                })
            }
            Action::Grant {
                entity,
                app,
                role,
                predicate,
                oracle,
                params,
            } => {
                let entity = self.grantee(number, entity)?;
                let app = self.address(number, app)?;
                let role = role_id(number, role)?;
                let oracle = oracle
                    .as_deref()
                    .map(|o| self.address(number, o).map(Predicate::Oracle))
                    .transpose()?;
                let condition = match (predicate.clone(), oracle) {
                    (Some(p), Some(o)) => Some(p.and(o)),
                    (p, o) => p.or(o),
                };
                match (params, condition) {
                    (Some(_), Some(_)) => {
                        return Err(ScriptError::Invalid {
                            step: number,
                            reason: "grant takes either params or a predicate, not both"
                                .to_owned(),
                        })
                    }
                    (Some(params), None) => Call::Acl(AclCall::GrantParams {
                        entity,
                        app,
                        role,
                        params: params.clone(),
                    }),
                    (None, Some(predicate)) => Call::Acl(AclCall::GrantPredicate {
                        entity,
                        app,
                        role,
                        predicate,
                    }),
                    (None, None) => Call::Acl(AclCall::Grant { entity, app, role }),
                }
            }
            Action::Revoke { entity, app, role } => Call::Acl(AclCall::Revoke {
                entity: self.grantee(number, entity)?,
                app: self.address(number, app)?,
                role: role_id(number, role)?,
            }),
            Action::SetPermissionManager { manager, app, role } => {
                Call::Acl(AclCall::SetManager {
                    new_manager: self.address(number, manager)?,
                    app: self.address(number, app)?,
                    role: role_id(number, role)?,
                })
            }
            Action::BurnPermissionManager { app, role } => Call::Acl(AclCall::BurnManager {
                app: self.address(number, app)?,
                role: role_id(number, role)?,
            }),
            Action::Call {
                target,
                method,
                args,
                ..
            } => Call::App {
                target: self.address(number, target)?,
                method: method.clone(),
                args: self.args(number, args)?,
            },
            Action::Advance { .. } | Action::Check { .. } | Action::GetApp { .. } => {
                return Err(ScriptError::Invalid {
                    step: number,
                    reason: format!("{} is not an invocation", action.name()),
                })
            }
        };
        Ok(call)
    }

    /// Permission query with script-style references, for one-off checks.
    ///
    /// # Errors
    ///
    /// Returns an error for malformed references or a stopped node.
    pub async fn query_permission(
        &self,
        who: &str,
        app: &str,
        role: &str,
        args: &[ScriptArg],
    ) -> Result<bool, ScriptError> {
        let args = self.args(0, args)?;
        self.node
            .has_permission(
                self.address(0, who)?,
                self.address(0, app)?,
                role_id(0, role)?,
                args,
            )
            .await
            .map_err(ScriptError::Node)
    }

    /// Resolve an address reference.
    fn address(&self, number: usize, text: &str) -> Result<Address, ScriptError> {
        let text = text.trim();
        match text {
            "kernel" => return Ok(self.kernel),
            "acl" => return Ok(self.acl),
            _ => {}
        }
        if let Some(addr) = self.aliases.get(text) {
            return Ok(*addr);
        }
        if text.starts_with("0x") {
            return text.parse().map_err(|source| ScriptError::Value {
                step: number,
                value: text.to_owned(),
                source,
            });
        }
        Ok(Address::from_label(text))
    }

    fn grantee(&self, number: usize, text: &str) -> Result<Grantee, ScriptError> {
        if text.trim() == "anyone" {
            return Ok(Grantee::Anyone);
        }
        self.address(number, text).map(Grantee::Entity)
    }

    fn namespace(&self, number: usize, name: &str) -> Result<NamespaceId, ScriptError> {
        namespace_by_name(name).ok_or_else(|| ScriptError::Invalid {
            step: number,
            reason: format!("unknown namespace {name:?} (use core, base or app)"),
        })
    }

    fn arg(&self, number: usize, arg: &ScriptArg) -> Result<ArgValue, ScriptError> {
        Ok(match arg {
            ScriptArg::Typed(value) => value.clone(),
            ScriptArg::Bool(b) => ArgValue::Bool(*b),
            ScriptArg::Int(n) => ArgValue::from(*n),
            ScriptArg::Text(text) => match text.strip_prefix('@') {
                Some(name) => ArgValue::Address(self.address(number, name)?),
                None => ArgValue::Bytes(text.as_bytes().to_vec()),
            },
        })
    }

    fn args(&self, number: usize, args: &[ScriptArg]) -> Result<Vec<ArgValue>, ScriptError> {
        args.iter().map(|a| self.arg(number, a)).collect()
    }
}

impl ScriptArg {
    /// Read a command-line argument: `true`/`false`, a decimal integer, or
    /// text with the same `@name` rule as scripts.
    pub fn parse_cli(text: &str) -> Self {
        match text {
            "true" => Self::Bool(true),
            "false" => Self::Bool(false),
            _ => text
                .parse()
                .map_or_else(|_| Self::Text(text.to_owned()), Self::Int),
        }
    }
}

fn identifier<T: std::str::FromStr<Err = ParseError>>(
    number: usize,
    text: &str,
    named: fn(&str) -> T,
) -> Result<T, ScriptError> {
    let text = text.trim();
    if text.starts_with("0x") {
        return text.parse().map_err(|source| ScriptError::Value {
            step: number,
            value: text.to_owned(),
            source,
        });
    }
    Ok(named(text))
}

fn app_id(number: usize, text: &str) -> Result<AppId, ScriptError> {
    identifier(number, text, AppId::named)
}

fn role_id(number: usize, text: &str) -> Result<RoleId, ScriptError> {
    identifier(number, text, RoleId::named)
}
