//! Change events and the append-only audit log.
//!
//! Every committed invocation yields a list of [`Event`]s. The
//! [`AuditLogger`] writes one JSON object per event, one per line. The log is
//! an off-path trail: failing to write it never affects the committed state.

use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::acl::params::ParamsHash;
use crate::acl::store::{Grant, Grantee, Manager};
use crate::types::{Address, AppId, NamespaceId, RoleId};

/// A state change made by the kernel or the ACL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum Event {
    /// A registry entry was written.
    SetApp {
        /// Namespace written.
        namespace: NamespaceId,
        /// App id written.
        app_id: AppId,
        /// Previous address (null if unset).
        old: Address,
        /// New address.
        new: Address,
    },
    /// An app instance was created behind a proxy.
    NewAppProxy {
        /// Address of the new instance.
        proxy: Address,
        /// App id it forwards for.
        app_id: AppId,
        /// Whether the implementation is re-resolved on every call.
        upgradeable: bool,
        /// Implementation at creation time.
        base: Address,
    },
    /// The recovery vault app id changed.
    SetRecoveryVaultAppId {
        /// Previous id.
        old: Option<AppId>,
        /// New id.
        new: AppId,
    },
    /// A grant was set, replaced or removed.
    SetPermission {
        /// Grantee.
        entity: Grantee,
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
        /// Previous grant.
        old: Option<Grant>,
        /// New grant (`None` = revoked).
        new: Option<Grant>,
    },
    /// A conditional grant was attached to a predicate.
    SetPermissionParams {
        /// Grantee.
        entity: Grantee,
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
        /// Hash of the stored params.
        params_hash: ParamsHash,
    },
    /// A permission manager was set, transferred or frozen.
    ChangePermissionManager {
        /// Module the role belongs to.
        app: Address,
        /// Role.
        role: RoleId,
        /// Previous manager (`None` before creation).
        old: Option<Manager>,
        /// New manager.
        new: Manager,
    },
}

impl Event {
    /// Short snake_case name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::SetApp { .. } => "set_app",
            Self::NewAppProxy { .. } => "new_app_proxy",
            Self::SetRecoveryVaultAppId { .. } => "set_recovery_vault_app_id",
            Self::SetPermission { .. } => "set_permission",
            Self::SetPermissionParams { .. } => "set_permission_params",
            Self::ChangePermissionManager { .. } => "change_permission_manager",
        }
    }
}

/// One line of the audit log.
#[derive(Debug, Serialize)]
struct AuditEntry<'a> {
    timestamp: String,
    invocation_id: Uuid,
    caller: Address,
    block_number: u64,
    #[serde(flatten)]
    event: &'a Event,
}

/// Audit logger writing structured JSON to an append-only sink.
pub struct AuditLogger {
    writer: Mutex<Box<dyn Write + Send>>,
}

impl std::fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuditLogger").finish_non_exhaustive()
    }
}

impl AuditLogger {
    /// Create an audit logger that appends to the given file path.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened for appending.
    pub fn new(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path.as_ref())?;
        Ok(Self {
            writer: Mutex::new(Box::new(file)),
        })
    }

    /// Create an audit logger from an arbitrary writer (for testing).
    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    /// Log the events of one committed invocation.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or the write fails.
    pub fn log_invocation(
        &self,
        invocation_id: Uuid,
        caller: Address,
        block_number: u64,
        events: &[Event],
    ) -> anyhow::Result<()> {
        let mut writer = self
            .writer
            .lock()
            .map_err(|e| anyhow::anyhow!("audit writer lock poisoned: {e}"))?;
        for event in events {
            let entry = AuditEntry {
                timestamp: Utc::now().to_rfc3339(),
                invocation_id,
                caller,
                block_number,
                event,
            };
            let line = serde_json::to_string(&entry)?;
            writeln!(writer, "{line}")?;
        }
        writer.flush()?;
        Ok(())
    }
}
