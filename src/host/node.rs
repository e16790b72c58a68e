//! Single-owner actor that serializes top-level invocations.
//!
//! The [`Organization`] lives inside one task. Requests arrive on a bounded
//! [`mpsc`] channel and each carries a [`oneshot`] reply. After every commit
//! the node mines a block (with auto-mine on), persists the new state and
//! appends the events to the audit log. A failed save undoes the commit.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{error, trace, warn};

use super::org::Organization;
use super::state::Snapshot;
use super::{Call, HostError, Receipt};
use crate::acl::eval::ChainFacts;
use crate::audit::AuditLogger;
use crate::store::StateDb;
use crate::types::{Address, AppId, ArgValue, NamespaceId, RoleId};

/// Requests understood by the node.
#[derive(Debug)]
enum Request {
    Invoke {
        caller: Address,
        call: Call,
        reply: oneshot::Sender<Result<Receipt, HostError>>,
    },
    HasPermission {
        who: Address,
        app: Address,
        role: RoleId,
        args: Vec<ArgValue>,
        reply: oneshot::Sender<bool>,
    },
    Advance {
        blocks: u64,
        seconds: u64,
        reply: oneshot::Sender<Result<ChainFacts, HostError>>,
    },
    GetApp {
        namespace: NamespaceId,
        app_id: AppId,
        reply: oneshot::Sender<Address>,
    },
    Snapshot {
        reply: oneshot::Sender<Snapshot>,
    },
}

/// Side effects applied after each commit.
#[derive(Debug, Default)]
pub struct NodeOptions {
    /// Audit sink.
    pub audit: Option<Arc<AuditLogger>>,
    /// State database.
    pub db: Option<StateDb>,
    /// Seconds added per mined block.
    pub block_time_secs: u64,
    /// Mine a block after every committed invocation.
    pub auto_mine: bool,
    /// Request channel capacity.
    pub channel_buffer: usize,
}

/// Cloneable handle to a running node.
#[derive(Debug, Clone)]
pub struct NodeHandle {
    tx: mpsc::Sender<Request>,
}

/// Start a node owning `org`. The task ends when every handle is dropped and
/// yields the final organization.
pub fn spawn_node(org: Organization, options: NodeOptions) -> (NodeHandle, JoinHandle<Organization>) {
    let (tx, rx) = mpsc::channel(options.channel_buffer.max(1));
    let task = tokio::spawn(run_node(org, options, rx));
    (NodeHandle { tx }, task)
}

async fn run_node(
    mut org: Organization,
    options: NodeOptions,
    mut rx: mpsc::Receiver<Request>,
) -> Organization {
    while let Some(request) = rx.recv().await {
        match request {
            Request::Invoke {
                caller,
                call,
                reply,
            } => {
                let checkpoint = options.db.is_some().then(|| org.clone());
                let result = match org.invoke(caller, call) {
                    Ok(receipt) => commit(&mut org, &options, &receipt)
                        .await
                        .map(|()| receipt),
                    Err(err) => Err(err),
                };
                if matches!(result, Err(HostError::Persist(_))) {
                    rollback(&mut org, checkpoint);
                }
                let _ = reply.send(result);
            }
            Request::HasPermission {
                who,
                app,
                role,
                args,
                reply,
            } => {
                let _ = reply.send(org.has_permission(who, app, role, &args));
            }
            Request::Advance {
                blocks,
                seconds,
                reply,
            } => {
                let checkpoint = options.db.is_some().then(|| org.clone());
                let facts = org.advance(blocks, seconds);
                let result = persist(&org, &options).await.map(|()| facts);
                if result.is_err() {
                    rollback(&mut org, checkpoint);
                }
                let _ = reply.send(result);
            }
            Request::GetApp {
                namespace,
                app_id,
                reply,
            } => {
                let _ = reply.send(org.get_app(namespace, app_id));
            }
            Request::Snapshot { reply } => {
                let _ = reply.send(org.snapshot());
            }
        }
    }
    trace!("node stopped");
    org
}

/// Mine, persist, then audit. Nothing reaches the audit log unless the new
/// state is on disk.
async fn commit(
    org: &mut Organization,
    options: &NodeOptions,
    receipt: &Receipt,
) -> Result<(), HostError> {
    if options.auto_mine {
        org.advance(1, options.block_time_secs);
    }
    persist(org, options).await?;
    if let Some(audit) = &options.audit {
        if let Err(e) = audit.log_invocation(
            receipt.invocation_id,
            receipt.caller,
            receipt.block_number,
            &receipt.events,
        ) {
            warn!(invocation_id = %receipt.invocation_id, error = %e, "failed to write audit log");
        }
    }
    Ok(())
}

async fn persist(org: &Organization, options: &NodeOptions) -> Result<(), HostError> {
    let Some(db) = &options.db else {
        return Ok(());
    };
    db.save(&org.snapshot()).await.map_err(|e| {
        error!(error = %e, "failed to persist state");
        HostError::Persist(e.to_string())
    })
}

/// Put the organization back to the last state the database holds.
fn rollback(org: &mut Organization, checkpoint: Option<Organization>) {
    if let Some(previous) = checkpoint {
        warn!(block_number = previous.facts().block_number, "rolled back to persisted state");
        *org = previous;
    }
}

impl NodeHandle {
    async fn request<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> Request,
    ) -> Result<T, HostError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(build(reply))
            .await
            .map_err(|_| HostError::NodeStopped)?;
        rx.await.map_err(|_| HostError::NodeStopped)
    }

    /// Run one invocation.
    ///
    /// # Errors
    ///
    /// Returns the invocation's failure, [`HostError::Persist`] when the
    /// committed state could not be saved (the invocation is then undone), or
    /// [`HostError::NodeStopped`].
    pub async fn invoke(&self, caller: Address, call: Call) -> Result<Receipt, HostError> {
        self.request(|reply| Request::Invoke {
            caller,
            call,
            reply,
        })
        .await?
    }

    /// Permission query against committed state.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NodeStopped`] if the node is gone.
    pub async fn has_permission(
        &self,
        who: Address,
        app: Address,
        role: RoleId,
        args: Vec<ArgValue>,
    ) -> Result<bool, HostError> {
        self.request(|reply| Request::HasPermission {
            who,
            app,
            role,
            args,
            reply,
        })
        .await
    }

    /// Move the chain forward.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::Persist`] if the new facts could not be saved
    /// (the chain stays where it was), or [`HostError::NodeStopped`].
    pub async fn advance(&self, blocks: u64, seconds: u64) -> Result<ChainFacts, HostError> {
        self.request(|reply| Request::Advance {
            blocks,
            seconds,
            reply,
        })
        .await?
    }

    /// Registry read against committed state.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NodeStopped`] if the node is gone.
    pub async fn get_app(&self, namespace: NamespaceId, app_id: AppId) -> Result<Address, HostError> {
        self.request(|reply| Request::GetApp {
            namespace,
            app_id,
            reply,
        })
        .await
    }

    /// Copy of the committed state.
    ///
    /// # Errors
    ///
    /// Returns [`HostError::NodeStopped`] if the node is gone.
    pub async fn snapshot(&self) -> Result<Snapshot, HostError> {
        self.request(|reply| Request::Snapshot { reply }).await
    }
}
