//! Persisted organization state backed by SQLite.
//!
//! Each committed [`Snapshot`] is saved in one transaction. Rows are keyed by
//! stable identifiers and only rows that changed since the previous save are
//! written. Schema is applied inline via `include_str!` on open.

use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use crate::acl::eval::ChainFacts;
use crate::host::state::{
    CodeRow, GrantRow, ManagerRow, ParamsRow, ProxyRow, RegistryRow, StorageRow,
};
use crate::host::Snapshot;

/// Errors from the state database.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database could not be opened, read or written.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// The database directory could not be created.
    #[error("failed to create {path}: {source}")]
    Io {
        /// Directory path.
        path: String,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A column could not be encoded or decoded.
    #[error("bad value in {table}.{column}: {reason}")]
    Decode {
        /// Table.
        table: &'static str,
        /// Column.
        column: &'static str,
        /// What went wrong.
        reason: String,
    },
}

/// SQLite database holding one organization.
#[derive(Debug, Clone)]
pub struct StateDb {
    pool: SqlitePool,
    /// Encoded rows of the last snapshot saved or loaded through this handle.
    saved: Arc<Mutex<Option<Vec<Rows>>>>,
}

/// Encoded rows of one table: key columns to value columns.
type Rows = BTreeMap<Vec<String>, Vec<String>>;

/// Column layout of a table, keyed by stable identifiers.
struct Table {
    name: &'static str,
    keys: &'static [&'static str],
    values: &'static [&'static str],
}

impl Table {
    fn upsert_sql(&self) -> String {
        let columns: Vec<&str> = self.keys.iter().chain(self.values).copied().collect();
        let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        let updates: Vec<String> = self
            .values
            .iter()
            .map(|column| format!("{column} = excluded.{column}"))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            self.name,
            columns.join(", "),
            placeholders.join(", "),
            self.keys.join(", "),
            updates.join(", ")
        )
    }

    fn delete_sql(&self) -> String {
        let conditions: Vec<String> = self
            .keys
            .iter()
            .zip(1..)
            .map(|(column, i)| format!("{column} = ?{i}"))
            .collect();
        format!("DELETE FROM {} WHERE {}", self.name, conditions.join(" AND "))
    }
}

/// Tables in the order [`encode`] produces their rows.
const TABLES: [Table; 8] = [
    Table {
        name: "meta",
        keys: &["key"],
        values: &["value"],
    },
    Table {
        name: "registry",
        keys: &["namespace", "app_id"],
        values: &["address"],
    },
    Table {
        name: "permission_managers",
        keys: &["app", "role"],
        values: &["manager"],
    },
    Table {
        name: "permission_params",
        keys: &["hash"],
        values: &["params"],
    },
    Table {
        name: "permission_grants",
        keys: &["grantee", "app", "role"],
        values: &["record"],
    },
    Table {
        name: "proxies",
        keys: &["instance"],
        values: &["proxy"],
    },
    Table {
        name: "code",
        keys: &["address"],
        values: &["kind"],
    },
    Table {
        name: "module_storage",
        keys: &["module", "key"],
        values: &["value"],
    },
];

/// Text columns for every row of `snapshot`, one map per entry of [`TABLES`].
fn encode(snapshot: &Snapshot) -> Result<Vec<Rows>, StoreError> {
    let meta = [
        ("kernel", snapshot.kernel.to_string()),
        ("acl", snapshot.acl.to_string()),
        ("kernel_nonce", snapshot.kernel_nonce.to_string()),
        ("deploy_nonce", snapshot.deploy_nonce.to_string()),
        (
            "recovery_vault_app_id",
            snapshot.recovery_vault_app_id.to_string(),
        ),
        ("block_number", snapshot.facts.block_number.to_string()),
        ("timestamp", snapshot.facts.timestamp.to_string()),
    ]
    .into_iter()
    .map(|(key, value)| (vec![key.to_owned()], vec![value]))
    .collect();

    let registry = snapshot
        .registry
        .iter()
        .map(|row| {
            (
                vec![row.namespace.to_string(), row.app_id.to_string()],
                vec![row.address.to_string()],
            )
        })
        .collect();

    let managers = snapshot
        .managers
        .iter()
        .map(|row| {
            Ok((
                vec![row.app.to_string(), row.role.to_string()],
                vec![to_json("permission_managers", "manager", &row.manager)?],
            ))
        })
        .collect::<Result<_, StoreError>>()?;

    let params = snapshot
        .params
        .iter()
        .map(|row| {
            Ok((
                vec![row.hash.to_string()],
                vec![to_json("permission_params", "params", &row.params)?],
            ))
        })
        .collect::<Result<_, StoreError>>()?;

    let grants = snapshot
        .grants
        .iter()
        .map(|row| {
            Ok((
                vec![
                    to_json("permission_grants", "grantee", &row.grantee)?,
                    row.app.to_string(),
                    row.role.to_string(),
                ],
                vec![to_json("permission_grants", "record", &row.grant)?],
            ))
        })
        .collect::<Result<_, StoreError>>()?;

    let proxies = snapshot
        .proxies
        .iter()
        .map(|row| {
            Ok((
                vec![row.instance.to_string()],
                vec![to_json("proxies", "proxy", &row.proxy)?],
            ))
        })
        .collect::<Result<_, StoreError>>()?;

    let code = snapshot
        .code
        .iter()
        .map(|row| (vec![row.address.to_string()], vec![row.kind.clone()]))
        .collect();

    let storage = snapshot
        .storage
        .iter()
        .map(|row| {
            Ok((
                vec![row.module.to_string(), row.key.clone()],
                vec![to_json("module_storage", "value", &row.value)?],
            ))
        })
        .collect::<Result<_, StoreError>>()?;

    Ok(vec![
        meta, registry, managers, params, grants, proxies, code, storage,
    ])
}

fn decode<T: FromStr>(table: &'static str, column: &'static str, raw: &str) -> Result<T, StoreError>
where
    T::Err: std::fmt::Display,
{
    raw.parse().map_err(|e: T::Err| StoreError::Decode {
        table,
        column,
        reason: e.to_string(),
    })
}

fn from_json<T: DeserializeOwned>(
    table: &'static str,
    column: &'static str,
    raw: &str,
) -> Result<T, StoreError> {
    serde_json::from_str(raw).map_err(|e| StoreError::Decode {
        table,
        column,
        reason: e.to_string(),
    })
}

fn to_json<T: Serialize>(table: &'static str, column: &'static str, value: &T) -> Result<String, StoreError> {
    serde_json::to_string(value).map_err(|e| StoreError::Decode {
        table,
        column,
        reason: e.to_string(),
    })
}

impl StateDb {
    /// Open (or create) the database at `path` and apply the schema.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or the schema fails.
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.display().to_string(),
                source,
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .pragma("trusted_schema", "OFF");

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        sqlx::raw_sql(include_str!("../migrations/001_state.sql"))
            .execute(&pool)
            .await?;

        debug!(path = %path.display(), "state db opened");
        Ok(Self {
            pool,
            saved: Arc::new(Mutex::new(None)),
        })
    }

    /// Replace the stored state with `snapshot`.
    ///
    /// Only rows that differ from the last save through this handle are
    /// written or deleted. The first save after [`open`](Self::open) rewrites
    /// every table unless [`load`](Self::load) ran first.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails; the previous state is kept.
    pub async fn save(&self, snapshot: &Snapshot) -> Result<(), StoreError> {
        let rows = encode(snapshot)?;
        let mut saved = self.saved.lock().await;
        let empty = Rows::new();
        let mut written: usize = 0;
        let mut removed: usize = 0;

        let mut tx = self.pool.begin().await?;
        for (index, (table, new)) in TABLES.iter().zip(&rows).enumerate() {
            let old = match saved.as_ref().and_then(|previous| previous.get(index)) {
                Some(old) => old,
                None => {
                    sqlx::query(&format!("DELETE FROM {}", table.name))
                        .execute(&mut *tx)
                        .await?;
                    &empty
                }
            };

            let upsert = table.upsert_sql();
            for (key, values) in new {
                if old.get(key) == Some(values) {
                    continue;
                }
                let mut query = sqlx::query(&upsert);
                for value in key.iter().chain(values) {
                    query = query.bind(value.as_str());
                }
                query.execute(&mut *tx).await?;
                written = written.saturating_add(1);
            }

            let delete = table.delete_sql();
            for key in old.keys().filter(|key| !new.contains_key(*key)) {
                let mut query = sqlx::query(&delete);
                for value in key {
                    query = query.bind(value.as_str());
                }
                query.execute(&mut *tx).await?;
                removed = removed.saturating_add(1);
            }
        }
        tx.commit().await?;

        *saved = Some(rows);
        debug!(written, removed, "state saved");
        Ok(())
    }

    /// Load the stored state, or `None` for a database that was never saved.
    ///
    /// # Errors
    ///
    /// Returns an error if a read fails or a value cannot be decoded.
    pub async fn load(&self) -> Result<Option<Snapshot>, StoreError> {
        let meta: Vec<(String, String)> = sqlx::query_as("SELECT key, value FROM meta")
            .fetch_all(&self.pool)
            .await?;
        if meta.is_empty() {
            *self.saved.lock().await = None;
            return Ok(None);
        }
        let lookup = |key: &'static str| -> Result<&str, StoreError> {
            meta.iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.as_str())
                .ok_or_else(|| StoreError::Decode {
                    table: "meta",
                    column: key,
                    reason: "missing".to_owned(),
                })
        };

        let registry = sqlx::query_as::<_, (String, String, String)>(
            "SELECT namespace, app_id, address FROM registry ORDER BY namespace, app_id",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(namespace, app_id, address)| {
            Ok(RegistryRow {
                namespace: decode("registry", "namespace", &namespace)?,
                app_id: decode("registry", "app_id", &app_id)?,
                address: decode("registry", "address", &address)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let managers = sqlx::query_as::<_, (String, String, String)>(
            "SELECT app, role, manager FROM permission_managers ORDER BY app, role",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(app, role, manager)| {
            Ok(ManagerRow {
                app: decode("permission_managers", "app", &app)?,
                role: decode("permission_managers", "role", &role)?,
                manager: from_json("permission_managers", "manager", &manager)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let params = sqlx::query_as::<_, (String, String)>(
            "SELECT hash, params FROM permission_params ORDER BY hash",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(hash, params)| {
            Ok(ParamsRow {
                hash: decode("permission_params", "hash", &hash)?,
                params: from_json("permission_params", "params", &params)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let mut grants = sqlx::query_as::<_, (String, String, String, String)>(
            "SELECT grantee, app, role, record FROM permission_grants",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(grantee, app, role, record)| {
            Ok(GrantRow {
                grantee: from_json("permission_grants", "grantee", &grantee)?,
                app: decode("permission_grants", "app", &app)?,
                role: decode("permission_grants", "role", &role)?,
                grant: from_json("permission_grants", "record", &record)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;
        grants.sort_by_key(|row: &GrantRow| (row.grantee, row.app, row.role));

        let proxies = sqlx::query_as::<_, (String, String)>(
            "SELECT instance, proxy FROM proxies ORDER BY instance",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(instance, proxy)| {
            Ok(ProxyRow {
                instance: decode("proxies", "instance", &instance)?,
                proxy: from_json("proxies", "proxy", &proxy)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let code = sqlx::query_as::<_, (String, String)>(
            "SELECT address, kind FROM code ORDER BY address",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(address, kind)| {
            Ok(CodeRow {
                address: decode("code", "address", &address)?,
                kind,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let storage = sqlx::query_as::<_, (String, String, String)>(
            "SELECT module, key, value FROM module_storage ORDER BY module, key",
        )
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(|(module, key, value)| {
            Ok(StorageRow {
                module: decode("module_storage", "module", &module)?,
                key,
                value: from_json("module_storage", "value", &value)?,
            })
        })
        .collect::<Result<Vec<_>, StoreError>>()?;

        let snapshot = Snapshot {
            kernel: decode("meta", "kernel", lookup("kernel")?)?,
            acl: decode("meta", "acl", lookup("acl")?)?,
            kernel_nonce: decode("meta", "kernel_nonce", lookup("kernel_nonce")?)?,
            deploy_nonce: decode("meta", "deploy_nonce", lookup("deploy_nonce")?)?,
            recovery_vault_app_id: decode(
                "meta",
                "recovery_vault_app_id",
                lookup("recovery_vault_app_id")?,
            )?,
            facts: ChainFacts {
                block_number: decode("meta", "block_number", lookup("block_number")?)?,
                timestamp: decode("meta", "timestamp", lookup("timestamp")?)?,
            },
            registry,
            managers,
            grants,
            params,
            proxies,
            code,
            storage,
        };
        *self.saved.lock().await = Some(encode(&snapshot)?);
        Ok(Some(snapshot))
    }
}
