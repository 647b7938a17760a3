//! License persistence.
//!
//! [`LicenseStore`] is an enum over the available backends:
//! - `Memory` is always available and is what tests inject
//! - `SQLite` (requires the `sqlite` feature) survives process restarts
//!
//! Besides the license records the store keeps a single installation row
//! naming the license currently bound to this installation.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tracing::{error, info};

#[cfg(feature = "sqlite")]
use sqlx::{query, query_as, FromRow, SqlitePool};

use crate::config::DatabaseConfig;
use crate::errors::{LicenseError, LicenseResult};
use crate::license::LicenseRecord;

#[cfg(feature = "sqlite")]
use crate::license::{LicenseKind, LicenseStatus};

#[cfg(feature = "sqlite")]
const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS licenses (
    license_key     TEXT PRIMARY KEY,
    email           TEXT NOT NULL,
    kind            TEXT NOT NULL,
    status          TEXT NOT NULL,
    issued_at       TEXT NOT NULL,
    expires_at      TEXT NOT NULL,
    activated_at    TEXT,
    deactivated_at  TEXT,
    revoked_at      TEXT,
    revoke_reason   TEXT
);
CREATE INDEX IF NOT EXISTS idx_licenses_email ON licenses (email);
CREATE TABLE IF NOT EXISTS installation (
    id              INTEGER PRIMARY KEY CHECK (id = 1),
    license_key     TEXT REFERENCES licenses (license_key),
    updated_at      TEXT NOT NULL
);
"#;

/// Which license this installation is bound to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallationState {
    pub license_key: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct MemoryState {
    licenses: HashMap<String, LicenseRecord>,
    installation: Option<InstallationState>,
}

/// In-process store; contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    fn lock(&self) -> LicenseResult<std::sync::MutexGuard<'_, MemoryState>> {
        self.state
            .lock()
            .map_err(|_| LicenseError::StorageError("failed to acquire memory store lock".into()))
    }
}

/// Row shape of the `licenses` table.
#[cfg(feature = "sqlite")]
#[derive(Debug, FromRow)]
struct LicenseRow {
    license_key: String,
    email: String,
    kind: String,
    status: String,
    issued_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    activated_at: Option<DateTime<Utc>>,
    deactivated_at: Option<DateTime<Utc>>,
    revoked_at: Option<DateTime<Utc>>,
    revoke_reason: Option<String>,
}

#[cfg(feature = "sqlite")]
impl TryFrom<LicenseRow> for LicenseRecord {
    type Error = LicenseError;

    fn try_from(row: LicenseRow) -> Result<Self, Self::Error> {
        Ok(LicenseRecord {
            license_key: row.license_key,
            email: row.email,
            kind: row.kind.parse::<LicenseKind>()?,
            status: row.status.parse::<LicenseStatus>()?,
            issued_at: row.issued_at,
            expires_at: row.expires_at,
            activated_at: row.activated_at,
            deactivated_at: row.deactivated_at,
            revoked_at: row.revoked_at,
            revoke_reason: row.revoke_reason,
        })
    }
}

/// Storage backend for license records and installation state.
#[derive(Debug, Clone)]
pub enum LicenseStore {
    Memory(Arc<MemoryStore>),
    #[cfg(feature = "sqlite")]
    SQLite(SqlitePool),
}

fn storage_err(op: &str, e: impl std::fmt::Display) -> LicenseError {
    error!("{op} failed: {e}");
    LicenseError::StorageError(format!("{op} failed"))
}

impl LicenseStore {
    /// A fresh, empty in-memory store.
    pub fn memory() -> Self {
        LicenseStore::Memory(Arc::new(MemoryStore::default()))
    }

    /// Wrap an existing SQLite pool, creating the schema if needed.
    #[cfg(feature = "sqlite")]
    pub async fn from_sqlite_pool(pool: SqlitePool) -> LicenseResult<Self> {
        sqlx::raw_sql(SCHEMA)
            .execute(&pool)
            .await
            .map_err(|e| storage_err("SQLite schema setup", e))?;
        Ok(LicenseStore::SQLite(pool))
    }

    /// Open the store described by the configuration.
    pub async fn connect(config: &DatabaseConfig) -> LicenseResult<Arc<Self>> {
        match config.db_type.as_str() {
            "memory" => Ok(Arc::new(LicenseStore::memory())),
            #[cfg(feature = "sqlite")]
            "sqlite" => {
                if config.sqlite_url.is_empty() {
                    if let Some(dir) = DatabaseConfig::default_sqlite_path()
                        .as_deref()
                        .and_then(|p| p.parent())
                    {
                        tokio::fs::create_dir_all(dir).await.map_err(|e| {
                            LicenseError::StorageError(format!(
                                "failed to create {}: {e}",
                                dir.display()
                            ))
                        })?;
                    }
                }

                let url = config.resolved_sqlite_url();
                let pool = SqlitePool::connect(&url).await.map_err(|e| {
                    error!("Failed to connect to SQLite at {url}: {e}");
                    LicenseError::StorageError(format!("failed to connect to SQLite: {e}"))
                })?;
                info!("Connected to SQLite license store at {url}");

                Ok(Arc::new(Self::from_sqlite_pool(pool).await?))
            }
            #[cfg(not(feature = "sqlite"))]
            "sqlite" => Err(LicenseError::ConfigError(
                "SQLite support not compiled in. Enable the 'sqlite' feature.".to_string(),
            )),
            other => Err(LicenseError::ConfigError(format!(
                "unsupported database type: {other}"
            ))),
        }
    }

    /// Short backend name for health reporting.
    pub fn backend_name(&self) -> &'static str {
        match self {
            LicenseStore::Memory(_) => "memory",
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(_) => "sqlite",
        }
    }

    /// Whether the backend is reachable.
    pub async fn ping(&self) -> bool {
        match self {
            LicenseStore::Memory(mem) => mem.lock().is_ok(),
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(pool) => query("SELECT 1").execute(pool).await.is_ok(),
        }
    }

    /// Insert a new license or overwrite an existing one with the same key.
    pub async fn insert_license(&self, record: &LicenseRecord) -> LicenseResult<()> {
        match self {
            LicenseStore::Memory(mem) => {
                mem.lock()?
                    .licenses
                    .insert(record.license_key.clone(), record.clone());
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(pool) => {
                upsert_license(pool, record)
                    .await
                    .map_err(|e| storage_err("SQLite insert_license", e))?;
                Ok(())
            }
        }
    }

    /// Insert a license only if its key is unused.
    ///
    /// Returns `false`, leaving the stored record untouched, when the key exists.
    pub async fn insert_new_license(&self, record: &LicenseRecord) -> LicenseResult<bool> {
        match self {
            LicenseStore::Memory(mem) => {
                let mut state = mem.lock()?;
                match state.licenses.entry(record.license_key.clone()) {
                    Entry::Occupied(_) => Ok(false),
                    Entry::Vacant(slot) => {
                        slot.insert(record.clone());
                        Ok(true)
                    }
                }
            }
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(pool) => {
                let result = bind_license(query(INSERT_NEW_LICENSE), record)
                    .execute(pool)
                    .await
                    .map_err(|e| storage_err("SQLite insert_new_license", e))?;
                Ok(result.rows_affected() == 1)
            }
        }
    }

    /// Fetch a license by its key.
    pub async fn get_license(&self, license_key: &str) -> LicenseResult<Option<LicenseRecord>> {
        match self {
            LicenseStore::Memory(mem) => Ok(mem.lock()?.licenses.get(license_key).cloned()),
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(pool) => {
                let row = query_as::<_, LicenseRow>("SELECT * FROM licenses WHERE license_key = ?")
                    .bind(license_key)
                    .fetch_optional(pool)
                    .await
                    .map_err(|e| storage_err("SQLite get_license", e))?;

                row.map(LicenseRecord::try_from).transpose()
            }
        }
    }

    pub async fn license_exists(&self, license_key: &str) -> LicenseResult<bool> {
        Ok(self.get_license(license_key).await?.is_some())
    }

    /// All records, oldest first.
    pub async fn list_licenses(&self) -> LicenseResult<Vec<LicenseRecord>> {
        match self {
            LicenseStore::Memory(mem) => {
                let mut records: Vec<LicenseRecord> =
                    mem.lock()?.licenses.values().cloned().collect();
                records.sort_by(|a, b| {
                    a.issued_at
                        .cmp(&b.issued_at)
                        .then_with(|| a.license_key.cmp(&b.license_key))
                });
                Ok(records)
            }
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(pool) => {
                let rows = query_as::<_, LicenseRow>(
                    "SELECT * FROM licenses ORDER BY issued_at ASC, license_key ASC",
                )
                .fetch_all(pool)
                .await
                .map_err(|e| storage_err("SQLite list_licenses", e))?;

                rows.into_iter().map(LicenseRecord::try_from).collect()
            }
        }
    }

    /// The installation row, if any activation ever happened.
    pub async fn installation(&self) -> LicenseResult<Option<InstallationState>> {
        match self {
            LicenseStore::Memory(mem) => Ok(mem.lock()?.installation.clone()),
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(pool) => {
                let row: Option<(Option<String>, DateTime<Utc>)> =
                    sqlx::query_as("SELECT license_key, updated_at FROM installation WHERE id = 1")
                        .fetch_optional(pool)
                        .await
                        .map_err(|e| storage_err("SQLite installation", e))?;

                Ok(row.map(|(license_key, updated_at)| InstallationState {
                    license_key,
                    updated_at,
                }))
            }
        }
    }

    /// Atomically write a set of records together with the installation binding.
    ///
    /// Either every record and the binding are stored, or none are.
    pub async fn commit(
        &self,
        records: &[LicenseRecord],
        installation: &InstallationState,
    ) -> LicenseResult<()> {
        match self {
            LicenseStore::Memory(mem) => {
                let mut state = mem.lock()?;
                for record in records {
                    state
                        .licenses
                        .insert(record.license_key.clone(), record.clone());
                }
                state.installation = Some(installation.clone());
                Ok(())
            }
            #[cfg(feature = "sqlite")]
            LicenseStore::SQLite(pool) => {
                commit_sqlite(pool, records, installation)
                    .await
                    .map_err(|e| storage_err("SQLite commit", e))
            }
        }
    }
}

#[cfg(feature = "sqlite")]
const UPSERT_LICENSE: &str = r#"
    INSERT INTO licenses (
        license_key,
        email,
        kind,
        status,
        issued_at,
        expires_at,
        activated_at,
        deactivated_at,
        revoked_at,
        revoke_reason
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(license_key) DO UPDATE SET
        email          = excluded.email,
        kind           = excluded.kind,
        status         = excluded.status,
        issued_at      = excluded.issued_at,
        expires_at     = excluded.expires_at,
        activated_at   = excluded.activated_at,
        deactivated_at = excluded.deactivated_at,
        revoked_at     = excluded.revoked_at,
        revoke_reason  = excluded.revoke_reason
"#;

#[cfg(feature = "sqlite")]
const INSERT_NEW_LICENSE: &str = r#"
    INSERT INTO licenses (
        license_key,
        email,
        kind,
        status,
        issued_at,
        expires_at,
        activated_at,
        deactivated_at,
        revoked_at,
        revoke_reason
    )
    VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
    ON CONFLICT(license_key) DO NOTHING
"#;

#[cfg(feature = "sqlite")]
type SqliteQuery<'q> = sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>;

#[cfg(feature = "sqlite")]
fn bind_license<'q>(query: SqliteQuery<'q>, record: &'q LicenseRecord) -> SqliteQuery<'q> {
    query
        .bind(&record.license_key)
        .bind(&record.email)
        .bind(record.kind.as_str())
        .bind(record.status.as_str())
        .bind(record.issued_at)
        .bind(record.expires_at)
        .bind(record.activated_at)
        .bind(record.deactivated_at)
        .bind(record.revoked_at)
        .bind(&record.revoke_reason)
}

#[cfg(feature = "sqlite")]
async fn upsert_license<'e, E>(executor: E, record: &LicenseRecord) -> Result<(), sqlx::Error>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    bind_license(query(UPSERT_LICENSE), record)
        .execute(executor)
        .await?;
    Ok(())
}

#[cfg(feature = "sqlite")]
async fn commit_sqlite(
    pool: &SqlitePool,
    records: &[LicenseRecord],
    installation: &InstallationState,
) -> Result<(), sqlx::Error> {
    let mut tx = pool.begin().await?;

    for record in records {
        upsert_license(&mut *tx, record).await?;
    }

    query(
        r#"
        INSERT INTO installation (id, license_key, updated_at)
        VALUES (1, ?, ?)
        ON CONFLICT(id) DO UPDATE SET
            license_key = excluded.license_key,
            updated_at  = excluded.updated_at
        "#,
    )
    .bind(&installation.license_key)
    .bind(installation.updated_at)
    .execute(&mut *tx)
    .await?;

    tx.commit().await
}
