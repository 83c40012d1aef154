// Schema bootstrap and the typed insert primitive.
use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, ErrorCode, TransactionBehavior};

use super::LocalRepository;

const SCHEMA_VERSION: u32 = 1;
const META_KEY_SCHEMA_VERSION: &str = "schema_version";
const META_KEY_CREATED_BY: &str = "created_by_depot_version";
const DEPOT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Outcome of an insert that may trip a uniqueness constraint. Callers map
/// [`InsertOutcome::UniqueViolation`] to their own already-exists error; any
/// other storage failure propagates as-is.
pub(super) enum InsertOutcome {
    Inserted(i64),
    UniqueViolation,
}

pub(super) fn execute_insert(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> Result<InsertOutcome> {
    match conn.execute(sql, params) {
        Ok(_) => Ok(InsertOutcome::Inserted(conn.last_insert_rowid())),
        Err(rusqlite::Error::SqliteFailure(cause, _))
            if cause.code == ErrorCode::ConstraintViolation =>
        {
            Ok(InsertOutcome::UniqueViolation)
        }
        Err(err) => Err(err).context("insert into the repository store failed"),
    }
}

impl LocalRepository {
    pub(super) fn ensure_schema(&self) -> Result<()> {
        let mut conn = self.connection()?;
        init_schema(&conn)?;
        ensure_meta(&mut conn)?;
        Ok(())
    }

    pub(super) fn with_immediate_tx<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<T>,
    {
        let mut conn = self.connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .context("failed to start a repository transaction")?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS meta (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL
        );
        CREATE TABLE IF NOT EXISTS modules (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS releases (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            module_id INTEGER NOT NULL REFERENCES modules(id),
            version TEXT NOT NULL,
            path TEXT NOT NULL,
            content BLOB NOT NULL,
            last_modified INTEGER NOT NULL,
            UNIQUE(module_id, version)
        );
        CREATE TABLE IF NOT EXISTS dependency_types (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL UNIQUE
        );
        CREATE TABLE IF NOT EXISTS release_dependencies (
            release_id INTEGER NOT NULL REFERENCES releases(id),
            module TEXT NOT NULL,
            version TEXT NOT NULL,
            type INTEGER NOT NULL REFERENCES dependency_types(id),
            uri TEXT NOT NULL
        );
        INSERT OR IGNORE INTO dependency_types(id, name) VALUES (1, 'build'), (2, 'runtime');
        "#,
    )
    .context("failed to initialize the repository schema")?;
    Ok(())
}

fn ensure_meta(conn: &mut Connection) -> Result<()> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .context("failed to start the repository meta transaction")?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_SCHEMA_VERSION, SCHEMA_VERSION.to_string()],
    )?;
    tx.execute(
        "INSERT OR IGNORE INTO meta(key, value) VALUES (?1, ?2)",
        params![META_KEY_CREATED_BY, DEPOT_VERSION],
    )?;
    tx.commit()?;
    enforce_schema_version(conn)
}

fn enforce_schema_version(conn: &Connection) -> Result<()> {
    let value: String = conn
        .query_row(
            "SELECT value FROM meta WHERE key = ?1",
            params![META_KEY_SCHEMA_VERSION],
            |row| row.get(0),
        )
        .map_err(|_| anyhow!("repository meta is missing '{META_KEY_SCHEMA_VERSION}'"))?;
    if value.parse::<u32>().ok() != Some(SCHEMA_VERSION) {
        bail!("repository schema version {value} is not supported (expected {SCHEMA_VERSION})");
    }
    Ok(())
}
