use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result};
use rusqlite::Connection;
use tracing::debug;
use url::Url;

use depot_domain::RepositoryError;

mod channel;
mod schema;
mod store_impl;

pub use channel::{BlobByteChannel, ChannelOptions};

/// Scheme of release resource identifiers: `depot.release:<id>`, where `<id>`
/// is the store-assigned row id of the release. File identifiers used by the
/// filesystem layer append the in-release path: `depot.release:<id>:<path>`.
pub const RELEASE_SCHEME: &str = "depot.release";

const DB_FILENAME: &str = "depot.sqlite";

/// A release repository backed by a local SQLite store.
///
/// Every operation opens its own connection and runs inside one immediate
/// transaction, committed before the operation returns and rolled back on any
/// error path. The repository itself holds no connection and is cheap to
/// share between threads.
#[derive(Clone, Debug)]
pub struct LocalRepository {
    root: PathBuf,
}

impl LocalRepository {
    /// Opens (and if necessary bootstraps) the repository rooted at `root`,
    /// or at the default location (`DEPOT_STORE_PATH`, falling back to
    /// `~/.depot`) when `None` is supplied.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be created or the schema cannot
    /// be initialized.
    pub fn open(root: Option<PathBuf>) -> Result<Self> {
        let root = match root {
            Some(path) => path,
            None => default_root()?,
        };
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create repository root {}", root.display()))?;
        let repository = Self { root };
        repository.ensure_schema()?;
        debug!(root = %repository.root.display(), "release repository opened");
        Ok(repository)
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn database_path(&self) -> PathBuf {
        self.root.join(DB_FILENAME)
    }

    fn connection(&self) -> Result<Connection> {
        let conn = self.connection_raw()?;
        conn.busy_timeout(Duration::from_secs(10))
            .context("failed to set busy timeout for the repository store")?;
        Ok(conn)
    }

    fn connection_raw(&self) -> Result<Connection> {
        let path = self.database_path();
        let conn = Connection::open(&path)
            .with_context(|| format!("failed to open repository store at {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .context("failed to enable WAL for the repository store")?;
        conn.pragma_update(None, "foreign_keys", "ON")
            .context("failed to enable foreign keys for the repository store")?;
        Ok(conn)
    }
}

fn default_root() -> Result<PathBuf> {
    if let Some(path) = env::var_os("DEPOT_STORE_PATH") {
        return Ok(PathBuf::from(path));
    }
    let home = dirs_next::home_dir().context("failed to resolve HOME for the repository root")?;
    Ok(home.join(".depot"))
}

pub(crate) fn release_uri(id: i64) -> Url {
    Url::parse(&format!("{RELEASE_SCHEME}:{id}")).expect("release uris are well formed")
}

fn invalid_uri(uri: &Url, reason: &str) -> anyhow::Error {
    RepositoryError::InvalidArgument(format!("{reason}: {uri}")).into()
}

/// Parses a bare release identifier. The remainder after the scheme must be a
/// decimal id with no embedded colon.
pub(crate) fn release_id(uri: &Url) -> Result<i64> {
    if uri.scheme() != RELEASE_SCHEME {
        return Err(invalid_uri(uri, "unexpected scheme"));
    }
    let rest = uri.path();
    if rest.contains(':') {
        return Err(invalid_uri(uri, "release identifier embeds a path"));
    }
    let id = rest
        .parse::<u64>()
        .map_err(|_| invalid_uri(uri, "release identifier is not a decimal id"))?;
    i64::try_from(id).map_err(|_| invalid_uri(uri, "release id is out of range"))
}

/// Parses a file identifier, `<scheme>:<id>:<in-release-path>`.
pub(crate) fn file_release_id(uri: &Url) -> Result<(i64, &str)> {
    if uri.scheme() != RELEASE_SCHEME {
        return Err(invalid_uri(uri, "unexpected scheme"));
    }
    let Some((id, path)) = uri.path().split_once(':') else {
        return Err(invalid_uri(uri, "file identifier has no in-release path"));
    };
    let id = id
        .parse::<u64>()
        .map_err(|_| invalid_uri(uri, "release identifier is not a decimal id"))?;
    let id = i64::try_from(id).map_err(|_| invalid_uri(uri, "release id is out of range"))?;
    Ok((id, path))
}

fn timestamp_millis(time: SystemTime) -> i64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

fn time_from_millis(millis: i64) -> SystemTime {
    UNIX_EPOCH + Duration::from_millis(millis.max(0) as u64)
}
