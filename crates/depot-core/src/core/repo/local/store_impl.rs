// Repository operations over the SQLite store.
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use anyhow::{anyhow, bail, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tracing::debug;
use url::Url;

use depot_domain::{
    Dependency, DependencyType, FileAttributes, Module, Release, ReleaseChannel, Repository,
    RepositoryError, RepositorySpi,
};

use super::channel::{BlobByteChannel, ChannelOptions};
use super::schema::{execute_insert, InsertOutcome};
use super::{
    file_release_id, release_id, release_uri, time_from_millis, timestamp_millis, LocalRepository,
};

impl Repository for LocalRepository {
    fn insert_module(&self, name: &str) -> Result<Module> {
        let module = Module::new(name)?;
        self.with_immediate_tx(|tx| {
            match execute_insert(tx, "INSERT INTO modules(name) VALUES (?1)", params![name])? {
                InsertOutcome::Inserted(_) => Ok(()),
                InsertOutcome::UniqueViolation => {
                    Err(RepositoryError::AlreadyExists(format!("module {name}")).into())
                }
            }
        })?;
        debug!(name, "module inserted");
        Ok(module)
    }

    fn insert_release(
        &self,
        module: &Module,
        version: &str,
        content_path: &Path,
        dependencies: &HashSet<Dependency>,
    ) -> Result<Release> {
        if version.is_empty() {
            return Err(RepositoryError::InvalidArgument("version is empty".into()).into());
        }
        let filename = content_path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                RepositoryError::InvalidArgument(format!(
                    "content path {} has no usable filename",
                    content_path.display()
                ))
            })?;
        let modified = fs::metadata(content_path)
            .and_then(|metadata| metadata.modified())
            .with_context(|| format!("failed to read metadata of {}", content_path.display()))?;
        let content = fs::read(content_path)
            .with_context(|| format!("failed to read {}", content_path.display()))?;

        let id = self.with_immediate_tx(|tx| {
            let Some(module_id) = module_id(tx, module.name())? else {
                return Err(RepositoryError::InvalidArgument(format!(
                    "module {} is not registered",
                    module.name()
                ))
                .into());
            };
            let id = match execute_insert(
                tx,
                "INSERT INTO releases(module_id, version, path, content, last_modified) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![module_id, version, filename, content, timestamp_millis(modified)],
            )? {
                InsertOutcome::Inserted(id) => id,
                InsertOutcome::UniqueViolation => {
                    return Err(RepositoryError::AlreadyExists(format!(
                        "release {} {version}",
                        module.name()
                    ))
                    .into());
                }
            };

            let type_codes = dependency_type_codes(tx)?;
            let mut insert = tx
                .prepare(
                    "INSERT INTO release_dependencies(release_id, module, version, type, uri) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                )
                .context("failed to prepare the dependency insert")?;
            for dependency in dependencies {
                let code = type_codes.get(dependency.kind().as_str()).ok_or_else(|| {
                    anyhow!(
                        "dependency type '{}' is missing from the lookup table",
                        dependency.kind().as_str()
                    )
                })?;
                let rows = insert
                    .execute(params![
                        id,
                        dependency.module().name(),
                        dependency.version(),
                        code,
                        dependency.uri().as_str()
                    ])
                    .context("failed to insert a dependency row")?;
                if rows != 1 {
                    bail!("expected to insert 1 dependency row, inserted {rows}");
                }
            }
            Ok(id)
        })?;

        debug!(
            module = module.name(),
            version,
            size = content.len(),
            dependencies = dependencies.len(),
            "release inserted"
        );
        Ok(Release::new(
            release_uri(id),
            module.clone(),
            version,
            filename,
            dependencies.clone(),
        ))
    }

    fn module(&self, name: &str) -> Result<Option<Module>> {
        let module = Module::new(name)?;
        let found = self.with_immediate_tx(|tx| module_id(tx, name))?;
        Ok(found.map(|_| module))
    }

    fn releases(&self, module: &Module) -> Result<Option<Vec<Url>>> {
        self.with_immediate_tx(|tx| {
            let Some(module_id) = module_id(tx, module.name())? else {
                return Ok(None);
            };
            let mut stmt = tx
                .prepare("SELECT id FROM releases WHERE module_id = ?1 ORDER BY id")
                .context("failed to prepare the release listing")?;
            let ids = stmt
                .query_map(params![module_id], |row| row.get::<_, i64>(0))
                .context("failed to list releases")?
                .collect::<rusqlite::Result<Vec<_>>>()
                .context("failed to list releases")?;
            Ok(Some(ids.into_iter().map(release_uri).collect()))
        })
    }

    fn release_uri(&self, module: &Module, version: &str) -> Result<Option<Url>> {
        if version.is_empty() {
            return Err(RepositoryError::InvalidArgument("version is empty".into()).into());
        }
        self.with_immediate_tx(|tx| {
            let Some(module_id) = module_id(tx, module.name())? else {
                return Ok(None);
            };
            let id = tx
                .query_row(
                    "SELECT id FROM releases WHERE module_id = ?1 AND version = ?2",
                    params![module_id, version],
                    |row| row.get::<_, i64>(0),
                )
                .optional()
                .context("failed to look up the release")?;
            Ok(id.map(release_uri))
        })
    }

    fn release(&self, uri: &Url) -> Result<Option<Release>> {
        let id = release_id(uri)?;
        self.with_immediate_tx(|tx| {
            let row = tx
                .query_row(
                    "SELECT m.name, r.version, r.path FROM releases r \
                     JOIN modules m ON m.id = r.module_id WHERE r.id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                        ))
                    },
                )
                .optional()
                .context("failed to look up the release")?;
            let Some((module_name, version, filename)) = row else {
                return Ok(None);
            };
            let dependencies = release_dependencies(tx, id)?;
            Ok(Some(Release::new(
                uri.clone(),
                Module::new(module_name)?,
                version,
                filename,
                dependencies,
            )))
        })
    }

    fn remove_module(&self, module: &Module) -> Result<()> {
        self.with_immediate_tx(|tx| {
            let Some(module_id) = module_id(tx, module.name())? else {
                return Err(
                    RepositoryError::NotFound(format!("module {}", module.name())).into(),
                );
            };
            let releases: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM releases WHERE module_id = ?1",
                    params![module_id],
                    |row| row.get(0),
                )
                .context("failed to count the module's releases")?;
            if releases > 0 {
                return Err(RepositoryError::InvalidState(format!(
                    "module {} still owns {releases} releases",
                    module.name()
                ))
                .into());
            }
            let rows = tx
                .execute("DELETE FROM modules WHERE id = ?1", params![module_id])
                .context("failed to delete the module")?;
            if rows != 1 {
                bail!("expected to delete 1 module row, deleted {rows}");
            }
            Ok(())
        })?;
        debug!(name = module.name(), "module removed");
        Ok(())
    }

    fn remove_release(&self, release: &Release) -> Result<()> {
        let id = release_id(release.uri())?;
        self.with_immediate_tx(|tx| {
            tx.execute(
                "DELETE FROM release_dependencies WHERE release_id = ?1",
                params![id],
            )
            .context("failed to delete the release's dependency rows")?;
            let rows = tx
                .execute("DELETE FROM releases WHERE id = ?1", params![id])
                .context("failed to delete the release")?;
            if rows == 0 {
                return Err(
                    RepositoryError::NotFound(format!("release {}", release.uri())).into(),
                );
            }
            Ok(())
        })?;
        debug!(uri = %release.uri(), "release removed");
        Ok(())
    }
}

impl RepositorySpi for LocalRepository {
    fn file_exists(&self, uri: &Url) -> Result<bool> {
        let (id, path) = file_release_id(uri)?;
        let name = path.trim_start_matches('/').to_string();
        self.with_immediate_tx(|tx| {
            let exists = tx
                .query_row(
                    "SELECT 1 FROM releases WHERE id = ?1 AND path = ?2",
                    params![id, name],
                    |_| Ok(()),
                )
                .optional()
                .context("failed to check file existence")?
                .is_some();
            Ok(exists)
        })
    }

    fn new_byte_channel(&self, uri: &Url) -> Result<Box<dyn ReleaseChannel>> {
        let (id, _) = file_release_id(uri)?;
        let conn = self.connection()?;
        let exists = conn
            .query_row("SELECT 1 FROM releases WHERE id = ?1", params![id], |_| {
                Ok(())
            })
            .optional()
            .context("failed to look up the release content")?
            .is_some();
        if !exists {
            return Err(RepositoryError::NotFound(format!("release #{id}")).into());
        }
        // The channel owns this connection until it is closed.
        Ok(Box::new(BlobByteChannel::new(
            conn,
            id,
            ChannelOptions::read_only(),
        )))
    }

    fn read_attributes(&self, uri: &Url) -> Result<FileAttributes> {
        let (id, _) = file_release_id(uri)?;
        self.with_immediate_tx(|tx| {
            let row = tx
                .query_row(
                    "SELECT path, last_modified, length(content) FROM releases WHERE id = ?1",
                    params![id],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                        ))
                    },
                )
                .optional()
                .context("failed to read the release attributes")?;
            let Some((path, modified, size)) = row else {
                return Err(RepositoryError::NotFound(format!("release #{id}")).into());
            };
            Ok(FileAttributes::new(
                path,
                size.max(0) as u64,
                time_from_millis(modified),
            ))
        })
    }
}

fn module_id(conn: &Connection, name: &str) -> Result<Option<i64>> {
    conn.query_row(
        "SELECT id FROM modules WHERE name = ?1",
        params![name],
        |row| row.get(0),
    )
    .optional()
    .context("failed to look up the module")
}

/// Loads the dependency-type lookup table, name to stored code.
fn dependency_type_codes(conn: &Connection) -> Result<HashMap<String, i64>> {
    let mut stmt = conn
        .prepare("SELECT name, id FROM dependency_types")
        .context("failed to prepare the dependency-type lookup")?;
    let codes = stmt
        .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?)))
        .context("failed to load dependency types")?
        .collect::<rusqlite::Result<HashMap<_, _>>>()
        .context("failed to load dependency types")?;
    Ok(codes)
}

fn release_dependencies(conn: &Connection, id: i64) -> Result<HashSet<Dependency>> {
    let mut stmt = conn
        .prepare(
            "SELECT d.module, d.version, t.name, d.uri FROM release_dependencies d \
             JOIN dependency_types t ON t.id = d.type WHERE d.release_id = ?1",
        )
        .context("failed to prepare the dependency lookup")?;
    let mut rows = stmt
        .query(params![id])
        .context("failed to query dependencies")?;
    let mut dependencies = HashSet::new();
    while let Some(row) = rows.next().context("failed to read a dependency row")? {
        let module: String = row.get(0)?;
        let version: String = row.get(1)?;
        let type_name: String = row.get(2)?;
        let uri: String = row.get(3)?;
        let kind = DependencyType::try_from(type_name.as_str())?;
        let uri = Url::parse(&uri)
            .with_context(|| format!("stored dependency uri '{uri}' is invalid"))?;
        dependencies.insert(Dependency::new(uri, Module::new(module)?, version, kind));
    }
    Ok(dependencies)
}
