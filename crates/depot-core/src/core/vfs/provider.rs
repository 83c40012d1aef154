use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use anyhow::Result;
use url::Url;

use depot_domain::{FileAttributes, ReleaseChannel, Repository, RepositoryError, RepositorySpi};

use crate::core::repo::local::{release_id, ChannelOptions, RELEASE_SCHEME};

use super::attributes::{AttributeViewKind, ReleaseFileAttributeView};
use super::dirstream::ReleaseDirectoryStream;
use super::filesystem::ReleaseFileSystem;
use super::path::ReleasePath;

pub(crate) type SharedRepository = Arc<dyn RepositorySpi + Send + Sync>;

/// Access checks supported by [`ReleaseFileSystemProvider::check_access`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessMode {
    Read,
    Write,
    Execute,
}

/// The registry of live release filesystems.
///
/// One provider is constructed per process and shared as an `Arc`. It caches
/// a [`ReleaseFileSystem`] per release identifier: entries are inserted on
/// first path resolution and removed when the filesystem is closed. The cache
/// may be hit from multiple threads at once.
///
/// Every filesystem handed out here is read-only; all mutating operations
/// fail with [`RepositoryError::ReadOnly`].
pub struct ReleaseFileSystemProvider {
    /// Back-reference to the owning `Arc`, handed to filesystems so they can
    /// evict themselves on close.
    self_ref: Weak<Self>,
    repository: SharedRepository,
    cache: Mutex<HashMap<Url, Arc<ReleaseFileSystem>>>,
}

impl ReleaseFileSystemProvider {
    #[must_use]
    pub fn new(repository: SharedRepository) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            repository,
            cache: Mutex::new(HashMap::new()),
        })
    }

    fn owner(&self) -> Arc<Self> {
        self.self_ref
            .upgrade()
            .expect("providers are always owned by an Arc")
    }

    #[must_use]
    pub fn scheme(&self) -> &'static str {
        RELEASE_SCHEME
    }

    /// Whether `uri` names a release of this provider: the repository scheme
    /// followed by a bare decimal id with no embedded colon.
    #[must_use]
    pub fn is_release(&self, uri: &Url) -> bool {
        release_id(uri).is_ok()
    }

    /// Returns the filesystem for `uri`, creating and caching it if absent.
    ///
    /// # Errors
    ///
    /// `RepositoryError::InvalidArgument` if `uri` does not name a release of
    /// this provider.
    pub fn new_filesystem(&self, uri: &Url) -> Result<Arc<ReleaseFileSystem>> {
        release_id(uri)?;
        let mut cache = self.lock_cache();
        let filesystem = cache.entry(uri.clone()).or_insert_with(|| {
            ReleaseFileSystem::new(
                self.self_ref.clone(),
                Arc::clone(&self.repository),
                uri.clone(),
            )
        });
        Ok(Arc::clone(filesystem))
    }

    /// Returns the cached filesystem for `uri`.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if no live filesystem exists for `uri`.
    pub fn filesystem(&self, uri: &Url) -> Result<Arc<ReleaseFileSystem>> {
        self.lock_cache()
            .get(uri)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(format!("filesystem for {uri}")).into())
    }

    pub(super) fn evict(&self, uri: &Url) {
        self.lock_cache().remove(uri);
    }

    fn lock_cache(&self) -> MutexGuard<'_, HashMap<Url, Arc<ReleaseFileSystem>>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves a release identifier to the path of its stored file, creating
    /// the filesystem on first use.
    ///
    /// # Errors
    ///
    /// `RepositoryError::InvalidArgument` for identifiers that do not belong
    /// to this provider; `RepositoryError::NotFound` if the release is gone.
    pub fn path(&self, uri: &Url) -> Result<ReleasePath> {
        let filesystem = self.new_filesystem(uri)?;
        let release = self
            .repository
            .release(uri)?
            .ok_or_else(|| RepositoryError::NotFound(format!("release {uri}")))?;
        Ok(filesystem.path(release.filename(), &[]))
    }

    /// Opens a byte channel for `path`. Only read access is grantable.
    ///
    /// # Errors
    ///
    /// `RepositoryError::ReadOnly` for write or delete-on-close requests;
    /// `RepositoryError::AlreadyExists` for create-new (the file always
    /// exists); `RepositoryError::InvalidArgument` for append.
    pub fn new_byte_channel(
        &self,
        path: &ReleasePath,
        options: &ChannelOptions,
    ) -> Result<Box<dyn ReleaseChannel>> {
        if options.write || options.delete_on_close {
            return Err(RepositoryError::ReadOnly.into());
        }
        if options.create_new {
            return Err(RepositoryError::AlreadyExists(format!("file {path}")).into());
        }
        if options.append {
            return Err(
                RepositoryError::InvalidArgument("append requires a writable channel".into())
                    .into(),
            );
        }
        path.filesystem()
            .repository()
            .new_byte_channel(&path.to_uri()?)
    }

    /// Opens the one-entry stream over `directory`.
    #[must_use]
    pub fn new_directory_stream(&self, directory: &ReleasePath) -> ReleaseDirectoryStream {
        ReleaseDirectoryStream::new(self.owner(), directory.clone())
    }

    /// The root already exists; everything else is unwritable.
    pub fn create_directory(&self, directory: &ReleasePath) -> Result<()> {
        if directory.to_absolute().is_root() {
            return Err(RepositoryError::AlreadyExists("/".into()).into());
        }
        Err(RepositoryError::ReadOnly.into())
    }

    pub fn delete(&self, _path: &ReleasePath) -> Result<()> {
        Err(RepositoryError::ReadOnly.into())
    }

    /// Copying a path onto itself is a no-op; any real copy is a write.
    pub fn copy(&self, source: &ReleasePath, target: &ReleasePath) -> Result<()> {
        if source == target {
            return Ok(());
        }
        Err(RepositoryError::ReadOnly.into())
    }

    pub fn rename(&self, source: &ReleasePath, target: &ReleasePath) -> Result<()> {
        if source == target {
            return Ok(());
        }
        Err(RepositoryError::ReadOnly.into())
    }

    #[must_use]
    pub fn is_same_file(&self, path: &ReleasePath, other: &ReleasePath) -> bool {
        path == other
    }

    #[must_use]
    pub fn is_hidden(&self, _path: &ReleasePath) -> bool {
        false
    }

    /// Verifies that the file exists and the requested access is grantable.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if the underlying content does not exist;
    /// `RepositoryError::AccessDenied` for write or execute access.
    pub fn check_access(&self, path: &ReleasePath, modes: &[AccessMode]) -> Result<()> {
        if !path
            .filesystem()
            .repository()
            .file_exists(&path.to_uri()?)?
        {
            return Err(RepositoryError::NotFound(path.to_string()).into());
        }
        for mode in modes {
            match mode {
                AccessMode::Read => {}
                AccessMode::Write | AccessMode::Execute => {
                    return Err(
                        RepositoryError::AccessDenied("filesystem is read-only".into()).into(),
                    );
                }
            }
        }
        Ok(())
    }

    #[must_use]
    pub fn attribute_view(
        &self,
        path: &ReleasePath,
        view: AttributeViewKind,
    ) -> ReleaseFileAttributeView {
        let AttributeViewKind::Basic = view;
        ReleaseFileAttributeView::new(path.clone())
    }

    pub fn read_attributes(
        &self,
        path: &ReleasePath,
        view: AttributeViewKind,
    ) -> Result<FileAttributes> {
        self.attribute_view(path, view).read_attributes()
    }
}
