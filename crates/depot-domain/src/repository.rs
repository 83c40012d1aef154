use std::collections::HashSet;
use std::io::{Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;

use anyhow::Result;
use url::Url;

use crate::{Dependency, Module, Release, ReleaseBuilder};

/// A module repository.
///
/// Every operation runs synchronously on the caller's thread and opens
/// exactly one storage session for its duration, committed or rolled back
/// before it returns. Duplicate inserts are detected through the backing
/// store's uniqueness constraints, never through a separate existence check.
pub trait Repository {
    /// Registers a module.
    ///
    /// # Errors
    ///
    /// `RepositoryError::InvalidArgument` if `name` is empty;
    /// `RepositoryError::AlreadyExists` if the name is taken.
    fn insert_module(&self, name: &str) -> Result<Module>;

    /// Inserts a release: the content file at `content_path` becomes the
    /// release's blob, and one dependency edge is stored per entry. All rows
    /// are written in a single transaction; partial insertion is never
    /// observable.
    ///
    /// # Errors
    ///
    /// `RepositoryError::InvalidArgument` if `version` is empty or `module`
    /// is not registered; `RepositoryError::AlreadyExists` on a
    /// (module, version) collision.
    fn insert_release(
        &self,
        module: &Module,
        version: &str,
        content_path: &Path,
        dependencies: &HashSet<Dependency>,
    ) -> Result<Release>;

    /// Starts a two-phase release insert: stage dependencies on the builder,
    /// then [`ReleaseBuilder::build`] commits through
    /// [`Repository::insert_release`].
    fn release_builder<'a>(
        &'a self,
        module: &Module,
        version: &str,
        content_path: &Path,
    ) -> ReleaseBuilder<'a>
    where
        Self: Sized,
    {
        ReleaseBuilder::new(self, module.clone(), version, content_path)
    }

    /// Looks up a module by name. `Ok(None)` if it is not registered.
    fn module(&self, name: &str) -> Result<Option<Module>>;

    /// Lists the resource identifiers of all releases of a module, in
    /// insertion order. `Ok(None)` if the module is not registered.
    fn releases(&self, module: &Module) -> Result<Option<Vec<Url>>>;

    /// Resolves a (module, version) pair to its resource identifier.
    fn release_uri(&self, module: &Module, version: &str) -> Result<Option<Url>>;

    /// Hydrates a release from its resource identifier, including its
    /// dependency set. `Ok(None)` if no release has that identifier.
    fn release(&self, uri: &Url) -> Result<Option<Release>>;

    /// Removes a module.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if the module is not registered;
    /// `RepositoryError::InvalidState` while it still owns releases.
    fn remove_module(&self, module: &Module) -> Result<()>;

    /// Removes a release and its dependency edges as one unit.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if the release is not stored.
    fn remove_release(&self, release: &Release) -> Result<()>;
}

/// Raw content access, consumed by the virtual-filesystem layer.
///
/// File identifiers compose the release identifier with an in-release path:
/// `<release-uri>:<path>`.
pub trait RepositorySpi: Repository {
    /// Whether the identified file exists in the store.
    fn file_exists(&self, uri: &Url) -> Result<bool>;

    /// Opens a read-only channel over the identified release's content. The
    /// channel keeps its storage session open until closed; dropping it
    /// without closing leaks the session until the channel itself is dropped.
    fn new_byte_channel(&self, uri: &Url) -> Result<Box<dyn ReleaseChannel>>;

    /// Reads the identified file's attributes.
    fn read_attributes(&self, uri: &Url) -> Result<FileAttributes>;
}

/// A seekable byte channel over one release's content blob.
pub trait ReleaseChannel: Read + Write + Seek + Send + std::fmt::Debug {
    /// Current content length in bytes.
    fn len(&self) -> std::io::Result<u64>;

    fn is_open(&self) -> bool;

    /// Releases the blob handle and its storage session. Closing twice is a
    /// no-op; reads and writes after close fail.
    fn close(&mut self) -> std::io::Result<()>;
}

/// Attributes of a file belonging to a release.
///
/// The store keeps a single timestamp per release, so the modified, accessed
/// and created times all report the same value. Classification is positional:
/// the root `/` is the only directory, everything else is a regular file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileAttributes {
    file_key: String,
    size: u64,
    modified: SystemTime,
}

impl FileAttributes {
    #[must_use]
    pub fn new(file_key: impl Into<String>, size: u64, modified: SystemTime) -> Self {
        Self {
            file_key: file_key.into(),
            size,
            modified,
        }
    }

    #[must_use]
    pub fn file_key(&self) -> &str {
        &self.file_key
    }

    #[must_use]
    pub fn size(&self) -> u64 {
        self.size
    }

    #[must_use]
    pub fn modified(&self) -> SystemTime {
        self.modified
    }

    #[must_use]
    pub fn accessed(&self) -> SystemTime {
        self.modified
    }

    #[must_use]
    pub fn created(&self) -> SystemTime {
        self.modified
    }

    #[must_use]
    pub fn is_regular_file(&self) -> bool {
        self.file_key != "/"
    }

    #[must_use]
    pub fn is_directory(&self) -> bool {
        !self.is_regular_file()
    }
}
