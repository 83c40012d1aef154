use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use anyhow::Result;
use tracing::warn;

use depot_domain::{FileAttributes, ReleaseChannel, RepositoryError};

use crate::core::repo::local::ChannelOptions;

use super::attributes::{AttributeViewKind, ReleaseFileAttributeView};
use super::path::ReleasePath;
use super::provider::ReleaseFileSystemProvider;

/// A directory stream over a release's virtual root.
///
/// A release is exactly one file, so the stream yields exactly one entry and
/// may be consumed exactly once. Child operations resolve against the stream
/// directory and delegate to the provider.
pub struct ReleaseDirectoryStream {
    provider: Arc<ReleaseFileSystemProvider>,
    directory: ReleasePath,
    iterated: AtomicBool,
    closed: AtomicBool,
}

impl ReleaseDirectoryStream {
    pub(super) fn new(provider: Arc<ReleaseFileSystemProvider>, directory: ReleasePath) -> Self {
        Self {
            provider,
            directory,
            iterated: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RepositoryError::InvalidState("directory stream is closed".into()).into());
        }
        Ok(())
    }

    /// Takes the stream's entries: the single release path.
    ///
    /// # Errors
    ///
    /// `RepositoryError::InvalidState` on a second call, or once the owning
    /// filesystem is closed.
    pub fn entries(&self) -> Result<Vec<ReleasePath>> {
        if self.iterated.swap(true, Ordering::SeqCst) {
            return Err(RepositoryError::InvalidState(
                "directory stream was already iterated".into(),
            )
            .into());
        }
        let filesystem = self.directory.filesystem();
        if !filesystem.is_open() {
            return Err(RepositoryError::InvalidState("filesystem is closed".into()).into());
        }
        Ok(vec![self.provider.path(filesystem.release())?])
    }

    /// Opens a stream over `path`, resolved against this directory.
    pub fn new_directory_stream(&self, path: &ReleasePath) -> Result<ReleaseDirectoryStream> {
        self.ensure_open()?;
        let absolute = self.directory.resolve(path);
        Ok(self.provider.new_directory_stream(&absolute))
    }

    /// Opens a byte channel for `path`, resolved against this directory.
    pub fn new_byte_channel(
        &self,
        path: &ReleasePath,
        options: &ChannelOptions,
    ) -> Result<Box<dyn ReleaseChannel>> {
        self.ensure_open()?;
        if self.directory.filesystem().is_read_only() && (options.write || options.delete_on_close)
        {
            return Err(RepositoryError::ReadOnly.into());
        }
        let absolute = self.directory.resolve(path);
        self.provider.new_byte_channel(&absolute, options)
    }

    /// Deletes a file under this directory. Fails up-front on a read-only
    /// filesystem; a target that turns out to be a directory is skipped with
    /// a warning instead of failing.
    pub fn delete_file(&self, path: &ReleasePath) -> Result<()> {
        self.ensure_open()?;
        if self.directory.filesystem().is_read_only() {
            return Err(RepositoryError::ReadOnly.into());
        }
        let absolute = self.directory.resolve(path).to_absolute();
        if absolute.is_root() {
            warn!(path = %absolute, "skipping directory during file delete");
            return Ok(());
        }
        self.provider.delete(&absolute)
    }

    /// Deletes a directory under this directory. Fails up-front on a
    /// read-only filesystem; a target that turns out to be a file is skipped
    /// with a warning instead of failing.
    pub fn delete_directory(&self, path: &ReleasePath) -> Result<()> {
        self.ensure_open()?;
        if self.directory.filesystem().is_read_only() {
            return Err(RepositoryError::ReadOnly.into());
        }
        let absolute = self.directory.resolve(path).to_absolute();
        if !absolute.is_root() {
            warn!(path = %absolute, "skipping file during directory delete");
            return Ok(());
        }
        self.provider.delete(&absolute)
    }

    /// The attribute view of this stream's directory.
    #[must_use]
    pub fn attribute_view(&self, view: AttributeViewKind) -> DirectoryStreamAttributeView<'_> {
        self.attribute_view_of(&self.directory, view)
    }

    /// The attribute view of a path belonging to this stream.
    #[must_use]
    pub fn attribute_view_of(
        &self,
        path: &ReleasePath,
        view: AttributeViewKind,
    ) -> DirectoryStreamAttributeView<'_> {
        let AttributeViewKind::Basic = view;
        DirectoryStreamAttributeView {
            stream: self,
            inner: ReleaseFileAttributeView::new(path.clone()),
        }
    }

    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

/// An attribute view that stops working once its directory stream is closed.
pub struct DirectoryStreamAttributeView<'a> {
    stream: &'a ReleaseDirectoryStream,
    inner: ReleaseFileAttributeView,
}

impl DirectoryStreamAttributeView<'_> {
    fn ensure_open(&self) -> Result<()> {
        if !self.stream.is_open() {
            return Err(RepositoryError::InvalidState("directory stream is closed".into()).into());
        }
        Ok(())
    }

    pub fn read_attributes(&self) -> Result<FileAttributes> {
        self.ensure_open()?;
        self.inner.read_attributes()
    }

    pub fn set_times(
        &self,
        modified: Option<SystemTime>,
        accessed: Option<SystemTime>,
        created: Option<SystemTime>,
    ) -> Result<()> {
        self.ensure_open()?;
        self.inner.set_times(modified, accessed, created)
    }
}
