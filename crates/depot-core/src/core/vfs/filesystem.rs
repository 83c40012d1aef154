use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use url::Url;

use super::attributes::AttributeViewKind;
use super::path::ReleasePath;
use super::provider::{ReleaseFileSystemProvider, SharedRepository};

/// A read-only filesystem rooted at one release's content.
///
/// Instances are created and cached by [`ReleaseFileSystemProvider`], one per
/// release identifier. Closing a filesystem evicts it from the provider's
/// cache; paths created from it keep working as pure values, but storage
/// operations through a closed filesystem are rejected by their callers.
pub struct ReleaseFileSystem {
    /// Back-reference to the owning `Arc`, so paths can hold the filesystem.
    self_ref: Weak<Self>,
    provider: Weak<ReleaseFileSystemProvider>,
    repository: SharedRepository,
    release: Url,
    open: AtomicBool,
}

impl ReleaseFileSystem {
    pub(super) fn new(
        provider: Weak<ReleaseFileSystemProvider>,
        repository: SharedRepository,
        release: Url,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            self_ref: self_ref.clone(),
            provider,
            repository,
            release,
            open: AtomicBool::new(true),
        })
    }

    fn owner(&self) -> Arc<Self> {
        self.self_ref
            .upgrade()
            .expect("filesystems are always owned by an Arc")
    }

    /// The resource identifier of the projected release.
    #[must_use]
    pub fn release(&self) -> &Url {
        &self.release
    }

    pub(crate) fn repository(&self) -> &SharedRepository {
        &self.repository
    }

    #[must_use]
    pub fn provider(&self) -> Option<Arc<ReleaseFileSystemProvider>> {
        self.provider.upgrade()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn is_read_only(&self) -> bool {
        true
    }

    #[must_use]
    pub fn separator(&self) -> &'static str {
        "/"
    }

    /// Closes the filesystem and removes it from the provider cache. Closing
    /// again is a no-op.
    pub fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            if let Some(provider) = self.provider.upgrade() {
                provider.evict(&self.release);
            }
        }
    }

    /// Builds a path on this filesystem, joining the segments with `/`.
    #[must_use]
    pub fn path(&self, first: &str, more: &[&str]) -> ReleasePath {
        let mut joined = first.to_string();
        for segment in more {
            joined.push('/');
            joined.push_str(segment);
        }
        ReleasePath::new(self.owner(), joined)
    }

    /// The single root directory, `/`.
    #[must_use]
    pub fn root_directories(&self) -> Vec<ReleasePath> {
        vec![self.path("/", &[])]
    }

    #[must_use]
    pub fn supported_attribute_views(&self) -> &'static [AttributeViewKind] {
        &[AttributeViewKind::Basic]
    }
}

impl std::fmt::Debug for ReleaseFileSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseFileSystem")
            .field("release", &self.release.as_str())
            .field("open", &self.is_open())
            .finish()
    }
}
