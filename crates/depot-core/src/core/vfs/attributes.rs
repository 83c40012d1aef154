use std::time::SystemTime;

use anyhow::Result;

use depot_domain::{FileAttributes, RepositoryError, RepositorySpi};

use super::path::ReleasePath;

/// Attribute views understood by the release filesystem. Only the basic view
/// exists; the closed set keeps view dispatch a compile-time concern.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AttributeViewKind {
    Basic,
}

impl AttributeViewKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Basic => "basic",
        }
    }
}

/// The basic attribute view of one release path.
pub struct ReleaseFileAttributeView {
    path: ReleasePath,
}

impl ReleaseFileAttributeView {
    pub(super) fn new(path: ReleasePath) -> Self {
        Self { path }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        AttributeViewKind::Basic.as_str()
    }

    /// Reads the attributes from storage.
    pub fn read_attributes(&self) -> Result<FileAttributes> {
        self.path
            .filesystem()
            .repository()
            .read_attributes(&self.path.to_uri()?)
    }

    /// The store keeps a single immutable timestamp, so a time equal to the
    /// stored value is accepted as a no-op and any other value is a read-only
    /// violation.
    pub fn set_times(
        &self,
        modified: Option<SystemTime>,
        accessed: Option<SystemTime>,
        created: Option<SystemTime>,
    ) -> Result<()> {
        let current = self.read_attributes()?.modified();
        for requested in [modified, accessed, created].into_iter().flatten() {
            if requested != current {
                return Err(RepositoryError::ReadOnly.into());
            }
        }
        Ok(())
    }
}
