//! Storage engine and virtual-filesystem projection for the depot release
//! repository.
//!
//! [`LocalRepository`] persists modules, releases and dependency edges in a
//! SQLite store, with each release's file kept as a single content blob.
//! [`ReleaseFileSystemProvider`] projects a stored release as a read-only,
//! single-root filesystem, so consumers can address it with ordinary path
//! operations and byte channels without knowing it lives in a database.

mod core;

pub use crate::core::repo::local::{BlobByteChannel, ChannelOptions, LocalRepository, RELEASE_SCHEME};
pub use crate::core::vfs::{
    AccessMode, AttributeViewKind, DirectoryStreamAttributeView, ReleaseDirectoryStream,
    ReleaseFileAttributeView, ReleaseFileSystem, ReleaseFileSystemProvider, ReleasePath,
};
