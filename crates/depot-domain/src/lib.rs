//! Entity model and contracts for the depot release repository.
//!
//! A repository stores versioned, single-file releases grouped under named
//! modules. Each release carries a set of typed dependencies on other
//! releases. The storage engine and the virtual-filesystem projection live in
//! `depot-core`; this crate holds the value types, the repository contract,
//! and the error taxonomy shared between the two.

mod dependency;
mod error;
mod module;
mod release;
mod repository;

pub use dependency::{Dependency, DependencyType};
pub use error::RepositoryError;
pub use module::Module;
pub use release::{CopyOption, Release, ReleaseBuilder};
pub use repository::{FileAttributes, ReleaseChannel, Repository, RepositorySpi};
