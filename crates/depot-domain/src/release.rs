use std::collections::HashSet;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::debug;
use url::Url;

use crate::{Dependency, Module, ReleaseChannel, Repository, RepositoryError, RepositorySpi};

/// Options for [`Release::copy_to`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CopyOption {
    /// Skip the copy when the target's last-modified time is at or after the
    /// stored release's.
    SkipNewer,
}

/// One immutable, versioned artifact belonging to a module. Each release
/// consists of a single file.
#[derive(Clone, Debug)]
pub struct Release {
    uri: Url,
    module: Module,
    version: String,
    filename: String,
    dependencies: HashSet<Dependency>,
}

impl Release {
    #[must_use]
    pub fn new(
        uri: Url,
        module: Module,
        version: impl Into<String>,
        filename: impl Into<String>,
        dependencies: HashSet<Dependency>,
    ) -> Self {
        Self {
            uri,
            module,
            version: version.into(),
            filename: filename.into(),
            dependencies,
        }
    }

    /// The stable resource identifier of this release.
    #[must_use]
    pub fn uri(&self) -> &Url {
        &self.uri
    }

    #[must_use]
    pub fn module(&self) -> &Module {
        &self.module
    }

    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// The filename the release was stored under.
    #[must_use]
    pub fn filename(&self) -> &str {
        &self.filename
    }

    #[must_use]
    pub fn dependencies(&self) -> &HashSet<Dependency> {
        &self.dependencies
    }

    /// The file identifier used by the content SPI: `<uri>:<filename>`.
    pub fn content_uri(&self) -> Result<Url> {
        Url::parse(&format!("{}:{}", self.uri, self.filename))
            .with_context(|| format!("release {} has an unusable filename", self.uri))
    }

    /// Exports the release's content to `directory/<filename>`, returning the
    /// target path. With [`CopyOption::SkipNewer`], a target whose mtime is at
    /// or after the stored last-modified time is left untouched.
    ///
    /// # Errors
    ///
    /// `RepositoryError::NotFound` if `directory` is not an existing
    /// directory; otherwise any storage or I/O failure.
    pub fn copy_to(
        &self,
        repository: &dyn RepositorySpi,
        directory: &Path,
        options: &[CopyOption],
    ) -> Result<PathBuf> {
        let is_dir = fs::metadata(directory)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        if !is_dir {
            return Err(RepositoryError::NotFound(format!(
                "directory {}",
                directory.display()
            ))
            .into());
        }

        let content_uri = self.content_uri()?;
        let target = directory.join(&self.filename);
        if options.contains(&CopyOption::SkipNewer) {
            let source_modified = repository.read_attributes(&content_uri)?.modified();
            let target_modified = fs::metadata(&target).and_then(|m| m.modified()).ok();
            if target_modified.is_some_and(|t| t >= source_modified) {
                debug!(target = %target.display(), "skipping copy, target is newer");
                return Ok(target);
            }
        }

        let mut channel = repository.new_byte_channel(&content_uri)?;
        let mut content = Vec::new();
        channel
            .read_to_end(&mut content)
            .with_context(|| format!("failed to read the content of {}", self.uri))?;
        channel.close()?;
        fs::write(&target, &content)
            .with_context(|| format!("failed to export {} to {}", self.uri, target.display()))?;
        Ok(target)
    }
}

/// Releases are identified by their resource identifier alone.
impl PartialEq for Release {
    fn eq(&self, other: &Self) -> bool {
        self.uri == other.uri
    }
}

impl Eq for Release {}

impl Hash for Release {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.uri.hash(state);
    }
}

/// Two-phase release insert: stage dependencies, then commit.
pub struct ReleaseBuilder<'a> {
    repository: &'a dyn Repository,
    module: Module,
    version: String,
    content_path: PathBuf,
    dependencies: HashSet<Dependency>,
}

impl<'a> ReleaseBuilder<'a> {
    #[must_use]
    pub fn new(
        repository: &'a dyn Repository,
        module: Module,
        version: impl Into<String>,
        content_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            repository,
            module,
            version: version.into(),
            content_path: content_path.into(),
            dependencies: HashSet::new(),
        }
    }

    /// Stages a dependency for the release.
    #[must_use]
    pub fn dependency(mut self, dependency: Dependency) -> Self {
        self.dependencies.insert(dependency);
        self
    }

    /// Commits the release and its staged dependencies as one unit.
    pub fn build(self) -> Result<Release> {
        self.repository.insert_release(
            &self.module,
            &self.version,
            &self.content_path,
            &self.dependencies,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn release(uri: &str, version: &str) -> Release {
        Release::new(
            Url::parse(uri).expect("uri"),
            Module::new("m").expect("module"),
            version,
            "m.jar",
            HashSet::new(),
        )
    }

    #[test]
    fn identity_is_the_resource_identifier_alone() {
        // Same identifier, different metadata: still the same release.
        assert_eq!(release("depot.release:1", "1.0"), release("depot.release:1", "9.9"));
        assert_ne!(release("depot.release:1", "1.0"), release("depot.release:2", "1.0"));
    }

    #[test]
    fn content_uri_appends_the_filename() {
        let uri = release("depot.release:7", "1.0").content_uri().expect("content uri");
        assert_eq!(uri.as_str(), "depot.release:7:m.jar");
    }
}
