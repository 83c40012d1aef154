use std::cmp::Ordering;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use anyhow::{Context, Result};
use url::Url;

use depot_domain::RepositoryError;

use super::filesystem::ReleaseFileSystem;

/// The path of a file belonging to a release.
///
/// Paths are unix-style, `/`-separated strings bound to one
/// [`ReleaseFileSystem`]. All operations below are pure string algebra: no
/// storage is touched, and no existence checks are made.
///
/// Equality requires the same owning filesystem instance and the same raw
/// path string; hashing uses the path string alone.
#[derive(Clone, Debug)]
pub struct ReleasePath {
    filesystem: Arc<ReleaseFileSystem>,
    path: String,
    /// Offsets of the name components, computed on first use.
    ///
    /// Holds one entry more than the number of components; the final entry is
    /// the offset at which a child component would start.
    components: OnceLock<Vec<usize>>,
}

impl ReleasePath {
    /// Creates a path on `filesystem`. Surrounding whitespace is trimmed.
    #[must_use]
    pub fn new(filesystem: Arc<ReleaseFileSystem>, path: impl AsRef<str>) -> Self {
        Self {
            filesystem,
            path: path.as_ref().trim().to_string(),
            components: OnceLock::new(),
        }
    }

    fn derived(&self, path: impl Into<String>) -> Self {
        Self {
            filesystem: Arc::clone(&self.filesystem),
            path: path.into(),
            components: OnceLock::new(),
        }
    }

    #[must_use]
    pub fn filesystem(&self) -> &Arc<ReleaseFileSystem> {
        &self.filesystem
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn is_absolute(&self) -> bool {
        self.path.starts_with('/')
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.path == "/"
    }

    fn offsets(&self) -> &[usize] {
        self.components
            .get_or_init(|| component_offsets(&self.path))
    }

    /// Number of name components. The root has none; an empty path has one
    /// empty component.
    #[must_use]
    pub fn name_count(&self) -> usize {
        self.offsets().len().saturating_sub(1)
    }

    fn name_str(&self, index: usize) -> &str {
        let offsets = self.offsets();
        &self.path[offsets[index]..offsets[index + 1] - 1]
    }

    fn component_strings(&self) -> Vec<&str> {
        (0..self.name_count()).map(|i| self.name_str(i)).collect()
    }

    /// The root path, if this path is absolute.
    #[must_use]
    pub fn root(&self) -> Option<ReleasePath> {
        if !self.is_absolute() {
            return None;
        }
        if self.path.len() == 1 {
            return Some(self.clone());
        }
        Some(self.derived("/"))
    }

    /// The final name component, if any.
    #[must_use]
    pub fn file_name(&self) -> Option<ReleasePath> {
        let count = self.name_count();
        if count == 0 {
            return None;
        }
        if count == 1 && !self.is_absolute() {
            return Some(self.clone());
        }
        Some(self.derived(self.name_str(count - 1)))
    }

    /// The parent path. A path with at most one component has no parent.
    #[must_use]
    pub fn parent(&self) -> Option<ReleasePath> {
        let count = self.name_count();
        if count <= 1 {
            return None;
        }
        let end = self.offsets()[count - 1] - 1;
        Some(self.derived(&self.path[..end]))
    }

    /// The name component at `index`, if it exists.
    #[must_use]
    pub fn name(&self, index: usize) -> Option<ReleasePath> {
        if index >= self.name_count() {
            return None;
        }
        Some(self.derived(self.name_str(index)))
    }

    /// The components in `[begin, end)`, joined. `None` unless
    /// `begin < end <= name_count()`.
    #[must_use]
    pub fn subpath(&self, begin: usize, end: usize) -> Option<ReleasePath> {
        if begin >= end || end > self.name_count() {
            return None;
        }
        let offsets = self.offsets();
        Some(self.derived(&self.path[offsets[begin]..offsets[end] - 1]))
    }

    pub fn iter(&self) -> impl Iterator<Item = ReleasePath> + '_ {
        (0..self.name_count()).map(|i| self.derived(self.name_str(i)))
    }

    /// Removes `.` components and collapses `..` against the component before
    /// it, scanning right to left. Absolute paths keep their root and drop
    /// surplus `..`; relative paths keep leading `..`. Purely syntactic.
    #[must_use]
    pub fn normalize(&self) -> ReleasePath {
        let count = self.name_count();
        let mut kept: Vec<&str> = Vec::new();
        let mut skip = 0usize;
        for index in (0..count).rev() {
            let component = self.name_str(index);
            match component {
                "." => continue,
                ".." => {
                    skip += 1;
                    continue;
                }
                _ => {}
            }
            if skip > 0 {
                skip -= 1;
                continue;
            }
            kept.push(component);
        }
        kept.reverse();

        let mut parts: Vec<&str> = Vec::new();
        if !self.is_absolute() {
            parts.extend(std::iter::repeat("..").take(skip));
        }
        parts.extend(kept);
        let joined = parts.join("/");
        if self.is_absolute() {
            self.derived(format!("/{joined}"))
        } else {
            self.derived(joined)
        }
    }

    /// Resolves `other` against this path. An absolute `other` wins outright;
    /// an empty `other` leaves this path unchanged.
    #[must_use]
    pub fn resolve(&self, other: &ReleasePath) -> ReleasePath {
        if other.is_absolute() {
            return other.clone();
        }
        if other.path.is_empty() {
            return self.clone();
        }
        if self.path.is_empty() {
            return other.clone();
        }
        self.derived(format!("{}/{}", self.path, other.path))
    }

    /// Resolves `other` against this path's parent.
    #[must_use]
    pub fn resolve_sibling(&self, other: &ReleasePath) -> ReleasePath {
        if self.path.is_empty() {
            return other.clone();
        }
        match self.parent() {
            Some(parent) => parent.resolve(other),
            None => other.clone(),
        }
    }

    /// Constructs the relative path from this path to `other`: the longest
    /// common prefix of the normalized components is skipped, one `..` is
    /// emitted per remaining component of this path, and the remaining
    /// components of `other` are appended.
    ///
    /// # Errors
    ///
    /// `RepositoryError::InvalidArgument` unless both paths are absolute or
    /// both are relative.
    pub fn relativize(&self, other: &ReleasePath) -> Result<ReleasePath> {
        if self == other {
            return Ok(self.derived(""));
        }
        if self.is_absolute() != other.is_absolute() {
            return Err(RepositoryError::InvalidArgument(
                "cannot relativize paths with mismatched roots".into(),
            )
            .into());
        }
        let base = self.normalize();
        let target = other.normalize();
        let base_parts = real_components(&base);
        let target_parts = real_components(&target);

        let mut common = 0;
        while common < base_parts.len()
            && common < target_parts.len()
            && base_parts[common] == target_parts[common]
        {
            common += 1;
        }

        let mut parts: Vec<&str> = Vec::new();
        parts.extend(std::iter::repeat("..").take(base_parts.len() - common));
        parts.extend(&target_parts[common..]);
        Ok(self.derived(parts.join("/")))
    }

    /// Whether this path begins with the components of `other`, on the same
    /// filesystem and with matching root presence. Matches whole components,
    /// never partial tokens.
    #[must_use]
    pub fn starts_with(&self, other: &ReleasePath) -> bool {
        if !Arc::ptr_eq(&self.filesystem, &other.filesystem) {
            return false;
        }
        if self.is_absolute() != other.is_absolute() {
            return false;
        }
        let ours = self.component_strings();
        let theirs = other.component_strings();
        theirs.len() <= ours.len() && ours[..theirs.len()] == theirs[..]
    }

    #[must_use]
    pub fn starts_with_str(&self, other: &str) -> bool {
        self.starts_with(&self.derived(other))
    }

    /// Whether this path ends with the components of `other`. An absolute
    /// `other` only matches an absolute path with exactly the same
    /// components.
    #[must_use]
    pub fn ends_with(&self, other: &ReleasePath) -> bool {
        if !Arc::ptr_eq(&self.filesystem, &other.filesystem) {
            return false;
        }
        let ours = self.component_strings();
        let theirs = other.component_strings();
        if other.is_absolute() {
            return self.is_absolute() && ours == theirs;
        }
        theirs.len() <= ours.len() && ours[ours.len() - theirs.len()..] == theirs[..]
    }

    #[must_use]
    pub fn ends_with_str(&self, other: &str) -> bool {
        self.ends_with(&self.derived(other))
    }

    /// The file identifier of this path: `<release-uri>:<path>`.
    pub fn to_uri(&self) -> Result<Url> {
        let raw = format!("{}:{}", self.filesystem.release(), self.path);
        Url::parse(&raw).with_context(|| format!("path '{}' does not form a valid uri", self.path))
    }

    /// An absolute path is returned unchanged; a relative path is normalized.
    /// Paths are not re-anchored: the filesystem has no working directory.
    #[must_use]
    pub fn to_absolute(&self) -> ReleasePath {
        if self.is_absolute() {
            return self.clone();
        }
        self.normalize()
    }
}

/// Component offsets of `path`: the start of each `/`-delimited token plus a
/// trailing sentinel. Absolute paths skip the empty leading token; the root
/// itself has no components.
fn component_offsets(path: &str) -> Vec<usize> {
    let absolute = path.starts_with('/');
    let trimmed = path.trim_end_matches('/');
    if absolute && trimmed.is_empty() {
        return Vec::new();
    }
    let mut cursor = usize::from(absolute);
    let mut offsets = vec![cursor];
    for token in trimmed[cursor..].split('/') {
        cursor += token.len() + 1;
        offsets.push(cursor);
    }
    offsets
}

/// The name components of a normalized path, with the empty path and the root
/// contributing none.
fn real_components(path: &ReleasePath) -> Vec<&str> {
    if path.path.is_empty() || path.is_root() {
        return Vec::new();
    }
    path.component_strings()
}

impl PartialEq for ReleasePath {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.filesystem, &other.filesystem) && self.path == other.path
    }
}

impl Eq for ReleasePath {}

impl Hash for ReleasePath {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl PartialOrd for ReleasePath {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(
            self.filesystem
                .release()
                .as_str()
                .cmp(other.filesystem.release().as_str())
                .then_with(|| self.path.cmp(&other.path)),
        )
    }
}

impl std::fmt::Display for ReleasePath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.path)
    }
}
