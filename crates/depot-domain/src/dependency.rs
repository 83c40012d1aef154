use url::Url;

use crate::{Module, RepositoryError};

/// How a dependency is consumed by the release that declares it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DependencyType {
    /// Needed to build the release.
    Build,
    /// Needed to run the release.
    Runtime,
}

impl DependencyType {
    /// The code persisted in the `dependency_types` lookup table.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Build => "build",
            Self::Runtime => "runtime",
        }
    }
}

impl TryFrom<&str> for DependencyType {
    type Error = RepositoryError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "build" => Ok(Self::Build),
            "runtime" => Ok(Self::Runtime),
            other => Err(RepositoryError::InvalidArgument(format!(
                "unknown dependency type '{other}'"
            ))),
        }
    }
}

/// A typed reference from one release to another release's coordinates.
///
/// Unlike [`crate::Release`], which is identified by its resource identifier
/// alone, two dependencies are equal only when the identifier, module,
/// version and type all match.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dependency {
    uri: Url,
    module: Module,
    version: String,
    kind: DependencyType,
}

impl Dependency {
    #[must_use]
    pub fn new(uri: Url, module: Module, version: impl Into<String>, kind: DependencyType) -> Self {
        Self {
            uri,
            module,
            version: version.into(),
            kind,
        }
    }

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

    #[must_use]
    pub fn kind(&self) -> DependencyType {
        self.kind
    }
}
