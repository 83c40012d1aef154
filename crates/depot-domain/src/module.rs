use anyhow::Result;

use crate::RepositoryError;

/// A named software module. Modules own zero or more releases.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Module {
    name: String,
}

impl Module {
    /// Creates a module handle.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::InvalidArgument` if `name` is empty.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(RepositoryError::InvalidArgument("module name is empty".into()).into());
        }
        Ok(Self { name })
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_names() {
        let err = Module::new("").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<RepositoryError>(),
            Some(RepositoryError::InvalidArgument(_))
        ));
        assert_eq!(Module::new("serde").expect("module").name(), "serde");
    }
}
