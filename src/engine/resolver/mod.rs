//! Location of the `docker` executable that buildx runs through.

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{ProcessError, Result};

/// Environment variable naming the docker executable explicitly.
pub const DOCKER_ENV_VAR: &str = "BUILDKEEPER_DOCKER";

/// Executable name searched for on `PATH`.
#[cfg(not(windows))]
const DOCKER_EXECUTABLE: &str = "docker";

/// Executable name searched for on `PATH`.
#[cfg(windows)]
const DOCKER_EXECUTABLE: &str = "docker.exe";

/// Resolves the docker executable from configuration and the environment.
///
/// Resolution order:
/// 1. An explicitly configured path (CLI, config file or
///    `BUILDKEEPER_DOCKER_PATH`)
/// 2. `BUILDKEEPER_DOCKER`
/// 3. The first executable `docker` on `PATH`
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
///
/// # Example
///
/// ```ignore
/// use mockable::DefaultEnv;
/// use buildkeeper::engine::ExecutableResolver;
///
/// let env = DefaultEnv::new();
/// let docker = ExecutableResolver::new(&env).resolve(None)?;
/// ```
pub struct ExecutableResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> ExecutableResolver<'a, E> {
    /// Creates a new resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Returns the path named by `BUILDKEEPER_DOCKER`, ignoring empty values.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<Utf8PathBuf> {
        self.env
            .string(DOCKER_ENV_VAR)
            .filter(|value| !value.is_empty())
            .map(Utf8PathBuf::from)
    }

    /// Returns the first executable `docker` found on `PATH`.
    #[must_use]
    pub fn search_path(&self) -> Option<Utf8PathBuf> {
        let path = self.env.string("PATH")?;
        std::env::split_paths(&path)
            .filter_map(|dir| Utf8PathBuf::try_from(dir).ok())
            .map(|dir| dir.join(DOCKER_EXECUTABLE))
            .find(|candidate| is_executable(candidate))
    }

    /// Resolve the executable, preferring `configured` when given.
    ///
    /// # Errors
    ///
    /// Returns `ProcessError::ExecutableNotFound` when no candidate exists or
    /// the chosen candidate is not an executable file.
    pub fn resolve(&self, configured: Option<&Utf8Path>) -> Result<Utf8PathBuf> {
        let candidate = configured
            .map(Utf8Path::to_path_buf)
            .or_else(|| self.resolve_from_env())
            .or_else(|| self.search_path())
            .ok_or_else(|| ProcessError::ExecutableNotFound {
                path: Utf8PathBuf::from(DOCKER_EXECUTABLE),
            })?;

        if !is_executable(&candidate) {
            return Err(ProcessError::ExecutableNotFound { path: candidate }.into());
        }
        tracing::debug!(docker = %candidate, "resolved docker executable");
        Ok(candidate)
    }
}

#[cfg(unix)]
fn is_executable(path: &Utf8Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    path.metadata()
        .is_ok_and(|metadata| metadata.is_file() && metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Utf8Path) -> bool {
    path.is_file()
}
