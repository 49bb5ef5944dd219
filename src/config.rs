use std::time::Duration;

use crate::{
    fetch::{ContainerSelector, DEFAULT_CONFIG_PATH},
    source::WorkloadKind,
};

/// Parameters for [`run`](crate::run).
#[derive(Debug, Clone)]
pub struct Config {
    /// The container to read the configuration from in every pod.
    pub container: ContainerSelector,
    /// Absolute path of the configuration file inside the container.
    pub path: String,
    /// Deadline for reading the configuration of a single pod.
    ///
    /// Without a deadline a fetch is only bounded by the timeouts of its transport.
    pub fetch_timeout: Option<Duration>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            container: ContainerSelector::First,
            path: DEFAULT_CONFIG_PATH.to_owned(),
            fetch_timeout: None,
        }
    }
}

impl Config {
    /// Reads from the named container instead of the first one.
    pub fn container(mut self, container: impl Into<ContainerSelector>) -> Self {
        self.container = container.into();
        self
    }

    /// Reads a different file.
    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }
}

/// The workload whose pods are checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    pub kind: WorkloadKind,
    pub name: String,
    pub namespace: String,
}

impl Target {
    /// Validates the raw command line values.
    ///
    /// The namespace is mandatory; unlike kubectl there is no fallback to the
    /// namespace of the current context.
    pub fn parse(kind: &str, name: &str, namespace: Option<&str>) -> Result<Self, ConfigError> {
        let namespace = namespace
            .filter(|namespace| !namespace.is_empty())
            .ok_or(ConfigError::MissingNamespace)?;
        if kind.is_empty() {
            return Err(ConfigError::MissingResource);
        }
        if name.is_empty() {
            return Err(ConfigError::MissingName);
        }
        Ok(Self {
            kind: kind.parse()?,
            name: name.to_owned(),
            namespace: namespace.to_owned(),
        })
    }
}

/// Invalid command line arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("specify a namespace")]
    MissingNamespace,
    #[error("specify a resource")]
    MissingResource,
    #[error("specify a name")]
    MissingName,
    #[error("unsupported resource {0:?}, expected one of deployment, deploy, daemonset, ds")]
    UnsupportedResource(String),
}
