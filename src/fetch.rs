//! Retrieval of configuration files from running containers.

use std::future::Future;

use crate::source::PodIdentity;

/// The configuration file read from every pod unless overridden.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/nginx/nginx.conf";

/// Failure to establish or drive a remote command stream.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Which container of a pod to read from.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ContainerSelector {
    /// The container with this name.
    Named(String),
    /// The first container of the pod spec.
    #[default]
    First,
}

impl From<Option<String>> for ContainerSelector {
    fn from(name: Option<String>) -> Self {
        name.map_or(Self::First, Self::Named)
    }
}

/// Raw output of a remote command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
    /// Message of a `Failure` status reported by the remote side, if any.
    pub failure: Option<String>,
}

impl FetchResult {
    /// Interprets the output as file content.
    ///
    /// Anything written to stderr is a failure even if the stream itself succeeded.
    pub fn into_content(self, pod: &PodIdentity) -> Result<String, FetchError> {
        if !self.stderr.is_empty() {
            return Err(FetchError::RemoteStderr {
                pod: pod.name.clone(),
                stderr: String::from_utf8_lossy(&self.stderr).trim_end().to_owned(),
            });
        }
        if let Some(message) = self.failure {
            return Err(FetchError::RemoteStatus {
                pod: pod.name.clone(),
                message,
            });
        }
        match String::from_utf8(self.stdout) {
            Ok(content) => Ok(content),
            Err(_) => Err(FetchError::InvalidUtf8 {
                pod: pod.name.clone(),
            }),
        }
    }
}

/// Runs a command inside a container and collects its output.
pub trait RemoteExec: Send + Sync + 'static {
    fn exec(
        &self,
        pod: &PodIdentity,
        container: &str,
        command: &[&str],
    ) -> impl Future<Output = Result<FetchResult, TransportError>> + Send;
}

/// Picks the container to read from.
pub fn resolve_container<'a>(
    pod: &'a PodIdentity,
    selector: &ContainerSelector,
) -> Result<&'a str, FetchError> {
    let found = match selector {
        ContainerSelector::Named(name) => pod.containers.iter().find(|c| *c == name),
        ContainerSelector::First => pod.containers.first(),
    };
    found
        .map(String::as_str)
        .ok_or_else(|| FetchError::ContainerNotFound {
            pod: pod.name.clone(),
            container: match selector {
                ContainerSelector::Named(name) => Some(name.clone()),
                ContainerSelector::First => None,
            },
        })
}

/// Reads the file at `path` from the selected container of `pod`.
///
/// Performs exactly one remote command; there is no retry.
pub async fn fetch<E: RemoteExec>(
    exec: &E,
    pod: &PodIdentity,
    selector: &ContainerSelector,
    path: &str,
) -> Result<String, FetchError> {
    let container = resolve_container(pod, selector)?;
    log::debug!("Reading {path} from {pod} container {container}");

    let result = exec
        .exec(pod, container, &["cat", path])
        .await
        .map_err(|source| FetchError::Transport {
            pod: pod.name.clone(),
            source,
        })?;
    result.into_content(pod)
}

/// The error type returned by [`fetch`].
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{}", container_not_found(.pod, .container))]
    ContainerNotFound {
        pod: String,
        container: Option<String>,
    },
    #[error("remote command in pod {pod} failed: {source}")]
    Transport {
        pod: String,
        #[source]
        source: TransportError,
    },
    #[error("remote command in pod {pod} wrote to stderr: {stderr}")]
    RemoteStderr {
        pod: String,
        stderr: String,
    },
    #[error("remote command in pod {pod} failed: {message}")]
    RemoteStatus {
        pod: String,
        message: String,
    },
    #[error("configuration of pod {pod} is not valid UTF-8")]
    InvalidUtf8 { pod: String },
    #[error("reading configuration from pod {pod} timed out")]
    Timeout { pod: String },
    #[error("reading configuration from pod {pod} was cancelled")]
    Cancelled { pod: String },
}

fn container_not_found(pod: &str, container: &Option<String>) -> String {
    match container {
        Some(container) => format!("container {container} not found in pod {pod}"),
        None => format!("pod {pod} has no containers"),
    }
}

impl FetchError {
    /// Name of the pod the failure happened in.
    pub fn pod(&self) -> &str {
        match self {
            Self::ContainerNotFound { pod, .. }
            | Self::Transport { pod, .. }
            | Self::RemoteStderr { pod, .. }
            | Self::RemoteStatus { pod, .. }
            | Self::InvalidUtf8 { pod }
            | Self::Timeout { pod }
            | Self::Cancelled { pod } => pod,
        }
    }
}

mod exec;
pub use exec::KubeExec;
