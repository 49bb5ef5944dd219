//! Pod sources: the set of pods that belong to a workload.

use std::{fmt, future::Future, str::FromStr};

use k8s_openapi::api::core::v1::Pod;
use kube_core::ResourceExt;

use crate::config::ConfigError;

/// Uniquely identifies a running pod, together with the containers it declares.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PodIdentity {
    /// The pod namespace
    pub namespace: String,
    /// The pod name
    pub name: String,
    /// Container names in the order of the pod spec.
    pub containers: Vec<String>,
}

impl PodIdentity {
    pub fn new(
        namespace: impl Into<String>,
        name: impl Into<String>,
        containers: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            containers: containers.into_iter().map(Into::into).collect(),
        }
    }

    /// Builds the identity of a listed pod.
    ///
    /// `fallback_namespace` is used when the apiserver omits the namespace,
    /// which only happens for objects that were never persisted.
    pub fn from_pod(pod: &Pod, fallback_namespace: &str) -> Self {
        let containers = pod
            .spec
            .iter()
            .flat_map(|spec| &spec.containers)
            .map(|container| container.name.clone())
            .collect();
        Self {
            namespace: pod
                .namespace()
                .unwrap_or_else(|| fallback_namespace.to_owned()),
            name: pod.name_any(),
            containers,
        }
    }
}

impl fmt::Display for PodIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Lists the pods belonging to a single workload.
pub trait PodSource {
    fn list(&self) -> impl Future<Output = Result<Vec<PodIdentity>, ListError>> + Send;
}

/// The workload kinds pods can be listed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkloadKind {
    Deployment,
    DaemonSet,
}

impl WorkloadKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Deployment => "deployment",
            Self::DaemonSet => "daemonset",
        }
    }
}

impl FromStr for WorkloadKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "deployment" | "deploy" => Ok(Self::Deployment),
            "daemonset" | "ds" => Ok(Self::DaemonSet),
            other => Err(ConfigError::UnsupportedResource(other.to_owned())),
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error type returned by [`PodSource::list`].
#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("{kind} {namespace}/{name} has no pod template labels to select pods with")]
    EmptySelector {
        kind: String,
        namespace: String,
        name: String,
    },
    #[error("failed to list pods: {0}")]
    Api(#[from] kube_client::Error),
}

pub mod workload;
pub use workload::{label_selector, Workload, WorkloadPods};
