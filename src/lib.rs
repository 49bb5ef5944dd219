//! kube-config-drift checks that all pods of a workload run with the same configuration.
//!
//! The pods of a Deployment or DaemonSet are listed through the label selector
//! of their pod template. The configuration file (`/etc/nginx/nginx.conf` by default)
//! is read from a container of every pod in parallel over the `exec` subresource,
//! comment lines are stripped so that generated timestamps don't count as differences,
//! and the remaining text is compared verbatim across pods.

pub mod client;
pub mod compare;
pub use compare::{compare, ConfigurationMap, DriftDetected, DriftVerdict};
pub mod config;
pub use config::{Config, ConfigError, Target};
pub mod fetch;
pub use fetch::{fetch, ContainerSelector, FetchError, KubeExec, RemoteExec};
mod normalize;
pub use normalize::normalize;
mod runner;
pub use runner::{check, run, Outcome, RunError, Stage};
pub mod source;
pub use source::{PodIdentity, PodSource, WorkloadKind, WorkloadPods};

#[cfg(test)]
mod tests;
