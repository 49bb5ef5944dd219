use std::{collections::BTreeMap, fmt::Debug};

use k8s_openapi::{
    api::{
        apps::v1::{DaemonSet, Deployment},
        core::v1::Pod,
    },
    NamespaceResourceScope,
};
use kube_client::{api::ListParams, Api, Client};
use kube_core::Resource;
use serde::de::DeserializeOwned;

use super::{ListError, PodIdentity, PodSource};

/// A workload resource that manages pods through a pod template.
pub trait Workload:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    /// Labels of the pod template, used to select the workload's pods.
    fn template_labels(&self) -> Option<&BTreeMap<String, String>>;
}

impl Workload for Deployment {
    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec
            .as_ref()?
            .template
            .metadata
            .as_ref()?
            .labels
            .as_ref()
    }
}

impl Workload for DaemonSet {
    fn template_labels(&self) -> Option<&BTreeMap<String, String>> {
        self.spec
            .as_ref()?
            .template
            .metadata
            .as_ref()?
            .labels
            .as_ref()
    }
}

/// Renders template labels as an equality-based label selector.
///
/// Returns `None` if there are no labels, since an empty selector matches every pod.
pub fn label_selector(labels: Option<&BTreeMap<String, String>>) -> Option<String> {
    let labels = labels.filter(|labels| !labels.is_empty())?;
    Some(
        labels
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect::<Vec<_>>()
            .join(","),
    )
}

/// Pod source for the pods of the workload `K` named `name`.
pub struct WorkloadPods<K> {
    workloads: Api<K>,
    pods: Api<Pod>,
    namespace: String,
    name: String,
}

impl<K: Workload> WorkloadPods<K> {
    pub fn new(client: Client, namespace: &str, name: &str) -> Self {
        Self {
            workloads: Api::namespaced(client.clone(), namespace),
            pods: Api::namespaced(client, namespace),
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        }
    }

    /// Fetches the workload itself, failing with [`ListError::NotFound`] if it does not exist.
    pub async fn workload(&self) -> Result<K, ListError> {
        self.workloads
            .get_opt(&self.name)
            .await?
            .ok_or_else(|| ListError::NotFound {
                kind: K::kind(&()).into_owned(),
                namespace: self.namespace.clone(),
                name: self.name.clone(),
            })
    }
}

impl<K: Workload> PodSource for WorkloadPods<K> {
    async fn list(&self) -> Result<Vec<PodIdentity>, ListError> {
        let workload = self.workload().await?;
        let Some(selector) = label_selector(workload.template_labels()) else {
            return Err(ListError::EmptySelector {
                kind: K::kind(&()).into_owned(),
                namespace: self.namespace.clone(),
                name: self.name.clone(),
            });
        };
        log::debug!(
            "Listing pods of {} {}/{} with selector {selector}",
            K::kind(&()),
            self.namespace,
            self.name
        );

        let pods = self
            .pods
            .list(&ListParams::default().labels(&selector))
            .await?;
        Ok(pods
            .items
            .iter()
            .map(|pod| PodIdentity::from_pod(pod, &self.namespace))
            .collect())
    }
}
