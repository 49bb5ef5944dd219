use std::{mem, sync::Arc};

use parking_lot::Mutex;
use tokio::task::{JoinError, JoinSet};
use tokio_util::sync::CancellationToken;

use crate::{
    compare::{compare, ConfigurationMap, DriftDetected, DriftVerdict},
    config::Config,
    fetch::{fetch, FetchError, RemoteExec},
    normalize::normalize,
    source::{ListError, PodIdentity, PodSource},
};

/// Progress of a [`run`], in the order stages are entered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stage {
    Listing,
    /// Configuration is being read from `pods` pods in parallel.
    Fetching { pods: usize },
    /// The configuration of `pod` was read and normalized.
    Fetched {
        pod: String,
        bytes: usize,
    },
    Comparing,
    Finished { drift: bool },
}

/// The normalized configuration of every pod and the verdict over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    pub verdict: DriftVerdict,
    pub configurations: ConfigurationMap,
}

/// Reads the configuration of every pod in `source` and compares them.
///
/// One task is spawned per pod without a concurrency limit. All tasks are
/// awaited even after a failure; the first failure observed is returned and
/// the configurations are not compared.
pub async fn run<S, E>(
    source: &S,
    exec: Arc<E>,
    config: &Config,
    cancel: CancellationToken,
    mut observe: impl FnMut(Stage),
) -> Result<Outcome, RunError>
where
    S: PodSource,
    E: RemoteExec,
{
    observe(Stage::Listing);
    let pods = source.list().await?;
    log::info!("Found {} pods", pods.len());

    observe(Stage::Fetching { pods: pods.len() });
    let configurations = Arc::new(Mutex::new(ConfigurationMap::new()));
    let mut tasks = JoinSet::new();
    for pod in pods {
        tasks.spawn(fetch_and_normalize(
            Arc::clone(&exec),
            pod,
            config.clone(),
            cancel.clone(),
            Arc::clone(&configurations),
        ));
    }

    let mut failure = None;
    while let Some(result) = tasks.join_next().await {
        match result {
            Ok(Ok((pod, bytes))) => observe(Stage::Fetched { pod, bytes }),
            Ok(Err(err)) => {
                if failure.is_none() {
                    log::warn!(
                        "Pod {} failed, waiting for remaining pods: {err}",
                        err.pod()
                    );
                    failure = Some(RunError::Fetch(err));
                } else {
                    log::debug!("Ignoring subsequent failure of pod {}: {err}", err.pod());
                }
            }
            Err(err) => {
                log::error!("Configuration task panicked: {err}");
                failure.get_or_insert(RunError::TaskPanicked(err));
            }
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }

    let configurations = mem::take(&mut *configurations.lock());

    observe(Stage::Comparing);
    let verdict = compare(&configurations);
    observe(Stage::Finished {
        drift: verdict.is_drift(),
    });

    Ok(Outcome {
        verdict,
        configurations,
    })
}

/// Like [`run`], but a detected drift is returned as [`RunError::DriftDetected`].
pub async fn check<S, E>(
    source: &S,
    exec: Arc<E>,
    config: &Config,
    cancel: CancellationToken,
    observe: impl FnMut(Stage),
) -> Result<ConfigurationMap, RunError>
where
    S: PodSource,
    E: RemoteExec,
{
    let outcome = run(source, exec, config, cancel, observe).await?;
    outcome.verdict.into_result()?;
    Ok(outcome.configurations)
}

async fn fetch_and_normalize<E: RemoteExec>(
    exec: Arc<E>,
    pod: PodIdentity,
    config: Config,
    cancel: CancellationToken,
    configurations: Arc<Mutex<ConfigurationMap>>,
) -> Result<(String, usize), FetchError> {
    let fetched = fetch(&*exec, &pod, &config.container, &config.path);
    let fetched = tokio::select! {
        biased;
        () = cancel.cancelled() => Err(FetchError::Cancelled { pod: pod.name.clone() }),
        result = with_deadline(fetched, &config, &pod) => result,
    };
    let content = fetched?;

    let normalized = normalize(&content);
    log::debug!(
        "Read {} bytes from {pod}, {} after normalization",
        content.len(),
        normalized.len()
    );

    let bytes = normalized.len();
    let previous = configurations.lock().insert(pod.name.clone(), normalized);
    debug_assert!(previous.is_none(), "pod {pod} fetched twice");
    Ok((pod.name, bytes))
}

async fn with_deadline(
    fetched: impl std::future::Future<Output = Result<String, FetchError>>,
    config: &Config,
    pod: &PodIdentity,
) -> Result<String, FetchError> {
    match config.fetch_timeout {
        Some(timeout) => tokio::time::timeout(timeout, fetched)
            .await
            .unwrap_or_else(|_| {
                Err(FetchError::Timeout {
                    pod: pod.name.clone(),
                })
            }),
        None => fetched.await,
    }
}

/// The error type returned by [`run`] and [`check`].
#[derive(Debug, thiserror::Error)]
pub enum RunError {
    #[error(transparent)]
    List(#[from] ListError),
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error("configuration drift detected: {0}")]
    DriftDetected(#[from] DriftDetected),
    #[error("configuration task panicked: {0}")]
    TaskPanicked(#[source] JoinError),
}
