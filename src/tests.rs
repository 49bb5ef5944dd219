use std::{collections::HashMap, sync::Arc, time::Duration};

use assert_matches::assert_matches;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::{
    fetch::{FetchResult, TransportError},
    source::ListError,
    Config, DriftVerdict, FetchError, PodIdentity, PodSource, RemoteExec, RunError, Stage,
};

struct StaticPods(Vec<PodIdentity>);

impl PodSource for StaticPods {
    async fn list(&self) -> Result<Vec<PodIdentity>, ListError> {
        Ok(self.0.clone())
    }
}

struct MissingWorkload;

impl PodSource for MissingWorkload {
    async fn list(&self) -> Result<Vec<PodIdentity>, ListError> {
        Err(ListError::NotFound {
            kind: "Deployment".into(),
            namespace: "ingress".into(),
            name: "nginx".into(),
        })
    }
}

enum Response {
    File(&'static str),
    Stderr(&'static str),
    Broken(&'static str),
    Hang,
}

/// Serves a fixed response per pod name and records every exec.
#[derive(Default)]
struct FakeExec {
    responses: HashMap<String, Response>,
    calls: Mutex<Vec<(String, String)>>,
}

impl FakeExec {
    fn with(mut self, pod: &str, response: Response) -> Self {
        self.responses.insert(pod.to_owned(), response);
        self
    }
}

impl RemoteExec for FakeExec {
    async fn exec(
        &self,
        pod: &PodIdentity,
        container: &str,
        _command: &[&str],
    ) -> Result<FetchResult, TransportError> {
        self.calls
            .lock()
            .push((pod.name.clone(), container.to_owned()));
        match &self.responses[&pod.name] {
            Response::File(content) => Ok(FetchResult {
                stdout: content.as_bytes().to_vec(),
                ..Default::default()
            }),
            Response::Stderr(stderr) => Ok(FetchResult {
                stderr: stderr.as_bytes().to_vec(),
                ..Default::default()
            }),
            Response::Broken(message) => Err((*message).into()),
            Response::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                unreachable!("fetch should have been abandoned")
            }
        }
    }
}

const CONF_A: &str = "# generated at Tue Oct 19 10:00:01\nworker_processes 2;\nhttp {\n}\n";
const CONF_B: &str = "# generated at Tue Oct 19 10:00:07\nworker_processes 2;\nhttp {\n}\n";
const CONF_EXTRA_DIRECTIVE: &str =
    "# generated at Tue Oct 19 10:00:09\nworker_processes 2;\nhttp {\n    gzip on;\n}\n";
const CONF_EXTRA_COMMENT: &str =
    "# generated at Tue Oct 19 10:00:09\nworker_processes 2;\nhttp {\n    # gzip on;\n}\n";
const NO_SUCH_FILE: &str = "cat: can't open '/etc/nginx/nginx.conf': No such file or directory";

fn pods() -> StaticPods {
    StaticPods(
        ["nginx-a", "nginx-b", "nginx-c"]
            .into_iter()
            .map(|name| PodIdentity::new("ingress", name, ["controller"]))
            .collect(),
    )
}

async fn run_collecting(
    source: &impl PodSource,
    exec: FakeExec,
    config: &Config,
) -> (Result<crate::Outcome, RunError>, Vec<Stage>, Arc<FakeExec>) {
    let exec = Arc::new(exec);
    let mut stages = Vec::new();
    let result = crate::run(
        source,
        Arc::clone(&exec),
        config,
        CancellationToken::new(),
        |stage| stages.push(stage),
    )
    .await;
    (result, stages, exec)
}

#[tokio::test]
async fn extra_directive_is_drift() {
    let exec = FakeExec::default()
        .with("nginx-a", Response::File(CONF_A))
        .with("nginx-b", Response::File(CONF_B))
        .with("nginx-c", Response::File(CONF_EXTRA_DIRECTIVE));

    let (result, stages, _) = run_collecting(&pods(), exec, &Config::default()).await;
    let outcome = result.unwrap();

    assert_matches!(
        &outcome.verdict,
        DriftVerdict::Drift { first, second }
            if second == "nginx-c" && (first == "nginx-a" || first == "nginx-b")
    );
    assert_eq!(outcome.configurations.len(), 3);
    assert_eq!(stages.last(), Some(&Stage::Finished { drift: true }));
}

#[tokio::test]
async fn extra_comment_is_not_drift() {
    let exec = FakeExec::default()
        .with("nginx-a", Response::File(CONF_A))
        .with("nginx-b", Response::File(CONF_B))
        .with("nginx-c", Response::File(CONF_EXTRA_COMMENT));

    let (result, stages, _) = run_collecting(&pods(), exec, &Config::default()).await;
    let outcome = result.unwrap();

    assert_eq!(outcome.verdict, DriftVerdict::NoDrift);
    assert_eq!(
        outcome.configurations["nginx-c"],
        "worker_processes 2;\nhttp {\n}\n"
    );
    assert_eq!(stages[0], Stage::Listing);
    assert_eq!(stages[1], Stage::Fetching { pods: 3 });
    assert_eq!(
        stages
            .iter()
            .filter(|stage| matches!(stage, Stage::Fetched { .. }))
            .count(),
        3
    );
    assert_eq!(
        &stages[5..],
        &[Stage::Comparing, Stage::Finished { drift: false }]
    );
}

#[tokio::test]
async fn transport_error_aborts_before_comparing() {
    let exec = FakeExec::default()
        .with("nginx-a", Response::File(CONF_A))
        .with("nginx-b", Response::Broken("pod terminated"))
        .with("nginx-c", Response::File(CONF_A));

    let (result, stages, exec) = run_collecting(&pods(), exec, &Config::default()).await;

    assert_matches!(
        result,
        Err(RunError::Fetch(FetchError::Transport { pod, .. })) if pod == "nginx-b"
    );
    assert!(!stages.contains(&Stage::Comparing));
    // The healthy pods were still drained.
    assert_eq!(exec.calls.lock().len(), 3);
}

#[tokio::test]
async fn stderr_aborts_the_run() {
    let exec = FakeExec::default()
        .with("nginx-a", Response::File(CONF_A))
        .with("nginx-b", Response::File(CONF_A))
        .with("nginx-c", Response::Stderr(NO_SUCH_FILE));

    let (result, stages, _) = run_collecting(&pods(), exec, &Config::default()).await;

    assert_matches!(
        result,
        Err(RunError::Fetch(FetchError::RemoteStderr { pod, .. })) if pod == "nginx-c"
    );
    assert!(!stages.contains(&Stage::Comparing));
}

#[tokio::test]
async fn unknown_container_fails() {
    let exec = FakeExec::default()
        .with("nginx-a", Response::File(CONF_A))
        .with("nginx-b", Response::File(CONF_A))
        .with("nginx-c", Response::File(CONF_A));
    let config = Config::default().container(Some("proxy".to_owned()));

    let (result, _, exec) = run_collecting(&pods(), exec, &config).await;

    assert_matches!(
        result,
        Err(RunError::Fetch(FetchError::ContainerNotFound { container: Some(name), .. }))
            if name == "proxy"
    );
    assert!(exec.calls.lock().is_empty());
}

#[tokio::test]
async fn reads_from_selected_container() {
    let source = StaticPods(vec![
        PodIdentity::new("ingress", "nginx-a", ["controller", "metrics"]),
        PodIdentity::new("ingress", "nginx-b", ["metrics", "controller"]),
    ]);
    let exec = FakeExec::default()
        .with("nginx-a", Response::File(CONF_A))
        .with("nginx-b", Response::File(CONF_A));
    let config = Config::default().container(Some("controller".to_owned()));

    let (result, _, exec) = run_collecting(&source, exec, &config).await;

    assert_eq!(result.unwrap().verdict, DriftVerdict::NoDrift);
    let mut calls = exec.calls.lock().clone();
    calls.sort();
    assert_eq!(
        calls,
        vec![
            ("nginx-a".to_owned(), "controller".to_owned()),
            ("nginx-b".to_owned(), "controller".to_owned()),
        ]
    );
}

#[tokio::test]
async fn list_failure_is_propagated() {
    let (result, stages, exec) =
        run_collecting(&MissingWorkload, FakeExec::default(), &Config::default()).await;

    assert_matches!(result, Err(RunError::List(ListError::NotFound { .. })));
    assert_eq!(stages, vec![Stage::Listing]);
    assert!(exec.calls.lock().is_empty());
}

#[tokio::test]
async fn no_pods_is_no_drift() {
    let (result, _, _) = run_collecting(
        &StaticPods(Vec::new()),
        FakeExec::default(),
        &Config::default(),
    )
    .await;

    let outcome = result.unwrap();
    assert_eq!(outcome.verdict, DriftVerdict::NoDrift);
    assert!(outcome.configurations.is_empty());
}

#[tokio::test]
async fn hung_fetch_times_out() {
    let exec = FakeExec::default()
        .with("nginx-a", Response::File(CONF_A))
        .with("nginx-b", Response::Hang)
        .with("nginx-c", Response::File(CONF_A));
    let config = Config::default().fetch_timeout(Duration::from_millis(50));

    let (result, stages, _) = run_collecting(&pods(), exec, &config).await;

    assert_matches!(
        result,
        Err(RunError::Fetch(FetchError::Timeout { pod })) if pod == "nginx-b"
    );
    assert!(!stages.contains(&Stage::Comparing));
}

#[tokio::test]
async fn cancellation_fails_the_run() {
    let exec = Arc::new(
        FakeExec::default()
            .with("nginx-a", Response::Hang)
            .with("nginx-b", Response::Hang)
            .with("nginx-c", Response::Hang),
    );
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = crate::run(&pods(), exec, &Config::default(), cancel, |_| {}).await;

    assert_matches!(result, Err(RunError::Fetch(FetchError::Cancelled { .. })));
}

#[tokio::test]
async fn check_turns_drift_into_error() {
    let exec = Arc::new(
        FakeExec::default()
            .with("nginx-a", Response::File(CONF_A))
            .with("nginx-b", Response::File(CONF_B))
            .with("nginx-c", Response::File(CONF_EXTRA_DIRECTIVE)),
    );

    let err = crate::check(
        &pods(),
        exec,
        &Config::default(),
        CancellationToken::new(),
        |_| {},
    )
    .await
    .unwrap_err();

    assert_matches!(&err, RunError::DriftDetected(drift) if drift.second == "nginx-c");
    assert_eq!(
        err.to_string(),
        "configuration drift detected: nginx-a has a different configuration than nginx-c"
    );
}

#[tokio::test]
async fn check_returns_configurations() {
    let exec = Arc::new(
        FakeExec::default()
            .with("nginx-a", Response::File(CONF_A))
            .with("nginx-b", Response::File(CONF_B))
            .with("nginx-c", Response::File(CONF_EXTRA_COMMENT)),
    );

    let configurations = crate::check(
        &pods(),
        exec,
        &Config::default(),
        CancellationToken::new(),
        |_| {},
    )
    .await
    .unwrap();

    assert_eq!(
        configurations.keys().collect::<Vec<_>>(),
        vec!["nginx-a", "nginx-b", "nginx-c"]
    );
}
