use k8s_openapi::{api::core::v1::Pod, apimachinery::pkg::apis::meta::v1::Status};
use kube_client::{api::AttachParams, Api, Client};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::{FetchResult, RemoteExec, TransportError};
use crate::source::PodIdentity;

/// [`RemoteExec`] over the `exec` subresource of pods.
///
/// Every call opens its own websocket stream; nothing is pooled or retried.
#[derive(Clone)]
pub struct KubeExec {
    client: Client,
}

impl KubeExec {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

async fn read_all(mut stream: impl AsyncRead + Unpin) -> std::io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    stream.read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Builds the result of a remote command that ran to completion.
///
/// The exec protocol sends a status once the command exits, so a stream that
/// closed without one was cut off and its output may be truncated.
fn completed(
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    status: Option<Status>,
) -> Result<FetchResult, TransportError> {
    let status = status.ok_or("remote command ended without reporting its exit status")?;
    let failure = if status.status.as_deref() == Some("Failure") {
        let message = status
            .message
            .unwrap_or_else(|| "remote command failed".to_owned());
        Some(message)
    } else {
        None
    };

    Ok(FetchResult {
        stdout,
        stderr,
        failure,
    })
}

impl RemoteExec for KubeExec {
    async fn exec(
        &self,
        pod: &PodIdentity,
        container: &str,
        command: &[&str],
    ) -> Result<FetchResult, TransportError> {
        let pods = Api::<Pod>::namespaced(self.client.clone(), &pod.namespace);
        let params = AttachParams::default()
            .container(container)
            .stdin(false)
            .stdout(true)
            .stderr(true);

        let mut attached = pods.exec(&pod.name, command.to_vec(), &params).await?;
        let stdout = attached
            .stdout()
            .ok_or("stdout of remote command not attached")?;
        let stderr = attached
            .stderr()
            .ok_or("stderr of remote command not attached")?;
        let status = attached.take_status();

        // Both streams must be drained together, or a chatty stderr can stall stdout.
        let (stdout, stderr) = futures::try_join!(read_all(stdout), read_all(stderr))?;
        let status = match status {
            Some(status) => status.await,
            None => None,
        };
        // A broken websocket only shows up here; the streams above just end early.
        attached.join().await?;

        log::trace!(
            "Remote command in {pod} finished with {} bytes of stdout and {} bytes of stderr",
            stdout.len(),
            stderr.len()
        );
        completed(stdout, stderr, status)
    }
}
