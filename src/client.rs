//! Kubernetes cluster connection from a kubeconfig.

use std::{path::Path, time::Duration};

use kube_client::{
    config::{KubeConfigOptions, Kubeconfig, KubeconfigError},
    Client, Config,
};

/// Read timeout of every connection to the apiserver.
///
/// Exec streams run over the same connections, so a remote command that stays
/// silent for this long fails with a transport error.
const DEFAULT_API_TIMEOUT: Duration = Duration::from_secs(30);

/// Errors that can occur when connecting to a Kubernetes cluster.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("no current context is set. Please check your $KUBECONFIG or pass --context")]
    NoCurrentContext,

    #[error("no context named `{0}` was found. Please check your $KUBECONFIG")]
    ContextNotFound(String),

    #[error(transparent)]
    Kubeconfig(#[from] KubeconfigError),

    #[error(transparent)]
    Kube(#[from] kube_client::Error),
}

/// Picks the context to connect with: `context` if given, else the current context.
pub fn resolve_context(
    kubeconfig: &Kubeconfig,
    context: Option<&str>,
) -> Result<String, ConnectionError> {
    let name = match context {
        Some(name) => name.to_owned(),
        None => kubeconfig
            .current_context
            .clone()
            .filter(|name| !name.is_empty())
            .ok_or(ConnectionError::NoCurrentContext)?,
    };

    if kubeconfig.contexts.iter().any(|named| named.name == name) {
        Ok(name)
    } else {
        Err(ConnectionError::ContextNotFound(name))
    }
}

/// Connects to the cluster of `context`, reading the kubeconfig from
/// `kubeconfig` or the default locations.
pub async fn connect(
    kubeconfig: Option<&Path>,
    context: Option<&str>,
) -> Result<Client, ConnectionError> {
    let kubeconfig = match kubeconfig {
        Some(path) => Kubeconfig::read_from(path)?,
        None => Kubeconfig::read()?,
    };
    connect_with_kubeconfig(kubeconfig, context).await
}

pub async fn connect_with_kubeconfig(
    kubeconfig: Kubeconfig,
    context: Option<&str>,
) -> Result<Client, ConnectionError> {
    let config = client_config(kubeconfig, context).await?;
    Ok(Client::try_from(config)?)
}

async fn client_config(
    kubeconfig: Kubeconfig,
    context: Option<&str>,
) -> Result<Config, ConnectionError> {
    let context = resolve_context(&kubeconfig, context)?;
    log::debug!("Using context {context}");

    let mut config = Config::from_custom_kubeconfig(
        kubeconfig,
        &KubeConfigOptions {
            context: Some(context),
            ..Default::default()
        },
    )
    .await?;
    config.read_timeout = Some(DEFAULT_API_TIMEOUT);
    Ok(config)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    const KUBECONFIG: &str = r#"
apiVersion: v1
kind: Config
clusters:
- name: prod
  cluster:
    server: https://prod.example.com:6443
- name: staging
  cluster:
    server: https://staging.example.com:6443
contexts:
- name: prod
  context:
    cluster: prod
    user: admin
- name: staging
  context:
    cluster: staging
    user: admin
users:
- name: admin
  user:
    token: secret
"#;

    fn kubeconfig(current: Option<&str>) -> Kubeconfig {
        let mut kubeconfig = Kubeconfig::from_yaml(KUBECONFIG).unwrap();
        kubeconfig.current_context = current.map(str::to_owned);
        kubeconfig
    }

    #[test]
    fn current_context() {
        assert_eq!(
            resolve_context(&kubeconfig(Some("staging")), None).unwrap(),
            "staging"
        );
    }

    #[test]
    fn explicit_context_wins() {
        assert_eq!(
            resolve_context(&kubeconfig(Some("staging")), Some("prod")).unwrap(),
            "prod"
        );
    }

    #[test]
    fn no_current_context() {
        assert_matches!(
            resolve_context(&kubeconfig(None), None),
            Err(ConnectionError::NoCurrentContext)
        );
        assert_matches!(
            resolve_context(&kubeconfig(Some("")), None),
            Err(ConnectionError::NoCurrentContext)
        );
    }

    #[tokio::test]
    async fn config_of_selected_context() {
        let config = client_config(kubeconfig(Some("staging")), Some("prod"))
            .await
            .unwrap();

        assert_eq!(config.cluster_url.host(), Some("prod.example.com"));
        assert_eq!(config.read_timeout, Some(DEFAULT_API_TIMEOUT));
    }

    #[test]
    fn unknown_context() {
        assert_matches!(
            resolve_context(&kubeconfig(Some("staging")), Some("dev")),
            Err(ConnectionError::ContextNotFound(name)) if name == "dev"
        );
    }
}
