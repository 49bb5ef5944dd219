use std::{
    io::Write,
    path::{Path, PathBuf},
    process::ExitCode,
    sync::Arc,
    time::Duration,
};

use anyhow::Context as _;
use clap::{ArgAction, Parser};
use env_logger::{fmt::Formatter, Env};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use kube_client::Client;
use kube_config_drift::{
    client, fetch::DEFAULT_CONFIG_PATH, source::Workload, Config, ConfigurationMap, KubeExec,
    Stage, Target, WorkloadKind, WorkloadPods,
};
use log::Record;
use tokio_util::sync::CancellationToken;

const EXAMPLES: &str = "\
Examples:
  # check the internal-nginx-ingress-controller deployed as a deployment
  kube-config-drift -n ingress deploy internal-nginx-ingress-controller

  # check the custom-nginx-ingress-controller deployed as a daemonset
  kube-config-drift -n ingress daemonset custom-nginx-ingress-controller

  # compare the sidecar's configuration instead of the first container's
  kube-config-drift -n ingress -c sidecar deployment nginx-ingress-controller";

#[derive(Parser, Debug)]
#[command(name = "kube-config-drift")]
#[command(version, about, long_about = None, after_help = EXAMPLES)]
/// Inspect and look for configuration drift in the running containers of a deployment or daemonset.
struct Opt {
    /// The kind of the workload: deployment (deploy) or daemonset (ds).
    kind: String,

    /// The name of the workload.
    name: String,

    /// The namespace of the workload. Required, there is no default.
    #[arg(short, long)]
    namespace: Option<String>,

    /// Container name. If omitted, the first container in the pod will be chosen.
    #[arg(short, long)]
    container: Option<String>,

    /// The kubeconfig context to use instead of the current context.
    #[arg(long)]
    context: Option<String>,

    /// Path to the kubeconfig file. Defaults to $KUBECONFIG or ~/.kube/config.
    #[arg(long)]
    kubeconfig: Option<PathBuf>,

    /// The configuration file to compare.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    file: String,

    /// Give up on a pod if its configuration could not be read within this many seconds.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    timeout: Option<u64>,

    /// Write the normalized configuration of every pod to <DUMP_DIR>/<pod>.conf.
    #[arg(long)]
    dump_dir: Option<PathBuf>,

    /// Increase logging verbosity; repeat for more.
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

fn init_logger(opt: &Opt) {
    let default_level = match opt.verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format(|buf: &mut Formatter, record: &Record| {
            writeln!(
                buf,
                "[{}] [{}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}

fn dump(dir: &Path, configurations: &ConfigurationMap) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    for (pod, config) in configurations {
        let path = dir.join(format!("{pod}.conf"));
        std::fs::write(&path, config)
            .with_context(|| format!("failed to write {}", path.display()))?;
    }
    log::info!(
        "Wrote {} configurations to {}",
        configurations.len(),
        dir.display()
    );
    Ok(())
}

async fn check_workload<K: Workload>(
    client: Client,
    target: &Target,
    config: &Config,
    cancel: CancellationToken,
    dump_dir: Option<&Path>,
) -> anyhow::Result<()> {
    let source = WorkloadPods::<K>::new(client.clone(), &target.namespace, &target.name);
    let exec = Arc::new(KubeExec::new(client));

    let outcome = kube_config_drift::run(&source, exec, config, cancel, |stage| match stage {
        Stage::Listing => {}
        Stage::Fetching { pods } => {
            println!("{} found: {}", target.kind, target.name);
            println!("downloading configuration from {pods} pods...");
        }
        Stage::Fetched { pod, bytes } => {
            log::info!("configuration downloaded for pod {pod}. Length: {bytes}");
        }
        Stage::Comparing => println!("checking configuration drift..."),
        Stage::Finished { .. } => {}
    })
    .await?;

    if let Some(dir) = dump_dir {
        dump(dir, &outcome.configurations)?;
    }

    outcome.verdict.into_result()?;
    println!("no configuration drift detected.");
    Ok(())
}

async fn inner_main(opt: Opt) -> anyhow::Result<()> {
    let target = Target::parse(&opt.kind, &opt.name, opt.namespace.as_deref())?;

    let client = client::connect(opt.kubeconfig.as_deref(), opt.context.as_deref())
        .await
        .context("failed to connect to the cluster")?;

    let mut config = Config::default().container(opt.container).path(opt.file);
    if let Some(timeout) = opt.timeout {
        config = config.fetch_timeout(Duration::from_secs(timeout));
    }

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Received Ctrl-C, cancelling");
                cancel.cancel();
            }
        }
    });

    let dump_dir = opt.dump_dir.as_deref();
    match target.kind {
        WorkloadKind::Deployment => {
            check_workload::<Deployment>(client, &target, &config, cancel, dump_dir).await
        }
        WorkloadKind::DaemonSet => {
            check_workload::<DaemonSet>(client, &target, &config, cancel, dump_dir).await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let opt = Opt::parse();
    init_logger(&opt);

    match inner_main(opt).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
