//! Rolling node operator - instance refreshes for Giant Swarm AWS clusters

use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use futures::StreamExt;
use kube::runtime::controller::Action;
use kube::runtime::reflector::ObjectRef;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client, Resource};

use rolling_node_operator::config::OperatorConfig;
use rolling_node_operator::controller::{error_policy, reconcile, Context, RefreshTarget};
use rolling_node_operator::crd::{AWSCluster, AWSControlPlane, AWSMachineDeployment};
use rolling_node_operator::telemetry::{init_telemetry, LogFormat};

/// Rolling node operator - refreshes AWS Auto Scaling Group instances on annotation
#[derive(Parser, Debug)]
#[command(name = "rolling-node-operator", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    controller: ControllerArgs,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controllers (default mode)
    ///
    /// Watches AWSCluster, AWSControlPlane and AWSMachineDeployment
    /// resources and refreshes the instances of annotated ones.
    Controller(ControllerArgs),
}

/// Controller mode arguments
#[derive(Args, Debug, Clone)]
struct ControllerArgs {
    /// Name of the installation (management cluster) the operator runs in
    #[arg(long, env = "INSTALLATION", default_value = "")]
    installation: String,

    /// Seconds between two polls of a running instance refresh
    #[arg(long, env = "POLL_INTERVAL_SECS", default_value = "60")]
    poll_interval_secs: u64,

    /// Give up waiting on one group after this many seconds (unbounded if unset)
    #[arg(long, env = "MAX_WAIT_SECS")]
    max_wait_secs: Option<u64>,

    /// Skip groups whose last refresh ended within this many seconds
    #[arg(long, env = "RECENT_REFRESH_WINDOW_SECS", default_value = "1800")]
    recent_window_secs: u64,

    /// Seconds before an idle or failed resource is reconciled again
    #[arg(long, env = "REQUEUE_INTERVAL_SECS", default_value = "300")]
    requeue_interval_secs: u64,

    /// Log format: json or text
    #[arg(long, env = "LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,
}

impl ControllerArgs {
    fn into_config(self) -> OperatorConfig {
        OperatorConfig::new(self.installation)
            .poll_interval(Duration::from_secs(self.poll_interval_secs))
            .max_wait(self.max_wait_secs.map(Duration::from_secs))
            .recent_window(Duration::from_secs(self.recent_window_secs))
            .requeue_interval(Duration::from_secs(self.requeue_interval_secs))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let args = match cli.command {
        Some(Commands::Controller(args)) => args,
        None => cli.controller,
    };

    init_telemetry(args.log_format)?;
    run_controller(args.into_config()).await
}

/// Run the three refresh controllers until a shutdown signal arrives
async fn run_controller(config: OperatorConfig) -> anyhow::Result<()> {
    config.validate()?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to create Kubernetes client: {}", e))?;

    tracing::info!(
        installation = %config.installation,
        poll_interval = ?config.refresh.wait.poll_interval,
        max_wait = ?config.refresh.wait.max_wait,
        "Starting rolling node operator"
    );

    let ctx = Arc::new(Context::builder(client.clone(), config).build());

    tracing::info!("Starting controllers...");
    tracing::info!("  - AWSCluster controller");
    tracing::info!("  - AWSControlPlane controller");
    tracing::info!("  - AWSMachineDeployment controller");

    let clusters = run_one::<AWSCluster>(client.clone(), ctx.clone());
    let control_planes = run_one::<AWSControlPlane>(client.clone(), ctx.clone());
    let machine_deployments = run_one::<AWSMachineDeployment>(client, ctx);

    tokio::join!(clusters, control_planes, machine_deployments);

    tracing::info!("Rolling node operator shutting down");
    Ok(())
}

/// Run the controller for one kind until shutdown
async fn run_one<K>(client: Client, ctx: Arc<Context>)
where
    K: RefreshTarget
        + Resource<Scope = k8s_openapi::NamespaceResourceScope>,
{
    let api: Api<K> = Api::all(client);
    let kind = K::kind(&()).to_string();

    Controller::new(api, WatcherConfig::default().timeout(25))
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(|result| log_reconcile_result::<K>(&kind, result))
        .await;

    tracing::info!(kind = %kind, "Controller completed");
}

async fn log_reconcile_result<K: Resource>(
    kind: &str,
    result: Result<
        (ObjectRef<K>, Action),
        kube::runtime::controller::Error<rolling_node_operator::Error, kube::runtime::watcher::Error>,
    >,
) {
    match result {
        Ok((object, action)) => {
            tracing::debug!(kind, object = %object, ?action, "Reconciliation completed");
        }
        Err(e) => {
            tracing::error!(kind, error = ?e, "Reconciliation error");
        }
    }
}
