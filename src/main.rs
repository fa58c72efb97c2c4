use std::sync::Arc;

use assisted_capi_operator::assisted::ServiceConfig;
use assisted_capi_operator::workload::KubeconfigClientFactory;
use assisted_capi_operator::{controller, Error};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the operator
    Run(RunArgs),
    /// Show version information
    Version,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Rewrite ignition download URLs to the in-cluster assisted service
    /// address instead of its external route
    #[arg(long, env = "USE_INTERNAL_IMAGE_URL")]
    use_internal_image_url: bool,

    /// Service name of the assisted installer
    #[arg(
        long,
        env = "ASSISTED_SERVICE_NAME",
        default_value = "assisted-service"
    )]
    assisted_service_name: String,

    /// Namespace the assisted installer runs in; defaults to each
    /// InfraEnv's own namespace when unset
    #[arg(long, env = "ASSISTED_INSTALLER_NAMESPACE")]
    assisted_installer_namespace: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!(
                "assisted-capi-operator v{}",
                env!("CARGO_PKG_VERSION")
            );
            Ok(())
        }
        Commands::Run(run_args) => run_operator(run_args).await,
    }
}

async fn run_operator(args: RunArgs) -> Result<(), Error> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_target(true))
        .init();

    info!(
        "Starting assisted-capi-operator v{}",
        env!("CARGO_PKG_VERSION")
    );

    let client = kube::Client::try_default()
        .await
        .map_err(Error::KubeError)?;
    info!("Connected to Kubernetes cluster");

    let state = Arc::new(controller::ControllerState {
        client,
        service_config: ServiceConfig {
            use_internal_image_url: args.use_internal_image_url,
            assisted_service_name: args.assisted_service_name,
            assisted_installer_namespace: args.assisted_installer_namespace,
        },
        workload: Arc::new(KubeconfigClientFactory),
    });

    tokio::try_join!(
        controller::run_bootstrap_controller(state.clone()),
        controller::run_agent_controller(state.clone()),
        controller::run_control_plane_controller(state.clone()),
        controller::run_kubeconfig_controller(state.clone()),
    )?;

    Ok(())
}
