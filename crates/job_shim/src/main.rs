use std::env;
use std::process::ExitCode;

use anyhow::anyhow;
use clap::Parser;
use river_job_shim::control::{GrpcControlPlane, DEFAULT_GRPC_PORT};
use river_job_shim::tracing::setup_tracing;
use river_job_shim::{FuseMounter, PodLifecycle, ShimError};

#[derive(Parser)]
#[command(
    name = "job-shim",
    version,
    about = "Coordinates with the control plane to run one chunk of user work"
)]
struct Cli {
    /// Job to run a chunk of.
    job_id: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            // Surfaces the literal `restarting` so the pod supervisor can
            // tell a requested restart from a genuine failure.
            eprintln!("{err}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), ShimError> {
    setup_tracing()?;

    let control_host = require_env("PACHD_PORT_650_TCP_ADDR")?;
    let pod_name = require_env("PPS_POD_NAME")?;
    let control_addr = format!("{control_host}:{DEFAULT_GRPC_PORT}");

    let control = GrpcControlPlane::connect(&control_addr).await?;
    let mounter = FuseMounter::new(control_addr);

    PodLifecycle::new(control, mounter, cli.job_id, pod_name)
        .run()
        .await
}

fn require_env(name: &str) -> Result<String, ShimError> {
    env::var(name).map_err(|_| ShimError::Fatal(anyhow!("{name} must be set")))
}
