//! Control-plane RPC seam.
//!
//! The lifecycle talks to the control plane through [`ControlPlane`] so the
//! shim binary can wire up the real gRPC client while tests drive the
//! lifecycle with scripted doubles.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use river_proto::pod::pod_api_client::PodApiClient;
use river_proto::pod::{
    ContinuePodRequest, ContinuePodResponse, FinishPodRequest, FinishPodResponse, StartPodRequest,
    StartPodResponse,
};
use tonic::transport::Channel;
use tonic::Status;

/// Port the control plane serves gRPC on.
pub const DEFAULT_GRPC_PORT: u16 = 650;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

#[async_trait]
pub trait ControlPlane: Send + Sync {
    async fn start_pod(&self, request: StartPodRequest) -> Result<StartPodResponse, Status>;
    async fn continue_pod(&self, request: ContinuePodRequest)
        -> Result<ContinuePodResponse, Status>;
    async fn finish_pod(&self, request: FinishPodRequest) -> Result<FinishPodResponse, Status>;
}

/// The production control plane: a tonic client over one shared channel.
pub struct GrpcControlPlane {
    client: PodApiClient<Channel>,
}

impl GrpcControlPlane {
    /// Connect to `addr` (`host:port`), with the standard connect timeout.
    pub async fn connect(addr: &str) -> Result<Self> {
        let endpoint = format!("http://{addr}");
        let channel = Channel::from_shared(endpoint)
            .context("invalid control plane endpoint")?
            .connect_timeout(CONNECT_TIMEOUT)
            .connect()
            .await
            .with_context(|| format!("failed to connect to control plane at {addr}"))?;
        Ok(GrpcControlPlane {
            client: PodApiClient::new(channel),
        })
    }
}

#[async_trait]
impl ControlPlane for GrpcControlPlane {
    async fn start_pod(&self, request: StartPodRequest) -> Result<StartPodResponse, Status> {
        let mut client = self.client.clone();
        Ok(client.start_pod(request).await?.into_inner())
    }

    async fn continue_pod(
        &self,
        request: ContinuePodRequest,
    ) -> Result<ContinuePodResponse, Status> {
        let mut client = self.client.clone();
        Ok(client.continue_pod(request).await?.into_inner())
    }

    async fn finish_pod(&self, request: FinishPodRequest) -> Result<FinishPodResponse, Status> {
        let mut client = self.client.clone();
        Ok(client.finish_pod(request).await?.into_inner())
    }
}
