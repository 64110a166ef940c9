pub mod admission_request;
pub mod admission_response;
pub mod api;
mod certs;
pub mod cli;
pub mod config;
pub mod decoder;
pub mod handler;
pub mod pod_label;
pub mod tracing;

#[cfg(test)]
mod test_utils;

use ::tracing::{info, warn};
use anyhow::{anyhow, Result};
use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use std::{net::SocketAddr, sync::Arc};

use config::Config;
use decoder::{Decoder, Scheme};
use pod_label::PodLabel;

pub struct PodLabelServer {
    router: Router,
    tls_config: Option<RustlsConfig>,
    addr: SocketAddr,
}

impl PodLabelServer {
    pub async fn new_from_config(config: Config) -> Result<Self> {
        let kube_client = match kube::Client::try_default().await {
            Ok(client) => Some(client),
            Err(e) if config.ignore_kubernetes_connection_failure => {
                warn!(
                    error = %e,
                    "Cannot connect to Kubernetes, running without a Kubernetes client"
                );
                None
            }
            Err(e) => return Err(anyhow!("Cannot connect to Kubernetes: {e}")),
        };

        let decoder = Decoder::new(Arc::new(Scheme::with_core_types()));
        let handler = PodLabel::new(kube_client, decoder, PodLabel::default_logger());
        let router = api::router(Arc::new(handler));

        let tls_config = match &config.tls_config {
            Some(tls_config) => Some(certs::create_tls_config(tls_config).await?),
            None => None,
        };

        Ok(Self {
            router,
            tls_config,
            addr: config.addr,
        })
    }

    pub async fn run(self) -> Result<()> {
        match self.tls_config {
            Some(tls_config) => {
                info!(
                    address = self.addr.to_string().as_str(),
                    service = config::SERVICE_NAME,
                    "started HTTPS server"
                );
                axum_server::bind_rustls(self.addr, tls_config)
                    .serve(self.router.into_make_service())
                    .await?;
            }
            None => {
                info!(
                    address = self.addr.to_string().as_str(),
                    service = config::SERVICE_NAME,
                    "started HTTP server"
                );
                axum_server::bind(self.addr)
                    .serve(self.router.into_make_service())
                    .await?;
            }
        }

        Ok(())
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }
}
