use axum::Router;
use pod_label_webhook::{config::Config, PodLabelServer};
use std::net::SocketAddr;

pub(crate) fn default_test_config() -> Config {
    Config {
        addr: SocketAddr::from(([127, 0, 0, 1], 9443)),
        tls_config: None,
        ignore_kubernetes_connection_failure: true,
        log_level: "info".to_owned(),
        log_fmt: "json".to_owned(),
        log_no_color: false,
    }
}

pub(crate) async fn app(config: Config) -> Router {
    // Starting from rustls 0.22, each application must set its default crypto provider.
    // This is done inside of `main`, which is not called by the tests.
    let _ = rustls::crypto::ring::default_provider().install_default();

    let server = PodLabelServer::new_from_config(config).await.unwrap();

    server.router()
}
