// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use crate::broker::Broker;
use crate::configuration::BrokerOptions;
use crate::constants;
use crate::routes;
use axum::Router;
use axum::routing::{get, post};
use axum::serve::Serve;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_governor::GovernorLayer;
use tower_governor::governor::GovernorConfigBuilder;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

pub struct AppState {
    pub options: BrokerOptions,
    pub broker: Arc<Broker>,
    pub metrics_handle: Option<PrometheusHandle>,
}

pub struct Application {
    port: u16,
    server: Serve<TcpListener, Router, Router>,
}

impl Application {
    pub async fn build(
        options: BrokerOptions,
        broker: Arc<Broker>,
        metrics_handle: Option<PrometheusHandle>,
    ) -> Result<Self, std::io::Error> {
        let address = format!("{}:{}", options.host, options.port);
        let listener = TcpListener::bind(address).await?;
        let server = run(listener, options.clone(), broker, metrics_handle)?;
        let port = server.local_addr()?.port();

        tracing::info!("listening at http://{}:{}", options.host, port);

        Ok(Self { port, server })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub async fn run_until_stopped(self) -> Result<(), std::io::Error> {
        self.server.with_graceful_shutdown(shutdown_signal()).await
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Router with the service middleware applied. Rate limiting is added on
/// top by [`run`]; keeping it out of here lets tests drive the router
/// without a peer address.
pub fn create_router(
    options: BrokerOptions,
    broker: Arc<Broker>,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let state = Arc::new(AppState {
        options,
        broker,
        metrics_handle,
    });

    Router::new()
        .route("/", get(routes::account_listing))
        .route("/generatetoken", post(routes::generate_token))
        .route("/console", post(routes::console_redirect))
        .route("/unseal", post(routes::unseal))
        .route("/status", get(routes::status))
        .route("/health", get(routes::health))
        .route("/metrics", get(routes::metrics))
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(constants::REQUEST_BODY_LIMIT))
        .layer(TimeoutLayer::new(constants::REQUEST_TIMEOUT))
}

#[tracing::instrument(skip(listener, broker, metrics_handle))]
pub fn run(
    listener: TcpListener,
    options: BrokerOptions,
    broker: Arc<Broker>,
    metrics_handle: Option<PrometheusHandle>,
) -> Result<Serve<TcpListener, Router, Router>, std::io::Error> {
    // Rate limiting: 100 requests per second per IP
    let governor_config = GovernorConfigBuilder::default()
        .per_second(100)
        .burst_size(100)
        .finish()
        .expect("valid governor config");

    let app = create_router(options, broker, metrics_handle)
        .layer(GovernorLayer::new(Arc::new(governor_config)));
    Ok(axum::serve(listener, app))
}
