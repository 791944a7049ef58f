// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use anyhow::{Context, Result};
use clap::Parser;
use cloudgate_broker::application::Application;
use cloudgate_broker::broker::Broker;
use cloudgate_broker::configuration::{self, BrokerOptions};
use cloudgate_broker::observability;
use cloudgate_broker::userinfo::HttpUserGroupsGetter;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,tower_http=debug".into()),
        ))
        // this needs to be set to remove duplicated information in the log.
        .with_current_span(false)
        // this needs to be set to false, otherwise ANSI color codes will
        // show up in a confusing manner in CloudWatch logs.
        .with_ansi(false)
        // disabling time is handy because CloudWatch will add the ingestion time.
        .without_time()
        // remove the name of the function from every log entry
        .with_target(false)
        .init();

    let options = BrokerOptions::parse();
    tracing::info!("{:?}", &options);

    let metrics_handle = observability::init_metrics();

    let user_info = Arc::new(HttpUserGroupsGetter::new(options.userinfo_url.clone()));
    let broker = Arc::new(Broker::new(
        user_info,
        options.credentials_file.clone(),
        options.list_roles_role_name.clone(),
    ));

    match configuration::load_configuration(&options.accounts_file) {
        Ok(config) => broker
            .update_configuration(config)
            .context("apply account configuration")?,
        Err(err) => {
            tracing::warn!(%err, "account configuration unavailable at startup");
        }
    }

    if let Err(err) = broker.load_credentials_file().await {
        tracing::warn!(%err, "loading credentials file failed");
    }

    {
        let broker = broker.clone();
        tokio::spawn(async move {
            broker.wait_until_unsealed().await;
            tracing::info!("credentials unsealed, broker is ready");
        });
    }

    let config_check_interval = Duration::from_secs(options.config_check_interval_secs);
    tracing::info!("re-reading account configuration every {:#?}", config_check_interval);
    {
        let broker = broker.clone();
        let accounts_file = options.accounts_file.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(config_check_interval).await;
                match configuration::load_configuration(&accounts_file) {
                    Ok(config) => {
                        if let Err(err) = broker.update_configuration(config) {
                            tracing::warn!(%err, "rejected account configuration");
                        }
                    }
                    Err(err) => {
                        tracing::warn!(%err, "cannot reload account configuration");
                    }
                }
            }
        });
    }

    let application = Application::build(options, broker, Some(metrics_handle))
        .await
        .context("bind HTTP listener")?;

    application
        .run_until_stopped()
        .await
        .context("HTTP server terminated")
}
