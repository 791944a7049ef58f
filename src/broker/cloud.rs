// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! STS/IAM client construction.
//!
//! Profiles from the credentials file become static-credential clients.
//! When the master profile is absent from the file, credentials and region
//! come from the EC2 instance metadata service instead.

use aws_config::imds;
use aws_config::imds::credentials::ImdsCredentialsProvider;
use aws_config::imds::region::ImdsRegionProvider;
use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_sdk_sts::config::{BehaviorVersion, Region};

use super::Broker;
use crate::constants;
use crate::errors::BrokerError;

pub(crate) fn sts_client(provider: SharedCredentialsProvider, region: &str) -> aws_sdk_sts::Client {
    let config = aws_sdk_sts::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .credentials_provider(provider)
        .build();
    aws_sdk_sts::Client::from_conf(config)
}

pub(crate) fn iam_client(provider: SharedCredentialsProvider, region: &str) -> aws_sdk_iam::Client {
    let config = aws_sdk_iam::Config::builder()
        .behavior_version(BehaviorVersion::latest())
        .region(aws_sdk_iam::config::Region::new(region.to_string()))
        .credentials_provider(provider)
        .build();
    aws_sdk_iam::Client::from_conf(config)
}

/// Instance-metadata role credentials plus the region reported by the
/// metadata endpoint. Used only when the master profile is absent from the
/// credentials file.
pub(crate) async fn credentials_provider_from_metadata()
-> Result<(SharedCredentialsProvider, String), BrokerError> {
    let imds_client = imds::Client::builder().build();
    let provider = ImdsCredentialsProvider::builder()
        .imds_client(imds_client.clone())
        .build();
    let region_provider = ImdsRegionProvider::builder().imds_client(imds_client).build();
    let region = region_provider.region().await.ok_or_else(|| {
        BrokerError::Cloud("unable to resolve region from instance metadata".to_string())
    })?;
    tracing::debug!("created credentials provider from instance metadata");
    Ok((SharedCredentialsProvider::new(provider), region.to_string()))
}

impl Broker {
    /// Static credentials and region for a profile, with the
    /// instance-metadata fallback for the reserved master name.
    pub(crate) async fn credentials_provider_for_profile(
        &self,
        profile_name: &str,
    ) -> Result<(SharedCredentialsProvider, String), BrokerError> {
        if let Some(entry) = self.profiles.get().and_then(|profiles| profiles.get(profile_name)) {
            let credentials = Credentials::new(
                entry.access_key_id.clone(),
                entry.secret_access_key.clone(),
                None,
                None,
                "cloudgate-static-profile",
            );
            tracing::debug!(profile = profile_name, "created provider for static profile");
            return Ok((
                SharedCredentialsProvider::new(credentials),
                entry.region.clone(),
            ));
        }
        if profile_name == constants::MASTER_PROFILE_NAME {
            return credentials_provider_from_metadata().await;
        }
        Err(BrokerError::Config(format!(
            "invalid profile name: {profile_name}"
        )))
    }

    /// STS client and region for a profile. The master client is built once
    /// during unsealing and reused; any other profile gets a fresh client
    /// bound to its static credentials.
    pub(crate) async fn sts_client_for_profile(
        &self,
        profile_name: &str,
    ) -> Result<(aws_sdk_sts::Client, String), BrokerError> {
        if profile_name == constants::MASTER_PROFILE_NAME {
            let master = self
                .master_sts
                .get()
                .ok_or_else(|| BrokerError::Cloud("no master STS client".to_string()))?;
            return Ok((master.client.clone(), master.region.clone()));
        }
        let (provider, region) = self.credentials_provider_for_profile(profile_name).await?;
        Ok((sts_client(provider, &region), region))
    }
}
