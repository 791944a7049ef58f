// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Per-account role enumeration.
//!
//! The primary path assumes the listing role in the target account via the
//! master profile; on any failure the profile named after the account is
//! used directly. Enumeration is bounded two ways: a process-wide semaphore
//! caps concurrent sweeps, and each sweep runs under a wall-clock timeout.

use std::future::Future;

use aws_credential_types::Credentials;
use aws_credential_types::provider::SharedCredentialsProvider;
use aws_smithy_types::error::display::DisplayErrorContext;

use super::{Broker, cloud};
use super::cache::RoleLookup;
use crate::constants;
use crate::errors::BrokerError;
use crate::observability::{LISTROLES_ATTEMPT_COUNTER, LISTROLES_SUCCESS_COUNTER};

impl Broker {
    /// All role names in the account, lexicographically sorted, cached for
    /// [`constants::ACCOUNT_ROLE_CACHE_TTL`]. Within
    /// [`constants::ACCOUNT_ROLE_NEGATIVE_TTL`] of a failed refresh the
    /// expired list keeps being served without retrying the upstream.
    pub async fn roles_for_account(
        &self,
        account_name: &str,
    ) -> Result<Vec<String>, BrokerError> {
        match self.account_role_cache.lookup(account_name) {
            RoleLookup::Serve(roles) => {
                tracing::debug!(account = account_name, "serving roles from cache");
                Ok(roles)
            }
            RoleLookup::Refresh(stale) => {
                match self.roles_for_account_uncached(account_name).await {
                    Ok(roles) => {
                        self.account_role_cache.store(account_name, roles.clone());
                        Ok(roles)
                    }
                    Err(err) => {
                        tracing::warn!(
                            account = account_name,
                            %err,
                            "role refresh failed, serving expired cache"
                        );
                        self.account_role_cache.mark_bad(account_name);
                        Ok(stale)
                    }
                }
            }
            RoleLookup::Miss => {
                let roles = self.roles_for_account_uncached(account_name).await?;
                self.account_role_cache.store(account_name, roles.clone());
                Ok(roles)
            }
        }
    }

    async fn roles_for_account_uncached(
        &self,
        account_name: &str,
    ) -> Result<Vec<String>, BrokerError> {
        match self.master_list_roles(account_name).await {
            Ok(roles) => return Ok(roles),
            Err(err) => {
                tracing::warn!(
                    account = account_name,
                    %err,
                    "listing via master failed, falling back to account profile"
                );
            }
        }
        let (provider, region) = self.credentials_provider_for_profile(account_name).await?;
        self.list_roles_with_provider(provider, &region, account_name)
            .await
    }

    async fn master_list_roles(&self, account_name: &str) -> Result<Vec<String>, BrokerError> {
        let (credentials, region) = self
            .with_profile_assume_role(
                account_name,
                constants::MASTER_PROFILE_NAME,
                &self.list_roles_role_name,
                constants::MASTER_ROLE_SESSION_NAME,
            )
            .await
            .map_err(|err| {
                BrokerError::Cloud(format!(
                    "profile {} cannot assume role {} in account {account_name}: {err}",
                    constants::MASTER_PROFILE_NAME,
                    self.list_roles_role_name,
                ))
            })?;
        let provider = SharedCredentialsProvider::new(Credentials::new(
            credentials.access_key_id().to_string(),
            credentials.secret_access_key().to_string(),
            Some(credentials.session_token().to_string()),
            None,
            "cloudgate-assumed-role",
        ));
        self.list_roles_with_provider(provider, &region, account_name)
            .await
    }

    async fn list_roles_with_provider(
        &self,
        provider: SharedCredentialsProvider,
        region: &str,
        account_name: &str,
    ) -> Result<Vec<String>, BrokerError> {
        let client = cloud::iam_client(provider, region);
        let _permit = self
            .list_roles_semaphore
            .acquire()
            .await
            .map_err(|_| BrokerError::Internal("role-listing semaphore closed".to_string()))?;
        tracing::debug!(account = account_name, "listing roles");
        metrics::counter!(LISTROLES_ATTEMPT_COUNTER, "accountName" => account_name.to_string())
            .increment(1);
        let mut role_names =
            bounded_listing(account_name, list_roles_all_pages(&client)).await?;
        metrics::counter!(LISTROLES_SUCCESS_COUNTER, "accountName" => account_name.to_string())
            .increment(1);
        role_names.sort();
        Ok(role_names)
    }
}

/// Races the enumeration against [`constants::LIST_ROLES_TIMEOUT`]. On
/// timeout the enumeration future is dropped and the caller observes a
/// timeout error.
async fn bounded_listing<F>(account_name: &str, listing: F) -> Result<Vec<String>, BrokerError>
where
    F: Future<Output = Result<Vec<String>, BrokerError>>,
{
    match tokio::time::timeout(constants::LIST_ROLES_TIMEOUT, listing).await {
        Ok(result) => result,
        Err(_) => Err(BrokerError::ListRolesTimeout(account_name.to_string())),
    }
}

async fn list_roles_all_pages(client: &aws_sdk_iam::Client) -> Result<Vec<String>, BrokerError> {
    let mut role_names = Vec::new();
    let mut pages = client
        .list_roles()
        .max_items(constants::LIST_ROLES_PAGE_SIZE)
        .into_paginator()
        .send();
    while let Some(page) = pages.next().await {
        let page =
            page.map_err(|err| BrokerError::Cloud(DisplayErrorContext(&err).to_string()))?;
        for role in page.roles() {
            role_names.push(role.role_name().to_string());
        }
    }
    Ok(role_names)
}
