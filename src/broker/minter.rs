// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Credential minting.
//!
//! Both entry points assume the requested role with the master profile
//! first and fall back to the profile named after the account. No
//! permission check happens here; callers must consult
//! [`Broker::is_user_allowed_to_assume_role`] before minting.

use aws_sdk_sts::types::Credentials as StsCredentials;
use aws_smithy_types::error::display::DisplayErrorContext;
use chrono::Utc;

use super::Broker;
use crate::constants;
use crate::errors::BrokerError;
use crate::models::{AwsCredentialsBundle, ExchangeCredentials, SigninTokenResponse};
use crate::observability::{ASSUMEROLE_ATTEMPT_COUNTER, ASSUMEROLE_SUCCESS_COUNTER};

impl Broker {
    /// Mints a programmatic credentials bundle for the user. The `region`
    /// field is populated only for GovCloud; standard-partition bundles
    /// leave it empty.
    pub async fn generate_token_credentials(
        &self,
        account_name: &str,
        role_name: &str,
        user_name: &str,
    ) -> Result<AwsCredentialsBundle, BrokerError> {
        let (credentials, region) = self
            .assume_role_with_fallback(account_name, role_name, user_name)
            .await?;
        let region = if region.starts_with(constants::GOV_REGION_PREFIX) {
            region
        } else {
            String::new()
        };
        let bundle = AwsCredentialsBundle {
            session_id: credentials.access_key_id().to_string(),
            session_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            region,
            expiration: Utc::now() + constants::ASSUME_ROLE_DURATION,
        };
        tracing::info!(
            target: "audit",
            "Token credentials (KeyId {}) generated for: {} on account {} role {}",
            bundle.session_id,
            user_name,
            account_name,
            role_name
        );
        Ok(bundle)
    }

    /// Builds a federated console sign-in URL for the user.
    pub async fn get_console_url_for_account_role(
        &self,
        account_name: &str,
        role_name: &str,
        user_name: &str,
        issuer_url: &str,
    ) -> Result<String, BrokerError> {
        let (credentials, region) = self
            .assume_role_with_fallback(account_name, role_name, user_name)
            .await?;
        let session = ExchangeCredentials {
            session_id: credentials.access_key_id().to_string(),
            session_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
        };
        let session_json = serde_json::to_string(&session)?;
        let (federation_url, destination_url) = federation_endpoints(&region);
        let signin_token = fetch_signin_token(&self.http, federation_url, &session_json).await?;
        let console_url = build_login_url(federation_url, issuer_url, destination_url, &signin_token);
        tracing::info!(
            target: "audit",
            "Console url generated for: {} on account {} role {}",
            user_name,
            account_name,
            role_name
        );
        Ok(console_url)
    }

    async fn assume_role_with_fallback(
        &self,
        account_name: &str,
        role_name: &str,
        user_name: &str,
    ) -> Result<(StsCredentials, String), BrokerError> {
        match self
            .with_profile_assume_role(
                account_name,
                constants::MASTER_PROFILE_NAME,
                role_name,
                user_name,
            )
            .await
        {
            Ok(assumed) => Ok(assumed),
            Err(err) => {
                tracing::debug!(
                    account = account_name,
                    %err,
                    "cannot assume role with master account, trying direct profile"
                );
                self.with_profile_assume_role(account_name, account_name, role_name, user_name)
                    .await
                    .map_err(|err| {
                        tracing::warn!(account = account_name, %err, "cannot assume role");
                        err
                    })
            }
        }
    }

    /// Calls STS `AssumeRole` on the profile's client against the target
    /// account, returning the temporary credentials and the client's
    /// region.
    pub(crate) async fn with_profile_assume_role(
        &self,
        account_name: &str,
        profile_name: &str,
        role_name: &str,
        role_session_name: &str,
    ) -> Result<(StsCredentials, String), BrokerError> {
        let (client, region) = self.sts_client_for_profile(profile_name).await?;
        let account_id = self.account_id_from_name(account_name)?;
        let arn = role_arn(&region, &account_id, role_name);
        tracing::debug!(role_arn = %arn, session = role_session_name, "calling sts AssumeRole");
        metrics::counter!(
            ASSUMEROLE_ATTEMPT_COUNTER,
            "accountName" => account_name.to_string(),
            "roleName" => role_name.to_string()
        )
        .increment(1);
        let output = client
            .assume_role()
            .duration_seconds(constants::ASSUME_ROLE_DURATION.as_secs() as i32)
            .role_arn(&arn)
            .role_session_name(role_session_name)
            .send()
            .await
            .map_err(|err| BrokerError::Cloud(DisplayErrorContext(&err).to_string()))?;
        metrics::counter!(
            ASSUMEROLE_SUCCESS_COUNTER,
            "accountName" => account_name.to_string(),
            "roleName" => role_name.to_string()
        )
        .increment(1);
        let credentials = output.credentials.ok_or_else(|| {
            BrokerError::Cloud("assume-role response carried no credentials".to_string())
        })?;
        Ok((credentials, region))
    }
}

/// Role ARN in the partition implied by the region.
pub(crate) fn role_arn(region: &str, account_id: &str, role_name: &str) -> String {
    let prefix = if region.starts_with(constants::GOV_REGION_PREFIX) {
        constants::ARN_ROLE_PREFIX_GOV
    } else {
        constants::ARN_ROLE_PREFIX
    };
    format!("{prefix}::{account_id}:role/{role_name}")
}

/// Federation and console endpoints for the region's partition.
pub(crate) fn federation_endpoints(region: &str) -> (&'static str, &'static str) {
    if region.starts_with(constants::GOV_REGION_PREFIX) {
        (
            constants::FEDERATION_URL_GOV,
            constants::CONSOLE_DESTINATION_URL_GOV,
        )
    } else {
        (constants::FEDERATION_URL, constants::CONSOLE_DESTINATION_URL)
    }
}

/// Exchanges session credentials for a sign-in token at the federation
/// endpoint. Any status of 300 or above fails with the response body
/// embedded in the error.
pub(crate) async fn fetch_signin_token(
    http: &reqwest::Client,
    federation_url: &str,
    session_json: &str,
) -> Result<String, BrokerError> {
    let response = http
        .get(federation_url)
        .query(&[
            ("Action", "getSigninToken"),
            ("Session", session_json),
            ("SessionDuration", constants::CONSOLE_SESSION_DURATION_SECONDS),
        ])
        .send()
        .await
        .map_err(|err| BrokerError::Federation(err.to_string()))?;
    let status = response.status();
    let body = response
        .text()
        .await
        .map_err(|err| BrokerError::Federation(err.to_string()))?;
    if status.as_u16() >= 300 {
        return Err(BrokerError::Federation(body));
    }
    let token: SigninTokenResponse = serde_json::from_str(&body)
        .map_err(|err| BrokerError::Federation(format!("malformed signin token: {err}")))?;
    Ok(token.signin_token)
}

/// Final console login URL handed back to the browser.
pub(crate) fn build_login_url(
    federation_url: &str,
    issuer_url: &str,
    destination_url: &str,
    signin_token: &str,
) -> String {
    let encoded_issuer: String =
        url::form_urlencoded::byte_serialize(issuer_url.as_bytes()).collect();
    format!(
        "{federation_url}?Action=login&Issuer={encoded_issuer}&Destination={destination_url}&SigninToken={signin_token}"
    )
}
