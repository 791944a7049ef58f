// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! HTTP route handlers for the broker API.
//!
//! This module provides the following endpoints:
//!
//! | Method | Path | Handler | Description |
//! |--------|------|---------|-------------|
//! | GET | `/health` | [`health`] | Health check endpoint |
//! | GET | `/status` | [`status`] | Unsealing state |
//! | GET | `/metrics` | [`metrics`] | Prometheus exposition |
//! | GET | `/` | [`account_listing`] | Accounts and roles for the user |
//! | POST | `/generatetoken` | [`generate_token`] | Mint session credentials |
//! | POST | `/console` | [`console_redirect`] | Redirect to a console sign-in URL |
//! | POST | `/unseal` | [`unseal`] | Submit an unsealing secret |
//!
//! Authentication happens upstream; handlers trust the username asserted in
//! the configured reverse-proxy header.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Form, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde_json::json;
use validator::Validate;

use crate::application::AppState;
use crate::errors::BrokerError;
use crate::models::{AccountInfo, AwsCredentialsBundle, RoleRequestForm, UnsealRequestForm};

/// Health check endpoint.
///
/// # Response
///
/// ```json
/// {"status": "ok"}
/// ```
pub async fn health() -> impl IntoResponse {
    Json(json!({"status": "ok"}))
}

/// Reports whether the broker has been unsealed.
pub async fn status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({"ready": state.broker.is_unsealed()}))
}

/// Prometheus exposition of the process counters.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match &state.metrics_handle {
        Some(handle) => handle.render().into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "metrics recorder not installed",
        )
            .into_response(),
    }
}

/// Lists the accounts and roles the authenticated user may assume.
#[tracing::instrument(skip(state, headers))]
pub async fn account_listing(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<AccountInfo>, BrokerError> {
    let username = remote_user(&headers, &state.options.remote_user_header)?;
    let permitted = state.broker.get_user_allowed_accounts(&username).await?;
    Ok(Json(AccountInfo::from_permitted(&username, permitted)))
}

/// Mints a session-credentials bundle after checking authorization.
#[tracing::instrument(skip(state, headers, form))]
pub async fn generate_token(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<RoleRequestForm>,
) -> Result<Json<AwsCredentialsBundle>, BrokerError> {
    let username = remote_user(&headers, &state.options.remote_user_header)?;
    form.validate()
        .map_err(|err| BrokerError::Validation(err.to_string()))?;
    authorize_role_request(&state, &username, &form).await?;
    let bundle = state
        .broker
        .generate_token_credentials(&form.account_name, &form.role_name, &username)
        .await?;
    Ok(Json(bundle))
}

/// Redirects the browser to a federated console sign-in URL.
#[tracing::instrument(skip(state, headers, form))]
pub async fn console_redirect(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Form(form): Form<RoleRequestForm>,
) -> Result<Response, BrokerError> {
    let username = remote_user(&headers, &state.options.remote_user_header)?;
    form.validate()
        .map_err(|err| BrokerError::Validation(err.to_string()))?;
    authorize_role_request(&state, &username, &form).await?;
    let console_url = state
        .broker
        .get_console_url_for_account_role(
            &form.account_name,
            &form.role_name,
            &username,
            &state.options.issuer_url,
        )
        .await?;
    Ok(found_redirect(&console_url))
}

/// Accepts an unsealing secret and redirects to `/status`.
///
/// Pattern violations are rejected with 400 before the secret reaches the
/// broker; unsealing failures surface as 500 so the operator can retry.
#[tracing::instrument(skip(state, form))]
pub async fn unseal(
    State(state): State<Arc<AppState>>,
    Form(form): Form<UnsealRequestForm>,
) -> Result<Response, BrokerError> {
    form.validate()
        .map_err(|_| BrokerError::Validation("Error parsing form".to_string()))?;
    let ready = state
        .broker
        .process_new_unsealing_secret(&form.unsealing_secret)
        .await?;
    tracing::debug!(ready, "processed unsealing secret");
    Ok(found_redirect("/status"))
}

async fn authorize_role_request(
    state: &AppState,
    username: &str,
    form: &RoleRequestForm,
) -> Result<(), BrokerError> {
    if !state.broker.has_account(&form.account_name) {
        return Err(BrokerError::UnknownAccount(form.account_name.clone()));
    }
    match state.broker.roles_for_account(&form.account_name).await {
        Ok(roles) => {
            if !roles.iter().any(|role| role == &form.role_name) {
                return Err(BrokerError::UnknownRole(form.role_name.clone()));
            }
        }
        Err(err) => {
            // A failed listing cannot prove the role unknown; the
            // permission check decides.
            tracing::warn!(account = %form.account_name, %err, "cannot verify role existence");
        }
    }
    let allowed = state
        .broker
        .is_user_allowed_to_assume_role(username, &form.account_name, &form.role_name)
        .await?;
    if !allowed {
        return Err(BrokerError::Forbidden);
    }
    Ok(())
}

fn remote_user(headers: &HeaderMap, header_name: &str) -> Result<String, BrokerError> {
    headers
        .get(header_name)
        .and_then(|value| value.to_str().ok())
        .filter(|value| !value.is_empty())
        .map(|value| value.to_string())
        .ok_or(BrokerError::Unauthenticated)
}

fn found_redirect(location: &str) -> Response {
    (StatusCode::FOUND, [(header::LOCATION, location.to_string())]).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;

    // Unit tests for handler helpers; full request/response coverage lives
    // in tests/http_integration.rs.

    #[tokio::test]
    async fn test_health_returns_ok() {
        let response = health().await.into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[test]
    fn remote_user_requires_a_nonempty_header() {
        let mut headers = HeaderMap::new();
        assert_eq!(
            remote_user(&headers, "X-Remote-User"),
            Err(BrokerError::Unauthenticated)
        );
        headers.insert("X-Remote-User", "".parse().unwrap());
        assert_eq!(
            remote_user(&headers, "X-Remote-User"),
            Err(BrokerError::Unauthenticated)
        );
        headers.insert("X-Remote-User", "alice".parse().unwrap());
        assert_eq!(remote_user(&headers, "X-Remote-User").unwrap(), "alice");
    }

    #[test]
    fn found_redirect_sets_location() {
        let response = found_redirect("/status");
        assert_eq!(response.status(), StatusCode::FOUND);
        assert_eq!(response.headers()[header::LOCATION], "/status");
    }

    #[tokio::test]
    async fn role_requests_distinguish_unknown_account_role_and_denial() {
        use crate::broker::Broker;
        use crate::configuration::{AccountConfig, AwsConfig, BrokerOptions, Configuration};
        use crate::userinfo::testing::StaticGroups;

        // The user's groups grant Admin on acct1; the account also lists
        // ReadOnly, which the user is not granted.
        let broker = Arc::new(Broker::new(
            StaticGroups::new(["acct1-Admin"]),
            String::new(),
            String::new(),
        ));
        broker
            .update_configuration(Configuration {
                aws: AwsConfig {
                    group_prefix: None,
                    account: vec![AccountConfig {
                        name: "acct1".to_string(),
                        account_id: "123456789012".to_string(),
                        ..Default::default()
                    }],
                },
            })
            .unwrap();
        broker.seed_account_roles_for_test(
            "acct1",
            vec!["Admin".to_string(), "ReadOnly".to_string()],
        );
        let state = AppState {
            options: BrokerOptions::default(),
            broker,
            metrics_handle: None,
        };
        let form = |account: &str, role: &str| RoleRequestForm {
            account_name: account.to_string(),
            role_name: role.to_string(),
        };

        assert_eq!(
            authorize_role_request(&state, "alice", &form("nope", "Admin")).await,
            Err(BrokerError::UnknownAccount("nope".to_string()))
        );
        assert_eq!(
            authorize_role_request(&state, "alice", &form("acct1", "DoesNotExist")).await,
            Err(BrokerError::UnknownRole("DoesNotExist".to_string()))
        );
        assert_eq!(
            authorize_role_request(&state, "alice", &form("acct1", "ReadOnly")).await,
            Err(BrokerError::Forbidden)
        );
        assert!(
            authorize_role_request(&state, "alice", &form("acct1", "Admin"))
                .await
                .is_ok()
        );
    }
}
