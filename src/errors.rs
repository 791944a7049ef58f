// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

#[derive(thiserror::Error, Debug, PartialEq)]
pub enum BrokerError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error("account not found: {0}")]
    UnknownAccount(String),
    #[error("role not found: {0}")]
    UnknownRole(String),
    #[error("unsealing error: {0}")]
    Unseal(String),
    #[error("cloud provider error: {0}")]
    Cloud(String),
    #[error("listing roles timed out for account {0}")]
    ListRolesTimeout(String),
    #[error("federation endpoint error: {0}")]
    Federation(String),
    #[error("userinfo backend error: {0}")]
    UserInfo(String),
    #[error("validation error: {0}")]
    Validation(String),
    #[error("authentication required")]
    Unauthenticated,
    #[error("not authorized")]
    Forbidden,
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for BrokerError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::Unauthenticated => (StatusCode::UNAUTHORIZED, self.to_string()),
            Self::Forbidden => (StatusCode::FORBIDDEN, self.to_string()),
            Self::UnknownAccount(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::UnknownRole(_) => (StatusCode::NOT_FOUND, self.to_string()),
            Self::Unseal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Error Processing Secret".to_string(),
            ),
            _ => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal Server Error".to_string(),
            ),
        };

        let body = Json(json!({"code": status.as_u16(), "message": message}));

        (status, body).into_response()
    }
}

impl From<serde_json::Error> for BrokerError {
    fn from(source: serde_json::Error) -> Self {
        tracing::error!("{:?}", source);
        BrokerError::Internal(source.to_string())
    }
}

impl From<std::io::Error> for BrokerError {
    fn from(source: std::io::Error) -> Self {
        tracing::error!("{:?}", source);
        BrokerError::Internal(source.to_string())
    }
}

impl From<anyhow::Error> for BrokerError {
    fn from(source: anyhow::Error) -> Self {
        tracing::error!("{:?}", source);
        BrokerError::Internal(source.to_string())
    }
}
