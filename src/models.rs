// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use std::collections::BTreeMap;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Cloud access the authenticated user may exercise on one account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PermittedAccount {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "HumanName")]
    pub human_name: String,
    #[serde(rename = "PermittedRoleName")]
    pub permitted_role_name: Vec<String>,
}

/// Short-lived programmatic credentials handed back to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AwsCredentialsBundle {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "sessionToken")]
    pub session_token: String,
    /// Populated only for GovCloud regions; standard-partition clients
    /// resolve the region themselves.
    #[serde(rename = "region", default, skip_serializing_if = "String::is_empty")]
    pub region: String,
    #[serde(rename = "cloudgate_comment_expiration")]
    pub expiration: DateTime<Utc>,
}

/// Session credentials exchanged at the federation endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExchangeCredentials {
    #[serde(rename = "sessionId")]
    pub session_id: String,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
    #[serde(rename = "sessionToken")]
    pub session_token: String,
}

/// Body returned by the federation endpoint's `getSigninToken` action.
#[derive(Debug, Clone, Deserialize)]
pub struct SigninTokenResponse {
    #[serde(rename = "SigninToken")]
    pub signin_token: String,
}

/// Per-account entry of the account listing response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CloudAccountInfo {
    #[serde(rename = "Name")]
    pub name: String,
    #[serde(rename = "AvailableRoles")]
    pub available_roles: Vec<String>,
}

/// Account listing for the authenticated user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(rename = "AuthUsername")]
    pub auth_username: String,
    #[serde(rename = "CloudAccounts")]
    pub cloud_accounts: BTreeMap<String, CloudAccountInfo>,
}

impl AccountInfo {
    pub fn from_permitted(username: &str, accounts: Vec<PermittedAccount>) -> Self {
        let cloud_accounts = accounts
            .into_iter()
            .map(|account| {
                (
                    account.name.clone(),
                    CloudAccountInfo {
                        name: account.name,
                        available_roles: account.permitted_role_name,
                    },
                )
            })
            .collect();
        AccountInfo {
            auth_username: username.to_string(),
            cloud_accounts,
        }
    }
}

/// Form body of `POST /generatetoken` and `POST /console`. Missing fields
/// deserialize to empty strings so that validation reports them as 400s.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RoleRequestForm {
    #[serde(rename = "accountName", default)]
    #[validate(length(min = 1, max = 256))]
    pub account_name: String,
    #[serde(rename = "roleName", default)]
    #[validate(length(min = 1, max = 256))]
    pub role_name: String,
}

static UNSEALING_SECRET_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-A-Za-z0-9_.=+/]{4,40}$").expect("valid unsealing secret pattern")
});

/// Form body of `POST /unseal`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UnsealRequestForm {
    #[serde(default)]
    #[validate(custom(function = "validate_unsealing_secret"))]
    pub unsealing_secret: String,
}

fn validate_unsealing_secret(secret: &str) -> Result<(), validator::ValidationError> {
    if !UNSEALING_SECRET_RE.is_match(secret) {
        return Err(validator::ValidationError::new("invalid_unsealing_secret"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsealing_secret_pattern() {
        for ok in ["password", "a.b=c/d+e_f-g", "1234"] {
            let form = UnsealRequestForm {
                unsealing_secret: ok.to_string(),
            };
            assert!(form.validate().is_ok(), "{ok} should validate");
        }
        let too_long = "x".repeat(41);
        for bad in ["abc", "", "white space", "ab!cd", too_long.as_str()] {
            let form = UnsealRequestForm {
                unsealing_secret: bad.to_string(),
            };
            assert!(form.validate().is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn credentials_bundle_omits_empty_region() {
        let bundle = AwsCredentialsBundle {
            session_id: "AKIA".to_string(),
            session_key: "secret".to_string(),
            session_token: "token".to_string(),
            region: String::new(),
            expiration: Utc::now(),
        };
        let value = serde_json::to_value(&bundle).unwrap();
        assert!(value.get("region").is_none());
        assert!(value.get("cloudgate_comment_expiration").is_some());
        assert_eq!(value["sessionId"], "AKIA");
    }

    #[test]
    fn credentials_bundle_keeps_gov_region() {
        let bundle = AwsCredentialsBundle {
            session_id: "AKIA".to_string(),
            session_key: "secret".to_string(),
            session_token: "token".to_string(),
            region: "us-gov-west-1".to_string(),
            expiration: Utc::now(),
        };
        let value = serde_json::to_value(&bundle).unwrap();
        assert_eq!(value["region"], "us-gov-west-1");
    }

    #[test]
    fn account_info_from_permitted() {
        let accounts = vec![PermittedAccount {
            name: "prod".to_string(),
            human_name: "Production".to_string(),
            permitted_role_name: vec!["Admin".to_string(), "ReadOnly".to_string()],
        }];
        let info = AccountInfo::from_permitted("alice", accounts);
        assert_eq!(info.auth_username, "alice");
        assert_eq!(
            info.cloud_accounts["prod"].available_roles,
            vec!["Admin", "ReadOnly"]
        );
    }
}
