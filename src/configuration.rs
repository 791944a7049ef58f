// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

use clap::Parser;
use serde::Deserialize;

use crate::errors::BrokerError;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct BrokerOptions {
    #[arg(long, default_value = "127.0.0.1", env("BROKER_HTTP_HOST"))]
    pub host: String,
    #[arg(long, default_value = "8080", env("BROKER_HTTP_PORT"))]
    pub port: u16,
    /// INI credentials file, optionally PGP-armored. Empty means
    /// metadata-only mode.
    #[arg(long, default_value = "", env("BROKER_CREDENTIALS_FILE"))]
    pub credentials_file: String,
    /// YAML account configuration snapshot, re-read on an interval.
    #[arg(long, default_value = "accounts.yml", env("BROKER_ACCOUNTS_FILE"))]
    pub accounts_file: String,
    /// Role assumed via the master profile to enumerate each account's
    /// roles. Empty selects the built-in default.
    #[arg(long, default_value = "", env("BROKER_LIST_ROLES_ROLE_NAME"))]
    pub list_roles_role_name: String,
    #[arg(long, default_value = "300", env("BROKER_CONFIG_CHECK_INTERVAL_SECS"))]
    pub config_check_interval_secs: u64,
    /// Base URL of the userinfo backend serving group membership.
    #[arg(
        long,
        default_value = "http://127.0.0.1:9090",
        env("BROKER_USERINFO_URL")
    )]
    pub userinfo_url: String,
    /// Header carrying the username asserted by the fronting authenticator.
    #[arg(long, default_value = "X-Remote-User", env("BROKER_REMOTE_USER_HEADER"))]
    pub remote_user_header: String,
    /// Issuer URL embedded in federated console sign-in links.
    #[arg(
        long,
        default_value = "https://localhost:8080",
        env("BROKER_ISSUER_URL")
    )]
    pub issuer_url: String,
}

impl Default for BrokerOptions {
    fn default() -> Self {
        BrokerOptions {
            host: "127.0.0.1".to_string(),
            port: 8080,
            credentials_file: String::new(),
            accounts_file: "accounts.yml".to_string(),
            list_roles_role_name: String::new(),
            config_check_interval_secs: 300,
            userinfo_url: "http://127.0.0.1:9090".to_string(),
            remote_user_header: "X-Remote-User".to_string(),
            issuer_url: "https://localhost:8080".to_string(),
        }
    }
}

/// Account configuration snapshot. Replaced atomically on reload; never
/// mutated in place.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct Configuration {
    #[serde(default)]
    pub aws: AwsConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AwsConfig {
    /// When set, IDP groups not matching `^<prefix>` are discarded before
    /// authorization resolution.
    #[serde(default)]
    pub group_prefix: Option<String>,
    #[serde(default)]
    pub account: Vec<AccountConfig>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AccountConfig {
    pub name: String,
    pub account_id: String,
    #[serde(default)]
    pub display_name: Option<String>,
    /// Group name matched against IDP groups; defaults to `name`.
    #[serde(default)]
    pub group_name: Option<String>,
    /// Roles granted to every user of this account regardless of groups.
    #[serde(default)]
    pub extra_user_roles: Vec<String>,
}

/// Reads and verifies the YAML account configuration.
pub fn load_configuration(path: &str) -> Result<Configuration, BrokerError> {
    let source = std::fs::read_to_string(path)
        .map_err(|err| BrokerError::Config(format!("cannot read {path}: {err}")))?;
    let config: Configuration = serde_yaml::from_str(&source)
        .map_err(|err| BrokerError::Config(format!("cannot parse {path}: {err}")))?;
    verify_configuration(&config)?;
    Ok(config)
}

fn verify_configuration(config: &Configuration) -> Result<(), BrokerError> {
    let mut seen = std::collections::HashSet::new();
    for account in &config.aws.account {
        if account.name.is_empty() {
            return Err(BrokerError::Config("account with empty name".to_string()));
        }
        if account.account_id.is_empty() {
            return Err(BrokerError::Config(format!(
                "account {} has no account_id",
                account.name
            )));
        }
        if !seen.insert(account.name.clone()) {
            return Err(BrokerError::Config(format!(
                "duplicate account name: {}",
                account.name
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID_ACCOUNTS_YAML: &str = r#"
aws:
  group_prefix: "cloud-"
  account:
    - name: prod
      account_id: "123456789012"
      display_name: Production
      extra_user_roles: [ReadOnly]
    - name: dev
      account_id: "210987654321"
      group_name: developers
"#;

    #[test]
    fn parses_accounts_yaml() {
        let config: Configuration = serde_yaml::from_str(VALID_ACCOUNTS_YAML).unwrap();
        assert_eq!(config.aws.group_prefix.as_deref(), Some("cloud-"));
        assert_eq!(config.aws.account.len(), 2);
        assert_eq!(config.aws.account[0].name, "prod");
        assert_eq!(config.aws.account[0].extra_user_roles, vec!["ReadOnly"]);
        assert_eq!(config.aws.account[1].group_name.as_deref(), Some("developers"));
        assert!(verify_configuration(&config).is_ok());
    }

    #[test]
    fn rejects_duplicate_account_names() {
        let config = Configuration {
            aws: AwsConfig {
                group_prefix: None,
                account: vec![
                    AccountConfig {
                        name: "prod".to_string(),
                        account_id: "1".to_string(),
                        ..Default::default()
                    },
                    AccountConfig {
                        name: "prod".to_string(),
                        account_id: "2".to_string(),
                        ..Default::default()
                    },
                ],
            },
        };
        assert!(verify_configuration(&config).is_err());
    }

    #[test]
    fn rejects_missing_account_id() {
        let config = Configuration {
            aws: AwsConfig {
                group_prefix: None,
                account: vec![AccountConfig {
                    name: "prod".to_string(),
                    ..Default::default()
                }],
            },
        };
        assert!(verify_configuration(&config).is_err());
    }
}
