// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! The broker core.
//!
//! [`Broker`] owns every piece of long-lived state: the unsealed credential
//! profiles, the cached master STS client, the two authorization caches and
//! the readiness latch. The facade operations consumed by the HTTP layer
//! live on this type; the per-concern `impl` blocks are spread over the
//! sibling modules:
//!
//! | Module | Concern |
//! |---|---|
//! | [`profiles`] | INI credential profiles |
//! | [`unseal`] | Credentials-file loading and PGP unsealing |
//! | [`cloud`] | STS/IAM client construction, instance-metadata fallback |
//! | [`roles`] | Per-account role enumeration |
//! | [`authz`] | Group-to-role authorization resolution |
//! | [`cache`] | TTL caches with stale-on-error service |
//! | [`minter`] | Credential minting and federated console URLs |

pub mod authz;
pub mod cache;
pub mod cloud;
pub mod minter;
pub mod profiles;
pub mod roles;
pub mod unseal;

use std::sync::{Arc, Mutex, MutexGuard, OnceLock, RwLock};

use tokio::sync::{Semaphore, watch};

use crate::configuration::Configuration;
use crate::constants;
use crate::errors::BrokerError;
use crate::models::PermittedAccount;
use crate::userinfo::UserGroupsGetter;
use cache::{AccountRoleCache, AuthzLookup, UserAuthzCache};
use profiles::ProfileMap;

pub(crate) struct MasterSts {
    pub(crate) client: aws_sdk_sts::Client,
    pub(crate) region: String,
}

pub struct Broker {
    credentials_filename: String,
    list_roles_role_name: String,
    config: RwLock<Option<Arc<Configuration>>>,
    raw_user_info: Arc<dyn UserGroupsGetter>,
    user_info: RwLock<Arc<dyn UserGroupsGetter>>,
    /// Set exactly once when unsealing completes; effectively immutable.
    profiles: OnceLock<ProfileMap>,
    master_sts: OnceLock<MasterSts>,
    raw_credentials_file: Mutex<Vec<u8>>,
    /// Serializes unsealing attempts.
    unseal_lock: tokio::sync::Mutex<()>,
    unsealed: watch::Sender<bool>,
    user_authz_cache: UserAuthzCache,
    account_role_cache: AccountRoleCache,
    list_roles_semaphore: Semaphore,
    http: reqwest::Client,
}

impl Broker {
    pub fn new(
        user_info: Arc<dyn UserGroupsGetter>,
        credentials_filename: String,
        list_roles_role_name: String,
    ) -> Self {
        let list_roles_role_name = if list_roles_role_name.is_empty() {
            constants::DEFAULT_LIST_ROLES_ROLE_NAME.to_string()
        } else {
            list_roles_role_name
        };
        let (unsealed, _) = watch::channel(false);
        let http = reqwest::Client::builder()
            .timeout(constants::OUTBOUND_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Broker {
            credentials_filename,
            list_roles_role_name,
            config: RwLock::new(None),
            user_info: RwLock::new(user_info.clone()),
            raw_user_info: user_info,
            profiles: OnceLock::new(),
            master_sts: OnceLock::new(),
            raw_credentials_file: Mutex::new(Vec::new()),
            unseal_lock: tokio::sync::Mutex::new(()),
            unsealed,
            user_authz_cache: UserAuthzCache::new(constants::USER_AUTHZ_CACHE_TTL),
            account_role_cache: AccountRoleCache::new(
                constants::ACCOUNT_ROLE_CACHE_TTL,
                constants::ACCOUNT_ROLE_NEGATIVE_TTL,
            ),
            list_roles_semaphore: Semaphore::new(constants::MAX_ROLE_REQUESTS_IN_FLIGHT),
            http,
        }
    }

    /// Replaces the configuration snapshot and rebinds the group filter.
    pub fn update_configuration(&self, config: Configuration) -> Result<(), BrokerError> {
        let user_info: Arc<dyn UserGroupsGetter> = match config.aws.group_prefix.as_deref() {
            None | Some("") => self.raw_user_info.clone(),
            Some(prefix) => Arc::new(
                crate::userinfo::PrefixFilteredGroups::new(self.raw_user_info.clone(), prefix)
                    .map_err(|err| BrokerError::Config(err.to_string()))?,
            ),
        };
        *write_lock(&self.user_info) = user_info;
        *write_lock(&self.config) = Some(Arc::new(config));
        Ok(())
    }

    /// The accounts and roles the user may assume, cached for
    /// [`constants::USER_AUTHZ_CACHE_TTL`]. A failed refresh serves the
    /// expired entry.
    pub async fn get_user_allowed_accounts(
        &self,
        username: &str,
    ) -> Result<Vec<PermittedAccount>, BrokerError> {
        match self.user_authz_cache.lookup(username) {
            AuthzLookup::Fresh(accounts) => {
                tracing::debug!(username, "serving authorization from cache");
                Ok(accounts)
            }
            AuthzLookup::Expired(stale) => {
                match self.user_allowed_accounts_uncached(username).await {
                    Ok(accounts) => {
                        self.user_authz_cache.store(username, accounts.clone());
                        Ok(accounts)
                    }
                    Err(err) => {
                        tracing::warn!(username, %err, "authorization refresh failed, serving expired cache");
                        Ok(stale)
                    }
                }
            }
            AuthzLookup::Miss => {
                let accounts = self.user_allowed_accounts_uncached(username).await?;
                self.user_authz_cache.store(username, accounts.clone());
                Ok(accounts)
            }
        }
    }

    /// Whether the user may assume `role_name` in `account_name`. A denial
    /// is `Ok(false)`, not an error.
    pub async fn is_user_allowed_to_assume_role(
        &self,
        username: &str,
        account_name: &str,
        role_name: &str,
    ) -> Result<bool, BrokerError> {
        let permitted = self.get_user_allowed_accounts(username).await?;
        Ok(permitted.iter().any(|account| {
            account.name == account_name
                && account
                    .permitted_role_name
                    .iter()
                    .any(|role| role == role_name)
        }))
    }

    /// Resolves once the master STS client exists and credentials are
    /// usable. The latch transitions at most once.
    pub async fn wait_until_unsealed(&self) {
        let mut rx = self.unsealed.subscribe();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                return;
            }
        }
    }

    pub fn is_unsealed(&self) -> bool {
        *self.unsealed.borrow()
    }

    pub fn has_account(&self, account_name: &str) -> bool {
        self.current_config()
            .map(|config| {
                config
                    .aws
                    .account
                    .iter()
                    .any(|account| account.name == account_name)
            })
            .unwrap_or(false)
    }

    pub(crate) fn current_config(&self) -> Option<Arc<Configuration>> {
        read_lock(&self.config).clone()
    }

    pub(crate) fn current_user_info(&self) -> Arc<dyn UserGroupsGetter> {
        read_lock(&self.user_info).clone()
    }

    pub(crate) fn account_id_from_name(&self, account_name: &str) -> Result<String, BrokerError> {
        let config = self
            .current_config()
            .ok_or_else(|| BrokerError::Config("no configuration loaded".to_string()))?;
        config
            .aws
            .account
            .iter()
            .find(|account| account.name == account_name)
            .map(|account| account.account_id.clone())
            .ok_or_else(|| BrokerError::UnknownAccount(account_name.to_string()))
    }

    async fn user_allowed_accounts_uncached(
        &self,
        username: &str,
    ) -> Result<Vec<PermittedAccount>, BrokerError> {
        let config = self
            .current_config()
            .ok_or_else(|| BrokerError::Config("no configuration loaded".to_string()))?;
        let user_info = self.current_user_info();
        let user_groups = user_info
            .user_groups(username)
            .await
            .map_err(|err| BrokerError::UserInfo(err.to_string()))?;
        tracing::debug!(username, ?user_groups, "resolved user groups");
        self.allowed_accounts_from_groups(&config, &user_groups)
            .await
    }
}

#[cfg(test)]
impl Broker {
    /// Test hook: pre-populates the account-role cache.
    pub(crate) fn seed_account_roles_for_test(&self, account_name: &str, roles: Vec<String>) {
        self.account_role_cache.store(account_name, roles);
    }
}

/// Lock helpers that survive poisoning: a panicked writer cannot corrupt
/// these maps beyond what the panic already did.
pub(crate) fn read_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|err| err.into_inner())
}

pub(crate) fn write_lock<T>(lock: &RwLock<T>) -> std::sync::RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|err| err.into_inner())
}

pub(crate) fn mutex_lock<T>(lock: &Mutex<T>) -> MutexGuard<'_, T> {
    lock.lock().unwrap_or_else(|err| err.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configuration::{AccountConfig, AwsConfig};
    use crate::userinfo::testing::{FailingGroups, StaticGroups};

    pub(crate) fn test_broker(user_info: Arc<dyn UserGroupsGetter>) -> Broker {
        Broker::new(user_info, "/credentials-filename".to_string(), String::new())
    }

    fn demo_account() -> PermittedAccount {
        PermittedAccount {
            name: "demoAccount".to_string(),
            human_name: "Demo Account".to_string(),
            permitted_role_name: vec!["ro-ccount".to_string()],
        }
    }

    #[test]
    fn empty_list_roles_role_name_selects_default() {
        let broker = test_broker(StaticGroups::new([]));
        assert_eq!(
            broker.list_roles_role_name,
            constants::DEFAULT_LIST_ROLES_ROLE_NAME
        );
    }

    #[tokio::test]
    async fn cached_user_authorization_is_served_without_idp() {
        let broker = test_broker(Arc::new(FailingGroups));
        broker
            .user_authz_cache
            .store("demouser", vec![demo_account()]);
        let accounts = broker.get_user_allowed_accounts("demouser").await.unwrap();
        assert_eq!(accounts, vec![demo_account()]);
    }

    #[tokio::test]
    async fn is_user_allowed_matches_cached_roles_exactly() {
        let broker = test_broker(Arc::new(FailingGroups));
        broker
            .user_authz_cache
            .store("demouser", vec![demo_account()]);
        assert!(
            broker
                .is_user_allowed_to_assume_role("demouser", "demoAccount", "ro-ccount")
                .await
                .unwrap()
        );
        assert!(
            !broker
                .is_user_allowed_to_assume_role("demouser", "demoAccount", "RO-CCOUNT")
                .await
                .unwrap()
        );
        assert!(
            !broker
                .is_user_allowed_to_assume_role("demouser", "otherAccount", "ro-ccount")
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn authorization_fails_without_configuration() {
        let broker = test_broker(StaticGroups::new(["acct1-Admin"]));
        let err = broker.get_user_allowed_accounts("alice").await.unwrap_err();
        assert!(matches!(err, BrokerError::Config(_)));
    }

    #[tokio::test]
    async fn empty_group_list_yields_no_accounts() {
        let broker = test_broker(StaticGroups::new([]));
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
        let accounts = broker.get_user_allowed_accounts("alice").await.unwrap();
        assert!(accounts.is_empty());
    }

    #[test]
    fn group_prefix_rebinds_and_unbinds_filter() {
        let broker = test_broker(StaticGroups::new(["cloud-acct1-Admin", "unix-users"]));
        let config = |prefix: Option<&str>| Configuration {
            aws: AwsConfig {
                group_prefix: prefix.map(|prefix| prefix.to_string()),
                account: Vec::new(),
            },
        };
        broker.update_configuration(config(Some("cloud-"))).unwrap();
        let filtered = broker.current_user_info();
        let rt = tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap();
        let groups = rt.block_on(filtered.user_groups("alice")).unwrap();
        assert_eq!(groups, vec!["cloud-acct1-Admin"]);

        broker.update_configuration(config(None)).unwrap();
        let raw = broker.current_user_info();
        let groups = rt.block_on(raw.user_groups("alice")).unwrap();
        assert_eq!(groups, vec!["cloud-acct1-Admin", "unix-users"]);
    }

    #[test]
    fn invalid_group_prefix_is_a_configuration_error() {
        let broker = test_broker(StaticGroups::new([]));
        let err = broker
            .update_configuration(Configuration {
                aws: AwsConfig {
                    group_prefix: Some("([".to_string()),
                    account: Vec::new(),
                },
            })
            .unwrap_err();
        assert!(matches!(err, BrokerError::Config(_)));
    }
}
