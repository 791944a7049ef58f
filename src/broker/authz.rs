// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! Group-based authorization resolution.
//!
//! An IDP group grants a role when it matches `<account-group>-<role>`
//! case-insensitively; the suffix capture is greedy, so a group like
//! `acct-foo-bar` under account `acct` grants the role `foo-bar`.
//! Candidate roles are then intersected with the account's live role list;
//! the live casing wins in the output.

use std::collections::HashMap;

use futures::future::join_all;
use regex::Regex;

use super::Broker;
use crate::configuration::Configuration;
use crate::errors::BrokerError;
use crate::models::PermittedAccount;

impl Broker {
    /// Resolves the user's groups into permitted accounts. One enumeration
    /// task per candidate account runs concurrently; accounts whose
    /// enumeration fails are logged and omitted, and accounts with an empty
    /// intersection are omitted silently. Output order is unspecified.
    pub(crate) async fn allowed_accounts_from_groups(
        &self,
        config: &Configuration,
        user_groups: &[String],
    ) -> Result<Vec<PermittedAccount>, BrokerError> {
        let allowed_roles = allowed_roles_by_account(config, user_groups)?;
        tracing::debug!(?allowed_roles, "candidate roles before intersection");

        let lookups = allowed_roles.into_iter().filter_map(move |(account_name, candidates)| {
            let account = config
                .aws
                .account
                .iter()
                .find(|account| account.name == account_name)?;
            Some(async move {
                let live_roles = match self.roles_for_account(&account.name).await {
                    Ok(live_roles) => live_roles,
                    Err(err) => {
                        tracing::warn!(account = %account.name, %err, "cannot list account roles");
                        return None;
                    }
                };
                let permitted = intersect_roles_case_insensitive(&live_roles, &candidates);
                if permitted.is_empty() {
                    return None;
                }
                let human_name = account
                    .display_name
                    .clone()
                    .unwrap_or_else(|| account.name.clone());
                Some(PermittedAccount {
                    name: account.name.clone(),
                    human_name,
                    permitted_role_name: permitted,
                })
            })
        });
        let permitted_accounts = join_all(lookups).await.into_iter().flatten().collect();
        Ok(permitted_accounts)
    }
}

/// Candidate roles per account name, before intersection with the live
/// role lists: regex-derived grants from the user's groups plus the
/// account's configured `extra_user_roles`.
fn allowed_roles_by_account(
    config: &Configuration,
    user_groups: &[String],
) -> Result<HashMap<String, Vec<String>>, BrokerError> {
    let mut allowed_roles: HashMap<String, Vec<String>> = HashMap::new();
    for account in &config.aws.account {
        let group_name = account
            .group_name
            .clone()
            .unwrap_or_else(|| account.name.clone())
            .to_lowercase();
        let pattern = format!("(?i)^{group_name}-(.*)$");
        let re = Regex::new(&pattern).map_err(|err| {
            BrokerError::Config(format!("cannot match groups for {group_name}: {err}"))
        })?;
        for group in user_groups {
            if let Some(captures) = re.captures(group)
                && let Some(role) = captures.get(1)
            {
                allowed_roles
                    .entry(account.name.clone())
                    .or_default()
                    .push(role.as_str().to_string());
            }
        }
        if !account.extra_user_roles.is_empty() {
            allowed_roles
                .entry(account.name.clone())
                .or_default()
                .extend(account.extra_user_roles.iter().cloned());
        }
    }
    Ok(allowed_roles)
}

/// Case-insensitive intersection, keeping the casing of `live_roles` and
/// returning a sorted, deduplicated sequence.
fn intersect_roles_case_insensitive(live_roles: &[String], candidates: &[String]) -> Vec<String> {
    let by_lowercase: HashMap<String, &str> = live_roles
        .iter()
        .map(|role| (role.to_lowercase(), role.as_str()))
        .collect();
    let mut intersection: Vec<String> = candidates
        .iter()
        .filter_map(|candidate| by_lowercase.get(&candidate.to_lowercase()))
        .map(|role| role.to_string())
        .collect();
    intersection.sort();
    intersection.dedup();
    intersection
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::super::tests::test_broker;
    use super::*;
    use crate::configuration::{AccountConfig, AwsConfig};
    use crate::userinfo::testing::StaticGroups;

    fn account(name: &str) -> AccountConfig {
        AccountConfig {
            name: name.to_string(),
            account_id: "123456789012".to_string(),
            ..Default::default()
        }
    }

    fn config_with(accounts: Vec<AccountConfig>) -> Configuration {
        Configuration {
            aws: AwsConfig {
                group_prefix: None,
                account: accounts,
            },
        }
    }

    fn groups(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn groups_grant_suffix_roles() {
        let config = config_with(vec![account("acct1")]);
        let allowed = allowed_roles_by_account(
            &config,
            &groups(&["acct1-ReadOnly", "acct1-Admin", "other-Foo"]),
        )
        .unwrap();
        assert_eq!(allowed.len(), 1);
        assert_eq!(allowed["acct1"], vec!["ReadOnly", "Admin"]);
    }

    #[test]
    fn group_matching_is_case_insensitive() {
        let config = config_with(vec![account("acct1")]);
        let allowed =
            allowed_roles_by_account(&config, &groups(&["ACCT1-Admin"])).unwrap();
        assert_eq!(allowed["acct1"], vec!["Admin"]);
    }

    #[test]
    fn suffix_capture_is_greedy_across_dashes() {
        let config = config_with(vec![account("acct")]);
        let allowed = allowed_roles_by_account(&config, &groups(&["acct-foo-bar"])).unwrap();
        assert_eq!(allowed["acct"], vec!["foo-bar"]);
    }

    #[test]
    fn custom_group_name_is_matched_lowercased() {
        let mut custom = account("acct1");
        custom.group_name = Some("CloudTeam".to_string());
        let config = config_with(vec![custom]);
        let allowed =
            allowed_roles_by_account(&config, &groups(&["cloudteam-Admin", "acct1-Other"]))
                .unwrap();
        assert_eq!(allowed["acct1"], vec!["Admin"]);
    }

    #[test]
    fn extra_user_roles_are_appended() {
        let mut with_extras = account("acct1");
        with_extras.extra_user_roles = vec!["Auditor".to_string()];
        let config = config_with(vec![with_extras]);
        let allowed =
            allowed_roles_by_account(&config, &groups(&["acct1-Admin"])).unwrap();
        assert_eq!(allowed["acct1"], vec!["Admin", "Auditor"]);

        // Extra roles create the candidate entry even with no group match.
        let allowed = allowed_roles_by_account(&config, &[]).unwrap();
        assert_eq!(allowed["acct1"], vec!["Auditor"]);
    }

    #[test]
    fn intersection_keeps_live_casing_sorted_and_unique() {
        let live = groups(&["ReadOnly", "Admin", "PowerUser"]);
        let candidates = groups(&["readonly", "ADMIN", "Admin", "Missing"]);
        assert_eq!(
            intersect_roles_case_insensitive(&live, &candidates),
            vec!["Admin", "ReadOnly"]
        );
    }

    #[tokio::test]
    async fn user_in_groups_gets_intersected_sorted_roles() {
        // Account acct1 lists [ReadOnly, Admin, PowerUser]; the user's
        // groups grant ReadOnly and Admin there plus a role on an account
        // that is not configured.
        let broker = test_broker(StaticGroups::new([]));
        let config = config_with(vec![account("acct1")]);
        broker.account_role_cache.insert_for_test(
            "acct1",
            groups(&["Admin", "PowerUser", "ReadOnly"]),
            Instant::now() + Duration::from_secs(60),
            None,
        );
        let permitted = broker
            .allowed_accounts_from_groups(
                &config,
                &groups(&["acct1-ReadOnly", "acct1-Admin", "other-Foo"]),
            )
            .await
            .unwrap();
        assert_eq!(
            permitted,
            vec![PermittedAccount {
                name: "acct1".to_string(),
                human_name: "acct1".to_string(),
                permitted_role_name: groups(&["Admin", "ReadOnly"]),
            }]
        );
    }

    #[tokio::test]
    async fn empty_intersection_omits_the_account() {
        let broker = test_broker(StaticGroups::new([]));
        let config = config_with(vec![account("acct1")]);
        broker.account_role_cache.insert_for_test(
            "acct1",
            groups(&["PowerUser"]),
            Instant::now() + Duration::from_secs(60),
            None,
        );
        let permitted = broker
            .allowed_accounts_from_groups(&config, &groups(&["acct1-Admin"]))
            .await
            .unwrap();
        assert!(permitted.is_empty());
    }

    #[tokio::test]
    async fn listing_failure_omits_the_account() {
        // No cache entry and no credentials: enumeration fails, and the
        // account silently drops out instead of failing the whole request.
        let broker = test_broker(StaticGroups::new([]));
        let config = config_with(vec![account("acct1")]);
        let permitted = broker
            .allowed_accounts_from_groups(&config, &groups(&["acct1-Admin"]))
            .await
            .unwrap();
        assert!(permitted.is_empty());
    }

    #[tokio::test]
    async fn display_name_falls_back_to_name() {
        let broker = test_broker(StaticGroups::new([]));
        let mut named = account("acct1");
        named.display_name = Some("Account One".to_string());
        let config = config_with(vec![named]);
        broker.account_role_cache.insert_for_test(
            "acct1",
            groups(&["Admin"]),
            Instant::now() + Duration::from_secs(60),
            None,
        );
        let permitted = broker
            .allowed_accounts_from_groups(&config, &groups(&["acct1-Admin"]))
            .await
            .unwrap();
        assert_eq!(permitted[0].human_name, "Account One");
    }
}
