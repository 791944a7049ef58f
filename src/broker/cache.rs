// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! TTL caches for resolved authorization and enumerated account roles.
//!
//! Both caches serve stale entries when a refresh fails: availability is
//! preferred over completeness for transient upstream errors. Lookup and
//! store are separate operations on purpose; two concurrent misses on the
//! same key may both call through to the upstream and the last writer wins.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::broker::mutex_lock;
use crate::models::PermittedAccount;

/// Outcome of a user-authorization cache probe.
pub(crate) enum AuthzLookup {
    Fresh(Vec<PermittedAccount>),
    /// Expired; the caller should refresh and fall back to this value if
    /// the refresh fails.
    Expired(Vec<PermittedAccount>),
    Miss,
}

struct UserAuthzEntry {
    permitted_accounts: Vec<PermittedAccount>,
    expires_at: Instant,
}

pub(crate) struct UserAuthzCache {
    entries: Mutex<HashMap<String, UserAuthzEntry>>,
    ttl: Duration,
}

impl UserAuthzCache {
    pub(crate) fn new(ttl: Duration) -> Self {
        UserAuthzCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
        }
    }

    pub(crate) fn lookup(&self, username: &str) -> AuthzLookup {
        let entries = mutex_lock(&self.entries);
        match entries.get(username) {
            None => AuthzLookup::Miss,
            Some(entry) if entry.expires_at > Instant::now() => {
                AuthzLookup::Fresh(entry.permitted_accounts.clone())
            }
            Some(entry) => AuthzLookup::Expired(entry.permitted_accounts.clone()),
        }
    }

    pub(crate) fn store(&self, username: &str, permitted_accounts: Vec<PermittedAccount>) {
        let entry = UserAuthzEntry {
            permitted_accounts,
            expires_at: Instant::now() + self.ttl,
        };
        mutex_lock(&self.entries).insert(username.to_string(), entry);
    }
}

/// Outcome of an account-role cache probe.
pub(crate) enum RoleLookup {
    /// Fresh, or expired-but-recently-bad: serve without touching the
    /// upstream.
    Serve(Vec<String>),
    /// Expired; refresh, and on failure mark the entry bad and serve this
    /// stale value.
    Refresh(Vec<String>),
    Miss,
}

struct AccountRoleEntry {
    roles: Vec<String>,
    expires_at: Instant,
    last_bad_at: Option<Instant>,
}

pub(crate) struct AccountRoleCache {
    entries: Mutex<HashMap<String, AccountRoleEntry>>,
    ttl: Duration,
    negative_ttl: Duration,
}

impl AccountRoleCache {
    pub(crate) fn new(ttl: Duration, negative_ttl: Duration) -> Self {
        AccountRoleCache {
            entries: Mutex::new(HashMap::new()),
            ttl,
            negative_ttl,
        }
    }

    pub(crate) fn lookup(&self, account_name: &str) -> RoleLookup {
        let entries = mutex_lock(&self.entries);
        let Some(entry) = entries.get(account_name) else {
            return RoleLookup::Miss;
        };
        let now = Instant::now();
        if entry.expires_at > now {
            return RoleLookup::Serve(entry.roles.clone());
        }
        if let Some(last_bad_at) = entry.last_bad_at
            && now.duration_since(last_bad_at) < self.negative_ttl
        {
            return RoleLookup::Serve(entry.roles.clone());
        }
        RoleLookup::Refresh(entry.roles.clone())
    }

    pub(crate) fn store(&self, account_name: &str, roles: Vec<String>) {
        let entry = AccountRoleEntry {
            roles,
            expires_at: Instant::now() + self.ttl,
            last_bad_at: None,
        };
        mutex_lock(&self.entries).insert(account_name.to_string(), entry);
    }

    /// Records a failed refresh. Everything but `last_bad_at` is left
    /// untouched so the stale value keeps being served for the negative
    /// window.
    pub(crate) fn mark_bad(&self, account_name: &str) {
        if let Some(entry) = mutex_lock(&self.entries).get_mut(account_name) {
            entry.last_bad_at = Some(Instant::now());
        }
    }

    #[cfg(test)]
    pub(crate) fn insert_for_test(
        &self,
        account_name: &str,
        roles: Vec<String>,
        expires_at: Instant,
        last_bad_at: Option<Instant>,
    ) {
        mutex_lock(&self.entries).insert(
            account_name.to_string(),
            AccountRoleEntry {
                roles,
                expires_at,
                last_bad_at,
            },
        );
    }

    #[cfg(test)]
    pub(crate) fn snapshot(&self, account_name: &str) -> Option<(Vec<String>, Instant, Option<Instant>)> {
        mutex_lock(&self.entries)
            .get(account_name)
            .map(|entry| (entry.roles.clone(), entry.expires_at, entry.last_bad_at))
    }
}
