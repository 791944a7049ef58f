// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: MIT-0

//! IDP group membership lookups.
//!
//! The broker consumes group membership through [`UserGroupsGetter`]; the
//! actual identity provider integration lives behind this trait. The
//! production implementation talks to a userinfo backend over HTTP, and
//! [`PrefixFilteredGroups`] narrows any getter to groups matching a
//! configured prefix.

use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use regex::Regex;

use crate::constants;

#[async_trait]
pub trait UserGroupsGetter: Send + Sync {
    /// Returns the names of the groups the user belongs to.
    async fn user_groups(&self, username: &str) -> anyhow::Result<Vec<String>>;
}

/// Wraps another getter, keeping only groups matching `^<prefix>`.
///
/// The unwrapped getter stays reachable so reconfiguration can re-wrap it
/// with a different prefix.
pub struct PrefixFilteredGroups {
    inner: Arc<dyn UserGroupsGetter>,
    pattern: Regex,
}

impl PrefixFilteredGroups {
    pub fn new(inner: Arc<dyn UserGroupsGetter>, prefix: &str) -> anyhow::Result<Self> {
        let pattern =
            Regex::new(&format!("^{prefix}")).context("invalid group prefix")?;
        Ok(PrefixFilteredGroups { inner, pattern })
    }
}

#[async_trait]
impl UserGroupsGetter for PrefixFilteredGroups {
    async fn user_groups(&self, username: &str) -> anyhow::Result<Vec<String>> {
        let groups = self.inner.user_groups(username).await?;
        Ok(groups
            .into_iter()
            .filter(|group| self.pattern.is_match(group))
            .collect())
    }
}

/// Group membership served by a userinfo backend as
/// `GET <base>/users/<username>/groups` returning a JSON string array.
pub struct HttpUserGroupsGetter {
    base_url: String,
    client: reqwest::Client,
}

impl HttpUserGroupsGetter {
    pub fn new(base_url: String) -> Self {
        let client = reqwest::Client::builder()
            .timeout(constants::OUTBOUND_HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        HttpUserGroupsGetter {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        }
    }
}

#[async_trait]
impl UserGroupsGetter for HttpUserGroupsGetter {
    async fn user_groups(&self, username: &str) -> anyhow::Result<Vec<String>> {
        let url = format!("{}/users/{}/groups", self.base_url, username);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .with_context(|| format!("userinfo request to {url} failed"))?;
        let response = response
            .error_for_status()
            .context("userinfo backend returned an error status")?;
        let groups: Vec<String> = response
            .json()
            .await
            .context("userinfo backend returned malformed groups")?;
        Ok(groups)
    }
}
